//! The standard schedule labels and their default ordering.

use ember_ecs::schedule::{AsScheduleLabel, ScheduleLabel};

macro_rules! schedule_labels {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
            pub struct $name;

            impl AsScheduleLabel for $name {}
        )*
    };
}

schedule_labels!(
    /// Runs once before [`Startup`].
    PreStartup,
    /// Runs once when the app starts, before the first frame.
    Startup,
    /// Runs once after [`Startup`].
    PostStartup,
    /// First schedule of every frame.
    First,
    /// Engine/plugin preparation work that must precede [`Update`], such as
    /// draining input sources into event channels.
    PreUpdate,
    /// Reserved for state-machine transitions between [`PreUpdate`] and
    /// [`Update`].
    StateTransition,
    /// The bulk of per-frame app logic.
    Update,
    /// Reacts to [`Update`]: derived data, bookkeeping, spatial sync.
    PostUpdate,
    /// Last schedule of every frame; event channels rotate here.
    Last,
    /// Runs first when the app shuts down.
    PreExit,
    /// Shutdown logic.
    Exit,
    /// Runs last before the process leaves the main loop.
    PostExit,
    /// Driven by a parent app after extraction; a render sub-app reads the
    /// freshly extracted state here.
    ExtractSchedule,
);

/// An ordered list of schedule labels making up one lifecycle phase.
#[derive(Default, Clone, Debug)]
pub struct ScheduleOrder {
    pub labels: Vec<ScheduleLabel>,
}

impl ScheduleOrder {
    pub fn push(&mut self, label: impl AsScheduleLabel) -> &mut Self {
        self.labels.push(label.as_schedule_label());
        self
    }

    pub fn contains(&self, label: impl AsScheduleLabel) -> bool {
        self.labels.contains(&label.as_schedule_label())
    }

    /// Inserts `label` directly after `anchor`; logs and leaves the order
    /// unchanged when the anchor is missing.
    pub fn insert_after(
        &mut self,
        anchor: impl AsScheduleLabel,
        label: impl AsScheduleLabel,
    ) -> &mut Self {
        let anchor = anchor.as_schedule_label();
        match self.labels.iter().position(|existing| *existing == anchor) {
            Some(position) => self.labels.insert(position + 1, label.as_schedule_label()),
            None => log::warn!("schedule order has no anchor {anchor:?}"),
        }
        self
    }

    /// Inserts `label` directly before `anchor`; logs and leaves the order
    /// unchanged when the anchor is missing.
    pub fn insert_before(
        &mut self,
        anchor: impl AsScheduleLabel,
        label: impl AsScheduleLabel,
    ) -> &mut Self {
        let anchor = anchor.as_schedule_label();
        match self.labels.iter().position(|existing| *existing == anchor) {
            Some(position) => self.labels.insert(position, label.as_schedule_label()),
            None => log::warn!("schedule order has no anchor {anchor:?}"),
        }
        self
    }
}
