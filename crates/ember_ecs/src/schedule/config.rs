//! Builders describing system sets before they are added to a schedule.

use std::borrow::Cow;

use variadics_please::all_tuples;

use crate::schedule::label::{ExecutorLabel, IntoSystemSetLabel, SystemSetLabel};
use crate::schedule::AsExecutorLabel;
use crate::system::{BoxedCondition, BoxedSystem, IntoSystem, System};

/// Describes one system set: its label, the system it owns (if any), its
/// run-conditions, and its edges in the set graph. May carry sub-configs,
/// which schedules add recursively.
pub struct SystemSetConfig {
    pub(crate) label: Option<SystemSetLabel>,
    pub(crate) name: Option<Cow<'static, str>>,
    pub(crate) system: Option<BoxedSystem>,
    pub(crate) conditions: Vec<BoxedCondition>,
    pub(crate) in_sets: Vec<SystemSetLabel>,
    pub(crate) depends: Vec<SystemSetLabel>,
    pub(crate) succeeds: Vec<SystemSetLabel>,
    pub(crate) executor: Option<ExecutorLabel>,
    pub(crate) sub_configs: Vec<SystemSetConfig>,
}

impl SystemSetConfig {
    fn empty() -> Self {
        SystemSetConfig {
            label: None,
            name: None,
            system: None,
            conditions: Vec::new(),
            in_sets: Vec::new(),
            depends: Vec::new(),
            succeeds: Vec::new(),
            executor: None,
            sub_configs: Vec::new(),
        }
    }

    pub(crate) fn of_set(label: SystemSetLabel) -> Self {
        SystemSetConfig {
            label: Some(label),
            ..SystemSetConfig::empty()
        }
    }

    pub(crate) fn of_system<Marker, F>(function: F) -> Self
    where
        Marker: 'static,
        F: IntoSystem<Marker> + 'static,
        F::System: System<Out = ()>,
    {
        let label = SystemSetLabel::of::<F>();
        let system: BoxedSystem = Box::new(function.into_system());
        SystemSetConfig {
            label: Some(label),
            name: Some(system.name()),
            system: Some(system),
            ..SystemSetConfig::empty()
        }
    }

    pub(crate) fn of_group(sub_configs: Vec<SystemSetConfig>) -> Self {
        SystemSetConfig {
            sub_configs,
            ..SystemSetConfig::empty()
        }
    }

    /// Applies `edit` to this config, or to every sub-config when this is an
    /// anonymous group.
    fn for_each_target(&mut self, edit: &mut impl FnMut(&mut SystemSetConfig)) {
        if self.label.is_some() {
            edit(self);
        } else {
            for sub in &mut self.sub_configs {
                sub.for_each_target(edit);
            }
        }
    }
}

/// Conversion into a [`SystemSetConfig`], with the ordering helpers.
///
/// Implemented for system functions, set-label types, tuples of configs,
/// and [`SystemSetConfig`] itself.
pub trait IntoSystemSetConfigs<Marker>: Sized {
    fn into_configs(self) -> SystemSetConfig;

    /// Runs after everything in `set` (adds a dependency edge).
    fn after<M>(self, set: impl IntoSystemSetLabel<M>) -> SystemSetConfig {
        let label = set.into_system_set_label();
        let mut config = self.into_configs();
        config.for_each_target(&mut |target| target.depends.push(label));
        config
    }

    /// Runs before everything in `set`.
    fn before<M>(self, set: impl IntoSystemSetLabel<M>) -> SystemSetConfig {
        let label = set.into_system_set_label();
        let mut config = self.into_configs();
        config.for_each_target(&mut |target| target.succeeds.push(label));
        config
    }

    /// Makes `set` a parent of this config in the hierarchy.
    fn in_set<M>(self, set: impl IntoSystemSetLabel<M>) -> SystemSetConfig {
        let label = set.into_system_set_label();
        let mut config = self.into_configs();
        config.for_each_target(&mut |target| target.in_sets.push(label));
        config
    }

    /// Gates this config on a condition system; the set only runs when every
    /// condition returns `true`.
    fn run_if<M>(self, condition: impl IntoCondition<M>) -> SystemSetConfig {
        let mut config = self.into_configs();
        // A condition instance cannot be cloned into several targets; gate
        // the group through a shared anonymous parent instead.
        let boxed = condition.into_condition();
        if config.label.is_some() {
            config.conditions.push(boxed);
        } else {
            let label = SystemSetLabel::anonymous("condition_group");
            let mut parent = SystemSetConfig::of_set(label);
            parent.conditions.push(boxed);
            config.for_each_target(&mut |target| target.in_sets.push(label));
            config.sub_configs.push(parent);
        }
        config
    }

    /// Names the set's executor pool.
    fn set_executor(self, executor: impl AsExecutorLabel) -> SystemSetConfig {
        let label = executor.as_executor_label();
        let mut config = self.into_configs();
        config.for_each_target(&mut |target| target.executor = Some(label));
        config
    }

    /// Overrides the display name.
    fn set_name(self, name: impl Into<Cow<'static, str>>) -> SystemSetConfig {
        let mut config = self.into_configs();
        config.name = Some(name.into());
        config
    }

    /// Orders the members of this group pairwise: each labeled sub-config
    /// depends on the previous one.
    fn chain(self) -> SystemSetConfig {
        let mut config = self.into_configs();
        let mut previous: Option<SystemSetLabel> = None;
        for sub in &mut config.sub_configs {
            let Some(label) = sub.label else { continue };
            if let Some(previous) = previous {
                sub.depends.push(previous);
            }
            previous = Some(label);
        }
        config
    }
}

impl IntoSystemSetConfigs<()> for SystemSetConfig {
    fn into_configs(self) -> SystemSetConfig {
        self
    }
}

/// [`IntoSystemSetConfigs`] marker for system functions.
pub struct ConfigIsSystem;

impl<Marker, F> IntoSystemSetConfigs<(ConfigIsSystem, Marker)> for F
where
    Marker: 'static,
    F: IntoSystem<Marker> + 'static,
    F::System: System<Out = ()>,
{
    fn into_configs(self) -> SystemSetConfig {
        SystemSetConfig::of_system(self)
    }
}

/// [`IntoSystemSetConfigs`] marker for set-label types.
pub struct ConfigIsSetLabel;

impl<S: crate::schedule::AsSystemSetLabel> IntoSystemSetConfigs<ConfigIsSetLabel> for S {
    fn into_configs(self) -> SystemSetConfig {
        SystemSetConfig::of_set(self.as_system_set_label())
    }
}

macro_rules! impl_into_configs_tuple {
    ($(($config: ident, $marker: ident)),*) => {
        impl<$($config, $marker),*> IntoSystemSetConfigs<(($($marker,)*),)> for ($($config,)*)
        where
            $($config: IntoSystemSetConfigs<$marker>,)*
        {
            #[allow(non_snake_case)]
            fn into_configs(self) -> SystemSetConfig {
                let ($($config,)*) = self;
                SystemSetConfig::of_group(vec![$($config.into_configs()),*])
            }
        }
    };
}

all_tuples!(impl_into_configs_tuple, 1, 15, S, M);

/// Conversion into a boxed run-condition (a system returning `bool`).
pub trait IntoCondition<Marker> {
    fn into_condition(self) -> BoxedCondition;
}

impl<Marker, F> IntoCondition<Marker> for F
where
    Marker: 'static,
    F: IntoSystem<Marker>,
    F::System: System<Out = bool>,
{
    fn into_condition(self) -> BoxedCondition {
        Box::new(self.into_system())
    }
}
