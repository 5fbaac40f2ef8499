//! Plugins: build steps registered against an [`App`].

use core::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use downcast_rs::{Downcast, impl_downcast};
use thiserror::Error;
use variadics_please::all_tuples;

use crate::App;

/// A packaged set of [`App`] additions.
///
/// [`build`](Plugin::build) runs once during the app's build fixpoint and is
/// where the plugin installs resources, schedules, systems, and sub-apps;
/// plugins added from inside `build` are built too. After the fixpoint,
/// every plugin's [`finish`](Plugin::finish) runs once. Built plugins are
/// stored type-keyed on the main world so systems can borrow their
/// configuration through [`AppPlugins`].
pub trait Plugin: Downcast + Send + Sync + 'static {
    fn build(&self, app: &mut App);

    /// Runs once after every registered plugin's `build` completed.
    fn finish(&self, _app: &mut App) {}

    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }
}

impl_downcast!(Plugin);

impl<F: Fn(&mut App) + Send + Sync + 'static> Plugin for F {
    fn build(&self, app: &mut App) {
        self(app);
    }
}

/// Adding a plugin failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("plugin {0} cannot be added after the app was built")]
    AlreadyBuilt(String),
}

/// Stand-in swapped into the registry while a plugin's `build`/`finish`
/// borrows the whole [`App`].
pub(crate) struct PlaceholderPlugin;

impl Plugin for PlaceholderPlugin {
    fn build(&self, _app: &mut App) {}
}

#[derive(Default)]
pub(crate) struct PluginStore {
    pub(crate) plugins: Vec<Box<dyn Plugin>>,
    types: HashMap<TypeId, usize>,
    pub(crate) built: bool,
}

impl PluginStore {
    /// Registers a plugin; duplicates (by type) are skipped.
    pub fn add(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        if self.built {
            return Err(PluginError::AlreadyBuilt(plugin.name().to_string()));
        }
        let type_id = Downcast::as_any(&*plugin).type_id();
        if self.types.contains_key(&type_id) {
            log::warn!("plugin {} is already registered; skipping", plugin.name());
            return Ok(());
        }
        self.types.insert(type_id, self.plugins.len());
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn is_added(&self, type_id: TypeId) -> bool {
        self.types.contains_key(&type_id)
    }
}

/// The built plugins, stored as a type-keyed resource on the main world.
pub struct AppPlugins {
    by_type: HashMap<TypeId, Arc<dyn Plugin>>,
}

impl AppPlugins {
    pub(crate) fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        let mut by_type = HashMap::with_capacity(plugins.len());
        for plugin in plugins {
            let arc: Arc<dyn Plugin> = Arc::from(plugin);
            by_type.insert(Downcast::as_any(&*arc).type_id(), arc);
        }
        AppPlugins { by_type }
    }

    /// The built plugin of type `P`, if one was registered.
    pub fn get<P: Plugin>(&self) -> Option<&P> {
        self.by_type
            .get(&TypeId::of::<P>())
            .and_then(|plugin| Downcast::as_any(&**plugin).downcast_ref::<P>())
    }
}

/// One or more plugins addable in a single [`App::add_plugins`] call;
/// implemented for plugins and tuples of them.
pub trait Plugins<Marker> {
    fn add_to_app(self, app: &mut App);
}

/// [`Plugins`] marker for a single plugin.
pub struct PluginMarker;

impl<P: Plugin> Plugins<PluginMarker> for P {
    fn add_to_app(self, app: &mut App) {
        if let Err(error) = app.try_add_plugin(Box::new(self)) {
            panic!("{error}");
        }
    }
}

macro_rules! impl_plugins_tuple {
    ($(($plugin: ident, $marker: ident)),*) => {
        impl<$($plugin, $marker),*> Plugins<(($($marker,)*),)> for ($($plugin,)*)
        where
            $($plugin: Plugins<$marker>,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn add_to_app(self, app: &mut App) {
                let ($($plugin,)*) = self;
                $($plugin.add_to_app(app);)*
            }
        }
    };
}

all_tuples!(impl_plugins_tuple, 1, 15, P, M);
