//! Component types, the type-id intern table, and change-detection ticks.

use core::alloc::Layout;
use core::any::TypeId;
use core::fmt;
use std::borrow::Cow;
use std::collections::HashMap;

/// A value attached to an entity.
///
/// Components must be `Send + Sync + 'static`. The associated [`STORAGE`]
/// constant picks the backing storage per type; table storage is the default
/// and the right choice for components that are iterated often, sparse-set
/// storage is cheaper for components that are added and removed frequently.
///
/// Components may declare *required components*: types that are inserted
/// alongside them (with their `Default` value) whenever they are inserted and
/// not already present. Requirements are collected transitively.
///
/// ```
/// use ember_ecs::prelude::*;
///
/// struct Health(f32);
/// impl Component for Health {}
///
/// struct Poisoned;
/// impl Component for Poisoned {
///     const STORAGE: StorageKind = StorageKind::SparseSet;
/// }
/// ```
///
/// [`STORAGE`]: Component::STORAGE
pub trait Component: Send + Sync + 'static {
    const STORAGE: StorageKind = StorageKind::Table;

    /// Registers the components this component requires.
    fn register_required(_components: &mut Components, _required: &mut RequiredComponents) {}
}

/// A singleton value stored on the [`World`](crate::world::World), keyed by
/// its type.
pub trait Resource: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Resource for T {}

/// Which storage backs a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// Dense, archetype-table storage.
    #[default]
    Table,
    /// Sparse-set storage keyed by entity index.
    SparseSet,
}

/// A monotonically increasing counter used for change detection.
///
/// Comparisons are wraparound-safe: ages are measured relative to a reference
/// tick and clamped to [`Tick::MAX_AGE`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tick(u32);

impl Tick {
    /// The maximum age a tick comparison can observe before saturating.
    pub const MAX_AGE: u32 = u32::MAX / 2;

    #[inline]
    pub const fn new(tick: u32) -> Self {
        Tick(tick)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this tick happened after `last_run`, as observed from
    /// `this_run`.
    #[inline]
    pub fn is_newer_than(self, last_run: Tick, this_run: Tick) -> bool {
        let age_of_change = this_run.relative_to(self).min(Self::MAX_AGE);
        let age_of_last_run = this_run.relative_to(last_run).min(Self::MAX_AGE);
        age_of_change < age_of_last_run
    }

    #[inline]
    fn relative_to(self, other: Tick) -> u32 {
        self.0.wrapping_sub(other.0)
    }
}

/// The `added` and `changed` ticks carried by every component value.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComponentTicks {
    pub added: Tick,
    pub changed: Tick,
}

impl ComponentTicks {
    pub(crate) fn new(tick: Tick) -> Self {
        ComponentTicks {
            added: tick,
            changed: tick,
        }
    }

    #[inline]
    pub fn is_added(&self, last_run: Tick, this_run: Tick) -> bool {
        self.added.is_newer_than(last_run, this_run)
    }

    #[inline]
    pub fn is_changed(&self, last_run: Tick, this_run: Tick) -> bool {
        self.changed.is_newer_than(last_run, this_run)
    }
}

/// A dense, interned identifier for a registered component or resource type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) usize);

impl ComponentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A component the registry inserts alongside another, with a type-erased
/// constructor for its default value.
#[derive(Clone, Copy)]
pub struct RequiredComponent {
    pub(crate) id: ComponentId,
    /// Writes a default-constructed value to `dst`.
    pub(crate) constructor: unsafe fn(dst: *mut u8),
}

/// The set of components a component requires.
#[derive(Default)]
pub struct RequiredComponents(pub(crate) Vec<RequiredComponent>);

impl RequiredComponents {
    pub fn add<C: Component + Default>(&mut self, components: &mut Components) {
        unsafe fn construct<C: Component + Default>(dst: *mut u8) {
            // SAFETY: the caller passes a writable slot laid out for `C`.
            unsafe { dst.cast::<C>().write(C::default()) };
        }
        let id = components.register_component::<C>();
        if !self.0.iter().any(|required| required.id == id) {
            self.0.push(RequiredComponent {
                id,
                constructor: construct::<C>,
            });
        }
    }
}

/// Everything the storages need to handle a type without knowing it.
pub struct ComponentDescriptor {
    name: Cow<'static, str>,
    storage: StorageKind,
    layout: Layout,
    drop: Option<unsafe fn(*mut u8)>,
}

impl ComponentDescriptor {
    fn of<T: Component>() -> Self {
        unsafe fn drop_in_place<T>(ptr: *mut u8) {
            // SAFETY: the caller passes a valid, owned `T`.
            unsafe { ptr.cast::<T>().drop_in_place() };
        }
        ComponentDescriptor {
            name: Cow::Borrowed(core::any::type_name::<T>()),
            storage: T::STORAGE,
            layout: Layout::new::<T>(),
            drop: core::mem::needs_drop::<T>().then_some(drop_in_place::<T> as unsafe fn(*mut u8)),
        }
    }

    fn of_resource<T: 'static>() -> Self {
        ComponentDescriptor {
            name: Cow::Borrowed(core::any::type_name::<T>()),
            storage: StorageKind::Table,
            layout: Layout::new::<T>(),
            drop: None,
        }
    }
}

/// Metadata for one registered component or resource type.
pub struct ComponentInfo {
    id: ComponentId,
    descriptor: ComponentDescriptor,
    required: Vec<RequiredComponent>,
}

impl ComponentInfo {
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The full type name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[inline]
    pub fn storage(&self) -> StorageKind {
        self.descriptor.storage
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.descriptor.layout
    }

    #[inline]
    pub(crate) fn drop_fn(&self) -> Option<unsafe fn(*mut u8)> {
        self.descriptor.drop
    }

    #[inline]
    pub(crate) fn required(&self) -> &[RequiredComponent] {
        &self.required
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("storage", &self.storage())
            .finish()
    }
}

/// The type-id intern table: stable [`ComponentId`]s for component and
/// resource types, seeded at first registration.
#[derive(Default)]
pub struct Components {
    infos: Vec<ComponentInfo>,
    indices: HashMap<TypeId, ComponentId>,
    resource_indices: HashMap<TypeId, ComponentId>,
}

impl Components {
    /// Interns `T` as a component, registering its required components
    /// transitively.
    pub fn register_component<T: Component>(&mut self) -> ComponentId {
        if let Some(&id) = self.indices.get(&TypeId::of::<T>()) {
            return id;
        }
        let id = ComponentId(self.infos.len());
        // Insert before walking requirements so requirement cycles terminate.
        self.indices.insert(TypeId::of::<T>(), id);
        self.infos.push(ComponentInfo {
            id,
            descriptor: ComponentDescriptor::of::<T>(),
            required: Vec::new(),
        });
        let mut required = RequiredComponents::default();
        T::register_required(self, &mut required);
        self.infos[id.index()].required = required.0;
        id
    }

    /// Interns `T` as a resource.
    pub fn register_resource<T: Resource>(&mut self) -> ComponentId {
        if let Some(&id) = self.resource_indices.get(&TypeId::of::<T>()) {
            return id;
        }
        let id = ComponentId(self.infos.len());
        self.resource_indices.insert(TypeId::of::<T>(), id);
        self.infos.push(ComponentInfo {
            id,
            descriptor: ComponentDescriptor::of_resource::<T>(),
            required: Vec::new(),
        });
        id
    }

    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.indices.get(&TypeId::of::<T>()).copied()
    }

    pub fn resource_id<T: Resource>(&self) -> Option<ComponentId> {
        self.resource_indices.get(&TypeId::of::<T>()).copied()
    }

    #[inline]
    pub fn info(&self, id: ComponentId) -> &ComponentInfo {
        &self.infos[id.index()]
    }

    /// Number of registered types; also the generation used to detect that
    /// new types appeared since a system was initialized.
    #[inline]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Velocity;
    impl Component for Velocity {
        const STORAGE: StorageKind = StorageKind::SparseSet;
    }

    #[derive(Default)]
    struct Transform;
    impl Component for Transform {}

    struct Camera;
    impl Component for Camera {
        fn register_required(components: &mut Components, required: &mut RequiredComponents) {
            required.add::<Transform>(components);
        }
    }

    #[test]
    fn registration_is_idempotent() {
        let mut components = Components::default();
        let a = components.register_component::<Position>();
        let b = components.register_component::<Position>();
        assert_eq!(a, b);
        assert_eq!(components.info(a).storage(), StorageKind::Table);
        let v = components.register_component::<Velocity>();
        assert_ne!(a, v);
        assert_eq!(components.info(v).storage(), StorageKind::SparseSet);
    }

    #[test]
    fn resources_and_components_do_not_share_ids() {
        let mut components = Components::default();
        let c = components.register_component::<Position>();
        let r = components.register_resource::<Position>();
        assert_ne!(c, r);
    }

    #[test]
    fn required_components_are_registered() {
        let mut components = Components::default();
        let camera = components.register_component::<Camera>();
        let transform = components.component_id::<Transform>().unwrap();
        let required = components.info(camera).required();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].id, transform);
    }

    #[test]
    fn tick_comparison_is_wrap_safe() {
        let this_run = Tick::new(10);
        assert!(Tick::new(5).is_newer_than(Tick::new(2), this_run));
        assert!(!Tick::new(2).is_newer_than(Tick::new(5), this_run));
        // Near the wrap boundary.
        let this_run = Tick::new(3);
        let change = Tick::new(u32::MAX - 1);
        let last_run = Tick::new(u32::MAX - 5);
        assert!(change.is_newer_than(last_run, this_run));
    }
}
