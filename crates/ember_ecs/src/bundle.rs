//! Bundles: ordered, deduplicated sets of components applied atomically.

use core::any::TypeId;
use core::mem::ManuallyDrop;
use std::collections::HashMap;

use variadics_please::all_tuples;

use crate::component::{Component, ComponentId, Components, RequiredComponent};

/// A statically-known set of components inserted together.
///
/// Implemented for any [`Component`] and for tuples of bundles, so bundles
/// nest. The explicit component list must not contain duplicates; the
/// registry panics when it does.
///
/// # Safety
/// [`get_components`](Bundle::get_components) must hand over exactly one
/// valid value for each id produced by
/// [`component_ids`](Bundle::component_ids), in the same order, and must not
/// touch the values afterwards.
pub unsafe trait Bundle: Send + Sync + 'static {
    fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId));

    /// Feeds each component value to `func` as an owned pointer, in
    /// [`component_ids`](Bundle::component_ids) order.
    fn get_components(self, func: &mut impl FnMut(*mut u8));
}

// SAFETY: a single component is a one-element bundle.
unsafe impl<C: Component> Bundle for C {
    fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId)) {
        ids(components.register_component::<C>());
    }

    fn get_components(self, func: &mut impl FnMut(*mut u8)) {
        let mut value = ManuallyDrop::new(self);
        func((&raw mut value).cast::<u8>());
    }
}

macro_rules! impl_bundle_for_tuple {
    ($(#[$meta:meta])* $($name: ident),*) => {
        $(#[$meta])*
        // SAFETY: each element forwards its ids and values in matching order.
        unsafe impl<$($name: Bundle),*> Bundle for ($($name,)*) {
            #[allow(unused_variables)]
            fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId)) {
                $($name::component_ids(components, ids);)*
            }

            #[allow(unused_variables, non_snake_case, clippy::unused_unit)]
            fn get_components(self, func: &mut impl FnMut(*mut u8)) {
                let ($($name,)*) = self;
                $($name.get_components(func);)*
            }
        }
    };
}

all_tuples!(impl_bundle_for_tuple, 0, 15, B);

/// A dense identifier for a registered [`Bundle`] type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BundleId(usize);

impl BundleId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Registry-side view of a bundle: its explicit component ids plus the
/// transitively required components that ride along.
pub struct BundleInfo {
    id: BundleId,
    /// Explicit ids in declaration order.
    component_ids: Vec<ComponentId>,
    /// Required components not already explicit, discovered transitively.
    required: Vec<RequiredComponent>,
}

impl BundleInfo {
    #[inline]
    pub fn id(&self) -> BundleId {
        self.id
    }

    #[inline]
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.component_ids
    }

    #[inline]
    pub(crate) fn required(&self) -> &[RequiredComponent] {
        &self.required
    }

    /// Explicit and required ids.
    pub(crate) fn all_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.component_ids
            .iter()
            .copied()
            .chain(self.required.iter().map(|required| required.id))
    }
}

/// Per-world cache of registered bundle types.
#[derive(Default)]
pub(crate) struct Bundles {
    infos: Vec<BundleInfo>,
    by_type: HashMap<TypeId, BundleId>,
}

impl Bundles {
    pub fn register<B: Bundle>(&mut self, components: &mut Components) -> BundleId {
        if let Some(&id) = self.by_type.get(&TypeId::of::<B>()) {
            return id;
        }
        let mut component_ids = Vec::new();
        B::component_ids(components, &mut |id| component_ids.push(id));
        for (position, id) in component_ids.iter().enumerate() {
            assert!(
                !component_ids[..position].contains(id),
                "bundle {} has duplicate component {}",
                core::any::type_name::<B>(),
                components.info(*id).name(),
            );
        }

        // Transitive closure of required components, skipping explicit ones.
        let mut required = Vec::new();
        let mut visited: Vec<ComponentId> = component_ids.clone();
        let mut stack: Vec<RequiredComponent> = component_ids
            .iter()
            .flat_map(|&id| components.info(id).required().iter().copied())
            .collect();
        while let Some(entry) = stack.pop() {
            if visited.contains(&entry.id) {
                continue;
            }
            visited.push(entry.id);
            stack.extend(components.info(entry.id).required().iter().copied());
            required.push(entry);
        }

        let id = BundleId(self.infos.len());
        self.by_type.insert(TypeId::of::<B>(), id);
        self.infos.push(BundleInfo {
            id,
            component_ids,
            required,
        });
        id
    }

    #[inline]
    pub fn info(&self, id: BundleId) -> &BundleInfo {
        &self.infos[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct A;
    impl Component for A {}

    struct B;
    impl Component for B {}

    struct C;
    impl Component for C {
        fn register_required(
            components: &mut Components,
            required: &mut crate::component::RequiredComponents,
        ) {
            required.add::<A>(components);
        }
    }

    #[test]
    fn tuple_bundle_ids_in_declaration_order() {
        let mut components = Components::default();
        let mut bundles = Bundles::default();
        let id = bundles.register::<(B, A)>(&mut components);
        let info = bundles.info(id);
        assert_eq!(
            info.component_ids(),
            &[
                components.component_id::<B>().unwrap(),
                components.component_id::<A>().unwrap()
            ]
        );
    }

    #[test]
    #[should_panic(expected = "duplicate component")]
    fn duplicate_components_panic() {
        let mut components = Components::default();
        let mut bundles = Bundles::default();
        bundles.register::<(A, B, A)>(&mut components);
    }

    #[test]
    fn required_components_are_collected_unless_explicit() {
        let mut components = Components::default();
        let mut bundles = Bundles::default();

        let with_required = bundles.register::<C>(&mut components);
        let a = components.component_id::<A>().unwrap();
        assert_eq!(bundles.info(with_required).required().len(), 1);
        assert_eq!(bundles.info(with_required).required()[0].id, a);

        let explicit = bundles.register::<(C, A)>(&mut components);
        assert!(bundles.info(explicit).required().is_empty());
    }
}
