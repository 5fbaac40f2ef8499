//! Function systems: plain functions and closures over [`SystemParam`]s.

use core::marker::PhantomData;
use std::borrow::Cow;

use variadics_please::all_tuples;

use crate::component::Tick;
use crate::query::Access;
use crate::system::{
    IntoSystem, RunSystemError, System, SystemParam, SystemParamItem,
};
use crate::world::{UnsafeWorldCell, World, WorldId};

/// A function whose arguments all implement [`SystemParam`].
pub trait SystemParamFunction<Marker>: Send + Sync + 'static {
    type Param: SystemParam;
    type Out: 'static;

    fn run(&mut self, param: SystemParamItem<Self::Param>) -> Self::Out;
}

/// [`IntoSystem`] marker for function systems.
pub struct IsFunctionSystem;

impl<Marker, F> IntoSystem<(IsFunctionSystem, Marker)> for F
where
    Marker: 'static,
    F: SystemParamFunction<Marker>,
{
    type System = FunctionSystem<Marker, F>;

    fn into_system(self) -> Self::System {
        FunctionSystem {
            func: self,
            state: None,
            access: Access::default(),
            world_id: None,
            last_run: Tick::new(0),
            name: Cow::Borrowed(core::any::type_name::<F>()),
            marker: PhantomData,
        }
    }
}

/// The [`System`] wrapper around a [`SystemParamFunction`].
pub struct FunctionSystem<Marker, F>
where
    F: SystemParamFunction<Marker>,
{
    func: F,
    state: Option<<F::Param as SystemParam>::State>,
    access: Access,
    world_id: Option<WorldId>,
    last_run: Tick,
    name: Cow<'static, str>,
    marker: PhantomData<fn() -> Marker>,
}

impl<Marker, F> System for FunctionSystem<Marker, F>
where
    Marker: 'static,
    F: SystemParamFunction<Marker>,
{
    type Out = F::Out;

    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn access(&self) -> &Access {
        &self.access
    }

    fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    fn initialize(&mut self, world: &mut World) {
        // Interned ids stay stable within a world, so per-system state
        // (locals, event cursors) survives until the system meets a
        // different world.
        if self.state.is_some() && self.world_id == Some(world.id()) {
            return;
        }
        let mut access = Access::default();
        self.state = Some(<F::Param as SystemParam>::init_state(world, &mut access));
        self.access = access;
        self.world_id = Some(world.id());
    }

    unsafe fn run_unsafe(
        &mut self,
        world: UnsafeWorldCell<'_>,
    ) -> Result<Self::Out, RunSystemError> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| RunSystemError::NotInitialized {
                system: self.name.clone(),
            })?;
        // SAFETY: shared metadata access; the tick counter is atomic.
        let this_run = unsafe { world.world() }.advance_tick();
        let last_run = self.last_run;
        // SAFETY: the caller holds this system's declared access.
        let param = unsafe {
            <F::Param as SystemParam>::get_param(state, world, last_run, this_run)
        }
        .map_err(|source| RunSystemError::ParamFailed {
            system: self.name.clone(),
            source,
        })?;
        let out = self.func.run(param);
        self.last_run = this_run;
        Ok(out)
    }
}

macro_rules! impl_system_function {
    ($($param: ident),*) => {
        #[allow(non_snake_case)]
        impl<Out, Func, $($param: SystemParam),*> SystemParamFunction<fn($($param,)*) -> Out>
            for Func
        where
            Func: Send + Sync + 'static,
            for<'a> &'a mut Func:
                FnMut($($param),*) -> Out + FnMut($(SystemParamItem<$param>),*) -> Out,
            Out: 'static,
        {
            type Param = ($($param,)*);
            type Out = Out;

            #[allow(unused_variables)]
            fn run(&mut self, param: SystemParamItem<($($param,)*)>) -> Out {
                // Calls through `&mut Func` so the `FnMut` bound applies to
                // the item types, not the parameter keys.
                #[allow(clippy::too_many_arguments)]
                fn call_inner<Out, $($param),*>(
                    mut f: impl FnMut($($param),*) -> Out,
                    $($param: $param),*
                ) -> Out {
                    f($($param),*)
                }
                let ($($param,)*) = param;
                call_inner(self, $($param),*)
            }
        }
    };
}

all_tuples!(impl_system_function, 0, 15, P);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_detection::{Res, ResMut};
    use crate::system::IntoSystem;

    #[derive(Default)]
    struct Counter(usize);

    fn bump(mut counter: ResMut<Counter>) {
        counter.0 += 1;
    }

    #[test]
    fn function_system_runs_against_world() {
        let mut world = World::new();
        world.insert_resource(Counter(0));
        let mut system = IntoSystem::into_system(bump);
        system.initialize(&mut world);
        system.run(&mut world).unwrap();
        system.run(&mut world).unwrap();
        assert_eq!(world.resource::<Counter>().0, 2);
    }

    #[test]
    fn closures_are_systems() {
        let mut world = World::new();
        world.insert_resource(Counter(7));
        let mut system = IntoSystem::into_system(|counter: Res<Counter>| counter.0);
        system.initialize(&mut world);
        let read = system.run(&mut world).unwrap();
        assert_eq!(read, 7);
    }

    #[test]
    fn missing_resource_is_a_param_error() {
        let mut world = World::new();
        let mut system = IntoSystem::into_system(bump);
        system.initialize(&mut world);
        let err = system.run(&mut world).unwrap_err();
        assert!(matches!(err, RunSystemError::ParamFailed { .. }));
    }
}
