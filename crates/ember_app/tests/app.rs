//! App lifecycle: startup, the frame loop, events, plugins, and sub-app
//! extraction.

use ember_app::prelude::*;
use ember_app::{AppPlugins, ExtractTarget, Main, PreExit};
use ember_ecs::prelude::*;

#[derive(Default)]
struct Counter(u32);

#[test]
fn startup_runs_once_before_the_loop() {
    fn startup_bump(mut counter: ResMut<Counter>) {
        counter.0 += 10;
    }

    fn frame_bump(mut counter: ResMut<Counter>) {
        counter.0 += 1;
    }

    let mut app = App::new();
    app.init_resource::<Counter>()
        .add_systems(Startup, startup_bump)
        .add_systems(Update, frame_bump);

    app.startup();
    app.update();
    app.update();
    // A second startup pass is a no-op: the schedules shed their systems.
    app.startup();
    app.update();

    assert_eq!(app.world().resource::<Counter>().0, 13);
}

#[test]
fn default_runner_loops_until_exit() {
    fn count_and_exit(mut counter: ResMut<Counter>, mut exit: EventWriter<AppExit>) {
        counter.0 += 1;
        if counter.0 == 4 {
            exit.send(AppExit::Success);
        }
    }

    let mut app = App::new();
    app.init_resource::<Counter>()
        .add_systems(Update, count_and_exit);
    let exit = app.run();
    assert!(exit.is_success());
}

#[test]
fn exit_order_runs_on_shutdown() {
    fn request_exit(mut exit: EventWriter<AppExit>) {
        exit.send(AppExit::Success);
    }

    fn farewell(mut counter: ResMut<Counter>) {
        counter.0 = 99;
    }

    let mut app = App::new();
    app.init_resource::<Counter>()
        .add_systems(Update, request_exit)
        .add_systems(PreExit, farewell);
    app.set_runner(|mut app| {
        app.startup();
        app.update();
        let exit = app.should_exit().unwrap_or_default();
        app.exit();
        // The exit schedules observed the world.
        assert_eq!(app.world().resource::<Counter>().0, 99);
        exit
    });
    assert!(app.run().is_success());
}

mod events {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Damage(u32);

    #[derive(Default)]
    struct Observed(Vec<u32>);

    fn emit(mut events: EventWriter<Damage>, mut count: ResMut<Counter>) {
        count.0 += 1;
        if count.0 == 1 {
            events.send(Damage(1));
            events.send(Damage(2));
        }
    }

    fn observe(mut events: EventReader<Damage>, mut observed: ResMut<Observed>) {
        observed.0.extend(events.read().map(|damage| damage.0));
    }

    /// S6: events written in `PreUpdate` arrive in `PostUpdate` the same
    /// frame, in write order, exactly once per reader; rotation in `Last`
    /// discards them after the following frame.
    #[test]
    fn same_frame_delivery_and_rotation() {
        let mut app = App::new();
        app.init_resource::<Counter>()
            .init_resource::<Observed>()
            .add_events::<Damage>()
            .add_systems(PreUpdate, emit)
            .add_systems(PostUpdate, observe);

        app.update();
        assert_eq!(app.world().resource::<Observed>().0, vec![1, 2]);

        // The reader's cursor moved on: nothing is yielded twice.
        app.update();
        assert_eq!(app.world().resource::<Observed>().0, vec![1, 2]);

        // A cursor created two rotations later sees nothing.
        let events = app.world().resource::<Events<Damage>>();
        let mut fresh = events.get_cursor();
        assert_eq!(fresh.read(events).count(), 0);
    }
}

mod plugins {
    use super::*;

    struct AudioPlugin {
        volume: u8,
    }

    impl Plugin for AudioPlugin {
        fn build(&self, app: &mut App) {
            app.insert_resource(Counter(self.volume as u32));
            // Plugins added during build are built too (fixpoint).
            app.add_plugins(MixerPlugin);
        }

        fn finish(&self, app: &mut App) {
            app.world_mut().resource_mut::<Counter>().0 += 1;
        }
    }

    struct MixerPlugin;

    impl Plugin for MixerPlugin {
        fn build(&self, _app: &mut App) {}
    }

    #[test]
    fn build_reaches_fixpoint_and_stores_plugins() {
        let mut app = App::new();
        app.add_plugins(AudioPlugin { volume: 7 });
        assert!(app.is_plugin_added::<AudioPlugin>());
        app.build();

        assert_eq!(app.world().resource::<Counter>().0, 8);
        assert!(app.world().get_resource::<AppPlugins>().is_some());
        let audio = app.get_plugin::<AudioPlugin>().unwrap();
        assert_eq!(audio.volume, 7);
        assert!(app.get_plugin::<MixerPlugin>().is_some());
    }

    #[test]
    #[should_panic(expected = "cannot be added after the app was built")]
    fn adding_after_build_is_rejected() {
        let mut app = App::new();
        app.build();
        app.add_plugins(MixerPlugin);
    }

    #[test]
    fn function_plugins() {
        fn configure(app: &mut App) {
            app.insert_resource(Counter(3));
        }

        let mut app = App::new();
        app.add_plugins(configure);
        app.build();
        assert_eq!(app.world().resource::<Counter>().0, 3);
    }
}

mod sub_apps {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct RenderApp;
    impl AsAppLabel for RenderApp {}

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Render;
    impl AsScheduleLabel for Render {}

    #[derive(Clone, Copy, Default, PartialEq, Debug)]
    struct FrameCounter {
        n: u32,
    }

    #[derive(Default)]
    struct Seen {
        extract: Option<u32>,
        render: Option<u32>,
    }

    fn read_in_extract(counter: Res<FrameCounter>, mut seen: ResMut<Seen>) {
        seen.extract = Some(counter.n);
    }

    fn read_in_render(counter: Res<FrameCounter>, mut seen: ResMut<Seen>) {
        seen.render = Some(counter.n);
    }

    /// S7: the extract function copies main-world state into the sub-app;
    /// the sub-app's extract and render schedules observe it, and the
    /// `ExtractTarget` resource never leaks past the frame.
    #[test]
    fn extract_copies_into_the_render_world() {
        let mut app = App::new();
        app.insert_resource(FrameCounter { n: 42 });

        {
            let render_app = app.add_sub_app(RenderApp);
            render_app
                .init_resource::<FrameCounter>()
                .init_resource::<Seen>()
                .add_systems(ExtractSchedule, read_in_extract)
                .add_systems(Render, read_in_render);
            render_app.init_schedule(Render);
            render_app.main_order_mut().push(Render);
            render_app.set_extract(|main_world, render_world| {
                let counter = *main_world.resource::<FrameCounter>();
                render_world.insert_resource(counter);
            });
        }

        app.update();

        let render_app = app.sub_app(RenderApp);
        assert_eq!(render_app.world().resource::<FrameCounter>().n, 42);
        let seen = render_app.world().resource::<Seen>();
        assert_eq!(seen.extract, Some(42));
        assert_eq!(seen.render, Some(42));

        // The target pointer is gone from both worlds.
        assert!(app.world().get_resource::<ExtractTarget>().is_none());
        assert!(
            render_app
                .world()
                .get_resource::<ExtractTarget>()
                .is_none()
        );
    }

    #[test]
    fn extract_target_is_exposed_during_extract() {
        let mut app = App::new();
        app.insert_resource(FrameCounter { n: 7 });
        app.add_sub_app(RenderApp).init_resource::<FrameCounter>();

        app.sub_app_mut(RenderApp)
            .set_extract(|main_world, render_world| {
                assert!(main_world.contains_resource::<ExtractTarget>());
                let counter = *main_world.resource::<FrameCounter>();
                render_world.insert_resource(counter);
            });

        app.update();
        assert_eq!(
            app.sub_app(RenderApp).world().resource::<FrameCounter>().n,
            7
        );
    }

    #[test]
    fn main_label_is_reserved_for_the_main_app() {
        let app = App::new();
        assert_eq!(app.main().label(), Main.as_app_label());
    }
}
