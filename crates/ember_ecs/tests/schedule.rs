//! Scheduler behavior: ordering, parallelism, conflicts, conditions, and
//! graph validation.

use std::time::{Duration, Instant};

use ember_ecs::prelude::*;
use ember_ecs::schedule::{
    IntoSystemSetLabel, RunScheduleError, SchedulePrepareError,
};

struct TestSchedule;
impl AsScheduleLabel for TestSchedule {}

#[derive(Default)]
struct N(i32);

#[derive(Default)]
struct FinishOrder(Vec<&'static str>);

fn executors() -> Executors {
    Executors::new(4)
}

mod linear_chain {
    use super::*;

    fn s_a(mut n: ResMut<N>, mut order: ResMut<FinishOrder>) {
        n.0 += 1;
        order.0.push("a");
    }

    fn s_b(mut n: ResMut<N>, mut order: ResMut<FinishOrder>) {
        n.0 += 1;
        order.0.push("b");
    }

    fn s_c(mut n: ResMut<N>, mut order: ResMut<FinishOrder>) {
        n.0 += 1;
        order.0.push("c");
    }

    #[test]
    fn runs_in_dependency_order() {
        let mut world = World::new();
        world.insert_resource(N(0));
        world.insert_resource(FinishOrder::default());
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((s_a, s_b.after(s_a), s_c.after(s_b)));
        schedule.run(&mut world, Some(&executors)).unwrap();

        assert_eq!(world.resource::<N>().0, 3);
        assert_eq!(world.resource::<FinishOrder>().0, vec!["a", "b", "c"]);
    }

    #[test]
    fn chain_injects_pairwise_dependencies() {
        let mut world = World::new();
        world.insert_resource(N(0));
        world.insert_resource(FinishOrder::default());
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((s_c, s_b, s_a).chain());
        schedule.run(&mut world, Some(&executors)).unwrap();

        assert_eq!(world.resource::<FinishOrder>().0, vec!["c", "b", "a"]);
    }
}

mod parallel_fan_out {
    use super::*;

    #[derive(Default)]
    struct R(u32);
    #[derive(Default)]
    struct W1(u32);
    #[derive(Default)]
    struct W2(u32);

    struct SyncA {
        here: crossbeam_channel::Sender<()>,
        there: crossbeam_channel::Receiver<()>,
    }

    struct SyncB {
        here: crossbeam_channel::Sender<()>,
        there: crossbeam_channel::Receiver<()>,
    }

    fn writer_1(mut w: ResMut<W1>, r: Res<R>, sync: Res<SyncA>) {
        let _ = r.0;
        sync.here.send(()).unwrap();
        sync.there
            .recv_timeout(Duration::from_secs(5))
            .expect("the other independent system never started");
        w.0 += 1;
    }

    fn writer_2(mut w: ResMut<W2>, r: Res<R>, sync: Res<SyncB>) {
        let _ = r.0;
        sync.here.send(()).unwrap();
        sync.there
            .recv_timeout(Duration::from_secs(5))
            .expect("the other independent system never started");
        w.0 += 1;
    }

    /// S2: two non-conflicting writers must be in flight at the same time;
    /// each announces itself and then waits for the other.
    #[test]
    fn independent_systems_run_concurrently() {
        let (a_tx, a_rx) = crossbeam_channel::bounded(1);
        let (b_tx, b_rx) = crossbeam_channel::bounded(1);

        let mut world = World::new();
        world.insert_resource(R(7));
        world.insert_resource(W1(0));
        world.insert_resource(W2(0));
        world.insert_resource(SyncA {
            here: a_tx,
            there: b_rx,
        });
        world.insert_resource(SyncB {
            here: b_tx,
            there: a_rx,
        });

        let executors = executors();
        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((writer_1, writer_2));
        schedule.run(&mut world, Some(&executors)).unwrap();

        assert_eq!(world.resource::<W1>().0, 1);
        assert_eq!(world.resource::<W2>().0, 1);
    }
}

mod conflict_serialisation {
    use super::*;

    struct Spans(crossbeam_channel::Sender<(&'static str, Instant, Instant)>);

    fn w1(mut n: ResMut<N>, spans: Res<Spans>) {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(20));
        n.0 += 1;
        spans.0.send(("w1", start, Instant::now())).unwrap();
    }

    fn w2(mut n: ResMut<N>, spans: Res<Spans>) {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(20));
        n.0 += 1;
        spans.0.send(("w2", start, Instant::now())).unwrap();
    }

    /// Two writers of the same resource never overlap, in either order.
    #[test]
    fn conflicting_writers_are_disjoint() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut world = World::new();
        world.insert_resource(N(0));
        world.insert_resource(Spans(tx));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((w1, w2));
        schedule.run(&mut world, Some(&executors)).unwrap();

        assert_eq!(world.resource::<N>().0, 2);
        let spans: Vec<_> = rx.try_iter().collect();
        assert_eq!(spans.len(), 2);
        let (_, start_a, end_a) = spans[0];
        let (_, start_b, end_b) = spans[1];
        let disjoint = end_a <= start_b || end_b <= start_a;
        assert!(disjoint, "conflicting systems overlapped");
    }
}

mod conditions {
    use super::*;

    fn never(_: Res<N>) -> bool {
        false
    }

    fn gated(mut order: ResMut<FinishOrder>) {
        order.0.push("gated");
    }

    fn successor(mut order: ResMut<FinishOrder>) {
        order.0.push("successor");
    }

    /// A false condition short-circuits the system, its set still counts as
    /// finished, and its successors run.
    #[test]
    fn false_condition_short_circuits_but_unblocks() {
        let mut world = World::new();
        world.insert_resource(N(0));
        world.insert_resource(FinishOrder::default());
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((gated.run_if(never), successor.after(gated)));
        schedule.run(&mut world, Some(&executors)).unwrap();

        assert_eq!(world.resource::<FinishOrder>().0, vec!["successor"]);
    }

    #[test]
    fn condition_gates_whole_set_hierarchy() {
        struct Gated;
        impl AsSystemSetLabel for Gated {}

        fn in_gated(mut order: ResMut<FinishOrder>) {
            order.0.push("in_gated");
        }

        fn free(mut order: ResMut<FinishOrder>) {
            order.0.push("free");
        }

        let mut world = World::new();
        world.insert_resource(N(0));
        world.insert_resource(FinishOrder::default());
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.configure_sets(Gated.run_if(never));
        schedule.add_systems((in_gated.in_set(Gated), free.after(Gated)));
        schedule.run(&mut world, Some(&executors)).unwrap();

        assert_eq!(world.resource::<FinishOrder>().0, vec!["free"]);
    }

    #[test]
    fn conditions_run_at_most_once_per_invocation() {
        #[derive(Default)]
        struct CondRuns(u32);

        fn counting(mut runs: ResMut<CondRuns>) -> bool {
            runs.0 += 1;
            true
        }

        fn body(mut n: ResMut<N>) {
            n.0 += 1;
        }

        let mut world = World::new();
        world.insert_resource(N(0));
        world.insert_resource(CondRuns(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems(body.run_if(counting));
        schedule.run(&mut world, Some(&executors)).unwrap();
        schedule.run(&mut world, Some(&executors)).unwrap();

        assert_eq!(world.resource::<CondRuns>().0, 2);
        assert_eq!(world.resource::<N>().0, 2);
    }
}

mod graph_validation {
    use super::*;

    fn a(mut n: ResMut<N>) {
        n.0 += 1;
    }

    fn b(mut n: ResMut<N>) {
        n.0 += 1;
    }

    /// S5: a dependency cycle refuses to run and names the participants.
    #[test]
    fn dependency_cycle_is_rejected() {
        let mut world = World::new();
        world.insert_resource(N(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((a.after(b), b.after(a)));
        let error = schedule.run(&mut world, Some(&executors)).unwrap_err();
        let RunScheduleError::Prepare {
            source: SchedulePrepareError::CyclicDependency(labels),
            ..
        } = error
        else {
            panic!("expected a dependency-cycle error");
        };
        assert!(labels.contains(&a.into_system_set_label()));
        assert!(labels.contains(&b.into_system_set_label()));
        assert_eq!(world.resource::<N>().0, 0, "no system may run");
    }

    #[test]
    fn hierarchy_cycle_is_rejected() {
        struct SetA;
        impl AsSystemSetLabel for SetA {}
        struct SetB;
        impl AsSystemSetLabel for SetB {}

        let mut world = World::new();
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.configure_sets(SetA.in_set(SetB));
        schedule.configure_sets(SetB.in_set(SetA));
        let error = schedule.run(&mut world, Some(&executors)).unwrap_err();
        assert!(matches!(
            error,
            RunScheduleError::Prepare {
                source: SchedulePrepareError::CyclicHierarchy(_),
                ..
            }
        ));
    }

    #[test]
    fn ordered_ancestors_are_rejected() {
        struct SetA;
        impl AsSystemSetLabel for SetA {}
        struct SetB;
        impl AsSystemSetLabel for SetB {}

        let mut world = World::new();
        world.insert_resource(N(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.configure_sets(SetA);
        schedule.configure_sets(SetB.after(SetA));
        schedule.add_systems(a.in_set(SetA).in_set(SetB));
        let error = schedule.run(&mut world, Some(&executors)).unwrap_err();
        assert!(matches!(
            error,
            RunScheduleError::Prepare {
                source: SchedulePrepareError::ParentsWithDeps { .. },
                ..
            }
        ));
    }

    /// Edges naming labels that never join the schedule are dropped.
    #[test]
    fn unknown_labels_are_tolerated() {
        struct Nowhere;
        impl AsSystemSetLabel for Nowhere {}

        let mut world = World::new();
        world.insert_resource(N(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems(a.after(Nowhere));
        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<N>().0, 1);
    }

    /// A forward reference re-links once the named set appears.
    #[test]
    fn late_added_sets_are_symmetrised() {
        #[derive(Default)]
        struct Order(Vec<&'static str>);

        fn early(mut order: ResMut<Order>) {
            order.0.push("early");
        }

        fn late(mut order: ResMut<Order>) {
            order.0.push("late");
        }

        let mut world = World::new();
        world.insert_resource(Order::default());
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        // `early` depends on `late`, which is not present yet.
        schedule.add_systems(early.after(late));
        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<Order>().0, vec!["early"]);

        world.resource_mut::<Order>().0.clear();
        schedule.add_systems(late);
        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<Order>().0, vec!["late", "early"]);
    }
}

mod run_once {
    use super::*;

    fn once_system(mut n: ResMut<N>) {
        n.0 += 1;
    }

    /// P8: a run-once schedule sheds its systems after the first run.
    #[test]
    fn systems_are_removed_after_first_run() {
        let mut world = World::new();
        world.insert_resource(N(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.set_run_once();
        schedule.add_systems(once_system);
        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<N>().0, 1);
        assert!(!schedule.contains_system(once_system.into_system_set_label()));

        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<N>().0, 1);
    }

    /// Systems added after the first run execute once on the next run and
    /// are then removed too.
    #[test]
    fn late_additions_run_once_each() {
        fn late_system(mut n: ResMut<N>) {
            n.0 += 10;
        }

        let mut world = World::new();
        world.insert_resource(N(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.set_run_once();
        schedule.add_systems(once_system);
        schedule.run(&mut world, Some(&executors)).unwrap();

        schedule.add_systems(late_system);
        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<N>().0, 11);

        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<N>().0, 11);
    }
}

mod commands_from_systems {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tag(u32);
    impl Component for Tag {}

    fn spawner(mut commands: Commands) {
        commands.spawn(Tag(1));
        commands.spawn(Tag(2));
    }

    /// Deferred commands apply after the schedule, in enqueue order.
    #[test]
    fn commands_drain_after_the_run() {
        let mut world = World::new();
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems(spawner);
        schedule.run(&mut world, Some(&executors)).unwrap();

        let mut values: Vec<u32> = world
            .query::<&Tag>()
            .iter(&world)
            .map(|tag| tag.0)
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
    }

    /// Effects of a dependency, including its commands, are visible to the
    /// dependent system on the next run (commands drain between schedules).
    #[test]
    fn commands_are_visible_next_run() {
        #[derive(Default)]
        struct Seen(usize);

        fn observer(query: Query<&Tag>, mut seen: ResMut<Seen>) {
            seen.0 = query.iter().count();
        }

        let mut world = World::new();
        world.insert_resource(Seen(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((spawner, observer.after(spawner)));
        schedule.run(&mut world, Some(&executors)).unwrap();
        // Same run: the spawns were still queued when `observer` ran.
        assert_eq!(world.resource::<Seen>().0, 0);

        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<Seen>().0, 2);
    }
}

mod executors_table {
    use super::*;
    use ember_ecs::schedule::SingleThread;

    fn pinned(mut n: ResMut<N>) {
        n.0 += 1;
    }

    #[test]
    fn systems_can_pin_to_the_single_thread_pool() {
        let mut world = World::new();
        world.insert_resource(N(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems(pinned.set_executor(SingleThread));
        schedule.run(&mut world, Some(&executors)).unwrap();
        assert_eq!(world.resource::<N>().0, 1);
    }

    /// A missing pool marks the system finished-with-error; the schedule
    /// completes and dependents still run.
    #[test]
    fn missing_executor_does_not_stall_the_graph() {
        struct NoSuchPool;
        impl AsExecutorLabel for NoSuchPool {}

        fn follows(mut n: ResMut<N>) {
            n.0 += 10;
        }

        let mut world = World::new();
        world.insert_resource(N(0));
        let executors = executors();

        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((pinned.set_executor(NoSuchPool), follows.after(pinned)));
        schedule.run(&mut world, Some(&executors)).unwrap();
        // `pinned` was not run, `follows` was.
        assert_eq!(world.resource::<N>().0, 10);
    }
}
