mod harness;

use breakpoint_engine::error::EvaluationError;
use breakpoint_engine::mock::{MockClass, RecordingListener};
use breakpoint_engine::session::SessionState;
use breakpoint_engine::source_roots::SourceRoot;
use breakpoint_engine::step::StepConflictPolicy;
use breakpoint_engine::types::Location;
use breakpoint_engine::{
    BreakpointSpec, Decision, EngineConfig, EventKind, JsonFileStore, PersistenceStore,
    SuspendPolicy, Validity,
};
use harness::{foo_class, foo_url, Harness, FOO, FOO_ID, ROOT, RUN, THREAD};
use std::time::Duration;
use tokio::time::timeout;

fn line(n: i32) -> Location {
    match n {
        10 => Location::new(FOO_ID, RUN, 0),
        11 => Location::new(FOO_ID, RUN, 4),
        12 => Location::new(FOO_ID, RUN, 8),
        _ => Location::new(FOO_ID, RUN, 20),
    }
}

#[tokio::test]
async fn test_breakpoints_added_before_start_are_armed_on_start() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    let bp = h.registry.add_breakpoint(BreakpointSpec::line(foo_url(), 11)).await.unwrap();
    h.registry.flush().await.unwrap();
    assert_eq!(h.registry.engine_count(), 0);

    h.start().await;
    assert_eq!(h.registry.session().state(), SessionState::Running);
    assert_eq!(h.registry.engine_count(), 1);
    assert_eq!(h.validity(&bp).0, Validity::Valid);

    // Starting twice is a no-op
    h.start().await;
    assert_eq!(h.registry.engine_count(), 1);
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 1);
}

#[tokio::test]
async fn test_remove_racing_add_leaves_nothing_behind() {
    let (h, gate) = Harness::gated().await;
    h.vm.load_class(foo_class());
    h.start().await;

    let bp = breakpoint_engine::Breakpoint::new(BreakpointSpec::line(foo_url(), 11));
    h.registry.session().breakpoints().add(bp.clone());
    let pending = h.registry.spec_added(bp.clone()).await.unwrap();
    gate.entered().await;
    assert_eq!(h.registry.engine_count(), 0);
    assert_eq!(h.vm.request_count(), 1);

    // The worker is held inside construction, so only a parked removal returns
    timeout(Duration::from_secs(5), h.registry.remove_breakpoint(bp.id()))
        .await
        .expect("removal waited for the worker")
        .unwrap();
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 0);

    gate.open();
    pending.finished().await.unwrap();
    h.registry.flush().await.unwrap();

    assert_eq!(h.registry.engine_count(), 0);
    assert_eq!(h.vm.request_count(), 0);
    assert!(h.registry.session().handlers().is_empty());
    assert!(h.deliver(h.vm.hit(THREAD, line(11))).await.is_empty());
}

#[tokio::test]
async fn test_removed_breakpoint_stops_reporting() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 11)).await;

    let events = h.vm.hit(THREAD, line(11));
    h.registry.remove_breakpoint(bp.id()).await.unwrap();
    h.registry.flush().await.unwrap();

    // Events already in flight are let go
    assert_eq!(h.deliver(events).await, vec![Decision::Resume]);
    assert!(h.listener.hits().is_empty());
    assert_eq!(h.vm.request_count(), 0);
}

#[tokio::test]
async fn test_failing_condition_stops_with_error() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.evaluator.fails("i > 3", "i cannot be resolved");
    let bp = h
        .add(BreakpointSpec::line(foo_url(), 11).with_condition("i > 3"))
        .await;

    assert_eq!(h.deliver(h.vm.hit(THREAD, line(11))).await, vec![Decision::Suspend]);
    let hit = &h.listener.hits_of(bp.id())[0];
    assert!(!hit.condition_result);
    assert_eq!(
        hit.condition_error,
        Some(EvaluationError::Failed("i cannot be resolved".to_string()))
    );
}

#[tokio::test]
async fn test_condition_filters_hits() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.evaluator.sequence("i > 3", &[false, true]);
    h.evaluator.rejects("i >", "unexpected end of expression");
    let bp = h
        .add(BreakpointSpec::line(foo_url(), 11).with_condition("i > 3"))
        .await;

    assert_eq!(h.deliver(h.vm.hit(THREAD, line(11))).await, vec![Decision::Resume]);
    assert_eq!(h.deliver(h.vm.hit(THREAD, line(11))).await, vec![Decision::Suspend]);
    assert_eq!(h.evaluator.evaluations(), 2);
    assert_eq!(h.listener.hits_of(bp.id()).len(), 1);
    assert_eq!(h.registry.engine(bp.id()).unwrap().hit_count(), 1);

    // A condition that does not compile stops with the error
    bp.update(|spec| spec.condition = Some("i >".to_string()));
    h.registry.spec_changed(bp.id()).await.unwrap();
    h.registry.flush().await.unwrap();
    assert_eq!(h.deliver(h.vm.hit(THREAD, line(11))).await, vec![Decision::Suspend]);
    let hits = h.listener.hits_of(bp.id());
    assert!(matches!(
        hits[1].condition_error,
        Some(EvaluationError::Compile { .. })
    ));
}

#[tokio::test]
async fn test_condition_on_dead_thread_lets_event_go() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.evaluator.returns("true", true);
    h.add(BreakpointSpec::line(foo_url(), 11).with_condition("true"))
        .await;

    let events = h.vm.hit(THREAD, line(11));
    h.vm.kill_thread(THREAD);
    assert_eq!(h.deliver(events).await, vec![Decision::Resume]);
    assert!(h.listener.hits().is_empty());
}

#[tokio::test]
async fn test_condition_without_suspension_still_reads_frame() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.evaluator.returns("true", true);
    h.add(
        BreakpointSpec::line(foo_url(), 11)
            .with_condition("true")
            .with_suspend(SuspendPolicy::None),
    )
    .await;

    let (_, request) = h
        .vm
        .requests()
        .into_iter()
        .find(|(_, r)| r.target.kind() == EventKind::Breakpoint)
        .unwrap();
    assert_eq!(request.suspend, SuspendPolicy::EventThread);
    assert_eq!(h.deliver(h.vm.hit(THREAD, line(11))).await, vec![Decision::Resume]);
    assert_eq!(h.listener.hits().len(), 1);
}

#[tokio::test]
async fn test_listener_can_resume() {
    let h = Harness::with(
        EngineConfig::default(),
        vec![SourceRoot::new(ROOT)],
        RecordingListener::resuming(),
    )
    .await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.add(BreakpointSpec::line(foo_url(), 11)).await;

    assert_eq!(h.deliver(h.vm.hit(THREAD, line(11))).await, vec![Decision::Resume]);
    assert_eq!(h.listener.hits().len(), 1);
}

#[tokio::test]
async fn test_print_text_is_rendered() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let mut spec = BreakpointSpec::line(foo_url(), 11).with_suspend(SuspendPolicy::None);
    spec.print_text = Some("{className}.{methodName}:{lineNumber} #{hitCount} on {threadId}".into());
    let bp = h.add(spec).await;

    h.deliver(h.vm.hit(THREAD, line(11))).await;
    h.deliver(h.vm.hit(THREAD, line(11))).await;
    let messages: Vec<_> = h
        .listener
        .hits_of(bp.id())
        .into_iter()
        .filter_map(|hit| hit.message)
        .collect();
    assert_eq!(
        messages,
        vec![
            "com.example.Foo.run:11 #1 on 0x7".to_string(),
            "com.example.Foo.run:11 #2 on 0x7".to_string()
        ]
    );
}

#[tokio::test]
async fn test_hit_enables_group() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let mut trigger = BreakpointSpec::line(foo_url(), 11);
    trigger.enable_groups = vec!["after-init".to_string()];
    h.add(trigger).await;
    let follower = h
        .add(BreakpointSpec::line(foo_url(), 12).with_group("after-init").disabled())
        .await;

    assert!(h.deliver(h.vm.hit(THREAD, line(12))).await.is_empty());

    h.deliver(h.vm.hit(THREAD, line(11))).await;
    assert!(follower.is_enabled());
    assert_eq!(h.deliver(h.vm.hit(THREAD, line(12))).await, vec![Decision::Suspend]);
    assert_eq!(h.listener.hits_of(follower.id()).len(), 1);
}

#[tokio::test]
async fn test_breakpoints_active_switch() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 11)).await;

    h.registry.set_breakpoints_active(false).await.unwrap();
    h.registry.flush().await.unwrap();
    assert_eq!(h.vm.request_count(), 0);
    assert_eq!(h.validity(&bp).0, Validity::Unknown);

    h.registry.set_breakpoints_active(true).await.unwrap();
    h.registry.flush().await.unwrap();
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 1);
    assert_eq!(h.validity(&bp).0, Validity::Valid);
}

#[tokio::test]
async fn test_stepping_thread_lets_breakpoint_go() {
    let mut config = EngineConfig::default();
    config.step_conflict = Some(StepConflictPolicy::ContinueStep);
    let h = Harness::with(config, vec![SourceRoot::new(ROOT)], RecordingListener::new()).await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.add(BreakpointSpec::line(foo_url(), 11)).await;

    h.vm.add_step(THREAD);
    assert_eq!(h.deliver(h.vm.hit(THREAD, line(11))).await, vec![Decision::Resume]);
    // Another thread steps; the remembered policy lets it finish
    assert_eq!(h.deliver(h.vm.hit(THREAD + 1, line(11))).await, vec![Decision::Resume]);
    assert_eq!(h.listener.hits().len(), 2);
}

#[tokio::test]
async fn test_hidden_uncaught_exception_breakpoint_follows_session() {
    let mut config = EngineConfig::default();
    config.catch_uncaught_exceptions = true;
    let h = Harness::with(config, vec![SourceRoot::new(ROOT)], RecordingListener::new()).await;
    h.vm.load_class(foo_class());
    h.vm.load_class(MockClass::new(1, "java.lang.Throwable"));
    h.vm
        .load_class(MockClass::new(2, "java.lang.IllegalStateException").extends(1));
    h.start().await;

    let hidden: Vec<_> = h
        .registry
        .session()
        .breakpoints()
        .all()
        .into_iter()
        .filter(|b| b.is_hidden())
        .collect();
    assert_eq!(hidden.len(), 1);
    assert_eq!(hidden[0].session().as_deref(), Some("session-1"));

    let events = h.vm.throw(THREAD, line(11), 77, 2, false);
    assert_eq!(h.deliver(events).await, vec![Decision::Suspend]);
    assert_eq!(h.listener.hits_of(hidden[0].id()).len(), 1);

    h.registry.on_session_disconnected().await.unwrap();
    assert_eq!(h.registry.session().state(), SessionState::Disconnected);
    assert_eq!(h.registry.engine_count(), 0);
    assert_eq!(h.vm.request_count(), 0);
    assert!(h.registry.session().breakpoints().is_empty());
}

#[tokio::test]
async fn test_breakpoints_survive_a_restart_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("breakpoints.json"));

    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.add(BreakpointSpec::line(foo_url(), 14)).await;
    h.add(BreakpointSpec::method(FOO, "run").with_condition("true"))
        .await;
    store.save_set(h.registry.session().breakpoints()).unwrap();

    let next = Harness::new().await;
    next.vm.load_class(foo_class());
    let loaded = store.load_into(next.registry.session().breakpoints()).unwrap();
    next.start().await;

    assert_eq!(loaded.len(), 2);
    assert_eq!(next.registry.engine_count(), 2);
    // The relocated line was persisted
    assert_eq!(loaded[0].spec().line_number(), Some(16));
    assert_eq!(loaded[1].spec().condition.as_deref(), Some("true"));
}

#[tokio::test]
async fn test_fix_all_re_resolves() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 11)).await;
    let before = h.registry.engine(bp.id()).unwrap().live_requests().await;

    h.registry.fix_all().await.unwrap();
    let after = h.registry.engine(bp.id()).unwrap().live_requests().await;
    assert_eq!(before.len(), after.len());
    assert!(before.iter().all(|key| !after.contains(key)));
    assert_eq!(h.validity(&bp).0, Validity::Valid);
}
