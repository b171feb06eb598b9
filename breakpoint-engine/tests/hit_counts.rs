mod harness;

use breakpoint_engine::mock::{MockClass, RecordingListener};
use breakpoint_engine::types::{Location, Value};
use breakpoint_engine::{
    BreakpointKind, BreakpointSpec, Decision, EventKind, HitCountFilter, HitCountStyle,
};
use harness::{foo_class, foo_url, Harness, FOO, FOO_ID, RUN, THREAD};

fn line_11() -> Location {
    Location::new(FOO_ID, RUN, 4)
}

/// Drive `n` executions of line 11 and return the decision of each reported hit
async fn run_line(h: &Harness, n: usize) -> Vec<(usize, Decision)> {
    let mut reported = Vec::new();
    for i in 1..=n {
        let events = h.vm.hit(THREAD, line_11());
        for decision in h.deliver(events).await {
            reported.push((i, decision));
        }
    }
    reported
}

#[tokio::test]
async fn test_multiple_stops_on_every_nth_hit() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h
        .add(BreakpointSpec::line(foo_url(), 11).with_hit_count(3, HitCountStyle::Multiple))
        .await;

    let reported = run_line(&h, 9).await;
    assert_eq!(
        reported,
        vec![(3, Decision::Suspend), (6, Decision::Suspend), (9, Decision::Suspend)]
    );
    let counts: Vec<u32> = h.listener.hits_of(bp.id()).iter().map(|hit| hit.hit_count).collect();
    assert_eq!(counts, vec![1, 2, 3]);
    // Re-armed after each report
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 1);
}

#[tokio::test]
async fn test_equal_stops_once_and_retires_requests() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h
        .add(BreakpointSpec::line(foo_url(), 11).with_hit_count(2, HitCountStyle::Equal))
        .await;

    let reported = run_line(&h, 5).await;
    assert_eq!(reported, vec![(2, Decision::Suspend)]);
    assert_eq!(h.vm.request_count(), 0);

    let engine = h.registry.engine(bp.id()).unwrap();
    assert!(engine.live_requests().await.is_empty());

    // Rebuilding does not re-arm a satisfied one-shot
    h.registry.spec_changed(bp.id()).await.unwrap();
    h.registry.flush().await.unwrap();
    assert_eq!(h.vm.request_count(), 0);

    // A new count starts over
    bp.update(|spec| spec.hit_count = Some(HitCountFilter::new(1, HitCountStyle::Equal)));
    h.registry.spec_changed(bp.id()).await.unwrap();
    h.registry.flush().await.unwrap();
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 1);
}

#[tokio::test]
async fn test_greater_stops_on_every_hit_after_n() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.add(BreakpointSpec::line(foo_url(), 11).with_hit_count(2, HitCountStyle::Greater))
        .await;

    let reported: Vec<usize> = run_line(&h, 6).await.into_iter().map(|(i, _)| i).collect();
    assert_eq!(reported, vec![3, 4, 5, 6]);

    let requests = h.vm.requests();
    let live: Vec<_> = requests
        .iter()
        .filter(|(_, r)| r.target.kind() == EventKind::Breakpoint)
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].1.count, None);
}

#[tokio::test]
async fn test_counts_are_shared_between_method_entry_and_exit() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;

    let mut spec = BreakpointSpec::method(FOO, "run").with_hit_count(2, HitCountStyle::Multiple);
    if let BreakpointKind::Method { exit, .. } = &mut spec.kind {
        *exit = true;
    }
    let bp = h.add(spec).await;

    // Custom counting: no count filter reaches the VM
    assert!(h.vm.requests().iter().all(|(_, r)| r.count.is_none()));

    let mut kinds = Vec::new();
    for _ in 0..2 {
        let events = h.vm.enter_method(THREAD, FOO_ID, RUN);
        h.deliver(events).await;
        let events = h.vm.exit_method(THREAD, FOO_ID, RUN, Value::Int(4));
        h.deliver(events).await;
    }
    for hit in h.listener.hits_of(bp.id()) {
        kinds.push(hit.kind);
        let variable = hit.variable.unwrap();
        assert_eq!(variable.name, "return value");
        assert_eq!(variable.value, Value::Int(4));
    }
    assert_eq!(kinds, vec![EventKind::MethodExit, EventKind::MethodExit]);
}

#[tokio::test]
async fn test_exit_count_ignores_other_methods_of_the_class() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;

    let mut spec = BreakpointSpec::method(FOO, "run").with_hit_count(2, HitCountStyle::Multiple);
    if let BreakpointKind::Method { entry, exit, .. } = &mut spec.kind {
        *entry = false;
        *exit = true;
    }
    let bp = h.add(spec).await;

    // The exit request watches the whole class, so the VM must not count it
    assert_eq!(h.vm.enabled(EventKind::MethodExit), 1);
    assert!(h.vm.requests().iter().all(|(_, r)| r.count.is_none()));

    // The constructor exits first
    let events = h.vm.exit_method(THREAD, FOO_ID, 2, Value::Void);
    assert_eq!(h.deliver(events).await, vec![Decision::Resume]);

    let mut stops = Vec::new();
    for i in 1..=4 {
        let events = h.vm.exit_method(THREAD, FOO_ID, RUN, Value::Int(i));
        for decision in h.deliver(events).await {
            if decision == Decision::Suspend {
                stops.push(i);
            }
        }
    }
    assert_eq!(stops, vec![2, 4]);
    assert_eq!(h.listener.hits_of(bp.id()).len(), 2);
}

#[tokio::test]
async fn test_greater_applies_to_every_resolved_class() {
    const BAR_ID: u64 = 200;
    const BAR_RUN: u64 = 3;

    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.vm.load_class(
        MockClass::new(BAR_ID, "com.example.Bar").method(BAR_RUN, "run", "()V", &[(20, 0)]),
    );
    h.start().await;
    let bp = h
        .add(BreakpointSpec::method("com.example.*", "run").with_hit_count(1, HitCountStyle::Greater))
        .await;
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 2);

    let calls = [
        (FOO_ID, RUN),
        (FOO_ID, RUN),
        (BAR_ID, BAR_RUN),
        (BAR_ID, BAR_RUN),
        (BAR_ID, BAR_RUN),
        (BAR_ID, BAR_RUN),
    ];
    let mut reported = Vec::new();
    for (type_id, method_id) in calls {
        let events = h.vm.enter_method(THREAD, type_id, method_id);
        reported.push(h.deliver(events).await.len());
    }
    assert_eq!(reported, vec![0, 1, 1, 1, 1, 1]);
    assert_eq!(h.listener.hits_of(bp.id()).len(), 5);

    // Crossing the threshold once released every request from its count
    assert!(h.vm.requests().iter().all(|(_, r)| r.count.is_none()));
}

#[tokio::test]
async fn test_field_access_and_modification_share_count() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;

    let mut spec = BreakpointSpec::field(FOO, "count").with_hit_count(2, HitCountStyle::Equal);
    if let BreakpointKind::Field { access, .. } = &mut spec.kind {
        *access = true;
    }
    let bp = h.add(spec).await;
    assert_eq!(h.vm.enabled(EventKind::FieldAccess), 1);
    assert_eq!(h.vm.enabled(EventKind::FieldModification), 1);

    let events = h.vm.access_field(THREAD, FOO_ID, 50, Value::Int(1));
    assert_eq!(h.deliver(events).await, vec![Decision::Resume]);
    let events = h.vm.modify_field(THREAD, FOO_ID, 50, Value::Int(2));
    assert_eq!(h.deliver(events).await, vec![Decision::Suspend]);

    let hits = h.listener.hits_of(bp.id());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].variable.as_ref().unwrap().name, "new value");
    // One-shot satisfied
    assert_eq!(h.vm.request_count(), 0);
}

#[tokio::test]
async fn test_hit_count_listener_sees_only_its_engine() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let a = h.add(BreakpointSpec::line(foo_url(), 11)).await;
    let b = h.add(BreakpointSpec::line(foo_url(), 12)).await;

    let own = RecordingListener::new();
    h.registry
        .engine(a.id())
        .unwrap()
        .add_hit_count_listener(own.clone());

    let events = h.vm.hit(THREAD, line_11());
    h.deliver(events).await;
    let events = h.vm.hit(THREAD, Location::new(FOO_ID, RUN, 8));
    h.deliver(events).await;

    assert_eq!(own.hit_counts().len(), 1);
    assert_eq!(own.hit_counts()[0].breakpoint, a.id());
    let session_wide: Vec<_> = h.listener.hit_counts().iter().map(|c| c.breakpoint).collect();
    assert_eq!(session_wide, vec![a.id(), b.id()]);
}
