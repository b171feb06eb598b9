mod harness;

use breakpoint_engine::mock::{MockClass, RecordingListener};
use breakpoint_engine::source_roots::SourceRoot;
use breakpoint_engine::types::{Capabilities, Location};
use breakpoint_engine::{
    BreakpointKind, BreakpointSpec, Decision, EngineConfig, EventKind, RequestTarget, Validity,
};
use harness::{foo_class, foo_url, Harness, FOO, FOO_ID, ROOT, RUN, THREAD};

#[tokio::test]
async fn test_line_breakpoint_waits_for_its_class() {
    let h = Harness::new().await;
    h.start().await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 11)).await;

    assert_eq!(h.validity(&bp).0, Validity::Unknown);
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 0);
    assert_eq!(h.vm.enabled(EventKind::ClassPrepare), 2);

    let decisions = h.deliver(h.vm.load_class(foo_class())).await;
    assert_eq!(decisions, vec![Decision::Resume]);
    assert_eq!(h.validity(&bp).0, Validity::Valid);

    let events = h.vm.hit(THREAD, Location::new(FOO_ID, RUN, 4));
    assert_eq!(h.deliver(events).await, vec![Decision::Suspend]);
    let hits = h.listener.hits_of(bp.id());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].declaring_type.as_deref(), Some(FOO));
}

#[tokio::test]
async fn test_line_without_code_moves_to_nearest_line() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    // Lines 12 and 16 are equally close to 14; the later one wins
    let bp = h.add(BreakpointSpec::line(foo_url(), 14)).await;

    assert_eq!(bp.spec().line_number(), Some(16));
    assert_eq!(h.validity(&bp).0, Validity::Valid);
    let targets: Vec<_> = h.vm.requests().into_iter().map(|(_, r)| r.target).collect();
    assert!(targets.contains(&RequestTarget::Breakpoint(Location::new(FOO_ID, RUN, 20))));
}

#[tokio::test]
async fn test_relocation_onto_existing_breakpoint_is_invalid() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    h.add(BreakpointSpec::line(foo_url(), 16)).await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 14)).await;

    let (validity, reason) = h.validity(&bp);
    assert_eq!(validity, Validity::Invalid);
    assert!(reason.unwrap().contains("already has breakpoint"));
    assert_eq!(bp.spec().line_number(), Some(14));
}

#[tokio::test]
async fn test_line_in_nested_class_is_not_relocated() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.vm
        .load_class(MockClass::new(101, "com.example.Foo$Inner").method(9, "call", "()V", &[(14, 0)]));
    h.start().await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 14)).await;

    assert_eq!(bp.spec().line_number(), Some(14));
    assert_eq!(h.validity(&bp).0, Validity::Valid);
    let events = h.vm.hit(THREAD, Location::new(101, 9, 0));
    assert_eq!(h.deliver(events).await.len(), 1);
    assert_eq!(
        h.listener.hits_of(bp.id())[0].declaring_type.as_deref(),
        Some("com.example.Foo$Inner")
    );
}

#[tokio::test]
async fn test_file_outside_project_is_not_submitted() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::line("/tmp/Scratch.java", 3)).await;

    assert_eq!(h.validity(&bp).0, Validity::Unknown);
    assert_eq!(h.vm.request_count(), 0);
}

#[tokio::test]
async fn test_disabled_source_root_marks_invalid_until_enabled() {
    let roots = vec![SourceRoot {
        path: ROOT.to_string(),
        enabled: false,
    }];
    let h = Harness::with(EngineConfig::default(), roots, RecordingListener::new()).await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 11)).await;

    let (validity, reason) = h.validity(&bp);
    assert_eq!(validity, Validity::Invalid);
    assert_eq!(reason, Some(format!("source root {} is disabled", ROOT)));
    assert_eq!(h.vm.request_count(), 0);

    h.sources.set_root_enabled(ROOT, true);
    h.registry.source_roots_changed().await.unwrap();
    h.registry.flush().await.unwrap();

    assert_eq!(h.validity(&bp).0, Validity::Valid);
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 1);
    let last = h.listener.last_validity(bp.id()).unwrap();
    assert_eq!(last.validity, Validity::Valid);
}

#[tokio::test]
async fn test_method_in_class_under_disabled_root_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("java");
    std::fs::create_dir_all(root.join("com/example")).unwrap();
    std::fs::write(root.join("com/example/Foo.java"), "class Foo {}").unwrap();
    let root = root.to_string_lossy().to_string();

    let roots = vec![SourceRoot {
        path: root.clone(),
        enabled: false,
    }];
    let h = Harness::with(EngineConfig::default(), roots, RecordingListener::new()).await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::method(FOO, "run")).await;

    let (validity, reason) = h.validity(&bp);
    assert_eq!(validity, Validity::Invalid);
    assert_eq!(reason, Some(format!("source root {} is disabled", root)));
    assert_eq!(h.vm.request_count(), 0);

    h.sources.set_root_enabled(&root, true);
    h.registry.source_roots_changed().await.unwrap();
    h.registry.flush().await.unwrap();

    assert_eq!(h.validity(&bp).0, Validity::Valid);
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 1);
    let events = h.vm.enter_method(THREAD, FOO_ID, RUN);
    assert_eq!(h.deliver(events).await, vec![Decision::Suspend]);
}

#[tokio::test]
async fn test_missing_method_is_invalid() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::method(FOO, "missing")).await;

    let (validity, reason) = h.validity(&bp);
    assert_eq!(validity, Validity::Invalid);
    assert_eq!(reason.as_deref(), Some("no method missing in com.example.Foo"));
}

#[tokio::test]
async fn test_constructor_by_class_name() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::method(FOO, "Foo")).await;

    assert_eq!(h.validity(&bp).0, Validity::Valid);
    let events = h.vm.enter_method(THREAD, FOO_ID, 2);
    assert_eq!(h.deliver(events).await, vec![Decision::Suspend]);
}

#[tokio::test]
async fn test_unsupported_field_watch_is_invalid() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.vm.set_capabilities(Capabilities {
        can_watch_field_modification: false,
        ..Capabilities::default()
    });
    h.start().await;
    let bp = h.add(BreakpointSpec::field(FOO, "count")).await;

    let (validity, reason) = h.validity(&bp);
    assert_eq!(validity, Validity::Invalid);
    assert_eq!(reason.as_deref(), Some("target VM cannot watch field modification"));
    assert_eq!(h.vm.enabled(EventKind::FieldModification), 0);
}

#[tokio::test]
async fn test_rejected_request_marks_invalid() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.vm.reject(
        EventKind::Breakpoint,
        breakpoint_engine::TransportError::InvalidRequest("bad location".into()),
    );
    h.start().await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 11)).await;

    let (validity, reason) = h.validity(&bp);
    assert_eq!(validity, Validity::Invalid);
    assert_eq!(reason.as_deref(), Some("invalid request: bad location"));
}

#[tokio::test]
async fn test_unloaded_class_retires_requests_until_reloaded() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let bp = h.add(BreakpointSpec::line(foo_url(), 11)).await;
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 1);

    h.deliver(h.vm.unload_class(FOO)).await;
    assert_eq!(h.vm.enabled(EventKind::Breakpoint), 0);
    assert_eq!(h.validity(&bp).0, Validity::Unknown);

    let reloaded = MockClass::new(200, FOO).method(1, "run", "()V", &[(11, 4)]);
    h.deliver(h.vm.load_class(reloaded)).await;
    assert_eq!(h.validity(&bp).0, Validity::Valid);
    let events = h.vm.hit(THREAD, Location::new(200, 1, 4));
    assert_eq!(h.deliver(events).await, vec![Decision::Suspend]);
}

#[tokio::test]
async fn test_exception_breakpoint_reports_subclasses() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.vm.load_class(MockClass::new(300, "java.lang.RuntimeException"));
    h.start().await;
    let bp = h
        .add(BreakpointSpec::exception("java.lang.RuntimeException", true, false))
        .await;
    h.vm
        .load_class(MockClass::new(301, "com.example.Oops").extends(300));

    let at = Location::new(FOO_ID, RUN, 4);
    assert_eq!(h.deliver(h.vm.throw(THREAD, at, 900, 301, true)).await.len(), 1);
    // Uncaught is not watched
    assert!(h.deliver(h.vm.throw(THREAD, at, 901, 301, false)).await.is_empty());

    let hit = &h.listener.hits_of(bp.id())[0];
    let variable = hit.variable.as_ref().unwrap();
    assert_eq!(variable.name, "exception");
    assert_eq!(variable.value.to_string(), "com.example.Oops @384");
}

#[tokio::test]
async fn test_exception_throw_location_filters_are_alternatives() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.vm.load_class(MockClass::new(300, "java.lang.RuntimeException"));
    h.start().await;

    let mut spec = BreakpointSpec::exception("java.lang.RuntimeException", true, true);
    if let BreakpointKind::Exception { class_filters, .. } = &mut spec.kind {
        *class_filters = vec!["com.example.*".to_string(), "org.other.*".to_string()];
    }
    let bp = h.add(spec).await;
    assert_eq!(h.vm.enabled(EventKind::Exception), 2);

    let at = Location::new(FOO_ID, RUN, 4);
    assert_eq!(
        h.deliver(h.vm.throw(THREAD, at, 900, 300, true)).await,
        vec![Decision::Suspend]
    );
    assert_eq!(h.listener.hits_of(bp.id()).len(), 1);
}

#[tokio::test]
async fn test_class_and_thread_breakpoints_are_vm_wide() {
    let h = Harness::new().await;
    h.start().await;
    let classes = h.add(BreakpointSpec::class_load("com.example.*")).await;
    let threads = h.add(BreakpointSpec::thread(true, false)).await;
    assert_eq!(h.validity(&classes).0, Validity::Valid);
    assert_eq!(h.validity(&threads).0, Validity::Valid);

    assert_eq!(h.deliver(h.vm.load_class(foo_class())).await.len(), 1);
    assert!(h.deliver(h.vm.load_class(MockClass::new(5, "org.other.Bar"))).await.is_empty());
    assert_eq!(h.deliver(h.vm.start_thread(42)).await.len(), 1);
    assert!(h.deliver(h.vm.end_thread(42)).await.is_empty());

    let class_hit = &h.listener.hits_of(classes.id())[0];
    assert_eq!(class_hit.variable.as_ref().unwrap().name, "class");
    let thread_hit = &h.listener.hits_of(threads.id())[0];
    assert_eq!(thread_hit.thread, Some(42));
}

#[tokio::test]
async fn test_thread_filter_narrows_hits() {
    let h = Harness::new().await;
    h.vm.load_class(foo_class());
    h.start().await;
    let mut spec = BreakpointSpec::line(foo_url(), 11);
    spec.thread_filters = vec![THREAD];
    let bp = h.add(spec).await;

    let at = Location::new(FOO_ID, RUN, 4);
    assert!(h.deliver(h.vm.hit(THREAD + 1, at)).await.is_empty());
    assert_eq!(h.deliver(h.vm.hit(THREAD, at)).await.len(), 1);
    assert_eq!(h.listener.hits_of(bp.id()).len(), 1);
}
