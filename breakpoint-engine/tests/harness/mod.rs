// Shared fixture: a running session over the in-memory VM

#![allow(dead_code)]

use async_trait::async_trait;
use breakpoint_engine::facade::StepRequest;
use breakpoint_engine::mock::{MockClass, MockEvaluator, MockVm, RecordingListener};
use breakpoint_engine::source_roots::{DirectorySourceResolver, SourceRoot};
use breakpoint_engine::types::{
    Capabilities, FieldInfo, LoadedType, Location, MethodId, MethodInfo, ReferenceTypeId,
    StackFrame, ThreadId,
};
use breakpoint_engine::{
    Breakpoint, BreakpointRegistry, BreakpointSpec, Decision, DebugSession, EngineConfig, Event,
    RemoteRequestFacade, RequestFilter, RequestKey, RequestTarget, SuspendPolicy,
    TransportResult, Validity,
};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

pub const ROOT: &str = "/work/app/src/main/java";
pub const FOO: &str = "com.example.Foo";
pub const FOO_ID: u64 = 100;
pub const RUN: u64 = 1;
pub const THREAD: u64 = 7;

pub fn foo_url() -> String {
    format!("{}/com/example/Foo.java", ROOT)
}

/// `Foo.run` with code on lines 10, 11, 12 and 16
pub fn foo_class() -> MockClass {
    MockClass::new(FOO_ID, FOO)
        .method(RUN, "run", "()V", &[(10, 0), (11, 4), (12, 8), (16, 20)])
        .method(2, "<init>", "()V", &[(5, 0)])
        .field(50, "count", "I")
}

/// The mock VM behind a gate: `enable` blocks until the gate opens, which
/// holds engine construction halfway on the registry worker
pub struct GatedVm {
    vm: Arc<MockVm>,
    entered: Notify,
    open: watch::Sender<bool>,
}

impl GatedVm {
    pub fn new(vm: Arc<MockVm>) -> Arc<Self> {
        let (open, _) = watch::channel(false);
        Arc::new(Self {
            vm,
            entered: Notify::new(),
            open,
        })
    }

    /// Wait until some `enable` is held at the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }
}

#[async_trait]
impl RemoteRequestFacade for GatedVm {
    async fn create_request(&self, target: RequestTarget) -> TransportResult<RequestKey> {
        self.vm.create_request(target).await
    }

    async fn add_filter(&self, request: RequestKey, filter: RequestFilter) -> TransportResult<()> {
        self.vm.add_filter(request, filter).await
    }

    async fn set_count_filter(&self, request: RequestKey, count: i32) -> TransportResult<()> {
        self.vm.set_count_filter(request, count).await
    }

    async fn set_suspend_policy(
        &self,
        request: RequestKey,
        policy: SuspendPolicy,
    ) -> TransportResult<()> {
        self.vm.set_suspend_policy(request, policy).await
    }

    async fn enable(&self, request: RequestKey) -> TransportResult<()> {
        self.entered.notify_one();
        let mut open = self.open.subscribe();
        while !*open.borrow_and_update() {
            if open.changed().await.is_err() {
                break;
            }
        }
        self.vm.enable(request).await
    }

    async fn disable(&self, request: RequestKey) -> TransportResult<()> {
        self.vm.disable(request).await
    }

    async fn delete(&self, request: RequestKey) -> TransportResult<()> {
        self.vm.delete(request).await
    }

    async fn loaded_classes(&self, pattern: &str) -> TransportResult<Vec<LoadedType>> {
        self.vm.loaded_classes(pattern).await
    }

    async fn line_locations(
        &self,
        type_id: ReferenceTypeId,
        line: i32,
    ) -> TransportResult<Vec<Location>> {
        self.vm.line_locations(type_id, line).await
    }

    async fn line_numbers(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<i32>> {
        self.vm.line_numbers(type_id).await
    }

    async fn methods(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<MethodInfo>> {
        self.vm.methods(type_id).await
    }

    async fn method_location(
        &self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> TransportResult<Option<Location>> {
        self.vm.method_location(type_id, method_id).await
    }

    async fn fields(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<FieldInfo>> {
        self.vm.fields(type_id).await
    }

    async fn capabilities(&self) -> TransportResult<Capabilities> {
        self.vm.capabilities().await
    }

    async fn is_thread_alive(&self, thread: ThreadId) -> TransportResult<bool> {
        self.vm.is_thread_alive(thread).await
    }

    async fn top_frame(&self, thread: ThreadId) -> TransportResult<StackFrame> {
        self.vm.top_frame(thread).await
    }

    async fn step_requests(&self) -> TransportResult<Vec<StepRequest>> {
        self.vm.step_requests().await
    }
}

pub struct Harness {
    pub vm: Arc<MockVm>,
    pub sources: Arc<DirectorySourceResolver>,
    pub evaluator: Arc<MockEvaluator>,
    pub listener: Arc<RecordingListener>,
    pub registry: BreakpointRegistry,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(EngineConfig::default(), vec![SourceRoot::new(ROOT)], RecordingListener::new()).await
    }

    pub async fn with(
        config: EngineConfig,
        roots: Vec<SourceRoot>,
        listener: Arc<RecordingListener>,
    ) -> Self {
        let vm = MockVm::new();
        Self::over(vm.clone(), vm, config, roots, listener)
    }

    /// Default harness whose session talks to the VM through a closed gate
    pub async fn gated() -> (Self, Arc<GatedVm>) {
        let vm = MockVm::new();
        let gate = GatedVm::new(vm.clone());
        let harness = Self::over(
            gate.clone(),
            vm,
            EngineConfig::default(),
            vec![SourceRoot::new(ROOT)],
            RecordingListener::new(),
        );
        (harness, gate)
    }

    fn over(
        facade: Arc<dyn RemoteRequestFacade>,
        vm: Arc<MockVm>,
        config: EngineConfig,
        roots: Vec<SourceRoot>,
        listener: Arc<RecordingListener>,
    ) -> Self {
        init_tracing();
        let sources = Arc::new(DirectorySourceResolver::new(roots));
        let evaluator = MockEvaluator::new();
        let session = DebugSession::builder("session-1", facade, sources.clone())
            .evaluator(evaluator.clone())
            .config(config)
            .build();
        session.add_listener(listener.clone());
        let registry = BreakpointRegistry::new(session);
        Self {
            vm,
            sources,
            evaluator,
            listener,
            registry,
        }
    }

    pub async fn start(&self) {
        self.registry.on_session_running().await.unwrap();
    }

    /// Add a breakpoint and wait until its engine is built
    pub async fn add(&self, spec: BreakpointSpec) -> Arc<Breakpoint> {
        let breakpoint = self.registry.add_breakpoint(spec).await.unwrap();
        self.registry.flush().await.unwrap();
        breakpoint
    }

    /// Dispatch events in order and let queued follow-up work finish
    pub async fn deliver(&self, events: Vec<Event>) -> Vec<Decision> {
        let mut decisions = Vec::new();
        for event in &events {
            decisions.push(self.registry.dispatch(event).await);
        }
        self.registry.flush().await.unwrap();
        decisions
    }

    pub fn validity(&self, breakpoint: &Breakpoint) -> (Validity, Option<String>) {
        self.registry
            .engine(breakpoint.id())
            .map(|e| e.validity())
            .unwrap_or((Validity::Unknown, None))
    }
}
