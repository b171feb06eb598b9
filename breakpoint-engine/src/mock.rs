// Test doubles
//
// `MockVm` is a deterministic in-memory VM behind the request facade. It keeps
// JDWP's count-filter semantics: a counted request reports once, on the Nth
// matching occurrence, and then expires. Trigger methods return the events
// the VM would deliver, for the caller to dispatch.

use crate::condition::{CompiledCondition, ConditionEvaluator};
use crate::error::{EvaluationError, TransportError, TransportResult};
use crate::event::{
    BreakpointHit, BreakpointListener, Event, EventDetails, EventKind, HitCountChanged,
    HitResponse, ValidityChanged,
};
use crate::facade::{RemoteRequestFacade, RequestFilter, RequestKey, RequestTarget, StepRequest};
use crate::spec::{SpecId, SuspendPolicy};
use crate::types::{
    class_pattern_matches, Capabilities, FieldId, FieldInfo, LoadedType, Location, MethodId,
    MethodInfo, ObjectId, ReferenceTypeId, StackFrame, ThreadId, Value,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MockMethod {
    pub info: MethodInfo,
    /// (line, bytecode index) pairs
    pub lines: Vec<(i32, u64)>,
}

impl MockMethod {
    fn first_index(&self) -> Option<u64> {
        self.lines.iter().map(|(_, idx)| *idx).min()
    }
}

#[derive(Debug, Clone)]
pub struct MockClass {
    pub ty: LoadedType,
    pub superclass: Option<ReferenceTypeId>,
    pub methods: Vec<MockMethod>,
    pub fields: Vec<FieldInfo>,
}

impl MockClass {
    pub fn new(id: ReferenceTypeId, name: impl Into<String>) -> Self {
        Self {
            ty: LoadedType::new(id, name),
            superclass: None,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: ReferenceTypeId) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Add a method; a method without lines has no code
    pub fn method(
        mut self,
        id: MethodId,
        name: impl Into<String>,
        signature: impl Into<String>,
        lines: &[(i32, u64)],
    ) -> Self {
        self.methods.push(MockMethod {
            info: MethodInfo {
                id,
                name: name.into(),
                signature: signature.into(),
                has_code: !lines.is_empty(),
            },
            lines: lines.to_vec(),
        });
        self
    }

    pub fn field(mut self, id: FieldId, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.fields.push(FieldInfo {
            id,
            name: name.into(),
            signature: signature.into(),
        });
        self
    }

    /// Lowest location of `line`, in whichever method holds it first
    pub fn location(&self, line: i32) -> Option<Location> {
        self.methods.iter().find_map(|m| {
            m.lines
                .iter()
                .filter(|(l, _)| *l == line)
                .map(|(_, idx)| *idx)
                .min()
                .map(|idx| Location::new(self.ty.id, m.info.id, idx))
        })
    }
}

#[derive(Debug, Clone)]
pub struct MockRequest {
    pub target: RequestTarget,
    pub filters: Vec<RequestFilter>,
    pub suspend: SuspendPolicy,
    pub count: Option<i32>,
    pub enabled: bool,
    occurrences: i32,
    expired: bool,
}

#[derive(Default)]
struct VmState {
    next_request: u64,
    requests: BTreeMap<RequestKey, MockRequest>,
    classes: Vec<MockClass>,
    capabilities: Capabilities,
    dead: HashSet<ThreadId>,
    frames: HashMap<ThreadId, StackFrame>,
    steps: Vec<StepRequest>,
    rejections: HashMap<EventKind, TransportError>,
    disconnected: bool,
}

impl VmState {
    fn class(&self, id: ReferenceTypeId) -> Option<&MockClass> {
        self.classes.iter().find(|c| c.ty.id == id)
    }

    fn class_name(&self, id: ReferenceTypeId) -> Option<String> {
        self.class(id).map(|c| c.ty.name.clone())
    }

    fn is_subclass(&self, id: ReferenceTypeId, ancestor: ReferenceTypeId) -> bool {
        let mut current = Some(id);
        while let Some(ty) = current {
            if ty == ancestor {
                return true;
            }
            current = self.class(ty).and_then(|c| c.superclass);
        }
        false
    }

    fn check(&self) -> TransportResult<()> {
        if self.disconnected {
            Err(TransportError::VmDisconnected)
        } else {
            Ok(())
        }
    }

    fn request(&mut self, key: RequestKey) -> TransportResult<&mut MockRequest> {
        self.check()?;
        self.requests
            .get_mut(&key)
            .ok_or(TransportError::UnknownRequest(key))
    }
}

/// Where an occurrence happens, as seen by request filters
struct Occurrence {
    thread: Option<ThreadId>,
    location: Option<Location>,
    /// Class the class filters apply to
    class: Option<(ReferenceTypeId, String)>,
}

#[derive(Default)]
pub struct MockVm {
    state: Mutex<VmState>,
}

impl MockVm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Load a class; returns the class prepare events
    pub fn load_class(&self, class: MockClass) -> Vec<Event> {
        let loaded = class.ty.clone();
        self.state.lock().classes.push(class);
        let occurrence = Occurrence {
            thread: Some(1),
            location: None,
            class: Some((loaded.id, loaded.name.clone())),
        };
        self.fire(
            occurrence,
            |t| matches!(t, RequestTarget::ClassPrepare),
            EventDetails::ClassPrepare { loaded },
        )
    }

    pub fn unload_class(&self, name: &str) -> Vec<Event> {
        let unloaded = {
            let mut state = self.state.lock();
            let before = state.classes.len();
            state.classes.retain(|c| c.ty.name != name);
            before != state.classes.len()
        };
        if !unloaded {
            return Vec::new();
        }
        let occurrence = Occurrence {
            thread: None,
            location: None,
            class: Some((0, name.to_string())),
        };
        self.fire(
            occurrence,
            |t| matches!(t, RequestTarget::ClassUnload),
            EventDetails::ClassUnload {
                name: name.to_string(),
            },
        )
    }

    /// Execute the code at `location`
    pub fn hit(&self, thread: ThreadId, location: Location) -> Vec<Event> {
        let occurrence = self.occurrence(thread, location);
        self.fire(
            occurrence,
            |t| *t == RequestTarget::Breakpoint(location),
            EventDetails::Breakpoint,
        )
    }

    /// Call a method: entry requests plus breakpoints on its first location
    pub fn enter_method(&self, thread: ThreadId, type_id: ReferenceTypeId, method_id: MethodId) -> Vec<Event> {
        let first = {
            let state = self.state.lock();
            state
                .class(type_id)
                .and_then(|c| c.methods.iter().find(|m| m.info.id == method_id))
                .and_then(MockMethod::first_index)
        };
        let location = Location::new(type_id, method_id, first.unwrap_or(0));
        let mut events = match first {
            Some(_) => self.hit(thread, location),
            None => Vec::new(),
        };
        let occurrence = self.occurrence(thread, location);
        events.extend(self.fire(
            occurrence,
            |t| matches!(t, RequestTarget::MethodEntry),
            EventDetails::MethodEntry,
        ));
        events
    }

    pub fn exit_method(
        &self,
        thread: ThreadId,
        type_id: ReferenceTypeId,
        method_id: MethodId,
        return_value: Value,
    ) -> Vec<Event> {
        let occurrence = self.occurrence(thread, Location::new(type_id, method_id, 0));
        self.fire(
            occurrence,
            |t| matches!(t, RequestTarget::MethodExit),
            EventDetails::MethodExit {
                return_value: Some(return_value),
            },
        )
    }

    pub fn access_field(
        &self,
        thread: ThreadId,
        type_id: ReferenceTypeId,
        field_id: FieldId,
        value: Value,
    ) -> Vec<Event> {
        let occurrence = self.occurrence(thread, Location::new(type_id, 0, 0));
        self.fire(
            occurrence,
            |t| *t == RequestTarget::FieldAccess { type_id, field_id },
            EventDetails::FieldAccess {
                type_id,
                field_id,
                object: None,
                value: Some(value),
            },
        )
    }

    pub fn modify_field(
        &self,
        thread: ThreadId,
        type_id: ReferenceTypeId,
        field_id: FieldId,
        value_to_be: Value,
    ) -> Vec<Event> {
        let occurrence = self.occurrence(thread, Location::new(type_id, 0, 0));
        self.fire(
            occurrence,
            |t| *t == RequestTarget::FieldModification { type_id, field_id },
            EventDetails::FieldModification {
                type_id,
                field_id,
                object: None,
                value_to_be,
            },
        )
    }

    /// Throw an instance of `exception_type` at `location`
    pub fn throw(
        &self,
        thread: ThreadId,
        location: Location,
        exception: ObjectId,
        exception_type: ReferenceTypeId,
        caught: bool,
    ) -> Vec<Event> {
        let (type_name, matching): (Option<String>, Vec<ReferenceTypeId>) = {
            let state = self.state.lock();
            let types = state
                .classes
                .iter()
                .map(|c| c.ty.id)
                .filter(|id| state.is_subclass(exception_type, *id))
                .collect();
            (state.class_name(exception_type), types)
        };
        let occurrence = self.occurrence(thread, location);
        self.fire(
            occurrence,
            |t| match t {
                RequestTarget::Exception {
                    type_id,
                    caught: c,
                    uncaught: u,
                } => {
                    let type_matches = type_id.map_or(true, |id| matching.contains(&id));
                    type_matches && ((caught && *c) || (!caught && *u))
                }
                _ => false,
            },
            EventDetails::Exception {
                exception,
                exception_type: type_name,
                catch_location: None,
            },
        )
    }

    pub fn start_thread(&self, thread: ThreadId) -> Vec<Event> {
        let occurrence = Occurrence {
            thread: Some(thread),
            location: None,
            class: None,
        };
        self.fire(
            occurrence,
            |t| matches!(t, RequestTarget::ThreadStart),
            EventDetails::ThreadStart,
        )
    }

    pub fn end_thread(&self, thread: ThreadId) -> Vec<Event> {
        let occurrence = Occurrence {
            thread: Some(thread),
            location: None,
            class: None,
        };
        let events = self.fire(
            occurrence,
            |t| matches!(t, RequestTarget::ThreadDeath),
            EventDetails::ThreadDeath,
        );
        self.kill_thread(thread);
        events
    }

    pub fn kill_thread(&self, thread: ThreadId) {
        self.state.lock().dead.insert(thread);
    }

    pub fn set_frame(&self, frame: StackFrame) {
        self.state.lock().frames.insert(frame.thread, frame);
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.state.lock().capabilities = capabilities;
    }

    /// Fail every future creation of requests of `kind`
    pub fn reject(&self, kind: EventKind, error: TransportError) {
        self.state.lock().rejections.insert(kind, error);
    }

    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }

    pub fn add_step(&self, thread: ThreadId) -> RequestKey {
        let mut state = self.state.lock();
        state.next_request += 1;
        let key = RequestKey(state.next_request);
        state.steps.push(StepRequest { key, thread });
        key
    }

    pub fn steps(&self) -> Vec<StepRequest> {
        self.state.lock().steps.clone()
    }

    /// Every request that still exists
    pub fn requests(&self) -> Vec<(RequestKey, MockRequest)> {
        self.state
            .lock()
            .requests
            .iter()
            .map(|(k, r)| (*k, r.clone()))
            .collect()
    }

    pub fn request(&self, key: RequestKey) -> Option<MockRequest> {
        self.state.lock().requests.get(&key).cloned()
    }

    /// Enabled requests of one kind
    pub fn enabled(&self, kind: EventKind) -> usize {
        self.state
            .lock()
            .requests
            .values()
            .filter(|r| r.enabled && r.target.kind() == kind)
            .count()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    fn occurrence(&self, thread: ThreadId, location: Location) -> Occurrence {
        let state = self.state.lock();
        Occurrence {
            thread: Some(thread),
            location: Some(location),
            class: state
                .class_name(location.type_id)
                .map(|name| (location.type_id, name)),
        }
    }

    fn fire(
        &self,
        occurrence: Occurrence,
        matches: impl Fn(&RequestTarget) -> bool,
        details: EventDetails,
    ) -> Vec<Event> {
        let mut state = self.state.lock();
        let this = occurrence
            .thread
            .and_then(|t| state.frames.get(&t))
            .and_then(|f| f.this_object);

        let mut events = Vec::new();
        for (key, request) in state.requests.iter_mut() {
            if !request.enabled || request.expired || !matches(&request.target) {
                continue;
            }
            let passes = request.filters.iter().all(|filter| match filter {
                RequestFilter::ClassMatch(p) => occurrence
                    .class
                    .as_ref()
                    .is_some_and(|(_, name)| class_pattern_matches(p, name)),
                RequestFilter::ClassExclude(p) => !occurrence
                    .class
                    .as_ref()
                    .is_some_and(|(_, name)| class_pattern_matches(p, name)),
                RequestFilter::ClassOnly(id) => occurrence.class.as_ref().is_some_and(|(c, _)| c == id),
                RequestFilter::Thread(t) => occurrence.thread == Some(*t),
                RequestFilter::Instance(o) => this == Some(*o),
            });
            if !passes {
                continue;
            }

            request.occurrences += 1;
            if let Some(count) = request.count {
                if request.occurrences < count {
                    continue;
                }
                request.expired = true;
            }
            events.push(Event {
                request: *key,
                thread: occurrence.thread,
                location: occurrence.location,
                details: details.clone(),
            });
        }
        events
    }
}

#[async_trait]
impl RemoteRequestFacade for MockVm {
    async fn create_request(&self, target: RequestTarget) -> TransportResult<RequestKey> {
        let mut state = self.state.lock();
        state.check()?;
        if let Some(error) = state.rejections.get(&target.kind()) {
            return Err(error.clone());
        }
        state.next_request += 1;
        let key = RequestKey(state.next_request);
        state.requests.insert(
            key,
            MockRequest {
                target,
                filters: Vec::new(),
                suspend: SuspendPolicy::All,
                count: None,
                enabled: false,
                occurrences: 0,
                expired: false,
            },
        );
        Ok(key)
    }

    async fn add_filter(&self, request: RequestKey, filter: RequestFilter) -> TransportResult<()> {
        self.state.lock().request(request)?.filters.push(filter);
        Ok(())
    }

    async fn set_count_filter(&self, request: RequestKey, count: i32) -> TransportResult<()> {
        if count <= 0 {
            return Err(TransportError::InvalidRequest(format!("count {}", count)));
        }
        self.state.lock().request(request)?.count = Some(count);
        Ok(())
    }

    async fn set_suspend_policy(
        &self,
        request: RequestKey,
        policy: SuspendPolicy,
    ) -> TransportResult<()> {
        self.state.lock().request(request)?.suspend = policy;
        Ok(())
    }

    async fn enable(&self, request: RequestKey) -> TransportResult<()> {
        self.state.lock().request(request)?.enabled = true;
        Ok(())
    }

    async fn disable(&self, request: RequestKey) -> TransportResult<()> {
        self.state.lock().request(request)?.enabled = false;
        Ok(())
    }

    async fn delete(&self, request: RequestKey) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.check()?;
        let before = state.steps.len();
        state.steps.retain(|s| s.key != request);
        if state.requests.remove(&request).is_none() && before == state.steps.len() {
            return Err(TransportError::UnknownRequest(request));
        }
        Ok(())
    }

    async fn loaded_classes(&self, pattern: &str) -> TransportResult<Vec<LoadedType>> {
        let state = self.state.lock();
        state.check()?;
        Ok(state
            .classes
            .iter()
            .filter(|c| class_pattern_matches(pattern, &c.ty.name))
            .map(|c| c.ty.clone())
            .collect())
    }

    async fn line_locations(
        &self,
        type_id: ReferenceTypeId,
        line: i32,
    ) -> TransportResult<Vec<Location>> {
        let state = self.state.lock();
        state.check()?;
        let class = state
            .class(type_id)
            .ok_or_else(|| TransportError::InvalidRequest(format!("unknown type {}", type_id)))?;
        Ok(class
            .methods
            .iter()
            .filter_map(|m| {
                m.lines
                    .iter()
                    .filter(|(l, _)| *l == line)
                    .map(|(_, idx)| *idx)
                    .min()
                    .map(|idx| Location::new(type_id, m.info.id, idx))
            })
            .collect())
    }

    async fn line_numbers(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<i32>> {
        let state = self.state.lock();
        state.check()?;
        let class = state
            .class(type_id)
            .ok_or_else(|| TransportError::InvalidRequest(format!("unknown type {}", type_id)))?;
        let mut lines: Vec<i32> = class
            .methods
            .iter()
            .flat_map(|m| m.lines.iter().map(|(l, _)| *l))
            .collect();
        lines.sort_unstable();
        lines.dedup();
        Ok(lines)
    }

    async fn methods(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<MethodInfo>> {
        let state = self.state.lock();
        state.check()?;
        Ok(state
            .class(type_id)
            .map(|c| c.methods.iter().map(|m| m.info.clone()).collect())
            .unwrap_or_default())
    }

    async fn method_location(
        &self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> TransportResult<Option<Location>> {
        let state = self.state.lock();
        state.check()?;
        Ok(state
            .class(type_id)
            .and_then(|c| c.methods.iter().find(|m| m.info.id == method_id))
            .and_then(MockMethod::first_index)
            .map(|idx| Location::new(type_id, method_id, idx)))
    }

    async fn fields(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<FieldInfo>> {
        let state = self.state.lock();
        state.check()?;
        Ok(state
            .class(type_id)
            .map(|c| c.fields.clone())
            .unwrap_or_default())
    }

    async fn capabilities(&self) -> TransportResult<Capabilities> {
        let state = self.state.lock();
        state.check()?;
        Ok(state.capabilities)
    }

    async fn is_thread_alive(&self, thread: ThreadId) -> TransportResult<bool> {
        let state = self.state.lock();
        state.check()?;
        Ok(!state.dead.contains(&thread))
    }

    async fn top_frame(&self, thread: ThreadId) -> TransportResult<StackFrame> {
        let state = self.state.lock();
        state.check()?;
        if state.dead.contains(&thread) {
            return Err(TransportError::ThreadDead(thread));
        }
        Ok(state.frames.get(&thread).cloned().unwrap_or(StackFrame {
            id: thread,
            thread,
            location: Location::new(0, 0, 0),
            this_object: None,
        }))
    }

    async fn step_requests(&self) -> TransportResult<Vec<StepRequest>> {
        let state = self.state.lock();
        state.check()?;
        Ok(state.steps.clone())
    }
}

#[derive(Debug, Clone)]
enum Script {
    Value(bool),
    Sequence(VecDeque<bool>),
    Fail(String),
}

#[derive(Default)]
struct EvaluatorState {
    scripts: Mutex<HashMap<String, Script>>,
    compile_errors: Mutex<HashMap<String, String>>,
    evaluations: AtomicUsize,
}

/// Condition evaluator with scripted results per expression
#[derive(Default, Clone)]
pub struct MockEvaluator {
    state: Arc<EvaluatorState>,
}

impl MockEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn returns(&self, expression: &str, value: bool) {
        self.script(expression, Script::Value(value));
    }

    /// Results for successive evaluations; false once exhausted
    pub fn sequence(&self, expression: &str, values: &[bool]) {
        self.script(expression, Script::Sequence(values.iter().copied().collect()));
    }

    pub fn fails(&self, expression: &str, message: &str) {
        self.script(expression, Script::Fail(message.to_string()));
    }

    pub fn rejects(&self, expression: &str, message: &str) {
        self.state
            .compile_errors
            .lock()
            .insert(expression.to_string(), message.to_string());
    }

    pub fn evaluations(&self) -> usize {
        self.state.evaluations.load(Ordering::SeqCst)
    }

    fn script(&self, expression: &str, script: Script) {
        self.state
            .scripts
            .lock()
            .insert(expression.to_string(), script);
    }
}

struct ScriptedCondition {
    expression: String,
    state: Arc<EvaluatorState>,
}

impl std::fmt::Debug for ScriptedCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedCondition")
            .field("expression", &self.expression)
            .finish()
    }
}

#[async_trait]
impl CompiledCondition for ScriptedCondition {
    async fn evaluate(&self, _frame: &StackFrame) -> Result<bool, EvaluationError> {
        self.state.evaluations.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.state.scripts.lock();
        match scripts.get_mut(&self.expression) {
            Some(Script::Value(value)) => Ok(*value),
            Some(Script::Sequence(values)) => Ok(values.pop_front().unwrap_or(false)),
            Some(Script::Fail(message)) => Err(EvaluationError::Failed(message.clone())),
            None => Err(EvaluationError::Failed(format!(
                "no result scripted for `{}`",
                self.expression
            ))),
        }
    }
}

impl ConditionEvaluator for MockEvaluator {
    fn compile(&self, expression: &str) -> Result<Arc<dyn CompiledCondition>, EvaluationError> {
        if let Some(message) = self.state.compile_errors.lock().get(expression) {
            return Err(EvaluationError::Compile {
                expression: expression.to_string(),
                message: message.clone(),
            });
        }
        Ok(Arc::new(ScriptedCondition {
            expression: expression.to_string(),
            state: self.state.clone(),
        }))
    }
}

/// Listener recording every notification
#[derive(Default)]
pub struct RecordingListener {
    hits: Mutex<Vec<BreakpointHit>>,
    hit_counts: Mutex<Vec<HitCountChanged>>,
    validity: Mutex<Vec<ValidityChanged>>,
    resume: AtomicBool,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A listener that asks every hit to resume
    pub fn resuming() -> Arc<Self> {
        let listener = Self::default();
        listener.resume.store(true, Ordering::SeqCst);
        Arc::new(listener)
    }

    pub fn hits(&self) -> Vec<BreakpointHit> {
        self.hits.lock().clone()
    }

    pub fn hits_of(&self, id: SpecId) -> Vec<BreakpointHit> {
        self.hits
            .lock()
            .iter()
            .filter(|h| h.breakpoint == id)
            .cloned()
            .collect()
    }

    pub fn hit_counts(&self) -> Vec<HitCountChanged> {
        self.hit_counts.lock().clone()
    }

    pub fn validity_changes(&self) -> Vec<ValidityChanged> {
        self.validity.lock().clone()
    }

    pub fn last_validity(&self, id: SpecId) -> Option<ValidityChanged> {
        self.validity
            .lock()
            .iter()
            .rev()
            .find(|v| v.breakpoint == id)
            .cloned()
    }

    pub fn clear(&self) {
        self.hits.lock().clear();
        self.hit_counts.lock().clear();
        self.validity.lock().clear();
    }
}

impl BreakpointListener for RecordingListener {
    fn breakpoint_hit(&self, hit: &BreakpointHit) -> HitResponse {
        self.hits.lock().push(hit.clone());
        if self.resume.load(Ordering::SeqCst) {
            HitResponse::Resume
        } else {
            HitResponse::Default
        }
    }

    fn hit_count_changed(&self, change: &HitCountChanged) {
        self.hit_counts.lock().push(change.clone());
    }

    fn validity_changed(&self, change: &ValidityChanged) {
        self.validity.lock().push(change.clone());
    }
}
