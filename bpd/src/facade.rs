// JDWP request facade
//
// Implements the engine's request facade over a live JDWP connection.
// Requests are assembled locally and sent as one EventRequest.Set on enable;
// incoming events are translated back to engine events by request id.

use async_trait::async_trait;
use breakpoint_engine::facade::StepRequest;
use breakpoint_engine::types::{
    class_pattern_matches, is_pattern, name_to_signature, signature_to_name, Capabilities,
    FieldInfo, LoadedType, Location, MethodId, MethodInfo, ReferenceTypeId, StackFrame, ThreadId,
    Value,
};
use breakpoint_engine::{
    Event, EventDetails, RemoteRequestFacade, RequestFilter, RequestKey, RequestTarget,
    SuspendPolicy, TransportError, TransportResult,
};
use jdwp_client::commands::event_kinds;
use jdwp_client::method::LineTable;
use jdwp_client::protocol::error_codes;
use jdwp_client::types::{tags, TaggedObject, ValueData};
use jdwp_client::{EventKind, EventModifier, JdwpConnection, JdwpError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A request as the engine built it, plus its VM id once enabled
#[derive(Debug, Clone)]
struct PendingRequest {
    event_kind: u8,
    modifiers: Vec<EventModifier>,
    count: Option<i32>,
    suspend: SuspendPolicy,
    live: Option<i32>,
}

impl PendingRequest {
    /// Filters in the order they were added, Count last so it counts filtered events only
    fn wire_modifiers(&self) -> Vec<EventModifier> {
        let mut modifiers = self.modifiers.clone();
        if let Some(count) = self.count {
            modifiers.push(EventModifier::Count(count));
        }
        modifiers
    }
}

/// Line table of one method, `None` for methods without code or debug info
#[derive(Debug)]
struct MethodLines {
    info: MethodInfo,
    table: Option<LineTable>,
}

pub struct JdwpFacade {
    conn: JdwpConnection,
    capabilities: Capabilities,
    can_use_instance_filters: bool,
    method_exit_kind: u8,
    next_key: AtomicU64,
    requests: Mutex<HashMap<RequestKey, PendingRequest>>,
    by_request_id: Mutex<HashMap<i32, RequestKey>>,
    type_tags: Mutex<HashMap<ReferenceTypeId, u8>>,
    lines: Mutex<HashMap<ReferenceTypeId, Arc<Vec<MethodLines>>>>,
}

/// Map a JDWP failure onto the engine's error policy classes
pub fn transport_error(err: JdwpError) -> TransportError {
    if err.is_disconnect() {
        TransportError::VmDisconnected
    } else if err.is_not_implemented() {
        TransportError::Unsupported(err.to_string())
    } else if err.is_rejected() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

fn thread_error(thread: ThreadId, err: JdwpError) -> TransportError {
    if err.is_invalid_thread() || err.is_invalid_object() {
        TransportError::ThreadDead(thread)
    } else {
        transport_error(err)
    }
}

fn suspend_policy(policy: SuspendPolicy) -> jdwp_client::SuspendPolicy {
    match policy {
        SuspendPolicy::All => jdwp_client::SuspendPolicy::All,
        SuspendPolicy::EventThread => jdwp_client::SuspendPolicy::EventThread,
        SuspendPolicy::None => jdwp_client::SuspendPolicy::None,
    }
}

fn engine_location(location: &jdwp_client::types::Location) -> Location {
    Location::new(location.class_id, location.method_id, location.index)
}

fn non_null(object: &TaggedObject) -> Option<u64> {
    (object.id != 0).then_some(object.id)
}

pub fn engine_value(value: &jdwp_client::types::Value) -> Value {
    match value.data {
        ValueData::Byte(v) => Value::Byte(v),
        ValueData::Char(v) => Value::Char(v),
        ValueData::Float(v) => Value::Float(v),
        ValueData::Double(v) => Value::Double(v),
        ValueData::Int(v) => Value::Int(v),
        ValueData::Long(v) => Value::Long(v),
        ValueData::Short(v) => Value::Short(v),
        ValueData::Boolean(v) => Value::Boolean(v),
        ValueData::Void => Value::Void,
        ValueData::Object(0) => Value::Null,
        ValueData::Object(id) => Value::Object {
            id,
            type_name: (value.tag == tags::STRING).then(|| "java.lang.String".to_string()),
        },
    }
}

impl JdwpFacade {
    /// Query the VM once for what request kinds it supports
    pub async fn attach(conn: JdwpConnection) -> Result<Arc<Self>, JdwpError> {
        let sizes = conn.id_sizes().await?;
        if !sizes.all_eight_bytes() {
            return Err(JdwpError::Protocol(format!(
                "unsupported identifier sizes: {:?}",
                sizes
            )));
        }
        let version = conn.version().await?;
        let vm = conn.capabilities().await?;
        info!(
            vm = %version.vm_name,
            version = %version.vm_version,
            jdwp = %format!("{}.{}", version.jdwp_major, version.jdwp_minor),
            "attached"
        );

        let capabilities = Capabilities {
            can_watch_field_access: vm.can_watch_field_access,
            can_watch_field_modification: vm.can_watch_field_modification,
            can_get_method_return_values: version.supports_return_values(),
        };
        let method_exit_kind = if capabilities.can_get_method_return_values {
            event_kinds::METHOD_EXIT_WITH_RETURN_VALUE
        } else {
            event_kinds::METHOD_EXIT
        };

        Ok(Arc::new(Self {
            conn,
            capabilities,
            can_use_instance_filters: vm.can_use_instance_filters,
            method_exit_kind,
            next_key: AtomicU64::new(1),
            requests: Mutex::new(HashMap::new()),
            by_request_id: Mutex::new(HashMap::new()),
            type_tags: Mutex::new(HashMap::new()),
            lines: Mutex::new(HashMap::new()),
        }))
    }

    pub fn connection(&self) -> &JdwpConnection {
        &self.conn
    }

    fn wire_location(&self, location: &Location) -> jdwp_client::types::Location {
        let type_tag = self
            .type_tags
            .lock()
            .get(&location.type_id)
            .copied()
            .unwrap_or(1);
        jdwp_client::types::Location {
            type_tag,
            class_id: location.type_id,
            method_id: location.method_id,
            index: location.index,
        }
    }

    fn with_request<R>(
        &self,
        key: RequestKey,
        f: impl FnOnce(&mut PendingRequest) -> TransportResult<R>,
    ) -> TransportResult<R> {
        let mut requests = self.requests.lock();
        let request = requests
            .get_mut(&key)
            .ok_or(TransportError::UnknownRequest(key))?;
        if request.live.is_some() {
            return Err(TransportError::InvalidRequest(format!(
                "{} is already enabled",
                key
            )));
        }
        f(request)
    }

    /// Translate a wire event into an engine event. `None` for events no
    /// request of ours produced (VM start/death, foreign requests).
    pub async fn translate(&self, event: &jdwp_client::Event) -> Option<Event> {
        let request = *self.by_request_id.lock().get(&event.request_id)?;
        let details = match &event.details {
            EventKind::Breakpoint { .. } => EventDetails::Breakpoint,
            EventKind::Step { .. } => EventDetails::SingleStep,
            EventKind::MethodEntry { .. } => EventDetails::MethodEntry,
            EventKind::MethodExit { return_value, .. } => EventDetails::MethodExit {
                return_value: return_value.as_ref().map(engine_value),
            },
            EventKind::FieldAccess {
                type_id,
                field_id,
                object,
                ..
            } => EventDetails::FieldAccess {
                type_id: *type_id,
                field_id: *field_id,
                object: non_null(object),
                value: None,
            },
            EventKind::FieldModification {
                type_id,
                field_id,
                object,
                value_to_be,
                ..
            } => EventDetails::FieldModification {
                type_id: *type_id,
                field_id: *field_id,
                object: non_null(object),
                value_to_be: engine_value(value_to_be),
            },
            EventKind::Exception {
                exception,
                catch_location,
                ..
            } => {
                let exception_type = match self.conn.type_name_of(exception.id).await {
                    Ok(name) => Some(name),
                    Err(e) => {
                        debug!(error = %e, "exception type lookup failed");
                        None
                    }
                };
                EventDetails::Exception {
                    exception: exception.id,
                    exception_type,
                    catch_location: catch_location.as_ref().map(engine_location),
                }
            }
            EventKind::ClassPrepare {
                type_tag,
                type_id,
                signature,
                ..
            } => {
                self.type_tags.lock().insert(*type_id, *type_tag);
                EventDetails::ClassPrepare {
                    loaded: LoadedType::from_signature(*type_id, signature),
                }
            }
            EventKind::ClassUnload { signature } => EventDetails::ClassUnload {
                name: signature_to_name(signature),
            },
            EventKind::ThreadStart { .. } => EventDetails::ThreadStart,
            EventKind::ThreadDeath { .. } => EventDetails::ThreadDeath,
            EventKind::VMStart { .. } | EventKind::VMDeath => return None,
        };

        Some(Event {
            request,
            thread: event.details.thread(),
            location: event.details.location().as_ref().map(engine_location),
            details,
        })
    }

    async fn type_lines(&self, type_id: ReferenceTypeId) -> TransportResult<Arc<Vec<MethodLines>>> {
        if let Some(lines) = self.lines.lock().get(&type_id) {
            return Ok(lines.clone());
        }

        let methods = self.conn.methods(type_id).await.map_err(transport_error)?;
        let mut result = Vec::with_capacity(methods.len());
        for method in methods {
            let has_code = method.has_code();
            let table = if has_code {
                match self.conn.line_table(type_id, method.method_id).await {
                    Ok(table) => Some(table),
                    Err(e)
                        if matches!(
                            e.code(),
                            Some(error_codes::ABSENT_INFORMATION | error_codes::NATIVE_METHOD)
                        ) =>
                    {
                        None
                    }
                    Err(e) => return Err(transport_error(e)),
                }
            } else {
                None
            };
            result.push(MethodLines {
                info: MethodInfo {
                    id: method.method_id,
                    name: method.name,
                    signature: method.signature,
                    has_code,
                },
                table,
            });
        }

        let result = Arc::new(result);
        self.lines.lock().insert(type_id, result.clone());
        Ok(result)
    }
}

#[async_trait]
impl RemoteRequestFacade for JdwpFacade {
    async fn create_request(&self, target: RequestTarget) -> TransportResult<RequestKey> {
        let (event_kind, modifiers) = match &target {
            RequestTarget::Breakpoint(location) => (
                event_kinds::BREAKPOINT,
                vec![EventModifier::LocationOnly(self.wire_location(location))],
            ),
            RequestTarget::MethodEntry => (event_kinds::METHOD_ENTRY, Vec::new()),
            RequestTarget::MethodExit => (self.method_exit_kind, Vec::new()),
            RequestTarget::FieldAccess { type_id, field_id } => (
                event_kinds::FIELD_ACCESS,
                vec![EventModifier::FieldOnly {
                    ref_type: *type_id,
                    field_id: *field_id,
                }],
            ),
            RequestTarget::FieldModification { type_id, field_id } => (
                event_kinds::FIELD_MODIFICATION,
                vec![EventModifier::FieldOnly {
                    ref_type: *type_id,
                    field_id: *field_id,
                }],
            ),
            RequestTarget::Exception {
                type_id,
                caught,
                uncaught,
            } => (
                event_kinds::EXCEPTION,
                vec![EventModifier::ExceptionOnly {
                    ref_type: type_id.unwrap_or(0),
                    caught: *caught,
                    uncaught: *uncaught,
                }],
            ),
            RequestTarget::ClassPrepare => (event_kinds::CLASS_PREPARE, Vec::new()),
            RequestTarget::ClassUnload => (event_kinds::CLASS_UNLOAD, Vec::new()),
            RequestTarget::ThreadStart => (event_kinds::THREAD_START, Vec::new()),
            RequestTarget::ThreadDeath => (event_kinds::THREAD_DEATH, Vec::new()),
        };

        let key = RequestKey(self.next_key.fetch_add(1, Ordering::SeqCst));
        self.requests.lock().insert(
            key,
            PendingRequest {
                event_kind,
                modifiers,
                count: None,
                suspend: SuspendPolicy::All,
                live: None,
            },
        );
        Ok(key)
    }

    async fn add_filter(&self, request: RequestKey, filter: RequestFilter) -> TransportResult<()> {
        let modifier = match filter {
            RequestFilter::ClassMatch(pattern) => EventModifier::ClassMatch(pattern),
            RequestFilter::ClassExclude(pattern) => EventModifier::ClassExclude(pattern),
            RequestFilter::ClassOnly(type_id) => EventModifier::ClassOnly(type_id),
            RequestFilter::Thread(thread) => EventModifier::ThreadOnly(thread),
            RequestFilter::Instance(object) => {
                if !self.can_use_instance_filters {
                    return Err(TransportError::Unsupported("instance filters".into()));
                }
                EventModifier::InstanceOnly(object)
            }
        };
        self.with_request(request, |pending| {
            pending.modifiers.push(modifier);
            Ok(())
        })
    }

    async fn set_count_filter(&self, request: RequestKey, count: i32) -> TransportResult<()> {
        if count <= 0 {
            return Err(TransportError::InvalidRequest(format!(
                "count filter must be positive, got {}",
                count
            )));
        }
        self.with_request(request, |pending| {
            pending.count = Some(count);
            Ok(())
        })
    }

    async fn set_suspend_policy(
        &self,
        request: RequestKey,
        policy: SuspendPolicy,
    ) -> TransportResult<()> {
        self.with_request(request, |pending| {
            pending.suspend = policy;
            Ok(())
        })
    }

    async fn enable(&self, request: RequestKey) -> TransportResult<()> {
        let pending = self
            .requests
            .lock()
            .get(&request)
            .cloned()
            .ok_or(TransportError::UnknownRequest(request))?;
        if pending.live.is_some() {
            return Ok(());
        }

        let id = self
            .conn
            .set_event_request(
                pending.event_kind,
                suspend_policy(pending.suspend),
                &pending.wire_modifiers(),
            )
            .await
            .map_err(transport_error)?;

        let stale = {
            let mut requests = self.requests.lock();
            match requests.get_mut(&request) {
                Some(entry) => {
                    entry.live = Some(id);
                    self.by_request_id.lock().insert(id, request);
                    false
                }
                None => true,
            }
        };
        if stale {
            // Deleted while the Set was in flight
            self.conn
                .clear_event_request(pending.event_kind, id)
                .await
                .map_err(transport_error)?;
        }
        debug!(%request, id, kind = pending.event_kind, "request enabled");
        Ok(())
    }

    async fn disable(&self, request: RequestKey) -> TransportResult<()> {
        let (event_kind, live) = {
            let mut requests = self.requests.lock();
            let pending = requests
                .get_mut(&request)
                .ok_or(TransportError::UnknownRequest(request))?;
            (pending.event_kind, pending.live.take())
        };
        let Some(id) = live else {
            return Ok(());
        };
        self.by_request_id.lock().remove(&id);
        match self.conn.clear_event_request(event_kind, id).await {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some(error_codes::NOT_FOUND) => Ok(()),
            Err(e) => Err(transport_error(e)),
        }
    }

    async fn delete(&self, request: RequestKey) -> TransportResult<()> {
        self.disable(request).await?;
        self.requests.lock().remove(&request);
        Ok(())
    }

    async fn loaded_classes(&self, pattern: &str) -> TransportResult<Vec<LoadedType>> {
        let classes = if is_pattern(pattern) {
            self.conn.all_classes().await
        } else {
            self.conn.classes_by_signature(&name_to_signature(pattern)).await
        }
        .map_err(transport_error)?;

        let mut tags = self.type_tags.lock();
        Ok(classes
            .into_iter()
            .filter(|class| class.is_prepared() && class.ref_type_tag != 3)
            .map(|class| {
                tags.insert(class.type_id, class.ref_type_tag);
                LoadedType::from_signature(class.type_id, &class.signature)
            })
            .filter(|loaded| class_pattern_matches(pattern, &loaded.name))
            .collect())
    }

    async fn line_locations(
        &self,
        type_id: ReferenceTypeId,
        line: i32,
    ) -> TransportResult<Vec<Location>> {
        let methods = self.type_lines(type_id).await?;
        Ok(methods
            .iter()
            .filter_map(|method| {
                let index = method.table.as_ref()?.first_index_of(line)?;
                Some(Location::new(type_id, method.info.id, index))
            })
            .collect())
    }

    async fn line_numbers(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<i32>> {
        let methods = self.type_lines(type_id).await?;
        let mut lines: Vec<i32> = methods
            .iter()
            .filter_map(|method| method.table.as_ref())
            .flat_map(|table| table.lines.iter().map(|entry| entry.line_number))
            .collect();
        lines.sort_unstable();
        lines.dedup();
        Ok(lines)
    }

    async fn methods(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<MethodInfo>> {
        let methods = self.type_lines(type_id).await?;
        Ok(methods.iter().map(|method| method.info.clone()).collect())
    }

    async fn method_location(
        &self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> TransportResult<Option<Location>> {
        let methods = self.type_lines(type_id).await?;
        Ok(methods
            .iter()
            .find(|method| method.info.id == method_id)
            .and_then(|method| method.table.as_ref())
            .filter(|table| table.start >= 0)
            .map(|table| Location::new(type_id, method_id, table.start as u64)))
    }

    async fn fields(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<FieldInfo>> {
        let fields = self.conn.fields(type_id).await.map_err(transport_error)?;
        Ok(fields
            .into_iter()
            .map(|field| FieldInfo {
                id: field.field_id,
                name: field.name,
                signature: field.signature,
            })
            .collect())
    }

    async fn capabilities(&self) -> TransportResult<Capabilities> {
        Ok(self.capabilities)
    }

    async fn is_thread_alive(&self, thread: ThreadId) -> TransportResult<bool> {
        match self.conn.thread_status(thread).await {
            Ok(status) => Ok(status.is_alive()),
            Err(e) if e.is_invalid_thread() || e.is_invalid_object() => Ok(false),
            Err(e) => Err(transport_error(e)),
        }
    }

    async fn top_frame(&self, thread: ThreadId) -> TransportResult<StackFrame> {
        let frames = self
            .conn
            .frames(thread, 0, 1)
            .await
            .map_err(|e| thread_error(thread, e))?;
        let Some(frame) = frames.into_iter().next() else {
            return Err(TransportError::ThreadDead(thread));
        };
        let this_object = match self.conn.this_object(thread, frame.frame_id).await {
            Ok(this) => this,
            Err(e) if e.is_invalid_object() => {
                warn!(thread, "this object collected");
                None
            }
            Err(e) => return Err(thread_error(thread, e)),
        };
        Ok(StackFrame {
            id: frame.frame_id,
            thread,
            location: engine_location(&frame.location),
            this_object,
        })
    }

    async fn step_requests(&self) -> TransportResult<Vec<StepRequest>> {
        // The daemon never single-steps
        Ok(Vec::new())
    }
}
