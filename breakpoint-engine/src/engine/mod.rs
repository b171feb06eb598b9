// Breakpoint engine
//
// One engine per breakpoint per session. It owns the breakpoint's live
// low-level requests and drives them through
// Unarmed -> Armed -> (hit)* -> Armed -> ... -> Removed.
// Request creation and teardown, class resolution and event handling all run
// under the engine's request lock, so an event never observes a half-built
// request set.

mod perform;
pub mod state;

use crate::error::{EngineError, ErrorPolicy, TransportResult};
use crate::event::{BreakpointListener, ListenerSet, Validity, ValidityChanged};
use crate::facade::RequestKey;
use crate::resolve::{class_resolving, resolver_for, Anchor, KindResolver, ResolveContext};
use crate::session::DebugSession;
use crate::spec::{Breakpoint, BreakpointSpec, SpecId, SuspendPolicy};
use crate::types::LoadedType;
use parking_lot::Mutex as SyncMutex;
use state::{EngineState, LiveRequest, RequestRecipe, RequestRole};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use perform::HandleOutcome;

pub struct BreakpointEngine {
    me: Weak<BreakpointEngine>,
    breakpoint: Arc<Breakpoint>,
    session: Arc<DebugSession>,
    resolver: Box<dyn KindResolver>,
    state: Mutex<EngineState>,
    validity: SyncMutex<(Validity, Option<String>)>,
    removed: AtomicBool,
    hit_count: AtomicU32,
    listeners: ListenerSet,
}

impl BreakpointEngine {
    pub fn new(breakpoint: Arc<Breakpoint>, session: Arc<DebugSession>) -> Arc<Self> {
        let spec = breakpoint.spec();
        let resolver = resolver_for(&spec.kind);
        let custom = resolver.uses_custom_hit_count(&spec);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            breakpoint,
            session,
            resolver,
            state: Mutex::new(EngineState::new(spec.hit_count, custom)),
            validity: SyncMutex::new((Validity::Unknown, None)),
            removed: AtomicBool::new(false),
            hit_count: AtomicU32::new(0),
            listeners: ListenerSet::new(),
        })
    }

    pub fn id(&self) -> SpecId {
        self.breakpoint.id()
    }

    pub fn breakpoint(&self) -> &Breakpoint {
        &self.breakpoint
    }

    pub fn session(&self) -> &DebugSession {
        &self.session
    }

    pub(crate) fn resolver(&self) -> &dyn KindResolver {
        self.resolver.as_ref()
    }

    pub fn validity(&self) -> (Validity, Option<String>) {
        self.validity.lock().clone()
    }

    /// Number of hits that passed filtering and condition
    pub fn hit_count(&self) -> u32 {
        self.hit_count.load(Ordering::SeqCst)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Listen for this engine's hit count changes only
    pub fn add_hit_count_listener(&self, listener: Arc<dyn BreakpointListener>) {
        self.listeners.add(listener);
    }

    /// Keys of the live low-level requests
    pub async fn live_requests(&self) -> Vec<RequestKey> {
        self.state.lock().await.requests.iter().map(|r| r.key).collect()
    }

    pub(crate) fn set_validity(&self, validity: Validity, reason: Option<String>) {
        {
            let mut current = self.validity.lock();
            if current.0 == validity && current.1 == reason {
                return;
            }
            *current = (validity, reason.clone());
        }
        match validity {
            Validity::Invalid => warn!(
                breakpoint = %self.id(),
                reason = reason.as_deref().unwrap_or(""),
                "breakpoint invalid"
            ),
            _ => debug!(breakpoint = %self.id(), ?validity, "validity changed"),
        }
        self.session.listeners().fire_validity(&ValidityChanged {
            breakpoint: self.id(),
            validity,
            reason,
        });
    }

    /// Arm the breakpoint right after construction
    pub async fn set(&self) -> Result<(), EngineError> {
        debug!(breakpoint = %self.id(), kind = self.breakpoint.spec().kind.name(), "setting breakpoint");
        self.update().await
    }

    /// Rebuild every request from the current spec
    pub async fn update(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if self.is_removed() {
            return Ok(());
        }
        self.tear_down(&mut state).await;
        self.set_validity(Validity::Unknown, None);

        let spec = self.breakpoint.spec();
        let custom = self.resolver.uses_custom_hit_count(&spec);
        if state.counted_filter != spec.hit_count || state.counter.is_custom() != custom {
            debug!(breakpoint = %self.id(), "hit count filter changed, counting restarts");
            state.counter = crate::hit_count::HitCounter::new(spec.hit_count, custom);
            state.counted_filter = spec.hit_count;
        }

        if !spec.enabled || !self.session.is_running() || !self.session.breakpoints_active() {
            debug!(breakpoint = %self.id(), enabled = spec.enabled, "not arming breakpoint");
            return Ok(());
        }
        if state.counter.is_exhausted() {
            debug!(breakpoint = %self.id(), "one-shot hit count already satisfied");
            return Ok(());
        }

        let result = self.submit(&mut state, spec).await;
        self.absorb(result)
    }

    async fn submit(&self, state: &mut EngineState, spec: BreakpointSpec) -> TransportResult<()> {
        match self.resolver.anchor(&spec, self.id(), &self.session) {
            Anchor::Inapplicable(reason) => {
                debug!(breakpoint = %self.id(), %reason, "breakpoint not applicable");
                Ok(())
            }
            Anchor::Invalid(reason) => {
                self.set_validity(Validity::Invalid, Some(reason));
                Ok(())
            }
            Anchor::VmWide => {
                let mut cx = ResolveContext::new(self, state, spec);
                self.resolver.submit_vm_wide(&mut cx).await
            }
            Anchor::Classes(filters) => {
                let mut cx = ResolveContext::new(self, state, spec);
                class_resolving::set_requests(&mut cx, filters).await
            }
        }
    }

    /// Tear down permanently; no event is handled afterwards
    pub async fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        self.tear_down(&mut state).await;
        self.session.class_names().evict(self.id());
        debug!(breakpoint = %self.id(), "engine removed");
    }

    /// Re-resolve after classes were redefined
    pub async fn fixed(&self) -> Result<(), EngineError> {
        self.session.class_names().evict(self.id());
        self.update().await
    }

    /// Resolve classes observed loaded outside of this engine's own watches
    pub async fn class_loaded(&self, types: &[LoadedType]) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if self.is_removed() || !state.resolution.armed {
            return Ok(());
        }
        let Some(filters) = state.resolution.filters.clone() else {
            return Ok(());
        };
        let spec = self.breakpoint.spec();
        let mut cx = ResolveContext::new(self, &mut state, spec);
        let mut result = Ok(());
        for loaded in types.iter().filter(|t| filters.matches(&t.name)) {
            result = class_resolving::resolve_type(&mut cx, loaded).await;
            if result.is_err() {
                break;
            }
        }
        self.absorb(result)
    }

    /// Register, filter and enable one low-level request.
    ///
    /// Hit requests carry the breakpoint's suspend policy and, under the native
    /// strategy, its count filter. Watches always suspend only the event thread.
    pub(crate) async fn add_low_level_request(
        &self,
        state: &mut EngineState,
        spec: &BreakpointSpec,
        recipe: RequestRecipe,
    ) -> TransportResult<RequestKey> {
        let facade = self.session.facade();
        let key = facade.create_request(recipe.target.clone()).await?;

        let suspend = match recipe.role {
            // Conditions need a suspended thread to read its frame
            RequestRole::Hit
                if spec.suspend == SuspendPolicy::None && spec.effective_condition().is_some() =>
            {
                SuspendPolicy::EventThread
            }
            RequestRole::Hit => spec.suspend,
            RequestRole::ClassWatch | RequestRole::UnloadWatch => SuspendPolicy::EventThread,
        };
        let count = match recipe.role {
            RequestRole::Hit if !recipe.ignore_hit_count => state.counter.native_count_filter(),
            _ => None,
        };

        let configured = async {
            for filter in &recipe.filters {
                facade.add_filter(key, filter.clone()).await?;
            }
            facade.set_suspend_policy(key, suspend).await?;
            if let Some(count) = count {
                facade.set_count_filter(key, count).await?;
            }
            self.session.handlers().register(key, self.me.clone());
            facade.enable(key).await
        }
        .await;

        if let Err(e) = configured {
            self.session.handlers().unregister(key);
            if let Err(cleanup) = facade.delete(key).await {
                debug!(request = %key, error = %cleanup, "cleanup of rejected request failed");
            }
            return Err(e);
        }

        debug!(breakpoint = %self.id(), request = %key, target = ?recipe.target, ?count, "request enabled");
        state.requests.push(LiveRequest { key, recipe, count });
        Ok(key)
    }

    /// Recreate a request from its recipe, picking up the current count filter
    pub(crate) async fn recreate(
        &self,
        state: &mut EngineState,
        spec: &BreakpointSpec,
        key: RequestKey,
    ) -> TransportResult<()> {
        let Some(old) = state.take(key) else {
            return Ok(());
        };
        self.delete_request(old.key).await;
        self.add_low_level_request(state, spec, old.recipe).await?;
        Ok(())
    }

    /// The threshold of a native `Greater` filter was crossed: every request
    /// still counting toward it must now report each occurrence
    pub(crate) async fn drop_count_filters(
        &self,
        state: &mut EngineState,
        spec: &BreakpointSpec,
        fired: RequestKey,
    ) -> TransportResult<()> {
        let mut keys = vec![fired];
        keys.extend(state.counted_requests(fired));
        debug!(breakpoint = %self.id(), requests = keys.len(), "dropping count filters");
        for key in keys {
            self.recreate(state, spec, key).await?;
        }
        Ok(())
    }

    pub(crate) async fn tear_down(&self, state: &mut EngineState) {
        for request in std::mem::take(&mut state.requests) {
            self.delete_request(request.key).await;
        }
        state.resolution.reset();
    }

    /// Best-effort delete; the VM may already be gone
    async fn delete_request(&self, key: RequestKey) {
        self.session.handlers().unregister(key);
        if let Err(e) = self.session.facade().delete(key).await {
            debug!(request = %key, error = %e, "ignoring failed request delete");
        }
    }

    /// Apply the transport error policy at an engine entry point
    pub(crate) fn absorb(&self, result: TransportResult<()>) -> Result<(), EngineError> {
        let Err(e) = result else {
            return Ok(());
        };
        match e.policy() {
            ErrorPolicy::MarkInvalid => {
                self.set_validity(Validity::Invalid, Some(e.to_string()));
                Ok(())
            }
            ErrorPolicy::LetGo => {
                info!(breakpoint = %self.id(), error = %e, "abandoning request changes");
                Ok(())
            }
            ErrorPolicy::Ignore => {
                debug!(breakpoint = %self.id(), error = %e, "ignored transport error");
                Ok(())
            }
            ErrorPolicy::Propagate => Err(EngineError::Transport(e)),
        }
    }
}

impl std::fmt::Debug for BreakpointEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakpointEngine")
            .field("breakpoint", &self.id())
            .field("validity", &self.validity.lock().0)
            .field("removed", &self.is_removed())
            .finish()
    }
}
