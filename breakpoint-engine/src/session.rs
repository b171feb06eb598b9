// Debug session context
//
// Everything engines of one session share: the transport, the collaborators,
// caches and the session-wide access lock. Passed explicitly to every engine
// instead of living in globals.

use crate::condition::{ConditionEvaluator, ConstantEvaluator};
use crate::config::EngineConfig;
use crate::dispatch::HandlerTable;
use crate::event::{BreakpointListener, ListenerSet};
use crate::facade::RemoteRequestFacade;
use crate::resolve::ClassNameFilter;
use crate::source_roots::{SourceResolver, SourceRootCache};
use crate::spec::{BreakpointSet, SpecId};
use crate::step::StepArbiter;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Disconnected,
}

/// Class names resolved from source locations, keyed by breakpoint
#[derive(Debug, Default)]
pub struct ClassNameCache {
    names: Mutex<HashMap<SpecId, String>>,
}

impl ClassNameCache {
    pub fn get(&self, id: SpecId) -> Option<String> {
        self.names.lock().get(&id).cloned()
    }

    pub fn insert(&self, id: SpecId, name: String) {
        self.names.lock().insert(id, name);
    }

    pub fn evict(&self, id: SpecId) {
        self.names.lock().remove(&id);
    }

    pub fn clear(&self) {
        self.names.lock().clear();
    }
}

pub struct DebugSession {
    id: String,
    facade: Arc<dyn RemoteRequestFacade>,
    evaluator: Arc<dyn ConditionEvaluator>,
    roots: SourceRootCache,
    breakpoints: Arc<BreakpointSet>,
    listeners: ListenerSet,
    handlers: HandlerTable,
    steps: StepArbiter,
    class_names: ClassNameCache,
    class_filters: RwLock<Vec<Arc<dyn ClassNameFilter>>>,
    config: EngineConfig,
    breakpoints_active: AtomicBool,
    state: Mutex<SessionState>,
    access: tokio::sync::RwLock<()>,
}

pub struct SessionBuilder {
    id: String,
    facade: Arc<dyn RemoteRequestFacade>,
    sources: Arc<dyn SourceResolver>,
    evaluator: Arc<dyn ConditionEvaluator>,
    breakpoints: Option<Arc<BreakpointSet>>,
    config: EngineConfig,
}

impl SessionBuilder {
    pub fn evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn breakpoints(mut self, breakpoints: Arc<BreakpointSet>) -> Self {
        self.breakpoints = Some(breakpoints);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<DebugSession> {
        Arc::new(DebugSession {
            id: self.id,
            facade: self.facade,
            evaluator: self.evaluator,
            roots: SourceRootCache::new(self.sources),
            breakpoints: self.breakpoints.unwrap_or_else(BreakpointSet::new),
            listeners: ListenerSet::new(),
            handlers: HandlerTable::new(),
            steps: StepArbiter::new(self.config.step_conflict),
            class_names: ClassNameCache::default(),
            class_filters: RwLock::new(Vec::new()),
            breakpoints_active: AtomicBool::new(self.config.breakpoints_active),
            config: self.config,
            state: Mutex::new(SessionState::Starting),
            access: tokio::sync::RwLock::new(()),
        })
    }
}

impl DebugSession {
    pub fn builder(
        id: impl Into<String>,
        facade: Arc<dyn RemoteRequestFacade>,
        sources: Arc<dyn SourceResolver>,
    ) -> SessionBuilder {
        SessionBuilder {
            id: id.into(),
            facade,
            sources,
            evaluator: Arc::new(ConstantEvaluator),
            breakpoints: None,
            config: EngineConfig::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn facade(&self) -> &dyn RemoteRequestFacade {
        self.facade.as_ref()
    }

    pub fn evaluator(&self) -> &dyn ConditionEvaluator {
        self.evaluator.as_ref()
    }

    pub fn roots(&self) -> &SourceRootCache {
        &self.roots
    }

    pub fn sources(&self) -> &Arc<dyn SourceResolver> {
        self.roots.resolver()
    }

    pub fn breakpoints(&self) -> &Arc<BreakpointSet> {
        &self.breakpoints
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    pub fn add_listener(&self, listener: Arc<dyn BreakpointListener>) {
        self.listeners.add(listener);
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn steps(&self) -> &StepArbiter {
        &self.steps
    }

    pub fn class_names(&self) -> &ClassNameCache {
        &self.class_names
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install an external policy that narrows or rewrites class filters
    pub fn add_class_filter(&self, filter: Arc<dyn ClassNameFilter>) {
        self.class_filters.write().push(filter);
    }

    pub fn class_filters(&self) -> Vec<Arc<dyn ClassNameFilter>> {
        self.class_filters.read().clone()
    }

    pub fn breakpoints_active(&self) -> bool {
        self.breakpoints_active.load(Ordering::SeqCst)
    }

    pub fn set_breakpoints_active(&self, active: bool) -> bool {
        self.breakpoints_active.swap(active, Ordering::SeqCst) != active
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Shared side of the session access lock, held by breakpoint management
    pub async fn read_access(&self) -> RwLockReadGuard<'_, ()> {
        self.access.read().await
    }

    /// Non-blocking read access for the event delivery path
    pub fn try_read_access(&self) -> Option<RwLockReadGuard<'_, ()>> {
        self.access.try_read().ok()
    }

    /// Exclusive side, held by global state transitions such as disconnect
    pub async fn write_access(&self) -> RwLockWriteGuard<'_, ()> {
        self.access.write().await
    }
}

impl std::fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("breakpoints_active", &self.breakpoints_active())
            .finish()
    }
}
