// Breakpoint registry
//
// Session-scoped controller keeping exactly one engine per accepted
// breakpoint. Every mutation runs on a background worker, serialized per
// session; callers wait only until their job has started. Event delivery
// goes through `dispatch` and never waits on the worker.

use crate::engine::BreakpointEngine;
use crate::error::EngineError;
use crate::event::{Decision, Event};
use crate::session::{DebugSession, SessionState};
use crate::spec::{Breakpoint, BreakpointSpec, SpecId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

enum Work {
    SessionRunning,
    SessionDisconnected,
    Add(Arc<Breakpoint>),
    Remove(SpecId),
    Update(SpecId),
    UpdateAll,
    FixAll,
    RootsChanged,
    Flush,
}

impl Work {
    fn name(&self) -> &'static str {
        match self {
            Work::SessionRunning => "session-running",
            Work::SessionDisconnected => "session-disconnected",
            Work::Add(_) => "add",
            Work::Remove(_) => "remove",
            Work::Update(_) => "update",
            Work::UpdateAll => "update-all",
            Work::FixAll => "fix-all",
            Work::RootsChanged => "roots-changed",
            Work::Flush => "flush",
        }
    }
}

struct Job {
    work: Work,
    started: oneshot::Sender<()>,
    done: oneshot::Sender<Result<(), EngineError>>,
}

enum EngineSlot {
    /// Engine under construction; a removal seen meanwhile is parked here
    Placeholder { pending_removal: bool },
    Live(Arc<BreakpointEngine>),
}

/// A job the worker has started
pub struct Pending {
    done: oneshot::Receiver<Result<(), EngineError>>,
}

impl Pending {
    pub async fn finished(self) -> Result<(), EngineError> {
        self.done.await.map_err(|_| EngineError::WorkerGone)?
    }
}

struct Shared {
    session: Arc<DebugSession>,
    engines: Mutex<HashMap<SpecId, EngineSlot>>,
}

pub struct BreakpointRegistry {
    shared: Arc<Shared>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl BreakpointRegistry {
    /// Create the registry and start its worker. Must be called inside a tokio runtime.
    pub fn new(session: Arc<DebugSession>) -> Self {
        let shared = Arc::new(Shared {
            session,
            engines: Mutex::new(HashMap::new()),
        });
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker(shared.clone(), rx));
        Self { shared, jobs }
    }

    pub fn session(&self) -> &Arc<DebugSession> {
        &self.shared.session
    }

    async fn submit(&self, work: Work) -> Result<Pending, EngineError> {
        let (started_tx, started_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            work,
            started: started_tx,
            done: done_tx,
        };
        self.jobs.send(job).map_err(|_| EngineError::WorkerGone)?;
        started_rx.await.map_err(|_| EngineError::WorkerGone)?;
        Ok(Pending { done: done_rx })
    }

    async fn run(&self, work: Work) -> Result<(), EngineError> {
        self.submit(work).await?.finished().await
    }

    /// Queue without waiting; used from the event delivery path
    fn enqueue(&self, work: Work) {
        let (started, _) = oneshot::channel();
        let (done, _) = oneshot::channel();
        if self.jobs.send(Job { work, started, done }).is_err() {
            warn!("registry worker gone, dropping job");
        }
    }

    /// Create engines for every accepted breakpoint
    pub async fn on_session_running(&self) -> Result<(), EngineError> {
        self.run(Work::SessionRunning).await
    }

    /// Remove every engine and the session's hidden breakpoints
    pub async fn on_session_disconnected(&self) -> Result<(), EngineError> {
        self.run(Work::SessionDisconnected).await
    }

    /// Returns once construction has started
    pub async fn spec_added(&self, breakpoint: Arc<Breakpoint>) -> Result<Pending, EngineError> {
        self.submit(Work::Add(breakpoint)).await
    }

    /// Add a breakpoint to the global set and to this session
    pub async fn add_breakpoint(&self, spec: BreakpointSpec) -> Result<Arc<Breakpoint>, EngineError> {
        let breakpoint = Breakpoint::new(spec);
        self.shared.session.breakpoints().add(breakpoint.clone());
        self.spec_added(breakpoint.clone()).await?;
        Ok(breakpoint)
    }

    pub async fn spec_removed(&self, id: SpecId) -> Result<(), EngineError> {
        // Construction in flight: the worker removes the engine when it finishes
        {
            let mut engines = self.shared.engines.lock();
            if let Some(EngineSlot::Placeholder { pending_removal }) = engines.get_mut(&id) {
                debug!(breakpoint = %id, "removal parked on placeholder");
                *pending_removal = true;
                return Ok(());
            }
        }
        self.submit(Work::Remove(id)).await.map(|_| ())
    }

    pub async fn remove_breakpoint(&self, id: SpecId) -> Result<(), EngineError> {
        self.shared.session.breakpoints().remove(id);
        self.spec_removed(id).await
    }

    /// Rebuild the engine of a breakpoint whose properties changed
    pub async fn spec_changed(&self, id: SpecId) -> Result<(), EngineError> {
        self.submit(Work::Update(id)).await.map(|_| ())
    }

    pub async fn set_breakpoints_active(&self, active: bool) -> Result<(), EngineError> {
        if self.shared.session.set_breakpoints_active(active) {
            info!(active, "breakpoints active changed");
            self.submit(Work::UpdateAll).await?;
        }
        Ok(())
    }

    pub async fn source_roots_changed(&self) -> Result<(), EngineError> {
        self.submit(Work::RootsChanged).await.map(|_| ())
    }

    /// Re-resolve every breakpoint after a hot code replace
    pub async fn fix_all(&self) -> Result<(), EngineError> {
        self.run(Work::FixAll).await
    }

    /// Wait until every job queued so far has finished
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.run(Work::Flush).await
    }

    /// Route one event to the engine owning its request
    pub async fn dispatch(&self, event: &Event) -> Decision {
        let session = &self.shared.session;
        let Some(_access) = session.try_read_access() else {
            debug!(request = %event.request, "session changing state, letting event go");
            return Decision::Resume;
        };
        let Some(engine) = session.handlers().lookup(event.request) else {
            debug!(request = %event.request, kind = ?event.kind(), "no engine for request");
            return Decision::Resume;
        };

        let outcome = engine.handle(event).await;
        for id in outcome.changed {
            self.enqueue(Work::Update(id));
        }
        outcome.decision
    }

    pub fn engine(&self, id: SpecId) -> Option<Arc<BreakpointEngine>> {
        self.shared.live(id)
    }

    pub fn engines(&self) -> Vec<Arc<BreakpointEngine>> {
        self.shared.live_engines()
    }

    pub fn engine_count(&self) -> usize {
        self.shared.live_engines().len()
    }
}

async fn worker(shared: Arc<Shared>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    debug!(session = shared.session.id(), "registry worker started");
    while let Some(job) = jobs.recv().await {
        job.started.send(()).ok();
        let name = job.work.name();
        let result = shared.execute(job.work).await;
        if let Err(e) = &result {
            warn!(job = name, error = %e, "registry job failed");
        }
        job.done.send(result).ok();
    }
    debug!(session = shared.session.id(), "registry worker stopped");
}

impl Shared {
    fn live(&self, id: SpecId) -> Option<Arc<BreakpointEngine>> {
        match self.engines.lock().get(&id) {
            Some(EngineSlot::Live(engine)) => Some(engine.clone()),
            _ => None,
        }
    }

    fn live_engines(&self) -> Vec<Arc<BreakpointEngine>> {
        let mut engines: Vec<_> = self
            .engines
            .lock()
            .values()
            .filter_map(|slot| match slot {
                EngineSlot::Live(engine) => Some(engine.clone()),
                EngineSlot::Placeholder { .. } => None,
            })
            .collect();
        engines.sort_by_key(|e| e.id());
        engines
    }

    /// Unbound breakpoints apply to every session, bound ones only to theirs
    fn accepts(&self, breakpoint: &Breakpoint) -> bool {
        breakpoint
            .session()
            .map_or(true, |s| s == self.session.id())
    }

    async fn execute(&self, work: Work) -> Result<(), EngineError> {
        match work {
            Work::SessionRunning => self.session_running().await,
            Work::SessionDisconnected => {
                self.session_disconnected().await;
                Ok(())
            }
            Work::Add(breakpoint) => {
                let _access = self.session.read_access().await;
                if !self.session.is_running() {
                    debug!(breakpoint = %breakpoint.id(), "session not running, engine deferred");
                    return Ok(());
                }
                if !self.accepts(&breakpoint) {
                    return Ok(());
                }
                self.create_engine(breakpoint).await
            }
            Work::Remove(id) => {
                let _access = self.session.read_access().await;
                self.remove_engine(id).await;
                Ok(())
            }
            Work::Update(id) => {
                let _access = self.session.read_access().await;
                match self.live(id) {
                    Some(engine) => engine.update().await,
                    None => Ok(()),
                }
            }
            Work::UpdateAll => {
                let _access = self.session.read_access().await;
                self.update_all().await
            }
            Work::FixAll => {
                let _access = self.session.read_access().await;
                self.session.class_names().clear();
                let mut result = Ok(());
                for engine in self.live_engines() {
                    if let Err(e) = engine.fixed().await {
                        result = Err(e);
                    }
                }
                result
            }
            Work::RootsChanged => {
                let _access = self.session.read_access().await;
                self.session.roots().invalidate();
                self.update_all().await
            }
            Work::Flush => Ok(()),
        }
    }

    async fn update_all(&self) -> Result<(), EngineError> {
        let mut result = Ok(());
        for engine in self.live_engines() {
            if let Err(e) = engine.update().await {
                warn!(breakpoint = %engine.id(), error = %e, "update failed");
                result = Err(e);
            }
        }
        result
    }

    async fn session_running(&self) -> Result<(), EngineError> {
        {
            let _access = self.session.write_access().await;
            if self.session.state() == SessionState::Running {
                return Ok(());
            }
            self.session.set_state(SessionState::Running);
        }
        info!(session = self.session.id(), "session running, creating engines");

        let _access = self.session.read_access().await;
        let config = self.session.config();
        if config.catch_uncaught_exceptions {
            let mut spec = BreakpointSpec::exception(config.hidden_exception_class.clone(), false, true);
            spec.hidden = true;
            spec.session = Some(self.session.id().to_string());
            self.session.breakpoints().add(Breakpoint::new(spec));
        }

        let mut result = Ok(());
        for breakpoint in self.session.breakpoints().all() {
            if !self.accepts(&breakpoint) {
                continue;
            }
            if let Err(e) = self.create_engine(breakpoint).await {
                result = Err(e);
            }
        }
        result
    }

    async fn session_disconnected(&self) {
        let _access = self.session.write_access().await;
        self.session.set_state(SessionState::Disconnected);

        let engines: Vec<_> = self
            .engines
            .lock()
            .drain()
            .filter_map(|(_, slot)| match slot {
                EngineSlot::Live(engine) => Some(engine),
                EngineSlot::Placeholder { .. } => None,
            })
            .collect();
        for engine in &engines {
            engine.remove().await;
        }
        self.session.handlers().clear();
        self.session.class_names().clear();

        let breakpoints = self.session.breakpoints();
        for breakpoint in breakpoints.all() {
            if breakpoint.is_hidden() && breakpoint.session().as_deref() == Some(self.session.id()) {
                breakpoints.remove(breakpoint.id());
            }
        }
        info!(session = self.session.id(), engines = engines.len(), "session disconnected");
    }

    async fn create_engine(&self, breakpoint: Arc<Breakpoint>) -> Result<(), EngineError> {
        let id = breakpoint.id();
        {
            let mut engines = self.engines.lock();
            if engines.contains_key(&id) {
                debug!(breakpoint = %id, "engine already exists");
                return Ok(());
            }
            engines.insert(id, EngineSlot::Placeholder { pending_removal: false });
        }

        let engine = BreakpointEngine::new(breakpoint, self.session.clone());
        let armed = engine.set().await;

        let removal_pending = {
            let mut engines = self.engines.lock();
            matches!(
                engines.insert(id, EngineSlot::Live(engine.clone())),
                Some(EngineSlot::Placeholder {
                    pending_removal: true
                })
            )
        };
        if removal_pending {
            info!(breakpoint = %id, "breakpoint removed during construction");
            engine.remove().await;
            self.engines.lock().remove(&id);
        }
        armed
    }

    async fn remove_engine(&self, id: SpecId) {
        let engine = {
            let mut engines = self.engines.lock();
            match engines.remove(&id) {
                Some(EngineSlot::Placeholder { .. }) => {
                    engines.insert(id, EngineSlot::Placeholder { pending_removal: true });
                    None
                }
                Some(EngineSlot::Live(engine)) => Some(engine),
                None => None,
            }
        };
        if let Some(engine) = engine {
            engine.remove().await;
        }
    }
}
