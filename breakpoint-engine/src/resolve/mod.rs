// Kind-specific resolution
//
// Each breakpoint kind implements `KindResolver`: where the breakpoint is
// anchored (a set of classes or the whole VM), which low-level requests a
// loaded class turns into, and what value a hit is about. The engine owns one
// resolver and drives it through `ResolveContext`.

mod class;
pub(crate) mod class_resolving;
mod exception;
mod field;
mod line;
mod method;
mod thread;

use crate::engine::state::{EngineState, RequestRecipe, RequestRole, ResolutionState};
use crate::engine::BreakpointEngine;
use crate::error::TransportResult;
use crate::event::{Event, HitVariable, Validity};
use crate::facade::{RemoteRequestFacade, RequestFilter, RequestKey, RequestTarget};
use crate::session::DebugSession;
use crate::spec::{Breakpoint, BreakpointKind, BreakpointSpec, SpecId};
use crate::types::LoadedType;
use async_trait::async_trait;

/// Class names a breakpoint resolves against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFilters {
    /// Class names or patterns (`com.example.*`)
    pub names: Vec<String>,
    pub exclusions: Vec<String>,
    /// Source file the names came from, checked against the enabled roots
    pub source_url: Option<String>,
}

impl ClassFilters {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            ..Default::default()
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        use crate::types::class_pattern_matches;
        self.names.iter().any(|p| class_pattern_matches(p, name))
            && !self.exclusions.iter().any(|p| class_pattern_matches(p, name))
    }
}

/// External policy hook that may narrow or rewrite a breakpoint's class filters
pub trait ClassNameFilter: Send + Sync {
    fn filter(&self, spec: &BreakpointSpec, filters: ClassFilters) -> ClassFilters;
}

/// Where a breakpoint's requests come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Requests are created directly, no class resolution
    VmWide,
    /// Requests are created per loaded class matching the filters
    Classes(ClassFilters),
    /// Not submitted at all, and not an error
    Inapplicable(String),
    Invalid(String),
}

#[async_trait]
pub trait KindResolver: Send + Sync {
    fn anchor(&self, spec: &BreakpointSpec, id: SpecId, session: &DebugSession) -> Anchor;

    /// Two request kinds share one logical hit count
    fn uses_custom_hit_count(&self, _spec: &BreakpointSpec) -> bool {
        false
    }

    fn watches_unload(&self, _spec: &BreakpointSpec) -> bool {
        true
    }

    /// Turn one newly observed matching class into requests
    async fn class_loaded(
        &self,
        _cx: &mut ResolveContext<'_>,
        _loaded: &LoadedType,
    ) -> TransportResult<()> {
        Ok(())
    }

    async fn submit_vm_wide(&self, _cx: &mut ResolveContext<'_>) -> TransportResult<()> {
        Ok(())
    }

    /// Second-stage filter for requests broader than the breakpoint
    fn accepts(&self, _resolution: &ResolutionState, _event: &Event) -> bool {
        true
    }

    fn hit_variable(&self, _event: &Event) -> Option<HitVariable> {
        None
    }
}

pub(crate) fn resolver_for(kind: &BreakpointKind) -> Box<dyn KindResolver> {
    match kind {
        BreakpointKind::Line { .. } => Box::new(line::LineResolver),
        BreakpointKind::Method { .. } => Box::new(method::MethodResolver),
        BreakpointKind::Field { .. } => Box::new(field::FieldResolver),
        BreakpointKind::Exception { .. } => Box::new(exception::ExceptionResolver),
        BreakpointKind::Class { .. } => Box::new(class::ClassResolver),
        BreakpointKind::Thread { .. } => Box::new(thread::ThreadResolver),
    }
}

/// Mutable view of one engine while it resolves, valid for one locked section
pub struct ResolveContext<'a> {
    engine: &'a BreakpointEngine,
    state: &'a mut EngineState,
    spec: BreakpointSpec,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(
        engine: &'a BreakpointEngine,
        state: &'a mut EngineState,
        spec: BreakpointSpec,
    ) -> Self {
        Self {
            engine,
            state,
            spec,
        }
    }

    pub fn spec(&self) -> &BreakpointSpec {
        &self.spec
    }

    pub(crate) fn spec_mut(&mut self) -> &mut BreakpointSpec {
        &mut self.spec
    }

    pub fn id(&self) -> SpecId {
        self.engine.id()
    }

    pub fn breakpoint(&self) -> &'a Breakpoint {
        self.engine.breakpoint()
    }

    pub fn session(&self) -> &'a DebugSession {
        self.engine.session()
    }

    pub fn facade(&self) -> &'a dyn RemoteRequestFacade {
        self.engine.session().facade()
    }

    pub fn resolution(&mut self) -> &mut ResolutionState {
        &mut self.state.resolution
    }

    pub(crate) fn resolver(&self) -> &'a dyn KindResolver {
        self.engine.resolver()
    }

    pub fn mark_valid(&self) {
        self.engine.set_validity(Validity::Valid, None);
    }

    pub fn mark_invalid(&self, reason: impl Into<String>) {
        self.engine.set_validity(Validity::Invalid, Some(reason.into()));
    }

    /// Create a request that reports hits of this breakpoint. The spec's thread
    /// and instance filters are added where the request kind supports them.
    pub async fn add_hit_request(
        &mut self,
        target: RequestTarget,
        filters: Vec<RequestFilter>,
        anchor: Option<&LoadedType>,
    ) -> TransportResult<RequestKey> {
        self.hit_request(target, filters, anchor, false).await
    }

    /// Like `add_hit_request`, for a request that also reports events the
    /// breakpoint does not want (a class-wide method entry or exit). The VM
    /// must not count those, so the hit count is kept locally.
    pub async fn add_broad_hit_request(
        &mut self,
        target: RequestTarget,
        filters: Vec<RequestFilter>,
        anchor: Option<&LoadedType>,
    ) -> TransportResult<RequestKey> {
        self.hit_request(target, filters, anchor, true).await
    }

    async fn hit_request(
        &mut self,
        target: RequestTarget,
        mut filters: Vec<RequestFilter>,
        anchor: Option<&LoadedType>,
        ignore_hit_count: bool,
    ) -> TransportResult<RequestKey> {
        if target.supports_thread_filter() {
            filters.extend(self.spec.thread_filters.iter().map(|t| RequestFilter::Thread(*t)));
        }
        if target.supports_instance_filter() {
            filters.extend(
                self.spec
                    .instance_filters
                    .iter()
                    .map(|o| RequestFilter::Instance(*o)),
            );
        }
        let recipe = RequestRecipe {
            target,
            filters,
            role: RequestRole::Hit,
            anchor: anchor.map(|t| t.id),
            ignore_hit_count,
        };
        let key = self
            .engine
            .add_low_level_request(self.state, &self.spec, recipe)
            .await?;
        self.mark_valid();
        Ok(key)
    }

    /// Create a class prepare or unload watch that drives resolution
    pub(crate) async fn add_watch(
        &mut self,
        target: RequestTarget,
        filters: Vec<RequestFilter>,
    ) -> TransportResult<RequestKey> {
        let role = match target {
            RequestTarget::ClassUnload => RequestRole::UnloadWatch,
            _ => RequestRole::ClassWatch,
        };
        let recipe = RequestRecipe {
            target,
            filters,
            role,
            anchor: None,
            ignore_hit_count: false,
        };
        self.engine
            .add_low_level_request(self.state, &self.spec, recipe)
            .await
    }
}

/// Filters narrowing a request to classes matching `names` minus `exclusions`
pub(crate) fn class_match_filters(name: Option<&str>, exclusions: &[String]) -> Vec<RequestFilter> {
    name.map(|n| RequestFilter::ClassMatch(n.to_string()))
        .into_iter()
        .chain(exclusions.iter().map(|e| RequestFilter::ClassExclude(e.clone())))
        .collect()
}
