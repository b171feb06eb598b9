// Event handling
//
// handle(event) -> Decision. Watches feed class resolution; hits go through
// hit counting, the condition, listener notification and step arbitration.

use super::state::{EngineState, RequestRole};
use super::BreakpointEngine;
use crate::error::{ErrorPolicy, EvaluationError};
use crate::event::{
    BreakpointHit, Decision, Event, EventDetails, HitCountChanged, Validity,
};
use crate::hit_count::HitVerdict;
use crate::resolve::{class_resolving, ResolveContext};
use crate::spec::{BreakpointSpec, SpecId, SuspendPolicy};
use crate::step::Arbitration;
use crate::types::{Location, ReferenceTypeId};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleOutcome {
    pub decision: Decision,
    /// Breakpoints whose enablement changed through group actions
    pub changed: Vec<SpecId>,
}

impl HandleOutcome {
    fn resume() -> Self {
        Self {
            decision: Decision::Resume,
            changed: Vec::new(),
        }
    }
}

fn lets_go(e: &EvaluationError) -> bool {
    matches!(e, EvaluationError::Transport(t) if t.policy() == ErrorPolicy::LetGo)
}

impl BreakpointEngine {
    /// Handle one event delivered for a request this engine owns
    pub async fn handle(&self, event: &Event) -> HandleOutcome {
        if self.is_removed() {
            return HandleOutcome::resume();
        }
        let mut state = self.state.lock().await;
        // Removal may have won the race for the lock
        if self.is_removed() {
            return HandleOutcome::resume();
        }
        let Some(role) = state.find(event.request).map(|r| r.recipe.role) else {
            debug!(breakpoint = %self.id(), request = %event.request, "event for retired request");
            return HandleOutcome::resume();
        };

        match role {
            RequestRole::ClassWatch => {
                self.on_class_prepare(&mut state, event).await;
                HandleOutcome::resume()
            }
            RequestRole::UnloadWatch => {
                self.on_class_unload(&mut state, event).await;
                HandleOutcome::resume()
            }
            RequestRole::Hit => self.on_hit(&mut state, event).await,
        }
    }

    async fn on_class_prepare(&self, state: &mut EngineState, event: &Event) {
        let EventDetails::ClassPrepare { loaded } = &event.details else {
            return;
        };
        let spec = self.breakpoint.spec();
        let mut cx = ResolveContext::new(self, state, spec);
        let result = class_resolving::resolve_type(&mut cx, loaded).await;
        if let Err(e) = self.absorb(result) {
            warn!(breakpoint = %self.id(), class = %loaded.name, error = %e, "class resolution failed");
        }
    }

    async fn on_class_unload(&self, state: &mut EngineState, event: &Event) {
        let EventDetails::ClassUnload { name } = &event.details else {
            return;
        };
        let unloaded: Vec<ReferenceTypeId> = state
            .resolution
            .resolved
            .iter()
            .filter(|(_, resolved)| *resolved == name)
            .map(|(id, _)| *id)
            .collect();
        if unloaded.is_empty() {
            return;
        }

        let stale: Vec<_> = state
            .requests
            .iter()
            .filter(|r| r.recipe.anchor.is_some_and(|a| unloaded.contains(&a)))
            .map(|r| r.key)
            .collect();
        for key in stale {
            state.take(key);
            self.delete_request(key).await;
        }
        for id in &unloaded {
            state.resolution.resolved.remove(id);
        }
        state
            .resolution
            .accepted_methods
            .retain(|(type_id, _)| !unloaded.contains(type_id));

        info!(breakpoint = %self.id(), class = %name, "class unloaded, requests retired");
        if state.hit_requests() == 0 {
            self.set_validity(Validity::Unknown, None);
        }
    }

    async fn on_hit(&self, state: &mut EngineState, event: &Event) -> HandleOutcome {
        if !self.resolver.accepts(&state.resolution, event) {
            return HandleOutcome::resume();
        }
        let spec = self.breakpoint.spec();
        let declaring_type = declaring_type(state, event);

        let counted_locally = state
            .find(event.request)
            .is_some_and(|r| r.recipe.ignore_hit_count);
        let verdict = if counted_locally {
            state.counter.on_local_hit()
        } else {
            state.counter.on_hit()
        };
        let maintenance = match verdict {
            HitVerdict::PassThenTearDown => {
                info!(breakpoint = %self.id(), "hit count reached, removing requests");
                self.tear_down(state).await;
                Ok(())
            }
            HitVerdict::PassThenRearm => self.recreate(state, &spec, event.request).await,
            HitVerdict::PassThenDropFilter => self.drop_count_filters(state, &spec, event.request).await,
            HitVerdict::Pass | HitVerdict::Fail => Ok(()),
        };
        if let Err(e) = self.absorb(maintenance) {
            warn!(breakpoint = %self.id(), error = %e, "failed to re-arm counted request");
        }
        if !verdict.passes() {
            debug!(breakpoint = %self.id(), "hit filtered by hit count");
            return HandleOutcome::resume();
        }

        let mut condition_error = None;
        if let Some(expression) = spec.effective_condition() {
            match self.check_condition(state, expression, event).await {
                Ok(true) => {}
                Ok(false) => return HandleOutcome::resume(),
                Err(e) if lets_go(&e) => {
                    debug!(breakpoint = %self.id(), error = %e, "letting event go");
                    return HandleOutcome::resume();
                }
                Err(e) => {
                    warn!(breakpoint = %self.id(), error = %e, "condition failed, stopping anyway");
                    condition_error = Some(e);
                }
            }
        }

        self.perform(&spec, event, declaring_type, condition_error).await
    }

    async fn check_condition(
        &self,
        state: &mut EngineState,
        expression: &str,
        event: &Event,
    ) -> Result<bool, EvaluationError> {
        let compiled = state.condition.get(self.session.evaluator(), expression)?;
        let thread = event
            .thread
            .ok_or_else(|| EvaluationError::Failed("event has no thread".to_string()))?;
        let frame = self.session.facade().top_frame(thread).await?;
        compiled.evaluate(&frame).await
    }

    async fn perform(
        &self,
        spec: &BreakpointSpec,
        event: &Event,
        declaring_type: Option<String>,
        condition_error: Option<EvaluationError>,
    ) -> HandleOutcome {
        let hit_count = self.hit_count.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let change = HitCountChanged {
            breakpoint: self.id(),
            hit_count,
        };
        self.session.listeners().fire_hit_count(&change);
        self.listeners.fire_hit_count(&change);

        let message = match &spec.print_text {
            Some(template) => Some(
                self.render_print_text(template, spec, event, declaring_type.as_deref(), hit_count)
                    .await,
            ),
            None => None,
        };

        let hit = BreakpointHit {
            breakpoint: self.id(),
            session: self.session.id().to_string(),
            kind: event.kind(),
            condition_result: condition_error.is_none(),
            condition_error,
            thread: event.thread,
            location: event.location,
            declaring_type,
            variable: self.resolver.hit_variable(event),
            message,
            hit_count,
        };
        debug!(
            breakpoint = %self.id(),
            kind = ?hit.kind,
            thread = ?hit.thread,
            hits = hit_count,
            "breakpoint hit"
        );
        let resume_requested = self.session.listeners().fire_hit(&hit);

        let mut changed = Vec::new();
        for group in &spec.enable_groups {
            changed.extend(self.session.breakpoints().set_group_enabled(group, true));
        }
        for group in &spec.disable_groups {
            changed.extend(self.session.breakpoints().set_group_enabled(group, false));
        }

        let decision = if spec.suspend == SuspendPolicy::None || resume_requested {
            Decision::Resume
        } else {
            self.arbitrate(spec, event).await
        };
        HandleOutcome { decision, changed }
    }

    async fn arbitrate(&self, spec: &BreakpointSpec, event: &Event) -> Decision {
        let steps = self.session.steps();
        match steps
            .arbitrate(self.session.facade(), event.thread, spec.suspend)
            .await
        {
            Ok(Arbitration::Stop) => Decision::Suspend,
            Ok(Arbitration::LetGo) => Decision::Resume,
            Err(e) if e.policy() == ErrorPolicy::LetGo => Decision::Resume,
            Err(e) => {
                warn!(breakpoint = %self.id(), error = %e, "step arbitration failed");
                Decision::Suspend
            }
        }
    }

    async fn render_print_text(
        &self,
        template: &str,
        spec: &BreakpointSpec,
        event: &Event,
        declaring_type: Option<&str>,
        hit_count: u32,
    ) -> String {
        let line = spec
            .line_number()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".to_string());
        let thread = event
            .thread
            .map(|t| format!("{:#x}", t))
            .unwrap_or_else(|| "?".to_string());
        let mut text = template
            .replace("{className}", declaring_type.unwrap_or("?"))
            .replace("{lineNumber}", &line)
            .replace("{threadId}", &thread)
            .replace("{hitCount}", &hit_count.to_string());

        if text.contains("{methodName}") {
            let method = match event.location {
                Some(location) => self.method_name(location).await,
                None => None,
            };
            text = text.replace("{methodName}", method.as_deref().unwrap_or("?"));
        }
        text
    }

    async fn method_name(&self, location: Location) -> Option<String> {
        let methods = self.session.facade().methods(location.type_id).await.ok()?;
        methods
            .into_iter()
            .find(|m| m.id == location.method_id)
            .map(|m| m.name)
    }
}

fn declaring_type(state: &EngineState, event: &Event) -> Option<String> {
    match &event.details {
        EventDetails::ClassPrepare { loaded } => Some(loaded.name.clone()),
        EventDetails::ClassUnload { name } => Some(name.clone()),
        _ => event
            .location
            .and_then(|l| state.resolution.type_name(l.type_id))
            .map(str::to_string),
    }
}
