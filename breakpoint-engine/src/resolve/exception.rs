// Exception breakpoints
//
// A named exception class resolves like any class-anchored breakpoint; the
// request JDWP creates for it also reports subclasses. `*` watches every
// exception without resolution.

use super::{class_match_filters, Anchor, ClassFilters, KindResolver, ResolveContext};
use crate::error::TransportResult;
use crate::event::{Event, EventDetails, HitVariable};
use crate::facade::{RequestFilter, RequestTarget};
use crate::session::DebugSession;
use crate::spec::{BreakpointKind, BreakpointSpec, SpecId};
use crate::types::{LoadedType, Value};
use async_trait::async_trait;

pub(crate) struct ExceptionResolver;

struct Watch {
    caught: bool,
    uncaught: bool,
    /// Throw-location patterns; `None` watches every location
    patterns: Vec<Option<String>>,
    exclusions: Vec<String>,
}

impl Watch {
    /// JDWP ANDs ClassMatch modifiers, so each pattern gets its own request
    fn filter_sets(&self) -> Vec<Vec<RequestFilter>> {
        self.patterns
            .iter()
            .map(|p| class_match_filters(p.as_deref(), &self.exclusions))
            .collect()
    }
}

fn watch(spec: &BreakpointSpec) -> Option<Watch> {
    let BreakpointKind::Exception {
        caught,
        uncaught,
        class_filters,
        class_exclusions,
        ..
    } = &spec.kind
    else {
        return None;
    };
    let mut patterns: Vec<Option<String>> = class_filters.iter().cloned().map(Some).collect();
    if patterns.is_empty() {
        patterns.push(None);
    }
    Some(Watch {
        caught: *caught,
        uncaught: *uncaught,
        patterns,
        exclusions: class_exclusions.clone(),
    })
}

#[async_trait]
impl KindResolver for ExceptionResolver {
    fn anchor(&self, spec: &BreakpointSpec, _id: SpecId, _session: &DebugSession) -> Anchor {
        let BreakpointKind::Exception {
            class_name,
            caught,
            uncaught,
            ..
        } = &spec.kind
        else {
            return Anchor::Invalid("not an exception breakpoint".to_string());
        };
        if !caught && !uncaught {
            return Anchor::Invalid("exception breakpoint watches neither caught nor uncaught".to_string());
        }
        let class_name = class_name.trim();
        if class_name.is_empty() || class_name == "*" {
            Anchor::VmWide
        } else {
            Anchor::Classes(ClassFilters::new(vec![class_name.to_string()]))
        }
    }

    async fn submit_vm_wide(&self, cx: &mut ResolveContext<'_>) -> TransportResult<()> {
        let Some(watch) = watch(cx.spec()) else {
            return Ok(());
        };
        let target = RequestTarget::Exception {
            type_id: None,
            caught: watch.caught,
            uncaught: watch.uncaught,
        };
        for filters in watch.filter_sets() {
            cx.add_hit_request(target.clone(), filters, None).await?;
        }
        Ok(())
    }

    async fn class_loaded(
        &self,
        cx: &mut ResolveContext<'_>,
        loaded: &LoadedType,
    ) -> TransportResult<()> {
        let Some(watch) = watch(cx.spec()) else {
            return Ok(());
        };
        let target = RequestTarget::Exception {
            type_id: Some(loaded.id),
            caught: watch.caught,
            uncaught: watch.uncaught,
        };
        for filters in watch.filter_sets() {
            cx.add_hit_request(target.clone(), filters, Some(loaded)).await?;
        }
        Ok(())
    }

    fn hit_variable(&self, event: &Event) -> Option<HitVariable> {
        match &event.details {
            EventDetails::Exception {
                exception,
                exception_type,
                ..
            } => Some(HitVariable {
                name: "exception",
                value: Value::Object {
                    id: *exception,
                    type_name: exception_type.clone(),
                },
            }),
            _ => None,
        }
    }
}
