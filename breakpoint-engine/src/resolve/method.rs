// Method entry/exit breakpoints

use super::{Anchor, ClassFilters, KindResolver, ResolveContext};
use crate::engine::state::ResolutionState;
use crate::error::TransportResult;
use crate::event::{Event, EventDetails, HitVariable};
use crate::facade::{RequestFilter, RequestTarget};
use crate::session::DebugSession;
use crate::spec::{BreakpointKind, BreakpointSpec, SpecId};
use crate::types::{is_pattern, name_to_signature, LoadedType, MethodInfo};
use async_trait::async_trait;
use tracing::debug;

pub(crate) struct MethodResolver;

const CONSTRUCTOR: &str = "<init>";

struct Target<'a> {
    class_filters: &'a [String],
    method_name: &'a str,
    signature: Option<&'a str>,
    entry: bool,
    exit: bool,
}

fn target(spec: &BreakpointSpec) -> Option<Target<'_>> {
    match &spec.kind {
        BreakpointKind::Method {
            class_filters,
            method_name,
            signature,
            entry,
            exit,
            ..
        } => Some(Target {
            class_filters,
            method_name,
            signature: signature.as_deref(),
            entry: *entry,
            exit: *exit,
        }),
        _ => None,
    }
}

/// Constructors may be named `<init>`, by simple class name or by full name
fn normalized_name<'a>(name: &'a str, owner: &LoadedType) -> &'a str {
    if name == owner.simple_name() || name == owner.name {
        CONSTRUCTOR
    } else {
        name
    }
}

/// Inner class constructors take the enclosing instance as a synthetic first
/// argument the user does not write
fn with_outer_argument(signature: &str, owner: &LoadedType) -> Option<String> {
    let outer = owner.outer_name()?;
    let rest = signature.strip_prefix('(')?;
    Some(format!("({}{}", name_to_signature(outer), rest))
}

pub(crate) fn method_matches(
    method: &MethodInfo,
    name: &str,
    signature: Option<&str>,
    owner: &LoadedType,
) -> bool {
    let name = normalized_name(name, owner);
    if name != "*" && method.name != name {
        return false;
    }
    if name == "*" && method.name.starts_with('<') {
        return false;
    }
    match signature {
        None => true,
        Some(sig) if method.signature == sig => true,
        Some(sig) if method.name == CONSTRUCTOR => {
            with_outer_argument(sig, owner).is_some_and(|s| s == method.signature)
        }
        Some(_) => false,
    }
}

#[async_trait]
impl KindResolver for MethodResolver {
    fn anchor(&self, spec: &BreakpointSpec, _id: SpecId, _session: &DebugSession) -> Anchor {
        let BreakpointKind::Method {
            class_filters,
            class_exclusions,
            entry,
            exit,
            ..
        } = &spec.kind
        else {
            return Anchor::Invalid("not a method breakpoint".to_string());
        };
        if class_filters.is_empty() {
            return Anchor::Invalid("method breakpoint has no class filter".to_string());
        }
        if !entry && !exit {
            return Anchor::Invalid("method breakpoint watches neither entry nor exit".to_string());
        }
        Anchor::Classes(ClassFilters {
            names: class_filters.clone(),
            exclusions: class_exclusions.clone(),
            source_url: None,
        })
    }

    fn uses_custom_hit_count(&self, spec: &BreakpointSpec) -> bool {
        target(spec).is_some_and(|t| t.entry && t.exit)
    }

    async fn class_loaded(
        &self,
        cx: &mut ResolveContext<'_>,
        loaded: &LoadedType,
    ) -> TransportResult<()> {
        let spec = cx.spec().clone();
        let Some(target) = target(&spec) else {
            return Ok(());
        };
        let facade = cx.facade();

        let methods = facade.methods(loaded.id).await?;
        let matched: Vec<&MethodInfo> = methods
            .iter()
            .filter(|m| method_matches(m, target.method_name, target.signature, loaded))
            .collect();

        if matched.is_empty() {
            // Patterns legitimately match classes without the method
            let named_exactly = target
                .class_filters
                .iter()
                .any(|f| !is_pattern(f) && *f == loaded.name);
            if named_exactly {
                cx.mark_invalid(format!(
                    "no method {} in {}",
                    target.method_name, loaded.name
                ));
            }
            return Ok(());
        }

        let mut class_wide_entry = false;
        for method in &matched {
            cx.resolution()
                .accepted_methods
                .insert((loaded.id, method.id));
            if !target.entry {
                continue;
            }
            let location = if method.has_code {
                facade.method_location(loaded.id, method.id).await?
            } else {
                None
            };
            match location {
                Some(location) => {
                    cx.add_hit_request(RequestTarget::Breakpoint(location), Vec::new(), Some(loaded))
                        .await?;
                }
                None => class_wide_entry = true,
            }
        }

        if class_wide_entry {
            debug!(breakpoint = %cx.id(), class = %loaded.name, "using method entry request");
            cx.add_broad_hit_request(
                RequestTarget::MethodEntry,
                vec![RequestFilter::ClassOnly(loaded.id)],
                Some(loaded),
            )
            .await?;
        }
        if target.exit {
            cx.add_broad_hit_request(
                RequestTarget::MethodExit,
                vec![RequestFilter::ClassOnly(loaded.id)],
                Some(loaded),
            )
            .await?;
        }
        Ok(())
    }

    fn accepts(&self, resolution: &ResolutionState, event: &Event) -> bool {
        match (&event.details, event.location) {
            (EventDetails::MethodEntry | EventDetails::MethodExit { .. }, Some(location)) => resolution
                .accepted_methods
                .contains(&(location.type_id, location.method_id)),
            (EventDetails::MethodEntry | EventDetails::MethodExit { .. }, None) => false,
            _ => true,
        }
    }

    fn hit_variable(&self, event: &Event) -> Option<HitVariable> {
        match &event.details {
            EventDetails::MethodExit {
                return_value: Some(value),
            } => Some(HitVariable {
                name: "return value",
                value: value.clone(),
            }),
            _ => None,
        }
    }
}
