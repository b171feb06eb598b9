// Class load/unload breakpoints: the filters are the requests

use super::{class_match_filters, Anchor, KindResolver, ResolveContext};
use crate::error::TransportResult;
use crate::event::{Event, EventDetails, HitVariable};
use crate::facade::RequestTarget;
use crate::session::DebugSession;
use crate::spec::{BreakpointKind, BreakpointSpec, SpecId};
use crate::types::Value;
use async_trait::async_trait;

pub(crate) struct ClassResolver;

#[async_trait]
impl KindResolver for ClassResolver {
    fn anchor(&self, spec: &BreakpointSpec, _id: SpecId, _session: &DebugSession) -> Anchor {
        match &spec.kind {
            BreakpointKind::Class {
                load: false,
                unload: false,
                ..
            } => Anchor::Invalid("class breakpoint watches neither load nor unload".to_string()),
            BreakpointKind::Class { .. } => Anchor::VmWide,
            _ => Anchor::Invalid("not a class breakpoint".to_string()),
        }
    }

    async fn submit_vm_wide(&self, cx: &mut ResolveContext<'_>) -> TransportResult<()> {
        let BreakpointKind::Class {
            class_filters,
            class_exclusions,
            load,
            unload,
        } = cx.spec().kind.clone()
        else {
            return Ok(());
        };

        // JDWP ANDs ClassMatch modifiers, so each filter gets its own request
        let mut patterns: Vec<Option<&str>> = class_filters.iter().map(|f| Some(f.as_str())).collect();
        if patterns.is_empty() {
            patterns.push(None);
        }

        for pattern in patterns {
            let filters = class_match_filters(pattern, &class_exclusions);
            if load {
                cx.add_hit_request(RequestTarget::ClassPrepare, filters.clone(), None)
                    .await?;
            }
            if unload {
                cx.add_hit_request(RequestTarget::ClassUnload, filters, None)
                    .await?;
            }
        }
        Ok(())
    }

    fn hit_variable(&self, event: &Event) -> Option<HitVariable> {
        match &event.details {
            EventDetails::ClassPrepare { loaded } => Some(HitVariable {
                name: "class",
                value: Value::Object {
                    id: loaded.id,
                    type_name: Some(loaded.name.clone()),
                },
            }),
            _ => None,
        }
    }
}
