// Thread start/death breakpoints

use super::{Anchor, KindResolver, ResolveContext};
use crate::error::TransportResult;
use crate::event::{Event, HitVariable};
use crate::facade::RequestTarget;
use crate::session::DebugSession;
use crate::spec::{BreakpointKind, BreakpointSpec, SpecId};
use crate::types::Value;
use async_trait::async_trait;

pub(crate) struct ThreadResolver;

#[async_trait]
impl KindResolver for ThreadResolver {
    fn anchor(&self, spec: &BreakpointSpec, _id: SpecId, _session: &DebugSession) -> Anchor {
        match spec.kind {
            BreakpointKind::Thread {
                start: false,
                death: false,
            } => Anchor::Invalid("thread breakpoint watches neither start nor death".to_string()),
            BreakpointKind::Thread { .. } => Anchor::VmWide,
            _ => Anchor::Invalid("not a thread breakpoint".to_string()),
        }
    }

    async fn submit_vm_wide(&self, cx: &mut ResolveContext<'_>) -> TransportResult<()> {
        let BreakpointKind::Thread { start, death } = cx.spec().kind else {
            return Ok(());
        };
        if start {
            cx.add_hit_request(RequestTarget::ThreadStart, Vec::new(), None)
                .await?;
        }
        if death {
            cx.add_hit_request(RequestTarget::ThreadDeath, Vec::new(), None)
                .await?;
        }
        Ok(())
    }

    fn hit_variable(&self, event: &Event) -> Option<HitVariable> {
        event.thread.map(|thread| HitVariable {
            name: "thread",
            value: Value::Object {
                id: thread,
                type_name: Some("java.lang.Thread".to_string()),
            },
        })
    }
}
