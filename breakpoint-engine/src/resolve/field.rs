// Field watchpoints

use super::{Anchor, ClassFilters, KindResolver, ResolveContext};
use crate::error::TransportResult;
use crate::event::{Event, EventDetails, HitVariable};
use crate::facade::RequestTarget;
use crate::session::DebugSession;
use crate::spec::{BreakpointKind, BreakpointSpec, SpecId};
use crate::types::LoadedType;
use async_trait::async_trait;

pub(crate) struct FieldResolver;

#[async_trait]
impl KindResolver for FieldResolver {
    fn anchor(&self, spec: &BreakpointSpec, _id: SpecId, _session: &DebugSession) -> Anchor {
        match &spec.kind {
            BreakpointKind::Field {
                access: false,
                modification: false,
                ..
            } => Anchor::Invalid("field watch has neither access nor modification".to_string()),
            BreakpointKind::Field { class_name, .. } => {
                Anchor::Classes(ClassFilters::new(vec![class_name.clone()]))
            }
            _ => Anchor::Invalid("not a field breakpoint".to_string()),
        }
    }

    fn uses_custom_hit_count(&self, spec: &BreakpointSpec) -> bool {
        matches!(
            spec.kind,
            BreakpointKind::Field {
                access: true,
                modification: true,
                ..
            }
        )
    }

    async fn class_loaded(
        &self,
        cx: &mut ResolveContext<'_>,
        loaded: &LoadedType,
    ) -> TransportResult<()> {
        let BreakpointKind::Field {
            field_name,
            access,
            modification,
            ..
        } = cx.spec().kind.clone()
        else {
            return Ok(());
        };
        let facade = cx.facade();

        let capabilities = facade.capabilities().await?;
        if access && !capabilities.can_watch_field_access {
            cx.mark_invalid("target VM cannot watch field access");
            return Ok(());
        }
        if modification && !capabilities.can_watch_field_modification {
            cx.mark_invalid("target VM cannot watch field modification");
            return Ok(());
        }

        let fields = facade.fields(loaded.id).await?;
        let Some(field) = fields.iter().find(|f| f.name == field_name) else {
            cx.mark_invalid(format!("no field {} in {}", field_name, loaded.name));
            return Ok(());
        };

        if access {
            let target = RequestTarget::FieldAccess {
                type_id: loaded.id,
                field_id: field.id,
            };
            cx.add_hit_request(target, Vec::new(), Some(loaded)).await?;
        }
        if modification {
            let target = RequestTarget::FieldModification {
                type_id: loaded.id,
                field_id: field.id,
            };
            cx.add_hit_request(target, Vec::new(), Some(loaded)).await?;
        }
        Ok(())
    }

    fn hit_variable(&self, event: &Event) -> Option<HitVariable> {
        match &event.details {
            EventDetails::FieldAccess {
                value: Some(value), ..
            } => Some(HitVariable {
                name: "value",
                value: value.clone(),
            }),
            EventDetails::FieldModification { value_to_be, .. } => Some(HitVariable {
                name: "new value",
                value: value_to_be.clone(),
            }),
            _ => None,
        }
    }
}
