// Line breakpoints
//
// Resolved against the class holding the source line and its nested classes.
// A line without code is moved to the nearest breakable line of the top-level
// class and the new line is written back to the breakpoint.

use super::{Anchor, ClassFilters, KindResolver, ResolveContext};
use crate::error::TransportResult;
use crate::facade::RequestTarget;
use crate::session::DebugSession;
use crate::spec::{BreakpointKind, BreakpointSpec, SpecId};
use crate::types::LoadedType;
use async_trait::async_trait;
use tracing::info;

pub(crate) struct LineResolver;

fn url_and_line(spec: &BreakpointSpec) -> Option<(&str, i32)> {
    match &spec.kind {
        BreakpointKind::Line { url, line } => Some((url.as_str(), *line)),
        _ => None,
    }
}

/// Nearest line with code; on a tie the later line wins
pub(crate) fn nearest_line(lines: &[i32], line: i32) -> Option<i32> {
    lines
        .iter()
        .copied()
        .min_by_key(|l| ((*l - line).abs(), *l < line))
}

#[async_trait]
impl KindResolver for LineResolver {
    fn anchor(&self, spec: &BreakpointSpec, id: SpecId, session: &DebugSession) -> Anchor {
        let Some((url, line)) = url_and_line(spec) else {
            return Anchor::Invalid("not a line breakpoint".to_string());
        };
        let sources = session.sources();
        if sources.relative_path_for(url).is_none() {
            return Anchor::Inapplicable(format!("{} is not part of the project", url));
        }

        let class = match session.class_names().get(id) {
            Some(class) => Some(class),
            None => {
                let class = sources.class_name_for_source_location(url, line);
                if let Some(class) = &class {
                    session.class_names().insert(id, class.clone());
                }
                class
            }
        };
        let Some(class) = class else {
            return Anchor::Invalid(format!("no class found at {}:{}", url, line));
        };

        Anchor::Classes(ClassFilters {
            names: vec![class.clone(), format!("{}$*", class)],
            exclusions: Vec::new(),
            source_url: Some(url.to_string()),
        })
    }

    async fn class_loaded(
        &self,
        cx: &mut ResolveContext<'_>,
        loaded: &LoadedType,
    ) -> TransportResult<()> {
        let Some((url, line)) = url_and_line(cx.spec()).map(|(u, l)| (u.to_string(), l)) else {
            return Ok(());
        };
        let facade = cx.facade();

        let locations = facade.line_locations(loaded.id, line).await?;
        if !locations.is_empty() {
            for location in locations {
                cx.add_hit_request(RequestTarget::Breakpoint(location), Vec::new(), Some(loaded))
                    .await?;
            }
            return Ok(());
        }

        // Nested classes only hold part of the file; relocation is decided
        // by the top-level class
        let top_level = cx.resolution().class_name.clone();
        if top_level.as_deref() != Some(loaded.name.as_str()) {
            return Ok(());
        }
        for nested in facade.loaded_classes(&format!("{}$*", loaded.name)).await? {
            if !facade.line_locations(nested.id, line).await?.is_empty() {
                return Ok(());
            }
        }

        let lines = facade.line_numbers(loaded.id).await?;
        let Some(adjusted) = nearest_line(&lines, line) else {
            cx.mark_invalid(format!("no executable code at line {} in {}", line, loaded.name));
            return Ok(());
        };

        let breakpoints = cx.session().breakpoints();
        if let Some(other) = breakpoints.line_breakpoint_at(&url, adjusted, cx.id()) {
            cx.mark_invalid(format!(
                "line {} has no code and line {} already has breakpoint {}",
                line, adjusted, other
            ));
            return Ok(());
        }

        info!(breakpoint = %cx.id(), from = line, to = adjusted, "relocating line breakpoint");
        let relocate = |spec: &mut BreakpointSpec| {
            if let BreakpointKind::Line { line, .. } = &mut spec.kind {
                *line = adjusted;
            }
        };
        cx.breakpoint().update(relocate);
        relocate(cx.spec_mut());

        for location in facade.line_locations(loaded.id, adjusted).await? {
            cx.add_hit_request(RequestTarget::Breakpoint(location), Vec::new(), Some(loaded))
                .await?;
        }
        Ok(())
    }
}
