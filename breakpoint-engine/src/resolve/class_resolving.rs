// Deferred class resolution
//
// Class-anchored breakpoints cannot create their real requests until the
// target class exists in the VM. They arm class prepare (and unload) watches
// for their class filters, then scan what is already loaded. Each matching
// type is handed to the kind resolver exactly once.

use super::{class_match_filters, ClassFilters, ResolveContext};
use crate::error::TransportResult;
use crate::facade::RequestTarget;
use crate::source_roots::RootCheck;
use crate::types::{is_pattern, LoadedType};
use tracing::debug;

fn root_disabled(root: &str) -> String {
    format!("source root {} is disabled", root)
}

/// Arm class watches for `filters` and resolve every matching loaded class
pub(crate) async fn set_requests(
    cx: &mut ResolveContext<'_>,
    filters: ClassFilters,
) -> TransportResult<()> {
    let session = cx.session();
    let mut filters = session
        .class_filters()
        .iter()
        .fold(filters, |filters, chain| chain.filter(cx.spec(), filters));

    if let Some(url) = filters.source_url.clone() {
        match session.roots().check(&url) {
            RootCheck::Disabled(root) => {
                cx.mark_invalid(root_disabled(&root));
                return Ok(());
            }
            RootCheck::Enabled(root) => cx.resolution().source_root = Some(root),
            RootCheck::Unmapped | RootCheck::NoRoot => {}
        }
    } else {
        // Names come from the spec; drop those declared under a disabled root
        let mut disabled = None;
        let names = std::mem::take(&mut filters.names);
        for name in names {
            if is_pattern(&name) {
                filters.names.push(name);
                continue;
            }
            let check = session
                .sources()
                .source_url_for_class(&name)
                .map(|url| session.roots().check(&url));
            match check {
                Some(RootCheck::Disabled(root)) => {
                    debug!(breakpoint = %cx.id(), class = %name, %root, "class under disabled root");
                    disabled = Some(root);
                }
                Some(RootCheck::Enabled(root)) => {
                    cx.resolution().source_root = Some(root);
                    filters.names.push(name);
                }
                _ => filters.names.push(name),
            }
        }
        if filters.names.is_empty() {
            if let Some(root) = disabled {
                cx.mark_invalid(root_disabled(&root));
            }
            return Ok(());
        }
    }

    if filters.names.is_empty() {
        debug!(breakpoint = %cx.id(), "no class filters left, nothing to resolve");
        return Ok(());
    }

    let watch_unload = cx.resolver().watches_unload(cx.spec());
    for name in &filters.names {
        let match_filters = class_match_filters(Some(name), &filters.exclusions);
        cx.add_watch(RequestTarget::ClassPrepare, match_filters.clone())
            .await?;
        if watch_unload {
            cx.add_watch(RequestTarget::ClassUnload, match_filters).await?;
        }
    }

    {
        let resolution = cx.resolution();
        resolution.armed = true;
        resolution.class_name = filters.names.first().cloned();
        resolution.filters = Some(filters.clone());
    }

    for name in &filters.names {
        let loaded = cx.facade().loaded_classes(name).await?;
        for ty in loaded.iter().filter(|t| filters.matches(&t.name)) {
            resolve_type(cx, ty).await?;
        }
    }
    Ok(())
}

/// Hand a loaded type to the kind resolver unless it was already resolved
pub(crate) async fn resolve_type(
    cx: &mut ResolveContext<'_>,
    loaded: &LoadedType,
) -> TransportResult<()> {
    if cx.resolution().resolved.contains_key(&loaded.id) {
        return Ok(());
    }
    cx.resolution()
        .resolved
        .insert(loaded.id, loaded.name.clone());
    debug!(breakpoint = %cx.id(), class = %loaded.name, "resolving class");

    let resolver = cx.resolver();
    resolver.class_loaded(cx, loaded).await
}
