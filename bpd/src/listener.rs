// Hit and validity logging
//
// The daemon has no UI; every notification becomes a log line.

use breakpoint_engine::event::{HitCountChanged, ValidityChanged};
use breakpoint_engine::{BreakpointHit, BreakpointListener, HitResponse, Validity};
use tracing::{debug, info, warn};

pub struct LoggingListener;

impl BreakpointListener for LoggingListener {
    fn breakpoint_hit(&self, hit: &BreakpointHit) -> HitResponse {
        let variable = hit
            .variable
            .as_ref()
            .map(|v| format!("{} = {}", v.name, v.value));
        info!(
            breakpoint = %hit.breakpoint,
            kind = ?hit.kind,
            thread = ?hit.thread,
            class = hit.declaring_type.as_deref().unwrap_or("?"),
            hit_count = hit.hit_count,
            variable = variable.as_deref().unwrap_or(""),
            "{}",
            hit.message.as_deref().unwrap_or("breakpoint hit")
        );
        if let Some(error) = &hit.condition_error {
            warn!(breakpoint = %hit.breakpoint, %error, "condition failed, stopping anyway");
        }
        HitResponse::Default
    }

    fn hit_count_changed(&self, change: &HitCountChanged) {
        debug!(breakpoint = %change.breakpoint, hit_count = change.hit_count, "hit count");
    }

    fn validity_changed(&self, change: &ValidityChanged) {
        match change.validity {
            Validity::Invalid => warn!(
                breakpoint = %change.breakpoint,
                reason = change.reason.as_deref().unwrap_or(""),
                "breakpoint invalid"
            ),
            validity => info!(breakpoint = %change.breakpoint, ?validity, "breakpoint validity"),
        }
    }
}
