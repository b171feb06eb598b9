// Step/breakpoint arbitration
//
// A breakpoint that fires while single-steps are pending must not corrupt the
// stepping state. Hits on the stepping thread are let go; hits that would stop
// the whole VM while other threads step follow a remembered policy.

use crate::error::TransportResult;
use crate::facade::RemoteRequestFacade;
use crate::spec::SuspendPolicy;
use crate::types::ThreadId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How to treat a stopping hit while other threads are stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepConflictPolicy {
    /// Stop at the breakpoint, interrupting the pending steps
    Interrupt,
    /// Resume the breakpoint thread and let the steps finish
    ContinueStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    Stop,
    LetGo,
}

#[derive(Debug, Default)]
pub struct StepArbiter {
    remembered: Mutex<Option<StepConflictPolicy>>,
}

impl StepArbiter {
    pub fn new(remembered: Option<StepConflictPolicy>) -> Self {
        Self {
            remembered: Mutex::new(remembered),
        }
    }

    /// Record the user's decision for later conflicts
    pub fn remember(&self, policy: StepConflictPolicy) {
        *self.remembered.lock() = Some(policy);
    }

    pub fn forget(&self) {
        *self.remembered.lock() = None;
    }

    pub fn remembered(&self) -> Option<StepConflictPolicy> {
        *self.remembered.lock()
    }

    pub async fn arbitrate(
        &self,
        facade: &dyn RemoteRequestFacade,
        thread: Option<ThreadId>,
        suspend: SuspendPolicy,
    ) -> TransportResult<Arbitration> {
        let mut steps = Vec::new();
        for step in facade.step_requests().await? {
            if facade.is_thread_alive(step.thread).await.unwrap_or(false) {
                steps.push(step);
            } else {
                debug!(request = %step.key, thread = step.thread, "pruning step of dead thread");
                facade.delete(step.key).await.ok();
            }
        }

        if steps.is_empty() {
            return Ok(Arbitration::Stop);
        }

        if thread.is_some_and(|t| steps.iter().any(|s| s.thread == t)) {
            debug!(?thread, "breakpoint hit while stepping the same thread; letting it go");
            return Ok(Arbitration::LetGo);
        }

        if suspend != SuspendPolicy::All {
            return Ok(Arbitration::Stop);
        }

        match self.remembered().unwrap_or(StepConflictPolicy::Interrupt) {
            StepConflictPolicy::Interrupt => Ok(Arbitration::Stop),
            StepConflictPolicy::ContinueStep => {
                debug!(steps = steps.len(), "letting pending steps continue");
                Ok(Arbitration::LetGo)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockVm;

    #[tokio::test]
    async fn test_no_steps_stops() {
        let vm = MockVm::new();
        let arbiter = StepArbiter::default();
        let result = arbiter.arbitrate(&*vm, Some(1), SuspendPolicy::All).await.unwrap();
        assert_eq!(result, Arbitration::Stop);
    }

    #[tokio::test]
    async fn test_same_thread_step_lets_go() {
        let vm = MockVm::new();
        vm.add_step(7);
        let arbiter = StepArbiter::default();
        let result = arbiter
            .arbitrate(&*vm, Some(7), SuspendPolicy::EventThread)
            .await
            .unwrap();
        assert_eq!(result, Arbitration::LetGo);
    }

    #[tokio::test]
    async fn test_other_thread_step_follows_remembered_policy() {
        let vm = MockVm::new();
        vm.add_step(8);
        let arbiter = StepArbiter::default();

        // Default: do not resume automatically
        let result = arbiter.arbitrate(&*vm, Some(7), SuspendPolicy::All).await.unwrap();
        assert_eq!(result, Arbitration::Stop);

        arbiter.remember(StepConflictPolicy::ContinueStep);
        let result = arbiter.arbitrate(&*vm, Some(7), SuspendPolicy::All).await.unwrap();
        assert_eq!(result, Arbitration::LetGo);

        // Only the event thread stops, the stepping thread is unaffected
        let result = arbiter
            .arbitrate(&*vm, Some(7), SuspendPolicy::EventThread)
            .await
            .unwrap();
        assert_eq!(result, Arbitration::Stop);
    }

    #[tokio::test]
    async fn test_dead_step_threads_are_pruned() {
        let vm = MockVm::new();
        vm.add_step(8);
        vm.kill_thread(8);
        let arbiter = StepArbiter::new(Some(StepConflictPolicy::ContinueStep));

        let result = arbiter.arbitrate(&*vm, Some(7), SuspendPolicy::All).await.unwrap();
        assert_eq!(result, Arbitration::Stop);
        assert!(vm.steps().is_empty());
    }
}
