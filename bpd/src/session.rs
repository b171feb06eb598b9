// Event pump
//
// Feeds composite events from the VM into the registry, then releases the
// threads each event set suspended unless a breakpoint asked to stop.

use crate::facade::JdwpFacade;
use breakpoint_engine::{BreakpointRegistry, Decision};
use jdwp_client::commands::suspend_policies;
use jdwp_client::{EventKind, EventSet, JdwpResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How a stopped VM gets going again
pub enum ResumeMode {
    /// Log the stop and resume at once
    Auto,
    /// Wait for a signal, e.g. a line on stdin
    Manual(mpsc::Receiver<()>),
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    VmDied,
}

pub struct EventPump {
    facade: Arc<JdwpFacade>,
    resume: ResumeMode,
}

impl EventPump {
    pub fn new(facade: Arc<JdwpFacade>, resume: ResumeMode) -> Self {
        Self { facade, resume }
    }

    /// Run until the VM dies or the connection drops
    pub async fn run(&mut self, registry: &BreakpointRegistry) -> JdwpResult<()> {
        let conn = self.facade.connection().clone();
        while let Some(set) = conn.recv_event().await {
            match self.deliver(&set, registry).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::VmDied) => {
                    info!("target VM exited");
                    return Ok(());
                }
                Err(e) if e.is_disconnect() => break,
                Err(e) => return Err(e),
            }
        }
        info!("connection to target VM closed");
        Ok(())
    }

    async fn deliver(&mut self, set: &EventSet, registry: &BreakpointRegistry) -> JdwpResult<Flow> {
        let mut decision = Decision::Resume;
        let mut thread = None;
        for event in &set.events {
            if event.details == EventKind::VMDeath {
                return Ok(Flow::VmDied);
            }
            thread = thread.or(event.details.thread());
            if let Some(event) = self.facade.translate(event).await {
                decision = decision.merge(registry.dispatch(&event).await);
            }
        }

        if set.suspend_policy == suspend_policies::NONE {
            return Ok(Flow::Continue);
        }
        if decision == Decision::Suspend {
            self.wait_for_resume(thread).await;
        }

        let conn = self.facade.connection();
        match (set.suspend_policy, thread) {
            (suspend_policies::EVENT_THREAD, Some(thread)) => {
                if let Err(e) = conn.resume_thread(thread).await {
                    if !(e.is_invalid_thread() || e.is_invalid_object()) {
                        return Err(e);
                    }
                    debug!(thread, "event thread gone before resume");
                }
            }
            _ => conn.resume_all().await?,
        }
        Ok(Flow::Continue)
    }

    async fn wait_for_resume(&mut self, thread: Option<u64>) {
        match &mut self.resume {
            ResumeMode::Auto => debug!(?thread, "auto-resuming"),
            ResumeMode::Manual(signal) => {
                info!(?thread, "suspended, press Enter to resume");
                if signal.recv().await.is_none() {
                    warn!("resume input closed, resuming");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::tests::fake_agent;
    use breakpoint_engine::mock::RecordingListener;
    use breakpoint_engine::{
        BreakpointSpec, DebugSession, DirectorySourceResolver, SuspendPolicy,
    };
    use jdwp_client::commands::{command_sets, event_kinds, event_set_commands, thread_commands};
    use jdwp_client::protocol::CommandPacket;

    fn composite(policy: u8, events: &[(u8, i32, u64)]) -> Vec<u8> {
        let mut body = vec![policy];
        body.extend_from_slice(&(events.len() as i32).to_be_bytes());
        for (kind, request, thread) in events {
            body.push(*kind);
            body.extend_from_slice(&request.to_be_bytes());
            if *kind != event_kinds::VM_DEATH {
                body.extend_from_slice(&thread.to_be_bytes());
            }
        }
        CommandPacket::with_data(1, command_sets::EVENT, event_set_commands::COMPOSITE, body)
            .encode()
    }

    #[tokio::test]
    async fn test_thread_start_hit_resumes_event_thread() {
        let (conn, agent) = fake_agent().await;
        let facade = JdwpFacade::attach(conn).await.unwrap();
        let sources = Arc::new(DirectorySourceResolver::new(Vec::new()));
        let session = DebugSession::builder("bpd-test", facade.clone(), sources).build();
        let listener = RecordingListener::new();
        session.add_listener(listener.clone());
        let registry = BreakpointRegistry::new(session);
        registry.on_session_running().await.unwrap();

        let spec = BreakpointSpec::thread(true, false).with_suspend(SuspendPolicy::EventThread);
        let breakpoint = registry.add_breakpoint(spec).await.unwrap();
        registry.flush().await.unwrap();

        // First request the agent hands out is 100
        agent
            .push
            .send(composite(
                suspend_policies::EVENT_THREAD,
                &[(event_kinds::THREAD_START, 100, 0x42)],
            ))
            .unwrap();
        agent
            .push
            .send(composite(suspend_policies::NONE, &[(event_kinds::VM_DEATH, 0, 0)]))
            .unwrap();

        let mut pump = EventPump::new(facade, ResumeMode::Auto);
        pump.run(&registry).await.unwrap();

        let hits = listener.hits_of(breakpoint.id());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].thread, Some(0x42));

        let resumed: Vec<_> = agent
            .received
            .lock()
            .iter()
            .filter(|(set, command, _)| {
                *set == command_sets::THREAD_REFERENCE && *command == thread_commands::RESUME
            })
            .map(|(_, _, body)| body.clone())
            .collect();
        assert_eq!(resumed, vec![0x42u64.to_be_bytes().to_vec()]);
    }

    #[tokio::test]
    async fn test_foreign_event_resumes_vm() {
        let (conn, agent) = fake_agent().await;
        let facade = JdwpFacade::attach(conn).await.unwrap();
        let sources = Arc::new(DirectorySourceResolver::new(Vec::new()));
        let session = DebugSession::builder("bpd-test", facade.clone(), sources).build();
        let registry = BreakpointRegistry::new(session);

        agent
            .push
            .send(composite(suspend_policies::ALL, &[(event_kinds::VM_START, 0, 1)]))
            .unwrap();
        agent
            .push
            .send(composite(suspend_policies::NONE, &[(event_kinds::VM_DEATH, 0, 0)]))
            .unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let mut pump = EventPump::new(facade, ResumeMode::Manual(rx));
        pump.run(&registry).await.unwrap();

        let received = agent.received.lock();
        assert!(received
            .iter()
            .any(|(set, command, _)| *set == command_sets::VIRTUAL_MACHINE
                && *command == jdwp_client::commands::vm_commands::RESUME));
    }
}
