//! Status notifications and the email hook.

use tracing::{debug, warn};

use jobagent_events::{EventBus, InMemoryEventBus, NotifyTarget, Phase, StatusEvent};

/// Publishes [`StatusEvent`]s on a bus.
///
/// Notifications are best effort: a failed publish is logged and dropped,
/// never turned into a job failure.
#[derive(Debug, Clone)]
pub struct Notifier<B> {
    bus: B,
}

impl<B> Notifier<B>
where
    B: EventBus<StatusEvent>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn notify(&self, target: NotifyTarget, phase: Phase, description: impl Into<String>) {
        let event = StatusEvent::new(target, phase, description);
        debug!(target_id = %event.target, phase = ?event.phase, description = %event.description, "notify");
        if let Err(e) = self.bus.publish(event) {
            warn!(target_id = %target, phase = ?phase, error = ?e, "failed to publish status event");
        }
    }
}

impl Notifier<InMemoryEventBus<StatusEvent>> {
    /// Notifier backed by an in-process bus.
    pub fn in_memory() -> Self {
        Self::new(InMemoryEventBus::new())
    }
}

/// External email notification subsystem, polled before and after each run.
pub trait EmailHook: Send + Sync {
    /// Deliver any notification mails that are due.
    fn flush_pending(&self);
}

impl<F> EmailHook for F
where
    F: Fn() + Send + Sync,
{
    fn flush_pending(&self) {
        self()
    }
}

/// Email hook for agents without mail delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmailHook;

impl EmailHook for NoopEmailHook {
    fn flush_pending(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobagent_core::{JobId, StepId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn notify_publishes_to_subscribers() {
        let notifier = Notifier::in_memory();
        let sub = notifier.bus().subscribe();

        notifier.notify(
            NotifyTarget::Step(JobId::new(3), StepId::new(8)),
            Phase::Started,
            "JobStep 8 started for Job 3",
        );

        let event = sub.try_recv().unwrap();
        assert_eq!(event.job_id, JobId::new(3));
        assert_eq!(event.phase, Phase::Started);
        assert_eq!(event.target.to_string(), "3:8");
    }

    #[test]
    fn closures_are_email_hooks() {
        let calls = AtomicUsize::new(0);
        let hook = || {
            calls.fetch_add(1, Ordering::SeqCst);
        };

        hook.flush_pending();
        NoopEmailHook.flush_pending();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
