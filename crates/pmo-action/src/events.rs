//! Fan-out of pipeline events to in-process subscribers.

use pmo_core::events::DomainEvent;
use tokio::sync::broadcast;

/// Optional broadcast sender. Sending with no live subscriber is not an
/// error; events are only a notification channel, never the record.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<broadcast::Sender<DomainEvent>>,
}

impl EventSink {
    pub fn new(tx: broadcast::Sender<DomainEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: DomainEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DomainEvent {
        DomainEvent::ProposalRegistered {
            organization_id: "org-a".to_string(),
            proposal_id: "ap-001".to_string(),
            action_type: pmo_core::types::ActionType::TaskCreate,
            correlation_id: "corr-1".to_string(),
        }
    }

    #[test]
    fn test_emit_reaches_subscriber() {
        let (tx, mut rx) = broadcast::channel(4);
        EventSink::new(tx).emit(sample());
        assert_eq!(rx.try_recv().unwrap(), sample());
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        EventSink::new(tx).emit(sample());
        EventSink::disabled().emit(sample());
    }
}
