//! Outbound delivery seam.

use crate::envelope::OutboundEnvelope;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

/// Delivers outbound envelopes to the hosted page.
///
/// This is the single place where the implementation marshals onto a
/// host-specific thread; everything upstream may run anywhere.
#[async_trait]
pub trait PageSink: Send + Sync {
    async fn deliver(&self, envelope: &OutboundEnvelope);
}

/// Sink recording every outbound envelope, for tests.
#[derive(Debug, Default)]
pub struct CapturePageSink {
    sent: Mutex<Vec<OutboundEnvelope>>,
    notify: Notify,
}

impl CapturePageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every envelope delivered so far, in order.
    pub fn sent(&self) -> Vec<OutboundEnvelope> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until an envelope with the given name has been delivered.
    pub async fn wait_for(&self, name: &str) -> OutboundEnvelope {
        loop {
            let notified = self.notify.notified();
            if let Some(envelope) = self
                .sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .find(|envelope| envelope.name == name)
                .cloned()
            {
                return envelope;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl PageSink for CapturePageSink {
    async fn deliver(&self, envelope: &OutboundEnvelope) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());
        self.notify.notify_waiters();
    }
}
