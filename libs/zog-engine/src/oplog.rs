use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::Span;

use crate::error::{ReceiverError, SinkError, TransportError};
use crate::topic::Topic;
use crate::transport::RoutingDefect;

/// Counters of what a receiver did with its input.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    routed: AtomicU64,
    defects: AtomicU64,
    write_failures: AtomicU64,
    probes: AtomicU64,
    probe_failures: AtomicU64,
}

impl ReceiverStats {
    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn defects(&self) -> u64 {
        self.defects.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn probe_failures(&self) -> u64 {
        self.probe_failures.load(Ordering::Relaxed)
    }
}

/// The receiver's own diagnostic log.
///
/// Every event is emitted under one `receiver` span created here, and counted
/// in [`ReceiverStats`]. Constructed by the caller and handed to the receiver.
#[derive(Debug, Clone)]
pub struct OperationalLogger {
    span: Span,
    stats: Arc<ReceiverStats>,
}

impl OperationalLogger {
    pub fn new(name: &str) -> Self {
        Self {
            span: tracing::info_span!("receiver", name = %name, transport = tracing::field::Empty),
            stats: Arc::new(ReceiverStats::default()),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn stats(&self) -> Arc<ReceiverStats> {
        Arc::clone(&self.stats)
    }

    pub(crate) fn set_transport(&self, kind: &str) {
        self.span.record("transport", kind);
    }

    pub(crate) fn listening(&self, detail: &str) {
        tracing::info!(parent: &self.span, detail = %detail, "receiver running");
    }

    pub(crate) fn routed(&self, topic: &Topic) {
        self.stats.routed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(parent: &self.span, topic = %topic, "routed");
    }

    pub(crate) fn routing_defect(&self, defect: &RoutingDefect) {
        self.stats.defects.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            parent: &self.span,
            channel = %defect.channel,
            payload = %defect.payload,
            item_type = %defect.kind,
            reason = %defect.reason,
            "malformed item dropped"
        );
    }

    pub(crate) fn write_failed(&self, topic: &Topic, error: &SinkError) {
        self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(parent: &self.span, topic = %topic, error = %error, "log write failed, line dropped");
    }

    pub(crate) fn probe_ok(&self) {
        self.stats.probes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(parent: &self.span, "health probe ok");
    }

    pub(crate) fn probe_failed(&self, error: &TransportError) {
        self.stats.probes.fetch_add(1, Ordering::Relaxed);
        self.stats.probe_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(parent: &self.span, error = %error, "health probe failed");
    }

    pub(crate) fn terminated(&self, error: &ReceiverError) {
        match error {
            ReceiverError::Interrupted => {
                tracing::info!(parent: &self.span, "receiver interrupted");
            }
            other => {
                tracing::error!(parent: &self.span, error = %other, "receiver terminated");
            }
        }
    }
}
