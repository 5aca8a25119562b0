//! Typed event sink (spec §6 "Logger: pluggable sink ... core never
//! prints to standard streams directly"; spec §7 "User-visible
//! failures"; SPEC_FULL §9 "Events flow through a typed event sink owned
//! by the orchestrator").
//!
//! The orchestrator and UTXO pool never call `tracing` directly for
//! anything the game layer needs to react to — they emit one of these
//! and let the sink decide how (or whether) to surface it. The default
//! sink logs through `tracing`, matching the density the teacher's
//! `heartbeat_attestation.rs` logs at.

use crate::error::SendError;

/// Every user-visible failure or advisory named in spec §7.
#[derive(Clone, Debug, PartialEq)]
pub enum AnchorEvent {
    AnchorFailed { anchor_type: crate::types::AnchorType, error: SendError },
    AnchorRetryNeeded { reason: String },
    LowFundsWarning,
    PoolLow { available: usize },
    PoolEmpty,
    GenesisAnchorFailed { error: SendError },
}

/// Sink trait the orchestrator and pool emit through. Implement this to
/// route events into a game UI, metrics pipeline, or test harness.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnchorEvent);
}

/// Default sink: logs every event through `tracing` at a severity that
/// matches the event's user-facing weight.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: AnchorEvent) {
        match event {
            AnchorEvent::AnchorFailed { anchor_type, error } => {
                tracing::warn!(?anchor_type, %error, "anchor send failed");
            }
            AnchorEvent::AnchorRetryNeeded { reason } => {
                tracing::info!(reason, "anchor retry needed");
            }
            AnchorEvent::LowFundsWarning => {
                tracing::warn!("low funds warning");
            }
            AnchorEvent::PoolLow { available } => {
                tracing::warn!(available, "utxo pool low");
            }
            AnchorEvent::PoolEmpty => {
                tracing::error!("utxo pool empty, degraded mode");
            }
            AnchorEvent::GenesisAnchorFailed { error } => {
                tracing::error!(%error, "genesis anchor permanently failed");
            }
        }
    }
}

/// Sink that drops every event. Useful for tests that don't care about
/// event traffic.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: AnchorEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<AnchorEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: AnchorEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn recording_sink_captures_emitted_events() {
        let sink = RecordingSink { events: Mutex::new(Vec::new()) };
        sink.emit(AnchorEvent::PoolEmpty);
        sink.emit(AnchorEvent::PoolLow { available: 2 });
        assert_eq!(sink.events.lock().unwrap().len(), 2);
    }
}
