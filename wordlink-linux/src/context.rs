//! Per-session context shared by the sender, the listener and the service handle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wordlink_core::protocol::{IO_TIMEOUT, PING_TIMEOUT, RESEND_INTERVAL};
use wordlink_core::{AddressBook, EventSink, GameFeeder, GameStore, TransportEvent};

use crate::adapter::Adapter;
use crate::config::Config;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub ping: Duration,
    pub io: Duration,
    pub resend_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ping: PING_TIMEOUT,
            io: IO_TIMEOUT,
            resend_interval: RESEND_INTERVAL,
        }
    }
}

impl From<&Config> for Timeouts {
    fn from(c: &Config) -> Self {
        Self {
            ping: c.ping_timeout(),
            io: c.io_timeout(),
            resend_interval: c.resend_interval(),
        }
    }
}

pub struct TransportContext {
    pub address_book: Arc<AddressBook>,
    pub adapter: Arc<dyn Adapter>,
    pub games: Arc<dyn GameStore>,
    pub feeder: Arc<dyn GameFeeder>,
    pub events: Arc<dyn EventSink>,
    pub timeouts: Timeouts,
    errors: AtomicU32,
}

impl TransportContext {
    pub fn new(
        address_book: Arc<AddressBook>,
        adapter: Arc<dyn Adapter>,
        games: Arc<dyn GameStore>,
        feeder: Arc<dyn GameFeeder>,
        events: Arc<dyn EventSink>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            address_book,
            adapter,
            games,
            feeder,
            events,
            timeouts,
            errors: AtomicU32::new(0),
        }
    }

    pub fn post(&self, event: TransportEvent) {
        self.events.post(event);
    }

    /// Count a transport error; returns the new total.
    pub fn record_error(&self) -> u32 {
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn error_count(&self) -> u32 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Default event sink: every event becomes a log line.
pub struct LogEvents;

impl EventSink for LogEvents {
    fn post(&self, event: TransportEvent) {
        match &event {
            TransportEvent::MessageFailout { .. }
            | TransportEvent::BadProto { .. }
            | TransportEvent::ListenerStopped => tracing::warn!("event: {event:?}"),
            TransportEvent::ConnectFailed { .. } | TransportEvent::MessageResend { .. } => {
                tracing::debug!("event: {event:?}")
            }
            _ => tracing::info!("event: {event:?}"),
        }
    }
}
