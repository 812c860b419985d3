//! Shared fixtures for the daemon's tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wordlink_core::{AddressBook, AddressStore, EventSink, TransportEvent};

use crate::adapter::TcpAdapter;
use crate::config::PairedPeer;
use crate::context::{Timeouts, TransportContext};
use crate::games::InMemoryGames;

#[derive(Default)]
pub struct Recorder(Mutex<Vec<TransportEvent>>);

impl Recorder {
    pub fn all(&self) -> Vec<TransportEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&TransportEvent) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// Poll until an event matching `pred` has been posted.
    pub async fn wait_for(&self, pred: impl Fn(&TransportEvent) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(&pred) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("event never posted");
    }
}

impl EventSink for Recorder {
    fn post(&self, event: TransportEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct MemoryStore(Mutex<Vec<String>>);

impl AddressStore for MemoryStore {
    fn get_addresses(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.0.lock().unwrap().clone())
    }

    fn set_addresses(&self, addresses: &[String]) -> anyhow::Result<()> {
        *self.0.lock().unwrap() = addresses.to_vec();
        Ok(())
    }
}

pub fn timeouts() -> Timeouts {
    Timeouts {
        ping: Duration::from_secs(1),
        io: Duration::from_secs(2),
        resend_interval: Duration::from_millis(200),
    }
}

pub fn context(paired: &[(&str, &str)]) -> (Arc<TransportContext>, Arc<Recorder>) {
    context_with(paired, Arc::new(InMemoryGames::new()))
}

pub fn context_with(
    paired: &[(&str, &str)],
    games: Arc<InMemoryGames>,
) -> (Arc<TransportContext>, Arc<Recorder>) {
    context_timed(paired, games, timeouts())
}

/// A resend interval far beyond any test's patience, so only explicit sweeps retry.
pub fn slow_resend() -> Timeouts {
    Timeouts {
        resend_interval: Duration::from_secs(600),
        ..timeouts()
    }
}

pub fn context_timed(
    paired: &[(&str, &str)],
    games: Arc<InMemoryGames>,
    timeouts: Timeouts,
) -> (Arc<TransportContext>, Arc<Recorder>) {
    let paired: Vec<PairedPeer> = paired
        .iter()
        .map(|(name, address)| PairedPeer {
            name: (*name).to_owned(),
            address: (*address).to_owned(),
        })
        .collect();
    let events = Arc::new(Recorder::default());
    let ctx = TransportContext::new(
        Arc::new(AddressBook::load(Arc::new(MemoryStore::default()))),
        Arc::new(TcpAdapter::new("test", &paired, 45690)),
        games.clone(),
        games,
        events.clone(),
        timeouts,
    );
    (Arc::new(ctx), events)
}
