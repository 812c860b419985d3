//! Address book: the persisted set of peers known to run the app.
//! Shared by the sender and the listener; every access goes through one lock.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::peer::PeerAddress;

/// Persistent key-value backing for the address set.
///
/// `set_addresses` runs on the caller's thread with the book locked, so saves never
/// reorder. Keep it to one small write; async callers invoke it from their tasks directly.
pub trait AddressStore: Send + Sync {
    fn get_addresses(&self) -> anyhow::Result<Vec<String>>;
    fn set_addresses(&self, addresses: &[String]) -> anyhow::Result<()>;
}

/// In-memory set of known peer addresses, flushed to its store on every change.
pub struct AddressBook {
    addresses: Mutex<BTreeSet<PeerAddress>>,
    store: Arc<dyn AddressStore>,
}

impl AddressBook {
    /// Read the persisted set once. A failed read is logged and starts an empty book.
    pub fn load(store: Arc<dyn AddressStore>) -> Self {
        let addresses = match store.get_addresses() {
            Ok(list) => list
                .into_iter()
                .filter(|a| !a.is_empty())
                .map(PeerAddress::new)
                .collect(),
            Err(e) => {
                tracing::warn!("address book: load failed, starting empty: {e:#}");
                BTreeSet::new()
            }
        };
        tracing::debug!("address book: loaded {} addresses", addresses.len());
        Self {
            addresses: Mutex::new(addresses),
            store,
        }
    }

    /// Insert and persist. Returns false (and writes nothing) when already present.
    pub fn add(&self, address: &PeerAddress) -> bool {
        if address.is_empty() {
            return false;
        }
        let mut set = self.lock();
        if !set.insert(address.clone()) {
            return false;
        }
        tracing::info!("address book: added {address}");
        self.persist(&set);
        true
    }

    /// Remove every listed address, then persist.
    pub fn remove(&self, addresses: &[PeerAddress]) {
        let mut set = self.lock();
        for a in addresses {
            set.remove(a);
        }
        self.persist(&set);
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.lock().contains(address)
    }

    /// Sorted copy for iterating outside the lock.
    pub fn snapshot(&self) -> Vec<PeerAddress> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<PeerAddress>> {
        self.addresses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Called with the lock held. The next mutation retries by writing the whole set again.
    fn persist(&self, set: &BTreeSet<PeerAddress>) {
        let snapshot: Vec<String> = set.iter().map(|a| a.as_str().to_owned()).collect();
        if let Err(e) = self.store.set_addresses(&snapshot) {
            tracing::warn!("address book: persist failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        saved: Mutex<Vec<String>>,
        writes: AtomicUsize,
        fail: bool,
    }

    impl AddressStore for CountingStore {
        fn get_addresses(&self) -> anyhow::Result<Vec<String>> {
            if self.fail {
                anyhow::bail!("store offline");
            }
            Ok(self.saved.lock().unwrap().clone())
        }

        fn set_addresses(&self, addresses: &[String]) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("store offline");
            }
            *self.saved.lock().unwrap() = addresses.to_vec();
            Ok(())
        }
    }

    #[test]
    fn add_twice_persists_once() {
        let store = Arc::new(CountingStore::default());
        let book = AddressBook::load(store.clone());
        let addr = PeerAddress::new("10.0.0.2:45690");
        assert!(book.add(&addr));
        assert!(!book.add(&addr));
        assert_eq!(book.len(), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(*store.saved.lock().unwrap(), vec!["10.0.0.2:45690"]);
    }

    #[test]
    fn load_reads_persisted_set() {
        let store = Arc::new(CountingStore::default());
        *store.saved.lock().unwrap() = vec!["b".into(), "a".into(), "".into()];
        let book = AddressBook::load(store);
        assert_eq!(
            book.snapshot(),
            vec![PeerAddress::new("a"), PeerAddress::new("b")]
        );
        assert!(book.contains(&PeerAddress::new("a")));
    }

    #[test]
    fn remove_always_persists() {
        let store = Arc::new(CountingStore::default());
        let book = AddressBook::load(store.clone());
        book.add(&PeerAddress::new("a"));
        book.add(&PeerAddress::new("b"));
        book.remove(&[PeerAddress::new("a"), PeerAddress::new("zzz")]);
        book.remove(&[PeerAddress::new("nope")]);
        assert_eq!(store.writes.load(Ordering::SeqCst), 4);
        assert_eq!(book.snapshot(), vec![PeerAddress::new("b")]);
    }

    #[test]
    fn failing_store_keeps_memory_authoritative() {
        let store = Arc::new(CountingStore {
            fail: true,
            ..Default::default()
        });
        let book = AddressBook::load(store);
        assert!(book.is_empty());
        assert!(book.add(&PeerAddress::new("a")));
        assert!(book.contains(&PeerAddress::new("a")));
    }

    #[test]
    fn concurrent_adds_leave_store_matching_book() {
        let store = Arc::new(CountingStore::default());
        let book = Arc::new(AddressBook::load(store.clone()));
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let book = book.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        book.add(&PeerAddress::new(format!("10.0.{t}.{i}:45690")));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        let saved = store.saved.lock().unwrap().clone();
        let in_memory: Vec<String> = book.snapshot().iter().map(|a| a.to_string()).collect();
        assert_eq!(saved.len(), 400);
        assert_eq!(saved, in_memory);
    }

    #[test]
    fn empty_address_ignored() {
        let store = Arc::new(CountingStore::default());
        let book = AddressBook::load(store.clone());
        assert!(!book.add(&PeerAddress::new("")));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }
}
