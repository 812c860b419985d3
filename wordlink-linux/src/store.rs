//! File-backed address store: bincode `Vec<String>`, replaced atomically via rename.
//! Each save writes its own temp file beside the target, so concurrent saves never share one.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use wordlink_core::AddressStore;

pub struct FileAddressStore {
    path: PathBuf,
}

impl FileAddressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AddressStore for FileAddressStore {
    fn get_addresses(&self) -> anyhow::Result<Vec<String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        bincode::deserialize(&bytes).with_context(|| format!("decoding {}", self.path.display()))
    }

    fn set_addresses(&self, addresses: &[String]) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let bytes = bincode::serialize(addresses)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        tmp.write_all(&bytes)
            .with_context(|| format!("writing {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wordlink_core::{AddressBook, PeerAddress};

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAddressStore::new(dir.path().join("addresses.bin"));
        assert!(store.get_addresses().unwrap().is_empty());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/addresses.bin");
        FileAddressStore::new(&path)
            .set_addresses(&["a:1".to_owned(), "b:2".to_owned()])
            .unwrap();
        let again = FileAddressStore::new(&path);
        assert_eq!(again.get_addresses().unwrap(), vec!["a:1", "b:2"]);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.bin");
        std::fs::write(&path, [0xff; 3]).unwrap();
        assert!(FileAddressStore::new(&path).get_addresses().is_err());
    }

    #[test]
    fn concurrent_adds_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.bin");
        let book = Arc::new(AddressBook::load(Arc::new(FileAddressStore::new(&path))));
        let workers: Vec<_> = (0..2)
            .map(|t| {
                let book = book.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        book.add(&PeerAddress::new(format!("10.{t}.0.{i}:45690")));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(book.len(), 400);
        let reloaded = AddressBook::load(Arc::new(FileAddressStore::new(&path)));
        assert_eq!(reloaded.snapshot(), book.snapshot());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n != "addresses.bin")
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }
}
