//! Radio adapter seam. The TCP adapter stands in for a Bluetooth radio: "paired" devices come
//! from config and the radio can be switched off by a radio-changed command.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use wordlink_core::PeerAddress;

use crate::config::PairedPeer;

/// A device the radio knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    pub name: String,
    pub address: PeerAddress,
}

pub trait Adapter: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, on: bool);
    fn local_name(&self) -> String;
    fn paired_devices(&self) -> Vec<PairedDevice>;
    /// Stop any device discovery in progress; some stacks fail to connect otherwise.
    fn cancel_discovery(&self);
    /// Work out which device an inbound connection came from.
    fn identify(&self, remote: SocketAddr) -> PairedDevice;
}

pub struct TcpAdapter {
    name: String,
    paired: Vec<PairedDevice>,
    default_port: u16,
    enabled: AtomicBool,
}

impl TcpAdapter {
    pub fn new(name: impl Into<String>, paired: &[PairedPeer], default_port: u16) -> Self {
        Self {
            name: name.into(),
            paired: paired
                .iter()
                .map(|p| PairedDevice {
                    name: p.name.clone(),
                    address: PeerAddress::new(p.address.as_str()),
                })
                .collect(),
            default_port,
            enabled: AtomicBool::new(true),
        }
    }
}

impl Adapter for TcpAdapter {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::SeqCst);
    }

    fn local_name(&self) -> String {
        self.name.clone()
    }

    fn paired_devices(&self) -> Vec<PairedDevice> {
        self.paired.clone()
    }

    fn cancel_discovery(&self) {}

    // The remote port of an inbound TCP connection is ephemeral, so match on the host part and
    // fall back to the host plus our own listen port.
    fn identify(&self, remote: SocketAddr) -> PairedDevice {
        let ip = remote.ip();
        let known = self.paired.iter().find(|d| {
            d.address
                .as_str()
                .parse::<SocketAddr>()
                .is_ok_and(|a| a.ip() == ip)
        });
        match known {
            Some(d) => d.clone(),
            None => {
                let address = PeerAddress::new(SocketAddr::new(ip, self.default_port).to_string());
                PairedDevice {
                    name: address.to_string(),
                    address,
                }
            }
        }
    }
}
