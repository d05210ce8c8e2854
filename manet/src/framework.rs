use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use educe::Educe;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Address of a client on the simulated network, MUST be unique within a simulator
pub type NodeId = String;
/// Index of a connection inside the simulator's connection arena
pub type ConnectionId = usize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    Dsdv,
    Aodv,
    Dsr,
    Olsr,
}

impl Display for ProtocolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProtocolKind::Dsdv => "DSDV",
            ProtocolKind::Aodv => "AODV",
            ProtocolKind::Dsr => "DSR",
            ProtocolKind::Olsr => "OLSR",
        };
        f.write_str(name)
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dsdv" => Ok(ProtocolKind::Dsdv),
            "aodv" => Ok(ProtocolKind::Aodv),
            "dsr" => Ok(ProtocolKind::Dsr),
            "olsr" => Ok(ProtocolKind::Olsr),
            other => Err(format!("unknown routing protocol '{other}'")),
        }
    }
}

/// Protocol Parameters, all intervals are counted in simulation steps
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// DSDV full table broadcast and OLSR cycle restart interval
    pub periodic_update_interval: u64,
    /// AODV hello broadcast interval
    pub hello_interval: u64,
    /// steps to wait for a route reply before a route request is repeated
    pub discovery_timeout: u64,
    /// how many times a route request is repeated before buffered data is dropped
    pub discovery_retries: u32,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            periodic_update_interval: 10,
            hello_interval: 10,
            discovery_timeout: 12,
            discovery_retries: 2,
        }
    }
}

/// Something observable changed, raised for the rendering layer
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StateEvent {
    Client(NodeId),
    Connection(String),
    RoutingTable(NodeId),
}

pub trait StateObserver: Send + Sync {
    fn state_changed(&self, event: &StateEvent);
}

impl<F: Fn(&StateEvent) + Send + Sync> StateObserver for F {
    fn state_changed(&self, event: &StateEvent) {
        self(event)
    }
}

/// Shared list of observers, cloned into every client and connection of a simulator
#[derive(Clone, Default, Educe)]
#[educe(Debug)]
pub struct Notifier {
    #[educe(Debug(ignore))]
    observers: Arc<RwLock<Vec<Arc<dyn StateObserver>>>>,
}

impl Notifier {
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) {
        self.observers.write().push(observer);
    }

    pub fn notify(&self, event: StateEvent) {
        for observer in self.observers.read().iter() {
            observer.state_changed(&event);
        }
    }
}
