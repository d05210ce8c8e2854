use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::concepts::client::{Client, Location, OutboundMessage};
use crate::concepts::connection::Connection;
use crate::concepts::message::Message;
use crate::feedback::{RoutingError, TopologyError};
use crate::framework::{ConnectionId, Notifier, ProtocolKind, ProtocolParams, StateObserver};
use std::sync::Arc;

/// Owns every client and connection and advances them in lock step.
///
/// One global step lets every client run its routing step in insertion order, then
/// flushes every connection. No client observes a neighbour's output within the step
/// that produced it.
#[derive(Debug, Serialize, Deserialize)]
#[serde(from = "SimulatorState")]
pub struct Simulator {
    params: ProtocolParams,
    clients: Vec<Client>,
    /// removed connections stay detached in place so ids remain stable
    connections: Vec<Connection>,
    step: u64,
    #[serde(skip)]
    notifier: Notifier,
}

#[derive(Deserialize)]
struct SimulatorState {
    params: ProtocolParams,
    clients: Vec<Client>,
    connections: Vec<Connection>,
    step: u64,
}

impl From<SimulatorState> for Simulator {
    fn from(state: SimulatorState) -> Self {
        let mut simulator = Simulator {
            params: state.params,
            clients: state.clients,
            connections: state.connections,
            step: state.step,
            notifier: Notifier::default(),
        };
        simulator.rewire();
        simulator
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::with_params(ProtocolParams::default())
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: ProtocolParams) -> Self {
        Self {
            params,
            clients: Vec::new(),
            connections: Vec::new(),
            step: 0,
            notifier: Notifier::default(),
        }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    // region Topology
    pub fn add_client(&mut self, id: &str, x: f64, y: f64) -> Result<(), TopologyError> {
        if self.client(id).is_some() {
            return Err(TopologyError::DuplicateClient(id.to_string()));
        }
        self.clients
            .push(Client::new(id, Location { x, y }, self.notifier.clone()));
        Ok(())
    }

    /// Connects `from` and `to`, the connection is named `{from}-{to}`
    pub fn add_connection(&mut self, from: &str, to: &str, metric: i32) -> Result<ConnectionId, TopologyError> {
        self.add_connection_with_id(&format!("{from}-{to}"), from, to, metric)
    }

    pub fn add_connection_with_id(
        &mut self,
        id: &str,
        from: &str,
        to: &str,
        metric: i32,
    ) -> Result<ConnectionId, TopologyError> {
        if from == to {
            return Err(TopologyError::SelfLoop(from.to_string()));
        }
        let a = self.client_index(from)?;
        let b = self.client_index(to)?;
        if self.connection(from, to).is_some() {
            return Err(TopologyError::DuplicateConnection {
                a: from.to_string(),
                b: to.to_string(),
            });
        }
        if self.connections().any(|c| c.id == id) {
            return Err(TopologyError::DuplicateConnectionId(id.to_string()));
        }

        let mut connection = Connection::new(id, from, to, metric, self.notifier.clone());
        if self.clients[a].is_offline() || self.clients[b].is_offline() {
            connection.set_offline(true);
        }
        let index = self.connections.len();
        self.connections.push(connection);
        self.clients[a].add_connection(to, index);
        self.clients[b].add_connection(from, index);
        debug!("connected {from} and {to} as {id} (metric {metric})");
        Ok(index)
    }

    /// Detaches the connection between `a` and `b`, in-flight frames are dropped
    pub fn remove_connection(&mut self, a: &str, b: &str) -> Result<(), TopologyError> {
        let id = self.connection_id(a, b)?;
        self.connections[id].detach();
        for client in self.clients.iter_mut() {
            if client.id == a {
                client.remove_connection(b);
            } else if client.id == b {
                client.remove_connection(a);
            }
        }
        Ok(())
    }

    /// Takes a client off the air, every adjacent connection follows.
    /// Coming back only revives connections whose other end is online.
    pub fn set_client_offline(&mut self, id: &str, offline: bool) -> Result<(), TopologyError> {
        let index = self.client_index(id)?;
        self.clients[index].set_offline(offline);
        let links: Vec<(String, ConnectionId)> = self.clients[index]
            .connections()
            .iter()
            .map(|(peer, c)| (peer.clone(), *c))
            .collect();
        for (peer, connection) in links {
            let peer_offline = self.client(&peer).is_some_and(Client::is_offline);
            if let Some(connection) = self.connections.get_mut(connection) {
                connection.set_offline(offline || peer_offline);
            }
        }
        Ok(())
    }

    pub fn set_connection_offline(&mut self, a: &str, b: &str, offline: bool) -> Result<(), TopologyError> {
        let id = self.connection_id(a, b)?;
        self.connections[id].set_offline(offline);
        Ok(())
    }
    // endregion

    // region Simulation
    /// Runs `kind` on every client, dropping all traffic in flight
    pub fn initialize_protocol(&mut self, kind: ProtocolKind) {
        for index in 0..self.clients.len() {
            self.initialize_at(index, kind);
        }
        self.step = 0;
    }

    pub fn initialize_client_protocol(&mut self, id: &str, kind: ProtocolKind) -> Result<(), TopologyError> {
        let index = self.client_index(id)?;
        self.initialize_at(index, kind);
        Ok(())
    }

    fn initialize_at(&mut self, index: usize, kind: ProtocolKind) {
        let client = &mut self.clients[index];
        if client.is_initialized() {
            for connection in client.connections().values() {
                if let Some(connection) = self.connections.get_mut(*connection) {
                    connection.clear();
                }
            }
        }
        client.initialize_protocol(kind);
        debug!("{} runs {kind}", client.id);
    }

    /// One synchronous step: every client computes, then every connection flushes
    pub fn perform_global_step(&mut self) -> Result<(), RoutingError> {
        trace!("global step {}", self.step);
        let Simulator {
            clients,
            connections,
            params,
            ..
        } = self;

        for client in clients.iter_mut() {
            if !client.is_initialized() {
                continue;
            }
            client.perform_simulation_step(connections, params)?;
            transmit(connections, client.take_outbound());
        }

        for connection in connections.iter_mut() {
            for (receiver, message) in connection.end_transport_messages() {
                if let Some(client) = clients.iter_mut().find(|c| c.id == receiver) {
                    client.receive_message(message);
                }
            }
        }
        self.step += 1;
        Ok(())
    }

    /// Hands a data message from `from` to its routing protocol
    pub fn send_data(&mut self, from: &str, to: &str, data: &str) -> Result<(), RoutingError> {
        let Simulator {
            clients,
            connections,
            params,
            ..
        } = self;
        let client = clients
            .iter_mut()
            .find(|c| c.id == from)
            .ok_or_else(|| RoutingError::UnknownClient(from.to_string()))?;
        client.send_message(Message::data(from, to, data), connections, params)?;
        transmit(connections, client.take_outbound());
        Ok(())
    }
    // endregion

    // region Observability
    pub fn client(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    /// the attached connection between `a` and `b`, in any order
    pub fn connection(&self, a: &str, b: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.connects(a, b))
    }

    /// every attached connection, in creation order
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|c| c.endpoints().is_some())
    }

    pub fn routing_data(&self, id: &str) -> Option<String> {
        self.client(id).map(Client::routing_data)
    }

    pub fn current_data(&self, id: &str) -> Option<&str> {
        self.client(id).map(Client::current_data)
    }

    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) {
        self.notifier.subscribe(observer);
    }
    // endregion

    fn client_index(&self, id: &str) -> Result<usize, TopologyError> {
        self.clients
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| TopologyError::UnknownClient(id.to_string()))
    }

    fn connection_id(&self, a: &str, b: &str) -> Result<ConnectionId, TopologyError> {
        self.connections
            .iter()
            .position(|c| c.connects(a, b))
            .ok_or_else(|| TopologyError::UnknownConnection {
                a: a.to_string(),
                b: b.to_string(),
            })
    }

    /// hands the shared notifier to every client and connection, needed after deserialization
    fn rewire(&mut self) {
        for client in self.clients.iter_mut() {
            client.set_notifier(self.notifier.clone());
        }
        for connection in self.connections.iter_mut() {
            connection.set_notifier(self.notifier.clone());
        }
    }
}

fn transmit(connections: &mut [Connection], outbound: Vec<OutboundMessage>) {
    for out in outbound {
        if let Some(connection) = connections.get_mut(out.connection) {
            connection.start_transport_message(out.message, &out.sender, &out.receiver);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Simulator {
        let mut sim = Simulator::new();
        for id in ["a", "b", "c"] {
            sim.add_client(id, 0.0, 0.0).unwrap();
        }
        sim.add_connection("a", "b", 1).unwrap();
        sim.add_connection("b", "c", 1).unwrap();
        sim
    }

    #[test]
    fn invalid_edits_are_rejected() {
        let mut sim = triangle();
        assert_eq!(
            sim.add_client("a", 1.0, 1.0),
            Err(TopologyError::DuplicateClient("a".to_string()))
        );
        assert!(matches!(
            sim.add_connection("b", "a", 1),
            Err(TopologyError::DuplicateConnection { .. })
        ));
        assert_eq!(
            sim.add_connection("a", "z", 1),
            Err(TopologyError::UnknownClient("z".to_string()))
        );
        assert_eq!(
            sim.add_connection("a", "a", 1),
            Err(TopologyError::SelfLoop("a".to_string()))
        );
        assert_eq!(sim.clients().len(), 3);
        assert_eq!(sim.connections().count(), 2);
    }

    #[test]
    fn removed_connections_can_be_recreated() {
        let mut sim = triangle();
        sim.remove_connection("a", "b").unwrap();
        assert!(sim.connection("a", "b").is_none());
        assert!(sim.client("a").unwrap().connections().is_empty());
        assert_eq!(sim.connections().count(), 1);

        sim.add_connection("a", "b", 2).unwrap();
        assert_eq!(sim.connection("b", "a").unwrap().metric, 2);
    }

    #[test]
    fn client_offline_cascades() {
        let mut sim = triangle();
        sim.set_client_offline("b", true).unwrap();
        assert!(sim.connection("a", "b").unwrap().is_offline());
        assert!(sim.connection("b", "c").unwrap().is_offline());

        sim.set_client_offline("c", true).unwrap();
        sim.set_client_offline("b", false).unwrap();
        assert!(!sim.connection("a", "b").unwrap().is_offline());
        assert!(sim.connection("b", "c").unwrap().is_offline());
    }

    #[test]
    fn sending_from_an_unknown_client_fails() {
        let mut sim = triangle();
        sim.initialize_protocol(ProtocolKind::Dsdv);
        assert_eq!(
            sim.send_data("q", "a", "x"),
            Err(RoutingError::UnknownClient("q".to_string()))
        );
    }

    #[test]
    fn connection_ids_are_unique() {
        let mut sim = triangle();
        assert_eq!(sim.connection("a", "b").unwrap().id, "a-b");
        assert_eq!(
            sim.add_connection_with_id("a-b", "a", "c", 1),
            Err(TopologyError::DuplicateConnectionId("a-b".to_string()))
        );
        assert!(sim.connection("a", "c").is_none());

        sim.add_connection_with_id("L1", "a", "c", 4).unwrap();
        assert_eq!(sim.connection("c", "a").unwrap().id, "L1");

        sim.remove_connection("a", "c").unwrap();
        sim.add_connection_with_id("L1", "c", "a", 2).unwrap();
        assert_eq!(sim.connection("a", "c").unwrap().metric, 2);
    }

    #[test]
    fn reinitializing_reaches_every_client_and_drops_traffic() {
        let mut sim = triangle();
        sim.initialize_protocol(ProtocolKind::Dsdv);
        assert!(sim.clients().iter().all(Client::is_initialized));
        sim.perform_global_step().unwrap();
        sim.perform_global_step().unwrap();
        assert_eq!(sim.step_count(), 2);

        sim.initialize_protocol(ProtocolKind::Olsr);
        assert_eq!(sim.step_count(), 0);
        for connection in sim.connections() {
            assert_eq!(connection.pending_frames().count(), 0);
            assert!(connection.transmitted_frames().is_empty());
        }
        for client in sim.clients() {
            assert_eq!(client.protocol_kind(), Some(ProtocolKind::Olsr));
        }
    }
}
