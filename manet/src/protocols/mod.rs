use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::concepts::client::{queue_broadcast, OutboundMessage};
use crate::concepts::connection::Connection;
use crate::concepts::message::{Message, MessageKind};
use crate::feedback::RoutingError;
use crate::framework::{ConnectionId, NodeId, ProtocolKind, ProtocolParams};

pub mod aodv;
pub mod discovery;
pub mod dsdv;
pub mod dsr;
pub mod olsr;

use aodv::Aodv;
use dsdv::Dsdv;
use dsr::Dsr;
use olsr::Olsr;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// the message arrived over a connection
    Incoming,
    /// the message is being sent by this node
    Outgoing,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Incoming => f.write_str("incoming"),
            Direction::Outgoing => f.write_str("outgoing"),
        }
    }
}

/// Everything a protocol may touch of its client during one call
pub struct NodeContext<'n> {
    pub id: &'n str,
    pub params: &'n ProtocolParams,
    pub input: &'n mut VecDeque<Message>,
    links: &'n BTreeMap<NodeId, ConnectionId>,
    connections: &'n [Connection],
    outbound: &'n mut Vec<OutboundMessage>,
    data: &'n mut String,
}

impl<'n> NodeContext<'n> {
    pub(crate) fn new(
        id: &'n str,
        params: &'n ProtocolParams,
        input: &'n mut VecDeque<Message>,
        links: &'n BTreeMap<NodeId, ConnectionId>,
        connections: &'n [Connection],
        outbound: &'n mut Vec<OutboundMessage>,
        data: &'n mut String,
    ) -> Self {
        Self {
            id,
            params,
            input,
            links,
            connections,
            outbound,
            data,
        }
    }

    pub fn connection_to(&self, peer: &str) -> Option<&'n Connection> {
        let (links, connections) = (self.links, self.connections);
        links.get(peer).and_then(|id| connections.get(*id))
    }

    /// the connection to `peer` exists and is not offline
    pub fn is_connection_reachable(&self, peer: &str) -> bool {
        self.connection_to(peer).is_some_and(|c| !c.is_offline())
    }

    pub fn neighbours(&self) -> impl Iterator<Item = (&'n NodeId, &'n Connection)> + 'n {
        let (links, connections) = (self.links, self.connections);
        links
            .iter()
            .filter_map(move |(peer, id)| connections.get(*id).map(|c| (peer, c)))
    }

    pub fn has_active_neighbour(&self) -> bool {
        self.neighbours().any(|(_, c)| !c.is_offline())
    }

    pub fn broadcast(&mut self, message: &Message, override_sender_receiver: bool) {
        queue_broadcast(
            self.id,
            self.links,
            self.outbound,
            message,
            override_sender_receiver,
        );
    }

    /// hands the message to the connection towards `peer`, returns false if there is none
    pub fn send_to_neighbour(&mut self, peer: &str, message: Message) -> bool {
        let Some(connection) = self.links.get(peer) else {
            return false;
        };
        self.outbound.push(OutboundMessage {
            connection: *connection,
            sender: self.id.to_string(),
            receiver: peer.to_string(),
            message,
        });
        true
    }

    /// the message reached its final destination
    pub fn receive_data(&mut self, message: &Message) {
        self.data.push_str(&message.to_string());
        self.data.push('\n');
    }
}

pub type Handler<P> =
    for<'a, 'b, 'n> fn(&'a mut P, &'b mut NodeContext<'n>, Message) -> Result<(), RoutingError>;

/// One row of a protocol's message handler table
pub struct HandlerEntry<P> {
    pub kind: MessageKind,
    pub direction: Direction,
    pub handler: Handler<P>,
}

pub trait RoutingLogic: Sized + 'static {
    const KIND: ProtocolKind;
    /// lookup table from (message kind, direction) to handler, replaces runtime type dispatch
    const HANDLERS: &'static [HandlerEntry<Self>];

    /// resets the protocol to its freshly constructed state
    fn initialize(&mut self);
    fn perform_routing_step(&mut self, node: &mut NodeContext<'_>) -> Result<(), RoutingError>;
    /// human readable dump of the table and the auxiliary state
    fn routing_data(&self) -> String;
    /// next hop towards `destination`, if the table has an entry for it
    fn get_route(&self, destination: &str) -> Option<&str>;
    fn route_metric(&self, destination: &str) -> Option<i32>;

    fn send_message(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        self.dispatch(node, message, Direction::Outgoing)
    }

    fn dispatch(
        &mut self,
        node: &mut NodeContext<'_>,
        message: Message,
        direction: Direction,
    ) -> Result<(), RoutingError> {
        let kind = message.kind();
        let entry = Self::HANDLERS
            .iter()
            .find(|h| h.kind == kind && h.direction == direction)
            .ok_or(RoutingError::Unsupported {
                protocol: Self::KIND,
                kind,
                direction,
            })?;
        (entry.handler)(self, node, message)
    }

    /// handles every queued incoming message in arrival order
    fn drain_input(&mut self, node: &mut NodeContext<'_>) -> Result<(), RoutingError> {
        while let Some(message) = node.input.pop_front() {
            self.dispatch(node, message, Direction::Incoming)?;
        }
        Ok(())
    }

    /// incoming data: accumulate it if this node is the receiver, route it onwards otherwise
    fn deliver_or_forward(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        if message.receiver() == node.id {
            node.receive_data(&message);
            Ok(())
        } else {
            self.send_message(node, message)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RoutingProtocol {
    Dsdv(Dsdv),
    Aodv(Aodv),
    Dsr(Dsr),
    Olsr(Olsr),
}

impl RoutingProtocol {
    /// builds the protocol implementation selected by `kind` for the client `owner`
    pub fn new(kind: ProtocolKind, owner: &str) -> Self {
        match kind {
            ProtocolKind::Dsdv => RoutingProtocol::Dsdv(Dsdv::new(owner)),
            ProtocolKind::Aodv => RoutingProtocol::Aodv(Aodv::new(owner)),
            ProtocolKind::Dsr => RoutingProtocol::Dsr(Dsr::new(owner)),
            ProtocolKind::Olsr => RoutingProtocol::Olsr(Olsr::new(owner)),
        }
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            RoutingProtocol::Dsdv(_) => Dsdv::KIND,
            RoutingProtocol::Aodv(_) => Aodv::KIND,
            RoutingProtocol::Dsr(_) => Dsr::KIND,
            RoutingProtocol::Olsr(_) => Olsr::KIND,
        }
    }

    pub fn initialize(&mut self) {
        match self {
            RoutingProtocol::Dsdv(p) => p.initialize(),
            RoutingProtocol::Aodv(p) => p.initialize(),
            RoutingProtocol::Dsr(p) => p.initialize(),
            RoutingProtocol::Olsr(p) => p.initialize(),
        }
    }

    pub fn perform_routing_step(&mut self, node: &mut NodeContext<'_>) -> Result<(), RoutingError> {
        match self {
            RoutingProtocol::Dsdv(p) => p.perform_routing_step(node),
            RoutingProtocol::Aodv(p) => p.perform_routing_step(node),
            RoutingProtocol::Dsr(p) => p.perform_routing_step(node),
            RoutingProtocol::Olsr(p) => p.perform_routing_step(node),
        }
    }

    pub fn send_message(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        match self {
            RoutingProtocol::Dsdv(p) => p.send_message(node, message),
            RoutingProtocol::Aodv(p) => p.send_message(node, message),
            RoutingProtocol::Dsr(p) => p.send_message(node, message),
            RoutingProtocol::Olsr(p) => p.send_message(node, message),
        }
    }

    pub fn routing_data(&self) -> String {
        match self {
            RoutingProtocol::Dsdv(p) => p.routing_data(),
            RoutingProtocol::Aodv(p) => p.routing_data(),
            RoutingProtocol::Dsr(p) => p.routing_data(),
            RoutingProtocol::Olsr(p) => p.routing_data(),
        }
    }

    pub fn get_route(&self, destination: &str) -> Option<&str> {
        match self {
            RoutingProtocol::Dsdv(p) => p.get_route(destination),
            RoutingProtocol::Aodv(p) => p.get_route(destination),
            RoutingProtocol::Dsr(p) => p.get_route(destination),
            RoutingProtocol::Olsr(p) => p.get_route(destination),
        }
    }

    pub fn route_metric(&self, destination: &str) -> Option<i32> {
        match self {
            RoutingProtocol::Dsdv(p) => p.route_metric(destination),
            RoutingProtocol::Aodv(p) => p.route_metric(destination),
            RoutingProtocol::Dsr(p) => p.route_metric(destination),
            RoutingProtocol::Olsr(p) => p.route_metric(destination),
        }
    }
}
