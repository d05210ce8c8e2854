use std::collections::{BTreeMap, VecDeque};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::concepts::connection::Connection;
use crate::concepts::message::Message;
use crate::feedback::RoutingError;
use crate::framework::{ConnectionId, NodeId, Notifier, ProtocolKind, ProtocolParams, StateEvent};
use crate::protocols::{NodeContext, RoutingProtocol};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

/// A message a client wants put on one of its connections
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub connection: ConnectionId,
    /// link level sender, always the client itself
    pub sender: NodeId,
    /// link level receiver, the peer on the other end of `connection`
    pub receiver: NodeId,
    pub message: Message,
}

/// A node of the simulated network
#[derive(Debug, Serialize, Deserialize)]
pub struct Client {
    pub id: NodeId,
    pub location: Location,
    /// peer id -> connection towards that peer
    connections: BTreeMap<NodeId, ConnectionId>,
    input_queue: VecDeque<Message>,
    outbound: Vec<OutboundMessage>,
    protocol: Option<RoutingProtocol>,
    step_counter: u64,
    offline: bool,
    /// every data message that arrived at this client as its final destination
    accumulated_data: String,
    #[serde(skip)]
    notifier: Notifier,
}

impl Client {
    pub fn new(id: &str, location: Location, notifier: Notifier) -> Self {
        Self {
            id: id.to_string(),
            location,
            connections: BTreeMap::new(),
            input_queue: VecDeque::new(),
            outbound: Vec::new(),
            protocol: None,
            step_counter: 0,
            offline: false,
            accumulated_data: String::new(),
            notifier,
        }
    }

    // region Topology
    pub fn connections(&self) -> &BTreeMap<NodeId, ConnectionId> {
        &self.connections
    }

    pub(crate) fn add_connection(&mut self, peer: &str, connection: ConnectionId) {
        self.connections.insert(peer.to_string(), connection);
        self.notify();
    }

    pub(crate) fn remove_connection(&mut self, peer: &str) -> Option<ConnectionId> {
        let removed = self.connections.remove(peer);
        self.notify();
        removed
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// the simulator cascades this flag to every adjacent connection
    pub(crate) fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
        self.notify();
    }
    // endregion

    // region Protocol
    pub fn is_initialized(&self) -> bool {
        self.protocol.is_some()
    }

    pub fn protocol(&self) -> Option<&RoutingProtocol> {
        self.protocol.as_ref()
    }

    pub fn protocol_kind(&self) -> Option<ProtocolKind> {
        self.protocol.as_ref().map(RoutingProtocol::kind)
    }

    /// Replaces the routing protocol with a fresh instance and resets every queue and counter.
    /// In-flight frames on adjacent connections are cleared by the simulator beforehand.
    pub fn initialize_protocol(&mut self, kind: ProtocolKind) {
        self.step_counter = 0;
        self.accumulated_data.clear();
        self.input_queue.clear();
        self.outbound.clear();
        let mut protocol = RoutingProtocol::new(kind, &self.id);
        protocol.initialize();
        self.protocol = Some(protocol);
        self.notify();
    }

    pub fn perform_simulation_step(
        &mut self,
        connections: &[Connection],
        params: &ProtocolParams,
    ) -> Result<(), RoutingError> {
        trace!("[{}] step {}", self.id, self.step_counter);
        self.with_context(connections, params, |protocol, node| {
            protocol.perform_routing_step(node)
        })?;
        self.step_counter += 1;
        self.notifier.notify(StateEvent::RoutingTable(self.id.clone()));
        Ok(())
    }

    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    pub fn routing_data(&self) -> String {
        match &self.protocol {
            Some(protocol) => protocol.routing_data(),
            None => "not initialized\n".to_string(),
        }
    }

    pub fn get_route(&self, destination: &str) -> Option<&str> {
        self.protocol.as_ref()?.get_route(destination)
    }

    pub fn route_metric(&self, destination: &str) -> Option<i32> {
        self.protocol.as_ref()?.route_metric(destination)
    }

    fn with_context<R>(
        &mut self,
        connections: &[Connection],
        params: &ProtocolParams,
        f: impl FnOnce(&mut RoutingProtocol, &mut NodeContext<'_>) -> Result<R, RoutingError>,
    ) -> Result<R, RoutingError> {
        let Client {
            id,
            connections: links,
            input_queue,
            outbound,
            protocol,
            accumulated_data,
            ..
        } = self;
        let protocol = protocol
            .as_mut()
            .ok_or_else(|| RoutingError::NotInitialized(id.clone()))?;
        let mut node = NodeContext::new(
            id,
            params,
            input_queue,
            links,
            connections,
            outbound,
            accumulated_data,
        );
        f(protocol, &mut node)
    }
    // endregion

    // region Messaging
    /// Queues a copy of `message` for every adjacent connection, peers never share an instance
    pub fn broadcast_message(&mut self, message: &Message, override_sender_receiver: bool) {
        queue_broadcast(
            &self.id,
            &self.connections,
            &mut self.outbound,
            message,
            override_sender_receiver,
        );
    }

    /// Routes `message` with the client's protocol
    pub fn send_message(
        &mut self,
        message: Message,
        connections: &[Connection],
        params: &ProtocolParams,
    ) -> Result<(), RoutingError> {
        self.with_context(connections, params, |protocol, node| {
            protocol.send_message(node, message)
        })
    }

    /// A message arrived over a connection, ignored until a protocol is initialized
    pub fn receive_message(&mut self, message: Message) {
        if self.protocol.is_none() {
            return;
        }
        self.input_queue.push_back(message);
        self.notify();
    }

    /// The message reached its final destination
    pub fn receive_data(&mut self, message: &Message) {
        self.accumulated_data.push_str(&message.to_string());
        self.accumulated_data.push('\n');
        self.notify();
    }

    pub fn input_queue(&self) -> &VecDeque<Message> {
        &self.input_queue
    }

    /// drains the messages queued for the connections
    pub fn take_outbound(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.outbound)
    }

    pub fn current_data(&self) -> &str {
        &self.accumulated_data
    }
    // endregion

    pub(crate) fn set_notifier(&mut self, notifier: Notifier) {
        self.notifier = notifier;
    }

    fn notify(&self) {
        self.notifier.notify(StateEvent::Client(self.id.clone()));
    }
}

/// writes one copy of `message` per connection to the outbound queue
pub(crate) fn queue_broadcast(
    id: &str,
    links: &BTreeMap<NodeId, ConnectionId>,
    outbound: &mut Vec<OutboundMessage>,
    message: &Message,
    override_sender_receiver: bool,
) {
    for (peer, connection) in links {
        let copy = if override_sender_receiver {
            message.readdressed(id, peer)
        } else {
            message.clone()
        };
        outbound.push(OutboundMessage {
            connection: *connection,
            sender: id.to_string(),
            receiver: peer.clone(),
            message: copy,
        });
    }
}
