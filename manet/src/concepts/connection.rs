use std::collections::VecDeque;

use log::trace;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concepts::message::Message;
use crate::framework::{NodeId, Notifier, StateEvent};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransmissionStep {
    Sending,
    Receiving,
    Done,
}

/// A message in transit over one connection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionFrame {
    pub id: Uuid,
    /// the endpoint that put the frame on the link
    pub sender: NodeId,
    /// the endpoint the frame is delivered to
    pub receiver: NodeId,
    pub inner: Message,
    pub step: TransmissionStep,
}

/// Bidirectional link between two clients
#[derive(Debug, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    endpoint_a: Option<NodeId>,
    endpoint_b: Option<NodeId>,
    pub metric: i32,
    offline: bool,
    pending: VecDeque<ConnectionFrame>,
    transmitted: Vec<ConnectionFrame>,
    #[serde(skip)]
    notifier: Notifier,
}

impl Connection {
    pub fn new(id: &str, a: &str, b: &str, metric: i32, notifier: Notifier) -> Self {
        Self {
            id: id.to_string(),
            endpoint_a: Some(a.to_string()),
            endpoint_b: Some(b.to_string()),
            metric,
            offline: false,
            pending: VecDeque::new(),
            transmitted: Vec::new(),
            notifier,
        }
    }

    pub fn endpoints(&self) -> Option<(&str, &str)> {
        match (&self.endpoint_a, &self.endpoint_b) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// whether this connection joins `a` and `b`, in any order
    pub fn connects(&self, a: &str, b: &str) -> bool {
        matches!(self.endpoints(), Some((x, y)) if (x == a && y == b) || (x == b && y == a))
    }

    pub fn peer_of(&self, id: &str) -> Option<&str> {
        let (a, b) = self.endpoints()?;
        if a == id {
            Some(b)
        } else if b == id {
            Some(a)
        } else {
            None
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
        self.notify();
    }

    pub fn pending_frames(&self) -> impl Iterator<Item = &ConnectionFrame> {
        self.pending.iter()
    }

    pub fn transmitted_frames(&self) -> &[ConnectionFrame] {
        &self.transmitted
    }

    /// Puts a message on the link, it is delivered by the next [`Connection::end_transport_messages`]
    pub fn start_transport_message(&mut self, message: Message, sender: &str, receiver: &str) {
        if self.offline || !self.connects(sender, receiver) {
            // also covers a detached connection, which connects nothing
            return;
        }
        trace!("[{}] {sender} -> {receiver}: {message}", self.id);
        self.pending.push_back(ConnectionFrame {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            inner: message,
            step: TransmissionStep::Sending,
        });
        self.notify();
    }

    /// Advances every frame by one phase and returns the messages to hand to their receivers
    pub fn end_transport_messages(&mut self) -> Vec<(NodeId, Message)> {
        self.notify();
        self.transmitted
            .retain(|frame| frame.step != TransmissionStep::Done);
        for frame in &mut self.transmitted {
            if frame.step == TransmissionStep::Receiving {
                frame.step = TransmissionStep::Done;
            }
        }

        let mut deliveries = Vec::with_capacity(self.pending.len());
        while let Some(mut frame) = self.pending.pop_front() {
            if frame.step != TransmissionStep::Sending {
                continue;
            }
            frame.step = TransmissionStep::Receiving;
            if self.peer_of(&frame.receiver).is_some() {
                deliveries.push((frame.receiver.clone(), frame.inner.clone()));
            }
            self.transmitted.push(frame);
        }
        self.notify();
        deliveries
    }

    /// drops all in-flight traffic
    pub fn clear(&mut self) {
        self.pending.clear();
        self.transmitted.clear();
        self.notify();
    }

    /// unhooks both endpoints, a detached connection never carries traffic again
    pub fn detach(&mut self) {
        self.endpoint_a = None;
        self.endpoint_b = None;
        self.clear();
    }

    pub(crate) fn set_notifier(&mut self, notifier: Notifier) {
        self.notifier = notifier;
    }

    fn notify(&self) {
        self.notifier.notify(StateEvent::Connection(self.id.clone()));
    }
}
