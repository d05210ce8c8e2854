use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::concepts::message::Message;
use crate::framework::{NodeId, ProtocolParams};

/// An on-demand route discovery that has not been answered yet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingDiscovery {
    /// step of the last route request
    pub started_at: u64,
    /// route requests repeated so far, the first request is not counted
    pub retries: u32,
    /// data waiting for the route, in send order
    pub buffered: Vec<Message>,
}

/// Result of [`DiscoveryBuffer::expire`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expired {
    /// destinations whose route request must be repeated
    pub retry: Vec<NodeId>,
    /// destinations given up on, with the messages that were dropped
    pub abandoned: Vec<(NodeId, Vec<Message>)>,
}

/// Data buffered by AODV and DSR while a route request is in flight
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryBuffer {
    pending: BTreeMap<NodeId, PendingDiscovery>,
}

impl DiscoveryBuffer {
    /// Buffers `message` for `destination`, returns true if no discovery was running yet
    pub fn buffer(&mut self, destination: &str, message: Message, step: u64) -> bool {
        match self.pending.get_mut(destination) {
            Some(pending) => {
                pending.buffered.push(message);
                false
            }
            None => {
                self.pending.insert(
                    destination.to_string(),
                    PendingDiscovery {
                        started_at: step,
                        retries: 0,
                        buffered: vec![message],
                    },
                );
                true
            }
        }
    }

    pub fn is_pending(&self, destination: &str) -> bool {
        self.pending.contains_key(destination)
    }

    /// ends the discovery for `destination` and hands back its buffered data
    pub fn complete(&mut self, destination: &str) -> Vec<Message> {
        self.pending
            .remove(destination)
            .map(|p| p.buffered)
            .unwrap_or_default()
    }

    /// Collects the discoveries that timed out at `step`.
    /// A timed out discovery is restarted until it used up its retries, then it is dropped.
    pub fn expire(&mut self, step: u64, params: &ProtocolParams) -> Expired {
        let mut expired = Expired::default();
        let timed_out: Vec<NodeId> = self
            .pending
            .iter()
            .filter(|(_, p)| step.saturating_sub(p.started_at) >= params.discovery_timeout)
            .map(|(dst, _)| dst.clone())
            .collect();

        for destination in timed_out {
            let Some(pending) = self.pending.get_mut(&destination) else {
                continue;
            };
            if pending.retries < params.discovery_retries {
                pending.retries += 1;
                pending.started_at = step;
                expired.retry.push(destination);
            } else if let Some(pending) = self.pending.remove(&destination) {
                expired.abandoned.push((destination, pending.buffered));
            }
        }
        expired
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Display for DiscoveryBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (destination, pending) in &self.pending {
            writeln!(
                f,
                "discovering {destination} since step {} (retry {}), {} buffered",
                pending.started_at,
                pending.retries,
                pending.buffered.len()
            )?;
        }
        Ok(())
    }
}
