use serde::{Deserialize, Serialize};

use crate::feedback::TopologyError;
use crate::framework::{NodeId, ProtocolParams};
use crate::simulator::Simulator;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub offline: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: String,
    pub endpoint_a: NodeId,
    pub endpoint_b: NodeId,
    #[serde(default)]
    pub offline: bool,
    pub metric: i32,
}

/// Flat description of a network, the shape storage collaborators exchange
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyRecord {
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<LinkRecord>,
}

impl Simulator {
    pub fn to_topology(&self) -> TopologyRecord {
        TopologyRecord {
            nodes: self
                .clients()
                .iter()
                .map(|c| NodeRecord {
                    id: c.id.clone(),
                    x: c.location.x,
                    y: c.location.y,
                    offline: c.is_offline(),
                })
                .collect(),
            links: self
                .connections()
                .filter_map(|c| {
                    let (a, b) = c.endpoints()?;
                    Some(LinkRecord {
                        id: c.id.clone(),
                        endpoint_a: a.to_string(),
                        endpoint_b: b.to_string(),
                        offline: c.is_offline(),
                        metric: c.metric,
                    })
                })
                .collect(),
        }
    }

    /// Builds an uninitialized simulator from a topology, every record is validated like a manual edit
    pub fn from_topology(record: &TopologyRecord, params: ProtocolParams) -> Result<Simulator, TopologyError> {
        let mut simulator = Simulator::with_params(params);
        for node in &record.nodes {
            simulator.add_client(&node.id, node.x, node.y)?;
        }
        for link in &record.links {
            simulator.add_connection_with_id(&link.id, &link.endpoint_a, &link.endpoint_b, link.metric)?;
            if link.offline {
                simulator.set_connection_offline(&link.endpoint_a, &link.endpoint_b, true)?;
            }
        }
        for node in record.nodes.iter().filter(|n| n.offline) {
            simulator.set_client_offline(&node.id, true)?;
        }
        Ok(simulator)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "json")] {
        impl TopologyRecord {
            pub fn to_json(&self) -> serde_json::Result<String> {
                serde_json::to_string_pretty(self)
            }

            pub fn from_json(json: &str) -> serde_json::Result<TopologyRecord> {
                serde_json::from_str(json)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TopologyRecord {
        TopologyRecord {
            nodes: vec![
                NodeRecord { id: "a".into(), x: 0.0, y: 0.0, offline: false },
                NodeRecord { id: "b".into(), x: 10.0, y: 0.0, offline: false },
                NodeRecord { id: "c".into(), x: 20.0, y: 5.0, offline: true },
            ],
            links: vec![
                LinkRecord {
                    id: "a-b".into(),
                    endpoint_a: "a".into(),
                    endpoint_b: "b".into(),
                    offline: true,
                    metric: 1,
                },
                LinkRecord {
                    id: "b-c".into(),
                    endpoint_a: "b".into(),
                    endpoint_b: "c".into(),
                    offline: false,
                    metric: 3,
                },
            ],
        }
    }

    #[test]
    fn topology_survives_a_simulator() {
        let original = record();
        let sim = Simulator::from_topology(&original, ProtocolParams::default()).unwrap();
        let projected = sim.to_topology();
        assert_eq!(projected.nodes, original.nodes);
        assert_eq!(projected.links[0], original.links[0]);

        // a link behind an offline node is exported offline
        assert!(!original.links[1].offline);
        assert!(projected.links[1].offline);
        assert_eq!(
            LinkRecord { offline: false, ..projected.links[1].clone() },
            original.links[1]
        );

        let again = Simulator::from_topology(&projected, ProtocolParams::default()).unwrap();
        assert_eq!(again.to_topology(), projected);
    }

    #[test]
    fn link_ids_are_kept() {
        let mut original = record();
        original.links[0].id = "L1".into();
        original.links[1].id = "uplink".into();
        let sim = Simulator::from_topology(&original, ProtocolParams::default()).unwrap();
        assert_eq!(sim.connection("b", "a").unwrap().id, "L1");

        let ids: Vec<String> = sim.to_topology().links.into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["L1".to_string(), "uplink".to_string()]);
    }

    #[test]
    fn repeated_link_ids_are_rejected() {
        let mut broken = record();
        broken.links[1].id = "a-b".into();
        assert_eq!(
            Simulator::from_topology(&broken, ProtocolParams::default()).unwrap_err(),
            TopologyError::DuplicateConnectionId("a-b".into())
        );
    }

    #[test]
    fn broken_topology_is_rejected() {
        let mut broken = record();
        broken.links[1].endpoint_b = "z".into();
        assert_eq!(
            Simulator::from_topology(&broken, ProtocolParams::default()).unwrap_err(),
            TopologyError::UnknownClient("z".into())
        );
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_uses_flat_records() {
        let json = record().to_json().unwrap();
        assert!(json.contains("\"endpoint_a\""));
        assert_eq!(TopologyRecord::from_json(&json).unwrap(), record());
    }
}
