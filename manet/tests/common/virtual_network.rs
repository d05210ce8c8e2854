use manet::concepts::client::Client;
use manet::framework::ProtocolKind;
use manet::protocols::aodv::Aodv;
use manet::protocols::dsdv::Dsdv;
use manet::protocols::dsr::Dsr;
use manet::protocols::olsr::Olsr;
use manet::protocols::RoutingProtocol;
use manet::simulator::Simulator;
use manet::util::NOT_REACHABLE;

pub struct VirtualNetwork {
    pub sim: Simulator,
}

impl VirtualNetwork {
    pub fn create(kind: ProtocolKind, nodes: &[&str], links: &[(&str, &str, i32)]) -> VirtualNetwork {
        let mut sim = Simulator::new();
        for (i, id) in nodes.iter().enumerate() {
            sim.add_client(id, i as f64 * 10.0, 0.0).unwrap();
        }
        for (a, b, metric) in links {
            sim.add_connection(a, b, *metric).unwrap();
        }
        sim.initialize_protocol(kind);
        VirtualNetwork { sim }
    }

    pub fn tick(&mut self) {
        self.sim.perform_global_step().unwrap();
    }

    pub fn tick_n(&mut self, times: i32) {
        for _ in 0..times {
            self.tick();
        }
    }

    pub fn get_node(&self, node: &str) -> &Client {
        self.sim
            .client(node)
            .unwrap_or_else(|| panic!("No node {node} found"))
    }

    pub fn get_next_hop(&self, cur: &str, dst: &str) -> String {
        self.get_node(cur)
            .get_route(dst)
            .unwrap_or_else(|| panic!("No route found from {cur} to {dst}"))
            .to_string()
    }

    pub fn has_route(&self, cur: &str, dst: &str) -> bool {
        self.get_node(cur).get_route(dst).is_some()
    }

    /// NOT_REACHABLE if there is no entry at all
    pub fn get_metric_to(&self, cur: &str, dst: &str) -> i32 {
        self.get_node(cur).route_metric(dst).unwrap_or(NOT_REACHABLE)
    }

    pub fn set_link_offline(&mut self, a: &str, b: &str, offline: bool) {
        self.sim.set_connection_offline(a, b, offline).unwrap();
    }

    pub fn send(&mut self, from: &str, to: &str, data: &str) {
        self.sim.send_data(from, to, data).unwrap();
    }

    pub fn data_at(&self, node: &str) -> String {
        self.get_node(node).current_data().to_string()
    }

    pub fn dsdv(&self, node: &str) -> &Dsdv {
        match self.get_node(node).protocol() {
            Some(RoutingProtocol::Dsdv(dsdv)) => dsdv,
            other => panic!("{node} does not run DSDV: {other:?}"),
        }
    }

    pub fn olsr(&self, node: &str) -> &Olsr {
        match self.get_node(node).protocol() {
            Some(RoutingProtocol::Olsr(olsr)) => olsr,
            other => panic!("{node} does not run OLSR: {other:?}"),
        }
    }

    pub fn aodv(&self, node: &str) -> &Aodv {
        match self.get_node(node).protocol() {
            Some(RoutingProtocol::Aodv(aodv)) => aodv,
            other => panic!("{node} does not run AODV: {other:?}"),
        }
    }

    pub fn dsr(&self, node: &str) -> &Dsr {
        match self.get_node(node).protocol() {
            Some(RoutingProtocol::Dsr(dsr)) => dsr,
            other => panic!("{node} does not run DSR: {other:?}"),
        }
    }

    pub fn freeze(&self) -> String {
        serde_json::to_string(&self.sim).unwrap()
    }

    pub fn restore(state: String) -> VirtualNetwork {
        VirtualNetwork {
            sim: serde_json::from_str(&state).unwrap(),
        }
    }
}
