use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::feedback::RoutingError;
use crate::simulator::Simulator;

/// Shared access to a simulator for a run loop and its observers.
///
/// Every step and every read holds the same lock, so a reader never sees half a step
/// and a manual step never interleaves with a running loop.
#[derive(Clone)]
pub struct SimulationHandle {
    simulator: Arc<Mutex<Simulator>>,
    running: Arc<AtomicBool>,
}

impl SimulationHandle {
    pub fn new(simulator: Simulator) -> Self {
        Self {
            simulator: Arc::new(Mutex::new(simulator)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn step(&self) -> Result<(), RoutingError> {
        self.simulator.lock().perform_global_step()
    }

    /// Marks the handle as running, a loop driven elsewhere polls [`SimulationHandle::is_running`]
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Requests cancellation, the step in progress still completes
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Steps until `steps` are done or [`SimulationHandle::stop`] is called.
    /// `after_step` runs outside the lock with the number of completed steps.
    pub fn run(&self, steps: u64, mut after_step: impl FnMut(u64)) -> Result<u64, RoutingError> {
        self.start();
        let mut done = 0;
        while done < steps && self.is_running() {
            if let Err(err) = self.step() {
                self.stop();
                return Err(err);
            }
            done += 1;
            after_step(done);
        }
        self.stop();
        debug!("run finished after {done} step(s)");
        Ok(done)
    }

    pub fn read<R>(&self, f: impl FnOnce(&Simulator) -> R) -> R {
        let simulator = self.simulator.lock();
        f(&*simulator)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Simulator) -> R) -> R {
        let mut simulator = self.simulator.lock();
        f(&mut *simulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::ProtocolKind;

    fn handle() -> SimulationHandle {
        let mut sim = Simulator::new();
        sim.add_client("a", 0.0, 0.0).unwrap();
        sim.add_client("b", 1.0, 0.0).unwrap();
        sim.add_connection("a", "b", 1).unwrap();
        sim.initialize_protocol(ProtocolKind::Dsdv);
        SimulationHandle::new(sim)
    }

    #[test]
    fn run_stops_when_asked() {
        let handle = handle();
        let stopper = handle.clone();
        let done = handle
            .run(100, |n| {
                if n == 3 {
                    stopper.stop();
                }
            })
            .unwrap();
        assert_eq!(done, 3);
        assert!(!handle.is_running());
        assert_eq!(handle.read(|sim| sim.step_count()), 3);
    }

    #[test]
    fn reads_see_whole_steps() {
        let handle = handle();
        handle.run(5, |_| {}).unwrap();
        handle.step().unwrap();
        let steps = handle.read(|sim| sim.step_count());
        assert_eq!(steps, 6);
        handle.write(|sim| sim.set_connection_offline("a", "b", true)).unwrap();
        assert!(handle.read(|sim| sim.connection("a", "b").unwrap().is_offline()));
    }
}
