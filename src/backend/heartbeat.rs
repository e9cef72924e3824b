//! Periodic monitor of the backend services' command queues. Every
//! interval it asks each service whether a consumer is attached,
//! falling back to direct queue introspection under the fixed
//! `CargoNetSim.CommandQueue.<service>` naming convention, and updates
//! a per-service indicator.

use crate::backend::ServiceId;
use crate::errors::PlanResult;
use log::*;
use std::collections::HashMap;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Indicator states. `Unknown` and `Unreachable` both render grey,
/// `Online` green, `NoConsumer` red.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndicatorState {
    /// Initial state, before the first check.
    Unknown,
    /// The service (and the queue fallback) could not be reached.
    Unreachable,
    /// A consumer is attached to the command queue.
    Online,
    /// The service answered but no consumer is attached.
    NoConsumer,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndicatorColor {
    Grey,
    Green,
    Red,
}

impl IndicatorState {
    pub fn color(&self) -> IndicatorColor {
        match self {
            IndicatorState::Unknown | IndicatorState::Unreachable => IndicatorColor::Grey,
            IndicatorState::Online => IndicatorColor::Green,
            IndicatorState::NoConsumer => IndicatorColor::Red,
        }
    }
}

/// Preferred probe path: the service's own control handle.
pub trait ConsumerProbe: Send + Sync {
    fn service(&self) -> ServiceId;
    fn has_command_queue_consumers(&self) -> PlanResult<bool>;
}

/// Fallback path: direct queue introspection on the broker.
pub trait QueueIntrospect: Send + Sync {
    fn queue_has_consumers(&self, queue_name: &str) -> PlanResult<bool>;
}

/// Adapts the terminal-graph service handle to the probe interface.
pub struct TerminalGraphProbe(pub Arc<dyn crate::backend::terminal_graph::TerminalGraphService>);

impl ConsumerProbe for TerminalGraphProbe {
    fn service(&self) -> ServiceId {
        ServiceId::TerminalSim
    }
    fn has_command_queue_consumers(&self) -> PlanResult<bool> {
        self.0.has_command_queue_consumers()
    }
}

impl ConsumerProbe for crate::backend::simulator::LoopbackSimulator {
    fn service(&self) -> ServiceId {
        crate::backend::simulator::SimulatorEndpoint::service(self)
    }
    fn has_command_queue_consumers(&self) -> PlanResult<bool> {
        crate::backend::simulator::SimulatorEndpoint::has_command_queue_consumers(self)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// First check fires this long after start so the services have a
    /// chance to attach.
    pub initial_delay: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            interval: Duration::from_secs(20),
            initial_delay: Duration::from_secs(2),
        }
    }
}

pub struct HeartbeatMonitor {
    states: Arc<Mutex<HashMap<ServiceId, IndicatorState>>>,
    stop: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    pub fn start(
        probes: Vec<Arc<dyn ConsumerProbe>>,
        fallback: Option<Arc<dyn QueueIntrospect>>,
        config: HeartbeatConfig,
    ) -> Self {
        let mut initial = HashMap::new();
        for p in &probes {
            initial.insert(p.service(), IndicatorState::Unknown);
        }
        let states = Arc::new(Mutex::new(initial));
        let (stop_tx, stop_rx) = channel();
        let worker_states = states.clone();
        let worker = std::thread::spawn(move || {
            let mut wait = config.initial_delay;
            loop {
                match stop_rx.recv_timeout(wait) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                wait = config.interval;
                for probe in &probes {
                    let state = check_one(probe.as_ref(), fallback.as_deref());
                    let mut map = worker_states.lock().unwrap();
                    let prev = map.insert(probe.service(), state);
                    if prev != Some(state) {
                        info!("{} heartbeat: {:?}", probe.service(), state);
                    }
                }
            }
        });
        HeartbeatMonitor {
            states,
            stop: stop_tx,
            worker: Some(worker),
        }
    }

    pub fn state(&self, service: ServiceId) -> IndicatorState {
        self.states
            .lock()
            .unwrap()
            .get(&service)
            .copied()
            .unwrap_or(IndicatorState::Unknown)
    }

    pub fn states(&self) -> HashMap<ServiceId, IndicatorState> {
        self.states.lock().unwrap().clone()
    }

    /// Stop the timer and join the worker before returning.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_one(probe: &dyn ConsumerProbe, fallback: Option<&dyn QueueIntrospect>) -> IndicatorState {
    match probe.has_command_queue_consumers() {
        Ok(true) => IndicatorState::Online,
        Ok(false) => IndicatorState::NoConsumer,
        Err(e) => {
            debug!("{} control probe failed: {}", probe.service(), e);
            match fallback.map(|f| f.queue_has_consumers(&probe.service().queue_name())) {
                Some(Ok(true)) => IndicatorState::Online,
                Some(Ok(false)) => IndicatorState::NoConsumer,
                Some(Err(_)) | None => IndicatorState::Unreachable,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulator::LoopbackSimulator;
    use std::collections::HashSet;

    fn fast_config() -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(10),
            initial_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn indicator_transitions() {
        let train = Arc::new(LoopbackSimulator::new(ServiceId::TrainSim));
        let ship = Arc::new(LoopbackSimulator::new(ServiceId::ShipSim));
        train.set_reachable(false);
        ship.set_reachable(false);

        let probes: Vec<Arc<dyn ConsumerProbe>> = vec![train.clone(), ship.clone()];
        let monitor = HeartbeatMonitor::start(probes, None, fast_config());

        // before the first check everything is unknown (grey)
        assert_eq!(monitor.state(ServiceId::TrainSim).color(), IndicatorColor::Grey);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(monitor.state(ServiceId::TrainSim), IndicatorState::Unreachable);

        // service comes online with a consumer attached
        train.set_reachable(true);
        train.set_consumers(true);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(monitor.state(ServiceId::TrainSim), IndicatorState::Online);
        // the other indicator is untouched
        assert_eq!(monitor.state(ServiceId::ShipSim).color(), IndicatorColor::Grey);

        // consumer dies but the service still answers
        train.set_consumers(false);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(monitor.state(ServiceId::TrainSim), IndicatorState::NoConsumer);
        assert_eq!(monitor.state(ServiceId::TrainSim).color(), IndicatorColor::Red);

        monitor.stop();
    }

    #[test]
    fn fallback_queue_introspection() {
        struct Broker(HashSet<String>);
        impl QueueIntrospect for Broker {
            fn queue_has_consumers(&self, queue_name: &str) -> PlanResult<bool> {
                Ok(self.0.contains(queue_name))
            }
        }
        let sim = Arc::new(LoopbackSimulator::new(ServiceId::TruckSim));
        sim.set_reachable(false);
        let mut queues = HashSet::new();
        queues.insert("CargoNetSim.CommandQueue.TruckSim".to_string());
        let broker: Arc<dyn QueueIntrospect> = Arc::new(Broker(queues));

        let monitor = HeartbeatMonitor::start(vec![sim], Some(broker), fast_config());
        std::thread::sleep(Duration::from_millis(40));
        // the control probe fails but the queue has a consumer
        assert_eq!(monitor.state(ServiceId::TruckSim), IndicatorState::Online);
        monitor.stop();
    }

    #[test]
    fn stop_joins_promptly() {
        let sim = Arc::new(LoopbackSimulator::new(ServiceId::TrainSim));
        let monitor = HeartbeatMonitor::start(
            vec![sim],
            None,
            HeartbeatConfig {
                interval: Duration::from_secs(3600),
                initial_delay: Duration::from_secs(3600),
            },
        );
        // returns without waiting for the hour-long timer
        monitor.stop();
    }
}
