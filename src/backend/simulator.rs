//! The simulator services (train, ship, truck) share one lifecycle:
//! connect, reset, define a simulator over a network, push containers to
//! vehicles, run. This module is that lifecycle as one parameterised
//! interface; `LoopbackSimulator` is the in-process implementation used
//! by tests and the headless driver.

use crate::backend::ServiceId;
use crate::document::objects::Mode;
use crate::errors::{ErrorKind, PlanError, PlanResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One vehicle handed to a simulator.
#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct VehicleRecord {
    /// `<path>_<i>`; inherits path ordering for reproducibility.
    pub user_id: String,
    pub template: String,
    pub mode: Mode,
    /// Network node ids along the route (rail and truck).
    pub route_nodes: Vec<String>,
    /// WGS-84 waypoints (ship).
    pub route_points: Vec<(f64, f64)>,
    /// Seconds after simulation start when the vehicle loads.
    pub load_offset_s: f64,
    pub capacity: usize,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub size_teu: f64,
    pub location: String,
    pub destinations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct SimulatorSpec {
    pub network: String,
    pub time_step: f64,
    pub vehicles: Vec<VehicleRecord>,
    /// Ship only: destination terminal ids per vehicle user id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_terminals: Option<BTreeMap<String, Vec<String>>>,
}

/// The request/response surface shared by the three simulators. The
/// truck-specific operations default to an unsupported error so the
/// train and ship endpoints need not mention them.
pub trait SimulatorEndpoint: Send + Sync {
    fn service(&self) -> ServiceId;
    fn reset_server(&self) -> PlanResult<()>;
    fn define_simulator(&self, spec: &SimulatorSpec) -> PlanResult<()>;
    fn add_containers(
        &self,
        network: &str,
        vehicle_user_id: &str,
        containers: &[ContainerRecord],
    ) -> PlanResult<()>;
    fn run_simulator(&self, networks: &[String]) -> PlanResult<()>;
    fn has_command_queue_consumers(&self) -> PlanResult<bool>;

    /// Truck flow runs asynchronously; others fall back to the blocking
    /// call.
    fn run_simulation_async(&self, networks: &[String]) -> PlanResult<()> {
        self.run_simulator(networks)
    }

    fn create_truck_client(
        &self,
        _network: &str,
        _master_file: &str,
        _sim_time: f64,
    ) -> PlanResult<()> {
        Err(PlanError::new(
            ErrorKind::ServiceUnavailable,
            format!("{} has no truck clients", self.service()),
        ))
    }

    fn add_trip(
        &self,
        _network: &str,
        _src_node: &str,
        _dst_node: &str,
        _containers: &[ContainerRecord],
    ) -> PlanResult<()> {
        Err(PlanError::new(
            ErrorKind::ServiceUnavailable,
            format!("{} has no trips", self.service()),
        ))
    }
}

/// Everything a loopback endpoint has been asked to do, for assertions.
#[derive(Clone, Debug, Default)]
pub struct Recorded {
    pub resets: usize,
    pub simulators: Vec<SimulatorSpec>,
    /// (network, vehicle user id, containers)
    pub container_pushes: Vec<(String, String, Vec<ContainerRecord>)>,
    pub runs: Vec<Vec<String>>,
    pub async_runs: Vec<Vec<String>>,
    /// (network, master file, sim time)
    pub truck_clients: Vec<(String, String, f64)>,
    /// (network, src node, dst node, containers)
    pub trips: Vec<(String, String, String, Vec<ContainerRecord>)>,
}

pub struct LoopbackSimulator {
    service: ServiceId,
    state: Mutex<Recorded>,
    reachable: AtomicBool,
    consumers: AtomicBool,
    fail_reset: AtomicBool,
}

impl LoopbackSimulator {
    pub fn new(service: ServiceId) -> Self {
        LoopbackSimulator {
            service,
            state: Mutex::new(Recorded::default()),
            reachable: AtomicBool::new(true),
            consumers: AtomicBool::new(true),
            fail_reset: AtomicBool::new(false),
        }
    }

    pub fn recorded(&self) -> Recorded {
        self.state.lock().unwrap().clone()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_consumers(&self, present: bool) {
        self.consumers.store(present, Ordering::SeqCst);
    }

    pub fn fail_next_reset(&self, fail: bool) {
        self.fail_reset.store(fail, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> PlanResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PlanError::service_unavailable(self.service))
        }
    }
}

impl SimulatorEndpoint for LoopbackSimulator {
    fn service(&self) -> ServiceId {
        self.service
    }

    fn reset_server(&self) -> PlanResult<()> {
        self.check_reachable()?;
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(PlanError::new(
                ErrorKind::ResetFailed,
                format!("{} refused the reset", self.service),
            ));
        }
        let mut state = self.state.lock().unwrap();
        state.resets += 1;
        Ok(())
    }

    fn define_simulator(&self, spec: &SimulatorSpec) -> PlanResult<()> {
        self.check_reachable()?;
        self.state.lock().unwrap().simulators.push(spec.clone());
        Ok(())
    }

    fn add_containers(
        &self,
        network: &str,
        vehicle_user_id: &str,
        containers: &[ContainerRecord],
    ) -> PlanResult<()> {
        self.check_reachable()?;
        self.state.lock().unwrap().container_pushes.push((
            network.to_string(),
            vehicle_user_id.to_string(),
            containers.to_vec(),
        ));
        Ok(())
    }

    fn run_simulator(&self, networks: &[String]) -> PlanResult<()> {
        self.check_reachable()?;
        self.state.lock().unwrap().runs.push(networks.to_vec());
        Ok(())
    }

    fn run_simulation_async(&self, networks: &[String]) -> PlanResult<()> {
        self.check_reachable()?;
        self.state
            .lock()
            .unwrap()
            .async_runs
            .push(networks.to_vec());
        Ok(())
    }

    fn create_truck_client(
        &self,
        network: &str,
        master_file: &str,
        sim_time: f64,
    ) -> PlanResult<()> {
        self.check_reachable()?;
        self.state.lock().unwrap().truck_clients.push((
            network.to_string(),
            master_file.to_string(),
            sim_time,
        ));
        Ok(())
    }

    fn add_trip(
        &self,
        network: &str,
        src_node: &str,
        dst_node: &str,
        containers: &[ContainerRecord],
    ) -> PlanResult<()> {
        self.check_reachable()?;
        self.state.lock().unwrap().trips.push((
            network.to_string(),
            src_node.to_string(),
            dst_node.to_string(),
            containers.to_vec(),
        ));
        Ok(())
    }

    fn has_command_queue_consumers(&self) -> PlanResult<bool> {
        self.check_reachable()?;
        Ok(self.consumers.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_lifecycle() {
        let sim = LoopbackSimulator::new(ServiceId::TrainSim);
        sim.reset_server().unwrap();
        sim.define_simulator(&SimulatorSpec {
            network: "net1".into(),
            time_step: 1.0,
            vehicles: vec![],
            destination_terminals: None,
        })
        .unwrap();
        sim.add_containers("net1", "0_0", &[]).unwrap();
        sim.run_simulator(&["net1".to_string()]).unwrap();
        let rec = sim.recorded();
        assert_eq!(rec.resets, 1);
        assert_eq!(rec.simulators.len(), 1);
        assert_eq!(rec.container_pushes.len(), 1);
        assert_eq!(rec.runs, vec![vec!["net1".to_string()]]);
    }

    #[test]
    fn unreachable_maps_to_service_unavailable() {
        let sim = LoopbackSimulator::new(ServiceId::ShipSim);
        sim.set_reachable(false);
        let err = sim.reset_server().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
        assert!(sim.has_command_queue_consumers().is_err());
    }

    #[test]
    fn truck_ops_unsupported_elsewhere() {
        struct Bare;
        impl SimulatorEndpoint for Bare {
            fn service(&self) -> ServiceId {
                ServiceId::TrainSim
            }
            fn reset_server(&self) -> PlanResult<()> {
                Ok(())
            }
            fn define_simulator(&self, _: &SimulatorSpec) -> PlanResult<()> {
                Ok(())
            }
            fn add_containers(&self, _: &str, _: &str, _: &[ContainerRecord]) -> PlanResult<()> {
                Ok(())
            }
            fn run_simulator(&self, _: &[String]) -> PlanResult<()> {
                Ok(())
            }
            fn has_command_queue_consumers(&self) -> PlanResult<bool> {
                Ok(true)
            }
        }
        assert!(Bare.create_truck_client("n", "m", 3600.0).is_err());
        assert!(Bare.add_trip("n", "1", "2", &[]).is_err());
    }
}
