//! Simulation fan-out: splits each accepted path into per-segment jobs
//! partitioned by mode, allocates vehicles and containers, and drives the
//! train, ship and truck simulators.

use crate::app::BackgroundJobs;
use crate::backend::simulator::{
    ContainerRecord, SimulatorEndpoint, SimulatorSpec, VehicleRecord,
};
use crate::backend::terminal_graph::PathRecord;
use crate::coords;
use crate::document::objects::{Container, ItemId, Mode};
use crate::document::vehicles::VehicleTemplate;
use crate::document::Document;
use crate::errors::{ErrorKind, PlanError, PlanResult};
use itertools::Itertools;
use log::*;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;

/// Seconds between consecutive vehicle loads of one allocation batch.
const LOAD_OFFSET_STEP_S: f64 = 10.0;
/// Wall-clock horizon handed to each truck client.
pub const TRUCK_SIM_TIME_S: f64 = 3600.0;

/// Everything the worker needs to know about one endpoint terminal,
/// copied out of the scenes before the worker starts.
#[derive(Clone, Debug)]
pub struct TerminalSnapshot {
    pub id: ItemId,
    pub name: String,
    pub region: String,
    /// (network name, node id) of rail map nodes linked to this terminal.
    pub rail_links: Vec<(String, i64)>,
    pub truck_links: Vec<(String, i64)>,
    /// WGS-84 global position (mirror coordinates when one exists).
    pub global_pos: Option<(f64, f64)>,
}

#[derive(Clone, Debug)]
pub struct SegmentJob {
    pub mode: Mode,
    pub start: Option<TerminalSnapshot>,
    pub end: Option<TerminalSnapshot>,
}

#[derive(Clone, Debug)]
pub struct PathJob {
    pub path_id: usize,
    pub segments: Vec<SegmentJob>,
    /// The Origin's containers; cloned (never mutated in place) before
    /// vehicle assignment.
    pub containers: Vec<Container>,
}

#[derive(Clone, Debug)]
pub struct FanoutInput {
    pub paths: Vec<PathJob>,
    pub rail_capacity: usize,
    pub truck_capacity: usize,
    pub ship_capacity: usize,
    pub train_templates: Vec<VehicleTemplate>,
    pub ship_templates: Vec<VehicleTemplate>,
    /// Master-file path per truck network, from the simulation config.
    pub truck_master_files: BTreeMap<String, String>,
    pub truck_sim_time: f64,
}

#[derive(Clone)]
pub struct SimEndpoints {
    pub train: Arc<dyn SimulatorEndpoint>,
    pub ship: Arc<dyn SimulatorEndpoint>,
    pub truck: Arc<dyn SimulatorEndpoint>,
}

#[derive(Clone, Debug, Default)]
pub struct FanoutSummary {
    pub trains: usize,
    pub ships: usize,
    pub truck_trips: usize,
    pub skipped_segments: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub enum FanoutMsg {
    Completed(FanoutSummary),
    Error(PlanError),
}

fn snapshot_terminal(doc: &Document, id: &str) -> Option<TerminalSnapshot> {
    // region scene first, then the global mirrors
    let (tid, terminal) = match doc.get_terminal(id) {
        Some(t) => (id.to_string(), t),
        None => {
            let g = doc
                .global_scene
                .get_item_by_id(id)
                .and_then(|e| e.as_global_terminal())?;
            (g.terminal.clone(), doc.get_terminal(&g.terminal)?)
        }
    };
    let global_pos = match doc.mirror_of(&tid).and_then(|mid| {
        doc.global_scene
            .get_item_by_id(&mid)
            .and_then(|e| e.as_global_terminal())
            .map(|g| (g.lon, g.lat))
    }) {
        Some(p) => Some(p),
        None => Some(coords::scene_to_geodetic(terminal.pos)),
    };
    Some(TerminalSnapshot {
        id: tid.clone(),
        name: terminal.name.clone(),
        region: terminal.region.clone(),
        rail_links: doc.linked_nodes(&tid, Mode::Rail),
        truck_links: doc.linked_nodes(&tid, Mode::Truck),
        global_pos,
    })
}

/// Build the worker input on the UI thread from the operator's checked
/// subset of the ranked path list.
pub fn build_input(
    doc: &Document,
    selected: &[(usize, PathRecord)],
    truck_master_files: BTreeMap<String, String>,
) -> FanoutInput {
    let containers = doc
        .origin()
        .map(|(_, t)| t.containers.clone())
        .unwrap_or_default();
    let paths = selected
        .iter()
        .map(|(path_id, record)| PathJob {
            path_id: *path_id,
            segments: record
                .segments
                .iter()
                .map(|seg| SegmentJob {
                    mode: seg.mode_enum().unwrap_or(Mode::Truck),
                    start: snapshot_terminal(doc, &seg.start_terminal),
                    end: snapshot_terminal(doc, &seg.end_terminal),
                })
                .collect(),
            containers: containers.clone(),
        })
        .collect();
    FanoutInput {
        paths,
        rail_capacity: doc.vehicles.capacity(Mode::Rail),
        truck_capacity: doc.vehicles.capacity(Mode::Truck),
        ship_capacity: doc.vehicles.capacity(Mode::Ship),
        train_templates: doc
            .vehicles
            .templates(Mode::Rail)
            .into_iter()
            .cloned()
            .collect(),
        ship_templates: doc
            .vehicles
            .templates(Mode::Ship)
            .into_iter()
            .cloned()
            .collect(),
        truck_master_files,
        truck_sim_time: TRUCK_SIM_TIME_S,
    }
}

struct NetworkAlloc {
    /// Vehicles with their assigned containers, in path order.
    vehicles: Vec<(VehicleRecord, Vec<ContainerRecord>)>,
    /// Ship only: destination terminal ids per vehicle user id.
    destinations: BTreeMap<String, Vec<String>>,
}

impl NetworkAlloc {
    fn new() -> Self {
        NetworkAlloc {
            vehicles: Vec::new(),
            destinations: BTreeMap::new(),
        }
    }
}

struct TruckTrip {
    src_node: String,
    dst_node: String,
    containers: Vec<ContainerRecord>,
}

#[derive(Default)]
struct Allocation {
    rail: BTreeMap<String, NetworkAlloc>,
    ship: BTreeMap<String, NetworkAlloc>,
    truck: BTreeMap<String, Vec<TruckTrip>>,
}

/// Deep-copy the path's containers for one vehicle batch: path-scoped
/// ids, current location at the source, destination appended. The
/// originals on the Origin terminal stay untouched.
fn clone_containers(
    path_id: usize,
    originals: &[Container],
    location: &str,
    destination: &str,
) -> Vec<ContainerRecord> {
    originals
        .iter()
        .map(|c| ContainerRecord {
            id: format!("{}_{}", path_id, c.id),
            size_teu: c.size_teu,
            location: location.to_string(),
            destinations: {
                let mut d = c.destinations.clone();
                d.push(destination.to_string());
                d
            },
        })
        .collect()
}

/// Split a container batch over `ceil(n / capacity)` vehicles, at least
/// one.
fn batches(containers: Vec<ContainerRecord>, capacity: usize) -> Vec<Vec<ContainerRecord>> {
    let capacity = capacity.max(1);
    if containers.is_empty() {
        return vec![Vec::new()];
    }
    containers
        .chunks(capacity)
        .map(|c| c.to_vec())
        .collect()
}

/// Networks shared by both endpoints, with the node pair to route over.
fn common_networks(
    start: &[(String, i64)],
    end: &[(String, i64)],
) -> Vec<(String, i64, i64)> {
    start
        .iter()
        .cartesian_product(end.iter())
        .filter(|((na, _), (nb, _))| na == nb)
        .map(|((n, s), (_, e))| (n.clone(), *s, *e))
        .collect()
}

struct Collector<'a> {
    input: &'a FanoutInput,
    alloc: Allocation,
    summary: FanoutSummary,
    errors: Vec<PlanError>,
}

impl<'a> Collector<'a> {
    fn new(input: &'a FanoutInput) -> Self {
        Collector {
            input,
            alloc: Allocation::default(),
            summary: FanoutSummary::default(),
            errors: Vec::new(),
        }
    }

    fn collect_path<R: Rng>(&mut self, path: &PathJob, rng: &mut R) {
        // vehicle user ids inherit path ordering: <path>_<i>
        let mut vehicle_seq = 0usize;
        for seg in &path.segments {
            let (start, end) = match (&seg.start, &seg.end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    warn!(
                        "path {}: segment endpoint terminal is gone, skipping segment",
                        path.path_id
                    );
                    self.summary.skipped_segments += 1;
                    self.summary
                        .warnings
                        .push(format!("path {}: missing endpoint terminal", path.path_id));
                    continue;
                }
            };
            match seg.mode {
                Mode::Rail => self.collect_rail(path, start, end, &mut vehicle_seq, rng),
                Mode::Truck => self.collect_truck(path, start, end),
                Mode::Ship => self.collect_ship(path, start, end, &mut vehicle_seq, rng),
            }
        }
    }

    fn collect_rail<R: Rng>(
        &mut self,
        path: &PathJob,
        start: &TerminalSnapshot,
        end: &TerminalSnapshot,
        vehicle_seq: &mut usize,
        rng: &mut R,
    ) {
        let pairs = common_networks(&start.rail_links, &end.rail_links);
        if pairs.is_empty() {
            // no common network linking the endpoints: skipped, logged only
            warn!(
                "path {}: no common rail network between {} and {}",
                path.path_id, start.name, end.name
            );
            self.summary.skipped_segments += 1;
            return;
        }
        for (network, s_node, e_node) in pairs {
            let clones = clone_containers(
                path.path_id,
                &path.containers,
                &s_node.to_string(),
                &e_node.to_string(),
            );
            for (i, batch) in batches(clones, self.input.rail_capacity).into_iter().enumerate() {
                let template = match self.input.train_templates.choose(rng) {
                    Some(t) => t.name.clone(),
                    None => {
                        self.errors.push(PlanError::new(
                            ErrorKind::InvalidConfig,
                            "no train templates available",
                        ));
                        return;
                    }
                };
                let vehicle = VehicleRecord {
                    user_id: format!("{}_{}", path.path_id, vehicle_seq),
                    template,
                    mode: Mode::Rail,
                    route_nodes: vec![s_node.to_string(), e_node.to_string()],
                    route_points: Vec::new(),
                    load_offset_s: LOAD_OFFSET_STEP_S * i as f64,
                    capacity: self.input.rail_capacity,
                };
                *vehicle_seq += 1;
                self.summary.trains += 1;
                self.alloc
                    .rail
                    .entry(network.clone())
                    .or_insert_with(NetworkAlloc::new)
                    .vehicles
                    .push((vehicle, batch));
            }
        }
    }

    fn collect_truck(&mut self, path: &PathJob, start: &TerminalSnapshot, end: &TerminalSnapshot) {
        let pairs = common_networks(&start.truck_links, &end.truck_links);
        if pairs.is_empty() {
            warn!(
                "path {}: no common truck network between {} and {}",
                path.path_id, start.name, end.name
            );
            self.summary.skipped_segments += 1;
            return;
        }
        for (network, s_node, e_node) in pairs {
            let clones = clone_containers(
                path.path_id,
                &path.containers,
                &s_node.to_string(),
                &e_node.to_string(),
            );
            for batch in batches(clones, self.input.truck_capacity) {
                self.summary.truck_trips += 1;
                self.alloc
                    .truck
                    .entry(network.clone())
                    .or_insert_with(Vec::new)
                    .push(TruckTrip {
                        src_node: s_node.to_string(),
                        dst_node: e_node.to_string(),
                        containers: batch,
                    });
            }
        }
    }

    fn collect_ship<R: Rng>(
        &mut self,
        path: &PathJob,
        start: &TerminalSnapshot,
        end: &TerminalSnapshot,
        vehicle_seq: &mut usize,
        rng: &mut R,
    ) {
        let (start_pos, end_pos) = match (start.global_pos, end.global_pos) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                self.errors.push(PlanError::new(
                    ErrorKind::InvalidCoordinate,
                    format!(
                        "path {}: ship leg {} -> {} has no global coordinates",
                        path.path_id, start.name, end.name
                    ),
                ));
                return;
            }
        };
        let network = if start.region == end.region {
            start.region.clone()
        } else {
            format!("{}_to_{}", start.region, end.region)
        };
        let clones = clone_containers(path.path_id, &path.containers, &start.id, &end.id);
        for (i, batch) in batches(clones, self.input.ship_capacity).into_iter().enumerate() {
            let template = match self.input.ship_templates.choose(rng) {
                Some(t) => t.name.clone(),
                None => {
                    self.errors.push(PlanError::new(
                        ErrorKind::InvalidConfig,
                        "no ship templates available",
                    ));
                    return;
                }
            };
            let vehicle = VehicleRecord {
                user_id: format!("{}_{}", path.path_id, vehicle_seq),
                template,
                mode: Mode::Ship,
                route_nodes: Vec::new(),
                route_points: vec![start_pos, end_pos],
                load_offset_s: LOAD_OFFSET_STEP_S * i as f64,
                capacity: self.input.ship_capacity,
            };
            let alloc = self
                .alloc
                .ship
                .entry(network.clone())
                .or_insert_with(NetworkAlloc::new);
            alloc
                .destinations
                .insert(vehicle.user_id.clone(), vec![end.id.clone()]);
            *vehicle_seq += 1;
            self.summary.ships += 1;
            alloc.vehicles.push((vehicle, batch));
        }
    }
}

fn check_cancel(cancel: &AtomicBool) -> PlanResult<()> {
    if cancel.load(Ordering::SeqCst) {
        Err(PlanError::cancelled())
    } else {
        Ok(())
    }
}

/// Reset-define-push-run against one vehicle simulator (rail or ship).
fn drive_vehicle_sim(
    endpoint: &dyn SimulatorEndpoint,
    allocs: &BTreeMap<String, NetworkAlloc>,
    with_destinations: bool,
) -> PlanResult<()> {
    if allocs.is_empty() {
        return Ok(());
    }
    // a failed reset aborts the whole run
    endpoint.reset_server().map_err(|e| {
        PlanError::new(ErrorKind::ResetFailed, format!("{}: {}", endpoint.service(), e))
    })?;
    for (network, alloc) in allocs {
        endpoint.define_simulator(&SimulatorSpec {
            network: network.clone(),
            time_step: 1.0,
            vehicles: alloc.vehicles.iter().map(|(v, _)| v.clone()).collect(),
            destination_terminals: if with_destinations {
                Some(alloc.destinations.clone())
            } else {
                None
            },
        })?;
        for (vehicle, containers) in &alloc.vehicles {
            endpoint.add_containers(network, &vehicle.user_id, containers)?;
        }
    }
    let networks: Vec<String> = allocs.keys().cloned().collect();
    endpoint.run_simulator(&networks)
}

fn drive_truck_sim(
    endpoint: &dyn SimulatorEndpoint,
    allocs: &BTreeMap<String, Vec<TruckTrip>>,
    input: &FanoutInput,
    errors: &mut Vec<PlanError>,
) -> PlanResult<()> {
    if allocs.is_empty() {
        return Ok(());
    }
    endpoint.reset_server().map_err(|e| {
        PlanError::new(ErrorKind::ResetFailed, format!("{}: {}", endpoint.service(), e))
    })?;
    let mut touched = Vec::new();
    for (network, trips) in allocs {
        let master_file = match input.truck_master_files.get(network) {
            Some(m) => m.clone(),
            None => {
                errors.push(PlanError::new(
                    ErrorKind::InvalidConfig,
                    format!("no master file configured for truck network {}", network),
                ));
                continue;
            }
        };
        endpoint.create_truck_client(network, &master_file, input.truck_sim_time)?;
        for trip in trips {
            endpoint.add_trip(network, &trip.src_node, &trip.dst_node, &trip.containers)?;
        }
        touched.push(network.clone());
    }
    if touched.is_empty() {
        return Ok(());
    }
    endpoint.run_simulation_async(&touched)
}

/// The fan-out pipeline: collect allocations per path in ranked order,
/// then drive the three simulators.
pub fn run(
    input: &FanoutInput,
    endpoints: &SimEndpoints,
    cancel: &AtomicBool,
) -> PlanResult<FanoutSummary> {
    let mut rng = rand::thread_rng();
    let mut collector = Collector::new(input);
    for path in &input.paths {
        check_cancel(cancel)?;
        collector.collect_path(path, &mut rng);
    }
    check_cancel(cancel)?;

    let Collector {
        alloc,
        mut summary,
        mut errors,
        ..
    } = collector;

    drive_vehicle_sim(endpoints.train.as_ref(), &alloc.rail, false)?;
    check_cancel(cancel)?;
    drive_vehicle_sim(endpoints.ship.as_ref(), &alloc.ship, true)?;
    check_cancel(cancel)?;
    drive_truck_sim(endpoints.truck.as_ref(), &alloc.truck, input, &mut errors)?;

    if !errors.is_empty() {
        let first = errors.remove(0);
        let mut message = first.message.clone();
        for e in &errors {
            message.push_str("; ");
            message.push_str(&e.message);
        }
        return Err(PlanError::new(first.kind, message));
    }
    info!(
        "fan-out complete: {} trains, {} ships, {} truck trips, {} segments skipped",
        summary.trains, summary.ships, summary.truck_trips, summary.skipped_segments
    );
    summary.warnings.dedup();
    Ok(summary)
}

/// Run the fan-out off the UI thread; the result arrives on the returned
/// channel.
pub fn spawn(
    bg: &mut BackgroundJobs,
    input: FanoutInput,
    endpoints: SimEndpoints,
    cancel: Arc<AtomicBool>,
) -> Receiver<FanoutMsg> {
    let (tx, rx) = channel();
    bg.execute(move || {
        let msg = match run(&input, &endpoints, &cancel) {
            Ok(summary) => FanoutMsg::Completed(summary),
            Err(e) => FanoutMsg::Error(e),
        };
        if tx.send(msg).is_err() {
            debug!("fan-out finished after its receiver was dropped");
        }
    });
    rx
}
