//! Owns the background planning workers and the ranked path table. The
//! UI thread polls `check()` every frame; workers deliver over mpsc
//! channels and are cancelled by token plus channel drop.

use crate::app::{BackgroundJobs, BackgroundUpdates};
use crate::backend::terminal_graph::{PathRecord, TerminalGraphService};
use crate::document::fanout::{self, FanoutInput, FanoutMsg, FanoutSummary, SimEndpoints};
use crate::document::pathfind::{self, PathfindJob, PathfindMsg};
use crate::errors::PlanError;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// One row of the ranked path table. The operator checks the paths to
/// hand to the simulation fan-out.
#[derive(Clone, Debug)]
pub struct RankedPath {
    pub record: PathRecord,
    pub checked: bool,
}

pub struct Analysis {
    pub paths: Vec<RankedPath>,
    pub last_error: Option<PlanError>,
    pub fanout_summary: Option<FanoutSummary>,
    pathfind_rx: Option<Receiver<PathfindMsg>>,
    fanout_rx: Option<Receiver<FanoutMsg>>,
    cancel: Option<Arc<AtomicBool>>,
    bg: BackgroundJobs,
}

impl Analysis {
    pub fn new(bg: BackgroundJobs) -> Self {
        Analysis {
            paths: Vec::new(),
            last_error: None,
            fanout_summary: None,
            pathfind_rx: None,
            fanout_rx: None,
            cancel: None,
            bg,
        }
    }

    pub fn busy(&self) -> bool {
        self.pathfind_rx.is_some() || self.fanout_rx.is_some()
    }

    /// Cancel whatever worker is running; its channel is replaced so a
    /// late result cannot land in the table.
    pub fn cancel(&mut self) {
        if let Some(flag) = self.cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }
        self.pathfind_rx = None;
        self.fanout_rx = None;
    }

    /// Start a path-finding run from a UI-thread snapshot. One at a
    /// time: a previous run is cancelled first.
    pub fn start_pathfind(&mut self, job: PathfindJob, service: Arc<dyn TerminalGraphService>) {
        self.cancel();
        self.last_error = None;
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Some(cancel.clone());
        self.pathfind_rx = Some(pathfind::spawn(&mut self.bg, job, service, cancel));
    }

    /// Start the simulation fan-out for the checked paths.
    pub fn start_fanout(&mut self, input: FanoutInput, endpoints: SimEndpoints) {
        self.cancel();
        self.last_error = None;
        self.fanout_summary = None;
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Some(cancel.clone());
        self.fanout_rx = Some(fanout::spawn(&mut self.bg, input, endpoints, cancel));
    }

    /// The checked subset, with ranked-list positions, in rank order.
    pub fn checked_paths(&self) -> Vec<(usize, PathRecord)> {
        self.paths
            .iter()
            .enumerate()
            .filter(|(_, p)| p.checked)
            .map(|(i, p)| (i, p.record.clone()))
            .collect()
    }

    pub fn set_checked(&mut self, index: usize, checked: bool) {
        if let Some(p) = self.paths.get_mut(index) {
            p.checked = checked;
        }
    }
}

impl BackgroundUpdates for Analysis {
    fn check(&mut self) {
        if let Some(Ok(msg)) = self.pathfind_rx.as_ref().map(|rx| rx.try_recv()) {
            match msg {
                PathfindMsg::ResultReady(paths) => {
                    info!("ranked path table updated: {} paths", paths.len());
                    self.paths = paths
                        .into_iter()
                        .map(|record| RankedPath {
                            record,
                            checked: false,
                        })
                        .collect();
                }
                PathfindMsg::Error(e) => {
                    warn!("path finding failed: {}", e);
                    self.last_error = Some(e);
                }
            }
            self.pathfind_rx = None;
            self.cancel = None;
        }
        if let Some(Ok(msg)) = self.fanout_rx.as_ref().map(|rx| rx.try_recv()) {
            match msg {
                FanoutMsg::Completed(summary) => {
                    info!(
                        "simulation fan-out complete ({} trains, {} ships, {} truck trips)",
                        summary.trains, summary.ships, summary.truck_trips
                    );
                    self.fanout_summary = Some(summary);
                }
                FanoutMsg::Error(e) => {
                    warn!("simulation fan-out failed: {}", e);
                    self.last_error = Some(e);
                }
            }
            self.fanout_rx = None;
            self.cancel = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::BackgroundJobs;
    use crate::backend::simulator::LoopbackSimulator;
    use crate::backend::terminal_graph::InProcessTerminalGraph;
    use crate::backend::ServiceId;
    use crate::document::objects::{Mode, TerminalType};
    use crate::document::regions::DEFAULT_REGION;
    use crate::document::scene::SceneKind;
    use crate::document::Document;
    use nalgebra_glm as glm;
    use std::time::Duration;

    fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> T {
        for _ in 0..200 {
            if let Some(v) = f() {
                return v;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("worker did not finish in time");
    }

    #[test]
    fn pathfind_to_table_to_fanout() {
        let mut d = Document::empty(BackgroundJobs::new());
        let o = d
            .add_terminal("O", TerminalType::Origin, DEFAULT_REGION, glm::vec2(0.0, 0.0))
            .unwrap();
        let t = d
            .add_terminal("T", TerminalType::Destination, DEFAULT_REGION, glm::vec2(5.0, 0.0))
            .unwrap();
        d.connect_terminals(SceneKind::Region, &o, &t, Mode::Ship)
            .unwrap();
        d.get_terminal_mut(&o)
            .unwrap()
            .containers
            .push(crate::document::objects::Container::new("box", "O"));

        let service: Arc<dyn TerminalGraphService> = Arc::new(InProcessTerminalGraph::new());
        let job = pathfind::snapshot(&d, 3);
        d.analysis.start_pathfind(job, service);
        assert!(d.analysis.busy());
        wait_for(|| {
            d.analysis.check();
            if d.analysis.paths.is_empty() {
                None
            } else {
                Some(())
            }
        });
        assert_eq!(d.analysis.paths.len(), 1);
        assert!(d.analysis.last_error.is_none());

        d.analysis.set_checked(0, true);
        let selected = d.analysis.checked_paths();
        assert_eq!(selected.len(), 1);

        let input = fanout::build_input(&d, &selected, Default::default());
        let train = Arc::new(LoopbackSimulator::new(ServiceId::TrainSim));
        let ship = Arc::new(LoopbackSimulator::new(ServiceId::ShipSim));
        let truck = Arc::new(LoopbackSimulator::new(ServiceId::TruckSim));
        let endpoints = SimEndpoints {
            train: train.clone(),
            ship: ship.clone(),
            truck: truck.clone(),
        };
        d.analysis.start_fanout(input, endpoints);
        let summary = wait_for(|| {
            d.analysis.check();
            d.analysis.fanout_summary.clone()
        });
        assert_eq!(summary.ships, 1);
        assert_eq!(ship.recorded().simulators.len(), 1);
    }

    #[test]
    fn errors_land_in_last_error() {
        let mut d = Document::empty(BackgroundJobs::new());
        let service: Arc<dyn TerminalGraphService> = Arc::new(InProcessTerminalGraph::new());
        let job = pathfind::snapshot(&d, 3);
        d.analysis.start_pathfind(job, service);
        let err = wait_for(|| {
            d.analysis.check();
            d.analysis.last_error.clone()
        });
        assert_eq!(err.kind, crate::errors::ErrorKind::NoOriginOrDestination);
        assert!(!d.analysis.busy());
    }
}
