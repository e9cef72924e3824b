//! Application context and cross-cutting concerns: the backend handle
//! bundle, the background thread pool, the poll-based update protocol,
//! and the publish/subscribe event bus that replaces toolkit signals.
//! There are no process-wide singletons; everything hangs off `App`.

use crate::backend::heartbeat::{
    ConsumerProbe, HeartbeatConfig, HeartbeatMonitor, QueueIntrospect, TerminalGraphProbe,
};
use crate::backend::simulator::{LoopbackSimulator, SimulatorEndpoint};
use crate::backend::terminal_graph::{InProcessTerminalGraph, TerminalGraphService};
use crate::backend::ServiceId;
use crate::config::SimulationConfig;
use crate::document::fanout::{self, SimEndpoints};
use crate::document::pathfind;
use crate::document::Document;
use crate::interaction::Interaction;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

/// Shared worker pool for the one-shot planning tasks.
#[derive(Clone)]
pub struct BackgroundJobs(threadpool::ThreadPool);

impl BackgroundJobs {
    pub fn new() -> Self {
        BackgroundJobs(threadpool::ThreadPool::new(3))
    }

    pub fn execute(&mut self, job: impl FnOnce() + Send + 'static) {
        self.0.execute(job)
    }
}

impl Default for BackgroundJobs {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by everything that owns a receiving end of a worker
/// channel; called once per UI frame on the UI thread.
pub trait BackgroundUpdates {
    fn check(&mut self);
}

/// Minimal publish/subscribe bus. Subscribers that disappear are dropped
/// on the next publish.
pub struct EventBus<E> {
    subscribers: Vec<Sender<E>>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        EventBus {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<E> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: E) {
        self.subscribers.retain(|s| s.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles to the four backend services.
#[derive(Clone)]
pub struct Backends {
    pub terminal_graph: Arc<dyn TerminalGraphService>,
    pub train: Arc<dyn SimulatorEndpoint>,
    pub ship: Arc<dyn SimulatorEndpoint>,
    pub truck: Arc<dyn SimulatorEndpoint>,
    /// Broker introspection for the heartbeat fallback, when available.
    pub broker: Option<Arc<dyn QueueIntrospect>>,
}

impl Backends {
    /// All-in-process backends, used headless and in tests.
    pub fn in_process() -> Self {
        Backends {
            terminal_graph: Arc::new(InProcessTerminalGraph::new()),
            train: Arc::new(LoopbackSimulator::new(ServiceId::TrainSim)),
            ship: Arc::new(LoopbackSimulator::new(ServiceId::ShipSim)),
            truck: Arc::new(LoopbackSimulator::new(ServiceId::TruckSim)),
            broker: None,
        }
    }

    pub fn sim_endpoints(&self) -> SimEndpoints {
        SimEndpoints {
            train: self.train.clone(),
            ship: self.ship.clone(),
            truck: self.truck.clone(),
        }
    }
}

/// The application context handed down to every component; tests build a
/// fresh one per case.
pub struct App {
    pub document: Document,
    pub interaction: Interaction,
    pub backends: Backends,
    pub heartbeat: Option<HeartbeatMonitor>,
    pub background_jobs: BackgroundJobs,
}

impl App {
    pub fn new(backends: Backends) -> Self {
        let background_jobs = BackgroundJobs::new();
        App {
            document: Document::empty(background_jobs.clone()),
            interaction: Interaction::new(),
            backends,
            heartbeat: None,
            background_jobs,
        }
    }

    /// Poll every background channel; called once per UI frame.
    pub fn check(&mut self) {
        self.document.analysis.check();
    }

    pub fn start_heartbeat(&mut self, config: HeartbeatConfig) {
        let probes: Vec<Arc<dyn ConsumerProbe>> = vec![
            Arc::new(TerminalGraphProbe(self.backends.terminal_graph.clone())),
            Arc::new(EndpointProbe(self.backends.train.clone())),
            Arc::new(EndpointProbe(self.backends.ship.clone())),
            Arc::new(EndpointProbe(self.backends.truck.clone())),
        ];
        self.heartbeat = Some(HeartbeatMonitor::start(
            probes,
            self.backends.broker.clone(),
            config,
        ));
    }

    pub fn stop_heartbeat(&mut self) {
        if let Some(monitor) = self.heartbeat.take() {
            monitor.stop();
        }
    }

    /// Kick off the path-finding worker for the current graph.
    pub fn find_paths(&mut self, k: usize) {
        let job = pathfind::snapshot(&self.document, k);
        self.document
            .analysis
            .start_pathfind(job, self.backends.terminal_graph.clone());
    }

    /// Kick off the simulation fan-out for the checked paths.
    pub fn validate_checked_paths(&mut self, config: Option<&SimulationConfig>) {
        let selected = self.document.analysis.checked_paths();
        let master_files = config.map(|c| c.master_files()).unwrap_or_default();
        let input = fanout::build_input(&self.document, &selected, master_files);
        let endpoints = self.backends.sim_endpoints();
        self.document.analysis.start_fanout(input, endpoints);
    }
}

/// Adapts a simulator endpoint handle to the heartbeat probe interface.
struct EndpointProbe(Arc<dyn SimulatorEndpoint>);

impl ConsumerProbe for EndpointProbe {
    fn service(&self) -> ServiceId {
        self.0.service()
    }
    fn has_command_queue_consumers(&self) -> crate::errors::PlanResult<bool> {
        self.0.has_command_queue_consumers()
    }
}
