//! Interfaces to the external simulation services. The transport itself
//! (message broker, queues) is an external collaborator; the traits here
//! are the surface the planning core depends on, and the in-process
//! implementations back the tests and the headless driver.

pub mod heartbeat;
pub mod simulator;
pub mod terminal_graph;

use serde::{Deserialize, Serialize};

/// The four backend services the workbench talks to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub enum ServiceId {
    TerminalSim,
    TrainSim,
    ShipSim,
    TruckSim,
}

impl ServiceId {
    pub const ALL: [ServiceId; 4] = [
        ServiceId::TerminalSim,
        ServiceId::TrainSim,
        ServiceId::ShipSim,
        ServiceId::TruckSim,
    ];

    /// Suffix of the command queue name.
    pub fn queue_suffix(&self) -> &'static str {
        match self {
            ServiceId::TerminalSim => "TerminalSim",
            ServiceId::TrainSim => "TrainSim",
            ServiceId::ShipSim => "ShipSim",
            ServiceId::TruckSim => "TruckSim",
        }
    }

    /// Fixed queue-name convention used by the heartbeat fallback.
    pub fn queue_name(&self) -> String {
        format!("CargoNetSim.CommandQueue.{}", self.queue_suffix())
    }

    /// Name shown next to the status indicator.
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceId::TerminalSim => "TerminalSim",
            ServiceId::TrainSim => "NeTrainSim",
            ServiceId::ShipSim => "ShipNetSim",
            ServiceId::TruckSim => "INTEGRATION",
        }
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
