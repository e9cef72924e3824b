//! The simulation configuration file consumed by the truck flow: a JSON
//! document with a `simulation` section and a non-empty `networks` list.
//! Relative master-file paths resolve against the file's directory.

use crate::errors::{ErrorKind, PlanError, PlanResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct SimulationSection {
    pub duration: f64,
    pub time_step: f64,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct NetworkSection {
    pub name: String,
    pub master_file: String,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct SimulationConfig {
    pub simulation: SimulationSection,
    pub networks: Vec<NetworkSection>,
}

impl SimulationConfig {
    pub fn from_str(text: &str) -> PlanResult<Self> {
        let config: SimulationConfig = serde_json::from_str(text)
            .map_err(|e| PlanError::new(ErrorKind::InvalidConfig, e.to_string()))?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(PlanError::new(ErrorKind::InvalidConfig, errors.join("; ")))
        }
    }

    /// Load and validate; master-file paths become absolute relative to
    /// the config file's directory.
    pub fn load(path: &Path) -> PlanResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PlanError::new(
                ErrorKind::InvalidConfig,
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        let mut config = Self::from_str(&text)?;
        if let Some(dir) = path.parent() {
            for net in &mut config.networks {
                let p = Path::new(&net.master_file);
                if p.is_relative() {
                    net.master_file = dir.join(p).to_string_lossy().into_owned();
                }
            }
        }
        Ok(config)
    }

    /// All violations, not just the first, for the error-list dialog.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(self.simulation.duration > 0.0) {
            errors.push("simulation.duration must be positive".to_string());
        }
        if !(self.simulation.time_step > 0.0) {
            errors.push("simulation.time_step must be positive".to_string());
        }
        if self.networks.is_empty() {
            errors.push("networks must not be empty".to_string());
        }
        let mut seen = std::collections::BTreeSet::new();
        for (i, net) in self.networks.iter().enumerate() {
            if net.name.is_empty() {
                errors.push(format!("networks[{}].name is empty", i));
            } else if !seen.insert(net.name.clone()) {
                errors.push(format!("duplicate network name \"{}\"", net.name));
            }
            if net.master_file.is_empty() {
                errors.push(format!("networks[{}].master_file is empty", i));
            }
        }
        errors
    }

    /// Master-file path per network name, as the fan-out worker wants it.
    pub fn master_files(&self) -> BTreeMap<String, String> {
        self.networks
            .iter()
            .map(|n| (n.name.clone(), n.master_file.clone()))
            .collect()
    }
}
