//! Region registry: the named geographic partitions of the workbench.
//! At least one region always exists and exactly one is current.

use crate::app::EventBus;
use crate::document::objects::ItemId;
use crate::errors::{ErrorKind, PlanError, PlanResult};
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_REGION: &str = "Default Region";

/// Rotating default display colors for new regions, RGBA.
const REGION_COLORS: [[f32; 4]; 6] = [
    [0.121, 0.466, 0.705, 1.0],
    [1.000, 0.498, 0.054, 1.0],
    [0.172, 0.627, 0.172, 1.0],
    [0.839, 0.152, 0.156, 1.0],
    [0.580, 0.403, 0.741, 1.0],
    [0.549, 0.337, 0.294, 1.0],
];

#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct RegionRecord {
    pub color: [f32; 4],
    /// Region-local center coordinates.
    pub lat: f64,
    pub lon: f64,
    /// Placement of the region on the shared global scene.
    pub shared_lat: f64,
    pub shared_lon: f64,
    pub center_point: Option<ItemId>,
    pub photo: Option<ItemId>,
    pub rail_networks: BTreeSet<String>,
    pub truck_networks: BTreeSet<String>,
}

impl Default for RegionRecord {
    fn default() -> Self {
        RegionRecord {
            color: REGION_COLORS[0],
            lat: 0.0,
            lon: 0.0,
            shared_lat: 0.0,
            shared_lon: 0.0,
            center_point: None,
            photo: None,
            rail_networks: BTreeSet::new(),
            truck_networks: BTreeSet::new(),
        }
    }
}

impl RegionRecord {
    pub fn networks(&self, mode: crate::document::objects::Mode) -> &BTreeSet<String> {
        use crate::document::objects::Mode;
        match mode {
            Mode::Rail => &self.rail_networks,
            _ => &self.truck_networks,
        }
    }
}

#[derive(Clone, Debug)]
pub enum RegionEvent {
    Added(String),
    Removed { name: String, fallback: String },
    Renamed { old: String, new: String },
    CurrentChanged(String),
}

pub struct RegionRegistry {
    regions: BTreeMap<String, RegionRecord>,
    current: String,
    created: usize,
    pub events: EventBus<RegionEvent>,
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionRegistry {
    pub fn new() -> Self {
        let mut regions = BTreeMap::new();
        regions.insert(DEFAULT_REGION.to_string(), RegionRecord::default());
        RegionRegistry {
            regions,
            current: DEFAULT_REGION.to_string(),
            created: 1,
            events: EventBus::new(),
        }
    }

    pub fn add_region(&mut self, name: &str) -> PlanResult<()> {
        if self.regions.contains_key(name) {
            return Err(PlanError::new(
                ErrorKind::DuplicateRegion,
                format!("region \"{}\" already exists", name),
            ));
        }
        let mut rec = RegionRecord::default();
        rec.color = REGION_COLORS[self.created % REGION_COLORS.len()];
        self.created += 1;
        self.regions.insert(name.to_string(), rec);
        self.events.publish(RegionEvent::Added(name.to_string()));
        Ok(())
    }

    /// Remove a region. Entities pointing at it must be reassigned by the
    /// caller to `fallback`; the emitted event carries both names.
    pub fn remove_region(&mut self, name: &str, fallback: &str) -> PlanResult<()> {
        if !self.regions.contains_key(name) {
            warn!("remove_region: no region named \"{}\"", name);
            return Ok(());
        }
        if self.regions.len() == 1 {
            return Err(PlanError::new(
                ErrorKind::LastRegion,
                "at least one region must remain",
            ));
        }
        if !self.regions.contains_key(fallback) || fallback == name {
            return Err(PlanError::new(
                ErrorKind::LastRegion,
                format!("no fallback region named \"{}\"", fallback),
            ));
        }
        self.regions.remove(name);
        if self.current == name {
            self.current = fallback.to_string();
            self.events
                .publish(RegionEvent::CurrentChanged(fallback.to_string()));
        }
        self.events.publish(RegionEvent::Removed {
            name: name.to_string(),
            fallback: fallback.to_string(),
        });
        Ok(())
    }

    /// Atomic rename; the record and the current-region marker follow.
    /// Entity region references are re-pointed by the caller on the
    /// emitted event.
    pub fn rename_region(&mut self, old: &str, new: &str) -> PlanResult<()> {
        if old == new {
            return Ok(());
        }
        if self.regions.contains_key(new) {
            return Err(PlanError::new(
                ErrorKind::DuplicateRegion,
                format!("region \"{}\" already exists", new),
            ));
        }
        let rec = match self.regions.remove(old) {
            Some(rec) => rec,
            None => {
                warn!("rename_region: no region named \"{}\"", old);
                return Ok(());
            }
        };
        self.regions.insert(new.to_string(), rec);
        if self.current == old {
            self.current = new.to_string();
        }
        self.events.publish(RegionEvent::Renamed {
            old: old.to_string(),
            new: new.to_string(),
        });
        Ok(())
    }

    pub fn set_current_region(&mut self, name: &str) -> bool {
        if self.regions.contains_key(name) && self.current != name {
            self.current = name.to_string();
            self.events
                .publish(RegionEvent::CurrentChanged(name.to_string()));
            true
        } else {
            self.regions.contains_key(name)
        }
    }

    pub fn current_region(&self) -> &str {
        &self.current
    }

    pub fn get(&self, name: &str) -> Option<&RegionRecord> {
        self.regions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RegionRecord> {
        self.regions.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }

    pub fn get_all_region_names(&self) -> Vec<String> {
        self.regions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Read one derived variable from every region, keyed by region name.
    pub fn all_variables<T>(&self, f: impl Fn(&RegionRecord) -> T) -> BTreeMap<String, T> {
        self.regions
            .iter()
            .map(|(name, rec)| (name.clone(), f(rec)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RegionRecord)> {
        self.regions.iter()
    }
}
