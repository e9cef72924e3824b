//! Vehicle templates and per-mode container capacities. The fan-out
//! worker draws templates at random when allocating trains, trucks and
//! ships to route segments.

use crate::document::objects::Mode;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct VehicleTemplate {
    pub name: String,
    pub mode: Mode,
    pub length: f64,
    pub max_speed: f64,
    /// Containers one vehicle of this template carries on average.
    pub average_container_number: usize,
}

pub struct VehicleRegistry {
    templates: Vec<VehicleTemplate>,
}

impl VehicleRegistry {
    pub fn empty() -> Self {
        VehicleRegistry {
            templates: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut r = Self::empty();
        r.add(VehicleTemplate {
            name: "freight-train-long".into(),
            mode: Mode::Rail,
            length: 750.0,
            max_speed: 120.0,
            average_container_number: 100,
        });
        r.add(VehicleTemplate {
            name: "freight-train-short".into(),
            mode: Mode::Rail,
            length: 400.0,
            max_speed: 140.0,
            average_container_number: 60,
        });
        r.add(VehicleTemplate {
            name: "semi-trailer".into(),
            mode: Mode::Truck,
            length: 16.5,
            max_speed: 90.0,
            average_container_number: 1,
        });
        r.add(VehicleTemplate {
            name: "feeder-vessel".into(),
            mode: Mode::Ship,
            length: 140.0,
            max_speed: 18.0,
            average_container_number: 800,
        });
        r.add(VehicleTemplate {
            name: "panamax-vessel".into(),
            mode: Mode::Ship,
            length: 290.0,
            max_speed: 22.0,
            average_container_number: 4500,
        });
        r
    }

    pub fn add(&mut self, t: VehicleTemplate) {
        self.templates.push(t);
    }

    pub fn templates(&self, mode: Mode) -> Vec<&VehicleTemplate> {
        self.templates.iter().filter(|t| t.mode == mode).collect()
    }

    pub fn random_template<R: Rng>(&self, mode: Mode, rng: &mut R) -> Option<&VehicleTemplate> {
        let of_mode = self.templates(mode);
        of_mode.choose(rng).copied()
    }

    /// Capacity used when splitting a container batch over vehicles of a
    /// mode: the smallest template capacity, never below one.
    pub fn capacity(&self, mode: Mode) -> usize {
        self.templates(mode)
            .iter()
            .map(|t| t.average_container_number)
            .min()
            .unwrap_or(1)
            .max(1)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for VehicleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_modes() {
        let r = VehicleRegistry::with_defaults();
        for &mode in &[Mode::Rail, Mode::Truck, Mode::Ship] {
            assert!(!r.templates(mode).is_empty(), "{:?}", mode);
            assert!(r.capacity(mode) >= 1);
        }
        assert_eq!(r.capacity(Mode::Truck), 1);
        assert_eq!(r.capacity(Mode::Rail), 60);
    }

    #[test]
    fn random_pick_is_of_requested_mode() {
        let r = VehicleRegistry::with_defaults();
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let t = r.random_template(Mode::Ship, &mut rng).unwrap();
            assert_eq!(t.mode, Mode::Ship);
        }
        assert!(VehicleRegistry::empty()
            .random_template(Mode::Rail, &mut rng)
            .is_none());
    }
}
