//! Two-click distance measurement. Geodetic measurements use Vincenty's
//! inverse formula on the WGS-84 ellipsoid; in projected mode the
//! distance is Euclidean on Web Mercator, which is not geodesic and is
//! accepted as the cost of the projection.

use crate::coords::{self, PtS};
use nalgebra_glm as glm;
use serde::{Deserialize, Serialize};

pub const WGS84_A: f64 = 6378137.0;
pub const WGS84_B: f64 = 6356752.314245;

const MAX_ITERATIONS: usize = 100;
const CONVERGENCE: f64 = 1e-12;

/// Geodesic distance in metres between two (lon, lat) points via
/// Vincenty's inverse formula. Coincident and antipodal-degenerate
/// inputs return 0.
pub fn vincenty_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let f = (WGS84_A - WGS84_B) / WGS84_A;
    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - f) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - f) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = (u1.sin(), u1.cos());
    let (sin_u2, cos_u2) = (u2.sin(), u2.cos());

    let mut lambda = l;
    let mut iterations = 0;
    let (mut sin_sigma, mut cos_sigma, mut sigma);
    let (mut cos_sq_alpha, mut cos_2sigma_m);
    loop {
        let sin_lambda = lambda.sin();
        let cos_lambda = lambda.cos();
        sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            return 0.0;
        }
        cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            // both points on the equator
            0.0
        };
        let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
        let lambda_prev = lambda;
        lambda = l
            + (1.0 - c)
                * f
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m
                            + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));
        iterations += 1;
        if (lambda - lambda_prev).abs() < CONVERGENCE || iterations >= MAX_ITERATIONS {
            break;
        }
    }

    let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
    let a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    let delta_sigma = b
        * sin_sigma
        * (cos_2sigma_m
            + b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                    - b / 6.0
                        * cos_2sigma_m
                        * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                        * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));
    WGS84_B * a * (sigma - delta_sigma)
}

/// Euclidean distance on the Web Mercator plane between two (lon, lat)
/// points.
pub fn projected_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (x1, y1) = coords::to_projected(lon1, lat1);
    let (x2, y2) = coords::to_projected(lon2, lat2);
    ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt()
}

/// Label text: metres below 1 km, otherwise kilometres with one decimal.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.1} m", meters)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub enum DistanceMode {
    Geodetic,
    Projected,
}

/// A completed measurement overlay, retained in the scene until cleared.
#[derive(Clone, Debug)]
pub struct Measurement {
    pub start: PtS,
    pub end: PtS,
    pub meters: f64,
    pub mode: DistanceMode,
}

impl Measurement {
    pub fn label(&self) -> String {
        format_distance(self.meters)
    }

    /// Scene position of the white-backed label.
    pub fn label_pos(&self) -> PtS {
        (self.start + self.end) * 0.5
    }
}

/// Interactive two-click measurement state.
pub struct MeasureTool {
    pub mode: DistanceMode,
    start: Option<PtS>,
    pub completed: Vec<Measurement>,
}

impl MeasureTool {
    pub fn new() -> Self {
        MeasureTool {
            mode: DistanceMode::Geodetic,
            start: None,
            completed: Vec::new(),
        }
    }

    pub fn pending_start(&self) -> Option<PtS> {
        self.start
    }

    /// First click places the start point; the second fixes the end and
    /// yields the finished measurement.
    pub fn click(&mut self, p: PtS) -> Option<Measurement> {
        match self.start.take() {
            None => {
                self.start = Some(p);
                None
            }
            Some(start) => {
                let meters = self.distance(start, p);
                let m = Measurement {
                    start,
                    end: p,
                    meters,
                    mode: self.mode,
                };
                self.completed.push(m.clone());
                Some(m)
            }
        }
    }

    pub fn cancel(&mut self) {
        self.start = None;
    }

    pub fn clear_overlays(&mut self) {
        self.completed.clear();
    }

    fn distance(&self, a: PtS, b: PtS) -> f64 {
        if glm::length2(&(a - b)) == 0.0 {
            return 0.0;
        }
        let (lon1, lat1) = coords::scene_to_geodetic(a);
        let (lon2, lat2) = coords::scene_to_geodetic(b);
        match self.mode {
            DistanceMode::Geodetic => vincenty_distance(lon1, lat1, lon2, lat2),
            DistanceMode::Projected => projected_distance(lon1, lat1, lon2, lat2),
        }
    }
}

impl Default for MeasureTool {
    fn default() -> Self {
        Self::new()
    }
}
