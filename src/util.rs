use crate::coords::PtS;
use nalgebra_glm as glm;
use rand::Rng;

/// Process-wide unique entity id: 128 random bits as lowercase hex.
/// Stable for the lifetime of the entity it names.
pub fn new_item_id() -> String {
    let mut rng = rand::thread_rng();
    format!("{:032x}", rng.gen::<u128>())
}

pub fn order<T: Ord>(a: T, b: T) -> (T, T) {
    if b < a {
        (b, a)
    } else {
        (a, b)
    }
}

/// Canonical form of an unordered id pair, for per-pair uniqueness keys.
pub fn unordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if b < a {
        (b, a)
    } else {
        (a, b)
    }
}

pub fn project_to_line(p: PtS, a: PtS, b: PtS) -> (PtS, f64) {
    let len2 = glm::distance2(&a, &b);
    if len2 == 0.0 {
        return (a, 0.0);
    }
    let t = (glm::dot(&(p - a), &(b - a)) / len2).max(0.0).min(1.0);
    (glm::lerp(&a, &b, t), t)
}

pub fn dist_to_line_sqr(p0: PtS, a: PtS, b: PtS) -> (f64, f64) {
    let (p, param) = project_to_line(p0, a, b);
    (glm::length2(&(p - p0)), param)
}

pub fn in_rect(pt: PtS, a: PtS, b: PtS) -> bool {
    let (x_lo, x_hi) = (a.x.min(b.x), a.x.max(b.x));
    let (y_lo, y_hi) = (a.y.min(b.y), a.y.max(b.y));
    x_lo <= pt.x && pt.x <= x_hi && y_lo <= pt.y && pt.y <= y_hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_glm as glm;

    #[test]
    fn ids_are_unique_and_hex() {
        let a = new_item_id();
        let b = new_item_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn pair_order() {
        assert_eq!(unordered_pair("b", "a"), ("a", "b"));
        assert_eq!(unordered_pair("a", "b"), ("a", "b"));
    }

    #[test]
    fn line_distance() {
        let (d, t) = dist_to_line_sqr(
            glm::vec2(0.0, 1.0),
            glm::vec2(-1.0, 0.0),
            glm::vec2(1.0, 0.0),
        );
        assert!((d - 1.0).abs() < 1e-12);
        assert!((t - 0.5).abs() < 1e-12);
    }
}
