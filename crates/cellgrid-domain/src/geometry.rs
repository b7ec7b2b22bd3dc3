//! Distance checks on the integer grid.
//!
//! All comparisons are done on squared distances in `i64`, so they are
//! exact and cannot overflow for any `i32` coordinates.

use cellgrid_types::CellId;

/// Hard cap on the radius of any span or fill.
pub const MAX_SPREAD_RADIUS: i32 = 50;

/// Whether `id` lies within `radius` of `(center_x, center_y)`.
///
/// A negative radius contains nothing.
pub fn within(id: CellId, center_x: i32, center_y: i32, radius: i32) -> bool {
    if radius < 0 {
        return false;
    }
    let r = i64::from(radius);
    id.distance_squared_to(center_x, center_y) <= r.saturating_mul(r)
}

/// Whether `id` lies within `min(50, radius)` of `(center_x, center_y)`.
pub fn inside_radius(id: CellId, center_x: i32, center_y: i32, radius: i32) -> bool {
    within(id, center_x, center_y, radius.min(MAX_SPREAD_RADIUS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_inclusive() {
        assert!(inside_radius(CellId::new(3, 4), 0, 0, 5));
        assert!(!inside_radius(CellId::new(3, 5), 0, 0, 5));
    }

    #[test]
    fn radius_is_capped_at_fifty() {
        assert!(inside_radius(CellId::new(50, 0), 0, 0, 1000));
        assert!(!inside_radius(CellId::new(51, 0), 0, 0, 1000));
        assert!(within(CellId::new(51, 0), 0, 0, 1000));
    }

    #[test]
    fn negative_radius_contains_nothing() {
        assert!(!inside_radius(CellId::new(0, 0), 0, 0, -1));
        assert!(within(CellId::new(0, 0), 0, 0, 0));
    }
}
