use crate::error::{AppError, Result};
use crate::models::{Fix, Waypoint};

const EARTH_RADIUS_KM: f64 = 6371.0;

// Great-circle distance between two GPS coordinates (returns km)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Index of the waypoint closest to the given position. On exact ties the
/// lowest index wins. Returns `None` for an empty slice.
pub fn nearest_waypoint(lat: f64, lon: f64, waypoints: &[Waypoint]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, wp) in waypoints.iter().enumerate() {
        let dist = haversine_distance(lat, lon, wp.latitude, wp.longitude);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((idx, dist)),
        }
    }
    best.map(|(idx, _)| idx)
}

pub fn validate_fix(fix: &Fix) -> Result<()> {
    if !(-90.0..=90.0).contains(&fix.latitude) {
        return Err(AppError::OutOfBounds(format!("latitude {}", fix.latitude)));
    }
    if !(-180.0..=180.0).contains(&fix.longitude) {
        return Err(AppError::OutOfBounds(format!("longitude {}", fix.longitude)));
    }
    if !(fix.speed >= 0.0) {
        return Err(AppError::OutOfBounds(format!("speed {}", fix.speed)));
    }
    if !(0.0..360.0).contains(&fix.heading) {
        return Err(AppError::OutOfBounds(format!("heading {}", fix.heading)));
    }
    Ok(())
}
