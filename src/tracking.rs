//! Reconciles live GPS fixes against a trip's route.
//!
//! Progress is the index of the waypoint nearest to the latest fix. The
//! heuristic has no notion of direction, so the index may move backwards.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::geo::nearest_waypoint;
use crate::lifecycle;
use crate::models::{Bus, Fix, Location, PositionReport, Route, Trip, TripProgress, TripStatus};
use crate::store::MemoryStore;

const ASSUMED_SPEED_KMH: f64 = 50.0;

pub fn progress_percent(current_waypoint: usize, waypoint_count: usize) -> u32 {
    if waypoint_count == 0 {
        return 0;
    }
    (current_waypoint as f64 / waypoint_count as f64 * 100.0).round() as u32
}

pub fn remaining_distance_km(route: &Route, current_waypoint: usize) -> f64 {
    let count = route.waypoints.len();
    if count == 0 {
        return route.distance_km;
    }
    route.distance_km * (1.0 - current_waypoint as f64 / count as f64)
}

/// Projected arrival assuming a constant average speed over the remaining
/// distance. Only defined for in-progress trips whose bus has reported a fix,
/// and `None` when the projection does not fit in a timestamp.
pub fn estimate_arrival(trip: &Trip, route: &Route, bus: &Bus, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if trip.status != TripStatus::InProgress || bus.current_location.is_none() {
        return None;
    }
    let remaining_km = remaining_distance_km(route, trip.current_waypoint);
    let remaining_minutes = remaining_km / ASSUMED_SPEED_KMH * 60.0;
    let offset = TimeDelta::try_milliseconds((remaining_minutes * 60_000.0).round() as i64)?;
    now.checked_add_signed(offset)
}

fn build_progress(trip: &Trip, route: &Route, bus: &Bus, now: DateTime<Utc>) -> TripProgress {
    TripProgress {
        trip_id: trip.id.clone(),
        current_waypoint: trip.current_waypoint,
        waypoint_name: route
            .waypoints
            .get(trip.current_waypoint)
            .map(|wp| wp.name.clone()),
        progress: progress_percent(trip.current_waypoint, route.waypoints.len()),
        estimated_arrival: estimate_arrival(trip, route, bus, now),
    }
}

async fn find_in_progress_trip(store: &MemoryStore, bus_id: &str, now: DateTime<Utc>) -> Result<Option<Trip>> {
    let filter = lifecycle::TripFilter {
        status: Some(TripStatus::InProgress),
        bus_id: Some(bus_id.to_string()),
        route_id: None,
    };
    Ok(lifecycle::list_trips(store, &filter, now).await?.into_iter().next())
}

pub async fn report_position(
    store: &MemoryStore,
    bus_id: &str,
    fix: Fix,
    now: DateTime<Utc>,
) -> Result<PositionReport> {
    let mut bus = store.get_bus(bus_id).await?;
    let location = Location {
        latitude: fix.latitude,
        longitude: fix.longitude,
        speed: fix.speed,
        heading: fix.heading,
        last_updated: now,
    };
    bus.current_location = Some(location.clone());
    let bus = store.update_bus(bus).await?;
    debug!("Bus {} at ({}, {})", bus.id, fix.latitude, fix.longitude);

    let Some(mut trip) = find_in_progress_trip(store, bus_id, now).await? else {
        return Ok(PositionReport { location, trip_progress: None });
    };

    let route = store.get_route(&trip.route_id).await?;
    if let Some(idx) = nearest_waypoint(fix.latitude, fix.longitude, &route.waypoints) {
        if idx != trip.current_waypoint {
            info!(
                "Trip {} moved from waypoint {} to {}",
                trip.id, trip.current_waypoint, idx
            );
            trip.current_waypoint = idx;
            trip.updated_at = now;
            trip = store.update_trip(trip).await?;
        }
    }

    Ok(PositionReport {
        location,
        trip_progress: Some(build_progress(&trip, &route, &bus, now)),
    })
}

/// Read-only progress view for a single trip.
pub async fn trip_tracking(store: &MemoryStore, trip_id: &str, now: DateTime<Utc>) -> Result<TripProgress> {
    let trip = lifecycle::load_trip(store, trip_id, now).await?;
    let route = store.get_route(&trip.route_id).await?;
    let bus = store.get_bus(&trip.bus_id).await?;
    Ok(build_progress(&trip, &route, &bus, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{BusStatus, Waypoint};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 2, 7, 30, 0).unwrap()
    }

    fn route() -> Route {
        let wp = |name: &str, lat: f64, lon: f64, km: f64| Waypoint {
            name: name.to_string(),
            latitude: lat,
            longitude: lon,
            distance_from_start: km,
            stop_duration_minutes: 5,
        };
        Route {
            id: "r1".to_string(),
            name: "Da Nang - Hue".to_string(),
            origin: "Da Nang".to_string(),
            destination: "Hue".to_string(),
            waypoints: vec![
                wp("Da Nang", 16.0544, 108.2022, 0.0),
                wp("Lang Co", 16.2276, 108.0667, 25.0),
                wp("Phu Loc", 16.2900, 107.8600, 50.0),
                wp("Phu Bai", 16.4010, 107.7030, 75.0),
            ],
            distance_km: 100.0,
            estimated_duration_minutes: 120,
        }
    }

    fn bus(with_location: bool) -> Bus {
        Bus {
            id: "b1".to_string(),
            plate_number: "43B-00991".to_string(),
            capacity: 29,
            status: BusStatus::Active,
            current_location: with_location.then(|| Location {
                latitude: 16.29,
                longitude: 107.86,
                speed: 55.0,
                heading: 300.0,
                last_updated: t0(),
            }),
        }
    }

    fn trip(status: TripStatus, current_waypoint: usize) -> Trip {
        let mut trip = Trip::scheduled(
            "t1".to_string(),
            "b1".to_string(),
            "r1".to_string(),
            t0() - Duration::minutes(30),
            t0() + Duration::minutes(90),
            t0() - Duration::days(1),
        );
        trip.status = status;
        trip.current_waypoint = current_waypoint;
        trip
    }

    async fn seeded_store(trip: Trip) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_bus(bus(false)).await.unwrap();
        store.insert_route(route()).await.unwrap();
        store.insert_trip(trip).await.unwrap();
        store
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(2, 4), 50);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(5, 0), 0);
    }

    #[test]
    fn test_estimate_arrival_halfway() {
        let route = route();
        let trip = trip(TripStatus::InProgress, 2);
        approx::assert_abs_diff_eq!(remaining_distance_km(&route, 2), 50.0);

        let eta = estimate_arrival(&trip, &route, &bus(true), t0()).unwrap();
        assert_eq!(eta, t0() + Duration::minutes(60));
    }

    #[test]
    fn test_estimate_arrival_requires_in_progress_and_fix() {
        let route = route();
        assert!(estimate_arrival(&trip(TripStatus::InProgress, 1), &route, &bus(false), t0()).is_none());
        assert!(estimate_arrival(&trip(TripStatus::Scheduled, 1), &route, &bus(true), t0()).is_none());
        assert!(estimate_arrival(&trip(TripStatus::Completed, 1), &route, &bus(true), t0()).is_none());
    }

    #[test]
    fn test_estimate_arrival_without_waypoints_uses_full_distance() {
        let mut route = route();
        route.waypoints.clear();
        let eta = estimate_arrival(&trip(TripStatus::InProgress, 0), &route, &bus(true), t0()).unwrap();
        assert_eq!(eta, t0() + Duration::minutes(120));
    }

    #[test]
    fn test_estimate_arrival_out_of_range_is_none() {
        let mut route = route();
        route.distance_km = 1e12;
        let trip = trip(TripStatus::InProgress, 0);
        assert!(estimate_arrival(&trip, &route, &bus(true), t0()).is_none());

        route.distance_km = f64::MAX;
        assert!(estimate_arrival(&trip, &route, &bus(true), t0()).is_none());
    }

    #[tokio::test]
    async fn test_report_position_on_oversized_route_has_no_eta() {
        let store = MemoryStore::new();
        store.insert_bus(bus(false)).await.unwrap();
        let mut long = route();
        long.waypoints.truncate(1);
        long.distance_km = 1e12;
        store.insert_route(long).await.unwrap();
        store.insert_trip(trip(TripStatus::InProgress, 0)).await.unwrap();

        let fix = Fix { latitude: 16.0544, longitude: 108.2022, speed: 30.0, heading: 10.0 };
        let report = report_position(&store, "b1", fix, t0()).await.unwrap();
        let progress = report.trip_progress.unwrap();
        assert_eq!(progress.current_waypoint, 0);
        assert!(progress.estimated_arrival.is_none());
    }

    #[tokio::test]
    async fn test_report_position_exact_waypoint() {
        let store = seeded_store(trip(TripStatus::InProgress, 0)).await;
        let fix = Fix { latitude: 16.29, longitude: 107.86, speed: 48.0, heading: 290.0 };

        let report = report_position(&store, "b1", fix, t0()).await.unwrap();
        assert_eq!(report.location.latitude, 16.29);
        assert_eq!(report.location.last_updated, t0());

        let progress = report.trip_progress.unwrap();
        assert_eq!(progress.current_waypoint, 2);
        assert_eq!(progress.waypoint_name.as_deref(), Some("Phu Loc"));
        assert_eq!(progress.progress, 50);
        assert_eq!(progress.estimated_arrival, Some(t0() + Duration::minutes(60)));

        assert_eq!(store.get_trip("t1").await.unwrap().current_waypoint, 2);
    }

    #[tokio::test]
    async fn test_report_position_allows_regression() {
        let store = seeded_store(trip(TripStatus::InProgress, 3)).await;
        let fix = Fix { latitude: 16.2276, longitude: 108.0667, speed: 0.0, heading: 0.0 };
        let report = report_position(&store, "b1", fix, t0()).await.unwrap();
        assert_eq!(report.trip_progress.unwrap().current_waypoint, 1);
        assert_eq!(store.get_trip("t1").await.unwrap().current_waypoint, 1);
    }

    #[tokio::test]
    async fn test_report_position_without_active_trip() {
        let mut finished = trip(TripStatus::Completed, 3);
        finished.actual_arrival = Some(t0());
        let store = seeded_store(finished).await;

        let fix = Fix { latitude: 16.0544, longitude: 108.2022, speed: 0.0, heading: 0.0 };
        let report = report_position(&store, "b1", fix, t0()).await.unwrap();
        assert!(report.trip_progress.is_none());

        // the snapshot is still overwritten
        let stored = store.get_bus("b1").await.unwrap();
        assert_eq!(stored.current_location.unwrap().longitude, 108.2022);
        assert_eq!(store.get_trip("t1").await.unwrap().current_waypoint, 3);
    }

    #[tokio::test]
    async fn test_report_position_unknown_bus() {
        let store = seeded_store(trip(TripStatus::InProgress, 0)).await;
        let fix = Fix { latitude: 16.0, longitude: 108.0, speed: 0.0, heading: 0.0 };
        assert!(matches!(
            report_position(&store, "b404", fix, t0()).await,
            Err(AppError::NotFound { kind: "Bus", .. })
        ));
    }

    #[tokio::test]
    async fn test_report_position_picks_up_clock_started_trip() {
        // departure was 30 minutes ago but nobody pressed start
        let store = seeded_store(trip(TripStatus::Scheduled, 0)).await;
        let fix = Fix { latitude: 16.4010, longitude: 107.7030, speed: 62.0, heading: 315.0 };
        let report = report_position(&store, "b1", fix, t0()).await.unwrap();
        let progress = report.trip_progress.unwrap();
        assert_eq!(progress.current_waypoint, 3);
        assert_eq!(progress.progress, 75);
    }

    #[tokio::test]
    async fn test_trip_tracking() {
        let store = seeded_store(trip(TripStatus::InProgress, 2)).await;
        let view = trip_tracking(&store, "t1", t0()).await.unwrap();
        assert_eq!(view.progress, 50);
        assert!(view.estimated_arrival.is_none());
    }
}
