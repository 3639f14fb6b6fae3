//! Trip state machine.
//!
//! The transition functions below operate on a `Trip` value only; the
//! store-backed operations load a record, reconcile it with the clock, apply
//! one transition to a copy and write the copy back in a single update.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{Bus, BusStatus, Trip, TripStatus};
use crate::store::MemoryStore;

pub fn validate_schedule(
    departure_time: DateTime<Utc>,
    estimated_arrival: DateTime<Utc>,
) -> Result<()> {
    if estimated_arrival <= departure_time {
        return Err(AppError::Validation(
            "estimated arrival must be after departure time".to_string(),
        ));
    }
    Ok(())
}

pub fn start(trip: &mut Trip, bus: &Bus, now: DateTime<Utc>) -> Result<()> {
    if trip.status != TripStatus::Scheduled {
        return Err(AppError::InvalidState(format!(
            "cannot start trip '{}' in status {}",
            trip.id, trip.status
        )));
    }
    if bus.status != BusStatus::Active {
        return Err(AppError::InvalidState(format!(
            "bus '{}' is not active",
            bus.id
        )));
    }
    trip.status = TripStatus::InProgress;
    trip.actual_departure = Some(now);
    trip.updated_at = now;
    Ok(())
}

/// Minutes between estimated and actual arrival, rounded to the nearest minute.
/// Half minutes round away from zero: 7.5 minutes late is 8, 7.5 early is -8.
pub fn delay_minutes(estimated_arrival: DateTime<Utc>, actual_arrival: DateTime<Utc>) -> i64 {
    let millis = (actual_arrival - estimated_arrival).num_milliseconds();
    (millis as f64 / 60_000.0).round() as i64
}

pub fn complete(trip: &mut Trip, now: DateTime<Utc>) -> Result<()> {
    if trip.status != TripStatus::InProgress {
        return Err(AppError::InvalidState(format!(
            "cannot complete trip '{}' in status {}",
            trip.id, trip.status
        )));
    }
    trip.status = TripStatus::Completed;
    trip.actual_arrival = Some(now);
    trip.delay = Some(delay_minutes(trip.estimated_arrival, now));
    trip.updated_at = now;
    Ok(())
}

pub fn cancel(trip: &mut Trip, reason: Option<&str>, now: DateTime<Utc>) -> Result<()> {
    if trip.status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "cannot cancel trip '{}' in status {}",
            trip.id, trip.status
        )));
    }
    trip.status = TripStatus::Cancelled;
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        let line = format!("Cancelled: {}", reason);
        trip.notes = Some(match trip.notes.take() {
            Some(prev) if !prev.is_empty() => format!("{}\n{}", prev, line),
            _ => line,
        });
    }
    trip.updated_at = now;
    Ok(())
}

/// Moves a trip whose departure time has passed into `in-progress` without an
/// explicit start. Returns whether the trip changed.
pub fn derive_status_from_clock(trip: &mut Trip, now: DateTime<Utc>) -> bool {
    if trip.status != TripStatus::Scheduled || trip.departure_time > now {
        return false;
    }
    trip.status = TripStatus::InProgress;
    if trip.actual_departure.is_none() {
        trip.actual_departure = Some(now);
    }
    trip.updated_at = now;
    true
}

pub fn set_occupancy(trip: &mut Trip, bus: &Bus, occupancy: u32, now: DateTime<Utc>) -> Result<()> {
    if occupancy > bus.capacity {
        return Err(AppError::CapacityExceeded {
            requested: occupancy,
            capacity: bus.capacity,
        });
    }
    trip.occupancy = occupancy;
    trip.updated_at = now;
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub id: Option<String>,
    pub bus_id: String,
    pub route_id: String,
    pub departure_time: DateTime<Utc>,
    pub estimated_arrival: DateTime<Utc>,
    #[serde(default)]
    pub occupancy: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
    pub bus_id: Option<String>,
    pub route_id: Option<String>,
}

impl TripFilter {
    fn matches(&self, trip: &Trip) -> bool {
        self.status.map_or(true, |s| trip.status == s)
            && self.bus_id.as_deref().map_or(true, |b| trip.bus_id == b)
            && self.route_id.as_deref().map_or(true, |r| trip.route_id == r)
    }
}

async fn persist_if_changed(store: &MemoryStore, mut trip: Trip, now: DateTime<Utc>) -> Result<Trip> {
    if derive_status_from_clock(&mut trip, now) {
        info!("Trip {} departed on schedule, now {}", trip.id, trip.status);
        trip = store.update_trip(trip).await?;
    }
    Ok(trip)
}

/// Loads a trip and applies clock reconciliation, persisting any change.
pub async fn load_trip(store: &MemoryStore, trip_id: &str, now: DateTime<Utc>) -> Result<Trip> {
    let trip = store.get_trip(trip_id).await?;
    persist_if_changed(store, trip, now).await
}

pub async fn create_trip(store: &MemoryStore, new: NewTrip, now: DateTime<Utc>) -> Result<Trip> {
    validate_schedule(new.departure_time, new.estimated_arrival)?;
    let bus = store.get_bus(&new.bus_id).await?;
    store.get_route(&new.route_id).await?;

    let id = new.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut trip = Trip::scheduled(
        id,
        new.bus_id,
        new.route_id,
        new.departure_time,
        new.estimated_arrival,
        now,
    );
    trip.notes = new.notes;
    set_occupancy(&mut trip, &bus, new.occupancy, now)?;

    let trip = store.insert_trip(trip).await?;
    info!("Created trip {} for bus {} on route {}", trip.id, trip.bus_id, trip.route_id);
    Ok(trip)
}

pub async fn get_trip(store: &MemoryStore, trip_id: &str, now: DateTime<Utc>) -> Result<Trip> {
    load_trip(store, trip_id, now).await
}

pub async fn list_trips(
    store: &MemoryStore,
    filter: &TripFilter,
    now: DateTime<Utc>,
) -> Result<Vec<Trip>> {
    let mut trips = Vec::new();
    for trip in store.list_trips().await? {
        let trip = persist_if_changed(store, trip, now).await?;
        if filter.matches(&trip) {
            trips.push(trip);
        }
    }
    Ok(trips)
}

pub async fn get_active_trips(store: &MemoryStore, now: DateTime<Utc>) -> Result<Vec<Trip>> {
    let filter = TripFilter {
        status: Some(TripStatus::InProgress),
        ..Default::default()
    };
    list_trips(store, &filter, now).await
}

pub async fn start_trip(store: &MemoryStore, trip_id: &str, now: DateTime<Utc>) -> Result<Trip> {
    let mut trip = load_trip(store, trip_id, now).await?;
    let bus = store.get_bus(&trip.bus_id).await?;
    start(&mut trip, &bus, now)?;
    let trip = store.update_trip(trip).await?;
    info!("Trip {} started with bus {}", trip.id, trip.bus_id);
    Ok(trip)
}

pub async fn complete_trip(store: &MemoryStore, trip_id: &str, now: DateTime<Utc>) -> Result<Trip> {
    let mut trip = load_trip(store, trip_id, now).await?;
    complete(&mut trip, now)?;
    let trip = store.update_trip(trip).await?;
    info!(
        "Trip {} completed, delay {} min",
        trip.id,
        trip.delay.unwrap_or_default()
    );
    Ok(trip)
}

pub async fn cancel_trip(
    store: &MemoryStore,
    trip_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Trip> {
    let mut trip = load_trip(store, trip_id, now).await?;
    cancel(&mut trip, reason, now)?;
    let trip = store.update_trip(trip).await?;
    info!("Trip {} cancelled", trip.id);
    Ok(trip)
}

pub async fn update_occupancy(
    store: &MemoryStore,
    trip_id: &str,
    occupancy: u32,
    now: DateTime<Utc>,
) -> Result<Trip> {
    let mut trip = load_trip(store, trip_id, now).await?;
    let bus = store.get_bus(&trip.bus_id).await?;
    set_occupancy(&mut trip, &bus, occupancy, now)?;
    let trip = store.update_trip(trip).await?;
    debug!("Trip {} occupancy set to {}", trip.id, trip.occupancy);
    Ok(trip)
}
