use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Longest route accepted, in kilometres.
pub const MAX_ROUTE_DISTANCE_KM: f64 = 5_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TripStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Delayed,
}

impl TripStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Scheduled => "scheduled",
            TripStatus::InProgress => "in-progress",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Delayed => "delayed",
        }
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusStatus {
    Active,
    Maintenance,
    Inactive,
}

/// Last reported position of a bus. Replaced as a whole on every fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub last_updated: DateTime<Utc>,
}

/// A single GPS report as received from a bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: String,
    pub plate_number: String,
    pub capacity: u32,
    pub status: BusStatus,
    pub current_location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Kilometres along the route from its origin.
    pub distance_from_start: f64,
    #[serde(default)]
    pub stop_duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub waypoints: Vec<Waypoint>,
    pub distance_km: f64,
    pub estimated_duration_minutes: u32,
}

impl Route {
    pub fn waypoints_sorted(&self) -> bool {
        self.waypoints
            .windows(2)
            .all(|w| w[0].distance_from_start <= w[1].distance_from_start)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.distance_km > 0.0 && self.distance_km <= MAX_ROUTE_DISTANCE_KM) {
            return Err(AppError::Validation(format!(
                "distance_km must be in (0, {}], got {}",
                MAX_ROUTE_DISTANCE_KM, self.distance_km
            )));
        }
        if !self.waypoints_sorted() {
            return Err(AppError::Validation(
                "waypoints must be ordered by distance_from_start".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub bus_id: String,
    pub route_id: String,
    pub departure_time: DateTime<Utc>,
    pub estimated_arrival: DateTime<Utc>,
    pub actual_departure: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub status: TripStatus,
    pub occupancy: u32,
    /// Minutes late at arrival, negative when early.
    pub delay: Option<i64>,
    pub current_waypoint: usize,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn scheduled(
        id: String,
        bus_id: String,
        route_id: String,
        departure_time: DateTime<Utc>,
        estimated_arrival: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            bus_id,
            route_id,
            departure_time,
            estimated_arrival,
            actual_departure: None,
            actual_arrival: None,
            status: TripStatus::Scheduled,
            occupancy: 0,
            delay: None,
            current_waypoint: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Progress of an in-progress trip along its route, derived from the latest fix.
#[derive(Debug, Clone, Serialize)]
pub struct TripProgress {
    pub trip_id: String,
    pub current_waypoint: usize,
    pub waypoint_name: Option<String>,
    pub progress: u32,
    pub estimated_arrival: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionReport {
    pub location: Location,
    pub trip_progress: Option<TripProgress>,
}
