use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{Bus, Route, Trip};

fn insert_new<T: Clone>(
    map: &mut HashMap<String, T>,
    kind: &str,
    id: &str,
    value: T,
) -> Result<T> {
    if map.contains_key(id) {
        return Err(AppError::Validation(format!("{} '{}' already exists", kind, id)));
    }
    map.insert(id.to_string(), value.clone());
    Ok(value)
}

/// In-memory record store for the tracked entities. Every update replaces the
/// whole record, so a failed write never leaves a partially updated entity behind.
#[derive(Debug, Default)]
pub struct MemoryStore {
    trips: RwLock<HashMap<String, Trip>>,
    buses: RwLock<HashMap<String, Bus>>,
    routes: RwLock<HashMap<String, Route>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn counts(&self) -> (usize, usize, usize) {
        (
            self.buses.read().await.len(),
            self.routes.read().await.len(),
            self.trips.read().await.len(),
        )
    }

    pub async fn get_trip(&self, id: &str) -> Result<Trip> {
        self.trips
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::trip_not_found(id))
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>> {
        let mut trips: Vec<Trip> = self.trips.read().await.values().cloned().collect();
        trips.sort_by(|a, b| a.departure_time.cmp(&b.departure_time).then(a.id.cmp(&b.id)));
        Ok(trips)
    }

    pub async fn insert_trip(&self, trip: Trip) -> Result<Trip> {
        let id = trip.id.clone();
        insert_new(&mut *self.trips.write().await, "Trip", &id, trip)
    }

    pub async fn update_trip(&self, trip: Trip) -> Result<Trip> {
        let mut trips = self.trips.write().await;
        match trips.get_mut(&trip.id) {
            Some(existing) => {
                *existing = trip.clone();
                Ok(trip)
            }
            None => Err(AppError::trip_not_found(&trip.id)),
        }
    }

    pub async fn get_bus(&self, id: &str) -> Result<Bus> {
        self.buses
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::bus_not_found(id))
    }

    pub async fn list_buses(&self) -> Result<Vec<Bus>> {
        let mut buses: Vec<Bus> = self.buses.read().await.values().cloned().collect();
        buses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(buses)
    }

    pub async fn insert_bus(&self, bus: Bus) -> Result<Bus> {
        let id = bus.id.clone();
        insert_new(&mut *self.buses.write().await, "Bus", &id, bus)
    }

    pub async fn update_bus(&self, bus: Bus) -> Result<Bus> {
        let mut buses = self.buses.write().await;
        match buses.get_mut(&bus.id) {
            Some(existing) => {
                *existing = bus.clone();
                Ok(bus)
            }
            None => Err(AppError::bus_not_found(&bus.id)),
        }
    }

    pub async fn get_route(&self, id: &str) -> Result<Route> {
        self.routes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::route_not_found(id))
    }

    pub async fn list_routes(&self) -> Result<Vec<Route>> {
        let mut routes: Vec<Route> = self.routes.read().await.values().cloned().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(routes)
    }

    pub async fn insert_route(&self, route: Route) -> Result<Route> {
        let id = route.id.clone();
        insert_new(&mut *self.routes.write().await, "Route", &id, route)
    }
}
