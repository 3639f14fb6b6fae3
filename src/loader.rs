use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::lifecycle::{self, NewTrip};
use crate::models::{Bus, BusStatus, Route, Waypoint};
use crate::store::MemoryStore;

#[derive(Debug, Deserialize)]
struct BusRow {
    id: String,
    plate_number: String,
    capacity: u32,
    status: BusStatus,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    id: String,
    name: String,
    origin: String,
    destination: String,
    distance_km: f64,
    estimated_duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct WaypointRow {
    route_id: String,
    name: String,
    latitude: f64,
    longitude: f64,
    distance_from_start: f64,
    #[serde(default)]
    stop_duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    id: String,
    bus_id: String,
    route_id: String,
    departure_time: DateTime<Utc>,
    estimated_arrival: DateTime<Utc>,
    #[serde(default)]
    occupancy: u32,
}

fn read_rows<T, R>(reader: R) -> anyhow::Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result?;
        rows.push(row);
    }
    Ok(rows)
}

fn open_optional(dir: &Path, name: &str) -> anyhow::Result<Option<File>> {
    let path = dir.join(name);
    if !path.exists() {
        warn!("Seed file {} not found, skipping", path.display());
        return Ok(None);
    }
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Some(file))
}

fn read_buses<R: Read>(reader: R) -> anyhow::Result<Vec<Bus>> {
    let rows: Vec<BusRow> = read_rows(reader)?;
    Ok(rows
        .into_iter()
        .map(|row| Bus {
            id: row.id,
            plate_number: row.plate_number,
            capacity: row.capacity,
            status: row.status,
            current_location: None,
        })
        .collect())
}

fn read_routes<R: Read, W: Read>(routes: R, waypoints: Option<W>) -> anyhow::Result<Vec<Route>> {
    let rows: Vec<RouteRow> = read_rows(routes)?;
    let mut waypoints_by_route: HashMap<String, Vec<Waypoint>> = HashMap::new();
    if let Some(waypoints) = waypoints {
        for row in read_rows::<WaypointRow, _>(waypoints)? {
            waypoints_by_route.entry(row.route_id).or_default().push(Waypoint {
                name: row.name,
                latitude: row.latitude,
                longitude: row.longitude,
                distance_from_start: row.distance_from_start,
                stop_duration_minutes: row.stop_duration_minutes,
            });
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut waypoints = waypoints_by_route.remove(&row.id).unwrap_or_default();
            waypoints.sort_by(|a, b| a.distance_from_start.total_cmp(&b.distance_from_start));
            Route {
                id: row.id,
                name: row.name,
                origin: row.origin,
                destination: row.destination,
                waypoints,
                distance_km: row.distance_km,
                estimated_duration_minutes: row.estimated_duration_minutes,
            }
        })
        .collect())
}

fn read_trips<R: Read>(reader: R) -> anyhow::Result<Vec<NewTrip>> {
    let rows: Vec<TripRow> = read_rows(reader)?;
    Ok(rows
        .into_iter()
        .map(|row| NewTrip {
            id: Some(row.id),
            bus_id: row.bus_id,
            route_id: row.route_id,
            departure_time: row.departure_time,
            estimated_arrival: row.estimated_arrival,
            occupancy: row.occupancy,
            notes: None,
        })
        .collect())
}

/// Populates the store from `buses.csv`, `routes.csv`, `waypoints.csv` and
/// `trips.csv` in `dir`. Missing files are skipped; malformed rows abort.
pub async fn load_seed_data(store: &MemoryStore, dir: &Path) -> anyhow::Result<()> {
    if let Some(file) = open_optional(dir, "buses.csv")? {
        for bus in read_buses(file).context("parsing buses.csv")? {
            store.insert_bus(bus).await?;
        }
    }

    if let Some(file) = open_optional(dir, "routes.csv")? {
        let waypoints = open_optional(dir, "waypoints.csv")?;
        for route in read_routes(file, waypoints).context("parsing routes.csv")? {
            route
                .validate()
                .with_context(|| format!("validating route {}", route.id))?;
            store.insert_route(route).await?;
        }
    }

    if let Some(file) = open_optional(dir, "trips.csv")? {
        let now = Utc::now();
        for new in read_trips(file).context("parsing trips.csv")? {
            let id = new.id.clone().unwrap_or_default();
            lifecycle::create_trip(store, new, now)
                .await
                .with_context(|| format!("seeding trip {}", id))?;
        }
    }

    let (buses, routes, trips) = store.counts().await;
    info!("Loaded {} buses, {} routes and {} trips from {}", buses, routes, trips, dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUSES: &str = "\
id,plate_number,capacity,status
b1,29B-10234,45,active
b2,51B-55120,29,maintenance
";

    const ROUTES: &str = "\
id,name,origin,destination,distance_km,estimated_duration_minutes
r1,Hanoi - Ninh Binh,Hanoi,Ninh Binh,95.5,120
r2,Hanoi - Lao Cai,Hanoi,Lao Cai,295,330
";

    const WAYPOINTS: &str = "\
route_id,name,latitude,longitude,distance_from_start,stop_duration_minutes
r1,Ninh Binh,20.2506,105.9745,95.5,0
r1,Giap Bat,20.9807,105.8413,0,10
r1,Phu Ly,20.5411,105.9139,58.2,5
";

    #[test]
    fn test_read_buses() {
        let buses = read_buses(BUSES.as_bytes()).unwrap();
        assert_eq!(buses.len(), 2);
        assert_eq!(buses[1].status, BusStatus::Maintenance);
        assert!(buses[0].current_location.is_none());
    }

    #[test]
    fn test_read_routes_sorts_waypoints() {
        let routes = read_routes(ROUTES.as_bytes(), Some(WAYPOINTS.as_bytes())).unwrap();
        assert_eq!(routes.len(), 2);

        let names: Vec<&str> = routes[0].waypoints.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Giap Bat", "Phu Ly", "Ninh Binh"]);
        assert!(routes[0].waypoints_sorted());
        assert!(routes[1].waypoints.is_empty());
    }

    #[test]
    fn test_read_trips_rejects_bad_timestamp() {
        let csv = "\
id,bus_id,route_id,departure_time,estimated_arrival,occupancy
t1,b1,r1,yesterday,2026-01-01T10:00:00Z,3
";
        assert!(read_trips(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_route_rows_with_absurd_distance_fail_validation() {
        let csv = "\
id,name,origin,destination,distance_km,estimated_duration_minutes
r9,Nowhere,A,B,1e12,60
";
        let routes = read_routes(csv.as_bytes(), None::<&[u8]>).unwrap();
        assert!(routes[0].validate().is_err());
    }

    #[tokio::test]
    async fn test_load_seed_data_missing_dir_is_empty() {
        let store = MemoryStore::new();
        load_seed_data(&store, Path::new("/nonexistent/seed")).await.unwrap();
        assert_eq!(store.counts().await, (0, 0, 0));
    }

    #[tokio::test]
    async fn test_load_bundled_seed_data() {
        let store = MemoryStore::new();
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        load_seed_data(&store, &dir).await.unwrap();

        let (buses, routes, trips) = store.counts().await;
        assert!(buses > 0 && routes > 0 && trips > 0);
        for route in store.list_routes().await.unwrap() {
            assert!(route.waypoints_sorted());
        }
    }
}
