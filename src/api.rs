use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::{AppError, Result};
use crate::geo::validate_fix;
use crate::lifecycle::{self, NewTrip, TripFilter};
use crate::models::{Bus, BusStatus, Fix, PositionReport, Route, Trip, TripProgress, Waypoint};
use crate::store::MemoryStore;
use crate::tracking;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/buses", get(list_buses).post(create_bus))
        .route("/buses/{id}", get(get_bus))
        .route("/buses/{id}/location", post(report_location))
        .route("/routes", get(list_routes).post(create_route))
        .route("/routes/{id}", get(get_route))
        .route("/trips", get(list_trips).post(create_trip))
        .route("/trips/active", get(active_trips))
        .route("/trips/{id}", get(get_trip))
        .route("/trips/{id}/tracking", get(trip_tracking))
        .route("/trips/{id}/start", post(start_trip))
        .route("/trips/{id}/complete", post(complete_trip))
        .route("/trips/{id}/cancel", post(cancel_trip))
        .route("/trips/{id}/occupancy", put(set_occupancy))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct NewBus {
    pub id: Option<String>,
    pub plate_number: String,
    pub capacity: u32,
    #[serde(default = "default_bus_status")]
    pub status: BusStatus,
}

fn default_bus_status() -> BusStatus {
    BusStatus::Active
}

#[derive(Debug, Deserialize)]
pub struct NewRoute {
    pub id: Option<String>,
    pub name: String,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    pub distance_km: f64,
    pub estimated_duration_minutes: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OccupancyRequest {
    pub occupancy: u32,
}

fn new_id(id: Option<String>) -> String {
    id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn list_buses(State(state): State<AppState>) -> Result<Json<Vec<Bus>>> {
    Ok(Json(state.store.list_buses().await?))
}

async fn get_bus(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Bus>> {
    Ok(Json(state.store.get_bus(&id).await?))
}

async fn create_bus(
    State(state): State<AppState>,
    Json(new): Json<NewBus>,
) -> Result<(StatusCode, Json<Bus>)> {
    if new.capacity == 0 {
        return Err(AppError::Validation("capacity must be positive".to_string()));
    }
    let bus = state
        .store
        .insert_bus(Bus {
            id: new_id(new.id),
            plate_number: new.plate_number,
            capacity: new.capacity,
            status: new.status,
            current_location: None,
        })
        .await?;
    info!("Registered bus {} ({})", bus.id, bus.plate_number);
    Ok((StatusCode::CREATED, Json(bus)))
}

async fn report_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fix): Json<Fix>,
) -> Result<Json<PositionReport>> {
    validate_fix(&fix)?;
    let report = tracking::report_position(&*state.store, &id, fix, Utc::now()).await?;
    Ok(Json(report))
}

async fn list_routes(State(state): State<AppState>) -> Result<Json<Vec<Route>>> {
    Ok(Json(state.store.list_routes().await?))
}

async fn get_route(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Route>> {
    Ok(Json(state.store.get_route(&id).await?))
}

async fn create_route(
    State(state): State<AppState>,
    Json(new): Json<NewRoute>,
) -> Result<(StatusCode, Json<Route>)> {
    let route = Route {
        id: new_id(new.id),
        name: new.name,
        origin: new.origin,
        destination: new.destination,
        waypoints: new.waypoints,
        distance_km: new.distance_km,
        estimated_duration_minutes: new.estimated_duration_minutes,
    };
    route.validate()?;
    let route = state.store.insert_route(route).await?;
    info!("Registered route {} with {} waypoints", route.id, route.waypoints.len());
    Ok((StatusCode::CREATED, Json(route)))
}

async fn list_trips(
    State(state): State<AppState>,
    Query(filter): Query<TripFilter>,
) -> Result<Json<Vec<Trip>>> {
    Ok(Json(lifecycle::list_trips(&*state.store, &filter, Utc::now()).await?))
}

async fn active_trips(State(state): State<AppState>) -> Result<Json<Vec<Trip>>> {
    Ok(Json(lifecycle::get_active_trips(&*state.store, Utc::now()).await?))
}

async fn create_trip(
    State(state): State<AppState>,
    Json(new): Json<NewTrip>,
) -> Result<(StatusCode, Json<Trip>)> {
    let trip = lifecycle::create_trip(&*state.store, new, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn get_trip(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Trip>> {
    Ok(Json(lifecycle::get_trip(&*state.store, &id, Utc::now()).await?))
}

async fn trip_tracking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TripProgress>> {
    Ok(Json(tracking::trip_tracking(&*state.store, &id, Utc::now()).await?))
}

async fn start_trip(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Trip>> {
    Ok(Json(lifecycle::start_trip(&*state.store, &id, Utc::now()).await?))
}

async fn complete_trip(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Trip>> {
    Ok(Json(lifecycle::complete_trip(&*state.store, &id, Utc::now()).await?))
}

async fn cancel_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Trip>> {
    let reason = body.and_then(|Json(body)| body.reason);
    let trip = lifecycle::cancel_trip(&*state.store, &id, reason.as_deref(), Utc::now()).await?;
    Ok(Json(trip))
}

async fn set_occupancy(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<OccupancyRequest>,
) -> Result<Json<Trip>> {
    let trip =
        lifecycle::update_occupancy(&*state.store, &id, body.occupancy, Utc::now()).await?;
    Ok(Json(trip))
}
