use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::delivery::Delivery;
use crate::models::driver::{Driver, DriverLocation, GeoPoint};
use crate::registry::locations::ReportOutcome;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:id/active", patch(set_driver_active))
        .route(
            "/drivers/:id/location",
            post(report_location).get(get_driver_location),
        )
        .route("/drivers/:id/deliveries", get(driver_work_queue))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub phone: Option<String>,
    pub capacity: u8,
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Deserialize)]
pub struct LocationReportRequest {
    pub lat: f64,
    pub lng: f64,
    pub observed_at: Option<DateTime<Utc>>,
    pub accuracy_m: Option<f64>,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<(StatusCode, Json<Driver>), DispatchError> {
    if payload.name.trim().is_empty() {
        return Err(DispatchError::InvalidInput(
            "driver name cannot be empty".to_string(),
        ));
    }

    if payload.capacity == 0 {
        return Err(DispatchError::InvalidInput(
            "driver capacity must be greater than zero".to_string(),
        ));
    }

    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        active: true,
        capacity: payload.capacity,
        created_at: Utc::now(),
    };

    state.drivers.insert(driver.id, driver.clone());

    info!(driver_id = %driver.id, capacity = driver.capacity, "driver registered");

    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    Json(drivers)
}

async fn set_driver_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<Driver>, DispatchError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("driver {id} not found")))?;

    driver.active = payload.active;

    info!(driver_id = %driver.id, active = driver.active, "driver availability changed");

    Ok(Json(driver.clone()))
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationReportRequest>,
) -> Result<(StatusCode, Json<Value>), DispatchError> {
    if !state.drivers.contains_key(&id) {
        return Err(DispatchError::NotFound(format!("driver {id} not found")));
    }

    let point = GeoPoint {
        lat: payload.lat,
        lng: payload.lng,
    };
    if !point.in_bounds() {
        return Err(DispatchError::InvalidInput(
            "location coordinates are out of range (lat within ±90, lng within ±180)".to_string(),
        ));
    }

    let location = DriverLocation {
        driver_id: id,
        point,
        observed_at: payload.observed_at.unwrap_or_else(Utc::now),
        accuracy_m: payload.accuracy_m,
    };

    let outcome = state.locations.report(location);
    let outcome_label = match outcome {
        ReportOutcome::Accepted => "accepted",
        ReportOutcome::Stale => "stale",
    };
    state
        .metrics
        .location_pings_total
        .with_label_values(&[outcome_label])
        .inc();

    if outcome == ReportOutcome::Stale {
        debug!(driver_id = %id, "out-of-order location report dropped");
    }

    // stale drops still answer 202; the device must not retry
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}

async fn get_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverLocation>, DispatchError> {
    if !state.drivers.contains_key(&id) {
        return Err(DispatchError::NotFound(format!("driver {id} not found")));
    }

    let location = state
        .locations
        .latest(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("no location reported for driver {id}")))?;

    Ok(Json(location))
}

async fn driver_work_queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Delivery>>, DispatchError> {
    if !state.drivers.contains_key(&id) {
        return Err(DispatchError::NotFound(format!("driver {id} not found")));
    }

    let mut deliveries: Vec<Delivery> = state
        .deliveries
        .iter()
        .filter(|entry| {
            let delivery = entry.value();
            delivery.driver_id == Some(id) && !delivery.status.is_terminal()
        })
        .map(|entry| entry.value().clone())
        .collect();
    deliveries.sort_by_key(|delivery| delivery.created_at);

    Ok(Json(deliveries))
}
