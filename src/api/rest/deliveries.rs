use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::assignment::{select_driver, validate_named_driver};
use crate::engine::lifecycle::{self, TransitionCommand};
use crate::engine::rates::{self, RateQuote};
use crate::error::DispatchError;
use crate::models::delivery::{
    ActorRole, Address, Delivery, DeliveryEvent, DeliveryStatus, PackageSpec,
};
use crate::models::driver::GeoPoint;
use crate::models::proof::{CaptureMethod, ProofOfDelivery};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/rate", get(quote_rate))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/assign", post(assign_delivery))
        .route("/deliveries/:id/pickup", post(pickup_delivery))
        .route("/deliveries/:id/status", post(transition_delivery))
        .route("/deliveries/:id/proof", post(attach_proof))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub origin: Address,
    pub destination: Address,
    pub package: PackageSpec,
}

#[derive(Deserialize)]
pub struct RateQuery {
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub destination_lat: f64,
    pub destination_lng: f64,
    pub weight_kg: f64,
    #[serde(default)]
    pub fragile: bool,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct AssignRequest {
    pub driver_id: Option<Uuid>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize, Default)]
pub struct PickupRequest {
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub target_status: String,
    pub actor_role: ActorRole,
    pub expected_version: Option<u64>,
    pub driver_id: Option<Uuid>,
    pub reason: Option<String>,
    pub proof: Option<ProofOfDelivery>,
}

#[derive(Deserialize)]
pub struct AttachProofRequest {
    pub storage_ref: String,
    pub method: CaptureMethod,
    pub captured_at: Option<DateTime<Utc>>,
    pub recipient_name: Option<String>,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<(StatusCode, Json<Delivery>), DispatchError> {
    validate_address("origin", &payload.origin)?;
    validate_address("destination", &payload.destination)?;
    validate_package(&payload.package)?;

    let rate = rates::quote(
        &payload.origin.point,
        &payload.destination.point,
        &payload.package,
    );
    let tracking_code = state.tracking_codes.generate(Utc::now());
    let delivery = lifecycle::open_delivery(
        tracking_code,
        payload.origin,
        payload.destination,
        payload.package,
        rate.amount,
    );

    state
        .tracking_index
        .insert(delivery.tracking_code.clone(), delivery.id);
    state.deliveries.insert(delivery.id, delivery.clone());
    state.metrics.active_deliveries.inc();

    info!(
        delivery_id = %delivery.id,
        tracking_code = %delivery.tracking_code,
        amount_cents = delivery.quoted_rate.amount_cents,
        distance_km = rate.distance_km,
        "delivery created"
    );

    Ok((StatusCode::CREATED, Json(delivery)))
}

async fn quote_rate(Query(query): Query<RateQuery>) -> Result<Json<RateQuote>, DispatchError> {
    let origin = GeoPoint {
        lat: query.origin_lat,
        lng: query.origin_lng,
    };
    let destination = GeoPoint {
        lat: query.destination_lat,
        lng: query.destination_lng,
    };
    let package = PackageSpec {
        weight_kg: query.weight_kg,
        fragile: query.fragile,
        description: None,
    };

    validate_point("origin", &origin)?;
    validate_point("destination", &destination)?;
    validate_package(&package)?;

    Ok(Json(rates::quote(&origin, &destination, &package)))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Delivery>>, DispatchError> {
    let filter = match query.status.as_deref() {
        Some(token) => Some(DeliveryStatus::parse(token).ok_or_else(|| {
            DispatchError::InvalidInput(format!("unknown status filter {token:?}"))
        })?),
        None => None,
    };

    let mut deliveries: Vec<Delivery> = state
        .deliveries
        .iter()
        .filter(|entry| filter.is_none_or(|status| entry.value().status == status))
        .map(|entry| entry.value().clone())
        .collect();
    deliveries.sort_by_key(|delivery| delivery.created_at);

    Ok(Json(deliveries))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, DispatchError> {
    let delivery = state
        .deliveries
        .get(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("delivery {id} not found")))?;

    Ok(Json(delivery.value().clone()))
}

async fn assign_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Delivery>, DispatchError> {
    let payload: AssignRequest = decode_optional_body(&body)?;
    let started = Instant::now();

    let result = assign_inner(&state, id, payload);

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());

    result.map(Json)
}

fn assign_inner(
    state: &AppState,
    id: Uuid,
    payload: AssignRequest,
) -> Result<Delivery, DispatchError> {
    // same check order as lifecycle::apply
    let origin = preflight_assign(state, id, payload.expected_version)?;

    let driver_id = match payload.driver_id {
        Some(driver_id) => {
            validate_named_driver(state, driver_id)?;
            driver_id
        }
        None => {
            let candidate = select_driver(state, &origin)?;
            info!(
                delivery_id = %id,
                driver_id = %candidate.driver.id,
                distance_km = candidate.distance_km,
                "driver selected"
            );
            candidate.driver.id
        }
    };

    run_transition(
        state,
        id,
        TransitionCommand::Assign { driver_id },
        ActorRole::Dispatcher,
        payload.expected_version,
    )
}

fn preflight_assign(
    state: &AppState,
    id: Uuid,
    expected_version: Option<u64>,
) -> Result<GeoPoint, DispatchError> {
    let entry = state
        .deliveries
        .get(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("delivery {id} not found")))?;

    if let Some(expected) = expected_version {
        if expected != entry.version {
            return Err(DispatchError::VersionConflict {
                expected,
                current: entry.version,
            });
        }
    }

    lifecycle::ensure_edge(entry.status, DeliveryStatus::Assigned)?;
    Ok(entry.origin.point.clone())
}

async fn pickup_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Delivery>, DispatchError> {
    let payload: PickupRequest = decode_optional_body(&body)?;

    run_transition(
        &state,
        id,
        TransitionCommand::Pickup,
        ActorRole::Driver,
        payload.expected_version,
    )
    .map(Json)
}

async fn transition_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Delivery>, DispatchError> {
    let target = DeliveryStatus::parse(&payload.target_status).ok_or_else(|| {
        DispatchError::InvalidInput(format!(
            "unknown target status {:?}",
            payload.target_status
        ))
    })?;

    let command = match target {
        DeliveryStatus::Quoted => {
            return Err(DispatchError::InvalidTransition(
                "no transition targets the quoted status".to_string(),
            ));
        }
        DeliveryStatus::Assigned => {
            let driver_id = payload.driver_id.ok_or_else(|| {
                DispatchError::InvalidInput(
                    "driver_id is required when targeting assigned".to_string(),
                )
            })?;
            preflight_assign(&state, id, payload.expected_version)?;
            validate_named_driver(&state, driver_id)?;
            TransitionCommand::Assign { driver_id }
        }
        DeliveryStatus::PickedUp => TransitionCommand::Pickup,
        DeliveryStatus::InTransit => TransitionCommand::Transit,
        DeliveryStatus::Delivered => TransitionCommand::Deliver {
            proof: payload.proof,
        },
        DeliveryStatus::Failed => TransitionCommand::Fail {
            reason: payload.reason,
        },
        DeliveryStatus::Cancelled => TransitionCommand::Cancel {
            reason: payload.reason,
        },
    };

    run_transition(
        &state,
        id,
        command,
        payload.actor_role,
        payload.expected_version,
    )
    .map(Json)
}

async fn attach_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachProofRequest>,
) -> Result<Json<Delivery>, DispatchError> {
    if payload.storage_ref.trim().is_empty() {
        return Err(DispatchError::InvalidInput(
            "proof storage_ref cannot be empty".to_string(),
        ));
    }

    let proof = ProofOfDelivery {
        storage_ref: payload.storage_ref,
        captured_at: payload.captured_at.unwrap_or_else(Utc::now),
        method: payload.method,
        recipient_name: payload.recipient_name,
    };

    let mut entry = state
        .deliveries
        .get_mut(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("delivery {id} not found")))?;

    lifecycle::attach_proof(entry.value_mut(), proof)?;
    let delivery = entry.value().clone();
    drop(entry);

    info!(
        delivery_id = %delivery.id,
        tracking_code = %delivery.tracking_code,
        "proof of delivery attached"
    );

    Ok(Json(delivery))
}

fn run_transition(
    state: &AppState,
    id: Uuid,
    command: TransitionCommand,
    actor: ActorRole,
    expected_version: Option<u64>,
) -> Result<Delivery, DispatchError> {
    let target_label = command.target().to_string();

    let mut entry = state
        .deliveries
        .get_mut(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("delivery {id} not found")))?;

    match lifecycle::apply(entry.value_mut(), command, actor, expected_version) {
        Ok(outcome) => {
            let delivery = entry.value().clone();
            drop(entry);

            state
                .metrics
                .transitions_total
                .with_label_values(&[&target_label, "accepted"])
                .inc();
            if delivery.status.is_terminal() {
                state.metrics.active_deliveries.dec();
            }

            let event = DeliveryEvent {
                delivery_id: delivery.id,
                tracking_code: delivery.tracking_code.clone(),
                from: outcome.from,
                to: delivery.status,
                actor,
                driver_released: outcome.driver_released,
                at: outcome.at,
            };
            let _ = state.delivery_events_tx.send(event);

            info!(
                delivery_id = %delivery.id,
                tracking_code = %delivery.tracking_code,
                from = %outcome.from,
                to = %delivery.status,
                actor = %actor,
                driver_released = outcome.driver_released,
                "delivery transition accepted"
            );

            Ok(delivery)
        }
        Err(err) => {
            drop(entry);
            state
                .metrics
                .transitions_total
                .with_label_values(&[&target_label, "rejected"])
                .inc();

            Err(err)
        }
    }
}

fn decode_optional_body<T>(body: &Bytes) -> Result<T, DispatchError>
where
    T: DeserializeOwned + Default,
{
    if body.is_empty() {
        return Ok(T::default());
    }

    serde_json::from_slice(body)
        .map_err(|err| DispatchError::InvalidInput(format!("malformed request body: {err}")))
}

fn validate_address(label: &str, address: &Address) -> Result<(), DispatchError> {
    if address.street.trim().is_empty() {
        return Err(DispatchError::InvalidInput(format!(
            "{label} street cannot be empty"
        )));
    }

    validate_point(label, &address.point)
}

fn validate_point(label: &str, point: &GeoPoint) -> Result<(), DispatchError> {
    if !point.in_bounds() {
        return Err(DispatchError::InvalidInput(format!(
            "{label} coordinates are out of range (lat within ±90, lng within ±180)"
        )));
    }

    Ok(())
}

fn validate_package(package: &PackageSpec) -> Result<(), DispatchError> {
    if !package.weight_kg.is_finite() || package.weight_kg <= 0.0 {
        return Err(DispatchError::InvalidInput(
            "package weight_kg must be a positive number".to_string(),
        ));
    }

    Ok(())
}
