use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::engine::lifecycle;
use crate::error::DispatchError;
use crate::models::delivery::TrackingView;
use crate::models::proof::DeliveryRating;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/track/:code", get(track))
        .route("/deliveries/track/:code/rating", post(rate_delivery))
}

#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
    pub comment: Option<String>,
}

async fn track(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<TrackingView>, DispatchError> {
    let view = state
        .tracking_index
        .get(&code)
        .and_then(|entry| state.deliveries.get(entry.value()))
        .map(|delivery| TrackingView::of(delivery.value()));

    match view {
        Some(view) => {
            state
                .metrics
                .tracking_lookups_total
                .with_label_values(&["hit"])
                .inc();
            Ok(Json(view))
        }
        None => {
            state
                .metrics
                .tracking_lookups_total
                .with_label_values(&["miss"])
                .inc();
            Err(DispatchError::NotFound(
                "no delivery matches the supplied tracking code".to_string(),
            ))
        }
    }
}

async fn rate_delivery(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(payload): Json<RatingRequest>,
) -> Result<(StatusCode, Json<DeliveryRating>), DispatchError> {
    let id = state.tracking_index.get(&code).map(|entry| *entry.value());
    let Some(id) = id else {
        return Err(DispatchError::NotFound(
            "no delivery matches the supplied tracking code".to_string(),
        ));
    };

    let mut entry = state.deliveries.get_mut(&id).ok_or_else(|| {
        DispatchError::NotFound("no delivery matches the supplied tracking code".to_string())
    })?;

    let record = lifecycle::attach_rating(entry.value_mut(), payload.rating, payload.comment)?;
    let delivery_id = entry.id;
    let tracking_code = entry.tracking_code.clone();
    drop(entry);

    info!(
        delivery_id = %delivery_id,
        tracking_code = %tracking_code,
        rating = record.rating,
        "delivery rated"
    );

    Ok((StatusCode::CREATED, Json(record)))
}
