use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::delivery::{Delivery, DeliveryEvent};
use crate::models::driver::Driver;
use crate::observability::metrics::Metrics;
use crate::registry::codes::TrackingCodeGenerator;
use crate::registry::locations::LocationRegister;

pub struct AppState {
    pub deliveries: DashMap<Uuid, Delivery>,
    pub tracking_index: DashMap<String, Uuid>,
    pub drivers: DashMap<Uuid, Driver>,
    pub locations: LocationRegister,
    pub tracking_codes: TrackingCodeGenerator,
    pub delivery_events_tx: broadcast::Sender<DeliveryEvent>,
    pub location_staleness_secs: i64,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize, location_staleness_secs: i64) -> Self {
        let (delivery_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            deliveries: DashMap::new(),
            tracking_index: DashMap::new(),
            drivers: DashMap::new(),
            locations: LocationRegister::new(),
            tracking_codes: TrackingCodeGenerator::new(),
            delivery_events_tx,
            location_staleness_secs,
            metrics: Metrics::new(),
        }
    }
}
