use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::geo::haversine_km;
use crate::models::driver::{Driver, DriverLocation, GeoPoint};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct DriverCandidate {
    pub driver: Driver,
    pub location: DriverLocation,
    pub distance_km: f64,
}

pub fn select_driver(state: &AppState, origin: &GeoPoint) -> Result<DriverCandidate, DispatchError> {
    let horizon = Utc::now() - Duration::seconds(state.location_staleness_secs);

    let mut registered = 0usize;
    let mut active = 0usize;
    let mut fresh = 0usize;
    let mut candidates: Vec<DriverCandidate> = Vec::new();

    for entry in state.drivers.iter() {
        let driver = entry.value();
        registered += 1;

        if !driver.active {
            continue;
        }
        active += 1;

        let Some(location) = state.locations.latest(&driver.id) else {
            continue;
        };
        if location.observed_at < horizon {
            continue;
        }
        fresh += 1;

        if active_load(state, driver.id) >= driver.capacity as usize {
            continue;
        }

        let distance_km = haversine_km(origin, &location.point);
        candidates.push(DriverCandidate {
            driver: driver.clone(),
            location,
            distance_km,
        });
    }

    let under_capacity = candidates.len();

    candidates
        .into_iter()
        .min_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| b.location.observed_at.cmp(&a.location.observed_at))
        })
        .ok_or_else(|| {
            DispatchError::NoDriverAvailable(format!(
                ": {registered} registered, {active} active, {fresh} reporting a fresh location, {under_capacity} under capacity"
            ))
        })
}

pub fn validate_named_driver(state: &AppState, driver_id: Uuid) -> Result<(), DispatchError> {
    let driver = state
        .drivers
        .get(&driver_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id} not found")))?;

    if !driver.active {
        return Err(DispatchError::NoDriverAvailable(format!(
            ": driver {driver_id} is inactive"
        )));
    }

    let load = active_load(state, driver_id);
    if load >= driver.capacity as usize {
        return Err(DispatchError::NoDriverAvailable(format!(
            ": driver {driver_id} is at capacity ({load}/{})",
            driver.capacity
        )));
    }

    Ok(())
}

// iterates the deliveries map; callers must not hold an entry guard on it
pub fn active_load(state: &AppState, driver_id: Uuid) -> usize {
    state
        .deliveries
        .iter()
        .filter(|entry| {
            let delivery = entry.value();
            delivery.driver_id == Some(driver_id) && !delivery.status.is_terminal()
        })
        .count()
}
