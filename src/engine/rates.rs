use serde::Serialize;

use crate::geo::haversine_km;
use crate::models::delivery::{Money, PackageSpec};
use crate::models::driver::GeoPoint;

pub const CURRENCY: &str = "MXN";

const BASE_FEE_CENTS: i64 = 5_000;
const PER_KM_CENTS: f64 = 850.0;
const INCLUDED_WEIGHT_KG: f64 = 5.0;
const PER_EXTRA_KG_CENTS: f64 = 600.0;
const FRAGILE_MULTIPLIER: f64 = 1.25;

#[derive(Debug, Clone, Serialize)]
pub struct RateQuote {
    pub amount: Money,
    pub distance_km: f64,
}

pub fn quote(origin: &GeoPoint, destination: &GeoPoint, package: &PackageSpec) -> RateQuote {
    let distance_km = haversine_km(origin, destination);

    let extra_kg = (package.weight_kg - INCLUDED_WEIGHT_KG).max(0.0);
    let mut cents = BASE_FEE_CENTS as f64 + distance_km * PER_KM_CENTS + extra_kg * PER_EXTRA_KG_CENTS;
    if package.fragile {
        cents *= FRAGILE_MULTIPLIER;
    }

    RateQuote {
        amount: Money {
            amount_cents: cents.round() as i64,
            currency: CURRENCY.to_string(),
        },
        distance_km,
    }
}
