use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;
use crate::models::proof::{DeliveryRating, ProofOfDelivery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Quoted,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "quoted" => Some(Self::Quoted),
            "assigned" => Some(Self::Assigned),
            "picked_up" => Some(Self::PickedUp),
            "in_transit" => Some(Self::InTransit),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn stage_label(&self) -> &'static str {
        match self {
            Self::Quoted => "Order received",
            Self::Assigned => "Driver assigned",
            Self::PickedUp => "Picked up",
            Self::InTransit => "On the way",
            Self::Delivered => "Delivered",
            Self::Failed => "Delivery failed",
            Self::Cancelled => "Cancelled",
        }
    }

    fn token(&self) -> &'static str {
        match self {
            Self::Quoted => "quoted",
            Self::Assigned => "assigned",
            Self::PickedUp => "picked_up",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Dispatcher,
    Driver,
    System,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dispatcher => "dispatcher",
            Self::Driver => "driver",
            Self::System => "system",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    pub weight_kg: f64,
    #[serde(default)]
    pub fragile: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: DeliveryStatus,
    pub at: DateTime<Utc>,
    pub actor: ActorRole,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub tracking_code: String,
    pub status: DeliveryStatus,
    pub origin: Address,
    pub destination: Address,
    pub package: PackageSpec,
    pub quoted_rate: Money,
    pub driver_id: Option<Uuid>,
    pub proof_of_delivery: Option<ProofOfDelivery>,
    pub failure_reason: Option<String>,
    pub rating: Option<DeliveryRating>,
    pub status_history: Vec<StatusChange>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Delivery {
    pub fn entered_at(&self, status: DeliveryStatus) -> Option<DateTime<Utc>> {
        self.status_history
            .iter()
            .find(|change| change.status == status)
            .map(|change| change.at)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryEvent {
    pub delivery_id: Uuid,
    pub tracking_code: String,
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
    pub actor: ActorRole,
    pub driver_released: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTimestamps {
    pub quoted_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingView {
    pub tracking_code: String,
    pub status: DeliveryStatus,
    pub stage: &'static str,
    pub timestamps: StageTimestamps,
}

impl TrackingView {
    pub fn of(delivery: &Delivery) -> Self {
        Self {
            tracking_code: delivery.tracking_code.clone(),
            status: delivery.status,
            stage: delivery.status.stage_label(),
            timestamps: StageTimestamps {
                quoted_at: delivery.entered_at(DeliveryStatus::Quoted),
                assigned_at: delivery.entered_at(DeliveryStatus::Assigned),
                picked_up_at: delivery.entered_at(DeliveryStatus::PickedUp),
                in_transit_at: delivery.entered_at(DeliveryStatus::InTransit),
                delivered_at: delivery.entered_at(DeliveryStatus::Delivered),
                failed_at: delivery.entered_at(DeliveryStatus::Failed),
                cancelled_at: delivery.entered_at(DeliveryStatus::Cancelled),
            },
        }
    }
}
