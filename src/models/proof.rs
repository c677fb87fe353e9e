use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    Photo,
    Signature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofOfDelivery {
    pub storage_ref: String,
    pub captured_at: DateTime<Utc>,
    pub method: CaptureMethod,
    pub recipient_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRating {
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
