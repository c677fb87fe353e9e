use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::delivery::{
    ActorRole, Address, Delivery, DeliveryStatus, Money, PackageSpec, StatusChange,
};
use crate::models::proof::{DeliveryRating, ProofOfDelivery};

#[derive(Debug, Clone)]
pub enum TransitionCommand {
    Assign { driver_id: Uuid },
    Pickup,
    Transit,
    Deliver { proof: Option<ProofOfDelivery> },
    Fail { reason: Option<String> },
    Cancel { reason: Option<String> },
}

impl TransitionCommand {
    pub fn target(&self) -> DeliveryStatus {
        match self {
            Self::Assign { .. } => DeliveryStatus::Assigned,
            Self::Pickup => DeliveryStatus::PickedUp,
            Self::Transit => DeliveryStatus::InTransit,
            Self::Deliver { .. } => DeliveryStatus::Delivered,
            Self::Fail { .. } => DeliveryStatus::Failed,
            Self::Cancel { .. } => DeliveryStatus::Cancelled,
        }
    }
}

pub fn allowed_targets(from: DeliveryStatus) -> &'static [DeliveryStatus] {
    use DeliveryStatus::*;

    match from {
        Quoted => &[Assigned, Cancelled],
        Assigned => &[PickedUp, Cancelled, Failed],
        PickedUp => &[InTransit, Failed],
        InTransit => &[Delivered, Failed],
        Delivered | Failed | Cancelled => &[],
    }
}

pub fn role_allowed_targets(role: ActorRole, from: DeliveryStatus) -> &'static [DeliveryStatus] {
    use DeliveryStatus::*;

    match (role, from) {
        (ActorRole::Dispatcher, Quoted) => &[Assigned, Cancelled],
        (ActorRole::Dispatcher, Assigned) => &[Cancelled, Failed],
        (ActorRole::Dispatcher, PickedUp) => &[Failed],
        (ActorRole::Dispatcher, InTransit) => &[Failed],
        (ActorRole::Driver, Assigned) => &[PickedUp, Failed],
        (ActorRole::Driver, PickedUp) => &[InTransit, Failed],
        (ActorRole::Driver, InTransit) => &[Delivered, Failed],
        _ => &[],
    }
}

pub fn ensure_edge(from: DeliveryStatus, target: DeliveryStatus) -> Result<(), DispatchError> {
    if from == target {
        return Err(DispatchError::InvalidTransition(format!(
            "delivery is already {from}; duplicate transition requests are rejected, poll the delivery to read its state"
        )));
    }

    if !allowed_targets(from).contains(&target) {
        return Err(DispatchError::InvalidTransition(format!(
            "cannot move a {from} delivery to {target}"
        )));
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionOutcome {
    pub from: DeliveryStatus,
    pub driver_released: bool,
    pub at: DateTime<Utc>,
}

// check order: version, then edge, then role, then proof gate
pub fn apply(
    delivery: &mut Delivery,
    command: TransitionCommand,
    actor: ActorRole,
    expected_version: Option<u64>,
) -> Result<TransitionOutcome, DispatchError> {
    let from = delivery.status;
    let target = command.target();

    if let Some(expected) = expected_version {
        if expected != delivery.version {
            return Err(DispatchError::VersionConflict {
                expected,
                current: delivery.version,
            });
        }
    }

    ensure_edge(from, target)?;

    if !role_allowed_targets(actor, from).contains(&target) {
        return Err(DispatchError::InvalidTransition(format!(
            "role {actor} may not move a {from} delivery to {target}"
        )));
    }

    if let TransitionCommand::Deliver { proof } = &command {
        match (&delivery.proof_of_delivery, proof) {
            (Some(_), Some(_)) => return Err(DispatchError::AlreadyAttached),
            (None, None) => return Err(DispatchError::MissingArtifact),
            _ => {}
        }
    }

    let mut note = None;
    match command {
        TransitionCommand::Assign { driver_id } => {
            delivery.driver_id = Some(driver_id);
        }
        TransitionCommand::Pickup | TransitionCommand::Transit => {}
        TransitionCommand::Deliver { proof } => {
            if delivery.proof_of_delivery.is_none() {
                delivery.proof_of_delivery = proof;
            }
        }
        TransitionCommand::Fail { reason } => {
            delivery.failure_reason = reason.clone();
            note = reason;
        }
        TransitionCommand::Cancel { reason } => {
            note = reason;
        }
    }

    delivery.status = target;
    delivery.version += 1;
    let at = append_history(delivery, target, actor, note);

    let driver_released = delivery.driver_id.is_some()
        && matches!(target, DeliveryStatus::Failed | DeliveryStatus::Cancelled);

    Ok(TransitionOutcome {
        from,
        driver_released,
        at,
    })
}

pub fn attach_proof(delivery: &mut Delivery, proof: ProofOfDelivery) -> Result<(), DispatchError> {
    if delivery.proof_of_delivery.is_some() {
        return Err(DispatchError::AlreadyAttached);
    }

    if delivery.status != DeliveryStatus::InTransit {
        return Err(DispatchError::InvalidState(format!(
            "proof of delivery can only be attached while in_transit; delivery is {}",
            delivery.status
        )));
    }

    delivery.proof_of_delivery = Some(proof);
    Ok(())
}

pub fn attach_rating(
    delivery: &mut Delivery,
    rating: u8,
    comment: Option<String>,
) -> Result<DeliveryRating, DispatchError> {
    if !(1..=5).contains(&rating) {
        return Err(DispatchError::InvalidInput(
            "rating must be between 1 and 5".to_string(),
        ));
    }

    if delivery.status != DeliveryStatus::Delivered {
        return Err(DispatchError::InvalidState(format!(
            "only delivered deliveries can be rated; delivery is {}",
            delivery.status
        )));
    }

    if delivery.rating.is_some() {
        return Err(DispatchError::AlreadyRated);
    }

    let record = DeliveryRating {
        rating,
        comment,
        created_at: Utc::now(),
    };
    delivery.rating = Some(record.clone());
    Ok(record)
}

pub fn open_delivery(
    tracking_code: String,
    origin: Address,
    destination: Address,
    package: PackageSpec,
    quoted_rate: Money,
) -> Delivery {
    let now = Utc::now();

    Delivery {
        id: Uuid::new_v4(),
        tracking_code,
        status: DeliveryStatus::Quoted,
        origin,
        destination,
        package,
        quoted_rate,
        driver_id: None,
        proof_of_delivery: None,
        failure_reason: None,
        rating: None,
        status_history: vec![StatusChange {
            status: DeliveryStatus::Quoted,
            at: now,
            actor: ActorRole::System,
            note: None,
        }],
        version: 1,
        created_at: now,
    }
}

fn append_history(
    delivery: &mut Delivery,
    status: DeliveryStatus,
    actor: ActorRole,
    note: Option<String>,
) -> DateTime<Utc> {
    let mut at = Utc::now();
    if let Some(last) = delivery.status_history.last() {
        // history must stay strictly ordered even on coarse clocks
        if at <= last.at {
            at = last.at + Duration::nanoseconds(1);
        }
    }

    delivery.status_history.push(StatusChange {
        status,
        at,
        actor,
        note,
    });
    at
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{
        allowed_targets, apply, attach_proof, attach_rating, open_delivery, TransitionCommand,
    };
    use crate::error::DispatchError;
    use crate::models::delivery::{ActorRole, Address, DeliveryStatus, Money, PackageSpec};
    use crate::models::driver::GeoPoint;
    use crate::models::proof::{CaptureMethod, ProofOfDelivery};

    fn address(lat: f64, lng: f64) -> Address {
        Address {
            street: "Calle Roma 123, Col. Roma".to_string(),
            point: GeoPoint { lat, lng },
        }
    }

    fn quoted_delivery() -> crate::models::delivery::Delivery {
        open_delivery(
            "DEL-2026-08-00001".to_string(),
            address(19.4326, -99.1332),
            address(19.3910, -99.2837),
            PackageSpec {
                weight_kg: 2.0,
                fragile: false,
                description: None,
            },
            Money {
                amount_cents: 9_500,
                currency: "MXN".to_string(),
            },
        )
    }

    fn proof() -> ProofOfDelivery {
        ProofOfDelivery {
            storage_ref: "blob://proofs/abc123".to_string(),
            captured_at: Utc::now(),
            method: CaptureMethod::Photo,
            recipient_name: Some("Juan Pérez".to_string()),
        }
    }

    fn assign(delivery: &mut crate::models::delivery::Delivery) -> Uuid {
        let driver_id = Uuid::new_v4();
        apply(
            delivery,
            TransitionCommand::Assign { driver_id },
            ActorRole::Dispatcher,
            None,
        )
        .unwrap();
        driver_id
    }

    #[test]
    fn open_delivery_seeds_history_and_version() {
        let delivery = quoted_delivery();
        assert_eq!(delivery.status, DeliveryStatus::Quoted);
        assert_eq!(delivery.version, 1);
        assert_eq!(delivery.status_history.len(), 1);
        assert_eq!(delivery.status_history[0].status, DeliveryStatus::Quoted);
        assert_eq!(delivery.status_history[0].actor, ActorRole::System);
        assert!(delivery.driver_id.is_none());
    }

    #[test]
    fn full_lifecycle_walk_reaches_delivered() {
        let mut delivery = quoted_delivery();
        let driver_id = assign(&mut delivery);
        assert_eq!(delivery.status, DeliveryStatus::Assigned);
        assert_eq!(delivery.driver_id, Some(driver_id));

        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();
        apply(&mut delivery, TransitionCommand::Transit, ActorRole::Driver, None).unwrap();
        attach_proof(&mut delivery, proof()).unwrap();
        apply(
            &mut delivery,
            TransitionCommand::Deliver { proof: None },
            ActorRole::Driver,
            None,
        )
        .unwrap();

        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert_eq!(delivery.version, 5);
        assert_eq!(delivery.status_history.len(), 5);
        assert!(delivery.proof_of_delivery.is_some());

        let statuses: Vec<DeliveryStatus> = delivery
            .status_history
            .iter()
            .map(|change| change.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                DeliveryStatus::Quoted,
                DeliveryStatus::Assigned,
                DeliveryStatus::PickedUp,
                DeliveryStatus::InTransit,
                DeliveryStatus::Delivered,
            ]
        );
    }

    #[test]
    fn history_timestamps_are_strictly_increasing() {
        let mut delivery = quoted_delivery();
        assign(&mut delivery);
        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();
        apply(&mut delivery, TransitionCommand::Transit, ActorRole::Driver, None).unwrap();

        for pair in delivery.status_history.windows(2) {
            assert!(pair[0].at < pair[1].at);
        }
    }

    #[test]
    fn deliver_straight_from_assigned_is_rejected() {
        let mut delivery = quoted_delivery();
        assign(&mut delivery);

        let err = apply(
            &mut delivery,
            TransitionCommand::Deliver { proof: Some(proof()) },
            ActorRole::Driver,
            None,
        )
        .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidTransition(_)));
        assert_eq!(delivery.status, DeliveryStatus::Assigned);
        assert_eq!(delivery.version, 2);
    }

    #[test]
    fn deliver_without_proof_is_missing_artifact() {
        let mut delivery = quoted_delivery();
        assign(&mut delivery);
        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();
        apply(&mut delivery, TransitionCommand::Transit, ActorRole::Driver, None).unwrap();

        let err = apply(
            &mut delivery,
            TransitionCommand::Deliver { proof: None },
            ActorRole::Driver,
            None,
        )
        .unwrap_err();

        assert!(matches!(err, DispatchError::MissingArtifact));
        assert_eq!(delivery.status, DeliveryStatus::InTransit);
    }

    #[test]
    fn deliver_accepts_inline_proof() {
        let mut delivery = quoted_delivery();
        assign(&mut delivery);
        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();
        apply(&mut delivery, TransitionCommand::Transit, ActorRole::Driver, None).unwrap();

        apply(
            &mut delivery,
            TransitionCommand::Deliver { proof: Some(proof()) },
            ActorRole::Driver,
            None,
        )
        .unwrap();

        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert!(delivery.proof_of_delivery.is_some());
    }

    #[test]
    fn inline_proof_on_top_of_attached_proof_is_rejected() {
        let mut delivery = quoted_delivery();
        assign(&mut delivery);
        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();
        apply(&mut delivery, TransitionCommand::Transit, ActorRole::Driver, None).unwrap();
        attach_proof(&mut delivery, proof()).unwrap();

        let err = apply(
            &mut delivery,
            TransitionCommand::Deliver { proof: Some(proof()) },
            ActorRole::Driver,
            None,
        )
        .unwrap_err();

        assert!(matches!(err, DispatchError::AlreadyAttached));
    }

    #[test]
    fn duplicate_transition_is_rejected_not_swallowed() {
        let mut delivery = quoted_delivery();
        assign(&mut delivery);
        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();

        let err = apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None)
            .unwrap_err();

        match err {
            DispatchError::InvalidTransition(detail) => {
                assert!(detail.contains("already picked_up"));
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(delivery.version, 3);
    }

    #[test]
    fn terminal_states_have_no_successors() {
        assert!(allowed_targets(DeliveryStatus::Delivered).is_empty());
        assert!(allowed_targets(DeliveryStatus::Failed).is_empty());
        assert!(allowed_targets(DeliveryStatus::Cancelled).is_empty());

        let mut delivery = quoted_delivery();
        apply(
            &mut delivery,
            TransitionCommand::Cancel { reason: None },
            ActorRole::Dispatcher,
            None,
        )
        .unwrap();

        let err = apply(
            &mut delivery,
            TransitionCommand::Fail { reason: None },
            ActorRole::Dispatcher,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition(_)));
    }

    #[test]
    fn stale_version_conflicts_and_matching_version_passes() {
        let mut delivery = quoted_delivery();
        let driver_id = Uuid::new_v4();

        apply(
            &mut delivery,
            TransitionCommand::Assign { driver_id },
            ActorRole::Dispatcher,
            Some(1),
        )
        .unwrap();
        assert_eq!(delivery.version, 2);

        let err = apply(
            &mut delivery,
            TransitionCommand::Pickup,
            ActorRole::Driver,
            Some(1),
        )
        .unwrap_err();

        match err {
            DispatchError::VersionConflict { expected, current } => {
                assert_eq!(expected, 1);
                assert_eq!(current, 2);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }

        apply(
            &mut delivery,
            TransitionCommand::Pickup,
            ActorRole::Driver,
            Some(2),
        )
        .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::PickedUp);
    }

    #[test]
    fn drivers_may_not_cancel() {
        let mut delivery = quoted_delivery();

        let err = apply(
            &mut delivery,
            TransitionCommand::Cancel { reason: None },
            ActorRole::Driver,
            None,
        )
        .unwrap_err();

        match err {
            DispatchError::InvalidTransition(detail) => assert!(detail.contains("role driver")),
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn failing_an_assigned_delivery_releases_the_driver() {
        let mut delivery = quoted_delivery();
        let driver_id = assign(&mut delivery);

        let outcome = apply(
            &mut delivery,
            TransitionCommand::Fail {
                reason: Some("business closed".to_string()),
            },
            ActorRole::Driver,
            None,
        )
        .unwrap();

        assert!(outcome.driver_released);
        assert_eq!(delivery.driver_id, Some(driver_id));
        assert_eq!(delivery.failure_reason.as_deref(), Some("business closed"));
        assert_eq!(
            delivery.status_history.last().unwrap().note.as_deref(),
            Some("business closed")
        );
    }

    #[test]
    fn cancelling_a_quoted_delivery_releases_no_driver() {
        let mut delivery = quoted_delivery();

        let outcome = apply(
            &mut delivery,
            TransitionCommand::Cancel {
                reason: Some("customer changed their mind".to_string()),
            },
            ActorRole::Dispatcher,
            None,
        )
        .unwrap();

        assert!(!outcome.driver_released);
        assert_eq!(delivery.status, DeliveryStatus::Cancelled);
    }

    #[test]
    fn proof_attach_is_gated_and_immutable() {
        let mut delivery = quoted_delivery();
        assign(&mut delivery);

        let err = attach_proof(&mut delivery, proof()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidState(_)));

        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();
        apply(&mut delivery, TransitionCommand::Transit, ActorRole::Driver, None).unwrap();

        attach_proof(&mut delivery, proof()).unwrap();
        let err = attach_proof(&mut delivery, proof()).unwrap_err();
        assert!(matches!(err, DispatchError::AlreadyAttached));
    }

    #[test]
    fn rating_requires_completion_and_happens_once() {
        let mut delivery = quoted_delivery();

        let err = attach_rating(&mut delivery, 5, None).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidState(_)));

        assign(&mut delivery);
        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();
        apply(&mut delivery, TransitionCommand::Transit, ActorRole::Driver, None).unwrap();
        apply(
            &mut delivery,
            TransitionCommand::Deliver { proof: Some(proof()) },
            ActorRole::Driver,
            None,
        )
        .unwrap();

        let err = attach_rating(&mut delivery, 6, None).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInput(_)));

        let record = attach_rating(&mut delivery, 5, Some("muy rápido".to_string())).unwrap();
        assert_eq!(record.rating, 5);

        let err = attach_rating(&mut delivery, 4, None).unwrap_err();
        assert!(matches!(err, DispatchError::AlreadyRated));
    }

    #[test]
    fn rating_does_not_touch_version_or_history() {
        let mut delivery = quoted_delivery();
        assign(&mut delivery);
        apply(&mut delivery, TransitionCommand::Pickup, ActorRole::Driver, None).unwrap();
        apply(&mut delivery, TransitionCommand::Transit, ActorRole::Driver, None).unwrap();
        apply(
            &mut delivery,
            TransitionCommand::Deliver { proof: Some(proof()) },
            ActorRole::Driver,
            None,
        )
        .unwrap();

        let version = delivery.version;
        let history_len = delivery.status_history.len();
        attach_rating(&mut delivery, 4, None).unwrap();

        assert_eq!(delivery.version, version);
        assert_eq!(delivery.status_history.len(), history_len);
    }
}
