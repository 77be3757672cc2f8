use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::record_command;

use super::admission::{check_no_conflict, today, validate_booking_window, validate_range};
use super::{Engine, EngineError};

/// The state machine. Exactly one code path moves a reservation between
/// statuses: every transition here re-checks the current status under the
/// resource's write lock before persisting, so duplicate or divergent
/// guards cannot exist elsewhere.
impl Engine {
    /// Register a property so guests can book it.
    pub async fn list_resource(
        &self,
        id: Ulid,
        owner_id: Ulid,
        available: bool,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ResourceListed { id, owner_id, available };
        self.journal_append(&event).await?;
        let rs = ResourceState::new(id, owner_id, available);
        self.state
            .insert(id, std::sync::Arc::new(tokio::sync::RwLock::new(rs)));
        self.feed.publish(id, &event);
        Ok(())
    }

    /// Flip the listing flag. Host or admin only; independent of bookings —
    /// delisting rejects new reservations but touches none of the existing
    /// ones.
    pub async fn set_resource_availability(
        &self,
        id: Ulid,
        actor: Ulid,
        available: bool,
    ) -> Result<(), EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if actor != guard.owner_id && !self.roles.is_admin(&actor) {
            return Err(EngineError::Forbidden { actor, op: "set availability" });
        }

        let event = Event::ResourceAvailabilitySet { id, available };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Admit a new reservation. On success the reservation is Pending and
    /// durably journaled.
    pub async fn create_reservation(
        &self,
        resource_id: Ulid,
        guest_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Ulid, EngineError> {
        let started = Instant::now();
        let result = self
            .create_reservation_as_of(resource_id, guest_id, check_in, check_out, today())
            .await;
        record_command("create", result.is_ok(), started);
        result
    }

    /// Admission with an explicit "today", so the past-check-in policy is
    /// deterministic under test.
    pub(crate) async fn create_reservation_as_of(
        &self,
        resource_id: Ulid,
        guest_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        today: NaiveDate,
    ) -> Result<Ulid, EngineError> {
        let stay = validate_range(check_in, check_out)?;
        validate_booking_window(&stay, today)?;

        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;

        // Write lock held across check and insert: the check-then-act race
        // on one resource cannot happen.
        let mut guard = rs.write().await;
        if !guard.available {
            return Err(EngineError::ResourceUnavailable(resource_id));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }
        check_no_conflict(&guard, &stay)?;

        let id = Ulid::new();
        let event = Event::ReservationRequested { id, resource_id, guest_id, stay };
        self.persist_and_apply(resource_id, &mut guard, &event).await?;
        debug!("admitted reservation {id} on {resource_id} [{check_in}, {check_out})");
        Ok(id)
    }

    /// Pending → Confirmed. Only the resource's owning host may confirm.
    pub async fn confirm_reservation(
        &self,
        id: Ulid,
        actor: Ulid,
    ) -> Result<ReservationInfo, EngineError> {
        let started = Instant::now();
        let result = self.confirm_inner(id, actor).await;
        record_command("confirm", result.is_ok(), started);
        result
    }

    async fn confirm_inner(&self, id: Ulid, actor: Ulid) -> Result<ReservationInfo, EngineError> {
        let (resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        if actor != guard.owner_id {
            return Err(EngineError::Forbidden { actor, op: "confirm" });
        }
        let reservation = guard.find(id).ok_or(EngineError::NotFound(id))?;
        if reservation.status != ReservationStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id,
                from: reservation.status,
                op: "confirm",
            });
        }

        let event = Event::ReservationConfirmed { id, resource_id };
        self.persist_and_apply(resource_id, &mut guard, &event).await?;
        Ok(ReservationInfo::from_reservation(
            resource_id,
            guard.find(id).expect("reservation present after confirm"),
        ))
    }

    /// Pending/Confirmed → Cancelled, by the guest, the host, or an admin.
    /// Not idempotent: cancelling an already-cancelled reservation is an
    /// InvalidTransition, since silently accepting would mask a caller bug.
    pub async fn cancel_reservation(
        &self,
        id: Ulid,
        actor: Ulid,
    ) -> Result<ReservationInfo, EngineError> {
        let started = Instant::now();
        let result = self.cancel_inner(id, actor).await;
        record_command("cancel", result.is_ok(), started);
        result
    }

    async fn cancel_inner(&self, id: Ulid, actor: Ulid) -> Result<ReservationInfo, EngineError> {
        let (resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard.find(id).ok_or(EngineError::NotFound(id))?;
        let allowed = actor == reservation.guest_id
            || actor == guard.owner_id
            || self.roles.is_admin(&actor);
        if !allowed {
            return Err(EngineError::Forbidden { actor, op: "cancel" });
        }
        if !reservation.status.is_blocking() {
            return Err(EngineError::InvalidTransition {
                id,
                from: reservation.status,
                op: "cancel",
            });
        }

        let event = Event::ReservationCancelled { id, resource_id };
        self.persist_and_apply(resource_id, &mut guard, &event).await?;
        Ok(ReservationInfo::from_reservation(
            resource_id,
            guard.find(id).expect("reservation present after cancel"),
        ))
    }

    /// Confirmed → CheckedOut, date-triggered, no human actor. Re-checks
    /// eligibility under the write lock, so a cancellation that raced the
    /// sweep wins.
    pub(crate) async fn check_out_elapsed(
        &self,
        id: Ulid,
        as_of: NaiveDate,
    ) -> Result<(), EngineError> {
        let (resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard.find(id).ok_or(EngineError::NotFound(id))?;
        if reservation.status != ReservationStatus::Confirmed
            || reservation.stay.check_out >= as_of
        {
            return Err(EngineError::InvalidTransition {
                id,
                from: reservation.status,
                op: "check out",
            });
        }

        let event = Event::ReservationCheckedOut { id, resource_id };
        self.persist_and_apply(resource_id, &mut guard, &event).await
    }

    /// Snapshot of Confirmed reservations whose stay ended before `as_of`.
    /// Pending reservations are never collected — an unconfirmed stay whose
    /// dates lapsed was never a commitment and is left to normal
    /// cancellation.
    pub fn collect_elapsed(&self, as_of: NaiveDate) -> Vec<(Ulid, Ulid)> {
        let mut elapsed = Vec::new();
        for entry in self.state.iter() {
            let rs = entry.value().clone();
            if let Ok(guard) = rs.try_read() {
                for r in &guard.reservations {
                    if r.status == ReservationStatus::Confirmed && r.stay.check_out < as_of {
                        elapsed.push((r.id, guard.id));
                    }
                }
            }
        }
        elapsed
    }

    /// Advance every elapsed Confirmed reservation to CheckedOut. Safe to
    /// re-run for the same day: the Confirmed guard leaves nothing for a
    /// second pass. A failure on one reservation is logged and skipped,
    /// never aborting the batch.
    pub async fn run_expiration_sweep(&self, as_of: NaiveDate) -> Result<usize, EngineError> {
        metrics::counter!(crate::observability::SWEEP_RUNS_TOTAL).increment(1);
        let elapsed = self.collect_elapsed(as_of);
        let mut advanced = 0usize;
        for (reservation_id, _resource_id) in elapsed {
            match self.check_out_elapsed(reservation_id, as_of).await {
                Ok(()) => {
                    advanced += 1;
                    info!("checked out reservation {reservation_id}");
                }
                Err(EngineError::InvalidTransition { .. }) => {
                    // Raced with a cancellation or an earlier sweep pass
                    debug!("sweep skip {reservation_id}: no longer eligible");
                }
                Err(e) => {
                    warn!("sweep: failed to check out {reservation_id}: {e}");
                    metrics::counter!(crate::observability::SWEEP_FAILURES_TOTAL).increment(1);
                }
            }
        }
        metrics::counter!(crate::observability::SWEEP_CHECKOUTS_TOTAL)
            .increment(advanced as u64);
        Ok(advanced)
    }
}
