use std::time::Instant;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::record_command;

use super::admission::{check_no_conflict, validate_range};
use super::{Engine, EngineError};

/// Read side. Every date predicate here delegates to the admission rule —
/// there is no second copy of the overlap logic.
impl Engine {
    /// Is the resource free for `[check_in, check_out)`? False when the
    /// listing flag is off, regardless of date overlap.
    pub async fn is_resource_available(
        &self,
        resource_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, EngineError> {
        let started = Instant::now();
        let result = self
            .availability_inner(resource_id, check_in, check_out)
            .await;
        record_command("availability", result.is_ok(), started);
        result
    }

    async fn availability_inner(
        &self,
        resource_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, EngineError> {
        let stay = validate_range(check_in, check_out)?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        if !guard.available {
            return Ok(false);
        }
        Ok(check_no_conflict(&guard, &stay).is_ok())
    }

    /// Search-time variant of the availability predicate. Same rule, no
    /// mutation path.
    pub async fn available_between(
        &self,
        resource_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, EngineError> {
        self.is_resource_available(resource_id, check_in, check_out)
            .await
    }

    /// Filter a search page of candidate resources down to the ones free
    /// for the stay. Evaluated per candidate, so it composes with whatever
    /// pagination the search layer applied before date filtering. Unknown
    /// candidate ids are dropped, not errors.
    pub async fn filter_available(
        &self,
        candidates: &[Ulid],
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Vec<Ulid>, EngineError> {
        if candidates.len() > MAX_FILTER_CANDIDATES {
            return Err(EngineError::LimitExceeded("too many candidate resources"));
        }
        let stay = validate_range(check_in, check_out)?;

        let mut free = Vec::new();
        for id in candidates {
            let Some(rs) = self.get_resource(id) else { continue };
            let guard = rs.read().await;
            if guard.available && check_no_conflict(&guard, &stay).is_ok() {
                free.push(*id);
            }
        }
        Ok(free)
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<ReservationInfo, EngineError> {
        let resource_id = self
            .resource_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        let reservation = guard.find(id).ok_or(EngineError::NotFound(id))?;
        Ok(ReservationInfo::from_reservation(resource_id, reservation))
    }

    /// All reservations on a resource, terminal rows included. Empty for an
    /// unknown resource.
    pub async fn reservations_for(&self, resource_id: Ulid) -> Vec<ReservationInfo> {
        let Some(rs) = self.get_resource(&resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .reservations
            .iter()
            .map(|r| ReservationInfo::from_reservation(resource_id, r))
            .collect()
    }

    pub async fn list_resources(&self) -> Vec<ResourceInfo> {
        let mut out = Vec::with_capacity(self.state.len());
        let arcs: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for rs in arcs {
            let guard = rs.read().await;
            out.push(ResourceInfo {
                id: guard.id,
                owner_id: guard.owner_id,
                available: guard.available,
            });
        }
        out
    }
}
