use chrono::NaiveDate;

use crate::limits::*;
use crate::model::{ResourceState, StayRange};

use super::EngineError;

pub(crate) fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Well-formedness only: check-in strictly before check-out. Shared by the
/// mutation path and the search-time predicate.
pub(crate) fn validate_range(
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> Result<StayRange, EngineError> {
    if check_in >= check_out {
        return Err(EngineError::InvalidRange("check-out must be after check-in"));
    }
    Ok(StayRange::new(check_in, check_out))
}

/// Admission-time policy on top of well-formedness: no retroactive
/// check-ins, bounded stay length and booking horizon.
pub(crate) fn validate_booking_window(
    stay: &StayRange,
    today: NaiveDate,
) -> Result<(), EngineError> {
    if stay.check_in < today {
        return Err(EngineError::InvalidRange("check-in is in the past"));
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    if (stay.check_in - today).num_days() > MAX_ADVANCE_DAYS {
        return Err(EngineError::LimitExceeded("check-in too far ahead"));
    }
    Ok(())
}

/// The admission rule: a candidate stay conflicts iff it overlaps any
/// blocking (pending or confirmed) reservation on the resource. Cancelled
/// and checked-out rows never block.
pub(crate) fn check_no_conflict(
    rs: &ResourceState,
    stay: &StayRange,
) -> Result<(), EngineError> {
    for r in rs.overlapping(stay) {
        if r.status.is_blocking() {
            return Err(EngineError::DateConflict(r.id));
        }
    }
    Ok(())
}
