use ulid::Ulid;

use crate::model::ReservationStatus;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed date range, or a check-in date the policy rejects.
    InvalidRange(&'static str),
    /// The host or an admin has delisted the resource.
    ResourceUnavailable(Ulid),
    /// The requested stay overlaps an existing blocking reservation.
    DateConflict(Ulid),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The operation does not apply to the reservation's current status.
    InvalidTransition {
        id: Ulid,
        from: ReservationStatus,
        op: &'static str,
    },
    /// The actor lacks the required relationship to the reservation/resource.
    Forbidden {
        actor: Ulid,
        op: &'static str,
    },
    LimitExceeded(&'static str),
    /// Journal append/compact failure. Aborts the single operation in
    /// progress; never skips a date check.
    JournalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            EngineError::ResourceUnavailable(id) => write!(f, "resource unavailable: {id}"),
            EngineError::DateConflict(id) => write!(f, "dates conflict with reservation: {id}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidTransition { id, from, op } => {
                write!(f, "reservation {id}: cannot {op} from status {from}")
            }
            EngineError::Forbidden { actor, op } => {
                write!(f, "actor {actor} may not {op}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
