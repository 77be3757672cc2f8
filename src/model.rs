use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay `[check_in, check_out)` in whole calendar dates.
/// A checkout date equal to another stay's check-in is not an overlap,
/// so same-day turnover is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "StayRange check-in must precede check-out");
        Self { check_in, check_out }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// The one overlap rule. Every availability decision in the crate
    /// routes through here.
    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// Returns true if `date` falls inside the stay (checkout night excluded).
    #[allow(dead_code)]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    CheckedOut,
}

impl ReservationStatus {
    /// Blocking reservations are the ones the overlap check must respect.
    pub fn is_blocking(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Cancelled | ReservationStatus::CheckedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::CheckedOut => "checked_out",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One guest's claim on a resource for a date range. Dates and parties are
/// immutable after creation; only `status` ever changes, and only through
/// the lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub guest_id: Ulid,
    pub stay: StayRange,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub owner_id: Ulid,
    /// Host/admin-controlled listing flag, independent of bookings. An
    /// unavailable resource rejects all new reservations.
    pub available: bool,
    /// All reservations ever admitted, sorted by `stay.check_in`. Terminal
    /// reservations stay in the list with their final status; the lifecycle
    /// never deletes a row.
    pub reservations: Vec<Reservation>,
}

impl ResourceState {
    pub fn new(id: Ulid, owner_id: Ulid, available: bool) -> Self {
        Self {
            id,
            owner_id,
            available,
            reservations: Vec::new(),
        }
    }

    /// Insert keeping sort order by check-in date.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.stay.check_in, |r| r.stay.check_in)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn find(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn find_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations whose stay intersects the query window, any status.
    /// The sorted order lets us drop everything starting at or after
    /// `query.check_out` with one binary search.
    pub fn overlapping(&self, query: &StayRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.stay.check_in < query.check_out);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.stay.check_out > query.check_in)
    }
}

/// Journal record format — flat, no nesting. Status transitions are
/// status-only records keyed by reservation id; no record re-states dates
/// or parties after admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceListed {
        id: Ulid,
        owner_id: Ulid,
        available: bool,
    },
    ResourceAvailabilitySet {
        id: Ulid,
        available: bool,
    },
    ReservationRequested {
        id: Ulid,
        resource_id: Ulid,
        guest_id: Ulid,
        stay: StayRange,
    },
    ReservationConfirmed {
        id: Ulid,
        resource_id: Ulid,
    },
    ReservationCancelled {
        id: Ulid,
        resource_id: Ulid,
    },
    ReservationCheckedOut {
        id: Ulid,
        resource_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub guest_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: ReservationStatus,
}

impl ReservationInfo {
    pub fn from_reservation(resource_id: Ulid, r: &Reservation) -> Self {
        Self {
            id: r.id,
            resource_id,
            guest_id: r.guest_id,
            check_in: r.stay.check_in,
            check_out: r.stay.check_out,
            status: r.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn stay(ci: (i32, u32, u32), co: (i32, u32, u32)) -> StayRange {
        StayRange::new(d(ci.0, ci.1, ci.2), d(co.0, co.1, co.2))
    }

    fn pending(s: StayRange) -> Reservation {
        Reservation {
            id: Ulid::new(),
            guest_id: Ulid::new(),
            stay: s,
            status: ReservationStatus::Pending,
        }
    }

    #[test]
    fn stay_basics() {
        let s = stay((2025, 5, 1), (2025, 5, 7));
        assert_eq!(s.nights(), 6);
        assert!(s.contains_date(d(2025, 5, 1)));
        assert!(s.contains_date(d(2025, 5, 6)));
        assert!(!s.contains_date(d(2025, 5, 7))); // half-open
    }

    #[test]
    fn stay_overlap_symmetric() {
        let a = stay((2025, 5, 1), (2025, 5, 7));
        let b = stay((2025, 5, 6), (2025, 5, 9));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn stay_touching_boundary_is_not_overlap() {
        let a = stay((2025, 5, 1), (2025, 5, 7));
        let b = stay((2025, 5, 7), (2025, 5, 10));
        assert!(!a.overlaps(&b)); // same-day turnover
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn stay_disjoint_not_overlap() {
        let a = stay((2025, 5, 1), (2025, 5, 3));
        let b = stay((2025, 5, 10), (2025, 5, 12));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn stay_containment_is_overlap() {
        let outer = stay((2025, 5, 1), (2025, 5, 30));
        let inner = stay((2025, 5, 10), (2025, 5, 12));
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn status_blocking_and_terminal() {
        assert!(ReservationStatus::Pending.is_blocking());
        assert!(ReservationStatus::Confirmed.is_blocking());
        assert!(!ReservationStatus::Cancelled.is_blocking());
        assert!(!ReservationStatus::CheckedOut.is_blocking());

        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(!ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::CheckedOut.is_terminal());
    }

    #[test]
    fn reservation_ordering_by_check_in() {
        let mut rs = ResourceState::new(Ulid::new(), Ulid::new(), true);
        rs.insert_reservation(pending(stay((2025, 7, 10), (2025, 7, 15))));
        rs.insert_reservation(pending(stay((2025, 7, 1), (2025, 7, 5))));
        rs.insert_reservation(pending(stay((2025, 7, 5), (2025, 7, 10))));
        let starts: Vec<_> = rs.reservations.iter().map(|r| r.stay.check_in).collect();
        assert_eq!(starts, vec![d(2025, 7, 1), d(2025, 7, 5), d(2025, 7, 10)]);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut rs = ResourceState::new(Ulid::new(), Ulid::new(), true);
        rs.insert_reservation(pending(stay((2025, 3, 1), (2025, 3, 5))));
        rs.insert_reservation(pending(stay((2025, 6, 1), (2025, 6, 10))));
        rs.insert_reservation(pending(stay((2025, 9, 1), (2025, 9, 5))));

        let query = stay((2025, 6, 5), (2025, 6, 20));
        let hits: Vec<_> = rs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].stay, stay((2025, 6, 1), (2025, 6, 10)));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // A stay ending exactly on the query check-in is not a hit.
        let mut rs = ResourceState::new(Ulid::new(), Ulid::new(), true);
        rs.insert_reservation(pending(stay((2025, 5, 1), (2025, 5, 7))));
        let query = stay((2025, 5, 7), (2025, 5, 10));
        assert!(rs.overlapping(&query).next().is_none());
    }

    #[test]
    fn overlapping_spanning_stay_included() {
        let mut rs = ResourceState::new(Ulid::new(), Ulid::new(), true);
        rs.insert_reservation(pending(stay((2025, 1, 1), (2025, 12, 31))));
        let query = stay((2025, 6, 1), (2025, 6, 2));
        assert_eq!(rs.overlapping(&query).count(), 1);
    }

    #[test]
    fn overlapping_empty_resource() {
        let rs = ResourceState::new(Ulid::new(), Ulid::new(), true);
        let query = stay((2025, 1, 1), (2025, 2, 1));
        assert!(rs.overlapping(&query).next().is_none());
    }

    #[test]
    fn find_and_find_mut() {
        let mut rs = ResourceState::new(Ulid::new(), Ulid::new(), true);
        let r = pending(stay((2025, 5, 1), (2025, 5, 7)));
        let id = r.id;
        rs.insert_reservation(r);

        assert!(rs.find(id).is_some());
        assert!(rs.find(Ulid::new()).is_none());

        rs.find_mut(id).unwrap().status = ReservationStatus::Confirmed;
        assert_eq!(rs.find(id).unwrap().status, ReservationStatus::Confirmed);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationRequested {
            id: Ulid::new(),
            resource_id: Ulid::new(),
            guest_id: Ulid::new(),
            stay: stay((2025, 5, 1), (2025, 5, 7)),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
