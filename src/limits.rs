//! Hard caps. All of these reject the single request that exceeds them;
//! none of them shed existing state.

/// Upper bound on listed resources in one engine.
pub const MAX_RESOURCES: usize = 100_000;

/// Upper bound on reservations held per resource (terminal rows included,
/// since the lifecycle never deletes them).
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 10_000;

/// Longest admissible stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// How far past "today" a check-in may be.
pub const MAX_ADVANCE_DAYS: i64 = 730;

/// Upper bound on candidate ids in one search-filter call.
pub const MAX_FILTER_CANDIDATES: usize = 1_000;
