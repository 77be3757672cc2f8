use std::collections::HashSet;

use ulid::Ulid;

/// Capability facts the engine cannot derive from its own state.
///
/// Guest-of-reservation and owner-of-resource are engine-held facts; whether
/// an actor is an admin is supplied by the embedding service. The engine
/// treats this as a boolean capability check, not an identity system.
pub trait RoleSource: Send + Sync {
    fn is_admin(&self, actor: &Ulid) -> bool;
}

/// Fixed admin set, resolved in-process. Enough for single-service
/// deployments and tests; services with a real directory implement
/// `RoleSource` themselves.
#[derive(Debug, Default)]
pub struct StaticRoles {
    admins: HashSet<Ulid>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admins(admins: impl IntoIterator<Item = Ulid>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl RoleSource for StaticRoles {
    fn is_admin(&self, actor: &Ulid) -> bool {
        self.admins.contains(actor)
    }
}
