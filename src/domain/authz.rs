//! Authorization seam
//!
//! The ledger core knows nothing about roles or permissions. Callers
//! inject a policy through this trait; the default allows everything,
//! which matches a deployment where authorization happens upstream.

use std::sync::Arc;
use uuid::Uuid;

/// Policy hook consulted by activities before staging events.
pub trait Authorizer: Send + Sync {
    /// Whether `actor` may perform `operation` on `account_id`.
    fn authorize(&self, operation: &str, account_id: Uuid, actor: &str) -> bool;
}

/// Permissive default policy.
#[derive(Debug, Clone, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _operation: &str, _account_id: Uuid, _actor: &str) -> bool {
        true
    }
}

/// Shared authorizer handle.
pub type SharedAuthorizer = Arc<dyn Authorizer>;

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyFreezes;

    impl Authorizer for DenyFreezes {
        fn authorize(&self, operation: &str, _account_id: Uuid, _actor: &str) -> bool {
            operation != "account.freeze"
        }
    }

    #[test]
    fn test_allow_all() {
        let authz = AllowAll;
        assert!(authz.authorize("account.freeze", Uuid::new_v4(), "anyone"));
    }

    #[test]
    fn test_injected_policy() {
        let authz = DenyFreezes;
        assert!(!authz.authorize("account.freeze", Uuid::new_v4(), "alice"));
        assert!(authz.authorize("account.create", Uuid::new_v4(), "alice"));
    }
}
