//! Explicit authenticated-principal handling. Orchestrators receive a
//! `Principal` value and consult an `AccessPolicy`; nothing is inferred from
//! request-supplied flags.

use crate::error::{PipelineError, PipelineResult};

/// The authenticated caller of an orchestrator operation.
#[derive(Debug, Clone)]
pub struct Principal {
    /// Database user id; `None` for anonymous/service callers.
    pub user_id: Option<i64>,
    pub username: String,
    pub is_admin: bool,
}

impl Principal {
    pub fn new(user_id: Option<i64>, username: impl Into<String>, is_admin: bool) -> Self {
        Self {
            user_id,
            username: username.into(),
            is_admin,
        }
    }
}

/// Policy seam for mutation authorization.
pub trait AccessPolicy {
    /// May `principal` delete an experiment owned by `owner_id`?
    fn can_delete(&self, principal: &Principal, owner_id: Option<i64>) -> bool;

    /// May `principal` change visibility or reassign ownership?
    fn can_administer(&self, principal: &Principal) -> bool;
}

/// Default policy: admins may do anything; owners may delete their own rows;
/// legacy rows (no recorded owner) are admin-only.
#[derive(Debug, Default)]
pub struct OwnerOrAdminPolicy;

impl AccessPolicy for OwnerOrAdminPolicy {
    fn can_delete(&self, principal: &Principal, owner_id: Option<i64>) -> bool {
        if principal.is_admin {
            return true;
        }
        match (principal.user_id, owner_id) {
            (Some(caller), Some(owner)) => caller == owner,
            _ => false,
        }
    }

    fn can_administer(&self, principal: &Principal) -> bool {
        principal.is_admin
    }
}

/// Convenience wrapper turning a policy refusal into the structured failure
/// orchestrators surface.
pub fn require_delete_permission(
    policy: &dyn AccessPolicy,
    principal: &Principal,
    experiment_id: i64,
    owner_id: Option<i64>,
) -> PipelineResult<()> {
    if policy.can_delete(principal, owner_id) {
        return Ok(());
    }
    Err(PipelineError::Unauthorized(format!(
        "user '{}' may not delete experiment {experiment_id}",
        principal.username
    )))
}

pub fn require_admin(policy: &dyn AccessPolicy, principal: &Principal) -> PipelineResult<()> {
    if policy.can_administer(principal) {
        return Ok(());
    }
    Err(PipelineError::Unauthorized(format!(
        "user '{}' lacks admin privileges",
        principal.username
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_delete_anything() {
        let policy = OwnerOrAdminPolicy;
        let admin = Principal::new(Some(1), "snv_admin", true);
        assert!(policy.can_delete(&admin, Some(99)));
        assert!(policy.can_delete(&admin, None));
    }

    #[test]
    fn owner_can_delete_own_rows_only() {
        let policy = OwnerOrAdminPolicy;
        let owner = Principal::new(Some(7), "alice", false);
        assert!(policy.can_delete(&owner, Some(7)));
        assert!(!policy.can_delete(&owner, Some(8)));
    }

    #[test]
    fn legacy_rows_require_admin() {
        let policy = OwnerOrAdminPolicy;
        let user = Principal::new(Some(7), "alice", false);
        assert!(!policy.can_delete(&user, None));
    }

    #[test]
    fn refusal_surfaces_unauthorized() {
        let policy = OwnerOrAdminPolicy;
        let user = Principal::new(None, "anonymous", false);
        let err = require_delete_permission(&policy, &user, 12, Some(3)).unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));
    }
}
