//! Role-based authorization rules for the procurement workflow.
//!
//! Everything here is pure: no storage access, no clock, no logging. Callers look up the
//! resource owner themselves and pass `is_owner`.

use serde::{Deserialize, Serialize};

use crate::domain::user::{Identity, Role, UserId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateRequest,
    /// View or list requests the caller owns.
    ViewOwnRequests,
    /// View or list every request regardless of requestor.
    ViewAllRequests,
    SubmitApproval,
    /// Unconditional status overwrite. Open to every role.
    /// See `RequestLifecycleService::force_set_status`.
    ForceSetStatus,
    ListApprovals,
    MutateVendor,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRequest => "create_request",
            Self::ViewOwnRequests => "view_own_requests",
            Self::ViewAllRequests => "view_all_requests",
            Self::SubmitApproval => "submit_approval",
            Self::ForceSetStatus => "force_set_status",
            Self::ListApprovals => "list_approvals",
            Self::MutateVendor => "mutate_vendor",
        }
    }
}

pub fn can_perform(role: Role, operation: Operation, is_owner: bool) -> bool {
    match operation {
        Operation::CreateRequest | Operation::ForceSetStatus | Operation::ListApprovals => true,
        Operation::ViewOwnRequests => is_owner || role.is_approver(),
        Operation::ViewAllRequests | Operation::SubmitApproval | Operation::MutateVendor => {
            role.is_approver()
        }
    }
}

pub fn authorize(
    identity: &Identity,
    operation: Operation,
    owner: Option<UserId>,
) -> Result<(), DomainError> {
    let is_owner = owner == Some(identity.user_id);
    if can_perform(identity.role, operation, is_owner) {
        return Ok(());
    }

    let reason = match operation {
        Operation::SubmitApproval => "only managers and directors can approve requests".to_string(),
        Operation::MutateVendor => "only managers and directors can modify vendors".to_string(),
        Operation::ViewOwnRequests => "access denied to another user's request".to_string(),
        other => format!("role `{}` may not perform `{}`", identity.role, other.as_str()),
    };
    Err(DomainError::Forbidden(reason))
}

/// Requestor restriction applied to listings: `Some(caller)` when the caller only sees their own
/// requests, `None` when the caller sees everything.
pub fn listing_scope(identity: &Identity) -> Option<UserId> {
    if can_perform(identity.role, Operation::ViewAllRequests, false) {
        None
    } else {
        Some(identity.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{authorize, can_perform, listing_scope, Operation};
    use crate::domain::user::{Identity, Role, UserId};
    use crate::errors::DomainError;

    const ALL_ROLES: [Role; 4] = [Role::User, Role::Superuser, Role::Manager, Role::Director];

    #[test]
    fn any_role_may_create_force_status_and_audit_approvals() {
        for role in ALL_ROLES {
            for owner in [true, false] {
                assert!(can_perform(role, Operation::CreateRequest, owner));
                assert!(can_perform(role, Operation::ForceSetStatus, owner));
                assert!(can_perform(role, Operation::ListApprovals, owner));
            }
        }
    }

    #[test]
    fn approval_and_vendor_mutation_are_reserved_for_approvers() {
        for role in ALL_ROLES {
            let expected = matches!(role, Role::Manager | Role::Director);
            assert_eq!(can_perform(role, Operation::SubmitApproval, true), expected, "{role}");
            assert_eq!(can_perform(role, Operation::MutateVendor, false), expected, "{role}");
        }
    }

    #[test]
    fn owners_see_their_requests_and_approvers_see_everything() {
        assert!(can_perform(Role::User, Operation::ViewOwnRequests, true));
        assert!(!can_perform(Role::User, Operation::ViewOwnRequests, false));
        assert!(!can_perform(Role::Superuser, Operation::ViewOwnRequests, false));
        assert!(can_perform(Role::Manager, Operation::ViewOwnRequests, false));
        assert!(can_perform(Role::Director, Operation::ViewAllRequests, false));
        assert!(!can_perform(Role::Superuser, Operation::ViewAllRequests, false));
    }

    #[test]
    fn listing_scope_restricts_non_approvers_to_their_own_id() {
        let user = Identity::new(UserId(7), Role::User);
        let superuser = Identity::new(UserId(8), Role::Superuser);
        let manager = Identity::new(UserId(9), Role::Manager);

        assert_eq!(listing_scope(&user), Some(UserId(7)));
        assert_eq!(listing_scope(&superuser), Some(UserId(8)));
        assert_eq!(listing_scope(&manager), None);
    }

    #[test]
    fn authorize_reports_forbidden_with_reason() {
        let superuser = Identity::new(UserId(2), Role::Superuser);
        let error = authorize(&superuser, Operation::SubmitApproval, None)
            .expect_err("superusers cannot approve");
        assert_eq!(
            error,
            DomainError::Forbidden("only managers and directors can approve requests".to_string())
        );

        authorize(&superuser, Operation::ViewOwnRequests, Some(UserId(2)))
            .expect("owner may view own request");
        assert!(authorize(&superuser, Operation::ViewOwnRequests, Some(UserId(3))).is_err());
    }
}
