//! Approval workflow: the only path that moves a request out of `pending` in normal operation.
//!
//! ```text
//! pending --approved--> approved
//! pending --rejected--> rejected
//! ```
//!
//! Both targets are terminal. The check and the write happen inside
//! [`ApprovalStore::resolve`](crate::store::ApprovalStore::resolve), so concurrent submissions
//! against one request produce exactly one approval.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::approval::{ApprovalDetail, Decision, NewApproval};
use crate::domain::request::RequestId;
use crate::domain::user::Identity;
use crate::errors::{ApplicationError, DomainError};
use crate::notifications::{NotificationDispatcher, NotificationEvent};
use crate::policy::{self, Operation};
use crate::requests::approval_history;
use crate::store::{Resolution, Stores};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalInput {
    #[serde(rename = "status")]
    pub decision: Decision,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Clone)]
pub struct ApprovalWorkflowService {
    stores: Stores,
    notifications: NotificationDispatcher,
}

impl ApprovalWorkflowService {
    pub fn new(stores: Stores, notifications: NotificationDispatcher) -> Self {
        Self { stores, notifications }
    }

    pub async fn submit_approval(
        &self,
        request_id: RequestId,
        approver: &Identity,
        input: ApprovalInput,
    ) -> Result<ApprovalDetail, ApplicationError> {
        policy::authorize(approver, Operation::SubmitApproval, None)?;

        let comments = input
            .comments
            .map(|comments| comments.trim().to_string())
            .filter(|comments| !comments.is_empty());
        let resolution = self
            .stores
            .approvals
            .resolve(NewApproval {
                request_id,
                approver_id: approver.user_id,
                decision: input.decision,
                comments,
                approved_at: Utc::now(),
            })
            .await?;

        let (request, approval) = match resolution {
            Resolution::Resolved { request, approval } => (request, approval),
            Resolution::NotFound => return Err(DomainError::request_not_found(request_id).into()),
            Resolution::AlreadyProcessed(status) => {
                info!(
                    event_name = "procurement.approval.conflict",
                    request_id = %request_id,
                    actor_id = %approver.user_id,
                    status = %status,
                    "approval rejected; request already processed"
                );
                return Err(DomainError::Conflict { request_id, status }.into());
            }
        };

        info!(
            event_name = "procurement.request.resolved",
            request_id = %request.id,
            approval_id = %approval.id,
            actor_id = %approver.user_id,
            actor_role = %approver.role,
            status = %request.status,
            "procurement request resolved"
        );

        self.notifications.publish(NotificationEvent::RequestResolved {
            request,
            approval: approval.clone(),
            approver_role: approver.role,
        });

        // The approval is committed; a directory failure only costs the enrichment.
        let approver = match self.stores.users.find_by_id(approval.approver_id).await {
            Ok(approver) => approver,
            Err(error) => {
                warn!(
                    event_name = "procurement.approval.enrichment_failed",
                    approval_id = %approval.id,
                    error = %error,
                    "approver lookup failed after resolution"
                );
                None
            }
        };
        Ok(ApprovalDetail { approval, approver })
    }

    /// Approval history for a request, most recent first. Unknown ids yield an empty list.
    pub async fn list_approvals(
        &self,
        request_id: RequestId,
        caller: &Identity,
    ) -> Result<Vec<ApprovalDetail>, ApplicationError> {
        policy::authorize(caller, Operation::ListApprovals, None)?;
        Ok(approval_history(&self.stores, request_id).await?)
    }
}
