//! Persistence seams consumed by the workflow services.
//!
//! `procura-db` provides the SQLite implementations; [`memory::InMemoryStore`] backs unit tests
//! and local runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::approval::{Approval, NewApproval};
use crate::domain::request::{
    ProcurementRequest, RequestDraft, RequestFilter, RequestId, RequestStatus,
};
use crate::domain::user::{Role, User, UserId};
use crate::domain::vendor::{Vendor, VendorId};

pub mod memory;

pub use memory::InMemoryStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Outcome of the atomic pending -> terminal transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved { request: ProcurementRequest, approval: Approval },
    NotFound,
    AlreadyProcessed(RequestStatus),
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, draft: RequestDraft) -> Result<ProcurementRequest, StoreError>;

    async fn find_by_id(&self, id: RequestId) -> Result<Option<ProcurementRequest>, StoreError>;

    /// Matching requests, newest `created_at` first with ties broken by descending id.
    async fn find(&self, filter: &RequestFilter) -> Result<Vec<ProcurementRequest>, StoreError>;

    /// Writes `status` without any transition guard. Returns `None` when the id is unknown.
    async fn overwrite_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<ProcurementRequest>, StoreError>;
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Moves the request from `pending` to the decision's status and appends the approval, as a
    /// single atomic unit. Exactly one concurrent caller per request observes `Resolved`.
    async fn resolve(&self, approval: NewApproval) -> Result<Resolution, StoreError>;

    /// Approvals for a request, newest `approved_at` first with ties broken by descending id.
    async fn list_for_request(&self, request_id: RequestId) -> Result<Vec<Approval>, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_roles(&self, roles: &[Role]) -> Result<Vec<User>, StoreError>;
}

#[async_trait]
pub trait VendorStore: Send + Sync {
    async fn find_by_id(&self, id: VendorId) -> Result<Option<Vendor>, StoreError>;
}

/// The set of stores a service is wired with.
#[derive(Clone)]
pub struct Stores {
    pub requests: Arc<dyn RequestStore>,
    pub approvals: Arc<dyn ApprovalStore>,
    pub users: Arc<dyn UserDirectory>,
    pub vendors: Arc<dyn VendorStore>,
}

impl Stores {
    /// Wires every seam to one backing value that implements all of them.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: RequestStore + ApprovalStore + UserDirectory + VendorStore + 'static,
    {
        Self {
            requests: store.clone(),
            approvals: store.clone(),
            users: store.clone(),
            vendors: store,
        }
    }
}
