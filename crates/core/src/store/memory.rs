use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::approval::{Approval, ApprovalId, NewApproval};
use crate::domain::request::{
    ProcurementRequest, RequestDraft, RequestFilter, RequestId, RequestStatus,
};
use crate::domain::user::{Role, User, UserId};
use crate::domain::vendor::{Vendor, VendorId};

use super::{ApprovalStore, RequestStore, Resolution, StoreError, UserDirectory, VendorStore};

#[derive(Default)]
struct MemoryState {
    requests: BTreeMap<i64, ProcurementRequest>,
    approvals: Vec<Approval>,
    users: HashMap<i64, User>,
    vendors: HashMap<i64, Vendor>,
    last_request_id: i64,
    last_approval_id: i64,
}

/// All four stores behind a single lock, so `resolve` is atomic with respect to every reader.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub async fn put_user(&self, user: User) {
        self.state.write().await.users.insert(user.id.0, user);
    }

    pub async fn put_vendor(&self, vendor: Vendor) {
        self.state.write().await.vendors.insert(vendor.id.0, vendor);
    }

    pub async fn approval_count(&self, request_id: RequestId) -> usize {
        let state = self.state.read().await;
        state.approvals.iter().filter(|approval| approval.request_id == request_id).count()
    }
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn insert(&self, draft: RequestDraft) -> Result<ProcurementRequest, StoreError> {
        let mut state = self.state.write().await;
        state.last_request_id += 1;
        let request = ProcurementRequest {
            id: RequestId(state.last_request_id),
            requestor_id: draft.requestor_id,
            item_name: draft.item_name,
            description: draft.description,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            total_cost: draft.total_cost,
            justification: draft.justification,
            vendor_id: draft.vendor_id,
            status: RequestStatus::Pending,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        state.requests.insert(request.id.0, request.clone());
        Ok(request)
    }

    async fn find_by_id(&self, id: RequestId) -> Result<Option<ProcurementRequest>, StoreError> {
        Ok(self.state.read().await.requests.get(&id.0).cloned())
    }

    async fn find(&self, filter: &RequestFilter) -> Result<Vec<ProcurementRequest>, StoreError> {
        let state = self.state.read().await;
        let mut requests: Vec<ProcurementRequest> =
            state.requests.values().filter(|request| filter.matches(request)).cloned().collect();
        requests.sort_by_key(|request| Reverse((request.created_at, request.id)));
        Ok(requests)
    }

    async fn overwrite_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<ProcurementRequest>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.requests.get_mut(&id.0).map(|request| {
            request.status = status;
            request.updated_at = updated_at;
            request.clone()
        }))
    }
}

#[async_trait]
impl ApprovalStore for InMemoryStore {
    async fn resolve(&self, approval: NewApproval) -> Result<Resolution, StoreError> {
        let mut state = self.state.write().await;

        let request = match state.requests.get_mut(&approval.request_id.0) {
            None => return Ok(Resolution::NotFound),
            Some(request) if request.status.is_terminal() => {
                return Ok(Resolution::AlreadyProcessed(request.status));
            }
            Some(request) => {
                request.status = approval.decision.into();
                request.updated_at = approval.approved_at;
                request.clone()
            }
        };

        state.last_approval_id += 1;
        let approval = Approval {
            id: ApprovalId(state.last_approval_id),
            request_id: approval.request_id,
            approver_id: approval.approver_id,
            decision: approval.decision,
            comments: approval.comments,
            approved_at: approval.approved_at,
        };
        state.approvals.push(approval.clone());

        Ok(Resolution::Resolved { request, approval })
    }

    async fn list_for_request(&self, request_id: RequestId) -> Result<Vec<Approval>, StoreError> {
        let state = self.state.read().await;
        let mut approvals: Vec<Approval> = state
            .approvals
            .iter()
            .filter(|approval| approval.request_id == request_id)
            .cloned()
            .collect();
        approvals.sort_by_key(|approval| Reverse((approval.approved_at, approval.id)));
        Ok(approvals)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id.0).cloned())
    }

    async fn find_by_roles(&self, roles: &[Role]) -> Result<Vec<User>, StoreError> {
        let state = self.state.read().await;
        let mut users: Vec<User> =
            state.users.values().filter(|user| roles.contains(&user.role)).cloned().collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }
}

#[async_trait]
impl VendorStore for InMemoryStore {
    async fn find_by_id(&self, id: VendorId) -> Result<Option<Vendor>, StoreError> {
        Ok(self.state.read().await.vendors.get(&id.0).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::approval::{Decision, NewApproval};
    use crate::domain::request::{RequestDraft, RequestFilter, RequestId, RequestStatus};
    use crate::domain::user::{Role, User, UserId};
    use crate::store::{ApprovalStore, InMemoryStore, RequestStore, Resolution, UserDirectory};

    fn draft(requestor: i64, created_offset_secs: i64) -> RequestDraft {
        RequestDraft {
            requestor_id: UserId(requestor),
            item_name: "Monitor".to_string(),
            description: String::new(),
            quantity: 1,
            unit_price: Decimal::new(25_000, 2),
            total_cost: Decimal::new(25_000, 2),
            justification: String::new(),
            vendor_id: None,
            created_at: Utc::now() + Duration::seconds(created_offset_secs),
        }
    }

    fn decision(request_id: RequestId, decision: Decision) -> NewApproval {
        NewApproval {
            request_id,
            approver_id: UserId(3),
            decision,
            comments: None,
            approved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn find_orders_newest_first_and_breaks_ties_by_id() {
        let store = InMemoryStore::default();
        let now = Utc::now();
        let mut tied = draft(1, 0);
        tied.created_at = now;
        let first = store.insert(tied.clone()).await.expect("insert");
        let second = store.insert(tied).await.expect("insert");
        let older = store.insert(draft(1, -60)).await.expect("insert");

        let found = store.find(&RequestFilter::default()).await.expect("find");
        let ids: Vec<RequestId> = found.iter().map(|request| request.id).collect();
        assert_eq!(ids, vec![second.id, first.id, older.id]);
    }

    #[tokio::test]
    async fn find_applies_requestor_and_status_filters() {
        let store = InMemoryStore::default();
        let mine = store.insert(draft(1, 0)).await.expect("insert");
        store.insert(draft(2, 0)).await.expect("insert");
        store.resolve(decision(mine.id, Decision::Rejected)).await.expect("resolve");

        let filter =
            RequestFilter { requestor_id: Some(UserId(1)), status: Some(RequestStatus::Rejected) };
        let found = store.find(&filter).await.expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, mine.id);

        let pending_only = RequestFilter { status: Some(RequestStatus::Pending), ..filter };
        assert!(store.find(&pending_only).await.expect("find").is_empty());
    }

    #[tokio::test]
    async fn resolve_closes_pending_requests_once() {
        let store = InMemoryStore::default();
        let request = store.insert(draft(1, 0)).await.expect("insert");

        let first = store.resolve(decision(request.id, Decision::Approved)).await.expect("first");
        assert!(matches!(
            first,
            Resolution::Resolved { ref request, .. } if request.status == RequestStatus::Approved
        ));

        let second = store.resolve(decision(request.id, Decision::Rejected)).await.expect("second");
        assert_eq!(second, Resolution::AlreadyProcessed(RequestStatus::Approved));
        assert_eq!(store.approval_count(request.id).await, 1);

        let missing = store.resolve(decision(RequestId(404), Decision::Approved)).await;
        assert_eq!(missing.expect("missing"), Resolution::NotFound);
    }

    #[tokio::test]
    async fn find_by_roles_returns_only_matching_users() {
        let store = InMemoryStore::default();
        for (id, role) in [(1, Role::User), (2, Role::Manager), (3, Role::Director)] {
            store
                .put_user(User {
                    id: UserId(id),
                    username: format!("u{id}"),
                    full_name: format!("User {id}"),
                    email: None,
                    role,
                })
                .await;
        }

        let approvers = store.find_by_roles(&Role::APPROVERS).await.expect("approvers");
        let ids: Vec<i64> = approvers.iter().map(|user| user.id.0).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
