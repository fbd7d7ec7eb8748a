//! Request lifecycle: creation, visibility-filtered retrieval and the administrative status
//! override.

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::approval::ApprovalDetail;
use crate::domain::request::{
    NewProcurementRequest, ProcurementRequest, RequestDetail, RequestFilter, RequestId,
    RequestStatus,
};
use crate::domain::user::Identity;
use crate::errors::{ApplicationError, DomainError};
use crate::notifications::{NotificationDispatcher, NotificationEvent};
use crate::policy::{self, Operation};
use crate::store::{StoreError, Stores};

#[derive(Clone)]
pub struct RequestLifecycleService {
    stores: Stores,
    notifications: NotificationDispatcher,
}

impl RequestLifecycleService {
    pub fn new(stores: Stores, notifications: NotificationDispatcher) -> Self {
        Self { stores, notifications }
    }

    pub async fn create_request(
        &self,
        caller: &Identity,
        input: NewProcurementRequest,
    ) -> Result<RequestDetail, ApplicationError> {
        policy::authorize(caller, Operation::CreateRequest, None)?;
        let draft = input.into_draft(caller.user_id, Utc::now())?;

        if let Some(vendor_id) = draft.vendor_id {
            if self.stores.vendors.find_by_id(vendor_id).await?.is_none() {
                return Err(DomainError::Validation(format!(
                    "vendor {} does not exist",
                    vendor_id.0
                ))
                .into());
            }
        }

        let request = self.stores.requests.insert(draft).await?;
        info!(
            event_name = "procurement.request.created",
            request_id = %request.id,
            requestor_id = %request.requestor_id,
            total_cost = %request.total_cost,
            "procurement request created"
        );

        self.notifications.publish(NotificationEvent::RequestCreated { request: request.clone() });

        // The request is committed; a failed lookup only costs the enrichment.
        match describe(&self.stores, request.clone()).await {
            Ok(detail) => Ok(detail),
            Err(error) => {
                warn!(
                    event_name = "procurement.request.enrichment_failed",
                    request_id = %request.id,
                    error = %error,
                    "request enrichment failed after creation"
                );
                Ok(RequestDetail { request, requestor: None, vendor: None, approvals: Vec::new() })
            }
        }
    }

    /// Requests visible to the caller, newest first. Users and superusers only see their own.
    pub async fn list_requests(
        &self,
        caller: &Identity,
        status: Option<RequestStatus>,
    ) -> Result<Vec<RequestDetail>, ApplicationError> {
        let filter = RequestFilter { requestor_id: policy::listing_scope(caller), status };
        let requests = self.stores.requests.find(&filter).await?;

        let mut details = Vec::with_capacity(requests.len());
        for request in requests {
            details.push(describe(&self.stores, request).await?);
        }
        Ok(details)
    }

    pub async fn get_request(
        &self,
        id: RequestId,
        caller: &Identity,
    ) -> Result<RequestDetail, ApplicationError> {
        let request = self
            .stores
            .requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::request_not_found(id))?;

        policy::authorize(caller, Operation::ViewOwnRequests, Some(request.requestor_id))?;

        Ok(describe(&self.stores, request).await?)
    }

    /// Overwrites a request's status with no transition guard and no role check.
    ///
    /// This is an administrative correction path, not part of the approval workflow: it records
    /// no approval and sends no notice. Any authenticated caller may use it; whether it should be
    /// restricted is an open product question, so every call is logged at warn level.
    pub async fn force_set_status(
        &self,
        id: RequestId,
        caller: &Identity,
        status: RequestStatus,
    ) -> Result<ProcurementRequest, ApplicationError> {
        policy::authorize(caller, Operation::ForceSetStatus, None)?;

        let request = self
            .stores
            .requests
            .overwrite_status(id, status, Utc::now())
            .await?
            .ok_or_else(|| DomainError::request_not_found(id))?;

        warn!(
            event_name = "procurement.request.status_forced",
            request_id = %id,
            actor_id = %caller.user_id,
            actor_role = %caller.role,
            status = %status,
            "request status overwritten outside the approval workflow"
        );

        Ok(request)
    }
}

/// Attaches requestor, vendor and approval history to a request.
pub(crate) async fn describe(
    stores: &Stores,
    request: ProcurementRequest,
) -> Result<RequestDetail, StoreError> {
    let requestor = stores.users.find_by_id(request.requestor_id).await?;
    let vendor = match request.vendor_id {
        Some(vendor_id) => stores.vendors.find_by_id(vendor_id).await?,
        None => None,
    };
    let approvals = approval_history(stores, request.id).await?;

    Ok(RequestDetail { request, requestor, vendor, approvals })
}

pub(crate) async fn approval_history(
    stores: &Stores,
    request_id: RequestId,
) -> Result<Vec<ApprovalDetail>, StoreError> {
    let approvals = stores.approvals.list_for_request(request_id).await?;

    let mut history = Vec::with_capacity(approvals.len());
    for approval in approvals {
        let approver = stores.users.find_by_id(approval.approver_id).await?;
        history.push(ApprovalDetail { approval, approver });
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::RequestLifecycleService;
    use crate::approvals::{ApprovalInput, ApprovalWorkflowService};
    use crate::domain::approval::Decision;
    use crate::domain::request::{NewProcurementRequest, RequestId, RequestStatus};
    use crate::domain::user::{Identity, Role, User, UserId};
    use crate::domain::vendor::{Vendor, VendorId};
    use crate::errors::{ApplicationError, DomainError};
    use crate::notifications::{DispatchSettings, NotificationDispatcher, RecordingNotifier};
    use crate::store::test_support::UnavailableDirectory;
    use crate::store::{InMemoryStore, Stores};

    const USER: Identity = Identity { user_id: UserId(1), role: Role::User };
    const OTHER_USER: Identity = Identity { user_id: UserId(5), role: Role::User };
    const SUPERUSER: Identity = Identity { user_id: UserId(2), role: Role::Superuser };
    const MANAGER: Identity = Identity { user_id: UserId(3), role: Role::Manager };

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::default());
        for (id, username, role) in [
            (1, "user", Role::User),
            (2, "superuser", Role::Superuser),
            (3, "manager", Role::Manager),
            (4, "director", Role::Director),
        ] {
            store
                .put_user(User {
                    id: UserId(id),
                    username: username.to_string(),
                    full_name: format!("{username} account"),
                    email: Some(format!("{username}@procurement.com")),
                    role,
                })
                .await;
        }
        store
            .put_vendor(Vendor {
                id: VendorId(1),
                name: "Tech Supplies Co".to_string(),
                category: "IT".to_string(),
                email: None,
            })
            .await;
        store
    }

    fn service(store: &Arc<InMemoryStore>) -> RequestLifecycleService {
        let stores = Stores::shared(store.clone());
        RequestLifecycleService::new(stores, NotificationDispatcher::disabled())
    }

    fn input(item: &str, quantity: i64, unit_price: &str) -> NewProcurementRequest {
        NewProcurementRequest {
            item_name: item.to_string(),
            description: Some("for the new hires".to_string()),
            quantity,
            unit_price: Decimal::from_str(unit_price).expect("decimal"),
            justification: Some("headcount growth".to_string()),
            vendor_id: None,
        }
    }

    #[tokio::test]
    async fn create_request_starts_pending_with_derived_total() {
        let store = seeded_store().await;
        let created = service(&store)
            .create_request(&USER, input("Laptop", 2, "1500.00"))
            .await
            .expect("create");

        assert_eq!(created.request.status, RequestStatus::Pending);
        assert_eq!(created.request.total_cost, Decimal::new(300_000, 2));
        assert_eq!(created.request.requestor_id, USER.user_id);
        assert_eq!(created.requestor.as_ref().map(|user| user.username.as_str()), Some("user"));
        assert!(created.approvals.is_empty());
    }

    #[tokio::test]
    async fn create_request_rejects_invalid_input_and_unknown_vendor() {
        let store = seeded_store().await;
        let service = service(&store);

        let error = service.create_request(&USER, input("Laptop", 0, "10")).await.expect_err("qty");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Validation(_))));

        let error = service.create_request(&USER, input("", 1, "10")).await.expect_err("name");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Validation(_))));

        let mut with_vendor = input("Laptop", 1, "10");
        with_vendor.vendor_id = Some(VendorId(42));
        let error = service.create_request(&USER, with_vendor).await.expect_err("vendor");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::Validation("vendor 42 does not exist".into()))
        );

        assert!(service.list_requests(&MANAGER, None).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn create_request_attaches_known_vendor() {
        let store = seeded_store().await;
        let mut with_vendor = input("Keyboard", 4, "49.50");
        with_vendor.vendor_id = Some(VendorId(1));

        let created = service(&store).create_request(&USER, with_vendor).await.expect("create");
        assert_eq!(created.vendor.map(|vendor| vendor.name), Some("Tech Supplies Co".to_string()));
        assert_eq!(created.request.total_cost, Decimal::new(19_800, 2));
    }

    #[tokio::test]
    async fn listing_is_filtered_by_ownership_for_users_and_superusers() {
        let store = seeded_store().await;
        let service = service(&store);
        service.create_request(&USER, input("Laptop", 1, "900")).await.expect("create");
        service.create_request(&OTHER_USER, input("Chair", 1, "120")).await.expect("create");
        service.create_request(&SUPERUSER, input("Server", 1, "5000")).await.expect("create");

        let mine = service.list_requests(&USER, None).await.expect("list");
        assert_eq!(mine.len(), 1);
        assert!(mine.iter().all(|detail| detail.request.requestor_id == USER.user_id));

        let superuser_view = service.list_requests(&SUPERUSER, None).await.expect("list");
        assert_eq!(superuser_view.len(), 1);
        assert_eq!(superuser_view[0].request.item_name, "Server");

        let everything = service.list_requests(&MANAGER, None).await.expect("list");
        assert_eq!(everything.len(), 3);
        let items: Vec<&str> =
            everything.iter().map(|detail| detail.request.item_name.as_str()).collect();
        assert_eq!(items, vec!["Server", "Chair", "Laptop"], "newest first");
    }

    #[tokio::test]
    async fn listing_narrows_by_status_and_includes_approval_history() {
        let store = seeded_store().await;
        let lifecycle = service(&store);
        let approvals = ApprovalWorkflowService::new(
            Stores::shared(store.clone()),
            NotificationDispatcher::disabled(),
        );

        let closed =
            lifecycle.create_request(&USER, input("Laptop", 1, "900")).await.expect("create");
        lifecycle.create_request(&USER, input("Mouse", 1, "25")).await.expect("create");
        approvals
            .submit_approval(
                closed.request.id,
                &MANAGER,
                ApprovalInput { decision: Decision::Approved, comments: Some("go".to_string()) },
            )
            .await
            .expect("approve");

        let approved =
            lifecycle.list_requests(&USER, Some(RequestStatus::Approved)).await.expect("list");
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].request.id, closed.request.id);
        assert_eq!(approved[0].approvals.len(), 1);
        assert_eq!(
            approved[0].approvals[0].approver.as_ref().map(|user| user.id),
            Some(MANAGER.user_id)
        );

        let pending =
            lifecycle.list_requests(&MANAGER, Some(RequestStatus::Pending)).await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request.item_name, "Mouse");
    }

    #[tokio::test]
    async fn get_request_enforces_existence_then_ownership() {
        let store = seeded_store().await;
        let service = service(&store);
        let created =
            service.create_request(&USER, input("Laptop", 1, "900")).await.expect("create");
        let id = created.request.id;

        assert_eq!(service.get_request(id, &USER).await.expect("owner").request.id, id);
        assert_eq!(service.get_request(id, &MANAGER).await.expect("manager").request.id, id);

        let error = service.get_request(id, &OTHER_USER).await.expect_err("other user");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Forbidden(_))));
        let error = service.get_request(id, &SUPERUSER).await.expect_err("superuser");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Forbidden(_))));

        let error = service.get_request(RequestId(999), &MANAGER).await.expect_err("missing");
        assert_eq!(error, ApplicationError::Domain(DomainError::request_not_found(RequestId(999))));
    }

    #[tokio::test]
    async fn force_set_status_overwrites_without_recording_an_approval() {
        let store = seeded_store().await;
        let service = service(&store);
        let created =
            service.create_request(&USER, input("Laptop", 1, "900")).await.expect("create");
        let id = created.request.id;

        let rejected =
            service.force_set_status(id, &USER, RequestStatus::Rejected).await.expect("force");
        assert_eq!(rejected.status, RequestStatus::Rejected);

        let reopened =
            service.force_set_status(id, &USER, RequestStatus::Pending).await.expect("force");
        assert_eq!(reopened.status, RequestStatus::Pending);
        assert_eq!(store.approval_count(id).await, 0);

        let error = service
            .force_set_status(RequestId(77), &USER, RequestStatus::Approved)
            .await
            .expect_err("missing");
        assert!(matches!(error, ApplicationError::Domain(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn create_request_notifies_requestor_and_approvers_in_background() {
        let store = seeded_store().await;
        let notifier = RecordingNotifier::default();
        let (dispatcher, worker) = NotificationDispatcher::spawn(
            store.clone(),
            Arc::new(notifier.clone()),
            DispatchSettings::default(),
        )
        .expect("dispatcher");
        let service = RequestLifecycleService::new(Stores::shared(store.clone()), dispatcher);

        service.create_request(&USER, input("Laptop", 2, "1500.00")).await.expect("create");
        drop(service);
        worker.join().await;

        let notices = notifier.notices();
        let subjects: Vec<(&str, &str)> = notices
            .iter()
            .map(|notice| (notice.recipient.as_str(), notice.subject.as_str()))
            .collect();
        assert_eq!(subjects.len(), 3);
        assert!(subjects.contains(&("user@procurement.com", "New Procurement Request: Laptop")));
        assert!(subjects.contains(&(
            "manager@procurement.com",
            "Action Required: Approve Procurement Request - Laptop"
        )));
        assert!(subjects.contains(&(
            "director@procurement.com",
            "Action Required: Approve Procurement Request - Laptop"
        )));
    }

    #[tokio::test]
    async fn failing_transport_never_fails_creation() {
        let store = seeded_store().await;
        let notifier = RecordingNotifier::failing_for("user@procurement.com");
        let (dispatcher, worker) = NotificationDispatcher::spawn(
            store.clone(),
            Arc::new(notifier.clone()),
            DispatchSettings::default(),
        )
        .expect("dispatcher");
        let service = RequestLifecycleService::new(Stores::shared(store.clone()), dispatcher);

        let created = service.create_request(&USER, input("Laptop", 1, "900")).await;
        assert!(created.is_ok());
        drop(service);
        worker.join().await;

        assert_eq!(notifier.notices().len(), 2, "approver notices still delivered");
    }

    #[tokio::test]
    async fn committed_request_is_returned_despite_a_directory_outage() {
        let store = seeded_store().await;
        let degraded = RequestLifecycleService::new(
            Stores { users: Arc::new(UnavailableDirectory), ..Stores::shared(store.clone()) },
            NotificationDispatcher::disabled(),
        );

        let created = degraded
            .create_request(&USER, input("Laptop", 2, "1500.00"))
            .await
            .expect("creation is reported once committed");
        assert_eq!(created.request.status, RequestStatus::Pending);
        assert_eq!(created.requestor, None);
        assert!(created.approvals.is_empty());

        let listed = service(&store).list_requests(&MANAGER, None).await.expect("list");
        assert_eq!(listed.len(), 1, "exactly one request was stored");

        let error = degraded.list_requests(&MANAGER, None).await.expect_err("reads still fail");
        assert!(matches!(error, ApplicationError::Persistence(_)));
    }
}
