pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notifications;
pub mod policy;
pub mod requests;
pub mod store;

pub use approvals::{ApprovalInput, ApprovalWorkflowService};
pub use domain::approval::{Approval, ApprovalDetail, ApprovalId, Decision};
pub use domain::request::{
    NewProcurementRequest, ProcurementRequest, RequestDetail, RequestId, RequestStatus,
};
pub use domain::user::{Identity, Role, User, UserId};
pub use domain::vendor::{Vendor, VendorId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notifications::{NotificationDispatcher, NotificationEvent, Notifier};
pub use requests::RequestLifecycleService;
pub use store::{InMemoryStore, StoreError, Stores};
