use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::domain::approval::Approval;
use crate::domain::request::ProcurementRequest;
use crate::domain::user::{Role, User, UserId};
use crate::store::UserDirectory;

use super::{DispatchError, Notice, NoticeRenderer, Notifier};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationEvent {
    RequestCreated { request: ProcurementRequest },
    RequestResolved { request: ProcurementRequest, approval: Approval, approver_role: Role },
}

impl NotificationEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::RequestCreated { .. } => "request_created",
            Self::RequestResolved { .. } => "request_resolved",
        }
    }

    fn request(&self) -> &ProcurementRequest {
        match self {
            Self::RequestCreated { request } | Self::RequestResolved { request, .. } => request,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    pub queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

/// Snapshot of the notification queue, as reported by the health endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueStatus {
    Disabled,
    Running { queued: usize, capacity: usize },
    /// The worker exited while publishers were still alive.
    Stopped,
}

/// Publishing handle for lifecycle notifications. Cloning shares the same queue.
///
/// `publish` never waits: a full or closed queue drops the event with a warning.
#[derive(Clone, Debug)]
pub struct NotificationDispatcher {
    sender: Option<mpsc::Sender<NotificationEvent>>,
}

impl NotificationDispatcher {
    /// Starts the background worker on the current tokio runtime.
    pub fn spawn(
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        settings: DispatchSettings,
    ) -> Result<(Self, DispatchWorker), DispatchError> {
        let renderer = NoticeRenderer::new()?;
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let worker = Worker { users, notifier, renderer };
        let handle = tokio::spawn(worker.run(receiver));

        Ok((Self { sender: Some(sender) }, DispatchWorker { handle }))
    }

    /// A dispatcher that discards every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn status(&self) -> QueueStatus {
        match &self.sender {
            None => QueueStatus::Disabled,
            Some(sender) if sender.is_closed() => QueueStatus::Stopped,
            Some(sender) => QueueStatus::Running {
                queued: sender.max_capacity() - sender.capacity(),
                capacity: sender.max_capacity(),
            },
        }
    }

    pub fn publish(&self, event: NotificationEvent) {
        let Some(sender) = &self.sender else {
            debug!(
                event_name = "notification.disabled",
                notification = event.name(),
                request_id = %event.request().id,
                "notifications disabled; event discarded"
            );
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!(
                event_name = "notification.dropped",
                notification = event.name(),
                request_id = %event.request().id,
                reason = "queue_full",
                "notification queue full; event dropped"
            ),
            Err(TrySendError::Closed(event)) => warn!(
                event_name = "notification.dropped",
                notification = event.name(),
                request_id = %event.request().id,
                reason = "worker_stopped",
                "notification worker stopped; event dropped"
            ),
        }
    }
}

/// Handle on the background worker. The worker exits once every dispatcher clone is dropped
/// and the queue has drained.
pub struct DispatchWorker {
    handle: JoinHandle<()>,
}

impl DispatchWorker {
    pub async fn join(self) {
        if let Err(error) = self.handle.await {
            warn!(
                event_name = "notification.worker_failed",
                error = %error,
                "notification worker terminated abnormally"
            );
        }
    }
}

struct Worker {
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    renderer: NoticeRenderer,
}

impl Worker {
    /// Events are handled one at a time; the notices of one event are delivered concurrently,
    /// so a slow transport costs at most one notifier timeout per event.
    async fn run(self, mut receiver: mpsc::Receiver<NotificationEvent>) {
        while let Some(event) = receiver.recv().await {
            let name = event.name();
            let request_id = event.request().id;
            match self.notices_for(&event).await {
                Ok(notices) => self.deliver_all(name, notices).await,
                Err(error) => warn!(
                    event_name = "notification.failed",
                    notification = name,
                    request_id = %request_id,
                    error = %error,
                    "could not prepare notifications"
                ),
            }
        }
        debug!(event_name = "notification.worker_stopped", "notification queue closed");
    }

    async fn deliver_all(&self, name: &'static str, notices: Vec<Notice>) {
        let mut deliveries = JoinSet::new();
        for notice in notices {
            let notifier = Arc::clone(&self.notifier);
            deliveries.spawn(async move {
                let outcome = notifier.notify(&notice).await;
                (notice, outcome)
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((notice, Ok(()))) => debug!(
                    event_name = "notification.delivered",
                    notification = name,
                    recipient = %notice.recipient,
                    "notification delivered"
                ),
                Ok((notice, Err(error))) => warn!(
                    event_name = "notification.failed",
                    notification = name,
                    recipient = %notice.recipient,
                    error = %error,
                    "notification delivery failed"
                ),
                Err(error) => warn!(
                    event_name = "notification.failed",
                    notification = name,
                    error = %error,
                    "notification delivery task aborted"
                ),
            }
        }
    }

    async fn notices_for(&self, event: &NotificationEvent) -> Result<Vec<Notice>, DispatchError> {
        let request = event.request();
        let requestor = self.lookup(request.requestor_id).await?;
        if requestor.is_none() {
            debug!(
                event_name = "notification.requestor_unknown",
                request_id = %request.id,
                requestor_id = %request.requestor_id,
                "requestor not in directory; requestor notices skipped"
            );
        }
        let requestor_address = requestor.as_ref().and_then(address_of);

        let mut notices = Vec::new();
        match event {
            NotificationEvent::RequestCreated { request } => {
                if let (Some(user), Some(address)) = (&requestor, requestor_address) {
                    notices.push(self.renderer.request_created(request, user, address)?);
                }

                let approvers = self
                    .users
                    .find_by_roles(&Role::APPROVERS)
                    .await
                    .map_err(|error| DispatchError::Directory(error.to_string()))?;
                for approver in &approvers {
                    if let Some(address) = address_of(approver) {
                        notices.push(self.renderer.approver_alert(
                            request,
                            requestor.as_ref(),
                            address,
                        )?);
                    }
                }
            }
            NotificationEvent::RequestResolved { request, approval, approver_role } => {
                if let Some(address) = requestor_address {
                    let reviewer = self.lookup(approval.approver_id).await?;
                    notices.push(self.renderer.decision(
                        request,
                        approval,
                        reviewer.as_ref(),
                        *approver_role,
                        address,
                    )?);
                }
            }
        }
        Ok(notices)
    }

    async fn lookup(&self, id: UserId) -> Result<Option<User>, DispatchError> {
        self.users.find_by_id(id).await.map_err(|error| DispatchError::Directory(error.to_string()))
    }
}

fn address_of(user: &User) -> Option<&str> {
    user.email.as_deref().map(str::trim).filter(|email| !email.is_empty())
}
