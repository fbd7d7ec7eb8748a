use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};

use crate::domain::approval::Approval;
use crate::domain::request::ProcurementRequest;
use crate::domain::user::{Role, User};

use super::{DispatchError, Notice};

const REQUEST_CREATED: &str = "request_created.txt";
const APPROVER_ALERT: &str = "approver_alert.txt";
const DECISION: &str = "decision.txt";

const REQUEST_CREATED_BODY: &str = "\
New Procurement Request Created

A new procurement request has been submitted and requires approval.

Request Details:
  Item:        {{ item_name }}
  Requestor:   {{ requestor_name }} ({{ requestor_role }})
  Quantity:    {{ quantity }}
  Unit Price:  {{ unit_price }}
  Total Cost:  {{ total_cost }}
  Status:      {{ status }}

Justification: {{ justification }}

Please review and process this request at your earliest convenience.
";

const APPROVER_ALERT_BODY: &str = "\
New Procurement Request Awaiting Your Approval

A procurement request has been submitted and requires your review.

Request Details:
  Item:        {{ item_name }}
  Requestor:   {{ requestor_name }} ({{ requestor_role }})
  Quantity:    {{ quantity }}
  Total Cost:  {{ total_cost }}

Justification: {{ justification }}

Please log in to the procurement system to review and process this request.
";

const DECISION_BODY: &str = "\
Your Procurement Request Has Been {{ decision }}

Your procurement request has been reviewed and {{ decision | lower }}.

Request Details:
  Item:        {{ item_name }}
  Total Cost:  {{ total_cost }}
  Status:      {{ decision }}

Approval Details:
  Reviewed By: {{ reviewer_name }} ({{ reviewer_role }})
  Comments:    {% if comments %}{{ comments }}{% else %}-{% endif %}

Thank you for using the procurement system.
";

#[derive(Serialize)]
struct RequestSummary<'a> {
    item_name: &'a str,
    requestor_name: String,
    requestor_role: &'static str,
    quantity: u32,
    unit_price: String,
    total_cost: String,
    status: &'static str,
    justification: &'a str,
}

impl<'a> RequestSummary<'a> {
    /// Requestors missing from the directory are shown as `User #<id>` with role `unknown`.
    fn new(request: &'a ProcurementRequest, requestor: Option<&User>) -> Self {
        let (requestor_name, requestor_role) = match requestor {
            Some(user) => (user.full_name.clone(), user.role.as_str()),
            None => (format!("User #{}", request.requestor_id), "unknown"),
        };
        Self {
            item_name: &request.item_name,
            requestor_name,
            requestor_role,
            quantity: request.quantity,
            unit_price: money(request.unit_price),
            total_cost: money(request.total_cost),
            status: request.status.as_str(),
            justification: &request.justification,
        }
    }
}

fn money(amount: Decimal) -> String {
    format!("{amount:.2}")
}

/// Renders the human-readable notices sent on lifecycle events.
pub struct NoticeRenderer {
    tera: Tera,
}

impl NoticeRenderer {
    pub fn new() -> Result<Self, DispatchError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (REQUEST_CREATED, REQUEST_CREATED_BODY),
            (APPROVER_ALERT, APPROVER_ALERT_BODY),
            (DECISION, DECISION_BODY),
        ])?;
        Ok(Self { tera })
    }

    pub fn request_created(
        &self,
        request: &ProcurementRequest,
        requestor: &User,
        recipient: &str,
    ) -> Result<Notice, DispatchError> {
        let context = Context::from_serialize(RequestSummary::new(request, Some(requestor)))?;
        Ok(Notice {
            recipient: recipient.to_string(),
            subject: format!("New Procurement Request: {}", request.item_name),
            body: self.tera.render(REQUEST_CREATED, &context)?,
        })
    }

    pub fn approver_alert(
        &self,
        request: &ProcurementRequest,
        requestor: Option<&User>,
        recipient: &str,
    ) -> Result<Notice, DispatchError> {
        let context = Context::from_serialize(RequestSummary::new(request, requestor))?;
        Ok(Notice {
            recipient: recipient.to_string(),
            subject: format!(
                "Action Required: Approve Procurement Request - {}",
                request.item_name
            ),
            body: self.tera.render(APPROVER_ALERT, &context)?,
        })
    }

    pub fn decision(
        &self,
        request: &ProcurementRequest,
        approval: &Approval,
        reviewer: Option<&User>,
        reviewer_role: Role,
        recipient: &str,
    ) -> Result<Notice, DispatchError> {
        let reviewer_name = reviewer
            .map(|user| user.full_name.clone())
            .unwrap_or_else(|| format!("User #{}", approval.approver_id));

        let mut context = Context::new();
        context.insert("decision", approval.decision.label());
        context.insert("item_name", &request.item_name);
        context.insert("total_cost", &money(request.total_cost));
        context.insert("reviewer_name", &reviewer_name);
        context.insert("reviewer_role", reviewer_role.as_str());
        context.insert("comments", &approval.comments.as_deref().unwrap_or_default());

        Ok(Notice {
            recipient: recipient.to_string(),
            subject: format!("Request {}: {}", approval.decision.label(), request.item_name),
            body: self.tera.render(DECISION, &context)?,
        })
    }
}
