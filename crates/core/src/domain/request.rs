use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalDetail, Decision};
use crate::domain::user::{User, UserId};
use crate::domain::vendor::{Vendor, VendorId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::Validation(format!(
                "unknown request status `{other}` (expected pending|approved|rejected)"
            ))),
        }
    }
}

impl From<Decision> for RequestStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => Self::Approved,
            Decision::Rejected => Self::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementRequest {
    pub id: RequestId,
    pub requestor_id: UserId,
    pub item_name: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_cost: Decimal,
    pub justification: String,
    pub vendor_id: Option<VendorId>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new request, prior to validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProcurementRequest {
    pub item_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: Decimal,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<VendorId>,
}

/// A validated request ready to be persisted. `total_cost` is fixed here and never recomputed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDraft {
    pub requestor_id: UserId,
    pub item_name: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_cost: Decimal,
    pub justification: String,
    pub vendor_id: Option<VendorId>,
    pub created_at: DateTime<Utc>,
}

impl NewProcurementRequest {
    pub fn into_draft(
        self,
        requestor_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<RequestDraft, DomainError> {
        let item_name = self.item_name.trim().to_string();
        if item_name.is_empty() {
            return Err(DomainError::Validation("item_name must not be empty".to_string()));
        }

        if self.quantity < 1 {
            return Err(DomainError::Validation(format!(
                "quantity must be at least 1 (got {})",
                self.quantity
            )));
        }
        let quantity = u32::try_from(self.quantity).map_err(|_| {
            DomainError::Validation(format!("quantity {} is out of range", self.quantity))
        })?;

        if self.unit_price.is_sign_negative() && !self.unit_price.is_zero() {
            return Err(DomainError::Validation(format!(
                "unit_price must not be negative (got {})",
                self.unit_price
            )));
        }

        let total_cost = total_cost(quantity, self.unit_price)?;

        Ok(RequestDraft {
            requestor_id,
            item_name,
            description: self.description.unwrap_or_default(),
            quantity,
            unit_price: self.unit_price,
            total_cost,
            justification: self.justification.unwrap_or_default(),
            vendor_id: self.vendor_id,
            created_at,
        })
    }
}

pub fn total_cost(quantity: u32, unit_price: Decimal) -> Result<Decimal, DomainError> {
    Decimal::from(quantity).checked_mul(unit_price).ok_or_else(|| {
        DomainError::Validation(format!("total cost of {quantity} x {unit_price} overflows"))
    })
}

/// Filter applied by the request store. `requestor_id = None` means no ownership filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub requestor_id: Option<UserId>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn matches(&self, request: &ProcurementRequest) -> bool {
        self.requestor_id.map_or(true, |id| request.requestor_id == id)
            && self.status.map_or(true, |status| request.status == status)
    }
}

/// A request together with its requestor, vendor and approval history (newest first).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: ProcurementRequest,
    pub requestor: Option<User>,
    pub vendor: Option<Vendor>,
    pub approvals: Vec<ApprovalDetail>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{NewProcurementRequest, RequestStatus};
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn input(quantity: i64, unit_price: &str) -> NewProcurementRequest {
        NewProcurementRequest {
            item_name: "Laptop".to_string(),
            description: None,
            quantity,
            unit_price: Decimal::from_str(unit_price).expect("decimal"),
            justification: None,
            vendor_id: None,
        }
    }

    #[test]
    fn total_cost_is_exact_for_decimal_prices() {
        let draft = input(3, "19.99").into_draft(UserId(1), Utc::now()).expect("valid draft");
        assert_eq!(draft.total_cost, Decimal::from_str("59.97").expect("decimal"));

        let draft = input(2, "1500.00").into_draft(UserId(1), Utc::now()).expect("valid draft");
        assert_eq!(draft.total_cost, Decimal::new(300_000, 2));
    }

    #[test]
    fn zero_price_is_allowed() {
        let draft = input(5, "0").into_draft(UserId(1), Utc::now()).expect("free items allowed");
        assert!(draft.total_cost.is_zero());
    }

    #[test]
    fn rejects_out_of_range_input() {
        for (quantity, price) in [(0, "10"), (-2, "10"), (1, "-0.01")] {
            let error = input(quantity, price)
                .into_draft(UserId(1), Utc::now())
                .expect_err("should be rejected");
            assert!(matches!(error, DomainError::Validation(_)), "{quantity} x {price}");
        }
    }

    #[test]
    fn rejects_blank_item_name() {
        let mut blank = input(1, "10");
        blank.item_name = "   ".to_string();
        let error = blank.into_draft(UserId(1), Utc::now()).expect_err("blank item");
        assert!(matches!(
            error,
            DomainError::Validation(ref message) if message.contains("item_name")
        ));
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!("cancelled".parse::<RequestStatus>().is_err());
    }
}
