//! Domain events
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::GroupBuyStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupBuyEvent {
    Proposed { group_id: Uuid, product_id: String, proposer_id: String, desired_qty: u32 },
    Approved { group_id: Uuid, deadline: DateTime<Utc> },
    Rejected { group_id: Uuid, reason: String },
    Committed { group_id: Uuid, user_id: String, quantity: u32, current_qty: u32, unit_price: Decimal },
    Filled { group_id: Uuid, current_qty: u32, unit_price: Decimal },
    Expired { group_id: Uuid, current_qty: u32, min_qty: u32 },
    Advanced { group_id: Uuid, from: GroupBuyStatus, to: GroupBuyStatus },
}

impl GroupBuyEvent {
    pub fn group_id(&self) -> Uuid {
        match self {
            Self::Proposed { group_id, .. } | Self::Approved { group_id, .. } | Self::Rejected { group_id, .. }
            | Self::Committed { group_id, .. } | Self::Filled { group_id, .. } | Self::Expired { group_id, .. }
            | Self::Advanced { group_id, .. } => *group_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Proposed { .. } => "proposed",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
            Self::Committed { .. } => "committed",
            Self::Filled { .. } => "filled",
            Self::Expired { .. } => "expired",
            Self::Advanced { .. } => "advanced",
        }
    }

    /// Message-bus subject, e.g. `groupbuy.committed`.
    pub fn subject(&self) -> String { format!("groupbuy.{}", self.name()) }
}
