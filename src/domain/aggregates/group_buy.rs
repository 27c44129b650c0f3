//! Group Buy Aggregate

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::Product;
use crate::domain::events::GroupBuyEvent;
use crate::domain::pricing::{PriceTier, TierSchedule};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBuyStatus { PendingApproval, Open, Filled, Ordering, Ordered, Shipped, Delivered, Rejected }

impl GroupBuyStatus {
    /// States that occupy the product's single group-buy slot.
    pub const BLOCKING: [GroupBuyStatus; 4] = [Self::PendingApproval, Self::Open, Self::Filled, Self::Ordering];

    pub fn blocks_new_proposal(&self) -> bool { Self::BLOCKING.contains(self) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Open => "open",
            Self::Filled => "filled",
            Self::Ordering => "ordering",
            Self::Ordered => "ordered",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for GroupBuyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for GroupBuyStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::PendingApproval, Self::Open, Self::Filled, Self::Ordering, Self::Ordered, Self::Shipped, Self::Delivered, Self::Rejected]
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown group buy status: {s}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency { AlmostFull, EndingSoon, Active }

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UrgencyThresholds {
    /// Progress at or above which an open group is `almost_full`.
    pub almost_full_progress: f64,
    /// Share of the allotted duration left below which a group is `ending_soon`.
    pub ending_soon_fraction: f64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self { Self { almost_full_progress: 0.70, ending_soon_fraction: 0.25 } }
}

/// Administrative fulfilment steps after a group fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceAction { BeginOrdering, MarkOrdered, MarkShipped, MarkDelivered }

impl AdvanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeginOrdering => "begin_ordering",
            Self::MarkOrdered => "mark_ordered",
            Self::MarkShipped => "mark_shipped",
            Self::MarkDelivered => "mark_delivered",
        }
    }

    fn transition(&self) -> (GroupBuyStatus, GroupBuyStatus) {
        use GroupBuyStatus::*;
        match self {
            Self::BeginOrdering => (Filled, Ordering),
            Self::MarkOrdered => (Ordering, Ordered),
            Self::MarkShipped => (Ordered, Shipped),
            Self::MarkDelivered => (Shipped, Delivered),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal { pub message: String, #[serde(default)] pub rejection_reason: Option<String> }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub committed_qty: u32,
    pub is_proposer: bool,
    #[serde(default)]
    pub proposal: Option<Proposal>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum Rejection { Declined { reason: String }, Expired }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome { Applied { filled: bool }, AlreadyApplied }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupBuyOrder {
    group_id: Uuid,
    product_id: String,
    currency: String,
    base_unit_price: Decimal,
    current_qty: u32,
    target_qty: u32,
    min_qty: u32,
    current_unit_price: Decimal,
    price_tiers: TierSchedule,
    status: GroupBuyStatus,
    created_at: DateTime<Utc>,
    opened_at: Option<DateTime<Utc>>,
    deadline: DateTime<Utc>,
    rejection: Option<Rejection>,
    participants: Vec<Participant>,
    applied_requests: BTreeSet<String>,
    version: u64,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<GroupBuyEvent>,
}

impl GroupBuyOrder {
    /// Opens a proposal snapshotting the product's tiers and thresholds.
    ///
    /// The proposer's desired quantity is recorded on their participant entry
    /// and only counts toward `current_qty` once the proposal is approved.
    pub fn propose(product: &Product, proposer_id: impl Into<String>, desired_qty: u32, message: impl Into<String>, now: DateTime<Utc>, duration: Duration) -> Result<Self, GroupBuyError> {
        if desired_qty == 0 { return Err(GroupBuyError::InvalidQuantity); }
        let terms = product.group_buy_terms().ok_or_else(|| GroupBuyError::NotEligible(product.id().to_string()))?;
        let proposer_id = proposer_id.into();
        let group_id = Uuid::now_v7();
        let mut order = Self {
            group_id, product_id: product.id().to_string(), currency: product.currency().to_string(),
            base_unit_price: product.base_price(), current_qty: 0, target_qty: terms.target_qty, min_qty: terms.min_qty,
            current_unit_price: product.base_price(), price_tiers: product.price_tiers().clone(),
            status: GroupBuyStatus::PendingApproval, created_at: now, opened_at: None, deadline: now + duration,
            rejection: None,
            participants: vec![Participant {
                user_id: proposer_id.clone(), committed_qty: desired_qty, is_proposer: true,
                proposal: Some(Proposal { message: message.into(), rejection_reason: None }), joined_at: now,
            }],
            applied_requests: BTreeSet::new(), version: 0, updated_at: now, events: vec![],
        };
        order.reprice();
        order.raise_event(GroupBuyEvent::Proposed { group_id, product_id: order.product_id.clone(), proposer_id, desired_qty });
        Ok(order)
    }

    pub fn group_id(&self) -> Uuid { self.group_id }
    pub fn product_id(&self) -> &str { &self.product_id }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn base_unit_price(&self) -> Decimal { self.base_unit_price }
    pub fn current_qty(&self) -> u32 { self.current_qty }
    pub fn target_qty(&self) -> u32 { self.target_qty }
    pub fn min_qty(&self) -> u32 { self.min_qty }
    pub fn current_unit_price(&self) -> Decimal { self.current_unit_price }
    pub fn price_tiers(&self) -> &TierSchedule { &self.price_tiers }
    pub fn status(&self) -> GroupBuyStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn opened_at(&self) -> Option<DateTime<Utc>> { self.opened_at }
    pub fn deadline(&self) -> DateTime<Utc> { self.deadline }
    pub fn rejection(&self) -> Option<&Rejection> { self.rejection.as_ref() }
    pub fn participants(&self) -> &[Participant] { &self.participants }
    pub fn version(&self) -> u64 { self.version }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn proposer(&self) -> Option<&Participant> { self.participants.iter().find(|p| p.is_proposer) }

    pub(crate) fn set_version(&mut self, version: u64) { self.version = version; }

    pub fn approve(&mut self, now: DateTime<Utc>, duration: Duration) -> Result<(), GroupBuyError> {
        self.expect_status(GroupBuyStatus::PendingApproval, "approve")?;
        self.status = GroupBuyStatus::Open;
        self.opened_at = Some(now);
        self.deadline = now + duration;
        self.current_qty = self.participants.iter().fold(0u32, |acc, p| acc.saturating_add(p.committed_qty));
        self.reprice();
        self.raise_event(GroupBuyEvent::Approved { group_id: self.group_id, deadline: self.deadline });
        self.fill_if_target_reached();
        self.touch(now);
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), GroupBuyError> {
        let reason = reason.trim();
        if reason.is_empty() { return Err(GroupBuyError::RejectionReasonRequired); }
        match self.status {
            GroupBuyStatus::PendingApproval => self.participants.clear(),
            GroupBuyStatus::Open => {
                if let Some(proposal) = self.participants.iter_mut().find(|p| p.is_proposer).and_then(|p| p.proposal.as_mut()) {
                    proposal.rejection_reason = Some(reason.to_string());
                }
            }
            from => return Err(GroupBuyError::InvalidTransition { from, action: "reject" }),
        }
        self.status = GroupBuyStatus::Rejected;
        self.rejection = Some(Rejection::Declined { reason: reason.to_string() });
        self.raise_event(GroupBuyEvent::Rejected { group_id: self.group_id, reason: reason.to_string() });
        self.touch(now);
        Ok(())
    }

    /// Adds `quantity` for `user_id`. A `request_id` the same user already
    /// committed with is a no-op; commits without one are never deduplicated.
    pub fn commit(&mut self, user_id: &str, quantity: u32, request_id: Option<&str>, now: DateTime<Utc>) -> Result<CommitOutcome, GroupBuyError> {
        let request_key = request_id.map(|id| request_key(user_id, id));
        if request_key.as_ref().is_some_and(|k| self.applied_requests.contains(k)) { return Ok(CommitOutcome::AlreadyApplied); }
        if quantity == 0 { return Err(GroupBuyError::InvalidQuantity); }
        if self.rejection == Some(Rejection::Expired) { return Err(GroupBuyError::Expired(self.group_id)); }
        if matches!(self.status, GroupBuyStatus::Open | GroupBuyStatus::Filled) && now >= self.deadline {
            return Err(GroupBuyError::Expired(self.group_id));
        }
        match self.status {
            GroupBuyStatus::Open => {}
            GroupBuyStatus::Filled | GroupBuyStatus::Ordering | GroupBuyStatus::Ordered | GroupBuyStatus::Shipped | GroupBuyStatus::Delivered => {
                return Err(GroupBuyError::Full(self.group_id));
            }
            from => return Err(GroupBuyError::InvalidTransition { from, action: "commit to" }),
        }

        let new_qty = self.current_qty.checked_add(quantity).ok_or(GroupBuyError::QuantityOverflow)?;
        match self.participants.iter_mut().find(|p| p.user_id == user_id) {
            Some(p) => p.committed_qty += quantity,
            None => self.participants.push(Participant { user_id: user_id.to_string(), committed_qty: quantity, is_proposer: false, proposal: None, joined_at: now }),
        }
        self.current_qty = new_qty;
        if let Some(key) = request_key { self.applied_requests.insert(key); }
        self.reprice();
        self.raise_event(GroupBuyEvent::Committed {
            group_id: self.group_id, user_id: user_id.to_string(), quantity, current_qty: self.current_qty, unit_price: self.current_unit_price,
        });
        let filled = self.fill_if_target_reached();
        self.touch(now);
        Ok(CommitOutcome::Applied { filled })
    }

    /// Applies the time-driven transition once the deadline has passed.
    /// Returns whether the state changed; repeated calls are no-ops.
    pub fn evaluate_deadline(&mut self, now: DateTime<Utc>) -> bool {
        if !matches!(self.status, GroupBuyStatus::PendingApproval | GroupBuyStatus::Open | GroupBuyStatus::Filled) || now < self.deadline {
            return false;
        }
        if self.current_qty < self.min_qty {
            // rejected before approval: participants go with it
            if self.status == GroupBuyStatus::PendingApproval { self.participants.clear(); }
            self.status = GroupBuyStatus::Rejected;
            self.rejection = Some(Rejection::Expired);
            self.raise_event(GroupBuyEvent::Expired { group_id: self.group_id, current_qty: self.current_qty, min_qty: self.min_qty });
            self.touch(now);
            true
        } else if self.status == GroupBuyStatus::Open {
            self.status = GroupBuyStatus::Filled;
            self.raise_event(GroupBuyEvent::Filled { group_id: self.group_id, current_qty: self.current_qty, unit_price: self.current_unit_price });
            self.touch(now);
            true
        } else {
            false
        }
    }

    pub fn advance(&mut self, action: AdvanceAction, now: DateTime<Utc>) -> Result<(), GroupBuyError> {
        let (from, to) = action.transition();
        self.expect_status(from, action.as_str())?;
        self.status = to;
        self.raise_event(GroupBuyEvent::Advanced { group_id: self.group_id, from, to });
        self.touch(now);
        Ok(())
    }

    pub fn progress(&self) -> f64 {
        if self.target_qty == 0 { return 1.0; }
        f64::from(self.current_qty) / f64::from(self.target_qty)
    }

    pub fn urgency(&self, now: DateTime<Utc>, thresholds: &UrgencyThresholds) -> Urgency {
        if self.status != GroupBuyStatus::Open { return Urgency::Active; }
        if self.progress() >= thresholds.almost_full_progress { return Urgency::AlmostFull; }
        let start = self.opened_at.unwrap_or(self.created_at);
        let allotted = (self.deadline - start).num_seconds();
        let remaining = (self.deadline - now).num_seconds();
        if allotted > 0 && (remaining as f64) < allotted as f64 * thresholds.ending_soon_fraction { Urgency::EndingSoon } else { Urgency::Active }
    }

    /// Price every participant would pay if `additional` more units joined.
    pub fn projected_unit_price(&self, additional: u32) -> Decimal {
        self.price_tiers.resolve(self.base_unit_price, i64::from(self.current_qty) + i64::from(additional))
    }

    pub fn next_tier(&self) -> Option<&PriceTier> { self.price_tiers.next_tier(i64::from(self.current_qty)) }

    /// Verifies the stored quantity and price are consistent with participants and tiers.
    pub fn check_integrity(&self) -> Result<(), GroupBuyError> {
        let committed: u64 = self.participants.iter().map(|p| u64::from(p.committed_qty)).sum();
        let expected = if self.status == GroupBuyStatus::PendingApproval { 0 } else { committed };
        if u64::from(self.current_qty) != expected {
            return Err(self.corrupt(format!("current_qty {} does not match committed {}", self.current_qty, expected)));
        }
        let price = self.price_tiers.resolve(self.base_unit_price, i64::from(self.current_qty));
        if price != self.current_unit_price {
            return Err(self.corrupt(format!("current_unit_price {} does not match tier price {}", self.current_unit_price, price)));
        }
        Ok(())
    }

    pub fn pending_events(&self) -> &[GroupBuyEvent] { &self.events }
    pub fn take_events(&mut self) -> Vec<GroupBuyEvent> { std::mem::take(&mut self.events) }

    fn fill_if_target_reached(&mut self) -> bool {
        if self.status != GroupBuyStatus::Open || self.current_qty < self.target_qty { return false; }
        self.status = GroupBuyStatus::Filled;
        self.raise_event(GroupBuyEvent::Filled { group_id: self.group_id, current_qty: self.current_qty, unit_price: self.current_unit_price });
        true
    }

    fn expect_status(&self, expected: GroupBuyStatus, action: &'static str) -> Result<(), GroupBuyError> {
        if self.status != expected { return Err(GroupBuyError::InvalidTransition { from: self.status, action }); }
        Ok(())
    }

    fn corrupt(&self, detail: String) -> GroupBuyError { GroupBuyError::CorruptState { group_id: self.group_id, detail } }
    fn reprice(&mut self) { self.current_unit_price = self.price_tiers.resolve(self.base_unit_price, i64::from(self.current_qty)); }
    fn raise_event(&mut self, e: GroupBuyEvent) { self.events.push(e); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

/// Idempotency keys are scoped to the committing participant.
fn request_key(user_id: &str, request_id: &str) -> String { format!("{user_id}:{request_id}") }

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupBuyError {
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Product {0} does not accept group buys")]
    NotEligible(String),

    #[error("Group buy {0} has expired")]
    Expired(Uuid),

    #[error("Group buy {0} is already full")]
    Full(Uuid),

    #[error("Cannot {action} a group buy that is {from}")]
    InvalidTransition { from: GroupBuyStatus, action: &'static str },

    #[error("A rejection reason is required")]
    RejectionReasonRequired,

    #[error("Committed quantity would overflow")]
    QuantityOverflow,

    #[error("Group buy {group_id} failed integrity check: {detail}")]
    CorruptState { group_id: Uuid, detail: String },
}
