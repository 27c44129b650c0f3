//! Request and response bodies. Money is rounded to the currency's minor
//! unit here and nowhere else.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{AdvanceAction, GroupBuyOrder, GroupBuyStatus, Participant, Rejection, Urgency, UrgencyThresholds};
use crate::domain::pricing::{PriceQuote, PriceSource, ShippingCost, VariantLine};
use crate::domain::value_objects::Money;

#[derive(Debug, Deserialize, Validate)]
pub struct ProposeRequest {
    #[validate(range(min = 1))]
    pub desired_qty: u32,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommitRequest {
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest { pub action: AdvanceAction }

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    /// Variant id to quantity.
    #[serde(default)]
    pub selections: BTreeMap<String, u32>,
    #[validate(length(min = 1))]
    pub shipping_method_id: String,
    /// Used when no variant is selected.
    #[serde(default)]
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProposeResponse {
    Created { group_id: Uuid },
    Existing { existing_group_id: Uuid },
}

/// Display text for a status. Clients key off `status`, not this.
pub fn status_label(status: GroupBuyStatus) -> &'static str {
    match status {
        GroupBuyStatus::PendingApproval => "Awaiting approval",
        GroupBuyStatus::Open => "Open",
        GroupBuyStatus::Filled => "Target reached",
        GroupBuyStatus::Ordering => "Ordering from supplier",
        GroupBuyStatus::Ordered => "Ordered",
        GroupBuyStatus::Shipped => "In transit",
        GroupBuyStatus::Delivered => "Delivered",
        GroupBuyStatus::Rejected => "Closed",
    }
}

#[derive(Debug, Serialize)]
pub struct TierView { pub min_qty: u32, pub unit_price: Money }

#[derive(Debug, Serialize)]
pub struct ParticipantView { pub user_id: String, pub committed_qty: u32, pub is_proposer: bool, pub joined_at: DateTime<Utc> }

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self { Self { user_id: p.user_id.clone(), committed_qty: p.committed_qty, is_proposer: p.is_proposer, joined_at: p.joined_at } }
}

#[derive(Debug, Serialize)]
pub struct GroupBuyView {
    pub group_id: Uuid,
    pub product_id: String,
    pub status: GroupBuyStatus,
    pub status_label: &'static str,
    pub urgency: Urgency,
    pub progress: f64,
    pub current_qty: u32,
    pub target_qty: u32,
    pub min_qty: u32,
    pub base_unit_price: Money,
    pub current_unit_price: Money,
    pub next_tier: Option<TierView>,
    pub deadline: DateTime<Utc>,
    pub server_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub rejection: Option<Rejection>,
    pub participants: Vec<ParticipantView>,
    pub version: u64,
}

impl GroupBuyView {
    pub fn new(order: &GroupBuyOrder, now: DateTime<Utc>, thresholds: &UrgencyThresholds) -> Self {
        let money = |amount: Decimal| Money::new(amount, order.currency()).rounded();
        Self {
            group_id: order.group_id(),
            product_id: order.product_id().to_string(),
            status: order.status(),
            status_label: status_label(order.status()),
            urgency: order.urgency(now, thresholds),
            progress: order.progress(),
            current_qty: order.current_qty(),
            target_qty: order.target_qty(),
            min_qty: order.min_qty(),
            base_unit_price: money(order.base_unit_price()),
            current_unit_price: money(order.current_unit_price()),
            next_tier: order.next_tier().map(|t| TierView { min_qty: t.min_qty, unit_price: money(t.price) }),
            deadline: order.deadline(),
            server_time: now,
            created_at: order.created_at(),
            opened_at: order.opened_at(),
            rejection: order.rejection().cloned(),
            participants: order.participants().iter().map(ParticipantView::from).collect(),
            version: order.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommitResponse { pub applied: bool, pub group_buy: GroupBuyView }

#[derive(Debug, Serialize)]
pub struct QuoteLineView {
    pub variant_id: Option<String>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub uses_fallback_price: bool,
}

#[derive(Debug, Serialize)]
pub struct ShippingView {
    pub rate_id: String,
    pub cost: Money,
    pub raw_cost: Money,
    pub floor_applied: bool,
    pub breakdown_label: String,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub product_id: String,
    pub unit_price: Money,
    pub price_source: PriceSource,
    pub total_quantity: u32,
    pub lines: Vec<QuoteLineView>,
    pub subtotal: Money,
    pub shipping: Option<ShippingView>,
    pub shipping_pending: bool,
    pub service_fee: Money,
    pub insurance: Money,
    pub total_price: Money,
}

impl From<&PriceQuote> for QuoteResponse {
    fn from(q: &PriceQuote) -> Self {
        let money = |amount: Decimal| Money::new(amount, &q.currency).rounded();
        let line = |l: &VariantLine| QuoteLineView {
            variant_id: l.variant_id.clone(), name: l.name.clone(), quantity: l.quantity,
            unit_price: money(l.unit_price), line_total: money(l.line_total), uses_fallback_price: l.uses_fallback_price,
        };
        let shipping = |s: &ShippingCost| ShippingView {
            rate_id: s.rate_id.clone(), cost: money(s.cost), raw_cost: money(s.raw_cost),
            floor_applied: s.floor_applied, breakdown_label: s.breakdown_label.clone(),
        };
        Self {
            product_id: q.product_id.clone(),
            unit_price: money(q.unit_price),
            price_source: q.price_source.clone(),
            total_quantity: q.items.total_quantity,
            lines: q.items.lines.iter().map(line).collect(),
            subtotal: money(q.items.subtotal),
            shipping: q.shipping.as_ref().map(shipping),
            shipping_pending: q.shipping_pending(),
            service_fee: money(q.fees.service_fee_amount),
            insurance: money(q.fees.insurance_amount),
            total_price: money(q.total_price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels_are_distinct() {
        let all = [
            GroupBuyStatus::PendingApproval, GroupBuyStatus::Open, GroupBuyStatus::Filled, GroupBuyStatus::Ordering,
            GroupBuyStatus::Ordered, GroupBuyStatus::Shipped, GroupBuyStatus::Delivered, GroupBuyStatus::Rejected,
        ];
        let labels: std::collections::BTreeSet<_> = all.iter().map(|s| status_label(*s)).collect();
        assert_eq!(labels.len(), all.len());
    }

    #[test]
    fn test_request_validation() {
        assert!(ProposeRequest { desired_qty: 0, message: String::new() }.validate().is_err());
        assert!(ProposeRequest { desired_qty: 2, message: "x".repeat(2001) }.validate().is_err());
        assert!(CommitRequest { quantity: 1, request_id: Some(String::new()) }.validate().is_err());
        assert!(CommitRequest { quantity: 3, request_id: None }.validate().is_ok());
    }
}
