//! Gatekeeping for new group-buy proposals

use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{GroupBuyOrder, Product};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    #[error("Sign in to propose a group buy")]
    Unauthenticated,

    #[error("Product already has an active group buy: {existing_group_id}")]
    DuplicateOpenGroup { existing_group_id: Uuid },

    #[error("Product {0} does not accept group buys")]
    GroupBuyDisabled(String),

    #[error("Desired quantity must be at least 1")]
    InvalidQuantity,
}

/// `requester_authenticated` is the caller's identity claim; no
/// authentication happens here. `existing` is whatever the store returned for
/// the product's open slot.
pub fn validate(product_id: &str, requester_authenticated: bool, existing: Option<&GroupBuyOrder>) -> Result<(), ProposalError> {
    if !requester_authenticated { return Err(ProposalError::Unauthenticated); }
    if let Some(group) = existing.filter(|g| g.status().blocks_new_proposal()) {
        debug_assert_eq!(group.product_id(), product_id);
        return Err(ProposalError::DuplicateOpenGroup { existing_group_id: group.group_id() });
    }
    Ok(())
}

pub fn check_product(product: &Product, desired_qty: u32) -> Result<(), ProposalError> {
    if !product.group_buy_enabled() || product.requires_quote() {
        return Err(ProposalError::GroupBuyDisabled(product.id().to_string()));
    }
    if desired_qty == 0 { return Err(ProposalError::InvalidQuantity); }
    Ok(())
}
