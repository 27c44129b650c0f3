//! OpenSASE Group Buy
//!
//! Pooled purchasing for the marketplace: buyers commit to a shared order
//! and everyone pays the tier price the pooled quantity unlocks.
//!
//! ## Features
//! - Quantity-tier pricing with variant selections
//! - Freight estimates with minimum charges
//! - Service fee and insurance composition
//! - Group-buy lifecycle: proposal, approval, commitments, fulfilment
//! - Lazy deadline expiry and per-group concurrency control

pub mod api;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod publisher;
pub mod store;

pub use engine::{CommitCommand, CommitResult, EngineSettings, GroupBuyEngine, ProposalOutcome, ProposeCommand, QuoteCommand};

use thiserror::Error;
use uuid::Uuid;
use domain::aggregates::GroupBuyError;
use domain::pricing::PricingError;
use domain::proposal::ProposalError;
use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Group buy not found: {0}")]
    GroupBuyNotFound(Uuid),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Shipping method not found: {0}")]
    ShippingMethodNotFound(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    GroupBuy(#[from] GroupBuyError),

    #[error(transparent)]
    Proposal(#[from] ProposalError),

    #[error("Group buy {group_id} is busy, gave up after {attempts} attempts")]
    Contention { group_id: Uuid, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// How a caller should treat an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; fix the request.
    Validation,
    Unauthenticated,
    NotFound,
    /// The group changed under the caller (filled, wrong state, contended).
    StateConflict,
    /// The group's deadline has passed.
    Expired,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GroupBuyNotFound(_) | Self::ProductNotFound(_) | Self::ShippingMethodNotFound(_) => ErrorKind::NotFound,
            Self::Pricing(_) => ErrorKind::Validation,
            Self::GroupBuy(e) => match e {
                GroupBuyError::InvalidQuantity | GroupBuyError::NotEligible(_) | GroupBuyError::RejectionReasonRequired | GroupBuyError::QuantityOverflow => ErrorKind::Validation,
                GroupBuyError::Expired(_) => ErrorKind::Expired,
                GroupBuyError::Full(_) | GroupBuyError::InvalidTransition { .. } => ErrorKind::StateConflict,
                GroupBuyError::CorruptState { .. } => ErrorKind::Internal,
            },
            Self::Proposal(e) => match e {
                ProposalError::Unauthenticated => ErrorKind::Unauthenticated,
                ProposalError::DuplicateOpenGroup { .. } => ErrorKind::StateConflict,
                ProposalError::GroupBuyDisabled(_) | ProposalError::InvalidQuantity => ErrorKind::Validation,
            },
            Self::Contention { .. } => ErrorKind::StateConflict,
            Self::Storage(e) => match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::VersionConflict { .. } | StoreError::DuplicateOpenGroup(_) => ErrorKind::StateConflict,
                _ => ErrorKind::Internal,
            },
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::GroupBuyNotFound(_) | Self::Storage(StoreError::NotFound(_)) => "group_buy_not_found",
            Self::ProductNotFound(_) => "product_not_found",
            Self::ShippingMethodNotFound(_) => "shipping_method_not_found",
            Self::Pricing(PricingError::InvalidRate(_)) => "invalid_rate",
            Self::Pricing(PricingError::DuplicateTierThreshold(_)) => "duplicate_tier_threshold",
            Self::Pricing(PricingError::UnknownVariant(_)) => "unknown_variant",
            Self::Pricing(PricingError::InsufficientStock { .. }) => "insufficient_stock",
            Self::Pricing(PricingError::InvalidQuantity) | Self::GroupBuy(GroupBuyError::InvalidQuantity) | Self::Proposal(ProposalError::InvalidQuantity) => "invalid_quantity",
            Self::Pricing(PricingError::QuoteRequired(_)) => "quote_required",
            Self::GroupBuy(GroupBuyError::NotEligible(_)) | Self::Proposal(ProposalError::GroupBuyDisabled(_)) => "group_buy_disabled",
            Self::GroupBuy(GroupBuyError::Expired(_)) => "expired",
            Self::GroupBuy(GroupBuyError::Full(_)) => "full",
            Self::GroupBuy(GroupBuyError::InvalidTransition { .. }) => "invalid_transition",
            Self::GroupBuy(GroupBuyError::RejectionReasonRequired) => "rejection_reason_required",
            Self::GroupBuy(GroupBuyError::QuantityOverflow) => "quantity_overflow",
            Self::GroupBuy(GroupBuyError::CorruptState { .. }) => "corrupt_state",
            Self::Proposal(ProposalError::Unauthenticated) => "unauthenticated",
            Self::Proposal(ProposalError::DuplicateOpenGroup { .. }) | Self::Storage(StoreError::DuplicateOpenGroup(_)) => "duplicate_open_group",
            Self::Contention { .. } | Self::Storage(StoreError::VersionConflict { .. }) => "contention",
            Self::Storage(_) => "storage_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let id = Uuid::nil();
        assert_eq!(EngineError::GroupBuy(GroupBuyError::Expired(id)).kind(), ErrorKind::Expired);
        assert_eq!(EngineError::GroupBuy(GroupBuyError::Full(id)).kind(), ErrorKind::StateConflict);
        assert_eq!(EngineError::Proposal(ProposalError::Unauthenticated).kind(), ErrorKind::Unauthenticated);
        assert_eq!(EngineError::Pricing(PricingError::InvalidQuantity).code(), "invalid_quantity");
        assert_eq!(EngineError::Storage(StoreError::Corrupt("x".into())).kind(), ErrorKind::Internal);
        assert_eq!(EngineError::Contention { group_id: id, attempts: 6 }.code(), "contention");
    }
}
