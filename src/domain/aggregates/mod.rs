//! Aggregates module
pub mod product;
pub mod group_buy;

pub use product::{GroupBuyTerms, Product, ProductError};
pub use group_buy::{
    AdvanceAction, CommitOutcome, GroupBuyError, GroupBuyOrder, GroupBuyStatus, Participant, Proposal, Rejection, Urgency,
    UrgencyThresholds,
};
