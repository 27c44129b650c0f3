//! Domain model: aggregates, value objects, events and the pure pricing rules.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod proposal;
pub mod value_objects;
