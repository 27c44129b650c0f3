//! Group-buy engine: the single entry point for reads, decisions and writes.
//!
//! Every mutation of one group buy runs under that group's in-process lock
//! and is written back with a version compare-and-swap, so concurrent
//! requests against the same aggregate are serialized even across
//! processes sharing a database. Deadlines are checked lazily whenever a
//! group is loaded.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::instrument;
use uuid::Uuid;
use crate::clock::Clock;
use crate::domain::aggregates::{AdvanceAction, CommitOutcome, GroupBuyError, GroupBuyOrder, UrgencyThresholds};
use crate::domain::events::GroupBuyEvent;
use crate::domain::pricing::{self, FeeSchedule, PriceQuote, QuoteInput, ShippingRate};
use crate::domain::proposal::{self, ProposalError};
use crate::publisher::EventPublisher;
use crate::store::{Catalog, GroupBuyStore, StoreError};
use crate::{EngineError, Result};

/// Lock entries are pruned once the registry grows past this size.
const LOCK_REGISTRY_PRUNE_AT: usize = 1024;

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub fees: FeeSchedule,
    pub group_buy_duration: Duration,
    pub urgency: UrgencyThresholds,
    /// Re-reads allowed after a version conflict before giving up.
    pub commit_max_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { fees: FeeSchedule::default(), group_buy_duration: Duration::days(14), urgency: UrgencyThresholds::default(), commit_max_retries: 5 }
    }
}

#[derive(Clone, Debug)]
pub struct ProposeCommand {
    pub product_id: String,
    /// `None` when the caller is anonymous.
    pub requester_id: Option<String>,
    pub desired_qty: u32,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposalOutcome {
    Created { group_id: Uuid },
    /// The product already has a group buy holding its slot. Nothing was created.
    Existing { existing_group_id: Uuid },
}

#[derive(Clone, Debug)]
pub struct CommitCommand {
    pub group_id: Uuid,
    pub requester_id: String,
    pub quantity: u32,
    /// Retries with the same id are applied once.
    pub request_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CommitResult { pub group_buy: GroupBuyOrder, pub outcome: CommitOutcome }

#[derive(Clone, Debug, Default)]
pub struct QuoteCommand {
    pub product_id: String,
    pub selections: BTreeMap<String, u32>,
    pub shipping_method_id: String,
    pub quantity: u32,
}

pub struct GroupBuyEngine {
    store: Arc<dyn GroupBuyStore>,
    catalog: Arc<dyn Catalog>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl GroupBuyEngine {
    pub fn new(store: Arc<dyn GroupBuyStore>, catalog: Arc<dyn Catalog>, publisher: Arc<dyn EventPublisher>, clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        Self { store, catalog, publisher, clock, settings, locks: Mutex::new(HashMap::new()) }
    }

    pub fn settings(&self) -> &EngineSettings { &self.settings }
    pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

    /// The product's group buy currently holding its slot, if any.
    #[instrument(skip(self))]
    pub async fn active_group_buy(&self, product_id: &str) -> Result<Option<GroupBuyOrder>> {
        let Some(found) = self.store.find_open_for_product(product_id).await? else { return Ok(None) };
        let group = self.refresh(found).await?;
        Ok(Some(group).filter(|g| g.status().blocks_new_proposal()))
    }

    #[instrument(skip(self))]
    pub async fn group_buy(&self, group_id: Uuid) -> Result<GroupBuyOrder> {
        let found = self.store.find(group_id).await?.ok_or(EngineError::GroupBuyNotFound(group_id))?;
        self.refresh(found).await
    }

    #[instrument(skip(self, cmd), fields(product_id = %cmd.product_id, desired_qty = cmd.desired_qty))]
    pub async fn propose(&self, cmd: ProposeCommand) -> Result<ProposalOutcome> {
        let requester_id = cmd.requester_id.as_deref().map(str::trim).filter(|id| !id.is_empty()).map(String::from);
        let existing = self.active_group_buy(&cmd.product_id).await?;
        match proposal::validate(&cmd.product_id, requester_id.is_some(), existing.as_ref()) {
            Ok(()) => {}
            Err(ProposalError::DuplicateOpenGroup { existing_group_id }) => {
                tracing::info!(%existing_group_id, "product already has an active group buy");
                return Ok(ProposalOutcome::Existing { existing_group_id });
            }
            Err(e) => return Err(e.into()),
        }
        let requester_id = requester_id.ok_or(ProposalError::Unauthenticated)?;
        let product = self.catalog.product(&cmd.product_id).await?.ok_or_else(|| EngineError::ProductNotFound(cmd.product_id.clone()))?;
        proposal::check_product(&product, cmd.desired_qty)?;

        let mut order = GroupBuyOrder::propose(&product, requester_id, cmd.desired_qty, cmd.message, self.clock.now(), self.settings.group_buy_duration)?;
        match self.store.insert_proposal(&order).await {
            Ok(stored) => {
                tracing::info!(group_id = %stored.group_id(), "group buy proposed");
                self.publish(order.take_events()).await;
                Ok(ProposalOutcome::Created { group_id: stored.group_id() })
            }
            Err(StoreError::DuplicateOpenGroup(existing_group_id)) => {
                tracing::warn!(%existing_group_id, "lost proposal race to a concurrent request");
                Ok(ProposalOutcome::Existing { existing_group_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, cmd), fields(group_id = %cmd.group_id, requester_id = %cmd.requester_id, quantity = cmd.quantity))]
    pub async fn commit(&self, cmd: CommitCommand) -> Result<CommitResult> {
        let request_id = cmd.request_id.as_deref();
        let (group_buy, outcome) = self.mutate(cmd.group_id, |order, now| order.commit(&cmd.requester_id, cmd.quantity, request_id, now)).await?;
        match outcome {
            CommitOutcome::Applied { filled } => tracing::info!(current_qty = group_buy.current_qty(), unit_price = %group_buy.current_unit_price(), filled, "commitment applied"),
            CommitOutcome::AlreadyApplied => tracing::info!(request_id = request_id.unwrap_or_default(), "duplicate commit request ignored"),
        }
        Ok(CommitResult { group_buy, outcome })
    }

    #[instrument(skip(self))]
    pub async fn approve(&self, group_id: Uuid) -> Result<GroupBuyOrder> {
        let duration = self.settings.group_buy_duration;
        let (group, ()) = self.mutate(group_id, |order, now| order.approve(now, duration)).await?;
        tracing::info!(deadline = %group.deadline(), status = %group.status(), "group buy approved");
        Ok(group)
    }

    #[instrument(skip(self, reason))]
    pub async fn reject(&self, group_id: Uuid, reason: &str) -> Result<GroupBuyOrder> {
        let (group, ()) = self.mutate(group_id, |order, now| order.reject(reason, now)).await?;
        tracing::info!("group buy rejected");
        Ok(group)
    }

    #[instrument(skip(self))]
    pub async fn advance(&self, group_id: Uuid, action: AdvanceAction) -> Result<GroupBuyOrder> {
        let (group, ()) = self.mutate(group_id, |order, now| order.advance(action, now)).await?;
        tracing::info!(status = %group.status(), "group buy advanced");
        Ok(group)
    }

    /// Quotes a checkout. An open group buy for the product prices the
    /// order at the volume it would reach with this order included.
    #[instrument(skip(self, cmd), fields(product_id = %cmd.product_id, shipping = %cmd.shipping_method_id))]
    pub async fn compute_price(&self, cmd: QuoteCommand) -> Result<PriceQuote> {
        let product = self.catalog.product(&cmd.product_id).await?.ok_or_else(|| EngineError::ProductNotFound(cmd.product_id.clone()))?;
        let rate = self.catalog.shipping_rate(&cmd.shipping_method_id).await?
            .ok_or_else(|| EngineError::ShippingMethodNotFound(cmd.shipping_method_id.clone()))?;
        let group = self.active_group_buy(&cmd.product_id).await?;
        let quote = pricing::compute_price(QuoteInput {
            product: &product,
            group_buy: group.as_ref(),
            selections: &cmd.selections,
            shipping_rate: &rate,
            quantity: cmd.quantity,
            fees: &self.settings.fees,
        })?;
        Ok(quote)
    }

    pub async fn shipping_rates(&self) -> Result<Vec<ShippingRate>> {
        Ok(self.catalog.shipping_rates().await?)
    }

    /// Persists a deadline transition the loaded copy is due for.
    async fn refresh(&self, loaded: GroupBuyOrder) -> Result<GroupBuyOrder> {
        let mut due = loaded.clone();
        if !due.evaluate_deadline(self.clock.now()) { return Ok(loaded); }
        let (group, ()) = self.mutate(loaded.group_id(), |_, _| Ok(())).await?;
        Ok(group)
    }

    /// Load, evaluate the deadline, apply `op`, write back with a version
    /// check. Conflicts re-run the whole cycle against a fresh read.
    async fn mutate<T, F>(&self, group_id: Uuid, mut op: F) -> Result<(GroupBuyOrder, T)>
    where F: FnMut(&mut GroupBuyOrder, DateTime<Utc>) -> std::result::Result<T, GroupBuyError> {
        let lock = self.lock_for(group_id);
        let _guard = lock.lock().await;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let mut order = self.store.find(group_id).await?.ok_or(EngineError::GroupBuyNotFound(group_id))?;
            verify(&order)?;
            let now = self.clock.now();
            let deadline_passed = order.evaluate_deadline(now);
            let value = match op(&mut order, now) {
                Ok(value) => value,
                Err(e) => {
                    if deadline_passed { self.save_deadline_transition(&mut order).await; }
                    tracing::warn!(error = %e, status = %order.status(), "group buy operation refused");
                    return Err(e.into());
                }
            };
            if order.pending_events().is_empty() { return Ok((order, value)); }
            verify(&order)?;
            match self.store.update(&order).await {
                Ok(stored) => {
                    self.publish(order.take_events()).await;
                    return Ok((stored, value));
                }
                Err(StoreError::VersionConflict { .. }) if attempts <= self.settings.commit_max_retries => {
                    tracing::warn!(attempts, "version conflict, retrying");
                }
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::warn!(attempts, "giving up after repeated version conflicts");
                    return Err(EngineError::Contention { group_id, attempts });
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to persist group buy");
                    return Err(e.into());
                }
            }
        }
    }

    async fn save_deadline_transition(&self, order: &mut GroupBuyOrder) {
        match self.store.update(order).await {
            Ok(_) => self.publish(order.take_events()).await,
            Err(e) => tracing::warn!(group_id = %order.group_id(), error = %e, "deadline transition not persisted"),
        }
    }

    async fn publish(&self, events: Vec<GroupBuyEvent>) {
        for event in events {
            if let Err(e) = self.publisher.publish(&event).await {
                tracing::warn!(subject = %event.subject(), error = %e, "failed to publish event");
            }
        }
    }

    fn lock_for(&self, group_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.len() >= LOCK_REGISTRY_PRUNE_AT {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(group_id).or_default().clone()
    }
}

fn verify(order: &GroupBuyOrder) -> Result<()> {
    if let Err(e) = order.check_integrity() {
        tracing::error!(group_id = %order.group_id(), error = %e, "group buy failed integrity check");
        debug_assert!(false, "{e}");
        return Err(e.into());
    }
    Ok(())
}
