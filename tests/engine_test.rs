use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use opensase_groupbuy::clock::FixedClock;
use opensase_groupbuy::domain::aggregates::{AdvanceAction, CommitOutcome, GroupBuyError, GroupBuyOrder, GroupBuyStatus, Product};
use opensase_groupbuy::domain::pricing::{PriceSource, PriceTier, TierSchedule};
use opensase_groupbuy::publisher::RecordingPublisher;
use opensase_groupbuy::store::{GroupBuyStore, InMemoryCatalog, InMemoryGroupBuyStore, StoreError};
use opensase_groupbuy::{CommitCommand, EngineError, EngineSettings, ErrorKind, GroupBuyEngine, ProposalOutcome, ProposeCommand, QuoteCommand};

struct Setup {
    engine: Arc<GroupBuyEngine>,
    store: Arc<InMemoryGroupBuyStore>,
    clock: Arc<FixedClock>,
    events: Arc<RecordingPublisher>,
}

fn tiers() -> TierSchedule {
    TierSchedule::new(vec![
        PriceTier::new(1, Decimal::new(1000, 0)),
        PriceTier::new(50, Decimal::new(900, 0)),
        PriceTier::new(100, Decimal::new(800, 0)),
    ]).unwrap()
}

async fn setup() -> Setup {
    let catalog = InMemoryCatalog::default();
    catalog.upsert(Product::new("LAMP", "Solar lamp", "XOF", Decimal::new(1200, 0)).with_tiers(tiers()).with_dimensions(Some(0.5), None).with_group_buy(10, 50).unwrap()).await;
    catalog.upsert(Product::new("BULK", "Rice 25kg", "XOF", Decimal::new(15_000, 0)).with_group_buy(1, 1_000_000).unwrap()).await;
    catalog.upsert(Product::new("KETTLE", "Kettle", "XOF", Decimal::new(8000, 0))).await;
    let store = Arc::new(InMemoryGroupBuyStore::new());
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()));
    let events = Arc::new(RecordingPublisher::new());
    let engine = GroupBuyEngine::new(store.clone(), Arc::new(catalog), events.clone(), clock.clone(), EngineSettings::default());
    Setup { engine: Arc::new(engine), store, clock, events }
}

fn propose(product_id: &str, user: &str, qty: u32) -> ProposeCommand {
    ProposeCommand { product_id: product_id.into(), requester_id: Some(user.into()), desired_qty: qty, message: "who's in?".into() }
}

fn commit(group_id: Uuid, user: &str, qty: u32, request_id: &str) -> CommitCommand {
    CommitCommand { group_id, requester_id: user.into(), quantity: qty, request_id: Some(request_id.into()) }
}

async fn open_group(s: &Setup, product_id: &str, qty: u32) -> Uuid {
    let ProposalOutcome::Created { group_id } = s.engine.propose(propose(product_id, "proposer", qty)).await.unwrap() else {
        panic!("expected a new group");
    };
    s.engine.approve(group_id).await.unwrap();
    group_id
}

#[tokio::test]
async fn test_concurrent_commits_lose_no_updates() {
    let s = setup().await;
    let group_id = open_group(&s, "BULK", 1).await;

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let engine = s.engine.clone();
            tokio::spawn(async move { engine.commit(commit(group_id, &format!("user-{}", i % 8), 2, &format!("req-{i}"))).await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let group = s.engine.group_buy(group_id).await.unwrap();
    assert_eq!(group.current_qty(), 1 + 64 * 2);
    assert_eq!(group.participants().iter().filter(|p| !p.is_proposer).map(|p| p.committed_qty).sum::<u32>(), 128);
    assert!(group.check_integrity().is_ok());
}

#[tokio::test]
async fn test_concurrent_proposals_create_exactly_one() {
    let s = setup().await;
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = s.engine.clone();
            tokio::spawn(async move { engine.propose(propose("LAMP", &format!("user-{i}"), 3)).await })
        })
        .collect();
    let mut outcomes = vec![];
    for h in handles {
        outcomes.push(h.await.unwrap().unwrap());
    }

    let created: Vec<Uuid> = outcomes.iter().filter_map(|o| match o { ProposalOutcome::Created { group_id } => Some(*group_id), _ => None }).collect();
    assert_eq!(created.len(), 1);
    for o in &outcomes {
        if let ProposalOutcome::Existing { existing_group_id } = o {
            assert_eq!(*existing_group_id, created[0]);
        }
    }
    assert_eq!(s.store.all_for_product("LAMP").await.len(), 1);
}

#[tokio::test]
async fn test_proposal_with_open_group_returns_existing() {
    let s = setup().await;
    let group_id = open_group(&s, "LAMP", 5).await;
    let outcome = s.engine.propose(propose("LAMP", "bob", 2)).await.unwrap();
    assert_eq!(outcome, ProposalOutcome::Existing { existing_group_id: group_id });
    assert_eq!(s.store.all_for_product("LAMP").await.len(), 1);
}

#[tokio::test]
async fn test_proposal_for_ineligible_product() {
    let s = setup().await;
    let err = s.engine.propose(propose("KETTLE", "alice", 2)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), "group_buy_disabled");
    assert!(matches!(s.engine.propose(propose("NOPE", "alice", 2)).await, Err(EngineError::ProductNotFound(_))));
}

#[tokio::test]
async fn test_commit_reaching_target_reprices_everyone() {
    let s = setup().await;
    let group_id = open_group(&s, "LAMP", 48).await;
    assert_eq!(s.engine.group_buy(group_id).await.unwrap().current_unit_price(), Decimal::new(1000, 0));

    let result = s.engine.commit(commit(group_id, "bob", 5, "r1")).await.unwrap();
    assert_eq!(result.outcome, CommitOutcome::Applied { filled: true });
    assert_eq!(result.group_buy.current_qty(), 53);
    assert_eq!(result.group_buy.status(), GroupBuyStatus::Filled);
    assert_eq!(result.group_buy.current_unit_price(), Decimal::new(900, 0));

    let err = s.engine.commit(commit(group_id, "carol", 1, "r2")).await.unwrap_err();
    assert!(matches!(err, EngineError::GroupBuy(GroupBuyError::Full(_))));
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}

#[tokio::test]
async fn test_retried_commit_applies_once() {
    let s = setup().await;
    let group_id = open_group(&s, "LAMP", 10).await;
    let first = s.engine.commit(commit(group_id, "bob", 4, "retry-me")).await.unwrap();
    let second = s.engine.commit(commit(group_id, "bob", 4, "retry-me")).await.unwrap();
    assert_eq!(second.outcome, CommitOutcome::AlreadyApplied);
    assert_eq!(second.group_buy.current_qty(), first.group_buy.current_qty());
    assert_eq!(second.group_buy.current_qty(), 14);
    assert_eq!(s.events.events().iter().filter(|e| e.name() == "committed").count(), 1);
}

#[tokio::test]
async fn test_request_id_reused_by_another_user_still_applies() {
    let s = setup().await;
    let group_id = open_group(&s, "LAMP", 10).await;
    s.engine.commit(commit(group_id, "alice", 3, "1")).await.unwrap();
    let bob = s.engine.commit(commit(group_id, "bob", 7, "1")).await.unwrap();
    assert_eq!(bob.outcome, CommitOutcome::Applied { filled: false });
    assert_eq!(bob.group_buy.current_qty(), 20);
    let bob_qty = bob.group_buy.participants().iter().find(|p| p.user_id == "bob").map(|p| p.committed_qty);
    assert_eq!(bob_qty, Some(7));
}

#[tokio::test]
async fn test_commits_without_request_id_are_not_deduplicated() {
    let s = setup().await;
    let group_id = open_group(&s, "LAMP", 10).await;
    for _ in 0..2 {
        let r = s.engine.commit(CommitCommand { group_id, requester_id: "bob".into(), quantity: 2, request_id: None }).await.unwrap();
        assert!(matches!(r.outcome, CommitOutcome::Applied { .. }));
    }
    assert_eq!(s.engine.group_buy(group_id).await.unwrap().current_qty(), 14);
}

#[tokio::test]
async fn test_deadline_is_evaluated_lazily_and_once() {
    let s = setup().await;
    let group_id = open_group(&s, "LAMP", 3).await;

    s.clock.advance(Duration::days(13));
    assert!(s.engine.active_group_buy("LAMP").await.unwrap().is_some());

    s.clock.advance(Duration::days(2));
    assert!(s.engine.active_group_buy("LAMP").await.unwrap().is_none());
    let group = s.engine.group_buy(group_id).await.unwrap();
    assert_eq!(group.status(), GroupBuyStatus::Rejected);
    s.engine.group_buy(group_id).await.unwrap();
    assert_eq!(s.events.events().iter().filter(|e| e.name() == "expired").count(), 1);

    let err = s.engine.commit(commit(group_id, "bob", 1, "late")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);

    // the slot is free again
    assert!(matches!(s.engine.propose(propose("LAMP", "bob", 2)).await.unwrap(), ProposalOutcome::Created { .. }));
}

#[tokio::test]
async fn test_minimum_met_at_deadline_closes_group() {
    let s = setup().await;
    let group_id = open_group(&s, "LAMP", 20).await;
    s.clock.advance(Duration::days(14));
    let group = s.engine.group_buy(group_id).await.unwrap();
    assert_eq!(group.status(), GroupBuyStatus::Filled);
    assert_eq!(s.engine.commit(commit(group_id, "bob", 1, "late")).await.unwrap_err().kind(), ErrorKind::Expired);
}

#[tokio::test]
async fn test_fulfilment_frees_slot_after_ordering() {
    let s = setup().await;
    let group_id = open_group(&s, "LAMP", 50).await;
    assert_eq!(s.engine.group_buy(group_id).await.unwrap().status(), GroupBuyStatus::Filled);

    let err = s.engine.advance(group_id, AdvanceAction::MarkShipped).await.unwrap_err();
    assert_eq!(err.code(), "invalid_transition");

    s.engine.advance(group_id, AdvanceAction::BeginOrdering).await.unwrap();
    assert!(matches!(s.engine.propose(propose("LAMP", "bob", 2)).await.unwrap(), ProposalOutcome::Existing { .. }));
    s.engine.advance(group_id, AdvanceAction::MarkOrdered).await.unwrap();
    assert!(matches!(s.engine.propose(propose("LAMP", "bob", 2)).await.unwrap(), ProposalOutcome::Created { .. }));

    s.engine.advance(group_id, AdvanceAction::MarkShipped).await.unwrap();
    let done = s.engine.advance(group_id, AdvanceAction::MarkDelivered).await.unwrap();
    assert_eq!(done.status(), GroupBuyStatus::Delivered);
}

#[tokio::test]
async fn test_admin_rejection() {
    let s = setup().await;
    let ProposalOutcome::Created { group_id } = s.engine.propose(propose("LAMP", "alice", 5)).await.unwrap() else { panic!() };
    assert_eq!(s.engine.reject(group_id, "").await.unwrap_err().code(), "rejection_reason_required");
    let group = s.engine.reject(group_id, "supplier out of stock").await.unwrap();
    assert_eq!(group.status(), GroupBuyStatus::Rejected);
    assert!(s.engine.approve(group_id).await.is_err());
}

#[tokio::test]
async fn test_quote_uses_open_group_tiers() {
    let s = setup().await;
    open_group(&s, "LAMP", 45).await;
    let quote = s.engine.compute_price(QuoteCommand { product_id: "LAMP".into(), shipping_method_id: "air".into(), quantity: 10, ..Default::default() }).await.unwrap();
    assert_eq!(quote.unit_price, Decimal::new(900, 0));
    assert!(matches!(quote.price_source, PriceSource::GroupBuy { projected_qty: 55, .. }));

    let err = s.engine.compute_price(QuoteCommand { product_id: "LAMP".into(), shipping_method_id: "rocket".into(), quantity: 1, ..Default::default() }).await.unwrap_err();
    assert!(matches!(err, EngineError::ShippingMethodNotFound(_)));
}

/// Delegates reads but refuses every update.
struct ContendedStore(InMemoryGroupBuyStore);

#[async_trait]
impl GroupBuyStore for ContendedStore {
    async fn find(&self, group_id: Uuid) -> Result<Option<GroupBuyOrder>, StoreError> { self.0.find(group_id).await }
    async fn find_open_for_product(&self, product_id: &str) -> Result<Option<GroupBuyOrder>, StoreError> { self.0.find_open_for_product(product_id).await }
    async fn insert_proposal(&self, order: &GroupBuyOrder) -> Result<GroupBuyOrder, StoreError> { self.0.insert_proposal(order).await }
    async fn update(&self, order: &GroupBuyOrder) -> Result<GroupBuyOrder, StoreError> {
        Err(StoreError::VersionConflict { group_id: order.group_id(), expected: order.version() })
    }
}

#[tokio::test]
async fn test_persistent_conflicts_surface_as_contention() {
    let catalog = InMemoryCatalog::default();
    catalog.upsert(Product::new("LAMP", "Solar lamp", "XOF", Decimal::new(1000, 0)).with_group_buy(1, 10).unwrap()).await;
    let settings = EngineSettings { commit_max_retries: 3, ..EngineSettings::default() };
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let engine = GroupBuyEngine::new(Arc::new(ContendedStore(InMemoryGroupBuyStore::new())), Arc::new(catalog), Arc::new(RecordingPublisher::new()), clock, settings);

    let ProposalOutcome::Created { group_id } = engine.propose(propose("LAMP", "alice", 2)).await.unwrap() else { panic!() };
    match engine.approve(group_id).await {
        Err(EngineError::Contention { attempts, .. }) => assert_eq!(attempts, 4),
        other => panic!("expected contention, got {other:?}"),
    }
}
