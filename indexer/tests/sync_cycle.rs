//! End-to-end sync cycles against an in-process mock L2.
//!
//! The real `L2Client` talks HTTP to an axum server; history lands in the
//! in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prism_indexer::events::{BetStatus, StateUpdate};
use prism_indexer::{
    HistoryStore, InMemoryHistoryStore, IndexerConfig, IndexerService, IndexerStatus,
    SyncOutcome,
};
use prism_sdk::L2Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};

#[derive(Default)]
struct MockL2 {
    settlements_enabled: bool,
    events: Vec<Value>,
    markets: Vec<Value>,
    bets: HashMap<String, Vec<Value>>,
    bet_calls: AtomicUsize,
    /// Bet lookups still to answer with a 500.
    bet_failures: AtomicUsize,
}

async fn settlements(
    State(l2): State<Arc<MockL2>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !l2.settlements_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    let from_block: u64 = params
        .get("from_block")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let events: Vec<Value> = l2
        .events
        .iter()
        .filter(|e| e["block_number"].as_u64().unwrap_or(0) >= from_block)
        .cloned()
        .collect();

    Json(json!({ "events": events })).into_response()
}

async fn markets(
    State(l2): State<Arc<MockL2>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    assert_eq!(params.get("status").map(String::as_str), Some("resolved"));
    Json(json!({ "markets": l2.markets }))
}

async fn bets(
    State(l2): State<Arc<MockL2>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    l2.bet_calls.fetch_add(1, Ordering::SeqCst);

    let failing = l2
        .bet_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "ledger unavailable" })),
        )
            .into_response();
    }

    let market_id = params.get("market_id").cloned().unwrap_or_default();
    Json(l2.bets.get(&market_id).cloned().unwrap_or_default()).into_response()
}

async fn spawn_l2(l2: Arc<MockL2>) -> String {
    let app = Router::new()
        .route("/events/settlements", get(settlements))
        .route("/markets", get(markets))
        .route("/bets", get(bets))
        .with_state(l2);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock L2");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock L2");
    });

    format!("http://{}", addr)
}

async fn indexer(l2: Arc<MockL2>, store: Arc<InMemoryHistoryStore>) -> IndexerService {
    let base_url = spawn_l2(l2).await;
    let client = L2Client::with_base_url(base_url).expect("client");
    IndexerService::new(&IndexerConfig::default(), store, Arc::new(client))
}

fn m1_market() -> Value {
    json!({
        "id": "m1",
        "winning_outcome": "Yes",
        "outcomes": [{"id": "Yes"}, {"id": "No"}],
        "total_bets": 1
    })
}

fn m1_bets() -> HashMap<String, Vec<Value>> {
    HashMap::from([(
        "m1".to_string(),
        vec![json!({
            "id": "b1",
            "user_address": "u1",
            "outcome_id": "Yes",
            "amount": 10,
            "potential_payout": 20
        })],
    )])
}

fn settlement_mock() -> MockL2 {
    MockL2 {
        settlements_enabled: true,
        events: vec![json!({
            "event_type": "MarketResolved",
            "block_number": 42,
            "transaction_hash": "tx1",
            "timestamp": "2025-01-01T00:00:00Z",
            "data": m1_market()
        })],
        bets: m1_bets(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_market_resolution_end_to_end() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let service = indexer(Arc::new(settlement_mock()), store.clone()).await;

    let outcome = service.sync_once().await.expect("sync");
    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            events: 1,
            last_block: 42
        }
    );

    let market = store.market("m1").await.expect("market_history row");
    assert_eq!(market.status, "resolved");
    assert_eq!(market.resolved_outcome, "Yes");
    assert_eq!(market.resolution_tx_hash, "tx1");

    let bet = store.bet("b1").await.expect("bet_history row");
    assert_eq!(bet.status, BetStatus::Won);
    assert_eq!(bet.payout_amount, Decimal::from(20));
    assert!(store.has_profile("u1").await);

    let state = store.state().await.expect("state");
    assert_eq!(state.last_synced_block, 42);
    assert_eq!(state.total_events_processed, 1);
    assert_eq!(state.status, IndexerStatus::Running);
    assert!(state.error_message.is_none());

    assert!(store.audit_row("tx1").await.expect("audit").processed);
}

#[tokio::test]
async fn test_replay_from_zero_converges() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let service = indexer(Arc::new(settlement_mock()), store.clone()).await;

    service.sync_once().await.expect("first sync");
    let rows = store.history_len().await;
    let bet = store.bet("b1").await;
    let market = store.market("m1").await;

    // Rewind the cursor so the same event is served and processed again.
    store
        .update_state(&StateUpdate {
            last_synced_block: Some(0),
            ..Default::default()
        })
        .await
        .expect("rewind");
    service.sync_once().await.expect("replay");

    assert_eq!(store.history_len().await, rows);
    assert_eq!(store.bet("b1").await, bet);
    assert_eq!(store.market("m1").await, market);
    assert_eq!(store.audit_len().await, 1);
    assert_eq!(
        store.state().await.map(|s| s.last_synced_block),
        Some(42)
    );
}

#[tokio::test]
async fn test_covered_block_is_not_reprocessed() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let l2 = Arc::new(settlement_mock());
    let service = indexer(Arc::clone(&l2), store.clone()).await;

    service.sync_once().await.expect("first sync");
    let writes = store.history_writes().await;

    let outcome = service.sync_once().await.expect("second sync");
    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            events: 0,
            last_block: 42
        }
    );
    assert_eq!(store.history_writes().await, writes);
    assert_eq!(l2.bet_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fallback_synthesizes_each_market_once() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let l2 = Arc::new(MockL2 {
        settlements_enabled: false,
        markets: vec![m1_market()],
        bets: m1_bets(),
        ..Default::default()
    });
    let service = indexer(l2, store.clone()).await;

    let outcome = service.sync_once().await.expect("fallback sync");
    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            events: 1,
            last_block: 0
        }
    );

    let row = store
        .audit_row("derived-market-m1")
        .await
        .expect("derived audit row");
    assert!(row.processed);
    assert_eq!(
        store.bet("b1").await.map(|b| b.status),
        Some(BetStatus::Won)
    );

    // m1 is now in history, so nothing is derived again.
    assert_eq!(service.sync_once().await.expect("idle"), SyncOutcome::Idle);
    assert_eq!(store.audit_len().await, 1);
    assert_eq!(service.metrics().fallback_fetches(), 2);
}

#[tokio::test]
async fn test_fallback_settles_market_after_failed_attempt() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let l2 = Arc::new(MockL2 {
        settlements_enabled: false,
        markets: vec![m1_market()],
        bets: m1_bets(),
        bet_failures: AtomicUsize::new(1),
        ..Default::default()
    });
    let service = indexer(Arc::clone(&l2), store.clone()).await;

    let err = service.sync_once().await.expect_err("bet lookup fails");
    assert!(err.to_string().contains("ledger unavailable"));
    let row = store
        .audit_row("derived-market-m1")
        .await
        .expect("derived audit row");
    assert!(!row.processed);
    assert_eq!(
        store.state().await.map(|s| s.status),
        Some(IndexerStatus::Error)
    );

    // The L2 has recovered; the market is derived again and settled.
    let outcome = service.sync_once().await.expect("recovered sync");
    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            events: 1,
            last_block: 0
        }
    );

    let bet = store.bet("b1").await.expect("bet_history row");
    assert_eq!(bet.status, BetStatus::Won);
    assert_eq!(bet.payout_amount, Decimal::from(20));
    assert!(store.audit_row("derived-market-m1").await.expect("audit").processed);
    assert_eq!(
        store.state().await.map(|s| s.status),
        Some(IndexerStatus::Running)
    );

    assert_eq!(service.sync_once().await.expect("idle"), SyncOutcome::Idle);
    assert_eq!(l2.bet_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_non_settlement_events_leave_history_empty() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let l2 = Arc::new(MockL2 {
        settlements_enabled: true,
        events: vec![
            json!({
                "event_type": "BetPlaced",
                "block_number": 5,
                "transaction_hash": "tx-placed",
                "timestamp": "2025-01-01T00:00:00Z",
                "data": {"id": "b9", "market_id": "m9", "outcome_id": "Yes"}
            }),
            json!({
                "event_type": "BetSettled",
                "block_number": 6,
                "transaction_hash": "tx-settled",
                "timestamp": "2025-01-01T00:00:00Z",
                "data": {"bet_id": "b9", "payout": 0}
            }),
        ],
        ..Default::default()
    });
    let service = indexer(Arc::clone(&l2), store.clone()).await;

    let outcome = service.sync_once().await.expect("sync");
    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            events: 2,
            last_block: 6
        }
    );

    assert_eq!(store.history_len().await, 0);
    assert_eq!(store.audit_len().await, 2);
    assert_eq!(l2.bet_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.metrics().events_ignored(), 1);
}
