//! End-to-end lifecycle runs through the public API with mock adapters.
//!
//! The node under test is the maker of a SELL offer, so it acts as the
//! seller: the taker (buyer) takes the offer, both sides fund the escrow,
//! the buyer announces the fiat payment, the seller confirms receipt and
//! the escrow pays out.

use escrow_engine::application::services::{
    EscrowConfig, EscrowCoordinator, ManagerConfig, PaymentProtocol, TradeManager,
};
use escrow_engine::domain::entities::Offer;
use escrow_engine::domain::value_objects::{
    Amount, DisputeChannel, DisputeReason, OfferDirection, OfferId, Price, PriceSpec, TradeId,
    TradeRole, TradeState, TraderId, TraderPosition, Timestamp, TxId,
};
use escrow_engine::infrastructure::persistence::in_memory::{
    InMemoryOfferRepository, InMemoryTradeRepository,
};
use escrow_engine::infrastructure::persistence::{OfferRepository, TradeRepository};
use escrow_engine::infrastructure::transport::{
    ContractSigner, MessageTransport, MockSigner, MockTransport, TakeOfferRequest,
    TradeMessageEnvelope, TradeMessagePayload,
};
use escrow_engine::infrastructure::wallet::{MockWallet, WalletClient};
use rust_decimal::Decimal;
use std::sync::Arc;

const TRADE_AMOUNT: u64 = 10_000_000;
const DEPOSIT: u64 = 1_500_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Node {
    manager: TradeManager,
    wallet: Arc<MockWallet>,
    transport: Arc<MockTransport>,
    trades: Arc<InMemoryTradeRepository>,
    offers: Arc<InMemoryOfferRepository>,
}

fn node() -> Node {
    init_tracing();
    let wallet = Arc::new(MockWallet::with_balance(Amount::from_atomic(100_000_000)));
    let transport = Arc::new(MockTransport::new());
    let signer: Arc<dyn ContractSigner> = Arc::new(MockSigner::new("maker-key"));
    let trades = Arc::new(InMemoryTradeRepository::new());
    let offers = Arc::new(InMemoryOfferRepository::new());
    let manager = TradeManager::new(
        Arc::clone(&trades) as Arc<dyn TradeRepository>,
        Arc::clone(&offers) as Arc<dyn OfferRepository>,
        EscrowCoordinator::new(Arc::clone(&wallet) as Arc<dyn WalletClient>, EscrowConfig::default()),
        PaymentProtocol::new(
            Arc::clone(&transport) as Arc<dyn MessageTransport>,
            Arc::clone(&signer),
        ),
        signer,
        ManagerConfig::default()
            .with_payout_address("addr:maker")
            .with_payment_account(serde_json::json!({ "method": "SEPA", "iban": "DE02" })),
    );
    Node {
        manager,
        wallet,
        transport,
        trades,
        offers,
    }
}

async fn seed_offer(node: &Node) -> OfferId {
    let mut offer = Offer::new(
        OfferId::new("offer-1"),
        TraderId::new("maker-1"),
        OfferDirection::Sell,
        Amount::from_atomic(TRADE_AMOUNT),
        Amount::from_atomic(1_000_000),
        PriceSpec::fixed(Price::new(Decimal::new(43_000, 0)).unwrap()),
        15,
        "acct-1",
    )
    .unwrap();
    offer.activate().unwrap();
    node.offers.save(&offer).await.unwrap();
    offer.id().clone()
}

fn buyer_envelope(trade_id: TradeId, payload: TradeMessagePayload) -> TradeMessageEnvelope {
    let signer = MockSigner::new("taker-key");
    let envelope = TradeMessageEnvelope::new(trade_id, TraderId::new("taker-1"), payload);
    let signature = signer.sign(&envelope.signable_bytes().unwrap()).unwrap();
    envelope.with_signature(signature)
}

async fn unlocked_trade(node: &Node) -> TradeId {
    let offer_id = seed_offer(node).await;
    let request = TakeOfferRequest {
        offer_id,
        taker_id: TraderId::new("taker-1"),
        amount: Amount::from_atomic(TRADE_AMOUNT),
        taker_pub_key: "taker-key".to_string(),
        taker_payout_address: "addr:taker".to_string(),
        taker_payment_account: serde_json::json!({ "method": "SEPA", "iban": "FR76" }),
    };
    let trade_id = node.manager.take_offer(request, "sig-taker", None).await.unwrap();

    let maker_tx = node.manager.fund_escrow(&trade_id).await.unwrap().unwrap();
    let taker_tx = TxId::new("tx-taker-deposit");
    node.manager
        .record_peer_deposit(&trade_id, TradeRole::Taker, taker_tx.clone())
        .await
        .unwrap();
    node.wallet.set_confirmations(maker_tx, 10);
    node.wallet.set_confirmations(taker_tx, 10);
    node.manager.tick(Timestamp::now()).await.unwrap();
    trade_id
}

#[tokio::test]
async fn cooperative_lifecycle_runs_to_completion() {
    let node = node();
    let mut events = node.manager.subscribe();
    let trade_id = unlocked_trade(&node).await;

    node.manager
        .on_message(buyer_envelope(
            trade_id.clone(),
            TradeMessagePayload::PaymentStarted {
                counter_currency_tx_id: Some("bank-ref-1".to_string()),
            },
        ))
        .await;

    let payout_tx = node.manager.confirm_payment_received(&trade_id).await.unwrap();
    node.manager.withdraw_funds(&trade_id).await.unwrap();

    let trade = node.trades.get(&trade_id).await.unwrap().unwrap();
    assert_eq!(trade.state(), TradeState::TradeCompleted);
    assert_eq!(trade.payout_tx(), Some(&payout_tx));
    assert!(node.trades.find_active().await.unwrap().is_empty());

    // The escrow paid the full 13M: 11.5M to the buyer, 1.5M to the seller.
    let payout = node.wallet.published().pop().unwrap();
    let paid: u64 = payout.outputs.iter().map(|o| o.amount.as_atomic()).sum();
    assert_eq!(paid, TRADE_AMOUNT + 2 * DEPOSIT);

    let mut names = Vec::new();
    let mut replayed = events.try_recv();
    while let Ok(event) = replayed {
        names.push(event.event_name());
        replayed = events.try_recv();
    }
    assert!(names.contains(&"TradeCreated"));
    assert!(names.contains(&"DepositsUnlocked"));
    assert!(names.contains(&"PaymentStartedReceived"));
    assert!(names.contains(&"PayoutPublished"));
}

#[tokio::test]
async fn disputed_lifecycle_settles_through_the_arbitrator() {
    let node = node();
    let trade_id = unlocked_trade(&node).await;

    node.manager
        .open_dispute(
            &trade_id,
            TraderId::new("taker-1"),
            DisputeChannel::Arbitrator,
            DisputeReason::SellerNotResponding,
        )
        .await
        .unwrap();

    let result = escrow_engine::domain::entities::DisputeResult {
        trade_id: trade_id.clone(),
        opened_by: TraderId::new("taker-1"),
        winner: TraderPosition::Buyer,
        reason: DisputeReason::SellerNotResponding,
        buyer_payout_amount: Amount::from_atomic(TRADE_AMOUNT + 2 * DEPOSIT),
        seller_payout_amount: Amount::ZERO,
        summary_notes: "seller unresponsive".to_string(),
        closed_at: Timestamp::now(),
    };
    node.manager.resolve_dispute(&trade_id, result).await.unwrap();

    let trade = node.trades.get(&trade_id).await.unwrap().unwrap();
    assert_eq!(trade.state(), TradeState::PayoutTxPublished);
    assert!(!trade.dispute().unwrap().is_open());

    node.manager.withdraw_funds(&trade_id).await.unwrap();
    assert_eq!(
        node.trades.get(&trade_id).await.unwrap().unwrap().state(),
        TradeState::TradeCompleted
    );

    // No payment messages ever went out; only acks would have.
    assert_eq!(node.transport.sent_count(), 0);
}

#[tokio::test]
async fn restarted_node_resumes_where_it_left_off() {
    let node = node();
    let trade_id = unlocked_trade(&node).await;
    node.manager
        .on_message(buyer_envelope(
            trade_id.clone(),
            TradeMessagePayload::PaymentStarted {
                counter_currency_tx_id: None,
            },
        ))
        .await;

    // A second manager over the same repositories stands in for a restart.
    let manager = TradeManager::new(
        Arc::clone(&node.trades) as Arc<dyn TradeRepository>,
        Arc::clone(&node.offers) as Arc<dyn OfferRepository>,
        EscrowCoordinator::new(
            Arc::clone(&node.wallet) as Arc<dyn WalletClient>,
            EscrowConfig::default(),
        ),
        PaymentProtocol::new(
            Arc::clone(&node.transport) as Arc<dyn MessageTransport>,
            Arc::new(MockSigner::new("maker-key")),
        ),
        Arc::new(MockSigner::new("maker-key")),
        ManagerConfig::default().with_payout_address("addr:maker"),
    );
    assert_eq!(manager.recover_on_startup().await.unwrap(), 1);

    let sent_before = node.transport.sent_count();
    manager.tick(Timestamp::now()).await.unwrap();
    // Nothing was re-sent: the persisted state already records receipt.
    assert_eq!(node.transport.sent_count(), sent_before);
    assert_eq!(
        node.trades.get(&trade_id).await.unwrap().unwrap().state(),
        TradeState::SellerReceivedPaymentSentMsg
    );

    let payout_tx = manager.confirm_payment_received(&trade_id).await.unwrap();
    assert_eq!(
        node.trades.get(&trade_id).await.unwrap().unwrap().payout_tx(),
        Some(&payout_tx)
    );
}
