//! Integration Tests - End-to-end Execution Engine Testing
//!
//! Tests the interaction between usecases, ports, and mock adapters.
//! Uses mockall for trait mocking and tokio's paused clock for the
//! timing properties of the waiters and the retry loop.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256};
use mockall::mock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use wrap_cycle_bot::adapters::chain::WrappedNative;
use wrap_cycle_bot::adapters::metrics::MetricsRegistry;
use wrap_cycle_bot::config::AppConfig;
use wrap_cycle_bot::config::loader::parse_config;
use wrap_cycle_bot::domain::{
    ActionCall, ActionKind, Endpoint, EndpointPool, Receipt, ReceiptStatus, TxHash, TxIntent,
};
use wrap_cycle_bot::ports::{
    ChainClient, ChainConnector, ChainError, Journal, JournalEntry, NoopTelemetry, SignError,
    SignedTx, Telemetry, TxSigner,
};
use wrap_cycle_bot::usecases::{
    BalanceQuery, BalanceWaiter, ConfirmationWaiter, ExecutionError, ExecutionOutcome, Failover,
    HaltReason, PollPolicy, RetryPolicy, ScheduleOutcome, TransactionExecutor, UnconfirmedTx,
    WaitError, WrapCycle,
};

// ---- Mock Definitions ----

mock! {
    pub ChainCli {}

    #[async_trait::async_trait]
    impl ChainClient for ChainCli {
        async fn balance(&self, address: Address) -> Result<U256, ChainError>;
        async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;
        async fn submit(&self, tx: &SignedTx) -> Result<TxHash, ChainError>;
        async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, ChainError>;
        async fn token_balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError>;
    }
}

mock! {
    pub Connector {}

    impl ChainConnector for Connector {
        type Client = MockChainCli;
        fn connect(&self, endpoint: &Endpoint) -> Result<MockChainCli, ChainError>;
    }
}

mock! {
    pub Signer {}

    #[async_trait::async_trait]
    impl TxSigner for Signer {
        fn address(&self) -> Address;
        async fn sign(&self, intent: &TxIntent) -> Result<SignedTx, SignError>;
    }
}

mock! {
    pub Recorder {}

    #[async_trait::async_trait]
    impl Journal for Recorder {
        async fn record(&self, entry: &JournalEntry) -> anyhow::Result<()>;
    }
}

/// Client that reports a healthy balance but never answers anything else.
struct StalledClient;

#[async_trait::async_trait]
impl ChainClient for StalledClient {
    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(U256::from(10))
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
        std::future::pending().await
    }

    async fn submit(&self, _tx: &SignedTx) -> Result<TxHash, ChainError> {
        std::future::pending().await
    }

    async fn receipt(&self, _hash: TxHash) -> Result<Option<Receipt>, ChainError> {
        std::future::pending().await
    }

    async fn token_balance_of(&self, _token: Address, _owner: Address) -> Result<U256, ChainError> {
        std::future::pending().await
    }
}

struct StalledConnector;

impl ChainConnector for StalledConnector {
    type Client = StalledClient;

    fn connect(&self, _endpoint: &Endpoint) -> Result<StalledClient, ChainError> {
        Ok(StalledClient)
    }
}

// ---- Helpers ----

fn owner() -> Address {
    Address::repeat_byte(0x11)
}

fn weth() -> Address {
    "0xA51894664A773981C6C112C43ce576f315d5b1B6".parse().unwrap()
}

/// Deterministic signed form of an intent: hash derived from the nonce.
fn signed(intent: &TxIntent) -> SignedTx {
    SignedTx {
        raw: Bytes::from(intent.nonce.to_be_bytes().to_vec()),
        hash: TxHash(B256::with_last_byte(intent.nonce as u8)),
        nonce: intent.nonce,
    }
}

fn signer() -> MockSigner {
    let mut signer = MockSigner::new();
    signer.expect_address().return_const(owner());
    signer.expect_sign().returning(|intent| Ok(signed(intent)));
    signer
}

fn endpoints(urls: &[&str]) -> EndpointPool {
    EndpointPool::new(urls.iter().map(|u| Endpoint::new(*u)).collect()).unwrap()
}

/// Connector handing out `clients` in order, one per connect call,
/// recording which endpoint each was built for.
fn connector(clients: Vec<MockChainCli>, seen: Arc<Mutex<Vec<String>>>) -> MockConnector {
    let count = clients.len();
    let queue = Mutex::new(VecDeque::from(clients));
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .times(count)
        .returning(move |endpoint| {
            seen.lock().unwrap().push(endpoint.as_str().to_string());
            Ok(queue.lock().unwrap().pop_front().unwrap())
        });
    connector
}

fn failover(urls: &[&str], clients: Vec<MockChainCli>) -> Arc<Failover<MockConnector>> {
    failover_observed(urls, clients, Arc::default(), Arc::new(NoopTelemetry))
}

fn failover_observed(
    urls: &[&str],
    clients: Vec<MockChainCli>,
    seen: Arc<Mutex<Vec<String>>>,
    telemetry: Arc<dyn Telemetry>,
) -> Arc<Failover<MockConnector>> {
    Arc::new(
        Failover::new(endpoints(urls), connector(clients, seen))
            .unwrap()
            .with_telemetry(telemetry),
    )
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_secs(5),
        deadline: None,
    }
}

fn executor(
    failover: &Arc<Failover<MockConnector>>,
    gas_limit: u64,
    policy: RetryPolicy,
    cancel: CancellationToken,
) -> TransactionExecutor<MockConnector, MockSigner> {
    TransactionExecutor::new(Arc::clone(failover), Arc::new(signer()), 167_000, gas_limit, policy, cancel)
}

fn stalled_failover() -> Arc<Failover<StalledConnector>> {
    Arc::new(Failover::new(endpoints(&["http://a"]), StalledConnector).unwrap())
}

fn hash_for_nonce(nonce: u8) -> TxHash {
    TxHash(B256::with_last_byte(nonce))
}

fn wrap_call() -> ActionCall {
    WrappedNative::new(weth()).wrap(U256::from(5))
}

fn submitted(outcome: ExecutionOutcome) -> wrap_cycle_bot::usecases::Submission {
    match outcome {
        ExecutionOutcome::Submitted(submission) => submission,
        other => panic!("expected submission, got {other:?}"),
    }
}

// ---- Executor: end-to-end scenarios ----

#[tokio::test]
async fn scenario_a_sufficient_balance_submits_once() {
    let mut client = MockChainCli::new();
    client.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    client.expect_submit().times(1).returning(|tx| Ok(tx.hash));

    let failover = failover(&["http://a"], vec![client]);
    // Cost estimate: 1 gas × 1 wei.
    let outcome = executor(&failover, 1, policy(20), CancellationToken::new())
        .execute(&wrap_call(), 1, 0)
        .await
        .unwrap();

    let submission = submitted(outcome);
    assert_eq!(submission.attempts, 1);
    assert_eq!(submission.hash, TxHash(B256::with_last_byte(0)));
}

#[tokio::test]
async fn scenario_b_insufficient_balance_never_submits() {
    let mut client = MockChainCli::new();
    client.expect_balance().times(1).returning(|_| Ok(U256::from(1)));
    client.expect_submit().times(0);

    let failover = failover(&["http://a"], vec![client]);
    // Cost estimate: 2 gas × 1 wei, balance covers half.
    let outcome = executor(&failover, 2, policy(20), CancellationToken::new())
        .execute(&wrap_call(), 1, 0)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExecutionOutcome::InsufficientFunds {
            balance: U256::from(1),
            required: U256::from(2),
        }
    );
}

#[tokio::test]
async fn scenario_c_transport_failure_rotates_once() {
    let mut first = MockChainCli::new();
    first.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    first
        .expect_submit()
        .times(1)
        .returning(|_| Err(ChainError::Transport("connection reset".into())));

    let mut second = MockChainCli::new();
    second.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    second.expect_submit().times(1).returning(|tx| Ok(tx.hash));

    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let failover = failover_observed(
        &["http://a", "http://b"],
        vec![first, second],
        Arc::default(),
        Arc::clone(&metrics) as Arc<dyn Telemetry>,
    );

    let outcome = executor(&failover, 1, policy(20), CancellationToken::new())
        .execute(&wrap_call(), 1, 0)
        .await
        .unwrap();

    let submission = submitted(outcome);
    assert_eq!(submission.attempts, 2);
    assert_eq!(submission.endpoint.as_str(), "http://b");
    assert_eq!(metrics.endpoint_rotations.get(), 1);
    assert_eq!(failover.endpoint().as_str(), "http://b");
}

#[tokio::test(start_paused = true)]
async fn scenario_d_balance_waiter_returns_on_fourth_poll() {
    let polls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&polls);

    let mut client = MockChainCli::new();
    client.expect_token_balance_of().returning(move |_, _| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(if n < 3 { U256::ZERO } else { U256::from(5) })
    });

    let interval = Duration::from_secs(5);
    let waiter = BalanceWaiter::new(
        failover(&["http://a"], vec![client]),
        PollPolicy::new(interval, Duration::from_secs(60)),
        CancellationToken::new(),
    );

    let started = Instant::now();
    let balance = waiter
        .wait(
            BalanceQuery::Token {
                token: weth(),
                owner: owner(),
            },
            |b| !b.is_zero(),
        )
        .await
        .unwrap();

    assert_eq!(balance, U256::from(5));
    assert_eq!(polls.load(Ordering::SeqCst), 4);
    assert_eq!(started.elapsed(), interval * 3);
}

// ---- Executor: recovery properties ----

#[tokio::test]
async fn transport_failure_moves_to_next_endpoint_in_order() {
    let mut a = MockChainCli::new();
    a.expect_balance()
        .times(1)
        .returning(|_| Err(ChainError::Transport("timeout".into())));

    let mut b = MockChainCli::new();
    b.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    b.expect_submit()
        .times(1)
        .returning(|_| Err(ChainError::Transport("502 bad gateway".into())));

    let mut c = MockChainCli::new();
    c.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    c.expect_submit().times(1).returning(|tx| Ok(tx.hash));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let failover = failover_observed(
        &["http://a", "http://b", "http://c"],
        vec![a, b, c],
        Arc::clone(&seen),
        Arc::new(NoopTelemetry),
    );

    let submission = submitted(
        executor(&failover, 1, policy(20), CancellationToken::new())
            .execute(&wrap_call(), 1, 0)
            .await
            .unwrap(),
    );

    assert_eq!(submission.attempts, 3);
    assert_eq!(*seen.lock().unwrap(), vec!["http://a", "http://b", "http://c"]);
}

#[tokio::test]
async fn nonce_conflict_resubmits_with_fresh_nonce() {
    let mut client = MockChainCli::new();
    // Balance is only checked before the first submission.
    client.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    client
        .expect_submit()
        .withf(|tx| tx.nonce == 3)
        .times(1)
        .returning(|_| Err(ChainError::NonceConflict("nonce too low".into())));
    client.expect_pending_nonce().times(1).returning(|_| Ok(9));
    client
        .expect_submit()
        .withf(|tx| tx.nonce == 9)
        .times(1)
        .returning(|tx| Ok(tx.hash));

    let failover = failover(&["http://a"], vec![client]);
    let submission = submitted(
        executor(&failover, 1, policy(20), CancellationToken::new())
            .execute(&wrap_call(), 1, 3)
            .await
            .unwrap(),
    );

    assert_eq!(submission.nonce, 9);
    assert_eq!(submission.attempts, 2);
}

#[tokio::test]
async fn already_known_counts_as_submitted() {
    let mut client = MockChainCli::new();
    client.expect_balance().returning(|_| Ok(U256::from(10)));
    client
        .expect_submit()
        .times(1)
        .returning(|_| Err(ChainError::AlreadyKnown("already known".into())));

    let failover = failover(&["http://a"], vec![client]);
    let submission = submitted(
        executor(&failover, 1, policy(20), CancellationToken::new())
            .execute(&wrap_call(), 1, 4)
            .await
            .unwrap(),
    );

    assert_eq!(submission.hash, TxHash(B256::with_last_byte(4)));
}

#[tokio::test(start_paused = true)]
async fn retry_ceiling_stops_after_max_attempts() {
    let mut client = MockChainCli::new();
    client.expect_balance().times(3).returning(|_| Ok(U256::from(10)));
    client
        .expect_submit()
        .times(3)
        .returning(|_| Err(ChainError::Rejected("execution reverted".into())));

    let failover = failover(&["http://a"], vec![client]);
    let started = Instant::now();
    let err = executor(&failover, 1, policy(3), CancellationToken::new())
        .execute(&wrap_call(), 1, 0)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::RetriesExhausted {
            attempts: 3,
            last: ChainError::Rejected(_),
            ..
        }
    ));
    // Two backoffs between three attempts.
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn unbounded_retry_stops_on_cancellation() {
    let mut client = MockChainCli::new();
    client.expect_balance().returning(|_| Ok(U256::from(10)));
    client
        .expect_submit()
        .returning(|_| Err(ChainError::Rejected("underpriced".into())));

    let failover = failover(&["http://a"], vec![client]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = executor(&failover, 1, policy(0), cancel)
        .execute(&wrap_call(), 1, 0)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ExecutionError::Cancelled {
            unconfirmed: Vec::new()
        }
    );
    assert_eq!(started.elapsed(), Duration::from_secs(12));
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let client = MockChainCli::new();
    let failover = failover(&["http://a"], vec![client]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = executor(&failover, 1, policy(20), cancel)
        .execute(&wrap_call(), 1, 0)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ExecutionError::Cancelled {
            unconfirmed: Vec::new()
        }
    );
}

#[tokio::test]
async fn signing_failure_is_not_retried() {
    let mut client = MockChainCli::new();
    client.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    client.expect_submit().times(0);

    let mut signer = MockSigner::new();
    signer.expect_address().return_const(owner());
    signer
        .expect_sign()
        .times(1)
        .returning(|_| Err(SignError("chain id mismatch".into())));

    let failover = failover(&["http://a"], vec![client]);
    let err = TransactionExecutor::new(
        failover,
        Arc::new(signer),
        167_000,
        1,
        policy(20),
        CancellationToken::new(),
    )
    .execute(&wrap_call(), 1, 0)
    .await
    .unwrap_err();

    assert!(matches!(err, ExecutionError::Signing(_)));
}

#[tokio::test]
async fn lost_broadcast_response_is_reported_unconfirmed() {
    // Endpoint a accepts nonce 3 but the response never arrives.
    let mut a = MockChainCli::new();
    a.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    a.expect_submit()
        .times(1)
        .returning(|_| Err(ChainError::Transport("response lost".into())));

    let mut b = MockChainCli::new();
    b.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    b.expect_submit()
        .withf(|tx| tx.nonce == 3)
        .times(1)
        .returning(|_| Err(ChainError::NonceConflict("nonce too low".into())));
    b.expect_receipt()
        .withf(|hash| *hash == hash_for_nonce(3))
        .times(1)
        .returning(|_| Ok(None));
    b.expect_pending_nonce().times(1).returning(|_| Ok(4));
    b.expect_submit()
        .withf(|tx| tx.nonce == 4)
        .times(1)
        .returning(|tx| Ok(tx.hash));

    let failover = failover(&["http://a", "http://b"], vec![a, b]);
    let submission = submitted(
        executor(&failover, 1, policy(20), CancellationToken::new())
            .execute(&wrap_call(), 1, 3)
            .await
            .unwrap(),
    );

    assert_eq!(submission.hash, hash_for_nonce(4));
    assert_eq!(submission.nonce, 4);
    assert_eq!(
        submission.unconfirmed,
        vec![UnconfirmedTx {
            hash: hash_for_nonce(3),
            nonce: 3,
            endpoint: Endpoint::new("http://a"),
        }]
    );
}

#[tokio::test]
async fn lost_broadcast_found_mined_is_not_resent() {
    let mut a = MockChainCli::new();
    a.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    a.expect_submit()
        .times(1)
        .returning(|_| Err(ChainError::Transport("response lost".into())));

    let mut b = MockChainCli::new();
    b.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    b.expect_submit()
        .times(1)
        .returning(|_| Err(ChainError::NonceConflict("nonce too low".into())));
    b.expect_receipt().times(1).returning(|hash| {
        Ok(Some(Receipt {
            hash,
            status: ReceiptStatus::Success,
            block_number: Some(9),
        }))
    });
    b.expect_pending_nonce().times(0);

    let failover = failover(&["http://a", "http://b"], vec![a, b]);
    let submission = submitted(
        executor(&failover, 1, policy(20), CancellationToken::new())
            .execute(&wrap_call(), 1, 3)
            .await
            .unwrap(),
    );

    assert_eq!(submission.hash, hash_for_nonce(3));
    assert_eq!(submission.nonce, 3);
    assert_eq!(submission.endpoint.as_str(), "http://a");
    assert!(submission.unconfirmed.is_empty());
}

#[tokio::test]
async fn nonce_refresh_transport_failure_rotates_and_refreshes_again() {
    let mut a = MockChainCli::new();
    a.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    a.expect_submit()
        .withf(|tx| tx.nonce == 3)
        .times(1)
        .returning(|_| Err(ChainError::NonceConflict("nonce too low".into())));
    a.expect_pending_nonce()
        .times(1)
        .returning(|_| Err(ChainError::Transport("connection reset".into())));

    let mut b = MockChainCli::new();
    b.expect_balance().times(1).returning(|_| Ok(U256::from(10)));
    b.expect_pending_nonce().times(1).returning(|_| Ok(7));
    b.expect_submit()
        .withf(|tx| tx.nonce == 7)
        .times(1)
        .returning(|tx| Ok(tx.hash));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let failover = failover_observed(
        &["http://a", "http://b"],
        vec![a, b],
        Arc::clone(&seen),
        Arc::new(NoopTelemetry),
    );

    let submission = submitted(
        executor(&failover, 1, policy(20), CancellationToken::new())
            .execute(&wrap_call(), 1, 3)
            .await
            .unwrap(),
    );

    assert_eq!(submission.nonce, 7);
    assert_eq!(submission.attempts, 3);
    assert_eq!(*seen.lock().unwrap(), vec!["http://a", "http://b"]);
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_unbounded_retries() {
    let mut client = MockChainCli::new();
    client.expect_balance().times(3).returning(|_| Ok(U256::from(10)));
    client
        .expect_submit()
        .times(3)
        .returning(|_| Err(ChainError::Rejected("underpriced".into())));

    let failover = failover(&["http://a"], vec![client]);
    let deadline = Duration::from_secs(12);
    let started = Instant::now();
    let err = executor(
        &failover,
        1,
        RetryPolicy {
            deadline: Some(deadline),
            ..policy(0)
        },
        CancellationToken::new(),
    )
    .execute(&wrap_call(), 1, 0)
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::DeadlineExceeded {
            attempts: 3,
            last: ChainError::Rejected(_),
            ..
        }
    ));
    // Attempts at 0s, 5s and 10s; the last backoff is cut to the deadline.
    assert_eq!(started.elapsed(), deadline);
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_in_flight_submit() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = TransactionExecutor::new(
        stalled_failover(),
        Arc::new(signer()),
        167_000,
        1,
        policy(20),
        cancel,
    )
    .execute(&wrap_call(), 1, 0)
    .await
    .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_secs(1));
    // The request may have reached the node, so its hash is still reported.
    assert_eq!(
        err,
        ExecutionError::Cancelled {
            unconfirmed: vec![UnconfirmedTx {
                hash: hash_for_nonce(0),
                nonce: 0,
                endpoint: Endpoint::new("http://a"),
            }]
        }
    );
}

// ---- Confirmation waiter timing ----

#[tokio::test(start_paused = true)]
async fn confirmation_returns_within_one_interval_of_receipt() {
    let hash = TxHash(B256::repeat_byte(0x42));
    let mined_at = Instant::now() + Duration::from_secs(12);

    let mut client = MockChainCli::new();
    client.expect_receipt().returning(move |hash| {
        Ok((Instant::now() >= mined_at).then_some(Receipt {
            hash,
            status: ReceiptStatus::Success,
            block_number: Some(100),
        }))
    });

    let interval = Duration::from_secs(5);
    let waiter = ConfirmationWaiter::new(
        failover(&["http://a"], vec![client]),
        PollPolicy::new(interval, Duration::from_secs(60)),
        CancellationToken::new(),
    );

    let started = Instant::now();
    let receipt = waiter.wait(hash).await.unwrap();

    assert_eq!(receipt.hash, hash);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(12));
    assert!(elapsed <= Duration::from_secs(12) + interval);
}

#[tokio::test(start_paused = true)]
async fn confirmation_times_out_no_earlier_than_timeout() {
    let hash = TxHash(B256::repeat_byte(0x43));
    let mut client = MockChainCli::new();
    client.expect_receipt().returning(|_| Ok(None));

    let timeout = Duration::from_secs(60);
    let waiter = ConfirmationWaiter::new(
        failover(&["http://a"], vec![client]),
        PollPolicy::new(Duration::from_secs(5), timeout),
        CancellationToken::new(),
    );

    let started = Instant::now();
    let err = waiter.wait(hash).await.unwrap_err();

    assert_eq!(err, WaitError::ConfirmationTimeout { hash, timeout });
    assert!(started.elapsed() >= timeout);
}

#[tokio::test(start_paused = true)]
async fn confirmation_timeout_bounds_a_stalled_lookup() {
    let hash = TxHash(B256::repeat_byte(0x44));
    let timeout = Duration::from_secs(60);
    let waiter = ConfirmationWaiter::new(
        stalled_failover(),
        PollPolicy::new(Duration::from_secs(5), timeout),
        CancellationToken::new(),
    );

    let started = Instant::now();
    let err = waiter.wait(hash).await.unwrap_err();

    assert_eq!(err, WaitError::ConfirmationTimeout { hash, timeout });
    assert_eq!(started.elapsed(), timeout);
}

#[tokio::test(start_paused = true)]
async fn balance_waiter_times_out_no_earlier_than_timeout() {
    let mut client = MockChainCli::new();
    client.expect_token_balance_of().returning(|_, _| Ok(U256::ZERO));

    let timeout = Duration::from_secs(30);
    let waiter = BalanceWaiter::new(
        failover(&["http://a"], vec![client]),
        PollPolicy::new(Duration::from_secs(5), timeout),
        CancellationToken::new(),
    );
    let query = BalanceQuery::Token {
        token: weth(),
        owner: owner(),
    };

    let started = Instant::now();
    let err = waiter.wait(query, |b| !b.is_zero()).await.unwrap_err();

    assert_eq!(err, WaitError::BalanceTimeout { query, timeout });
    assert!(started.elapsed() >= timeout);
}

#[tokio::test(start_paused = true)]
async fn reverted_receipt_still_confirms() {
    let mut client = MockChainCli::new();
    client.expect_receipt().returning(|hash| {
        Ok(Some(Receipt {
            hash,
            status: ReceiptStatus::Failure,
            block_number: Some(7),
        }))
    });

    let waiter = ConfirmationWaiter::new(
        failover(&["http://a"], vec![client]),
        PollPolicy::new(Duration::from_secs(5), Duration::from_secs(60)),
        CancellationToken::new(),
    );

    let receipt = waiter.wait(TxHash(B256::ZERO)).await.unwrap();
    assert!(!receipt.succeeded());
}

// ---- WrapCycle driver over an in-memory ledger ----

/// Minimal chain state shared by the signer and client mocks.
#[derive(Default)]
struct Ledger {
    native: U256,
    token: U256,
    next_nonce: u64,
    signed: HashMap<u64, TxIntent>,
    mined: Vec<TxHash>,
    revert: bool,
    /// Wraps debit native but never credit the token.
    withhold_token: bool,
}

fn ledger_signer(ledger: Arc<Mutex<Ledger>>) -> MockSigner {
    let mut signer = MockSigner::new();
    signer.expect_address().return_const(owner());
    signer.expect_sign().returning(move |intent| {
        ledger.lock().unwrap().signed.insert(intent.nonce, intent.clone());
        Ok(signed(intent))
    });
    signer
}

fn ledger_client(ledger: Arc<Mutex<Ledger>>) -> MockChainCli {
    let mut client = MockChainCli::new();

    let l = Arc::clone(&ledger);
    client.expect_balance().returning(move |_| Ok(l.lock().unwrap().native));

    let l = Arc::clone(&ledger);
    client
        .expect_token_balance_of()
        .returning(move |_, _| Ok(l.lock().unwrap().token));

    let l = Arc::clone(&ledger);
    client
        .expect_pending_nonce()
        .returning(move |_| Ok(l.lock().unwrap().next_nonce));

    let l = Arc::clone(&ledger);
    client.expect_submit().returning(move |tx| {
        let mut state = l.lock().unwrap();
        let intent = state.signed[&tx.nonce].clone();
        match intent.kind {
            ActionKind::Wrap => {
                state.native -= intent.value;
                if !state.withhold_token {
                    state.token += intent.value;
                }
            }
            ActionKind::Unwrap => {
                let amount = state.token;
                state.token = U256::ZERO;
                state.native += amount;
            }
        }
        state.next_nonce += 1;
        state.mined.push(tx.hash);
        Ok(tx.hash)
    });

    let l = ledger;
    client.expect_receipt().returning(move |hash| {
        let state = l.lock().unwrap();
        Ok(state.mined.contains(&hash).then(|| Receipt {
            hash,
            status: if state.revert {
                ReceiptStatus::Failure
            } else {
                ReceiptStatus::Success
            },
            block_number: Some(1),
        }))
    });

    client
}

fn cycle_config(iterations: u32, halt_on_insufficient_funds: bool) -> AppConfig {
    cycle_config_with(iterations, halt_on_insufficient_funds, "")
}

fn cycle_config_with(iterations: u32, halt_on_insufficient_funds: bool, extra: &str) -> AppConfig {
    parse_config(&format!(
        r#"
        [bot]
        name = "wrap-cycle-test"

        [network]
        endpoints = ["http://a"]
        validate_on_startup = false

        [contracts]
        wrapped_native = "0xA51894664A773981C6C112C43ce576f315d5b1B6"

        [polling]
        confirmation_interval_secs = 1
        confirmation_timeout_secs = 10
        balance_interval_secs = 1
        balance_timeout_secs = 10

        [schedule]
        iterations = {iterations}
        duration_hours = 0.0
        halt_on_insufficient_funds = {halt_on_insufficient_funds}

        {extra}
        "#
    ))
    .unwrap()
}

fn cycle(
    config: &AppConfig,
    ledger: &Arc<Mutex<Ledger>>,
    journal: MockRecorder,
    cancel: CancellationToken,
) -> WrapCycle<MockConnector, MockSigner> {
    WrapCycle::new(
        config,
        failover(&["http://a"], vec![ledger_client(Arc::clone(ledger))]),
        Arc::new(ledger_signer(Arc::clone(ledger))),
        Arc::new(journal),
        Arc::new(NoopTelemetry),
        cancel,
    )
    .unwrap()
}

fn one_ether() -> U256 {
    U256::from(1_000_000_000_000_000_000u128)
}

#[tokio::test(start_paused = true)]
async fn wrap_cycle_completes_round_trips() {
    let ledger = Arc::new(Mutex::new(Ledger {
        native: one_ether(),
        ..Ledger::default()
    }));

    let mut journal = MockRecorder::new();
    // Broadcast + confirmation for each of four transactions.
    journal.expect_record().times(8).returning(|_| Ok(()));

    let report = cycle(&cycle_config(2, true), &ledger, journal, CancellationToken::new())
        .run()
        .await;

    assert_eq!(report.outcome, ScheduleOutcome::Completed);
    assert_eq!(report.completed, 2);
    assert_eq!(report.exit_code(), 0);

    let state = ledger.lock().unwrap();
    assert_eq!(state.next_nonce, 4);
    assert_eq!(state.token, U256::ZERO);
    assert_eq!(state.native, one_ether());
    // First wrap moved 90% of the balance.
    assert_eq!(state.signed[&0].value, one_ether() * U256::from(9) / U256::from(10));
    assert_eq!(state.signed[&1].kind, ActionKind::Unwrap);
}

#[tokio::test(start_paused = true)]
async fn wrap_cycle_halts_when_precheck_fails() {
    // Far below 500_000 gas at the minimum band price.
    let ledger = Arc::new(Mutex::new(Ledger {
        native: U256::from(1_000u64),
        ..Ledger::default()
    }));

    let mut journal = MockRecorder::new();
    journal.expect_record().times(0);

    let report = cycle(&cycle_config(3, true), &ledger, journal, CancellationToken::new())
        .run()
        .await;

    assert!(matches!(
        report.outcome,
        ScheduleOutcome::Halted(HaltReason::InsufficientFunds { .. })
    ));
    assert_eq!(report.completed, 0);
    assert_eq!(report.exit_code(), 1);
    assert!(ledger.lock().unwrap().signed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn wrap_cycle_skips_when_configured() {
    let ledger = Arc::new(Mutex::new(Ledger {
        native: U256::from(1_000u64),
        ..Ledger::default()
    }));

    let mut journal = MockRecorder::new();
    journal.expect_record().times(0);

    let report = cycle(&cycle_config(3, false), &ledger, journal, CancellationToken::new())
        .run()
        .await;

    assert_eq!(report.outcome, ScheduleOutcome::Completed);
    assert_eq!(report.completed, 0);
    assert_eq!(report.skipped, 3);
    // Skipped iterations mean the schedule did not fully run.
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn wrap_cycle_halts_on_reverted_wrap() {
    let ledger = Arc::new(Mutex::new(Ledger {
        native: one_ether(),
        revert: true,
        ..Ledger::default()
    }));

    let mut journal = MockRecorder::new();
    journal.expect_record().times(2).returning(|_| Ok(()));

    let report = cycle(&cycle_config(1, true), &ledger, journal, CancellationToken::new())
        .run()
        .await;

    assert!(matches!(
        report.outcome,
        ScheduleOutcome::Halted(HaltReason::Reverted {
            action: ActionKind::Wrap,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn wrap_cycle_survives_journal_failures() {
    let ledger = Arc::new(Mutex::new(Ledger {
        native: one_ether(),
        ..Ledger::default()
    }));

    let mut journal = MockRecorder::new();
    journal
        .expect_record()
        .returning(|_| Err(anyhow::anyhow!("disk full")));

    let report = cycle(&cycle_config(1, true), &ledger, journal, CancellationToken::new())
        .run()
        .await;

    assert_eq!(report.outcome, ScheduleOutcome::Completed);
    assert_eq!(report.completed, 1);
}

#[tokio::test(start_paused = true)]
async fn wrap_cycle_cancelled_before_start() {
    let ledger = Arc::new(Mutex::new(Ledger {
        native: one_ether(),
        ..Ledger::default()
    }));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut journal = MockRecorder::new();
    journal.expect_record().times(0);

    let report = cycle(&cycle_config(2, true), &ledger, journal, cancel).run().await;

    assert_eq!(report.outcome, ScheduleOutcome::Halted(HaltReason::Cancelled));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn wrap_cycle_halts_when_token_never_arrives() {
    let ledger = Arc::new(Mutex::new(Ledger {
        native: one_ether(),
        withhold_token: true,
        ..Ledger::default()
    }));

    let mut journal = MockRecorder::new();
    // Wrap broadcast and confirmation only.
    journal.expect_record().times(2).returning(|_| Ok(()));

    let started = Instant::now();
    let report = cycle(&cycle_config(2, true), &ledger, journal, CancellationToken::new())
        .run()
        .await;

    assert!(matches!(
        report.outcome,
        ScheduleOutcome::Halted(HaltReason::Wait(WaitError::BalanceTimeout { .. }))
    ));
    assert_eq!(report.completed, 0);
    assert_eq!(report.exit_code(), 1);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(ledger.lock().unwrap().next_nonce, 1);
}

#[tokio::test(start_paused = true)]
async fn wrap_cycle_leaves_gas_for_the_wrap_itself() {
    // Fixed 1 gwei price: wrap gas costs 1e14 wei, the precheck 5e14.
    let balance = U256::from(800_000_000_000_000u128);
    let ledger = Arc::new(Mutex::new(Ledger {
        native: balance,
        ..Ledger::default()
    }));

    let mut journal = MockRecorder::new();
    journal.expect_record().times(4).returning(|_| Ok(()));

    let config = cycle_config_with(
        1,
        true,
        "[gas]\nmin_price_gwei = 1.0\nmax_price_gwei = 1.000000001",
    );
    let report = cycle(&config, &ledger, journal, CancellationToken::new())
        .run()
        .await;

    assert_eq!(report.outcome, ScheduleOutcome::Completed);
    let state = ledger.lock().unwrap();
    let wrap = &state.signed[&0];
    assert_eq!(wrap.gas_price, 1_000_000_000);
    // 90% of the balance would leave less than the wrap's own gas.
    assert_eq!(wrap.value, U256::from(700_000_000_000_000u128));
    assert_eq!(state.native, balance);
}
