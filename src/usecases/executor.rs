//! Transaction Executor - One Action Under a Retry Policy
//!
//! Executes a single wrap or unwrap: check the balance covers gas,
//! sign, broadcast, and recover from classified failures.
//!
//! Recovery per failure kind:
//! - Transport: rotate to the next endpoint, restart from the balance check
//! - Nonce conflict: re-fetch the pending nonce, resubmit (price unchanged)
//! - Anything else: back off, restart from the balance check
//!
//! A broadcast that fails with a transport error may still have reached
//! the node. Its hash is kept as unconfirmed and reported with the
//! outcome. Before resubmitting at a fresh nonce the executor checks
//! whether one of those broadcasts was already mined.
//!
//! The gas price is chosen by the caller once per action and reused
//! across every attempt.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use alloy::primitives::utils::format_ether;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::failover::Failover;
use crate::config::RetryConfig;
use crate::domain::gas::wei_to_gwei;
use crate::domain::{ActionCall, Endpoint, TxHash, TxIntent, estimated_cost};
use crate::ports::{
  ChainClient, ChainConnector, ChainError, NoopTelemetry, SignError, Telemetry, TxSigner,
};

/// Retry ceiling and backoff for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Maximum attempts; 0 means no ceiling.
  pub max_attempts: u32,
  /// Sleep before retrying an unclassified failure.
  pub backoff: Duration,
  /// Wall-clock budget for the whole action.
  pub deadline: Option<Duration>,
}

impl RetryPolicy {
  pub const fn from_config(config: &RetryConfig) -> Self {
    Self {
      max_attempts: config.max_attempts,
      backoff: Duration::from_secs(config.backoff_secs),
      deadline: match config.deadline_secs {
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
      },
    }
  }

  /// Whether attempt number `attempt` (1-based) may run.
  pub const fn allows(&self, attempt: u32) -> bool {
    self.max_attempts == 0 || attempt <= self.max_attempts
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from_config(&RetryConfig::default())
  }
}

/// A signed transaction that reached an endpoint without a definite
/// answer. The node may or may not have accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedTx {
  pub hash: TxHash,
  pub nonce: u64,
  pub endpoint: Endpoint,
}

/// An endpoint accepted the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
  pub hash: TxHash,
  /// Nonce the accepted transaction carries.
  pub nonce: u64,
  pub gas_price: u128,
  /// Attempts used, including the successful one.
  pub attempts: u32,
  /// Endpoint that accepted it.
  pub endpoint: Endpoint,
  /// Earlier broadcasts of this action whose fate is unknown.
  pub unconfirmed: Vec<UnconfirmedTx>,
}

/// Normal terminal results of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
  Submitted(Submission),
  /// Balance could not cover `gas_limit × gas_price`; nothing was sent.
  InsufficientFunds { balance: U256, required: U256 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
  #[error("execution cancelled")]
  Cancelled { unconfirmed: Vec<UnconfirmedTx> },
  #[error("gave up after {attempts} attempts, last error: {last}")]
  RetriesExhausted {
    attempts: u32,
    last: ChainError,
    unconfirmed: Vec<UnconfirmedTx>,
  },
  #[error("deadline of {deadline:?} passed after {attempts} attempts, last error: {last}")]
  DeadlineExceeded {
    deadline: Duration,
    attempts: u32,
    last: ChainError,
    unconfirmed: Vec<UnconfirmedTx>,
  },
  #[error(transparent)]
  Signing(#[from] SignError),
}

impl ExecutionError {
  /// Broadcasts made before the action failed whose fate is unknown.
  pub fn unconfirmed(&self) -> &[UnconfirmedTx] {
    match self {
      Self::Cancelled { unconfirmed }
      | Self::RetriesExhausted { unconfirmed, .. }
      | Self::DeadlineExceeded { unconfirmed, .. } => unconfirmed,
      Self::Signing(_) => &[],
    }
  }
}

/// What the next attempt has to redo before signing.
#[derive(Debug, Clone, Copy)]
struct Recovery {
  check_balance: bool,
  refresh_nonce: bool,
}

/// Mutable state of one action across attempts.
struct ActionState {
  nonce: u64,
  attempt: u32,
  recovery: Recovery,
  unconfirmed: Vec<UnconfirmedTx>,
}

impl ActionState {
  /// Start tracking `tx`; false if it was already tracked.
  fn track(&mut self, tx: UnconfirmedTx) -> bool {
    if self.unconfirmed.iter().any(|known| known.hash == tx.hash) {
      return false;
    }
    self.unconfirmed.push(tx);
    true
  }

  fn forget(&mut self, hash: &TxHash) {
    self.unconfirmed.retain(|tx| tx.hash != *hash);
  }
}

enum Attempt {
  Finished(ExecutionOutcome),
  Failed(ChainError),
}

/// Executes actions for the signer's account through the failover pool.
pub struct TransactionExecutor<K: ChainConnector, S: TxSigner> {
  failover: Arc<Failover<K>>,
  signer: Arc<S>,
  chain_id: u64,
  gas_limit: u64,
  policy: RetryPolicy,
  cancel: CancellationToken,
  telemetry: Arc<dyn Telemetry>,
}

impl<K: ChainConnector, S: TxSigner> TransactionExecutor<K, S> {
  pub fn new(
    failover: Arc<Failover<K>>,
    signer: Arc<S>,
    chain_id: u64,
    gas_limit: u64,
    policy: RetryPolicy,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      failover,
      signer,
      chain_id,
      gas_limit,
      policy,
      cancel,
      telemetry: Arc::new(NoopTelemetry),
    }
  }

  #[must_use]
  pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
    self.telemetry = telemetry;
    self
  }

  pub const fn gas_limit(&self) -> u64 {
    self.gas_limit
  }

  /// Execute `call` at `gas_price`, starting from `nonce`.
  ///
  /// Returns once an endpoint accepts the transaction or the balance
  /// check fails. Errors only on cancellation, signing failure, or when
  /// the retry policy runs out. Cancellation also interrupts an RPC call
  /// that is in flight.
  #[instrument(
    skip(self, call, gas_price),
    fields(
      action = %call.kind,
      amount = %format_ether(call.amount),
      gas_price_gwei = wei_to_gwei(gas_price),
    )
  )]
  pub async fn execute(
    &self,
    call: &ActionCall,
    gas_price: u128,
    nonce: u64,
  ) -> Result<ExecutionOutcome, ExecutionError> {
    let started = Instant::now();
    let deadline_at = self.policy.deadline.map(|deadline| started + deadline);
    let required = estimated_cost(self.gas_limit, gas_price);
    let mut state = ActionState {
      nonce,
      attempt: 0,
      recovery: Recovery {
        check_balance: true,
        refresh_nonce: false,
      },
      unconfirmed: Vec::new(),
    };
    let mut last_error: Option<ChainError> = None;

    loop {
      if self.cancel.is_cancelled() {
        return Err(self.cancelled(state));
      }
      if let (Some(deadline), Some(at)) = (self.policy.deadline, deadline_at) {
        if Instant::now() >= at {
          if let Some(last) = last_error.take() {
            error!(attempts = state.attempt, error = %last, "Action deadline passed");
            return Err(ExecutionError::DeadlineExceeded {
              deadline,
              attempts: state.attempt,
              last,
              unconfirmed: state.unconfirmed,
            });
          }
        }
      }
      state.attempt += 1;

      let result = tokio::select! {
        () = self.cancel.cancelled() => None,
        result = self.attempt(call, gas_price, required, &mut state) => Some(result),
      };
      let error = match result {
        None => return Err(self.cancelled(state)),
        Some(result) => match result? {
          Attempt::Finished(outcome) => return Ok(outcome),
          Attempt::Failed(error) => error,
        },
      };

      self.telemetry.retry(error.kind());

      if !self.policy.allows(state.attempt + 1) {
        error!(attempts = state.attempt, error = %error, "Retry ceiling reached");
        return Err(ExecutionError::RetriesExhausted {
          attempts: state.attempt,
          last: error,
          unconfirmed: state.unconfirmed,
        });
      }

      let attempt = state.attempt;
      match &error {
        ChainError::Transport(_) => {
          state.recovery.check_balance = true;
          match self.failover.rotate() {
            Ok(endpoint) => warn!(attempt, error = %error, endpoint = %endpoint, "Transport failure, switched endpoint"),
            Err(e) => warn!(attempt, error = %error, rotate_error = %e, "Transport failure, rotation failed"),
          }
        }
        ChainError::NonceConflict(_) => {
          warn!(attempt, nonce = state.nonce, error = %error, "Nonce conflict, refreshing nonce");
          state.recovery.refresh_nonce = true;
          state.recovery.check_balance = false;
        }
        _ => {
          warn!(
            attempt,
            error = %error,
            backoff_secs = self.policy.backoff.as_secs(),
            "Action failed, backing off"
          );
          state.recovery.check_balance = true;
          if !self.backoff(deadline_at).await {
            return Err(self.cancelled(state));
          }
        }
      }
      last_error = Some(error);
    }
  }

  fn cancelled(&self, state: ActionState) -> ExecutionError {
    if state.unconfirmed.is_empty() {
      warn!(attempt = state.attempt, "Execution cancelled");
    } else {
      let hashes: Vec<String> = state.unconfirmed.iter().map(|tx| tx.hash.to_string()).collect();
      warn!(attempt = state.attempt, unconfirmed = ?hashes, "Execution cancelled with broadcasts of unknown fate");
    }
    ExecutionError::Cancelled {
      unconfirmed: state.unconfirmed,
    }
  }

  /// One pass: optional balance check, optional nonce refresh, sign,
  /// broadcast.
  async fn attempt(
    &self,
    call: &ActionCall,
    gas_price: u128,
    required: U256,
    state: &mut ActionState,
  ) -> Result<Attempt, ExecutionError> {
    let client = self.failover.client();
    let endpoint = self.failover.endpoint();
    let from = self.signer.address();

    if state.recovery.check_balance {
      let balance = match client.balance(from).await {
        Ok(balance) => balance,
        Err(e) => return Ok(Attempt::Failed(e)),
      };
      if balance < required {
        warn!(
          balance = %format_ether(balance),
          required = %format_ether(required),
          "Insufficient balance for gas, skipping action"
        );
        self.telemetry.insufficient_funds();
        return Ok(Attempt::Finished(ExecutionOutcome::InsufficientFunds {
          balance,
          required,
        }));
      }
      debug!(balance = %format_ether(balance), "Balance covers gas");
    }

    if state.recovery.refresh_nonce {
      // A nonce conflict after a lost response usually means the lost
      // broadcast was mined.
      match mined_index(client.as_ref(), &state.unconfirmed).await {
        Ok(Some(index)) => {
          let mined = state.unconfirmed.remove(index);
          info!(tx_hash = %mined.hash, nonce = mined.nonce, "Earlier broadcast was mined, not resubmitting");
          self.telemetry.submitted(call.kind);
          return Ok(Attempt::Finished(ExecutionOutcome::Submitted(Submission {
            hash: mined.hash,
            nonce: mined.nonce,
            gas_price,
            attempts: state.attempt,
            endpoint: mined.endpoint,
            unconfirmed: std::mem::take(&mut state.unconfirmed),
          })));
        }
        Ok(None) => {}
        Err(e) => return Ok(Attempt::Failed(e)),
      }

      match client.pending_nonce(from).await {
        Ok(fresh) => {
          info!(stale = state.nonce, fresh, "Nonce refreshed");
          state.nonce = fresh;
          state.recovery.refresh_nonce = false;
        }
        Err(e) => return Ok(Attempt::Failed(e)),
      }
    }

    let intent = TxIntent::from_call(call, from, self.gas_limit, gas_price, state.nonce, self.chain_id);
    let signed = match self.signer.sign(&intent).await {
      Ok(signed) => signed,
      Err(e) => {
        if !state.unconfirmed.is_empty() {
          let hashes: Vec<String> = state.unconfirmed.iter().map(|tx| tx.hash.to_string()).collect();
          warn!(unconfirmed = ?hashes, error = %e, "Signing failed with broadcasts of unknown fate");
        }
        return Err(e.into());
      }
    };

    // Tracked before the call so a cancellation mid-request keeps it.
    let nonce = state.nonce;
    let fresh = state.track(UnconfirmedTx {
      hash: signed.hash,
      nonce,
      endpoint: endpoint.clone(),
    });

    debug!(attempt = state.attempt, nonce = state.nonce, endpoint = %endpoint, "Submitting transaction");
    let hash = match client.submit(&signed).await {
      Ok(hash) => hash,
      Err(ChainError::AlreadyKnown(msg)) => {
        info!(tx_hash = %signed.hash, reason = %msg, "Endpoint already holds this transaction");
        signed.hash
      }
      Err(e @ ChainError::Transport(_)) => {
        warn!(
          tx_hash = %signed.hash,
          nonce = state.nonce,
          endpoint = %endpoint,
          error = %e,
          "Broadcast outcome unknown, tracking hash"
        );
        return Ok(Attempt::Failed(e));
      }
      Err(e) => {
        warn!(tx_hash = %signed.hash, nonce = state.nonce, error = %e, "Broadcast refused");
        if fresh {
          state.forget(&signed.hash);
        }
        return Ok(Attempt::Failed(e));
      }
    };

    state.forget(&hash);
    state.forget(&signed.hash);
    info!(
      tx_hash = %hash,
      nonce = state.nonce,
      attempt = state.attempt,
      endpoint = %endpoint,
      unconfirmed = state.unconfirmed.len(),
      "Transaction submitted"
    );
    self.telemetry.submitted(call.kind);

    Ok(Attempt::Finished(ExecutionOutcome::Submitted(Submission {
      hash,
      nonce: state.nonce,
      gas_price,
      attempts: state.attempt,
      endpoint,
      unconfirmed: std::mem::take(&mut state.unconfirmed),
    })))
  }

  /// Sleep the backoff, capped at the deadline. False if cancelled.
  async fn backoff(&self, deadline_at: Option<Instant>) -> bool {
    let nap = match deadline_at {
      Some(at) => self.policy.backoff.min(at.saturating_duration_since(Instant::now())),
      None => self.policy.backoff,
    };
    tokio::select! {
      () = self.cancel.cancelled() => false,
      () = tokio::time::sleep(nap) => true,
    }
  }
}

/// Position of the first tracked transaction that already has a receipt.
async fn mined_index<C: ChainClient + ?Sized>(
  client: &C,
  unconfirmed: &[UnconfirmedTx],
) -> Result<Option<usize>, ChainError> {
  for (index, tx) in unconfirmed.iter().enumerate() {
    if client.receipt(tx.hash).await?.is_some() {
      return Ok(Some(index));
    }
  }
  Ok(None)
}
