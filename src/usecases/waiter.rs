//! Waiters - Poll-with-timeout for Receipts and Balances
//!
//! Both waiters are thin wrappers around [`poll_until`]: probe, and if
//! the condition does not hold yet, sleep one interval and try again
//! until the timeout passes. Probe failures are logged and the next
//! poll proceeds; transport failures also rotate the endpoint.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::failover::Failover;
use crate::config::PollingConfig;
use crate::domain::{Receipt, TxHash};
use crate::ports::{ChainClient, ChainConnector, ChainError};

/// Interval and timeout for one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
  pub interval: Duration,
  pub timeout: Duration,
}

impl PollPolicy {
  pub const fn new(interval: Duration, timeout: Duration) -> Self {
    Self { interval, timeout }
  }

  pub const fn confirmation(config: &PollingConfig) -> Self {
    Self::new(
      Duration::from_secs(config.confirmation_interval_secs),
      Duration::from_secs(config.confirmation_timeout_secs),
    )
  }

  pub const fn balance(config: &PollingConfig) -> Self {
    Self::new(
      Duration::from_secs(config.balance_interval_secs),
      Duration::from_secs(config.balance_timeout_secs),
    )
  }
}

/// Why [`poll_until`] stopped without a value.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PollError {
  #[error("condition not met within {0:?}")]
  TimedOut(Duration),
  #[error("polling cancelled")]
  Cancelled,
}

/// Call `probe` until it yields `Some`, the timeout elapses, or
/// `cancel` fires.
///
/// The first probe runs immediately. A timeout is reported only once at
/// least `policy.timeout` has elapsed, and the last sleep is shortened
/// so a final probe lands on the deadline. A probe still running at the
/// deadline is abandoned, and so is one running when `cancel` fires.
pub async fn poll_until<T, E, F, Fut>(
  policy: PollPolicy,
  cancel: &CancellationToken,
  mut probe: F,
) -> Result<T, PollError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<Option<T>, E>>,
  E: fmt::Display,
{
  let started = Instant::now();
  let deadline = started + policy.timeout;
  let mut polls: u32 = 0;

  loop {
    if cancel.is_cancelled() {
      return Err(PollError::Cancelled);
    }

    polls += 1;
    let outcome = tokio::select! {
      () = cancel.cancelled() => return Err(PollError::Cancelled),
      outcome = tokio::time::timeout_at(deadline, probe()) => outcome,
    };
    match outcome {
      Ok(Ok(Some(value))) => return Ok(value),
      Ok(Ok(None)) => {}
      Ok(Err(e)) => debug!(poll = polls, error = %e, "Probe failed, polling again"),
      Err(_) => debug!(poll = polls, "Probe still running at the deadline"),
    }

    let elapsed = started.elapsed();
    if elapsed >= policy.timeout {
      return Err(PollError::TimedOut(policy.timeout));
    }

    let nap = policy.interval.min(policy.timeout - elapsed);
    tokio::select! {
      () = cancel.cancelled() => return Err(PollError::Cancelled),
      () = tokio::time::sleep(nap) => {}
    }
  }
}

/// Which balance to watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceQuery {
  /// Native balance of the address.
  Native(Address),
  /// `token.balanceOf(owner)`.
  Token { token: Address, owner: Address },
}

impl BalanceQuery {
  async fn fetch<C: ChainClient + ?Sized>(self, client: &C) -> Result<U256, ChainError> {
    match self {
      Self::Native(owner) => client.balance(owner).await,
      Self::Token { token, owner } => client.token_balance_of(token, owner).await,
    }
  }
}

impl fmt::Display for BalanceQuery {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Native(owner) => write!(f, "native balance of {owner}"),
      Self::Token { token, owner } => write!(f, "token {token} balance of {owner}"),
    }
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaitError {
  #[error("no receipt for {hash} within {timeout:?}")]
  ConfirmationTimeout { hash: TxHash, timeout: Duration },
  #[error("{query} did not reach the target within {timeout:?}")]
  BalanceTimeout { query: BalanceQuery, timeout: Duration },
  #[error("wait cancelled")]
  Cancelled,
}

/// Waits for a transaction's receipt.
///
/// A receipt with failure status still ends the wait; the caller
/// inspects the status.
pub struct ConfirmationWaiter<K: ChainConnector> {
  failover: Arc<Failover<K>>,
  policy: PollPolicy,
  cancel: CancellationToken,
}

impl<K: ChainConnector> ConfirmationWaiter<K> {
  pub const fn new(failover: Arc<Failover<K>>, policy: PollPolicy, cancel: CancellationToken) -> Self {
    Self {
      failover,
      policy,
      cancel,
    }
  }

  #[instrument(skip(self, hash), fields(tx_hash = %hash))]
  pub async fn wait(&self, hash: TxHash) -> Result<Receipt, WaitError> {
    let failover = &self.failover;
    let receipt = poll_until(self.policy, &self.cancel, || async move {
      failover
        .attempt(|client| async move { client.receipt(hash).await })
        .await
    })
    .await
    .map_err(|e| match e {
      PollError::TimedOut(timeout) => WaitError::ConfirmationTimeout { hash, timeout },
      PollError::Cancelled => WaitError::Cancelled,
    })?;

    info!(
      status = ?receipt.status,
      block = receipt.block_number,
      "Transaction confirmed"
    );
    Ok(receipt)
  }
}

/// Waits for a native or token balance to satisfy a predicate.
pub struct BalanceWaiter<K: ChainConnector> {
  failover: Arc<Failover<K>>,
  policy: PollPolicy,
  cancel: CancellationToken,
}

impl<K: ChainConnector> BalanceWaiter<K> {
  pub const fn new(failover: Arc<Failover<K>>, policy: PollPolicy, cancel: CancellationToken) -> Self {
    Self {
      failover,
      policy,
      cancel,
    }
  }

  /// Wait with the configured policy.
  pub async fn wait<P>(&self, query: BalanceQuery, predicate: P) -> Result<U256, WaitError>
  where
    P: Fn(U256) -> bool + Send + Sync,
  {
    self.await_condition(query, predicate, self.policy).await
  }

  /// Poll `query` until `predicate` accepts the balance, returning the
  /// accepted balance.
  #[instrument(skip(self, query, predicate), fields(query = %query))]
  pub async fn await_condition<P>(
    &self,
    query: BalanceQuery,
    predicate: P,
    policy: PollPolicy,
  ) -> Result<U256, WaitError>
  where
    P: Fn(U256) -> bool + Send + Sync,
  {
    let failover = &self.failover;
    let predicate = &predicate;
    let balance = poll_until(policy, &self.cancel, || async move {
      let balance = failover
        .attempt(|client| async move { query.fetch(client.as_ref()).await })
        .await?;
      Ok::<_, ChainError>(predicate(balance).then_some(balance))
    })
    .await
    .map_err(|e| match e {
      PollError::TimedOut(timeout) => WaitError::BalanceTimeout { query, timeout },
      PollError::Cancelled => WaitError::Cancelled,
    })?;

    info!(balance = %balance, "Balance condition met");
    Ok(balance)
  }
}
