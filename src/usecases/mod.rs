//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the bot's workflows. Each use case is a self-contained
//! operation.
//!
//! Use cases:
//! - `Failover`: Endpoint pool bound to a live client, rotation on transport failure
//! - `TransactionExecutor`: One action under the retry policy
//! - `ConfirmationWaiter` / `BalanceWaiter`: Poll-with-timeout on receipts and balances
//! - `WrapCycle`: The wrap/unwrap schedule driver

pub mod cycle;
pub mod executor;
pub mod failover;
pub mod waiter;

pub use cycle::{CycleSettings, HaltReason, ScheduleOutcome, ScheduleReport, WrapCycle};
pub use executor::{
  ExecutionError, ExecutionOutcome, RetryPolicy, Submission, TransactionExecutor, UnconfirmedTx,
};
pub use failover::Failover;
pub use waiter::{
  BalanceQuery, BalanceWaiter, ConfirmationWaiter, PollError, PollPolicy, WaitError, poll_until,
};
