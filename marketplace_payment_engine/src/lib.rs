//! Marketplace Payment Engine
//!
//! The engine governs the lifecycle of marketplace orders: customers place orders against merchants ("markets"),
//! pay through a third-party payment gateway, and have orders fulfilled with possible partial delivery.
//!
//! The library is organised around a handful of cooperating pieces:
//! 1. A pure order state machine ([`mod@state_machine`]) and the [`coordinator::OrderStatusCoordinator`] that applies
//!    its transitions under a per-order distributed lock and emits update events.
//! 2. The asynchronous payment workflows ([`mod@workflows`]) that drive payment creation, confirmation, completion
//!    and cancellation against the gateway, and the [`orchestrator::PaymentOrchestrator`] that schedules them with
//!    at-most-one pending job per order.
//! 3. The pricing ([`mod@pricing`]) and customer credit ledger ([`mod@ledger`]) calculations.
//! 4. Narrow contracts ([`mod@traits`]) for the relational store, the payment gateway, the distributed lock service
//!    and the job queue. A SQLite backend is provided for the store; in-memory reference implementations of all four
//!    contracts live in [`mod@mem`] and back the test suite and single-process deployments.
//!
//! Components can subscribe to order-update events through the hook system in [`mod@events`].

pub mod api;
pub mod config;
pub mod coordinator;
pub mod db_types;
mod errors;
pub mod events;
pub mod helpers;
pub mod ledger;
pub mod mem;
pub mod orchestrator;
pub mod pricing;
pub mod state_machine;
pub mod traits;
pub mod workflows;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use errors::OrderFlowError;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
