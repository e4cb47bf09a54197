//! Core ledger domain for Tally.
//!
//! This crate contains pure business logic with ZERO database or broker
//! dependencies. All domain types, validation rules, and state transitions
//! live here.
//!
//! # Modules
//!
//! - `ledger` - Value objects, the `JournalEntry` aggregate, balance math
//! - `events` - Domain events and the outbox record model
//! - `aggregate` - The aggregate root trait shared by persistence

pub mod aggregate;
pub mod events;
pub mod ledger;

pub use aggregate::Aggregate;
