//! Pure domain logic for the bus route poller.
//!
//! Nothing in this crate performs I/O: HTML extraction, route catalog
//! reconciliation and poll-window scheduling are all deterministic
//! functions of their inputs so they can be shared by the session
//! client and the poller daemon alike.

pub mod catalog;
pub mod error;
pub mod html;
pub mod schedule;
pub mod types;
