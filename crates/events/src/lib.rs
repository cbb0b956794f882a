//! Lock lifecycle event infrastructure.
//!
//! - [`LockEventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`LockEvent`] — the lifecycle event envelope
//!   (`Added` / `Released`).

pub mod bus;

pub use bus::{LockEvent, LockEventBus};
