//! # tafweej-notify
//!
//! Notification channel senders and the fan-out dispatcher for TAFWEEJ.
//!
//! This crate provides:
//! - [`ChannelSender`] - per-channel delivery trait
//! - [`HttpGatewaySender`] - reqwest-based gateway sender
//! - [`NotificationDispatcher`] - fan-out with per-channel failure isolation
//! - [`NotifyError`] - delivery error types

pub mod channel;
pub mod dispatcher;
pub mod error;

pub use channel::{ChannelSender, HttpGatewaySender};
pub use dispatcher::{DispatchSummary, NotificationDispatcher};
pub use error::{NotifyError, Result};
