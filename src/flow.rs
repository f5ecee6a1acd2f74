//! Flow-control primitives bridging callback-driven transports to async
//! consumers.
//!
//! # Components
//!
//! - `Readiness`: conflated "you may proceed" signal for peer send-credit
//! - `credit_buffer`: bounded hand-off from a non-suspending callback source to
//!   a pull-based consumer, replenishing one credit per delivered item

mod credit_buffer;
mod readiness;

pub use credit_buffer::{CreditReceiver, CreditSender, credit_buffer};
pub use readiness::Readiness;
