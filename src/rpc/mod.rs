//! Transport-boundary message codec.
//!
//! ```text
//!  text line ──▶ messages::Inbound ──▶ dispatch ──▶ Robot queues
//!                                          │
//!  text line ◀── messages::Outbound ◀──────┘
//! ```
//!
//! The transport itself (socket, stdin, …) lives outside the library.

pub mod dispatch;
pub mod messages;
