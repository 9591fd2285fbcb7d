//! # tether-shared
//!
//! Types shared by every tether crate: identifier helpers, the typed bus
//! events, the in-process [`Bus`], and the connectivity [`StatusMachine`].

pub mod bus;
pub mod constants;
pub mod error;
pub mod events;
pub mod jid;
pub mod status;
pub mod types;

pub use bus::{Bus, Unsubscribe};
pub use error::TransitionError;
pub use events::{Event, EventPayload};
pub use status::{State, StatusChange, StatusMachine};
pub use types::{ContactUpdate, InboundMessage};
