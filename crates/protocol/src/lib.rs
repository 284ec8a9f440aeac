//! Wire types for the themelink server protocol.
//!
//! This crate contains the serde-serializable types used for communication
//! with a theme server. These types represent the "protocol layer" - the
//! shapes of data as they appear on the wire, independent of any concrete
//! transport.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization
//! - **Transport-agnostic**: The runtime decides how bytes move
//! - **Stable**: Changes only when the wire protocol changes
//!
//! Connection lifecycle and heartbeat logic live in `themelink-runtime`;
//! the high-level SDK surface lives in `themelink`.

pub mod events;
pub mod types;

pub use types::*;
