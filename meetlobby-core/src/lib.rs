//! # meetlobby core
//!
//! Shared error type and the seams to the external conferencing service:
//! token exchange, connect/disconnect and disconnect reason codes. The lobby
//! itself lives in the `meetlobby` crate; device handling in `meetlobby-media`.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod conference;
pub mod error;

// Re-export main types
pub use conference::{
    ConferenceLink, ConferenceTransport, ConnectionDetails, ConnectionState, DisconnectReason,
    HttpTokenExchange, JoinOptions, TokenExchange, TokenRequest,
};
pub use error::LobbyError;
