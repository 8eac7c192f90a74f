//! Protocol message types.
//!
//! This module defines what travels between execution contexts.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | request (`__type: "request"`) | Requester → Responder | Application operation |
//! | response (`__type: "response"`) | Responder → Requester | Result, same `id` and `type` |
//! | `post-relay:__store` | Relay-aware messenger → Hub | Park a payload |
//! | `post-relay:__fetch` | Relay-aware messenger → Hub | Collect a parked payload |
//! | `"loadend"` | Relay page → Parent page | Bootstrap readiness |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | [`Message`] and its wire conversion |
//! | `payload` | [`Payload`] and [`Transferable`] |
//! | `hub` | Store/fetch request and reply shapes |

// ============================================================================
// Submodules
// ============================================================================

/// Hub store/fetch wire types.
pub mod hub;

/// Protocol message type.
pub mod message;

/// Payload data and transferable resources.
pub mod payload;

// ============================================================================
// Re-exports
// ============================================================================

pub use hub::{FETCH_MESSAGE_TYPE, FetchReply, READY_SIGNAL, STORE_MESSAGE_TYPE, StoreReply};
pub use message::{IDENTIFIER, Message, MessageKind};
pub use payload::{Payload, Transferable};
