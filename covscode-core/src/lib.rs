//! # covscode-core: Wire model for collaborative repository sessions
//!
//! Everything that crosses a socket lives here: who a participant is, what
//! they did, how it is wrapped for the control channel, and the JSON
//! operation model spoken on the shared-document channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ActionEnvelope / SiteIdMessage /   ┌──────────────┐
//! │ Participant  │   ZippedDataMessage (JSON text)      │ Session      │
//! │ Action       │ ───────────────────────────────────► │ broker       │
//! └──────────────┘                                      └──────────────┘
//!
//! ┌──────────────┐   DocFrame { a: f | s | op | ack }   ┌──────────────┐
//! │ DocKey       │   json0 components (si/sd/oi/od)     │ OT document  │
//! │ OpComponent  │ ◄──────────────────────────────────► │ service      │
//! └──────────────┘                                      └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`identity`]: Participant identity (user, site, repository)
//! - [`action`]: Session and file-tree actions, tagged by `actionType`
//! - [`message`]: Control-channel message classification and encoding
//! - [`encoding`]: Byte-preserving string encoding for archive payloads
//! - [`op`]: json0 text/object operations: apply and transform
//! - [`doc`]: Shared-document keys and document-channel frames

pub mod identity;
pub mod action;
pub mod message;
pub mod encoding;
pub mod op;
pub mod doc;

// Re-exports for convenience
pub use identity::Participant;
pub use action::{Action, ActionKind};
pub use message::{
    ActionEnvelope, Message, Payload, ProtocolError, SiteIdMessage, ZippedDataMessage,
};
pub use op::{Op, OpComponent, OpError, OpKind, PathSegment, Side};
pub use doc::{CreateData, DocFrame, DocKey, DocSnapshot, DocTarget, FrameError, JSON0_TYPE};
