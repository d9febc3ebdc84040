//! # flare-protocol
//!
//! The live-view wire protocol.
//!
//! Every frame is a JSON object `{join_ref?, ref?, topic, event, payload}`.
//! The payload is kept as raw JSON so it survives a decode/encode cycle byte
//! for byte; typed views of it are produced on demand by [`decode_payload`].
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`message`] | [`Message`] frame, [`Message::encode`] / [`Message::decode`], event tokens |
//! | [`payload`] | Join, event, reply and error payloads plus the tolerant decoder |
//! | [`replies`] | Constructors for every frame the server sends |

#![deny(unsafe_code)]

pub mod errors;
pub mod message;
pub mod payload;
pub mod replies;

pub use errors::{DecodeError, ProtocolError};
pub use message::{EventKind, Message, events};
pub use payload::{ErrorPayload, EventPayload, JoinPayload, ReplyPayload, decode_payload};
