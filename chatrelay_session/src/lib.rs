//! Conversation state for the chat relay clients.
//!
//! The session is an owned value driven by [`Event`]s through [`step`], so a
//! front end only has to feed it input and bytes and redraw afterwards.

pub mod client;
pub mod decode;
pub mod message;
pub mod state;

pub use client::{stream_into, ChatClient};
pub use decode::Utf8Decoder;
pub use message::{Message, Role};
pub use state::{step, Effect, Event, Phase, Session};
