//! Data models for conversations, messages and participants

mod conversation;
mod message;
mod participant;
mod typing;

pub use conversation::*;
pub use message::*;
pub use participant::*;
pub use typing::*;
