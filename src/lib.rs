//! Chat timeline - message list synchronization engine
//!
//! Keeps a conversation screen's message timeline in sync with a chat
//! backend: optimistic sends with resend/delete, paged history with cached
//! pages reconciled against authoritative ones, and live message and typing
//! updates.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod service;
pub mod session;
pub mod store;
pub mod timer;

pub use cache::{CacheKey, MediaCache, MemoryMediaCache};
pub use config::SessionConfig;
pub use error::{ChatError, ErrorCode};
pub use models::{Conversation, Message, MessageId, Participant};
pub use service::memory::InMemoryChatService;
pub use service::ChatService;
pub use session::{ConversationObserver, ConversationSession, ConversationView, SessionEvent};
pub use store::{MessageStore, StoreError};
