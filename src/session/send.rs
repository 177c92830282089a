//! Outgoing message state machine.
//!
//! ```text
//! Composing -> Sending -> Sent
//!                 |
//!                 v
//!              Failed -> Sending   (resend)
//!                 |
//!                 v
//!              Removed             (delete)
//! ```
//!
//! Submitting appends an optimistic entry right away. The service result
//! comes back as a `SendCompleted` event and either confirms the entry or
//! flips it to `failed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::{ComposeAffordance, ConversationSession, SessionEvent};
use crate::cache::CacheKey;
use crate::error::ChatError;
use crate::models::{Attachment, MediaKind, MediaSource, Message, MessageId, TypingState};

/// Lifecycle of one outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Composing,
    Sending,
    Sent,
    Failed,
    Removed,
}

impl SendState {
    pub fn can_transition_to(self, next: SendState) -> bool {
        use SendState::*;
        matches!(
            (self, next),
            (Composing, Sending)
                | (Sending, Sent)
                | (Sending, Failed)
                | (Failed, Sending)
                | (Failed, Removed)
        )
    }
}

/// Called with the server copy once a send is confirmed.
pub type SendCallback = Box<dyn FnOnce(&Message) + Send>;

/// One send attempt in flight.
pub struct PendingSend {
    pub message: Message,
    pub done: Option<SendCallback>,
}

#[derive(Default)]
pub(super) struct SendTracker {
    states: HashMap<MessageId, SendState>,
    pending: HashMap<MessageId, PendingSend>,
}

impl SendTracker {
    pub(super) fn state(&self, id: &MessageId) -> Option<SendState> {
        self.states.get(id).copied()
    }

    /// Move `id` to `next`. Untracked ids start from `Composing`. Invalid
    /// transitions are refused and logged.
    fn transition(&mut self, id: &MessageId, next: SendState) -> bool {
        let current = self.state(id).unwrap_or(SendState::Composing);
        if !current.can_transition_to(next) {
            tracing::warn!(
                "Refusing send state change {:?} -> {:?} for {}",
                current,
                next,
                id
            );
            return false;
        }
        if next == SendState::Removed {
            self.states.remove(id);
        } else {
            self.states.insert(id.clone(), next);
        }
        true
    }

    fn forget(&mut self, id: &MessageId) {
        self.states.remove(id);
        self.pending.remove(id);
    }

    pub(super) fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

fn asset_name(mime_type: &str) -> String {
    let ext = mime_type.rsplit('/').next().unwrap_or("bin");
    format!("{}.{}", uuid::Uuid::new_v4(), ext)
}

impl ConversationSession {
    // -----------------------------------------------------------------------
    // Submit
    // -----------------------------------------------------------------------

    /// Send a text message.
    pub fn send_text(&mut self, text: &str) -> Result<MessageId, ChatError> {
        let message = Message::outgoing(&self.local_user_id, Utc::now()).with_body(text);
        self.send_message(message, None)
    }

    /// Send an image. The bytes are cached under the new asset's key so the
    /// timeline can show it before the upload finishes.
    pub fn send_image(&mut self, data: Vec<u8>, mime_type: &str) -> Result<MessageId, ChatError> {
        let name = asset_name(mime_type);
        let attachment = Attachment {
            kind: MediaKind::Image,
            source: MediaSource::Asset {
                name: name.clone(),
                url: String::new(),
            },
            mime_type: mime_type.to_string(),
            metadata: Default::default(),
        };
        let message = Message::outgoing(&self.local_user_id, Utc::now()).with_attachment(attachment);

        self.media_cache.set(CacheKey::Asset(name), data);
        self.send_message(message, None)
    }

    /// Send a finished voice recording.
    pub fn send_audio(&mut self, data: Vec<u8>, duration: Duration) -> Result<MessageId, ChatError> {
        let mime_type = "audio/m4a";
        let name = asset_name(mime_type);
        let mut attachment = Attachment {
            kind: MediaKind::Audio,
            source: MediaSource::Asset {
                name: name.clone(),
                url: String::new(),
            },
            mime_type: mime_type.to_string(),
            metadata: Default::default(),
        };
        attachment
            .metadata
            .insert("length".to_string(), duration.as_millis() as i64);
        let message = Message::outgoing(&self.local_user_id, Utc::now())
            .with_body("")
            .with_attachment(attachment);

        self.media_cache.set(CacheKey::Asset(name), data);
        self.send_message(message, None)
    }

    /// Optimistically append `message` and submit it.
    ///
    /// Fails immediately with `InvalidArgument` when no conversation is set;
    /// nothing is appended in that case.
    pub fn send_message(
        &mut self,
        message: Message,
        done: Option<SendCallback>,
    ) -> Result<MessageId, ChatError> {
        let conversation_id = match self.send_target() {
            Ok(id) => id,
            Err(reason) => return Err(self.reject_send(&message, reason)),
        };

        let id = message.id.clone();
        self.before_sending(&message, &conversation_id);
        self.dispatch(message, done, conversation_id);
        Ok(id)
    }

    fn send_target(&self) -> Result<String, &'static str> {
        match (&self.conversation, self.closed) {
            (Some(conversation), false) => Ok(conversation.id.clone()),
            (None, _) => Err("Cannot send message to nil conversation"),
            (Some(_), true) => Err("Cannot send message on a closed session"),
        }
    }

    fn reject_send(&self, message: &Message, reason: &str) -> ChatError {
        tracing::warn!("{}", reason);
        let err = ChatError::InvalidArgument(reason.to_string());
        self.observer
            .failed_to_send(message.text(), message.created_at, &err);
        self.view.set_send_enabled(true);
        err
    }

    fn before_sending(&mut self, message: &Message, conversation_id: &str) {
        self.store.append([message.clone()]);
        self.view.reload();
        self.view.set_compose_affordance(ComposeAffordance::Record);
        self.view.scroll_to_bottom();

        self.service
            .send_typing_indicator(TypingState::Finished, conversation_id);
        self.observer.ready_to_send(message);
    }

    fn dispatch(&mut self, message: Message, done: Option<SendCallback>, conversation_id: String) {
        let id = message.id.clone();
        self.sends.transition(&id, SendState::Sending);
        self.sends.pending.insert(
            id.clone(),
            PendingSend {
                message: message.clone(),
                done,
            },
        );

        tracing::debug!("Sending message {} to {}", id, conversation_id);
        let service = Arc::clone(&self.service);
        let tx = self.event_sender();
        tokio::spawn(async move {
            let result = service.send_message(message, &conversation_id).await;
            let _ = tx.send(SessionEvent::SendCompleted {
                message_id: id,
                result,
            });
        });
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    pub(super) fn handle_send_completed(
        &mut self,
        message_id: MessageId,
        result: Result<Option<Message>, ChatError>,
    ) {
        let Some(pending) = self.sends.pending.remove(&message_id) else {
            tracing::debug!("No pending send for {}, ignoring result", message_id);
            return;
        };

        match result {
            Ok(Some(sent)) => self.successfully_sending(pending, sent),
            Ok(None) => {
                tracing::warn!("Got nil sent message");
                self.failed_to_send(
                    pending,
                    ChatError::BadResponse("Got nil sent message".to_string()),
                );
            }
            Err(e) => {
                tracing::warn!("Failed to send message: {}", e);
                self.failed_to_send(pending, e);
            }
        }
    }

    fn successfully_sending(&mut self, pending: PendingSend, sent: Message) {
        let provisional = pending.message.id;
        self.sends.transition(&provisional, SendState::Sent);
        if sent.id != provisional {
            self.sends.states.remove(&provisional);
            self.sends.states.insert(sent.id.clone(), SendState::Sent);
        }

        self.store.replace(&provisional, sent.clone());
        if !self.closed {
            self.view.reload();
            self.observer.finished_sending(&sent);
            self.view.set_send_enabled(true);
        }

        if let Some(done) = pending.done {
            done(&sent);
        }
    }

    fn failed_to_send(&mut self, pending: PendingSend, error: ChatError) {
        let message = pending.message;
        self.sends.transition(&message.id, SendState::Failed);

        if let Some(stored) = self.store.get(&message.id) {
            let mut failed = stored.clone();
            failed.failed = true;
            self.store.update([failed]);
        }
        if self.closed {
            return;
        }

        self.view.reload();
        self.observer
            .failed_to_send(message.text(), message.created_at, &error);
        self.view.set_send_enabled(true);
    }

    // -----------------------------------------------------------------------
    // Failed-message actions
    // -----------------------------------------------------------------------

    fn failed_message(&self, id: &MessageId) -> Result<Message, ChatError> {
        match self.store.get(id) {
            Some(m) if m.failed => Ok(m.clone()),
            Some(_) => Err(ChatError::InvalidArgument(format!(
                "Message {} has not failed",
                id
            ))),
            None => Err(ChatError::InvalidArgument(format!(
                "Message {} is not in this conversation",
                id
            ))),
        }
    }

    /// Retry a failed message: drop the failed entry and submit the same
    /// content again under a fresh provisional id at the bottom.
    pub fn resend(&mut self, id: &MessageId) -> Result<MessageId, ChatError> {
        let failed = self.failed_message(id)?;
        if let Err(reason) = self.send_target() {
            return Err(self.reject_send(&failed, reason));
        }
        tracing::info!("Resending message {}", id);

        self.store.remove_ids([id]);
        self.sends.forget(id);

        let retry = Message {
            id: MessageId::provisional(),
            created_at: Utc::now(),
            delivery_state: None,
            failed: false,
            ..failed
        };
        self.send_message(retry, None)
    }

    /// Discard a failed message.
    pub fn delete(&mut self, id: &MessageId) -> Result<(), ChatError> {
        self.failed_message(id)?;
        tracing::info!("Deleting failed message {}", id);

        self.store.remove_ids([id]);
        if self.sends.state(id).is_some() {
            self.sends.transition(id, SendState::Removed);
        }
        self.sends.forget(id);
        self.view.reload();
        Ok(())
    }

    pub fn send_state(&self, id: &MessageId) -> Option<SendState> {
        self.sends.state(id)
    }

    /// Number of sends awaiting a service result.
    pub fn sends_in_flight(&self) -> usize {
        self.sends.in_flight()
    }
}
