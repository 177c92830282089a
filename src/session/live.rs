//! Live updates: message change feed and typing indicator.
//!
//! Subscription handlers run on whatever thread the service calls them from.
//! They only forward into the session channel; the owner applies the change.

use std::slice;

use super::{ComposeAffordance, ConversationSession, SessionEvent};
use crate::models::{TypingIndicator, TypingState};
use crate::service::{ChangeKind, MessageChange, SubscriptionHandle};
use crate::timer::TimerSlot;

/// Typing indicator state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingIndicatorState {
    pub visible: bool,
    /// A hide timer is armed.
    pub hide_pending: bool,
}

#[derive(Default)]
pub(super) struct LiveUpdates {
    message_sub: Option<SubscriptionHandle>,
    typing_sub: Option<SubscriptionHandle>,
    hide_timer: TimerSlot,
    indicator_visible: bool,
}

impl LiveUpdates {
    pub(super) fn cancel_timer(&mut self) {
        self.hide_timer.cancel();
    }

    fn is_subscribed(&self) -> bool {
        self.message_sub.is_some() || self.typing_sub.is_some()
    }
}

impl ConversationSession {
    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// (Re)subscribe to message changes and typing indicators for the
    /// current conversation.
    pub fn subscribe(&mut self) {
        self.unsubscribe();

        let Some(conversation) = &self.conversation else {
            tracing::warn!("Cannot subscribe with nil conversation");
            return;
        };
        let conversation_id = conversation.id.clone();

        let tx = self.event_sender();
        let message_sub = self.service.subscribe_message_changes(
            &conversation_id,
            Box::new(move |change| {
                let _ = tx.send(SessionEvent::MessageChanged(change));
            }),
        );

        let tx = self.event_sender();
        let typing_sub = self.service.subscribe_typing_indicator(
            &conversation_id,
            Box::new(move |indicator| {
                let _ = tx.send(SessionEvent::TypingChanged(indicator));
            }),
        );

        tracing::debug!("Subscribed to live updates for {}", conversation_id);
        self.live.message_sub = Some(message_sub);
        self.live.typing_sub = Some(typing_sub);
    }

    pub fn unsubscribe(&mut self) {
        if let Some(handle) = self.live.message_sub.take() {
            self.service.unsubscribe_message_changes(handle);
        }
        if let Some(handle) = self.live.typing_sub.take() {
            self.service.unsubscribe_typing_indicator(handle);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.live.is_subscribed()
    }

    // -----------------------------------------------------------------------
    // Message changes
    // -----------------------------------------------------------------------

    pub(super) fn handle_message_change(&mut self, change: MessageChange) {
        let MessageChange { kind, message } = change;
        let known = self.store.contains(&message.id);
        tracing::debug!("Live {:?} for {} (known: {})", kind, message.id, known);

        match kind {
            ChangeKind::Create => {
                if known {
                    self.store.update([message.clone()]);
                } else {
                    self.store.append([message.clone()]);
                }

                if let Some(conversation) = &self.conversation {
                    self.service.mark_read(slice::from_ref(&message));
                    self.service.mark_last_read(&message, &conversation.id);
                }
                self.observer
                    .fetched_messages(slice::from_ref(&message), false);
                self.view.finish_receiving();
            }
            ChangeKind::Update if known => {
                self.store.update([message]);
                self.view.reload();
            }
            ChangeKind::Delete if known => {
                self.store.remove_ids([&message.id]);
                self.view.reload();
            }
            ChangeKind::Update | ChangeKind::Delete => {}
        }
    }

    // -----------------------------------------------------------------------
    // Typing indicator
    // -----------------------------------------------------------------------

    pub(super) fn handle_typing(&mut self, indicator: TypingIndicator) {
        self.live.hide_timer.cancel();

        if !indicator.has_others(&self.local_user_id) {
            self.hide_typing_indicator();
            return;
        }

        self.show_typing_indicator();

        let delay = self.config.typing_indicator_show_duration();
        let tx = self.event_sender();
        self.live.hide_timer.arm(delay, move |generation| async move {
            let _ = tx.send(SessionEvent::TypingExpired { generation });
        });
    }

    pub(super) fn handle_typing_expired(&mut self, generation: u64) {
        if self.live.hide_timer.fire(generation) {
            self.hide_typing_indicator();
        } else {
            tracing::debug!("Ignoring stale typing expiry {}", generation);
        }
    }

    fn show_typing_indicator(&mut self) {
        if self.live.indicator_visible {
            return;
        }
        self.live.indicator_visible = true;
        self.view.show_typing_indicator();
        if self.auto_scroll_to_latest {
            self.view.scroll_to_bottom();
        }
    }

    fn hide_typing_indicator(&mut self) {
        if !self.live.indicator_visible {
            return;
        }
        self.live.indicator_visible = false;
        self.view.hide_typing_indicator();
    }

    pub fn typing_indicator_visible(&self) -> bool {
        self.live.indicator_visible
    }

    pub fn typing_indicator_state(&self) -> TypingIndicatorState {
        TypingIndicatorState {
            visible: self.live.indicator_visible,
            hide_pending: self.live.hide_timer.is_armed(),
        }
    }

    // -----------------------------------------------------------------------
    // Compose input
    // -----------------------------------------------------------------------

    /// Compose text changed: swap the send/record button and tell the other
    /// participants we are typing.
    pub fn on_compose_text_changed(&mut self, text: &str) {
        let affordance = if text.is_empty() {
            ComposeAffordance::Record
        } else {
            ComposeAffordance::Send
        };
        self.view.set_compose_affordance(affordance);
        self.send_typing(TypingState::Begin);
    }

    pub fn on_compose_ended(&mut self) {
        self.send_typing(TypingState::Pause);
    }

    fn send_typing(&self, state: TypingState) {
        match &self.conversation {
            Some(conversation) => self.service.send_typing_indicator(state, &conversation.id),
            None => tracing::warn!("Cannot send typing indicator with nil conversation"),
        }
    }
}
