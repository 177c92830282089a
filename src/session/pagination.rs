//! History paging.
//!
//! One fetch may be in flight at a time. Each fetch gets a request id; the
//! service may answer with a cached page first and always ends with an
//! authoritative one. Cached entries that the authoritative page does not
//! confirm are dropped again.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;

use super::{ConversationSession, ScrollMetrics, SessionEvent};
use crate::error::ChatError;
use crate::models::{Message, MessageId};
use crate::service::FetchDelivery;

/// Distance from the content bottom to the viewport top, captured before a
/// refresh so older history can be prepended without moving what is on
/// screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    bottom_offset: f64,
}

impl ScrollAnchor {
    pub fn capture(metrics: &ScrollMetrics) -> Self {
        Self {
            bottom_offset: metrics.content_height - metrics.offset_y,
        }
    }

    pub fn bottom_offset(&self) -> f64 {
        self.bottom_offset
    }

    /// Offset that keeps the anchored content in place after the content
    /// grew to `metrics.content_height`. Never past the end, never negative.
    pub fn restore(&self, metrics: &ScrollMetrics) -> f64 {
        let height = metrics.content_height;
        (height - metrics.frame_height)
            .min(height - self.bottom_offset)
            .max(0.0)
    }
}

struct ActiveFetch {
    request_id: u64,
    before: Option<DateTime<Utc>>,
    limit: usize,
    /// Ids first introduced by this request's cached delivery.
    cached_ids: Vec<MessageId>,
}

#[derive(Default)]
pub(super) struct Pagination {
    is_fetching: bool,
    has_more: bool,
    next_request_id: u64,
    active: Option<ActiveFetch>,
}

impl Pagination {
    fn begin(&mut self, before: Option<DateTime<Utc>>, limit: usize) -> u64 {
        self.next_request_id += 1;
        self.is_fetching = true;
        self.active = Some(ActiveFetch {
            request_id: self.next_request_id,
            before,
            limit,
            cached_ids: Vec::new(),
        });
        self.next_request_id
    }

    fn is_current(&self, request_id: u64) -> bool {
        self.active
            .as_ref()
            .map_or(false, |a| a.request_id == request_id)
    }

    fn record_cached(&mut self, ids: impl IntoIterator<Item = MessageId>) {
        if let Some(active) = self.active.as_mut() {
            active.cached_ids.extend(ids);
        }
    }

    fn finish(&mut self) -> Option<ActiveFetch> {
        self.is_fetching = false;
        self.active.take()
    }
}

impl ConversationSession {
    /// Fetch the page before the oldest successfully sent message.
    ///
    /// Returns `false` when a fetch is already running or the previous page
    /// said there is nothing older.
    pub fn load_more(&mut self) -> bool {
        if self.pagination.is_fetching || !self.pagination.has_more {
            return false;
        }
        let before = self.store.first_success_message().map(|m| m.created_at);
        self.fetch_messages(before)
    }

    /// Start a history fetch for messages strictly before `before`, or the
    /// newest page when `None`.
    pub fn fetch_messages(&mut self, before: Option<DateTime<Utc>>) -> bool {
        let Some(conversation) = &self.conversation else {
            tracing::warn!("Cannot fetch messages with nil conversation");
            return false;
        };
        if self.closed {
            return false;
        }
        if self.pagination.is_fetching {
            tracing::debug!("Message fetch already in flight");
            return false;
        }

        let conversation_id = conversation.id.clone();
        let limit = self
            .observer
            .messages_fetch_limit()
            .unwrap_or(self.config.messages_fetch_limit)
            .max(1);

        if self.store.is_empty() {
            self.view.start_activity_indicator();
        }
        let request_id = self.pagination.begin(before, limit);
        self.observer.started_fetching_messages();
        tracing::debug!(
            "Fetching up to {} message(s) before {:?} (request {})",
            limit,
            before,
            request_id
        );

        let service = Arc::clone(&self.service);
        let tx = self.event_sender();
        tokio::spawn(async move {
            let mut deliveries = service.fetch_messages(&conversation_id, limit, before);
            let mut answered = false;
            while let Some(delivery) = deliveries.next().await {
                answered |= !delivery.is_cached;
                let event = SessionEvent::MessagesDelivered {
                    request_id,
                    delivery,
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            if !answered {
                let _ = tx.send(SessionEvent::MessagesDelivered {
                    request_id,
                    delivery: FetchDelivery::authoritative(Err(ChatError::BadResponse(
                        "Failed to get any messages".to_string(),
                    ))),
                });
            }
        });
        true
    }

    /// Forget the running fetch. Its remaining deliveries become stale.
    pub(super) fn abandon_fetch(&mut self) {
        if let Some(active) = self.pagination.finish() {
            tracing::debug!("Abandoning message fetch {}", active.request_id);
        }
    }

    pub(super) fn handle_delivery(&mut self, request_id: u64, delivery: FetchDelivery) {
        if !self.pagination.is_current(request_id) {
            tracing::debug!("Ignoring delivery for stale request {}", request_id);
            return;
        }

        if delivery.is_cached {
            match delivery.result {
                Ok(messages) => self.receive_cached_page(messages),
                Err(e) => tracing::warn!("Dropping cached page with error: {}", e),
            }
        } else {
            self.receive_authoritative_page(delivery.result);
        }
    }

    fn receive_cached_page(&mut self, messages: Vec<Message>) {
        if !messages.is_empty() {
            self.view.stop_activity_indicator();
        }

        let introduced: Vec<MessageId> = messages
            .iter()
            .filter(|m| !self.store.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        self.pagination.record_cached(introduced);

        let anchor = self.capture_anchor();
        self.store.merge(messages.iter().cloned());
        self.observer.fetched_messages(&messages, true);
        self.finish_receiving_anchored(anchor);
    }

    fn receive_authoritative_page(&mut self, result: Result<Vec<Message>, ChatError>) {
        let Some(active) = self.pagination.finish() else {
            return;
        };
        self.view.stop_activity_indicator();

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Failed to fetch messages: {}", e);
                self.observer.failed_fetching_messages(&e);
                return;
            }
        };
        tracing::debug!(
            "Request {} returned {} message(s)",
            active.request_id,
            page.len()
        );

        let confirmed: HashSet<&MessageId> = page.iter().map(|m| &m.id).collect();
        let unconfirmed: Vec<MessageId> = active
            .cached_ids
            .into_iter()
            .filter(|id| !confirmed.contains(id))
            .collect();

        let anchor = self.capture_anchor();
        self.store.remove_ids(&unconfirmed);
        self.store.merge(page.iter().cloned());

        if active.before.is_none() {
            self.mark_page_read(&page);
        }

        self.observer.fetched_messages(&page, false);
        self.pagination.has_more = page.len() >= active.limit;
        self.finish_receiving_anchored(anchor);
    }

    fn mark_page_read(&self, page: &[Message]) {
        let (Some(conversation), Some(newest)) = (
            self.conversation.as_ref(),
            page.iter().max_by_key(|m| m.created_at),
        ) else {
            return;
        };
        self.service.mark_read(page);
        self.service.mark_last_read(newest, &conversation.id);
    }

    fn capture_anchor(&self) -> Option<ScrollAnchor> {
        self.view
            .scroll_metrics()
            .map(|metrics| ScrollAnchor::capture(&metrics))
    }

    fn finish_receiving_anchored(&self, anchor: Option<ScrollAnchor>) {
        self.view.finish_receiving();
        if let (Some(anchor), Some(metrics)) = (anchor, self.view.scroll_metrics()) {
            self.view.set_scroll_offset(anchor.restore(&metrics));
        }
    }

    // -----------------------------------------------------------------------
    // Scroll-driven loading
    // -----------------------------------------------------------------------

    /// Viewport moved. Loads older history near the top and tracks whether
    /// new messages should keep the view pinned to the bottom.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        self.auto_scroll_to_latest = metrics.is_at_bottom();
        if metrics.offset_y < self.config.offset_y_to_load_more {
            self.load_more()
        } else {
            false
        }
    }

    pub fn on_scroll_to_top(&mut self) -> bool {
        self.load_more()
    }

    pub fn has_more_messages(&self) -> bool {
        self.pagination.has_more
    }

    pub fn is_fetching_messages(&self) -> bool {
        self.pagination.is_fetching
    }
}
