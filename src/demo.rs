//! Scripted walk through a conversation session against the in-memory
//! service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use chat_timeline::models::{Conversation, Message, Participant, TypingIndicator};
use chat_timeline::service::memory::InMemoryChatService;
use chat_timeline::service::{ChangeKind, MessageChange};
use chat_timeline::session::{
    ComposeAffordance, ConversationObserver, ConversationSession, ConversationView,
};
use chat_timeline::{ChatError, SessionConfig};

const CONVERSATION_ID: &str = "demo";

/// Observer that logs every hook.
struct LoggingObserver;

impl ConversationObserver for LoggingObserver {
    fn ready_to_send(&self, message: &Message) {
        tracing::info!("[observer] ready to send {}", message.id);
    }

    fn finished_sending(&self, message: &Message) {
        tracing::info!("[observer] finished sending {}", message.id);
    }

    fn failed_to_send(&self, text: &str, date: DateTime<Utc>, error: &ChatError) {
        tracing::info!(
            "[observer] failed to send {:?} from {} ({:?}: {})",
            text,
            date.format("%H:%M:%S"),
            error.code(),
            error.message()
        );
    }

    fn fetched_participants(&self, participants: &[Participant]) {
        tracing::info!("[observer] fetched {} participant(s)", participants.len());
    }

    fn failed_fetching_participants(&self, error: &ChatError) {
        tracing::info!("[observer] failed fetching participants: {}", error);
    }

    fn started_fetching_messages(&self) {
        tracing::info!("[observer] started fetching messages");
    }

    fn fetched_messages(&self, messages: &[Message], is_cached: bool) {
        tracing::info!(
            "[observer] fetched {} message(s) (cached: {})",
            messages.len(),
            is_cached
        );
    }

    fn failed_fetching_messages(&self, error: &ChatError) {
        tracing::info!("[observer] failed fetching messages: {}", error);
    }
}

/// View that logs every call instead of rendering.
struct LoggingView;

impl ConversationView for LoggingView {
    fn reload(&self) {
        tracing::debug!("[view] reload");
    }

    fn finish_receiving(&self) {
        tracing::debug!("[view] finish receiving");
    }

    fn scroll_to_bottom(&self) {
        tracing::debug!("[view] scroll to bottom");
    }

    fn set_send_enabled(&self, enabled: bool) {
        tracing::debug!("[view] send enabled: {}", enabled);
    }

    fn set_compose_affordance(&self, affordance: ComposeAffordance) {
        tracing::debug!("[view] compose button: {:?}", affordance);
    }

    fn start_activity_indicator(&self) {
        tracing::debug!("[view] activity indicator on");
    }

    fn stop_activity_indicator(&self) {
        tracing::debug!("[view] activity indicator off");
    }

    fn show_typing_indicator(&self) {
        tracing::info!("[view] someone is typing...");
    }

    fn hide_typing_indicator(&self) {
        tracing::info!("[view] typing indicator hidden");
    }

    fn set_title(&self, title: Option<&str>) {
        tracing::info!("[view] title: {}", title.unwrap_or("(none)"));
    }
}

fn seed_service(local_user_id: &str) -> InMemoryChatService {
    let service = InMemoryChatService::new();
    service.add_participants(vec![
        Participant::new(local_user_id, Some("You")),
        Participant::new("alice", Some("Alice")),
        Participant::new("bob", Some("Bob")),
    ]);

    let start = Utc::now() - chrono::Duration::hours(2);
    let history: Vec<Message> = (0..60)
        .map(|i| {
            let author = if i % 3 == 0 { "bob" } else { "alice" };
            let mut message = Message::outgoing(author, start + chrono::Duration::minutes(i))
                .with_body(format!("history message #{}", i));
            message.id = format!("h{:02}", i).into();
            message
        })
        .collect();

    // Cached copy of the newest page, with one entry the server no longer has.
    let mut cached: Vec<Message> = history[55..].to_vec();
    if let Some(last) = cached.last_mut() {
        last.id = "stale-cache-entry".into();
    }
    service.push_cached_page(CONVERSATION_ID, cached);
    service.add_history(CONVERSATION_ID, history);
    service
}

fn print_timeline(session: &ConversationSession) {
    for (index, message) in session.store().iter().enumerate() {
        let status = match session.delivery_status(index) {
            Ok(Some(state)) => format!(" [{:?}]", state),
            _ if message.failed => " [failed]".to_string(),
            _ => String::new(),
        };
        println!(
            "{}  {:>6}: {}{}",
            message.created_at.format("%H:%M:%S"),
            session.sender_name(message),
            message.text(),
            status
        );
    }
}

pub async fn run(mut config: SessionConfig, typing_ms: u64, json: bool) -> Result<()> {
    let local_user_id = config
        .local_user_id
        .clone()
        .unwrap_or_else(|| "me".to_string());
    config.typing_indicator_show_ms = typing_ms;

    let service = Arc::new(seed_service(&local_user_id));
    let conversation = Conversation::new(
        CONVERSATION_ID,
        vec![
            local_user_id.clone(),
            "alice".to_string(),
            "bob".to_string(),
        ],
    );
    let mut session = ConversationSession::new(service.clone(), &local_user_id, config)
        .with_conversation(conversation)
        .with_observer(Arc::new(LoggingObserver))
        .with_view(Arc::new(LoggingView));

    tracing::info!("== Opening conversation");
    session.open().context("Failed to open conversation")?;
    session.run_until_idle().await;
    tracing::info!("Timeline has {} message(s)", session.store().len());

    tracing::info!("== Sending while offline");
    service.set_offline(true);
    session.on_compose_text_changed("hi");
    let failed_id = session.send_text("hi").context("Failed to submit message")?;
    session.run_until_idle().await;

    tracing::info!("== Back online, resending");
    service.set_offline(false);
    session
        .resend(&failed_id)
        .context("Failed to resend message")?;
    session.run_until_idle().await;

    tracing::info!("== Loading older history");
    session.on_scroll_to_top();
    session.run_until_idle().await;
    tracing::info!(
        "Timeline has {} message(s), more available: {}",
        session.store().len(),
        session.has_more_messages()
    );

    tracing::info!("== Live message from Alice");
    let mut incoming = Message::outgoing("alice", Utc::now()).with_body("Welcome back!");
    incoming.id = "live-1".into();
    service.emit_message_change(
        CONVERSATION_ID,
        MessageChange {
            kind: ChangeKind::Create,
            message: incoming,
        },
    );
    session.run_until_idle().await;

    tracing::info!("== Bob starts typing");
    service.emit_typing(CONVERSATION_ID, TypingIndicator::new(["bob"]));
    session.run_until_idle().await;

    let deadline = Duration::from_millis(typing_ms) + Duration::from_millis(500);
    let waited = tokio::time::timeout(deadline, async {
        while session.typing_indicator_visible() {
            if !session.process_next().await {
                break;
            }
        }
    })
    .await;
    if waited.is_err() {
        tracing::warn!("Typing indicator still visible after {:?}", deadline);
    }

    session.close();

    if json {
        let messages: Vec<&Message> = session.store().iter().collect();
        let out = serde_json::to_string_pretty(&messages).context("Failed to serialize timeline")?;
        println!("{}", out);
    } else {
        println!();
        println!("{}", session.title().unwrap_or_default());
        println!("{}", "-".repeat(40));
        print_timeline(&session);
    }

    Ok(())
}
