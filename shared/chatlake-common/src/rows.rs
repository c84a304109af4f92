//! Chatbot tracking records and their table rows
//!
//! A chatbot interaction produces a list of tracking events. Conversation
//! events carrying turn detail go to the `conversations` table, everything
//! else to `events`. Session starts go to `sessions`.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatLakeError;
use crate::schemas::{CONVERSATIONS_TABLE, EVENTS_TABLE, SESSIONS_TABLE};
use crate::types::RowBatch;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Render `YYYY-MM-DD HH:MM:SS` at the given offset
pub fn format_datetime(ts: &DateTime<Utc>, offset: &FixedOffset) -> String {
    ts.with_timezone(offset).format(DATETIME_FORMAT).to_string()
}

/// Render `YYYY-MM-DD` at the given offset
pub fn format_date(ts: &DateTime<Utc>, offset: &FixedOffset) -> String {
    ts.with_timezone(offset).format(DATE_FORMAT).to_string()
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Empty strings are stored as null
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingType {
    PageView,
    Conversation,
    Training,
    Report,
    Event,
}

impl TrackingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingType::PageView => "page_view",
            TrackingType::Conversation => "conversation",
            TrackingType::Training => "training",
            TrackingType::Report => "report",
            TrackingType::Event => "event",
        }
    }
}

/// Turn detail attached to conversation events
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationDetail {
    pub skill: Option<String>,
    pub text: Option<String>,
    pub expected: Option<String>,
    pub expected_taken: bool,
    pub is_context_update: bool,
    pub is_attachment: bool,
    pub is_notification: bool,
    pub is_quick_reply: bool,
    pub is_pass_thread: bool,
    pub is_text: bool,
    pub is_postback: bool,
    pub did_handover: bool,
    pub with_user: bool,
    pub feedback: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub session_start: DateTime<Utc>,
    pub session_duration: i64,
    pub winner_action: Option<String>,
    pub winner_intent: Option<String>,
    pub winner_entities: Vec<String>,
    pub winner_score: Option<f64>,
    pub winner_taken: Option<bool>,
    pub intent: Option<String>,
    pub intent_score: Option<f64>,
    pub entities: Vec<String>,
    pub all_actions: Vec<String>,
    pub snapshot: Option<String>,
    pub bot_id: Option<String>,
}

/// One tracking event emitted by the chatbot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    #[serde(rename = "type")]
    pub kind: TrackingType,
    pub category: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationDetail>,
}

impl TrackingEvent {
    pub fn new(kind: TrackingType, category: impl Into<String>) -> Self {
        Self {
            kind,
            category: category.into(),
            action: None,
            label: None,
            value: None,
            lang: None,
            conversation: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_conversation(mut self, detail: ConversationDetail) -> Self {
        self.conversation = Some(detail);
        self
    }

    /// Whether the event belongs to the conversations table
    pub fn is_conversation_turn(&self) -> bool {
        self.kind == TrackingType::Conversation && self.conversation.is_some()
    }
}

/// Metadata of a newly started user session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSession {
    pub session_count: Option<i64>,
    pub bot_id: Option<String>,
    pub snapshot: Option<String>,
    pub lang: Option<String>,
    pub action: Option<String>,
}

/// Who interacted, when, and in which local time zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionContext {
    pub page_id: String,
    pub sender_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub non_interactive: bool,
    pub time_zone: FixedOffset,
}

impl InteractionContext {
    pub fn new(
        page_id: impl Into<String>,
        sender_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            page_id: page_id.into(),
            sender_id: sender_id.into(),
            session_id: session_id.into(),
            user_id: None,
            timestamp: Utc::now(),
            non_interactive: false,
            time_zone: utc(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn in_time_zone(mut self, time_zone: FixedOffset) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    fn utc_datetime(&self) -> String {
        format_datetime(&self.timestamp, &utc())
    }

    fn local_datetime(&self) -> String {
        format_datetime(&self.timestamp, &self.time_zone)
    }

    fn local_date(&self) -> String {
        format_date(&self.timestamp, &self.time_zone)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub page_id: String,
    pub sender_id: String,
    pub session_id: String,
    pub session_start: String,
    pub session_start_date: String,
    pub date: String,
    pub action: Option<String>,
    pub session_count: Option<i64>,
    pub non_interactive: bool,
    pub lang: Option<String>,
    pub bot_id: Option<String>,
    pub snapshot: Option<String>,
}

impl SessionRow {
    pub fn new(ctx: &InteractionContext, session: &UserSession) -> Self {
        Self {
            page_id: ctx.page_id.clone(),
            sender_id: ctx.sender_id.clone(),
            session_id: ctx.session_id.clone(),
            session_start: ctx.utc_datetime(),
            session_start_date: ctx.local_datetime(),
            date: ctx.local_date(),
            action: session.action.clone(),
            session_count: session.session_count,
            non_interactive: ctx.non_interactive,
            lang: session.lang.clone(),
            bot_id: session.bot_id.clone(),
            snapshot: session.snapshot.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub page_id: String,
    pub sender_id: String,
    pub session_id: String,
    pub timestamp: String,
    pub datetime: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub action: Option<String>,
    pub label: Option<String>,
    pub value: Option<i64>,
    pub lang: Option<String>,
    pub non_interactive: bool,
}

impl EventRow {
    pub fn new(ctx: &InteractionContext, event: &TrackingEvent) -> Self {
        Self {
            page_id: ctx.page_id.clone(),
            sender_id: ctx.sender_id.clone(),
            session_id: ctx.session_id.clone(),
            timestamp: ctx.utc_datetime(),
            datetime: ctx.local_datetime(),
            date: ctx.local_date(),
            kind: event.kind.as_str().to_string(),
            category: event.category.clone(),
            action: non_empty(event.action.as_deref()),
            label: non_empty(event.label.as_deref()),
            value: event.value,
            lang: non_empty(event.lang.as_deref()),
            non_interactive: ctx.non_interactive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRow {
    pub page_id: String,
    pub sender_id: String,
    pub session_id: String,
    pub timestamp: String,
    pub datetime: String,
    pub date: String,
    pub category: String,
    pub action: Option<String>,
    pub label: Option<String>,
    pub value: Option<i64>,
    pub lang: Option<String>,
    pub skill: Option<String>,
    pub text: Option<String>,
    pub expected: Option<String>,
    pub expected_taken: bool,
    pub is_context_update: bool,
    pub is_attachment: bool,
    pub is_notification: bool,
    pub is_quick_reply: bool,
    pub is_pass_thread: bool,
    pub is_postback: bool,
    pub is_text: bool,
    pub did_handover: bool,
    pub with_user: bool,
    pub user_id: Option<String>,
    pub feedback: i64,
    pub session_start: String,
    pub session_start_date: String,
    pub session_duration: i64,
    pub winner_action: Option<String>,
    pub winner_intent: Option<String>,
    pub winner_entities: Vec<String>,
    pub winner_score: Option<f64>,
    pub winner_taken: Option<bool>,
    pub intent: Option<String>,
    pub intent_score: Option<f64>,
    pub entities: Vec<String>,
    pub all_actions: Vec<String>,
    pub non_interactive: bool,
    pub snapshot: Option<String>,
    pub bot_id: Option<String>,
}

impl ConversationRow {
    pub fn new(
        ctx: &InteractionContext,
        event: &TrackingEvent,
        detail: &ConversationDetail,
    ) -> Self {
        Self {
            page_id: ctx.page_id.clone(),
            sender_id: ctx.sender_id.clone(),
            session_id: ctx.session_id.clone(),
            timestamp: ctx.utc_datetime(),
            datetime: ctx.local_datetime(),
            date: ctx.local_date(),
            category: event.category.clone(),
            action: non_empty(event.action.as_deref()),
            label: non_empty(event.label.as_deref()),
            value: event.value,
            lang: non_empty(event.lang.as_deref()),
            skill: non_empty(detail.skill.as_deref()),
            text: non_empty(detail.text.as_deref()),
            expected: non_empty(detail.expected.as_deref()),
            expected_taken: detail.expected_taken,
            is_context_update: detail.is_context_update,
            is_attachment: detail.is_attachment,
            is_notification: detail.is_notification,
            is_quick_reply: detail.is_quick_reply,
            is_pass_thread: detail.is_pass_thread,
            is_postback: detail.is_postback,
            is_text: detail.is_text,
            did_handover: detail.did_handover,
            with_user: detail.with_user,
            user_id: non_empty(ctx.user_id.as_deref()),
            feedback: detail.feedback,
            session_start: format_datetime(&detail.session_start, &utc()),
            session_start_date: format_datetime(&detail.session_start, &ctx.time_zone),
            session_duration: detail.session_duration,
            winner_action: non_empty(detail.winner_action.as_deref()),
            winner_intent: non_empty(detail.winner_intent.as_deref()),
            winner_entities: detail.winner_entities.clone(),
            winner_score: detail.winner_score,
            winner_taken: detail.winner_taken,
            intent: non_empty(detail.intent.as_deref()),
            intent_score: detail.intent_score,
            entities: detail.entities.clone(),
            all_actions: detail.all_actions.clone(),
            non_interactive: ctx.non_interactive,
            snapshot: non_empty(detail.snapshot.as_deref()),
            bot_id: non_empty(detail.bot_id.as_deref()),
        }
    }
}

/// Rows produced by one batch of tracking events
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventRows {
    pub conversations: Vec<ConversationRow>,
    pub events: Vec<EventRow>,
}

impl EventRows {
    /// Route each event to its table, preserving order within each table
    pub fn split(ctx: &InteractionContext, events: &[TrackingEvent]) -> Self {
        let mut rows = Self::default();
        for event in events {
            match &event.conversation {
                Some(detail) if event.kind == TrackingType::Conversation => rows
                    .conversations
                    .push(ConversationRow::new(ctx, event, detail)),
                _ => rows.events.push(EventRow::new(ctx, event)),
            }
        }
        rows
    }

    /// Non-empty batches, conversations first
    pub fn into_batches(self) -> Result<Vec<RowBatch>, ChatLakeError> {
        let mut batches = Vec::with_capacity(2);
        if !self.conversations.is_empty() {
            batches.push(RowBatch::from_records(
                CONVERSATIONS_TABLE,
                &self.conversations,
            )?);
        }
        if !self.events.is_empty() {
            batches.push(RowBatch::from_records(EVENTS_TABLE, &self.events)?);
        }
        Ok(batches)
    }
}

/// Batch holding the single sessions row of a session start
pub fn session_batch(
    ctx: &InteractionContext,
    session: &UserSession,
) -> Result<RowBatch, ChatLakeError> {
    RowBatch::from_records(SESSIONS_TABLE, &[SessionRow::new(ctx, session)])
}
