//! Conversation store: chat transcripts kept in memory for the browser UI.
//!
//! Conversations are keyed by id and hold an ordered list of messages. No durability and no
//! transactions: concurrent writers race and the last write wins.

use crate::relay::parse_webhook_url;
use crate::validation::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Unique conversation identifier (a UUID when generated here).
pub type ConversationId = String;

const MAX_TITLE_CHARS: usize = 200;
const MAX_CONTENT_CHARS: usize = 10_000;
const TITLE_PREVIEW_CHARS: usize = 50;
const DEFAULT_PAGE_LIMIT: usize = 50;
const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Assistant, Role::System];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// A conversation: id, optional title, ordered messages and bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: usize,
}

/// Message as sent by a client; checked by [`ConversationStore::append_message`] and upsert.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Create-or-update request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageInput>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// List filter and pagination (query string of GET /api/conversations).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationPage {
    pub conversations: Vec<Conversation>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub total_conversations: usize,
    pub total_messages: usize,
    pub average_messages_per_conversation: usize,
    pub messages_by_role: BTreeMap<String, usize>,
    pub recent_conversations: usize,
    pub last_activity: Option<DateTime<Utc>>,
    pub oldest_conversation: Option<DateTime<Utc>>,
}

/// Full snapshot for export/import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub total_conversations: usize,
    pub conversations: Vec<Conversation>,
    pub stats: ConversationStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),
}

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Conversation>,
    last_activity: Option<DateTime<Utc>>,
}

/// In-memory conversation store (list, get, upsert, append, delete, export, import).
pub struct ConversationStore {
    inner: Arc<RwLock<Inner>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Conversations matching the search (title or any message, case-insensitive), newest first.
    pub async fn list(&self, query: &ListQuery) -> ConversationPage {
        let g = self.inner.read().await;
        let needle = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let mut matches: Vec<&Conversation> = g
            .conversations
            .values()
            .filter(|c| needle.as_deref().map_or(true, |n| matches_search(c, n)))
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));

        let total = matches.len();
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = query.offset.unwrap_or(0);
        let conversations = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        ConversationPage {
            conversations,
            pagination: Pagination {
                total,
                limit,
                offset,
                has_more: offset.saturating_add(limit) < total,
            },
        }
    }

    /// Return a clone of the conversation if it exists.
    pub async fn get(&self, id: &str) -> Option<Conversation> {
        self.inner.read().await.conversations.get(id).cloned()
    }

    /// Create or replace a conversation. Returns the stored conversation and whether it is new.
    pub async fn upsert(
        &self,
        input: ConversationInput,
    ) -> Result<(Conversation, bool), ConversationError> {
        let now = Utc::now();
        let messages = validate_conversation(&input, now)?;
        let id = input
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut g = self.inner.write().await;
        let existing = g.conversations.get(&id);
        let is_new = existing.is_none();
        let title = input
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| existing.and_then(|c| c.title.clone()))
            .unwrap_or_else(|| generate_title(&messages, now));
        let conversation = Conversation {
            id: id.clone(),
            title: Some(title),
            message_count: messages.len(),
            messages,
            webhook_url: input.webhook_url,
            created_at: existing.map_or(now, |c| c.created_at),
            updated_at: now,
        };
        g.conversations.insert(id.clone(), conversation.clone());
        g.last_activity = Some(now);
        log::info!(
            "conversation saved: {} ({} messages)",
            id,
            conversation.message_count
        );
        Ok((conversation, is_new))
    }

    /// Append a message, creating the conversation when it does not exist yet.
    /// Returns the stored message and the updated conversation.
    pub async fn append_message(
        &self,
        id: &str,
        input: MessageInput,
    ) -> Result<(Message, Conversation), ConversationError> {
        let now = Utc::now();
        let mut errors = ValidationError::default();
        let role = check_role(input.role.as_deref(), "role", &mut errors);
        check_content(input.content.as_deref(), "content", &mut errors);
        if let Some(ts) = input.timestamp.as_deref() {
            if DateTime::parse_from_rfc3339(ts).is_err() {
                errors.push("timestamp", "timestamp must be ISO 8601");
            }
        }
        let role = errors.into_result(|| role)?.unwrap_or(Role::User);

        let message = Message {
            id: Some(uuid::Uuid::new_v4().to_string()),
            role,
            content: input.content.unwrap_or_default(),
            timestamp: Some(now),
            metadata: input.metadata,
        };

        let mut g = self.inner.write().await;
        let conversation = g
            .conversations
            .entry(id.to_string())
            .or_insert_with(|| Conversation {
                id: id.to_string(),
                title: None,
                messages: Vec::new(),
                webhook_url: None,
                created_at: now,
                updated_at: now,
                message_count: 0,
            });
        conversation.messages.push(message.clone());
        conversation.updated_at = now;
        conversation.message_count = conversation.messages.len();
        if conversation.title.is_none() {
            conversation.title = Some(generate_title(&conversation.messages, now));
        }
        let conversation = conversation.clone();
        g.last_activity = Some(now);
        Ok((message, conversation))
    }

    /// Remove a conversation; returns it when it existed.
    pub async fn delete(&self, id: &str) -> Result<Conversation, ConversationError> {
        let mut g = self.inner.write().await;
        let removed = g
            .conversations
            .remove(id)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))?;
        g.last_activity = Some(Utc::now());
        log::info!("conversation deleted: {}", id);
        Ok(removed)
    }

    pub async fn stats(&self) -> ConversationStats {
        let g = self.inner.read().await;
        compute_stats(&g, Utc::now())
    }

    /// Snapshot of every conversation, oldest first.
    pub async fn export(&self) -> ExportSnapshot {
        let g = self.inner.read().await;
        let now = Utc::now();
        let mut conversations: Vec<Conversation> = g.conversations.values().cloned().collect();
        conversations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        ExportSnapshot {
            version: EXPORT_VERSION.to_string(),
            export_date: now,
            total_conversations: conversations.len(),
            conversations,
            stats: compute_stats(&g, now),
        }
    }

    /// Load conversations from an export. Entries need an id and a messages array; existing ids
    /// are skipped unless `overwrite` is set.
    pub async fn import(&self, items: &[Value], overwrite: bool) -> ImportReport {
        let now = Utc::now();
        let mut report = ImportReport {
            total: items.len(),
            ..ImportReport::default()
        };
        let mut g = self.inner.write().await;
        for item in items {
            let mut conversation: Conversation = match serde_json::from_value(item.clone()) {
                Ok(c) => c,
                Err(e) => {
                    log::debug!("import: skipping invalid conversation: {}", e);
                    report.errors += 1;
                    continue;
                }
            };
            if conversation.id.trim().is_empty() {
                report.errors += 1;
                continue;
            }
            if g.conversations.contains_key(&conversation.id) && !overwrite {
                report.skipped += 1;
                continue;
            }
            conversation.updated_at = now;
            conversation.message_count = conversation.messages.len();
            g.conversations.insert(conversation.id.clone(), conversation);
            report.imported += 1;
        }
        g.last_activity = Some(now);
        log::info!(
            "import finished: {} imported, {} skipped, {} errors",
            report.imported,
            report.skipped,
            report.errors
        );
        report
    }
}

fn matches_search(conversation: &Conversation, needle: &str) -> bool {
    conversation
        .title
        .as_deref()
        .is_some_and(|t| t.to_lowercase().contains(needle))
        || conversation
            .messages
            .iter()
            .any(|m| m.content.to_lowercase().contains(needle))
}

fn check_role(role: Option<&str>, field: &str, errors: &mut ValidationError) -> Option<Role> {
    let parsed = role.and_then(Role::parse);
    if parsed.is_none() {
        errors.push(field, "role must be one of user, assistant, system");
    }
    parsed
}

fn check_content(content: Option<&str>, field: &str, errors: &mut ValidationError) {
    let len = content.map_or(0, |c| c.chars().count());
    if len == 0 || len > MAX_CONTENT_CHARS {
        errors.push(
            field,
            format!("content must be between 1 and {} characters", MAX_CONTENT_CHARS),
        );
    }
}

/// Check an upsert body and build its messages.
fn validate_conversation(
    input: &ConversationInput,
    now: DateTime<Utc>,
) -> Result<Vec<Message>, ValidationError> {
    let mut errors = ValidationError::default();
    if let Some(id) = input.id.as_deref() {
        if uuid::Uuid::parse_str(id).is_err() {
            errors.push("id", "id must be a UUID");
        }
    }
    if let Some(title) = input.title.as_deref() {
        if title.chars().count() > MAX_TITLE_CHARS {
            errors.push("title", format!("title must be at most {} characters", MAX_TITLE_CHARS));
        }
    }
    if let Some(url) = input.webhook_url.as_deref() {
        if let Err(msg) = parse_webhook_url(url) {
            errors.push("webhookUrl", msg);
        }
    }
    let mut messages = Vec::with_capacity(input.messages.len());
    for (i, m) in input.messages.iter().enumerate() {
        let role = check_role(m.role.as_deref(), &format!("messages[{}].role", i), &mut errors);
        if m.content.as_deref().map_or(true, str::is_empty) {
            errors.push(format!("messages[{}].content", i), "content is required");
        }
        if let Some(role) = role {
            messages.push(Message {
                id: m.id.clone(),
                role,
                content: m.content.clone().unwrap_or_default(),
                timestamp: m
                    .timestamp
                    .as_deref()
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .or(Some(now)),
                metadata: m.metadata.clone(),
            });
        }
    }
    errors.into_result(|| messages)
}

/// Title from the first user message (first 50 characters), or a generic one.
pub fn generate_title(messages: &[Message], now: DateTime<Utc>) -> String {
    if messages.is_empty() {
        return "New conversation".to_string();
    }
    match messages
        .iter()
        .find(|m| m.role == Role::User && !m.content.is_empty())
    {
        Some(m) => {
            let mut title: String = m.content.chars().take(TITLE_PREVIEW_CHARS).collect();
            if m.content.chars().count() > TITLE_PREVIEW_CHARS {
                title.push_str("...");
            }
            title
        }
        None => format!("Conversation from {}", now.format("%Y-%m-%d")),
    }
}

fn compute_stats(inner: &Inner, now: DateTime<Utc>) -> ConversationStats {
    let conversations = &inner.conversations;
    let total_messages: usize = conversations.values().map(|c| c.messages.len()).sum();
    let average = if conversations.is_empty() {
        0
    } else {
        (total_messages as f64 / conversations.len() as f64).round() as usize
    };
    let mut messages_by_role: BTreeMap<String, usize> = Role::ALL
        .iter()
        .map(|r| (r.as_str().to_string(), 0))
        .collect();
    for m in conversations.values().flat_map(|c| c.messages.iter()) {
        *messages_by_role.entry(m.role.as_str().to_string()).or_default() += 1;
    }
    let day_ago = now - Duration::hours(24);
    ConversationStats {
        total_conversations: conversations.len(),
        total_messages,
        average_messages_per_conversation: average,
        messages_by_role,
        recent_conversations: conversations
            .values()
            .filter(|c| c.updated_at > day_ago)
            .count(),
        last_activity: inner.last_activity,
        oldest_conversation: conversations.values().map(|c| c.created_at).min(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(role: &str, content: &str) -> MessageInput {
        MessageInput {
            role: Some(role.to_string()),
            content: Some(content.to_string()),
            ..MessageInput::default()
        }
    }

    #[tokio::test]
    async fn upsert_generates_id_and_title() {
        let store = ConversationStore::new();
        let (conv, is_new) = store
            .upsert(ConversationInput {
                messages: vec![msg("user", "How do I configure a webhook?"), msg("assistant", "Like this.")],
                ..ConversationInput::default()
            })
            .await
            .unwrap();
        assert!(is_new);
        assert!(uuid::Uuid::parse_str(&conv.id).is_ok());
        assert_eq!(conv.title.as_deref(), Some("How do I configure a webhook?"));
        assert_eq!(conv.message_count, 2);
        assert_eq!(store.get(&conv.id).await, Some(conv));
    }

    #[tokio::test]
    async fn upsert_keeps_created_at_and_title_on_update() {
        let store = ConversationStore::new();
        let id = uuid::Uuid::new_v4().to_string();
        let (first, _) = store
            .upsert(ConversationInput {
                id: Some(id.clone()),
                title: Some("Pinned".to_string()),
                ..ConversationInput::default()
            })
            .await
            .unwrap();
        let (second, is_new) = store
            .upsert(ConversationInput {
                id: Some(id.clone()),
                messages: vec![msg("user", "hello")],
                ..ConversationInput::default()
            })
            .await
            .unwrap();
        assert!(!is_new);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.title.as_deref(), Some("Pinned"));
        assert_eq!(second.messages.len(), 1);
    }

    #[tokio::test]
    async fn upsert_reports_invalid_fields() {
        let store = ConversationStore::new();
        let err = store
            .upsert(ConversationInput {
                id: Some("not-a-uuid".to_string()),
                title: Some("x".repeat(201)),
                messages: vec![msg("robot", "hi"), msg("user", "")],
                webhook_url: Some("nope".to_string()),
            })
            .await
            .unwrap_err();
        let ConversationError::Invalid(v) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            v.fields(),
            vec!["id", "title", "webhookUrl", "messages[0].role", "messages[1].content"]
        );
    }

    #[tokio::test]
    async fn append_creates_conversation_and_title() {
        let store = ConversationStore::new();
        let long = "a".repeat(60);
        let (message, conv) = store.append_message("c1", msg("user", &long)).await.unwrap();
        assert_eq!(message.role, Role::User);
        assert!(message.id.is_some());
        assert_eq!(conv.message_count, 1);
        assert_eq!(conv.title, Some(format!("{}...", "a".repeat(50))));

        let (_, conv) = store.append_message("c1", msg("assistant", "reply")).await.unwrap();
        assert_eq!(conv.message_count, 2);
    }

    #[tokio::test]
    async fn append_validates_role_and_content() {
        let store = ConversationStore::new();
        let err = store
            .append_message(
                "c1",
                MessageInput {
                    role: Some("bot".to_string()),
                    content: Some(String::new()),
                    timestamp: Some("yesterday".to_string()),
                    ..MessageInput::default()
                },
            )
            .await
            .unwrap_err();
        let ConversationError::Invalid(v) = err else {
            panic!("expected validation error");
        };
        assert_eq!(v.fields(), vec!["role", "content", "timestamp"]);
        assert!(store.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn list_searches_sorts_and_paginates() {
        let store = ConversationStore::new();
        store.append_message("a", msg("user", "talk about rust")).await.unwrap();
        store.append_message("b", msg("user", "talk about webhooks")).await.unwrap();
        store.append_message("c", msg("user", "RUST again")).await.unwrap();

        let page = store
            .list(&ListQuery {
                search: Some("rust".to_string()),
                ..ListQuery::default()
            })
            .await;
        let ids: Vec<&str> = page.conversations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(page.pagination.total, 2);
        assert!(!page.pagination.has_more);

        let page = store
            .list(&ListQuery {
                limit: Some(1),
                offset: Some(1),
                ..ListQuery::default()
            })
            .await;
        assert_eq!(page.conversations.len(), 1);
        assert_eq!(page.conversations[0].id, "b");
        assert!(page.pagination.has_more);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = ConversationStore::new();
        assert!(matches!(
            store.delete("ghost").await,
            Err(ConversationError::NotFound(_))
        ));
        store.append_message("x", msg("user", "hi")).await.unwrap();
        assert!(store.delete("x").await.is_ok());
        assert!(store.get("x").await.is_none());
    }

    #[tokio::test]
    async fn stats_count_roles() {
        let store = ConversationStore::new();
        store.append_message("a", msg("user", "one")).await.unwrap();
        store.append_message("a", msg("assistant", "two")).await.unwrap();
        store.append_message("b", msg("user", "three")).await.unwrap();
        let stats = store.stats().await;
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.average_messages_per_conversation, 2);
        assert_eq!(stats.messages_by_role["user"], 2);
        assert_eq!(stats.messages_by_role["system"], 0);
        assert_eq!(stats.recent_conversations, 2);
        assert!(stats.last_activity.is_some());
    }

    #[tokio::test]
    async fn export_then_import_respects_overwrite() {
        let source = ConversationStore::new();
        source.append_message("a", msg("user", "hello")).await.unwrap();
        let snapshot = source.export().await;
        assert_eq!(snapshot.version, "1.0");
        assert_eq!(snapshot.total_conversations, 1);

        let items = serde_json::to_value(&snapshot.conversations).unwrap();
        let items = items.as_array().unwrap().clone();
        let mut items_with_bad = items.clone();
        items_with_bad.push(json!({ "id": "broken" }));
        items_with_bad.push(json!({ "id": "", "messages": [] }));

        let target = ConversationStore::new();
        let report = target.import(&items_with_bad, false).await;
        assert_eq!(
            report,
            ImportReport { imported: 1, skipped: 0, errors: 2, total: 3 }
        );
        let report = target.import(&items, false).await;
        assert_eq!(report.skipped, 1);
        let report = target.import(&items, true).await;
        assert_eq!(report.imported, 1);
        assert_eq!(target.get("a").await.unwrap().messages[0].content, "hello");
    }

    #[test]
    fn title_fallbacks() {
        let now = Utc::now();
        assert_eq!(generate_title(&[], now), "New conversation");
        let system_only = vec![Message {
            id: None,
            role: Role::System,
            content: "be nice".to_string(),
            timestamp: None,
            metadata: Map::new(),
        }];
        assert!(generate_title(&system_only, now).starts_with("Conversation from "));
    }
}
