use std::{collections::HashMap, sync::Arc};

use anyhow::anyhow;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use tokio::sync::{OnceCell, RwLock};

use super::{db::ensure_db_schema, errors::AuthFailure, types::ConversationSummary};

/// One row of the append-only direct-message log. Immutable once appended;
/// `message_id` is store-assigned and monotonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredMessage {
    pub(crate) message_id: i64,
    pub(crate) sender_id: String,
    pub(crate) sender_name: String,
    pub(crate) recipient_id: String,
    pub(crate) body: String,
    pub(crate) kind: String,
    pub(crate) created_at_unix: i64,
    pub(crate) delivered: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct NewMessage {
    pub(crate) sender_id: String,
    pub(crate) sender_name: String,
    pub(crate) recipient_id: String,
    pub(crate) body: String,
    pub(crate) kind: String,
    pub(crate) created_at_unix: i64,
    pub(crate) delivered: bool,
}

/// Durable message log. Postgres-backed when a database url is configured,
/// process-local otherwise (the same dual-backend arrangement as the rest
/// of the portal's services).
#[derive(Clone)]
pub(crate) struct MessageStore {
    pub(crate) pool: Option<PgPool>,
    pub(crate) schema_ready: Arc<OnceCell<()>>,
    memory: Arc<RwLock<MemoryLog>>,
}

#[derive(Default)]
struct MemoryLog {
    next_id: i64,
    messages: Vec<StoredMessage>,
}

impl MessageStore {
    pub(crate) fn new(database_url: Option<&str>) -> anyhow::Result<Self> {
        let pool = match database_url {
            Some(database_url) => Some(
                PgPoolOptions::new()
                    .max_connections(10)
                    .connect_lazy(database_url)
                    .map_err(|e| anyhow!("postgres pool init failed: {e}"))?,
            ),
            None => None,
        };

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
            memory: Arc::new(RwLock::new(MemoryLog::default())),
        })
    }

    pub(crate) async fn append(&self, message: NewMessage) -> Result<StoredMessage, AuthFailure> {
        if let Some(pool) = &self.pool {
            ensure_db_schema(self).await?;
            let row = sqlx::query(
                "INSERT INTO direct_messages
                     (sender_id, sender_name, recipient_id, body, kind, created_at_unix, delivered)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING message_id",
            )
            .bind(&message.sender_id)
            .bind(&message.sender_name)
            .bind(&message.recipient_id)
            .bind(&message.body)
            .bind(&message.kind)
            .bind(message.created_at_unix)
            .bind(message.delivered)
            .fetch_one(pool)
            .await
            .map_err(|e| {
                tracing::error!(event = "store.append", error = %e);
                AuthFailure::Internal
            })?;
            let message_id: i64 = row.try_get("message_id").map_err(|_| AuthFailure::Internal)?;
            return Ok(StoredMessage {
                message_id,
                sender_id: message.sender_id,
                sender_name: message.sender_name,
                recipient_id: message.recipient_id,
                body: message.body,
                kind: message.kind,
                created_at_unix: message.created_at_unix,
                delivered: message.delivered,
            });
        }

        let mut log = self.memory.write().await;
        log.next_id += 1;
        let stored = StoredMessage {
            message_id: log.next_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            recipient_id: message.recipient_id,
            body: message.body,
            kind: message.kind,
            created_at_unix: message.created_at_unix,
            delivered: message.delivered,
        };
        log.messages.push(stored.clone());
        Ok(stored)
    }

    /// Both directions of the `{viewer, counterpart}` pair, ascending by
    /// creation time with the monotonic id as tie-break. `limit` is a fixed
    /// window over the oldest messages, not pagination.
    pub(crate) async fn history_between(
        &self,
        viewer: &str,
        counterpart: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, AuthFailure> {
        if let Some(pool) = &self.pool {
            ensure_db_schema(self).await?;
            let limit_i64 = i64::try_from(limit).map_err(|_| AuthFailure::InvalidRequest)?;
            let rows = sqlx::query(
                "SELECT message_id, sender_id, sender_name, recipient_id, body, kind,
                        created_at_unix, delivered
                 FROM direct_messages
                 WHERE (sender_id = $1 AND recipient_id = $2)
                    OR (sender_id = $2 AND recipient_id = $1)
                 ORDER BY created_at_unix ASC, message_id ASC
                 LIMIT $3",
            )
            .bind(viewer)
            .bind(counterpart)
            .bind(limit_i64)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::error!(event = "store.history", error = %e);
                AuthFailure::Internal
            })?;

            let mut messages = Vec::with_capacity(rows.len());
            for row in rows {
                messages.push(stored_message_from_row(&row)?);
            }
            return Ok(messages);
        }

        let log = self.memory.read().await;
        let mut messages: Vec<StoredMessage> = log
            .messages
            .iter()
            .filter(|message| {
                (message.sender_id == viewer && message.recipient_id == counterpart)
                    || (message.sender_id == counterpart && message.recipient_id == viewer)
            })
            .cloned()
            .collect();
        messages.sort_by_key(|message| (message.created_at_unix, message.message_id));
        messages.truncate(limit);
        Ok(messages)
    }

    /// One entry per distinct counterpart, carrying the latest message of
    /// the pair, descending by that message's time (id as tie-break, so
    /// "most recently appended wins" on equal timestamps). The counterpart
    /// display name is the one the counterpart most recently sent under;
    /// a counterpart that never sent falls back to its id.
    pub(crate) async fn inbox_for(
        &self,
        viewer: &str,
    ) -> Result<Vec<ConversationSummary>, AuthFailure> {
        if let Some(pool) = &self.pool {
            ensure_db_schema(self).await?;
            let rows = sqlx::query(
                "SELECT counterpart_id, message_id, sender_id, sender_name, body, kind,
                        created_at_unix
                 FROM (
                     SELECT DISTINCT ON (counterpart_id) *
                     FROM (
                         SELECT CASE WHEN sender_id = $1 THEN recipient_id ELSE sender_id END
                                    AS counterpart_id,
                                message_id, sender_id, sender_name, body, kind, created_at_unix
                         FROM direct_messages
                         WHERE sender_id = $1 OR recipient_id = $1
                     ) AS pair_messages
                     ORDER BY counterpart_id, created_at_unix DESC, message_id DESC
                 ) AS latest
                 ORDER BY created_at_unix DESC, message_id DESC",
            )
            .bind(viewer)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::error!(event = "store.inbox", error = %e);
                AuthFailure::Internal
            })?;

            let name_rows = sqlx::query(
                "SELECT DISTINCT ON (sender_id) sender_id, sender_name
                 FROM direct_messages
                 WHERE recipient_id = $1
                 ORDER BY sender_id, created_at_unix DESC, message_id DESC",
            )
            .bind(viewer)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::error!(event = "store.inbox", error = %e);
                AuthFailure::Internal
            })?;
            let mut names = HashMap::with_capacity(name_rows.len());
            for row in name_rows {
                let sender_id: String =
                    row.try_get("sender_id").map_err(|_| AuthFailure::Internal)?;
                let sender_name: String = row
                    .try_get("sender_name")
                    .map_err(|_| AuthFailure::Internal)?;
                names.insert(sender_id, sender_name);
            }

            let mut conversations = Vec::with_capacity(rows.len());
            for row in rows {
                let counterpart_id: String = row
                    .try_get("counterpart_id")
                    .map_err(|_| AuthFailure::Internal)?;
                let body: String = row.try_get("body").map_err(|_| AuthFailure::Internal)?;
                let kind: String = row.try_get("kind").map_err(|_| AuthFailure::Internal)?;
                let created_at_unix: i64 = row
                    .try_get("created_at_unix")
                    .map_err(|_| AuthFailure::Internal)?;
                conversations.push(ConversationSummary {
                    counterpart_name: names
                        .get(&counterpart_id)
                        .cloned()
                        .unwrap_or_else(|| counterpart_id.clone()),
                    counterpart_id,
                    last_message_body: body,
                    last_message_kind: kind,
                    last_message_time: created_at_unix,
                });
            }
            return Ok(conversations);
        }

        let log = self.memory.read().await;
        let mut latest: HashMap<String, &StoredMessage> = HashMap::new();
        let mut names: HashMap<String, (i64, i64, &str)> = HashMap::new();
        for message in &log.messages {
            let counterpart = if message.sender_id == viewer {
                &message.recipient_id
            } else if message.recipient_id == viewer {
                &message.sender_id
            } else {
                continue;
            };

            let entry = latest.entry(counterpart.clone()).or_insert(message);
            if (message.created_at_unix, message.message_id)
                > (entry.created_at_unix, entry.message_id)
            {
                *entry = message;
            }

            if message.recipient_id == viewer {
                let candidate = (
                    message.created_at_unix,
                    message.message_id,
                    message.sender_name.as_str(),
                );
                names
                    .entry(message.sender_id.clone())
                    .and_modify(|current| {
                        if (candidate.0, candidate.1) > (current.0, current.1) {
                            *current = candidate;
                        }
                    })
                    .or_insert(candidate);
            }
        }

        let mut ordered: Vec<(i64, i64, ConversationSummary)> = latest
            .into_iter()
            .map(|(counterpart_id, message)| {
                (
                    message.created_at_unix,
                    message.message_id,
                    ConversationSummary {
                        counterpart_name: names
                            .get(&counterpart_id)
                            .map_or_else(|| counterpart_id.clone(), |(_, _, name)| (*name).to_owned()),
                        counterpart_id,
                        last_message_body: message.body.clone(),
                        last_message_kind: message.kind.clone(),
                        last_message_time: message.created_at_unix,
                    },
                )
            })
            .collect();
        ordered.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        Ok(ordered
            .into_iter()
            .map(|(_, _, conversation)| conversation)
            .collect())
    }
}

fn stored_message_from_row(row: &PgRow) -> Result<StoredMessage, AuthFailure> {
    Ok(StoredMessage {
        message_id: row.try_get("message_id").map_err(|_| AuthFailure::Internal)?,
        sender_id: row.try_get("sender_id").map_err(|_| AuthFailure::Internal)?,
        sender_name: row
            .try_get("sender_name")
            .map_err(|_| AuthFailure::Internal)?,
        recipient_id: row
            .try_get("recipient_id")
            .map_err(|_| AuthFailure::Internal)?,
        body: row.try_get("body").map_err(|_| AuthFailure::Internal)?,
        kind: row.try_get("kind").map_err(|_| AuthFailure::Internal)?,
        created_at_unix: row
            .try_get("created_at_unix")
            .map_err(|_| AuthFailure::Internal)?,
        delivered: row.try_get("delivered").map_err(|_| AuthFailure::Internal)?,
    })
}
