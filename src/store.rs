use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::sqlite::SqliteExecutor;
use time::OffsetDateTime;

/// The two parties of every conversation. Used both as the actor's role and
/// as the sender tag stored on each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Visitor,
    Admin,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Visitor => Role::Admin,
            Role::Admin => Role::Visitor,
        }
    }
}

/// Conversation work state. Message sends always force `New` (visitor) or
/// `Replied` (admin); `New -> Read` happens on admin fetch; `Resolved` is
/// only reachable through the admin status override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Status {
    New,
    Read,
    Replied,
    Resolved,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: Role,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[sqlx(rename = "is_read")]
    pub read: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewConversation {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

/// One row of the inbox view: the conversation plus how many of the
/// counterpart's messages are still unread and a preview of the latest one.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConversationSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub unread_count: i64,
    pub last_message: Option<String>,
}

pub async fn init(ex: impl SqliteExecutor<'_>) -> sqlx::Result<()> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'new',
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id),
            sender TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            is_read BOOLEAN NOT NULL DEFAULT FALSE
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id);",
    )
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn insert_conversation(
    ex: impl SqliteExecutor<'_>,
    name: &str,
    email: &str,
    phone: Option<&str>,
    subject: &str,
    body: &str,
) -> sqlx::Result<i64> {
    let result = sqlx::query(
        "INSERT INTO conversations (name, email, phone, subject, body, status, created_at)
         VALUES (?, ?, ?, ?, ?, 'new', ?)",
    )
    .bind(name)
    .bind(email)
    .bind(phone)
    .bind(subject)
    .bind(body)
    .bind(OffsetDateTime::now_utc())
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Inserts an unread message with a server-assigned timestamp and returns the
/// stored row. No round trip: every field is known once the insert lands.
pub async fn insert_message(
    ex: impl SqliteExecutor<'_>,
    conversation_id: i64,
    sender: Role,
    body: &str,
) -> sqlx::Result<Message> {
    let created_at = OffsetDateTime::now_utc();
    let result = sqlx::query(
        "INSERT INTO messages (conversation_id, sender, body, created_at, is_read)
         VALUES (?, ?, ?, ?, FALSE)",
    )
    .bind(conversation_id)
    .bind(sender)
    .bind(body)
    .bind(created_at)
    .execute(ex)
    .await?;

    Ok(Message {
        id: result.last_insert_rowid(),
        conversation_id,
        sender,
        body: body.to_owned(),
        created_at,
        read: false,
    })
}

pub async fn conversation(
    ex: impl SqliteExecutor<'_>,
    id: i64,
) -> sqlx::Result<Option<Conversation>> {
    sqlx::query_as("SELECT * FROM conversations WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await
}

/// All messages of a conversation in creation order; ties on the timestamp
/// break by id so the order is stable.
pub async fn messages(
    ex: impl SqliteExecutor<'_>,
    conversation_id: i64,
) -> sqlx::Result<Vec<Message>> {
    sqlx::query_as(
        "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(conversation_id)
    .fetch_all(ex)
    .await
}

/// Flips the read flag on every unread message of `sender` in the
/// conversation. Returns how many rows actually changed.
pub async fn mark_read_from(
    ex: impl SqliteExecutor<'_>,
    conversation_id: i64,
    sender: Role,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE messages SET is_read = TRUE
         WHERE conversation_id = ? AND sender = ? AND is_read = FALSE",
    )
    .bind(conversation_id)
    .bind(sender)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

pub async fn mark_read_by_ids(ex: impl SqliteExecutor<'_>, ids: &[i64]) -> sqlx::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("UPDATE messages SET is_read = TRUE WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    Ok(query.execute(ex).await?.rows_affected())
}

pub async fn set_status(
    ex: impl SqliteExecutor<'_>,
    id: i64,
    status: Status,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE conversations SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

/// Guarded transition: only fires when the row is still in `expected`.
pub async fn set_status_if(
    ex: impl SqliteExecutor<'_>,
    id: i64,
    status: Status,
    expected: Status,
) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE conversations SET status = ? WHERE id = ? AND status = ?")
        .bind(status)
        .bind(id)
        .bind(expected)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Inbox rows, newest conversation first. `unread_from` picks whose messages
/// count as unread (the counterpart of whoever is looking); `email` narrows
/// the list to a visitor's own threads.
pub async fn list_conversations(
    ex: impl SqliteExecutor<'_>,
    unread_from: Role,
    email: Option<&str>,
) -> sqlx::Result<Vec<ConversationSummary>> {
    let base = "SELECT c.id, c.name, c.email, c.subject, c.status, c.created_at,
          (SELECT COUNT(*) FROM messages
           WHERE conversation_id = c.id AND sender = ? AND is_read = FALSE) AS unread_count,
          (SELECT body FROM messages
           WHERE conversation_id = c.id ORDER BY created_at DESC, id DESC LIMIT 1) AS last_message
         FROM conversations c";

    match email {
        Some(email) => {
            sqlx::query_as(&format!(
                "{base} WHERE c.email = ? ORDER BY c.created_at DESC"
            ))
            .bind(unread_from)
            .bind(email)
            .fetch_all(ex)
            .await
        }
        None => {
            sqlx::query_as(&format!("{base} ORDER BY c.created_at DESC"))
                .bind(unread_from)
                .fetch_all(ex)
                .await
        }
    }
}

pub async fn list_all(ex: impl SqliteExecutor<'_>) -> sqlx::Result<Vec<Conversation>> {
    sqlx::query_as("SELECT * FROM conversations ORDER BY created_at DESC")
        .fetch_all(ex)
        .await
}
