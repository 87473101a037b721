//! Message lifecycle: who may read or write a conversation, how the read
//! flags and the conversation status move, and when the broadcaster is told.
//!
//! Writes that span more than one statement (conversation + first message,
//! message + status) run in one transaction; the broadcaster only ever sees
//! rows that are already committed.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::error::{AppError, AppResult};
use crate::session::Actor;
use crate::store::{
    self, Conversation, ConversationSummary, Message, NewConversation, Role, Status,
};

const DEFAULT_SUBJECT: &str = "General";

/// Opens a conversation from a contact-form submission. The submitted text
/// becomes message #1, from the visitor, in the same transaction, so a
/// conversation is never visible without its first message.
pub async fn create_conversation(
    pool: &SqlitePool,
    hub: &Broadcaster,
    form: &NewConversation,
) -> AppResult<(i64, Message)> {
    if form.name.trim().is_empty() || form.email.trim().is_empty() || form.body.trim().is_empty() {
        return Err(AppError::invalid("name, email and message are required"));
    }
    if !valid_email(&form.email) {
        return Err(AppError::invalid("invalid email address"));
    }

    let subject = form
        .subject
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SUBJECT);

    let mut tx = pool.begin().await?;
    let id = store::insert_conversation(
        &mut *tx,
        form.name.trim(),
        form.email.trim(),
        form.phone.as_deref(),
        subject,
        form.body.trim(),
    )
    .await?;
    let message = store::insert_message(&mut *tx, id, Role::Visitor, form.body.trim()).await?;
    tx.commit().await?;

    info!(conversation_id = id, email = %form.email, "conversation opened");
    let delivered = hub.publish(id, &message);
    debug!(conversation_id = id, delivered, "first message published");

    Ok((id, message))
}

/// Stores a message from the actor and moves the conversation status: an
/// admin reply lands it on `Replied`, a visitor message forces it back to
/// `New` whatever it was before, reopening resolved threads on purpose.
pub async fn send_message(
    pool: &SqlitePool,
    hub: &Broadcaster,
    actor: &Actor,
    conversation_id: i64,
    body: &str,
) -> AppResult<Message> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::invalid("message body must not be empty"));
    }

    authorize(pool, actor, conversation_id).await?;

    let status = match actor.role {
        Role::Admin => Status::Replied,
        Role::Visitor => Status::New,
    };

    let mut tx = pool.begin().await?;
    let message = store::insert_message(&mut *tx, conversation_id, actor.role, body).await?;
    store::set_status(&mut *tx, conversation_id, status).await?;
    tx.commit().await?;

    // fan-out is best effort; the write above is already durable
    let delivered = hub.publish(conversation_id, &message);
    debug!(conversation_id, sender = ?actor.role, delivered, "message published");

    Ok(message)
}

/// Returns the conversation's messages in creation order and, as a read
/// receipt, flips the unread flag on everything the counterpart sent. An
/// admin opening a `New` thread also moves it to `Read`; the guard keeps a
/// later fetch from downgrading `Replied` or `Resolved`.
pub async fn fetch_messages(
    pool: &SqlitePool,
    actor: &Actor,
    conversation_id: i64,
) -> AppResult<Vec<Message>> {
    authorize(pool, actor, conversation_id).await?;

    let messages = store::messages(pool, conversation_id).await?;
    store::mark_read_from(pool, conversation_id, actor.role.opposite()).await?;
    if actor.is_admin() {
        store::set_status_if(pool, conversation_id, Status::Read, Status::New).await?;
    }
    Ok(messages)
}

/// Inbox rows for the actor: admins get every thread with visitor-unread
/// counts, visitors get their own threads with admin-unread counts.
pub async fn list_conversations(
    pool: &SqlitePool,
    actor: &Actor,
) -> AppResult<Vec<ConversationSummary>> {
    let summaries = match actor.role {
        Role::Admin => store::list_conversations(pool, Role::Visitor, None).await?,
        Role::Visitor => {
            store::list_conversations(pool, Role::Admin, Some(&actor.email)).await?
        }
    };
    Ok(summaries)
}

/// Legacy bulk read-receipt by explicit message ids.
pub async fn mark_read(pool: &SqlitePool, ids: &[i64]) -> AppResult<u64> {
    if ids.is_empty() {
        return Err(AppError::invalid("no message ids given"));
    }
    Ok(store::mark_read_by_ids(pool, ids).await?)
}

/// Admin status override; the only way a thread reaches `Resolved`.
pub async fn set_status(pool: &SqlitePool, id: i64, status: Status) -> AppResult<()> {
    require(pool, id).await?;
    store::set_status(pool, id, status).await?;
    info!(conversation_id = id, status = ?status, "status overridden");
    Ok(())
}

async fn require(pool: &SqlitePool, conversation_id: i64) -> AppResult<Conversation> {
    store::conversation(pool, conversation_id)
        .await?
        .ok_or(AppError::ConversationNotFound(conversation_id))
}

/// Admins reach every thread; a visitor only the threads opened under their
/// own email.
async fn authorize(pool: &SqlitePool, actor: &Actor, conversation_id: i64) -> AppResult<()> {
    let conversation = require(pool, conversation_id).await?;
    if !actor.is_admin() && conversation.email != actor.email {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// Same shape the contact form enforced upstream: something before the `@`,
/// a dot somewhere in the domain, no whitespace anywhere.
pub(crate) fn valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    matches!(domain.rsplit_once('.'), Some((host, tld)) if !host.is_empty() && !tld.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (SqlitePool, Broadcaster) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        store::init(&pool).await.unwrap();
        (pool, Broadcaster::new())
    }

    fn visitor(email: &str) -> Actor {
        Actor {
            email: email.to_owned(),
            role: Role::Visitor,
        }
    }

    fn admin() -> Actor {
        Actor {
            email: "admin@x.com".to_owned(),
            role: Role::Admin,
        }
    }

    fn form(email: &str, body: &str) -> NewConversation {
        NewConversation {
            name: "Ana".to_owned(),
            email: email.to_owned(),
            phone: None,
            subject: None,
            body: body.to_owned(),
        }
    }

    async fn status_of(pool: &SqlitePool, id: i64) -> Status {
        store::conversation(pool, id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn submission_creates_thread_with_the_form_text_as_first_message() {
        let (pool, hub) = setup().await;
        let (id, first) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();

        assert_eq!(status_of(&pool, id).await, Status::New);
        assert_eq!(first.sender, Role::Visitor);
        assert_eq!(first.body, "Help");

        let msgs = fetch_messages(&pool, &admin(), id).await.unwrap();
        assert_eq!(msgs[0].body, "Help");
        assert_eq!(msgs[0].sender, Role::Visitor);
    }

    #[tokio::test]
    async fn malformed_submissions_are_rejected() {
        let (pool, hub) = setup().await;
        for bad in [
            form("", "Help"),
            form("ana@x.com", "   "),
            form("not an email", "Help"),
            form("ana@nodot", "Help"),
        ] {
            assert!(matches!(
                create_conversation(&pool, &hub, &bad).await,
                Err(AppError::Invalid(_))
            ));
        }
        assert!(store::list_all(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_sets_status_by_sender_role_regardless_of_prior_state() {
        let (pool, hub) = setup().await;
        let (id, _) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();

        send_message(&pool, &hub, &admin(), id, "On it").await.unwrap();
        assert_eq!(status_of(&pool, id).await, Status::Replied);

        set_status(&pool, id, Status::Resolved).await.unwrap();

        // visitor follow-up reopens a resolved thread
        send_message(&pool, &hub, &visitor("ana@x.com"), id, "Still broken")
            .await
            .unwrap();
        assert_eq!(status_of(&pool, id).await, Status::New);

        send_message(&pool, &hub, &admin(), id, "Looking again").await.unwrap();
        assert_eq!(status_of(&pool, id).await, Status::Replied);
    }

    #[tokio::test]
    async fn empty_body_is_rejected_and_nothing_is_stored() {
        let (pool, hub) = setup().await;
        let (id, _) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();

        for actor in [admin(), visitor("ana@x.com")] {
            assert!(matches!(
                send_message(&pool, &hub, &actor, id, "   \t\n").await,
                Err(AppError::Invalid(_))
            ));
        }
        assert_eq!(store::messages(&pool, id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn admin_fetch_moves_new_to_read_exactly_once() {
        let (pool, hub) = setup().await;
        let (id, _) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();

        fetch_messages(&pool, &admin(), id).await.unwrap();
        assert_eq!(status_of(&pool, id).await, Status::Read);

        fetch_messages(&pool, &admin(), id).await.unwrap();
        assert_eq!(status_of(&pool, id).await, Status::Read);

        // fetch never downgrades a replied thread
        send_message(&pool, &hub, &admin(), id, "On it").await.unwrap();
        fetch_messages(&pool, &admin(), id).await.unwrap();
        assert_eq!(status_of(&pool, id).await, Status::Replied);
    }

    #[tokio::test]
    async fn fetch_flips_exactly_the_counterpart_unread_messages() {
        let (pool, hub) = setup().await;
        let (id, _) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();
        send_message(&pool, &hub, &visitor("ana@x.com"), id, "more detail")
            .await
            .unwrap();
        send_message(&pool, &hub, &admin(), id, "On it").await.unwrap();

        fetch_messages(&pool, &admin(), id).await.unwrap();
        let msgs = store::messages(&pool, id).await.unwrap();
        assert!(msgs.iter().filter(|m| m.sender == Role::Visitor).all(|m| m.read));
        assert!(msgs.iter().filter(|m| m.sender == Role::Admin).all(|m| !m.read));

        fetch_messages(&pool, &visitor("ana@x.com"), id).await.unwrap();
        let msgs = store::messages(&pool, id).await.unwrap();
        assert!(msgs.iter().all(|m| m.read));
    }

    #[tokio::test]
    async fn bulk_mark_read_rejects_an_empty_id_list() {
        let (pool, hub) = setup().await;
        let (id, first) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();

        assert!(matches!(
            mark_read(&pool, &[]).await,
            Err(AppError::Invalid(_))
        ));
        assert!(!store::messages(&pool, id).await.unwrap()[0].read);

        assert_eq!(mark_read(&pool, &[first.id]).await.unwrap(), 1);
        assert!(store::messages(&pool, id).await.unwrap()[0].read);
    }

    #[tokio::test]
    async fn visitors_only_reach_their_own_threads() {
        let (pool, hub) = setup().await;
        let (id, _) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();

        assert!(matches!(
            fetch_messages(&pool, &visitor("mallory@x.com"), id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            send_message(&pool, &hub, &visitor("mallory@x.com"), id, "hi").await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            fetch_messages(&pool, &admin(), 9999).await,
            Err(AppError::ConversationNotFound(9999))
        ));
    }

    #[tokio::test]
    async fn inbox_views_are_scoped_per_role() {
        let (pool, hub) = setup().await;
        let (a, _) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();
        create_conversation(&pool, &hub, &form("bo@x.com", "Hi")).await.unwrap();
        send_message(&pool, &hub, &admin(), a, "On it").await.unwrap();

        let inbox = list_conversations(&pool, &admin()).await.unwrap();
        assert_eq!(inbox.len(), 2);
        let ana = inbox.iter().find(|s| s.id == a).unwrap();
        assert_eq!(ana.unread_count, 1);
        assert_eq!(ana.last_message.as_deref(), Some("On it"));

        let mine = list_conversations(&pool, &visitor("ana@x.com")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, a);
        assert_eq!(mine[0].unread_count, 1);
    }

    #[tokio::test]
    async fn send_publishes_the_stored_row_to_the_room() {
        let (pool, hub) = setup().await;
        let (id, _) = create_conversation(&pool, &hub, &form("ana@x.com", "Help"))
            .await
            .unwrap();

        let mut rx = hub.join(id);
        let sent = send_message(&pool, &hub, &admin(), id, "On it").await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, sent.id);
        assert_eq!(received.body, "On it");
        assert!(!received.read);

        // joining after the publish replays nothing
        let mut late = hub.join(id);
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn end_to_end_contact_flow() {
        let (pool, hub) = setup().await;

        let (id, first) = create_conversation(
            &pool,
            &hub,
            &NewConversation {
                name: "Ana".to_owned(),
                email: "ana@x.com".to_owned(),
                phone: None,
                subject: Some("Support".to_owned()),
                body: "Help".to_owned(),
            },
        )
        .await
        .unwrap();
        assert_eq!(status_of(&pool, id).await, Status::New);
        assert_eq!(first.body, "Help");

        let msgs = fetch_messages(&pool, &admin(), id).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(status_of(&pool, id).await, Status::Read);
        let msgs = store::messages(&pool, id).await.unwrap();
        assert!(msgs[0].read);

        let mut rx = hub.join(id);
        send_message(&pool, &hub, &admin(), id, "On it").await.unwrap();
        assert_eq!(status_of(&pool, id).await, Status::Replied);
        assert_eq!(rx.recv().await.unwrap().body, "On it");
    }

    #[test]
    fn email_shapes() {
        assert!(valid_email("ana@x.com"));
        assert!(valid_email("a.b+c@mail.example.org"));
        assert!(!valid_email("ana@x"));
        assert!(!valid_email("@x.com"));
        assert!(!valid_email("ana x@x.com"));
        assert!(!valid_email("ana@@x.com"));
        assert!(!valid_email("ana@.com"));
    }
}
