//! Messaging Channel: send, history, read receipts, typing and live
//! subscriptions.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;

use tandem_shared::constants::{DEFAULT_HISTORY_PAGE, MAX_HISTORY_PAGE, MAX_MESSAGE_CHARS};
use tandem_shared::protocol::{MessageView, ServerEvent};
use tandem_shared::types::{ConversationId, MessageId, ProfileId};
use tandem_store::{conversations, messages, to_stored_precision, Message, StoreError};

use super::{lifecycle, Engine};
use crate::error::ServerError;
use crate::hub::Subscription;

const MAX_CLIENT_TOKEN_LEN: usize = 128;

/// Trimmed message body, or a validation error.
pub(crate) fn validate_content(raw: &str) -> Result<String, ServerError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ServerError::Validation("message is empty".into()));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ServerError::Validation(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(content.to_string())
}

fn validate_token(token: Option<&str>) -> Result<(), ServerError> {
    match token {
        Some(t) if t.is_empty() || t.len() > MAX_CLIENT_TOKEN_LEN => Err(ServerError::Validation(
            format!("client_token must be 1..={MAX_CLIENT_TOKEN_LEN} bytes"),
        )),
        _ => Ok(()),
    }
}

enum SendResult {
    Sent(Message),
    /// Same client token seen before; nothing was written.
    Replayed(Message),
    /// Expiry observed and cached; the caller reports `Expired`.
    Expired,
}

fn send_in_tx(
    conn: &Connection,
    conversation_id: ConversationId,
    sender: ProfileId,
    content: &str,
    client_token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SendResult, ServerError> {
    let (conversation, matched) = lifecycle::authorize(conn, conversation_id, sender)?;
    if matched.is_terminated() {
        return Err(ServerError::Forbidden(
            "this conversation is no longer available".into(),
        ));
    }

    if let Some(token) = client_token {
        if let Some(existing) = messages::find_by_token(conn, conversation_id, sender, token)? {
            return Ok(SendResult::Replayed(existing));
        }
    }

    if conversation.is_expired(now) {
        conversations::mark_expired(conn, conversation_id)?;
        return Ok(SendResult::Expired);
    }

    let message = messages::insert(conn, conversation_id, sender, content, client_token, now)?;
    lifecycle::record_activity(conn, conversation_id, &message.content, message.created_at)?;
    Ok(SendResult::Sent(message))
}

impl Engine {
    /// Append a message and fan it out to the conversation's subscribers.
    ///
    /// Never retried here: the client owns retries and may pass a
    /// `client_token` so a resend returns the original message.
    pub async fn send(
        &self,
        sender: ProfileId,
        conversation_id: ConversationId,
        content: &str,
        client_token: Option<String>,
    ) -> Result<MessageView, ServerError> {
        let content = validate_content(content)?;
        validate_token(client_token.as_deref())?;

        // Held across commit and publish so subscribers see commit order.
        let sequencer = self.hub.sequencer(conversation_id);
        let _turn = sequencer.lock().await;
        let now = self.clock.now();

        let result = self
            .store
            .run(move |db| {
                db.write(|conn| {
                    send_in_tx(
                        conn,
                        conversation_id,
                        sender,
                        &content,
                        client_token.as_deref(),
                        now,
                    )
                })
            })
            .await?;

        match result {
            SendResult::Sent(message) => {
                let view = MessageView::from(message);
                let delivered = self.hub.publish(
                    conversation_id,
                    ServerEvent::MessageCreated {
                        message: view.clone(),
                    },
                    None,
                );
                debug!(
                    conversation = %conversation_id,
                    message = %view.id,
                    delivered,
                    "Message sent"
                );
                Ok(view)
            }
            SendResult::Replayed(message) => {
                debug!(conversation = %conversation_id, message = %message.id, "Send replayed");
                Ok(message.into())
            }
            SendResult::Expired => Err(ServerError::Expired),
        }
    }

    /// Messages in `(created_at, id)` order after the `after` cursor.
    pub async fn history(
        &self,
        reader: ProfileId,
        conversation_id: ConversationId,
        after: Option<MessageId>,
        limit: Option<u32>,
    ) -> Result<Vec<MessageView>, ServerError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_PAGE).clamp(1, MAX_HISTORY_PAGE);
        self.store
            .run(move |db| {
                let conn = db.conn();
                let (_, matched) = lifecycle::authorize(conn, conversation_id, reader)?;
                if matched.is_terminated() {
                    return Err(ServerError::Forbidden(
                        "this conversation is no longer available".into(),
                    ));
                }
                let page = messages::page(conn, conversation_id, after, limit).map_err(|e| match e {
                    StoreError::NotFound => ServerError::NotFound("message cursor".into()),
                    other => other.into(),
                })?;
                Ok(page.into_iter().map(MessageView::from).collect())
            })
            .await
    }

    /// Mark the counterpart's messages read. Returns how many changed.
    pub async fn mark_read(
        &self,
        reader: ProfileId,
        conversation_id: ConversationId,
    ) -> Result<u64, ServerError> {
        let now = to_stored_precision(self.clock.now());
        let count = self
            .store
            .run_idempotent(move |db| {
                db.write(|conn| {
                    lifecycle::authorize(conn, conversation_id, reader)?;
                    Ok(messages::mark_read(conn, conversation_id, reader, now)? as u64)
                })
            })
            .await?;

        if count > 0 {
            self.hub.publish(
                conversation_id,
                ServerEvent::MessagesRead {
                    conversation_id,
                    reader_id: reader,
                    read_at: now,
                    count,
                },
                Some(reader),
            );
        }
        Ok(count)
    }

    /// Relay a typing signal to the other participant. Returns `false` when
    /// the signal fell inside the current TTL window and was absorbed.
    pub async fn emit_typing(
        &self,
        profile: ProfileId,
        conversation_id: ConversationId,
    ) -> Result<bool, ServerError> {
        self.ensure_open(profile, conversation_id).await?;

        let now = self.clock.now();
        if !self.hub.should_emit_typing(conversation_id, profile, now) {
            return Ok(false);
        }
        self.hub.publish(
            conversation_id,
            ServerEvent::Typing {
                conversation_id,
                profile_id: profile,
                emitted_at: now,
            },
            Some(profile),
        );
        Ok(true)
    }

    /// Open a live subscription for a participant of a non-terminated
    /// conversation.
    pub async fn subscribe(
        &self,
        profile: ProfileId,
        conversation_id: ConversationId,
    ) -> Result<Subscription, ServerError> {
        let sequencer = self.hub.sequencer(conversation_id);
        let _turn = sequencer.lock().await;
        self.ensure_open(profile, conversation_id).await?;
        Ok(self.hub.subscribe(conversation_id, profile))
    }

    async fn ensure_open(
        &self,
        profile: ProfileId,
        conversation_id: ConversationId,
    ) -> Result<(), ServerError> {
        self.store
            .run(move |db| {
                let (_, matched) = lifecycle::authorize(db.conn(), conversation_id, profile)?;
                if matched.is_terminated() {
                    return Err(ServerError::Forbidden(
                        "this conversation is no longer available".into(),
                    ));
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{matched_pair, profile, test_engine};
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn content_validation() {
        assert_eq!(validate_content("  hi  ").unwrap(), "hi");
        assert!(matches!(validate_content(" \n\t "), Err(ServerError::Validation(_))));
        assert!(validate_content(&"x".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(matches!(
            validate_content(&"x".repeat(MAX_MESSAGE_CHARS + 1)),
            Err(ServerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn send_orders_by_receipt_and_updates_preview() {
        let t = test_engine();
        let (a, b, conv) = matched_pair(&t).await;

        let hi = t.engine.send(a, conv, "hi", None).await.unwrap();
        t.clock.advance(Duration::milliseconds(1));
        let hey = t.engine.send(b, conv, "hey", None).await.unwrap();
        assert!(hi.created_at < hey.created_at);

        for reader in [a, b] {
            let page = t.engine.history(reader, conv, None, None).await.unwrap();
            let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
            assert_eq!(contents, ["hi", "hey"]);
        }

        let listed = t.engine.list_matches(a).await.unwrap();
        assert_eq!(listed[0].last_message_preview.as_deref(), Some("hey"));
    }

    #[tokio::test]
    async fn send_preconditions() {
        let t = test_engine();
        let (a, _, conv) = matched_pair(&t).await;
        let outsider = profile(&t).await;

        assert!(matches!(
            t.engine.send(a, conv, "   ", None).await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            t.engine.send(outsider, conv, "hi", None).await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            t.engine.send(a, ConversationId::new(), "hi", None).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unmatch_forbids_send_for_both_participants() {
        let t = test_engine();
        let (a, b, conv) = matched_pair(&t).await;
        t.engine.send(a, conv, "hi", None).await.unwrap();
        let match_id = t.engine.list_matches(a).await.unwrap()[0].match_id;

        t.engine.unmatch(b, match_id).await.unwrap();

        for sender in [a, b] {
            assert!(matches!(
                t.engine.send(sender, conv, "still there?", None).await,
                Err(ServerError::Forbidden(_))
            ));
        }
        assert!(matches!(
            t.engine.history(a, conv, None, None).await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            t.engine.subscribe(a, conv).await,
            Err(ServerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn untouched_conversation_expires_and_stays_expired() {
        let t = test_engine();
        let (a, b, conv) = matched_pair(&t).await;

        t.clock.advance(Duration::days(7));
        assert!(matches!(
            t.engine.send(a, conv, "sorry I'm late", None).await,
            Err(ServerError::Expired)
        ));
        assert!(matches!(
            t.engine.send(b, conv, "hello?", None).await,
            Err(ServerError::Expired)
        ));
    }

    #[tokio::test]
    async fn first_message_keeps_conversation_alive() {
        let t = test_engine();
        let (a, b, conv) = matched_pair(&t).await;

        t.clock.advance(Duration::days(6));
        t.engine.send(a, conv, "hi", None).await.unwrap();
        t.clock.advance(Duration::days(30));
        t.engine.send(b, conv, "hey", None).await.unwrap();
    }

    #[tokio::test]
    async fn client_token_deduplicates_resends() {
        let t = test_engine();
        let (a, _, conv) = matched_pair(&t).await;

        let first = t
            .engine
            .send(a, conv, "hi", Some("tok-1".into()))
            .await
            .unwrap();
        let again = t
            .engine
            .send(a, conv, "hi", Some("tok-1".into()))
            .await
            .unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(t.engine.history(a, conv, None, None).await.unwrap().len(), 1);

        assert!(matches!(
            t.engine.send(a, conv, "hi", Some(String::new())).await,
            Err(ServerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn history_pages_with_cursor() {
        let t = test_engine();
        let (a, b, conv) = matched_pair(&t).await;
        for i in 0..5 {
            t.engine.send(a, conv, &format!("m{i}"), None).await.unwrap();
        }

        let first = t.engine.history(b, conv, None, Some(2)).await.unwrap();
        assert_eq!(first.len(), 2);
        let rest = t
            .engine
            .history(b, conv, Some(first[1].id), Some(500))
            .await
            .unwrap();
        let contents: Vec<_> = rest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m2", "m3", "m4"]);

        assert!(matches!(
            t.engine.history(b, conv, Some(MessageId::new()), None).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mark_read_notifies_sender_and_is_idempotent() {
        let t = test_engine();
        let (a, b, conv) = matched_pair(&t).await;
        let mut sender_live = t.engine.subscribe(a, conv).await.unwrap();

        t.engine.send(a, conv, "one", None).await.unwrap();
        t.engine.send(a, conv, "two", None).await.unwrap();
        t.engine.send(b, conv, "mine", None).await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                sender_live.recv().await,
                Some(ServerEvent::MessageCreated { .. })
            ));
        }

        assert_eq!(t.engine.mark_read(b, conv).await.unwrap(), 2);
        assert_eq!(t.engine.mark_read(b, conv).await.unwrap(), 0);
        assert!(matches!(
            sender_live.recv().await,
            Some(ServerEvent::MessagesRead { count: 2, .. })
        ));
        assert!(sender_live.try_recv().is_none());

        let page = t.engine.history(a, conv, None, None).await.unwrap();
        assert!(page[..2].iter().all(|m| m.read_at.is_some()));
        assert!(page[2].read_at.is_none());
    }

    #[tokio::test]
    async fn typing_reaches_only_the_other_participant_once_per_window() {
        let t = test_engine();
        let (a, b, conv) = matched_pair(&t).await;
        let mut a_live = t.engine.subscribe(a, conv).await.unwrap();
        let mut b_live = t.engine.subscribe(b, conv).await.unwrap();

        assert!(t.engine.emit_typing(a, conv).await.unwrap());
        assert!(!t.engine.emit_typing(a, conv).await.unwrap());
        t.clock.advance(Duration::milliseconds(3_000));
        assert!(t.engine.emit_typing(a, conv).await.unwrap());

        assert!(matches!(b_live.try_recv(), Some(ServerEvent::Typing { profile_id, .. }) if profile_id == a));
        assert!(matches!(b_live.try_recv(), Some(ServerEvent::Typing { .. })));
        assert!(b_live.try_recv().is_none());
        assert!(a_live.try_recv().is_none());

        let outsider = profile(&t).await;
        assert!(matches!(
            t.engine.emit_typing(outsider, conv).await,
            Err(ServerError::Forbidden(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_publish_in_commit_order() {
        let t = test_engine();
        let (a, b, conv) = matched_pair(&t).await;
        let mut live = t.engine.subscribe(a, conv).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let engine = Arc::clone(&t.engine);
            let sender = if i % 2 == 0 { a } else { b };
            handles.push(tokio::spawn(async move {
                engine.send(sender, conv, &format!("m{i}"), None).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut pushed = Vec::new();
        while let Some(ServerEvent::MessageCreated { message }) = live.try_recv() {
            pushed.push(message.id);
        }
        let stored: Vec<_> = t
            .engine
            .history(b, conv, None, Some(100))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(pushed, stored);
    }
}
