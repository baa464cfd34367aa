//! Follow-up message queue (`.messages.json`)

use crate::error::{Error, Result};
use crate::store::json::{self, Loaded};
use crate::types::{Message, MessageId, Project};
use chrono::Utc;
use std::path::PathBuf;

/// Typed access to a project's message queue.
///
/// Unlike the activity feed, queue failures are surfaced: the message loop
/// counts them towards its consecutive-error threshold.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    path: PathBuf,
}

impl MessageQueue {
    pub fn new(project: &Project) -> Self {
        Self {
            path: project.messages_path(),
        }
    }

    /// Load the whole queue. A missing file is an empty queue.
    pub fn load(&self) -> Result<Vec<Message>> {
        match json::load(&self.path) {
            Loaded::Parsed(messages) => Ok(messages),
            Loaded::Missing => Ok(Vec::new()),
            Loaded::Corrupt(message) => Err(Error::MalformedState {
                path: self.path.clone(),
                message,
            }),
        }
    }

    /// Messages still awaiting a response, in queue order
    pub fn pending(&self) -> Result<Vec<Message>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|m| !m.processed && m.id.is_some())
            .collect())
    }

    /// Mark a message answered and persist the queue.
    ///
    /// The queue is re-read first so messages appended while the response
    /// was being produced are kept. Returns `false` when no message with
    /// `id` is present any more.
    pub fn mark_processed(&self, id: &MessageId, response: &str) -> Result<bool> {
        let mut messages = self.load()?;

        let Some(message) = messages.iter_mut().find(|m| m.id.as_ref() == Some(id)) else {
            tracing::warn!(
                message_id = %id,
                "Message vanished before it could be marked processed"
            );
            return Ok(false);
        };

        message.processed = true;
        message.response = Some(response.to_string());
        message.processed_at = Some(Utc::now().to_rfc3339());

        json::write_atomic(&self.path, &messages)?;
        Ok(true)
    }

    /// Append a new user message and persist the queue.
    pub fn append(&self, message: Message) -> Result<()> {
        let mut messages = self.load()?;
        messages.push(message);
        json::write_atomic(&self.path, &messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn queue(dir: &TempDir) -> MessageQueue {
        MessageQueue::new(&Project::new(dir.path()))
    }

    #[test]
    fn test_missing_queue_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(queue(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_queue_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".messages.json"), "[{").unwrap();

        let err = queue(&dir).load().unwrap_err();
        assert!(matches!(err, Error::MalformedState { .. }));
    }

    #[test]
    fn test_append_and_mark_processed() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir);

        queue.append(Message::new("m1", "first")).unwrap();
        queue.append(Message::new(2, "second")).unwrap();
        assert_eq!(queue.pending().unwrap().len(), 2);

        assert!(queue.mark_processed(&MessageId::from("m1"), "answer").unwrap());

        let messages = queue.load().unwrap();
        assert!(messages[0].processed);
        assert_eq!(messages[0].response.as_deref(), Some("answer"));
        assert!(messages[0].processed_at.is_some());
        assert!(!messages[1].processed);
        assert_eq!(queue.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_mark_processed_unknown_id() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir);
        queue.append(Message::new("m1", "first")).unwrap();

        assert!(!queue.mark_processed(&MessageId::from("nope"), "x").unwrap());
    }

    #[test]
    fn test_mark_processed_keeps_concurrently_appended_messages() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir);
        queue.append(Message::new("m1", "first")).unwrap();

        // Another producer appends while the first message is in flight
        fs::write(
            dir.path().join(".messages.json"),
            r#"[{"id":"m1","content":"first"},{"id":"m2","content":"second","source":"portal"}]"#,
        )
        .unwrap();

        queue.mark_processed(&MessageId::from("m1"), "done").unwrap();

        let messages = queue.load().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].extra["source"], "portal");
    }

    #[test]
    fn test_messages_without_id_are_not_pending() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".messages.json"),
            r#"[{"content":"orphan"},{"id":7,"content":"ok"}]"#,
        )
        .unwrap();

        let pending = queue(&dir).pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, Some(MessageId::Number(7)));
    }
}
