//! Messages sent from running jobs to the conductor.
//!
//! A [`Message`] is a small key/value carrier guarded by a mutex. The producer fills
//! it in and sends it over the coordination channel; once sent it belongs to the
//! receiver. Consumers recognise exactly the keys in [`keys`].

use std::{
    collections::HashMap,
    error::Error as StdError,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

/// Failure carried by an `error` message
pub type JobFailure = Arc<dyn StdError + Send + Sync + 'static>;

/// Keys understood by the conductor
pub mod keys {
    /// Name of the job that produced the message
    pub const OWNER: &str = "owner";
    /// Human readable progress text
    pub const STATUS: &str = "status";
    /// Captured output text
    pub const OUTPUT: &str = "output";
    /// Failure that aborts coordination
    pub const ERROR: &str = "error";
    /// Terminal marker, the job has finished
    pub const DONE: &str = "done";
}

/// A value stored in a [`Message`]
#[derive(Clone)]
pub enum MessageValue {
    Text(String),
    Flag(bool),
    Failure(JobFailure),
}

impl fmt::Debug for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
            MessageValue::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            MessageValue::Failure(error) => f.debug_tuple("Failure").field(&error.to_string()).finish(),
        }
    }
}

impl From<String> for MessageValue {
    fn from(value: String) -> Self {
        MessageValue::Text(value)
    }
}

impl From<&str> for MessageValue {
    fn from(value: &str) -> Self {
        MessageValue::Text(value.to_string())
    }
}

impl From<bool> for MessageValue {
    fn from(value: bool) -> Self {
        MessageValue::Flag(value)
    }
}

/// Key/value unit of communication between a job and the conductor
#[derive(Default)]
pub struct Message {
    entries: Mutex<HashMap<String, MessageValue>>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Status message for `owner`
    pub fn new_status(owner: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_owner(owner, keys::STATUS, MessageValue::Text(text.into()))
    }

    /// Output message for `owner`
    pub fn new_output(owner: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_owner(owner, keys::OUTPUT, MessageValue::Text(text.into()))
    }

    /// Error message for `owner`, receiving it aborts the whole run
    pub fn new_error<E>(owner: impl Into<String>, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        let failure: JobFailure = Arc::from(error.into());
        Self::with_owner(owner, keys::ERROR, MessageValue::Failure(failure))
    }

    /// Terminal message for `owner`
    pub fn new_done(owner: impl Into<String>) -> Self {
        Self::with_owner(owner, keys::DONE, MessageValue::Flag(true))
    }

    fn with_owner(owner: impl Into<String>, key: &str, value: MessageValue) -> Self {
        let message = Self::new();
        message.add(keys::OWNER, owner.into());
        message.add(key, value);
        message
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, MessageValue>> {
        // entries stay consistent even if a holder panicked, every write is a single insert/remove
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or overwrite `key`
    pub fn add(&self, key: impl Into<String>, value: impl Into<MessageValue>) {
        self.entries().insert(key.into(), value.into());
    }

    /// Value stored under `key`, `None` if it was never set
    pub fn get(&self, key: &str) -> Option<MessageValue> {
        self.entries().get(key).cloned()
    }

    /// Overwrite `key`, same as [`Message::add`]
    pub fn update(&self, key: impl Into<String>, value: impl Into<MessageValue>) {
        self.add(key, value)
    }

    /// Remove `key`, no-op if absent
    pub fn delete(&self, key: &str) {
        self.entries().remove(key);
    }

    pub fn owner(&self) -> Option<String> {
        self.text(keys::OWNER)
    }

    pub fn status(&self) -> Option<String> {
        self.text(keys::STATUS)
    }

    pub fn output(&self) -> Option<String> {
        self.text(keys::OUTPUT)
    }

    pub fn error(&self) -> Option<JobFailure> {
        match self.get(keys::ERROR) {
            Some(MessageValue::Failure(error)) => Some(error),
            _ => None,
        }
    }

    /// Whether the `done` flag is set
    pub fn is_done(&self) -> bool {
        matches!(self.get(keys::DONE), Some(MessageValue::Flag(true)))
    }

    fn text(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(MessageValue::Text(text)) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("entries", &*self.entries())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_get_update_delete() {
        let message = Message::new();
        assert!(message.get("owner").is_none());

        message.add("owner", "linux");
        assert_eq!(message.owner().as_deref(), Some("linux"));

        message.update("owner", "darwin");
        assert_eq!(message.owner().as_deref(), Some("darwin"));

        message.delete("owner");
        assert!(message.get("owner").is_none());

        // deleting a missing key is fine
        message.delete("owner");
    }

    #[test]
    fn constructors_populate_owner() {
        let status = Message::new_status("linux", "building");
        assert_eq!(status.owner().as_deref(), Some("linux"));
        assert_eq!(status.status().as_deref(), Some("building"));
        assert!(!status.is_done());
        assert!(status.error().is_none());

        let output = Message::new_output("linux", "v1.2.0");
        assert_eq!(output.output().as_deref(), Some("v1.2.0"));

        let done = Message::new_done("linux");
        assert!(done.is_done());

        let error = Message::new_error("linux", "boom");
        assert_eq!(error.error().unwrap().to_string(), "boom");
        assert!(!error.is_done());
    }

    #[test]
    fn done_requires_true_flag() {
        let message = Message::new_status("linux", "almost");
        message.add(keys::DONE, false);
        assert!(!message.is_done());

        message.update(keys::DONE, "yes");
        assert!(!message.is_done());
    }

    #[test]
    fn concurrent_writers() {
        let message = Arc::new(Message::new());

        let handles = (0..8)
            .map(|i| {
                let message = message.clone();
                std::thread::spawn(move || message.add(format!("key{i}"), i % 2 == 0))
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8 {
            assert!(message.get(&format!("key{i}")).is_some());
        }
    }
}
