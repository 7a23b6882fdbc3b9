use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A transient, dismissible message for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    /// Notifications with the same key replace each other.
    pub key: Option<String>,
    pub level: NotificationLevel,
    pub message: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.level, self.message)
    }
}

/// Queue of notifications, oldest first.
#[derive(Debug, Default)]
pub struct Notifications {
    next_id: u64,
    entries: Vec<Notification>,
}

impl Notifications {
    pub fn new() -> Self {
        Notifications::default()
    }

    pub fn push(&mut self, level: NotificationLevel, message: impl Into<String>) -> u64 {
        self.insert(None, level, message.into())
    }

    /// Push a notification, replacing any existing one with the same key.
    pub fn push_keyed(
        &mut self,
        key: impl Into<String>,
        level: NotificationLevel,
        message: impl Into<String>,
    ) -> u64 {
        self.insert(Some(key.into()), level, message.into())
    }

    fn insert(&mut self, key: Option<String>, level: NotificationLevel, message: String) -> u64 {
        self.next_id += 1;
        let notification = Notification {
            id: self.next_id,
            key,
            level,
            message,
        };
        let existing = notification
            .key
            .as_ref()
            .and_then(|key| self.entries.iter().position(|n| n.key.as_ref() == Some(key)));
        match existing {
            Some(index) => self.entries[index] = notification,
            None => self.entries.push(notification),
        }
        self.next_id
    }

    /// Remove a notification. Returns whether it existed.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|n| n.id != id);
        self.entries.len() != before
    }

    /// Remove the notification stored under `key`, if any.
    pub fn dismiss_key(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|n| n.key.as_deref() != Some(key));
        self.entries.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
