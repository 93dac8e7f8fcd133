use std::{collections::HashMap, sync::Arc};

use homeroom_core::{DisplayName, UserId};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// A user's live connection: the session's id plus the bounded outbound
/// queue used to push events at it.
#[derive(Debug, Clone)]
pub(crate) struct PresenceEntry {
    pub(crate) connection_id: Uuid,
    pub(crate) display_name: DisplayName,
    pub(crate) sender: mpsc::Sender<String>,
}

/// In-memory routing table: user id to live connection. At most one entry
/// per user; nothing survives a process restart, so every user is offline
/// until they reconnect.
#[derive(Clone)]
pub(crate) struct PresenceTable {
    entries: Arc<RwLock<HashMap<String, PresenceEntry>>>,
}

impl PresenceTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a connection, last-connect-wins. Returns the superseded
    /// entry when the user was already registered; the superseded
    /// connection is left open as an orphaned session.
    pub(crate) async fn register(
        &self,
        user_id: &UserId,
        display_name: DisplayName,
        connection_id: Uuid,
        sender: mpsc::Sender<String>,
    ) -> Option<PresenceEntry> {
        self.entries.write().await.insert(
            user_id.as_str().to_owned(),
            PresenceEntry {
                connection_id,
                display_name,
                sender,
            },
        )
    }

    /// Removes the entry only when it still belongs to `connection_id`, so a
    /// stale disconnect from a superseded connection never evicts the newer
    /// registration. Returns whether an entry was removed.
    pub(crate) async fn unregister(&self, user_id: &UserId, connection_id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(user_id.as_str()) {
            Some(entry) if entry.connection_id == connection_id => {
                entries.remove(user_id.as_str());
                true
            }
            _ => false,
        }
    }

    pub(crate) async fn lookup(&self, user_id: &UserId) -> Option<PresenceEntry> {
        self.entries.read().await.get(user_id.as_str()).cloned()
    }

    /// Roster snapshot `(user_id, display_name)`, sorted by user id so the
    /// `presence_sync` payload is deterministic.
    pub(crate) async fn online_users(&self) -> Vec<(String, String)> {
        let entries = self.entries.read().await;
        let mut users: Vec<(String, String)> = entries
            .iter()
            .map(|(user_id, entry)| (user_id.clone(), entry.display_name.to_string()))
            .collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use homeroom_core::{DisplayName, UserId};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::PresenceTable;

    fn user(id: &str) -> UserId {
        UserId::try_from(id.to_owned()).expect("valid user id")
    }

    fn name(value: &str) -> DisplayName {
        DisplayName::try_from(value.to_owned()).expect("valid display name")
    }

    #[tokio::test]
    async fn register_then_lookup_finds_the_connection() {
        let table = PresenceTable::new();
        let (sender, _receiver) = mpsc::channel(1);
        let connection_id = Uuid::new_v4();

        let superseded = table
            .register(&user("student-1"), name("Student One"), connection_id, sender)
            .await;
        assert!(superseded.is_none());

        let entry = table.lookup(&user("student-1")).await.expect("entry should exist");
        assert_eq!(entry.connection_id, connection_id);
        assert_eq!(entry.display_name.as_str(), "Student One");
        assert!(table.lookup(&user("student-2")).await.is_none());
    }

    #[tokio::test]
    async fn second_registration_replaces_the_first() {
        let table = PresenceTable::new();
        let (first_sender, _first_receiver) = mpsc::channel(1);
        let (second_sender, _second_receiver) = mpsc::channel(1);
        let first_id = Uuid::new_v4();
        let second_id = Uuid::new_v4();

        table
            .register(&user("parent-9"), name("Parent Nine"), first_id, first_sender)
            .await;
        let superseded = table
            .register(&user("parent-9"), name("Parent Nine"), second_id, second_sender)
            .await
            .expect("first registration should be superseded");
        assert_eq!(superseded.connection_id, first_id);

        let entry = table.lookup(&user("parent-9")).await.expect("entry should exist");
        assert_eq!(entry.connection_id, second_id);
    }

    #[tokio::test]
    async fn stale_unregister_does_not_evict_newer_connection() {
        let table = PresenceTable::new();
        let (first_sender, _first_receiver) = mpsc::channel(1);
        let (second_sender, _second_receiver) = mpsc::channel(1);
        let first_id = Uuid::new_v4();
        let second_id = Uuid::new_v4();

        table
            .register(&user("student-3"), name("Student Three"), first_id, first_sender)
            .await;
        table
            .register(&user("student-3"), name("Student Three"), second_id, second_sender)
            .await;

        assert!(!table.unregister(&user("student-3"), first_id).await);
        assert!(table.lookup(&user("student-3")).await.is_some());

        assert!(table.unregister(&user("student-3"), second_id).await);
        assert!(table.lookup(&user("student-3")).await.is_none());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let table = PresenceTable::new();
        let (sender, _receiver) = mpsc::channel(1);
        let connection_id = Uuid::new_v4();

        table
            .register(&user("admin-1"), name("Admin One"), connection_id, sender)
            .await;
        assert!(table.unregister(&user("admin-1"), connection_id).await);
        assert!(!table.unregister(&user("admin-1"), connection_id).await);
    }

    #[tokio::test]
    async fn online_users_snapshot_is_sorted() {
        let table = PresenceTable::new();
        let (first_sender, _first_receiver) = mpsc::channel(1);
        let (second_sender, _second_receiver) = mpsc::channel(1);

        table
            .register(&user("zeta"), name("Zeta"), Uuid::new_v4(), first_sender)
            .await;
        table
            .register(&user("alpha"), name("Alpha"), Uuid::new_v4(), second_sender)
            .await;

        let users = table.online_users().await;
        assert_eq!(
            users,
            vec![
                (String::from("alpha"), String::from("Alpha")),
                (String::from("zeta"), String::from("Zeta")),
            ]
        );
    }
}
