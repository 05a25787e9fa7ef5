//! Per-repository fan-out for the session broker.
//!
//! Every member of a repository holds a receiver on one tokio broadcast
//! channel. Frames carry the sending connection so receivers can skip
//! their own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use covscode_core::Participant;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// One broker frame on its way to the other members.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomFrame {
    pub from: Uuid,
    pub text: String,
}

/// Room statistics.
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    pub frames_sent: u64,
    pub active_members: usize,
}

/// One shared repository: members in join order plus the archive new
/// members receive.
pub struct RepoRoom {
    repo_id: String,
    sender: broadcast::Sender<Arc<RoomFrame>>,
    members: RwLock<Vec<(Uuid, Participant)>>,
    archive: Vec<u8>,
    capacity: usize,
    frames_sent: AtomicU64,
}

impl RepoRoom {
    pub fn new(repo_id: impl Into<String>, archive: Vec<u8>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            repo_id: repo_id.into(),
            sender,
            members: RwLock::new(Vec::new()),
            archive,
            capacity,
            frames_sent: AtomicU64::new(0),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn archive(&self) -> &[u8] {
        &self.archive
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a member and hand back its receiver.
    ///
    /// A connection already present keeps its place.
    pub async fn add_member(&self, conn: Uuid, user: Participant) -> broadcast::Receiver<Arc<RoomFrame>> {
        let mut members = self.members.write().await;
        if !members.iter().any(|(id, _)| *id == conn) {
            members.push((conn, user));
        }
        self.sender.subscribe()
    }

    pub async fn remove_member(&self, conn: &Uuid) -> Option<Participant> {
        let mut members = self.members.write().await;
        let index = members.iter().position(|(id, _)| id == conn)?;
        Some(members.remove(index).1)
    }

    /// Queue `text` for every receiver. Returns how many there were.
    pub fn broadcast(&self, from: Uuid, text: String) -> usize {
        let count = self.sender.send(Arc::new(RoomFrame { from, text })).unwrap_or(0);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    /// Members in join order.
    pub async fn members(&self) -> Vec<Participant> {
        self.members.read().await.iter().map(|(_, p)| p.clone()).collect()
    }

    pub async fn has_member(&self, conn: &Uuid) -> bool {
        self.members.read().await.iter().any(|(id, _)| id == conn)
    }

    pub async fn stats(&self) -> RoomStats {
        RoomStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            active_members: self.members.read().await.len(),
        }
    }
}

/// Repository id → room.
pub struct RepoRooms {
    rooms: RwLock<HashMap<String, Arc<RepoRoom>>>,
    default_capacity: usize,
}

impl RepoRooms {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Open a room for `repo_id`. `None` when one already exists.
    pub async fn create(&self, repo_id: &str, archive: Vec<u8>) -> Option<Arc<RepoRoom>> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(repo_id) {
            return None;
        }
        let room = Arc::new(RepoRoom::new(repo_id, archive, self.default_capacity));
        rooms.insert(repo_id.to_string(), room.clone());
        Some(room)
    }

    pub async fn get(&self, repo_id: &str) -> Option<Arc<RepoRoom>> {
        self.rooms.read().await.get(repo_id).cloned()
    }

    /// Drop the room once its last member is gone.
    pub async fn remove_if_empty(&self, repo_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(repo_id) {
            if room.member_count().await == 0 {
                rooms.remove(repo_id);
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_repos(&self) -> Vec<String> {
        let mut repos: Vec<String> = self.rooms.read().await.keys().cloned().collect();
        repos.sort_unstable();
        repos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, site: &str) -> Participant {
        Participant::with_site(name, site, "r1")
    }

    #[tokio::test]
    async fn test_members_keep_join_order() {
        let room = RepoRoom::new("r1", Vec::new(), 16);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let _rx1 = room.add_member(a, member("alice", "s1")).await;
        let _rx2 = room.add_member(b, member("bob", "s2")).await;
        let _rx3 = room.add_member(c, member("carol", "s3")).await;
        let _again = room.add_member(a, member("alice", "s1")).await;

        let names: Vec<String> = room.members().await.into_iter().map(|p| p.user_id).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);

        assert_eq!(room.remove_member(&b).await.map(|p| p.user_id), Some("bob".to_string()));
        assert!(room.remove_member(&b).await.is_none());
        assert!(!room.has_member(&b).await);
        assert_eq!(room.member_count().await, 2);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_receiver() {
        let room = RepoRoom::new("r1", Vec::new(), 16);
        let sender = Uuid::new_v4();
        let mut rx1 = room.add_member(sender, member("alice", "s1")).await;
        let mut rx2 = room.add_member(Uuid::new_v4(), member("bob", "s2")).await;

        assert_eq!(room.broadcast(sender, "hello".into()), 2);

        // Skipping own frames is the receiver's job
        let frame = rx1.recv().await.unwrap();
        assert_eq!(frame.from, sender);
        assert_eq!(rx2.recv().await.unwrap().text, "hello");

        let stats = room.stats().await;
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.active_members, 2);
    }

    #[tokio::test]
    async fn test_create_refuses_existing_repo() {
        let rooms = RepoRooms::new(16);
        let room = rooms.create("r1", vec![1, 2, 3]).await.unwrap();
        assert_eq!(room.archive(), &[1, 2, 3]);
        assert!(rooms.create("r1", Vec::new()).await.is_none());

        let again = rooms.get("r1").await.unwrap();
        assert!(Arc::ptr_eq(&room, &again));
        assert!(rooms.get("r2").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_if_empty() {
        let rooms = RepoRooms::new(16);
        let room = rooms.create("r1", Vec::new()).await.unwrap();
        let conn = Uuid::new_v4();
        let _rx = room.add_member(conn, member("alice", "s1")).await;

        assert!(!rooms.remove_if_empty("r1").await);
        room.remove_member(&conn).await;
        assert!(rooms.remove_if_empty("r1").await);
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_active_repos_sorted() {
        let rooms = RepoRooms::new(8);
        rooms.create("zeta", Vec::new()).await;
        rooms.create("alpha", Vec::new()).await;
        assert_eq!(rooms.active_repos().await, vec!["alpha", "zeta"]);
        assert_eq!(rooms.get("alpha").await.unwrap().capacity(), 8);
    }
}
