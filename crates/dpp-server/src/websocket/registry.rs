//! Set of connected clients.
//!
//! The lock is held only to insert, remove, or copy out the member list.
//! Iteration always runs over a copied snapshot, so callbacks may remove
//! members (or new clients may register) without affecting the walk.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::connection::ClientConnection;

struct Member {
    seq: u64,
    conn: Arc<ClientConnection>,
}

#[derive(Default)]
struct Members {
    by_id: HashMap<Uuid, Member>,
    next_seq: u64,
}

/// Concurrent registry of connected clients.
#[derive(Default)]
pub struct ConnectionRegistry {
    members: RwLock<Members>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. It is visible to the next snapshot.
    pub fn register(&self, conn: Arc<ClientConnection>) {
        let mut members = self.members.write();
        let seq = members.next_seq;
        members.next_seq += 1;
        let _ = members.by_id.insert(conn.id, Member { seq, conn });
    }

    /// Remove a connection. Returns whether it was present.
    pub fn remove(&self, id: &Uuid) -> bool {
        self.members.write().by_id.remove(id).is_some()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.members.read().by_id.contains_key(id)
    }

    /// Copy of the current members, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        let members = self.members.read();
        let mut list: Vec<_> = members
            .by_id
            .values()
            .map(|m| (m.seq, Arc::clone(&m.conn)))
            .collect();
        drop(members);
        list.sort_unstable_by_key(|(seq, _)| *seq);
        list.into_iter().map(|(_, conn)| conn).collect()
    }

    /// Call `f` once for each member of a snapshot taken now.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<ClientConnection>)) {
        for conn in &self.snapshot() {
            f(conn);
        }
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.members.read().by_id.len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.members.read().by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn make_connection() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientConnection::new(tx)), rx)
    }

    #[test]
    fn register_and_len() {
        let reg = ConnectionRegistry::new();
        assert!(reg.is_empty());
        let (c1, _r1) = make_connection();
        let (c2, _r2) = make_connection();
        reg.register(c1);
        assert_eq!(reg.len(), 1);
        reg.register(c2);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let reg = ConnectionRegistry::new();
        let (c1, _r1) = make_connection();
        let id = c1.id;
        reg.register(c1);
        assert!(reg.remove(&id));
        assert!(!reg.remove(&id));
        assert!(!reg.contains(&id));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let reg = ConnectionRegistry::new();
        assert!(!reg.remove(&Uuid::now_v7()));
    }

    #[test]
    fn snapshot_in_registration_order() {
        let reg = ConnectionRegistry::new();
        let conns: Vec<_> = (0..5).map(|_| make_connection()).collect();
        for (c, _) in &conns {
            reg.register(Arc::clone(c));
        }
        let ids: Vec<_> = reg.snapshot().iter().map(|c| c.id).collect();
        let expected: Vec<_> = conns.iter().map(|(c, _)| c.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn removal_during_for_each_visits_every_snapshot_member_once() {
        let reg = ConnectionRegistry::new();
        let conns: Vec<_> = (0..4).map(|_| make_connection()).collect();
        for (c, _) in &conns {
            reg.register(Arc::clone(c));
        }

        let mut visited = Vec::new();
        reg.for_each(|conn| {
            visited.push(conn.id);
            // remove self and the next member mid-walk
            let _ = reg.remove(&conn.id);
            if let Some((next, _)) = conns.iter().find(|(c, _)| !visited.contains(&c.id)) {
                let _ = reg.remove(&next.id);
            }
        });

        let expected: Vec<_> = conns.iter().map(|(c, _)| c.id).collect();
        assert_eq!(visited, expected);
        assert!(reg.is_empty());
    }

    #[test]
    fn registration_during_for_each_not_visited() {
        let reg = ConnectionRegistry::new();
        let (c1, _r1) = make_connection();
        reg.register(c1);

        let mut late = Vec::new();
        let mut count = 0;
        reg.for_each(|_| {
            count += 1;
            let (c, r) = make_connection();
            reg.register(c);
            late.push(r);
        });

        assert_eq!(count, 1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn concurrent_register_and_remove() {
        let reg = Arc::new(ConnectionRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let mut keep = Vec::new();
                    for i in 0..50 {
                        let (tx, rx) = mpsc::channel(1);
                        let conn = Arc::new(ClientConnection::new(tx));
                        let id = conn.id;
                        reg.register(conn);
                        if i % 2 == 0 {
                            let _ = reg.remove(&id);
                        }
                        keep.push(rx);
                        let _ = reg.snapshot();
                    }
                    keep
                })
            })
            .collect();
        for h in handles {
            let _ = h.join().unwrap();
        }
        assert_eq!(reg.len(), 100);
    }
}
