//! Presence directory for discovery: session id -> name and last position.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::bearing::LocationSample;

/// Directory key for one page session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl PresenceRecord {
    pub fn location(&self) -> LocationSample {
        LocationSample::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenceChange {
    Added(SessionId, PresenceRecord),
    Updated(SessionId, PresenceRecord),
    Removed(SessionId),
}

pub type ChangeCallback = Box<dyn FnMut(&PresenceChange) + Send>;

/// Push-based presence store.
pub trait PresenceDirectory {
    fn put(&mut self, id: SessionId, record: PresenceRecord);
    /// Change the name of an existing record. No-op if `id` is unknown.
    fn update_name(&mut self, id: SessionId, name: &str);
    fn on_change(&mut self, callback: ChangeCallback);
    /// Drop `id` automatically when its session disconnects.
    fn remove_on_disconnect(&mut self, id: SessionId);
}

/// In-process directory. `disconnect` stands in for the backend noticing a lost session.
#[derive(Default)]
pub struct MemoryPresence {
    records: HashMap<SessionId, PresenceRecord>,
    ephemeral: HashSet<SessionId>,
    listeners: Vec<ChangeCallback>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<&PresenceRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Everyone except `self_id`.
    pub fn others(&self, self_id: Option<SessionId>) -> Vec<(SessionId, &PresenceRecord)> {
        self.records
            .iter()
            .filter(|(id, _)| Some(**id) != self_id)
            .map(|(id, r)| (*id, r))
            .collect()
    }

    /// Explicit removal.
    pub fn remove(&mut self, id: SessionId) {
        self.ephemeral.remove(&id);
        if self.records.remove(&id).is_some() {
            self.notify(&PresenceChange::Removed(id));
        }
    }

    /// Session `id` went away. Its record is removed only if it asked for that.
    pub fn disconnect(&mut self, id: SessionId) {
        if self.ephemeral.contains(&id) {
            tracing::debug!(%id, "removing presence on disconnect");
            self.remove(id);
        }
    }

    fn notify(&mut self, change: &PresenceChange) {
        for cb in &mut self.listeners {
            cb(change);
        }
    }
}

impl PresenceDirectory for MemoryPresence {
    fn put(&mut self, id: SessionId, record: PresenceRecord) {
        let change = match self.records.insert(id, record.clone()) {
            Some(_) => PresenceChange::Updated(id, record),
            None => PresenceChange::Added(id, record),
        };
        self.notify(&change);
    }

    fn update_name(&mut self, id: SessionId, name: &str) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        record.name = name.to_owned();
        let change = PresenceChange::Updated(id, record.clone());
        self.notify(&change);
    }

    fn on_change(&mut self, callback: ChangeCallback) {
        self.listeners.push(callback);
    }

    fn remove_on_disconnect(&mut self, id: SessionId) {
        self.ephemeral.insert(id);
    }
}

/// This side's presence: id allocated on first publish, removal registered once.
#[derive(Debug)]
pub struct PresenceClient {
    id: Option<SessionId>,
    name: String,
}

impl PresenceClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn with_random_name() -> Self {
        Self::new(random_name())
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish the current position.
    pub fn publish<D: PresenceDirectory>(
        &mut self,
        directory: &mut D,
        sample: LocationSample,
    ) -> SessionId {
        let id = match self.id {
            Some(id) => id,
            None => {
                let id = SessionId::new();
                directory.remove_on_disconnect(id);
                self.id = Some(id);
                id
            }
        };
        directory.put(
            id,
            PresenceRecord {
                name: self.name.clone(),
                lat: sample.lat,
                lon: sample.lon,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        );
        id
    }

    /// Rename; a blank name picks a random one. Pushed only once published.
    pub fn rename<D: PresenceDirectory>(&mut self, directory: &mut D, name: &str) {
        let name = name.trim();
        self.name = if name.is_empty() {
            random_name()
        } else {
            name.to_owned()
        };
        if let Some(id) = self.id {
            directory.update_name(id, &self.name);
        }
    }
}

const ADJECTIVES: [&str; 5] = ["Quiet", "Swift", "Brave", "Sunny", "Cool"];
const ANIMALS: [&str; 5] = ["Lion", "Falcon", "Panther", "Wolf", "Eagle"];

/// "Adjective Animal" display name.
pub fn random_name() -> String {
    let mut rng = rand::thread_rng();
    let adj = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Quiet");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("Wolf");
    format!("{adj} {animal}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn record(name: &str) -> PresenceRecord {
        PresenceRecord {
            name: name.into(),
            lat: 1.0,
            lon: 2.0,
            timestamp: 0,
        }
    }

    fn recorded(dir: &mut MemoryPresence) -> Arc<Mutex<Vec<PresenceChange>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        dir.on_change(Box::new(move |c: &PresenceChange| sink.lock().unwrap().push(c.clone())));
        log
    }

    #[test]
    fn put_emits_added_then_updated() {
        let mut dir = MemoryPresence::new();
        let log = recorded(&mut dir);
        let id = SessionId::new();
        dir.put(id, record("a"));
        dir.put(id, record("b"));
        let log = log.lock().unwrap();
        assert!(matches!(&log[0], PresenceChange::Added(i, r) if *i == id && r.name == "a"));
        assert!(matches!(&log[1], PresenceChange::Updated(i, r) if *i == id && r.name == "b"));
    }

    #[test]
    fn disconnect_only_removes_registered() {
        let mut dir = MemoryPresence::new();
        let log = recorded(&mut dir);
        let kept = SessionId::new();
        let gone = SessionId::new();
        dir.put(kept, record("kept"));
        dir.put(gone, record("gone"));
        dir.remove_on_disconnect(gone);

        dir.disconnect(kept);
        dir.disconnect(gone);
        assert!(dir.get(&kept).is_some());
        assert!(dir.get(&gone).is_none());
        assert_eq!(
            log.lock().unwrap().last(),
            Some(&PresenceChange::Removed(gone))
        );
    }

    #[test]
    fn others_excludes_self() {
        let mut dir = MemoryPresence::new();
        let me = SessionId::new();
        let peer = SessionId::new();
        dir.put(me, record("me"));
        dir.put(peer, record("peer"));
        let others = dir.others(Some(me));
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].0, peer);
        assert_eq!(dir.others(None).len(), 2);
    }

    #[test]
    fn client_allocates_id_once() {
        let mut dir = MemoryPresence::new();
        let mut client = PresenceClient::new("Tester");
        assert!(client.id().is_none());
        let first = client.publish(&mut dir, LocationSample::new(10.0, 20.0));
        let second = client.publish(&mut dir, LocationSample::new(11.0, 21.0));
        assert_eq!(first, second);
        assert_eq!(dir.len(), 1);
        let rec = dir.get(&first).unwrap();
        assert_eq!(rec.location(), LocationSample::new(11.0, 21.0));
        assert_eq!(rec.name, "Tester");

        dir.disconnect(first);
        assert!(dir.is_empty());
    }

    #[test]
    fn rename_pushes_after_publish() {
        let mut dir = MemoryPresence::new();
        let mut client = PresenceClient::new("Old");
        client.rename(&mut dir, "Before");
        assert!(dir.is_empty());

        let id = client.publish(&mut dir, LocationSample::new(0.0, 0.0));
        client.rename(&mut dir, "  New Name ");
        assert_eq!(dir.get(&id).unwrap().name, "New Name");

        client.rename(&mut dir, "   ");
        assert!(!client.name().is_empty());
        assert_eq!(dir.get(&id).unwrap().name, client.name());
    }

    /// Directory that only records calls.
    #[derive(Default)]
    struct Journal {
        calls: Vec<String>,
    }

    impl PresenceDirectory for Journal {
        fn put(&mut self, id: SessionId, record: PresenceRecord) {
            self.calls.push(format!("put {id} {}", record.name));
        }
        fn update_name(&mut self, id: SessionId, name: &str) {
            self.calls.push(format!("name {id} {name}"));
        }
        fn on_change(&mut self, _callback: ChangeCallback) {}
        fn remove_on_disconnect(&mut self, id: SessionId) {
            self.calls.push(format!("ephemeral {id}"));
        }
    }

    #[test]
    fn rename_works_with_any_directory() {
        let mut dir = Journal::default();
        let mut client = PresenceClient::new("Old");
        client.rename(&mut dir, "Quiet");
        assert!(dir.calls.is_empty());

        let id = client.publish(&mut dir, LocationSample::new(0.0, 0.0));
        client.rename(&mut dir, "Renamed");
        assert_eq!(
            dir.calls,
            vec![
                format!("ephemeral {id}"),
                format!("put {id} Quiet"),
                format!("name {id} Renamed"),
            ]
        );
    }

    #[test]
    fn random_names_have_two_words() {
        for _ in 0..20 {
            let name = random_name();
            let parts: Vec<&str> = name.split(' ').collect();
            assert_eq!(parts.len(), 2);
            assert!(ADJECTIVES.contains(&parts[0]));
            assert!(ANIMALS.contains(&parts[1]));
        }
    }
}
