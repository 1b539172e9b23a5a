//! Message store
//!
//! Insertion-ordered, thread-safe collection of decoded messages. One mutex
//! guards each store, so separate stores never contend with each other.
//!
//! Persisted as a sequence of envelope records (see `envelope::wire`).
//! Loading replays every record through the envelope codec and is
//! all-or-nothing: any bad record fails the whole load.

use crate::envelope::{decline_prompt, wire, EnvelopeError, Keyring, Message};
use crate::identity::{ContactDirectory, SelfIdentities};
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Message store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record {index} could not be loaded: {source}")]
    Corrupt {
        index: usize,
        #[source]
        source: EnvelopeError,
    },
}

#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Mutex<Vec<Arc<Message>>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Message>>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message
    pub fn add(&self, message: impl Into<Arc<Message>>) {
        self.lock().push(message.into());
    }

    /// Remove the most recently added entry with the same id as `message`.
    /// Returns whether anything was removed.
    pub fn remove(&self, message: &Message) -> bool {
        self.remove_by_id(message.id()).is_some()
    }

    /// Remove the most recently added entry with `id`
    pub fn remove_by_id(&self, id: u64) -> Option<Arc<Message>> {
        let mut messages = self.lock();
        let index = messages.iter().rposition(|m| m.id() == id)?;
        Some(messages.remove(index))
    }

    /// First entry with `id`, scanning from the oldest
    pub fn by_id(&self, id: u64) -> Option<Arc<Message>> {
        self.lock().iter().find(|m| m.id() == id).cloned()
    }

    pub fn by_index(&self, index: usize) -> Option<Arc<Message>> {
        self.lock().get(index).cloned()
    }

    /// Apply `f` to every message in insertion order.
    ///
    /// The store is locked for the whole traversal: `f` must not call back
    /// into this store or it will deadlock.
    pub fn for_each(&self, mut f: impl FnMut(&Message)) {
        for message in self.lock().iter() {
            f(message);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> Vec<Arc<Message>> {
        self.lock().clone()
    }

    /// Write every message to `path`, replacing its contents.
    ///
    /// The store stays locked until the file is in place, so concurrent
    /// saves of one store land in call order and the last one wins.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let messages = self.lock();
        let mut data = Vec::new();
        for message in messages.iter() {
            message.write_to(&mut data)?;
        }
        replace_file(path, &data)?;

        debug!(path = %path.display(), count = messages.len(), "Saved message store");
        Ok(())
    }

    /// Read a store written by [`MessageStore::save`], decoding every record
    /// with `selves` and `contacts`. Locked keys are never prompted for.
    pub fn load(
        path: impl AsRef<Path>,
        selves: &SelfIdentities,
        contacts: &ContactDirectory,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut reader = BufReader::new(fs::File::open(path)?);
        let keyring = Keyring::new(selves, contacts);

        let mut messages = Vec::new();
        loop {
            let index = messages.len();
            let corrupt = |source| StoreError::Corrupt { index, source };
            let Some(record) = wire::read_record(&mut reader).map_err(corrupt)? else {
                break;
            };
            let message = Message::open(record.encrypted, record.origin, record.id, &keyring, &decline_prompt)
                .map_err(corrupt)?;
            messages.push(Arc::new(message));
        }

        debug!(path = %path.display(), count = messages.len(), "Loaded message store");
        Ok(MessageStore { messages: Mutex::new(messages) })
    }
}

/// Replace `path` with `data` through `<file name>.tmp` in the same directory
pub(crate) fn replace_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut temp_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{} is not a file path", path.display())))?
        .to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}

impl FromIterator<Message> for MessageStore {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        MessageStore { messages: Mutex::new(iter.into_iter().map(Arc::new).collect()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::encode;
    use crate::identity::Identity;
    use crate::network::PeerAddress;
    use std::thread;
    use tempfile::tempdir;

    struct Fixture {
        selves: SelfIdentities,
        contacts: ContactDirectory,
        bob: Identity,
    }

    impl Fixture {
        fn new() -> Self {
            let alice = Identity::generate("Alice", "", "alice@example.com").unwrap();
            let bob = Identity::generate("Bob", "", "bob@example.com").unwrap();
            Fixture {
                selves: SelfIdentities::new(alice).unwrap(),
                contacts: ContactDirectory::from_identities(vec![bob.clone()]),
                bob,
            }
        }

        fn message(&self, id: u64, text: &str) -> Message {
            let alice = self.selves.default_identity();
            let armored = encode(text.as_bytes(), &[Some(alice)], Some(&self.bob)).unwrap();
            Message::open(
                armored,
                PeerAddress::new("bob-peer"),
                id,
                &Keyring::new(&self.selves, &self.contacts),
                &decline_prompt,
            )
            .unwrap()
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let fixture = Fixture::new();
        let store = MessageStore::new();
        store.add(fixture.message(10, "first"));
        store.add(fixture.message(20, "second"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.by_index(0).unwrap().payload(), b"first");
        assert_eq!(store.by_id(20).unwrap().payload(), b"second");
        assert!(store.by_id(30).is_none());
        assert!(store.by_index(2).is_none());
    }

    #[test]
    fn test_remove_prefers_most_recent_duplicate() {
        let fixture = Fixture::new();
        let store = MessageStore::new();
        store.add(fixture.message(1, "old"));
        store.add(fixture.message(2, "other"));
        let newer = fixture.message(1, "new");
        store.add(newer.clone());

        assert!(store.remove(&newer));
        let remaining: Vec<String> = store.snapshot().iter().map(|m| m.payload_text().into_owned()).collect();
        assert_eq!(remaining, vec!["old", "other"]);

        assert!(store.remove_by_id(99).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_for_each_in_order() {
        let fixture = Fixture::new();
        let store: MessageStore = (0..3).map(|i| fixture.message(i, &format!("m{}", i))).collect();

        let mut ids = Vec::new();
        store.for_each(|m| ids.push(m.id()));
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_save_and_load() {
        let fixture = Fixture::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages");

        let store = MessageStore::new();
        store.add(fixture.message(7, "hi"));
        store.add(fixture.message(3, "again"));
        store.save(&path).unwrap();

        let loaded = MessageStore::load(&path, &fixture.selves, &fixture.contacts).unwrap();
        let loaded: Vec<(u64, Vec<u8>)> =
            loaded.snapshot().iter().map(|m| (m.id(), m.payload().to_vec())).collect();
        assert_eq!(loaded, vec![(7, b"hi".to_vec()), (3, b"again".to_vec())]);
    }

    #[test]
    fn test_load_empty_file() {
        let fixture = Fixture::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages");
        MessageStore::new().save(&path).unwrap();

        assert!(MessageStore::load(&path, &fixture.selves, &fixture.contacts).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_file_fails_whole_load() {
        let fixture = Fixture::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages");

        let store = MessageStore::new();
        store.add(fixture.message(1, "a"));
        store.add(fixture.message(2, "b"));
        store.save(&path).unwrap();

        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        let result = MessageStore::load(&path, &fixture.selves, &fixture.contacts);
        assert!(matches!(
            result,
            Err(StoreError::Corrupt { index: 1, source: EnvelopeError::UnexpectedEof })
        ));
    }

    #[test]
    fn test_load_with_unknown_keys_fails() {
        let fixture = Fixture::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages");
        let store = MessageStore::new();
        store.add(fixture.message(1, "a"));
        store.save(&path).unwrap();

        let stranger = SelfIdentities::generate("Mallory", "", "").unwrap();
        assert!(MessageStore::load(&path, &stranger, &fixture.contacts).is_err());
    }

    #[test]
    fn test_missing_file() {
        let fixture = Fixture::new();
        let dir = tempdir().unwrap();
        assert!(matches!(
            MessageStore::load(dir.path().join("absent"), &fixture.selves, &fixture.contacts),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_concurrent_adds() {
        let fixture = Fixture::new();
        let template = fixture.message(0, "x");
        let store = Arc::new(MessageStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let template = template.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        store.add(template.clone());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 400);
    }

    #[test]
    fn test_temp_file_keeps_full_name() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("mail.a");
        let second = dir.path().join("mail.b");

        replace_file(&first, b"one").unwrap();
        replace_file(&second, b"two").unwrap();

        assert_eq!(fs::read(&first).unwrap(), b"one");
        assert_eq!(fs::read(&second).unwrap(), b"two");
        assert!(!dir.path().join("mail.a.tmp").exists());
        assert!(!dir.path().join("mail.tmp").exists());
        assert!(replace_file(Path::new("/"), b"x").is_err());
    }

    #[test]
    fn test_concurrent_add_and_save() {
        let fixture = Fixture::new();
        let dir = tempdir().unwrap();
        let path = Arc::new(dir.path().join("messages"));
        let store = Arc::new(MessageStore::new());

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = store.clone();
                let path = path.clone();
                let messages: Vec<Message> = (0..5).map(|i| fixture.message(t * 10 + i, "x")).collect();
                thread::spawn(move || {
                    messages
                        .into_iter()
                        .map(|message| {
                            store.add(message);
                            store.save(path.as_path()).is_ok()
                        })
                        .filter(|saved| !saved)
                        .count()
                })
            })
            .collect();
        let failed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(failed, 0);
        let loaded = MessageStore::load(path.as_path(), &fixture.selves, &fixture.contacts).unwrap();
        assert_eq!(loaded.len(), 40);
    }
}
