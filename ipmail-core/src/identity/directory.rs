//! Ordered, duplicate-free collection of identities
//!
//! Insertion order is preserved and is the order every traversal uses.
//! Duplicates are detected by canonical form, so re-adding a contact that
//! was loaded from a different source is a no-op.

use super::{Identity, IdentityError, KeyId, PublicKeys};

#[derive(Debug, Clone, Default)]
pub struct IdentityDirectory {
    entries: Vec<Identity>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an identity unless an equal one is already present.
    /// Returns whether the identity was inserted.
    pub fn add(&mut self, identity: Identity) -> bool {
        if self.contains(&identity) {
            return false;
        }
        self.entries.push(identity);
        true
    }

    /// Add every identity in order, skipping duplicates and `None` entries
    pub fn add_all<I>(&mut self, identities: I)
    where
        I: IntoIterator<Item = Option<Identity>>,
    {
        for identity in identities.into_iter().flatten() {
            self.add(identity);
        }
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.find(identity).is_some()
    }

    /// The stored entry equal to `identity`, if any
    pub fn find(&self, identity: &Identity) -> Option<&Identity> {
        let wanted = identity.canonical_bytes().ok()?;
        self.entries
            .iter()
            .find(|entry| entry.canonical_bytes().map(|b| b == wanted).unwrap_or(false))
    }

    /// All identities with a user-id record whose name matches exactly
    pub fn get_by_name(&self, name: &str) -> IdentityDirectory {
        self.filter(|identity| identity.user_ids().iter().any(|uid| uid.name == name))
    }

    /// All identities with a user-id record whose email matches exactly
    pub fn get_by_email(&self, email: &str) -> IdentityDirectory {
        self.filter(|identity| identity.user_ids().iter().any(|uid| uid.email == email))
    }

    /// All identities whose serialized primary key equals `key`
    pub fn get_by_public_key(&self, key: &PublicKeys) -> Result<IdentityDirectory, IdentityError> {
        let wanted = key.to_bytes()?;
        let mut result = IdentityDirectory::new();
        for identity in &self.entries {
            if identity.public_keys().to_bytes()? == wanted {
                result.add(identity.clone());
            }
        }
        Ok(result)
    }

    /// Identities whose encryption key carries `key_id`
    pub fn get_by_key_id(&self, key_id: KeyId) -> impl Iterator<Item = &Identity> {
        self.entries.iter().filter(move |identity| identity.key_id() == key_id)
    }

    /// The first inserted identity
    pub fn get_any(&self) -> Option<&Identity> {
        self.entries.first()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Identity)) {
        for identity in &self.entries {
            f(identity);
        }
    }

    pub fn as_slice(&self) -> &[Identity] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Identity> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Identity> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn filter(&self, predicate: impl Fn(&Identity) -> bool) -> IdentityDirectory {
        IdentityDirectory {
            entries: self.entries.iter().filter(|i| predicate(i)).cloned().collect(),
        }
    }
}

impl FromIterator<Identity> for IdentityDirectory {
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        let mut directory = IdentityDirectory::new();
        for identity in iter {
            directory.add(identity);
        }
        directory
    }
}

impl Extend<Identity> for IdentityDirectory {
    fn extend<T: IntoIterator<Item = Identity>>(&mut self, iter: T) {
        for identity in iter {
            self.add(identity);
        }
    }
}

impl<'a> IntoIterator for &'a IdentityDirectory {
    type Item = &'a Identity;
    type IntoIter = std::slice::Iter<'a, Identity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserId;
    use proptest::prelude::*;

    fn identity(name: &str, email: &str) -> Identity {
        Identity::generate(name, "", email).unwrap()
    }

    #[test]
    fn test_empty_directory() {
        let directory = IdentityDirectory::new();
        assert!(directory.is_empty());
        assert!(directory.get_any().is_none());
    }

    #[test]
    fn test_add_skips_duplicates() {
        let alice = identity("Alice", "a@x");
        let bob = identity("Bob", "b@x");

        let mut directory = IdentityDirectory::new();
        assert!(directory.add(alice.clone()));
        assert!(!directory.add(alice.clone()));
        assert!(directory.add(bob.clone()));
        // a public copy is the same identity
        assert!(!directory.add(alice.to_public()));

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.to_vec(), vec![alice, bob]);
    }

    #[test]
    fn test_add_all_skips_none() {
        let alice = identity("Alice", "a@x");
        let mut directory = IdentityDirectory::new();
        directory.add_all(vec![None, Some(alice.clone()), None]);

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get_any(), Some(&alice));
    }

    #[test]
    fn test_get_by_name_and_email() {
        let alice = identity("Alice", "alice@example.com");
        let bob = identity("Bob", "bob@example.com");
        let other_alice = identity("Alice", "alice@elsewhere.org");
        let directory: IdentityDirectory =
            vec![alice.clone(), bob.clone(), other_alice.clone()].into_iter().collect();

        assert_eq!(directory.get_by_name("Alice").to_vec(), vec![alice.clone(), other_alice]);
        assert_eq!(directory.get_by_email("bob@example.com").to_vec(), vec![bob]);
        assert!(directory.get_by_name("Carol").is_empty());
        // matching is exact
        assert!(directory.get_by_name("alice").is_empty());
    }

    #[test]
    fn test_get_by_name_matches_any_user_id() {
        let base = identity("Alice", "alice@example.com");
        let multi = Identity::from_public_parts(
            vec![
                UserId::new("Alice", "", "alice@example.com").unwrap(),
                UserId::new("Ali", "", "ali@example.com").unwrap(),
            ],
            base.public_keys().clone(),
        )
        .unwrap();
        let directory: IdentityDirectory = vec![multi.clone()].into_iter().collect();

        assert_eq!(directory.get_by_name("Ali").len(), 1);
        assert_eq!(directory.get_by_email("ali@example.com").len(), 1);
    }

    #[test]
    fn test_get_by_public_key() {
        let alice = identity("Alice", "");
        let bob = identity("Bob", "");
        let directory: IdentityDirectory = vec![alice.clone(), bob].into_iter().collect();

        let found = directory.get_by_public_key(alice.public_keys()).unwrap();
        assert_eq!(found.to_vec(), vec![alice]);
    }

    #[test]
    fn test_for_each_in_insertion_order() {
        let names = ["Carol", "Alice", "Bob"];
        let directory: IdentityDirectory = names.iter().map(|n| identity(n, "")).collect();

        let mut seen = Vec::new();
        directory.for_each(|i| seen.push(i.name().to_string()));
        assert_eq!(seen, names);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_no_duplicates_and_first_seen_order(picks in proptest::collection::vec(0usize..4, 0..24)) {
            let pool: Vec<Identity> = (0..4).map(|i| identity(&format!("user{}", i), "")).collect();

            let mut directory = IdentityDirectory::new();
            let mut expected: Vec<usize> = Vec::new();
            for &pick in &picks {
                directory.add(pool[pick].clone());
                if !expected.contains(&pick) {
                    expected.push(pick);
                }
            }

            let names: Vec<String> = directory.iter().map(|i| i.name().to_string()).collect();
            let expected_names: Vec<String> = expected.iter().map(|i| format!("user{}", i)).collect();
            prop_assert_eq!(names, expected_names);
        }
    }
}
