//! A registered account: name, hashed credential, and contacts with their
//! chat transcripts.

use courier_protocol::{Contact, UserProfile};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A salted SHA-256 password hash. The plaintext is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    salt: String,
    hash: String,
}

impl Credential {
    /// Hashes `password` under a fresh random 16-byte salt.
    pub fn new(password: &str) -> Self {
        let salt: [u8; 16] = rand::rng().random();
        let salt = hex::encode(salt);
        let hash = digest(&salt, password);
        Self { salt, hash }
    }

    /// Returns `true` if `password` hashes to the stored value.
    pub fn verify(&self, password: &str) -> bool {
        digest(&self.salt, password) == self.hash
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user.
///
/// Two users are equal when their names are equal, regardless of
/// credential or contacts. The directory relies on this for
/// replace-on-update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    name: String,
    credential: Credential,
    /// Insertion-ordered; names are unique.
    contacts: Vec<Contact>,
}

impl User {
    /// Creates a user with no contacts.
    pub fn new(name: impl Into<String>, password: &str) -> Self {
        Self::with_credential(name, Credential::new(password), Vec::new())
    }

    /// Builds a user from parts. Duplicate contact names keep their first
    /// occurrence.
    pub fn with_credential(
        name: impl Into<String>,
        credential: Credential,
        contacts: Vec<Contact>,
    ) -> Self {
        let mut user = Self {
            name: name.into(),
            credential,
            contacts: Vec::with_capacity(contacts.len()),
        };
        for contact in contacts {
            if !user.has_contact(&contact.name) {
                user.contacts.push(contact);
            }
        }
        user
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn has_contact(&self, name: &str) -> bool {
        self.contacts.iter().any(|c| c.name == name)
    }

    /// Adds `name` with an empty transcript. No-op if already a contact.
    pub fn add_contact(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_contact(&name) {
            self.contacts.push(Contact {
                name,
                transcript: String::new(),
            });
        }
    }

    /// Drops `name` and its transcript. Returns `true` if it was a contact.
    pub fn remove_contact(&mut self, name: &str) -> bool {
        let before = self.contacts.len();
        self.contacts.retain(|c| c.name != name);
        self.contacts.len() != before
    }

    /// Returns the transcript with `name`, or `None` if not a contact.
    pub fn chat(&self, name: &str) -> Option<&str> {
        self.contacts
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.transcript.as_str())
    }

    /// Appends `text` to the transcript with `name`. Ignored for
    /// non-contacts.
    pub fn append_to_chat(&mut self, name: &str, text: &str) {
        if let Some(contact) = self.contacts.iter_mut().find(|c| c.name == name) {
            contact.transcript.push_str(text);
        }
    }

    /// Contact names in the order they were added.
    pub fn contacts(&self) -> impl Iterator<Item = &str> {
        self.contacts.iter().map(|c| c.name.as_str())
    }

    pub fn set_password(&mut self, password: &str) {
        self.credential = Credential::new(password);
    }

    pub fn verify_password(&self, password: &str) -> bool {
        self.credential.verify(password)
    }

    /// The wire form sent to clients. Never includes a password.
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            name: self.name.clone(),
            password: None,
            contacts: self.contacts.clone(),
        }
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for User {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_verifies_its_own_password_only() {
        let credential = Credential::new("pw1");
        assert!(credential.verify("pw1"));
        assert!(!credential.verify("pw2"));
        assert!(!credential.verify(""));
    }

    #[test]
    fn test_credential_salts_differ_for_same_password() {
        let a = Credential::new("same");
        let b = Credential::new("same");
        assert_ne!(a, b, "each credential gets its own salt");
        assert!(a.verify("same") && b.verify("same"));
    }

    #[test]
    fn test_credential_does_not_store_plaintext() {
        let credential = Credential::new("hunter2");
        let json = serde_json::to_string(&credential).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_add_contact_twice_keeps_one_entry() {
        let mut user = User::new("alice", "pw");
        user.add_contact("bob");
        user.append_to_chat("bob", "hi\n");
        user.add_contact("bob");

        assert_eq!(user.contacts().collect::<Vec<_>>(), vec!["bob"]);
        assert_eq!(user.chat("bob"), Some("hi\n"), "transcript kept");
    }

    #[test]
    fn test_contacts_keep_insertion_order() {
        let mut user = User::new("alice", "pw");
        user.add_contact("zed");
        user.add_contact("bob");
        user.add_contact("mia");

        assert_eq!(user.contacts().collect::<Vec<_>>(), vec!["zed", "bob", "mia"]);
    }

    #[test]
    fn test_remove_contact_reports_presence() {
        let mut user = User::new("alice", "pw");
        user.add_contact("bob");

        assert!(user.remove_contact("bob"));
        assert!(!user.remove_contact("bob"));
        assert!(!user.has_contact("bob"));
        assert_eq!(user.chat("bob"), None);
    }

    #[test]
    fn test_append_to_chat_ignores_non_contacts() {
        let mut user = User::new("alice", "pw");
        user.append_to_chat("stranger", "hello");
        assert_eq!(user.chat("stranger"), None);
        assert!(!user.has_contact("stranger"));
    }

    #[test]
    fn test_set_password_replaces_credential() {
        let mut user = User::new("alice", "old");
        user.set_password("new");
        assert!(user.verify_password("new"));
        assert!(!user.verify_password("old"));
    }

    #[test]
    fn test_equality_is_by_name_only() {
        let mut a = User::new("alice", "one");
        let b = User::new("alice", "two");
        a.add_contact("bob");
        assert_eq!(a, b);
        assert_ne!(a, User::new("bob", "one"));
    }

    #[test]
    fn test_to_profile_has_no_password() {
        let mut user = User::new("alice", "secret");
        user.add_contact("bob");
        let profile = user.to_profile();

        assert_eq!(profile.name, "alice");
        assert!(profile.password.is_none());
        assert_eq!(profile.contacts.len(), 1);
    }

    #[test]
    fn test_with_credential_drops_duplicate_contacts() {
        let contacts = vec![
            Contact { name: "bob".into(), transcript: "first".into() },
            Contact { name: "bob".into(), transcript: "second".into() },
        ];
        let user = User::with_credential("alice", Credential::new("pw"), contacts);
        assert_eq!(user.chat("bob"), Some("first"));
    }
}
