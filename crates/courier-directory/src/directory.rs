//! The user directory: every registered account, keyed by name.
//!
//! # Concurrency note
//!
//! `UserDirectory` is a plain `HashMap` wrapper with no locking of its own.
//! The router owns it behind a mutex, so each method here runs as one
//! uninterrupted step from every connection's point of view. That is what
//! makes [`remove`](UserDirectory::remove) and its contact fan-out atomic.

use std::collections::HashMap;

use courier_protocol::UserProfile;
use serde::{Deserialize, Serialize};

use crate::{Credential, User};

/// All registered users.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDirectory {
    users: HashMap<String, User>,
}

impl UserDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new user. Returns `false` if the name is already taken.
    pub fn register(&mut self, user: User) -> bool {
        if self.users.contains_key(user.name()) {
            return false;
        }
        tracing::info!(name = user.name(), "user registered");
        self.users.insert(user.name().to_string(), user);
        true
    }

    /// Removes `name` and strips it from every other user's contacts.
    ///
    /// Returns `false` if no such user exists; contacts are left alone
    /// in that case.
    pub fn remove(&mut self, name: &str) -> bool {
        if self.users.remove(name).is_none() {
            return false;
        }
        for user in self.users.values_mut() {
            user.remove_contact(name);
        }
        tracing::info!(name, "user removed");
        true
    }

    /// Replaces the stored user that has the same name as `user`.
    ///
    /// Returns `false` and changes nothing if there is no such user.
    pub fn update(&mut self, user: User) -> bool {
        match self.users.get_mut(user.name()) {
            Some(slot) => {
                *slot = user;
                true
            }
            None => false,
        }
    }

    /// Replaces a user with the state carried in a wire profile.
    ///
    /// A profile without a password keeps the stored credential.
    pub fn update_from_profile(&mut self, profile: UserProfile) -> bool {
        let Some(existing) = self.users.get(&profile.name) else {
            return false;
        };
        let credential = match profile.password.as_deref() {
            Some(password) => Credential::new(password),
            None => existing.credential().clone(),
        };
        self.update(User::with_credential(
            profile.name,
            credential,
            profile.contacts,
        ))
    }

    /// Checks a login attempt. Either argument missing, or an unknown
    /// name, is a failed check.
    pub fn validate_password(
        &self,
        name: Option<&str>,
        password: Option<&str>,
    ) -> bool {
        match (name, password) {
            (Some(name), Some(password)) => self
                .users
                .get(name)
                .is_some_and(|user| user.verify_password(password)),
            _ => false,
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.users.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut User> {
        self.users.get_mut(name)
    }

    /// Sorted names of all registered users.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
