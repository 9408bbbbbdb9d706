//! User accounts for Courier.
//!
//! 1. **Accounts**: [`User`] with a hashed [`Credential`] and an ordered
//!    contact list holding one chat transcript per contact.
//! 2. **Directory**: [`UserDirectory`], the name-keyed set of accounts the
//!    router consults on every login and every routed message.
//! 3. **Persistence**: [`UserStore`] snapshots, with [`JsonFileStore`] as
//!    the file-backed implementation.
//!
//! # How it fits in the stack
//!
//! ```text
//! Router (above)  ← registers, authenticates, and updates users
//!     ↕
//! Directory (this crate)  ← owns account state
//!     ↕
//! Protocol (below)  ← provides UserProfile, Contact wire types
//! ```

#![allow(async_fn_in_trait)]

mod directory;
mod error;
mod store;
mod user;

pub use directory::UserDirectory;
pub use error::StoreError;
pub use store::{DEFAULT_DATA_FILE, JsonFileStore, UserStore};
pub use user::{Credential, User};
