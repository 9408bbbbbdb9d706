//! Core protocol types for Courier's wire format.
//!
//! Every frame on the wire carries exactly one [`Envelope`]. Routing is by
//! user name: the server looks at `destination_name` to find the recipient's
//! connection, and falls back to an offline queue when the recipient is not
//! logged in.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// What an envelope means. Fixed when the envelope is built.
///
/// Kinds ending in `Reply`/`Forwarding` are produced by the server in
/// response to a client request; the rest originate at clients, except
/// [`UserUpdateRequest`](Self::UserUpdateRequest), which the server
/// broadcasts to ask every client to push its user state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Client → Server: log in, or register if the name is unknown.
    /// `source_name` is the user name, `content` the password.
    LoginRequest,
    /// Server → Client: outcome of a `LoginRequest`.
    LoginReply,
    /// Client → Server: "I accept the LoginReply, bind me to this
    /// connection." Triggers delivery of queued messages.
    LoginConfirmation,
    /// Client → Client (via server): ask to become a contact.
    AddingRequest,
    /// Server → Client: whether an `AddingRequest` was forwarded.
    AddingForwarding,
    /// Client → Client (via server): answer to an `AddingRequest`.
    AddingReply,
    /// Client → Client (via server): drop a contact.
    AddingRemove,
    /// Client → Client (via server): a chat line.
    UserMessage,
    /// Server → Client: whether a `UserMessage` was forwarded.
    UserMessageForwarding,
    /// Client → Server: replace the stored user with the attached profile.
    UserUpdate,
    /// Server → Client: "send me a `UserUpdate`."
    UserUpdateRequest,
    /// Client → Server: unbind this user from its connection.
    UserLogout,
    /// Client → Server: delete the sending user's account.
    UserRemove,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// User profile (wire form of an account)
// ---------------------------------------------------------------------------

/// One entry of a user's contact list: the contact's name and the running
/// chat transcript with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub transcript: String,
}

/// A user account as it travels on the wire.
///
/// The server never fills `password` in profiles it sends out. A client that
/// sends a profile with `password` set is asking to change it; leaving it
/// `None` keeps the stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Contacts in the order they were added.
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl UserProfile {
    /// Creates a profile with no password and no contacts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: None,
            contacts: Vec::new(),
        }
    }
}

impl fmt::Display for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Username: {} Contacts: (", self.name)?;
        for contact in &self.contacts {
            write!(f, "{} ,", contact.name)?;
        }
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// Structured data riding along with an envelope.
///
/// Adjacently tagged, so a user attachment looks like
/// `{ "type": "User", "data": { "name": "alice", ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Attachment {
    User(UserProfile),
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(profile) => profile.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level message wrapper. Every frame on the wire is an Envelope.
///
/// `kind` and `timestamp` are set by [`Envelope::new`] and cannot be changed
/// afterwards; everything else is optional routing or payload data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    kind: MessageKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Outcome flag on reply kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,

    /// Milliseconds since the Unix epoch. Envelopes decoded without one are
    /// stamped on arrival.
    #[serde(default = "now_millis")]
    timestamp: u64,
}

impl Envelope {
    /// Creates an empty envelope of the given kind, stamped with the
    /// current time.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            source_name: None,
            source_address: None,
            destination_name: None,
            destination_address: None,
            content: None,
            condition: None,
            attachment: None,
            timestamp: now_millis(),
        }
    }

    /// Builds a reply of `kind` addressed back to whoever sent `self`.
    ///
    /// The request's source name and address become the reply's
    /// destination name and address.
    pub fn reply(&self, kind: MessageKind) -> Self {
        Self::new(kind)
            .with_destination(self.source_name.clone(), self.source_address.clone())
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns `true` if neither a destination name nor a destination
    /// address is set.
    pub fn has_no_destination(&self) -> bool {
        self.destination_name.is_none() && self.destination_address.is_none()
    }

    pub fn with_source(
        mut self,
        name: Option<String>,
        address: Option<String>,
    ) -> Self {
        self.source_name = name;
        self.source_address = address;
        self
    }

    pub fn with_destination(
        mut self,
        name: Option<String>,
        address: Option<String>,
    ) -> Self {
        self.destination_name = name;
        self.destination_address = address;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_condition(mut self, condition: bool) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Log rendering, e.g.
/// `TYPE [UserMessage] FROM [alice][10.0.0.2:5100] TO [bob] CONTENT [hi] TIMESTAMP [...]`.
impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TYPE [{}]", self.kind)?;
        if self.source_name.is_some() || self.source_address.is_some() {
            write!(f, " FROM ")?;
            write_bracketed(f, &self.source_name)?;
            write_bracketed(f, &self.source_address)?;
        }
        if self.destination_name.is_some()
            || self.destination_address.is_some()
        {
            write!(f, " TO ")?;
            write_bracketed(f, &self.destination_name)?;
            write_bracketed(f, &self.destination_address)?;
        }
        if let Some(content) = &self.content {
            write!(f, " CONTENT [{content}]")?;
        }
        if let Some(condition) = self.condition {
            write!(f, " CONDITION [{condition}]")?;
        }
        if let Some(attachment) = &self.attachment {
            write!(f, " EXTRA DATA [{attachment}]")?;
        }
        write!(f, " TIMESTAMP [{}]", self.timestamp)
    }
}

fn write_bracketed(
    f: &mut fmt::Formatter<'_>,
    value: &Option<String>,
) -> fmt::Result {
    match value {
        Some(v) => write!(f, "[{v}]"),
        None => Ok(()),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =========================================================================
// Tests
// =========================================================================
