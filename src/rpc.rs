//! The request and reply shapes the server exchanges with subscribed users.
//!
//! The contract expected of clients: stamp every record with a monotonically
//! increasing per-user `version`, assign fresh random 63-bit ids, and send
//! every mutation that should be reflected in the tree and the tallies.
//! `is_upload` marks a bulk re-subscription and relaxes the orphan and
//! missing-text checks that steady-state mutations are held to.

use crate::types::{Text, Vote, VoteCounts};
use bytecheck::CheckBytes;
use rkyv::{Archive, Deserialize, Serialize};

/// Outcome of an operation, carried as a value in every reply.
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, Archive, CheckBytes, Deserialize, Serialize,
)]
#[archive(as = "Status")]
#[repr(u8)]
pub enum Status {
    /// The handler succeeded and the reply fields are populated.
    Ok,
    /// A referenced record does not exist for an operation that requires it.
    NotFound,
    /// The caller does not own the targeted record.
    Unauthorized,
    /// The transport failed; produced by clients only.
    Disconnect,
    /// The client's local database failed; produced by clients only.
    Db,
}

impl Status {
    /// Whether the operation succeeded.
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Ok
    }
}

/// Why the server refused part of a batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// A referenced record does not exist.
    #[error("referenced record does not exist")]
    NotFound,
    /// The caller does not own the targeted record.
    #[error("caller does not own the record")]
    Unauthorized,
}

impl From<Rejection> for Status {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::NotFound => Status::NotFound,
            Rejection::Unauthorized => Status::Unauthorized,
        }
    }
}

impl From<Result<(), Rejection>> for Status {
    fn from(outcome: Result<(), Rejection>) -> Self {
        match outcome {
            Ok(()) => Status::Ok,
            Err(rejection) => rejection.into(),
        }
    }
}

/// A batch of versioned mutations from one user.
#[derive(Clone, Debug, Default, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct UpdateArgs {
    /// The submitting user.
    pub user: i64,
    /// Text records to apply or delete, processed first, in order.
    pub texts: Vec<Text>,
    /// Vote records to apply or delete, processed after the texts.
    pub votes: Vec<Vote>,
    /// Interpret the batch as deletions instead of upserts.
    pub is_delete: bool,
    /// Bulk re-subscription; accepts orphaned content and votes on
    /// not-yet-uploaded texts.
    pub is_upload: bool,
}

/// Reply to an [`UpdateArgs`] batch.
#[derive(Clone, Copy, Debug, Default, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct UpdateReply {
    /// The server's post-batch version watermark for the caller.
    pub known_version: i64,
    /// Terminal status of the batch.
    pub status: Status,
}

/// A read of one text and its tally.
#[derive(Clone, Copy, Debug, Default, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct ReadArgs {
    /// The reading user.
    pub user: i64,
    /// Id of the text to read.
    pub id: i64,
}

/// Reply to a [`ReadArgs`] request. Record fields are defensive copies.
#[derive(Clone, Debug, Default, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct ReadReply {
    /// The server's version watermark for the caller; left at its default
    /// when the read fails.
    pub known_version: i64,
    /// The requested text.
    pub text: Text,
    /// The requested tally.
    pub vote_counts: VoteCounts,
    /// Outcome of the read.
    pub status: Status,
}

/// Withdraws a user and their footprint from the service.
#[derive(Clone, Copy, Debug, Default, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct UnsubscribeArgs {
    /// The withdrawing user.
    pub user: i64,
}

/// Reply to an [`UnsubscribeArgs`] request.
#[derive(Clone, Copy, Debug, Default, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct UnsubscribeReply {
    /// Outcome of the unsubscribe; always [`Status::Ok`].
    pub status: Status,
}
