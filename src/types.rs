use bytecheck::CheckBytes;
use rkyv::{Archive, Deserialize, Serialize};

/// Parent id of a top-level post.
pub const ARTICLE_PARENT_ID: i64 = -1;

/// Owner recorded on texts whose author has been scrubbed by the retain
/// policy.
pub const ANONYMOUS_USER: i64 = -1;

/// A threaded content record: a top-level post or a reply to another text.
#[derive(Clone, Debug, Default, Eq, PartialEq, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct Text {
    /// Owning user, or [`ANONYMOUS_USER`] after anonymization.
    pub user: i64,
    /// Identifier assigned by the owner, unique across the service.
    pub id: i64,
    /// The owner's version stamp for this write.
    pub version: i64,
    /// Id of the text this replies to, or [`ARTICLE_PARENT_ID`].
    pub parent: i64,
    /// Ids of direct replies, in arrival order, without duplicates.
    pub children: Vec<i64>,
    /// The text body. Anonymized records carry their reclaim token here.
    pub content: String,
}

/// One user's up or down opinion on a text; at most one per `(user, id)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct Vote {
    /// Voting user.
    pub user: i64,
    /// Id of the voted-on text.
    pub id: i64,
    /// The voter's version stamp for this write.
    pub version: i64,
    /// `true` for an upvote.
    pub is_pos: bool,
}

/// The aggregate tally kept per text id.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Archive, Deserialize, Serialize)]
#[archive_attr(derive(Debug, CheckBytes))]
#[repr(C)]
pub struct VoteCounts {
    /// Number of upvotes counted for the text.
    pub upvotes: i64,
    /// Number of downvotes counted for the text.
    pub downvotes: i64,
}

/// A revoked text preserved under its envelope id for possible re-exposure.
///
/// `copy` is `None` once the owner has actually deleted the record; such a
/// tombstone is never re-exposed but keeps the links to its recursively
/// revoked children alive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ShadowText {
    pub id: String,
    pub children: Vec<String>,
    pub copy: Option<Text>,
}
