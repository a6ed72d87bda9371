//! # An effects-policy app server
//!
//! A research prototype of the server half of a data-ownership scheme for a
//! threaded social-content service. Every end-user keeps the authoritative
//! replica of their own records and *subscribes* by uploading them here; the
//! server maintains the aggregate view (the discussion tree and the vote
//! tallies) that serves read requests. When a user deletes content or
//! withdraws entirely, the server enforces a *removal policy* that decides
//! what their data leaves behind.
//!
//! ## Removal policies
//! Policies are configured per record kind (texts, votes) at server start:
//!
//! - **Retain**: the record's aggregate effects stay. A deleted text is
//!   anonymized in place, with owner, version and id scrubbed and the body
//!   replaced by an opaque reclaim token, so the thread keeps its shape. A deleted
//!   vote stays in the tally, with a shadow note of its polarity so a later
//!   re-vote by the same user reconciles instead of double-counting.
//! - **Revoke**: a deleted text and its whole reply subtree move into a
//!   shadow table keyed by envelope ids. The thread loses the subtree, but a
//!   later upload by the owner restores it, minus any replies whose own
//!   owners deleted them in the meantime. A deleted vote is subtracted.
//! - **RevokeDelete**: deletion is final; the subtree and the vote effects
//!   are removed outright.
//!
//! ## Shadow state and envelopes
//! An id has one representation at a time: a row in the visible table or a
//! shadow entry under `conceal(id, user)`, a deterministic keyed seal of the
//! pair. Determinism makes the envelope usable as a lookup key; it also
//! serves as the reclaim token written into anonymized records. Shadow
//! entries whose copy has been nulled are tombstones: they survive so that
//! re-exposure can skip them, and only disappear when their owner uploads
//! the id again.
//!
//! ## Versions and idempotence
//! Every record carries its owner's monotonically increasing version.
//! Records at or below the stored version are dropped, so retried and
//! duplicated batches are harmless, and the server tracks one watermark per
//! user, returned on every update so clients can advance their own notion
//! of what the service knows.
//!
//! ## Leases
//! Users that stay quiet past their lease are unsubscribed by a background
//! sweeper, exactly as if they had withdrawn themselves.
//!
//! ## Concurrency
//! One coarse lock guards the whole aggregate view. Handlers and the
//! sweeper take it for their full critical section and never hold it across
//! anything that blocks, trading throughput for linearizability of
//! update, read, unsubscribe and sweep.
#![warn(missing_docs)]

mod crypto;
mod policy;
#[cfg(test)]
mod props;
mod rpc;
mod server;
mod store;
mod texts;
mod types;
mod votes;

pub use crate::crypto::Key;
pub use crate::policy::{Policies, Policy};
pub use crate::rpc::{
    ReadArgs, ReadReply, Rejection, Status, UnsubscribeArgs, UnsubscribeReply, UpdateArgs,
    UpdateReply,
};
pub use crate::server::{Config, Server};
pub use crate::types::{Text, Vote, VoteCounts, ANONYMOUS_USER, ARTICLE_PARENT_ID};
