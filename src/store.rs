use crate::crypto::Key;
use crate::policy::Policies;
use crate::rpc::Rejection;
use crate::types::{ShadowText, Text, Vote, VoteCounts};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// The server's aggregate view: the visible and shadow tables plus the
/// per-user bookkeeping. All mutation happens through the subsystem methods
/// while the owner holds the server lock.
#[derive(Debug)]
pub(crate) struct Store {
    pub policies: Policies,
    pub key: Key,

    /// Visible texts by id.
    pub texts: BTreeMap<i64, Text>,
    /// Vote tallies by text id.
    pub vote_counts: BTreeMap<i64, VoteCounts>,
    /// Revoked subtrees by envelope id.
    pub shadow_texts: BTreeMap<String, ShadowText>,
    /// Vote effects kept behind by the retain policy, by text id.
    pub shadow_votes: BTreeMap<i64, bool>,

    /// Ids each user currently owns as visible.
    pub owned: BTreeMap<i64, BTreeSet<i64>>,
    /// Most recent vote per text for each user.
    pub votes: BTreeMap<i64, BTreeMap<i64, Vote>>,
    /// Highest version accepted from each user.
    pub versions: BTreeMap<i64, i64>,
    /// Last contact per user.
    pub last_seen: BTreeMap<i64, Instant>,
}

impl Store {
    pub fn new(policies: Policies, key: Key) -> Self {
        Self {
            policies,
            key,
            texts: BTreeMap::new(),
            vote_counts: BTreeMap::new(),
            shadow_texts: BTreeMap::new(),
            shadow_votes: BTreeMap::new(),
            owned: BTreeMap::new(),
            votes: BTreeMap::new(),
            versions: BTreeMap::new(),
            last_seen: BTreeMap::new(),
        }
    }

    /// Creates the per-user maps on first contact and refreshes the lease.
    ///
    /// A user the server has never heard from starts at version `-1` so that
    /// any non-negative version is accepted on first contact.
    pub fn touch_user(&mut self, user: i64) {
        self.owned.entry(user).or_default();
        self.votes.entry(user).or_default();
        self.versions.entry(user).or_insert(-1);
        self.last_seen.insert(user, Instant::now());
    }

    /// The highest version accepted from `user`, `-1` if never seen.
    pub fn known_version(&self, user: i64) -> i64 {
        self.versions.get(&user).copied().unwrap_or(-1)
    }

    /// Raises the user's version watermark, never lowering it.
    pub fn bump_version(&mut self, user: i64, version: i64) {
        let current = self.versions.entry(user).or_insert(-1);
        *current = (*current).max(version);
    }

    /// Appends `child` to a visible parent's reply list unless it is already
    /// listed; no-op when the parent is not visible.
    pub fn link_child(&mut self, parent: i64, child: i64) {
        if let Some(text) = self.texts.get_mut(&parent) {
            if !text.children.contains(&child) {
                text.children.push(child);
            }
        }
    }

    /// Removes `child` from a visible parent's reply list.
    pub fn unlink_child(&mut self, parent: i64, child: i64) {
        if let Some(text) = self.texts.get_mut(&parent) {
            text.children.retain(|id| *id != child);
        }
    }

    /// Removes the user's entire footprint under the configured policies and
    /// forgets the user's bookkeeping. Equivalent to a bulk delete of every
    /// text and vote the server currently holds for the user.
    pub fn unsubscribe_user(&mut self, user: i64) {
        tracing::info!(user, "unsubscribing");
        let texts: Vec<Text> = self
            .owned
            .get(&user)
            .map(|ids| ids.iter().filter_map(|id| self.texts.get(id).cloned()).collect())
            .unwrap_or_default();
        let votes: Vec<Vote> = self
            .votes
            .get(&user)
            .map(|per_text| per_text.values().copied().collect())
            .unwrap_or_default();

        if let Err(err) = self.delete_texts(&texts) {
            if err != Rejection::NotFound {
                tracing::warn!(user, %err, "unsubscribe: could not delete texts");
            }
        }
        if let Err(err) = self.delete_votes(&votes) {
            if err != Rejection::NotFound {
                tracing::warn!(user, %err, "unsubscribe: could not delete votes");
            }
        }

        self.votes.remove(&user);
        self.owned.remove(&user);
        self.versions.remove(&user);
        self.last_seen.remove(&user);
    }
}
