//! Idempotent tally maintenance: one live vote per `(user, text)`, with a
//! shadow entry absorbing effects the retain policy keeps behind.

use crate::policy::Policy;
use crate::rpc::Rejection;
use crate::store::Store;
use crate::types::{Vote, VoteCounts};

impl Store {
    /// Applies a batch of votes; later versions overwrite, polarity changes
    /// move one unit across the tally.
    pub(crate) fn apply_votes(&mut self, votes: &[Vote], upload: bool) -> Result<(), Rejection> {
        for incoming in votes {
            if !self.texts.contains_key(&incoming.id) && !upload {
                tracing::debug!(text = incoming.id, "vote: text does not exist");
                return Err(Rejection::NotFound);
            }
            let previous = self
                .votes
                .get(&incoming.user)
                .and_then(|per_text| per_text.get(&incoming.id))
                .copied();
            match self.vote_counts.get_mut(&incoming.id) {
                None => {
                    // first vote for this text
                    let mut counts = VoteCounts::default();
                    if incoming.is_pos {
                        counts.upvotes += 1;
                    } else {
                        counts.downvotes += 1;
                    }
                    self.vote_counts.insert(incoming.id, counts);
                    self.votes
                        .entry(incoming.user)
                        .or_default()
                        .insert(incoming.id, *incoming);
                }
                Some(counts) => {
                    if let Some(previous) = previous {
                        if previous.version >= incoming.version {
                            tracing::debug!(
                                text = incoming.id,
                                have = previous.version,
                                got = incoming.version,
                                "vote: stale vote dropped"
                            );
                            continue;
                        }
                        if previous.is_pos != incoming.is_pos {
                            if incoming.is_pos {
                                counts.upvotes += 1;
                                counts.downvotes -= 1;
                            } else {
                                counts.upvotes -= 1;
                                counts.downvotes += 1;
                            }
                        }
                    } else {
                        // no live vote: either never voted, or the previous
                        // vote was deleted under some policy
                        match self.policies.vote {
                            Policy::Retain => {
                                if let Some(kept) = self.shadow_votes.remove(&incoming.id) {
                                    // the old effect stayed in the tally;
                                    // reconcile it with the new polarity
                                    if kept != incoming.is_pos {
                                        if incoming.is_pos {
                                            counts.upvotes += 1;
                                            counts.downvotes -= 1;
                                        } else {
                                            counts.upvotes -= 1;
                                            counts.downvotes += 1;
                                        }
                                    }
                                }
                            }
                            Policy::Revoke | Policy::RevokeDelete => {
                                if incoming.is_pos {
                                    counts.upvotes += 1;
                                } else {
                                    counts.downvotes += 1;
                                }
                            }
                        }
                    }
                    self.votes
                        .entry(incoming.user)
                        .or_default()
                        .insert(incoming.id, *incoming);
                }
            }
            self.bump_version(incoming.user, incoming.version);
        }
        Ok(())
    }

    /// Applies a batch of vote deletions under the configured policy.
    pub(crate) fn delete_votes(&mut self, votes: &[Vote]) -> Result<(), Rejection> {
        for incoming in votes {
            let previous = match self
                .votes
                .get(&incoming.user)
                .and_then(|per_text| per_text.get(&incoming.id))
                .copied()
            {
                Some(previous) => previous,
                None => {
                    tracing::debug!(
                        text = incoming.id,
                        user = incoming.user,
                        "vote: nothing to delete"
                    );
                    return Err(Rejection::NotFound);
                }
            };
            if previous.version > incoming.version {
                tracing::debug!(
                    text = incoming.id,
                    have = previous.version,
                    got = incoming.version,
                    "vote: stale vote delete dropped"
                );
                continue;
            }
            if let Some(per_text) = self.votes.get_mut(&incoming.user) {
                per_text.remove(&incoming.id);
            }
            let counts = match self.vote_counts.get_mut(&incoming.id) {
                Some(counts) => counts,
                None => panic!(
                    "user {} held a vote for text {} but no tally exists",
                    incoming.user, incoming.id
                ),
            };
            match self.policies.vote {
                Policy::Retain => {
                    // the effect stays in the tally; remember its polarity
                    // so a later re-vote by the user can reconcile
                    self.shadow_votes.insert(incoming.id, previous.is_pos);
                }
                Policy::Revoke | Policy::RevokeDelete => {
                    if previous.is_pos {
                        counts.upvotes -= 1;
                    } else {
                        counts.downvotes -= 1;
                    }
                }
            }
            self.bump_version(incoming.user, incoming.version);
        }
        Ok(())
    }
}
