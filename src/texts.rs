//! Tree-aware apply and delete over the visible text table, with the three
//! policy paths and the recursive revoke/expose/delete cascades.

use crate::policy::Policy;
use crate::rpc::Rejection;
use crate::store::Store;
use crate::types::{ShadowText, Text, ANONYMOUS_USER, ARTICLE_PARENT_ID};

impl Store {
    /// Applies a batch of new or updated texts, in batch order.
    ///
    /// Uploads may introduce orphans; live writes may not. A version at or
    /// below the stored one is dropped, which makes retries harmless.
    pub(crate) fn apply_texts(&mut self, texts: &[Text], upload: bool) -> Result<(), Rejection> {
        for incoming in texts {
            if let Some(existing) = self.texts.get(&incoming.id).cloned() {
                let reclaim = existing.user == ANONYMOUS_USER
                    && existing.content == self.key.conceal(incoming.id, incoming.user);
                if existing.user != incoming.user && !reclaim {
                    tracing::debug!(
                        text = incoming.id,
                        owner = existing.user,
                        caller = incoming.user,
                        "apply: text update by non-owner"
                    );
                    return Err(Rejection::Unauthorized);
                }
                if existing.version >= incoming.version {
                    tracing::debug!(
                        text = incoming.id,
                        have = existing.version,
                        got = incoming.version,
                        "apply: stale text dropped"
                    );
                    continue;
                }
                if existing.version > self.known_version(incoming.user) {
                    panic!(
                        "text {} at version {} is ahead of user {} watermark {}",
                        incoming.id,
                        existing.version,
                        incoming.user,
                        self.known_version(incoming.user)
                    );
                }
                let mut merged = existing;
                merged.content = incoming.content.clone();
                merged.version = incoming.version;
                // a reclaim makes the record fully live again
                merged.user = incoming.user;
                merged.id = incoming.id;
                self.texts.insert(incoming.id, merged);
                self.owned.entry(incoming.user).or_default().insert(incoming.id);
                self.bump_version(incoming.user, incoming.version);
            } else {
                let parent_visible = self.texts.contains_key(&incoming.parent);
                if !parent_visible && incoming.parent != ARTICLE_PARENT_ID && !upload {
                    tracing::debug!(
                        text = incoming.id,
                        parent = incoming.parent,
                        "apply: orphan rejected"
                    );
                    return Err(Rejection::NotFound);
                }
                if parent_visible {
                    self.link_child(incoming.parent, incoming.id);
                }
                self.bump_version(incoming.user, incoming.version);
                match self.policies.text {
                    Policy::Retain | Policy::RevokeDelete => {
                        self.insert_visible(incoming.clone());
                    }
                    Policy::Revoke => {
                        let shadow_id = self.key.conceal(incoming.id, incoming.user);
                        match self.shadow_texts.get_mut(&shadow_id) {
                            Some(entry) => {
                                // the id was revoked earlier; refresh the
                                // copy and bring the subtree back
                                entry.copy = Some(incoming.clone());
                                let entry = entry.clone();
                                self.expose_subtree(entry)?;
                            }
                            None => self.insert_visible(incoming.clone()),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies a batch of text deletions under the configured policy.
    pub(crate) fn delete_texts(&mut self, texts: &[Text]) -> Result<(), Rejection> {
        for incoming in texts {
            if let Some(ids) = self.owned.get_mut(&incoming.user) {
                ids.remove(&incoming.id);
            }
            if let Some(existing) = self.texts.get(&incoming.id).cloned() {
                if existing.user != incoming.user {
                    tracing::debug!(
                        text = incoming.id,
                        owner = existing.user,
                        caller = incoming.user,
                        "delete: text delete by non-owner"
                    );
                    return Err(Rejection::Unauthorized);
                }
                if existing.version > incoming.version {
                    tracing::debug!(
                        text = incoming.id,
                        have = existing.version,
                        got = incoming.version,
                        "delete: stale text delete dropped"
                    );
                    continue;
                }
                if existing.version > self.known_version(incoming.user) {
                    panic!(
                        "text {} at version {} is ahead of user {} watermark {}",
                        incoming.id,
                        existing.version,
                        incoming.user,
                        self.known_version(incoming.user)
                    );
                }
                match self.policies.text {
                    Policy::Retain => {
                        // anonymize in place; the token lets the owner
                        // reclaim the record on a later upload
                        let token = self.key.conceal(existing.id, existing.user);
                        let mut anonymized = existing;
                        anonymized.content = token;
                        anonymized.user = ANONYMOUS_USER;
                        anonymized.version = -1;
                        anonymized.id = -1;
                        self.texts.insert(incoming.id, anonymized);
                    }
                    Policy::Revoke => {
                        let shadow_id = self.revoke_subtree(&existing);
                        if let Some(entry) = self.shadow_texts.get_mut(&shadow_id) {
                            entry.copy = None;
                        }
                        self.unlink_child(existing.parent, incoming.id);
                    }
                    Policy::RevokeDelete => {
                        self.delete_subtree(&existing);
                        self.unlink_child(existing.parent, incoming.id);
                    }
                }
            } else if self.policies.text == Policy::Revoke {
                // the id may be invisible already because an ancestor was
                // revoked; tombstone it so re-exposure skips it
                let shadow_id = self.key.conceal(incoming.id, incoming.user);
                let entry = self
                    .shadow_texts
                    .entry(shadow_id.clone())
                    .or_insert_with(|| ShadowText {
                        id: shadow_id,
                        children: Vec::new(),
                        copy: None,
                    });
                entry.copy = None;
            }
            self.bump_version(incoming.user, incoming.version);
        }
        Ok(())
    }

    fn insert_visible(&mut self, text: Text) {
        self.owned.entry(text.user).or_default().insert(text.id);
        self.texts.insert(text.id, text);
    }

    /// Moves a visible subtree into the shadow table, keyed by each node's
    /// envelope, and returns the root's envelope id. Parents' reply lists
    /// are left alone; only the cascade root is unlinked, by the caller.
    fn revoke_subtree(&mut self, text: &Text) -> String {
        let shadow_id = self.key.conceal(text.id, text.user);
        let mut shadow_children = Vec::with_capacity(text.children.len());
        for child_id in &text.children {
            if let Some(child) = self.texts.get(child_id).cloned() {
                shadow_children.push(self.revoke_subtree(&child));
            }
        }
        self.texts.remove(&text.id);
        if let Some(ids) = self.owned.get_mut(&text.user) {
            ids.remove(&text.id);
        }
        self.shadow_texts.insert(
            shadow_id.clone(),
            ShadowText {
                id: shadow_id.clone(),
                children: shadow_children,
                copy: Some(text.clone()),
            },
        );
        shadow_id
    }

    /// Removes a visible subtree outright, leaving no shadow state.
    fn delete_subtree(&mut self, text: &Text) {
        self.texts.remove(&text.id);
        if let Some(ids) = self.owned.get_mut(&text.user) {
            ids.remove(&text.id);
        }
        for child_id in &text.children {
            if let Some(child) = self.texts.get(child_id).cloned() {
                self.delete_subtree(&child);
            }
        }
    }

    /// Re-inserts a revoked subtree into the visible tables.
    ///
    /// Children whose copy was nulled by an owner delete during the
    /// invisible period stay behind as tombstones. Fails before mutating
    /// anything when the root's parent is itself no longer visible; the
    /// subtree then stays in the shadow.
    fn expose_subtree(&mut self, entry: ShadowText) -> Result<(), Rejection> {
        let mut copy = match entry.copy {
            Some(copy) => copy,
            None => return Ok(()),
        };
        if copy.parent != ARTICLE_PARENT_ID {
            if !self.texts.contains_key(&copy.parent) {
                tracing::debug!(
                    text = copy.id,
                    parent = copy.parent,
                    "expose: parent is not visible"
                );
                return Err(Rejection::NotFound);
            }
            self.link_child(copy.parent, copy.id);
        }
        // the stored reply list may be stale; children exposed below relink
        // themselves, and tombstoned ones must not stay listed
        let id = copy.id;
        copy.children.retain(|child| {
            self.texts
                .get(child)
                .map_or(false, |child_text| child_text.parent == id)
        });
        self.owned.entry(copy.user).or_default().insert(copy.id);
        self.texts.insert(copy.id, copy);
        for shadow_child in &entry.children {
            if let Some(child) = self.shadow_texts.get(shadow_child).cloned() {
                if child.copy.is_some() {
                    self.expose_subtree(child)?;
                }
            }
        }
        self.shadow_texts.remove(&entry.id);
        Ok(())
    }
}
