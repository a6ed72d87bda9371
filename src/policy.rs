/// What removing a record leaves behind.
///
/// The policy is consulted once at each branch point of the text and vote
/// subsystems; there is no behavior hierarchy beyond these three variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum Policy {
    /// Keep the record's aggregate effects and anonymize it in place.
    Retain,
    /// Move the record and its subtree into the shadow tables; a later
    /// upload by the owner restores them.
    Revoke,
    /// Eliminate the record and its subtree entirely.
    RevokeDelete,
}

/// The per-kind policy pair fixed at server start.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Policies {
    /// Policy applied when texts are deleted.
    pub text: Policy,
    /// Policy applied when votes are deleted.
    pub vote: Policy,
}

impl Policies {
    /// Applies the same policy to both kinds.
    pub fn uniform(policy: Policy) -> Self {
        Self {
            text: policy,
            vote: policy,
        }
    }
}

impl Default for Policies {
    fn default() -> Self {
        Self::uniform(Policy::Retain)
    }
}
