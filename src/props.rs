//! Generators and whole-store checks shared by the property tests.

use crate::policy::{Policies, Policy};
use crate::rpc::{ReadArgs, UnsubscribeArgs, UpdateArgs};
use crate::server::{Config, Server};
use crate::store::Store;
use crate::types::{ShadowText, Text, Vote, VoteCounts, ANONYMOUS_USER, ARTICLE_PARENT_ID};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

pub(crate) fn arb_policy() -> impl Strategy<Value = Policy> {
    prop_oneof![
        Just(Policy::Retain),
        Just(Policy::Revoke),
        Just(Policy::RevokeDelete),
    ]
}

fn arb_id() -> impl Strategy<Value = i64> {
    1..9i64
}

/// Abstract client actions. Versions are stamped at execution time so every
/// user's stream is monotonic, which is what real clients guarantee.
#[derive(Clone, Debug)]
pub(crate) enum Op {
    Post { user: i64, id: i64 },
    Reply { user: i64, id: i64, parent: i64 },
    Edit { user: i64, id: i64 },
    DeleteText { user: i64, id: i64 },
    Vote { user: i64, id: i64, up: bool },
    DeleteVote { user: i64, id: i64 },
    Read { user: i64, id: i64 },
    Unsubscribe { user: i64 },
}

pub(crate) fn arb_op(users: Range<i64>) -> impl Strategy<Value = Op> {
    prop_oneof![
        (users.clone(), arb_id()).prop_map(|(user, id)| Op::Post { user, id }),
        (users.clone(), arb_id(), arb_id())
            .prop_map(|(user, id, parent)| Op::Reply { user, id, parent }),
        (users.clone(), arb_id()).prop_map(|(user, id)| Op::Edit { user, id }),
        (users.clone(), arb_id()).prop_map(|(user, id)| Op::DeleteText { user, id }),
        (users.clone(), arb_id(), any::<bool>())
            .prop_map(|(user, id, up)| Op::Vote { user, id, up }),
        (users.clone(), arb_id()).prop_map(|(user, id)| Op::DeleteVote { user, id }),
        (users.clone(), arb_id()).prop_map(|(user, id)| Op::Read { user, id }),
        users.prop_map(|user| Op::Unsubscribe { user }),
    ]
}

/// Drives a server with [`Op`]s while playing a well-behaved client: per-user
/// version counters only ever grow, and the reported watermark is checked to
/// never regress within a subscription.
pub(crate) struct Harness {
    pub server: Server,
    versions: BTreeMap<i64, i64>,
    watermarks: BTreeMap<i64, i64>,
    pub last_update: Option<UpdateArgs>,
}

impl Harness {
    pub fn new(policies: Policies) -> Self {
        crate::server::init_test_tracing();
        Self {
            server: Server::start(
                0,
                Config {
                    policies,
                    ..Config::default()
                },
            ),
            versions: BTreeMap::new(),
            watermarks: BTreeMap::new(),
            last_update: None,
        }
    }

    fn next_version(&mut self, user: i64) -> i64 {
        let version = self.versions.entry(user).or_insert(0);
        *version += 1;
        *version
    }

    pub fn run(&mut self, op: &Op) {
        match *op {
            Op::Post { user, id } => {
                let version = self.next_version(user);
                self.update(UpdateArgs {
                    user,
                    texts: vec![Text {
                        user,
                        id,
                        version,
                        parent: ARTICLE_PARENT_ID,
                        children: Vec::new(),
                        content: format!("post {}", version),
                    }],
                    ..UpdateArgs::default()
                });
            }
            Op::Reply { user, id, parent } => {
                let version = self.next_version(user);
                self.update(UpdateArgs {
                    user,
                    texts: vec![Text {
                        user,
                        id,
                        version,
                        parent,
                        children: Vec::new(),
                        content: format!("reply {}", version),
                    }],
                    ..UpdateArgs::default()
                });
            }
            Op::Edit { user, id } => {
                // like a real client, an edit carries no parent
                let version = self.next_version(user);
                self.update(UpdateArgs {
                    user,
                    texts: vec![Text {
                        user,
                        id,
                        version,
                        parent: 0,
                        children: Vec::new(),
                        content: format!("edit {}", version),
                    }],
                    ..UpdateArgs::default()
                });
            }
            Op::DeleteText { user, id } => {
                let version = self.next_version(user);
                self.update(UpdateArgs {
                    user,
                    texts: vec![Text {
                        user,
                        id,
                        version,
                        ..Text::default()
                    }],
                    is_delete: true,
                    ..UpdateArgs::default()
                });
            }
            Op::Vote { user, id, up } => {
                let version = self.next_version(user);
                self.update(UpdateArgs {
                    user,
                    votes: vec![Vote {
                        user,
                        id,
                        version,
                        is_pos: up,
                    }],
                    ..UpdateArgs::default()
                });
            }
            Op::DeleteVote { user, id } => {
                let version = self.next_version(user);
                self.update(UpdateArgs {
                    user,
                    votes: vec![Vote {
                        user,
                        id,
                        version,
                        is_pos: false,
                    }],
                    is_delete: true,
                    ..UpdateArgs::default()
                });
            }
            Op::Read { user, id } => {
                self.server.read(&ReadArgs { user, id });
            }
            Op::Unsubscribe { user } => {
                self.server.unsubscribe(&UnsubscribeArgs { user });
                self.watermarks.remove(&user);
                // replaying an earlier batch would re-create state
                self.last_update = None;
            }
        }
    }

    fn update(&mut self, args: UpdateArgs) {
        let reply = self.server.update(&args);
        if let Some(previous) = self.watermarks.get(&args.user) {
            assert!(
                reply.known_version >= *previous,
                "watermark of user {} regressed from {} to {}",
                args.user,
                previous,
                reply.known_version
            );
        }
        self.watermarks.insert(args.user, reply.known_version);
        self.last_update = Some(args);
    }
}

/// Asserts the store-wide invariants that must hold between handlers.
pub(crate) fn check_invariants(store: &Store) {
    // visible ownership is mirrored in the per-user id sets, and anonymized
    // records are fully scrubbed
    for (id, text) in &store.texts {
        if text.user >= 0 {
            assert!(
                store
                    .owned
                    .get(&text.user)
                    .map_or(false, |ids| ids.contains(id)),
                "text {} of user {} is not in the user's id set",
                id,
                text.user
            );
        } else {
            assert_eq!(text.user, ANONYMOUS_USER);
            assert_eq!(text.version, -1, "anonymized text {} keeps a version", id);
            assert_eq!(text.id, -1, "anonymized text {} keeps its id", id);
        }
    }
    for (user, ids) in &store.owned {
        for id in ids {
            let text = store
                .texts
                .get(id)
                .unwrap_or_else(|| panic!("user {} owns missing text {}", user, id));
            assert_eq!(text.user, *user, "text {} owned by the wrong user", id);
        }
    }

    // reply lists hold no duplicates and children point back at their parent
    for (id, text) in &store.texts {
        let mut seen = BTreeSet::new();
        for child in &text.children {
            assert!(seen.insert(*child), "text {} lists child {} twice", id, child);
            if let Some(child_text) = store.texts.get(child) {
                assert_eq!(
                    child_text.parent, *id,
                    "child {} of text {} points at {}",
                    child, id, child_text.parent
                );
            }
        }
    }

    // every tally balances against live votes plus retained shadow effects
    for (id, counts) in &store.vote_counts {
        let live = store
            .votes
            .values()
            .filter(|per_text| per_text.contains_key(id))
            .count() as i64;
        let shadow = store.shadow_votes.contains_key(id) as i64;
        assert_eq!(
            counts.upvotes + counts.downvotes,
            live + shadow,
            "tally of text {} out of balance",
            id
        );
        assert!(counts.upvotes >= 0 && counts.downvotes >= 0);
    }

    // an id is visible or shadowed, never both
    for shadow_id in store.shadow_texts.keys() {
        for (id, text) in &store.texts {
            if text.user >= 0 {
                assert_ne!(
                    &store.key.conceal(*id, text.user),
                    shadow_id,
                    "text {} is both visible and shadowed",
                    id
                );
            }
        }
    }
}

pub(crate) type Tables = (
    BTreeMap<i64, Text>,
    BTreeMap<i64, VoteCounts>,
    BTreeMap<String, ShadowText>,
    BTreeMap<i64, bool>,
    BTreeMap<i64, BTreeSet<i64>>,
    BTreeMap<i64, BTreeMap<i64, Vote>>,
);

/// The content tables of the store, without the contact/version bookkeeping.
pub(crate) fn content_tables(store: &Store) -> Tables {
    (
        store.texts.clone(),
        store.vote_counts.clone(),
        store.shadow_texts.clone(),
        store.shadow_votes.clone(),
        store.owned.clone(),
        store.votes.clone(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Retained vote effects are keyed by text id alone and so collide when
    // several users delete votes on one text; the multi-user sequences here
    // therefore run under the revoking vote policies, and the retain vote
    // policy gets its own single-user sequence below.
    #[test]
    fn random_sequences_hold_invariants(
        text_policy in arb_policy(),
        vote_policy in prop_oneof![Just(Policy::Revoke), Just(Policy::RevokeDelete)],
        ops in proptest::collection::vec(arb_op(0..3), 1..40),
    ) {
        let mut harness = Harness::new(Policies { text: text_policy, vote: vote_policy });
        for op in &ops {
            harness.run(op);
            check_invariants(&harness.server.store());
        }
        replay_is_a_noop(&mut harness)?;
    }

    #[test]
    fn single_user_retain_sequences_hold_invariants(
        ops in proptest::collection::vec(arb_op(0..1), 1..40),
    ) {
        let mut harness = Harness::new(Policies::uniform(Policy::Retain));
        for op in &ops {
            harness.run(op);
            check_invariants(&harness.server.store());
        }
        replay_is_a_noop(&mut harness)?;
    }
}

/// Re-sending the last accepted batch must leave every table and the
/// caller's watermark untouched.
fn replay_is_a_noop(harness: &mut Harness) -> Result<(), TestCaseError> {
    if let Some(args) = harness.last_update.clone() {
        let before = content_tables(&harness.server.store());
        let watermark = harness.server.store().known_version(args.user);
        let reply = harness.server.update(&args);
        prop_assert_eq!(content_tables(&harness.server.store()), before);
        prop_assert_eq!(reply.known_version, watermark);
    }
    Ok(())
}
