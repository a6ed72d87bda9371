use crate::crypto::Key;
use crate::policy::Policies;
use crate::rpc::{
    ReadArgs, ReadReply, Status, UnsubscribeArgs, UnsubscribeReply, UpdateArgs, UpdateReply,
};
use crate::store::Store;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Server configuration, fixed at start.
#[derive(Clone, Debug)]
pub struct Config {
    /// Removal policies applied to texts and votes.
    pub policies: Policies,
    /// Quiet period after which a user is unsubscribed automatically.
    pub lease: Duration,
    /// Cadence of the lease sweeper.
    pub sweep_interval: Duration,
    /// Envelope key; a fresh one is generated at startup when absent.
    pub key: Option<Key>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policies: Policies::default(),
            // five years
            lease: Duration::from_secs(157_680_000),
            sweep_interval: Duration::from_secs(10),
            key: None,
        }
    }
}

struct Shared {
    store: Mutex<Store>,
    lease: Duration,
    sweep_interval: Duration,
    stopping: Mutex<bool>,
    stopped: Condvar,
}

/// The app server: the aggregate view behind one coarse lock, plus the lease
/// sweeper. Handlers hold the lock for their whole critical section and
/// never block on anything else while holding it.
pub struct Server {
    me: i64,
    shared: Arc<Shared>,
    sweeper: Option<thread::JoinHandle<()>>,
}

impl Server {
    /// Starts a server with the given instance id and configuration,
    /// including its background lease sweeper.
    pub fn start(me: i64, config: Config) -> Self {
        let key = config.key.unwrap_or_else(Key::generate);
        let shared = Arc::new(Shared {
            store: Mutex::new(Store::new(config.policies, key)),
            lease: config.lease,
            sweep_interval: config.sweep_interval,
            stopping: Mutex::new(false),
            stopped: Condvar::new(),
        });
        let sweeper = {
            let shared = shared.clone();
            thread::spawn(move || sweep_leases(&shared))
        };
        tracing::info!(me, "app server starting");
        Self {
            me,
            shared,
            sweeper: Some(sweeper),
        }
    }

    /// Ingests one batch of mutations: texts first, in batch order, then
    /// votes. Returns the server's post-batch version watermark for the
    /// caller along with the batch's terminal status.
    pub fn update(&self, args: &UpdateArgs) -> UpdateReply {
        let mut store = self.shared.store.lock();
        store.touch_user(args.user);
        let outcome = if args.is_delete {
            store
                .delete_texts(&args.texts)
                .and_then(|()| store.delete_votes(&args.votes))
        } else {
            store
                .apply_texts(&args.texts, args.is_upload)
                .and_then(|()| store.apply_votes(&args.votes, args.is_upload))
        };
        UpdateReply {
            known_version: store.known_version(args.user),
            status: outcome.into(),
        }
    }

    /// Returns copies of one text and its tally; the reply never aliases
    /// server state.
    pub fn read(&self, args: &ReadArgs) -> ReadReply {
        tracing::debug!(me = self.me, user = args.user, id = args.id, "read");
        let mut store = self.shared.store.lock();
        store.touch_user(args.user);
        let text = match store.texts.get(&args.id) {
            Some(text) => text.clone(),
            None => {
                return ReadReply {
                    status: Status::NotFound,
                    ..ReadReply::default()
                }
            }
        };
        let vote_counts = match store.vote_counts.get(&args.id) {
            Some(counts) => *counts,
            None => {
                return ReadReply {
                    status: Status::NotFound,
                    ..ReadReply::default()
                }
            }
        };
        ReadReply {
            known_version: store.known_version(args.user),
            text,
            vote_counts,
            status: Status::Ok,
        }
    }

    /// Withdraws a user: a bulk delete of their footprint under the
    /// configured policies, then the user's bookkeeping is forgotten.
    pub fn unsubscribe(&self, args: &UnsubscribeArgs) -> UnsubscribeReply {
        let mut store = self.shared.store.lock();
        store.unsubscribe_user(args.user);
        UnsubscribeReply { status: Status::Ok }
    }

    /// Stops the lease sweeper. Called automatically on drop.
    pub fn shutdown(&mut self) {
        *self.shared.stopping.lock() = true;
        self.shared.stopped.notify_all();
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.join();
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> parking_lot::MutexGuard<'_, Store> {
        self.shared.store.lock()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sweep_leases(shared: &Shared) {
    loop {
        {
            let mut stopping = shared.stopping.lock();
            if *stopping {
                return;
            }
            shared.stopped.wait_for(&mut stopping, shared.sweep_interval);
            if *stopping {
                return;
            }
        }
        let mut store = shared.store.lock();
        let now = Instant::now();
        let expired: Vec<i64> = store
            .last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= shared.lease)
            .map(|(user, _)| *user)
            .collect();
        for user in expired {
            tracing::info!(user, "lease expired");
            store.unsubscribe_user(user);
        }
    }
}

#[cfg(test)]
pub(crate) fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let env = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| "info".to_owned());
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(env))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
