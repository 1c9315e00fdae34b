//! Scheme approval.
//!
//! An [`ApprovalPolicy`] answers one question: may this scheme name be
//! loaded? Stores are pluggable; the crate ships an in-memory
//! [`StaticPolicy`] and a JSON-file backed [`FilePolicy`].
//!
//! The registry never calls a store directly. It goes through a
//! [`PolicyGate`], which bounds the lookup with a timeout and falls back to
//! a fixed [`AllowList`] when the store errors, panics or stalls. Without an
//! allow-list the gate denies.
//!
//! Lookups run on one worker thread per gate, fed by a bounded queue. A
//! stalled store therefore holds one thread and at most
//! [`LOOKUP_QUEUE_DEPTH`] queued requests; once the queue is full further
//! lookups go straight to the fallback.

use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::CodecConfig;
use crate::error::PolicyError;

/// Source of truth for scheme approval.
pub trait ApprovalPolicy: Send + Sync {
    /// Whether `name` is approved for loading.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] if the store cannot answer.
    fn approved(&self, name: &str) -> Result<bool, PolicyError>;
}

/// In-memory set of approved names.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    approved: HashSet<String>,
}

impl StaticPolicy {
    /// Approve exactly the given names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approved: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a name.
    pub fn approve(&mut self, name: impl Into<String>) {
        self.approved.insert(name.into());
    }

    /// Remove a name.
    pub fn revoke(&mut self, name: &str) {
        self.approved.remove(name);
    }
}

impl ApprovalPolicy for StaticPolicy {
    fn approved(&self, name: &str) -> Result<bool, PolicyError> {
        Ok(self.approved.contains(name))
    }
}

/// JSON file of `{"scheme": true|false, ...}`, re-read on every lookup.
///
/// Names absent from the file are not approved.
#[derive(Debug, Clone)]
pub struct FilePolicy {
    path: PathBuf,
}

impl FilePolicy {
    /// Policy backed by the file at `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, bool>, PolicyError> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| PolicyError::Unavailable(e.kind().to_string()))?;
        serde_json::from_str(&text).map_err(|e| PolicyError::Corrupt(e.to_string()))
    }
}

impl ApprovalPolicy for FilePolicy {
    fn approved(&self, name: &str) -> Result<bool, PolicyError> {
        Ok(self.read()?.get(name).copied().unwrap_or(false))
    }
}

/// Fixed set of names approved when the policy store cannot answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    /// Allow-list of the given names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Lookups that may wait behind a running one before the gate stops
/// queueing and answers from the fallback.
pub const LOOKUP_QUEUE_DEPTH: usize = 16;

struct Lookup {
    name: String,
    deadline: Instant,
    reply: mpsc::Sender<Result<bool, PolicyError>>,
}

/// The single worker thread behind a gate and its queue.
struct LookupWorker {
    queue: mpsc::SyncSender<Lookup>,
    pending: Arc<AtomicUsize>,
}

impl LookupWorker {
    fn spawn(policy: Arc<dyn ApprovalPolicy>) -> std::io::Result<Self> {
        let (queue, requests) = mpsc::sync_channel::<Lookup>(LOOKUP_QUEUE_DEPTH);
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);

        thread::Builder::new()
            .name("quimage-policy".into())
            .spawn(move || {
                // Ends once every gate holding the sender is dropped.
                for lookup in requests {
                    if Instant::now() < lookup.deadline {
                        let answer = panic::catch_unwind(AssertUnwindSafe(|| {
                            policy.approved(&lookup.name)
                        }))
                        .unwrap_or_else(|_| {
                            Err(PolicyError::Unavailable("policy lookup panicked".into()))
                        });
                        let _ = lookup.reply.send(answer);
                    }
                    counter.fetch_sub(1, Ordering::AcqRel);
                }
            })?;

        Ok(Self { queue, pending })
    }
}

/// Timeout-bounded, fail-closed front for an [`ApprovalPolicy`].
#[derive(Clone)]
pub struct PolicyGate {
    policy: Arc<dyn ApprovalPolicy>,
    fallback: Option<AllowList>,
    timeout: Duration,
    worker: Arc<OnceCell<Option<LookupWorker>>>,
}

impl PolicyGate {
    /// Gate `policy` with an explicit fallback and deadline.
    pub fn new(
        policy: Arc<dyn ApprovalPolicy>,
        fallback: Option<AllowList>,
        timeout: Duration,
    ) -> Self {
        Self {
            policy,
            fallback,
            timeout,
            worker: Arc::new(OnceCell::new()),
        }
    }

    /// Gate `policy` with the fallback list and deadline from `config`.
    pub fn from_config(policy: Arc<dyn ApprovalPolicy>, config: &CodecConfig) -> Self {
        let fallback = config
            .default_allow_list
            .as_ref()
            .map(|names| AllowList::new(names.iter().cloned()));
        Self::new(policy, fallback, config.policy_timeout())
    }

    /// Decide whether `name` may be loaded.
    ///
    /// The store is queried on the gate's worker thread. An error, a panic,
    /// a full queue or a lookup slower than the deadline hands the decision
    /// to the fallback allow-list; with no allow-list the answer is `false`.
    pub fn is_approved(&self, name: &str) -> bool {
        let Some(worker) = self.worker() else {
            return self.fallback_decision(name);
        };

        let (reply, answer) = mpsc::channel();
        let lookup = Lookup {
            name: name.to_owned(),
            deadline: Instant::now() + self.timeout,
            reply,
        };
        worker.pending.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = worker.queue.try_send(lookup) {
            worker.pending.fetch_sub(1, Ordering::AcqRel);
            match e {
                mpsc::TrySendError::Full(_) => {
                    warn!(scheme = name, "policy lookups backed up, using fallback");
                }
                mpsc::TrySendError::Disconnected(_) => {
                    warn!(scheme = name, "policy worker gone, using fallback");
                }
            }
            return self.fallback_decision(name);
        }

        match answer.recv_timeout(self.timeout) {
            Ok(Ok(decision)) => {
                debug!(scheme = name, approved = decision, "policy decision");
                decision
            }
            Ok(Err(e)) => {
                warn!(scheme = name, error = %e, "policy store failed, using fallback");
                self.fallback_decision(name)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    scheme = name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "policy lookup timed out, using fallback"
                );
                self.fallback_decision(name)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!(scheme = name, "policy lookup dropped, using fallback");
                self.fallback_decision(name)
            }
        }
    }

    /// Lookups queued or running on the worker.
    pub fn pending_lookups(&self) -> usize {
        self.worker
            .get()
            .and_then(Option::as_ref)
            .map_or(0, |w| w.pending.load(Ordering::Acquire))
    }

    fn worker(&self) -> Option<&LookupWorker> {
        self.worker
            .get_or_init(|| match LookupWorker::spawn(Arc::clone(&self.policy)) {
                Ok(worker) => Some(worker),
                Err(e) => {
                    warn!(error = %e, "could not start policy worker");
                    None
                }
            })
            .as_ref()
    }

    fn fallback_decision(&self, name: &str) -> bool {
        match &self.fallback {
            Some(list) => list.contains(name),
            None => false,
        }
    }
}

impl std::fmt::Debug for PolicyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyGate")
            .field("fallback", &self.fallback)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Failing;
    impl ApprovalPolicy for Failing {
        fn approved(&self, _: &str) -> Result<bool, PolicyError> {
            Err(PolicyError::Unavailable("down".into()))
        }
    }

    struct Panicking;
    impl ApprovalPolicy for Panicking {
        fn approved(&self, _: &str) -> Result<bool, PolicyError> {
            panic!("store exploded")
        }
    }

    struct Slow;
    impl ApprovalPolicy for Slow {
        fn approved(&self, _: &str) -> Result<bool, PolicyError> {
            thread::sleep(Duration::from_millis(500));
            Ok(true)
        }
    }

    fn gate(policy: impl ApprovalPolicy + 'static, fallback: Option<&[&str]>) -> PolicyGate {
        PolicyGate::new(
            Arc::new(policy),
            fallback.map(|names| AllowList::new(names.iter().copied())),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn static_policy_decides() {
        let g = gate(StaticPolicy::new(["frqi"]), None);
        assert!(g.is_approved("frqi"));
        assert!(!g.is_approved("neqr"));
    }

    #[test]
    fn failing_store_uses_fallback() {
        assert!(gate(Failing, Some(&["frqi"])).is_approved("frqi"));
        assert!(!gate(Failing, Some(&["frqi"])).is_approved("neqr"));
        assert!(!gate(Failing, None).is_approved("frqi"));
    }

    #[test]
    fn panicking_store_fails_closed() {
        assert!(!gate(Panicking, None).is_approved("frqi"));
        assert!(gate(Panicking, Some(&["frqi"])).is_approved("frqi"));
    }

    #[test]
    fn slow_store_times_out() {
        assert!(!gate(Slow, None).is_approved("frqi"));
        assert!(gate(Slow, Some(&["frqi"])).is_approved("frqi"));
    }

    /// Blocks every lookup until the sender side is dropped.
    struct Stalled {
        release: parking_lot::Mutex<mpsc::Receiver<()>>,
        calls: AtomicUsize,
    }

    impl ApprovalPolicy for Stalled {
        fn approved(&self, _: &str) -> Result<bool, PolicyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.release.lock().recv();
            Ok(true)
        }
    }

    #[test]
    fn stalled_store_keeps_lookups_bounded() {
        let (release, blocked) = mpsc::channel();
        let store = Arc::new(Stalled {
            release: parking_lot::Mutex::new(blocked),
            calls: AtomicUsize::new(0),
        });
        let g = PolicyGate::new(
            Arc::clone(&store) as Arc<dyn ApprovalPolicy>,
            Some(AllowList::new(["frqi"])),
            Duration::from_millis(5),
        );

        for _ in 0..200 {
            assert!(g.is_approved("frqi"));
            assert!(!g.is_approved("neqr"));
            assert!(g.pending_lookups() <= LOOKUP_QUEUE_DEPTH + 1);
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        drop(release);
    }

    /// Panics on the first lookup, approves afterwards.
    struct PanicsOnce(AtomicUsize);

    impl ApprovalPolicy for PanicsOnce {
        fn approved(&self, _: &str) -> Result<bool, PolicyError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first lookup fails");
            }
            Ok(true)
        }
    }

    #[test]
    fn worker_survives_a_panicking_store() {
        let g = gate(PanicsOnce(AtomicUsize::new(0)), None);
        assert!(!g.is_approved("frqi"));
        assert!(g.is_approved("frqi"));
        assert!(g.is_approved("neqr"));
    }

    #[test]
    fn clones_share_one_worker() {
        let g = gate(StaticPolicy::new(["frqi"]), None);
        let h = g.clone();
        assert!(g.is_approved("frqi"));
        assert!(h.is_approved("frqi"));
        assert!(Arc::ptr_eq(&g.worker, &h.worker));
    }

    #[test]
    fn file_policy_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"frqi": true, "neqr": false}}"#).unwrap();
        let policy = FilePolicy::new(file.path());
        assert_eq!(policy.approved("frqi"), Ok(true));
        assert_eq!(policy.approved("neqr"), Ok(false));
        assert_eq!(policy.approved("mcqi"), Ok(false));
    }

    #[test]
    fn file_policy_errors() {
        let missing = FilePolicy::new("/nonexistent/quimage/policy.json");
        assert!(matches!(
            missing.approved("frqi"),
            Err(PolicyError::Unavailable(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            FilePolicy::new(file.path()).approved("frqi"),
            Err(PolicyError::Corrupt(_))
        ));
    }
}
