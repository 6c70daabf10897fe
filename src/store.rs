//! Hot-reloadable store for the eligibility rule set.
//!
//! The current [`RuleSet`] is published through a `watch` channel as an
//! `Arc`, so readers always see one complete set. A background task polls
//! the rule file's modification time and swaps in a freshly parsed set when
//! it advances.

use crate::config::RulesConfig;
use crate::matcher::{evaluate, ActionMatcher, Decision};
use crate::rules::RuleSet;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one modification check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The rule file does not exist
    Missing,
    /// Modification time has not advanced since the last load
    Unchanged,
    /// A new rule set was published
    Reloaded { rules: usize },
    /// The file could not be inspected or read; the previous set stays current
    Failed { reason: String },
    /// The store was stopped while this check was running
    Superseded,
}

/// Eligibility rule store with an explicit `start`/`stop` lifecycle.
///
/// Queries against a store that is not running start it first, so a stopped
/// store comes back with a fresh load on the next query.
pub struct RuleStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: RulesConfig,
    rules: watch::Sender<Arc<RuleSet>>,
    /// Modification time of the last attempted load
    last_modified: Mutex<Option<SystemTime>>,
    /// Bumped by `stop`; in-flight checks from an older run do not publish.
    epoch: AtomicU64,
    running: AtomicBool,
    reloader: Mutex<Option<Reloader>>,
}

struct Reloader {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RuleStore {
    /// Create an idle store. No I/O happens until [`start`](Self::start).
    pub fn new(config: RulesConfig) -> Self {
        let (rules, _) = watch::channel(Arc::new(RuleSet::empty()));
        Self {
            inner: Arc::new(StoreInner {
                config,
                rules,
                last_modified: Mutex::new(None),
                epoch: AtomicU64::new(0),
                running: AtomicBool::new(false),
                reloader: Mutex::new(None),
            }),
        }
    }

    /// Load the rule file and start the reload timer.
    ///
    /// The initial load runs on the calling thread. The timer needs a tokio
    /// runtime; without one the store keeps the initial load only.
    pub fn start(&self) {
        let mut reloader = self.inner.reloader.lock();
        if self.inner.running.load(Ordering::Acquire) {
            return;
        }

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let outcome = self.inner.reload(epoch);
        let period = self.inner.config.effective_reload_interval();

        *reloader = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (shutdown, shutdown_rx) = oneshot::channel();
                let task = handle.spawn(reload_loop(
                    Arc::clone(&self.inner),
                    epoch,
                    period,
                    shutdown_rx,
                ));
                Some(Reloader { shutdown, task })
            }
            Err(_) => {
                warn!(
                    path = %self.inner.config.path.display(),
                    "No async runtime available, periodic rule reload disabled"
                );
                None
            }
        };

        self.inner.running.store(true, Ordering::Release);
        info!(
            path = %self.inner.config.path.display(),
            reload_interval_ms = period.as_millis() as u64,
            initial_load = ?outcome,
            "Rules watcher turned on"
        );
    }

    /// Stop the reload timer and clear the loaded rules.
    pub fn stop(&self) {
        let mut reloader = self.inner.reloader.lock();
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(Reloader { shutdown, task }) = reloader.take() {
            let _ = shutdown.send(());
            drop(task);
        }

        {
            let mut last = self.inner.last_modified.lock();
            self.inner.epoch.fetch_add(1, Ordering::AcqRel);
            *last = None;
            self.inner.rules.send_replace(Arc::new(RuleSet::empty()));
        }

        info!(
            path = %self.inner.config.path.display(),
            "Rules watcher turned off"
        );
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Run one modification check now.
    pub fn reload_now(&self) -> ReloadOutcome {
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        self.inner.reload(epoch)
    }

    /// The rule set currently in force.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.inner.rules.borrow().clone()
    }

    /// Receiver notified whenever a new rule set is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RuleSet>> {
        self.inner.rules.subscribe()
    }

    /// Decide eligibility, starting the store if it is not running.
    pub fn decide(&self, operation: &str) -> Decision {
        if !self.is_running() {
            self.start();
        }
        let rules = self.snapshot();
        let decision = evaluate(&rules, operation);
        debug!(
            operation = %operation,
            eligible = decision.eligible,
            reason = ?decision.reason,
            "Eligibility decided"
        );
        decision
    }

    pub fn config(&self) -> &RulesConfig {
        &self.inner.config
    }
}

impl ActionMatcher for RuleStore {
    fn is_eligible(&self, operation: &str) -> bool {
        self.decide(operation).eligible
    }
}

impl Drop for RuleStore {
    fn drop(&mut self) {
        self.stop();
    }
}

impl StoreInner {
    fn reload(&self, epoch: u64) -> ReloadOutcome {
        let path = &self.config.path;
        let mut last = self.last_modified.lock();
        if self.epoch.load(Ordering::Acquire) != epoch {
            return ReloadOutcome::Superseded;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Rules file not found");
                return ReloadOutcome::Missing;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot inspect rules file");
                return ReloadOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rules file has no modification time");
                return ReloadOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if last.is_some_and(|previous| modified <= previous) {
            return ReloadOutcome::Unchanged;
        }

        info!(path = %path.display(), "Reading rules");
        let outcome = match std::fs::read_to_string(path) {
            Ok(content) => {
                let rules = RuleSet::parse(&content, self.config.pattern_syntax);
                let count = rules.len();
                info!(
                    allow = rules.allowed().len(),
                    deny = rules.denied().len(),
                    allow_patterns = rules.allow_patterns().len(),
                    deny_patterns = rules.deny_patterns().len(),
                    "Rules reloaded"
                );
                self.rules.send_replace(Arc::new(rules));
                ReloadOutcome::Reloaded { rules: count }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read rules file");
                ReloadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        // Recorded even on failure so a broken file is not re-read every tick.
        *last = Some(modified);
        outcome
    }
}

async fn reload_loop(
    inner: Arc<StoreInner>,
    epoch: u64,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let inner = Arc::clone(&inner);
                match tokio::task::spawn_blocking(move || inner.reload(epoch)).await {
                    Ok(ReloadOutcome::Superseded) => break,
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Rules reload task failed"),
                }
            }
        }
    }

    debug!("Rules reload loop exited");
}
