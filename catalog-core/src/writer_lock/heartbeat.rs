//! Background heartbeat for held leases
//!
//! One task per editing session refreshes every lease the session holds. If any refresh
//! fails, times out, or finds the token gone, every write gate handed to the task is
//! demoted and the task publishes `LeaseState::Lost` and exits. There is no retry.

use metrics::counter;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::manager::LockManager;
use super::row::LeaseGrant;
use crate::store::WriteGate;

/// Lower bound on the heartbeat period
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Observable state of a session's leases
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseState {
    Held,
    Lost {
        lock_key: String,
        store: PathBuf,
        reason: String,
    },
    Released,
}

impl LeaseState {
    pub fn is_lost(&self) -> bool {
        matches!(self, LeaseState::Lost { .. })
    }
}

/// A lease together with the manager of the store it lives in
#[derive(Debug, Clone)]
pub struct HeldLease {
    pub manager: LockManager,
    pub grant: LeaseGrant,
}

impl HeldLease {
    pub fn new(manager: LockManager, grant: LeaseGrant) -> Self {
        Self { manager, grant }
    }

    /// Release this lease; the error is returned, never raised to a panic
    pub fn release(&self) -> super::LockResult<bool> {
        self.manager.release(&self.grant.token, &self.grant.lock_key)
    }
}

/// Timing of the heartbeat loop
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    pub io_timeout: Duration,
}

impl HeartbeatSettings {
    /// Interval is clamped to at least `MIN_HEARTBEAT_INTERVAL`
    pub fn new(interval: Duration, io_timeout: Duration) -> Self {
        Self {
            interval: interval.max(MIN_HEARTBEAT_INTERVAL),
            io_timeout,
        }
    }
}

/// Handle on a running heartbeat task
#[derive(Debug)]
pub struct HeartbeatHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    state_rx: watch::Receiver<LeaseState>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Latest published state
    pub fn state(&self) -> LeaseState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<LeaseState> {
        self.state_rx.clone()
    }

    pub fn is_lost(&self) -> bool {
        self.state_rx.borrow().is_lost()
    }

    /// Stop the task and wait for it to exit; returns the final state
    pub async fn stop(mut self) -> LeaseState {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "heartbeat task ended abnormally");
        }
        self.state()
    }
}

/// Start refreshing `leases` every `settings.interval`
///
/// The first refresh happens one interval after the call, since a fresh grant already
/// carries a current heartbeat.
pub fn spawn_heartbeat(
    leases: Vec<HeldLease>,
    gates: Vec<WriteGate>,
    settings: HeartbeatSettings,
) -> HeartbeatHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let (state_tx, state_rx) = watch::channel(LeaseState::Held);

    let task = tokio::spawn(run_heartbeat(leases, gates, settings, stop_rx, state_tx));

    HeartbeatHandle {
        stop_tx: Some(stop_tx),
        state_rx,
        task,
    }
}

async fn run_heartbeat(
    leases: Vec<HeldLease>,
    gates: Vec<WriteGate>,
    settings: HeartbeatSettings,
    mut stop_rx: oneshot::Receiver<()>,
    state_tx: watch::Sender<LeaseState>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        leases = leases.len(),
        interval = ?settings.interval,
        "heartbeat started"
    );

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                state_tx.send_replace(LeaseState::Released);
                info!("heartbeat stopped");
                return;
            }
            _ = ticker.tick() => {
                for lease in &leases {
                    if let Err(reason) = beat(lease, settings.io_timeout).await {
                        for gate in &gates {
                            gate.demote();
                        }
                        error!(
                            store = %lease.manager.path().display(),
                            lock_key = %lease.grant.lock_key,
                            reason = %reason,
                            "writer lease lost, session demoted to read-only"
                        );
                        counter!("writer_lock.heartbeat.failed").increment(1);
                        state_tx.send_replace(LeaseState::Lost {
                            lock_key: lease.grant.lock_key.clone(),
                            store: lease.manager.path().to_path_buf(),
                            reason,
                        });
                        return;
                    }
                }
            }
        }
    }
}

async fn beat(lease: &HeldLease, io_timeout: Duration) -> Result<(), String> {
    let manager = lease.manager.clone();
    let token = lease.grant.token.clone();
    let lock_key = lease.grant.lock_key.clone();

    let call = tokio::task::spawn_blocking(move || manager.heartbeat(&token, &lock_key));

    match tokio::time::timeout(io_timeout, call).await {
        Ok(Ok(Ok(true))) => {
            debug!(lock_key = %lease.grant.lock_key, "lease refreshed");
            Ok(())
        }
        Ok(Ok(Ok(false))) => Err("lock row no longer carries this session's token".to_string()),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(join)) => Err(format!("heartbeat task failed: {}", join)),
        Err(_) => Err(format!("heartbeat did not complete within {:?}", io_timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer_lock::row::MAIN_LOCK_KEY;
    use tempfile::TempDir;

    const IO: Duration = Duration::from_secs(2);

    #[test]
    fn test_interval_is_clamped() {
        let settings = HeartbeatSettings::new(Duration::from_secs(1), IO);
        assert_eq!(settings.interval, MIN_HEARTBEAT_INTERVAL);

        let settings = HeartbeatSettings::new(Duration::from_secs(30), IO);
        assert_eq!(settings.interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_stop_releases_state() {
        let dir = TempDir::new().unwrap();
        let manager = LockManager::open(dir.path().join("s.db"), IO).unwrap();
        let grant = manager
            .try_acquire("alice", Duration::from_secs(60), MAIN_LOCK_KEY)
            .unwrap()
            .into_grant()
            .unwrap();

        let gate = WriteGate::new(true);
        let handle = spawn_heartbeat(
            vec![HeldLease::new(manager, grant)],
            vec![gate.clone()],
            HeartbeatSettings::new(Duration::from_secs(5), IO),
        );

        assert_eq!(handle.state(), LeaseState::Held);
        assert_eq!(handle.stop().await, LeaseState::Released);
        assert!(gate.is_writable());
    }

    #[tokio::test]
    async fn test_lost_token_demotes_gates() {
        let dir = TempDir::new().unwrap();
        let manager = LockManager::open(dir.path().join("s.db"), IO).unwrap();
        let grant = manager
            .try_acquire("alice", Duration::from_secs(60), MAIN_LOCK_KEY)
            .unwrap()
            .into_grant()
            .unwrap();
        manager
            .force_clear(&crate::writer_lock::LockTarget::All)
            .unwrap();

        let gate = WriteGate::new(true);
        let handle = spawn_heartbeat(
            vec![HeldLease::new(manager, grant)],
            vec![gate.clone()],
            HeartbeatSettings::new(Duration::from_secs(5), IO),
        );

        let mut rx = handle.subscribe();
        tokio::time::timeout(Duration::from_secs(20), rx.wait_for(|s| s.is_lost()))
            .await
            .expect("lease loss not reported")
            .unwrap();

        assert!(!gate.is_writable());
        assert!(handle.is_lost());
    }
}
