//! Editor and reader sessions
//!
//! A session is process-local and never persisted. Logging in as an editor takes the
//! writer lease of every store in the requested scope, opens those stores read-write
//! and the rest read-only, and starts one heartbeat task for all leases. When the
//! heartbeat reports the lease lost, the write gates close and the session reads as a
//! `Reader` from then on. Nothing re-acquires automatically.

use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

mod error;

pub use error::{SessionError, SessionResult};

use crate::config::{Config, LockConfig};
use crate::partition::{bootstrap, BootstrapReport};
use crate::router::ScopeRouter;
use crate::store::{Area, AreaStores, EditorScope, Store, StorePaths};
use crate::writer_lock::{
    spawn_heartbeat, AcquireOutcome, HeartbeatHandle, HeldLease, LeaseState, LockHolder,
    LockManager, LockToken,
};

/// Role a session currently plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reader,
    Editor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reader => f.write_str("reader"),
            Role::Editor => f.write_str("editor"),
        }
    }
}

/// Role asked for at login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedRole {
    Reader,
    Editor(EditorScope),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub user: String,
    pub role: RequestedRole,
}

impl LoginRequest {
    pub fn reader(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            role: RequestedRole::Reader,
        }
    }

    pub fn editor(user: impl Into<String>, scope: EditorScope) -> Self {
        Self {
            user: user.into(),
            role: RequestedRole::Editor(scope),
        }
    }
}

/// Snapshot of who the session is and what it believes it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub role: Role,
    pub scope: EditorScope,
    pub tokens: BTreeMap<Area, LockToken>,
}

/// Result of a login attempt
#[derive(Debug)]
pub enum LoginOutcome {
    Opened(CatalogSession),
    /// Another live session holds the lock of `area`
    Contended {
        scope: EditorScope,
        area: Area,
        holder: LockHolder,
    },
}

impl LoginOutcome {
    pub fn into_session(self) -> Option<CatalogSession> {
        match self {
            LoginOutcome::Opened(session) => Some(session),
            LoginOutcome::Contended { .. } => None,
        }
    }
}

enum Acquisition {
    Held(Vec<(Area, HeldLease)>),
    Contended { area: Area, holder: LockHolder },
}

/// An open session: its stores, router and, for editors, leases and heartbeat
#[derive(Debug)]
pub struct CatalogSession {
    user: String,
    scope: EditorScope,
    router: ScopeRouter,
    leases: Vec<(Area, HeldLease)>,
    heartbeat: Option<HeartbeatHandle>,
}

impl CatalogSession {
    /// Log in as reader or editor
    pub async fn login(config: &Config, request: LoginRequest) -> SessionResult<LoginOutcome> {
        config.validate()?;

        let user = request.user.trim().to_string();
        if user.is_empty() {
            return Err(SessionError::EmptyUser);
        }

        let scope = match request.role {
            RequestedRole::Reader => {
                return Ok(LoginOutcome::Opened(Self::open_reader(config, user).await?));
            }
            RequestedRole::Editor(scope) => scope,
        };

        let paths = config.stores.paths();
        let areas = scope.writable_areas();

        let acquisition = {
            let paths = paths.clone();
            let areas = areas.clone();
            let holder = user.clone();
            let lock = config.lock.clone();
            run_blocking(move || acquire_all(&paths, &areas, &holder, &lock)).await??
        };

        let leases = match acquisition {
            Acquisition::Held(leases) => leases,
            Acquisition::Contended { area, holder } => {
                warn!(
                    user = %user,
                    scope = %scope,
                    area = %area,
                    holder = %holder.holder,
                    age_secs = ?holder.age_secs,
                    "editor lock held by another session"
                );
                return Ok(LoginOutcome::Contended {
                    scope,
                    area,
                    holder,
                });
            }
        };

        let io_timeout = config.lock.io_timeout;
        let opened = {
            let paths = paths.clone();
            run_blocking(move || AreaStores::open(&paths, &areas, io_timeout)).await
        };
        let stores = match opened {
            Ok(Ok(stores)) => stores,
            Ok(Err(e)) => {
                release_all(&leases);
                return Err(e.into());
            }
            Err(e) => {
                release_all(&leases);
                return Err(e);
            }
        };

        let gates = stores
            .iter()
            .filter(|store| !store.is_read_only())
            .map(Store::gate)
            .collect();
        let heartbeat = spawn_heartbeat(
            leases.iter().map(|(_, lease)| lease.clone()).collect(),
            gates,
            config.lock.heartbeat_settings(),
        );

        info!(user = %user, scope = %scope, leases = leases.len(), "editor session opened");

        Ok(LoginOutcome::Opened(Self {
            user,
            scope,
            router: ScopeRouter::new(stores, scope),
            leases,
            heartbeat: Some(heartbeat),
        }))
    }

    /// Open all three stores read-only, without touching any lock
    pub async fn open_reader(config: &Config, user: impl Into<String>) -> SessionResult<Self> {
        let user = user.into().trim().to_string();
        if user.is_empty() {
            return Err(SessionError::EmptyUser);
        }

        let paths = config.stores.paths();
        let io_timeout = config.lock.io_timeout;
        let stores = run_blocking(move || AreaStores::open(&paths, &[], io_timeout)).await??;

        info!(user = %user, "reader session opened");

        Ok(Self {
            user,
            scope: EditorScope::Main,
            router: ScopeRouter::new(stores, EditorScope::Main),
            leases: Vec::new(),
            heartbeat: None,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn scope(&self) -> EditorScope {
        self.scope
    }

    /// `Editor` while at least one store still accepts writes
    pub fn role(&self) -> Role {
        if self.router.stores().iter().any(|store| !store.is_read_only()) {
            Role::Editor
        } else {
            Role::Reader
        }
    }

    pub fn is_writable(&self) -> bool {
        self.role() == Role::Editor
    }

    pub fn session(&self) -> Session {
        Session {
            user: self.user.clone(),
            role: self.role(),
            scope: self.scope,
            tokens: self
                .leases
                .iter()
                .map(|(area, lease)| (*area, lease.grant.token.clone()))
                .collect(),
        }
    }

    pub fn router(&self) -> &ScopeRouter {
        &self.router
    }

    /// Lease state for editors; `None` for readers
    pub fn lease_state(&self) -> Option<LeaseState> {
        self.heartbeat.as_ref().map(HeartbeatHandle::state)
    }

    pub fn lease_events(&self) -> Option<watch::Receiver<LeaseState>> {
        self.heartbeat.as_ref().map(HeartbeatHandle::subscribe)
    }

    /// Stop the heartbeat and release every lease still carrying our token
    pub async fn close(mut self) -> Option<LeaseState> {
        let final_state = match self.heartbeat.take() {
            Some(handle) => Some(handle.stop().await),
            None => None,
        };

        let leases = std::mem::take(&mut self.leases);
        if !leases.is_empty() {
            if let Err(e) = run_blocking(move || release_all(&leases)).await {
                warn!(user = %self.user, error = %e, "lease release did not complete");
            }
        }

        info!(user = %self.user, scope = %self.scope, "session closed");
        final_state
    }
}

/// Bring the area stores into existence, seeding them from the legacy store when empty
pub fn prepare_stores(config: &Config) -> BootstrapReport {
    bootstrap(&config.stores.paths(), config.lock.io_timeout)
}

async fn run_blocking<T, F>(f: F) -> SessionResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| SessionError::Task(e.to_string()))
}

/// Take the lease of every area in order; on contention give back what was taken
fn acquire_all(
    paths: &StorePaths,
    areas: &[Area],
    holder: &str,
    lock: &LockConfig,
) -> SessionResult<Acquisition> {
    let mut held: Vec<(Area, HeldLease)> = Vec::with_capacity(areas.len());

    for &area in areas {
        let attempt = LockManager::open(paths.area(area), lock.io_timeout).and_then(|manager| {
            let outcome = manager.try_acquire(holder, lock.timeout, &lock.lock_key)?;
            Ok((manager, outcome))
        });

        match attempt {
            Ok((manager, AcquireOutcome::Acquired(grant))) => {
                debug!(area = %area, lock_key = %grant.lock_key, "lease taken");
                held.push((area, HeldLease::new(manager, grant)));
            }
            Ok((_, AcquireOutcome::Contended(incumbent))) => {
                release_all(&held);
                return Ok(Acquisition::Contended {
                    area,
                    holder: incumbent,
                });
            }
            Err(e) => {
                release_all(&held);
                return Err(e.into());
            }
        }
    }

    Ok(Acquisition::Held(held))
}

fn release_all(leases: &[(Area, HeldLease)]) {
    for (area, lease) in leases {
        match lease.release() {
            Ok(true) => debug!(area = %area, "lease released"),
            Ok(false) => debug!(area = %area, "lease already gone"),
            Err(e) => warn!(area = %area, error = %e, "failed to release lease"),
        }
    }
}
