//! Credential and access-token lifecycle.
//!
//! [`TokenManager`] owns the app credential, hands out cached access tokens while they are
//! fresh and refreshes them through a [`TokenAuthority`] when they are not. Concurrent callers
//! that miss the cache share one in-flight refresh.
//!
//! ```text
//! get_token ──► fresh cached token? ──yes──► return it (no I/O)
//!                      │ no
//!                      ▼
//!               refresh pending? ──yes──► await the shared refresh
//!                      │ no
//!                      ▼
//!               spawn refresh task ──► authority ──► cache + persist (same generation only)
//! ```
//!
//! Every credential change or clear bumps a generation counter. A refresh started under an
//! older generation still resolves its own waiters but never writes its token to the cache or
//! the store.

use crate::credentials::{AccessToken, Credential, CredentialStore};
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub mod authority;
mod error;


pub use authority::{IssuedToken, TokenAuthority, WechatTokenAuthority};
pub use error::AuthError;

/// Default margin before hard expiry at which a token stops being handed out.
pub const DEFAULT_REFRESH_SKEW_SECONDS: i64 = 300;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<AccessToken, AuthError>>>;

struct PendingRefresh {
    generation: u64,
    future: SharedRefresh,
}

#[derive(Default)]
struct ManagerState {
    credential: Option<Credential>,
    cached: Option<AccessToken>,
    pending: Option<PendingRefresh>,
    generation: u64,
}

impl ManagerState {
    fn is_configured(&self) -> bool {
        self.credential.as_ref().is_some_and(Credential::is_complete)
    }

    /// Forgets the cached token and detaches any in-flight refresh.
    fn invalidate(&mut self) {
        self.cached = None;
        self.pending = None;
        self.generation += 1;
    }
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    authority: Arc<dyn TokenAuthority>,
    clock: Arc<dyn Clock>,
    refresh_skew: Duration,
    state: Mutex<ManagerState>,
}

/// Outcome of the synchronous part of `get_token` / `refresh_token`.
enum Ticket {
    Ready(AccessToken),
    Wait(SharedRefresh),
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins the pending refresh or starts a new one. Caller holds the state lock.
    fn join_or_start(
        self: &Arc<Self>,
        state: &mut ManagerState,
    ) -> Result<SharedRefresh, AuthError> {
        if let Some(pending) = &state.pending {
            debug!(generation = pending.generation, "Joining in-flight token refresh");
            return Ok(pending.future.clone());
        }

        let credential = state
            .credential
            .clone()
            .filter(Credential::is_complete)
            .ok_or(AuthError::NotConfigured)?;
        let generation = state.generation;

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move { inner.run_refresh(credential, generation).await });

        let future = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(AuthError::Transport(format!("Token refresh task failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        state.pending = Some(PendingRefresh {
            generation,
            future: future.clone(),
        });
        Ok(future)
    }

    /// Fetches a token and, if the credential is unchanged, caches and persists it.
    ///
    /// The store write happens under the state lock so that a credential change cannot land
    /// between caching the token and persisting it. Readers on the fast path wait for that one
    /// single-row transaction.
    async fn run_refresh(
        self: Arc<Self>,
        credential: Credential,
        generation: u64,
    ) -> Result<AccessToken, AuthError> {
        let outcome = self
            .authority
            .fetch_token(&credential.app_id, &credential.app_secret)
            .await;

        let mut state = self.lock();
        let current = state.generation == generation;
        if current {
            state.pending = None;
        }

        let issued = match outcome {
            Ok(issued) => issued,
            Err(e) => {
                warn!(app_id = %credential.app_id, error = %e, "Token refresh failed");
                return Err(e);
            }
        };

        let token = AccessToken::issued(issued.value, self.clock.now(), issued.ttl_seconds);

        if !current {
            info!(
                app_id = %credential.app_id,
                "Credential changed during refresh, discarding fetched token"
            );
            return Ok(token);
        }

        state.cached = Some(token.clone());
        self.store.set_token(&token).map_err(|e| {
            warn!(error = %e, "Failed to persist access token");
            AuthError::store(e)
        })?;

        info!(
            app_id = %credential.app_id,
            expires_at = %token.expires_at,
            "Access token refreshed"
        );
        Ok(token)
    }
}

/// Owns the app credential and the cached access token.
///
/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        authority: Arc<dyn TokenAuthority>,
        refresh_skew: Duration,
    ) -> Self {
        Self::with_clock(store, authority, refresh_skew, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CredentialStore>,
        authority: Arc<dyn TokenAuthority>,
        refresh_skew: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                authority,
                clock,
                refresh_skew,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// Loads the credential and the last persisted token from the store.
    ///
    /// A token row left without a credential is deleted. Never contacts the authority.
    pub fn initialize(&self) -> Result<(), AuthError> {
        let mut state = self.inner.lock();
        let credential = self.inner.store.get_credential().map_err(AuthError::store)?;
        let cached = match &credential {
            Some(_) => self.inner.store.get_token().map_err(AuthError::store)?,
            None => None,
        };

        match &credential {
            Some(credential) => info!(
                app_id = %credential.app_id,
                has_token = cached.is_some(),
                "Loaded stored credential"
            ),
            None => {
                info!("No stored credential");
                self.inner.store.clear_token().map_err(AuthError::store)?;
            }
        }

        state.credential = credential;
        state.cached = cached;
        Ok(())
    }

    /// Replaces the credential.
    ///
    /// The store write (credential plus token delete) happens first; if it fails nothing in
    /// memory changes. On success the cached token is dropped and any in-flight refresh is
    /// detached so its result is never cached.
    pub fn set_credential(&self, credential: Credential) -> Result<(), AuthError> {
        if credential.app_id.trim().is_empty() {
            return Err(AuthError::InvalidCredential(
                "appId must not be empty".to_string(),
            ));
        }
        if credential.app_secret.trim().is_empty() {
            return Err(AuthError::InvalidCredential(
                "appSecret must not be empty".to_string(),
            ));
        }

        let mut state = self.inner.lock();
        self.inner
            .store
            .set_credential(&credential)
            .map_err(AuthError::store)?;

        info!(app_id = %credential.app_id, "Credential updated");
        state.credential = Some(credential);
        state.invalidate();
        Ok(())
    }

    /// Current credential, read from the store when memory holds none.
    pub fn get_credential(&self) -> Result<Option<Credential>, AuthError> {
        let mut state = self.inner.lock();
        if state.credential.is_none() {
            state.credential = self.inner.store.get_credential().map_err(AuthError::store)?;
        }
        Ok(state.credential.clone())
    }

    /// Returns a token that stays valid for at least the refresh skew.
    pub async fn get_token(&self) -> Result<AccessToken, AuthError> {
        let ticket = {
            let mut state = self.inner.lock();
            if !state.is_configured() {
                return Err(AuthError::NotConfigured);
            }

            let now = self.inner.clock.now();
            let fresh = state
                .cached
                .as_ref()
                .filter(|token| token.is_fresh(now, self.inner.refresh_skew))
                .cloned();
            match fresh {
                Some(token) => Ticket::Ready(token),
                None => Ticket::Wait(self.inner.join_or_start(&mut state)?),
            }
        };

        match ticket {
            Ticket::Ready(token) => Ok(token),
            Ticket::Wait(refresh) => refresh.await,
        }
    }

    /// Fetches a new token regardless of the cached one, sharing any refresh already in flight.
    pub async fn refresh_token(&self) -> Result<AccessToken, AuthError> {
        let refresh = {
            let mut state = self.inner.lock();
            self.inner.join_or_start(&mut state)?
        };
        refresh.await
    }

    pub fn is_configured(&self) -> bool {
        self.inner.lock().is_configured()
    }

    /// Removes the credential and token from memory and store.
    pub fn clear(&self) -> Result<(), AuthError> {
        let mut state = self.inner.lock();
        self.inner
            .store
            .clear_credential()
            .map_err(AuthError::store)?;

        info!("Credential cleared");
        state.credential = None;
        state.invalidate();
        Ok(())
    }

    /// Cached token without triggering a refresh, fresh or not.
    pub fn cached_token(&self) -> Option<AccessToken> {
        self.inner.lock().cached.clone()
    }

    pub fn refresh_skew(&self) -> Duration {
        self.inner.refresh_skew
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }
}
