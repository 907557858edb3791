//! Remote context-sync session.
//!
//! The remote service is an opaque key-value store addressed by
//! workspace id; only its token discipline matters here. Refresh tokens
//! are single-use, so the refresh is a mutex-guarded one-shot: the
//! first caller hitting `AuthExpired` performs the refresh, concurrent
//! callers block and share its result, and a second expiry after a
//! consumed refresh surfaces as "reconnect required".

use crate::error::{Result, SyncError};
use std::sync::{Arc, Condvar, Mutex};
use tracing::{debug, warn};

/// Network deadline for remote calls, in seconds.
pub const FETCH_DEADLINE_SECS: u64 = 15;

/// A fresh access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Single-use refresh token.
    pub refresh_token: String,
}

/// Transport to the remote store. Implementations enforce the
/// [`FETCH_DEADLINE_SECS`] deadline themselves.
pub trait SyncTransport: Send + Sync {
    /// Fetches the context value for a workspace.
    fn fetch(&self, workspace_id: &str, access_token: &str) -> Result<Option<String>>;

    /// Pushes the context value for a workspace.
    fn push(&self, workspace_id: &str, access_token: &str, value: &str) -> Result<()>;

    /// Exchanges a refresh token for a new pair. Consumes the token.
    fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}

#[derive(Debug)]
enum RefreshPhase {
    /// No refresh attempted yet.
    Idle,
    /// A refresh is in flight; waiters block on the condvar.
    InFlight,
    /// The one refresh completed (successfully or not).
    Done(std::result::Result<(), String>),
}

#[derive(Debug)]
struct Tokens {
    access: String,
    refresh: String,
}

/// Authenticated session over a [`SyncTransport`].
pub struct SyncSession {
    transport: Arc<dyn SyncTransport>,
    tokens: Mutex<Tokens>,
    phase: Mutex<RefreshPhase>,
    phase_changed: Condvar,
}

impl SyncSession {
    /// Creates a session with initial tokens.
    pub fn new(transport: Arc<dyn SyncTransport>, initial: TokenPair) -> Self {
        Self {
            transport,
            tokens: Mutex::new(Tokens {
                access: initial.access_token,
                refresh: initial.refresh_token,
            }),
            phase: Mutex::new(RefreshPhase::Idle),
            phase_changed: Condvar::new(),
        }
    }

    fn access_token(&self) -> String {
        match self.tokens.lock() {
            Ok(tokens) => tokens.access.clone(),
            Err(poisoned) => poisoned.into_inner().access.clone(),
        }
    }

    /// Fetches the workspace context value, refreshing once on expiry.
    pub fn fetch(&self, workspace_id: &str) -> Result<Option<String>> {
        match self.transport.fetch(workspace_id, &self.access_token()) {
            Err(crate::error::Error::Sync(SyncError::AuthExpired)) => {
                self.refresh_shared()?;
                self.transport
                    .fetch(workspace_id, &self.access_token())
                    .map_err(reconnect_on_expiry)
            }
            other => other,
        }
    }

    /// Pushes the workspace context value, refreshing once on expiry.
    pub fn push(&self, workspace_id: &str, value: &str) -> Result<()> {
        match self.transport.push(workspace_id, &self.access_token(), value) {
            Err(crate::error::Error::Sync(SyncError::AuthExpired)) => {
                self.refresh_shared()?;
                self.transport
                    .push(workspace_id, &self.access_token(), value)
                    .map_err(reconnect_on_expiry)
            }
            other => other,
        }
    }

    /// One-shot shared refresh: at most one in-flight; everyone gets
    /// the same result; a second expiry after completion means the
    /// session is gone.
    fn refresh_shared(&self) -> Result<()> {
        let mut phase = match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        loop {
            match &*phase {
                RefreshPhase::Idle => {
                    *phase = RefreshPhase::InFlight;
                    break;
                }
                RefreshPhase::InFlight => {
                    debug!("awaiting in-flight token refresh");
                    phase = match self.phase_changed.wait(phase) {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
                RefreshPhase::Done(result) => {
                    // The single refresh is spent; share its result. A
                    // retry that still sees an expired token maps to
                    // "reconnect required" at the call site.
                    return match result {
                        Ok(()) => Ok(()),
                        Err(message) => Err(SyncError::Remote(message.clone()).into()),
                    };
                }
            }
        }
        drop(phase);

        let refresh_token = match self.tokens.lock() {
            Ok(tokens) => tokens.refresh.clone(),
            Err(poisoned) => poisoned.into_inner().refresh.clone(),
        };
        let outcome = self.transport.refresh(&refresh_token);

        let summary = match &outcome {
            Ok(pair) => {
                if let Ok(mut tokens) = self.tokens.lock() {
                    tokens.access.clone_from(&pair.access_token);
                    tokens.refresh.clone_from(&pair.refresh_token);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                Err(e.to_string())
            }
        };

        let mut phase = match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *phase = RefreshPhase::Done(summary.clone());
        self.phase_changed.notify_all();
        drop(phase);

        summary.map_err(|message| SyncError::Remote(message).into())
    }
}

fn reconnect_on_expiry(err: crate::error::Error) -> crate::error::Error {
    match err {
        crate::error::Error::Sync(SyncError::AuthExpired) => SyncError::ReconnectRequired.into(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory transport whose access tokens expire on demand.
    struct FakeTransport {
        store: Mutex<HashMap<String, String>>,
        valid_access: Mutex<String>,
        refresh_calls: AtomicU32,
        refresh_succeeds: bool,
    }

    impl FakeTransport {
        fn new(valid_access: &str) -> Self {
            Self {
                store: Mutex::new(HashMap::new()),
                valid_access: Mutex::new(valid_access.to_string()),
                refresh_calls: AtomicU32::new(0),
                refresh_succeeds: true,
            }
        }

        fn expire(&self, new_valid: &str) {
            *self.valid_access.lock().unwrap() = new_valid.to_string();
        }
    }

    impl SyncTransport for FakeTransport {
        fn fetch(&self, workspace_id: &str, access_token: &str) -> Result<Option<String>> {
            if *self.valid_access.lock().unwrap() != access_token {
                return Err(SyncError::AuthExpired.into());
            }
            Ok(self.store.lock().unwrap().get(workspace_id).cloned())
        }

        fn push(&self, workspace_id: &str, access_token: &str, value: &str) -> Result<()> {
            if *self.valid_access.lock().unwrap() != access_token {
                return Err(SyncError::AuthExpired.into());
            }
            self.store
                .lock()
                .unwrap()
                .insert(workspace_id.to_string(), value.to_string());
            Ok(())
        }

        fn refresh(&self, _refresh_token: &str) -> Result<TokenPair> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_succeeds {
                Ok(TokenPair {
                    access_token: "access-2".to_string(),
                    refresh_token: "refresh-2".to_string(),
                })
            } else {
                Err(SyncError::Remote("refresh rejected".to_string()).into())
            }
        }
    }

    fn session(transport: Arc<FakeTransport>) -> SyncSession {
        SyncSession::new(
            transport,
            TokenPair {
                access_token: "access-1".to_string(),
                refresh_token: "refresh-1".to_string(),
            },
        )
    }

    #[test]
    fn test_fetch_push_roundtrip() {
        let transport = Arc::new(FakeTransport::new("access-1"));
        let session = session(Arc::clone(&transport));

        assert_eq!(session.fetch("ws-1").unwrap(), None);
        session.push("ws-1", "context-blob").unwrap();
        assert_eq!(session.fetch("ws-1").unwrap().as_deref(), Some("context-blob"));
    }

    #[test]
    fn test_expiry_triggers_single_refresh() {
        let transport = Arc::new(FakeTransport::new("access-1"));
        let session = session(Arc::clone(&transport));
        session.push("ws-1", "v").unwrap();

        // Expire the first token; the next fetch refreshes and retries.
        transport.expire("access-2");
        assert_eq!(session.fetch("ws-1").unwrap().as_deref(), Some("v"));
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);

        // Further calls use the new token with no extra refresh.
        assert!(session.fetch("ws-1").is_ok());
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_expiry_requires_reconnect() {
        let transport = Arc::new(FakeTransport::new("access-1"));
        let session = session(Arc::clone(&transport));

        transport.expire("access-2");
        session.fetch("ws-1").unwrap();

        // Expire the refreshed token too: the one-shot is spent.
        transport.expire("access-3");
        let err = session.fetch("ws-1").unwrap_err();
        assert!(err.to_string().contains("reconnect"));
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_refresh() {
        let transport = Arc::new(FakeTransport::new("access-1"));
        let session = Arc::new(session(Arc::clone(&transport)));
        transport.expire("access-2");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = Arc::clone(&session);
            handles.push(std::thread::spawn(move || session.fetch("ws-1").is_ok()));
        }
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_refresh_propagates_to_all() {
        let transport = Arc::new(FakeTransport {
            refresh_succeeds: false,
            ..FakeTransport::new("access-1")
        });
        let session = session(Arc::clone(&transport));
        transport.expire("other");

        let err = session.fetch("ws-1").unwrap_err();
        assert!(err.to_string().contains("refresh rejected"));

        // The failure is remembered; no second refresh attempt.
        let err = session.fetch("ws-1").unwrap_err();
        assert!(err.to_string().contains("refresh rejected"));
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
    }
}
