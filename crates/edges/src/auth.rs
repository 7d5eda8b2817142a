//! Edge registration authentication.
//!
//! Variants: pre-shared token tables, an accept-anything dev flavor,
//! trust-on-first-use with operator approval, and a composite chain.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use mg_domain::{Error, Result};

/// Constant-time token comparison via SHA-256 digest.
/// Hashing normalizes lengths so ct_eq always compares 32 bytes.
pub fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

/// Validates an edge registration. Returns the authenticated edge id.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        cancel: &CancellationToken,
        edge_id: &str,
        token: &str,
    ) -> Result<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dev
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accepts any token. Local development only.
pub struct DevAuthenticator;

#[async_trait::async_trait]
impl Authenticator for DevAuthenticator {
    async fn authenticate(
        &self,
        _cancel: &CancellationToken,
        edge_id: &str,
        _token: &str,
    ) -> Result<String> {
        Ok(edge_id.to_owned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pre-shared tokens
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-edge pre-shared tokens.
pub struct TokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl TokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait::async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(
        &self,
        _cancel: &CancellationToken,
        edge_id: &str,
        token: &str,
    ) -> Result<String> {
        let Some(expected) = self.tokens.get(edge_id) else {
            return Err(Error::AuthFailed(format!("edge '{edge_id}' not allowed")));
        };
        if token_eq(expected, token) {
            Ok(edge_id.to_owned())
        } else {
            Err(Error::AuthFailed("invalid token".into()))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trust-on-first-use
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct PendingApproval {
    token: String,
    decision_tx: watch::Sender<Option<bool>>,
}

type OnPending = Box<dyn Fn(&str) + Send + Sync>;

/// Trust-on-first-use: an edge's first registration blocks until an
/// operator approves or rejects it. Subsequent registrations of an
/// approved edge compare against the token captured at first contact.
///
/// Caller cancellation while blocked returns immediately and leaves the
/// pending record intact — the operator can still decide later.
pub struct TofuAuthenticator {
    approved: RwLock<HashMap<String, String>>,
    pending: Mutex<HashMap<String, PendingApproval>>,
    on_pending: Option<OnPending>,
}

impl TofuAuthenticator {
    pub fn new() -> Self {
        Self {
            approved: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            on_pending: None,
        }
    }

    /// Invoked (synchronously) whenever a new pending record is created,
    /// so the control surface can notify the operator.
    pub fn with_on_pending(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_pending = Some(Box::new(callback));
        self
    }

    /// Pre-approve an edge with a known token (e.g. restored from config).
    pub fn preapprove(&self, edge_id: impl Into<String>, token: impl Into<String>) {
        self.approved.write().insert(edge_id.into(), token.into());
    }

    /// Edge ids currently awaiting a decision.
    pub fn pending_edges(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Approve a pending edge: its first-contact token becomes the
    /// pre-shared token and all blocked waiters are released.
    pub fn approve(&self, edge_id: &str) -> bool {
        let Some(pending) = self.pending.lock().remove(edge_id) else {
            return false;
        };
        self.approved
            .write()
            .insert(edge_id.to_owned(), pending.token.clone());
        let _ = pending.decision_tx.send(Some(true));
        tracing::info!(edge_id = %edge_id, "edge approved");
        true
    }

    /// Reject a pending edge; blocked waiters fail with a rejection error.
    pub fn reject(&self, edge_id: &str) -> bool {
        let Some(pending) = self.pending.lock().remove(edge_id) else {
            return false;
        };
        let _ = pending.decision_tx.send(Some(false));
        tracing::info!(edge_id = %edge_id, "edge rejected");
        true
    }

    /// Block on the decision channel until approve/reject or cancellation.
    async fn await_decision(
        &self,
        cancel: &CancellationToken,
        edge_id: &str,
        mut rx: watch::Receiver<Option<bool>>,
    ) -> Result<String> {
        loop {
            if let Some(decision) = *rx.borrow() {
                return if decision {
                    Ok(edge_id.to_owned())
                } else {
                    Err(Error::AuthFailed(format!("edge '{edge_id}' rejected")))
                };
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!(
                        "registration of '{edge_id}' cancelled while approval pending"
                    )));
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender gone without a decision.
                        return Err(Error::AuthFailed(format!(
                            "approval for '{edge_id}' abandoned"
                        )));
                    }
                }
            }
        }
    }
}

impl Default for TofuAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Authenticator for TofuAuthenticator {
    async fn authenticate(
        &self,
        cancel: &CancellationToken,
        edge_id: &str,
        token: &str,
    ) -> Result<String> {
        // Already approved: a straight token check.
        if let Some(expected) = self.approved.read().get(edge_id) {
            return if token_eq(expected, token) {
                Ok(edge_id.to_owned())
            } else {
                Err(Error::AuthFailed("invalid token".into()))
            };
        }

        // Join an existing pending record, or create one.
        let (rx, created) = {
            let mut pending = self.pending.lock();
            match pending.get(edge_id) {
                Some(record) => (record.decision_tx.subscribe(), false),
                None => {
                    let (tx, rx) = watch::channel(None);
                    pending.insert(
                        edge_id.to_owned(),
                        PendingApproval {
                            token: token.to_owned(),
                            decision_tx: tx,
                        },
                    );
                    (rx, true)
                }
            }
        };
        if created {
            tracing::info!(edge_id = %edge_id, "first contact, awaiting approval");
            if let Some(callback) = &self.on_pending {
                callback(edge_id);
            }
        }

        self.await_decision(cancel, edge_id, rx).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Composite
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tries each authenticator in order; the first success wins. When every
/// link fails, the last error is returned.
pub struct CompositeAuthenticator {
    chain: Vec<std::sync::Arc<dyn Authenticator>>,
}

impl CompositeAuthenticator {
    pub fn new(chain: Vec<std::sync::Arc<dyn Authenticator>>) -> Self {
        Self { chain }
    }
}

#[async_trait::async_trait]
impl Authenticator for CompositeAuthenticator {
    async fn authenticate(
        &self,
        cancel: &CancellationToken,
        edge_id: &str,
        token: &str,
    ) -> Result<String> {
        let mut last_err = Error::AuthFailed("no authenticators configured".into());
        for auth in &self.chain {
            match auth.authenticate(cancel, edge_id, token).await {
                Ok(id) => return Ok(id),
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn dev_accepts_anything() {
        let auth = DevAuthenticator;
        assert_eq!(
            auth.authenticate(&cancel(), "e1", "whatever").await.unwrap(),
            "e1"
        );
    }

    #[tokio::test]
    async fn token_table_checks_in_constant_time() {
        let mut tokens = HashMap::new();
        tokens.insert("mac1".to_string(), "s3cret".to_string());
        let auth = TokenAuthenticator::new(tokens);

        assert!(auth.authenticate(&cancel(), "mac1", "s3cret").await.is_ok());
        assert!(auth.authenticate(&cancel(), "mac1", "wrong").await.is_err());
        let err = auth
            .authenticate(&cancel(), "stranger", "s3cret")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[tokio::test]
    async fn tofu_blocks_until_approved() {
        let notified = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        let auth = Arc::new(TofuAuthenticator::new().with_on_pending(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        }));

        let auth2 = auth.clone();
        let waiter = tokio::spawn(async move {
            auth2
                .authenticate(&CancellationToken::new(), "pi", "tok")
                .await
        });

        // Give the waiter time to register as pending, then approve.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(auth.pending_edges(), vec!["pi".to_string()]);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(auth.approve("pi"));

        assert_eq!(waiter.await.unwrap().unwrap(), "pi");

        // Approved edges now authenticate against the captured token.
        assert!(auth.authenticate(&cancel(), "pi", "tok").await.is_ok());
        assert!(auth.authenticate(&cancel(), "pi", "other").await.is_err());
    }

    #[tokio::test]
    async fn tofu_rejection_fails_waiters() {
        let auth = Arc::new(TofuAuthenticator::new());
        let auth2 = auth.clone();
        let waiter = tokio::spawn(async move {
            auth2
                .authenticate(&CancellationToken::new(), "rogue", "t")
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(auth.reject("rogue"));

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("rejected"));
        assert!(auth.pending_edges().is_empty());
    }

    #[tokio::test]
    async fn tofu_cancellation_leaves_pending_intact() {
        let auth = Arc::new(TofuAuthenticator::new());
        let token = CancellationToken::new();
        let auth2 = auth.clone();
        let t2 = token.clone();
        let waiter = tokio::spawn(async move { auth2.authenticate(&t2, "pi", "tok").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));

        // The pending record survives for a later decision.
        assert_eq!(auth.pending_edges(), vec!["pi".to_string()]);
        assert!(auth.approve("pi"));
    }

    #[tokio::test]
    async fn second_registration_joins_existing_pending() {
        let notified = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        let auth = Arc::new(TofuAuthenticator::new().with_on_pending(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        }));

        let w1 = {
            let auth = auth.clone();
            tokio::spawn(async move {
                auth.authenticate(&CancellationToken::new(), "pi", "tok").await
            })
        };
        let w2 = {
            let auth = auth.clone();
            tokio::spawn(async move {
                auth.authenticate(&CancellationToken::new(), "pi", "tok").await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        // One pending record, one notification, two blocked waiters.
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        auth.approve("pi");

        assert!(w1.await.unwrap().is_ok());
        assert!(w2.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn composite_short_circuits_and_keeps_last_error() {
        let mut tokens = HashMap::new();
        tokens.insert("known".to_string(), "tok".to_string());

        let chain = CompositeAuthenticator::new(vec![
            Arc::new(TokenAuthenticator::new(tokens)),
            Arc::new(DevAuthenticator),
        ]);
        // First link succeeds.
        assert!(chain.authenticate(&cancel(), "known", "tok").await.is_ok());
        // First link fails, second accepts.
        assert!(chain.authenticate(&cancel(), "other", "x").await.is_ok());

        let strict = CompositeAuthenticator::new(vec![Arc::new(TokenAuthenticator::new(
            HashMap::new(),
        ))]);
        let err = strict.authenticate(&cancel(), "e", "t").await.unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }
}
