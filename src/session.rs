//! SDK connection state.
//!
//! At most one SDK-integrated app is connected at a time. The connection is
//! held in a single `Option` slot, so "connected" and "target URL" can never
//! disagree; mutations are additionally serialized so two concurrent
//! `connect`/`disconnect` calls cannot interleave their runner calls.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::client::{Backend, BackendRequest};
use crate::error::{Error, Result};

/// Runner endpoint that attaches to an SDK app.
pub const CONNECT_PATH: &str = "/ui-bridge/sdk/connect";

/// Runner endpoint that detaches from the SDK app.
pub const DISCONNECT_PATH: &str = "/ui-bridge/sdk/disconnect";

/// An established SDK connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdkConnection {
    /// Local identifier, fresh for every successful connect.
    pub connection_id: Uuid,
    /// URL of the connected app; never empty.
    pub target_url: String,
    /// When the runner accepted the connection.
    pub connected_at: DateTime<Utc>,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Whether an SDK app is connected.
    pub connected: bool,
    /// URL of the connected app.
    pub target_url: Option<String>,
    /// Identifier of the current connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<Uuid>,
    /// When the current connection was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

impl From<Option<&SdkConnection>> for SessionStatus {
    fn from(connection: Option<&SdkConnection>) -> Self {
        match connection {
            Some(c) => Self {
                connected: true,
                target_url: Some(c.target_url.clone()),
                connection_id: Some(c.connection_id),
                connected_at: Some(c.connected_at),
            },
            None => Self {
                connected: false,
                target_url: None,
                connection_id: None,
                connected_at: None,
            },
        }
    }
}

/// Result of a successful connect.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    /// The new connection.
    pub connection: SdkConnection,
    /// Runner's answer to the connect call, untouched.
    pub runner: Value,
}

/// Result of a disconnect. Local state is cleared either way.
#[derive(Debug)]
pub struct DisconnectOutcome {
    /// Connection that was cleared, if there was one.
    pub previous: Option<SdkConnection>,
    /// Runner's answer to the teardown call.
    pub teardown: Result<Value>,
}

/// Process-wide SDK session.
#[derive(Debug, Default)]
pub struct SessionState {
    slot: RwLock<Option<SdkConnection>>,
    transition: Mutex<()>,
}

impl SessionState {
    /// Create a disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status. Pure read, no I/O.
    pub async fn status(&self) -> SessionStatus {
        SessionStatus::from(self.slot.read().await.as_ref())
    }

    /// The active connection, or [`Error::NoActiveConnection`].
    pub async fn require_connected(&self) -> Result<SdkConnection> {
        self.slot
            .read()
            .await
            .clone()
            .ok_or(Error::NoActiveConnection)
    }

    /// Connect to the app at `url`.
    ///
    /// The runner is asked to attach first; state only changes once it
    /// accepts. Connecting again to the current URL refreshes the connection,
    /// while a different URL requires a disconnect first.
    pub async fn connect(&self, backend: &dyn Backend, url: &str) -> Result<ConnectOutcome> {
        if url.trim().is_empty() {
            return Err(Error::InvalidArguments("url must not be empty".into()));
        }
        // Stored verbatim, so status reports exactly what was asked for.
        if url.trim() != url {
            return Err(Error::InvalidArguments(
                "url must not have leading or trailing whitespace".into(),
            ));
        }

        let _transition = self.transition.lock().await;

        if let Some(current) = self.slot.read().await.as_ref() {
            if current.target_url != url {
                return Err(Error::InvalidArguments(format!(
                    "already connected to {}; call sdk_disconnect before connecting to {url}",
                    current.target_url
                )));
            }
        }

        let response = backend
            .request(BackendRequest::post(CONNECT_PATH, json!({ "url": url })))
            .await?;

        let connection = SdkConnection {
            connection_id: Uuid::new_v4(),
            target_url: url.to_owned(),
            connected_at: Utc::now(),
        };
        *self.slot.write().await = Some(connection.clone());

        tracing::info!(
            target_url = %connection.target_url,
            connection_id = %connection.connection_id,
            "SDK app connected"
        );

        Ok(ConnectOutcome {
            connection,
            runner: response.body,
        })
    }

    /// Disconnect from the current app.
    ///
    /// Local state is cleared before the runner is told, so a failing or
    /// hanging runner can never leave the agent stuck with a session.
    pub async fn disconnect(&self, backend: &dyn Backend) -> DisconnectOutcome {
        let _transition = self.transition.lock().await;

        let previous = self.slot.write().await.take();
        if let Some(ref previous) = previous {
            tracing::info!(target_url = %previous.target_url, "SDK app disconnected");
        }

        let teardown = backend
            .request(BackendRequest::post(DISCONNECT_PATH, json!({})))
            .await
            .map(|response| response.body);

        if let Err(ref e) = teardown {
            tracing::warn!(error = %e, "Runner teardown failed; local session cleared anyway");
        }

        DisconnectOutcome { previous, teardown }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::client::fake::FakeBackend;
    use crate::client::BackendResponse;

    fn refusing() -> FakeBackend {
        FakeBackend::with(|req| {
            Err(Error::BackendUnreachable {
                url: req.path.clone(),
                reason: "connection refused".into(),
            })
        })
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let session = SessionState::new();
        let status = session.status().await;
        assert!(!status.connected);
        assert_eq!(status.target_url, None);
        assert!(matches!(
            session.require_connected().await,
            Err(Error::NoActiveConnection)
        ));
    }

    #[tokio::test]
    async fn connect_asks_runner_then_commits() {
        let session = SessionState::new();
        let backend = FakeBackend::ok(json!({"success": true}));

        let outcome = assert_ok!(session.connect(&backend, "http://localhost:3001").await);
        assert_eq!(outcome.runner, json!({"success": true}));

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, CONNECT_PATH);
        assert_eq!(requests[0].body, Some(json!({"url": "http://localhost:3001"})));

        let status = session.status().await;
        assert!(status.connected);
        assert_eq!(status.target_url.as_deref(), Some("http://localhost:3001"));
        assert_eq!(status.connection_id, Some(outcome.connection.connection_id));
    }

    #[tokio::test]
    async fn failed_connect_leaves_state_unchanged() {
        let session = SessionState::new();
        assert_err!(session.connect(&refusing(), "http://localhost:3001").await);
        assert!(!session.status().await.connected);

        // Re-probing the current target and failing keeps the old connection.
        assert_ok!(
            session
                .connect(&FakeBackend::ok(json!({})), "http://localhost:3001")
                .await
        );
        let before = session.status().await;
        let failing = FakeBackend::with(|_| {
            Err(Error::BackendError {
                status: 500,
                body: "sdk not found".into(),
            })
        });
        assert_err!(session.connect(&failing, "http://localhost:3001").await);
        assert_eq!(session.status().await, before);
    }

    #[tokio::test]
    async fn switching_targets_requires_disconnect() {
        let session = SessionState::new();
        let backend = FakeBackend::ok(json!({}));
        assert_ok!(session.connect(&backend, "http://localhost:3001").await);

        let err = session
            .connect(&backend, "http://localhost:4000")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
        assert_eq!(backend.request_count(), 1, "no runner call for a rejected switch");

        session.disconnect(&backend).await;
        assert_ok!(session.connect(&backend, "http://localhost:4000").await);
        assert_eq!(
            session.status().await.target_url.as_deref(),
            Some("http://localhost:4000")
        );
    }

    #[tokio::test]
    async fn empty_url_is_rejected_locally() {
        let session = SessionState::new();
        let backend = FakeBackend::ok(json!({}));
        let err = session.connect(&backend, "   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn padded_url_is_rejected_not_rewritten() {
        let session = SessionState::new();
        let backend = FakeBackend::ok(json!({"success": true}));
        let err = session
            .connect(&backend, " http://localhost:3001\n")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(ref m) if m.contains("whitespace")));
        assert_eq!(backend.request_count(), 0);
        assert!(!session.status().await.connected);

        assert_ok!(session.connect(&backend, "http://localhost:3001/app?x=1").await);
        assert_eq!(
            session.status().await.target_url.as_deref(),
            Some("http://localhost:3001/app?x=1")
        );
    }

    #[tokio::test]
    async fn disconnect_clears_even_when_teardown_fails() {
        let session = SessionState::new();
        assert_ok!(
            session
                .connect(&FakeBackend::ok(json!({})), "http://localhost:3001")
                .await
        );

        let outcome = session.disconnect(&refusing()).await;
        assert!(outcome.teardown.is_err());
        assert_eq!(
            outcome.previous.map(|c| c.target_url).as_deref(),
            Some("http://localhost:3001")
        );

        let status = session.status().await;
        assert!(!status.connected);
        assert_eq!(status.target_url, None);
    }

    #[tokio::test]
    async fn disconnect_when_idle_still_tells_runner() {
        let session = SessionState::new();
        let backend = FakeBackend::ok(json!({"success": true}));
        let outcome = session.disconnect(&backend).await;
        assert!(outcome.previous.is_none());
        assert_eq!(backend.requests()[0].path, DISCONNECT_PATH);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads_never_see_torn_state() {
        let session = Arc::new(SessionState::new());
        let backend = Arc::new(
            FakeBackend::with(|_| {
                Ok(BackendResponse {
                    status: 200,
                    body: json!({}),
                })
            })
            .delayed(Duration::from_millis(1)),
        );

        let writer = {
            let session = Arc::clone(&session);
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                for _ in 0..50 {
                    session
                        .connect(backend.as_ref(), "http://localhost:3001")
                        .await
                        .unwrap();
                    session.disconnect(backend.as_ref()).await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let status = session.status().await;
                        assert_eq!(status.connected, status.target_url.is_some());
                        if let Some(url) = status.target_url {
                            assert!(!url.is_empty());
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in futures::future::join_all(readers).await {
            reader.unwrap();
        }
    }
}
