//! Expired-token recovery against a live server.

mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use dualfetch_client::{FailureKind, RefreshPhase, RequestDescriptor, RequestOptions, TokenStore};
use serde_json::Value;
use support::{Recorder, ServerState, TestServer, backends, init_tracing, stale_tokens};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_expiries_share_one_refresh() {
    init_tracing();
    for backend in backends() {
        let server = TestServer::start().await;
        let tokens = stale_tokens();
        let client = server.refreshing_client(backend.clone(), tokens.clone(), None);

        let calls = (0..3).map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get::<Value>(RequestDescriptor::new("/protected"), RequestOptions::new())
                    .await
            })
        });
        let results = futures::future::join_all(calls).await;

        for result in results {
            let value = result.unwrap().unwrap();
            assert_eq!(value["secret"], 42, "{backend}");
        }
        assert_eq!(server.state.refreshes(), 1, "{backend}");
        assert_eq!(server.state.protected_hits(), 6, "{backend}");

        let authorizations = server.state.authorizations.lock().unwrap().clone();
        assert_eq!(
            authorizations.iter().filter(|a| *a == "Bearer fresh").count(),
            3,
            "{backend}"
        );
        assert_eq!(
            server.state.refresh_tokens.lock().unwrap().as_slice(),
            &[Some("r1".to_string())],
            "{backend}"
        );

        assert_eq!(tokens.access_token().as_deref(), Some("fresh"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("r2"));

        let coordinator = client.coordinator().unwrap();
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.waiting(), 0);
        assert_eq!(coordinator.refresh_count(), 1);
    }
}

#[tokio::test]
async fn test_http_401_triggers_refresh() {
    for backend in backends() {
        let server = TestServer::start().await;
        let client = server.refreshing_client(backend.clone(), stale_tokens(), None);

        let value: Value = client
            .get(RequestDescriptor::new("/protected-status"), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(value["secret"], 42, "{backend}");
        assert_eq!(server.state.refreshes(), 1, "{backend}");
        assert_eq!(server.state.protected_hits(), 2, "{backend}");
    }
}

#[tokio::test]
async fn test_persistent_401_is_replayed_only_once() {
    for backend in backends() {
        let server = TestServer::start().await;
        let client = server.refreshing_client(backend.clone(), stale_tokens(), None);

        let err = client
            .get::<Value>(
                RequestDescriptor::new("/always-unauthorized"),
                RequestOptions::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::AuthExpired, "{backend}");
        assert_eq!(server.state.refreshes(), 1, "{backend}");
        assert_eq!(server.state.protected_hits(), 2, "{backend}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_refresh_rejects_every_waiter() {
    for backend in backends() {
        let state = ServerState::default();
        state.fail_refresh.store(true, Ordering::SeqCst);
        let server = TestServer::with_state(state).await;
        let tokens = stale_tokens();
        let recorder = Arc::new(Recorder::default());
        let client =
            server.refreshing_client(backend.clone(), tokens.clone(), Some(recorder.clone()));

        let calls = (0..3).map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get::<Value>(RequestDescriptor::new("/protected"), RequestOptions::new())
                    .await
            })
        });
        for result in futures::future::join_all(calls).await {
            let err = result.unwrap().unwrap_err();
            assert_eq!(err.kind(), FailureKind::AuthExpired, "{backend}");
        }

        assert_eq!(server.state.refreshes(), 1, "{backend}");
        assert_eq!(server.state.protected_hits(), 3, "{backend}");
        assert!(tokens.access_token().is_none(), "{backend}");

        let expired = recorder
            .events()
            .into_iter()
            .filter(|event| event.starts_with("expired:"))
            .count();
        assert_eq!(expired, 1, "{backend}");
        assert_eq!(client.coordinator().unwrap().phase(), RefreshPhase::Idle);
    }
}

#[tokio::test]
async fn test_with_token_false_sends_no_authorization() {
    let server = TestServer::start().await;
    for backend in backends() {
        let client = server.refreshing_client(backend.clone(), stale_tokens(), None);

        let echoed: Value = client
            .get(RequestDescriptor::new("/echo"), RequestOptions::new().with_token(false))
            .await
            .unwrap();
        assert_eq!(echoed["authorization"], Value::Null, "{backend}");

        let echoed: Value = client
            .get(
                RequestDescriptor::new("/echo"),
                RequestOptions::new().authentication_scheme(""),
            )
            .await
            .unwrap();
        assert_eq!(echoed["authorization"], "stale", "{backend}");
    }
}
