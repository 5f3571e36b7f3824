//! Superseding and bulk cancellation of in-flight calls on the rich backend.

mod support;

use std::time::Duration;

use dualfetch_client::{BackendHandle, RequestDescriptor, RequestOptions};
use serde_json::Value;
use support::TestServer;

#[tokio::test]
async fn test_identical_call_supersedes_in_flight_one() {
    let server = TestServer::start().await;
    let client = server.client(BackendHandle::rich());
    let options = || RequestOptions::new().ignore_cancel_token(false);

    let first = {
        let client = client.clone();
        let options = options();
        tokio::spawn(async move {
            client
                .get::<Value>(RequestDescriptor::new("/slow"), options)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second: Value = client
        .get(RequestDescriptor::new("/slow"), options())
        .await
        .unwrap();
    assert_eq!(second, "slow");

    let err = first.await.unwrap().unwrap_err();
    assert!(err.is_aborted());
}

#[tokio::test]
async fn test_distinct_params_do_not_supersede() {
    let server = TestServer::start().await;
    let client = server.client(BackendHandle::rich());

    let calls = (0..2).map(|page| {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get::<Value>(
                    RequestDescriptor::new("/slow").param("page", page),
                    RequestOptions::new().ignore_cancel_token(false),
                )
                .await
        })
    });
    for result in futures::future::join_all(calls).await {
        assert_eq!(result.unwrap().unwrap(), "slow");
    }
}

#[tokio::test]
async fn test_ignored_cancel_token_keeps_both_calls() {
    let server = TestServer::start().await;
    let client = server.client(BackendHandle::rich());

    let calls = (0..2).map(|_| {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get::<Value>(RequestDescriptor::new("/slow"), RequestOptions::new())
                .await
        })
    });
    for result in futures::future::join_all(calls).await {
        assert!(result.unwrap().is_ok());
    }
}

#[tokio::test]
async fn test_cancel_all_pending() {
    let server = TestServer::start().await;
    let client = server.client(BackendHandle::rich());

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get::<Value>(RequestDescriptor::new("/slow"), RequestOptions::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.cancel_all_pending(), 1);
    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(client.cancel_all_pending(), 0);
}
