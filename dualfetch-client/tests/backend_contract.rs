//! Behavior every backend must share.
//!
//! Each test runs the same call through both built-in backends and expects
//! the same observable result.

mod support;

use std::time::Duration;

use dualfetch_client::{
    AesGcmEncryptor, BackendHandle, ClientError, FailureKind, Reply, RequestDescriptor,
    RequestOptions, ResponseType, TransportReason,
};
use http::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use support::{TestServer, backends, init_tracing};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u64,
    name: String,
}

#[tokio::test]
async fn test_envelope_unwrap_to_typed() {
    init_tracing();
    let server = TestServer::start().await;
    for backend in backends() {
        let user: User = server
            .client(backend.clone())
            .get(RequestDescriptor::new("/users/7"), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(
            user,
            User {
                id: 7,
                name: "user-7".into()
            },
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_backend_override_per_call() {
    let server = TestServer::start().await;
    let client = server.client(BackendHandle::rich());
    for backend in backends() {
        let user: User = client
            .get(
                RequestDescriptor::new("/users/1"),
                RequestOptions::new().backend(backend.clone()),
            )
            .await
            .unwrap();
        assert_eq!(user.id, 1, "{backend}");
    }
}

#[tokio::test]
async fn test_query_params_and_join_time() {
    let server = TestServer::start().await;
    for backend in backends() {
        let client = server.client(backend.clone());

        let echoed: Value = client
            .get(
                RequestDescriptor::new("/echo").param("q", "rust").param("page", 2),
                RequestOptions::new().join_time(false),
            )
            .await
            .unwrap();
        assert_eq!(echoed["method"], "GET", "{backend}");
        assert_eq!(echoed["query"], "page=2&q=rust", "{backend}");

        let echoed: Value = client
            .get(RequestDescriptor::new("/echo"), RequestOptions::new())
            .await
            .unwrap();
        assert!(
            echoed["query"].as_str().unwrap().starts_with("_t="),
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_post_params_move_into_body() {
    let server = TestServer::start().await;
    for backend in backends() {
        let echoed: Value = server
            .client(backend.clone())
            .post(
                RequestDescriptor::new("/echo").param("page", 1),
                RequestOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(echoed["method"], "POST", "{backend}");
        assert_eq!(echoed["body"], r#"{"page":1}"#, "{backend}");
        assert_eq!(echoed["contentType"], "application/json", "{backend}");
        assert_eq!(echoed["encrypted"], "0", "{backend}");
    }
}

#[tokio::test]
async fn test_headers_merge_across_layers() {
    let server = TestServer::start().await;
    for backend in backends() {
        let client = server.client(backend.clone());
        let echoed: Value = client
            .put(
                RequestDescriptor::new("/echo").json(&json!({"a": 1})).unwrap(),
                RequestOptions::new().header("x-tenant", "acme"),
            )
            .await
            .unwrap();
        assert_eq!(echoed["method"], "PUT", "{backend}");
        assert_eq!(echoed["tenant"], "acme", "{backend}");
        assert_eq!(echoed["authorization"], Value::Null, "{backend}");
    }
}

#[tokio::test]
async fn test_encrypted_body() {
    let server = TestServer::start().await;
    for backend in backends() {
        let echoed: Value = server
            .client(backend.clone())
            .post(
                RequestDescriptor::new("/echo")
                    .json(&json!({"password": "hunter2"}))
                    .unwrap(),
                RequestOptions::new().encrypt(true),
            )
            .await
            .unwrap();
        assert_eq!(echoed["encrypted"], "1", "{backend}");
        assert!(
            echoed["contentType"].as_str().unwrap().starts_with("text/plain"),
            "{backend}"
        );

        let plaintext = AesGcmEncryptor::decrypt(
            echoed["body"].as_str().unwrap(),
            echoed["encryptedKey"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(plaintext, br#"{"password":"hunter2"}"#, "{backend}");
    }
}

#[tokio::test]
async fn test_response_type_coercion() {
    let server = TestServer::start().await;
    for backend in backends() {
        let client = server.client(backend.clone());

        let reply = client
            .request_reply(
                RequestDescriptor::new("/text").response_type(ResponseType::Text),
                RequestOptions::new(),
            )
            .await
            .unwrap();
        assert!(matches!(&reply, Reply::Text(text) if text == "plain hello"), "{backend}");

        let reply = client
            .request_reply(
                RequestDescriptor::new("/text").response_type(ResponseType::Blob),
                RequestOptions::new(),
            )
            .await
            .unwrap();
        let Reply::Blob(blob) = reply else {
            panic!("{backend}: expected blob");
        };
        assert_eq!(&blob.bytes[..], b"plain hello", "{backend}");
        assert!(blob.content_type.unwrap().starts_with("text/plain"), "{backend}");

        let reply = client
            .request_reply(
                RequestDescriptor::new("/text").response_type(ResponseType::Bytes),
                RequestOptions::new(),
            )
            .await
            .unwrap();
        assert!(matches!(&reply, Reply::Bytes(bytes) if &bytes[..] == b"plain hello"), "{backend}");
    }
}

#[tokio::test]
async fn test_transform_off_returns_whole_body() {
    let server = TestServer::start().await;
    for backend in backends() {
        let body: Value = server
            .client(backend.clone())
            .get(
                RequestDescriptor::new("/users/3"),
                RequestOptions::new().is_transform_response(false),
            )
            .await
            .unwrap();
        assert_eq!(body["code"], 200, "{backend}");
        assert_eq!(body["data"]["id"], 3, "{backend}");
    }
}

#[tokio::test]
async fn test_native_response() {
    let server = TestServer::start().await;
    for backend in backends() {
        let response = server
            .client(backend.clone())
            .request_native(RequestDescriptor::new("/users/4"), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK, "{backend}");
        let body = response.json().unwrap();
        assert_eq!(body["data"]["name"], "user-4", "{backend}");
    }
}

#[tokio::test]
async fn test_application_error() {
    let server = TestServer::start().await;
    for backend in backends() {
        let err = server
            .client(backend.clone())
            .get::<Value>(RequestDescriptor::new("/app-error"), RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Application, "{backend}");
        assert_eq!(err.code(), Some(5001), "{backend}");
        assert_eq!(err.message(), "quota exceeded", "{backend}");
    }
}

#[tokio::test]
async fn test_missing_envelope_is_malformed() {
    let server = TestServer::start().await;
    for backend in backends() {
        let err = server
            .client(backend.clone())
            .get::<Value>(RequestDescriptor::new("/not-envelope"), RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.transport_reason(), Some(TransportReason::Malformed), "{backend}");
    }
}

#[tokio::test]
async fn test_http_status_failure() {
    let server = TestServer::start().await;
    for backend in backends() {
        let err = server
            .client(backend.clone())
            .get::<Value>(RequestDescriptor::new("/server-error"), RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::HttpStatus, "{backend}");
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR), "{backend}");
        assert_eq!(err.message(), "Internal server error", "{backend}");
    }
}

#[tokio::test]
async fn test_redirect_is_not_followed() {
    let server = TestServer::start().await;
    for backend in backends() {
        let err = server
            .client(backend.clone())
            .get::<Value>(RequestDescriptor::new("/old"), RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::HttpStatus, "{backend}");
        assert_eq!(err.status(), Some(StatusCode::TEMPORARY_REDIRECT), "{backend}");
    }
}

#[tokio::test]
async fn test_path_is_percent_encoded() {
    let server = TestServer::start().await;
    for backend in backends() {
        let client = server.client(backend.clone());
        for name in ["john doe", "café"] {
            let echoed: Value = client
                .get(RequestDescriptor::new(format!("/files/{name}")), RequestOptions::new())
                .await
                .unwrap();
            assert_eq!(echoed, name, "{backend}");
        }
    }
}

#[tokio::test]
async fn test_timeout() {
    let server = TestServer::start().await;
    for backend in backends() {
        let err = server
            .client(backend.clone())
            .get::<Value>(
                RequestDescriptor::new("/slow"),
                RequestOptions::new().timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout, "{backend}");
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(100)));
    }
}

#[tokio::test]
async fn test_descriptor_timeout_wins() {
    let server = TestServer::start().await;
    for backend in backends() {
        let err = server
            .client(backend.clone())
            .get::<Value>(
                RequestDescriptor::new("/slow").timeout(Duration::from_millis(50)),
                RequestOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(50)),
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_caller_abort() {
    let server = TestServer::start().await;
    for backend in backends() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = server
            .client(backend.clone())
            .get::<Value>(
                RequestDescriptor::new("/slow").cancel_token(token),
                RequestOptions::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport, "{backend}");
        assert!(err.is_aborted(), "{backend}");
    }
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    for backend in backends() {
        let client = dualfetch_client::Client::builder()
            .default_backend(backend.clone())
            .base_options(RequestOptions::new().api_url(format!("http://{addr}")))
            .build()
            .unwrap();
        let err = client
            .request_reply(
                RequestDescriptor::new("/anything").method(Method::DELETE),
                RequestOptions::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.transport_reason(), Some(TransportReason::Connect), "{backend}");
        assert!(err.is_retryable(), "{backend}");
    }
}

#[tokio::test]
async fn test_relative_url_without_api_url() {
    for backend in backends() {
        let client = dualfetch_client::Client::builder()
            .default_backend(backend.clone())
            .build()
            .unwrap();
        let err = client
            .get::<Value>(RequestDescriptor::new("/users/1"), RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Config, "{backend}");
    }
}

#[tokio::test]
async fn test_fetch_backend_as_tower_service() {
    use dualfetch_client::{FetchBackend, Pipeline, RawRequest};
    use tower::ServiceExt;

    let server = TestServer::start().await;
    let backend = FetchBackend::new(Pipeline::new(())).unwrap();
    let response = backend
        .oneshot(RawRequest {
            method: Method::GET,
            url: format!("{}/api/users/9", server.base),
            headers: http::HeaderMap::new(),
            body: Default::default(),
            timeout: Duration::from_secs(5),
            cancel: None,
            dedupe_key: None,
        })
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json().unwrap()["data"]["id"], 9);
}
