//! Integration tests for Keygate.
//!
//! These tests run TLS gateways in-process and drive the client selector and
//! the backend registry across crates.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Json, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;
use url::Url;

use keygate_client::{LoginResponse, AUTH_TYPE_PASSWORD, AUTH_TYPE_U2F, LOGIN_PATH};
use keygate_trust::TrustPool;

// ============================================================================
// Test Gateway
// ============================================================================

/// An HTTPS gateway answering the login metadata endpoint.
///
/// Each gateway has its own self-signed certificate for `localhost`.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub base_url: Url,
    cert_pem: String,
    task: JoinHandle<()>,
}

impl TestGateway {
    /// Starts a gateway on an ephemeral port.
    pub async fn start(message: &'static str) -> Result<Self> {
        let key = rcgen::KeyPair::generate().context("Failed to generate key")?;
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .context("Invalid certificate parameters")?
            .self_signed(&key)
            .context("Failed to self-sign certificate")?;

        let provider = rustls::crypto::ring::default_provider();
        let tls = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .context("Failed to set protocol versions")?
            .with_no_client_auth()
            .with_single_cert(
                vec![cert.der().clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
            )
            .context("Failed to load gateway certificate")?;
        let acceptor = TlsAcceptor::from(Arc::new(tls));

        let app = Router::new().route("/", get(|| async { "keygate" })).route(
            LOGIN_PATH,
            get(move || async move {
                Json(LoginResponse {
                    message: message.to_string(),
                    auth_backend: vec![AUTH_TYPE_PASSWORD.to_string(), AUTH_TYPE_U2F.to_string()],
                })
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(serve(listener, acceptor, app));

        Ok(Self {
            addr,
            base_url: Url::parse(&format!("https://localhost:{}/", addr.port()))?,
            cert_pem: cert.pem(),
            task,
        })
    }

    /// A pool trusting only this gateway.
    pub fn trust_pool(&self) -> TrustPool {
        TrustPool::from_pem(self.cert_pem.as_bytes()).unwrap()
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(listener: TcpListener, acceptor: TlsAcceptor, app: Router) {
    while let Ok((tcp, _)) = listener.accept().await {
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            // Untrusting clients abort the handshake.
            let Ok(tls) = acceptor.accept(tcp).await else {
                return;
            };
            let _ = Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(tls), TowerToHyperService::new(app))
                .await;
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use keygate_auth::htpasswd::HTPASSWD_STORAGE_KEY;
    use keygate_auth::{AuthError, BackendRegistry, HtpasswdBackend, IdpBackend, IdpConfig};
    use keygate_client::{
        build_http_client, fetch_login_info, ClientError, SelectError, SelectionPolicy,
        ServerSelector, DEFAULT_REQUEST_TIMEOUT,
    };
    use keygate_storage::{MemoryBackend, StorageBackend};

    fn selector(
        candidates: Vec<Url>,
        roots: Option<&TrustPool>,
        policy: SelectionPolicy,
    ) -> ServerSelector {
        let client = build_http_client(roots, None, DEFAULT_REQUEST_TIMEOUT).unwrap();
        ServerSelector::new(candidates, client, policy).with_probe_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_trusted_gateway_selected_in_any_order() {
        let trusted = TestGateway::start("trusted").await.unwrap();
        let untrusted = TestGateway::start("untrusted").await.unwrap();
        let pool = trusted.trust_pool();

        for candidates in [
            vec![trusted.base_url.clone(), untrusted.base_url.clone()],
            vec![untrusted.base_url.clone(), trusted.base_url.clone()],
        ] {
            let selector = selector(candidates, Some(&pool), SelectionPolicy::Ordered);
            let server = selector.select().await.unwrap();
            assert_eq!(server, trusted.base_url);

            let login = fetch_login_info(selector.client(), &server).await.unwrap();
            assert_eq!(login.message, "trusted");
            assert!(login.supports(AUTH_TYPE_PASSWORD));
            assert!(login.supports(AUTH_TYPE_U2F));
        }
    }

    #[tokio::test]
    async fn test_platform_roots_reject_test_gateways() {
        let a = TestGateway::start("a").await.unwrap();
        let b = TestGateway::start("b").await.unwrap();

        let selector = selector(
            vec![a.base_url.clone(), b.base_url.clone()],
            None,
            SelectionPolicy::Ordered,
        );
        match selector.select().await {
            Err(SelectError::Exhausted { failures }) => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|f| matches!(f.error, ClientError::Http(_))));
            },
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_pool_trusts_nothing() {
        let gateway = TestGateway::start("gw").await.unwrap();
        let selector = selector(
            vec![gateway.base_url.clone()],
            Some(&TrustPool::empty()),
            SelectionPolicy::Ordered,
        );
        assert!(matches!(selector.select().await, Err(SelectError::Exhausted { .. })));
    }

    #[tokio::test]
    async fn test_round_robin_alternates_between_gateways() {
        let a = TestGateway::start("a").await.unwrap();
        let b = TestGateway::start("b").await.unwrap();
        let mut pool = a.trust_pool();
        for cert in b.trust_pool().certificates() {
            pool.add_der(cert.clone());
        }

        let selector = selector(
            vec![a.base_url.clone(), b.base_url.clone()],
            Some(&pool),
            SelectionPolicy::RoundRobin,
        );
        let first = selector.select().await.unwrap();
        let second = selector.select().await.unwrap();
        let third = selector.select().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[tokio::test]
    async fn test_root_ca_file_round_trip() {
        let gateway = TestGateway::start("gw").await.unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &gateway.cert_pem).unwrap();

        let pool = keygate_trust::maybe_load_root_cas(file.path().to_str())
            .unwrap()
            .unwrap();
        let selector =
            selector(vec![gateway.base_url.clone()], Some(&pool), SelectionPolicy::Ordered);
        assert_eq!(selector.select().await.unwrap(), gateway.base_url);
    }

    fn htpasswd_line(user: &str, password: &str) -> String {
        let hash = bcrypt::hash_with_result(password, 4)
            .unwrap()
            .format_for_version(bcrypt::Version::TwoB);
        format!("{user}:{hash}\n")
    }

    #[tokio::test]
    async fn test_registry_falls_through_to_identity_provider() {
        let idp = MockServer::start_async().await;
        let authn = idp
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/authn");
                then.status(200).json_body(json!({"status": "SUCCESS"}));
            })
            .await;

        let local =
            HtpasswdBackend::from_bytes(htpasswd_line("alice", "local-pw").as_bytes()).unwrap();
        let remote =
            IdpBackend::with_authn_url(&idp.url("/api/v1/authn"), IdpConfig::default()).unwrap();

        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(local)).unwrap();
        registry.register(Arc::new(remote)).unwrap();
        assert_eq!(registry.names(), vec!["htpasswd", "idp"]);

        let accepted = registry.password_authenticate("alice", "local-pw").await.unwrap();
        assert_eq!(accepted, Some("htpasswd"));
        assert_eq!(authn.hits_async().await, 0);

        let accepted = registry.password_authenticate("bob", "remote-pw").await.unwrap();
        assert_eq!(accepted, Some("idp"));
        assert_eq!(authn.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_registry_reports_provider_outage() {
        let idp = MockServer::start_async().await;
        idp.mock_async(|when, then| {
            when.method(POST).path("/api/v1/authn");
            then.status(502);
        })
        .await;

        let mut registry = BackendRegistry::new();
        registry
            .register(Arc::new(HtpasswdBackend::from_bytes(b"").unwrap()))
            .unwrap();
        let remote =
            IdpBackend::with_authn_url(&idp.url("/api/v1/authn"), IdpConfig::default()).unwrap();
        registry.register(Arc::new(remote)).unwrap();

        let err = registry.password_authenticate("bob", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Provider(_)));
        assert!(err.is_system_error());
    }

    #[tokio::test]
    async fn test_registry_storage_refresh() {
        let backend = Arc::new(HtpasswdBackend::from_bytes(b"").unwrap());
        let mut registry = BackendRegistry::new();
        registry.register(backend.clone()).unwrap();

        let store = MemoryBackend::new();
        store
            .put(HTPASSWD_STORAGE_KEY, htpasswd_line("carol", "pw").as_bytes())
            .await
            .unwrap();
        registry.update_storage(&store).await.unwrap();

        assert_eq!(registry.password_authenticate("carol", "pw").await.unwrap(), Some("htpasswd"));
        assert!(!backend.is_empty().await);
    }
}
