//! Session cookie + crumb cache.
//!
//! Acquisition is a two-step login: the landing page sets a cookie, then the
//! crumb endpoint exchanges that cookie for a crumb token. The pair is valid
//! for a fixed TTL from acquisition. Only one acquisition runs at a time;
//! concurrent callers share its result.

use chrono::{DateTime, Duration, Utc};
use picks_common::UpstreamConfig;
use reqwest::header::{self, HeaderMap};
use reqwest::RequestBuilder;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::error::{PicksError, PicksResult};
use crate::flight::SingleFlight;

/// Upper bound on a configured session lifetime (one day)
const MAX_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Session credential for protected endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub cookie: String,
    pub crumb: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }

    /// Attach the cookie header and crumb query parameter to a request.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(header::COOKIE, &self.cookie)
            .query(&[("crumb", self.crumb.as_str())])
    }
}

/// Snapshot reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub has_session: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub acquisitions: u64,
}

/// Holds at most one valid session and at most one acquisition in flight.
pub struct AuthCache {
    http: reqwest::Client,
    config: Arc<UpstreamConfig>,
    session: Arc<RwLock<Option<AuthSession>>>,
    flight: SingleFlight<AuthSession>,
    acquisitions: Arc<AtomicU64>,
}

impl AuthCache {
    pub fn new(http: reqwest::Client, config: Arc<UpstreamConfig>) -> Self {
        Self {
            http,
            config,
            session: Arc::new(RwLock::new(None)),
            flight: SingleFlight::new("auth"),
            acquisitions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the cached session, acquiring a new one if needed.
    ///
    /// With `force_refresh` the cached session is discarded first. A forced
    /// call that arrives while an acquisition is running joins it, since
    /// that session is fresh by construction.
    pub async fn get_session(&self, force_refresh: bool) -> PicksResult<AuthSession> {
        if force_refresh {
            self.invalidate();
        } else if let Some(session) = current(&self.session) {
            return Ok(session);
        }

        let slot = Arc::clone(&self.session);
        let check_slot = Arc::clone(&self.session);
        let http = self.http.clone();
        let config = Arc::clone(&self.config);
        let acquisitions = Arc::clone(&self.acquisitions);

        self.flight
            .run_unless(
                move || {
                    if force_refresh {
                        None
                    } else {
                        current(&check_slot)
                    }
                },
                move || async move {
                    let count = acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(acquisition = count, "Acquiring upstream session");

                    let session = acquire(&http, &config).await.map_err(|e| {
                        warn!(error = %e, "Session acquisition failed");
                        e
                    })?;

                    if let Ok(mut guard) = slot.write() {
                        *guard = Some(session.clone());
                    }
                    info!(expires_at = %session.expires_at, "Upstream session acquired");
                    Ok(session)
                },
            )
            .await
    }

    /// Drop the cached session.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
    }

    /// Number of login sequences started so far.
    pub fn acquisition_count(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> AuthStatus {
        let session = current(&self.session);
        AuthStatus {
            has_session: session.is_some(),
            expires_at: session.map(|s| s.expires_at),
            acquisitions: self.acquisition_count(),
        }
    }
}

fn current(slot: &RwLock<Option<AuthSession>>) -> Option<AuthSession> {
    let guard = slot.read().ok()?;
    guard.as_ref().filter(|s| s.is_valid()).cloned()
}

async fn acquire(http: &reqwest::Client, config: &UpstreamConfig) -> PicksResult<AuthSession> {
    let landing = http
        .get(&config.landing_url)
        .send()
        .await
        .map_err(|e| PicksError::Auth(format!("landing page request failed: {e}")))?;

    let cookie = session_cookie(landing.headers())
        .ok_or_else(|| PicksError::Auth("landing page returned no session cookie".into()))?;

    let response = http
        .get(&config.crumb_url)
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .map_err(|e| PicksError::Auth(format!("crumb request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PicksError::Auth(format!(
            "crumb endpoint returned HTTP {}",
            status.as_u16()
        )));
    }

    let crumb = response
        .text()
        .await
        .map_err(|e| PicksError::Auth(format!("crumb body unreadable: {e}")))?
        .trim()
        .to_string();
    if crumb.is_empty() {
        return Err(PicksError::Auth("crumb endpoint returned an empty body".into()));
    }

    let ttl = config.session_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64;
    Ok(AuthSession {
        cookie,
        crumb,
        expires_at: Utc::now() + Duration::seconds(ttl),
    })
}

/// Join the `name=value` part of every `Set-Cookie` header.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let pairs: Vec<&str> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> Arc<UpstreamConfig> {
        Arc::new(UpstreamConfig {
            landing_url: format!("{}/landing", server.uri()),
            crumb_url: format!("{}/v1/test/getcrumb", server.uri()),
            query_base: server.uri(),
            ..Default::default()
        })
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(
                ResponseTemplate::new(404).insert_header("set-cookie", "A3=d=abc; Path=/; Secure"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .and(header_matcher("cookie", "A3=d=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("crumb123\n"))
            .mount(server)
            .await;
    }

    #[test]
    fn test_session_cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("A1=x; Expires=Wed; Path=/"),
        );
        headers.append(header::SET_COOKIE, HeaderValue::from_static("A3=y; Secure"));
        assert_eq!(session_cookie(&headers).as_deref(), Some("A1=x; A3=y"));
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_acquires_and_caches_session() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let cache = AuthCache::new(reqwest::Client::new(), config_for(&server));
        let first = cache.get_session(false).await.unwrap();
        assert_eq!(first.cookie, "A3=d=abc");
        assert_eq!(first.crumb, "crumb123");

        let second = cache.get_session(false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.acquisition_count(), 1);
        assert!(cache.status().has_session);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_acquisition() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let cache = Arc::new(AuthCache::new(reqwest::Client::new(), config_for(&server)));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get_session(false).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().crumb, "crumb123");
        }
        assert_eq!(cache.acquisition_count(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_reacquires() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let cache = AuthCache::new(reqwest::Client::new(), config_for(&server));
        cache.get_session(false).await.unwrap();
        cache.get_session(true).await.unwrap();
        assert_eq!(cache.acquisition_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_cookie_is_auth_error_and_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let cache = AuthCache::new(reqwest::Client::new(), config_for(&server));
        let err = cache.get_session(false).await.unwrap_err();
        assert!(err.is_auth());
        assert!(!cache.status().has_session);

        // Next call retries from scratch.
        assert!(cache.get_session(false).await.is_err());
        assert_eq!(cache.acquisition_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_crumb_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=z"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  "))
            .mount(&server)
            .await;

        let cache = AuthCache::new(reqwest::Client::new(), config_for(&server));
        let err = cache.get_session(false).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_crumb_http_error_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=z"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let cache = AuthCache::new(reqwest::Client::new(), config_for(&server));
        let err = cache.get_session(false).await.unwrap_err();
        assert!(err.is_auth());
        assert!(err.to_string().contains("429"));
    }
}
