use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::Html,
    routing::any,
    Router,
};
use chrono::{Local, SecondsFormat};
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::HoneypotConfig;
use crate::log::{ConnectionLog, ConnectionRecord};

/// Headers worth keeping in a request summary, in preference order.
const SUMMARY_HEADERS: [&str; 5] = ["host", "user-agent", "referer", "content-type", "cookie"];
const SUMMARY_MAX_BYTES: usize = 512;

const INTERSTITIAL_HTML: &str = "<html><body><h1>Welcome to WiFi Network</h1>\
<p>Please wait while we check your connection...</p>\
<script>setTimeout(function() { window.location.href = '/dashboard'; }, 3000);</script>\
</body></html>";

const DASHBOARD_HTML: &str = "<html><body><h1>Login Required</h1>\
<form action='/login' method='post'>\
Username: <input type='text' name='username'><br>\
Password: <input type='password' name='password'><br>\
<input type='submit' value='Login'>\
</form></body></html>";

const LOGIN_FAILED_HTML: &str = "<html><body><h1>Authentication Failed</h1>\
<p>Invalid username or password.</p>\
<a href='/dashboard'>Try again</a>\
</body></html>";

const DECOY_HTML: &str =
    "<html><body><h1>Welcome</h1><p>This is a test page.</p></body></html>";

#[derive(Clone)]
pub struct HoneypotState {
    log: ConnectionLog,
}

impl HoneypotState {
    pub fn new(log: ConnectionLog) -> Self {
        Self { log }
    }
}

pub fn build_router(cfg: &HoneypotConfig, state: HoneypotState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(RequestBodyLimitLayer::new(cfg.max_body_bytes))
        .layer(TimeoutLayer::new(cfg.request_timeout))
        .layer(ConcurrencyLimitLayer::new(cfg.max_concurrency));

    Router::new()
        .route("/", any(serve_interstitial))
        .route("/dashboard", any(serve_dashboard))
        .route("/login", any(reject_login))
        .fallback(serve_decoy)
        .with_state(state)
        .layer(middleware)
}

pub async fn run_server(
    listener: std::net::TcpListener,
    app: Router,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)
        .context("converting honeypot listener to tokio listener")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = shutdown.await;
    })
    .await
    .context("running honeypot responder")?;

    Ok(())
}

/// Root page: looks like a connectivity check, then nudges the visitor
/// toward the decoy dashboard after a believable pause.
async fn serve_interstitial(
    State(state): State<HoneypotState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Html<&'static str> {
    log_request(&state, addr, &method, &uri, &headers, &body);
    Html(INTERSTITIAL_HTML)
}

async fn serve_dashboard(
    State(state): State<HoneypotState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Html<&'static str> {
    log_request(&state, addr, &method, &uri, &headers, &body);
    Html(DASHBOARD_HTML)
}

/// Every submission fails. The point is the log entry, not the answer.
async fn reject_login(
    State(state): State<HoneypotState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Html<&'static str>) {
    log_request(&state, addr, &method, &uri, &headers, &body);
    (StatusCode::FORBIDDEN, Html(LOGIN_FAILED_HTML))
}

async fn serve_decoy(
    State(state): State<HoneypotState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Html<&'static str> {
    log_request(&state, addr, &method, &uri, &headers, &body);
    Html(DECOY_HTML)
}

fn log_request(
    state: &HoneypotState,
    addr: SocketAddr,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) {
    let summary = summarize_request(method, uri, headers, body);
    tracing::info!(
        "Honeypot hit from {}: {} {} ua=\"{}\"",
        addr.ip(),
        method,
        uri.path(),
        user_agent(headers)
    );
    state.log.record(ConnectionRecord {
        client_ip: addr.ip(),
        client_port: addr.port(),
        timestamp_ms: now_ms(),
        request_summary: summary,
    });
}

fn summarize_request(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> String {
    let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut summary = format!("[{timestamp}] {method} {uri}");

    for name in SUMMARY_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            summary.push_str(&format!("\n{name}: {value}"));
        }
    }

    if !body.is_empty() {
        let params = String::from_utf8_lossy(body);
        summary.push_str(&format!("\nparams: {params}"));
    } else if let Some(query) = uri.query() {
        summary.push_str(&format!("\nparams: {query}"));
    }

    if summary.len() > SUMMARY_MAX_BYTES {
        let mut cut = SUMMARY_MAX_BYTES;
        while !summary.is_char_boundary(cut) {
            cut -= 1;
        }
        summary.truncate(cut);
    }
    summary
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router(log: ConnectionLog) -> Router {
        build_router(&HoneypotConfig::default(), HoneypotState::new(log))
    }

    fn request(method: &str, path: &str, body: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header("user-agent", "test-agent");
        if !body.is_empty() {
            req = req.header("content-type", "application/x-www-form-urlencoded");
        }
        let mut req = req.body(Body::from(body.to_string())).unwrap();
        req.extensions_mut().insert(ConnectInfo(SocketAddr::from((
            [192, 168, 4, 23],
            49152,
        ))));
        req
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[tokio::test]
    async fn root_serves_redirecting_interstitial() {
        let log = ConnectionLog::new();
        let response = test_router(log.clone())
            .oneshot(request("GET", "/", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("/dashboard"));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn dashboard_serves_login_form() {
        let log = ConnectionLog::new();
        let response = test_router(log.clone())
            .oneshot(request("GET", "/dashboard", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("action='/login'"));
        assert!(body.contains("type='password'"));
    }

    #[tokio::test]
    async fn login_always_fails_and_logs_exactly_once() {
        let log = ConnectionLog::new();
        let response = test_router(log.clone())
            .oneshot(request("POST", "/login", "username=admin&password=hunter2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_text(response).await;
        assert!(body.contains("Authentication Failed"));

        let records = log.snapshot();
        assert_eq!(records.len(), 1);
        assert!(records[0].request_summary.contains("username=admin"));
        assert_eq!(records[0].client_port, 49152);
    }

    #[tokio::test]
    async fn unknown_paths_get_a_decoy_page() {
        let log = ConnectionLog::new();
        let response = test_router(log.clone())
            .oneshot(request("GET", "/admin/backup.zip", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(log.len(), 1);
        assert!(log.snapshot()[0]
            .request_summary
            .contains("GET /admin/backup.zip"));
    }

    #[tokio::test]
    async fn summaries_keep_headers_and_stay_bounded() {
        let log = ConnectionLog::new();
        let long_field = "x".repeat(2000);
        let response = test_router(log.clone())
            .oneshot(request("POST", "/login", &format!("password={long_field}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let summary = &log.snapshot()[0].request_summary;
        assert!(summary.contains("user-agent: test-agent"));
        assert!(summary.len() <= SUMMARY_MAX_BYTES);
    }

    #[test]
    fn user_agent_falls_back_to_unknown() {
        assert_eq!(user_agent(&HeaderMap::new()), "unknown");
    }
}
