use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    Json as JsonBody,
};
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};
use std::sync::Arc;
use tokio::sync::Mutex;
use once_cell::sync::Lazy;

use crate::{
    Config,
    chains::{self, MAINNET},
    constants::{RATE_LIMIT_WINDOW_SECONDS, RPC_PROXY_RATE_LIMIT_PER_MINUTE},
    handlers::AppState,
};

// Sliding-window limiter keyed by client IP
#[derive(Debug)]
struct RpcRateLimiter {
    requests: HashMap<String, Vec<Instant>>,
    max_requests_per_window: u32,
    window: Duration,
}

impl RpcRateLimiter {
    fn new(max_requests_per_window: u32, window: Duration) -> Self {
        Self {
            requests: HashMap::new(),
            max_requests_per_window,
            window,
        }
    }

    fn can_make_request(&mut self, key: &str) -> bool {
        let now = Instant::now();

        let window = self.window;
        // Expired timestamps go, and so do clients with nothing left in the window
        self.requests.retain(|_, times| {
            times.retain(|&time| now.saturating_duration_since(time) < window);
            !times.is_empty()
        });

        let requests = self.requests.entry(key.to_string()).or_default();

        if requests.len() < self.max_requests_per_window as usize {
            requests.push(now);
            true
        } else {
            false
        }
    }
}

static RPC_RATE_LIMITER: Lazy<Arc<Mutex<RpcRateLimiter>>> = Lazy::new(|| {
    Arc::new(Mutex::new(RpcRateLimiter::new(
        RPC_PROXY_RATE_LIMIT_PER_MINUTE,
        Duration::from_secs(RATE_LIMIT_WINDOW_SECONDS),
    )))
});

static HTTP_CLIENT: Lazy<Client> = Lazy::new(Client::new);

#[derive(serde::Deserialize)]
pub struct RpcQuery {
    #[serde(default)]
    network: Option<String>,
}

/// RPC endpoint for a `network` query value. The configured chain uses the
/// configured RPC URL; other known chains use their public default.
fn resolve_rpc_url(config: &Config, network: Option<&str>) -> Result<String, String> {
    let Some(network) = network else {
        return Ok(config.rpc_url.clone());
    };
    if network == "ethereum" {
        return Ok(config.mainnet_rpc_url.clone());
    }
    match chains::find(network) {
        Some(chain) if chain.chain_id == config.chain.chain_id => Ok(config.rpc_url.clone()),
        Some(chain) if chain.chain_id == MAINNET.chain_id => Ok(config.mainnet_rpc_url.clone()),
        Some(chain) => Ok(chain.default_rpc.to_string()),
        None => Err(format!("Unsupported network: {}", network)),
    }
}

/// Proxy JSON-RPC requests so browsers share the server's endpoint instead
/// of hitting public RPCs (and their 429s) directly.
pub async fn proxy_rpc(
    Query(params): Query<RpcQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let client_ip = get_client_ip(&headers);

    {
        let mut rate_limiter = RPC_RATE_LIMITER.lock().await;
        if !rate_limiter.can_make_request(&client_ip) {
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded. Please try again later."
                }))
            ));
        }
    }

    let rpc_url = resolve_rpc_url(&state.config, params.network.as_deref())
        .map_err(|error| (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))))?;

    if !is_valid_jsonrpc_request(&body) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid JSON-RPC request format"
            }))
        ));
    }

    tracing::info!(
        "RPC proxy request from {} to {} network: method={}",
        client_ip,
        params.network.as_deref().unwrap_or(state.config.chain.name),
        body.get("method").and_then(|m| m.as_str()).unwrap_or("batch")
    );

    let response = HTTP_CLIENT
        .post(&rpc_url)
        .json(&body)
        .timeout(Duration::from_secs(30))
        .send()
        .await;

    match response {
        Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!("Upstream RPC is rate limiting the proxy");
            Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Upstream RPC rate limit exceeded. Please try again later."
                }))
            ))
        }
        Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
            Ok(json_response) => Ok(Json(json_response)),
            Err(e) => {
                tracing::error!("Failed to parse RPC response as JSON: {}", e);
                Err((
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "error": "Invalid response from RPC endpoint"
                    }))
                ))
            }
        },
        Ok(resp) => {
            tracing::error!("RPC endpoint returned error status: {}", resp.status());
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "RPC endpoint error"
                }))
            ))
        }
        Err(e) => {
            tracing::error!("Failed to connect to RPC endpoint: {}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Failed to connect to RPC endpoint"
                }))
            ))
        }
    }
}

fn get_client_ip(headers: &HeaderMap) -> String {
    let ip_headers = [
        "cf-connecting-ip",
        "x-forwarded-for",
        "x-real-ip",
        "x-client-ip",
    ];

    for header_name in &ip_headers {
        if let Some(header_value) = headers.get(*header_name) {
            if let Ok(ip_str) = header_value.to_str() {
                // x-forwarded-for can be a list, the first hop is the client
                let ip = ip_str.split(',').next().unwrap_or(ip_str).trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    "unknown".to_string()
}

fn is_valid_jsonrpc_request(body: &Value) -> bool {
    if let Some(obj) = body.as_object() {
        obj.contains_key("id") &&
        obj.get("jsonrpc").and_then(|v| v.as_str()) == Some("2.0") &&
        obj.get("method").and_then(|v| v.as_str()).is_some()
    } else if let Some(array) = body.as_array() {
        !array.is_empty() && array.iter().all(is_valid_jsonrpc_request)
    } else {
        false
    }
}
