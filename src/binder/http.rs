//! HTTP binding: an axum server on the inbound side, a reqwest client on the
//! outbound side. Correlation is implicit in the HTTP exchange.

use super::{with_poa_path, Binder, RequestHandler};
use crate::error::{BinderError, CseError};
use crate::primitive::query::QueryParams;
use crate::primitive::{
    debug_content, new_request_id, Operation, RequestPrimitive, ResourceType, ResponsePrimitive,
    ResponseStatusCode,
};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub const HEADER_REQUEST_ID: &str = "x-m2m-ri";
pub const HEADER_ORIGIN: &str = "x-m2m-origin";
pub const HEADER_STATUS: &str = "x-m2m-rsc";
const RESOURCE_MEDIA_TYPE: &str = "application/vnd.onem2m-res+json";

/// Maps a primitive address onto an HTTP request path: SP-relative
/// addresses get the `~` prefix, absolute ones `_`.
pub fn address_to_http_path(address: &str) -> String {
    if let Some(rest) = address.strip_prefix("//") {
        format!("/_/{}", rest)
    } else if let Some(rest) = address.strip_prefix('/') {
        format!("/~/{}", rest)
    } else {
        format!("/{}", address)
    }
}

/// Inverse of [`address_to_http_path`].
pub fn http_path_to_address(path: &str) -> String {
    let decoded = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());
    if let Some(rest) = decoded.strip_prefix("/_/") {
        format!("//{}", rest)
    } else if let Some(rest) = decoded.strip_prefix("/~/") {
        format!("/{}", rest)
    } else {
        decoded.trim_start_matches('/').to_string()
    }
}

/// Parameters of a `Content-Type` header: the serialization and `ty`.
fn parse_content_type(value: &str) -> Result<(Option<String>, Option<ResourceType>), CseError> {
    let mut cty = None;
    let mut ty = None;
    for part in value.split(';').map(str::trim) {
        if let Some((key, param)) = part.split_once('=') {
            if key.trim() == "ty" {
                let code: u16 = param.trim().parse().map_err(|_| {
                    CseError::Validation(format!("invalid resource type in Content-Type: {}", param))
                })?;
                ty = Some(
                    ResourceType::try_from(code).map_err(|e| CseError::Validation(e.to_string()))?,
                );
            }
        } else if let Some((_, suffix)) = part.split_once('+') {
            cty = Some(suffix.to_string());
        } else if let Some(subtype) = part.strip_prefix("application/") {
            cty = Some(subtype.to_string());
        }
    }
    Ok((cty, ty))
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Builds a request primitive from an HTTP request.
pub fn request_from_http(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<RequestPrimitive, CseError> {
    let (cty, ty) = match header_text(headers, "content-type") {
        Some(value) => parse_content_type(&value)?,
        None => (None, None),
    };

    let op = match *method {
        Method::GET => Operation::Retrieve,
        Method::PUT => Operation::Update,
        Method::DELETE => Operation::Delete,
        Method::POST if ty.is_some() => Operation::Create,
        Method::POST => Operation::Notify,
        ref other => {
            return Err(CseError::NotImplemented(format!("unsupported method: {}", other)))
        }
    };

    let pc = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(body)
                .map_err(|e| CseError::Validation(format!("malformed content: {}", e)))?,
        )
    };

    let params = match uri.query() {
        Some(query) if !query.is_empty() => QueryParams::parse(query)?,
        _ => QueryParams::default(),
    };

    let accept = header_text(headers, "accept")
        .and_then(|a| a.split('/').nth(1).map(str::to_string))
        .filter(|a| a != "*");

    Ok(RequestPrimitive {
        op,
        to: http_path_to_address(uri.path()),
        fr: header_text(headers, HEADER_ORIGIN).unwrap_or_default(),
        rqi: header_text(headers, HEADER_REQUEST_ID).unwrap_or_default(),
        ty: if op == Operation::Create { ty } else { None },
        pc,
        rcn: params.rcn,
        fc: params.fc,
        drt: params.drt,
        cty: accept.or(cty),
    })
}

/// Renders a response primitive as an HTTP response.
pub fn response_to_http(rsp: &ResponsePrimitive) -> Response {
    let status = StatusCode::from_u16(rsp.rsc.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = match &rsp.pc {
        Some(pc) => (status, Json(pc.clone())).into_response(),
        None => status.into_response(),
    };
    let headers = response.headers_mut();
    for (name, value) in [
        (HEADER_REQUEST_ID, rsp.rqi.clone()),
        (HEADER_STATUS, rsp.rsc.code().to_string()),
        (HEADER_ORIGIN, rsp.fr.clone()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
    response
}

/// Shared state of the HTTP server.
pub struct HttpAppState {
    pub handler: Arc<dyn RequestHandler>,
    /// Originator of responses to requests that never reach the handler
    pub cse_id: String,
}

/// Every path and method is a primitive; routing happens in the dispatcher.
pub fn create_router(state: Arc<HttpAppState>) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn handle_request(
    State(state): State<Arc<HttpAppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match request_from_http(&method, &uri, &headers, &body) {
        Ok(rqp) => {
            let rsp = state.handler.handle(rqp).await;
            response_to_http(&rsp)
        }
        Err(e) => {
            debug!(uri = %uri, error = %e, "Rejected HTTP request");
            let rsp = ResponsePrimitive {
                rsc: e.status(),
                rqi: header_text(&headers, HEADER_REQUEST_ID).unwrap_or_default(),
                to: header_text(&headers, HEADER_ORIGIN).unwrap_or_default(),
                fr: state.cse_id.clone(),
                pc: Some(debug_content(&e.to_string())),
            };
            response_to_http(&rsp)
        }
    }
}

/// Serves the router on `host:port` until the listener fails.
pub async fn serve(state: Arc<HttpAppState>, host: &str, port: u16) -> anyhow::Result<()> {
    use anyhow::Context;

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP binding to {}", addr))?;
    info!("HTTP binding listening on {}", addr);
    axum::serve(listener, create_router(state))
        .await
        .context("HTTP binding stopped")
}

/// Outbound HTTP binder.
pub struct HttpBinder {
    client: reqwest::Client,
    /// Originator used when a request carries none
    originator: String,
    timeout: Duration,
}

impl HttpBinder {
    pub fn new(originator: impl Into<String>, timeout: Duration) -> Result<Self, BinderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BinderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            originator: originator.into(),
            timeout,
        })
    }

    fn url_for(poa: &str, rqp: &RequestPrimitive) -> String {
        let base = with_poa_path(poa, "");
        let mut url = format!(
            "{}{}",
            base.trim_end_matches('/'),
            address_to_http_path(&rqp.to)
        );
        let query = QueryParams::encode(rqp.rcn, rqp.drt, rqp.fc.as_ref());
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

fn status_from_http(status: u16) -> ResponseStatusCode {
    match status {
        200 | 204 => ResponseStatusCode::Ok,
        201 => ResponseStatusCode::Created,
        400 => ResponseStatusCode::BadRequest,
        403 => ResponseStatusCode::OriginatorHasNoPrivilege,
        404 => ResponseStatusCode::NotFound,
        405 => ResponseStatusCode::OperationNotAllowed,
        408 => ResponseStatusCode::RequestTimeout,
        409 => ResponseStatusCode::AlreadyExists,
        501 => ResponseStatusCode::NotImplemented,
        _ => ResponseStatusCode::InternalServerError,
    }
}

#[async_trait]
impl Binder for HttpBinder {
    fn schemes(&self) -> &'static [&'static str] {
        &["http", "https"]
    }

    async fn send(&self, poa: &str, mut rqp: RequestPrimitive) -> Result<ResponsePrimitive, BinderError> {
        if rqp.fr.is_empty() {
            rqp.fr = self.originator.clone();
        }
        if rqp.rqi.is_empty() {
            rqp.rqi = new_request_id();
        }

        let method = match rqp.op {
            Operation::Create | Operation::Notify => reqwest::Method::POST,
            Operation::Retrieve => reqwest::Method::GET,
            Operation::Update => reqwest::Method::PUT,
            Operation::Delete => reqwest::Method::DELETE,
        };
        let content_type = match rqp.ty {
            Some(ty) => format!("{}; ty={}", RESOURCE_MEDIA_TYPE, ty.code()),
            None => RESOURCE_MEDIA_TYPE.to_string(),
        };
        let url = Self::url_for(poa, &rqp);
        debug!(rqi = %rqp.rqi, url = %url, op = %rqp.op, "Sending HTTP request");

        let mut request = self
            .client
            .request(method, &url)
            .header(HEADER_REQUEST_ID, &rqp.rqi)
            .header(HEADER_ORIGIN, &rqp.fr)
            .header("Accept", format!("application/{}", rqp.content_type()))
            .header("Content-Type", content_type);
        if let Some(pc) = &rqp.pc {
            let body = serde_json::to_vec(pc).map_err(|e| BinderError::Codec(e.to_string()))?;
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BinderError::Timeout(self.timeout.as_secs())
            } else {
                BinderError::Transport(format!("{}: {}", poa, e))
            }
        })?;

        let headers = response.headers().clone();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let rsc = header(HEADER_STATUS)
            .and_then(|v| v.trim().parse::<u16>().ok())
            .and_then(|code| ResponseStatusCode::try_from(code).ok())
            .unwrap_or_else(|| status_from_http(response.status().as_u16()));
        let rqi = header(HEADER_REQUEST_ID).unwrap_or_else(|| rqp.rqi.clone());
        let fr = header(HEADER_ORIGIN).unwrap_or_default();

        let text = response
            .text()
            .await
            .map_err(|e| BinderError::Transport(e.to_string()))?;
        let pc = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        };

        Ok(ResponsePrimitive {
            rsc,
            rqi,
            to: rqp.fr,
            fr,
            pc,
        })
    }
}

