//! Transport bindings. Each binder moves request and response primitives
//! over one protocol; the registry picks a binder by the scheme of a point
//! of access.

pub mod correlation;
pub mod http;
pub mod mqtt;

pub use correlation::{InflightRequests, PendingRequests};
pub use http::{create_router, HttpBinder};
pub use mqtt::MqttBinder;

use crate::error::BinderError;
use crate::primitive::{RequestPrimitive, ResponsePrimitive};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outbound side of a transport.
#[async_trait]
pub trait Binder: Send + Sync {
    /// URL schemes served by this binder, e.g. `["http", "https"]`.
    fn schemes(&self) -> &'static [&'static str];

    /// Sends `rqp` to the entity reachable at `poa` and waits for its
    /// response.
    async fn send(&self, poa: &str, rqp: RequestPrimitive) -> Result<ResponsePrimitive, BinderError>;
}

/// Inbound side: whatever processes requests received by a binder.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, rqp: RequestPrimitive) -> ResponsePrimitive;
}

/// Binders keyed by URL scheme.
#[derive(Default)]
pub struct BinderRegistry {
    binders: DashMap<String, Arc<dyn Binder>>,
}

impl BinderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, binder: Arc<dyn Binder>) {
        for scheme in binder.schemes() {
            debug!(scheme = %scheme, "Registered binder");
            self.binders.insert(scheme.to_string(), Arc::clone(&binder));
        }
    }

    pub fn binder_for(&self, poa: &str) -> Result<Arc<dyn Binder>, BinderError> {
        let scheme = scheme_of(poa).ok_or_else(|| BinderError::InvalidAddress(poa.to_string()))?;
        self.binders
            .get(&scheme.to_ascii_lowercase())
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| BinderError::UnsupportedScheme(poa.to_string()))
    }

    pub async fn send(&self, poa: &str, rqp: RequestPrimitive) -> Result<ResponsePrimitive, BinderError> {
        self.binder_for(poa)?.send(poa, rqp).await
    }

    /// Tries each point of access in order and returns the first response.
    /// The error of the last attempt is returned when none answers.
    pub async fn send_any(
        &self,
        poas: &[String],
        rqp: &RequestPrimitive,
    ) -> Result<ResponsePrimitive, BinderError> {
        let mut last = BinderError::Transport("no point of access".to_string());
        for poa in poas {
            match self.send(poa, rqp.clone()).await {
                Ok(rsp) => return Ok(rsp),
                Err(e) => {
                    warn!(poa = %poa, rqi = %rqp.rqi, error = %e, "Point of access failed");
                    last = e;
                }
            }
        }
        Err(last)
    }
}

/// `mqtt` for `mqtt://broker:1883/id`.
pub fn scheme_of(poa: &str) -> Option<&str> {
    let (scheme, rest) = poa.split_once("://")?;
    (!scheme.is_empty() && !rest.is_empty()).then_some(scheme)
}

/// Path component of a point of access without its leading slash, empty
/// when the URL carries no path.
pub fn poa_path(poa: &str) -> &str {
    let rest = poa.split_once("://").map_or(poa, |(_, rest)| rest);
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    match rest.find('/') {
        Some(idx) => rest[idx..].trim_start_matches('/'),
        None => "",
    }
}

/// Replaces the path of `poa` with `path`.
pub fn with_poa_path(poa: &str, path: &str) -> String {
    let (scheme, rest) = match poa.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, poa),
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let path = path.trim_start_matches('/');
    match scheme {
        Some(scheme) => format!("{}://{}/{}", scheme, authority, path),
        None => format!("{}/{}", authority, path),
    }
}
