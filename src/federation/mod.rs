//! CSE federation: registration of this CSE as a `<remoteCSE>` on its
//! IN-CSE, periodic re-assertion, and retained CSE announcements over MQTT.

use crate::binder::{poa_path, with_poa_path, BinderRegistry, MqttBinder};
use crate::dispatcher::CseIdentity;
use crate::primitive::{CseType, Operation, RequestPrimitive, ResourceType, ResponseStatusCode};
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// The IN-CSE a middle node registers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamCse {
    /// CSE-ID without the leading slash
    pub csi: String,
    /// CSEBase resource name
    pub rn: String,
    pub poa: Vec<String>,
}

pub type SharedUpstream = Arc<RwLock<Option<UpstreamCse>>>;

impl UpstreamCse {
    /// Parses `scheme://host:port/<csi>/<name>`.
    pub fn parse(inpoa: &str) -> Result<Self> {
        let inpoa = inpoa.trim();
        let mut segments = poa_path(inpoa).split('/').filter(|s| !s.is_empty());
        let csi = segments
            .next()
            .with_context(|| format!("IN-CSE point of access names no CSE-ID: {}", inpoa))?;
        let rn = segments
            .next()
            .with_context(|| format!("IN-CSE point of access names no CSEBase: {}", inpoa))?;
        Ok(Self {
            csi: csi.to_string(),
            rn: rn.to_string(),
            poa: vec![with_poa_path(inpoa, csi)],
        })
    }

    /// Points of access addressing the IN-CSE itself: a bare broker or
    /// server URL gets the CSE-ID as its path.
    pub fn points_of_access(&self) -> Vec<String> {
        self.poa
            .iter()
            .map(|poa| {
                if poa_path(poa).is_empty() {
                    with_poa_path(poa, &self.csi)
                } else {
                    poa.clone()
                }
            })
            .collect()
    }

    /// Address of the `<remoteCSE>` named `name` on the IN-CSE.
    fn registration_address(&self, name: &str) -> String {
        format!("/{}/{}/{}", self.csi, self.rn, name)
    }
}

pub fn shared_upstream(upstream: Option<UpstreamCse>) -> SharedUpstream {
    Arc::new(RwLock::new(upstream))
}

fn read_upstream(upstream: &SharedUpstream) -> Option<UpstreamCse> {
    match upstream.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Keeps this CSE registered with its IN-CSE.
pub struct Registrar {
    identity: CseIdentity,
    cse_type: CseType,
    /// Points of access of this CSE, announced in the registration
    poa: Vec<String>,
    upstream: SharedUpstream,
    binders: Arc<BinderRegistry>,
}

impl Registrar {
    pub fn new(
        identity: CseIdentity,
        cse_type: CseType,
        poa: Vec<String>,
        upstream: SharedUpstream,
        binders: Arc<BinderRegistry>,
    ) -> Self {
        Self {
            identity,
            cse_type,
            poa,
            upstream,
            binders,
        }
    }

    /// Creates or refreshes the `<remoteCSE>` of this CSE on the IN-CSE,
    /// trying each IN point of access in turn.
    pub async fn register(&self) -> Result<ResponseStatusCode> {
        let incse = read_upstream(&self.upstream).context("no IN-CSE configured")?;
        let mut last = None;
        for poa in incse.points_of_access() {
            match self.register_via(&poa, &incse).await {
                Ok(rsc) => return Ok(rsc),
                Err(e) => {
                    warn!(poa = %poa, error = %e, "Registration attempt failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| anyhow::anyhow!("IN-CSE {} has no point of access", incse.csi)))
    }

    async fn register_via(&self, poa: &str, incse: &UpstreamCse) -> Result<ResponseStatusCode> {
        let originator = self.identity.sp_relative_id();
        let address = incse.registration_address(&self.identity.name);

        let request = RequestPrimitive::new(Operation::Retrieve, address.clone(), originator.clone());
        let rsp = self.binders.send(poa, request).await?;
        info!(to = %address, rsc = %rsp.rsc, "Retrieved registration");

        let rqp = match rsp.rsc {
            ResponseStatusCode::NotFound => RequestPrimitive::new(
                Operation::Create,
                format!("/{}/{}", incse.csi, incse.rn),
                originator,
            )
            .with_type(ResourceType::RemoteCse)
            .with_content(json!({
                "m2m:csr": {
                    "rn": self.identity.name,
                    "cb": self.identity.absolute_id(),
                    "csi": self.identity.sp_relative_id(),
                    "cst": self.cse_type.code(),
                    "poa": self.poa,
                    "rr": true,
                }
            })),
            ResponseStatusCode::Ok => RequestPrimitive::new(Operation::Update, address, originator)
                .with_content(json!({ "m2m:csr": { "poa": self.poa } })),
            other => bail!("unexpected {} for {}", other, address),
        };

        let (op, to) = (rqp.op, rqp.to.clone());
        let rsp = self.binders.send(poa, rqp).await?;
        if !rsp.is_success() {
            bail!(
                "{} {} rejected with {}: {}",
                op,
                to,
                rsp.rsc,
                rsp.debug_message().unwrap_or_default()
            );
        }
        info!(op = %op, to = %to, rsc = %rsp.rsc, "Registered with IN-CSE");
        Ok(rsp.rsc)
    }

    /// Re-asserts the registration every `every` until the task is
    /// cancelled.
    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut timer = interval(every);
        loop {
            timer.tick().await;
            if let Err(e) = self.register().await {
                error!(error = %e, "Registration with IN-CSE failed");
            }
        }
    }

    /// Takes in a CSE announcement. Returns true when it came from the
    /// configured IN-CSE, whose points of access are then adopted.
    pub fn accept_announcement(&self, payload: &[u8]) -> bool {
        let Ok(cse) = serde_json::from_slice::<Value>(payload) else {
            debug!("Ignoring malformed CSE announcement");
            return false;
        };
        let is_in = cse.get("cst").and_then(Value::as_u64) == Some(u64::from(CseType::In.code()));
        let rn = cse.get("rn").and_then(Value::as_str).unwrap_or_default();

        let mut guard = match self.upstream.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(incse) = guard.as_mut() else {
            return false;
        };
        if !is_in || rn != incse.rn {
            return false;
        }
        if let Some(csi) = cse.get("csi").and_then(Value::as_str) {
            incse.csi = csi.trim_start_matches('/').to_string();
        }
        let poa: Vec<String> = match cse.get("poa") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            Some(Value::String(list)) => list.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        };
        if !poa.is_empty() {
            incse.poa = poa;
        }
        info!(csi = %incse.csi, poa = ?incse.poa, "IN-CSE announced itself");
        true
    }
}

/// Publishes the CSEBase retained on `{class}/cse/{csi}` and watches the
/// announcements of other CSEs. The announcement is re-published whenever
/// the retained message is cleared; announcements of the IN-CSE trigger a
/// fresh registration.
pub async fn announce(
    mqtt: Arc<MqttBinder>,
    csi: String,
    cse_base: Value,
    registrar: Option<Arc<Registrar>>,
) -> Result<()> {
    let topic = mqtt.topics().announcement(&csi);
    let payload = serde_json::to_vec(&cse_base).context("Failed to encode CSE announcement")?;
    let mut announcements = mqtt.announcements();

    mqtt.subscribe(&mqtt.topics().announcement_filter())
        .await
        .context("Failed to subscribe to CSE announcements")?;
    mqtt.publish(&topic, payload.clone(), true)
        .await
        .context("Failed to publish CSE announcement")?;
    info!(topic = %topic, "Announced CSEBase");

    loop {
        match announcements.recv().await {
            Ok((seen, body)) if seen == topic => {
                if body.is_empty() {
                    warn!(topic = %topic, "Announcement cleared, publishing again");
                    if let Err(e) = mqtt.publish(&topic, payload.clone(), true).await {
                        error!(topic = %topic, error = %e, "Failed to re-publish announcement");
                    }
                }
            }
            Ok((seen, body)) => {
                let Some(registrar) = &registrar else {
                    continue;
                };
                if registrar.accept_announcement(&body) {
                    debug!(topic = %seen, "Registering after IN-CSE announcement");
                    let registrar = Arc::clone(registrar);
                    tokio::spawn(async move {
                        if let Err(e) = registrar.register().await {
                            error!(error = %e, "Registration after announcement failed");
                        }
                    });
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed CSE announcements");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}
