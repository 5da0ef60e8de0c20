//! Assembles a CSE from its configuration and runs its bindings and
//! background tasks.

use crate::acp::AccessControl;
use crate::binder::http::{serve, HttpAppState};
use crate::binder::{BinderRegistry, HttpBinder, MqttBinder, RequestHandler};
use crate::config::{CseConfig, StoreBackend};
use crate::crud::CrudEngine;
use crate::dispatcher::{CseIdentity, Dispatcher};
use crate::error::CseError;
use crate::federation::{announce, shared_upstream, Registrar};
use crate::primitive::{CseType, ResourceType};
use crate::resource::Resource;
use crate::store::{MemoryStore, ResourceStore, SqliteStore};
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Resource types this CSE hosts, announced in `srt`.
pub const SUPPORTED_RESOURCE_TYPES: [ResourceType; 8] = [
    ResourceType::AccessControlPolicy,
    ResourceType::Ae,
    ResourceType::Container,
    ResourceType::ContentInstance,
    ResourceType::CseBase,
    ResourceType::Group,
    ResourceType::RemoteCse,
    ResourceType::Subscription,
];

/// Creates the CSEBase on first start, or refreshes its role, points of
/// access and labels on a store that already holds it.
pub async fn bootstrap_cse_base(
    crud: &CrudEngine,
    identity: &CseIdentity,
    cse_type: CseType,
    poa: &[String],
    labels: &[String],
) -> Result<Resource> {
    match crud.retrieve(&identity.name).await {
        Ok(existing) => {
            let patch: Map<String, Value> =
                serde_json::from_value(json!({ "cst": cse_type.code(), "poa": poa, "lbl": labels }))?;
            let updated = crud
                .update(&existing, patch)
                .await
                .context("Failed to refresh CSEBase")?;
            info!(name = %identity.name, "CSEBase loaded from store");
            Ok(updated)
        }
        Err(CseError::NotFound(_)) => {
            let srt: Vec<u16> = SUPPORTED_RESOURCE_TYPES.iter().map(|ty| ty.code()).collect();
            let record: Map<String, Value> = serde_json::from_value(json!({
                "ty": ResourceType::CseBase.code(),
                "ri": identity.csi,
                "rn": identity.name,
                "pi": "",
                "csi": identity.sp_relative_id(),
                "cst": cse_type.code(),
                "srt": srt,
                "poa": poa,
                "lbl": labels,
                "cb": identity.absolute_id(),
            }))?;
            let root = Resource::from_map(&identity.name, "", record)?;
            crud.store()
                .create(&root)
                .await
                .context("Failed to create CSEBase")?;
            info!(name = %identity.name, csi = %identity.csi, "CSEBase created");
            Ok(root)
        }
        Err(e) => Err(e).context("Failed to look up CSEBase"),
    }
}

/// Points of access other entities reach this CSE at.
pub fn points_of_access(config: &CseConfig) -> Result<Vec<String>> {
    if !config.cse.poa.is_empty() {
        return Ok(config.cse.poa.clone());
    }
    let mut poa = Vec::new();
    if config.http.enabled {
        poa.push(config.http.point_of_access());
    }
    if config.mqtt.enabled {
        poa.push(config.mqtt.point_of_access()?);
    }
    Ok(poa)
}

fn open_store(config: &CseConfig) -> Result<Arc<dyn ResourceStore>> {
    Ok(match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(
            SqliteStore::new(&config.store.path)
                .with_context(|| format!("Failed to open resource store {}", config.store.path))?,
        ),
    })
}

/// A configured CSE, ready to run.
pub struct Node {
    config: CseConfig,
    identity: CseIdentity,
    cse_type: CseType,
    cse_base: Resource,
    dispatcher: Arc<Dispatcher>,
    mqtt: Option<Arc<MqttBinder>>,
    registrar: Option<Arc<Registrar>>,
}

impl Node {
    pub async fn build(config: CseConfig) -> Result<Self> {
        let identity = CseIdentity::new(&config.cse.id, &config.cse.name, &config.cse.sp);
        let cse_type = config.cse.cse_type()?;
        let upstream = config.cse.upstream()?;
        let timeout = config.runtime.request_timeout();

        let store = open_store(&config)?;
        let crud = Arc::new(CrudEngine::new(Arc::clone(&store)));
        let trusted = std::iter::once(identity.csi.clone())
            .chain(config.security.admin_originators.iter().cloned());
        let access = Arc::new(AccessControl::new(
            store,
            config.security.root_policy,
            trusted,
        ));

        let binders = Arc::new(BinderRegistry::new());
        binders.register(Arc::new(
            HttpBinder::new(identity.sp_relative_id(), timeout)
                .context("Failed to initialize HTTP binder")?,
        ));
        let mqtt = if config.mqtt.enabled {
            let mqtt = Arc::new(MqttBinder::new(
                &identity.csi,
                &config.mqtt.topic_class,
                config.mqtt.broker()?,
                config.mqtt.share,
                timeout,
            ));
            binders.register(mqtt.clone());
            Some(mqtt)
        } else {
            None
        };

        let poa = points_of_access(&config)?;
        let cse_base =
            bootstrap_cse_base(&crud, &identity, cse_type, &poa, &config.cse.labels).await?;

        let mut dispatcher = Dispatcher::new(
            identity.clone(),
            cse_type,
            crud,
            access,
            Arc::clone(&binders),
            config.runtime.collector_concurrency,
        );
        let registrar = match upstream {
            Some(upstream) => {
                info!(in_csi = %upstream.csi, in_name = %upstream.rn, "Registering with IN-CSE");
                let upstream = shared_upstream(Some(upstream));
                dispatcher = dispatcher.with_upstream(Arc::clone(&upstream));
                Some(Arc::new(Registrar::new(
                    identity.clone(),
                    cse_type,
                    poa.clone(),
                    upstream,
                    binders,
                )))
            }
            None => None,
        };

        info!(
            csi = %identity.csi,
            name = %identity.name,
            cse_type = %cse_type,
            poa = ?poa,
            "CSE initialized"
        );
        Ok(Self {
            config,
            identity,
            cse_type,
            cse_base,
            dispatcher: Arc::new(dispatcher),
            mqtt,
            registrar,
        })
    }

    pub fn cse_type(&self) -> CseType {
        self.cse_type
    }

    pub fn handler(&self) -> Arc<dyn RequestHandler> {
        self.dispatcher.clone()
    }

    pub fn http_state(&self) -> Arc<HttpAppState> {
        Arc::new(HttpAppState {
            handler: self.handler(),
            cse_id: self.identity.sp_relative_id(),
        })
    }

    /// Starts the bindings and background tasks and runs until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if let Some(mqtt) = &self.mqtt {
            mqtt.listen(self.handler());
            let announcement = Value::Object(self.cse_base.to_map());
            let mqtt = Arc::clone(mqtt);
            let csi = self.identity.csi.clone();
            let registrar = self.registrar.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = announce(mqtt, csi, announcement, registrar).await {
                    error!(error = %e, "CSE announcement stopped");
                }
            }));
        }

        if let Some(registrar) = &self.registrar {
            let every = self.config.runtime.registration_interval();
            tasks.push(tokio::spawn(Arc::clone(registrar).run(every)));
        }

        if self.config.http.enabled {
            let state = self.http_state();
            let host = self.config.http.host.clone();
            let port = self.config.http.port;
            tasks.push(tokio::spawn(async move {
                if let Err(e) = serve(state, &host, port).await {
                    error!(error = %e, "HTTP binding error");
                }
            }));
        }

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl_c signal")?;
        info!("Shutdown signal received");

        for task in tasks {
            task.abort();
        }
        info!(csi = %self.identity.csi, "CSE stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{Operation, RequestPrimitive, ResponseStatusCode};

    fn config(toml: &str) -> CseConfig {
        toml::from_str(toml).unwrap()
    }

    #[tokio::test]
    async fn test_build_in_cse() {
        let node = Node::build(config(
            r#"
            [cse]
            labels = ["factory"]
            [security]
            admin_originators = ["CAdmin"]
            "#,
        ))
        .await
        .unwrap();
        assert_eq!(node.cse_type(), CseType::In);

        let rsp = node
            .handler()
            .handle(RequestPrimitive::new(Operation::Retrieve, "/mb", "CAdmin"))
            .await;
        assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
        let cb = &rsp.pc.unwrap()["m2m:cb"];
        assert_eq!(cb["csi"], "/mb");
        assert_eq!(cb["cst"], 1);
        assert_eq!(cb["srt"], json!([1, 2, 3, 4, 5, 9, 16, 23]));
        assert_eq!(cb["poa"], json!(["http://0.0.0.0:7579"]));
        assert_eq!(cb["lbl"], json!(["factory"]));
    }

    #[tokio::test]
    async fn test_build_rejects_mn_without_in() {
        let err = Node::build(config("[cse]\ntype = \"MN\"")).await.err().unwrap();
        assert!(err.to_string().contains("point of access"));
    }

    #[tokio::test]
    async fn test_cse_base_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cse.db");
        let toml = format!(
            "[store]\nbackend = \"sqlite\"\npath = \"{}\"\n[cse]\npoa = [\"http://cse.local:7579\"]",
            path.display()
        );

        let node = Node::build(config(&toml)).await.unwrap();
        let rsp = node
            .handler()
            .handle(
                RequestPrimitive::new(Operation::Create, "mobius", "S0001")
                    .with_type(ResourceType::Ae)
                    .with_content(json!({ "m2m:ae": { "rn": "app", "api": "Napp", "rr": false } })),
            )
            .await;
        assert_eq!(rsp.rsc, ResponseStatusCode::Created);
        drop(node);

        let node = Node::build(config(&toml)).await.unwrap();
        let rsp = node
            .handler()
            .handle(RequestPrimitive::new(Operation::Retrieve, "mobius/app", "S0001"))
            .await;
        assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
        assert_eq!(node.cse_base.poa(), ["http://cse.local:7579".to_string()]);
    }
}
