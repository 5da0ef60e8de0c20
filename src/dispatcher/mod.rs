//! Request dispatcher: takes every inbound primitive through address
//! resolution, access control, validation, execution and response
//! composition.

pub mod address;

pub use address::{CseIdentity, Locality};

use crate::acp::AccessControl;
use crate::binder::{BinderRegistry, RequestHandler};
use crate::check::{can_host_subscriptions, check_request, is_possible_child, ValidationError};
use crate::collector::Collector;
use crate::crud::CrudEngine;
use crate::error::{CseError, CseResult};
use crate::federation::SharedUpstream;
use crate::notify::{Candidate, NotificationEngine};
use crate::primitive::{
    new_request_id, CseType, FilterCriteria, Operation, RequestPrimitive, ResourceType,
    ResponsePrimitive, ResponseStatusCode,
};
use crate::resource::{
    looks_like_resource_id, unwrap_content, Attributes, Resource, VirtualResource,
};
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    identity: CseIdentity,
    cse_type: CseType,
    crud: Arc<CrudEngine>,
    access: Arc<AccessControl>,
    collector: Collector,
    notifier: Arc<NotificationEngine>,
    binders: Arc<BinderRegistry>,
    /// IN-CSE this node forwards foreign targets to (MN and ASN only)
    upstream: Option<SharedUpstream>,
}

impl Dispatcher {
    pub fn new(
        identity: CseIdentity,
        cse_type: CseType,
        crud: Arc<CrudEngine>,
        access: Arc<AccessControl>,
        binders: Arc<BinderRegistry>,
        collector_concurrency: usize,
    ) -> Self {
        let notifier = Arc::new(NotificationEngine::new(
            Arc::clone(&crud),
            Arc::clone(&binders),
            &identity.csi,
        ));
        Self {
            collector: Collector::new(Arc::clone(&crud), collector_concurrency),
            identity,
            cse_type,
            crud,
            access,
            notifier,
            binders,
            upstream: None,
        }
    }

    pub fn with_upstream(mut self, upstream: SharedUpstream) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Runs one request to its terminal response. Boxed because group
    /// fan-out dispatches member requests recursively.
    fn dispatch(&self, mut rqp: RequestPrimitive) -> BoxFuture<'_, CseResult<ResponsePrimitive>> {
        async move {
            rqp.to = VirtualResource::normalize(rqp.to.trim());

            let path = match self.identity.locate(&rqp.to) {
                Locality::Local(path) => path,
                elsewhere => return self.forward(rqp, elsewhere).await,
            };
            let path = self.resolve_path(&path).await?;
            rqp.to = path.clone();

            match VirtualResource::split(&path) {
                (base, Some(VirtualResource::FanOutPoint)) => self.fan_out(rqp, base).await,
                (base, Some(vr)) => self.latest_or_oldest(rqp, base, vr).await,
                (_, None) => self.local(rqp, &path).await,
            }
        }
        .boxed()
    }

    /// Replaces a leading resource id with the structured path it names.
    async fn resolve_path(&self, local: &str) -> CseResult<String> {
        let (first, rest) = match local.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (local, None),
        };
        let base = if first == self.identity.csi {
            self.identity.name.clone()
        } else if first != self.identity.name && looks_like_resource_id(first) {
            self.crud
                .retrieve_by_id(first)
                .await
                .map_err(|_| CseError::NotFound(format!("unknown resource id {}", first)))?
                .path
        } else {
            return Ok(local.to_string());
        };
        Ok(match rest {
            Some(rest) if !rest.is_empty() => format!("{}/{}", base, rest),
            _ => base,
        })
    }

    async fn local(&self, rqp: RequestPrimitive, path: &str) -> CseResult<ResponsePrimitive> {
        if rqp.op == Operation::Create {
            return self.create(rqp, path).await;
        }
        let target = self.crud.retrieve(path).await?;
        self.access.enforce(&rqp, &target).await?;
        check_request(&rqp, Some(target.ty))?;
        self.execute(rqp, target).await
    }

    /// `/la` and `/ol` act on the newest or oldest contentInstance.
    async fn latest_or_oldest(
        &self,
        rqp: RequestPrimitive,
        base: &str,
        vr: VirtualResource,
    ) -> CseResult<ResponsePrimitive> {
        let container = self.crud.retrieve(base).await?;
        check_request(&rqp, Some(container.ty))?;
        let target = self.crud.resolve_virtual(base, vr).await?;
        self.access.enforce(&rqp, &target).await?;
        self.execute(rqp, target).await
    }

    async fn execute(&self, rqp: RequestPrimitive, target: Resource) -> CseResult<ResponsePrimitive> {
        match rqp.op {
            Operation::Retrieve => self.retrieve(rqp, target).await,
            Operation::Update => self.update(rqp, target).await,
            Operation::Delete => self.delete(rqp, target).await,
            Operation::Notify => self.retarget_notify(rqp, target).await,
            Operation::Create => Err(CseError::Validation(format!(
                "'{}' cannot be created at {}",
                rqp.ty.map_or("resource".to_string(), |ty| ty.to_string()),
                target.path
            ))),
        }
    }

    async fn create(&self, rqp: RequestPrimitive, path: &str) -> CseResult<ResponsePrimitive> {
        let parent = self.crud.retrieve(path).await?;
        if let Some(ty) = rqp.ty {
            if !is_possible_child(parent.ty, ty) {
                return Err(CseError::Validation(format!(
                    "not allowed resource type '{}' under '{}'",
                    ty, parent.ty
                )));
            }
        }
        self.access.enforce(&rqp, &parent).await?;
        check_request(&rqp, Some(parent.ty))?;

        let (Some(ty), Some(pc)) = (rqp.ty, rqp.pc.as_ref()) else {
            return Err(ValidationError::MissingContent(rqp.op).into());
        };
        let body = unwrap_content(ty, pc)?;
        if let Some(Value::String(rn)) = body.get("rn") {
            let existing = format!("{}/{}", parent.path, rn);
            if self.crud.retrieve(&existing).await.is_ok() {
                return Err(CseError::Conflict(format!("resource exists: {}", existing)));
            }
        }

        let created = self.crud.create(&parent, ty, body, &rqp.fr).await?;
        let pc = self.collector.collect(&rqp, &created).await?;
        if can_host_subscriptions(parent.ty) {
            self.notify_later(Operation::Create, created, ResponseStatusCode::Created, None);
        }
        Ok(self.respond(&rqp, ResponseStatusCode::Created, pc))
    }

    async fn retrieve(&self, rqp: RequestPrimitive, target: Resource) -> CseResult<ResponsePrimitive> {
        let pc = self.collector.collect(&rqp, &target).await?;
        if target.container().is_some() && self.has_no_children(&target).await {
            self.notify_later(Operation::Retrieve, target, ResponseStatusCode::Ok, None);
        }
        Ok(self.respond(&rqp, ResponseStatusCode::Ok, pc))
    }

    async fn update(&self, rqp: RequestPrimitive, target: Resource) -> CseResult<ResponsePrimitive> {
        let Some(pc) = rqp.pc.as_ref() else {
            return Err(ValidationError::MissingContent(rqp.op).into());
        };
        let body = unwrap_content(target.ty, pc)?;
        let updated = self.crud.update(&target, body).await?;
        let pc = self.collector.collect(&rqp, &updated).await?;
        if can_host_subscriptions(updated.ty) {
            self.notify_later(Operation::Update, updated, ResponseStatusCode::Ok, None);
        }
        Ok(self.respond(&rqp, ResponseStatusCode::Ok, pc))
    }

    async fn delete(&self, rqp: RequestPrimitive, target: Resource) -> CseResult<ResponsePrimitive> {
        // Subscriptions on the resource go away with it.
        let candidates = self.notifier.candidates(Operation::Delete, &target).await;
        let removed = self.crud.delete(&target).await?;
        debug!(path = %target.path, removed, "Subtree deleted");
        if !candidates.is_empty() {
            self.notify_later(Operation::Delete, target, ResponseStatusCode::Ok, Some(candidates));
        }
        Ok(self.respond(&rqp, ResponseStatusCode::Ok, None))
    }

    /// Subscriptions watching `res` do not count as its children.
    async fn has_no_children(&self, res: &Resource) -> bool {
        match self.crud.retrieve_children(&res.path, None).await {
            Ok(children) => children.iter().all(|child| child.ty == ResourceType::Subscription),
            Err(e) => {
                warn!(path = %res.path, error = %e, "Failed to list children");
                false
            }
        }
    }

    /// A Notify addressed to an `<AE>` is re-targeted to its point of access.
    async fn retarget_notify(&self, rqp: RequestPrimitive, target: Resource) -> CseResult<ResponsePrimitive> {
        if target.ty != ResourceType::Ae {
            return Err(CseError::Validation(format!(
                "'Notify' operation is not applicable to '{}' resource",
                target.ty
            )));
        }
        if target.poa().is_empty() {
            return Err(CseError::Unreachable(format!(
                "AE {} has no point of access",
                target.ri
            )));
        }
        let mut retargeted = rqp.clone();
        retargeted.to = target.ri.clone();
        debug!(rqi = %rqp.rqi, ae = %target.ri, "Re-targeting notification");
        let rsp = self.binders.send_any(target.poa(), &retargeted).await?;
        Ok(self.relay(&rqp, rsp))
    }

    /// Re-issues the request to every member of a group in parallel and
    /// aggregates their responses.
    async fn fan_out(&self, rqp: RequestPrimitive, base: &str) -> CseResult<ResponsePrimitive> {
        let group = self.crud.retrieve(base).await?;
        self.access.enforce(&rqp, &group).await?;
        let Some(members) = group.group().map(|grp| grp.mid.clone()) else {
            return Err(ValidationError::VirtualParent(VirtualResource::FanOutPoint, group.ty).into());
        };

        let requests = members.into_iter().map(|member| {
            let mut member_rqp = rqp.clone();
            member_rqp.to = member.trim().to_string();
            member_rqp.rqi = new_request_id();
            async move {
                match self.dispatch(member_rqp.clone()).await {
                    Ok(rsp) => rsp,
                    Err(e) => {
                        debug!(member = %member_rqp.to, error = %e, "Group member failed");
                        ResponsePrimitive::from_error(&member_rqp, &self.identity.sp_relative_id(), &e)
                    }
                }
            }
        });
        let responses: Vec<Value> = join_all(requests).await.into_iter().map(aggregate_entry).collect();

        debug!(group = %group.path, members = responses.len(), "Fan-out complete");
        Ok(self.respond(
            &rqp,
            ResponseStatusCode::Ok,
            Some(json!({ "m2m:agr": { "m2m:rsp": responses } })),
        ))
    }

    /// Sends a request for another CSE towards it: straight to a registered
    /// remoteCSE when there is one, otherwise to the IN-CSE.
    async fn forward(&self, mut rqp: RequestPrimitive, locality: Locality) -> CseResult<ResponsePrimitive> {
        let (csi, to) = match locality {
            Locality::Remote { csi, to } => (Some(csi), to),
            Locality::Foreign { to, .. } => (None, to),
            Locality::Local(path) => return self.local(rqp, &path).await,
        };

        let registered = match &csi {
            Some(csi) => self.registered_poa(csi).await,
            None => None,
        };
        let poa = match registered {
            Some(poa) => poa,
            None if self.cse_type == CseType::In => {
                return Err(CseError::Unreachable(format!("not registered remoteCSE: {}", to)));
            }
            None => self.upstream_poa().ok_or_else(|| {
                CseError::Unreachable(format!("no IN-CSE to forward {} to", to))
            })?,
        };

        let original = rqp.clone();
        rqp.to = to;
        info!(rqi = %rqp.rqi, to = %rqp.to, "Forwarding request");
        let rsp = self.binders.send_any(&poa, &rqp).await?;
        Ok(self.relay(&original, rsp))
    }

    /// Points of access of the remoteCSE registered here as `csi`.
    async fn registered_poa(&self, csi: &str) -> Option<Vec<String>> {
        let fc = FilterCriteria::of_type(ResourceType::RemoteCse);
        let registered = match self.crud.retrieve_children(&self.identity.name, Some(&fc)).await {
            Ok(registered) => registered,
            Err(e) => {
                warn!(error = %e, "Failed to list registered CSEs");
                return None;
            }
        };
        registered.into_iter().find_map(|res| {
            let Attributes::RemoteCse(csr) = &res.attrs else {
                return None;
            };
            (csr.csi.trim_start_matches('/') == csi && !csr.poa.is_empty()).then(|| csr.poa.clone())
        })
    }

    fn upstream_poa(&self) -> Option<Vec<String>> {
        let upstream = self.upstream.as_ref()?;
        let guard = match upstream.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .as_ref()
            .map(|incse| incse.points_of_access())
            .filter(|poa| !poa.is_empty())
    }

    fn notify_later(
        &self,
        op: Operation,
        res: Resource,
        rsc: ResponseStatusCode,
        candidates: Option<Vec<Candidate>>,
    ) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let sent = match candidates {
                Some(candidates) => notifier.fire(op, &res, rsc, candidates).await,
                None => notifier.process(op, &res, rsc).await,
            };
            if sent > 0 {
                debug!(path = %res.path, op = %op, sent, "Notifications sent");
            }
        });
    }

    fn respond(&self, rqp: &RequestPrimitive, rsc: ResponseStatusCode, pc: Option<Value>) -> ResponsePrimitive {
        ResponsePrimitive::new(rqp, &self.identity.sp_relative_id(), rsc, pc)
    }

    /// A response obtained from a peer, re-correlated with the request
    /// that caused it.
    fn relay(&self, rqp: &RequestPrimitive, mut rsp: ResponsePrimitive) -> ResponsePrimitive {
        rsp.rqi = rqp.rqi.clone();
        rsp.to = rqp.fr.clone();
        if rsp.fr.is_empty() {
            rsp.fr = self.identity.sp_relative_id();
        }
        rsp
    }
}

/// One entry of `m2m:agr`; the member request id is not part of it.
fn aggregate_entry(rsp: ResponsePrimitive) -> Value {
    let mut entry = Map::new();
    entry.insert("rsc".into(), Value::from(rsp.rsc.code()));
    entry.insert("fr".into(), Value::from(rsp.fr));
    entry.insert("to".into(), Value::from(rsp.to));
    if let Some(pc) = rsp.pc {
        entry.insert("pc".into(), pc);
    }
    Value::Object(entry)
}

#[async_trait]
impl RequestHandler for Dispatcher {
    async fn handle(&self, rqp: RequestPrimitive) -> ResponsePrimitive {
        let started = Instant::now();
        let rsp = match self.dispatch(rqp.clone()).await {
            Ok(rsp) => rsp,
            Err(e) => {
                debug!(rqi = %rqp.rqi, error = %e, "Request failed");
                ResponsePrimitive::from_error(&rqp, &self.identity.sp_relative_id(), &e)
            }
        };
        info!(
            rqi = %rqp.rqi,
            op = %rqp.op,
            to = %rqp.to,
            fr = %rqp.fr,
            rsc = rsp.rsc.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );
        rsp
    }
}

#[cfg(test)]
mod tests;
