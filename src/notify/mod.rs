//! Notification engine: evaluates subscriptions after a mutation and
//! delivers notifications to their notification URIs.

use crate::binder::{poa_path, scheme_of, BinderRegistry};
use crate::crud::CrudEngine;
use crate::error::{CseError, CseResult};
use crate::primitive::{
    FilterCriteria, NotificationEventType, Operation, RequestPrimitive, ResourceType,
    ResponseStatusCode,
};
use crate::resource::{Resource, SubscriptionAttributes};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// A subscription together with the event it would report.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub subscription: Resource,
    pub event: NotificationEventType,
}

/// Event type reported to subscriptions on the resource itself (`own`) or
/// on its parent.
pub fn event_type(op: Operation, own: bool) -> Option<NotificationEventType> {
    match (op, own) {
        (Operation::Update, true) => Some(NotificationEventType::UpdateOfResource),
        (Operation::Delete, true) => Some(NotificationEventType::DeleteOfResource),
        (Operation::Create, false) => Some(NotificationEventType::CreateOfDirectChildResource),
        (Operation::Delete, false) => Some(NotificationEventType::DeleteOfDirectChildResource),
        (Operation::Retrieve, true) => Some(NotificationEventType::RetrieveOfContainerWithNoChild),
        _ => None,
    }
}

/// Whether `sub` wants to hear about `event`, caused by `op`, on `res`.
///
/// A subscription without `enc` is not skipped: it is reported every
/// mutation (create, update and delete events) and never a Retrieve. An
/// attribute filter only counts together with an operation monitor naming
/// `op`.
pub fn matches_criteria(
    sub: &SubscriptionAttributes,
    event: NotificationEventType,
    op: Operation,
    res: &Resource,
) -> bool {
    let Some(enc) = &sub.enc else {
        return op.is_mutating();
    };

    if enc.net.is_empty() {
        if !op.is_mutating() {
            return false;
        }
    } else if !enc.net.contains(&event) {
        return false;
    }

    let monitored = enc
        .om
        .as_ref()
        .map_or(false, |om| om.opr.contains(&op));

    match enc.atr.as_ref().filter(|atr| !atr.is_empty()) {
        Some(atr) => {
            if !atr.ty.is_empty() && !atr.ty.contains(&res.ty) {
                return false;
            }
            if !atr.lbl.is_empty() && !atr.lbl.iter().any(|l| res.lbl.contains(l)) {
                return false;
            }
            monitored
        }
        None => match &enc.om {
            Some(om) if !om.opr.is_empty() => monitored,
            _ => true,
        },
    }
}

/// `m2m:sgn` envelope for `res` reported to subscription `sur`.
pub fn build_notification(
    sur: &str,
    event: NotificationEventType,
    res: &Resource,
    rsc: ResponseStatusCode,
) -> Value {
    json!({
        "m2m:sgn": {
            "nev": {
                "rep": res.wrapped(),
                "net": event.code(),
                "rss": rsc.code(),
            },
            "sur": sur,
        }
    })
}

pub struct NotificationEngine {
    crud: Arc<CrudEngine>,
    binders: Arc<BinderRegistry>,
    /// SP-relative CSE-ID, e.g. `/mb`
    cse_id: String,
}

impl NotificationEngine {
    pub fn new(crud: Arc<CrudEngine>, binders: Arc<BinderRegistry>, cse_id: &str) -> Self {
        Self {
            crud,
            binders,
            cse_id: format!("/{}", cse_id.trim_start_matches('/')),
        }
    }

    /// Subscriptions that may report `op` on `res`. For Delete this must run
    /// before the resource (and its subscriptions) are removed.
    pub async fn candidates(&self, op: Operation, res: &Resource) -> Vec<Candidate> {
        let mut found = Vec::new();
        if let Some(event) = event_type(op, true) {
            for subscription in self.subscriptions_of(&res.path).await {
                found.push(Candidate { subscription, event });
            }
        }
        if let Some(event) = event_type(op, false) {
            if !res.parent_path.is_empty() {
                for subscription in self.subscriptions_of(&res.parent_path).await {
                    found.push(Candidate { subscription, event });
                }
            }
        }
        found
    }

    async fn subscriptions_of(&self, path: &str) -> Vec<Resource> {
        let fc = FilterCriteria::of_type(ResourceType::Subscription);
        match self.crud.retrieve_children(path, Some(&fc)).await {
            Ok(subs) => subs,
            Err(e) => {
                debug!(path = %path, error = %e, "No subscriptions looked up");
                Vec::new()
            }
        }
    }

    /// Evaluates `candidates` and delivers every matching notification.
    /// Returns the number of notifications sent.
    pub async fn fire(
        &self,
        op: Operation,
        res: &Resource,
        rsc: ResponseStatusCode,
        candidates: Vec<Candidate>,
    ) -> usize {
        let mut sent = 0;
        for Candidate { subscription, event } in candidates {
            let Some(attrs) = subscription.subscription() else {
                continue;
            };
            if attrs.nu.is_empty() || !matches_criteria(attrs, event, op, res) {
                continue;
            }
            let sur = format!("{}/{}", self.cse_id, subscription.ri);
            let content = build_notification(&sur, event, res, rsc);
            sent += self.deliver(&subscription, attrs, content).await;
        }
        sent
    }

    /// Looks up and fires notifications for a Create, Update or Retrieve.
    pub async fn process(&self, op: Operation, res: &Resource, rsc: ResponseStatusCode) -> usize {
        let candidates = self.candidates(op, res).await;
        if candidates.is_empty() {
            return 0;
        }
        self.fire(op, res, rsc, candidates).await
    }

    /// Sends `content` to each notification URI of `sub` in turn. Failures
    /// are logged and do not stop the remaining destinations.
    async fn deliver(&self, sub: &Resource, attrs: &SubscriptionAttributes, content: Value) -> usize {
        let mut delivered = 0;
        for nu in &attrs.nu {
            let (poa, to) = match self.resolve_destination(nu, sub).await {
                Ok(destination) => destination,
                Err(e) => {
                    warn!(sub = %sub.ri, nu = %nu, error = %e, "Unresolvable notification URI");
                    continue;
                }
            };
            let rqp = RequestPrimitive::new(Operation::Notify, to, self.cse_id.clone())
                .with_content(content.clone());
            match self.binders.send(&poa, rqp).await {
                Ok(rsp) if rsp.is_success() => {
                    debug!(sub = %sub.ri, poa = %poa, "Notification delivered");
                    delivered += 1;
                }
                Ok(rsp) => {
                    warn!(sub = %sub.ri, poa = %poa, rsc = rsp.rsc.code(), "Notification rejected");
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        sub = %sub.ri,
                        poa = %poa,
                        cr = sub.cr.as_deref().unwrap_or_default(),
                        error = %e,
                        "No response to notification"
                    );
                }
            }
        }
        delivered
    }

    /// `(point of access, target address)` for one notification URI.
    async fn resolve_destination(&self, nu: &str, sub: &Resource) -> CseResult<(String, String)> {
        if scheme_of(nu).is_some() {
            let path = poa_path(nu);
            let creator = sub.cr.as_deref().unwrap_or_default();
            if !path.is_empty() {
                if !creator.is_empty() && path != creator.trim_start_matches('/') {
                    debug!(sub = %sub.ri, nu = %nu, "Notification URI does not name the creator");
                }
                return Ok((nu.to_string(), path.to_string()));
            }
            if creator.is_empty() {
                return Ok((nu.to_string(), String::new()));
            }
            let readdressed = crate::binder::with_poa_path(nu, creator);
            debug!(sub = %sub.ri, poa = %readdressed, "Notification re-addressed to creator");
            return Ok((readdressed, creator.trim_start_matches('/').to_string()));
        }

        // A resource reference: notify the entity at its first point of access.
        let reference = nu.trim_start_matches('/');
        let target = match self.crud.retrieve_by_id(reference).await {
            Ok(target) => target,
            Err(_) => {
                let path = reference.strip_prefix(self.cse_id.trim_start_matches('/')).map_or(
                    reference,
                    |rest| rest.trim_start_matches('/'),
                );
                self.crud.retrieve(path).await?
            }
        };
        let poa = target
            .poa()
            .first()
            .cloned()
            .ok_or_else(|| CseError::Unreachable(format!("{} has no point of access", nu)))?;
        Ok((poa, target.ri.clone()))
    }
}
