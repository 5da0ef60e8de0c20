//! CRUD engine: turns validated requests into store operations and keeps
//! parent state (state tag, instance and byte counters) consistent.

use crate::error::{CseError, CseResult, StoreError};
use crate::primitive::time::{format_timestamp, now};
use crate::primitive::{DiscResType, FilterCriteria, Operation, ResourceType, SortType};
use crate::resource::{
    content_size, generate_resource_id, Attributes, Resource, VirtualResource,
};
use crate::store::{ParentDelta, ResourceStore};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Whether mutations of a child bump the state tag of a parent of type `ty`.
fn tracks_child_state(ty: ResourceType) -> bool {
    matches!(
        ty,
        ResourceType::Container
            | ResourceType::ContentInstance
            | ResourceType::Delivery
            | ResourceType::Request
    )
}

/// Whether a child of type `child` counts towards the instance and byte
/// totals of a parent of type `parent`.
fn counts_content(parent: ResourceType, child: ResourceType) -> bool {
    parent == ResourceType::Container && child == ResourceType::ContentInstance
}

/// Types that carry a state tag of their own.
fn carries_state_tag(ty: ResourceType) -> bool {
    matches!(
        ty,
        ResourceType::Container
            | ResourceType::ContentInstance
            | ResourceType::Subscription
            | ResourceType::Delivery
            | ResourceType::Request
    )
}

/// The single parent-state policy consulted by Create, Update and Delete.
pub fn parent_delta(parent: ResourceType, child: &Resource, op: Operation) -> ParentDelta {
    let mut delta = ParentDelta::default();
    if !op.is_mutating() {
        return delta;
    }
    delta.bump_state_tag = tracks_child_state(parent);
    if counts_content(parent, child.ty) {
        let size = child.content_size().unwrap_or(0) as i64;
        match op {
            Operation::Create => {
                delta.instances = 1;
                delta.bytes = size;
            }
            Operation::Delete => {
                delta.instances = -1;
                delta.bytes = -size;
            }
            _ => {}
        }
    }
    delta
}

pub struct CrudEngine {
    store: Arc<dyn ResourceStore>,
}

impl CrudEngine {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Creates a child of `parent` from the unwrapped request body.
    pub async fn create(
        &self,
        parent: &Resource,
        ty: ResourceType,
        body: Map<String, Value>,
        originator: &str,
    ) -> CseResult<Resource> {
        let ri = generate_resource_id(ty);
        let rn = match body.get("rn") {
            Some(Value::String(rn)) => rn.clone(),
            Some(other) => {
                return Err(CseError::Validation(format!("invalid resourceName: {}", other)))
            }
            None => ri.clone(),
        };
        check_resource_name(&rn)?;

        let path = format!("{}/{}", parent.path, rn);
        let stamp = Value::from(format_timestamp(&now()));

        let mut map = body;
        map.insert("ty".into(), Value::from(ty.code()));
        map.insert("ri".into(), Value::from(ri.clone()));
        map.insert("rn".into(), Value::from(rn));
        map.insert("pi".into(), Value::from(parent.ri.clone()));
        map.insert("ct".into(), stamp.clone());
        map.insert("lt".into(), stamp);
        if carries_state_tag(ty) {
            map.insert("st".into(), Value::from(0));
        }
        if !originator.is_empty() && !map.contains_key("cr") {
            map.insert("cr".into(), Value::from(originator));
        }

        let mut res = Resource::from_map(&path, &parent.path, map)?;
        prepare_attributes(&mut res)?;

        self.store.create(&res).await?;
        debug!(path = %res.path, ri = %res.ri, ty = %res.ty, "Created resource");

        self.propagate(parent, &res, Operation::Create).await;
        Ok(res)
    }

    pub async fn retrieve(&self, path: &str) -> CseResult<Resource> {
        Ok(self.store.retrieve(path).await?)
    }

    pub async fn retrieve_by_id(&self, ri: &str) -> CseResult<Resource> {
        Ok(self.store.retrieve_by_id(ri).await?)
    }

    /// Direct children of `path` matching `fc`.
    pub async fn retrieve_children(
        &self,
        path: &str,
        fc: Option<&FilterCriteria>,
    ) -> CseResult<Vec<Resource>> {
        Ok(self.store.children(path, fc).await?)
    }

    pub async fn discover(
        &self,
        path: &str,
        fc: &FilterCriteria,
        drt: DiscResType,
    ) -> CseResult<Vec<String>> {
        Ok(self.store.discover(path, fc, drt).await?)
    }

    /// Resolves `/la` or `/ol` under the container at `path`.
    pub async fn resolve_virtual(&self, path: &str, vr: VirtualResource) -> CseResult<Resource> {
        let dst = match vr {
            VirtualResource::Latest => SortType::Descending,
            VirtualResource::Oldest => SortType::Ascending,
            VirtualResource::FanOutPoint => {
                return Err(CseError::Validation(format!(
                    "'{}' does not resolve to a single resource",
                    vr
                )))
            }
        };
        let fc = FilterCriteria {
            ty: vec![ResourceType::ContentInstance],
            lvl: Some(1),
            lim: Some(1),
            dst: Some(dst),
            ..FilterCriteria::discovery()
        };
        let refs = self.discover(path, &fc, DiscResType::Structured).await?;
        match refs.first() {
            Some(found) => self.retrieve(found).await,
            None => Err(CseError::not_found(&format!("{}/{}", path, vr))),
        }
    }

    /// Merges `body` into the stored version of `target`. The merge runs
    /// inside the store so counters changed by concurrent child mutations
    /// are kept.
    pub async fn update(&self, target: &Resource, body: Map<String, Value>) -> CseResult<Resource> {
        let edit = |res: &mut Resource| -> Result<(), StoreError> {
            res.merge(body.clone()).map_err(rejected)?;
            res.lt = now();
            if carries_state_tag(res.ty) {
                res.st = Some(res.st.unwrap_or(0) + 1);
            }
            prepare_attributes(res).map_err(rejected)
        };
        let updated = self.store.update(&target.path, &edit).await?;
        debug!(path = %updated.path, "Updated resource");

        if let Ok(parent) = self.store.retrieve(&updated.parent_path).await {
            self.propagate(&parent, &updated, Operation::Update).await;
        }
        Ok(updated)
    }

    /// Deletes `target` and its subtree. The parent is looked up first so its
    /// counters can be rolled back.
    pub async fn delete(&self, target: &Resource) -> CseResult<usize> {
        let parent = self.store.retrieve(&target.parent_path).await.ok();
        let removed = self.store.delete(&target.path).await?;
        debug!(path = %target.path, removed, "Deleted resource");

        if let Some(parent) = parent {
            self.propagate(&parent, target, Operation::Delete).await;
        }
        Ok(removed)
    }

    async fn propagate(&self, parent: &Resource, child: &Resource, op: Operation) {
        let delta = parent_delta(parent.ty, child, op);
        if delta.is_noop() {
            return;
        }
        if let Err(e) = self.store.adjust_parent(&parent.path, delta).await {
            error!(parent = %parent.path, error = %e, "Failed to update parent state");
        }
    }
}

fn rejected(err: CseError) -> StoreError {
    StoreError::Rejected(err.to_string())
}

fn check_resource_name(rn: &str) -> CseResult<()> {
    if rn.is_empty() || rn.contains('/') || rn.trim() != rn {
        return Err(CseError::Validation(format!("invalid resourceName: '{}'", rn)));
    }
    if VirtualResource::from_segment(rn).is_some() {
        return Err(CseError::Validation(format!(
            "resourceName '{}' is reserved for a virtual resource",
            rn
        )));
    }
    Ok(())
}

/// Fills derived attributes and enforces type-specific constraints.
fn prepare_attributes(res: &mut Resource) -> CseResult<()> {
    let ri = res.ri.clone();
    match &mut res.attrs {
        Attributes::Ae(ae) => {
            ae.aei = ri;
        }
        Attributes::ContentInstance(cin) => {
            cin.cs = content_size(&cin.con);
        }
        Attributes::Group(grp) => {
            grp.mid.dedup();
            grp.cnm = grp.mid.len() as u64;
            if let Some(mnm) = grp.mnm {
                if grp.cnm > mnm {
                    return Err(CseError::Validation(format!(
                        "memberIDs has {} entries, maxNrOfMembers is {}",
                        grp.cnm, mnm
                    )));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
