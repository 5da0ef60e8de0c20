//! Assembles the response body of Retrieve-class operations according to
//! the requested result content.

use crate::crud::CrudEngine;
use crate::error::CseResult;
use crate::primitive::{DiscResType, FilterCriteria, RequestPrimitive, ResourceType, ResultContent};
use crate::resource::{wrap, Resource, VirtualResource};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Depth from which container listings carry only their latest
/// contentInstance instead of every instance.
const LATEST_ONLY_DEPTH: usize = 1;

/// Types never descended into.
fn is_leaf(ty: ResourceType) -> bool {
    matches!(ty, ResourceType::ContentInstance | ResourceType::Subscription)
}

pub struct Collector {
    crud: Arc<CrudEngine>,
    /// Bounds concurrent child lookups across one response
    limiter: Arc<Semaphore>,
}

impl Collector {
    pub fn new(crud: Arc<CrudEngine>, concurrency: usize) -> Self {
        Self {
            crud,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Body for `rqp` acting on `target`; `None` when nothing is returned.
    pub async fn collect(&self, rqp: &RequestPrimitive, target: &Resource) -> CseResult<Option<Value>> {
        let rcn = rqp.result_content();
        let fc = rqp.fc.as_ref();

        if let Some(fc) = fc.filter(|fc| fc.is_discovery()) {
            let drt = rqp.drt.unwrap_or(DiscResType::Structured);
            return self.discovery(target, fc, rcn, drt).await.map(Some);
        }

        let body = match rcn {
            ResultContent::Nothing => return Ok(None),
            ResultContent::Attributes => target.wrapped(),
            ResultContent::HierarchicalAddress => json!({ "m2m:uri": target.path }),
            ResultContent::HierarchicalAddressAndAttributes => json!({
                "m2m:rce": {
                    (target.ty.wire_key()): Value::Object(target.to_map()),
                    "uri": target.path,
                }
            }),
            ResultContent::AttributesAndChildResources => {
                let mut map = target.to_map();
                self.nest_children(&mut map, target, fc, 0).await?;
                wrap(target.ty, Value::Object(map))
            }
            ResultContent::ChildResources => {
                let mut map = Map::new();
                self.nest_children(&mut map, target, fc, 0).await?;
                wrap(target.ty, Value::Object(map))
            }
            ResultContent::AttributesAndChildResourceReferences => {
                let children = self.children(target, fc, 0).await?;
                let mut map = target.to_map();
                map.insert("ch".into(), child_references(&children));
                wrap(target.ty, Value::Object(map))
            }
            ResultContent::ChildResourceReferences => {
                let children = self.children(target, fc, 0).await?;
                let uris: Vec<&str> = children.iter().map(|c| c.path.as_str()).collect();
                json!({ "m2m:uril": uris })
            }
        };
        Ok(Some(body))
    }

    /// Discovery asks the store for a flat filtered list instead of walking
    /// the tree.
    async fn discovery(
        &self,
        target: &Resource,
        fc: &FilterCriteria,
        rcn: ResultContent,
        drt: DiscResType,
    ) -> CseResult<Value> {
        let refs = self.crud.discover(&target.path, fc, drt).await?;
        debug!(path = %target.path, found = refs.len(), "Discovery");

        match rcn {
            ResultContent::AttributesAndChildResources | ResultContent::ChildResources => {
                let found = self.load_all(&refs, drt).await?;
                let mut map = match rcn {
                    ResultContent::AttributesAndChildResources => target.to_map(),
                    _ => Map::new(),
                };
                for res in &found {
                    push_child(&mut map, res.ty, Value::Object(res.to_map()));
                }
                Ok(wrap(target.ty, Value::Object(map)))
            }
            ResultContent::AttributesAndChildResourceReferences => {
                let found = self.load_all(&refs, drt).await?;
                let mut map = target.to_map();
                map.insert("ch".into(), child_references(&found));
                Ok(wrap(target.ty, Value::Object(map)))
            }
            _ => Ok(json!({ "m2m:uril": refs })),
        }
    }

    async fn load_all(&self, refs: &[String], drt: DiscResType) -> CseResult<Vec<Resource>> {
        try_join_all(refs.iter().map(|reference| async move {
            let _permit = self.limiter.acquire().await.ok();
            match drt {
                DiscResType::Structured => self.crud.retrieve(reference).await,
                DiscResType::Unstructured => self.crud.retrieve_by_id(reference).await,
            }
        }))
        .await
    }

    /// Direct children of `res`. The request's filter applies to the first
    /// level only; deeper container listings collapse to their latest
    /// instance.
    async fn children(
        &self,
        res: &Resource,
        fc: Option<&FilterCriteria>,
        depth: usize,
    ) -> CseResult<Vec<Resource>> {
        let children = {
            let _permit = self.limiter.acquire().await.ok();
            let fc = if depth == 0 { fc } else { None };
            self.crud.retrieve_children(&res.path, fc).await?
        };
        if depth < LATEST_ONLY_DEPTH || res.ty != ResourceType::Container {
            return Ok(children);
        }

        let (instances, mut others): (Vec<Resource>, Vec<Resource>) = children
            .into_iter()
            .partition(|c| c.ty == ResourceType::ContentInstance);
        if !instances.is_empty() {
            let _permit = self.limiter.acquire().await.ok();
            let latest = self
                .crud
                .resolve_virtual(&res.path, VirtualResource::Latest)
                .await?;
            others.push(latest);
        }
        Ok(others)
    }

    /// Every child of `res`, expanded recursively. Siblings are expanded
    /// concurrently and the call returns once every branch has finished.
    async fn nested(
        &self,
        res: &Resource,
        fc: Option<&FilterCriteria>,
        depth: usize,
    ) -> CseResult<Vec<(ResourceType, Map<String, Value>)>> {
        let children = self.children(res, fc, depth).await?;
        let expanded = try_join_all(children.iter().map(|child| self.expand(child, depth + 1))).await?;
        Ok(children.iter().map(|c| c.ty).zip(expanded).collect())
    }

    /// Adds the expanded children of `res` to `map`, grouped under each
    /// child's `m2m:<short>` key.
    async fn nest_children(
        &self,
        map: &mut Map<String, Value>,
        res: &Resource,
        fc: Option<&FilterCriteria>,
        depth: usize,
    ) -> CseResult<()> {
        for (ty, body) in self.nested(res, fc, depth).await? {
            push_child(map, ty, Value::Object(body));
        }
        Ok(())
    }

    fn expand<'a>(&'a self, res: &'a Resource, depth: usize) -> BoxFuture<'a, CseResult<Map<String, Value>>> {
        async move {
            let mut map = res.to_map();
            if !is_leaf(res.ty) {
                for (ty, body) in self.nested(res, None, depth).await? {
                    push_child(&mut map, ty, Value::Object(body));
                }
            }
            Ok(map)
        }
        .boxed()
    }
}

fn push_child(map: &mut Map<String, Value>, ty: ResourceType, body: Value) {
    match map
        .entry(ty.wire_key())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => items.push(body),
        other => *other = Value::Array(vec![body]),
    }
}

fn child_references(children: &[Resource]) -> Value {
    Value::Array(
        children
            .iter()
            .map(|c| json!({ "nm": c.rn, "typ": c.ty.code(), "val": c.path }))
            .collect(),
    )
}
