use super::filter::{depth_below, is_descendant, matches, page, sort_discovered};
use super::{reference, RecordEdit, ResourceStore};
use crate::error::StoreError;
use crate::primitive::{DiscResType, FilterCriteria};
use crate::resource::Resource;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

struct StoredResource {
    /// Insertion order, breaks creation-time ties.
    seq: u64,
    resource: Resource,
}

/// In-memory store for single-node deployments and tests.
pub struct MemoryStore {
    /// Records keyed by hierarchical path
    records: DashMap<String, StoredResource>,

    /// Resource id → path
    ids: DashMap<String, String>,

    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            ids: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create(&self, res: &Resource) -> Result<(), StoreError> {
        // Path entry stays locked until the id index is written.
        match self.records.entry(res.path.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(res.path.clone())),
            Entry::Vacant(slot) => match self.ids.entry(res.ri.clone()) {
                Entry::Occupied(_) => Err(StoreError::Duplicate(res.ri.clone())),
                Entry::Vacant(id_slot) => {
                    id_slot.insert(res.path.clone());
                    slot.insert(StoredResource {
                        seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                        resource: res.clone(),
                    });
                    debug!(path = %res.path, ri = %res.ri, "Stored resource");
                    Ok(())
                }
            },
        }
    }

    async fn retrieve(&self, path: &str) -> Result<Resource, StoreError> {
        self.records
            .get(path)
            .map(|r| r.resource.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn retrieve_by_id(&self, ri: &str) -> Result<Resource, StoreError> {
        let path = self
            .ids
            .get(ri)
            .map(|p| p.value().clone())
            .ok_or_else(|| StoreError::NotFound(ri.to_string()))?;
        self.retrieve(&path).await
    }

    async fn children(
        &self,
        path: &str,
        fc: Option<&FilterCriteria>,
    ) -> Result<Vec<Resource>, StoreError> {
        let mut children: Vec<Resource> = self
            .records
            .iter()
            .filter(|r| r.resource.parent_path == path)
            .filter(|r| fc.map_or(true, |fc| matches(&r.resource, fc)))
            .map(|r| r.resource.clone())
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(match fc {
            Some(fc) => page(children, fc),
            None => children,
        })
    }

    async fn update(&self, path: &str, edit: RecordEdit<'_>) -> Result<Resource, StoreError> {
        let mut stored = self
            .records
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        let mut res = stored.resource.clone();
        edit(&mut res)?;
        stored.resource = res.clone();
        Ok(res)
    }

    async fn delete(&self, path: &str) -> Result<usize, StoreError> {
        if !self.records.contains_key(path) {
            return Err(StoreError::NotFound(path.to_string()));
        }
        let doomed: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.key() == path || is_descendant(path, r.key()))
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for key in doomed {
            if let Some((_, stored)) = self.records.remove(&key) {
                self.ids.remove(&stored.resource.ri);
                removed += 1;
            }
        }
        debug!(path = %path, removed, "Deleted subtree");
        Ok(removed)
    }

    async fn discover(
        &self,
        path: &str,
        fc: &FilterCriteria,
        drt: DiscResType,
    ) -> Result<Vec<String>, StoreError> {
        let mut found: Vec<(u64, Resource)> = self
            .records
            .iter()
            .filter(|r| match depth_below(path, r.key()) {
                Some(depth) => fc.lvl.map_or(true, |lvl| depth <= lvl),
                None => false,
            })
            .filter(|r| matches(&r.resource, fc))
            .map(|r| (r.seq, r.resource.clone()))
            .collect();
        sort_discovered(&mut found, fc.dst);
        Ok(page(found, fc)
            .iter()
            .map(|(_, res)| reference(res, drt))
            .collect())
    }
}
