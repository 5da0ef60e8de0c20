//! Resource store interface and its backends.

pub mod filter;
pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::primitive::{DiscResType, FilterCriteria};
use crate::resource::Resource;
use async_trait::async_trait;

/// Change applied to a parent's state when one of its children mutates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParentDelta {
    /// Increment the state tag by one.
    pub bump_state_tag: bool,
    /// Signed change of `cni`.
    pub instances: i64,
    /// Signed change of `cbs`.
    pub bytes: i64,
}

impl ParentDelta {
    pub fn is_noop(&self) -> bool {
        !self.bump_state_tag && self.instances == 0 && self.bytes == 0
    }
}

/// In-place edit of a stored record. Runs under the backend's write lock,
/// so it always sees the latest stored version.
pub type RecordEdit<'a> = &'a (dyn Fn(&mut Resource) -> Result<(), StoreError> + Send + Sync);

/// Flat table of path-addressed resource records.
///
/// Every method is a single atomic write or a consistent read. Backends
/// report duplicates and absent records through [`StoreError`] so callers
/// never inspect backend-specific failures.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Inserts a new record. Fails with `Duplicate` when the path or the
    /// resource id is taken.
    async fn create(&self, res: &Resource) -> Result<(), StoreError>;

    /// Record at exactly `path`.
    async fn retrieve(&self, path: &str) -> Result<Resource, StoreError>;

    /// Record with resource id `ri`.
    async fn retrieve_by_id(&self, ri: &str) -> Result<Resource, StoreError>;

    /// Direct children of `path` that satisfy `fc`, ordered by path.
    async fn children(
        &self,
        path: &str,
        fc: Option<&FilterCriteria>,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Applies `edit` to the record at `path` and persists the result in
    /// one atomic step. Returns the new record.
    async fn update(&self, path: &str, edit: RecordEdit<'_>) -> Result<Resource, StoreError>;

    /// Removes the record at `path` together with every descendant.
    /// Returns the number of removed records.
    async fn delete(&self, path: &str) -> Result<usize, StoreError>;

    /// References (paths or ids per `drt`) of descendants of `path` that
    /// satisfy `fc`, honouring `lvl`, `dst`, `ofst` and `lim`.
    async fn discover(
        &self,
        path: &str,
        fc: &FilterCriteria,
        drt: DiscResType,
    ) -> Result<Vec<String>, StoreError>;

    /// Applies `delta` to the record at `path` and returns the new record.
    async fn adjust_parent(&self, path: &str, delta: ParentDelta) -> Result<Resource, StoreError> {
        self.update(path, &move |res: &mut Resource| {
            apply_delta(res, delta);
            Ok(())
        })
        .await
    }
}

/// Applies a delta to a record in place. Counters never drop below zero.
pub(crate) fn apply_delta(res: &mut Resource, delta: ParentDelta) {
    if delta.bump_state_tag {
        res.st = Some(res.st.unwrap_or(0) + 1);
    }
    if let crate::resource::Attributes::Container(cnt) = &mut res.attrs {
        cnt.cni = cnt.cni.saturating_add_signed(delta.instances);
        cnt.cbs = cnt.cbs.saturating_add_signed(delta.bytes);
    }
    res.lt = crate::primitive::time::now();
}

/// Reference of a discovered record for the requested result type.
pub(crate) fn reference(res: &Resource, drt: DiscResType) -> String {
    match drt {
        DiscResType::Structured => res.path.clone(),
        DiscResType::Unstructured => res.ri.clone(),
    }
}
