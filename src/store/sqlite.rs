//! Resource persistence using SQLite.
//!
//! Each record is one row: indexed columns for the tree structure plus the
//! full short-key representation as JSON. Filters run over decoded records.

use super::filter::{depth_below, matches, page, sort_discovered};
use super::{reference, RecordEdit, ResourceStore};
use crate::error::StoreError;
use crate::primitive::{DiscResType, FilterCriteria};
use crate::resource::Resource;
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const COLUMNS: &str = "seq, path, parent_path, body";

/// Persists resource records in SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database and ensures the table exists.
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path).map_err(|e| {
            StoreError::Backend(format!("failed to open resource DB at {}: {}", db_path, e))
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_table()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("resource DB lock poisoned".into()))
    }

    fn create_table(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS resources (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                path        TEXT UNIQUE NOT NULL,
                parent_path TEXT NOT NULL,
                ri          TEXT UNIQUE NOT NULL,
                ty          INTEGER NOT NULL,
                body        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_resources_parent ON resources(parent_path);",
        )
        .map_err(|e| backend("create resources table", e))?;
        Ok(())
    }

    fn load_where(
        &self,
        clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<(u64, Resource)>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM resources WHERE {}", COLUMNS, clause);
        let mut stmt = conn.prepare(&sql).map_err(|e| backend("prepare query", e))?;
        let rows = stmt
            .query_map(args, |row| {
                let seq: i64 = row.get(0)?;
                let path: String = row.get(1)?;
                let parent_path: String = row.get(2)?;
                let body: String = row.get(3)?;
                Ok((seq, path, parent_path, body))
            })
            .map_err(|e| backend("query resources", e))?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, path, parent_path, body) = row.map_err(|e| backend("read row", e))?;
            records.push((seq as u64, decode(&path, &parent_path, &body)?));
        }
        Ok(records)
    }

    fn load_one(&self, clause: &str, key: &str) -> Result<Resource, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM resources WHERE {}", COLUMNS, clause);
        let row = conn
            .query_row(&sql, params![key], |row| {
                let path: String = row.get(1)?;
                let parent_path: String = row.get(2)?;
                let body: String = row.get(3)?;
                Ok((path, parent_path, body))
            })
            .optional()
            .map_err(|e| backend("query resource", e))?;
        match row {
            Some((path, parent_path, body)) => decode(&path, &parent_path, &body),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    /// Rows strictly below `path`. Descendant paths sort between `path/`
    /// and `path0`, which keeps `%` and `_` in names out of LIKE patterns.
    fn load_descendants(&self, path: &str) -> Result<Vec<(u64, Resource)>, StoreError> {
        if path.is_empty() {
            return self.load_where("1 = 1", &[]);
        }
        let low = format!("{}/", path);
        let high = format!("{}0", path);
        self.load_where("path > ?1 AND path < ?2", &[&low, &high])
    }
}

#[async_trait]
impl ResourceStore for SqliteStore {
    async fn create(&self, res: &Resource) -> Result<(), StoreError> {
        let body = encode(res)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO resources (path, parent_path, ri, ty, body) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![res.path, res.parent_path, res.ri, res.ty.code(), body],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Duplicate(res.path.clone())
            }
            other => backend("insert resource", other),
        })?;
        debug!(path = %res.path, ri = %res.ri, "Stored resource");
        Ok(())
    }

    async fn retrieve(&self, path: &str) -> Result<Resource, StoreError> {
        self.load_one("path = ?1", path)
    }

    async fn retrieve_by_id(&self, ri: &str) -> Result<Resource, StoreError> {
        self.load_one("ri = ?1", ri)
    }

    async fn children(
        &self,
        path: &str,
        fc: Option<&FilterCriteria>,
    ) -> Result<Vec<Resource>, StoreError> {
        let mut children: Vec<Resource> = self
            .load_where("parent_path = ?1", &[&path])?
            .into_iter()
            .map(|(_, res)| res)
            .filter(|res| fc.map_or(true, |fc| matches(res, fc)))
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(match fc {
            Some(fc) => page(children, fc),
            None => children,
        })
    }

    async fn update(&self, path: &str, edit: RecordEdit<'_>) -> Result<Resource, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| backend("begin transaction", e))?;
        let row: Option<(String, String)> = tx
            .query_row(
                "SELECT parent_path, body FROM resources WHERE path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| backend("query resource", e))?;
        let Some((parent_path, body)) = row else {
            return Err(StoreError::NotFound(path.to_string()));
        };

        let mut res = decode(path, &parent_path, &body)?;
        edit(&mut res)?;
        tx.execute(
            "UPDATE resources SET body = ?1 WHERE path = ?2",
            params![encode(&res)?, path],
        )
        .map_err(|e| backend("update resource", e))?;
        tx.commit().map_err(|e| backend("commit update", e))?;
        Ok(res)
    }

    async fn delete(&self, path: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let low = format!("{}/", path);
        let high = format!("{}0", path);
        let removed = conn
            .execute(
                "DELETE FROM resources WHERE path = ?1 OR (path > ?2 AND path < ?3)",
                params![path, low, high],
            )
            .map_err(|e| backend("delete resources", e))?;
        if removed == 0 {
            return Err(StoreError::NotFound(path.to_string()));
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
            .load_descendants(path)?
            .into_iter()
            .filter(|(_, res)| match depth_below(path, &res.path) {
                Some(depth) => fc.lvl.map_or(true, |lvl| depth <= lvl),
                None => false,
            })
            .filter(|(_, res)| matches(res, fc))
            .collect();
        sort_discovered(&mut found, fc.dst);
        Ok(page(found, fc)
            .iter()
            .map(|(_, res)| reference(res, drt))
            .collect())
    }
}

fn encode(res: &Resource) -> Result<String, StoreError> {
    serde_json::to_string(&Value::Object(res.to_map()))
        .map_err(|e| StoreError::Backend(format!("failed to encode {}: {}", res.path, e)))
}

fn decode(path: &str, parent_path: &str, body: &str) -> Result<Resource, StoreError> {
    let map: Map<String, Value> = serde_json::from_str(body)
        .map_err(|e| StoreError::Backend(format!("corrupt record {}: {}", path, e)))?;
    Resource::from_map(path, parent_path, map)
        .map_err(|e| StoreError::Backend(format!("corrupt record {}: {}", path, e)))
}

fn backend(action: &str, err: rusqlite::Error) -> StoreError {
    StoreError::Backend(format!("failed to {}: {}", action, err))
}
