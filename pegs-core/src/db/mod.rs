//! SQLite implementation of [`Storage`].
//!
//! All versions live in one append-only `entity_versions` table keyed by
//! `(entity_id, version)`. Identifier counters live in `req_id_counters` and
//! are bumped in the same transaction as the row they number.

mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::error::{EntityKind, PegsError, Result};
use crate::models::{Direction, ReqId};
use crate::store::{Storage, StoredVersion, VersionDraft, VersionQuery, VersionReader};
use crate::versioning;

const COLUMNS: &str = "v.entity_id, v.version, v.entity_kind, v.kind_tag, v.solution_id, v.req_id,
     v.left_id, v.right_id, v.fields, v.effective_from, v.deleted, v.modified_by";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "pegs")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("pegs.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.lock();
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

impl Storage for Database {
    fn insert_initial(
        &self,
        draft: VersionDraft,
        sequence_prefix: Option<&'static str>,
    ) -> Result<StoredVersion> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let req_id = match sequence_prefix {
            Some(prefix) => {
                let number: u32 = tx.query_row(
                    "INSERT INTO req_id_counters (prefix, last_number) VALUES (?, 1)
                     ON CONFLICT(prefix) DO UPDATE SET last_number = last_number + 1
                     RETURNING last_number",
                    [prefix],
                    |row| row.get(0),
                )?;
                Some(format!("{prefix}{number}"))
            }
            None => None,
        };

        insert_row(&tx, &draft, 1, req_id.as_deref(), draft.effective_from)?;
        tx.commit()?;

        Ok(stored_from_draft(draft, 1, req_id, None))
    }

    fn append_version(&self, draft: VersionDraft, expected: u32) -> Result<StoredVersion> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let latest = tx
            .query_row(
                "SELECT version, req_id, effective_from FROM entity_versions
                 WHERE entity_id = ? ORDER BY version DESC LIMIT 1",
                [draft.entity_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        parse_datetime(2, row.get(2)?)?,
                    ))
                },
            )
            .optional()?;

        let Some((actual, req_id, previous)) = latest else {
            return Err(PegsError::NotFound {
                entity: draft.entity_kind,
                id: draft.entity_id,
            });
        };
        if actual != expected {
            return Err(PegsError::ConcurrentModification {
                entity: draft.entity_kind,
                id: draft.entity_id,
                expected,
                actual,
            });
        }

        let version = actual + 1;
        let effective_from = versioning::effective_from(Some(previous), draft.effective_from);
        insert_row(&tx, &draft, version, req_id.as_deref(), effective_from)?;
        tx.commit()?;

        Ok(stored_from_draft(
            draft,
            version,
            req_id,
            Some(effective_from),
        ))
    }

    fn insert_guarded(
        &self,
        draft: VersionDraft,
        guard: &dyn Fn(&dyn VersionReader) -> Result<()>,
    ) -> Result<StoredVersion> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        guard(&TransactionReader(&tx))?;
        insert_row(&tx, &draft, 1, None, draft.effective_from)?;
        tx.commit()?;

        Ok(stored_from_draft(draft, 1, None, None))
    }

    fn latest(&self, entity_id: Uuid) -> Result<Option<StoredVersion>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions v
             WHERE v.entity_id = ? ORDER BY v.version DESC LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, [entity_id.to_string()], read_version)
            .optional()?)
    }

    fn as_of(&self, entity_id: Uuid, at: DateTime<Utc>) -> Result<Option<StoredVersion>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions v
             WHERE v.entity_id = ? AND v.effective_from <= ?
             ORDER BY v.version DESC LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, (entity_id.to_string(), timestamp(at)), read_version)
            .optional()?)
    }

    fn history(&self, entity_id: Uuid) -> Result<Vec<StoredVersion>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions v
             WHERE v.entity_id = ? ORDER BY v.version"
        );
        let mut stmt = conn.prepare(&sql)?;
        let versions = stmt
            .query_map([entity_id.to_string()], read_version)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    fn query_latest(&self, query: &VersionQuery) -> Result<Vec<StoredVersion>> {
        let conn = self.lock();
        select_latest(&conn, query)
    }

    fn find_by_req_id(&self, req_id: &ReqId) -> Result<Option<Uuid>> {
        let conn = self.lock();
        let id = conn
            .query_row(
                "SELECT entity_id FROM entity_versions WHERE req_id = ? AND version = 1",
                [req_id.to_string()],
                |row| parse_uuid(0, row.get(0)?),
            )
            .optional()?;
        Ok(id)
    }
}

struct TransactionReader<'a>(&'a Connection);

impl VersionReader for TransactionReader<'_> {
    fn query_latest(&self, query: &VersionQuery) -> Result<Vec<StoredVersion>> {
        select_latest(self.0, query)
    }
}

fn select_latest(conn: &Connection, query: &VersionQuery) -> Result<Vec<StoredVersion>> {
    let mut conditions = vec!["v.entity_kind = ?".to_string()];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> =
        vec![Box::new(query.entity_kind.as_str().to_string())];

    match query.as_of {
        Some(at) => {
            conditions.push(
                "v.version = (SELECT MAX(w.version) FROM entity_versions w
                  WHERE w.entity_id = v.entity_id AND w.effective_from <= ?)"
                    .to_string(),
            );
            params.push(Box::new(timestamp(at)));
        }
        None => conditions.push(
            "v.version = (SELECT MAX(w.version) FROM entity_versions w
              WHERE w.entity_id = v.entity_id)"
                .to_string(),
        ),
    }

    if !query.kind_tags.is_empty() {
        let placeholders = vec!["?"; query.kind_tags.len()].join(", ");
        conditions.push(format!("v.kind_tag IN ({placeholders})"));
        for tag in &query.kind_tags {
            params.push(Box::new(tag.clone()));
        }
    }
    if let Some(solution_id) = query.solution_id {
        conditions.push("v.solution_id = ?".to_string());
        params.push(Box::new(solution_id.to_string()));
    }
    if let Some((requirement_id, direction)) = query.endpoint {
        let id = requirement_id.to_string();
        match direction {
            Direction::Left => {
                conditions.push("v.left_id = ?".to_string());
                params.push(Box::new(id));
            }
            Direction::Right => {
                conditions.push("v.right_id = ?".to_string());
                params.push(Box::new(id));
            }
            Direction::Either => {
                conditions.push("(v.left_id = ? OR v.right_id = ?)".to_string());
                params.push(Box::new(id.clone()));
                params.push(Box::new(id));
            }
        }
    }
    if !query.include_deleted {
        conditions.push("v.deleted = 0".to_string());
    }

    let sql = format!(
        "SELECT {COLUMNS} FROM entity_versions v
         WHERE {}
         ORDER BY (SELECT f.rowid FROM entity_versions f
                   WHERE f.entity_id = v.entity_id AND f.version = 1)",
        conditions.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let versions = stmt
        .query_map(params_refs.as_slice(), read_version)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(versions)
}

fn insert_row(
    conn: &Connection,
    draft: &VersionDraft,
    version: u32,
    req_id: Option<&str>,
    effective_from: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO entity_versions
            (entity_id, version, entity_kind, kind_tag, solution_id, req_id,
             left_id, right_id, fields, effective_from, deleted, modified_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            draft.entity_id.to_string(),
            version,
            draft.entity_kind.as_str(),
            &draft.kind_tag,
            draft.solution_id.to_string(),
            req_id,
            draft.left_id.map(|id| id.to_string()),
            draft.right_id.map(|id| id.to_string()),
            serde_json::to_string(&draft.fields)?,
            timestamp(effective_from),
            draft.deleted,
            &draft.modified_by,
        ],
    )?;
    Ok(())
}

fn stored_from_draft(
    draft: VersionDraft,
    version: u32,
    req_id: Option<String>,
    effective_from: Option<DateTime<Utc>>,
) -> StoredVersion {
    StoredVersion {
        entity_id: draft.entity_id,
        version,
        entity_kind: draft.entity_kind,
        kind_tag: draft.kind_tag,
        solution_id: draft.solution_id,
        req_id,
        left_id: draft.left_id,
        right_id: draft.right_id,
        fields: draft.fields,
        // Round-trip through the stored precision so callers see what a read returns.
        effective_from: truncate(effective_from.unwrap_or(draft.effective_from)),
        deleted: draft.deleted,
        modified_by: draft.modified_by,
    }
}

fn read_version(row: &Row<'_>) -> rusqlite::Result<StoredVersion> {
    let entity_kind: String = row.get(2)?;
    let fields: String = row.get(8)?;
    Ok(StoredVersion {
        entity_id: parse_uuid(0, row.get(0)?)?,
        version: row.get(1)?,
        entity_kind: EntityKind::from_str(&entity_kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown entity kind '{entity_kind}'").into(),
            )
        })?,
        kind_tag: row.get(3)?,
        solution_id: parse_uuid(4, row.get(4)?)?,
        req_id: row.get(5)?,
        left_id: row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_uuid(6, s))
            .transpose()?,
        right_id: row
            .get::<_, Option<String>>(7)?
            .map(|s| parse_uuid(7, s))
            .transpose()?,
        fields: serde_json::from_str(&fields).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e))
        })?,
        effective_from: parse_datetime(9, row.get(9)?)?,
        deleted: row.get(10)?,
        modified_by: row.get(11)?,
    })
}

/// Fixed-width RFC 3339 so that text comparison orders instants.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&timestamp(at))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(at)
}

fn parse_uuid(idx: usize, s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_datetime(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
