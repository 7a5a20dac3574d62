//! Evidence document collection.
//!
//! Documents are stored as JSON bodies keyed by a store-issued ULID. The owning
//! user and optional project are projected into indexed columns so filtered reads
//! and counts never have to decode bodies. Reads return documents in insertion
//! order.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use apprentice_hub_core::{
    EvidenceDocument, EvidenceFilter, EvidenceId, SchemaStatus, StoredEvidence,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use time::OffsetDateTime;
use tracing::debug;
use ulid::Ulid;

pub const EVIDENCE_COLLECTION: &str = "evidence";

const LATEST_COLLECTION_VERSION: i64 = 1;

const CREATE_COLLECTION_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS collection_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS evidence (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id TEXT NOT NULL UNIQUE,
  user_id INTEGER NOT NULL,
  project_id INTEGER,
  document_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_evidence_user ON evidence(user_id);
CREATE INDEX IF NOT EXISTS idx_evidence_project ON evidence(project_id);
";

pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    /// Open the evidence collection database.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| {
            format!("failed to open evidence document database at {}", path.display())
        })?;

        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;",
        )
        .context("failed to configure document store pragmas")?;

        Ok(Self { conn })
    }

    /// # Errors
    /// Returns an error when collection metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_COLLECTION_MIGRATIONS_SQL)
            .context("failed to apply collection_migrations table")?;
        let current_version = current_collection_version(&self.conn)?;
        Ok(SchemaStatus::from_versions(current_version, LATEST_COLLECTION_VERSION))
    }

    /// # Errors
    /// Returns an error when a migration step fails or the collection is newer than supported.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_COLLECTION_MIGRATIONS_SQL)
            .context("failed to apply collection_migrations table")?;

        if current_collection_version(&self.conn)? < 1 {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("failed to start collection migration")?;
            if current_collection_version(&tx)? < 1 {
                tx.execute_batch(MIGRATION_001_SQL)
                    .context("failed to create evidence collection")?;
                let now = OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .context("failed to format RFC3339 timestamp")?;
                tx.execute(
                    "INSERT OR IGNORE INTO collection_migrations(version, applied_at)
                     VALUES (?1, ?2)",
                    params![1_i64, now],
                )
                .context("failed to record collection version 1")?;
                debug!(
                    collection = EVIDENCE_COLLECTION,
                    version = 1,
                    "applied collection migration"
                );
            }
            tx.commit().context("failed to commit collection migration")?;
        }

        let version = current_collection_version(&self.conn)?;
        if version != LATEST_COLLECTION_VERSION {
            return Err(anyhow!(
                "unsupported collection version {version}; expected {LATEST_COLLECTION_VERSION}"
            ));
        }
        Ok(())
    }

    /// Insert one document and return the identifier the store assigned to it.
    ///
    /// # Errors
    /// Returns a validation error for an invalid document, or a storage error.
    pub fn insert_one(&mut self, document: &EvidenceDocument) -> Result<EvidenceId> {
        document.validate()?;
        let id = EvidenceId::new();

        self.conn
            .execute(
                "INSERT INTO evidence(id, user_id, project_id, document_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    document.user_id.0,
                    document.project_id.map(|project| project.0),
                    serde_json::to_string(document)
                        .context("failed to serialize evidence document")?,
                ],
            )
            .context("failed to insert evidence document")?;

        Ok(id)
    }

    /// # Errors
    /// Returns an error when the lookup or document decoding fails.
    pub fn find_one(&self, id: EvidenceId) -> Result<Option<StoredEvidence>> {
        let body = self
            .conn
            .query_row(
                "SELECT document_json FROM evidence WHERE id = ?1",
                params![id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to load evidence document {id}"))?;

        body.map(|body| decode_document(id, &body)).transpose()
    }

    /// All documents matching `filter`; an empty filter matches everything.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn find(&self, filter: &EvidenceFilter) -> Result<Vec<StoredEvidence>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, document_json FROM evidence
             WHERE (?1 IS NULL OR user_id = ?1)
               AND (?2 IS NULL OR project_id = ?2)
             ORDER BY seq ASC",
        )?;
        let (user_id, project_id) = filter_columns(filter);
        let rows = stmt.query_map(params![user_id, project_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (raw_id, body) = row?;
            documents.push(decode_document(parse_stored_id(&raw_id)?, &body)?);
        }
        Ok(documents)
    }

    /// Identifiers of the documents matching `filter`, without decoding bodies.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn find_ids(&self, filter: &EvidenceFilter) -> Result<Vec<EvidenceId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM evidence
             WHERE (?1 IS NULL OR user_id = ?1)
               AND (?2 IS NULL OR project_id = ?2)
             ORDER BY seq ASC",
        )?;
        let (user_id, project_id) = filter_columns(filter);
        let rows =
            stmt.query_map(params![user_id, project_id], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(parse_stored_id(&row?)?);
        }
        Ok(ids)
    }

    /// # Errors
    /// Returns an error when the count query fails.
    pub fn count(&self, filter: &EvidenceFilter) -> Result<u64> {
        let (user_id, project_id) = filter_columns(filter);
        let count = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM evidence
                 WHERE (?1 IS NULL OR user_id = ?1)
                   AND (?2 IS NULL OR project_id = ?2)",
                params![user_id, project_id],
                |row| row.get::<_, i64>(0),
            )
            .context("failed to count evidence documents")?;
        u64::try_from(count).context("evidence count out of range")
    }

    /// Replace the body of an existing document. Returns `false` when `id` is absent.
    ///
    /// # Errors
    /// Returns a validation error for an invalid document, or a storage error.
    pub fn replace_one(&mut self, id: EvidenceId, document: &EvidenceDocument) -> Result<bool> {
        document.validate()?;
        let changed = self
            .conn
            .execute(
                "UPDATE evidence SET user_id = ?2, project_id = ?3, document_json = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    document.user_id.0,
                    document.project_id.map(|project| project.0),
                    serde_json::to_string(document)
                        .context("failed to serialize evidence document")?,
                ],
            )
            .with_context(|| format!("failed to replace evidence document {id}"))?;
        Ok(changed == 1)
    }

    /// Remove one document. Returns `false` when `id` is absent.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn delete_one(&mut self, id: EvidenceId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM evidence WHERE id = ?1", params![id.to_string()])
            .with_context(|| format!("failed to delete evidence document {id}"))?;
        debug!(%id, deleted = changed == 1, "evidence document delete");
        Ok(changed == 1)
    }
}

fn filter_columns(filter: &EvidenceFilter) -> (Option<i64>, Option<i64>) {
    (filter.user_id.map(|user| user.0), filter.project_id.map(|project| project.0))
}

fn decode_document(id: EvidenceId, body: &str) -> Result<StoredEvidence> {
    let document = serde_json::from_str::<EvidenceDocument>(body)
        .with_context(|| format!("failed to decode evidence document {id}"))?;
    Ok(StoredEvidence { id, document })
}

fn parse_stored_id(raw: &str) -> Result<EvidenceId> {
    let parsed =
        Ulid::from_string(raw).with_context(|| format!("invalid stored evidence id: {raw}"))?;
    Ok(EvidenceId(parsed))
}

fn current_collection_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM collection_migrations", [], |row| {
        row.get::<_, i64>(0)
    })
    .context("failed to read collection version")
}
