use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use apprentice_hub_core::{
    unique_ksb_ids, EvidenceId, HubError, Ksb, KsbId, KsbSummary, LearningLog, LearningLogId,
    NewKsb, NewLearningLog, NewProject, NewUser, Project, ProjectId, SchemaStatus, User, UserId,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, warn};

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  email TEXT NOT NULL UNIQUE,
  name TEXT,
  oauth_provider TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ksbs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  code TEXT NOT NULL UNIQUE,
  description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  name TEXT NOT NULL,
  description TEXT,
  start_date TEXT,
  end_date TEXT,
  status TEXT,
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS evidence_ksb_link (
  evidence_id TEXT NOT NULL,
  ksb_id INTEGER NOT NULL,
  PRIMARY KEY (evidence_id, ksb_id),
  FOREIGN KEY (ksb_id) REFERENCES ksbs(id)
);

CREATE TABLE IF NOT EXISTS learning_logs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  date TEXT NOT NULL,
  duration_minutes INTEGER NOT NULL CHECK (duration_minutes >= 0),
  description TEXT,
  evidence_id TEXT,
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_ksbs_code ON ksbs(code);
CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
CREATE INDEX IF NOT EXISTS idx_projects_user ON projects(user_id);
CREATE INDEX IF NOT EXISTS idx_evidence_ksb_link_ksb ON evidence_ksb_link(ksb_id);
CREATE INDEX IF NOT EXISTS idx_learning_logs_user ON learning_logs(user_id);
";

const KSB_SUMMARY_SELECT: &str = "SELECT k.id, k.code, k.description, COUNT(l.evidence_id)
     FROM ksbs k
     LEFT JOIN evidence_ksb_link l ON l.ksb_id = k.id";

/// Relational store for users, the KSB taxonomy, projects, learning logs, and
/// the evidence/KSB link table.
pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KsbImportFailure {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KsbImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub imported_codes: Vec<String>,
    pub skipped_codes: Vec<String>,
    pub failed: Vec<KsbImportFailure>,
}

#[derive(Debug)]
struct ProjectRow {
    id: i64,
    user_id: i64,
    name: String,
    description: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    status: Option<String>,
}

#[derive(Debug)]
struct LearningLogRow {
    id: i64,
    user_id: i64,
    date: String,
    duration_minutes: i64,
    description: Option<String>,
    evidence_id: Option<String>,
}

impl SqliteStore {
    /// Open the relational store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        Ok(SchemaStatus::from_versions(current_version, LATEST_SCHEMA_VERSION))
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when any migration step fails or the database is newer than supported.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        if current_schema_version(&self.conn)? < 1 {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("failed to start migration v1 transaction")?;
            // Another connection may have migrated while this one waited for the lock.
            if current_schema_version(&tx)? < 1 {
                tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
                record_schema_version(&tx, 1)?;
                debug!(version = 1, "applied relational schema migration");
            }
            tx.commit().context("failed to commit migration v1")?;
        }

        let version = current_schema_version(&self.conn)?;
        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Register one KSB. The code must not already exist.
    ///
    /// # Errors
    /// Returns [`HubError::Conflict`] for a duplicate code, [`HubError::Validation`] for an
    /// invalid code, or a storage error.
    pub fn create_ksb(&mut self, input: &NewKsb) -> Result<Ksb> {
        input.validate()?;

        let tx = self.write_transaction()?;
        let exists = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM ksbs WHERE code = ?1)",
                params![input.code],
                |row| row.get::<_, i64>(0),
            )
            .context("failed to check KSB code uniqueness")?;
        if exists == 1 {
            return Err(HubError::Conflict(format!("KSB with code {} already exists", input.code))
                .into());
        }

        tx.execute(
            "INSERT INTO ksbs(code, description) VALUES (?1, ?2)",
            params![input.code, input.description],
        )
        .context("failed to insert KSB")?;
        let id = KsbId(tx.last_insert_rowid());
        tx.commit().context("failed to commit KSB transaction")?;

        Ok(Ksb { id, code: input.code.clone(), description: input.description.clone() })
    }

    /// Fetch one KSB with its live link count.
    ///
    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn get_ksb(&self, ksb_id: KsbId) -> Result<Option<KsbSummary>> {
        let query = format!("{KSB_SUMMARY_SELECT} WHERE k.id = ?1 GROUP BY k.id");
        let mut stmt = self.conn.prepare(&query)?;
        let summary = stmt
            .query_row(params![ksb_id.0], ksb_summary_from_row)
            .optional()
            .with_context(|| format!("failed to load KSB {ksb_id}"))?;
        Ok(summary)
    }

    /// List every KSB with link counts computed at read time.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_ksbs(&self) -> Result<Vec<KsbSummary>> {
        let query = format!("{KSB_SUMMARY_SELECT} GROUP BY k.id ORDER BY k.id ASC");
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map([], ksb_summary_from_row)?;

        let mut ksbs = Vec::new();
        for row in rows {
            ksbs.push(row.context("failed to decode KSB row")?);
        }
        Ok(ksbs)
    }

    /// List every KSB, counting only links whose evidence id is in `evidence_ids`.
    ///
    /// # Errors
    /// Returns an error when the scope cannot be encoded or rows cannot be read.
    pub fn list_ksbs_scoped(&self, evidence_ids: &[EvidenceId]) -> Result<Vec<KsbSummary>> {
        let scope = serde_json::to_string(
            &evidence_ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
        )
        .context("failed to encode evidence scope")?;

        let mut stmt = self.conn.prepare(
            "SELECT k.id, k.code, k.description, COUNT(l.evidence_id)
             FROM ksbs k
             LEFT JOIN evidence_ksb_link l
               ON l.ksb_id = k.id
              AND l.evidence_id IN (SELECT value FROM json_each(?1))
             GROUP BY k.id
             ORDER BY k.id ASC",
        )?;
        let rows = stmt.query_map(params![scope], ksb_summary_from_row)?;

        let mut ksbs = Vec::new();
        for row in rows {
            ksbs.push(row.context("failed to decode scoped KSB row")?);
        }
        Ok(ksbs)
    }

    /// Link one evidence document to each KSB in `ksb_ids`, all or nothing.
    ///
    /// Repeated ids are linked once. Every id must resolve to a registered KSB; the
    /// first unknown id aborts the transaction so no link for this call survives.
    ///
    /// # Errors
    /// Returns [`HubError::Validation`] naming the first unknown KSB id, or a storage error.
    pub fn link_evidence(&mut self, evidence_id: EvidenceId, ksb_ids: &[KsbId]) -> Result<()> {
        let ksb_ids = unique_ksb_ids(ksb_ids);
        let evidence_key = evidence_id.to_string();

        let tx = self.write_transaction()?;
        for ksb_id in &ksb_ids {
            let exists = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM ksbs WHERE id = ?1)",
                    params![ksb_id.0],
                    |row| row.get::<_, i64>(0),
                )
                .with_context(|| format!("failed to resolve KSB {ksb_id}"))?;
            if exists != 1 {
                return Err(HubError::Validation(format!("KSB with id {ksb_id} not found")).into());
            }

            tx.execute(
                "INSERT INTO evidence_ksb_link(evidence_id, ksb_id) VALUES (?1, ?2)",
                params![evidence_key, ksb_id.0],
            )
            .with_context(|| format!("failed to link evidence {evidence_id} to KSB {ksb_id}"))?;
        }
        tx.commit().context("failed to commit link transaction")?;
        Ok(())
    }

    /// KSB ids linked to one evidence document, ascending.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn linked_ksb_ids(&self, evidence_id: EvidenceId) -> Result<Vec<KsbId>> {
        let mut stmt = self.conn.prepare(
            "SELECT ksb_id FROM evidence_ksb_link WHERE evidence_id = ?1 ORDER BY ksb_id ASC",
        )?;
        let rows =
            stmt.query_map(params![evidence_id.to_string()], |row| row.get::<_, i64>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(KsbId(row?));
        }
        Ok(ids)
    }

    /// Import every `*.md` file of `dir` as a KSB: the file stem is the code and the
    /// trimmed file body is the description. Existing codes are skipped; files that
    /// cannot be read or stored are reported and do not stop the import.
    ///
    /// # Errors
    /// Returns [`HubError::NotFound`] when `dir` is not a directory, or an error when it
    /// cannot be listed.
    pub fn import_ksb_directory(&mut self, dir: &Path) -> Result<KsbImportSummary> {
        if !dir.is_dir() {
            return Err(
                HubError::NotFound(format!("KSB directory {} does not exist", dir.display()))
                    .into(),
            );
        }

        let mut paths = fs::read_dir(dir)
            .with_context(|| format!("failed to list KSB directory {}", dir.display()))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("failed to read KSB directory {}", dir.display()))?;
        paths.retain(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "md"));
        paths.sort();

        let mut summary = KsbImportSummary::default();
        for path in paths {
            let file = path.display().to_string();
            let Some(code) = path.file_stem().and_then(|stem| stem.to_str()).map(str::to_string)
            else {
                summary.failed.push(KsbImportFailure {
                    file,
                    error: "file name is not valid UTF-8".to_string(),
                });
                continue;
            };

            if self.ksb_code_exists(&code)? {
                debug!(%code, "skipping existing KSB");
                summary.skipped += 1;
                summary.skipped_codes.push(code);
                continue;
            }

            let outcome = fs::read_to_string(&path)
                .with_context(|| format!("failed to read KSB file {file}"))
                .and_then(|body| {
                    self.create_ksb(&NewKsb { code: code.clone(), description: body.trim().to_string() })
                });
            match outcome {
                Ok(_) => {
                    summary.imported += 1;
                    summary.imported_codes.push(code);
                }
                Err(err) => {
                    warn!(%file, error = %err, "failed to import KSB file");
                    summary.failed.push(KsbImportFailure { file, error: format!("{err:#}") });
                }
            }
        }

        Ok(summary)
    }

    /// # Errors
    /// Returns [`HubError::Conflict`] for a duplicate email, [`HubError::Validation`] for an
    /// invalid email, or a storage error.
    pub fn create_user(&mut self, input: &NewUser) -> Result<User> {
        input.validate()?;
        let created_at = OffsetDateTime::now_utc();

        let tx = self.write_transaction()?;
        let exists = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![input.email],
            |row| row.get::<_, i64>(0),
        )?;
        if exists == 1 {
            return Err(
                HubError::Conflict(format!("user with email {} already exists", input.email))
                    .into(),
            );
        }

        tx.execute(
            "INSERT INTO users(email, name, oauth_provider, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![input.email, input.name, input.oauth_provider, rfc3339(created_at)?],
        )
        .context("failed to insert user")?;
        let id = UserId(tx.last_insert_rowid());
        tx.commit().context("failed to commit user transaction")?;

        Ok(User {
            id,
            email: input.email.clone(),
            name: input.name.clone(),
            oauth_provider: input.oauth_provider.clone(),
            created_at,
        })
    }

    /// # Errors
    /// Returns an error when the lookup or timestamp decoding fails.
    pub fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, email, name, oauth_provider, created_at FROM users WHERE id = ?1",
                params![user_id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("failed to load user {user_id}"))?;

        match row {
            Some((id, email, name, oauth_provider, created_at)) => Ok(Some(User {
                id: UserId(id),
                email,
                name,
                oauth_provider,
                created_at: parse_rfc3339(&created_at)?,
            })),
            None => Ok(None),
        }
    }

    /// # Errors
    /// Returns [`HubError::Validation`] when the owning user does not exist or the
    /// project is invalid, or a storage error.
    pub fn create_project(&mut self, input: &NewProject) -> Result<Project> {
        input.validate()?;
        if !self.user_exists(input.user_id)? {
            return Err(
                HubError::Validation(format!("user with id {} not found", input.user_id)).into()
            );
        }

        self.conn
            .execute(
                "INSERT INTO projects(user_id, name, description, start_date, end_date, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    input.user_id.0,
                    input.name,
                    input.description,
                    input.start_date.map(rfc3339).transpose()?,
                    input.end_date.map(rfc3339).transpose()?,
                    input.status,
                ],
            )
            .context("failed to insert project")?;

        Ok(Project {
            id: ProjectId(self.conn.last_insert_rowid()),
            user_id: input.user_id,
            name: input.name.clone(),
            description: input.description.clone(),
            start_date: input.start_date,
            end_date: input.end_date,
            status: input.status.clone(),
        })
    }

    /// # Errors
    /// Returns an error when the lookup or date decoding fails.
    pub fn get_project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, user_id, name, description, start_date, end_date, status
                 FROM projects WHERE id = ?1",
                params![project_id.0],
                project_row,
            )
            .optional()
            .with_context(|| format!("failed to load project {project_id}"))?;
        row.map(ProjectRow::into_project).transpose()
    }

    /// Projects in creation order, optionally restricted to one owner.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_projects(&self, user_id: Option<UserId>) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, description, start_date, end_date, status
             FROM projects
             WHERE (?1 IS NULL OR user_id = ?1)
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id.map(|id| id.0)], project_row)?;

        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?.into_project()?);
        }
        Ok(projects)
    }

    /// # Errors
    /// Returns [`HubError::Validation`] when the owning user does not exist, or a storage error.
    pub fn add_learning_log(&mut self, input: &NewLearningLog) -> Result<LearningLog> {
        if !self.user_exists(input.user_id)? {
            return Err(
                HubError::Validation(format!("user with id {} not found", input.user_id)).into()
            );
        }
        // Stored as UTC text so that `ORDER BY date` follows time order.
        let date = input.date.to_offset(UtcOffset::UTC);

        self.conn
            .execute(
                "INSERT INTO learning_logs(user_id, date, duration_minutes, description, evidence_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    input.user_id.0,
                    rfc3339(date)?,
                    i64::from(input.duration_minutes),
                    input.description,
                    input.evidence_id.map(|id| id.to_string()),
                ],
            )
            .context("failed to insert learning log")?;

        Ok(LearningLog {
            id: LearningLogId(self.conn.last_insert_rowid()),
            user_id: input.user_id,
            date,
            duration_minutes: input.duration_minutes,
            description: input.description.clone(),
            evidence_id: input.evidence_id,
        })
    }

    /// Learning logs of one user ordered by date.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_learning_logs(&self, user_id: UserId) -> Result<Vec<LearningLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, date, duration_minutes, description, evidence_id
             FROM learning_logs
             WHERE user_id = ?1
             ORDER BY date ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![user_id.0], |row| {
            Ok(LearningLogRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                date: row.get(2)?,
                duration_minutes: row.get(3)?,
                description: row.get(4)?,
                evidence_id: row.get(5)?,
            })
        })?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?.into_learning_log()?);
        }
        Ok(logs)
    }

    /// Read-then-write transactions take the write lock up front so concurrent
    /// writers wait on `busy_timeout` instead of failing the lock upgrade.
    fn write_transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start write transaction")
    }

    fn ksb_code_exists(&self, code: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM ksbs WHERE code = ?1)",
            params![code],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(exists == 1)
    }

    fn user_exists(&self, user_id: UserId) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            params![user_id.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(exists == 1)
    }
}

impl ProjectRow {
    fn into_project(self) -> Result<Project> {
        Ok(Project {
            id: ProjectId(self.id),
            user_id: UserId(self.user_id),
            name: self.name,
            description: self.description,
            start_date: self.start_date.as_deref().map(parse_rfc3339).transpose()?,
            end_date: self.end_date.as_deref().map(parse_rfc3339).transpose()?,
            status: self.status,
        })
    }
}

impl LearningLogRow {
    fn into_learning_log(self) -> Result<LearningLog> {
        Ok(LearningLog {
            id: LearningLogId(self.id),
            user_id: UserId(self.user_id),
            date: parse_rfc3339(&self.date)?,
            duration_minutes: u32::try_from(self.duration_minutes).with_context(|| {
                format!("invalid duration_minutes in learning log {}", self.id)
            })?,
            description: self.description,
            evidence_id: self.evidence_id.as_deref().map(EvidenceId::parse).transpose()?,
        })
    }
}

fn project_row(row: &Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        status: row.get(6)?,
    })
}

fn ksb_summary_from_row(row: &Row<'_>) -> rusqlite::Result<KsbSummary> {
    let count: i64 = row.get(3)?;
    let evidence_count =
        u64::try_from(count).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(3, count))?;
    Ok(KsbSummary {
        id: KsbId(row.get(0)?),
        code: row.get(1)?,
        description: row.get(2)?,
        evidence_count,
    })
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = rfc3339(OffsetDateTime::now_utc())?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}
