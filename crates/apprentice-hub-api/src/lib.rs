use std::path::Path;

use anyhow::Result;
use apprentice_hub_core::{
    build_dashboard_overview, unique_ksb_ids, DashboardOverview, EvidenceDocument, EvidenceEdit,
    EvidenceFilter, EvidenceId, EvidenceRecord, HubError, KsbId, KsbSummary, LearningLog,
    NewKsb, NewLearningLog, NewProject, NewUser, Project, ProjectId, SchemaStatus,
    StoredEvidence, User, UserId, DEFAULT_CONTENT_TYPE,
};
use apprentice_hub_docstore::DocumentStore;
use apprentice_hub_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info, warn};

mod config;

pub use apprentice_hub_store_sqlite::{KsbImportFailure, KsbImportSummary};
pub use config::{StoreConfig, DEFAULT_DOCUMENT_DB, DEFAULT_RELATIONAL_DB};

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateEvidenceRequest {
    pub user_id: UserId,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub content_type: Option<String>,
    pub content: String,
    #[serde(default)]
    pub ksb_ids: Vec<KsbId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateLearningLogRequest {
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub duration_minutes: u32,
    pub description: Option<String>,
    pub evidence_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreMigration {
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub relational: StoreMigration,
    pub document: StoreMigration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaReport {
    pub relational: SchemaStatus,
    pub document: SchemaStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: String,
    pub relational: String,
    pub document: String,
}

/// Operations over the relational store and the evidence document store.
///
/// Store handles are opened per call and dropped on return; nothing is shared
/// between calls except the configured locations.
#[derive(Debug, Clone)]
pub struct ApprenticeHubApi {
    config: StoreConfig,
}

impl ApprenticeHubApi {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn relational_store(&self) -> Result<SqliteStore> {
        let mut store = SqliteStore::open(&self.config.relational_db)?;
        store.migrate()?;
        Ok(store)
    }

    fn document_store(&self) -> Result<DocumentStore> {
        let mut store = DocumentStore::open(&self.config.document_db)?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status of both stores without mutating data.
    ///
    /// # Errors
    /// Returns an error when either database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaReport> {
        Ok(SchemaReport {
            relational: SqliteStore::open(&self.config.relational_db)?.schema_status()?,
            document: DocumentStore::open(&self.config.document_db)?.schema_status()?,
        })
    }

    /// Apply pending migrations to both stores, or report the plan in dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut relational = SqliteStore::open(&self.config.relational_db)?;
        let mut document = DocumentStore::open(&self.config.document_db)?;
        let relational_before = relational.schema_status()?;
        let document_before = document.schema_status()?;

        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                relational: planned_migration(relational_before, None),
                document: planned_migration(document_before, None),
            });
        }

        relational.migrate()?;
        document.migrate()?;
        let relational_after = relational.schema_status()?;
        let document_after = document.schema_status()?;
        info!(
            relational_version = relational_after.current_version,
            document_version = document_after.current_version,
            "stores migrated"
        );

        Ok(MigrateResult {
            dry_run: false,
            relational: planned_migration(relational_before, Some(&relational_after)),
            document: planned_migration(document_before, Some(&document_after)),
        })
    }

    /// Open both stores and report them as connected.
    ///
    /// # Errors
    /// Returns an error when either store cannot be opened or migrated.
    pub fn health(&self) -> Result<HealthReport> {
        self.relational_store()?;
        self.document_store()?;
        Ok(HealthReport {
            status: "healthy".to_string(),
            relational: "connected".to_string(),
            document: "connected".to_string(),
        })
    }

    /// # Errors
    /// Returns an error when the registry cannot be read.
    pub fn list_ksbs(&self) -> Result<Vec<KsbSummary>> {
        self.relational_store()?.list_ksbs()
    }

    /// Register a KSB. A new KSB has no evidence.
    ///
    /// # Errors
    /// Returns [`HubError::Conflict`] when the code is already registered.
    pub fn create_ksb(&self, input: &NewKsb) -> Result<KsbSummary> {
        let ksb = self.relational_store()?.create_ksb(input)?;
        info!(ksb_id = %ksb.id, code = %ksb.code, "KSB registered");
        Ok(KsbSummary { id: ksb.id, code: ksb.code, description: ksb.description, evidence_count: 0 })
    }

    /// # Errors
    /// Returns [`HubError::NotFound`] when no KSB has `ksb_id`.
    pub fn get_ksb(&self, ksb_id: KsbId) -> Result<KsbSummary> {
        self.relational_store()?
            .get_ksb(ksb_id)?
            .ok_or_else(|| HubError::NotFound(format!("KSB with id {ksb_id} not found")).into())
    }

    /// Import a directory of `*.md` KSB files.
    ///
    /// # Errors
    /// Returns [`HubError::NotFound`] when `dir` does not exist, or a storage error.
    pub fn import_ksbs(&self, dir: &Path) -> Result<KsbImportSummary> {
        let summary = self.relational_store()?.import_ksb_directory(dir)?;
        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "KSB import finished"
        );
        Ok(summary)
    }

    /// Store an evidence document and link it to every requested KSB.
    ///
    /// The document is written first. If any link cannot be made the document is
    /// deleted again and the link failure is returned, so a failed call leaves no
    /// document and no links behind.
    ///
    /// # Errors
    /// Returns [`HubError::Validation`] naming the first unknown KSB id, a validation
    /// error for an invalid document, or a storage error.
    pub fn create_evidence(&self, input: CreateEvidenceRequest) -> Result<EvidenceRecord> {
        let mut relational = self.relational_store()?;
        let mut documents = self.document_store()?;

        let now = OffsetDateTime::now_utc();
        let document = EvidenceDocument {
            user_id: input.user_id,
            project_id: input.project_id,
            title: input.title,
            content_type: input.content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            content: input.content,
            created_at: now,
            updated_at: now,
        };
        let ksb_ids = unique_ksb_ids(&input.ksb_ids);

        let evidence_id = documents.insert_one(&document)?;
        if let Err(link_error) = relational.link_evidence(evidence_id, &ksb_ids) {
            match documents.delete_one(evidence_id) {
                Ok(true) => {
                    warn!(%evidence_id, error = %link_error, "evidence rejected; document removed");
                }
                Ok(false) => {
                    error!(%evidence_id, "compensating delete found no evidence document");
                }
                Err(compensation_error) => {
                    error!(
                        %evidence_id,
                        error = %format!("{compensation_error:#}"),
                        "compensating delete of evidence document failed"
                    );
                }
            }
            return Err(link_error);
        }

        info!(%evidence_id, user_id = %document.user_id, ksbs = ksb_ids.len(), "evidence created");
        Ok(EvidenceRecord::from_stored(StoredEvidence { id: evidence_id, document }, ksb_ids))
    }

    /// # Errors
    /// Returns [`HubError::MalformedInput`] when `raw_id` is not an evidence id, and
    /// [`HubError::NotFound`] when no document has it.
    pub fn get_evidence(&self, raw_id: &str) -> Result<EvidenceRecord> {
        let evidence_id = EvidenceId::parse(raw_id)?;
        let relational = self.relational_store()?;
        let stored = find_evidence(&self.document_store()?, evidence_id)?;
        let ksb_ids = relational.linked_ksb_ids(evidence_id)?;
        Ok(EvidenceRecord::from_stored(stored, ksb_ids))
    }

    /// Evidence matching `filter` in store order, each with its linked KSB ids.
    ///
    /// # Errors
    /// Returns an error when either store cannot be read.
    pub fn list_evidence(&self, filter: &EvidenceFilter) -> Result<Vec<EvidenceRecord>> {
        let relational = self.relational_store()?;
        let documents = self.document_store()?.find(filter)?;

        let mut records = Vec::with_capacity(documents.len());
        for stored in documents {
            let ksb_ids = relational.linked_ksb_ids(stored.id)?;
            records.push(EvidenceRecord::from_stored(stored, ksb_ids));
        }
        Ok(records)
    }

    /// Edit title, content, or content type in place. Links are left untouched.
    ///
    /// # Errors
    /// Returns [`HubError::MalformedInput`], [`HubError::NotFound`], or
    /// [`HubError::Validation`] when the edit leaves the document invalid.
    pub fn update_evidence(&self, raw_id: &str, edit: EvidenceEdit) -> Result<EvidenceRecord> {
        let evidence_id = EvidenceId::parse(raw_id)?;
        if edit.is_empty() {
            return Err(HubError::Validation(
                "evidence edit must change at least one of title, content, content_type"
                    .to_string(),
            )
            .into());
        }
        let relational = self.relational_store()?;
        let mut documents = self.document_store()?;

        let mut stored = find_evidence(&documents, evidence_id)?;
        edit.apply(&mut stored.document, OffsetDateTime::now_utc())?;
        if !documents.replace_one(evidence_id, &stored.document)? {
            return Err(HubError::NotFound(format!("evidence {evidence_id} not found")).into());
        }

        info!(%evidence_id, "evidence updated");
        let ksb_ids = relational.linked_ksb_ids(evidence_id)?;
        Ok(EvidenceRecord::from_stored(stored, ksb_ids))
    }

    /// Coverage of the KSB taxonomy by one user's evidence.
    ///
    /// Per-KSB counts only include links from documents owned by `user_id`.
    ///
    /// # Errors
    /// Returns an error when either store cannot be read.
    pub fn dashboard_overview(&self, user_id: UserId) -> Result<DashboardOverview> {
        let relational = self.relational_store()?;
        let documents = self.document_store()?;

        let filter = EvidenceFilter::for_user(user_id);
        let owned = documents.find_ids(&filter)?;
        let total_evidence = documents.count(&filter)?;
        let ksbs = relational.list_ksbs_scoped(&owned)?;
        Ok(build_dashboard_overview(user_id, ksbs, total_evidence))
    }

    /// # Errors
    /// Returns [`HubError::Conflict`] for a duplicate email.
    pub fn create_user(&self, input: &NewUser) -> Result<User> {
        let user = self.relational_store()?.create_user(input)?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// # Errors
    /// Returns [`HubError::NotFound`] when no user has `user_id`.
    pub fn get_user(&self, user_id: UserId) -> Result<User> {
        self.relational_store()?
            .get_user(user_id)?
            .ok_or_else(|| HubError::NotFound(format!("user with id {user_id} not found")).into())
    }

    /// # Errors
    /// Returns [`HubError::Validation`] when the owning user does not exist.
    pub fn create_project(&self, input: &NewProject) -> Result<Project> {
        let project = self.relational_store()?.create_project(input)?;
        info!(project_id = %project.id, user_id = %project.user_id, "project created");
        Ok(project)
    }

    /// # Errors
    /// Returns [`HubError::NotFound`] when no project has `project_id`.
    pub fn get_project(&self, project_id: ProjectId) -> Result<Project> {
        self.relational_store()?.get_project(project_id)?.ok_or_else(|| {
            HubError::NotFound(format!("project with id {project_id} not found")).into()
        })
    }

    /// # Errors
    /// Returns an error when projects cannot be read.
    pub fn list_projects(&self, user_id: Option<UserId>) -> Result<Vec<Project>> {
        self.relational_store()?.list_projects(user_id)
    }

    /// Record time spent learning. A referenced evidence id must be well formed but is
    /// not required to exist.
    ///
    /// # Errors
    /// Returns [`HubError::MalformedInput`] for a malformed evidence id and
    /// [`HubError::Validation`] when the owning user does not exist.
    pub fn add_learning_log(&self, input: CreateLearningLogRequest) -> Result<LearningLog> {
        let evidence_id = input.evidence_id.as_deref().map(EvidenceId::parse).transpose()?;
        let log = self.relational_store()?.add_learning_log(&NewLearningLog {
            user_id: input.user_id,
            date: input.date,
            duration_minutes: input.duration_minutes,
            description: input.description,
            evidence_id,
        })?;
        info!(learning_log_id = %log.id, user_id = %log.user_id, "learning log added");
        Ok(log)
    }

    /// # Errors
    /// Returns an error when learning logs cannot be read.
    pub fn list_learning_logs(&self, user_id: UserId) -> Result<Vec<LearningLog>> {
        self.relational_store()?.list_learning_logs(user_id)
    }
}

fn find_evidence(documents: &DocumentStore, evidence_id: EvidenceId) -> Result<StoredEvidence> {
    documents
        .find_one(evidence_id)?
        .ok_or_else(|| HubError::NotFound(format!("evidence {evidence_id} not found")).into())
}

fn planned_migration(before: SchemaStatus, after: Option<&SchemaStatus>) -> StoreMigration {
    StoreMigration {
        current_version: before.current_version,
        target_version: before.target_version,
        would_apply_versions: before.pending_versions,
        after_version: after.map(|status| status.current_version),
        up_to_date: after.map(|status| status.pending_versions.is_empty()),
    }
}
