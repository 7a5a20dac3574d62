use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

pub const DEFAULT_CONTENT_TYPE: &str = "markdown";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum HubError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("validation error: {0}")]
    Validation(String),
}

impl HubError {
    /// Stable machine-readable name of the error category.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::MalformedInput(_) => "malformed_input",
            Self::Validation(_) => "validation",
        }
    }
}

macro_rules! integer_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
        )]
        pub struct $name(pub i64);

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

integer_id!(KsbId);
integer_id!(UserId);
integer_id!(ProjectId);
integer_id!(LearningLogId);

/// Identifier issued by the evidence document store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EvidenceId(pub Ulid);

impl EvidenceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a caller-supplied evidence identifier.
    ///
    /// # Errors
    /// Returns [`HubError::MalformedInput`] when `raw` is not in the store's native id format.
    pub fn parse(raw: &str) -> Result<Self, HubError> {
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|_| HubError::MalformedInput(format!("invalid evidence id format: {raw}")))
    }
}

impl Default for EvidenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EvidenceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EvidenceId {
    type Err = HubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Ksb {
    pub id: KsbId,
    pub code: String,
    pub description: String,
}

/// A KSB together with its live link count.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct KsbSummary {
    pub id: KsbId,
    pub code: String,
    pub description: String,
    pub evidence_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewKsb {
    pub code: String,
    pub description: String,
}

impl NewKsb {
    /// # Errors
    /// Returns [`HubError::Validation`] when the code is blank or padded with whitespace.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.code.trim().is_empty() {
            return Err(HubError::Validation("KSB code MUST NOT be empty".to_string()));
        }
        if self.code.trim() != self.code {
            return Err(HubError::Validation(format!(
                "KSB code MUST NOT carry surrounding whitespace: {:?}",
                self.code
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvidenceDocument {
    pub user_id: UserId,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub content_type: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl EvidenceDocument {
    /// # Errors
    /// Returns [`HubError::Validation`] for a blank title or content type, or when
    /// `updated_at` precedes `created_at`.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.title.trim().is_empty() {
            return Err(HubError::Validation("evidence title MUST NOT be empty".to_string()));
        }
        if self.content_type.trim().is_empty() {
            return Err(HubError::Validation(
                "evidence content_type MUST NOT be empty".to_string(),
            ));
        }
        if self.updated_at < self.created_at {
            return Err(HubError::Validation(
                "evidence updated_at MUST NOT precede created_at".to_string(),
            ));
        }
        Ok(())
    }
}

/// One document as held by the evidence store.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StoredEvidence {
    pub id: EvidenceId,
    pub document: EvidenceDocument,
}

/// Evidence document joined with the KSB identifiers it is linked to.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvidenceRecord {
    pub id: EvidenceId,
    pub user_id: UserId,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub content_type: String,
    pub content: String,
    pub ksb_ids: Vec<KsbId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl EvidenceRecord {
    #[must_use]
    pub fn from_stored(stored: StoredEvidence, ksb_ids: Vec<KsbId>) -> Self {
        let StoredEvidence { id, document } = stored;
        Self {
            id,
            user_id: document.user_id,
            project_id: document.project_id,
            title: document.title,
            content_type: document.content_type,
            content: document.content,
            ksb_ids,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvidenceFilter {
    pub user_id: Option<UserId>,
    pub project_id: Option<ProjectId>,
}

impl EvidenceFilter {
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self { user_id: Some(user_id), project_id: None }
    }
}

/// In-place edit of an evidence document. Links are never touched by an edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvidenceEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_type: Option<String>,
}

impl EvidenceEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.content_type.is_none()
    }

    /// Apply the edit and stamp `updated_at`.
    ///
    /// # Errors
    /// Returns [`HubError::Validation`] when the edited document is no longer valid.
    pub fn apply(
        self,
        document: &mut EvidenceDocument,
        now: OffsetDateTime,
    ) -> Result<(), HubError> {
        if let Some(title) = self.title {
            document.title = title;
        }
        if let Some(content) = self.content {
            document.content = content;
        }
        if let Some(content_type) = self.content_type {
            document.content_type = content_type;
        }
        document.updated_at = now.max(document.created_at);
        document.validate()
    }
}

/// Drop repeated KSB ids while keeping first-seen order.
#[must_use]
pub fn unique_ksb_ids(ids: &[KsbId]) -> Vec<KsbId> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub oauth_provider: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub oauth_provider: Option<String>,
}

impl NewUser {
    /// # Errors
    /// Returns [`HubError::Validation`] when the email is blank or lacks an `@`.
    pub fn validate(&self) -> Result<(), HubError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(HubError::Validation(format!("invalid user email: {:?}", self.email)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewProject {
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub status: Option<String>,
}

impl NewProject {
    /// # Errors
    /// Returns [`HubError::Validation`] for a blank name or an end date before the start date.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.name.trim().is_empty() {
            return Err(HubError::Validation("project name MUST NOT be empty".to_string()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(HubError::Validation(
                    "project end_date MUST NOT precede start_date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct LearningLog {
    pub id: LearningLogId,
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub duration_minutes: u32,
    pub description: Option<String>,
    pub evidence_id: Option<EvidenceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewLearningLog {
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub duration_minutes: u32,
    pub description: Option<String>,
    pub evidence_id: Option<EvidenceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

impl SchemaStatus {
    #[must_use]
    pub fn from_versions(current_version: i64, target_version: i64) -> Self {
        let pending_versions = if current_version < target_version {
            ((current_version + 1)..=target_version).collect()
        } else {
            Vec::new()
        };
        Self { current_version, target_version, pending_versions }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Covered,
    NotCovered,
}

impl CoverageStatus {
    #[must_use]
    pub fn from_count(evidence_count: u64) -> Self {
        if evidence_count > 0 {
            Self::Covered
        } else {
            Self::NotCovered
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct KsbProgress {
    pub id: KsbId,
    pub code: String,
    pub description: String,
    pub evidence_count: u64,
    pub status: CoverageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageStats {
    pub total_ksbs: u64,
    pub covered_ksbs: u64,
    pub coverage_percentage: f64,
    /// Evidence documents owned by the user.
    pub total_evidence: u64,
    /// Sum of per-KSB link counts; one document linked to three KSBs adds three.
    pub total_evidence_links: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardOverview {
    pub user_id: UserId,
    pub stats: CoverageStats,
    pub ksb_progress: Vec<KsbProgress>,
}

/// Percentage of covered KSBs, rounded to one decimal place. Zero KSBs yields 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn coverage_percentage(covered: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let ratio = covered.min(total) as f64 / total as f64 * 100.0;
    (ratio * 10.0).round() / 10.0
}

/// Roll per-KSB link counts into the dashboard overview for one user.
#[must_use]
pub fn build_dashboard_overview(
    user_id: UserId,
    ksbs: Vec<KsbSummary>,
    total_evidence: u64,
) -> DashboardOverview {
    let total_ksbs = ksbs.len() as u64;
    let mut covered_ksbs = 0_u64;
    let mut total_evidence_links = 0_u64;

    let ksb_progress = ksbs
        .into_iter()
        .map(|ksb| {
            let status = CoverageStatus::from_count(ksb.evidence_count);
            if status == CoverageStatus::Covered {
                covered_ksbs += 1;
            }
            total_evidence_links = total_evidence_links.saturating_add(ksb.evidence_count);
            KsbProgress {
                id: ksb.id,
                code: ksb.code,
                description: ksb.description,
                evidence_count: ksb.evidence_count,
                status,
            }
        })
        .collect::<Vec<_>>();

    DashboardOverview {
        user_id,
        stats: CoverageStats {
            total_ksbs,
            covered_ksbs,
            coverage_percentage: coverage_percentage(covered_ksbs, total_ksbs),
            total_evidence,
            total_evidence_links,
        },
        ksb_progress,
    }
}
