//! Database abstraction layer.
//!
//! Provides a backend-agnostic `Database` trait that unifies all relational
//! persistence operations. The libSQL backend (embedded file or remote
//! replica) implements every sub-trait.
//!
//! The single-table notification store is separate; see `crate::notifications`.

#[cfg(feature = "libsql")]
pub mod libsql;

#[cfg(feature = "libsql")]
pub mod libsql_migrations;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Create a database backend from configuration, run migrations, and return it.
pub async fn connect_from_config(
    config: &crate::config::DatabaseConfig,
) -> Result<Arc<dyn Database>, DatabaseError> {
    #[cfg(feature = "libsql")]
    {
        let backend = connect_libsql(config).await?;
        Ok(Arc::new(backend))
    }
    #[cfg(not(feature = "libsql"))]
    {
        let _ = config;
        Err(DatabaseError::Pool(
            "No database backend available. Enable the 'libsql' feature.".to_string(),
        ))
    }
}

/// Open the libSQL backend described by `config` and run migrations.
///
/// Callers that also need the concrete backend (the notification table
/// shares its database handle) use this instead of `connect_from_config`.
#[cfg(feature = "libsql")]
pub async fn connect_libsql(
    config: &crate::config::DatabaseConfig,
) -> Result<libsql::LibSqlBackend, DatabaseError> {
    use secrecy::ExposeSecret as _;

    let default_path = crate::config::default_libsql_path();
    let db_path = config.libsql_path.as_deref().unwrap_or(&default_path);

    let backend = if let Some(ref url) = config.libsql_url {
        let token = config.libsql_auth_token.as_ref().ok_or_else(|| {
            DatabaseError::Pool("LIBSQL_AUTH_TOKEN required when LIBSQL_URL is set".to_string())
        })?;
        libsql::LibSqlBackend::new_remote_replica(db_path, url, token.expose_secret())
            .await
            .map_err(|e| DatabaseError::Pool(e.to_string()))?
    } else {
        libsql::LibSqlBackend::new_local(db_path)
            .await
            .map_err(|e| DatabaseError::Pool(e.to_string()))?
    };
    backend.run_migrations().await?;
    Ok(backend)
}

// ==================== Pagination ====================

/// Page/limit request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Number of pages needed to hold `total` rows.
    pub fn pages(&self, total: u64) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        total.div_ceil(self.limit)
    }
}

/// One page of rows plus the unpaged row count.
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}

// ==================== Enums ====================

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Which side of the case ledger an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Expense,
    Deposit,
}

impl LedgerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Deposit => "deposit",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "expense" => Some(Self::Expense),
            "deposit" => Some(Self::Deposit),
            _ => None,
        }
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Lawyer,
    Paralegal,
    Staff,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Lawyer => "lawyer",
            Self::Paralegal => "paralegal",
            Self::Staff => "staff",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "lawyer" => Some(Self::Lawyer),
            "paralegal" => Some(Self::Paralegal),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

/// Event type recorded when a case changes phase.
pub const PHASE_TRANSITION_EVENT: &str = "phase_transition";

// ==================== Categories & phases ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseCategoryRecord {
    pub id: Uuid,
    pub name: String,
    pub parent_category_id: Option<Uuid>,
    pub role_definitions: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCaseCategoryParams {
    pub name: String,
    pub parent_category_id: Option<Uuid>,
    pub role_definitions: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCaseCategoryParams {
    pub name: Option<String>,
    pub parent_category_id: Option<Option<Uuid>>,
    pub role_definitions: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePhaseRecord {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCasePhaseParams {
    pub category_id: Uuid,
    pub name: String,
    pub order: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCasePhaseParams {
    pub name: Option<String>,
    pub order: Option<i64>,
}

// ==================== Cases ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub id: Uuid,
    pub name: String,
    pub case_number: Option<String>,
    pub status: Option<String>,
    pub trial_level: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub first_consultation_date: Option<DateTime<Utc>>,
    pub engagement_date: Option<DateTime<Utc>>,
    pub case_closed_date: Option<DateTime<Utc>>,
    pub judgment_date: Option<DateTime<Utc>>,
    pub has_engagement_letter: bool,
    pub remarks: Option<String>,
    pub custom_properties: serde_json::Value,
    pub category_id: Uuid,
    pub current_phase_id: Option<Uuid>,
    pub court_division_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCaseParams {
    pub name: String,
    pub case_number: Option<String>,
    pub status: Option<String>,
    pub trial_level: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub first_consultation_date: Option<DateTime<Utc>>,
    pub engagement_date: Option<DateTime<Utc>>,
    pub case_closed_date: Option<DateTime<Utc>>,
    pub judgment_date: Option<DateTime<Utc>>,
    pub has_engagement_letter: bool,
    pub remarks: Option<String>,
    pub custom_properties: serde_json::Value,
    pub category_id: Uuid,
    pub current_phase_id: Option<Uuid>,
    pub court_division_id: Option<Uuid>,
}

impl CreateCaseParams {
    /// Minimal params: everything optional left empty.
    pub fn new(name: impl Into<String>, category_id: Uuid) -> Self {
        Self {
            name: name.into(),
            case_number: None,
            status: None,
            trial_level: None,
            hourly_rate: None,
            first_consultation_date: None,
            engagement_date: None,
            case_closed_date: None,
            judgment_date: None,
            has_engagement_letter: false,
            remarks: None,
            custom_properties: serde_json::json!({}),
            category_id,
            current_phase_id: None,
            court_division_id: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCaseParams {
    pub name: Option<String>,
    pub case_number: Option<Option<String>>,
    pub status: Option<Option<String>>,
    pub trial_level: Option<Option<String>>,
    pub hourly_rate: Option<Option<Decimal>>,
    pub first_consultation_date: Option<Option<DateTime<Utc>>>,
    pub engagement_date: Option<Option<DateTime<Utc>>>,
    pub case_closed_date: Option<Option<DateTime<Utc>>>,
    pub judgment_date: Option<Option<DateTime<Utc>>>,
    pub has_engagement_letter: Option<bool>,
    pub remarks: Option<Option<String>>,
    pub custom_properties: Option<serde_json::Value>,
    pub category_id: Option<Uuid>,
    pub current_phase_id: Option<Option<Uuid>>,
    pub court_division_id: Option<Option<Uuid>>,
}

/// Optional list filters; all set filters must match.
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub category_id: Option<Uuid>,
    pub status: Option<String>,
    /// Substring match on the case name.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePartyRecord {
    pub case_id: Uuid,
    pub party_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseAssignmentRecord {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTaskParams {
    pub case_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskParams {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub assigned_to: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseEventRecord {
    pub id: Uuid,
    pub case_id: Uuid,
    pub event_type: String,
    pub date_time: DateTime<Utc>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCaseEventParams {
    pub case_id: Uuid,
    pub event_type: String,
    pub date_time: DateTime<Utc>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMemoRecord {
    pub id: Uuid,
    pub case_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryRecord {
    pub id: Uuid,
    pub case_id: Uuid,
    pub kind: LedgerKind,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateLedgerEntryParams {
    pub case_id: Uuid,
    pub kind: LedgerKind,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
}

/// Sum of expenses and deposits for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseLedgerTotals {
    pub expenses: Decimal,
    pub deposits: Decimal,
    /// Deposits minus expenses.
    pub balance: Decimal,
}

/// Outcome report for one hearing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HearingReportRecord {
    pub id: Uuid,
    pub case_event_id: Uuid,
    pub case_id: Uuid,
    pub event_date_time: DateTime<Utc>,
    pub attendees: serde_json::Value,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_documents: Vec<SubmittedDocumentRecord>,
}

#[derive(Debug, Clone)]
pub struct CreateHearingReportParams {
    pub case_event_id: Uuid,
    pub attendees: serde_json::Value,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateHearingReportParams {
    pub attendees: Option<serde_json::Value>,
    pub notes: Option<Option<String>>,
}

pub const DEFAULT_SUBMITTED_DOCUMENT_STATUS: &str = "Submitted";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedDocumentRecord {
    pub id: Uuid,
    pub hearing_report_id: Uuid,
    pub document_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSubmittedDocumentParams {
    pub hearing_report_id: Uuid,
    pub document_name: String,
    /// Falls back to `Submitted`.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSubmittedDocumentParams {
    pub document_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmittedDocumentFilter {
    pub status: Option<String>,
    /// Substring match on the document name.
    pub search: Option<String>,
}

// ==================== Parties ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyRecord {
    pub id: Uuid,
    pub is_corporation: bool,
    pub is_former_client: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Party plus whichever profiles exist. Neither is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyWithProfiles {
    #[serde(flatten)]
    pub party: PartyRecord,
    pub individual_profile: Option<IndividualProfileRecord>,
    pub corporate_profile: Option<CorporateProfileRecord>,
}

impl PartyWithProfiles {
    pub fn has_profile(&self) -> bool {
        self.individual_profile.is_some() || self.corporate_profile.is_some()
    }

    /// Best display name from whichever profile exists.
    pub fn display_name(&self) -> Option<String> {
        if let Some(corp) = &self.corporate_profile
            && let Some(name) = corp.fields.name.as_deref()
        {
            return Some(name.to_string());
        }
        self.individual_profile.as_ref().and_then(|p| {
            let parts: Vec<&str> = [p.fields.last_name.as_deref(), p.fields.first_name.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndividualProfileFields {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name_kana: Option<String>,
    pub first_name_kana: Option<String>,
    pub honorific: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub company_name: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualProfileRecord {
    pub party_id: Uuid,
    #[serde(flatten)]
    pub fields: IndividualProfileFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorporateProfileFields {
    pub name: Option<String>,
    pub name_kana: Option<String>,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "websiteURL")]
    pub website_url: Option<String>,
    pub representative_title: Option<String>,
    pub representative_name: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporateProfileRecord {
    pub party_id: Uuid,
    #[serde(flatten)]
    pub fields: CorporateProfileFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CreatePartyParams {
    pub is_corporation: bool,
    pub is_former_client: bool,
    pub individual_profile: Option<IndividualProfileFields>,
    pub corporate_profile: Option<CorporateProfileFields>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePartyParams {
    pub is_corporation: Option<bool>,
    pub is_former_client: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct PartyFilter {
    pub is_corporation: Option<bool>,
    pub is_former_client: Option<bool>,
    /// Substring match on individual or corporate names.
    pub name: Option<String>,
}

// ==================== Courts ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourthouseRecord {
    pub id: Uuid,
    pub name: String,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCourthouseParams {
    pub name: String,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCourthouseParams {
    pub name: Option<String>,
    pub postal_code: Option<Option<String>>,
    pub address1: Option<Option<String>>,
    pub address2: Option<Option<String>>,
    pub phone: Option<Option<String>>,
}

/// Appeal route from a lower to a superior courthouse, optionally
/// limited to one case category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JurisdictionRuleRecord {
    pub id: Uuid,
    pub lower_courthouse_id: Uuid,
    pub lower_courthouse_name: String,
    pub superior_courthouse_id: Uuid,
    pub superior_courthouse_name: String,
    pub case_category_id: Option<Uuid>,
    pub case_category_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateJurisdictionRuleParams {
    pub lower_courthouse_id: Uuid,
    pub superior_courthouse_id: Uuid,
    pub case_category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateJurisdictionRuleParams {
    pub lower_courthouse_id: Option<Uuid>,
    pub superior_courthouse_id: Option<Uuid>,
    pub case_category_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Default)]
pub struct JurisdictionRuleFilter {
    pub lower_courthouse_id: Option<Uuid>,
    pub superior_courthouse_id: Option<Uuid>,
    pub case_category_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtDivisionRecord {
    pub id: Uuid,
    pub courthouse_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type")]
    pub division_type: String,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCourtDivisionParams {
    pub courthouse_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub division_type: String,
    pub phone: Option<String>,
    pub fax: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtPersonnelRecord {
    pub id: Uuid,
    pub court_division_id: Uuid,
    pub name: String,
    pub role: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCourtPersonnelParams {
    pub court_division_id: Uuid,
    pub name: String,
    pub role: String,
    pub email: Option<String>,
}

// ==================== Firms & lawyers ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LawFirmRecord {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LawFirmOfficeRecord {
    pub id: Uuid,
    pub law_firm_id: Uuid,
    pub is_primary: bool,
    pub office_name: Option<String>,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateLawFirmOfficeParams {
    pub is_primary: bool,
    pub office_name: Option<String>,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateLawFirmOfficeParams {
    pub is_primary: Option<bool>,
    pub office_name: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub address1: Option<Option<String>>,
    pub address2: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub fax: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LawyerRecord {
    pub id: Uuid,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name_kana: Option<String>,
    pub first_name_kana: Option<String>,
    pub registration_number: Option<String>,
    pub office_id: Option<Uuid>,
    pub phone: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateLawyerParams {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name_kana: Option<String>,
    pub first_name_kana: Option<String>,
    pub registration_number: Option<String>,
    pub office_id: Option<Uuid>,
    pub phone: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateLawyerParams {
    pub last_name: Option<Option<String>>,
    pub first_name: Option<Option<String>>,
    pub last_name_kana: Option<Option<String>>,
    pub first_name_kana: Option<Option<String>>,
    pub registration_number: Option<Option<String>>,
    pub office_id: Option<Option<Uuid>>,
    pub phone: Option<Option<String>>,
    pub remarks: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct LawyerFilter {
    pub office_id: Option<Uuid>,
    /// Substring match on first or last name.
    pub name: Option<String>,
    pub registration_number: Option<String>,
}

// ==================== Workflow templates ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplateRecord {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplateWithItems {
    #[serde(flatten)]
    pub template: TaskTemplateRecord,
    pub items: Vec<TaskTemplateItemRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplateItemRecord {
    pub id: Uuid,
    pub task_template_id: Uuid,
    pub description: String,
    pub due_date_offset_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TemplateItemParams {
    pub description: String,
    pub due_date_offset_days: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTemplateItemParams {
    pub description: Option<String>,
    pub due_date_offset_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTransitionRuleRecord {
    pub id: Uuid,
    pub from_phase_id: Uuid,
    pub to_phase_id: Uuid,
    pub task_template_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTransitionRuleParams {
    pub from_phase_id: Uuid,
    pub to_phase_id: Uuid,
    pub task_template_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTransitionRuleParams {
    pub from_phase_id: Option<Uuid>,
    pub to_phase_id: Option<Uuid>,
    pub task_template_id: Option<Option<Uuid>>,
}

/// Everything written by one phase transition.
#[derive(Debug, Clone)]
pub struct ApplyPhaseTransitionParams {
    pub case_id: Uuid,
    pub from_phase_id: Option<Uuid>,
    pub to_phase_id: Uuid,
    pub event: CreateCaseEventParams,
    pub tasks: Vec<CreateTaskParams>,
    /// `(user_id, message)` notices for assigned users.
    pub notices: Vec<(Uuid, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPhaseTransition {
    pub case: CaseRecord,
    pub event: CaseEventRecord,
    pub generated_tasks: Vec<TaskRecord>,
    pub notices_created: u64,
}

// ==================== Timesheets ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetEntryRecord {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub task_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Worked milliseconds.
    pub duration: i64,
    pub hours: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTimesheetEntryParams {
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub task_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Worked milliseconds; may be less than `end - start` when paused.
    pub duration: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTimesheetEntryParams {
    pub task_id: Option<Option<Uuid>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TimesheetFilter {
    pub user_id: Option<Uuid>,
    pub case_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Entry joined with the labels used by stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetEntryDetail {
    #[serde(flatten)]
    pub entry: TimesheetEntryRecord,
    pub case_name: Option<String>,
    pub task_title: Option<String>,
    pub user_name: Option<String>,
}

// ==================== Document templates ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTemplateRecord {
    pub id: Uuid,
    pub name: String,
    pub body: String,
    pub content_type: Option<String>,
    pub file_path: Option<String>,
    pub placeholders: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateDocumentTemplateParams {
    pub name: String,
    pub body: String,
    pub content_type: Option<String>,
    pub file_path: Option<String>,
    pub placeholders: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDocumentTemplateParams {
    pub name: Option<String>,
    pub body: Option<String>,
    pub content_type: Option<Option<String>>,
    pub file_path: Option<Option<String>>,
    pub placeholders: Option<serde_json::Value>,
}

// ==================== Users & notices ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub password_hash: String,
}

/// Relational per-user inbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// ==================== Sub-traits ====================
//
// Each sub-trait groups related persistence methods. The `Database` supertrait
// combines them all. Leaf consumers can depend on a specific sub-trait instead.

#[async_trait]
pub trait CaseCategoryStore: Send + Sync {
    async fn create_category(
        &self,
        input: &CreateCaseCategoryParams,
    ) -> Result<CaseCategoryRecord, DatabaseError>;
    async fn get_category(&self, id: Uuid) -> Result<Option<CaseCategoryRecord>, DatabaseError>;
    async fn list_categories(&self) -> Result<Vec<CaseCategoryRecord>, DatabaseError>;
    async fn list_child_categories(
        &self,
        parent_id: Uuid,
    ) -> Result<Vec<CaseCategoryRecord>, DatabaseError>;
    async fn update_category(
        &self,
        id: Uuid,
        input: &UpdateCaseCategoryParams,
    ) -> Result<Option<CaseCategoryRecord>, DatabaseError>;
    async fn delete_category(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CasePhaseStore: Send + Sync {
    async fn create_phase(
        &self,
        input: &CreateCasePhaseParams,
    ) -> Result<CasePhaseRecord, DatabaseError>;
    async fn get_phase(&self, id: Uuid) -> Result<Option<CasePhaseRecord>, DatabaseError>;
    /// Phases of one category ordered by `order`.
    async fn list_phases_for_category(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<CasePhaseRecord>, DatabaseError>;
    async fn update_phase(
        &self,
        id: Uuid,
        input: &UpdateCasePhaseParams,
    ) -> Result<Option<CasePhaseRecord>, DatabaseError>;
    async fn delete_phase(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn create_case(&self, input: &CreateCaseParams) -> Result<CaseRecord, DatabaseError>;
    async fn get_case(&self, id: Uuid) -> Result<Option<CaseRecord>, DatabaseError>;
    async fn get_case_by_number(
        &self,
        case_number: &str,
    ) -> Result<Option<CaseRecord>, DatabaseError>;
    async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: PageRequest,
    ) -> Result<Paged<CaseRecord>, DatabaseError>;
    async fn update_case(
        &self,
        id: Uuid,
        input: &UpdateCaseParams,
    ) -> Result<Option<CaseRecord>, DatabaseError>;
    async fn delete_case(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CasePartyStore: Send + Sync {
    /// Link a party to a case. `(case, party, role)` is unique.
    async fn add_case_party(
        &self,
        case_id: Uuid,
        party_id: Uuid,
        role: &str,
    ) -> Result<CasePartyRecord, DatabaseError>;
    async fn list_case_parties(&self, case_id: Uuid)
    -> Result<Vec<CasePartyRecord>, DatabaseError>;
    async fn remove_case_party(
        &self,
        case_id: Uuid,
        party_id: Uuid,
        role: &str,
    ) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CaseAssignmentStore: Send + Sync {
    async fn assign_user(
        &self,
        case_id: Uuid,
        user_id: Uuid,
        role: Option<&str>,
    ) -> Result<CaseAssignmentRecord, DatabaseError>;
    async fn list_assignments(
        &self,
        case_id: Uuid,
    ) -> Result<Vec<CaseAssignmentRecord>, DatabaseError>;
    async fn unassign_user(&self, case_id: Uuid, user_id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, input: &CreateTaskParams) -> Result<TaskRecord, DatabaseError>;
    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>, DatabaseError>;
    async fn list_tasks_for_case(&self, case_id: Uuid) -> Result<Vec<TaskRecord>, DatabaseError>;
    async fn update_task(
        &self,
        id: Uuid,
        input: &UpdateTaskParams,
    ) -> Result<Option<TaskRecord>, DatabaseError>;
    async fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CaseEventStore: Send + Sync {
    async fn create_case_event(
        &self,
        input: &CreateCaseEventParams,
    ) -> Result<CaseEventRecord, DatabaseError>;
    /// Events newest first, optionally limited to one event type.
    async fn list_case_events(
        &self,
        case_id: Uuid,
        event_type: Option<&str>,
    ) -> Result<Vec<CaseEventRecord>, DatabaseError>;
    async fn get_case_event(&self, id: Uuid) -> Result<Option<CaseEventRecord>, DatabaseError>;
    async fn delete_case_event(&self, case_id: Uuid, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait HearingReportStore: Send + Sync {
    /// At most one report per event; a second fails with `Constraint`.
    async fn create_hearing_report(
        &self,
        input: &CreateHearingReportParams,
    ) -> Result<HearingReportRecord, DatabaseError>;
    async fn get_hearing_report(
        &self,
        id: Uuid,
    ) -> Result<Option<HearingReportRecord>, DatabaseError>;
    async fn get_hearing_report_for_event(
        &self,
        case_event_id: Uuid,
    ) -> Result<Option<HearingReportRecord>, DatabaseError>;
    /// Reports of a case, latest hearing first.
    async fn list_hearing_reports(
        &self,
        case_id: Uuid,
    ) -> Result<Vec<HearingReportRecord>, DatabaseError>;
    async fn update_hearing_report(
        &self,
        id: Uuid,
        input: &UpdateHearingReportParams,
    ) -> Result<Option<HearingReportRecord>, DatabaseError>;
    /// Also removes the report's submitted documents.
    async fn delete_hearing_report(&self, id: Uuid) -> Result<bool, DatabaseError>;
    async fn create_submitted_document(
        &self,
        input: &CreateSubmittedDocumentParams,
    ) -> Result<SubmittedDocumentRecord, DatabaseError>;
    async fn get_submitted_document(
        &self,
        id: Uuid,
    ) -> Result<Option<SubmittedDocumentRecord>, DatabaseError>;
    /// Documents of one report ordered by name.
    async fn list_report_documents(
        &self,
        hearing_report_id: Uuid,
    ) -> Result<Vec<SubmittedDocumentRecord>, DatabaseError>;
    /// Documents across a case's reports, latest hearing first then by name.
    async fn list_case_documents(
        &self,
        case_id: Uuid,
        filter: &SubmittedDocumentFilter,
    ) -> Result<Vec<SubmittedDocumentRecord>, DatabaseError>;
    async fn update_submitted_document(
        &self,
        id: Uuid,
        input: &UpdateSubmittedDocumentParams,
    ) -> Result<Option<SubmittedDocumentRecord>, DatabaseError>;
    async fn delete_submitted_document(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CaseMemoStore: Send + Sync {
    async fn create_memo(
        &self,
        case_id: Uuid,
        author_id: Option<Uuid>,
        content: &str,
    ) -> Result<CaseMemoRecord, DatabaseError>;
    async fn list_memos(&self, case_id: Uuid) -> Result<Vec<CaseMemoRecord>, DatabaseError>;
    async fn delete_memo(&self, case_id: Uuid, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CaseLedgerStore: Send + Sync {
    async fn create_ledger_entry(
        &self,
        input: &CreateLedgerEntryParams,
    ) -> Result<LedgerEntryRecord, DatabaseError>;
    async fn list_ledger_entries(
        &self,
        case_id: Uuid,
        kind: LedgerKind,
    ) -> Result<Vec<LedgerEntryRecord>, DatabaseError>;
    async fn delete_ledger_entry(
        &self,
        case_id: Uuid,
        kind: LedgerKind,
        id: Uuid,
    ) -> Result<bool, DatabaseError>;
    async fn ledger_totals(&self, case_id: Uuid) -> Result<CaseLedgerTotals, DatabaseError>;
}

#[async_trait]
pub trait PartyStore: Send + Sync {
    /// Create a party and any supplied profiles in one transaction.
    async fn create_party(
        &self,
        input: &CreatePartyParams,
    ) -> Result<PartyWithProfiles, DatabaseError>;
    async fn get_party(&self, id: Uuid) -> Result<Option<PartyWithProfiles>, DatabaseError>;
    async fn list_parties(
        &self,
        filter: &PartyFilter,
        page: PageRequest,
    ) -> Result<Paged<PartyWithProfiles>, DatabaseError>;
    async fn update_party(
        &self,
        id: Uuid,
        input: &UpdatePartyParams,
    ) -> Result<Option<PartyWithProfiles>, DatabaseError>;
    /// Fails with `ForeignKey` while either profile still exists.
    async fn delete_party(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait PartyProfileStore: Send + Sync {
    async fn upsert_individual_profile(
        &self,
        party_id: Uuid,
        fields: &IndividualProfileFields,
    ) -> Result<IndividualProfileRecord, DatabaseError>;
    async fn get_individual_profile(
        &self,
        party_id: Uuid,
    ) -> Result<Option<IndividualProfileRecord>, DatabaseError>;
    async fn delete_individual_profile(&self, party_id: Uuid) -> Result<bool, DatabaseError>;
    async fn upsert_corporate_profile(
        &self,
        party_id: Uuid,
        fields: &CorporateProfileFields,
    ) -> Result<CorporateProfileRecord, DatabaseError>;
    async fn get_corporate_profile(
        &self,
        party_id: Uuid,
    ) -> Result<Option<CorporateProfileRecord>, DatabaseError>;
    async fn delete_corporate_profile(&self, party_id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CourthouseStore: Send + Sync {
    async fn create_courthouse(
        &self,
        input: &CreateCourthouseParams,
    ) -> Result<CourthouseRecord, DatabaseError>;
    async fn get_courthouse(&self, id: Uuid) -> Result<Option<CourthouseRecord>, DatabaseError>;
    async fn get_courthouse_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CourthouseRecord>, DatabaseError>;
    async fn list_courthouses(
        &self,
        name: Option<&str>,
        page: PageRequest,
    ) -> Result<Paged<CourthouseRecord>, DatabaseError>;
    async fn update_courthouse(
        &self,
        id: Uuid,
        input: &UpdateCourthouseParams,
    ) -> Result<Option<CourthouseRecord>, DatabaseError>;
    async fn delete_courthouse(&self, id: Uuid) -> Result<bool, DatabaseError>;
    async fn create_division(
        &self,
        input: &CreateCourtDivisionParams,
    ) -> Result<CourtDivisionRecord, DatabaseError>;
    async fn get_division(&self, id: Uuid) -> Result<Option<CourtDivisionRecord>, DatabaseError>;
    async fn list_divisions(
        &self,
        courthouse_id: Uuid,
    ) -> Result<Vec<CourtDivisionRecord>, DatabaseError>;
    async fn create_personnel(
        &self,
        input: &CreateCourtPersonnelParams,
    ) -> Result<CourtPersonnelRecord, DatabaseError>;
    /// Personnel across every division of a courthouse.
    async fn list_personnel(
        &self,
        courthouse_id: Uuid,
    ) -> Result<Vec<CourtPersonnelRecord>, DatabaseError>;
}

#[async_trait]
pub trait JurisdictionRuleStore: Send + Sync {
    /// Unknown courthouse or category ids fail with `ForeignKey`.
    async fn create_jurisdiction_rule(
        &self,
        input: &CreateJurisdictionRuleParams,
    ) -> Result<JurisdictionRuleRecord, DatabaseError>;
    async fn get_jurisdiction_rule(
        &self,
        id: Uuid,
    ) -> Result<Option<JurisdictionRuleRecord>, DatabaseError>;
    /// Ordered by lower then superior courthouse name.
    async fn list_jurisdiction_rules(
        &self,
        filter: &JurisdictionRuleFilter,
    ) -> Result<Vec<JurisdictionRuleRecord>, DatabaseError>;
    async fn update_jurisdiction_rule(
        &self,
        id: Uuid,
        input: &UpdateJurisdictionRuleParams,
    ) -> Result<Option<JurisdictionRuleRecord>, DatabaseError>;
    async fn delete_jurisdiction_rule(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait LawFirmStore: Send + Sync {
    async fn create_law_firm(&self, name: &str) -> Result<LawFirmRecord, DatabaseError>;
    async fn get_law_firm(&self, id: Uuid) -> Result<Option<LawFirmRecord>, DatabaseError>;
    async fn get_law_firm_by_name(&self, name: &str)
    -> Result<Option<LawFirmRecord>, DatabaseError>;
    async fn list_law_firms(
        &self,
        name: Option<&str>,
        page: PageRequest,
    ) -> Result<Paged<LawFirmRecord>, DatabaseError>;
    async fn update_law_firm(
        &self,
        id: Uuid,
        name: &str,
    ) -> Result<Option<LawFirmRecord>, DatabaseError>;
    async fn delete_law_firm(&self, id: Uuid) -> Result<bool, DatabaseError>;
    async fn create_office(
        &self,
        law_firm_id: Uuid,
        input: &CreateLawFirmOfficeParams,
    ) -> Result<LawFirmOfficeRecord, DatabaseError>;
    async fn get_office(&self, id: Uuid) -> Result<Option<LawFirmOfficeRecord>, DatabaseError>;
    async fn list_offices(
        &self,
        law_firm_id: Uuid,
    ) -> Result<Vec<LawFirmOfficeRecord>, DatabaseError>;
    async fn update_office(
        &self,
        law_firm_id: Uuid,
        id: Uuid,
        input: &UpdateLawFirmOfficeParams,
    ) -> Result<Option<LawFirmOfficeRecord>, DatabaseError>;
    async fn delete_office(&self, law_firm_id: Uuid, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait LawyerStore: Send + Sync {
    async fn create_lawyer(&self, input: &CreateLawyerParams)
    -> Result<LawyerRecord, DatabaseError>;
    async fn get_lawyer(&self, id: Uuid) -> Result<Option<LawyerRecord>, DatabaseError>;
    async fn get_lawyer_by_registration(
        &self,
        registration_number: &str,
    ) -> Result<Option<LawyerRecord>, DatabaseError>;
    async fn list_lawyers(
        &self,
        filter: &LawyerFilter,
        page: PageRequest,
    ) -> Result<Paged<LawyerRecord>, DatabaseError>;
    async fn update_lawyer(
        &self,
        id: Uuid,
        input: &UpdateLawyerParams,
    ) -> Result<Option<LawyerRecord>, DatabaseError>;
    async fn delete_lawyer(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait WorkflowTemplateStore: Send + Sync {
    async fn create_task_template(
        &self,
        name: &str,
        items: &[TemplateItemParams],
    ) -> Result<TaskTemplateWithItems, DatabaseError>;
    async fn get_task_template(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskTemplateWithItems>, DatabaseError>;
    async fn list_task_templates(&self) -> Result<Vec<TaskTemplateWithItems>, DatabaseError>;
    async fn update_task_template(
        &self,
        id: Uuid,
        name: &str,
    ) -> Result<Option<TaskTemplateWithItems>, DatabaseError>;
    async fn delete_task_template(&self, id: Uuid) -> Result<bool, DatabaseError>;

    async fn create_template_item(
        &self,
        task_template_id: Uuid,
        input: &TemplateItemParams,
    ) -> Result<TaskTemplateItemRecord, DatabaseError>;
    async fn get_template_item(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskTemplateItemRecord>, DatabaseError>;
    async fn update_template_item(
        &self,
        id: Uuid,
        input: &UpdateTemplateItemParams,
    ) -> Result<Option<TaskTemplateItemRecord>, DatabaseError>;
    async fn delete_template_item(&self, id: Uuid) -> Result<bool, DatabaseError>;

    async fn create_transition_rule(
        &self,
        input: &CreateTransitionRuleParams,
    ) -> Result<PhaseTransitionRuleRecord, DatabaseError>;
    async fn get_transition_rule(
        &self,
        id: Uuid,
    ) -> Result<Option<PhaseTransitionRuleRecord>, DatabaseError>;
    async fn list_transition_rules(
        &self,
        from_phase_id: Option<Uuid>,
    ) -> Result<Vec<PhaseTransitionRuleRecord>, DatabaseError>;
    async fn update_transition_rule(
        &self,
        id: Uuid,
        input: &UpdateTransitionRuleParams,
    ) -> Result<Option<PhaseTransitionRuleRecord>, DatabaseError>;
    async fn delete_transition_rule(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait PhaseTransitionStore: Send + Sync {
    /// Set the case phase, record the event, insert generated tasks and
    /// notices. All or nothing.
    ///
    /// Fails with `Constraint` if the case is no longer in `from_phase_id`.
    async fn apply_phase_transition(
        &self,
        input: &ApplyPhaseTransitionParams,
    ) -> Result<AppliedPhaseTransition, DatabaseError>;
}

#[async_trait]
pub trait TimesheetStore: Send + Sync {
    async fn create_timesheet_entry(
        &self,
        input: &CreateTimesheetEntryParams,
    ) -> Result<TimesheetEntryRecord, DatabaseError>;
    async fn get_timesheet_entry(
        &self,
        id: Uuid,
    ) -> Result<Option<TimesheetEntryRecord>, DatabaseError>;
    async fn list_timesheet_entries(
        &self,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Paged<TimesheetEntryRecord>, DatabaseError>;
    async fn update_timesheet_entry(
        &self,
        id: Uuid,
        input: &UpdateTimesheetEntryParams,
    ) -> Result<Option<TimesheetEntryRecord>, DatabaseError>;
    async fn delete_timesheet_entry(&self, id: Uuid) -> Result<bool, DatabaseError>;
    /// Unpaged entries with case/task/user labels, for stats.
    async fn timesheet_entries_in_range(
        &self,
        filter: &TimesheetFilter,
    ) -> Result<Vec<TimesheetEntryDetail>, DatabaseError>;
}

#[async_trait]
pub trait DocumentTemplateStore: Send + Sync {
    async fn create_document_template(
        &self,
        input: &CreateDocumentTemplateParams,
    ) -> Result<DocumentTemplateRecord, DatabaseError>;
    async fn get_document_template(
        &self,
        id: Uuid,
    ) -> Result<Option<DocumentTemplateRecord>, DatabaseError>;
    async fn list_document_templates(&self) -> Result<Vec<DocumentTemplateRecord>, DatabaseError>;
    async fn update_document_template(
        &self,
        id: Uuid,
        input: &UpdateDocumentTemplateParams,
    ) -> Result<Option<DocumentTemplateRecord>, DatabaseError>;
    async fn delete_document_template(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, input: &CreateUserParams) -> Result<UserRecord, DatabaseError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError>;
    async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
    /// User owning an unexpired session.
    async fn resolve_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, DatabaseError>;
    async fn delete_session(&self, token_hash: &str) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait NotificationLogStore: Send + Sync {
    async fn create_notice(
        &self,
        user_id: Uuid,
        event_type: &str,
        message: &str,
    ) -> Result<NoticeRecord, DatabaseError>;
    async fn list_notices(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<NoticeRecord>, DatabaseError>;
    async fn mark_notice_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<NoticeRecord>, DatabaseError>;
    async fn mark_all_notices_read(&self, user_id: Uuid) -> Result<u64, DatabaseError>;
    async fn delete_read_notices(&self, user_id: Uuid) -> Result<u64, DatabaseError>;
}

/// Backend-agnostic database supertrait.
///
/// Combines all sub-traits into one.
#[async_trait]
pub trait Database:
    CaseCategoryStore
    + CasePhaseStore
    + CaseStore
    + CasePartyStore
    + CaseAssignmentStore
    + TaskStore
    + CaseEventStore
    + HearingReportStore
    + CaseMemoStore
    + CaseLedgerStore
    + PartyStore
    + PartyProfileStore
    + CourthouseStore
    + JurisdictionRuleStore
    + LawFirmStore
    + LawyerStore
    + WorkflowTemplateStore
    + PhaseTransitionStore
    + TimesheetStore
    + DocumentTemplateStore
    + UserStore
    + NotificationLogStore
    + Send
    + Sync
{
    /// Run schema migrations for this backend.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_offset_and_pages() {
        let page = PageRequest { page: 2, limit: 5 };
        assert_eq!(page.offset(), 5);
        assert_eq!(page.pages(15), 3);
        assert_eq!(page.pages(16), 4);
        assert_eq!(page.pages(0), 0);
    }

    #[test]
    fn enum_db_values_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::from_db_value(status.as_str()), Some(status));
        }
        assert_eq!(LedgerKind::from_db_value("refund"), None);
        assert_eq!(UserRole::from_db_value("lawyer"), Some(UserRole::Lawyer));
    }

    #[test]
    fn party_display_name_prefers_corporate_profile() {
        let now = Utc::now();
        let party = PartyRecord {
            id: Uuid::new_v4(),
            is_corporation: true,
            is_former_client: false,
            created_at: now,
            updated_at: now,
        };
        let mut with = PartyWithProfiles {
            party,
            individual_profile: Some(IndividualProfileRecord {
                party_id: Uuid::nil(),
                fields: IndividualProfileFields {
                    last_name: Some("Tanaka".to_string()),
                    first_name: Some("Aiko".to_string()),
                    ..Default::default()
                },
                created_at: now,
                updated_at: now,
            }),
            corporate_profile: None,
        };
        assert_eq!(with.display_name().as_deref(), Some("Tanaka Aiko"));

        with.corporate_profile = Some(CorporateProfileRecord {
            party_id: Uuid::nil(),
            fields: CorporateProfileFields {
                name: Some("Acme KK".to_string()),
                ..Default::default()
            },
            created_at: now,
            updated_at: now,
        });
        assert_eq!(with.display_name().as_deref(), Some("Acme KK"));
        assert!(with.has_profile());
    }

    #[test]
    fn user_record_never_serializes_password_hash() {
        let now = Utc::now();
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            name: None,
            role: UserRole::Staff,
            password_hash: "secret-hash".to_string(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&user).expect("serialize");
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"email\""));
    }
}
