//! Registry data model.
//!
//! Wire DTOs mirror the registry's JSON; the domain types below them are what
//! the rest of the engine works with.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use signalwatch_core::{CompanyNumber, DirectorId, FilingId};

/// OCR status of a filing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    /// Not yet processed
    #[default]
    Pending,
    /// Text was extracted (possibly with zero candidates)
    Extracted,
    /// Document was unreadable
    Failed,
}

/// A director reference as listed on a company's officer register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorRef {
    /// Registry officer id
    pub id: DirectorId,
    /// Display name
    pub name: String,
    /// Officer role, e.g. `director`, `corporate-director`
    pub role: Option<String>,
    /// Whether the appointment has ended
    pub resigned: bool,
}

/// A filing on a company's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
    /// Transaction id
    pub id: FilingId,
    /// Filing category, e.g. `incorporation`, `change-of-name`
    pub category: String,
    /// Form type, e.g. `NM01`
    pub filing_type: Option<String>,
    /// Registry description key
    pub description: String,
    /// Declared date
    pub date: Option<NaiveDate>,
    /// Document API id, if the filing has a document
    pub document_id: Option<String>,
    /// OCR status
    pub ocr_status: OcrStatus,
}

/// A name the company was previously registered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousName {
    /// Former name
    pub name: String,
    /// Date the company stopped using the name
    pub ceased_on: Option<NaiveDate>,
}

/// Official company record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Registry number
    pub number: CompanyNumber,
    /// Registered name
    pub name: String,
    /// Incorporation date
    pub incorporation_date: Option<NaiveDate>,
    /// Company status, e.g. `active`, `dissolved`
    pub status: Option<String>,
    /// Company type, e.g. `ltd`
    pub company_type: Option<String>,
    /// Names the company was previously registered under, newest first
    pub previous_names: Vec<PreviousName>,
    /// Officers in register order
    pub directors: Vec<DirectorRef>,
    /// Filing history
    pub filings: Vec<Filing>,
}

impl CompanyRecord {
    /// Whether the company is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.as_deref().map_or(true, |s| s.eq_ignore_ascii_case("active"))
    }
}

/// One appointment held by a director.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Company the appointment is at
    pub company_number: CompanyNumber,
    /// Company name
    pub company_name: Option<String>,
    /// Company status
    pub company_status: Option<String>,
    /// Whether the appointment has ended
    pub resigned: bool,
}

impl Appointment {
    /// Whether the appointed company is active.
    #[must_use]
    pub fn company_active(&self) -> bool {
        self.company_status
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("active"))
    }
}

/// A company search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySummary {
    /// Registry number
    pub number: CompanyNumber,
    /// Company name
    pub name: String,
    /// Company status
    pub status: Option<String>,
}

/// Parse a registry `YYYY-MM-DD` date.
#[must_use]
pub fn parse_registry_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok())
}

/// `GET /company/{number}`
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyProfileResponse {
    /// Company number
    pub company_number: String,
    /// Registered name
    #[serde(default)]
    pub company_name: String,
    /// Incorporation date
    pub date_of_creation: Option<String>,
    /// Status
    pub company_status: Option<String>,
    /// Company type
    #[serde(rename = "type")]
    pub company_type: Option<String>,
    /// Former names
    #[serde(default)]
    pub previous_company_names: Vec<PreviousNameResponse>,
}

/// Former name entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviousNameResponse {
    /// Former name
    pub name: String,
    /// Date the name ceased
    pub ceased_on: Option<String>,
}

/// `GET /company/{number}/officers`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfficerListResponse {
    /// Page of officers
    #[serde(default)]
    pub items: Vec<OfficerResponse>,
    /// Total officers
    pub total_results: Option<usize>,
}

/// Officer entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OfficerResponse {
    /// Officer name
    #[serde(default)]
    pub name: String,
    /// Role
    pub officer_role: Option<String>,
    /// Resignation date
    pub resigned_on: Option<String>,
    /// Links
    pub links: Option<OfficerLinks>,
}

/// Officer links block.
#[derive(Debug, Clone, Deserialize)]
pub struct OfficerLinks {
    /// Officer sub-links
    pub officer: Option<OfficerLink>,
}

/// Officer appointments link.
#[derive(Debug, Clone, Deserialize)]
pub struct OfficerLink {
    /// `/officers/{id}/appointments`
    pub appointments: Option<String>,
}

/// `GET /company/{number}/filing-history`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilingHistoryResponse {
    /// Page of filings
    #[serde(default)]
    pub items: Vec<FilingResponse>,
    /// Total filings
    pub total_count: Option<usize>,
}

/// Filing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingResponse {
    /// Transaction id
    pub transaction_id: String,
    /// Category
    pub category: Option<String>,
    /// Form type
    #[serde(rename = "type")]
    pub filing_type: Option<String>,
    /// Description key
    pub description: Option<String>,
    /// Declared date
    pub date: Option<String>,
    /// Links
    pub links: Option<FilingLinks>,
}

/// Filing links block.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingLinks {
    /// Document metadata URL on the document API
    pub document_metadata: Option<String>,
}

/// `GET /officers/{id}/appointments`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListResponse {
    /// Page of appointments
    #[serde(default)]
    pub items: Vec<AppointmentResponse>,
    /// Total appointments
    pub total_results: Option<usize>,
}

/// Appointment entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentResponse {
    /// Appointed company
    pub appointed_to: AppointedTo,
    /// Resignation date
    pub resigned_on: Option<String>,
}

/// Company an appointment is at.
#[derive(Debug, Clone, Deserialize)]
pub struct AppointedTo {
    /// Company number
    pub company_number: String,
    /// Company name
    pub company_name: Option<String>,
    /// Company status
    pub company_status: Option<String>,
}

/// `GET /search/companies` and `GET /advanced-search/companies`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    /// Page of hits
    #[serde(default)]
    pub items: Vec<SearchItem>,
    /// Total hits
    #[serde(alias = "hits")]
    pub total_results: Option<usize>,
}

/// Search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    /// Company number
    pub company_number: String,
    /// Company name (`title` on basic search)
    #[serde(alias = "title")]
    pub company_name: Option<String>,
    /// Company status
    pub company_status: Option<String>,
}
