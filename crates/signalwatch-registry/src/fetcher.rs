//! Typed registry retrieval over the rate-limited client.

use crate::client::{RateLimitedClient, RequestMode};
use crate::error::{RegistryError, Result};
use crate::models::{
    parse_registry_date, Appointment, AppointmentListResponse, CompanyProfileResponse,
    CompanyRecord, CompanySummary, DirectorRef, Filing, FilingHistoryResponse, OcrStatus,
    OfficerListResponse, PreviousName, SearchResponse,
};
use crate::transport::{ApiRequest, Endpoint};
use signalwatch_core::{CompanyNumber, DirectorId, FilingId, FilterCriteria};
use std::sync::Arc;

/// Items requested per page on paged endpoints.
const PAGE_SIZE: usize = 100;

/// The registry never returns more than this many search results.
pub const MAX_SEARCH_RESULTS: usize = 1000;

/// Retrieves company profiles, filing history and documents.
#[derive(Clone)]
pub struct DocumentFetcher {
    client: Arc<RateLimitedClient>,
}

impl DocumentFetcher {
    /// Create a fetcher over a shared client.
    #[must_use]
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &Arc<RateLimitedClient> {
        &self.client
    }

    /// Fetch the company profile and its officer register.
    ///
    /// The returned record has no filings; see [`Self::fetch_filings`].
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] if the company does not exist.
    pub async fn fetch_profile(&self, number: &CompanyNumber) -> Result<CompanyRecord> {
        let profile: CompanyProfileResponse = self
            .client
            .get(Endpoint::CompanyProfile(number.clone()))
            .await?
            .json()?;

        let directors = self.fetch_officers(number).await?;

        Ok(CompanyRecord {
            number: number.clone(),
            name: profile.company_name,
            incorporation_date: parse_registry_date(profile.date_of_creation.as_deref()),
            status: profile.company_status,
            company_type: profile.company_type,
            previous_names: profile
                .previous_company_names
                .into_iter()
                .map(|p| PreviousName {
                    ceased_on: parse_registry_date(p.ceased_on.as_deref()),
                    name: p.name,
                })
                .collect(),
            directors,
            filings: Vec::new(),
        })
    }

    async fn fetch_officers(&self, number: &CompanyNumber) -> Result<Vec<DirectorRef>> {
        let mut directors = Vec::new();
        let mut start_index = 0;

        loop {
            let request = ApiRequest::new(Endpoint::Officers(number.clone()))
                .param("items_per_page", PAGE_SIZE)
                .param("start_index", start_index);
            let page: OfficerListResponse = match self.send(&request).await {
                Ok(page) => page,
                Err(RegistryError::NotFound(_)) => {
                    tracing::debug!(company = %number, "no officer register");
                    break;
                }
                Err(e) => return Err(e),
            };

            let fetched = page.items.len();
            for officer in page.items {
                let link = officer
                    .links
                    .as_ref()
                    .and_then(|l| l.officer.as_ref())
                    .and_then(|o| o.appointments.as_deref());
                let Some(id) = link.and_then(|l| DirectorId::from_appointments_link(l).ok()) else {
                    tracing::debug!(company = %number, officer = %officer.name, "officer without appointments link");
                    continue;
                };
                directors.push(DirectorRef {
                    id,
                    name: officer.name,
                    role: officer.officer_role,
                    resigned: officer.resigned_on.is_some(),
                });
            }

            start_index += fetched;
            if fetched == 0 || start_index >= page.total_results.unwrap_or(0) {
                break;
            }
        }

        Ok(directors)
    }

    /// Fetch the complete filing history, newest first as the registry returns it.
    pub async fn fetch_filings(&self, number: &CompanyNumber) -> Result<Vec<Filing>> {
        let mut filings = Vec::new();
        let mut start_index = 0;

        loop {
            let request = ApiRequest::new(Endpoint::FilingHistory(number.clone()))
                .param("items_per_page", PAGE_SIZE)
                .param("start_index", start_index);
            let page: FilingHistoryResponse = match self.send(&request).await {
                Ok(page) => page,
                Err(RegistryError::NotFound(_)) => {
                    tracing::debug!(company = %number, "no filing history");
                    break;
                }
                Err(e) => return Err(e),
            };

            let fetched = page.items.len();
            for item in page.items {
                let Ok(id) = FilingId::new(item.transaction_id) else {
                    continue;
                };
                let document_id = item
                    .links
                    .and_then(|l| l.document_metadata)
                    .and_then(|url| document_id_from_metadata(&url));
                filings.push(Filing {
                    id,
                    category: item.category.unwrap_or_default(),
                    filing_type: item.filing_type,
                    description: item.description.unwrap_or_default(),
                    date: parse_registry_date(item.date.as_deref()),
                    document_id,
                    ocr_status: OcrStatus::Pending,
                });
            }

            start_index += fetched;
            if fetched == 0 || start_index >= page.total_count.unwrap_or(0) {
                break;
            }
        }

        Ok(filings)
    }

    /// Download a filing's document content.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] if the filing has no document or the document is gone.
    pub async fn fetch_document(&self, filing: &Filing) -> Result<Vec<u8>> {
        let id = filing
            .document_id
            .as_ref()
            .ok_or_else(|| RegistryError::NotFound(format!("no document for filing {}", filing.id)))?;
        let response = self
            .client
            .get(Endpoint::DocumentContent(id.clone()))
            .await?;
        Ok(response.body)
    }

    /// Fetch every appointment held by a director.
    pub async fn fetch_director_appointments(&self, id: &DirectorId) -> Result<Vec<Appointment>> {
        let mut appointments = Vec::new();
        let mut start_index = 0;

        loop {
            let request = ApiRequest::new(Endpoint::OfficerAppointments(id.clone()))
                .param("items_per_page", PAGE_SIZE)
                .param("start_index", start_index);
            let page: AppointmentListResponse = self.send(&request).await?;

            let fetched = page.items.len();
            for item in page.items {
                match CompanyNumber::new(&item.appointed_to.company_number) {
                    Ok(company_number) => appointments.push(Appointment {
                        company_number,
                        company_name: item.appointed_to.company_name,
                        company_status: item.appointed_to.company_status,
                        resigned: item.resigned_on.is_some(),
                    }),
                    Err(e) => tracing::debug!(director = %id, error = %e, "skipping appointment"),
                }
            }

            start_index += fetched;
            if fetched == 0 || start_index >= page.total_results.unwrap_or(0) {
                break;
            }
        }

        Ok(appointments)
    }

    /// Search for companies matching the criteria, capped at
    /// [`MAX_SEARCH_RESULTS`] or the criteria's own limit.
    ///
    /// Free-text queries use basic search; status/type-only criteria use
    /// advanced search. Status and type are re-checked on every hit.
    pub async fn search_companies(&self, criteria: &FilterCriteria) -> Result<Vec<CompanySummary>> {
        let limit = if criteria.limit == 0 {
            MAX_SEARCH_RESULTS
        } else {
            criteria.limit.min(MAX_SEARCH_RESULTS)
        };
        let query = criteria.query.as_deref().map(str::trim).filter(|q| !q.is_empty());

        let mut results: Vec<CompanySummary> = Vec::new();
        let mut start_index = 0;

        while results.len() < limit && start_index < MAX_SEARCH_RESULTS {
            let page_size = PAGE_SIZE.min(MAX_SEARCH_RESULTS - start_index);
            let mut request = match query {
                Some(q) => ApiRequest::new(Endpoint::SearchCompanies).param("q", q),
                None => ApiRequest::new(Endpoint::AdvancedSearch),
            };
            if query.is_none() {
                if let Some(status) = &criteria.company_status {
                    request = request.param("company_status", status);
                }
                if let Some(company_type) = &criteria.company_type {
                    request = request.param("company_type", company_type);
                }
            }
            let key = if query.is_some() { "items_per_page" } else { "size" };
            request = request
                .param(key, page_size)
                .param("start_index", start_index);

            let page: SearchResponse = self.send(&request).await?;
            let fetched = page.items.len();

            for item in page.items {
                if !matches_filter(criteria.company_status.as_deref(), item.company_status.as_deref()) {
                    continue;
                }
                let Ok(number) = CompanyNumber::new(&item.company_number) else {
                    continue;
                };
                if results.iter().any(|r| r.number == number) {
                    continue;
                }
                results.push(CompanySummary {
                    number,
                    name: item.company_name.unwrap_or_default(),
                    status: item.company_status,
                });
                if results.len() >= limit {
                    break;
                }
            }

            start_index += fetched;
            if fetched == 0 || start_index >= page.total_results.unwrap_or(0) {
                break;
            }
        }

        tracing::info!(results = results.len(), "company search complete");
        Ok(results)
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        self.client
            .request(request, RequestMode::Blocking)
            .await?
            .json()
    }
}

fn matches_filter(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
        (Some(_), None) => false,
    }
}

/// Extract the document id from a metadata URL such as
/// `https://document-api.example/document/AbC123`.
fn document_id_from_metadata(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty() && *id != "document")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_from_metadata() {
        assert_eq!(
            document_id_from_metadata("https://document-api.example/document/AbC123"),
            Some("AbC123".to_string())
        );
        assert_eq!(
            document_id_from_metadata("https://document-api.example/document/AbC123/"),
            Some("AbC123".to_string())
        );
        assert_eq!(document_id_from_metadata(""), None);
    }

    #[test]
    fn test_matches_filter() {
        assert!(matches_filter(None, None));
        assert!(matches_filter(Some("active"), Some("Active")));
        assert!(!matches_filter(Some("active"), Some("dissolved")));
        assert!(!matches_filter(Some("active"), None));
    }
}
