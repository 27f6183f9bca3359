//! SEC EDGAR client: full-text search, filing index and document download

use crate::config::FilingsConfig;
use crate::error::{RagError, Result};
use crate::http::{transport_error, unexpected_payload, vendor_error};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const PROVIDER: &str = "edgar";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

lazy_static! {
    static ref ACCESSION: Regex = Regex::new(r"^[0-9-]{10,25}$").unwrap();
}

/// Base URLs of the EDGAR services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgarEndpoints {
    /// Full-text search (EFTS)
    pub search: String,
    /// Company submissions
    pub data: String,
    /// Filing archives
    pub archives: String,
}

impl Default for EdgarEndpoints {
    fn default() -> Self {
        Self {
            search: "https://efts.sec.gov/LATEST".to_string(),
            data: "https://data.sec.gov".to_string(),
            archives: "https://www.sec.gov/Archives/edgar/data".to_string(),
        }
    }
}

impl EdgarEndpoints {
    /// Every service under one base URL (mock servers)
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            search: base.to_string(),
            data: base.to_string(),
            archives: format!("{}/Archives/edgar/data", base),
        }
    }
}

/// Full-text search parameters
#[derive(Debug, Clone, Default)]
pub struct FilingQuery {
    pub query: String,
    pub start: usize,
    pub count: usize,
    pub forms: Vec<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl FilingQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            count: 10,
            ..Self::default()
        }
    }
}

/// One full-text search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingSearchResult {
    /// Zero-padded to 10 digits
    pub cik: String,
    pub accession_number: String,
    pub form_type: String,
    pub filed_date: Option<String>,
    pub filing_url: Option<String>,
    pub company_name: Option<String>,
}

/// Throttled EDGAR client.
///
/// EDGAR requires a descriptive `User-Agent` and rejects clients that exceed
/// its request rate, so every call waits for the configured minimum interval.
pub struct EdgarClient {
    client: reqwest::Client,
    endpoints: EdgarEndpoints,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    cache_dir: PathBuf,
}

impl EdgarClient {
    pub fn new(config: &FilingsConfig) -> Result<Self> {
        let user_agent = config.user_agent.trim();
        if user_agent.is_empty() {
            return Err(RagError::config(
                "SEC_USER_AGENT is required by EDGAR (e.g. \"name contact@example.com\")",
            )
            .with_details(json!({ "setting": "SEC_USER_AGENT" })));
        }
        if !config.rate_limit_per_sec.is_finite() || config.rate_limit_per_sec <= 0.0 {
            return Err(RagError::config("SEC_RATE_LIMIT_PER_SEC must be positive")
                .with_details(json!({
                    "setting": "SEC_RATE_LIMIT_PER_SEC",
                    "value": config.rate_limit_per_sec,
                })));
        }

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| transport_error(PROVIDER, e))?;

        Ok(Self {
            client,
            endpoints: EdgarEndpoints::default(),
            min_interval: Duration::from_secs_f64(1.0 / config.rate_limit_per_sec),
            last_request: Mutex::new(None),
            cache_dir: config.cache_dir.clone(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: EdgarEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Wait until the minimum interval since the previous request has passed
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        self.throttle().await;
        tracing::debug!(url, "edgar request");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        if !response.status().is_success() {
            return Err(vendor_error(PROVIDER, response).await);
        }
        Ok(response)
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        self.get(url, query)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(PROVIDER, e))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.get(url, &[])
            .await?
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e))
    }

    /// Search filings with EDGAR full-text search
    pub async fn search_filings(&self, query: &FilingQuery) -> Result<Vec<FilingSearchResult>> {
        if query.query.trim().is_empty() {
            return Err(RagError::validation("search query must not be empty"));
        }
        let mut params = vec![
            ("q", query.query.clone()),
            ("start", query.start.to_string()),
            ("count", query.count.to_string()),
        ];
        if !query.forms.is_empty() {
            params.push(("forms", query.forms.join(",")));
        }
        if let Some(from) = &query.date_from {
            params.push(("from", from.clone()));
        }
        if let Some(to) = &query.date_to {
            params.push(("to", to.clone()));
        }

        let url = format!("{}/search-index", self.endpoints.search);
        let data = self.get_json(&url, &params).await?;
        let hits = data["hits"]["hits"].as_array().cloned().unwrap_or_default();

        let results: Vec<FilingSearchResult> = hits
            .iter()
            .map(|hit| search_hit(&hit["_source"], hit["_id"].as_str()))
            .collect();
        tracing::info!(query = %query.query, hits = results.len(), "edgar search");
        Ok(results)
    }

    /// Submissions JSON for a company
    pub async fn company_submissions(&self, cik: &str) -> Result<Value> {
        let url = format!("{}/submissions/CIK{}.json", self.endpoints.data, pad_cik(cik)?);
        self.get_json(&url, &[]).await
    }

    /// Filing index JSON for an accession number
    pub async fn filing_index(&self, cik: &str, accession_number: &str) -> Result<Value> {
        let url = format!(
            "{}/index.json",
            self.filing_base(cik, sanitize_accession(accession_number)?)?
        );
        self.get_json(&url, &[]).await
    }

    fn filing_base(&self, cik: &str, accession_number: &str) -> Result<String> {
        Ok(format!(
            "{}/{}/{}",
            self.endpoints.archives,
            cik_number(cik)?,
            accession_number.replace('-', "")
        ))
    }

    fn cache_path(&self, accession_number: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.html", accession_number))
    }

    /// Primary HTML document of a filing, served from the on-disk cache when present
    pub async fn download_primary_html(&self, cik: &str, accession_number: &str) -> Result<String> {
        let accession_number = sanitize_accession(accession_number)?;
        let cache_path = self.cache_path(accession_number);
        if cache_path.exists() {
            tracing::debug!(accession_number, "filing served from cache");
            return Ok(std::fs::read_to_string(&cache_path)?);
        }

        let index = self.filing_index(cik, accession_number).await?;
        let items = index["directory"]["item"].as_array().cloned().unwrap_or_default();
        let candidate = items
            .iter()
            .filter_map(|item| item["name"].as_str())
            .find(|name| {
                let lower = name.to_lowercase();
                (lower.ends_with(".htm") || lower.ends_with(".html")) && !lower.contains("index")
            })
            .ok_or_else(|| unexpected_payload(PROVIDER, "no primary HTML document in filing index"))?
            .to_string();

        let url = format!("{}/{}", self.filing_base(cik, accession_number)?, candidate);
        let html = self.get_text(&url).await?;

        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::write(&cache_path, &html)?;
        tracing::info!(accession_number, document = %candidate, bytes = html.len(), "downloaded filing");
        Ok(html)
    }
}

fn str_field<'a>(source: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| match &source[*k] {
            Value::String(s) if !s.is_empty() => Some(s.as_str()),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        })
}

/// Read a search hit, accepting both EFTS field names and the flattened ones
fn search_hit(source: &Value, id: Option<&str>) -> FilingSearchResult {
    let cik = match &source["cik"] {
        Value::Number(n) => n.to_string(),
        _ => str_field(source, &["cik", "ciks"]).unwrap_or_default().to_string(),
    };
    let accession = str_field(source, &["accessionNo", "accession_number", "adsh"])
        .map(str::to_string)
        .or_else(|| id.and_then(|id| id.split(':').next()).map(str::to_string))
        .unwrap_or_default();

    FilingSearchResult {
        cik: format!("{:0>10}", cik),
        accession_number: accession,
        form_type: str_field(source, &["formType", "form_type", "form", "root_forms"])
            .unwrap_or_default()
            .to_string(),
        filed_date: str_field(source, &["filedDate", "filed_date", "file_date"]).map(str::to_string),
        filing_url: str_field(source, &["linkToFilingDetails", "filingDetail"]).map(str::to_string),
        company_name: str_field(source, &["companyName", "company_name", "display_names"])
            .map(str::to_string),
    }
}

/// Accession numbers become file and URL path segments
pub fn sanitize_accession(accession_number: &str) -> Result<&str> {
    let invalid = !ACCESSION.is_match(accession_number)
        || ["/", "\\", ".."]
            .iter()
            .any(|sep| accession_number.contains(sep));
    if invalid {
        return Err(RagError::validation("Invalid accession number format")
            .with_details(json!({ "accession_number": accession_number })));
    }
    Ok(accession_number)
}

fn cik_number(cik: &str) -> Result<u64> {
    cik.trim().parse::<u64>().map_err(|_| {
        RagError::validation(format!("Invalid CIK: {:?}", cik)).with_details(json!({ "cik": cik }))
    })
}

/// CIK zero-padded to 10 digits
pub fn pad_cik(cik: &str) -> Result<String> {
    Ok(format!("{:010}", cik_number(cik)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cache: &Path) -> FilingsConfig {
        FilingsConfig {
            user_agent: "ragroute-tests tests@example.com".into(),
            rate_limit_per_sec: 100.0,
            cache_dir: cache.to_path_buf(),
        }
    }

    #[test]
    fn test_sanitize_accession() {
        assert!(sanitize_accession("0000320193-23-000106").is_ok());
        assert!(sanitize_accession("../../etc/passwd").is_err());
        assert!(sanitize_accession("123").is_err());
        assert!(sanitize_accession("0000320193/23/000106").is_err());
    }

    #[test]
    fn test_pad_cik() {
        assert_eq!(pad_cik("320193").unwrap(), "0000320193");
        assert!(pad_cik("apple").is_err());
    }

    #[test]
    fn test_user_agent_required() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.user_agent = " ".into();
        assert!(matches!(
            EdgarClient::new(&config).err().unwrap(),
            RagError::Configuration { .. }
        ));
    }

    #[tokio::test]
    async fn test_search_parses_hits() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search-index")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("q".into(), "revenue".into()),
                mockito::Matcher::UrlEncoded("forms".into(), "10-K,10-Q".into()),
            ]))
            .match_header("user-agent", "ragroute-tests tests@example.com")
            .with_status(200)
            .with_body(
                r#"{"hits":{"hits":[
                    {"_id":"0000320193-23-000106:aapl.htm",
                     "_source":{"ciks":["0000320193"],"form":"10-K","file_date":"2023-11-03",
                                "display_names":["Apple Inc. (AAPL)"]}},
                    {"_source":{"cik":789019,"accessionNo":"0000950170-23-035122",
                                "formType":"10-K","companyName":"Microsoft"}}
                ]}}"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = EdgarClient::new(&config(dir.path()))
            .unwrap()
            .with_endpoints(EdgarEndpoints::single(&server.url()));
        let mut query = FilingQuery::new("revenue");
        query.forms = vec!["10-K".into(), "10-Q".into()];
        let results = client.search_filings(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].cik, "0000320193");
        assert_eq!(results[0].accession_number, "0000320193-23-000106");
        assert_eq!(results[0].form_type, "10-K");
        assert_eq!(results[0].company_name.as_deref(), Some("Apple Inc. (AAPL)"));
        assert_eq!(results[1].cik, "0000789019");
        assert_eq!(results[1].accession_number, "0000950170-23-035122");
    }

    #[tokio::test]
    async fn test_download_uses_index_and_cache() {
        let mut server = mockito::Server::new_async().await;
        let index = server
            .mock("GET", "/Archives/edgar/data/320193/000032019323000106/index.json")
            .with_status(200)
            .with_body(
                r#"{"directory":{"item":[{"name":"0000320193-23-000106-index.htm"},
                                         {"name":"aapl-20230930.htm"}]}}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let doc = server
            .mock("GET", "/Archives/edgar/data/320193/000032019323000106/aapl-20230930.htm")
            .with_status(200)
            .with_body("<html><body>Item 1. Business</body></html>")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = EdgarClient::new(&config(dir.path()))
            .unwrap()
            .with_endpoints(EdgarEndpoints::single(&server.url()));

        let first = client
            .download_primary_html("0000320193", "0000320193-23-000106")
            .await
            .unwrap();
        let second = client
            .download_primary_html("320193", "0000320193-23-000106")
            .await
            .unwrap();

        index.assert_async().await;
        doc.assert_async().await;
        assert_eq!(first, second);
        assert!(dir.path().join("0000320193-23-000106.html").exists());
    }

    #[tokio::test]
    async fn test_http_error_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/submissions/CIK0000000001.json")
            .with_status(403)
            .with_body("Undeclared Automated Tool")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = EdgarClient::new(&config(dir.path()))
            .unwrap()
            .with_endpoints(EdgarEndpoints::single(&server.url()));
        let err = client.company_submissions("1").await.unwrap_err();
        assert!(matches!(err, RagError::Provider { status: 403, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_requests() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.rate_limit_per_sec = 2.0;
        let client = EdgarClient::new(&config).unwrap();

        let start = Instant::now();
        client.throttle().await;
        client.throttle().await;
        client.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
