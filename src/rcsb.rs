use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{DownloadSettings, SearchSettings};
use crate::domain::{PdbId, StructureFormat};
use crate::error::PipelineError;
use crate::retry::{AttemptFailure, RetryPolicy};

/// Fetches one coordinate file into a caller-owned directory.
pub trait StructureSource: Send + Sync {
    fn fetch(
        &self,
        id: &PdbId,
        format: StructureFormat,
        destination_dir: &Path,
    ) -> Result<PathBuf, PipelineError>;
}

/// Enumerates candidate identifiers.
pub trait IdLister {
    fn list_ids(&self) -> Result<Vec<PdbId>, PipelineError>;
}

fn build_client(timeout: Option<std::time::Duration>) -> Result<Client, PipelineError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("dssp-batch/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| PipelineError::RcsbHttp(err.to_string()))?,
    );
    let mut builder = Client::builder().default_headers(headers);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|err| PipelineError::RcsbHttp(err.to_string()))
}

#[derive(Clone)]
pub struct RcsbHttpClient {
    client: Client,
    base_url: String,
    policy: Arc<dyn RetryPolicy>,
}

impl RcsbHttpClient {
    pub fn new(base_url: &str, settings: &DownloadSettings) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(Some(settings.timeout))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy: Arc::from(settings.retry_policy()),
        })
    }

    pub fn with_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn structure_url(&self, id: &PdbId, format: StructureFormat) -> String {
        format!("{}/{}.{}", self.base_url, id.to_upper(), format.extension())
    }

    fn attempt(&self, url: &str, destination: &Path) -> Result<(), AttemptFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| AttemptFailure::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AttemptFailure::Status(response.status().as_u16()));
        }
        let body = response
            .bytes()
            .map_err(|err| AttemptFailure::Transport(err.to_string()))?;
        fs::write(destination, &body).map_err(|err| AttemptFailure::Io(err.to_string()))
    }
}

impl StructureSource for RcsbHttpClient {
    fn fetch(
        &self,
        id: &PdbId,
        format: StructureFormat,
        destination_dir: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let url = self.structure_url(id, format);
        let destination = destination_dir.join(format!("{}.{}", id.to_upper(), format.extension()));
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let failure = match self.attempt(&url, &destination) {
                Ok(()) => return Ok(destination),
                Err(failure) => failure,
            };
            match self.policy.next_delay(attempt, &failure) {
                Some(delay) => {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                None => {
                    debug!(%id, %format, attempts = attempt, "download budget exhausted");
                    return Err(PipelineError::Download {
                        id: id.to_string(),
                        format,
                        attempts: attempt,
                        last: failure.describe(),
                    });
                }
            }
        }
    }
}

/// Lists protein entries through the RCSB search API.
pub struct RcsbSearchClient {
    client: Client,
    settings: SearchSettings,
}

impl RcsbSearchClient {
    pub fn new(settings: SearchSettings) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(None)?,
            settings,
        })
    }

    pub fn query(&self) -> Value {
        let mut nodes = vec![json!({
            "type": "terminal",
            "service": "text",
            "parameters": {
                "attribute": "entity_poly.rcsb_entity_polymer_type",
                "operator": "exact_match",
                "value": "Protein"
            }
        })];
        if let Some(max_resolution) = self.settings.max_resolution {
            nodes.push(json!({
                "type": "terminal",
                "service": "text",
                "parameters": {
                    "attribute": "rcsb_entry_info.resolution_combined",
                    "operator": "less_or_equal",
                    "value": max_resolution
                }
            }));
        }
        json!({
            "query": {
                "type": "group",
                "logical_operator": "and",
                "nodes": nodes
            },
            "request_options": {
                "return_all_hits": true,
                "sort": [{
                    "sort_by": "rcsb_entry_container_identifiers.entry_id",
                    "direction": "asc"
                }]
            },
            "return_type": "entry"
        })
    }
}

impl IdLister for RcsbSearchClient {
    fn list_ids(&self) -> Result<Vec<PdbId>, PipelineError> {
        let response = self
            .client
            .post(&self.settings.url)
            .json(&self.query())
            .send()
            .map_err(|err| PipelineError::RcsbHttp(err.to_string()))?;
        // The search service answers 204 when nothing matches.
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "RCSB search failed".to_string());
            return Err(PipelineError::RcsbStatus { status, message });
        }
        let body: Value = response
            .json()
            .map_err(|err| PipelineError::RcsbHttp(err.to_string()))?;
        parse_search_result(&body)
    }
}

pub fn parse_search_result(body: &Value) -> Result<Vec<PdbId>, PipelineError> {
    let mut ids = body
        .get("result_set")
        .and_then(|value| value.as_array())
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("identifier").and_then(|value| value.as_str()))
                .map(|value| value.parse::<PdbId>())
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();
    ids.sort();
    ids.dedup();
    Ok(ids)
}
