//! Loads simulation records from the simulation server or from a saved JSON document.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nomnom_core::SimulationRecord;
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, info};

/// Address the simulation server listens on by default.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8585";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything that prevents a simulation record from being loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to decode simulation record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Blocking client for the simulation server.
#[derive(Debug, Clone)]
pub struct SimulationClient {
    endpoint: String,
    http: Client,
}

impl SimulationClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LoadError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, LoadError> {
        let endpoint = endpoint.into();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| LoadError::Transport {
                url: endpoint.clone(),
                source,
            })?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one GET against the endpoint and decode the body.
    pub fn fetch(&self) -> Result<SimulationRecord, LoadError> {
        info!(endpoint = %self.endpoint, "Fetching simulation record");
        let transport = |source| LoadError::Transport {
            url: self.endpoint.clone(),
            source,
        };

        let response = self.http.get(&self.endpoint).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.text().map_err(transport)?;
        debug!(bytes = body.len(), "Simulation payload received");

        let record = parse_record(&body)?;
        log_loaded(&record);
        Ok(record)
    }
}

/// Decode a simulation record from its JSON representation.
pub fn parse_record(raw: &str) -> Result<SimulationRecord, LoadError> {
    Ok(serde_json::from_str(raw)?)
}

/// Read and decode a saved simulation record.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<SimulationRecord, LoadError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record = parse_record(&raw)?;
    log_loaded(&record);
    Ok(record)
}

fn log_loaded(record: &SimulationRecord) {
    info!(
        steps = record.steps.len(),
        declared_steps = record.total_steps,
        warehouse = %record.storage_location,
        "Simulation record loaded"
    );
}

/// Where a record comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationSource {
    Endpoint(String),
    File(PathBuf),
}

impl SimulationSource {
    pub fn load(&self) -> Result<SimulationRecord, LoadError> {
        match self {
            SimulationSource::Endpoint(url) => SimulationClient::new(url.clone())?.fetch(),
            SimulationSource::File(path) => load_from_path(path),
        }
    }
}

impl fmt::Display for SimulationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationSource::Endpoint(url) => f.write_str(url),
            SimulationSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}
