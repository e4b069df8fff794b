//! Neo4j over the HTTP transactional endpoint
//!
//! - one-shot and batch: `POST /db/{db}/tx/commit` with every statement in one
//!   body, so a batch is a single request and atomic on the server
//! - explicit transactions: `POST /db/{db}/tx` to open, `POST .../tx/{id}` to
//!   run, `POST .../tx/{id}/commit`, `DELETE .../tx/{id}` to roll back
//!
//! The server rolls a transaction back on its own when a statement fails, so
//! the handle closes itself on the first error.
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::cypher_generator::statement::{CypherStatement, Params};

use super::capabilities::DriverCapabilities;
use super::errors::{DriverError, ErrorKind};
use super::result_set::{Counters, ResultSet, ResultSummary};
use super::{ConnectionConfig, DriverFactory, DriverTransaction, GraphDriver};

#[derive(Debug, Serialize)]
struct HttpStatement<'a> {
    statement: &'a str,
    parameters: &'a Params,
    #[serde(rename = "includeStats")]
    include_stats: bool,
    #[serde(rename = "resultDataContents")]
    result_data_contents: [&'static str; 1],
}

#[derive(Debug, Serialize)]
struct HttpRequest<'a> {
    statements: Vec<HttpStatement<'a>>,
}

impl<'a> HttpRequest<'a> {
    fn new(statements: &'a [CypherStatement]) -> Self {
        HttpRequest {
            statements: statements
                .iter()
                .map(|s| HttpStatement {
                    statement: &s.text,
                    parameters: &s.params,
                    include_stats: true,
                    result_data_contents: ["row"],
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HttpResponse {
    #[serde(default)]
    results: Vec<HttpResult>,
    #[serde(default)]
    errors: Vec<HttpError>,
    commit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HttpResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<HttpRow>,
    stats: Option<Counters>,
}

#[derive(Debug, Deserialize)]
struct HttpRow {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct HttpError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    neo4j_version: Option<String>,
}

fn transport_error(err: reqwest::Error) -> DriverError {
    DriverError::network(format!("HTTP request failed: {}", err))
}

fn status_error(status: StatusCode, body: &str) -> DriverError {
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Authentication,
        s if s.is_server_error() => ErrorKind::Network,
        _ => ErrorKind::Syntax,
    };
    DriverError::with_kind(kind, format!("HTTP {}: {}", status, body))
}

/// Turn a response body into per-statement results or the first server error
fn into_results(response: HttpResponse, elapsed: Duration, database: &str) -> Result<Vec<ResultSet>, DriverError> {
    // the server stops at the failing statement, so completed results index it
    let completed = response.results.len();
    if let Some(error) = response.errors.into_iter().next() {
        return Err(DriverError::new(Some(error.code), error.message).at_statement(completed));
    }
    Ok(response
        .results
        .into_iter()
        .map(|result| {
            let data = result.data.into_iter().map(|r| r.row).collect();
            ResultSet::from_positional(result.columns, data).with_summary(ResultSummary {
                counters: result.stats.unwrap_or_default(),
                database: Some(database.to_string()),
                elapsed_ms: Some(elapsed.as_millis() as u64),
            })
        })
        .collect())
}

struct Endpoint {
    client: Client,
    config: ConnectionConfig,
}

impl Endpoint {
    fn tx_url(&self) -> String {
        format!("{}/db/{}/tx", self.config.base_url(), self.config.database_or_default())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<(HttpResponse, Option<String>), DriverError> {
        let response = self
            .authorize(request)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(transport_error)?;
        match serde_json::from_str::<HttpResponse>(&body) {
            Ok(parsed) if status.is_success() || !parsed.errors.is_empty() => Ok((parsed, location)),
            _ if !status.is_success() => Err(status_error(status, &body)),
            Ok(parsed) => Ok((parsed, location)),
            Err(e) => Err(DriverError::with_kind(
                ErrorKind::Syntax,
                format!("unreadable response from {}: {}", self.config.address(), e),
            )),
        }
    }

    async fn post(&self, url: &str, statements: &[CypherStatement]) -> Result<(HttpResponse, Option<String>), DriverError> {
        self.send(self.client.post(url).json(&HttpRequest::new(statements)))
            .await
    }
}

pub struct HttpDriver {
    endpoint: Arc<Endpoint>,
    capabilities: OnceCell<DriverCapabilities>,
}

impl HttpDriver {
    pub fn new(config: ConnectionConfig) -> Result<Self, DriverError> {
        let mut builder = Client::builder();
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| DriverError::network(format!("cannot build HTTP client: {}", e)))?;
        Ok(HttpDriver {
            endpoint: Arc::new(Endpoint { client, config }),
            capabilities: OnceCell::new(),
        })
    }

    async fn run_autocommit(&self, statements: &[CypherStatement]) -> Result<Vec<ResultSet>, DriverError> {
        let started = Instant::now();
        let url = format!("{}/commit", self.endpoint.tx_url());
        let (response, _) = self.endpoint.post(&url, statements).await?;
        into_results(response, started.elapsed(), self.endpoint.config.database_or_default())
    }
}

#[async_trait]
impl GraphDriver for HttpDriver {
    fn backend_type(&self) -> &str {
        &self.endpoint.config.backend_type
    }

    async fn capabilities(&self) -> Result<DriverCapabilities, DriverError> {
        let caps = self
            .capabilities
            .get_or_try_init(|| async {
                let request = self.endpoint.client.get(format!("{}/", self.endpoint.config.base_url()));
                let response = self
                    .endpoint
                    .authorize(request)
                    .header("Accept", "application/json")
                    .send()
                    .await
                    .map_err(transport_error)?;
                let version = response
                    .json::<DiscoveryDocument>()
                    .await
                    .ok()
                    .and_then(|doc| doc.neo4j_version)
                    .unwrap_or_else(|| "unknown".to_string());
                Ok::<_, DriverError>(DriverCapabilities::neo4j(version, true))
            })
            .await?;
        Ok(caps.clone())
    }

    async fn execute_query(&self, statement: &CypherStatement) -> Result<ResultSet, DriverError> {
        let mut results = self.run_autocommit(std::slice::from_ref(statement)).await?;
        Ok(results.pop().unwrap_or_default())
    }

    async fn execute_batch(&self, statements: &[CypherStatement]) -> Result<Vec<ResultSet>, DriverError> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        let results = self.run_autocommit(statements).await?;
        if results.len() != statements.len() {
            return Err(DriverError::with_kind(
                ErrorKind::Syntax,
                format!(
                    "batch of {} statements returned {} results",
                    statements.len(),
                    results.len()
                ),
            ));
        }
        Ok(results)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn DriverTransaction>, DriverError> {
        let (response, location) = self.endpoint.post(&self.endpoint.tx_url(), &[]).await?;
        if let Some(error) = response.errors.into_iter().next() {
            return Err(DriverError::new(Some(error.code), error.message));
        }
        let commit_url = response.commit.ok_or_else(|| {
            DriverError::with_kind(ErrorKind::Syntax, "transaction response without commit URL")
        })?;
        let tx_url = location.unwrap_or_else(|| commit_url.trim_end_matches("/commit").to_string());
        Ok(Box::new(HttpTransaction {
            endpoint: self.endpoint.clone(),
            tx_url,
            commit_url,
            open: true,
        }))
    }

    async fn ping(&self) -> bool {
        self.execute_query(&CypherStatement::new("RETURN 1 AS ok"))
            .await
            .is_ok()
    }
}

pub struct HttpTransaction {
    endpoint: Arc<Endpoint>,
    tx_url: String,
    commit_url: String,
    open: bool,
}

#[async_trait]
impl DriverTransaction for HttpTransaction {
    async fn run(&mut self, statement: &CypherStatement) -> Result<ResultSet, DriverError> {
        if !self.open {
            return Err(DriverError::transaction_closed());
        }
        let started = Instant::now();
        let outcome = match self.endpoint.post(&self.tx_url, std::slice::from_ref(statement)).await {
            Ok((response, _)) => into_results(
                response,
                started.elapsed(),
                self.endpoint.config.database_or_default(),
            ),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(mut results) => Ok(results.pop().unwrap_or_default()),
            Err(e) => {
                self.open = false;
                Err(e)
            }
        }
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::transaction_closed());
        }
        self.open = false;
        let (response, _) = self.endpoint.post(&self.commit_url, &[]).await?;
        match response.errors.into_iter().next() {
            Some(error) => Err(DriverError::new(Some(error.code), error.message)),
            None => Ok(()),
        }
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DriverError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.endpoint
            .send(self.endpoint.client.delete(&self.tx_url))
            .await
            .map(|_| ())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

pub struct HttpDriverFactory;

#[async_trait]
impl DriverFactory for HttpDriverFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn GraphDriver>, DriverError> {
        let driver = HttpDriver::new(config.clone())?;
        Ok(Arc::new(driver))
    }
}
