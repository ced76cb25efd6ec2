use crate::client::protocol::QueryResults;
use crate::client::{ClientError, StatementClient, StatementSession};
use model::query::ClientSession;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const STATEMENT_PATH: &str = "/v1/statement";
const RETRY_STEP: Duration = Duration::from_millis(100);

const USER_HEADER: &str = "X-Presto-User";
const SOURCE_HEADER: &str = "X-Presto-Source";
const CATALOG_HEADER: &str = "X-Presto-Catalog";
const SCHEMA_HEADER: &str = "X-Presto-Schema";
const TIME_ZONE_HEADER: &str = "X-Presto-Time-Zone";
const LANGUAGE_HEADER: &str = "X-Presto-Language";
const SESSION_HEADER: &str = "X-Presto-Session";

/// Statement client for the engine's REST protocol. Blocking, since every
/// session is polled from its own executor thread; construct it outside of
/// any async runtime.
#[derive(Clone)]
pub struct HttpStatementClient {
    client: Client,
    address: String,
    request_timeout: Duration,
}

impl HttpStatementClient {
    pub fn new(address: impl Into<String>, request_timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            address: address.into().trim_end_matches('/').to_owned(),
            request_timeout,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn statement_request(&self, session: &ClientSession, sql: &str) -> RequestBuilder {
        let mut request = self
            .client
            .post(format!("{}{STATEMENT_PATH}", self.address))
            .header(USER_HEADER, &session.user)
            .header(CATALOG_HEADER, &session.catalog)
            .header(SCHEMA_HEADER, &session.schema)
            .body(sql.to_owned());

        if let Some(source) = &session.source {
            request = request.header(SOURCE_HEADER, source);
        }
        if let Some(time_zone) = &session.time_zone {
            request = request.header(TIME_ZONE_HEADER, time_zone);
        }
        if let Some(language) = &session.language {
            request = request.header(LANGUAGE_HEADER, language);
        }
        if !session.properties.is_empty() {
            request = request.header(SESSION_HEADER, session_header_value(session));
        }
        request
    }
}

fn session_header_value(session: &ClientSession) -> String {
    session
        .properties
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn decode(uri: &str, response: Response) -> Result<QueryResults, ClientError> {
    let body = response.text()?;
    serde_json::from_str(&body).map_err(|source| ClientError::Decode {
        uri: uri.to_owned(),
        source,
    })
}

fn request_failed(uri: &str, response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .unwrap_or_else(|_| "<unreadable body>".to_owned());
    ClientError::RequestFailed {
        uri: uri.to_owned(),
        status,
        body,
    }
}

impl StatementClient for HttpStatementClient {
    fn open(
        &self,
        session: &ClientSession,
        sql: &str,
    ) -> Result<Arc<dyn StatementSession>, ClientError> {
        let uri = format!("{}{STATEMENT_PATH}", self.address);
        let response = self.statement_request(session, sql).send()?;
        if response.status() != StatusCode::OK {
            return Err(request_failed(&uri, response));
        }
        let first = decode(&uri, response)?;
        debug!(remote_id = %first.id, "Statement accepted");

        Ok(Arc::new(HttpStatementSession {
            client: self.client.clone(),
            user: session.user.clone(),
            request_timeout: self.request_timeout,
            current: RwLock::new(Arc::new(first)),
            valid: AtomicBool::new(true),
            gone: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct HttpStatementSession {
    client: Client,
    user: String,
    request_timeout: Duration,
    current: RwLock<Arc<QueryResults>>,
    valid: AtomicBool,
    gone: AtomicBool,
    closed: AtomicBool,
}

impl HttpStatementSession {
    fn next_uri(&self) -> Option<String> {
        self.current().next_uri.clone()
    }

    fn fetch(&self, uri: &str) -> Result<Option<QueryResults>, ClientError> {
        let response = self.client.get(uri).header(USER_HEADER, &self.user).send()?;
        match response.status() {
            StatusCode::OK => decode(uri, response).map(Some),
            StatusCode::SERVICE_UNAVAILABLE => Ok(None),
            _ => Err(request_failed(uri, response)),
        }
    }
}

impl StatementSession for HttpStatementSession {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst) && !self.is_gone() && !self.is_closed()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_gone(&self) -> bool {
        self.gone.load(Ordering::SeqCst)
    }

    fn is_failed(&self) -> bool {
        self.current().error.is_some()
    }

    fn current(&self) -> Arc<QueryResults> {
        self.current
            .read()
            .expect("No one should panic while holding this lock")
            .clone()
    }

    fn final_results(&self) -> Arc<QueryResults> {
        self.current()
    }

    fn advance(&self) -> Result<bool, ClientError> {
        let next_uri = match self.next_uri() {
            Some(uri) if !self.is_closed() => uri,
            _ => {
                self.valid.store(false, Ordering::SeqCst);
                return Ok(false);
            }
        };

        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut last_error = None;
        loop {
            if attempts > 0 {
                std::thread::sleep(RETRY_STEP * attempts);
            }
            attempts += 1;

            match self.fetch(&next_uri) {
                Ok(Some(batch)) => {
                    *self
                        .current
                        .write()
                        .expect("No one should panic while holding this lock") = Arc::new(batch);
                    return Ok(true);
                }
                Ok(None) => debug!(attempts, "Engine busy, retrying"),
                Err(ClientError::Transport(e)) => {
                    debug!(attempts, error = %e, "Transport error, retrying");
                    last_error = Some(e);
                }
                Err(e) => {
                    self.gone.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }

            if started.elapsed() >= self.request_timeout || self.is_closed() {
                break;
            }
        }

        self.gone.store(true, Ordering::SeqCst);
        warn!(attempts, error = ?last_error, "Giving up on fetching the next batch");
        Err(ClientError::Timeout(self.request_timeout))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(uri) = self.next_uri() else {
            return;
        };

        let request = self.client.delete(&uri).header(USER_HEADER, &self.user);
        let spawned = std::thread::Builder::new()
            .name("presto-statement-cancel".to_owned())
            .spawn(move || match request.send() {
                Ok(response) => debug!(status = %response.status(), "Statement cancelled"),
                Err(e) => debug!(error = %e, "Failed to cancel statement"),
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Could not spawn statement cancellation thread");
        }
    }
}
