//! In-process stand-in for the remote engine, for tests of the executor and
//! of code built on top of it.

use crate::client::protocol::{Column, QueryResults, RemoteError, StatementStats};
use crate::client::{ClientError, StatementClient, StatementSession};
use model::query::ClientSession;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What a session does once its last batch has been delivered.
#[derive(Clone, Debug)]
pub enum Ending {
    /// The engine has nothing more; the session becomes invalid.
    Finish,
    /// `advance` blocks until the session is closed, like a silent server.
    BlockUntilClosed,
    /// `advance` fails and the session reports the server gone.
    ServerGone,
    /// `advance` fails with a transport error on a live session.
    Fail(String),
}

/// The engine's answer to one statement.
#[derive(Clone, Debug)]
pub struct Script {
    refuse: Option<String>,
    batches: Vec<QueryResults>,
    ending: Ending,
}

impl Script {
    pub fn batches(batches: Vec<QueryResults>) -> Self {
        assert!(!batches.is_empty(), "A statement yields at least one batch");
        Self {
            refuse: None,
            batches,
            ending: Ending::Finish,
        }
    }

    /// A statement that finishes with an empty result.
    pub fn finished() -> Self {
        Self::batches(vec![BatchBuilder::new("finished").state("FINISHED").build()])
    }

    /// `open` fails, as if nothing listened on the engine's address.
    pub fn refuse(message: impl Into<String>) -> Self {
        Self {
            refuse: Some(message.into()),
            batches: Vec::new(),
            ending: Ending::Finish,
        }
    }

    /// A statement the engine reports as failed.
    pub fn failing(message: &str, error_code: i32) -> Self {
        Self::batches(vec![
            BatchBuilder::new("failing")
                .state("FAILED")
                .error(json!({
                    "message": message,
                    "errorCode": error_code,
                    "sqlState": "42000",
                    "failureInfo": {"type": "com.facebook.presto.spi.PrestoException", "message": message}
                }))
                .build(),
        ])
    }

    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }
}

type Router = dyn Fn(&str) -> Script + Send + Sync;

/// Answers every `open` with a [`Script`] chosen by the statement text.
pub struct ScriptedClient {
    router: Box<Router>,
    opens: AtomicUsize,
    opened: Mutex<Vec<(ClientSession, String)>>,
    sessions: Mutex<Vec<Arc<ScriptedSession>>>,
}

impl ScriptedClient {
    pub fn new(router: impl Fn(&str) -> Script + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            router: Box::new(router),
            opens: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        })
    }

    /// Every statement gets the same script.
    pub fn answering(script: Script) -> Arc<Self> {
        Self::new(move |_| script.clone())
    }

    /// Number of `open` calls so far, refused ones included.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Statement texts in the order they were opened.
    pub fn statements(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    pub fn client_sessions(&self) -> Vec<ClientSession> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(session, _)| session.clone())
            .collect()
    }

    pub fn sessions(&self) -> Vec<Arc<ScriptedSession>> {
        self.sessions.lock().unwrap().clone()
    }
}

impl StatementClient for ScriptedClient {
    fn open(
        &self,
        session: &ClientSession,
        sql: &str,
    ) -> Result<Arc<dyn StatementSession>, ClientError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.opened
            .lock()
            .unwrap()
            .push((session.clone(), sql.to_owned()));

        let script = (self.router)(sql);
        if let Some(message) = script.refuse {
            return Err(ClientError::Unavailable(message));
        }
        let session = Arc::new(ScriptedSession::new(script));
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

pub struct ScriptedSession {
    batches: Vec<Arc<QueryResults>>,
    ending: Ending,
    position: AtomicUsize,
    valid: AtomicBool,
    gone: AtomicBool,
    closed: AtomicBool,
    close_tx: Mutex<Option<flume::Sender<()>>>,
    close_rx: flume::Receiver<()>,
}

impl ScriptedSession {
    fn new(script: Script) -> Self {
        let (close_tx, close_rx) = flume::bounded(1);
        Self {
            batches: script.batches.into_iter().map(Arc::new).collect(),
            ending: script.ending,
            position: AtomicUsize::new(0),
            valid: AtomicBool::new(true),
            gone: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
        }
    }

    /// Index of the batch currently exposed by `current`.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::SeqCst)
    }
}

impl StatementSession for ScriptedSession {
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
        self.batches[self.position()].clone()
    }

    fn final_results(&self) -> Arc<QueryResults> {
        self.current()
    }

    fn advance(&self) -> Result<bool, ClientError> {
        if self.is_closed() {
            self.valid.store(false, Ordering::SeqCst);
            return Ok(false);
        }
        let next = self.position() + 1;
        if next < self.batches.len() {
            self.position.store(next, Ordering::SeqCst);
            return Ok(true);
        }

        match &self.ending {
            Ending::Finish => {
                self.valid.store(false, Ordering::SeqCst);
                Ok(false)
            }
            Ending::BlockUntilClosed => {
                // Returns once `close` drops the sender
                let _ = self.close_rx.recv();
                self.valid.store(false, Ordering::SeqCst);
                Ok(false)
            }
            Ending::ServerGone => {
                self.gone.store(true, Ordering::SeqCst);
                Err(ClientError::Unavailable("Connection reset by peer".to_owned()))
            }
            Ending::Fail(message) => Err(ClientError::Unavailable(message.clone())),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_tx.lock().unwrap().take();
    }
}

/// Builds protocol batches for scripts.
pub struct BatchBuilder {
    results: QueryResults,
}

impl BatchBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            results: QueryResults {
                id: id.to_owned(),
                stats: StatementStats {
                    state: "RUNNING".to_owned(),
                    scheduled: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// Columns as `(name, engine type)`; composite types are not supported.
    pub fn columns(mut self, columns: &[(&str, &str)]) -> Self {
        self.results.columns = Some(
            columns
                .iter()
                .map(|(name, raw_type)| column(name, raw_type))
                .collect(),
        );
        self
    }

    pub fn row(mut self, row: Vec<Value>) -> Self {
        self.results.data.get_or_insert_with(Vec::new).push(row);
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.results.stats.state = state.to_owned();
        self
    }

    pub fn unscheduled(mut self) -> Self {
        self.results.stats.scheduled = false;
        self
    }

    pub fn splits(mut self, total: u32, completed: u32) -> Self {
        self.results.stats.total_splits = total;
        self.results.stats.completed_splits = completed;
        self
    }

    pub fn processed(mut self, rows: u64, bytes: u64) -> Self {
        self.results.stats.processed_rows = rows;
        self.results.stats.processed_bytes = bytes;
        self
    }

    pub fn error(mut self, error: Value) -> Self {
        let error: RemoteError =
            serde_json::from_value(error).expect("Scripted error must be a valid remote error");
        self.results.error = Some(error);
        self
    }

    pub fn build(self) -> QueryResults {
        self.results
    }
}

pub fn column(name: &str, raw_type: &str) -> Column {
    serde_json::from_value(json!({
        "name": name,
        "type": raw_type,
        "typeSignature": {"rawType": raw_type, "arguments": []}
    }))
    .expect("Scripted column must be valid")
}
