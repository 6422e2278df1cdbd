//! In-memory stand-ins for the database and the text-generation endpoint.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::audit::LogEntry;
use crate::db::{CellValue, Connector, Credentials, ResultSet, Session, StructuredError};
use crate::error::ConnectivityError;
use crate::llm::{ChatRequest, ChatResponse, Choice, ChoiceMessage, LlmError, TextGenerator};

pub fn creds() -> Credentials {
    Credentials {
        app_user: "ada".into(),
        database: "shop".into(),
        username: "postgres".into(),
        password: "secret".into(),
        ..Credentials::default()
    }
}

pub fn customers(n: usize) -> ResultSet {
    let rows = (1..=n)
        .map(|i| {
            vec![
                CellValue::Int32(i as i32),
                CellValue::Text(format!("customer {i}")),
                CellValue::Text(format!("c{i}@example.com")),
            ]
        })
        .collect();
    ResultSet::new(&["id", "name", "email"], rows)
}

#[derive(Default)]
struct FakeState {
    connect_failures_left: usize,
    connections: usize,
    open_sessions: usize,
    executed: Vec<String>,
    commits: usize,
    logs: Vec<LogEntry>,
    created_tables: Vec<String>,
}

#[derive(Clone, Default)]
struct FakeBehavior {
    tables: Vec<(String, Vec<String>)>,
    rows: ResultSet,
    affected: u64,
    fail_metadata: bool,
    statement_error: Option<String>,
    fail_audit: bool,
}

#[derive(Default)]
pub struct FakeConnector {
    behavior: FakeBehavior,
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[&str]) -> Self {
        self.behavior.tables.push((
            name.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    pub fn with_rows(mut self, rows: ResultSet) -> Self {
        self.behavior.rows = rows;
        self
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.behavior.affected = affected;
        self
    }

    pub fn failing_connect(self) -> Self {
        self.failing_connects(usize::MAX)
    }

    /// The next `n` connection attempts fail.
    pub fn failing_connects(self, n: usize) -> Self {
        self.state.lock().unwrap().connect_failures_left = n;
        self
    }

    pub fn failing_metadata(mut self) -> Self {
        self.behavior.fail_metadata = true;
        self
    }

    pub fn failing_statement(mut self, message: &str) -> Self {
        self.behavior.statement_error = Some(message.to_string());
        self
    }

    pub fn failing_audit(mut self) -> Self {
        self.behavior.fail_audit = true;
        self
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open_sessions
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.state.lock().unwrap().logs.clone()
    }

    pub fn created_tables(&self) -> Vec<String> {
        self.state.lock().unwrap().created_tables.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _creds: &Credentials) -> Result<Box<dyn Session>, ConnectivityError> {
        let mut state = self.state.lock().unwrap();
        if state.connect_failures_left > 0 {
            state.connect_failures_left -= 1;
            return Err(ConnectivityError::Connect(
                "password authentication failed for user \"postgres\"".into(),
            ));
        }
        state.connections += 1;
        state.open_sessions += 1;
        Ok(Box::new(FakeSession {
            behavior: self.behavior.clone(),
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    behavior: FakeBehavior,
    state: Arc<Mutex<FakeState>>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.open_sessions -= 1;
        }
    }
}

impl FakeSession {
    fn run(&self, sql: &str) -> Result<(), StructuredError> {
        self.state.lock().unwrap().executed.push(sql.to_string());
        match &self.behavior.statement_error {
            Some(message) => Err(StructuredError::from_string(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn list_tables(&mut self) -> Result<Vec<String>, StructuredError> {
        if self.behavior.fail_metadata {
            return Err(StructuredError::from_string("permission denied for schema public"));
        }
        Ok(self.behavior.tables.iter().map(|(t, _)| t.clone()).collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, StructuredError> {
        Ok(self
            .behavior
            .tables
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, cols)| cols.clone())
            .unwrap_or_default())
    }

    async fn query(&mut self, sql: &str) -> Result<ResultSet, StructuredError> {
        self.run(sql)?;
        Ok(self.behavior.rows.clone())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, StructuredError> {
        self.run(sql)?;
        self.state.lock().unwrap().commits += 1;
        Ok(self.behavior.affected)
    }

    async fn create_log_table(&mut self, table: &str) -> Result<(), StructuredError> {
        self.state.lock().unwrap().created_tables.push(table.to_string());
        Ok(())
    }

    async fn append_log(&mut self, table: &str, entry: &LogEntry) -> Result<(), StructuredError> {
        if self.behavior.fail_audit {
            return Err(StructuredError::from_string(format!(
                "relation \"{table}\" does not exist"
            )));
        }
        self.state.lock().unwrap().logs.push(entry.clone());
        Ok(())
    }

    async fn recent_logs(&mut self, _table: &str, limit: i64) -> Result<Vec<LogEntry>, StructuredError> {
        let mut logs = self.state.lock().unwrap().logs.clone();
        logs.sort_by(|a, b| b.log_time.cmp(&a.log_time));
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }
}

enum Reply {
    Content(String),
    NoChoices,
    Fail(Mutex<Option<LlmError>>),
}

/// Answers every request the same way and remembers what it was asked.
pub struct FakeGenerator {
    reply: Reply,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeGenerator {
    pub fn replying(content: &str) -> Self {
        Self::new(Reply::Content(content.to_string()))
    }

    pub fn without_choices() -> Self {
        Self::new(Reply::NoChoices)
    }

    /// Fails with `err` once, then with a 500.
    pub fn failing(err: LlmError) -> Self {
        Self::new(Reply::Fail(Mutex::new(Some(err))))
    }

    fn new(reply: Reply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Reply::Content(content) => Ok(ChatResponse {
                choices: vec![Choice {
                    message: ChoiceMessage {
                        content: Some(content.clone()),
                    },
                }],
            }),
            Reply::NoChoices => Ok(ChatResponse::default()),
            Reply::Fail(err) => Err(err.lock().unwrap().take().unwrap_or(LlmError::Status {
                status: 500,
                body: "internal error".into(),
            })),
        }
    }
}
