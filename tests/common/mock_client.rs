//! Scripted in-memory SQL client

use async_trait::async_trait;
use parking_lot::Mutex;
use schema_fixup::models::ObjectKey;
use schema_fixup::orchestration::sql_client::SqlClientResult;
use schema_fixup::orchestration::{ExecutionOutcome, SqlClient, SqlClientError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    Fail(String),
    Timeout,
}

/// Replies are queued per exact script text; an exhausted queue succeeds.
/// Successful scripts registered with [`ScriptedClient::creates`] make their
/// object visible to existence probes.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    creates: Mutex<HashMap<String, ObjectKey>>,
    present: Mutex<HashSet<ObjectKey>>,
    executed: Mutex<Vec<String>>,
    probes: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, script: &str, replies: Vec<Reply>) {
        self.replies
            .lock()
            .entry(script.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn creates(&self, script: &str, key: ObjectKey) {
        self.creates.lock().insert(script.to_string(), key);
    }

    pub fn mark_present(&self, key: ObjectKey) {
        self.present.lock().insert(key);
    }

    pub fn is_present(&self, key: &ObjectKey) -> bool {
        self.present.lock().contains(key)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    pub fn executions_of(&self, script: &str) -> usize {
        self.executed.lock().iter().filter(|s| s.as_str() == script).count()
    }

    pub fn grant_executions(&self) -> Vec<String> {
        self.executed
            .lock()
            .iter()
            .filter(|s| s.starts_with("GRANT "))
            .cloned()
            .collect()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlClient for ScriptedClient {
    async fn execute(&self, script: &str, timeout: Duration) -> SqlClientResult<ExecutionOutcome> {
        self.executed.lock().push(script.to_string());
        let reply = self
            .replies
            .lock()
            .get_mut(script)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Ok);
        match reply {
            Reply::Ok => {
                if let Some(key) = self.creates.lock().get(script) {
                    self.present.lock().insert(key.clone());
                }
                Ok(ExecutionOutcome::succeeded("done"))
            }
            Reply::Fail(diagnostic) => Ok(ExecutionOutcome::failed(diagnostic)),
            Reply::Timeout => Err(SqlClientError::Timeout(timeout)),
        }
    }

    async fn object_exists(&self, key: &ObjectKey, _timeout: Duration) -> SqlClientResult<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.present.lock().contains(key))
    }
}
