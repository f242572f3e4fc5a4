//! In-crate fakes for the pipeline collaborators.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::query_context::{QueryOutput, Row};
use crate::infrastructure::db::{QueryExecutor, SchemaIntrospector};
use crate::infrastructure::llm_clients::{LLMClient, ModelBackend};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn tables(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

pub struct FakeIntrospector {
    schema: Result<String>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl FakeIntrospector {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: Ok(schema.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            schema: Err(AppError::DatabaseError(message.to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SchemaIntrospector for FakeIntrospector {
    async fn get_schema(&self, tables: &[String]) -> Result<String> {
        self.calls.lock().unwrap().push(tables.to_vec());
        self.schema.clone()
    }
}

enum Reply {
    Output(Result<QueryOutput>),
    Panic,
}

/// Answers queries by the first registered substring found in the SQL.
pub struct FakeExecutor {
    replies: Vec<(String, Reply)>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: &str, output: QueryOutput) -> Self {
        self.replies
            .push((needle.to_string(), Reply::Output(Ok(output))));
        self
    }

    pub fn fail_on(mut self, needle: &str, message: &str) -> Self {
        self.replies.push((
            needle.to_string(),
            Reply::Output(Err(AppError::DatabaseError(message.to_string()))),
        ));
        self
    }

    pub fn panic_on(mut self, needle: &str) -> Self {
        self.replies.push((needle.to_string(), Reply::Panic));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn run_query(&self, sql: &str) -> Result<QueryOutput> {
        self.queries.lock().unwrap().push(sql.to_string());
        for (needle, reply) in &self.replies {
            if sql.contains(needle.as_str()) {
                return match reply {
                    Reply::Output(output) => output.clone(),
                    Reply::Panic => panic!("executor blew up on {}", needle),
                };
            }
        }
        Ok(QueryOutput::Rows(Vec::new()))
    }
}

/// Replays scripted replies in order and records every prompt it receives.
pub struct FakeLlm {
    replies: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeLlm {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }

    pub fn stops(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, stop)| stop.clone())
            .collect()
    }
}

#[async_trait]
impl LLMClient for FakeLlm {
    async fn generate(
        &self,
        _config: &LLMConfig,
        _system: &str,
        user: &str,
        stop: &[String],
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((user.to_string(), stop.to_vec()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::LLMError("no scripted reply".to_string())))
    }
}

pub fn backend(name: &'static str, llm: &Arc<FakeLlm>) -> ModelBackend {
    ModelBackend::new(name, llm.clone(), LLMConfig::default())
}
