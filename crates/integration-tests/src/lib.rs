//! Shared fixtures for the integration suites: one `ClipboardStore` per
//! backend, wired exactly as a deployment would wire it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use domains::{ClipboardStore, Result, SessionRepository};
use serde_json::Value;
use services::{ServiceOptions, SessionService};
use storage_adapters::{default_retention, FileSessionRepository, SqliteConnector, SqliteSessionRepository};

pub type Store = Arc<dyn ClipboardStore>;

/// Enough write retries that N concurrent writers on one session always
/// finish: a writer can only lose to another writer that succeeded.
pub const TEST_WRITE_ATTEMPTS: u32 = 16;

fn service(repo: Arc<dyn SessionRepository>) -> Store {
    Arc::new(SessionService::with_options(
        repo,
        ServiceOptions {
            code_attempts: 10,
            write_attempts: TEST_WRITE_ATTEMPTS,
        },
    ))
}

pub fn memory_store() -> Store {
    service(Arc::new(FileSessionRepository::in_memory(default_retention())))
}

pub async fn file_store(path: &Path) -> Store {
    let repo = FileSessionRepository::open(path, default_retention())
        .await
        .expect("Failed to open session file");
    service(Arc::new(repo))
}

pub fn sqlite_store() -> Store {
    let connector = Arc::new(SqliteConnector::in_memory());
    service(Arc::new(SqliteSessionRepository::new(connector, default_retention())))
}

/// Every backend, labelled for assertion messages.
pub fn all_backends() -> Vec<(&'static str, Store)> {
    vec![("sqlite", sqlite_store()), ("memory", memory_store())]
}

/// Records operation results as JSON so transcripts from different
/// backends can be compared.
#[derive(Default)]
pub struct Transcript {
    entries: Vec<Value>,
}

impl Transcript {
    pub fn record<T: serde::Serialize>(&mut self, step: &str, result: &Result<T>) {
        let entry = match result {
            Ok(value) => serde_json::json!({ "step": step, "ok": value }),
            Err(err) => serde_json::json!({ "step": step, "err": err.name() }),
        };
        self.entries.push(entry);
    }

    /// Replaces ids with their order of first appearance and blanks the
    /// values that legitimately differ between runs (timestamps, codes).
    pub fn normalized(&self) -> Value {
        let mut ids = HashMap::new();
        let mut value = Value::Array(self.entries.clone());
        normalize(&mut value, &mut ids);
        value
    }
}

fn normalize(value: &mut Value, ids: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                match (key.as_str(), &*field) {
                    ("id", Value::String(raw)) => {
                        let next = format!("id-{}", ids.len());
                        let alias = ids.entry(raw.clone()).or_insert(next).clone();
                        *field = Value::String(alias);
                    }
                    ("createdAt" | "lastModified", _) => *field = Value::String("<timestamp>".into()),
                    ("code", _) => *field = Value::String("<code>".into()),
                    _ => normalize(field, ids),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| normalize(item, ids)),
        _ => {}
    }
}
