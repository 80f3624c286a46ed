//! Shared helpers for integration tests

#![allow(dead_code)]

use axum::body::to_bytes;
use axum::response::Response;
use chat_history_backend::chat::ChatDb;
use chat_history_backend::config::Config;
use chat_history_backend::provider::{
    ChatMessage, ChatProvider, Delta, DeltaStream, ModelSpec, ProviderError, ProviderRegistry,
};
use chat_history_backend::state::AppState;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Hook = Box<dyn Fn(usize) + Send + Sync>;

/// Provider that replays a fixed script of deltas
///
/// `hook` runs on the worker thread before item `i` is pulled.
pub struct ScriptedProvider {
    script: Vec<Result<Delta, String>>,
    hook: Option<Arc<Hook>>,
    seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Delta, String>>) -> Self {
        Self {
            script,
            hook: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(Box::new(hook)));
        self
    }

    /// Message histories this provider was called with
    pub fn requests(&self) -> Arc<Mutex<Vec<Vec<ChatMessage>>>> {
        self.seen.clone()
    }
}

impl ChatProvider for ScriptedProvider {
    fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let hook = self.hook.clone();
        let items = self.script.clone().into_iter().enumerate().map(move |(i, item)| {
            if let Some(hook) = &hook {
                hook(i);
            }
            item.map_err(ProviderError::Protocol)
        });
        Ok(Box::new(items))
    }
}

/// Gate a worker thread can wait on until the test opens it
#[derive(Clone)]
pub struct Gate {
    tx: std::sync::mpsc::Sender<()>,
    rx: Arc<Mutex<std::sync::mpsc::Receiver<()>>>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Block the calling thread until `open` is called
    pub fn wait(&self) {
        let _ = self.rx.lock().unwrap().recv();
    }

    pub fn open(&self) {
        let _ = self.tx.send(());
    }
}

/// Test configuration rooted in a temporary directory
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::from_env();
    config.persistence.database_path = dir.path().join("chat.db").to_string_lossy().to_string();
    config.persistence.uploads_dir = dir.path().join("uploads").to_string_lossy().to_string();
    config.streaming.system_prompt = "system prompt".to_string();
    config.streaming.handoff_capacity = 1;
    config
}

/// Application state over a fresh database and the given models
pub async fn test_state(models: Vec<(&str, bool, Arc<dyn ChatProvider>)>) -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let db = ChatDb::new(&config.persistence.database_path).await.unwrap();

    let mut providers = ProviderRegistry::new();
    for (selector, reasoning, provider) in models {
        providers.register(
            ModelSpec {
                selector: selector.to_string(),
                upstream_model: format!("{}-upstream", selector),
                reasoning,
            },
            provider,
        );
    }

    (AppState::new(config, db, providers), dir)
}

/// Create a user and a dialog, returning `(user_id, dialog_id)`
pub async fn seed_dialog(state: &AppState, username: &str) -> (i64, i64) {
    let user = match state.db.get_user_by_username(username).await.unwrap() {
        Some(user) => user,
        None => state.db.create_user(username, "hash").await.unwrap(),
    };
    let dialog = state.db.create_dialog(user.user_id, "test").await.unwrap();
    (user.user_id, dialog.dialog_id)
}

/// Read a whole response body as text
pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Read a whole response body as JSON
pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
