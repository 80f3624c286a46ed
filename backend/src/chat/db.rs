//! Chat database operations
//!
//! Handles all database interactions for users, dialogs and chat records.

use crate::chat::models::{ChatRecord, Dialog, ExchangeRecord, MessageRole, User};
use crate::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

const CHAT_RECORD_COLUMNS: &str = "record_id, dialog_id, user_id, content, role, media_url, media_type, reasoning_content, created_at";

/// Database connection pool for chat operations
pub struct ChatDb {
    pool: SqlitePool,
}

impl ChatDb {
    /// Initialize database connection pool
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    ///
    /// # Returns
    /// * `Ok(ChatDb)` if successful
    /// * `Err(AppError)` if connection failed
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        // Ensure parent directory exists
        if let Some(parent) = PathBuf::from(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create db directory: {}", e))
            })?;
        }

        // SQLite connection string format: sqlite://path/to/db.db
        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to connect to database: {}", e))
            })?;

        info!("Connected to SQLite database at: {}", db_path);

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");

        let migration_sql = include_str!("../../migrations/001_create_chat_tables.sql");

        // Remove comments (lines starting with --) and normalize whitespace
        let mut cleaned_sql = String::new();
        for line in migration_sql.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            let without_comments = if let Some(comment_pos) = trimmed.find("--") {
                &trimmed[..comment_pos]
            } else {
                trimmed
            };
            cleaned_sql.push_str(without_comments.trim());
            cleaned_sql.push(' ');
        }

        let statements: Vec<&str> = cleaned_sql
            .split(';')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::Internal(anyhow::anyhow!(
                        "Migration failed: {} - Statement: {}",
                        e,
                        statement.chars().take(100).collect::<String>()
                    ))
                })?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Create a user account
    ///
    /// # Returns
    /// * `Err(AppError::UsernameTaken)` if the name is already registered
    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, AppError> {
        if self.get_user_by_username(username).await?.is_some() {
            return Err(AppError::UsernameTaken(username.to_string()));
        }

        let created_at = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create user: {}", e)))?;

        debug!("Created user: {}", username);
        Ok(User {
            user_id: result.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            token: None,
            token_expiry: None,
            created_at,
        })
    }

    /// Get a user by name
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, username, password_hash, token, token_expiry, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch user: {}", e)))?;

        Ok(user)
    }

    /// Store a new session token for a user
    pub async fn set_user_token(
        &self,
        user_id: i64,
        token: &str,
        expiry: i64,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET token = ?, token_expiry = ? WHERE user_id = ?")
            .bind(token)
            .bind(expiry)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to set token: {}", e)))?;

        Ok(())
    }

    /// Invalidate a user's session token
    pub async fn clear_user_token(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET token = NULL, token_expiry = NULL WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to clear token: {}", e)))?;

        Ok(())
    }

    /// Replace a user's password hash
    pub async fn update_password_hash(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = ? WHERE user_id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to update password: {}", e))
            })?;

        Ok(())
    }

    /// Create a new dialog for a user
    pub async fn create_dialog(&self, user_id: i64, title: &str) -> Result<Dialog, AppError> {
        let created_at = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("INSERT INTO dialogs (user_id, title, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(title)
                .bind(created_at)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("Failed to create dialog: {}", e))
                })?;

        let dialog = Dialog {
            dialog_id: result.last_insert_rowid(),
            user_id,
            title: title.to_string(),
            created_at,
        };
        debug!("Created dialog: {}", dialog.dialog_id);
        Ok(dialog)
    }

    /// Get a dialog if it exists and belongs to `user_id`
    pub async fn get_dialog(
        &self,
        dialog_id: i64,
        user_id: i64,
    ) -> Result<Option<Dialog>, AppError> {
        let dialog = sqlx::query_as::<_, Dialog>(
            "SELECT dialog_id, user_id, title, created_at FROM dialogs WHERE dialog_id = ? AND user_id = ?",
        )
        .bind(dialog_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch dialog: {}", e)))?;

        Ok(dialog)
    }

    /// Get all dialogs of a user, most recent user message first
    ///
    /// Dialogs without any user message come last, newest first.
    pub async fn list_dialogs(&self, user_id: i64) -> Result<Vec<Dialog>, AppError> {
        let dialogs = sqlx::query_as::<_, Dialog>(
            "SELECT d.dialog_id, d.user_id, d.title, d.created_at FROM dialogs d \
             LEFT JOIN chat_records r ON r.dialog_id = d.dialog_id AND r.role = 1 \
             WHERE d.user_id = ? \
             GROUP BY d.dialog_id \
             ORDER BY MAX(r.record_id) IS NULL, MAX(r.created_at) DESC, MAX(r.record_id) DESC, d.dialog_id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch dialogs: {}", e)))?;

        Ok(dialogs)
    }

    /// Update a dialog's title
    pub async fn update_dialog_title(&self, dialog_id: i64, title: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE dialogs SET title = ? WHERE dialog_id = ?")
            .bind(title)
            .bind(dialog_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to update dialog: {}", e))
            })?;

        debug!("Updated dialog: {}", dialog_id);
        Ok(())
    }

    /// Delete a dialog (cascades to chat records)
    pub async fn delete_dialog(&self, dialog_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM dialogs WHERE dialog_id = ?")
            .bind(dialog_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to delete dialog: {}", e))
            })?;

        debug!("Deleted dialog: {}", dialog_id);
        Ok(())
    }

    /// Get all records of a dialog in the order they were written
    pub async fn get_chat_history(&self, dialog_id: i64) -> Result<Vec<ChatRecord>, AppError> {
        let records = sqlx::query_as::<_, ChatRecord>(&format!(
            "SELECT {} FROM chat_records WHERE dialog_id = ? ORDER BY created_at ASC, record_id ASC",
            CHAT_RECORD_COLUMNS
        ))
        .bind(dialog_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch chat history: {}", e)))?;

        Ok(records)
    }

    /// Get the most recent assistant record of a dialog
    pub async fn latest_assistant_record(
        &self,
        dialog_id: i64,
    ) -> Result<Option<ChatRecord>, AppError> {
        let record = sqlx::query_as::<_, ChatRecord>(&format!(
            "SELECT {} FROM chat_records WHERE dialog_id = ? AND role = ? ORDER BY created_at DESC, record_id DESC LIMIT 1",
            CHAT_RECORD_COLUMNS
        ))
        .bind(dialog_id)
        .bind(MessageRole::Assistant.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch chat record: {}", e)))?;

        Ok(record)
    }

    /// Store both turns of a finished exchange atomically
    ///
    /// The user turn carries the optional media reference, the assistant turn
    /// the optional reasoning trace.
    pub async fn save_exchange(&self, exchange: &ExchangeRecord) -> Result<(), AppError> {
        let created_at = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let media_type = exchange.media_ref.as_ref().map(|_| "image");
        let reasoning = Some(exchange.reasoning.as_str()).filter(|r| !r.is_empty());
        sqlx::query(
            "INSERT INTO chat_records (dialog_id, user_id, content, role, media_url, media_type, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(exchange.dialog_id)
        .bind(exchange.user_id)
        .bind(&exchange.question)
        .bind(MessageRole::User.code())
        .bind(&exchange.media_ref)
        .bind(media_type)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to save user turn: {}", e)))?;

        sqlx::query(
            "INSERT INTO chat_records (dialog_id, user_id, content, role, reasoning_content, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(exchange.dialog_id)
        .bind(exchange.user_id)
        .bind(&exchange.answer)
        .bind(MessageRole::Assistant.code())
        .bind(reasoning)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to save assistant turn: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to commit exchange: {}", e))
        })?;

        debug!(
            dialog_id = exchange.dialog_id,
            answer_len = exchange.answer.len(),
            "Saved exchange"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_db() -> (ChatDb, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = ChatDb::new(db_path.to_str().unwrap())
            .await
            .expect("Failed to create test database");
        (db, temp_dir)
    }

    fn exchange(dialog_id: i64, user_id: i64, question: &str, answer: &str) -> ExchangeRecord {
        ExchangeRecord {
            dialog_id,
            user_id,
            question: question.to_string(),
            answer: answer.to_string(),
            reasoning: String::new(),
            media_ref: None,
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate() {
        let (db, _temp_dir) = create_test_db().await;
        db.create_user("alice", "hash").await.unwrap();
        match db.create_user("alice", "other").await {
            Err(AppError::UsernameTaken(name)) => assert_eq!(name, "alice"),
            other => panic!("Expected UsernameTaken, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_token_round_trip() {
        let (db, _temp_dir) = create_test_db().await;
        let user = db.create_user("alice", "hash").await.unwrap();
        db.set_user_token(user.user_id, "tok", 123).await.unwrap();

        let stored = db.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(stored.token.as_deref(), Some("tok"));
        assert_eq!(stored.token_expiry, Some(123));

        db.clear_user_token(user.user_id).await.unwrap();
        let stored = db.get_user_by_username("alice").await.unwrap().unwrap();
        assert!(stored.token.is_none());
    }

    #[tokio::test]
    async fn test_dialog_is_scoped_to_owner() {
        let (db, _temp_dir) = create_test_db().await;
        let alice = db.create_user("alice", "hash").await.unwrap();
        let bob = db.create_user("bob", "hash").await.unwrap();
        let dialog = db.create_dialog(alice.user_id, "Math").await.unwrap();

        assert!(db
            .get_dialog(dialog.dialog_id, alice.user_id)
            .await
            .unwrap()
            .is_some());
        assert!(db
            .get_dialog(dialog.dialog_id, bob.user_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_save_exchange_writes_two_records_in_order() {
        let (db, _temp_dir) = create_test_db().await;
        let user = db.create_user("alice", "hash").await.unwrap();
        let dialog = db.create_dialog(user.user_id, "Math").await.unwrap();

        let mut record = exchange(dialog.dialog_id, user.user_id, "2+2?", "4");
        record.reasoning = "add".to_string();
        record.media_ref = Some("1/1/sum.png".to_string());
        db.save_exchange(&record).await.unwrap();

        let history = db.get_chat_history(dialog.dialog_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role_enum(), MessageRole::User);
        assert_eq!(history[0].content, "2+2?");
        assert_eq!(history[0].media_url.as_deref(), Some("1/1/sum.png"));
        assert_eq!(history[0].media_type.as_deref(), Some("image"));
        assert_eq!(history[1].role_enum(), MessageRole::Assistant);
        assert_eq!(history[1].content, "4");
        assert_eq!(history[1].reasoning_content.as_deref(), Some("add"));
    }

    #[tokio::test]
    async fn test_latest_assistant_record() {
        let (db, _temp_dir) = create_test_db().await;
        let user = db.create_user("alice", "hash").await.unwrap();
        let dialog = db.create_dialog(user.user_id, "Math").await.unwrap();
        assert!(db
            .latest_assistant_record(dialog.dialog_id)
            .await
            .unwrap()
            .is_none());

        db.save_exchange(&exchange(dialog.dialog_id, user.user_id, "q1", "a1"))
            .await
            .unwrap();
        db.save_exchange(&exchange(dialog.dialog_id, user.user_id, "q2", "a2"))
            .await
            .unwrap();

        let latest = db
            .latest_assistant_record(dialog.dialog_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.content, "a2");
    }

    #[tokio::test]
    async fn test_list_dialogs_orders_by_latest_user_message() {
        let (db, _temp_dir) = create_test_db().await;
        let user = db.create_user("alice", "hash").await.unwrap();
        let first = db.create_dialog(user.user_id, "First").await.unwrap();
        let second = db.create_dialog(user.user_id, "Second").await.unwrap();
        let empty = db.create_dialog(user.user_id, "Empty").await.unwrap();

        db.save_exchange(&exchange(second.dialog_id, user.user_id, "q", "a"))
            .await
            .unwrap();
        db.save_exchange(&exchange(first.dialog_id, user.user_id, "q", "a"))
            .await
            .unwrap();

        let dialogs = db.list_dialogs(user.user_id).await.unwrap();
        let ids: Vec<i64> = dialogs.iter().map(|d| d.dialog_id).collect();
        assert_eq!(ids, vec![first.dialog_id, second.dialog_id, empty.dialog_id]);
    }

    #[tokio::test]
    async fn test_delete_dialog_cascades_to_records() {
        let (db, _temp_dir) = create_test_db().await;
        let user = db.create_user("alice", "hash").await.unwrap();
        let dialog = db.create_dialog(user.user_id, "Math").await.unwrap();
        db.save_exchange(&exchange(dialog.dialog_id, user.user_id, "q", "a"))
            .await
            .unwrap();

        db.delete_dialog(dialog.dialog_id).await.unwrap();

        assert!(db
            .get_dialog(dialog.dialog_id, user.user_id)
            .await
            .unwrap()
            .is_none());
        assert!(db
            .get_chat_history(dialog.dialog_id)
            .await
            .unwrap()
            .is_empty());
    }
}
