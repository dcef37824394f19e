use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use crate::config::PalaverStateConfig;
use crate::types::{Message, User};

pub(crate) type Result<T> = std::result::Result<T, PalaverStateError>;

/// PalaverState is a wrapper around a SQLite connection pool, responsible for the
/// persistence of users and their chat messages.
///
/// It is cheap to clone and is shared by every request handler. Actual reads and
/// writes go through a [`ChatSession`], obtained with [`PalaverState::session`].
#[derive(Clone)]
pub struct PalaverState {
    /// The SQLite connection pool used for database operations.
    pub db: SqlitePool,
}

impl PalaverState {
    /// Creates a new `PalaverState` instance from a database URL.
    ///
    /// The database file is created if it does not exist yet and opened in WAL
    /// mode with foreign keys enforced. All pending migrations are then applied.
    ///
    /// # Arguments
    /// * `database_url` - The URL of the SQLite database to connect to
    /// * `max_connections` - Upper bound on the number of pooled connections
    ///
    /// # Returns
    /// A new state instance wrapped in `Result`
    ///
    /// # Errors
    /// Returns `PalaverStateError` if:
    /// - The database URL cannot be parsed
    /// - Failed to connect to database
    /// - Failed to run database migrations
    pub async fn new_from_url(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let db = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./src/migrations").run(&db).await?;
        Ok(Self { db })
    }

    /// Creates a new `PalaverState` instance from its configuration.
    ///
    /// # Errors
    /// See [`PalaverState::new_from_url`].
    pub async fn new_from_config(config: &PalaverStateConfig) -> Result<Self> {
        Self::new_from_url(&config.database_url, config.max_connections).await
    }

    /// Opens a new request-scoped session.
    ///
    /// A session owns a database transaction on one pooled connection. Its
    /// changes become visible only after [`ChatSession::commit`]; a session that
    /// is dropped without committing is rolled back and its connection is
    /// returned to the pool.
    ///
    /// # Errors
    /// Returns `PalaverStateError` if no connection can be acquired or the
    /// transaction cannot be started.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn session(&self) -> Result<ChatSession> {
        let tx = self.db.begin().await?;
        Ok(ChatSession { tx })
    }

    /// Opens a new request-scoped session holding the database write lock.
    ///
    /// The transaction starts with `BEGIN IMMEDIATE`, so its reads already see
    /// the latest committed state and its writes cannot be invalidated by
    /// another writer. Concurrent write sessions wait for each other, up to
    /// the connection busy timeout.
    ///
    /// Use it whenever a session reads before it writes.
    ///
    /// # Errors
    /// Returns `PalaverStateError` if no connection can be acquired or the
    /// write lock is not obtained before the busy timeout.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn write_session(&self) -> Result<ChatSession> {
        let tx = self.db.begin_with("BEGIN IMMEDIATE").await?;
        Ok(ChatSession { tx })
    }

    /// Checks that a connection can be acquired from the pool.
    pub async fn is_healthy(&self) -> bool {
        self.db.acquire().await.is_ok()
    }
}

/// A request-scoped unit of work over the users and messages tables.
///
/// Every operation runs inside the same transaction. Nothing is persisted until
/// [`ChatSession::commit`] is called.
pub struct ChatSession {
    tx: Transaction<'static, Sqlite>,
}

impl ChatSession {
    /// Looks up the user that owns the given token.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(User))` if a user with this token exists.
    /// - `Ok(None)` otherwise.
    ///
    /// # Errors
    ///
    /// This function will return an error if the database query fails.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn get_user_by_token(&mut self, token: &str) -> Result<Option<User>> {
        let user = sqlx::query("SELECT id, username, token FROM users WHERE token = ?1 LIMIT 1")
            .bind(token)
            .fetch_optional(&mut *self.tx)
            .await?;
        user.map(|row| User::from_row(&row))
            .transpose()
            .map_err(PalaverStateError::from)
    }

    /// Looks up a user by its username.
    ///
    /// # Errors
    ///
    /// This function will return an error if the database query fails.
    #[tracing::instrument(level = "trace", skip_all, fields(username = %username))]
    pub async fn get_user_by_username(&mut self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query("SELECT id, username, token FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&mut *self.tx)
            .await?;
        user.map(|row| User::from_row(&row))
            .transpose()
            .map_err(PalaverStateError::from)
    }

    /// Inserts a new user and returns the stored record, including its new id.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The username is already taken, reported by the `UNIQUE` constraint as
    ///   [`PalaverStateError::UsernameAlreadyRegistered`].
    /// - The database query fails to execute.
    #[tracing::instrument(level = "trace", skip_all, fields(username = %username))]
    pub async fn insert_new_user(&mut self, username: &str, token: &str) -> Result<User> {
        let row = sqlx::query(
            "INSERT INTO users (username, token) VALUES (?1, ?2)
            RETURNING id, username, token",
        )
        .bind(username)
        .bind(token)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
                PalaverStateError::UsernameAlreadyRegistered(username.to_string())
            }
            e => PalaverStateError::DatabaseError(e),
        })?;
        Ok(User::from_row(&row)?)
    }

    /// Deletes a user by its id.
    ///
    /// The user's messages must be deleted first, the foreign key from
    /// `messages.user_id` rejects the removal of a user that still owns some.
    ///
    /// # Errors
    ///
    /// This function will return an error if the database query fails.
    #[tracing::instrument(level = "trace", skip_all, fields(user_id = %user_id))]
    pub async fn delete_user(&mut self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Inserts a new message owned by `user_id` and returns the stored record.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - `user_id` does not reference an existing user, reported as
    ///   [`PalaverStateError::UnknownUser`].
    /// - The database query fails to execute.
    #[tracing::instrument(level = "trace", skip_all, fields(user_id = %user_id))]
    pub async fn insert_new_message(
        &mut self,
        content: &str,
        generated_response: Option<&str>,
        user_id: i64,
    ) -> Result<Message> {
        let row = sqlx::query(
            "INSERT INTO messages (content, generated_response, user_id) VALUES (?1, ?2, ?3)
            RETURNING id, content, generated_response, user_id",
        )
        .bind(content)
        .bind(generated_response)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_error) if db_error.is_foreign_key_violation() => {
                PalaverStateError::UnknownUser(user_id)
            }
            e => PalaverStateError::DatabaseError(e),
        })?;
        Ok(Message::from_row(&row)?)
    }

    /// Retrieves every message of a user, in insertion order.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The database query fails to execute.
    /// - There's an issue converting the database rows into `Message` objects.
    #[tracing::instrument(level = "trace", skip_all, fields(user_id = %user_id))]
    pub async fn get_messages_by_user_id(&mut self, user_id: i64) -> Result<Vec<Message>> {
        let messages = sqlx::query(
            "SELECT id, content, generated_response, user_id FROM messages
            WHERE user_id = ?1 ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        messages
            .into_iter()
            .map(|message| Message::from_row(&message).map_err(PalaverStateError::from))
            .collect()
    }

    /// Deletes a single message by its id.
    ///
    /// # Errors
    ///
    /// This function will return an error if the database query fails.
    #[tracing::instrument(level = "trace", skip_all, fields(message_id = %message_id))]
    pub async fn delete_message(&mut self, message_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE id = ?1")
            .bind(message_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Commits every change made in this session.
    ///
    /// # Errors
    ///
    /// This function will return an error if the commit fails, in which case
    /// the transaction is rolled back.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PalaverStateError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Failed to migrate database: {0}")]
    FailedToMigrateDatabase(#[from] sqlx::migrate::MigrateError),
    #[error("Username already registered: `{0}`")]
    UsernameAlreadyRegistered(String),
    #[error("No user with id `{0}`")]
    UnknownUser(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (PalaverState, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let database_url = format!("sqlite://{}", temp_dir.path().join("palaver.db").display());
        let state = PalaverState::new_from_url(&database_url, 5).await.unwrap();
        (state, temp_dir)
    }

    async fn count_rows(state: &PalaverState, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&state.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let (state, _temp_dir) = setup_test_db().await;
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'messages')",
        )
        .fetch_all(&state.db)
        .await
        .unwrap();
        assert!(names.contains(&"users".to_string()));
        assert!(names.contains(&"messages".to_string()));
    }

    #[tokio::test]
    async fn test_insert_and_get_user() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut session = state.session().await.unwrap();
        let user = session.insert_new_user("alice", "token-1").await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.token, "token-1");

        let mut session = state.session().await.unwrap();
        let by_token = session.get_user_by_token("token-1").await.unwrap();
        let by_username = session.get_user_by_username("alice").await.unwrap();
        assert_eq!(by_token, Some(user.clone()));
        assert_eq!(by_username, Some(user));
        assert_eq!(session.get_user_by_token("missing").await.unwrap(), None);
        assert_eq!(session.get_user_by_username("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_duplicate_username_is_rejected() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut session = state.session().await.unwrap();
        session.insert_new_user("alice", "token-1").await.unwrap();
        let result = session.insert_new_user("alice", "token-2").await;
        assert!(matches!(
            result,
            Err(PalaverStateError::UsernameAlreadyRegistered(ref name)) if name == "alice"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_registration_never_duplicates_username() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut first = state.write_session().await.unwrap();
        assert!(first.get_user_by_username("alice").await.unwrap().is_none());

        // Blocks on the write lock until `first` commits.
        let second = tokio::spawn({
            let state = state.clone();
            async move {
                let mut second = state.write_session().await.unwrap();
                second.get_user_by_username("alice").await.unwrap()
            }
        });

        first.insert_new_user("alice", "token-1").await.unwrap();
        first.commit().await.unwrap();

        let seen = second.await.unwrap().unwrap();
        assert_eq!(seen.token, "token-1");
        assert_eq!(count_rows(&state, "users").await, 1);
    }

    #[tokio::test]
    async fn test_interleaved_write_sessions_both_commit() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut first = state.write_session().await.unwrap();
        assert!(first.get_user_by_username("alice").await.unwrap().is_none());

        let second = tokio::spawn({
            let state = state.clone();
            async move {
                let mut second = state.write_session().await.unwrap();
                assert!(second.get_user_by_username("bob").await.unwrap().is_none());
                let bob = second.insert_new_user("bob", "token-2").await.unwrap();
                second.commit().await.unwrap();
                bob
            }
        });

        first.insert_new_user("alice", "token-1").await.unwrap();
        first.commit().await.unwrap();

        let bob = second.await.unwrap();
        assert_eq!(bob.username, "bob");
        assert_eq!(count_rows(&state, "users").await, 2);
    }

    #[tokio::test]
    async fn test_write_session_sees_commits_made_after_a_read_session_began() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut reader = state.session().await.unwrap();
        assert!(reader.get_user_by_username("alice").await.unwrap().is_none());

        let mut writer = state.write_session().await.unwrap();
        writer.insert_new_user("alice", "token-1").await.unwrap();
        writer.commit().await.unwrap();
        drop(reader);

        let mut writer = state.write_session().await.unwrap();
        assert!(writer.get_user_by_username("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_uncommitted_session_is_rolled_back() {
        let (state, _temp_dir) = setup_test_db().await;

        {
            let mut session = state.session().await.unwrap();
            session.insert_new_user("alice", "token-1").await.unwrap();
        }

        let mut session = state.session().await.unwrap();
        assert!(session.get_user_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_messages_are_listed_in_insertion_order() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut session = state.session().await.unwrap();
        let alice = session.insert_new_user("alice", "token-1").await.unwrap();
        let bob = session.insert_new_user("bob", "token-2").await.unwrap();
        for i in 0..5 {
            session
                .insert_new_message(&format!("alice {i}"), Some("reply"), alice.id)
                .await
                .unwrap();
        }
        session
            .insert_new_message("bob 0", None, bob.id)
            .await
            .unwrap();
        session.commit().await.unwrap();

        let mut session = state.session().await.unwrap();
        let messages = session.get_messages_by_user_id(alice.id).await.unwrap();
        assert_eq!(messages.len(), 5);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message.content, format!("alice {i}"));
            assert_eq!(message.generated_response.as_deref(), Some("reply"));
            assert_eq!(message.user_id, alice.id);
        }
        assert!(messages.windows(2).all(|w| w[0].id < w[1].id));

        let messages = session.get_messages_by_user_id(bob.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].generated_response, None);
    }

    #[tokio::test]
    async fn test_insert_message_for_unknown_user_fails() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut session = state.session().await.unwrap();
        assert!(matches!(
            session.insert_new_message("hi", None, 42).await,
            Err(PalaverStateError::UnknownUser(42))
        ));
    }

    #[tokio::test]
    async fn test_delete_messages_then_user() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut session = state.session().await.unwrap();
        let alice = session.insert_new_user("alice", "token-1").await.unwrap();
        session.insert_new_message("one", Some("a"), alice.id).await.unwrap();
        session.insert_new_message("two", Some("b"), alice.id).await.unwrap();
        session.commit().await.unwrap();

        let mut session = state.session().await.unwrap();
        for message in session.get_messages_by_user_id(alice.id).await.unwrap() {
            session.delete_message(message.id).await.unwrap();
        }
        session.delete_user(alice.id).await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(count_rows(&state, "users").await, 0);
        assert_eq!(count_rows(&state, "messages").await, 0);
    }

    #[tokio::test]
    async fn test_delete_user_with_messages_is_rejected() {
        let (state, _temp_dir) = setup_test_db().await;

        let mut session = state.session().await.unwrap();
        let alice = session.insert_new_user("alice", "token-1").await.unwrap();
        session.insert_new_message("one", None, alice.id).await.unwrap();
        assert!(session.delete_user(alice.id).await.is_err());
    }

    #[tokio::test]
    async fn test_is_healthy() {
        let (state, _temp_dir) = setup_test_db().await;
        assert!(state.is_healthy().await);
    }
}
