// src/store/session.rs

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session storage failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session data is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

type SessionData = HashMap<String, Value>;

/// Durable per-client storage, one row per session id.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    idle_lifetime: Duration,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    data: String,
    expires_at: DateTime<Utc>,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, idle_seconds: u64) -> Self {
        Self {
            pool,
            idle_lifetime: Duration::seconds(idle_seconds as i64),
        }
    }

    /// Returns the raw stored document, dropping it if it has gone idle for too long.
    async fn load_raw(&self, id: &str) -> Result<Option<String>, SessionError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT data, expires_at FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) if row.expires_at > Utc::now() => Ok(Some(row.data)),
            Some(_) => {
                self.delete(id).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn load(&self, id: &str) -> Result<SessionData, SessionError> {
        match self.load_raw(id).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(SessionData::new()),
        }
    }

    async fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError> {
        let raw = serde_json::to_string(data)?;
        sqlx::query(
            r#"
            INSERT INTO sessions (id, data, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(id)
        .bind(raw)
        .bind(Utc::now() + self.idle_lifetime)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replaces the document only if it still equals `expected_raw`.
    async fn swap(
        &self,
        id: &str,
        expected_raw: &str,
        data: &SessionData,
    ) -> Result<bool, SessionError> {
        let raw = serde_json::to_string(data)?;
        let result = sqlx::query("UPDATE sessions SET data = ?, expires_at = ? WHERE id = ? AND data = ?")
            .bind(raw)
            .bind(Utc::now() + self.idle_lifetime)
            .bind(id)
            .bind(expected_raw)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes every expired session row. Returns the number of rows deleted.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Handle to the calling client's session, injected by [`session_middleware`].
#[derive(Clone)]
pub struct Session {
    id: String,
    store: SessionStore,
}

impl Session {
    pub fn new(id: String, store: SessionStore) -> Self {
        Self { id, store }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        let mut data = self.store.load(&self.id).await?;
        match data.remove(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn insert<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        let mut data = self.store.load(&self.id).await?;
        data.insert(key.to_string(), serde_json::to_value(value)?);
        self.store.save(&self.id, &data).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut data = self.store.load(&self.id).await?;
        if data.remove(key).is_some() {
            self.store.save(&self.id, &data).await?;
        }
        Ok(())
    }

    /// Drops everything stored for this client.
    pub async fn flush(&self) -> Result<(), SessionError> {
        self.store.delete(&self.id).await
    }

    /// Atomically replaces `key` with `new` if it currently holds `expected`.
    ///
    /// Returns false when the value differs or another request changed the
    /// session between the read and the write.
    pub async fn compare_and_swap<T: Serialize>(
        &self,
        key: &str,
        expected: &T,
        new: &T,
    ) -> Result<bool, SessionError> {
        let Some(raw) = self.store.load_raw(&self.id).await? else {
            return Ok(false);
        };
        let mut data: SessionData = serde_json::from_str(&raw)?;
        if data.get(key) != Some(&serde_json::to_value(expected)?) {
            return Ok(false);
        }
        data.insert(key.to_string(), serde_json::to_value(new)?);
        self.store.swap(&self.id, &raw, &data).await
    }
}

pub fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_well_formed(id: &str) -> bool {
    id.len() == 64 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Axum Middleware: Session.
///
/// Resolves the `sessionid` cookie (issuing a new id when absent) and injects
/// a [`Session`] handle into the request extensions.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let existing = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| is_well_formed(id));

    let (id, issued) = match existing {
        Some(id) => (id, false),
        None => (new_session_id(), true),
    };

    req.extensions_mut()
        .insert(Session::new(id.clone(), state.sessions.clone()));

    let response = next.run(req).await;

    if issued {
        let cookie = Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        (jar.add(cookie), response).into_response()
    } else {
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    async fn session() -> Session {
        let store = SessionStore::new(memory_pool().await, 3600);
        Session::new(new_session_id(), store)
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let session = session().await;
        session.insert("answer", &42_i64).await.unwrap();
        assert_eq!(session.get::<i64>("answer").await.unwrap(), Some(42));
        assert_eq!(session.get::<i64>("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_and_flush_clear_values() {
        let session = session().await;
        session.insert("a", &1_i64).await.unwrap();
        session.insert("b", &2_i64).await.unwrap();

        session.remove("a").await.unwrap();
        assert_eq!(session.get::<i64>("a").await.unwrap(), None);
        assert_eq!(session.get::<i64>("b").await.unwrap(), Some(2));

        session.flush().await.unwrap();
        assert_eq!(session.get::<i64>("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn compare_and_swap_only_wins_once() {
        let session = session().await;
        session.insert("token", &"abc".to_string()).await.unwrap();

        let first = session
            .compare_and_swap("token", &"abc".to_string(), &"used".to_string())
            .await
            .unwrap();
        let second = session
            .compare_and_swap("token", &"abc".to_string(), &"used".to_string())
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(
            session.get::<String>("token").await.unwrap().as_deref(),
            Some("used")
        );
    }

    #[tokio::test]
    async fn expired_sessions_read_as_empty() {
        let pool = memory_pool().await;
        let store = SessionStore::new(pool, 0);
        let session = Session::new(new_session_id(), store.clone());
        session.insert("a", &1_i64).await.unwrap();

        assert_eq!(session.get::<i64>("a").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[test]
    fn session_ids_are_hex_and_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert!(is_well_formed(&a));
        assert_ne!(a, b);
        assert!(!is_well_formed("../etc/passwd"));
    }
}
