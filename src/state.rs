// src/state.rs

use std::sync::Arc;

use crate::config::Config;
use crate::services::{predictor::Predictor, rate_limit::RateLimiter};
use crate::store::{cache::Cache, session::SessionStore};
use axum::extract::FromRef;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub cache: Arc<dyn Cache>,
    pub sessions: SessionStore,
    pub predictor: Arc<Predictor>,
    pub limiter: RateLimiter,
}

impl AppState {
    /// Wires the services that hang off the pool, config and cache.
    pub fn new(pool: SqlitePool, config: Config, cache: Arc<dyn Cache>) -> Self {
        let predictor = Arc::new(Predictor::new(
            config.model_path.clone(),
            config.prediction_defaults.clone(),
        ));
        Self::with_predictor(pool, config, cache, predictor)
    }

    pub fn with_predictor(
        pool: SqlitePool,
        config: Config,
        cache: Arc<dyn Cache>,
        predictor: Arc<Predictor>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(pool.clone(), config.session_idle_seconds),
            limiter: RateLimiter::new(cache.clone()),
            pool,
            config,
            cache,
            predictor,
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Cache> {
    fn from_ref(state: &AppState) -> Self {
        state.cache.clone()
    }
}

impl FromRef<AppState> for Arc<Predictor> {
    fn from_ref(state: &AppState) -> Self {
        state.predictor.clone()
    }
}
