// src/services/rate_limit.rs

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::RateLimitRule,
    error::AppError,
    store::cache::{Cache, get_json, set_json},
};

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(i64),
    /// Client network address, for anonymous callers.
    Address(String),
}

impl Actor {
    pub fn new(user_id: Option<i64>, address: Option<String>) -> Self {
        match user_id {
            Some(id) => Actor::User(id),
            None => Actor::Address(address.unwrap_or_else(|| "anon".to_string())),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::Address(addr) => f.write_str(addr),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited,
}

#[derive(Debug, Serialize, Deserialize)]
struct Counter {
    count: u64,
    reset: DateTime<Utc>,
}

/// Fixed-window request counter kept in the shared cache.
///
/// Advisory only: an evicted counter silently restarts its window.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn Cache>,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    pub async fn check(&self, action: &str, actor: &Actor, rule: RateLimitRule) -> Decision {
        self.check_at(action, actor, rule, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        action: &str,
        actor: &Actor,
        rule: RateLimitRule,
        now: DateTime<Utc>,
    ) -> Decision {
        let key = format!("rl:{}:{}", action, actor);

        let mut counter = match get_json::<Counter>(self.cache.as_ref(), &key).await {
            Some(counter) if now <= counter.reset => counter,
            _ => Counter {
                count: 0,
                reset: now + chrono::Duration::seconds(rule.window_seconds as i64),
            },
        };
        counter.count += 1;

        let remaining = (counter.reset - now).to_std().unwrap_or(Duration::ZERO);
        set_json(
            self.cache.as_ref(),
            &key,
            &counter,
            remaining.max(Duration::from_secs(1)),
        )
        .await;

        if counter.count > rule.limit {
            tracing::warn!(
                "Rate limit hit for {} by {} ({} > {})",
                action,
                actor,
                counter.count,
                rule.limit
            );
            Decision::Limited
        } else {
            Decision::Allowed
        }
    }

    /// Same as [`RateLimiter::check`], but a limited call becomes `AppError::RateLimited`.
    pub async fn enforce(
        &self,
        action: &str,
        actor: &Actor,
        rule: RateLimitRule,
    ) -> Result<(), AppError> {
        match self.check(action, actor, rule).await {
            Decision::Allowed => Ok(()),
            Decision::Limited => Err(AppError::RateLimited),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cache::MemoryCache;

    fn limiter() -> (RateLimiter, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        (RateLimiter::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn sixth_call_in_window_is_limited() {
        let (limiter, _) = limiter();
        let actor = Actor::User(7);
        let rule = RateLimitRule::new(5, 300);
        let now = Utc::now();

        for _ in 0..5 {
            assert_eq!(
                limiter.check_at("login", &actor, rule, now).await,
                Decision::Allowed
            );
        }
        assert_eq!(
            limiter.check_at("login", &actor, rule, now).await,
            Decision::Limited
        );
    }

    #[tokio::test]
    async fn window_elapsing_resets_count() {
        let (limiter, cache) = limiter();
        let actor = Actor::Address("10.0.0.1".to_string());
        let rule = RateLimitRule::new(5, 300);
        let start = Utc::now();

        for _ in 0..6 {
            limiter.check_at("contact", &actor, rule, start).await;
        }

        let later = start + chrono::Duration::seconds(301);
        assert_eq!(
            limiter.check_at("contact", &actor, rule, later).await,
            Decision::Allowed
        );

        let counter: Counter = get_json(cache.as_ref(), "rl:contact:10.0.0.1")
            .await
            .unwrap();
        assert_eq!(counter.count, 1);
    }

    #[tokio::test]
    async fn actions_and_actors_are_counted_separately() {
        let (limiter, _) = limiter();
        let rule = RateLimitRule::new(1, 60);
        let now = Utc::now();
        let alice = Actor::User(1);
        let bob = Actor::User(2);

        assert_eq!(limiter.check_at("predict", &alice, rule, now).await, Decision::Allowed);
        assert_eq!(limiter.check_at("predict", &bob, rule, now).await, Decision::Allowed);
        assert_eq!(limiter.check_at("register", &alice, rule, now).await, Decision::Allowed);
        assert_eq!(limiter.check_at("predict", &alice, rule, now).await, Decision::Limited);
    }

    #[test]
    fn actor_prefers_user_identity() {
        assert_eq!(Actor::new(Some(3), Some("1.2.3.4".into())).to_string(), "user:3");
        assert_eq!(Actor::new(None, Some("1.2.3.4".into())).to_string(), "1.2.3.4");
        assert_eq!(Actor::new(None, None).to_string(), "anon");
    }
}
