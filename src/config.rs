// src/config.rs

use std::{collections::BTreeMap, env, str::FromStr};

use dotenvy::dotenv;

use crate::services::predictor::FeatureValue;

/// A fixed-window limit: at most `limit` calls per `window_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u64,
    pub window_seconds: u64,
}

impl RateLimitRule {
    pub const fn new(limit: u64, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds,
        }
    }
}

/// Parses `"limit/window"`, e.g. `"5/300"`.
impl FromStr for RateLimitRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (limit, window) = s
            .split_once('/')
            .ok_or_else(|| format!("expected 'limit/window', got '{s}'"))?;
        let limit = limit
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid limit in '{s}': {e}"))?;
        let window_seconds = window
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid window in '{s}': {e}"))?;
        if window_seconds == 0 {
            return Err(format!("window must be positive in '{s}'"));
        }
        Ok(Self::new(limit, window_seconds))
    }
}

/// Per-action limits for the request-producing endpoints.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub register: RateLimitRule,
    pub login: RateLimitRule,
    pub contact: RateLimitRule,
    pub predict: RateLimitRule,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            register: RateLimitRule::new(5, 300),
            login: RateLimitRule::new(10, 300),
            contact: RateLimitRule::new(5, 300),
            predict: RateLimitRule::new(20, 300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    /// Redis URL for the shared cache. In-process cache when unset.
    pub cache_url: Option<String>,
    pub dashboard_cache_ttl: u64,
    pub session_idle_seconds: u64,
    pub exam_submit_grace_seconds: i64,
    pub rate_limits: RateLimits,

    pub model_path: String,
    pub load_model_on_startup: bool,
    /// Values for model features the prediction form does not collect.
    pub prediction_defaults: BTreeMap<String, FeatureValue>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = Self::default();

        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let mut rate_limits = RateLimits::default();
        for (name, rule) in [
            ("RATE_LIMIT_REGISTER", &mut rate_limits.register),
            ("RATE_LIMIT_LOGIN", &mut rate_limits.login),
            ("RATE_LIMIT_CONTACT", &mut rate_limits.contact),
            ("RATE_LIMIT_PREDICT", &mut rate_limits.predict),
        ] {
            if let Ok(raw) = env::var(name) {
                *rule = raw
                    .parse()
                    .unwrap_or_else(|e| panic!("{name} is invalid: {e}"));
            }
        }

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_var("JWT_EXPIRATION", defaults.jwt_expiration),
            rust_log,
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            cache_url: env::var("CACHE_URL").ok().filter(|url| !url.is_empty()),
            dashboard_cache_ttl: parse_var("DASHBOARD_CACHE_TTL", defaults.dashboard_cache_ttl),
            session_idle_seconds: parse_var("SESSION_IDLE_SECONDS", defaults.session_idle_seconds),
            exam_submit_grace_seconds: parse_var(
                "EXAM_SUBMIT_GRACE_SECONDS",
                defaults.exam_submit_grace_seconds,
            ),
            rate_limits,
            model_path: env::var("MODEL_PATH").unwrap_or(defaults.model_path),
            load_model_on_startup: env::var("LOAD_MODEL_ON_STARTUP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.load_model_on_startup),
            prediction_defaults: defaults.prediction_defaults,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://student_performance.db?mode=rwc".to_string(),
            jwt_secret: String::new(),
            jwt_expiration: 60 * 60 * 24,
            rust_log: "info".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            admin_username: None,
            admin_password: None,
            cache_url: None,
            dashboard_cache_ttl: 30,
            session_idle_seconds: 60 * 60 * 24 * 14,
            exam_submit_grace_seconds: 15,
            rate_limits: RateLimits::default(),
            model_path: "model/student_model.json".to_string(),
            load_model_on_startup: true,
            prediction_defaults: default_prediction_features(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} is invalid: {e}")),
        Err(_) => default,
    }
}

fn default_prediction_features() -> BTreeMap<String, FeatureValue> {
    let categorical = [
        ("Mjob", "other"),
        ("Fjob", "other"),
        ("reason", "course"),
        ("schoolsup", "no"),
        ("paid", "no"),
        ("nursery", "yes"),
        ("higher", "yes"),
        ("romantic", "no"),
    ];
    let numeric = [
        ("famrel", 4.0),
        ("freetime", 3.0),
        ("goout", 3.0),
        ("Dalc", 1.0),
        ("Walc", 2.0),
    ];

    categorical
        .into_iter()
        .map(|(k, v)| (k.to_string(), FeatureValue::Category(v.to_string())))
        .chain(
            numeric
                .into_iter()
                .map(|(k, v)| (k.to_string(), FeatureValue::Number(v))),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_rule_parses() {
        let rule: RateLimitRule = "5/300".parse().unwrap();
        assert_eq!(rule, RateLimitRule::new(5, 300));

        let rule: RateLimitRule = " 12 / 60 ".parse().unwrap();
        assert_eq!(rule, RateLimitRule::new(12, 60));
    }

    #[test]
    fn rate_limit_rule_rejects_garbage() {
        assert!("5".parse::<RateLimitRule>().is_err());
        assert!("a/300".parse::<RateLimitRule>().is_err());
        assert!("5/0".parse::<RateLimitRule>().is_err());
    }

    #[test]
    fn defaults_cover_uncollected_features() {
        let config = Config::default();
        assert_eq!(config.prediction_defaults.len(), 13);
        assert_eq!(
            config.prediction_defaults.get("famrel"),
            Some(&FeatureValue::Number(4.0))
        );
        assert_eq!(
            config.prediction_defaults.get("reason"),
            Some(&FeatureValue::Category("course".to_string()))
        );
    }
}
