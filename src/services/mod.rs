// src/services/mod.rs

pub mod analytics;
pub mod exam;
pub mod predictor;
pub mod rate_limit;
pub mod user_admin;
