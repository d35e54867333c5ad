// src/store/mod.rs

pub mod cache;
pub mod session;
