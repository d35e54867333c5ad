// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod contact;
pub mod exam;
pub mod pages;
pub mod prediction;
pub mod profile;
