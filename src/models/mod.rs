// src/models/mod.rs

pub mod contact;
pub mod exam_result;
pub mod prediction;
pub mod question;
pub mod subject;
pub mod user;
