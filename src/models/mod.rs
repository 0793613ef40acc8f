// src/models/mod.rs

pub mod chapter;
pub mod question;
pub mod quiz;
pub mod score;
pub mod subject;
pub mod user;
