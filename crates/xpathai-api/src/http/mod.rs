//! HTTP interface module.

pub mod handlers;
pub mod models;
pub mod monitoring;
pub mod openai_compat;
pub mod routes;
