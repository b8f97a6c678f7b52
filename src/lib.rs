pub mod agent;
pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod provider;

pub(crate) mod util;
