pub mod config;
pub mod dashboard;
pub mod discovery;
pub mod errors;
pub mod git;
pub mod github;
pub mod logging;
pub mod models;
pub mod scanner;
pub mod web;
