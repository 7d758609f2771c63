pub mod ai_service;
pub mod config;
pub mod doctor;
pub mod normalizer;
pub mod server;
pub mod store;
pub mod templates;
pub mod upload;
