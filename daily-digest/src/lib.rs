// Library interface for daily-digest modules
// This allows tests and the binaries to import modules

pub mod ingestion;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod publisher;
pub mod scheduler;
