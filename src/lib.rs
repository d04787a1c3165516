// NeoAgent - conversational agent over a neoantigen selection pipeline

pub mod agents;
pub mod config;
pub mod fasta;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod routes;
pub mod storage;
pub mod table;
pub mod tools;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use agents::Agent;
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
