//! HTTP API handlers for specdrafter-server

pub mod audio;
pub mod chat;
pub mod documents;
pub mod health;
pub mod projects;

pub use audio::audio_routes;
pub use chat::chat_routes;
pub use documents::document_routes;
pub use health::health_routes;
pub use projects::project_routes;
