//! # SpecDrafter Common Library
//!
//! Shared code for the SpecDrafter requirements-gathering service:
//! - Domain model (projects, conversation entries)
//! - Phase state machine
//! - Chat stream event types
//! - Configuration file loading
//! - Utility functions

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod phase;
pub mod time;

pub use error::{Error, Result};
pub use events::ChatEvent;
pub use models::{ConversationEntry, Project, Role};
pub use phase::{Phase, PhaseAdvance};
