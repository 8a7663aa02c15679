//! Business logic for specdrafter-server

pub mod audio;
pub mod chat;
pub mod documents;
pub mod gateway;
pub mod prompts;
pub mod token_scanner;
pub mod transcoder;

pub use audio::{AudioBridge, AudioError};
pub use chat::{ChatMessage, ChatOrchestrator, ChatTurn, TurnOutcome};
pub use gateway::{Gateway, GenerationMode, Instruction, TextStream};
pub use token_scanner::{ControlTokenScanner, ScanOutput};
pub use transcoder::{AudioTranscoder, SymphoniaTranscoder};
