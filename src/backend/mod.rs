//! Model backend layer - family resolution, connection, and the Ollama client
//!
//! This module provides:
//! - The ModelBackend trait for text-in/text-out chat
//! - BackendFamily resolution and the connector registry
//! - ModelHandle, the connected identity passed around the pipeline
//! - The OllamaBackend implementation

pub mod client;
pub mod family;
pub mod ollama;

pub use client::{BackendRegistry, ConnectSpec, ModelBackend, ModelHandle, ScriptedBackend};
pub use family::{BackendFamily, FamilyRegistry};
pub use ollama::OllamaBackend;
