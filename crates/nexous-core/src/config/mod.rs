//! Project/preset file model and loaders.

pub mod loader;
pub mod preset;
pub mod project;

pub use loader::{PresetCache, PresetLoader, ProjectLoader};
pub use preset::{LLMPolicy, OutputPolicy, PresetSpec};
pub use project::{AgentSpec, ProjectSpec};
