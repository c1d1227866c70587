//! Core run engine for the Nexous agent orchestrator.
//!
//! Orchestrates a directed graph of agents that consult external LLM
//! providers and optionally invoke sandboxed tools, producing a complete,
//! replayable trace of each execution. This crate owns the hard core: the
//! Trace Recorder, Provider Adapters, LLM Router, Agent, Tool Registry,
//! Dependency Resolver and Runner. The HTTP façade, CLI and preset/project
//! file formats around it are thin surfaces built in the sibling crates.

pub mod agent;
pub mod config;
pub mod core_types;
pub mod errors;
pub mod llm;
pub mod resolver;
pub mod runner;
pub mod tools;
pub mod trace;

pub use agent::{Agent, AgentContext, AgentResult};
pub use config::{AgentSpec, LLMPolicy, PresetCache, PresetLoader, PresetSpec, ProjectLoader, ProjectSpec};
pub use core_types::{LLMMessage, LLMResponse, Role};
pub use errors::{ErrorKind, NexousError};
pub use resolver::resolve_order;
pub use runner::{generate_run_id, use_llm_from_env, RunOptions, RunOutcome, Runner};
pub use trace::{load_trace, Trace, TraceRecorder};
