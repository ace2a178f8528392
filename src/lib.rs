//! Block-graph prompt composer: compiles workspaces of typed prompt blocks
//! (persona, task, context, constraints, output format) into a prompt string
//! and runs it against an LLM endpoint.

pub mod blocks;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod graph;
pub mod log;
pub mod provider;
pub mod queue;
pub mod render;
pub mod templates;
pub mod ux;

pub use compiler::{Compilation, CompileError, Compiler};
pub use graph::{BlockInstance, FieldValue, SlotBinding, Workspace};
