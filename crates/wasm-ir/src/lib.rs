//! wasm-ir: an in-memory intermediate representation for WebAssembly.
//!
//! The [`ir`] module holds the data model of a module: declarations kept in
//! the order they were appended, expression trees for bodies and
//! initializers, and per-namespace binding tables so references can be
//! written by name or by index. The [`script`] module models conformance
//! test scripts built from modules, actions and assertions.
//!
//! The [`reader`] lowers binary modules (via `wasmparser`) and text modules
//! (via `wat`) into the IR. It is what forces deferred script modules.

pub mod error;
pub mod ir;
pub mod reader;
pub mod script;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use error::ReadError;
pub use ir::{Module, ModuleField, ModuleFieldKind, Var};
pub use reader::{read_binary, read_text};
pub use script::{Command, Script, ScriptModule};

/// Options controlling how modules are read.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Run the `wasmparser` validator before lowering.
    pub validate: bool,
    /// Lower function bodies into expression trees. When false, functions
    /// keep their declarations and locals but get empty bodies.
    pub function_bodies: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            validate: false,
            function_bodies: true,
        }
    }
}
