//! In-memory representation of a WebAssembly module.
//!
//! A [`Module`] is an ordered list of [`ModuleField`]s. Declarations refer to
//! each other through [`Var`]s, which hold either a numeric index or a
//! symbolic name; resolving names to indices is left to a later pass, and the
//! module's query methods accept both forms.

mod binding;
pub use binding::*;

mod decl;
pub use decl::*;

mod expr;
pub use expr::*;

mod module;
pub use module::*;

mod opcode;
pub use opcode::*;

mod types;
pub use types::*;
