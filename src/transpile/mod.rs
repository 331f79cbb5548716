//! Filter transpiler - expression trees to SQL predicates
//!
//! The [`TranspilerRegistry`] holds one entry per kind. The [`Compiler`]
//! turns a checked expression into a [`Predicate`], which renders to a
//! parameterised SQLite WHERE fragment.

pub mod compiler;
pub mod predicate;
pub mod registry;

pub use compiler::Compiler;
pub use predicate::{CmpOp, Predicate, SqlFragment};
pub use registry::{EdgeHandler, TranspilerEntry, TranspilerRegistry};
