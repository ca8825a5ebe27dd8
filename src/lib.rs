//! An ahead-of-time transpiler from [JVM class files](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html)
//! to C++ translation units linked against the jrt runtime.
//!
//! The pipeline runs in three stages over a shared class-graph model:
//! ingest class files into [`model::ProgramModel`], resolve the closed class
//! graph (hierarchy, layouts, dispatch tables), lower per-method bytecode to
//! the stack-free TIR, and emit one declaration and one definition unit per
//! class plus a program-wide dispatch table.

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod constant_info;
pub mod field_info;
pub mod method_info;

pub mod code;
pub mod types;

pub mod config;
pub mod descriptor;
pub mod error;
pub mod model;

pub mod emit;
pub mod ingest;
pub mod lower;
pub mod resolve;

pub use config::Config;
pub use emit::EmitSummary;
pub use error::TranspileError;
pub use types::*;

/// Run the whole pipeline: ingest, resolve, lower, emit. Stages hand the
/// program model forward; nothing mutates it after Resolve except the TIR
/// bodies Lower attaches to each method.
pub fn transpile(config: &Config) -> Result<EmitSummary, TranspileError> {
    let mut program = ingest::ingest(config)?;
    resolve::resolve(&mut program, config)?;
    lower::lower_program(&mut program)?;
    emit::emit_program(&program, config)
}
