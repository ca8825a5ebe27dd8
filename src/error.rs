use std::path::PathBuf;

use thiserror::Error;

/// Structural damage in a class-file blob. Always fatal.
#[derive(Error, Debug)]
#[error("malformed class file {class_name} at byte offset {offset}: {message}")]
pub struct MalformedInput {
    pub class_name: String,
    pub offset: u64,
    pub message: String,
}

/// A single linking failure. All occurrences are collected before the build
/// aborts so users can fix them in one pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("class {referenced_by} references missing class {name}")]
    MissingClass { name: String, referenced_by: String },
    #[error("cycle in supertype graph involving {name}")]
    SupertypeCycle { name: String },
    #[error("{class} overrides final method {name}{descriptor} declared in {declared_in}")]
    FinalOverride {
        class: String,
        name: String,
        descriptor: String,
        declared_in: String,
    },
    #[error("{class}.{name}{descriptor} inherits conflicting defaults from {first} and {second}")]
    DefaultConflict {
        class: String,
        name: String,
        descriptor: String,
        first: String,
        second: String,
    },
}

/// Bytecode that fails stack simulation. Fatal; reported with enough context
/// to find the offending instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("{class}.{method}{descriptor}: operand stack underflow at offset {offset}")]
    StackUnderflow {
        class: String,
        method: String,
        descriptor: String,
        offset: u32,
    },
    #[error("{class}.{method}{descriptor}: irreconcilable stack types at join {offset}: {left} vs {right}")]
    JoinMismatch {
        class: String,
        method: String,
        descriptor: String,
        offset: u32,
        left: String,
        right: String,
    },
    #[error("{class}.{method}{descriptor}: stack depth {actual} does not match join {offset} depth {expected}")]
    JoinDepthMismatch {
        class: String,
        method: String,
        descriptor: String,
        offset: u32,
        expected: usize,
        actual: usize,
    },
    #[error("{class}.{method}{descriptor}: branch to unknown offset {offset}")]
    BadBranchTarget {
        class: String,
        method: String,
        descriptor: String,
        offset: u32,
    },
}

/// A bytecode construct the translator does not model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unsupported {
    #[error("{class}.{method}: recursive subroutine at offset {offset}")]
    RecursiveSubroutine {
        class: String,
        method: String,
        offset: u32,
    },
    #[error("{class}.{method}: subroutine at offset {offset} has no recognizable entry/exit shape")]
    IrregularSubroutine {
        class: String,
        method: String,
        offset: u32,
    },
    #[error("{class}.{method}: invokedynamic at offset {offset} uses an unsupported bootstrap pattern")]
    InvokeDynamic {
        class: String,
        method: String,
        offset: u32,
    },
}

/// Top-level pipeline error. The closed set of §7 kinds plus the boundary
/// I/O failures.
#[derive(Error, Debug)]
pub enum TranspileError {
    #[error(transparent)]
    Malformed(#[from] MalformedInput),
    #[error("{} link error(s)", .0.len())]
    Link(Vec<LinkError>),
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Unsupported(#[from] Unsupported),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TranspileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TranspileError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for the CLI: 2 for bad input, 3 for internal
    /// (lowering) failures, per the documented contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            TranspileError::Malformed(_) | TranspileError::Link(_) => 2,
            TranspileError::Verify(_) | TranspileError::Unsupported(_) => 3,
            TranspileError::Io { .. } => 2,
        }
    }
}
