//! Compilation errors.
//!
//! A shader either compiles to a complete module or fails with a [`CompileError`]. Errors are never downgraded to
//! warnings; advisory findings go through [`log`] instead.

use thiserror::Error;

use crate::{config::SpirvVersion, stage::ShaderStage, types::Type};

/// Error returned when compiling a shader stage or a pipeline.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompileError {
  /// The shading code or the pipeline layout is misused.
  #[error("usage error: {0}")]
  Usage(#[from] UsageError),

  /// A device limit is exceeded.
  #[error("resource exhausted: {0}")]
  ResourceExhausted(#[from] ResourceError),

  /// A synchronization scenario is invalid for the resources it references.
  #[error("invalid barrier or resource usage: {0}")]
  InvalidBarrier(#[from] SyncError),
}

impl CompileError {
  /// Usage error carried by this error, if any.
  pub fn usage(&self) -> Option<&UsageError> {
    match self {
      CompileError::Usage(e) => Some(e),
      _ => None,
    }
  }
}

/// Programming mistakes found while recording or lowering shading code.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum UsageError {
  #[error("`{closer}` has no matching `{opener}`")]
  UnmatchedCloser {
    closer: &'static str,
    opener: &'static str,
  },

  #[error("`{opener}` is never closed")]
  UnclosedRegion { opener: &'static str },

  #[error("`{what}` used outside of {context}")]
  OutsideOf {
    what: &'static str,
    context: &'static str,
  },

  #[error("function `{function}` returns {found} but is declared to return {expected}")]
  ReturnMismatch {
    function: String,
    expected: Type,
    found: Type,
  },

  #[error("function `{function}` can reach its end without returning a {expected}")]
  MissingReturn { function: String, expected: Type },

  #[error("array `{name}` must have a positive size")]
  NonPositiveArraySize { name: String },

  #[error("{0} is not declared in this pipeline layout")]
  UndeclaredBinding(String),

  #[error("{access} access through {binding}, which is declared {declared}")]
  AccessViolation {
    binding: String,
    access: &'static str,
    declared: &'static str,
  },

  #[error("binding ({set}, {binding}) is declared twice")]
  DuplicateBinding { set: u32, binding: u32 },

  #[error("case {0} appears twice in the same switch")]
  DuplicateCase(i64),

  #[error("default case appears twice in the same switch")]
  DuplicateDefault,

  #[error("statements recorded in a switch before its first case")]
  StatementOutsideCase,

  #[error("function `{function}` expects ({}) but is called with ({})", list(.expected), list(.found))]
  ArgumentMismatch {
    function: String,
    expected: Vec<Type>,
    found: Vec<Type>,
  },

  #[error("expression is not assignable")]
  NotAssignable,

  #[error("{what} is not available in {stage} shaders")]
  InvalidStage { what: String, stage: ShaderStage },

  #[error("variable `{0}` is used outside of the scope declaring it")]
  UndefinedVariable(String),

  #[error("barrier in `{function}` is reachable under a non-uniform condition")]
  DivergentBarrier { function: String },

  #[error("{0} cannot be stored in a variable")]
  OpaqueVariable(Type),

  #[error("constant {0} is not built out of literals")]
  NotConstant(Type),

  #[error("the {0} stage appears twice in the pipeline")]
  DuplicateStage(ShaderStage),

  #[error("a compute stage cannot be combined with other stages")]
  MixedPipeline,

  #[error("{what} requires SPIR-V {required} or later")]
  VersionTooLow {
    what: &'static str,
    required: SpirvVersion,
  },
}

fn list(types: &[Type]) -> String {
  types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

/// Device limits exceeded by a module.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ResourceError {
  #[error("workgroup shared memory: {required} bytes required, {available} available")]
  SharedMemory { required: u32, available: u32 },

  #[error("binding array ({set}, {binding}) has {count} elements, the device supports {max}")]
  DescriptorArray { set: u32, binding: u32, count: u32, max: u32 },

  #[error("workgroup size {size:?} exceeds the device limits ({max:?} per dimension, {max_invocations} invocations)")]
  WorkgroupSize {
    size: [u32; 3],
    max: [u32; 3],
    max_invocations: u32,
  },

  #[error("push constants: {required} bytes required, {available} available")]
  PushConstants { required: u32, available: u32 },

  #[error("{required} vertex input locations required, {available} available")]
  VertexAttributes { required: u32, available: u32 },
}

/// Invalid synchronization scenarios and resource usages.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SyncError {
  #[error("{resource} lacks the {required} usage needed for {access}")]
  MissingUsage {
    resource: String,
    access: String,
    required: String,
  },

  #[error("{access} cannot happen at pipeline stage {stage}")]
  InvalidStage { access: String, stage: String },

  #[error("barrier has an empty {0} stage mask")]
  EmptyStageMask(&'static str),

  #[error("binding ({set}, {binding}) is not part of the descriptor table")]
  UnknownBinding { set: u32, binding: u32 },
}

/// Errors raised by the reference executor.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ExecError {
  #[error("only compute modules can be executed")]
  NotCompute,

  #[error("buffer ({set}, {binding}) is referenced by the module but not bound")]
  UnboundBuffer { set: u32, binding: u32 },

  #[error("buffer ({set}, {binding}) is {len} bytes, which does not fit its declared layout")]
  BufferSize { set: u32, binding: u32, len: usize },

  #[error("push constants are {len} bytes, which does not fit their declared layout")]
  PushConstantSize { len: usize },

  #[error("invocations reached different barriers (or some exited while others wait)")]
  DivergentBarrier,

  #[error("step limit of {0} instructions exceeded")]
  StepLimit(u64),

  #[error("unsupported instruction: {0}")]
  Unsupported(String),

  #[error("malformed module: {0}")]
  Malformed(String),
}
