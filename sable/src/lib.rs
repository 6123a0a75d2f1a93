//! Sable, an embedded shading language that compiles to SPIR-V in vanilla Rust.
//!
//! This crate provides an [EDSL] to build [shaders] and a compiler turning them into [SPIR-V] modules, without any
//! external shader compiler. Shaders are written as regular Rust closures manipulating typed expressions; running the
//! closures once _records_ what they do, and the recording is then lowered to structured SSA code and encoded as the
//! binary words a Vulkan driver consumes.
//!
//! # Motivation
//!
//! Shaders are usually opaque strings or files, compiled by a separate tool (or by the driver) and only checked when
//! that tool runs. Binding points are declared twice (once in the shader, once in the host code) and nothing checks
//! that both sides agree. Writing the shaders in the host language fixes both problems: `rustc` type-checks the
//! shading code, and the binding points are ordinary Rust values shared by the host code and the shaders.
//!
//! Because shaders are built at runtime, they can also be composed with plain Rust: a function returning an
//! [`Expr`] is a shader snippet, a loop in Rust unrolls the shading code, and generic functions instantiate one
//! shader per type.
//!
//! # Overview
//!
//! - [`PipelineLayout`] declares the binding points of a pipeline: uniform and storage buffers, images, samplers,
//!   push constants, vertex attributes, varyings and color outputs. Each declaration returns a typed token.
//! - [`StageBuilder`] builds a shader stage. Its closures get the built-in inputs and outputs of the stage, declare
//!   functions, constants and workgroup-shared memory, and record the `main` function.
//! - [`Scope`] records statements: variables, assignments, structured control flow (conditionals, loops, switches),
//!   returns and barriers. Control flow is built with closures, so regions are always balanced; the marker forms
//!   (`if_`/`fi`, `do_`/`while_`…) are also available and unbalanced markers are reported as errors.
//! - [`Stage::compile`] lowers a stage against a layout into an [`ir::Module`], checking device limits, and
//!   [`ir::Module::assemble`] encodes it as SPIR-V words. The module carries the [reflection](reflect) of the stage:
//!   the descriptors it uses, its push-constant range and its vertex input layout.
//! - [`pipeline::Pipeline`] compiles the stages of a pipeline together and merges their reflection.
//! - [`group`] provides workgroup-wide algorithms (reduction, scans, sort, searches) and subgroup operations.
//! - [`exec::Executor`] interprets compiled compute modules on the CPU, which makes shaders testable without a GPU.
//!
//! # Example
//!
//! ```
//! use sable::{CompileOptions, HasX as _, PipelineLayout, Scope, StageBuilder};
//!
//! let mut layout = PipelineLayout::new();
//! let data = layout.storage_array::<f32>(0);
//!
//! let stage = StageBuilder::new_compute_shader([64, 1, 1], |s, input| {
//!   s.main_fun(|s: &mut Scope<()>| {
//!     let i = input.global_invocation_id.x();
//!     s.set(data.at(&i), data.at(&i) * 2.);
//!   })
//! });
//!
//! let module = stage.compile(&layout, &CompileOptions::default())?;
//! let words = module.assemble();
//! assert_eq!(words[0], spirv::MAGIC_NUMBER);
//! # Ok::<(), sable::CompileError>(())
//! ```
//!
//! # Features
//!
//! - `derive` (default): `#[derive(GpuStruct)]`, to use Rust structs in shaders.
//!
//! [EDSL]: https://en.wikipedia.org/wiki/Domain-specific_language#External_and_Embedded_Domain_Specific_Languages
//! [shaders]: https://en.wikipedia.org/wiki/Shader
//! [SPIR-V]: https://registry.khronos.org/SPIR-V/

// code generated by the derive macros refers to `::sable`
extern crate self as sable;

pub mod array;
pub mod barrier;
pub mod binding;
pub mod builtin;
pub mod config;
pub mod error;
pub mod exec;
pub mod expr;
pub mod field;
pub mod fun;
pub mod group;
pub mod input;
pub mod interface;
pub mod ir;
pub mod layout;
mod lower;
pub mod memory;
pub mod output;
pub mod pipeline;
mod promote;
pub mod reflect;
pub mod report;
pub mod scope;
pub mod stage;
pub mod stdlib;
pub mod swizzle;
pub mod sync;
pub mod types;
pub mod var;
pub mod vertex;
pub mod writer;

pub use spirv::ImageFormat;

pub use crate::{
  array::{VArray, WArray, WArray2, WArray3},
  barrier::{Barrier, MemoryClass, MemoryOrder, SyncScope},
  binding::{
    Access, BindingArray, Dim1, Dim2, Dim2Array, Dim3, DimCube, InputAttachment, PushConstant, SampledTexture, Sampler,
    StorageArray, StorageBuffer, StorageImage, StorageTexelBuffer, Texture, UniformBuffer, UniformTexelBuffer,
  },
  config::{CompileOptions, DeviceLimits, DivergencePolicy, SpirvVersion},
  error::{CompileError, ExecError, ResourceError, SyncError, UsageError},
  expr::{reinterpret_cast, static_cast, Expr},
  field::{Field, FieldFlags},
  fun::FunHandle,
  interface::{ColorOutput, Interpolation, Sampling, Varying},
  layout::{PipelineLayout, Slot},
  scope::{Conditional, LoopScope, Scope},
  stage::{
    GeometryConfig, GeometryInput, GeometryOutput, ShaderStage, Stage, StageBuilder, TessControlConfig,
    TessEvalConfig, TessPrimitive, TessSpacing, Winding,
  },
  stdlib::{
    Bits, Bounded, Cross, Derivatives, Exponential, FloatingExt, Geometry, IntegerDot, Matrices, Mix, Relative,
    Rounding, Select, SquareMatrices, Trigonometry, VectorRelational,
  },
  swizzle::{HasW, HasX, HasY, HasZ, Swizzlable},
  types::{
    GpuStruct, Matrix, ToType, DM22, DM23, DM24, DM32, DM33, DM34, DM42, DM43, DM44, M22, M23, M24, M32, M33, M34, M42,
    M43, M44, V2, V3, V4,
  },
  var::Var,
  vertex::{
    Float16, Float32, Float64, InputRate, Sint16, Sint32, Sint8, Snorm16, Snorm8, Sscaled16, Sscaled8, Uint16, Uint32,
    Uint8, Unorm16, Unorm8, Uscaled16, Uscaled8, VertexAttribute, VertexBuffer,
  },
};

#[cfg(feature = "derive")]
pub use sable_derive::GpuStruct;
