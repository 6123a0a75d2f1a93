//! Lowering of recorded stages into [`Module`]s.
//!
//! A [`Lowerer`] walks the declarations of a [`Stage`]: constants are folded, workgroup-shared variables become
//! globals and every function is turned into structured blocks. Interface globals (built-ins, bindings, varyings…)
//! are only created when the code refers to them, so the module and its reflection only list what the stage uses.
//! Once everything is lowered, the stage-specific execution modes are added and device limits are checked.

mod expr;
mod flow;
mod memory;
mod uniform;

use std::collections::{BTreeSet, HashMap};

use crate::{
  builtin::BuiltIn,
  config::{CompileOptions, SpirvVersion},
  error::{CompileError, ResourceError, UsageError},
  expr::{ErasedExpr, ExprNode},
  ir::{
    Arena, Constant, ExecutionMode, Function, GlobalVariable, Handle, IrImage, IrStruct, IrType, Member, Module,
    UniqueArena,
  },
  layout::{PipelineLayout, ResolvedLayout},
  memory::{array_stride, matrix_stride, size_align, struct_offsets, MemoryLayout},
  reflect::{DescriptorEntry, PushConstantRange, StageFlags, StageReflection, VertexAttributeLayout, VertexBufferLayout},
  scope::InterfaceKind,
  stage::{
    GeometryInput, GeometryOutput, ShaderDecl, ShaderStage, Stage, StageConfig, TessPrimitive, TessSpacing, Winding,
  },
  types::{ImageClass, ImageDim, ImageType, ScalarType, Type},
};

pub(crate) use self::flow::FunCtx;

/// Lower `stage` against `layout`.
pub(crate) fn lower_stage(
  stage: &Stage,
  layout: &PipelineLayout,
  options: &CompileOptions,
) -> Result<Module, CompileError> {
  if let Some(error) = stage.errors.first() {
    return Err(error.clone().into());
  }

  for decl in &stage.decls {
    let scope = match decl {
      ShaderDecl::Main(fun) | ShaderDecl::FunDef { fun, .. } => &fun.scope,
      _ => continue,
    };

    if let Some(error) = scope.errors.first() {
      return Err(error.clone().into());
    }
  }

  let resolved = layout.resolve()?;
  log::debug!("lowering {} stage ({} declarations)", stage.stage(), stage.decls.len());

  let mut lowerer = Lowerer::new(stage.config, layout, resolved, options);
  for decl in &stage.decls {
    lowerer.declare(decl)?;
  }

  let module = lowerer.finish()?;
  log::debug!(
    "{} stage lowered: {} types, {} constants, {} globals, {} functions",
    module.stage,
    module.types.len(),
    module.constants.len(),
    module.globals.len(),
    module.functions.len()
  );

  Ok(module)
}

/// Function lowered from a [`ShaderDecl::FunDef`], callable by the functions declared after it.
#[derive(Clone, Debug)]
pub(crate) struct UserFunction {
  pub(crate) handle: Handle<Function>,
  pub(crate) name: String,
  pub(crate) args: Vec<Type>,
  pub(crate) ret: Type,
}

/// Interface global created for a layout item.
#[derive(Clone, Copy, Debug)]
pub(crate) struct InterfaceGlobal {
  pub(crate) global: Handle<GlobalVariable>,
  /// Per-vertex arrayed varying.
  pub(crate) arrayed: bool,
}

pub(crate) struct Lowerer<'a> {
  pub(crate) stage: ShaderStage,
  pub(crate) config: StageConfig,
  pub(crate) layout: &'a PipelineLayout,
  pub(crate) resolved: ResolvedLayout,
  pub(crate) options: &'a CompileOptions,

  pub(crate) types: UniqueArena<IrType>,
  pub(crate) constants: UniqueArena<Constant>,
  pub(crate) globals: Arena<GlobalVariable>,
  pub(crate) functions: Arena<Function>,
  pub(crate) capabilities: BTreeSet<spirv::Capability>,
  pub(crate) extensions: BTreeSet<String>,
  pub(crate) uses_glsl: bool,
  type_cache: HashMap<(Type, MemoryLayout), Handle<IrType>>,

  pub(crate) builtins: HashMap<BuiltIn, Handle<GlobalVariable>>,
  pub(crate) interface: HashMap<(InterfaceKind, u32), InterfaceGlobal>,
  pub(crate) push_block: Option<Handle<GlobalVariable>>,
  pub(crate) shared: HashMap<u16, Handle<GlobalVariable>>,
  shared_types: Vec<Type>,
  pub(crate) consts: HashMap<u16, Handle<Constant>>,
  pub(crate) user_functions: HashMap<u16, UserFunction>,
  entry_point: Option<Handle<Function>>,

  pub(crate) used_bindings: BTreeSet<u32>,
  pub(crate) dynamic_bindings: BTreeSet<u32>,
  pub(crate) writes_depth: bool,
  pub(crate) varyings_read: BTreeSet<u32>,
  pub(crate) varyings_written: BTreeSet<u32>,
}

impl<'a> Lowerer<'a> {
  fn new(
    config: StageConfig,
    layout: &'a PipelineLayout,
    resolved: ResolvedLayout,
    options: &'a CompileOptions,
  ) -> Self {
    let mut capabilities = BTreeSet::new();
    capabilities.insert(spirv::Capability::Shader);

    match config.stage() {
      ShaderStage::TessControl | ShaderStage::TessEval => {
        capabilities.insert(spirv::Capability::Tessellation);
      }
      ShaderStage::Geometry => {
        capabilities.insert(spirv::Capability::Geometry);
      }
      _ => (),
    }

    Self {
      stage: config.stage(),
      config,
      layout,
      resolved,
      options,
      types: UniqueArena::new(),
      constants: UniqueArena::new(),
      globals: Arena::new(),
      functions: Arena::new(),
      capabilities,
      extensions: BTreeSet::new(),
      uses_glsl: false,
      type_cache: HashMap::new(),
      builtins: HashMap::new(),
      interface: HashMap::new(),
      push_block: None,
      shared: HashMap::new(),
      shared_types: Vec::new(),
      consts: HashMap::new(),
      user_functions: HashMap::new(),
      entry_point: None,
      used_bindings: BTreeSet::new(),
      dynamic_bindings: BTreeSet::new(),
      writes_depth: false,
      varyings_read: BTreeSet::new(),
      varyings_written: BTreeSet::new(),
    }
  }

  pub(crate) fn version(&self) -> SpirvVersion {
    self.options.spirv_version
  }

  pub(crate) fn invalid_stage(&self, what: impl Into<String>) -> CompileError {
    UsageError::InvalidStage {
      what: what.into(),
      stage: self.stage,
    }
    .into()
  }

  fn declare(&mut self, decl: &ShaderDecl) -> Result<(), CompileError> {
    match decl {
      ShaderDecl::Const(handle, ty, expr) => {
        let constant = self.fold_constant(ty, expr)?;
        self.consts.insert(*handle, constant);
      }

      ShaderDecl::Shared(handle, ty) => {
        if self.stage != ShaderStage::Compute {
          return Err(self.invalid_stage("workgroup-shared memory"));
        }

        let pointee = self.ir_type(ty, MemoryLayout::Logical);
        let global = self.add_global(
          Some(format!("shared_{}", handle)),
          spirv::StorageClass::Workgroup,
          pointee,
          Vec::new(),
        );

        self.shared.insert(*handle, global);
        self.shared_types.push(ty.clone());
      }

      ShaderDecl::FunDef { handle, name, fun } => {
        log::trace!("lowering function `{}`", name);
        uniform::check_barriers(name, fun, self.layout, self.options.divergent_barriers)?;

        let lowered = flow::lower_function(self, name, fun)?;
        let function = self.functions.append(lowered);
        self.user_functions.insert(
          *handle,
          UserFunction {
            handle: function,
            name: name.clone(),
            args: fun.args.clone(),
            ret: fun.ret_ty.clone(),
          },
        );
      }

      ShaderDecl::Main(fun) => {
        log::trace!("lowering entry point");

        if fun.ret_ty != Type::Void {
          return Err(
            UsageError::ReturnMismatch {
              function: "main".to_owned(),
              expected: Type::Void,
              found: fun.ret_ty.clone(),
            }
            .into(),
          );
        }

        uniform::check_barriers("main", fun, self.layout, self.options.divergent_barriers)?;

        let lowered = flow::lower_function(self, "main", fun)?;
        self.entry_point = Some(self.functions.append(lowered));
      }
    }

    Ok(())
  }

  /// Fold a constant declaration; only literals and constructions of literals are accepted.
  fn fold_constant(&mut self, ty: &Type, expr: &ErasedExpr) -> Result<Handle<Constant>, CompileError> {
    match expr.node() {
      ExprNode::Lit(lit) => Ok(self.literal(*lit)),

      ExprNode::Construct(parts) => {
        let mut folded = Vec::with_capacity(parts.len());
        for part in parts {
          let constant = self.fold_constant(part.ty(), part)?;

          // vectors built out of smaller vectors are flattened
          match (ty, part.ty()) {
            (Type::Vector(..), Type::Vector(..)) => match &self.constants[constant] {
              Constant::Composite { parts, .. } => folded.extend(parts.iter().copied()),
              _ => return Err(UsageError::NotConstant(ty.clone()).into()),
            },
            _ => folded.push(constant),
          }
        }

        let ty = self.ir_type(ty, MemoryLayout::Logical);
        Ok(self.constants.insert(Constant::Composite { ty, parts: folded }))
      }

      _ => Err(UsageError::NotConstant(ty.clone()).into()),
    }
  }

  pub(crate) fn add_global(
    &mut self,
    name: Option<String>,
    class: spirv::StorageClass,
    pointee: Handle<IrType>,
    decorations: Vec<crate::ir::Decoration>,
  ) -> Handle<GlobalVariable> {
    let ty = self.types.insert(IrType::Pointer { class, pointee });
    self.globals.append(GlobalVariable {
      name,
      class,
      ty,
      pointee,
      decorations,
    })
  }

  /// Module type of `ty` stored in memory laid out with `layout`.
  pub(crate) fn ir_type(&mut self, ty: &Type, layout: MemoryLayout) -> Handle<IrType> {
    // without explicit layout, the layout does not matter
    let layout = if layout.is_explicit() || !needs_layout(ty) {
      layout
    } else {
      MemoryLayout::Logical
    };

    let key = (ty.clone(), layout);
    if let Some(&handle) = self.type_cache.get(&key) {
      return handle;
    }

    let ir = match ty {
      Type::Void => IrType::Void,
      Type::Scalar(s) => self.scalar_ir_type(*s, layout),

      Type::Vector(s, n) => {
        let component = self.ir_type(&Type::Scalar(*s), layout);
        IrType::Vector { component, size: *n }
      }

      Type::Matrix { scalar, columns, rows } => {
        let column = self.ir_type(&Type::Vector(*scalar, *rows), layout);
        IrType::Matrix {
          column,
          columns: *columns,
        }
      }

      Type::Array(elem, n) => {
        let element = self.ir_type(elem, layout);
        let len = self.uint(*n);
        IrType::Array {
          element,
          len,
          stride: layout.is_explicit().then(|| array_stride(elem, layout)),
        }
      }

      Type::RuntimeArray(elem) => {
        let element = self.ir_type(elem, layout);
        IrType::RuntimeArray {
          element,
          stride: layout.is_explicit().then(|| array_stride(elem, layout)),
        }
      }

      Type::Struct(st) => {
        let offsets = if layout.is_explicit() {
          struct_offsets(st, layout).into_iter().map(Some).collect()
        } else {
          vec![None; st.fields.len()]
        };

        let members = st
          .fields
          .iter()
          .zip(offsets)
          .map(|(field, offset)| Member {
            name: field.name.clone(),
            ty: self.ir_type(&field.ty, layout),
            offset,
            matrix_stride: if layout.is_explicit() {
              matrix_stride(&field.ty, layout)
            } else {
              None
            },
            relaxed: field.flags.contains(crate::field::FieldFlags::RELAXED_PRECISION),
            non_writable: false,
          })
          .collect();

        IrType::Struct(IrStruct {
          name: st.name.clone(),
          members,
          block: None,
        })
      }

      Type::Image(img) => IrType::Image(self.ir_image(img)),
      Type::Sampler => IrType::Sampler,

      Type::SampledImage(img) => {
        let image = IrType::Image(self.ir_image(img));
        IrType::SampledImage {
          image: self.types.insert(image),
        }
      }
    };

    let handle = self.types.insert(ir);
    self.type_cache.insert(key, handle);
    handle
  }

  fn scalar_ir_type(&mut self, s: ScalarType, layout: MemoryLayout) -> IrType {
    match s {
      // booleans have no memory representation
      ScalarType::Bool if layout.is_explicit() => IrType::Int {
        width: 32,
        signed: false,
      },
      ScalarType::Bool => IrType::Bool,
      ScalarType::Int | ScalarType::UInt => IrType::Int {
        width: 32,
        signed: s.is_signed(),
      },
      ScalarType::Int64 | ScalarType::UInt64 => {
        self.capabilities.insert(spirv::Capability::Int64);
        IrType::Int {
          width: 64,
          signed: s.is_signed(),
        }
      }
      ScalarType::Float => IrType::Float { width: 32 },
      ScalarType::Double => {
        self.capabilities.insert(spirv::Capability::Float64);
        IrType::Float { width: 64 }
      }
    }
  }

  fn ir_image(&mut self, img: &ImageType) -> IrImage {
    let sampled_type = self.ir_type(&Type::Scalar(img.sampled_type), MemoryLayout::Logical);
    let storage = !matches!(img.class, ImageClass::Sampled);

    let dim = match img.dim {
      ImageDim::D1 => {
        self.capabilities.insert(if storage {
          spirv::Capability::Image1D
        } else {
          spirv::Capability::Sampled1D
        });
        spirv::Dim::Dim1D
      }
      ImageDim::D2 => spirv::Dim::Dim2D,
      ImageDim::D3 => spirv::Dim::Dim3D,
      ImageDim::Cube => {
        if img.arrayed {
          self.capabilities.insert(if storage {
            spirv::Capability::ImageCubeArray
          } else {
            spirv::Capability::SampledCubeArray
          });
        }
        spirv::Dim::DimCube
      }
      ImageDim::Buffer => {
        self.capabilities.insert(if storage {
          spirv::Capability::ImageBuffer
        } else {
          spirv::Capability::SampledBuffer
        });
        spirv::Dim::DimBuffer
      }
      ImageDim::SubpassData => {
        self.capabilities.insert(spirv::Capability::InputAttachment);
        spirv::Dim::DimSubpassData
      }
    };

    let (sampled, format) = match img.class {
      ImageClass::Sampled => (1, spirv::ImageFormat::Unknown),
      ImageClass::Storage(format) => (2, format),
      ImageClass::Attachment => (2, spirv::ImageFormat::Unknown),
    };

    IrImage {
      sampled_type,
      dim,
      arrayed: img.arrayed,
      multisampled: img.multisampled,
      sampled,
      format,
    }
  }

  pub(crate) fn bool_type(&mut self) -> Handle<IrType> {
    self.ir_type(&Type::Scalar(ScalarType::Bool), MemoryLayout::Logical)
  }

  pub(crate) fn uint(&mut self, value: u32) -> Handle<Constant> {
    self.scalar(ScalarType::UInt, value as u64)
  }

  pub(crate) fn int(&mut self, value: i32) -> Handle<Constant> {
    self.scalar(ScalarType::Int, value as u32 as u64)
  }

  /// Scalar constant given by its bit pattern.
  pub(crate) fn scalar(&mut self, s: ScalarType, bits: u64) -> Handle<Constant> {
    let ty = self.ir_type(&Type::Scalar(s), MemoryLayout::Logical);
    match s {
      ScalarType::Bool => self.constants.insert(Constant::Bool { ty, value: bits != 0 }),
      _ => self.constants.insert(Constant::Scalar { ty, bits }),
    }
  }

  pub(crate) fn literal(&mut self, lit: crate::expr::Literal) -> Handle<Constant> {
    self.scalar(lit.scalar_type(), lit.bits())
  }

  /// Constant `0` or `1` of every component of `ty` (a scalar or a vector).
  pub(crate) fn splat_constant(&mut self, ty: &Type, one: bool) -> Handle<Constant> {
    let s = ty.scalar().unwrap_or(ScalarType::UInt);
    let bits = match (s, one) {
      (_, false) => 0,
      (ScalarType::Float, true) => 1f32.to_bits() as u64,
      (ScalarType::Double, true) => 1f64.to_bits(),
      (_, true) => 1,
    };

    let scalar = self.scalar(s, bits);
    match ty {
      Type::Vector(_, n) => {
        let ty = self.ir_type(ty, MemoryLayout::Logical);
        self.constants.insert(Constant::Composite {
          ty,
          parts: vec![scalar; *n as usize],
        })
      }
      _ => scalar,
    }
  }

  pub(crate) fn null(&mut self, ty: Handle<IrType>) -> Handle<Constant> {
    self.constants.insert(Constant::Null { ty })
  }

  fn finish(mut self) -> Result<Module, CompileError> {
    let entry_point = self
      .entry_point
      .ok_or(UsageError::UnclosedRegion { opener: "main_fun" })?;

    let execution_modes = self.execution_modes();
    self.check_limits()?;
    let reflection = self.reflection();

    // before 1.4, only the input and output variables are listed by the entry point
    let lists_all = self.version().lists_all_globals();
    let interface = self
      .globals
      .iter()
      .filter(|(_, g)| {
        lists_all || matches!(g.class, spirv::StorageClass::Input | spirv::StorageClass::Output)
      })
      .map(|(h, _)| h)
      .collect();

    let mut module = Module {
      stage: self.stage,
      config: self.config,
      version: self.version(),
      capabilities: self.capabilities,
      extensions: self.extensions,
      uses_glsl: self.uses_glsl,
      types: self.types,
      constants: self.constants,
      globals: self.globals,
      functions: self.functions,
      entry_point,
      interface,
      execution_modes,
      reflection,
      debug_names: self.options.debug_names,
    };

    if self.options.promote_variables {
      crate::promote::promote(&mut module);
    }

    Ok(module)
  }

  fn execution_modes(&self) -> Vec<ExecutionMode> {
    use spirv::ExecutionMode as Mode;

    let mut modes = Vec::new();

    match self.config {
      StageConfig::Vertex => (),

      StageConfig::TessControl(config) => {
        modes.push(ExecutionMode::with(Mode::OutputVertices, vec![config.output_vertices]));
      }

      StageConfig::TessEval(config) => {
        modes.push(ExecutionMode::new(match config.primitive {
          TessPrimitive::Triangles => Mode::Triangles,
          TessPrimitive::Quads => Mode::Quads,
          TessPrimitive::Isolines => Mode::Isolines,
        }));
        modes.push(ExecutionMode::new(match config.spacing {
          TessSpacing::Equal => Mode::SpacingEqual,
          TessSpacing::FractionalEven => Mode::SpacingFractionalEven,
          TessSpacing::FractionalOdd => Mode::SpacingFractionalOdd,
        }));
        modes.push(ExecutionMode::new(match config.winding {
          Winding::Clockwise => Mode::VertexOrderCw,
          Winding::CounterClockwise => Mode::VertexOrderCcw,
        }));

        if config.point_mode {
          modes.push(ExecutionMode::new(Mode::PointMode));
        }
      }

      StageConfig::Geometry(config) => {
        modes.push(ExecutionMode::new(match config.input {
          GeometryInput::Points => Mode::InputPoints,
          GeometryInput::Lines => Mode::InputLines,
          GeometryInput::LinesAdjacency => Mode::InputLinesAdjacency,
          GeometryInput::Triangles => Mode::Triangles,
          GeometryInput::TrianglesAdjacency => Mode::InputTrianglesAdjacency,
        }));
        modes.push(ExecutionMode::new(match config.output {
          GeometryOutput::Points => Mode::OutputPoints,
          GeometryOutput::LineStrip => Mode::OutputLineStrip,
          GeometryOutput::TriangleStrip => Mode::OutputTriangleStrip,
        }));
        modes.push(ExecutionMode::with(Mode::OutputVertices, vec![config.max_vertices]));
        modes.push(ExecutionMode::with(Mode::Invocations, vec![config.invocations.max(1)]));
      }

      StageConfig::Fragment => {
        modes.push(ExecutionMode::new(Mode::OriginUpperLeft));

        if self.writes_depth {
          modes.push(ExecutionMode::new(Mode::DepthReplacing));
        }

        if self.options.early_fragment_tests {
          modes.push(ExecutionMode::new(Mode::EarlyFragmentTests));
        }
      }

      StageConfig::Compute { local_size } => {
        modes.push(ExecutionMode::with(Mode::LocalSize, local_size.to_vec()));
      }
    }

    modes
  }

  fn check_limits(&self) -> Result<(), CompileError> {
    let limits = &self.options.limits;

    if let StageConfig::Compute { local_size } = self.config {
      let invocations = local_size.iter().fold(1u64, |acc, &n| acc * n as u64);
      let too_large = local_size
        .iter()
        .zip(&limits.max_compute_work_group_size)
        .any(|(size, max)| size > max);

      if too_large || invocations > limits.max_compute_work_group_invocations as u64 {
        return Err(
          ResourceError::WorkgroupSize {
            size: local_size,
            max: limits.max_compute_work_group_size,
            max_invocations: limits.max_compute_work_group_invocations,
          }
          .into(),
        );
      }
    }

    let shared_memory: u32 = self
      .shared_types
      .iter()
      .map(|ty| size_align(ty, MemoryLayout::Std430).0)
      .sum();
    if shared_memory > limits.max_compute_shared_memory_size {
      return Err(
        ResourceError::SharedMemory {
          required: shared_memory,
          available: limits.max_compute_shared_memory_size,
        }
        .into(),
      );
    }

    for &index in &self.used_bindings {
      let (Some(decl), Some((set, binding))) = (self.layout.binding_decl(index), self.resolved.binding(index)) else {
        continue;
      };

      if let Some(count) = decl.count {
        if count > limits.max_descriptor_array_len {
          return Err(
            ResourceError::DescriptorArray {
              set,
              binding,
              count,
              max: limits.max_descriptor_array_len,
            }
            .into(),
          );
        }
      }
    }

    if self.push_block.is_some() && self.resolved.push_constant_size() > limits.max_push_constants_size {
      return Err(
        ResourceError::PushConstants {
          required: self.resolved.push_constant_size(),
          available: limits.max_push_constants_size,
        }
        .into(),
      );
    }

    if self.stage == ShaderStage::Vertex
      && self.resolved.attribute_location_count() > limits.max_vertex_input_attributes
    {
      return Err(
        ResourceError::VertexAttributes {
          required: self.resolved.attribute_location_count(),
          available: limits.max_vertex_input_attributes,
        }
        .into(),
      );
    }

    Ok(())
  }

  fn reflection(&self) -> StageReflection {
    let stages = StageFlags::from(self.stage);
    let mut reflection = StageReflection::new(self.stage);

    for &index in &self.used_bindings {
      let (Some(decl), Some((set, binding))) = (self.layout.binding_decl(index), self.resolved.binding(index)) else {
        continue;
      };

      reflection.descriptors.insert(DescriptorEntry {
        set,
        binding,
        name: decl.name.clone(),
        kind: decl.kind,
        ty: decl.ty.clone(),
        count: decl.count,
        access: decl.access,
        dynamically_indexed: self.dynamic_bindings.contains(&index),
        stages,
      });
    }

    if self.push_block.is_some() {
      reflection.push_constants = Some(PushConstantRange {
        stages,
        offset: 0,
        size: self.resolved.push_constant_size(),
      });
    }

    if self.stage == ShaderStage::Vertex {
      reflection.vertex_input.buffers = self
        .layout
        .vertex_buffers
        .iter()
        .enumerate()
        .map(|(i, &rate)| VertexBufferLayout {
          binding: i as u32,
          stride: self.resolved.stride(i as u32).unwrap_or(0),
          rate,
        })
        .collect();

      reflection.vertex_input.attributes = self
        .layout
        .attributes
        .iter()
        .enumerate()
        .map(|(i, attr)| VertexAttributeLayout {
          location: self.resolved.attribute_location(i as u32).unwrap_or(0),
          binding: attr.buffer,
          format: attr.format,
          offset: self.resolved.attribute_offset(i as u32).unwrap_or(0),
        })
        .collect();
    }

    if let StageConfig::Compute { local_size } = self.config {
      reflection.local_size = Some(local_size);
    }

    reflection.varyings_read = self.varyings_read.iter().copied().collect();
    reflection.varyings_written = self.varyings_written.iter().copied().collect();
    reflection
  }
}

/// Whether the module type of `ty` depends on the memory layout.
fn needs_layout(ty: &Type) -> bool {
  match ty {
    Type::Scalar(ScalarType::Bool) | Type::Vector(ScalarType::Bool, _) => true,
    Type::Array(..) | Type::RuntimeArray(_) | Type::Struct(_) => true,
    _ => false,
  }
}

#[cfg(test)]
mod test {
  use std::rc::Rc;

  use super::*;
  use crate::{
    binding::Access,
    config::DeviceLimits,
    error::ResourceError,
    lit,
    scope::Scope,
    stage::StageBuilder,
    swizzle::HasX as _,
    types::{StructField, StructType, ToType, V4},
  };

  fn compile(stage: &Stage, layout: &PipelineLayout) -> Result<Module, CompileError> {
    stage.compile(layout, &CompileOptions::default())
  }

  #[test]
  fn recording_errors_come_first() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_vertex_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.if_(lit!(true));
      })
    });

    let err = compile(&stage, &layout).unwrap_err();
    assert_eq!(err, UsageError::UnclosedRegion { opener: "if_" }.into());
  }

  #[test]
  fn explicit_layout_types() {
    let layout = PipelineLayout::new();
    let options = CompileOptions::default();
    let mut lowerer = Lowerer::new(StageConfig::Vertex, &layout, layout.resolve().unwrap(), &options);

    let st = Type::Struct(Rc::new(StructType {
      name: "Light".to_owned(),
      fields: vec![
        StructField::new("on", bool::ty()),
        StructField::new("color", V4::<f32>::ty()),
      ],
    }));

    let logical = lowerer.ir_type(&st, MemoryLayout::Logical);
    let std140 = lowerer.ir_type(&st, MemoryLayout::Std140);
    assert_ne!(logical, std140);

    match &lowerer.types[std140] {
      IrType::Struct(st) => {
        assert_eq!(st.members[0].offset, Some(0));
        assert_eq!(st.members[1].offset, Some(16));
        assert_eq!(
          lowerer.types[st.members[0].ty],
          IrType::Int {
            width: 32,
            signed: false
          }
        );
      }
      ty => panic!("unexpected type {:?}", ty),
    }

    // vectors do not depend on the layout
    let v = lowerer.ir_type(&V4::<f32>::ty(), MemoryLayout::Logical);
    assert_eq!(lowerer.ir_type(&V4::<f32>::ty(), MemoryLayout::Std430), v);
  }

  #[test]
  fn shared_memory_budget() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_compute_shader([64, 1, 1], |mut s, _| {
      let _tile = s.shared_array::<f32>(1024);
      s.main_fun(|_: &mut Scope<()>| {})
    });

    let limits = DeviceLimits {
      max_compute_shared_memory_size: 1024,
      ..DeviceLimits::default()
    };
    let err = stage
      .compile(&layout, &CompileOptions::default().limits(limits))
      .unwrap_err();

    assert_eq!(
      err,
      ResourceError::SharedMemory {
        required: 4096,
        available: 1024
      }
      .into()
    );
  }

  #[test]
  fn workgroup_size_limit() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_compute_shader([16, 16, 1], |s, _| s.main_fun(|_: &mut Scope<()>| {}));

    let err = compile(&stage, &layout).unwrap_err();
    assert!(matches!(
      err,
      CompileError::ResourceExhausted(ResourceError::WorkgroupSize { .. })
    ));
  }

  #[test]
  fn shared_memory_outside_compute() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_fragment_shader(|mut s, _, _| {
      let _x = s.shared::<f32>();
      s.main_fun(|_: &mut Scope<()>| {})
    });

    assert!(matches!(
      compile(&stage, &layout),
      Err(CompileError::Usage(UsageError::InvalidStage { .. }))
    ));
  }

  #[test]
  fn reflection_lists_referenced_bindings() {
    let mut layout = PipelineLayout::new();
    let used = layout.storage_array_with::<u32>(0, Access::ReadOnly);
    let _unused = layout.storage_array::<u32>(0);
    let out = layout.storage_array::<u32>(1);

    let stage = StageBuilder::new_compute_shader([8, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let i = input.global_invocation_id.x();
        s.set(out.at(&i), used.at(&i));
      })
    });

    let module = compile(&stage, &layout).unwrap();
    let descriptors = &module.reflection().descriptors;
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors.get(0, 0).map(|e| e.access), Some(Access::ReadOnly));
    assert!(descriptors.get(0, 1).is_none());
    assert!(descriptors.get(1, 0).is_some());
    assert_eq!(module.reflection().local_size, Some([8, 1, 1]));
  }

  #[test]
  fn fragment_modes() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_fragment_shader(|s, _, out| {
      s.main_fun(|s: &mut Scope<()>| {
        s.set(&out.frag_depth, 0.5);
      })
    });

    let module = stage
      .compile(&layout, &CompileOptions::default().early_fragment_tests(true))
      .unwrap();
    let modes: Vec<_> = module.execution_modes.iter().map(|m| m.mode).collect();
    assert_eq!(
      modes,
      vec![
        spirv::ExecutionMode::OriginUpperLeft,
        spirv::ExecutionMode::DepthReplacing,
        spirv::ExecutionMode::EarlyFragmentTests
      ]
    );
  }
}
