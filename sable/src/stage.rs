use std::fmt;

use crate::{
  array::{WArray, WArray2, WArray3},
  config::CompileOptions,
  error::{CompileError, UsageError},
  expr::{ErasedExpr, Expr},
  fun::{DynFunHandle, ErasedFun, ErasedFunHandle, FunHandle, FunctionBody, FunctionBuilder, ReturnType, ToFun},
  input::{
    ComputeShaderInputs, FragmentShaderInputs, GeometryShaderInputs, TessCtrlShaderInputs, TessEvalShaderInputs,
    VertexShaderInputs,
  },
  ir::Module,
  layout::PipelineLayout,
  lower,
  output::{FragmentShaderOutputs, GeometryShaderOutputs, TessCtrlShaderOutputs, TessEvalShaderOutputs, VertexShaderOutputs},
  scope::ScopedHandle,
  types::{ToType, Type},
  var::Var,
};

/// Kind of shader stage.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ShaderStage {
  Vertex,
  TessControl,
  TessEval,
  Geometry,
  Fragment,
  Compute,
}

impl ShaderStage {
  pub fn execution_model(self) -> spirv::ExecutionModel {
    match self {
      ShaderStage::Vertex => spirv::ExecutionModel::Vertex,
      ShaderStage::TessControl => spirv::ExecutionModel::TessellationControl,
      ShaderStage::TessEval => spirv::ExecutionModel::TessellationEvaluation,
      ShaderStage::Geometry => spirv::ExecutionModel::Geometry,
      ShaderStage::Fragment => spirv::ExecutionModel::Fragment,
      ShaderStage::Compute => spirv::ExecutionModel::GLCompute,
    }
  }

  /// Whether the inputs of the stage are per-vertex arrays.
  pub fn has_arrayed_inputs(self) -> bool {
    matches!(
      self,
      ShaderStage::TessControl | ShaderStage::TessEval | ShaderStage::Geometry
    )
  }
}

impl fmt::Display for ShaderStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ShaderStage::Vertex => "vertex",
      ShaderStage::TessControl => "tessellation control",
      ShaderStage::TessEval => "tessellation evaluation",
      ShaderStage::Geometry => "geometry",
      ShaderStage::Fragment => "fragment",
      ShaderStage::Compute => "compute",
    };

    f.write_str(name)
  }
}

/// Configuration of a tessellation control shader.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TessControlConfig {
  /// Number of vertices of the output patch.
  pub output_vertices: u32,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TessPrimitive {
  Triangles,
  Quads,
  Isolines,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TessSpacing {
  Equal,
  FractionalEven,
  FractionalOdd,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Winding {
  Clockwise,
  CounterClockwise,
}

/// Configuration of a tessellation evaluation shader.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TessEvalConfig {
  pub primitive: TessPrimitive,
  pub spacing: TessSpacing,
  pub winding: Winding,
  pub point_mode: bool,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GeometryInput {
  Points,
  Lines,
  LinesAdjacency,
  Triangles,
  TrianglesAdjacency,
}

impl GeometryInput {
  /// Number of vertices of an input primitive.
  pub fn vertices(self) -> u32 {
    match self {
      GeometryInput::Points => 1,
      GeometryInput::Lines => 2,
      GeometryInput::LinesAdjacency => 4,
      GeometryInput::Triangles => 3,
      GeometryInput::TrianglesAdjacency => 6,
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GeometryOutput {
  Points,
  LineStrip,
  TriangleStrip,
}

/// Configuration of a geometry shader.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct GeometryConfig {
  pub input: GeometryInput,
  pub output: GeometryOutput,
  pub max_vertices: u32,
  pub invocations: u32,
}

/// Stage-specific parameters, turned into execution modes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StageConfig {
  Vertex,
  TessControl(TessControlConfig),
  TessEval(TessEvalConfig),
  Geometry(GeometryConfig),
  Fragment,
  Compute { local_size: [u32; 3] },
}

impl StageConfig {
  pub fn stage(&self) -> ShaderStage {
    match self {
      StageConfig::Vertex => ShaderStage::Vertex,
      StageConfig::TessControl(_) => ShaderStage::TessControl,
      StageConfig::TessEval(_) => ShaderStage::TessEval,
      StageConfig::Geometry(_) => ShaderStage::Geometry,
      StageConfig::Fragment => ShaderStage::Fragment,
      StageConfig::Compute { .. } => ShaderStage::Compute,
    }
  }
}

/// Top-level declaration of a shader stage.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ShaderDecl {
  /// The entry point.
  Main(ErasedFun),
  FunDef {
    handle: u16,
    name: String,
    fun: ErasedFun,
  },
  Const(u16, Type, ErasedExpr),
  /// Workgroup-shared variable.
  Shared(u16, Type),
}

/// A fully built shader stage as represented in Rust, obtained by adding the `main` function to a [`StageBuilder`].
///
/// A stage is compiled into a [`Module`] against the [`PipelineLayout`] declaring the resources it uses.
#[derive(Debug)]
pub struct Stage {
  pub(crate) config: StageConfig,
  pub(crate) decls: Vec<ShaderDecl>,
  pub(crate) errors: Vec<UsageError>,
}

impl Stage {
  pub fn stage(&self) -> ShaderStage {
    self.config.stage()
  }

  pub fn config(&self) -> &StageConfig {
    &self.config
  }

  /// Usage errors recorded while building the stage.
  pub fn errors(&self) -> &[UsageError] {
    &self.errors
  }

  /// Lower the stage into a module.
  ///
  /// # Return
  ///
  /// The lowered [`Module`], ready to be encoded with [`Module::assemble`], or the first error found: usage errors
  /// recorded while building the stage come first, then errors found while lowering and checking device limits.
  pub fn compile(&self, layout: &PipelineLayout, options: &CompileOptions) -> Result<Module, CompileError> {
    lower::lower_stage(self, layout, options)
  }
}

/// A shader stage builder.
///
/// This opaque type is the representation of a shader stage in Rust. It contains constants, workgroup-shared
/// variables and functions declarations. Such a type is used to build a shader stage and is fully built when the
/// `main` function is present in its code. See [`StageBuilder::main_fun`] for further details.
///
/// Resources (buffers, images, vertex attributes, varyings) are not declared here but in a [`PipelineLayout`]; the
/// tokens it returns are captured by the closures building the stage.
#[derive(Debug)]
pub struct StageBuilder {
  config: StageConfig,
  decls: Vec<ShaderDecl>,
  next_fun_handle: u16,
  next_global_handle: u16,
  next_shared_handle: u16,
  /// Functions declared with [`StageBuilder::function`] and not ended yet.
  open_functions: Vec<(u16, String)>,
  errors: Vec<UsageError>,
}

impl StageBuilder {
  fn new(config: StageConfig) -> Self {
    Self {
      config,
      decls: Vec::new(),
      next_fun_handle: 0,
      next_global_handle: 0,
      next_shared_handle: 0,
      open_functions: Vec::new(),
      errors: Vec::new(),
    }
  }

  /// Create a new _vertex shader_.
  ///
  /// The closure gets the builder, the vertex inputs (built-ins such as the vertex index) and the vertex outputs
  /// (built-ins such as the position). Vertex attributes come from the [`PipelineLayout`].
  ///
  /// # Return
  ///
  /// This method returns the fully built [`Stage`], which cannot be mutated anymore once it has been built.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Float32, PipelineLayout, Scope, StageBuilder, V3, vec4, InputRate};
  ///
  /// let mut layout = PipelineLayout::new();
  /// let vertices = layout.vertex_buffer(InputRate::Vertex);
  /// let position = layout.vertex_attribute::<(Float32, Float32, Float32)>(&vertices);
  ///
  /// let vertex_shader = StageBuilder::new_vertex_shader(|mut s, _, output| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     s.set(&output.position, vec4!(position.to_expr(), 1.));
  ///   })
  /// });
  /// ```
  pub fn new_vertex_shader(
    f: impl FnOnce(Self, VertexShaderInputs, VertexShaderOutputs) -> Stage,
  ) -> Stage {
    f(
      Self::new(StageConfig::Vertex),
      VertexShaderInputs::new(),
      VertexShaderOutputs::new(),
    )
  }

  /// Create a new _tessellation control shader_.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Scope, StageBuilder, TessControlConfig};
  ///
  /// let tess_ctrl_shader = StageBuilder::new_tess_ctrl_shader(TessControlConfig { output_vertices: 3 }, |mut s, _, patch| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     s.set(patch.tess_level_outer.at(0), 1.);
  ///   })
  /// });
  /// ```
  pub fn new_tess_ctrl_shader(
    config: TessControlConfig,
    f: impl FnOnce(Self, TessCtrlShaderInputs, TessCtrlShaderOutputs) -> Stage,
  ) -> Stage {
    f(
      Self::new(StageConfig::TessControl(config)),
      TessCtrlShaderInputs::new(),
      TessCtrlShaderOutputs::new(),
    )
  }

  /// Create a new _tessellation evaluation shader_.
  pub fn new_tess_eval_shader(
    config: TessEvalConfig,
    f: impl FnOnce(Self, TessEvalShaderInputs, TessEvalShaderOutputs) -> Stage,
  ) -> Stage {
    f(
      Self::new(StageConfig::TessEval(config)),
      TessEvalShaderInputs::new(),
      TessEvalShaderOutputs::new(),
    )
  }

  /// Create a new _geometry shader_.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{GeometryConfig, GeometryInput, GeometryOutput, LoopScope, Scope, StageBuilder};
  ///
  /// let config = GeometryConfig {
  ///   input: GeometryInput::Triangles,
  ///   output: GeometryOutput::TriangleStrip,
  ///   max_vertices: 3,
  ///   invocations: 1,
  /// };
  ///
  /// let geo_shader = StageBuilder::new_geometry_shader(config, |mut s, _, _| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     s.for_range(0, 3, |s: &mut LoopScope<()>, _| {
  ///       s.emit_vertex();
  ///     });
  ///     s.end_primitive();
  ///   })
  /// });
  /// ```
  pub fn new_geometry_shader(
    config: GeometryConfig,
    f: impl FnOnce(Self, GeometryShaderInputs, GeometryShaderOutputs) -> Stage,
  ) -> Stage {
    f(
      Self::new(StageConfig::Geometry(config)),
      GeometryShaderInputs::new(),
      GeometryShaderOutputs::new(),
    )
  }

  /// Create a new _fragment shader_.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Geometry as _, PipelineLayout, Scope, StageBuilder, V4};
  ///
  /// let mut layout = PipelineLayout::new();
  /// let color = layout.color_output::<V4<f32>>();
  ///
  /// let frag_shader = StageBuilder::new_fragment_shader(|mut s, fragment, _| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     s.set(&*color, fragment.frag_coord.normalize());
  ///   })
  /// });
  /// ```
  pub fn new_fragment_shader(
    f: impl FnOnce(Self, FragmentShaderInputs, FragmentShaderOutputs) -> Stage,
  ) -> Stage {
    f(
      Self::new(StageConfig::Fragment),
      FragmentShaderInputs::new(),
      FragmentShaderOutputs::new(),
    )
  }

  /// Create a new _compute shader_ running workgroups of `local_size` invocations.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{HasX as _, PipelineLayout, Scope, StageBuilder};
  ///
  /// let mut layout = PipelineLayout::new();
  /// let data = layout.storage_array::<f32>(0);
  ///
  /// let compute_shader = StageBuilder::new_compute_shader([64, 1, 1], |mut s, input| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     let i = input.global_invocation_id.x();
  ///     s.set(data.at(&i), data.at(&i) * 2.);
  ///   })
  /// });
  /// ```
  pub fn new_compute_shader(local_size: [u32; 3], f: impl FnOnce(Self, ComputeShaderInputs) -> Stage) -> Stage {
    f(
      Self::new(StageConfig::Compute { local_size }),
      ComputeShaderInputs::new(),
    )
  }

  /// Kind of stage being built.
  pub fn stage(&self) -> ShaderStage {
    self.config.stage()
  }

  /// Create a new function in the shader and get its handle for future use.
  ///
  /// This method requires to pass a closure encoding the argument(s) and return type of the function to create. The
  /// closure’s body encodes the body of the function to create. The number of arguments will directly impact the
  /// number of arguments the created function will have. The return type can be [`()`](unit) if the function doesn’t
  /// return anything or [`Expr<T>`] if it does return something.
  ///
  /// The first argument of the closure is a mutable reference on a [`Scope`](crate::scope::Scope). Its type
  /// parameter must be set to the return type. As in vanilla Rust, the last expression in a function is assumed as
  /// return value. Early returns are recorded with [`Scope::leave`](crate::scope::Scope::leave).
  ///
  /// ```
  /// # use sable::StageBuilder;
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// use sable::{Expr, Scope};
  ///
  /// let f = s.fun(|s: &mut Scope<Expr<f32>>, a: Expr<f32>| a + 1.);
  /// # s.main_fun(|s: &mut Scope<()>| {})
  /// # });
  /// ```
  ///
  /// # Caveats
  ///
  /// You can still use the `return` keyword from Rust, but returning with `return` cannot be captured by the EDSL:
  /// inside a conditional or looping closure, it only leaves the Rust closure.
  ///
  /// # Return
  ///
  /// This method returns a _function handle_, [`FunHandle<R, A>`], where `R` is the return type and `A` the argument
  /// list of the function.
  pub fn fun<F, R, A>(&mut self, f: F) -> FunHandle<R, A>
  where
    F: ToFun<R, A>,
  {
    let fundef = f.build_fn();
    let handle = self.next_fun_handle;
    self.next_fun_handle += 1;

    self.decls.push(ShaderDecl::FunDef {
      handle,
      name: format!("fun{}", handle),
      fun: fundef.erased,
    });

    FunHandle::new(ErasedFunHandle::UserDefined(handle))
  }

  /// Declare a function which signature is built at runtime.
  ///
  /// Parameters are added with [`FunctionBuilder::par`], the body is opened with [`FunctionBuilder::begin`] and the
  /// function is closed with [`StageBuilder::end_function`]. `R` is the return type, `()` for functions returning
  /// nothing. Returns are recorded with [`Scope::leave`](crate::scope::Scope::leave) and
  /// [`Scope::abort`](crate::scope::Scope::abort) and checked against `R` when the stage is compiled.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Scope, StageBuilder, lit};
  ///
  /// StageBuilder::new_vertex_shader(|mut s, _, _| {
  ///   let mut f = s.function::<f32>("half");
  ///   let x = f.par::<f32>();
  ///   let mut body = f.begin();
  ///   body.leave(x * 0.5);
  ///   let half = s.end_function(body);
  ///
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     let y = s.var(half.call::<f32>(vec![lit!(3.0f32).erase()]));
  ///   })
  /// });
  /// ```
  pub fn function<R>(&mut self, name: impl Into<String>) -> FunctionBuilder
  where
    R: ToType,
  {
    let name = name.into();
    let handle = self.next_fun_handle;
    self.next_fun_handle += 1;

    self.open_functions.push((handle, name.clone()));
    FunctionBuilder::new(handle, name, R::ty())
  }

  /// Close a function opened with [`StageBuilder::function`].
  pub fn end_function(&mut self, body: FunctionBody) -> DynFunHandle {
    let FunctionBody { decl, scope } = body;

    self.open_functions.retain(|(handle, _)| *handle != decl.handle);

    let fun = ErasedFun::new(decl.args.clone(), decl.ret_ty.clone(), scope.finish(), None);
    self.decls.push(ShaderDecl::FunDef {
      handle: decl.handle,
      name: decl.name.clone(),
      fun,
    });

    DynFunHandle {
      erased: ErasedFunHandle::UserDefined(decl.handle),
      name: decl.name,
      args: decl.args,
      ret_ty: decl.ret_ty,
    }
  }

  /// Declare the `main` function of the shader stage.
  ///
  /// This method is very similar to [`StageBuilder::fun`] in the sense it declares a function. However, it declares
  /// the special `main` entry-point of a shader stage, which doesn’t have any argument and returns nothing, and is the
  /// only way to finalize the building of a [`Stage`].
  ///
  /// # Return
  ///
  /// The fully built [`Stage`], which cannot be altered anymore.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Scope, StageBuilder};
  ///
  /// let shader = StageBuilder::new_vertex_shader(|s, _, _| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     // …
  ///   })
  /// });
  /// ```
  pub fn main_fun<F, R>(mut self, f: F) -> Stage
  where
    F: ToFun<R, ()>,
    R: ReturnType,
  {
    let fundef = f.build_fn();
    self.decls.push(ShaderDecl::Main(fundef.erased));

    for (_, name) in self.open_functions.drain(..) {
      log::error!("function `{}` is never ended", name);
      self.errors.push(UsageError::UnclosedRegion { opener: "function" });
    }

    Stage {
      config: self.config,
      decls: self.decls,
      errors: self.errors,
    }
  }

  /// Declare a new constant, shared between all functions in the generated shader code.
  ///
  /// The expression must be built out of literals; it is folded when the stage is compiled.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Scope, StageBuilder, vec3};
  ///
  /// StageBuilder::new_vertex_shader(|mut s, _, _| {
  ///   let illum_coefs = s.constant(vec3!(0.2f32, 0.5, 0.3));
  ///
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     let c = s.var(illum_coefs * 2.);
  ///   })
  /// });
  /// ```
  pub fn constant<T>(&mut self, expr: impl Into<Expr<T>>) -> Expr<T>
  where
    T: ToType,
  {
    let handle = self.next_global_handle;
    self.next_global_handle += 1;

    self.decls.push(ShaderDecl::Const(handle, T::ty(), expr.into().erased));

    Expr::from_erased(ErasedExpr::var(T::ty(), ScopedHandle::global(handle)))
  }

  fn declare_shared(&mut self, ty: Type) -> ErasedExpr {
    let handle = self.next_shared_handle;
    self.next_shared_handle += 1;

    self.decls.push(ShaderDecl::Shared(handle, ty.clone()));
    ErasedExpr::var(ty, ScopedHandle::shared(handle))
  }

  fn check_len(&mut self, name: &str, len: u32) {
    if len == 0 {
      let error = UsageError::NonPositiveArraySize { name: name.to_owned() };
      log::error!("{}", error);
      self.errors.push(error);
    }
  }

  /// Declare a workgroup-shared variable.
  ///
  /// Shared variables live for the whole workgroup and are only available in compute shaders.
  pub fn shared<T>(&mut self) -> Var<T>
  where
    T: ToType,
  {
    Var::from_erased(self.declare_shared(T::ty()))
  }

  /// Declare a workgroup-shared array of `len` elements.
  pub fn shared_array<T>(&mut self, len: u32) -> WArray<T>
  where
    T: ToType,
  {
    self.check_len("shared array", len);
    WArray::new(self.declare_shared(Type::Array(Box::new(T::ty()), len)), len)
  }

  /// Declare a workgroup-shared 2D array of `width × height` elements, stored row by row.
  pub fn shared_array2<T>(&mut self, width: u32, height: u32) -> WArray2<T>
  where
    T: ToType,
  {
    let len = width.saturating_mul(height);
    self.check_len("shared 2D array", len);
    WArray2::new(self.declare_shared(Type::Array(Box::new(T::ty()), len)), [width, height])
  }

  /// Declare a workgroup-shared 3D array of `width × height × depth` elements, stored slice by slice.
  pub fn shared_array3<T>(&mut self, width: u32, height: u32, depth: u32) -> WArray3<T>
  where
    T: ToType,
  {
    let len = width.saturating_mul(height).saturating_mul(depth);
    self.check_len("shared 3D array", len);
    WArray3::new(
      self.declare_shared(Type::Array(Box::new(T::ty()), len)),
      [width, height, depth],
    )
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{lit, scope::Scope};

  #[test]
  fn declarations_in_order() {
    let stage = StageBuilder::new_compute_shader([8, 1, 1], |mut s, _| {
      let k = s.constant(lit!(2));
      let tile = s.shared_array::<f32>(8);
      let double = s.fun(|_: &mut Scope<Expr<i32>>, a: Expr<i32>| a * 2);

      s.main_fun(|s: &mut Scope<()>| {
        let x = s.var(double.call(k));
        s.set(tile.at(0), x.cast::<f32>());
      })
    });

    assert_eq!(stage.stage(), ShaderStage::Compute);
    assert!(stage.errors().is_empty());
    assert!(matches!(
      stage.decls[..],
      [
        ShaderDecl::Const(0, _, _),
        ShaderDecl::Shared(0, _),
        ShaderDecl::FunDef { handle: 0, .. },
        ShaderDecl::Main(_)
      ]
    ));
  }

  #[test]
  fn unended_function() {
    let stage = StageBuilder::new_vertex_shader(|mut s, _, _| {
      let f = s.function::<()>("dangling");
      let _body = f.begin();

      s.main_fun(|_: &mut Scope<()>| ())
    });

    assert_eq!(stage.errors(), &[UsageError::UnclosedRegion { opener: "function" }]);
  }

  #[test]
  fn empty_shared_array() {
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |mut s, _| {
      let _ = s.shared_array2::<u32>(4, 0);
      s.main_fun(|_: &mut Scope<()>| ())
    });

    assert_eq!(
      stage.errors(),
      &[UsageError::NonPositiveArraySize {
        name: "shared 2D array".to_owned()
      }]
    );
  }

  #[test]
  fn dynamic_function() {
    let stage = StageBuilder::new_vertex_shader(|mut s, _, _| {
      let mut f = s.function::<i32>("inc");
      let a = f.par::<i32>();
      let mut body = f.begin();
      body.leave(a + 1);
      let inc = s.end_function(body);

      assert_eq!(inc.name(), "inc");
      assert_eq!(inc.ret_ty(), &i32::ty());

      s.main_fun(|_: &mut Scope<()>| ())
    });

    match &stage.decls[0] {
      ShaderDecl::FunDef { name, fun, .. } => {
        assert_eq!(name, "inc");
        assert_eq!(fun.args, vec![i32::ty()]);
        assert_eq!(fun.tail, None);
      }
      decl => panic!("unexpected declaration {:?}", decl),
    }
  }
}
