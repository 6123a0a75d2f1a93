//! Built-in outputs of the shader stages.
//!
//! User-defined outputs (varyings, color outputs) are declared in a
//! [`PipelineLayout`](crate::layout::PipelineLayout).

use crate::{
  builtin::{BuiltIn, FragmentBuiltIn, GeometryBuiltIn, TessCtrlBuiltIn, TessEvalBuiltIn, VertexBuiltIn},
  input::builtin_expr,
  types::V4,
  var::Var,
};

fn builtin_var<T>(b: BuiltIn) -> Var<T> {
  Var(builtin_expr(b))
}

/// Vertex shader environment outputs.
#[derive(Debug)]
pub struct VertexShaderOutputs {
  /// 4D position of the vertex.
  pub position: Var<V4<f32>>,

  /// Point size of the vertex.
  pub point_size: Var<f32>,
}

impl VertexShaderOutputs {
  pub(crate) fn new() -> Self {
    Self {
      position: builtin_var(BuiltIn::Vertex(VertexBuiltIn::Position)),
      point_size: builtin_var(BuiltIn::Vertex(VertexBuiltIn::PointSize)),
    }
  }
}

/// Tessellation control shader outputs.
///
/// Per-vertex outputs are varyings; see [`Varying::output_vertex`](crate::interface::Varying::output_vertex).
#[derive(Debug)]
pub struct TessCtrlShaderOutputs {
  /// Outer tessellation levels.
  pub tess_level_outer: Var<[f32; 4]>,

  /// Inner tessellation levels.
  pub tess_level_inner: Var<[f32; 2]>,
}

impl TessCtrlShaderOutputs {
  pub(crate) fn new() -> Self {
    Self {
      tess_level_outer: builtin_var(BuiltIn::TessCtrl(TessCtrlBuiltIn::TessLevelOuter)),
      tess_level_inner: builtin_var(BuiltIn::TessCtrl(TessCtrlBuiltIn::TessLevelInner)),
    }
  }
}

/// Tessellation evaluation shader outputs.
#[derive(Debug)]
pub struct TessEvalShaderOutputs {
  /// 4D position of the vertex.
  pub position: Var<V4<f32>>,

  /// Point size of the vertex.
  pub point_size: Var<f32>,
}

impl TessEvalShaderOutputs {
  pub(crate) fn new() -> Self {
    Self {
      position: builtin_var(BuiltIn::TessEval(TessEvalBuiltIn::Position)),
      point_size: builtin_var(BuiltIn::TessEval(TessEvalBuiltIn::PointSize)),
    }
  }
}

/// Geometry shader outputs.
///
/// Outputs are captured by [`Scope::emit_vertex`](crate::scope::Scope::emit_vertex).
#[derive(Debug)]
pub struct GeometryShaderOutputs {
  /// 4D position of the next vertex to emit.
  pub position: Var<V4<f32>>,

  /// Point size of the next vertex to emit.
  pub point_size: Var<f32>,

  /// Primitive ID to write to for the next vertex.
  pub primitive_id: Var<i32>,

  /// Layer to write to for the next vertex.
  pub layer: Var<i32>,

  /// Viewport index to write to for the next vertex.
  pub viewport_index: Var<i32>,
}

impl GeometryShaderOutputs {
  pub(crate) fn new() -> Self {
    Self {
      position: builtin_var(BuiltIn::Geometry(GeometryBuiltIn::Position)),
      point_size: builtin_var(BuiltIn::Geometry(GeometryBuiltIn::PointSize)),
      primitive_id: builtin_var(BuiltIn::Geometry(GeometryBuiltIn::PrimitiveId)),
      layer: builtin_var(BuiltIn::Geometry(GeometryBuiltIn::Layer)),
      viewport_index: builtin_var(BuiltIn::Geometry(GeometryBuiltIn::ViewportIndex)),
    }
  }
}

/// Fragment shader outputs.
///
/// Colors are written to the color outputs of the [`PipelineLayout`](crate::layout::PipelineLayout).
#[derive(Debug)]
pub struct FragmentShaderOutputs {
  /// Depth of the fragment; writing it replaces the interpolated depth.
  pub frag_depth: Var<f32>,
}

impl FragmentShaderOutputs {
  pub(crate) fn new() -> Self {
    Self {
      frag_depth: builtin_var(BuiltIn::Fragment(FragmentBuiltIn::FragDepth)),
    }
  }
}
