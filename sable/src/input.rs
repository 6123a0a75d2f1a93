//! Built-in inputs of the shader stages.
//!
//! User-defined inputs (vertex attributes, varyings) are declared in a [`PipelineLayout`](crate::layout::PipelineLayout).

use crate::{
  builtin::{BuiltIn, ComputeBuiltIn, FragmentBuiltIn, GeometryBuiltIn, TessCtrlBuiltIn, TessEvalBuiltIn, VertexBuiltIn},
  expr::{ErasedExpr, Expr},
  scope::ScopedHandle,
  types::{V2, V3, V4},
};

pub(crate) fn builtin_expr<T>(b: BuiltIn) -> Expr<T> {
  Expr::from_erased(ErasedExpr::var(b.ty(), ScopedHandle::builtin(b)))
}

/// Vertex shader environment inputs.
#[derive(Debug)]
pub struct VertexShaderInputs {
  /// Index of the current vertex.
  pub vertex_index: Expr<i32>,

  /// Index of the current instance.
  pub instance_index: Expr<i32>,

  /// Base vertex offset.
  pub base_vertex: Expr<i32>,

  /// Base instance offset.
  pub base_instance: Expr<i32>,
}

impl VertexShaderInputs {
  pub(crate) fn new() -> Self {
    Self {
      vertex_index: builtin_expr(BuiltIn::Vertex(VertexBuiltIn::VertexIndex)),
      instance_index: builtin_expr(BuiltIn::Vertex(VertexBuiltIn::InstanceIndex)),
      base_vertex: builtin_expr(BuiltIn::Vertex(VertexBuiltIn::BaseVertex)),
      base_instance: builtin_expr(BuiltIn::Vertex(VertexBuiltIn::BaseInstance)),
    }
  }
}

/// Tessellation control shader inputs.
#[derive(Debug)]
pub struct TessCtrlShaderInputs {
  /// Number of vertices in the input patch.
  pub patch_vertices_in: Expr<i32>,

  /// Index of the current patch in the series of patches being processed for the current draw command.
  pub primitive_id: Expr<i32>,

  /// Index of the output patch vertex assigned to the shader invocation.
  pub invocation_id: Expr<i32>,
}

impl TessCtrlShaderInputs {
  pub(crate) fn new() -> Self {
    Self {
      patch_vertices_in: builtin_expr(BuiltIn::TessCtrl(TessCtrlBuiltIn::PatchVertices)),
      primitive_id: builtin_expr(BuiltIn::TessCtrl(TessCtrlBuiltIn::PrimitiveId)),
      invocation_id: builtin_expr(BuiltIn::TessCtrl(TessCtrlBuiltIn::InvocationId)),
    }
  }
}

/// Tessellation evaluation shader inputs.
#[derive(Debug)]
pub struct TessEvalShaderInputs {
  /// Location of the vertex in the abstract patch.
  pub tess_coord: Expr<V3<f32>>,

  /// Number of vertices in the input patch.
  pub patch_vertices_in: Expr<i32>,

  /// Index of the current patch.
  pub primitive_id: Expr<i32>,

  /// Outer tessellation levels written by the tessellation control shader.
  pub tess_level_outer: Expr<[f32; 4]>,

  /// Inner tessellation levels written by the tessellation control shader.
  pub tess_level_inner: Expr<[f32; 2]>,
}

impl TessEvalShaderInputs {
  pub(crate) fn new() -> Self {
    Self {
      tess_coord: builtin_expr(BuiltIn::TessEval(TessEvalBuiltIn::TessCoord)),
      patch_vertices_in: builtin_expr(BuiltIn::TessEval(TessEvalBuiltIn::PatchVertices)),
      primitive_id: builtin_expr(BuiltIn::TessEval(TessEvalBuiltIn::PrimitiveId)),
      tess_level_outer: builtin_expr(BuiltIn::TessEval(TessEvalBuiltIn::TessLevelOuter)),
      tess_level_inner: builtin_expr(BuiltIn::TessEval(TessEvalBuiltIn::TessLevelInner)),
    }
  }
}

/// Geometry shader inputs.
#[derive(Debug)]
pub struct GeometryShaderInputs {
  /// Index of the current primitive.
  pub primitive_id_in: Expr<i32>,

  /// Instance number of the geometry shader invocation.
  pub invocation_id: Expr<i32>,
}

impl GeometryShaderInputs {
  pub(crate) fn new() -> Self {
    Self {
      primitive_id_in: builtin_expr(BuiltIn::Geometry(GeometryBuiltIn::PrimitiveIdIn)),
      invocation_id: builtin_expr(BuiltIn::Geometry(GeometryBuiltIn::InvocationId)),
    }
  }
}

/// Fragment shader inputs.
///
/// This type contains everything you have access to when writing a fragment shader.
#[derive(Debug)]
pub struct FragmentShaderInputs {
  /// Fragment coordinate in the framebuffer.
  pub frag_coord: Expr<V4<f32>>,

  /// Whether the fragment is front-facing.
  pub front_facing: Expr<bool>,

  /// Location within a point primitive.
  pub point_coord: Expr<V2<f32>>,

  /// Sample ID within the framebuffer; using it enables sample-rate shading.
  pub sample_id: Expr<i32>,

  /// Location of the sample within the pixel.
  pub sample_position: Expr<V2<f32>>,

  /// Index of the current primitive.
  pub primitive_id: Expr<i32>,

  /// Layer the fragment will be written to.
  pub layer: Expr<i32>,

  /// Whether the invocation is a helper invocation, only computing derivatives.
  pub helper_invocation: Expr<bool>,
}

impl FragmentShaderInputs {
  pub(crate) fn new() -> Self {
    Self {
      frag_coord: builtin_expr(BuiltIn::Fragment(FragmentBuiltIn::FragCoord)),
      front_facing: builtin_expr(BuiltIn::Fragment(FragmentBuiltIn::FrontFacing)),
      point_coord: builtin_expr(BuiltIn::Fragment(FragmentBuiltIn::PointCoord)),
      sample_id: builtin_expr(BuiltIn::Fragment(FragmentBuiltIn::SampleId)),
      sample_position: builtin_expr(BuiltIn::Fragment(FragmentBuiltIn::SamplePosition)),
      primitive_id: builtin_expr(BuiltIn::Fragment(FragmentBuiltIn::PrimitiveId)),
      layer: builtin_expr(BuiltIn::Fragment(FragmentBuiltIn::Layer)),
      helper_invocation: builtin_expr(BuiltIn::Fragment(FragmentBuiltIn::HelperInvocation)),
    }
  }
}

/// Compute shader inputs.
#[derive(Debug)]
pub struct ComputeShaderInputs {
  /// Position of the invocation in its workgroup.
  pub local_invocation_id: Expr<V3<u32>>,

  /// Linear index of the invocation in its workgroup.
  pub local_invocation_index: Expr<u32>,

  /// Position of the invocation in the whole dispatch.
  pub global_invocation_id: Expr<V3<u32>>,

  /// Position of the workgroup in the dispatch.
  pub workgroup_id: Expr<V3<u32>>,

  /// Number of workgroups of the dispatch.
  pub num_workgroups: Expr<V3<u32>>,

  /// Number of invocations in a subgroup.
  pub subgroup_size: Expr<u32>,

  /// Index of the invocation in its subgroup.
  pub subgroup_invocation_id: Expr<u32>,
}

impl ComputeShaderInputs {
  pub(crate) fn new() -> Self {
    Self {
      local_invocation_id: builtin_expr(BuiltIn::Compute(ComputeBuiltIn::LocalInvocationId)),
      local_invocation_index: builtin_expr(BuiltIn::Compute(ComputeBuiltIn::LocalInvocationIndex)),
      global_invocation_id: builtin_expr(BuiltIn::Compute(ComputeBuiltIn::GlobalInvocationId)),
      workgroup_id: builtin_expr(BuiltIn::Compute(ComputeBuiltIn::WorkgroupId)),
      num_workgroups: builtin_expr(BuiltIn::Compute(ComputeBuiltIn::NumWorkgroups)),
      subgroup_size: builtin_expr(BuiltIn::Compute(ComputeBuiltIn::SubgroupSize)),
      subgroup_invocation_id: builtin_expr(BuiltIn::Compute(ComputeBuiltIn::SubgroupLocalInvocationId)),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    expr::ExprNode,
    types::{ToType, Type},
  };

  #[test]
  fn builtins_are_typed_like_their_expressions() {
    let input = ComputeShaderInputs::new();

    assert_eq!(input.local_invocation_id.erased().ty(), &V3::<u32>::ty());
    assert_eq!(input.local_invocation_index.erased().ty(), &u32::ty());
    assert_eq!(
      input.workgroup_id.erased().node(),
      &ExprNode::Var(ScopedHandle::BuiltIn(BuiltIn::Compute(ComputeBuiltIn::WorkgroupId)))
    );

    let tess = TessEvalShaderInputs::new();
    assert_eq!(tess.tess_level_outer.erased().ty(), &<[f32; 4]>::ty());
    assert_eq!(FragmentShaderInputs::new().front_facing.erased().ty(), &Type::Scalar(crate::types::ScalarType::Bool));
  }
}
