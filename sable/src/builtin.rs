use crate::{
  stage::ShaderStage,
  types::{ScalarType, Type},
};

/// Built-in variables, per stage.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum BuiltIn {
  Vertex(VertexBuiltIn),
  TessCtrl(TessCtrlBuiltIn),
  TessEval(TessEvalBuiltIn),
  Geometry(GeometryBuiltIn),
  Fragment(FragmentBuiltIn),
  Compute(ComputeBuiltIn),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum VertexBuiltIn {
  VertexIndex,
  InstanceIndex,
  BaseVertex,
  BaseInstance,
  Position,
  PointSize,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TessCtrlBuiltIn {
  PatchVertices,
  PrimitiveId,
  InvocationId,
  TessLevelOuter,
  TessLevelInner,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TessEvalBuiltIn {
  TessCoord,
  PatchVertices,
  PrimitiveId,
  TessLevelOuter,
  TessLevelInner,
  Position,
  PointSize,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GeometryBuiltIn {
  PrimitiveIdIn,
  InvocationId,
  Position,
  PointSize,
  PrimitiveId,
  Layer,
  ViewportIndex,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FragmentBuiltIn {
  FragCoord,
  FrontFacing,
  PointCoord,
  SampleId,
  SamplePosition,
  PrimitiveId,
  Layer,
  HelperInvocation,
  FragDepth,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ComputeBuiltIn {
  LocalInvocationId,
  LocalInvocationIndex,
  GlobalInvocationId,
  WorkgroupId,
  NumWorkgroups,
  SubgroupSize,
  SubgroupLocalInvocationId,
}

fn int() -> Type {
  Type::Scalar(ScalarType::Int)
}

fn uint() -> Type {
  Type::Scalar(ScalarType::UInt)
}

fn float() -> Type {
  Type::Scalar(ScalarType::Float)
}

fn floats(n: u32) -> Type {
  Type::Vector(ScalarType::Float, n)
}

fn float_array(n: u32) -> Type {
  Type::Array(Box::new(float()), n)
}

fn uvec3() -> Type {
  Type::Vector(ScalarType::UInt, 3)
}

impl BuiltIn {
  /// Stage the built-in belongs to.
  pub fn stage(self) -> ShaderStage {
    match self {
      BuiltIn::Vertex(_) => ShaderStage::Vertex,
      BuiltIn::TessCtrl(_) => ShaderStage::TessControl,
      BuiltIn::TessEval(_) => ShaderStage::TessEval,
      BuiltIn::Geometry(_) => ShaderStage::Geometry,
      BuiltIn::Fragment(_) => ShaderStage::Fragment,
      BuiltIn::Compute(_) => ShaderStage::Compute,
    }
  }

  /// SPIR-V decoration of the variable.
  pub fn to_spirv(self) -> spirv::BuiltIn {
    use spirv::BuiltIn as B;

    match self {
      BuiltIn::Vertex(b) => match b {
        VertexBuiltIn::VertexIndex => B::VertexIndex,
        VertexBuiltIn::InstanceIndex => B::InstanceIndex,
        VertexBuiltIn::BaseVertex => B::BaseVertex,
        VertexBuiltIn::BaseInstance => B::BaseInstance,
        VertexBuiltIn::Position => B::Position,
        VertexBuiltIn::PointSize => B::PointSize,
      },

      BuiltIn::TessCtrl(b) => match b {
        TessCtrlBuiltIn::PatchVertices => B::PatchVertices,
        TessCtrlBuiltIn::PrimitiveId => B::PrimitiveId,
        TessCtrlBuiltIn::InvocationId => B::InvocationId,
        TessCtrlBuiltIn::TessLevelOuter => B::TessLevelOuter,
        TessCtrlBuiltIn::TessLevelInner => B::TessLevelInner,
      },

      BuiltIn::TessEval(b) => match b {
        TessEvalBuiltIn::TessCoord => B::TessCoord,
        TessEvalBuiltIn::PatchVertices => B::PatchVertices,
        TessEvalBuiltIn::PrimitiveId => B::PrimitiveId,
        TessEvalBuiltIn::TessLevelOuter => B::TessLevelOuter,
        TessEvalBuiltIn::TessLevelInner => B::TessLevelInner,
        TessEvalBuiltIn::Position => B::Position,
        TessEvalBuiltIn::PointSize => B::PointSize,
      },

      BuiltIn::Geometry(b) => match b {
        GeometryBuiltIn::PrimitiveIdIn | GeometryBuiltIn::PrimitiveId => B::PrimitiveId,
        GeometryBuiltIn::InvocationId => B::InvocationId,
        GeometryBuiltIn::Position => B::Position,
        GeometryBuiltIn::PointSize => B::PointSize,
        GeometryBuiltIn::Layer => B::Layer,
        GeometryBuiltIn::ViewportIndex => B::ViewportIndex,
      },

      BuiltIn::Fragment(b) => match b {
        FragmentBuiltIn::FragCoord => B::FragCoord,
        FragmentBuiltIn::FrontFacing => B::FrontFacing,
        FragmentBuiltIn::PointCoord => B::PointCoord,
        FragmentBuiltIn::SampleId => B::SampleId,
        FragmentBuiltIn::SamplePosition => B::SamplePosition,
        FragmentBuiltIn::PrimitiveId => B::PrimitiveId,
        FragmentBuiltIn::Layer => B::Layer,
        FragmentBuiltIn::HelperInvocation => B::HelperInvocation,
        FragmentBuiltIn::FragDepth => B::FragDepth,
      },

      BuiltIn::Compute(b) => match b {
        ComputeBuiltIn::LocalInvocationId => B::LocalInvocationId,
        ComputeBuiltIn::LocalInvocationIndex => B::LocalInvocationIndex,
        ComputeBuiltIn::GlobalInvocationId => B::GlobalInvocationId,
        ComputeBuiltIn::WorkgroupId => B::WorkgroupId,
        ComputeBuiltIn::NumWorkgroups => B::NumWorkgroups,
        ComputeBuiltIn::SubgroupSize => B::SubgroupSize,
        ComputeBuiltIn::SubgroupLocalInvocationId => B::SubgroupLocalInvocationId,
      },
    }
  }

  /// Type of the variable.
  pub fn ty(self) -> Type {
    match self {
      BuiltIn::Vertex(b) => match b {
        VertexBuiltIn::Position => floats(4),
        VertexBuiltIn::PointSize => float(),
        _ => int(),
      },

      BuiltIn::TessCtrl(b) => match b {
        TessCtrlBuiltIn::TessLevelOuter => float_array(4),
        TessCtrlBuiltIn::TessLevelInner => float_array(2),
        _ => int(),
      },

      BuiltIn::TessEval(b) => match b {
        TessEvalBuiltIn::TessCoord => floats(3),
        TessEvalBuiltIn::TessLevelOuter => float_array(4),
        TessEvalBuiltIn::TessLevelInner => float_array(2),
        TessEvalBuiltIn::Position => floats(4),
        TessEvalBuiltIn::PointSize => float(),
        _ => int(),
      },

      BuiltIn::Geometry(b) => match b {
        GeometryBuiltIn::Position => floats(4),
        GeometryBuiltIn::PointSize => float(),
        _ => int(),
      },

      BuiltIn::Fragment(b) => match b {
        FragmentBuiltIn::FragCoord => floats(4),
        FragmentBuiltIn::FrontFacing | FragmentBuiltIn::HelperInvocation => Type::Scalar(ScalarType::Bool),
        FragmentBuiltIn::PointCoord | FragmentBuiltIn::SamplePosition => floats(2),
        FragmentBuiltIn::FragDepth => float(),
        _ => int(),
      },

      BuiltIn::Compute(b) => match b {
        ComputeBuiltIn::LocalInvocationIndex
        | ComputeBuiltIn::SubgroupSize
        | ComputeBuiltIn::SubgroupLocalInvocationId => uint(),
        _ => uvec3(),
      },
    }
  }

  /// Whether the built-in is written by the stage.
  pub fn is_output(self) -> bool {
    matches!(
      self,
      BuiltIn::Vertex(VertexBuiltIn::Position | VertexBuiltIn::PointSize)
        | BuiltIn::TessCtrl(TessCtrlBuiltIn::TessLevelOuter | TessCtrlBuiltIn::TessLevelInner)
        | BuiltIn::TessEval(TessEvalBuiltIn::Position | TessEvalBuiltIn::PointSize)
        | BuiltIn::Geometry(
          GeometryBuiltIn::Position
            | GeometryBuiltIn::PointSize
            | GeometryBuiltIn::PrimitiveId
            | GeometryBuiltIn::Layer
            | GeometryBuiltIn::ViewportIndex
        )
        | BuiltIn::Fragment(FragmentBuiltIn::FragDepth)
    )
  }

  /// Whether the variable is per-patch (`Patch` decoration).
  pub fn is_patch(self) -> bool {
    matches!(
      self,
      BuiltIn::TessCtrl(TessCtrlBuiltIn::TessLevelOuter | TessCtrlBuiltIn::TessLevelInner)
        | BuiltIn::TessEval(TessEvalBuiltIn::TessLevelOuter | TessEvalBuiltIn::TessLevelInner)
    )
  }

  /// Capability required to use the built-in, besides the capability of its stage.
  pub fn capability(self) -> Option<spirv::Capability> {
    match self {
      BuiltIn::Vertex(VertexBuiltIn::BaseVertex | VertexBuiltIn::BaseInstance) => {
        Some(spirv::Capability::DrawParameters)
      }
      BuiltIn::Fragment(FragmentBuiltIn::SampleId | FragmentBuiltIn::SamplePosition) => {
        Some(spirv::Capability::SampleRateShading)
      }
      BuiltIn::Fragment(FragmentBuiltIn::PrimitiveId | FragmentBuiltIn::Layer) => Some(spirv::Capability::Geometry),
      BuiltIn::Geometry(GeometryBuiltIn::ViewportIndex) => Some(spirv::Capability::MultiViewport),
      BuiltIn::Compute(ComputeBuiltIn::SubgroupSize | ComputeBuiltIn::SubgroupLocalInvocationId) => {
        Some(spirv::Capability::GroupNonUniform)
      }
      _ => None,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn builtin_types() {
    assert_eq!(BuiltIn::Vertex(VertexBuiltIn::Position).ty(), floats(4));
    assert_eq!(BuiltIn::Compute(ComputeBuiltIn::LocalInvocationId).ty(), uvec3());
    assert_eq!(BuiltIn::TessCtrl(TessCtrlBuiltIn::TessLevelInner).ty(), float_array(2));
  }

  #[test]
  fn builtin_directions() {
    assert!(BuiltIn::Fragment(FragmentBuiltIn::FragDepth).is_output());
    assert!(!BuiltIn::Fragment(FragmentBuiltIn::FragCoord).is_output());
    assert!(BuiltIn::TessCtrl(TessCtrlBuiltIn::TessLevelOuter).is_patch());
    assert_eq!(
      BuiltIn::Geometry(GeometryBuiltIn::PrimitiveIdIn).to_spirv(),
      spirv::BuiltIn::PrimitiveId
    );
  }
}
