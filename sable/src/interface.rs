//! Inter-stage variables and color outputs.

use std::{marker::PhantomData, ops::Deref};

use crate::{
  expr::{lookup, ArrayIndex, ErasedExpr, Expr},
  scope::{InterfaceHandle, InterfaceKind, ScopedHandle},
  types::{ToType, Type},
  var::Var,
};

/// How a varying is interpolated across a primitive.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Interpolation {
  /// Perspective-correct interpolation.
  #[default]
  Smooth,
  /// No interpolation: the value of the provoking vertex is used.
  Flat,
  /// Linear interpolation in screen space.
  NoPerspective,
}

/// Where a varying is sampled within a pixel.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Sampling {
  #[default]
  Center,
  /// Sampled inside the primitive.
  Centroid,
  /// Sampled at each sample location; enables sample-rate shading.
  Sample,
}

/// Variable written by a stage and read by the next one.
///
/// The same token is used on both sides: the producing stage writes [`Varying::output`] (or
/// [`Varying::output_vertex`] in tessellation control shaders) and the consuming stage reads [`Varying::input`] (or
/// [`Varying::input_vertex`] in tessellation and geometry shaders, which see one value per vertex of their input
/// primitive).
///
/// # Examples
///
/// ```
/// use sable::{Interpolation, PipelineLayout, Sampling, Scope, StageBuilder, V3, V4, vec3, vec4};
///
/// let mut layout = PipelineLayout::new();
/// let normal = layout.varying::<V3<f32>>(Interpolation::Smooth, Sampling::Center);
/// let color = layout.color_output::<V4<f32>>();
///
/// let vs = StageBuilder::new_vertex_shader(|mut s, _, _| {
///   s.main_fun(|s: &mut Scope<()>| {
///     s.set(normal.output(), vec3!(0., 0., 1.));
///   })
/// });
///
/// let fs = StageBuilder::new_fragment_shader(|mut s, _, _| {
///   s.main_fun(|s: &mut Scope<()>| {
///     s.set(&*color, vec4!(normal.input(), 1.));
///   })
/// });
/// ```
#[derive(Debug)]
pub struct Varying<T> {
  layout: u32,
  index: u32,
  _phantom: PhantomData<T>,
}

impl<T> Varying<T>
where
  T: ToType,
{
  pub(crate) fn new(layout: u32, index: u32) -> Self {
    Self {
      layout,
      index,
      _phantom: PhantomData,
    }
  }

  fn handle(&self, kind: InterfaceKind) -> ScopedHandle {
    ScopedHandle::Interface(InterfaceHandle {
      layout: self.layout,
      kind,
      index: self.index,
    })
  }

  /// Value written by the producing stage.
  pub fn output(&self) -> Var<T> {
    Var::from_erased(ErasedExpr::var(T::ty(), self.handle(InterfaceKind::VaryingOut)))
  }

  /// Value read by the consuming stage.
  pub fn input(&self) -> Expr<T> {
    Expr::from_erased(ErasedExpr::var(T::ty(), self.handle(InterfaceKind::VaryingIn)))
  }

  /// Value of the vertex `index` of the input primitive, in stages reading one value per vertex.
  pub fn input_vertex(&self, index: impl ArrayIndex) -> Expr<T> {
    let array = ErasedExpr::var(
      Type::RuntimeArray(Box::new(T::ty())),
      self.handle(InterfaceKind::VaryingIn),
    );
    lookup(&array, index)
  }

  /// Value of the vertex `index` of the output patch, in tessellation control shaders.
  pub fn output_vertex(&self, index: impl ArrayIndex) -> Var<T> {
    let array = ErasedExpr::var(
      Type::RuntimeArray(Box::new(T::ty())),
      self.handle(InterfaceKind::VaryingOut),
    );
    Var(lookup(&array, index))
  }
}

/// Color attachment written by fragment shaders.
///
/// Dereferences to the variable to assign.
#[derive(Debug)]
pub struct ColorOutput<T> {
  var: Var<T>,
}

impl<T> ColorOutput<T>
where
  T: ToType,
{
  pub(crate) fn new(layout: u32, index: u32) -> Self {
    let handle = ScopedHandle::Interface(InterfaceHandle {
      layout,
      kind: InterfaceKind::ColorOutput,
      index,
    });

    Self {
      var: Var::new(handle),
    }
  }

  /// Location of the attachment.
  pub fn location(&self) -> u32 {
    match self.var.erased().as_handle() {
      Some(ScopedHandle::Interface(handle)) => handle.index,
      _ => 0,
    }
  }
}

impl<T> Deref for ColorOutput<T> {
  type Target = Var<T>;

  fn deref(&self) -> &Self::Target {
    &self.var
  }
}

/// Number of consecutive locations a value of type `ty` takes in the stage interface.
pub(crate) fn locations(ty: &Type) -> u32 {
  match ty {
    Type::Scalar(_) => 1,
    Type::Vector(s, n) => {
      if s.width() == 64 && *n > 2 {
        2
      } else {
        1
      }
    }
    Type::Matrix { scalar, columns, rows } => columns * locations(&Type::Vector(*scalar, *rows)),
    Type::Array(t, n) => n * locations(t),
    Type::Struct(st) => st.fields.iter().map(|f| locations(&f.ty)).sum(),
    _ => 1,
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    expr::ExprNode,
    types::{M44, V3, V4},
  };

  #[test]
  fn varying_sides() {
    let v = Varying::<V3<f32>>::new(7, 2);

    assert_eq!(
      v.input().erased().as_handle(),
      Some(&ScopedHandle::Interface(InterfaceHandle {
        layout: 7,
        kind: InterfaceKind::VaryingIn,
        index: 2
      }))
    );

    match v.output_vertex(1).erased().node() {
      ExprNode::ArrayLookup { object, .. } => {
        assert_eq!(object.ty(), &Type::RuntimeArray(Box::new(V3::<f32>::ty())));
      }
      node => panic!("unexpected node {:?}", node),
    }
  }

  #[test]
  fn interface_locations() {
    assert_eq!(locations(&V4::<f32>::ty()), 1);
    assert_eq!(locations(&V3::<f64>::ty()), 2);
    assert_eq!(locations(&M44::ty()), 4);
    assert_eq!(locations(&<[V4<f32>; 3]>::ty()), 3);
  }
}
