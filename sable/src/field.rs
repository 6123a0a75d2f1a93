//! Typed struct field access.
//!
//! `#[derive(GpuStruct)]` generates, for a struct `Light`, a `LightFields` struct holding one [`Field`] per field of
//! `Light`. Field tokens are then used to project expressions and variables:
//!
//! ```
//! use sable::{Expr, GpuStruct, V3};
//!
//! #[derive(GpuStruct)]
//! struct Light {
//!   position: V3<f32>,
//!   intensity: f32,
//! }
//!
//! fn intensity(light: &Expr<Light>) -> Expr<f32> {
//!   light.field(&Light::fields().intensity)
//! }
//! ```

use std::marker::PhantomData;

use bitflags::bitflags;

use crate::{
  expr::{Expr, ExprNode},
  types::ToType,
  var::Var,
};

bitflags! {
  /// Decorations of a struct member, set with `#[gpu(...)]` attributes on the field.
  #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
  pub struct FieldFlags: u32 {
    /// `#[gpu(relaxed_precision)]`: the member may be computed with lower precision.
    const RELAXED_PRECISION = 1 << 0;
  }
}

/// Field of type `T` in the struct `S`.
pub struct Field<S, T> {
  index: u32,
  name: &'static str,
  flags: FieldFlags,
  _phantom: PhantomData<fn() -> (S, T)>,
}

impl<S, T> Clone for Field<S, T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<S, T> Copy for Field<S, T> {}

impl<S, T> std::fmt::Debug for Field<S, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Field({}: {})", self.index, self.name)
  }
}

impl<S, T> Field<S, T> {
  /// Token for the field at position `index` in `S`.
  ///
  /// Only meant to be called by the generated code of `#[derive(GpuStruct)]`; a wrong index makes the projection
  /// fail to compile to a valid module.
  pub const fn new(index: u32, name: &'static str, flags: FieldFlags) -> Self {
    Self {
      index,
      name,
      flags,
      _phantom: PhantomData,
    }
  }

  pub const fn index(&self) -> u32 {
    self.index
  }

  pub const fn name(&self) -> &'static str {
    self.name
  }

  pub const fn flags(&self) -> FieldFlags {
    self.flags
  }
}

impl<S> Expr<S>
where
  S: ToType,
{
  /// Project a field out of a struct expression.
  pub fn field<T>(&self, field: &Field<S, T>) -> Expr<T>
  where
    T: ToType,
  {
    Expr::new(ExprNode::Field {
      object: self.erased.clone(),
      index: field.index,
    })
  }
}

impl<S> Var<S>
where
  S: ToType,
{
  /// Project a field out of a struct variable; the result can be assigned to.
  pub fn field<T>(&self, field: &Field<S, T>) -> Var<T>
  where
    T: ToType,
  {
    Var(self.0.field(field))
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    scope::ScopedHandle,
    types::{StructField, StructType, Type, V3},
  };
  use std::rc::Rc;

  struct Light;

  impl ToType for Light {
    fn ty() -> Type {
      Type::Struct(Rc::new(StructType {
        name: "Light".to_owned(),
        fields: vec![
          StructField::new("position", <V3<f32>>::ty()),
          StructField::new("intensity", f32::ty()).with_flags(FieldFlags::RELAXED_PRECISION),
        ],
      }))
    }
  }

  const INTENSITY: Field<Light, f32> = Field::new(1, "intensity", FieldFlags::RELAXED_PRECISION);

  #[test]
  fn field_projection() {
    let light = Var::<Light>::new(ScopedHandle::Global(0));
    let intensity = light.field(&INTENSITY);

    assert_eq!(intensity.erased().ty(), &f32::ty());
    match intensity.erased().node() {
      ExprNode::Field { object, index } => {
        assert_eq!(*index, 1);
        assert_eq!(object.as_handle(), Some(&ScopedHandle::Global(0)));
      }
      node => panic!("unexpected node {:?}", node),
    }

    match Light::ty() {
      Type::Struct(s) => assert_eq!(s.fields[1].flags, INTENSITY.flags()),
      ty => panic!("unexpected type {}", ty),
    }
  }
}
