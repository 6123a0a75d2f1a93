//! Shading types.
//!
//! Shading values are typed with regular Rust types: `bool`, `i32`, `u32`, `f32`, `f64`, `i64` and `u64` for
//! scalars, [`V2`], [`V3`] and [`V4`] for vectors, [`Matrix`] (and its aliases, such as [`M44`]) for matrices and
//! `[T; N]` for arrays. Aggregates are user-defined structs implementing [`ToType`], usually via the `GpuStruct`
//! derive. The runtime representation of all those types is [`Type`].

use std::{fmt, rc::Rc};

use crate::{
  expr::{ErasedExpr, Expr, ExprNode},
  field::FieldFlags,
};

macro_rules! make_vn {
  ($t:ident, $dim:expr) => {
    /// Vector type with its components stored in an array.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct $t<T>(pub [T; $dim]);

    impl<T> From<[T; $dim]> for $t<T> {
      fn from(a: [T; $dim]) -> Self {
        Self(a)
      }
    }
  };
}

make_vn!(V2, 2);
make_vn!(V3, 3);
make_vn!(V4, 4);

/// Matrix type.
///
/// The wrapped array is column-major: `Matrix<[[f32; R]; C]>` has `C` columns of `R` rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix<T>(pub T);

impl<T, const R: usize, const C: usize> From<[[T; R]; C]> for Matrix<[[T; R]; C]> {
  fn from(a: [[T; R]; C]) -> Self {
    Matrix(a)
  }
}

/// Scalar types.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ScalarType {
  Bool,
  Int,
  UInt,
  Float,
  Double,
  Int64,
  UInt64,
}

impl ScalarType {
  /// Width in bits; booleans have no defined width and are reported as 32-bit.
  pub const fn width(self) -> u32 {
    match self {
      ScalarType::Double | ScalarType::Int64 | ScalarType::UInt64 => 64,
      _ => 32,
    }
  }

  /// Size in bytes.
  pub const fn size(self) -> u32 {
    self.width() / 8
  }

  pub const fn is_float(self) -> bool {
    matches!(self, ScalarType::Float | ScalarType::Double)
  }

  pub const fn is_integer(self) -> bool {
    matches!(
      self,
      ScalarType::Int | ScalarType::UInt | ScalarType::Int64 | ScalarType::UInt64
    )
  }

  pub const fn is_signed(self) -> bool {
    matches!(self, ScalarType::Int | ScalarType::Int64)
  }

  pub const fn is_bool(self) -> bool {
    matches!(self, ScalarType::Bool)
  }
}

impl fmt::Display for ScalarType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ScalarType::Bool => "bool",
      ScalarType::Int => "i32",
      ScalarType::UInt => "u32",
      ScalarType::Float => "f32",
      ScalarType::Double => "f64",
      ScalarType::Int64 => "i64",
      ScalarType::UInt64 => "u64",
    };

    f.write_str(name)
  }
}

/// Dimension of an image.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ImageDim {
  D1,
  D2,
  D3,
  Cube,
  Buffer,
  SubpassData,
}

/// Whether an image is accessed through a sampler or as a storage image of a given texel format.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ImageClass {
  Sampled,
  Storage(spirv::ImageFormat),
  Attachment,
}

/// Image type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ImageType {
  pub dim: ImageDim,
  pub sampled_type: ScalarType,
  pub arrayed: bool,
  pub multisampled: bool,
  pub class: ImageClass,
}

/// Field of a [`StructType`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StructField {
  pub name: String,
  pub ty: Type,
  pub flags: FieldFlags,
}

impl StructField {
  pub fn new(name: impl Into<String>, ty: Type) -> Self {
    Self {
      name: name.into(),
      ty,
      flags: FieldFlags::empty(),
    }
  }

  pub fn with_flags(self, flags: FieldFlags) -> Self {
    Self { flags, ..self }
  }
}

/// User-defined aggregate type.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StructType {
  pub name: String,
  pub fields: Vec<StructField>,
}

/// Runtime representation of a shading type.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Type {
  Void,
  Scalar(ScalarType),
  Vector(ScalarType, u32),
  /// Matrix of floating-point columns.
  Matrix {
    scalar: ScalarType,
    columns: u32,
    rows: u32,
  },
  Array(Box<Type>, u32),
  RuntimeArray(Box<Type>),
  Struct(Rc<StructType>),
  Image(ImageType),
  Sampler,
  SampledImage(ImageType),
}

impl Type {
  /// Scalar or vector type with `n` components of `scalar`.
  pub fn with_components(scalar: ScalarType, n: u32) -> Self {
    if n == 1 {
      Type::Scalar(scalar)
    } else {
      Type::Vector(scalar, n)
    }
  }

  /// Component type of scalars, vectors and matrices.
  pub fn scalar(&self) -> Option<ScalarType> {
    match *self {
      Type::Scalar(s) | Type::Vector(s, _) | Type::Matrix { scalar: s, .. } => Some(s),
      _ => None,
    }
  }

  /// Number of components of a scalar (1) or a vector.
  pub fn components(&self) -> Option<u32> {
    match *self {
      Type::Scalar(_) => Some(1),
      Type::Vector(_, n) => Some(n),
      _ => None,
    }
  }

  /// Element type of arrays, vectors (their component) and matrices (their column).
  pub fn element(&self) -> Option<Type> {
    match self {
      Type::Array(t, _) | Type::RuntimeArray(t) => Some((**t).clone()),
      Type::Vector(s, _) => Some(Type::Scalar(*s)),
      Type::Matrix { scalar, rows, .. } => Some(Type::Vector(*scalar, *rows)),
      _ => None,
    }
  }

  /// Type of the field at `index` in a struct.
  pub fn field(&self, index: u32) -> Option<&Type> {
    match self {
      Type::Struct(st) => st.fields.get(index as usize).map(|f| &f.ty),
      _ => None,
    }
  }

  pub fn is_scalar(&self) -> bool {
    matches!(self, Type::Scalar(_))
  }

  /// Scalars, vectors and matrices.
  pub fn is_arithmetic(&self) -> bool {
    matches!(self, Type::Scalar(_) | Type::Vector(..) | Type::Matrix { .. })
  }

  /// Images, samplers and sampled images; values of those types cannot be stored in function variables.
  pub fn is_opaque(&self) -> bool {
    matches!(self, Type::Image(_) | Type::Sampler | Type::SampledImage(_))
  }

  /// Whether any scalar component of this type satisfies `pred`.
  pub fn uses_scalar(&self, pred: impl Fn(ScalarType) -> bool + Copy) -> bool {
    match self {
      Type::Scalar(s) | Type::Vector(s, _) | Type::Matrix { scalar: s, .. } => pred(*s),
      Type::Array(t, _) | Type::RuntimeArray(t) => t.uses_scalar(pred),
      Type::Struct(st) => st.fields.iter().any(|f| f.ty.uses_scalar(pred)),
      _ => false,
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Type::Void => f.write_str("void"),
      Type::Scalar(s) => write!(f, "{}", s),
      Type::Vector(s, n) => write!(f, "V{}<{}>", n, s),
      Type::Matrix { scalar, columns, rows } => write!(f, "M{}{}<{}>", columns, rows, scalar),
      Type::Array(t, n) => write!(f, "[{}; {}]", t, n),
      Type::RuntimeArray(t) => write!(f, "[{}]", t),
      Type::Struct(st) => f.write_str(&st.name),
      Type::Image(img) => write!(f, "image{:?}<{}>", img.dim, img.sampled_type),
      Type::Sampler => f.write_str("sampler"),
      Type::SampledImage(img) => write!(f, "sampled_image{:?}<{}>", img.dim, img.sampled_type),
    }
  }
}

/// Types that have a shading representation.
pub trait ToType {
  fn ty() -> Type;
}

/// User-defined aggregates.
///
/// Implemented by `#[derive(GpuStruct)]`, which also generates the companion type holding one
/// [`Field`](crate::field::Field) token per struct field.
pub trait GpuStruct: ToType {
  type Fields;

  fn fields() -> Self::Fields;
}

impl ToType for () {
  fn ty() -> Type {
    Type::Void
  }
}

macro_rules! impl_ToType_scalar {
  ($t:ty, $q:ident) => {
    impl ToType for $t {
      fn ty() -> Type {
        Type::Scalar(ScalarType::$q)
      }
    }

    impl ToType for V2<$t> {
      fn ty() -> Type {
        Type::Vector(ScalarType::$q, 2)
      }
    }

    impl ToType for V3<$t> {
      fn ty() -> Type {
        Type::Vector(ScalarType::$q, 3)
      }
    }

    impl ToType for V4<$t> {
      fn ty() -> Type {
        Type::Vector(ScalarType::$q, 4)
      }
    }
  };
}

impl_ToType_scalar!(bool, Bool);
impl_ToType_scalar!(i32, Int);
impl_ToType_scalar!(u32, UInt);
impl_ToType_scalar!(f32, Float);
impl_ToType_scalar!(f64, Double);
impl_ToType_scalar!(i64, Int64);
impl_ToType_scalar!(u64, UInt64);

impl<T, const N: usize> ToType for [T; N]
where
  T: ToType,
{
  fn ty() -> Type {
    Type::Array(Box::new(T::ty()), N as u32)
  }
}

impl<T> ToType for [T]
where
  T: ToType,
{
  fn ty() -> Type {
    Type::RuntimeArray(Box::new(T::ty()))
  }
}

macro_rules! make_mat_ty {
  ($t:ident, $s:ty, $q:ident, $c:expr, $r:expr) => {
    pub type $t = Matrix<[[$s; $r]; $c]>;

    impl ToType for $t {
      fn ty() -> Type {
        Type::Matrix {
          scalar: ScalarType::$q,
          columns: $c,
          rows: $r,
        }
      }
    }
  };
}

make_mat_ty!(M22, f32, Float, 2, 2);
make_mat_ty!(M23, f32, Float, 2, 3);
make_mat_ty!(M24, f32, Float, 2, 4);
make_mat_ty!(M32, f32, Float, 3, 2);
make_mat_ty!(M33, f32, Float, 3, 3);
make_mat_ty!(M34, f32, Float, 3, 4);
make_mat_ty!(M42, f32, Float, 4, 2);
make_mat_ty!(M43, f32, Float, 4, 3);
make_mat_ty!(M44, f32, Float, 4, 4);
make_mat_ty!(DM22, f64, Double, 2, 2);
make_mat_ty!(DM23, f64, Double, 2, 3);
make_mat_ty!(DM24, f64, Double, 2, 4);
make_mat_ty!(DM32, f64, Double, 3, 2);
make_mat_ty!(DM33, f64, Double, 3, 3);
make_mat_ty!(DM34, f64, Double, 3, 4);
make_mat_ty!(DM42, f64, Double, 4, 2);
make_mat_ty!(DM43, f64, Double, 4, 3);
make_mat_ty!(DM44, f64, Double, 4, 4);

/// Scalar types.
pub trait Scalar: ToType {}

/// Scalar or vector types with numeric components.
pub trait Numeric: ToType {}

/// Scalar or vector types with integer components.
pub trait Integral: Numeric {}

/// Scalar or vector types with floating-point components.
pub trait Floating: Numeric {}

macro_rules! impl_classes {
  ($class:ident: $($t:ty),*) => {
    $(
      impl $class for $t {}
      impl $class for V2<$t> {}
      impl $class for V3<$t> {}
      impl $class for V4<$t> {}
    )*
  };
}

impl_classes!(Numeric: i32, u32, i64, u64, f32, f64);
impl_classes!(Integral: i32, u32, i64, u64);
impl_classes!(Floating: f32, f64);

impl Scalar for bool {}
impl Scalar for i32 {}
impl Scalar for u32 {}
impl Scalar for f32 {}
impl Scalar for f64 {}
impl Scalar for i64 {}
impl Scalar for u64 {}

/// Value-preserving conversion from `Self` to `T`.
///
/// Implemented between every pair of scalar types and between vectors of the same dimension.
pub trait CastTo<T> {}

macro_rules! impl_CastTo {
  ($a:ty => $($b:ty),*) => {
    $(
      impl CastTo<$b> for $a {}
      impl CastTo<V2<$b>> for V2<$a> {}
      impl CastTo<V3<$b>> for V3<$a> {}
      impl CastTo<V4<$b>> for V4<$a> {}
    )*
  };
}

impl_CastTo!(bool => bool, i32, u32, f32, f64, i64, u64);
impl_CastTo!(i32 => bool, i32, u32, f32, f64, i64, u64);
impl_CastTo!(u32 => bool, i32, u32, f32, f64, i64, u64);
impl_CastTo!(f32 => bool, i32, u32, f32, f64, i64, u64);
impl_CastTo!(f64 => bool, i32, u32, f32, f64, i64, u64);
impl_CastTo!(i64 => bool, i32, u32, f32, f64, i64, u64);
impl_CastTo!(u64 => bool, i32, u32, f32, f64, i64, u64);

/// Bit-preserving reinterpretation from `Self` to `T`; both types have the same component width and count.
pub trait BitcastTo<T> {}

macro_rules! impl_BitcastTo {
  (@each [$($a:ty),*] $bs:tt) => {
    $( impl_BitcastTo!(@one $a, $bs); )*
  };

  (@one $a:ty, [$($b:ty),*]) => {
    $(
      impl BitcastTo<$b> for $a {}
      impl BitcastTo<V2<$b>> for V2<$a> {}
      impl BitcastTo<V3<$b>> for V3<$a> {}
      impl BitcastTo<V4<$b>> for V4<$a> {}
    )*
  };

  ($($t:ty),*) => {
    impl_BitcastTo!(@each [$($t),*] [$($t),*]);
  };
}

impl_BitcastTo!(i32, u32, f32);
impl_BitcastTo!(i64, u64, f64);

/// Construct a 2D vector from components.
pub trait Vec2<A> {
  fn vec2(args: A) -> Self;
}

/// Construct a 3D vector from components.
pub trait Vec3<A> {
  fn vec3(args: A) -> Self;
}

/// Construct a 4D vector from components.
pub trait Vec4<A> {
  fn vec4(args: A) -> Self;
}

fn construct<T>(parts: Vec<ErasedExpr>) -> Expr<T>
where
  T: ToType,
{
  Expr::new(ExprNode::Construct(parts))
}

impl<T> Vec2<(Expr<T>, Expr<T>)> for Expr<V2<T>>
where
  V2<T>: ToType,
{
  fn vec2((x, y): (Expr<T>, Expr<T>)) -> Self {
    construct(vec![x.erased, y.erased])
  }
}

impl<T> Vec3<(Expr<V2<T>>, Expr<T>)> for Expr<V3<T>>
where
  V3<T>: ToType,
{
  fn vec3((xy, z): (Expr<V2<T>>, Expr<T>)) -> Self {
    construct(vec![xy.erased, z.erased])
  }
}

impl<T> Vec3<(Expr<T>, Expr<T>, Expr<T>)> for Expr<V3<T>>
where
  V3<T>: ToType,
{
  fn vec3((x, y, z): (Expr<T>, Expr<T>, Expr<T>)) -> Self {
    construct(vec![x.erased, y.erased, z.erased])
  }
}

impl<T> Vec4<(Expr<V3<T>>, Expr<T>)> for Expr<V4<T>>
where
  V4<T>: ToType,
{
  fn vec4((xyz, w): (Expr<V3<T>>, Expr<T>)) -> Self {
    construct(vec![xyz.erased, w.erased])
  }
}

impl<T> Vec4<(Expr<V2<T>>, Expr<V2<T>>)> for Expr<V4<T>>
where
  V4<T>: ToType,
{
  fn vec4((xy, zw): (Expr<V2<T>>, Expr<V2<T>>)) -> Self {
    construct(vec![xy.erased, zw.erased])
  }
}

impl<T> Vec4<(Expr<V2<T>>, Expr<T>, Expr<T>)> for Expr<V4<T>>
where
  V4<T>: ToType,
{
  fn vec4((xy, z, w): (Expr<V2<T>>, Expr<T>, Expr<T>)) -> Self {
    construct(vec![xy.erased, z.erased, w.erased])
  }
}

impl<T> Vec4<(Expr<T>, Expr<T>, Expr<T>, Expr<T>)> for Expr<V4<T>>
where
  V4<T>: ToType,
{
  fn vec4((x, y, z, w): (Expr<T>, Expr<T>, Expr<T>, Expr<T>)) -> Self {
    construct(vec![x.erased, y.erased, z.erased, w.erased])
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn scalar_and_vector_types() {
    assert_eq!(<f32 as ToType>::ty(), Type::Scalar(ScalarType::Float));
    assert_eq!(<V3<u32> as ToType>::ty(), Type::Vector(ScalarType::UInt, 3));
    assert_eq!(<V4<bool> as ToType>::ty().components(), Some(4));
  }

  #[test]
  fn matrix_types_are_column_major() {
    let ty = <M23 as ToType>::ty();

    assert_eq!(
      ty,
      Type::Matrix {
        scalar: ScalarType::Float,
        columns: 2,
        rows: 3
      }
    );
    assert_eq!(ty.element(), Some(Type::Vector(ScalarType::Float, 3)));
  }

  #[test]
  fn array_types() {
    let ty = <[[i32; 3]; 2] as ToType>::ty();

    assert_eq!(
      ty,
      Type::Array(Box::new(Type::Array(Box::new(Type::Scalar(ScalarType::Int)), 3)), 2)
    );
    assert_eq!(<[f32] as ToType>::ty(), Type::RuntimeArray(Box::new(Type::Scalar(ScalarType::Float))));
  }

  #[test]
  fn numeric_classes() {
    fn integral<T: Integral>() -> Type {
      T::ty()
    }

    fn floating<T: Floating>() -> Type {
      T::ty()
    }

    fn numeric<T: Numeric>() -> Type {
      T::ty()
    }

    assert_eq!(integral::<V3<u64>>(), Type::Vector(ScalarType::UInt64, 3));
    assert_eq!(integral::<i32>(), Type::Scalar(ScalarType::Int));
    assert_eq!(floating::<V2<f64>>(), Type::Vector(ScalarType::Double, 2));
    assert_eq!(numeric::<V4<f32>>(), Type::Vector(ScalarType::Float, 4));
    assert_eq!(numeric::<u32>(), Type::Scalar(ScalarType::UInt));
  }

  #[test]
  fn sixty_four_bit_detection() {
    assert!(<[V2<f64>; 4] as ToType>::ty().uses_scalar(|s| s.width() == 64));
    assert!(!<V4<f32> as ToType>::ty().uses_scalar(|s| s.width() == 64));
  }
}
