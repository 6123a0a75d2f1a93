//! Built-in functions.
//!
//! Functions are provided as methods on expressions through extension traits, so that `v.normalize()` or
//! `x.clamp(0., 1.)` read as they would in a regular shading language. Bring the traits in scope with
//! `use sable::stdlib::*`.

use crate::{
  expr::{ErasedExpr, Expr, ExprNode},
  fun::ErasedFunHandle,
  types::{ToType, DM22, DM33, DM44, M22, M23, M24, M32, M33, M34, M42, M43, M44, V2, V3, V4},
};

fn call<R>(handle: ErasedFunHandle, args: Vec<ErasedExpr>) -> Expr<R>
where
  R: ToType,
{
  Expr::new(ExprNode::FunCall(handle, args))
}

pub trait Trigonometry: Sized {
  fn radians(&self) -> Self;

  fn degrees(&self) -> Self;

  fn sin(&self) -> Self;

  fn cos(&self) -> Self;

  fn tan(&self) -> Self;

  fn asin(&self) -> Self;

  fn acos(&self) -> Self;

  fn atan(&self) -> Self;

  /// Arc tangent of `self / x`, using the signs of both to pick the quadrant.
  fn atan2(&self, x: impl Into<Self>) -> Self;

  fn sinh(&self) -> Self;

  fn cosh(&self) -> Self;

  fn tanh(&self) -> Self;

  fn asinh(&self) -> Self;

  fn acosh(&self) -> Self;

  fn atanh(&self) -> Self;
}

macro_rules! unary_methods {
  ($($name:ident => $handle:ident),* $(,)?) => {
    $(
      fn $name(&self) -> Self {
        call(ErasedFunHandle::$handle, vec![self.erased.clone()])
      }
    )*
  };
}

macro_rules! impl_Trigonometry {
  ($($t:ty),*) => {
    $(
      impl Trigonometry for Expr<$t> {
        unary_methods! {
          radians => Radians,
          degrees => Degrees,
          sin => Sin,
          cos => Cos,
          tan => Tan,
          asin => ASin,
          acos => ACos,
          atan => ATan,
          sinh => SinH,
          cosh => CosH,
          tanh => TanH,
          asinh => ASinH,
          acosh => ACosH,
          atanh => ATanH,
        }

        fn atan2(&self, x: impl Into<Self>) -> Self {
          call(ErasedFunHandle::ATan2, vec![self.erased.clone(), x.into().erased])
        }
      }
    )*
  };
}

impl_Trigonometry!(f32, V2<f32>, V3<f32>, V4<f32>);

pub trait Exponential: Sized {
  fn pow(&self, p: impl Into<Self>) -> Self;

  fn exp(&self) -> Self;

  fn exp2(&self) -> Self;

  fn log(&self) -> Self;

  fn log2(&self) -> Self;

  fn sqrt(&self) -> Self;

  fn isqrt(&self) -> Self;
}

macro_rules! impl_Exponential {
  ($($t:ty),*) => {
    $(
      impl Exponential for Expr<$t> {
        unary_methods! {
          exp => Exp,
          exp2 => Exp2,
          log => Log,
          log2 => Log2,
          sqrt => Sqrt,
          isqrt => InverseSqrt,
        }

        fn pow(&self, p: impl Into<Self>) -> Self {
          call(ErasedFunHandle::Pow, vec![self.erased.clone(), p.into().erased])
        }
      }
    )*
  };
}

impl_Exponential!(f32, V2<f32>, V3<f32>, V4<f32>);

pub trait Relative {
  fn abs(&self) -> Self;

  fn sign(&self) -> Self;
}

macro_rules! impl_Relative {
  ($($t:ty),*) => {
    $(
      impl Relative for Expr<$t> {
        unary_methods! {
          abs => Abs,
          sign => Sign,
        }
      }
    )*
  };
}

impl_Relative!(i32, V2<i32>, V3<i32>, V4<i32>);
impl_Relative!(i64, V2<i64>, V3<i64>, V4<i64>);
impl_Relative!(f32, V2<f32>, V3<f32>, V4<f32>);
impl_Relative!(f64, V2<f64>, V3<f64>, V4<f64>);

/// Rounding of floating-point values.
pub trait Rounding {
  fn floor(&self) -> Self;

  fn trunc(&self) -> Self;

  fn round(&self) -> Self;

  /// Round to the nearest integer, halfway cases going to the even one.
  fn round_even(&self) -> Self;

  fn ceil(&self) -> Self;

  fn fract(&self) -> Self;
}

macro_rules! impl_Rounding {
  ($($t:ty),*) => {
    $(
      impl Rounding for Expr<$t> {
        unary_methods! {
          floor => Floor,
          trunc => Trunc,
          round => Round,
          round_even => RoundEven,
          ceil => Ceil,
          fract => Fract,
        }
      }
    )*
  };
}

impl_Rounding!(f32, V2<f32>, V3<f32>, V4<f32>);
impl_Rounding!(f64, V2<f64>, V3<f64>, V4<f64>);

pub trait Bounded: Sized {
  fn min(&self, rhs: impl Into<Self>) -> Self;

  fn max(&self, rhs: impl Into<Self>) -> Self;

  fn clamp(&self, min_value: impl Into<Self>, max_value: impl Into<Self>) -> Self;
}

macro_rules! impl_Bounded {
  ($($t:ty),*) => {
    $(
      impl Bounded for Expr<$t> {
        fn min(&self, rhs: impl Into<Self>) -> Self {
          call(ErasedFunHandle::Min, vec![self.erased.clone(), rhs.into().erased])
        }

        fn max(&self, rhs: impl Into<Self>) -> Self {
          call(ErasedFunHandle::Max, vec![self.erased.clone(), rhs.into().erased])
        }

        fn clamp(&self, min_value: impl Into<Self>, max_value: impl Into<Self>) -> Self {
          call(
            ErasedFunHandle::Clamp,
            vec![self.erased.clone(), min_value.into().erased, max_value.into().erased],
          )
        }
      }
    )*
  };
}

impl_Bounded!(i32, V2<i32>, V3<i32>, V4<i32>);
impl_Bounded!(u32, V2<u32>, V3<u32>, V4<u32>);
impl_Bounded!(i64, V2<i64>, V3<i64>, V4<i64>);
impl_Bounded!(u64, V2<u64>, V3<u64>, V4<u64>);
impl_Bounded!(f32, V2<f32>, V3<f32>, V4<f32>);
impl_Bounded!(f64, V2<f64>, V3<f64>, V4<f64>);

/// Interpolation and thresholds.
///
/// `RHS` is either the type of the value itself or its scalar type, in which case it applies to all components.
pub trait Mix<RHS>: Sized {
  /// Linear blend of `self` and `y`: `self * (1 - a) + y * a`.
  fn mix(&self, y: impl Into<Self>, a: RHS) -> Self;

  /// `0` where `self` is below `edge`, `1` elsewhere.
  fn step(&self, edge: RHS) -> Self;

  /// Hermite interpolation of `self` between `edge_a` and `edge_b`.
  fn smooth_step(&self, edge_a: RHS, edge_b: RHS) -> Self;
}

macro_rules! impl_Mix {
  ($t:ty, $q:ty) => {
    impl Mix<Expr<$q>> for Expr<$t> {
      fn mix(&self, y: impl Into<Self>, a: Expr<$q>) -> Self {
        call(ErasedFunHandle::Mix, vec![self.erased.clone(), y.into().erased, a.erased])
      }

      fn step(&self, edge: Expr<$q>) -> Self {
        call(ErasedFunHandle::Step, vec![edge.erased, self.erased.clone()])
      }

      fn smooth_step(&self, edge_a: Expr<$q>, edge_b: Expr<$q>) -> Self {
        call(
          ErasedFunHandle::SmoothStep,
          vec![edge_a.erased, edge_b.erased, self.erased.clone()],
        )
      }
    }
  };
}

impl_Mix!(f32, f32);
impl_Mix!(V2<f32>, f32);
impl_Mix!(V2<f32>, V2<f32>);
impl_Mix!(V3<f32>, f32);
impl_Mix!(V3<f32>, V3<f32>);
impl_Mix!(V4<f32>, f32);
impl_Mix!(V4<f32>, V4<f32>);
impl_Mix!(f64, f64);
impl_Mix!(V2<f64>, V2<f64>);
impl_Mix!(V3<f64>, V3<f64>);
impl_Mix!(V4<f64>, V4<f64>);

/// Component-wise choice between two values, taking `y` where `a` is true.
pub trait Select<B>: Sized {
  fn mix_select(&self, y: impl Into<Self>, a: B) -> Self;
}

macro_rules! impl_Select {
  ($($t:ty => $b:ty),*) => {
    $(
      impl Select<Expr<$b>> for Expr<$t> {
        fn mix_select(&self, y: impl Into<Self>, a: Expr<$b>) -> Self {
          call(ErasedFunHandle::Mix, vec![self.erased.clone(), y.into().erased, a.erased])
        }
      }
    )*
  };
}

impl_Select!(V2<f32> => V2<bool>, V3<f32> => V3<bool>, V4<f32> => V4<bool>);

pub trait FloatingExt {
  type BoolExpr;

  fn is_nan(&self) -> Self::BoolExpr;

  fn is_inf(&self) -> Self::BoolExpr;

  /// `self * b + c`, possibly with a single rounding.
  fn fma(&self, b: impl Into<Self>, c: impl Into<Self>) -> Self
  where
    Self: Sized;
}

macro_rules! impl_FloatingExt {
  ($t:ty, $bool_expr:ty) => {
    impl FloatingExt for Expr<$t> {
      type BoolExpr = Expr<$bool_expr>;

      fn is_nan(&self) -> Self::BoolExpr {
        call(ErasedFunHandle::IsNan, vec![self.erased.clone()])
      }

      fn is_inf(&self) -> Self::BoolExpr {
        call(ErasedFunHandle::IsInf, vec![self.erased.clone()])
      }

      fn fma(&self, b: impl Into<Self>, c: impl Into<Self>) -> Self {
        call(ErasedFunHandle::FMA, vec![self.erased.clone(), b.into().erased, c.into().erased])
      }
    }
  };
}

impl_FloatingExt!(f32, bool);
impl_FloatingExt!(V2<f32>, V2<bool>);
impl_FloatingExt!(V3<f32>, V3<bool>);
impl_FloatingExt!(V4<f32>, V4<bool>);
impl_FloatingExt!(f64, bool);
impl_FloatingExt!(V2<f64>, V2<bool>);
impl_FloatingExt!(V3<f64>, V3<bool>);
impl_FloatingExt!(V4<f64>, V4<bool>);

pub trait Geometry: Sized {
  type LengthExpr;

  fn length(&self) -> Self::LengthExpr;

  fn distance(&self, other: impl Into<Self>) -> Self::LengthExpr;

  fn dot(&self, other: impl Into<Self>) -> Self::LengthExpr;

  fn normalize(&self) -> Self;

  /// Orient `normal` so that it faces away from `self`, given a reference normal.
  fn face_forward(&self, normal: impl Into<Self>, reference: impl Into<Self>) -> Self;

  fn reflect(&self, normal: impl Into<Self>) -> Self;

  fn refract(&self, normal: impl Into<Self>, eta: Self::LengthExpr) -> Self;
}

macro_rules! impl_Geometry {
  ($t:ty, $l:ty) => {
    impl Geometry for Expr<$t> {
      type LengthExpr = Expr<$l>;

      fn length(&self) -> Self::LengthExpr {
        call(ErasedFunHandle::Length, vec![self.erased.clone()])
      }

      fn distance(&self, other: impl Into<Self>) -> Self::LengthExpr {
        call(ErasedFunHandle::Distance, vec![self.erased.clone(), other.into().erased])
      }

      fn dot(&self, other: impl Into<Self>) -> Self::LengthExpr {
        call(ErasedFunHandle::Dot, vec![self.erased.clone(), other.into().erased])
      }

      fn normalize(&self) -> Self {
        call(ErasedFunHandle::Normalize, vec![self.erased.clone()])
      }

      fn face_forward(&self, normal: impl Into<Self>, reference: impl Into<Self>) -> Self {
        // the incident vector comes second
        call(
          ErasedFunHandle::FaceForward,
          vec![normal.into().erased, self.erased.clone(), reference.into().erased],
        )
      }

      fn reflect(&self, normal: impl Into<Self>) -> Self {
        call(ErasedFunHandle::Reflect, vec![self.erased.clone(), normal.into().erased])
      }

      fn refract(&self, normal: impl Into<Self>, eta: Self::LengthExpr) -> Self {
        call(
          ErasedFunHandle::Refract,
          vec![self.erased.clone(), normal.into().erased, eta.erased],
        )
      }
    }
  };
}

impl_Geometry!(V2<f32>, f32);
impl_Geometry!(V3<f32>, f32);
impl_Geometry!(V4<f32>, f32);
impl_Geometry!(V2<f64>, f64);
impl_Geometry!(V3<f64>, f64);
impl_Geometry!(V4<f64>, f64);

/// Cross product of 3D vectors.
pub trait Cross: Sized {
  fn cross(&self, other: impl Into<Self>) -> Self;
}

impl Cross for Expr<V3<f32>> {
  fn cross(&self, other: impl Into<Self>) -> Self {
    call(ErasedFunHandle::Cross, vec![self.erased.clone(), other.into().erased])
  }
}

impl Cross for Expr<V3<f64>> {
  fn cross(&self, other: impl Into<Self>) -> Self {
    call(ErasedFunHandle::Cross, vec![self.erased.clone(), other.into().erased])
  }
}

/// Integer dot product.
pub trait IntegerDot {
  type Scalar;

  fn dot(&self, other: impl Into<Self>) -> Self::Scalar
  where
    Self: Sized;
}

macro_rules! impl_IntegerDot {
  ($($t:ty => $s:ty),*) => {
    $(
      impl IntegerDot for Expr<$t> {
        type Scalar = Expr<$s>;

        fn dot(&self, other: impl Into<Self>) -> Self::Scalar {
          call(ErasedFunHandle::Dot, vec![self.erased.clone(), other.into().erased])
        }
      }
    )*
  };
}

impl_IntegerDot!(V2<i32> => i32, V3<i32> => i32, V4<i32> => i32, V2<u32> => u32, V3<u32> => u32, V4<u32> => u32);

pub trait Matrices {
  type Transposed;
  type Scalar;

  fn transpose(&self) -> Self::Transposed;
}

/// Square matrices.
pub trait SquareMatrices: Matrices {
  fn determinant(&self) -> Self::Scalar;

  fn inverse(&self) -> Self
  where
    Self: Sized;
}

macro_rules! impl_Matrices {
  ($($m:ty => $t:ty, $s:ty);* $(;)?) => {
    $(
      impl Matrices for Expr<$m> {
        type Transposed = Expr<$t>;
        type Scalar = Expr<$s>;

        fn transpose(&self) -> Self::Transposed {
          call(ErasedFunHandle::Transpose, vec![self.erased.clone()])
        }
      }
    )*
  };
}

impl_Matrices! {
  M22 => M22, f32;
  M23 => M32, f32;
  M24 => M42, f32;
  M32 => M23, f32;
  M33 => M33, f32;
  M34 => M43, f32;
  M42 => M24, f32;
  M43 => M34, f32;
  M44 => M44, f32;
  DM22 => DM22, f64;
  DM33 => DM33, f64;
  DM44 => DM44, f64;
}

macro_rules! impl_SquareMatrices {
  ($($m:ty),*) => {
    $(
      impl SquareMatrices for Expr<$m> {
        fn determinant(&self) -> Self::Scalar {
          call(ErasedFunHandle::Determinant, vec![self.erased.clone()])
        }

        fn inverse(&self) -> Self {
          call(ErasedFunHandle::Inverse, vec![self.erased.clone()])
        }
      }
    )*
  };
}

impl_SquareMatrices!(M22, M33, M44, DM22, DM33, DM44);

/// Reductions of boolean vectors.
pub trait VectorRelational {
  /// Whether any component is true.
  fn any(&self) -> Expr<bool>;

  /// Whether all components are true.
  fn all(&self) -> Expr<bool>;
}

macro_rules! impl_VectorRelational {
  ($($t:ty),*) => {
    $(
      impl VectorRelational for Expr<$t> {
        fn any(&self) -> Expr<bool> {
          call(ErasedFunHandle::Any, vec![self.erased.clone()])
        }

        fn all(&self) -> Expr<bool> {
          call(ErasedFunHandle::All, vec![self.erased.clone()])
        }
      }
    )*
  };
}

impl_VectorRelational!(V2<bool>, V3<bool>, V4<bool>);

/// Bit manipulation.
pub trait Bits {
  /// Number of bits set.
  fn bit_count(&self) -> Self;

  fn bit_reverse(&self) -> Self;

  /// Index of the least significant bit set, `-1` if none.
  fn find_lsb(&self) -> Self;

  /// Index of the most significant bit different from the sign bit, `-1` if none.
  fn find_msb(&self) -> Self;
}

macro_rules! impl_Bits {
  ($($t:ty),*) => {
    $(
      impl Bits for Expr<$t> {
        unary_methods! {
          bit_count => BitCount,
          bit_reverse => BitfieldReverse,
          find_lsb => FindLSB,
          find_msb => FindMSB,
        }
      }
    )*
  };
}

impl_Bits!(i32, V2<i32>, V3<i32>, V4<i32>, u32, V2<u32>, V3<u32>, V4<u32>);

/// Screen-space derivatives; fragment shaders only.
pub trait Derivatives {
  fn dfdx(&self) -> Self;

  fn dfdy(&self) -> Self;

  /// Sum of the absolute derivatives in x and y.
  fn fwidth(&self) -> Self;

  fn dfdx_fine(&self) -> Self;

  fn dfdy_fine(&self) -> Self;

  fn fwidth_fine(&self) -> Self;

  fn dfdx_coarse(&self) -> Self;

  fn dfdy_coarse(&self) -> Self;

  fn fwidth_coarse(&self) -> Self;
}

macro_rules! impl_Derivatives {
  ($($t:ty),*) => {
    $(
      impl Derivatives for Expr<$t> {
        unary_methods! {
          dfdx => DFDX,
          dfdy => DFDY,
          fwidth => FWidth,
          dfdx_fine => DFDXFine,
          dfdy_fine => DFDYFine,
          fwidth_fine => FWidthFine,
          dfdx_coarse => DFDXCoarse,
          dfdy_coarse => DFDYCoarse,
          fwidth_coarse => FWidthCoarse,
        }
      }
    )*
  };
}

impl_Derivatives!(f32, V2<f32>, V3<f32>, V4<f32>);

/// Pack four normalized unsigned values into the bytes of a `u32`.
pub fn pack_unorm4x8(v: impl Into<Expr<V4<f32>>>) -> Expr<u32> {
  call(ErasedFunHandle::PackUnorm4x8, vec![v.into().erased])
}

/// Pack four normalized signed values into the bytes of a `u32`.
pub fn pack_snorm4x8(v: impl Into<Expr<V4<f32>>>) -> Expr<u32> {
  call(ErasedFunHandle::PackSnorm4x8, vec![v.into().erased])
}

pub fn unpack_unorm4x8(p: impl Into<Expr<u32>>) -> Expr<V4<f32>> {
  call(ErasedFunHandle::UnpackUnorm4x8, vec![p.into().erased])
}

pub fn unpack_snorm4x8(p: impl Into<Expr<u32>>) -> Expr<V4<f32>> {
  call(ErasedFunHandle::UnpackSnorm4x8, vec![p.into().erased])
}

/// Pack two values as half-precision floats, the first one in the low bits.
pub fn pack_half2x16(v: impl Into<Expr<V2<f32>>>) -> Expr<u32> {
  call(ErasedFunHandle::PackHalf2x16, vec![v.into().erased])
}

pub fn unpack_half2x16(p: impl Into<Expr<u32>>) -> Expr<V2<f32>> {
  call(ErasedFunHandle::UnpackHalf2x16, vec![p.into().erased])
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{lit, types::Type};

  #[test]
  fn threshold_arguments_come_first() {
    let x = lit!(0.5f32);
    let e = x.smooth_step(lit!(0.25f32), lit!(0.75f32));

    match e.erased().node() {
      ExprNode::FunCall(ErasedFunHandle::SmoothStep, args) => {
        assert_eq!(args[0], lit!(0.25f32).erase());
        assert_eq!(args[1], lit!(0.75f32).erase());
        assert_eq!(args[2], x.erase());
      }
      node => panic!("unexpected node {:?}", node),
    }
  }

  #[test]
  fn geometry_result_types() {
    let v = lit!(1f32, 0., 0.);
    assert_eq!(v.length().erased().ty(), &Type::Scalar(crate::types::ScalarType::Float));
    assert_eq!(v.cross(lit!(0f32, 1., 0.)).erased().ty(), v.erased().ty());

    let m: Expr<M23> = Expr::new(ExprNode::Construct(Vec::new()));
    assert_eq!(m.transpose().erased().ty(), &M32::ty());
  }

  #[test]
  fn integer_dot() {
    let a = lit!(1i32, 2, 3);
    let d = IntegerDot::dot(&a, lit!(4i32, 5, 6));
    assert_eq!(d.erased().ty(), &i32::ty());
  }
}
