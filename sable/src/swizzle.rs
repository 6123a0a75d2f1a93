//! Swizzles: reading and writing vector channels in any order.

use crate::{
  expr::{ErasedExpr, Expr, ExprNode},
  types::{ToType, V2, V3, V4},
  var::Var,
};

/// Channel of a vector.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SwizzleSelector {
  X,
  Y,
  Z,
  W,
}

impl SwizzleSelector {
  /// Component index selected.
  pub const fn index(self) -> u32 {
    match self {
      SwizzleSelector::X => 0,
      SwizzleSelector::Y => 1,
      SwizzleSelector::Z => 2,
      SwizzleSelector::W => 3,
    }
  }
}

/// Channels picked by a swizzle, in output order; the variant gives the size of the output.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Swizzle {
  D1(SwizzleSelector),
  D2(SwizzleSelector, SwizzleSelector),
  D3(SwizzleSelector, SwizzleSelector, SwizzleSelector),
  D4(SwizzleSelector, SwizzleSelector, SwizzleSelector, SwizzleSelector),
}

impl Swizzle {
  /// Selected component indices, in output order.
  pub fn indices(&self) -> Vec<u32> {
    match *self {
      Swizzle::D1(a) => vec![a.index()],
      Swizzle::D2(a, b) => vec![a.index(), b.index()],
      Swizzle::D3(a, b, c) => vec![a.index(), b.index(), c.index()],
      Swizzle::D4(a, b, c, d) => vec![a.index(), b.index(), c.index(), d.index()],
    }
  }

  /// Whether a component is selected more than once; such swizzles cannot be assigned to.
  pub fn has_duplicates(&self) -> bool {
    let indices = self.indices();
    indices.iter().enumerate().any(|(i, a)| indices[i + 1..].contains(a))
  }
}

/// Vectors that can be swizzled with the selection `S`.
///
/// A single [`SwizzleSelector`] extracts a scalar; arrays of two to four selectors build a vector of that size, as
/// long as the source has every selected channel.
pub trait Swizzlable<S> {
  type Output;

  fn swizzle(&self, sw: S) -> Self::Output;
}

fn swizzled<R>(e: &ErasedExpr, sw: Swizzle) -> Expr<R>
where
  R: ToType,
{
  Expr::new(ExprNode::Swizzle(e.clone(), sw))
}

macro_rules! impl_Swizzlable {
  ($v:ident, $sel:ty, $out:ty, |$s:pat_param| $sw:expr) => {
    impl<T> Swizzlable<$sel> for Expr<$v<T>>
    where
      $out: ToType,
    {
      type Output = Expr<$out>;

      fn swizzle(&self, $s: $sel) -> Self::Output {
        swizzled(&self.erased, $sw)
      }
    }

    impl<T> Swizzlable<$sel> for Var<$v<T>>
    where
      $out: ToType,
    {
      type Output = Var<$out>;

      fn swizzle(&self, $s: $sel) -> Self::Output {
        Var(swizzled(&self.0.erased, $sw))
      }
    }
  };
}

impl_Swizzlable!(V2, SwizzleSelector, T, |a| Swizzle::D1(a));
impl_Swizzlable!(V2, [SwizzleSelector; 2], V2<T>, |[a, b]| Swizzle::D2(a, b));
impl_Swizzlable!(V3, SwizzleSelector, T, |a| Swizzle::D1(a));
impl_Swizzlable!(V3, [SwizzleSelector; 2], V2<T>, |[a, b]| Swizzle::D2(a, b));
impl_Swizzlable!(V3, [SwizzleSelector; 3], V3<T>, |[a, b, c]| Swizzle::D3(a, b, c));
impl_Swizzlable!(V4, SwizzleSelector, T, |a| Swizzle::D1(a));
impl_Swizzlable!(V4, [SwizzleSelector; 2], V2<T>, |[a, b]| Swizzle::D2(a, b));
impl_Swizzlable!(V4, [SwizzleSelector; 3], V3<T>, |[a, b, c]| Swizzle::D3(a, b, c));
impl_Swizzlable!(V4, [SwizzleSelector; 4], V4<T>, |[a, b, c, d]| Swizzle::D4(a, b, c, d));

macro_rules! component_traits {
  ($($trait:ident: $name:ident / $color:ident => $selector:ident for $($v:ident),*;)*) => {
    $(
      #[doc = concat!(
        "Vectors with a `", stringify!($name), "` component, also named `", stringify!($color), "`.\n\n",
        "Shorthand for `sw!(e, .", stringify!($name), ")`."
      )]
      pub trait $trait {
        type Output;

        fn $name(&self) -> Self::Output;

        fn $color(&self) -> Self::Output {
          self.$name()
        }
      }

      $(
        impl<T> $trait for Expr<$v<T>>
        where
          T: ToType,
        {
          type Output = Expr<T>;

          fn $name(&self) -> Self::Output {
            self.swizzle(SwizzleSelector::$selector)
          }
        }

        impl<T> $trait for Var<$v<T>>
        where
          T: ToType,
        {
          type Output = Var<T>;

          fn $name(&self) -> Self::Output {
            self.swizzle(SwizzleSelector::$selector)
          }
        }
      )*
    )*
  };
}

component_traits! {
  HasX: x / r => X for V2, V3, V4;
  HasY: y / g => Y for V2, V3, V4;
  HasZ: z / b => Z for V3, V4;
  HasW: w / a => W for V4;
}

/// Channel names accepted by [`sw!`]: `xyzw` for positions, `rgba` for colors.
#[doc(hidden)]
#[allow(non_upper_case_globals)]
pub mod channel {
  use super::SwizzleSelector;

  pub const x: SwizzleSelector = SwizzleSelector::X;
  pub const y: SwizzleSelector = SwizzleSelector::Y;
  pub const z: SwizzleSelector = SwizzleSelector::Z;
  pub const w: SwizzleSelector = SwizzleSelector::W;

  pub const r: SwizzleSelector = x;
  pub const g: SwizzleSelector = y;
  pub const b: SwizzleSelector = z;
  pub const a: SwizzleSelector = w;
}

/// Swizzle an expression or a variable.
///
/// `sw!(color, .b.g.r)` reorders the first three channels of `color`; `sw!(v, .x.x)` repeats one. Channels are named
/// `x`, `y`, `z`, `w` or `r`, `g`, `b`, `a`. Swizzling a [`Var`] without repeating a channel gives a [`Var`] that can
/// be assigned to. [`Swizzlable`] lists the supported shapes.
#[macro_export]
macro_rules! sw {
  ($e:expr, . $a:ident) => {
    $e.swizzle($crate::swizzle::channel::$a)
  };

  ($e:expr, $(. $c:ident)+) => {
    $e.swizzle([$($crate::swizzle::channel::$c),+])
  };
}

#[cfg(test)]
mod test {
  use crate::{
    scope::{Scope, ScopedHandle},
    vec2, vec4,
  };

  use super::*;

  #[test]
  fn swizzling() {
    let mut scope = Scope::<()>::new(0);
    let foo = scope.var(vec2![1, 2]);
    let foo_xy: Var<V2<_>> = sw!(foo, .x.y);
    let foo_xx: Var<V2<_>> = sw!(foo, .x.x);
    let var = ErasedExpr::var(<V2<i32>>::ty(), ScopedHandle::fun_var(0, 0));

    assert_eq!(
      foo_xy.erased().node(),
      &ExprNode::Swizzle(var.clone(), Swizzle::D2(SwizzleSelector::X, SwizzleSelector::Y))
    );
    assert_eq!(
      foo_xx.erased().node(),
      &ExprNode::Swizzle(var, Swizzle::D2(SwizzleSelector::X, SwizzleSelector::X))
    );
  }

  #[test]
  fn duplicate_components() {
    assert!(Swizzle::D2(SwizzleSelector::X, SwizzleSelector::X).has_duplicates());
    assert!(!Swizzle::D3(SwizzleSelector::Z, SwizzleSelector::X, SwizzleSelector::Y).has_duplicates());
    assert_eq!(Swizzle::D3(SwizzleSelector::Z, SwizzleSelector::X, SwizzleSelector::Y).indices(), vec![2, 0, 1]);
  }

  #[test]
  fn color_channels() {
    let rgba: Expr<V4<f32>> = vec4![0.25f32, 0.5f32, 0.75f32, 1f32];

    assert_eq!(sw!(rgba, .b.g.r).erased, sw!(rgba, .z.y.x).erased);
    assert_eq!(rgba.a().erased, rgba.w().erased);
  }

  #[test]
  fn has_x_y_z_w() {
    let xyzw: Expr<V4<i32>> = vec4![1, 2, 3, 4];
    let x: Expr<i32> = sw!(xyzw, .x);
    let y: Expr<i32> = sw!(xyzw, .y);
    let z: Expr<i32> = sw!(xyzw, .z);
    let w: Expr<i32> = sw!(xyzw, .w);

    assert_eq!(xyzw.x().erased, x.erased);
    assert_eq!(xyzw.y().erased, y.erased);
    assert_eq!(xyzw.z().erased, z.erased);
    assert_eq!(xyzw.w().erased, w.erased);
  }
}
