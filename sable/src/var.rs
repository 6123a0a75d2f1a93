//! Assignable places.

use std::ops;

use crate::{
  expr::{lookup, ArrayIndex, ErasedExpr, Expr},
  scope::ScopedHandle,
  types::ToType,
};

/// Assignable place: a function variable, a built-in output, a buffer element, or an element, field or swizzle of
/// another place.
///
/// A [`Var<T>`] dereferences to the [`Expr<T>`] reading its current value, and is written with
/// [`Scope::set`](crate::scope::Scope::set). Reads after a write see the written value.
#[derive(Debug)]
pub struct Var<T>(pub Expr<T>)
where
  T: ?Sized;

impl<T> Clone for Var<T>
where
  T: ?Sized,
{
  fn clone(&self) -> Self {
    Var(self.0.clone())
  }
}

impl<'a, T> From<&'a Var<T>> for Var<T>
where
  T: ?Sized,
{
  fn from(v: &'a Self) -> Self {
    Var(v.0.clone())
  }
}

impl<T> From<Var<T>> for Expr<T>
where
  T: ?Sized,
{
  fn from(v: Var<T>) -> Self {
    v.0
  }
}

impl<'a, T> From<&'a Var<T>> for Expr<T>
where
  T: ?Sized,
{
  fn from(v: &'a Var<T>) -> Self {
    v.0.clone()
  }
}

impl<T> Var<T>
where
  T: ?Sized,
{
  /// Create a new [`Var<T>`] from a [`ScopedHandle`].
  pub(crate) fn new(handle: ScopedHandle) -> Self
  where
    T: ToType,
  {
    Self(Expr::from_erased(ErasedExpr::var(T::ty(), handle)))
  }

  /// Create a variable out of a place expression (element, field or swizzle of another variable).
  pub(crate) fn from_erased(erased: ErasedExpr) -> Self {
    Var(Expr::from_erased(erased))
  }

  /// Current value of the variable, as an expression.
  ///
  /// Most functions take `impl Into<Expr<T>>` and accept variables directly; this is for the few places where the
  /// conversion cannot be inferred, such as method calls on the value.
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let v = s.var(123);
  /// let doubled = s.var(v.to_expr() * 2);
  /// #   })
  /// # });
  /// ```
  pub fn to_expr(&self) -> Expr<T> {
    self.0.clone()
  }
}

impl<T> Var<[T]>
where
  T: ToType,
{
  /// Element of a runtime-sized array; the element is itself assignable.
  pub fn at(&self, index: impl ArrayIndex) -> Var<T> {
    Var(lookup(&self.0.erased, index))
  }
}

impl<T, const N: usize> Var<[T; N]>
where
  T: ToType,
{
  /// Element of an array; the element is itself assignable.
  pub fn at(&self, index: impl ArrayIndex) -> Var<T> {
    Var(lookup(&self.0.erased, index))
  }
}

impl<T> ops::Deref for Var<T>
where
  T: ?Sized,
{
  type Target = Expr<T>;

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{expr::ExprNode, lit, scope::Scope};

  #[test]
  fn element_of_array_var_is_var() {
    let mut scope = Scope::<()>::new(0);
    let a = scope.var(lit!([1, 2, 3]));
    let elem = a.at(1);

    match elem.erased().node() {
      ExprNode::ArrayLookup { object, index } => {
        assert_eq!(object.as_handle(), Some(&ScopedHandle::fun_var(0, 0)));
        assert_eq!(index.as_literal(), Some(crate::expr::Literal::Int(1)));
      }
      node => panic!("unexpected node {:?}", node),
    }
  }
}
