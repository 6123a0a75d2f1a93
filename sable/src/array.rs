//! Fixed-size arrays: function-local [`VArray`] and workgroup-shared [`WArray`], [`WArray2`] and [`WArray3`].
//!
//! Shared arrays are declared with [`StageBuilder::shared_array`](crate::stage::StageBuilder::shared_array) and its
//! 2D and 3D variants; multi-dimensional arrays are stored flat, with `x` varying fastest.

use std::marker::PhantomData;

use crate::{
  error::UsageError,
  expr::{lookup, ArrayIndex, ErasedExpr, Expr},
  fun::Return,
  scope::Scope,
  types::{ToType, Type},
  var::Var,
};

/// Function-local array which length is only known when the shader is built.
#[derive(Clone, Debug)]
pub struct VArray<T> {
  erased: ErasedExpr,
  len: u32,
  _phantom: PhantomData<T>,
}

impl<T> VArray<T>
where
  T: ToType,
{
  /// Element at `index`; the element is assignable.
  pub fn at(&self, index: impl ArrayIndex) -> Var<T> {
    Var(lookup(&self.erased, index))
  }

  pub fn len(&self) -> u32 {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}

impl<R> Scope<R>
where
  Return: From<R>,
{
  /// Declare a zero-initialized array of `len` elements in the current scope.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let weights = s.array::<f32>(5);
  /// s.set(weights.at(0), 0.25);
  /// #   })
  /// # });
  /// ```
  pub fn array<T>(&mut self, len: u32) -> VArray<T>
  where
    T: ToType,
  {
    if len == 0 {
      self.erased.error(UsageError::NonPositiveArraySize {
        name: format!("[{}]", T::ty()),
      });
    }

    let ty = Type::Array(Box::new(T::ty()), len);
    let handle = self.erased.declare(ty.clone(), None);

    VArray {
      erased: ErasedExpr::var(ty, handle),
      len,
      _phantom: PhantomData,
    }
  }
}

fn to_u32(e: impl Into<Expr<u32>>) -> Expr<u32> {
  e.into()
}

/// Workgroup-shared array.
#[derive(Clone, Debug)]
pub struct WArray<T> {
  erased: ErasedExpr,
  len: u32,
  _phantom: PhantomData<T>,
}

impl<T> WArray<T>
where
  T: ToType,
{
  pub(crate) fn new(erased: ErasedExpr, len: u32) -> Self {
    Self {
      erased,
      len,
      _phantom: PhantomData,
    }
  }

  /// Element at `index`; the element is assignable.
  pub fn at(&self, index: impl ArrayIndex) -> Var<T> {
    Var(lookup(&self.erased, index))
  }

  pub fn len(&self) -> u32 {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}

/// Workgroup-shared 2D array, stored row by row.
#[derive(Clone, Debug)]
pub struct WArray2<T> {
  erased: ErasedExpr,
  dims: [u32; 2],
  _phantom: PhantomData<T>,
}

impl<T> WArray2<T>
where
  T: ToType,
{
  pub(crate) fn new(erased: ErasedExpr, dims: [u32; 2]) -> Self {
    Self {
      erased,
      dims,
      _phantom: PhantomData,
    }
  }

  /// Element at column `x` of row `y`.
  pub fn at(&self, x: impl Into<Expr<u32>>, y: impl Into<Expr<u32>>) -> Var<T> {
    let index = to_u32(y) * self.dims[0] + to_u32(x);
    Var(lookup(&self.erased, index))
  }

  /// `[width, height]`.
  pub fn dims(&self) -> [u32; 2] {
    self.dims
  }

  /// The array seen as a flat [`WArray`] of `width × height` elements.
  pub fn flat(&self) -> WArray<T> {
    WArray::new(self.erased.clone(), self.dims[0] * self.dims[1])
  }
}

/// Workgroup-shared 3D array, stored slice by slice.
#[derive(Clone, Debug)]
pub struct WArray3<T> {
  erased: ErasedExpr,
  dims: [u32; 3],
  _phantom: PhantomData<T>,
}

impl<T> WArray3<T>
where
  T: ToType,
{
  pub(crate) fn new(erased: ErasedExpr, dims: [u32; 3]) -> Self {
    Self {
      erased,
      dims,
      _phantom: PhantomData,
    }
  }

  pub fn at(&self, x: impl Into<Expr<u32>>, y: impl Into<Expr<u32>>, z: impl Into<Expr<u32>>) -> Var<T> {
    let [w, h, _] = self.dims;
    let index = (to_u32(z) * h + to_u32(y)) * w + to_u32(x);
    Var(lookup(&self.erased, index))
  }

  /// `[width, height, depth]`.
  pub fn dims(&self) -> [u32; 3] {
    self.dims
  }

  pub fn flat(&self) -> WArray<T> {
    let [w, h, d] = self.dims;
    WArray::new(self.erased.clone(), w * h * d)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    expr::{BinOp, ExprNode, Literal},
    scope::{ScopeInstr, ScopedHandle},
  };

  #[test]
  fn local_array_declaration() {
    let mut scope = Scope::<()>::new(0);
    let a = scope.array::<i32>(4);
    scope.set(a.at(2), 7);

    assert_eq!(a.len(), 4);
    assert_eq!(
      scope.erased.instructions[0],
      ScopeInstr::VarDecl {
        ty: <[i32; 4]>::ty(),
        handle: ScopedHandle::fun_var(0, 0),
        init_value: None,
      }
    );
    assert!(scope.erased.errors.is_empty());
  }

  #[test]
  fn empty_local_array() {
    let mut scope = Scope::<()>::new(0);
    let _ = scope.array::<f32>(0);

    assert!(matches!(
      scope.erased.errors[..],
      [UsageError::NonPositiveArraySize { .. }]
    ));
  }

  #[test]
  fn two_dimensional_index() {
    let ty = <[u32; 12]>::ty();
    let a = WArray2::<u32>::new(ErasedExpr::var(ty, ScopedHandle::shared(0)), [4, 3]);
    let elem = a.at(1u32, 2u32);

    match elem.erased().node() {
      ExprNode::ArrayLookup { index, .. } => match index.node() {
        ExprNode::Binary(BinOp::Add, row, x) => {
          assert_eq!(x.as_literal(), Some(Literal::UInt(1)));
          assert!(matches!(row.node(), ExprNode::Binary(BinOp::Mul, _, w) if w.as_literal() == Some(Literal::UInt(4))));
        }
        node => panic!("unexpected index {:?}", node),
      },
      node => panic!("unexpected node {:?}", node),
    }

    assert_eq!(a.flat().len(), 12);
  }
}
