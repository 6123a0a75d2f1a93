use std::{fmt, marker::PhantomData, ops, rc::Rc};

use crate::{
  error::UsageError,
  fun::ErasedFunHandle,
  scope::ScopedHandle,
  swizzle::Swizzle,
  types::{BitcastTo, CastTo, Matrix, Numeric, ScalarType, ToType, Type, DM22, DM33, DM44, M22, M23, M24, M32, M33, M34, M42, M43, M44, V2, V3, V4},
  var::Var,
};

/// Literal scalar value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
  Bool(bool),
  Int(i32),
  UInt(u32),
  Float(f32),
  Double(f64),
  Int64(i64),
  UInt64(u64),
}

impl Literal {
  pub fn scalar_type(&self) -> ScalarType {
    match self {
      Literal::Bool(_) => ScalarType::Bool,
      Literal::Int(_) => ScalarType::Int,
      Literal::UInt(_) => ScalarType::UInt,
      Literal::Float(_) => ScalarType::Float,
      Literal::Double(_) => ScalarType::Double,
      Literal::Int64(_) => ScalarType::Int64,
      Literal::UInt64(_) => ScalarType::UInt64,
    }
  }

  /// Bit pattern of the literal, zero-extended to 64 bits.
  pub fn bits(&self) -> u64 {
    match *self {
      Literal::Bool(b) => b as u64,
      Literal::Int(i) => i as u32 as u64,
      Literal::UInt(u) => u as u64,
      Literal::Float(f) => f.to_bits() as u64,
      Literal::Double(f) => f.to_bits(),
      Literal::Int64(i) => i as u64,
      Literal::UInt64(u) => u,
    }
  }

  /// Whether the literal is a negative number.
  pub fn is_negative(&self) -> bool {
    match *self {
      Literal::Int(i) => i < 0,
      Literal::Float(f) => f < 0.,
      Literal::Double(f) => f < 0.,
      Literal::Int64(i) => i < 0,
      _ => false,
    }
  }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnOp {
  /// Logical negation of booleans, bitwise complement of integers.
  Not,
  Neg,
}

/// Binary operators.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Shl,
  Shr,
  BitAnd,
  BitOr,
  BitXor,
  And,
  Or,
  Xor,
  Eq,
  Neq,
  Lt,
  Lte,
  Gt,
  Gte,
}

impl BinOp {
  pub fn is_comparison(self) -> bool {
    matches!(
      self,
      BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte
    )
  }
}

/// Node of the expression graph.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprNode {
  Lit(Literal),
  /// Vector, matrix, array or struct built from its parts.
  Construct(Vec<ErasedExpr>),
  Var(ScopedHandle),
  Unary(UnOp, ErasedExpr),
  Binary(BinOp, ErasedExpr, ErasedExpr),
  /// Value-preserving conversion to the type of the node.
  Cast(ErasedExpr),
  /// Bit-preserving reinterpretation as the type of the node.
  Bitcast(ErasedExpr),
  Select(ErasedExpr, ErasedExpr, ErasedExpr),
  FunCall(ErasedFunHandle, Vec<ErasedExpr>),
  Swizzle(ErasedExpr, Swizzle),
  // field expression, as in a struct Foo { float x; }, foo.x is an Expr representing the x field on object foo
  Field { object: ErasedExpr, index: u32 },
  ArrayLookup { object: ErasedExpr, index: ErasedExpr },
  /// Number of elements of a runtime-sized array.
  ArrayLength(ErasedExpr),
  /// Expression that could not be built; compiling it fails with the carried error.
  Invalid(UsageError),
}

/// Type-erased expression.
///
/// Nodes are shared: cloning an expression, or using it in several places, refers to the same node, so that the
/// recorded expressions form a graph rather than a tree.
#[derive(Clone, PartialEq)]
pub struct ErasedExpr {
  pub(crate) ty: Type,
  pub(crate) node: Rc<ExprNode>,
}

impl fmt::Debug for ErasedExpr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}: {}", self.node, self.ty)
  }
}

impl ErasedExpr {
  pub(crate) fn new(ty: Type, node: ExprNode) -> Self {
    Self {
      ty,
      node: Rc::new(node),
    }
  }

  pub(crate) fn lit(lit: Literal) -> Self {
    Self::new(Type::Scalar(lit.scalar_type()), ExprNode::Lit(lit))
  }

  pub(crate) fn var(ty: Type, handle: ScopedHandle) -> Self {
    Self::new(ty, ExprNode::Var(handle))
  }

  pub(crate) fn invalid(ty: Type, error: UsageError) -> Self {
    Self::new(ty, ExprNode::Invalid(error))
  }

  pub(crate) fn binary(ty: Type, op: BinOp, a: ErasedExpr, b: ErasedExpr) -> Self {
    Self::new(ty, ExprNode::Binary(op, a, b))
  }

  pub fn ty(&self) -> &Type {
    &self.ty
  }

  pub fn node(&self) -> &ExprNode {
    &self.node
  }

  /// Identity of the shared node.
  pub(crate) fn id(&self) -> *const ExprNode {
    Rc::as_ptr(&self.node)
  }

  pub(crate) fn as_literal(&self) -> Option<Literal> {
    match *self.node {
      ExprNode::Lit(lit) => Some(lit),
      _ => None,
    }
  }

  pub(crate) fn as_handle(&self) -> Option<&ScopedHandle> {
    match &*self.node {
      ExprNode::Var(handle) => Some(handle),
      _ => None,
    }
  }
}

/// Expression representation.
///
/// An expression is anything that carries a (typed) value and that can be combined in various ways with other
/// expressions. A literal, a constant or a variable are all expressions. The sum (as in `a + b`) of two expressions is
/// also an expression. A function call returning an expression is also an expression, as in `a * sin(b)`. Accessing an
/// element in an array via an index is also an expression, e.g. `levels[y * HEIGHT + x] * size`. The same thing
/// applies to field access, swizzling, etc.
///
/// Expressions are side effect free. Building one records a node and computes nothing; the node is evaluated where the
/// statement using it is recorded. If `x` is a variable (see [`Var`]), then `x * 10` is an expression reading `x` at
/// the point it is used, not at the point it is built.
///
/// # Literals
///
/// Any type `T` that defines an implementor `From<T> for Expr<T>` can be used as literal. You can then use, for
/// instance, `1.into()`, `Expr::from(1)`, etc. The [`lit!`](lit) macro does the lifting for you, and also accepts
/// more forms to create vector literals.
///
/// Because of how Rust infers types, ambiguities might occur when using literals. For instance, in `1 + 2`, the type
/// of `1` is ambiguous because of how the implementors for [`Add`](std::ops::Add) are picked. In such a case, use
/// [`lit!`](lit).
///
/// ## Automatic lifting
///
/// If `x` has the type `Expr<i32>`, then `x + 1` is the same as `x + lit!(1)`. You can use this property with
/// literals too: `lit!(1) + 2 + 3 + 4`.
///
/// # Conversions
///
/// There is no implicit conversion between scalar kinds: `lit!(1) + lit!(1.)` does not compile. Use [`Expr::cast`]
/// for value-preserving conversions and [`Expr::bitcast`] to reinterpret bits.
pub struct Expr<T>
where
  T: ?Sized,
{
  pub(crate) erased: ErasedExpr,
  _phantom: PhantomData<T>,
}

impl<T> fmt::Debug for Expr<T>
where
  T: ?Sized,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Expr").field(&self.erased).finish()
  }
}

impl<T> From<&'_ Self> for Expr<T>
where
  T: ?Sized,
{
  fn from(e: &Self) -> Self {
    Self::from_erased(e.erased.clone())
  }
}

impl<T> Clone for Expr<T>
where
  T: ?Sized,
{
  fn clone(&self) -> Self {
    Self::from_erased(self.erased.clone())
  }
}

impl<T> Expr<T>
where
  T: ?Sized,
{
  /// Type an [`ErasedExpr`] and return it wrapped in [`Expr<T>`].
  pub(crate) const fn from_erased(erased: ErasedExpr) -> Self {
    Self {
      erased,
      _phantom: PhantomData,
    }
  }

  /// Build a new node typed with `T`.
  pub(crate) fn new(node: ExprNode) -> Self
  where
    T: ToType,
  {
    Self::from_erased(ErasedExpr::new(T::ty(), node))
  }

  /// Forget the type of the expression.
  pub fn erase(self) -> ErasedExpr {
    self.erased
  }

  /// The type-erased representation of this expression.
  pub fn erased(&self) -> &ErasedExpr {
    &self.erased
  }

  /// Equality expression.
  ///
  /// This method builds an expression representing the equality between two expressions. Vectors are equal when all
  /// their components are.
  ///
  /// # Return
  ///
  /// An [`Expr<bool>`] representing the equality between the two input expressions.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{lit, vec2};
  ///
  /// let _ = lit!(1).eq(1); // 1 == 1;
  /// let _ = vec2!(1f32, 2.).eq(vec2!(0., 0.)); // vec2(1., 2.) == vec2(0., 0.)
  /// ```
  pub fn eq(&self, rhs: impl Into<Expr<T>>) -> Expr<bool> {
    comparison(BinOp::Eq, self.erased.clone(), rhs.into().erased)
  }

  /// Inequality expression.
  ///
  /// # Return
  ///
  /// An [`Expr<bool>`] representing the inequality between the two input expressions.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::lit;
  ///
  /// let _ = lit!(1).neq(1); // 1 != 1;
  /// ```
  pub fn neq(&self, rhs: impl Into<Expr<T>>) -> Expr<bool> {
    comparison(BinOp::Neq, self.erased.clone(), rhs.into().erased)
  }
}

fn comparison(op: BinOp, a: ErasedExpr, b: ErasedExpr) -> Expr<bool> {
  Expr::new(ExprNode::Binary(op, a, b))
}

impl<T> Expr<T>
where
  T: Numeric + PartialOrd,
{
  /// Less-than expression.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::lit;
  ///
  /// let _ = lit!(1).lt(2); // 1 < 2;
  /// ```
  pub fn lt(&self, rhs: impl Into<Expr<T>>) -> Expr<bool> {
    comparison(BinOp::Lt, self.erased.clone(), rhs.into().erased)
  }

  /// Less-than-or-equal expression.
  pub fn lte(&self, rhs: impl Into<Expr<T>>) -> Expr<bool> {
    comparison(BinOp::Lte, self.erased.clone(), rhs.into().erased)
  }

  /// Greater-than expression.
  pub fn gt(&self, rhs: impl Into<Expr<T>>) -> Expr<bool> {
    comparison(BinOp::Gt, self.erased.clone(), rhs.into().erased)
  }

  /// Greater-than-or-equal expression.
  pub fn gte(&self, rhs: impl Into<Expr<T>>) -> Expr<bool> {
    comparison(BinOp::Gte, self.erased.clone(), rhs.into().erased)
  }
}

impl<T> Expr<T>
where
  T: ToType,
{
  /// Value-preserving conversion.
  ///
  /// Integers converted to floating-point numbers are rounded, floating-point numbers converted to integers are
  /// truncated towards zero and booleans convert to `0` and `1`. Converting to the same type is the identity.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Expr, lit};
  ///
  /// let x: Expr<f32> = lit!(3).cast();
  /// let y: Expr<u32> = lit!(2.5f32).cast(); // 2
  /// ```
  pub fn cast<U>(&self) -> Expr<U>
  where
    T: CastTo<U>,
    U: ToType,
  {
    Expr::new(ExprNode::Cast(self.erased.clone()))
  }

  /// Bit-preserving reinterpretation.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Expr, lit};
  ///
  /// let bits: Expr<u32> = lit!(1f32).bitcast(); // 0x3f800000
  /// ```
  pub fn bitcast<U>(&self) -> Expr<U>
  where
    T: BitcastTo<U>,
    U: ToType,
  {
    Expr::new(ExprNode::Bitcast(self.erased.clone()))
  }
}

/// Value-preserving conversion; see [`Expr::cast`].
pub fn static_cast<U, T>(e: impl Into<Expr<T>>) -> Expr<U>
where
  T: ToType + CastTo<U>,
  U: ToType,
{
  e.into().cast()
}

/// Bit-preserving reinterpretation; see [`Expr::bitcast`].
pub fn reinterpret_cast<U, T>(e: impl Into<Expr<T>>) -> Expr<U>
where
  T: ToType + BitcastTo<U>,
  U: ToType,
{
  e.into().bitcast()
}

impl Expr<bool> {
  /// Logical _and_ expression.
  ///
  /// Both sides are always evaluated.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::lit;
  ///
  /// let _ = lit!(true).and(false); // true && false
  /// ```
  pub fn and(&self, rhs: impl Into<Expr<bool>>) -> Expr<bool> {
    Expr::new(ExprNode::Binary(BinOp::And, self.erased.clone(), rhs.into().erased))
  }

  /// Logical _or_ expression.
  ///
  /// Both sides are always evaluated.
  pub fn or(&self, rhs: impl Into<Expr<bool>>) -> Expr<bool> {
    Expr::new(ExprNode::Binary(BinOp::Or, self.erased.clone(), rhs.into().erased))
  }

  /// Logical _exclusive or_ expression.
  pub fn xor(&self, rhs: impl Into<Expr<bool>>) -> Expr<bool> {
    Expr::new(ExprNode::Binary(BinOp::Xor, self.erased.clone(), rhs.into().erased))
  }

  /// Pick `if_true` when the expression holds and `if_false` otherwise; both sides are evaluated.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::lit;
  ///
  /// let x = lit!(3);
  /// let _ = x.lt(0).select(-x.clone(), x);
  /// ```
  pub fn select<T>(&self, if_true: impl Into<Expr<T>>, if_false: impl Into<Expr<T>>) -> Expr<T>
  where
    T: ToType,
  {
    Expr::new(ExprNode::Select(
      self.erased.clone(),
      if_true.into().erased,
      if_false.into().erased,
    ))
  }
}

/// Values usable as array indices: signed and unsigned integers, lifted or not.
pub trait ArrayIndex {
  fn into_index(self) -> ErasedExpr;
}

macro_rules! impl_ArrayIndex {
  ($t:ty) => {
    impl ArrayIndex for $t {
      fn into_index(self) -> ErasedExpr {
        Expr::from(self).erased
      }
    }

    impl ArrayIndex for Expr<$t> {
      fn into_index(self) -> ErasedExpr {
        self.erased
      }
    }

    impl<'a> ArrayIndex for &'a Expr<$t> {
      fn into_index(self) -> ErasedExpr {
        self.erased.clone()
      }
    }

    impl ArrayIndex for Var<$t> {
      fn into_index(self) -> ErasedExpr {
        self.0.erased
      }
    }

    impl<'a> ArrayIndex for &'a Var<$t> {
      fn into_index(self) -> ErasedExpr {
        self.0.erased.clone()
      }
    }
  };
}

impl_ArrayIndex!(i32);
impl_ArrayIndex!(u32);

pub(crate) fn lookup<T>(object: &ErasedExpr, index: impl ArrayIndex) -> Expr<T>
where
  T: ToType,
{
  Expr::new(ExprNode::ArrayLookup {
    object: object.clone(),
    index: index.into_index(),
  })
}

impl<T> Expr<[T]>
where
  T: ToType,
{
  /// Array lookup.
  ///
  /// The expression `a.at(i)` represents an _array lookup_, where `a` is an array, which type must be either
  /// [`Expr<[T]>`](Expr) or [`Expr<[T; N]>`](Expr), and `i` is a signed or unsigned integer.
  ///
  /// # Return
  ///
  /// The resulting [`Expr<T>`] represents the array lookup in `a` at index `i`.
  pub fn at(&self, index: impl ArrayIndex) -> Expr<T> {
    lookup(&self.erased, index)
  }
}

impl<T, const N: usize> Expr<[T; N]>
where
  T: ToType,
{
  /// Array lookup.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::lit;
  ///
  /// let _ = lit!([1, 2, 3]).at(2); // [1, 2, 3][2]
  /// ```
  pub fn at(&self, index: impl ArrayIndex) -> Expr<T> {
    lookup(&self.erased, index)
  }
}

// not
macro_rules! impl_Not_Expr {
  ($t:ty) => {
    impl ops::Not for Expr<$t> {
      type Output = Self;

      fn not(self) -> Self::Output {
        Expr::new(ExprNode::Unary(UnOp::Not, self.erased))
      }
    }

    impl<'a> ops::Not for &'a Expr<$t> {
      type Output = Expr<$t>;

      fn not(self) -> Self::Output {
        Expr::new(ExprNode::Unary(UnOp::Not, self.erased.clone()))
      }
    }

    impl ops::Not for Var<$t> {
      type Output = Expr<$t>;

      fn not(self) -> Self::Output {
        Expr::new(ExprNode::Unary(UnOp::Not, self.0.erased))
      }
    }

    impl<'a> ops::Not for &'a Var<$t> {
      type Output = Expr<$t>;

      fn not(self) -> Self::Output {
        Expr::new(ExprNode::Unary(UnOp::Not, self.0.erased.clone()))
      }
    }
  };
}

macro_rules! impl_Not_Expr_all {
  ($($t:ty),*) => {
    $(
      impl_Not_Expr!($t);
      impl_Not_Expr!(V2<$t>);
      impl_Not_Expr!(V3<$t>);
      impl_Not_Expr!(V4<$t>);
    )*
  };
}

impl_Not_Expr_all!(bool, i32, u32, i64, u64);

// neg
macro_rules! impl_Neg {
  ($t:ty) => {
    impl ops::Neg for Expr<$t> {
      type Output = Self;

      fn neg(self) -> Self::Output {
        Expr::new(ExprNode::Unary(UnOp::Neg, self.erased))
      }
    }

    impl<'a> ops::Neg for &'a Expr<$t> {
      type Output = Expr<$t>;

      fn neg(self) -> Self::Output {
        Expr::new(ExprNode::Unary(UnOp::Neg, self.erased.clone()))
      }
    }

    impl ops::Neg for Var<$t> {
      type Output = Expr<$t>;

      fn neg(self) -> Self::Output {
        Expr::new(ExprNode::Unary(UnOp::Neg, self.0.erased))
      }
    }

    impl<'a> ops::Neg for &'a Var<$t> {
      type Output = Expr<$t>;

      fn neg(self) -> Self::Output {
        Expr::new(ExprNode::Unary(UnOp::Neg, self.0.erased.clone()))
      }
    }
  };
}

macro_rules! impl_Neg_all {
  ($($t:ty),*) => {
    $(
      impl_Neg!($t);
      impl_Neg!(V2<$t>);
      impl_Neg!(V3<$t>);
      impl_Neg!(V4<$t>);
    )*
  };
}

impl_Neg_all!(i32, f32, f64, i64);

fn binary<R>(op: BinOp, a: ErasedExpr, b: ErasedExpr) -> Expr<R>
where
  R: ToType,
{
  Expr::new(ExprNode::Binary(op, a, b))
}

// binary arithmetic and logical (+, -, *, /, %, &, |, ^)
macro_rules! impl_binop_Expr {
  ($op:ident, $meth_name:ident, $a:ty, $b:ty) => {
    impl_binop_Expr!($op, $meth_name, $a, $b, $a);
  };

  ($op:ident, $meth_name:ident, $a:ty, $b:ty, $r:ty) => {
    // expr OP expr
    impl<'a> ops::$op<Expr<$b>> for Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: Expr<$b>) -> Self::Output {
        binary(BinOp::$op, self.erased, rhs.erased)
      }
    }

    // var OP expr
    impl<'a> ops::$op<Expr<$b>> for Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: Expr<$b>) -> Self::Output {
        binary(BinOp::$op, self.0.erased, rhs.erased)
      }
    }

    // expr OP var
    impl<'a> ops::$op<Var<$b>> for Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: Var<$b>) -> Self::Output {
        binary(BinOp::$op, self.erased, rhs.0.erased)
      }
    }

    // var OP var
    impl<'a> ops::$op<Var<$b>> for Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: Var<$b>) -> Self::Output {
        binary(BinOp::$op, self.0.erased, rhs.0.erased)
      }
    }

    // expr OP &expr
    impl<'a> ops::$op<&'a Expr<$b>> for Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: &'a Expr<$b>) -> Self::Output {
        binary(BinOp::$op, self.erased, rhs.erased.clone())
      }
    }

    // var OP &expr
    impl<'a> ops::$op<&'a Expr<$b>> for Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: &'a Expr<$b>) -> Self::Output {
        binary(BinOp::$op, self.0.erased, rhs.erased.clone())
      }
    }

    // expr OP &var
    impl<'a> ops::$op<&'a Var<$b>> for Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: &'a Var<$b>) -> Self::Output {
        binary(BinOp::$op, self.erased, rhs.0.erased.clone())
      }
    }

    // var OP &var
    impl<'a> ops::$op<&'a Var<$b>> for Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: &'a Var<$b>) -> Self::Output {
        binary(BinOp::$op, self.0.erased, rhs.0.erased.clone())
      }
    }

    // &expr OP expr
    impl<'a> ops::$op<Expr<$b>> for &'a Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: Expr<$b>) -> Self::Output {
        binary(BinOp::$op, self.erased.clone(), rhs.erased)
      }
    }

    // &var OP expr
    impl<'a> ops::$op<Expr<$b>> for &'a Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: Expr<$b>) -> Self::Output {
        binary(BinOp::$op, self.0.erased.clone(), rhs.erased)
      }
    }

    // &expr OP var
    impl<'a> ops::$op<Var<$b>> for &'a Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: Var<$b>) -> Self::Output {
        binary(BinOp::$op, self.erased.clone(), rhs.0.erased)
      }
    }

    // &var OP var
    impl<'a> ops::$op<Var<$b>> for &'a Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: Var<$b>) -> Self::Output {
        binary(BinOp::$op, self.0.erased.clone(), rhs.0.erased)
      }
    }

    // &expr OP &expr
    impl<'a> ops::$op<&'a Expr<$b>> for &'a Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: &'a Expr<$b>) -> Self::Output {
        binary(BinOp::$op, self.erased.clone(), rhs.erased.clone())
      }
    }

    // &var OP &expr
    impl<'a> ops::$op<&'a Expr<$b>> for &'a Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: &'a Expr<$b>) -> Self::Output {
        binary(BinOp::$op, self.0.erased.clone(), rhs.erased.clone())
      }
    }

    // &expr OP &var
    impl<'a> ops::$op<&'a Var<$b>> for &'a Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: &'a Var<$b>) -> Self::Output {
        binary(BinOp::$op, self.erased.clone(), rhs.0.erased.clone())
      }
    }

    // &var OP &var
    impl<'a> ops::$op<&'a Var<$b>> for &'a Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: &'a Var<$b>) -> Self::Output {
        binary(BinOp::$op, self.0.erased.clone(), rhs.0.erased.clone())
      }
    }

    // expr OP t, where t is automatically lifted
    impl<'a> ops::$op<$b> for Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: $b) -> Self::Output {
        binary(BinOp::$op, self.erased, Expr::<$b>::from(rhs).erased)
      }
    }

    // var OP t, where t is automatically lifted
    impl<'a> ops::$op<$b> for Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: $b) -> Self::Output {
        binary(BinOp::$op, self.0.erased, Expr::<$b>::from(rhs).erased)
      }
    }

    // &expr OP t, where t is automatically lifted
    impl<'a> ops::$op<$b> for &'a Expr<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: $b) -> Self::Output {
        binary(BinOp::$op, self.erased.clone(), Expr::<$b>::from(rhs).erased)
      }
    }

    // &var OP t, where t is automatically lifted
    impl<'a> ops::$op<$b> for &'a Var<$a> {
      type Output = Expr<$r>;

      fn $meth_name(self, rhs: $b) -> Self::Output {
        binary(BinOp::$op, self.0.erased.clone(), Expr::<$b>::from(rhs).erased)
      }
    }
  };
}

/// Implement a binary operator for a scalar type and its vectors, with vector-scalar forms.
macro_rules! impl_binop_vn_Expr {
  ($op:ident, $meth_name:ident, $($t:ty),*) => {
    $(
      impl_binop_Expr!($op, $meth_name, $t, $t);
      impl_binop_Expr!($op, $meth_name, V2<$t>, V2<$t>);
      impl_binop_Expr!($op, $meth_name, V2<$t>, $t);
      impl_binop_Expr!($op, $meth_name, V3<$t>, V3<$t>);
      impl_binop_Expr!($op, $meth_name, V3<$t>, $t);
      impl_binop_Expr!($op, $meth_name, V4<$t>, V4<$t>);
      impl_binop_Expr!($op, $meth_name, V4<$t>, $t);
    )*
  };
}

/// Run a macro on all supported types to generate the impl for them.
macro_rules! impl_binarith_Expr {
  ($op:ident, $meth_name:ident) => {
    impl_binop_vn_Expr!($op, $meth_name, i32, u32, f32, f64, i64, u64);
  };
}

impl_binarith_Expr!(Add, add);
impl_binarith_Expr!(Sub, sub);
impl_binarith_Expr!(Mul, mul);
impl_binarith_Expr!(Div, div);
impl_binarith_Expr!(Rem, rem);

// bitwise operators; logical on booleans
impl_binop_vn_Expr!(BitOr, bitor, bool, i32, u32, i64, u64);
impl_binop_vn_Expr!(BitAnd, bitand, bool, i32, u32, i64, u64);
impl_binop_vn_Expr!(BitXor, bitxor, bool, i32, u32, i64, u64);

/// Matrix operators: sums, scaling, matrix-vector and vector-matrix products.
///
/// `$m` has `$c` columns of type `$vr` (rows) and multiplying it on the left by a row vector yields `$vc`.
macro_rules! impl_mat_Expr {
  ($m:ty, $s:ty, $vc:ty, $vr:ty) => {
    impl_binop_Expr!(Add, add, $m, $m);
    impl_binop_Expr!(Sub, sub, $m, $m);
    impl_binop_Expr!(Mul, mul, $m, $s);
    impl_binop_Expr!(Mul, mul, $m, $vc, $vr);
    impl_binop_Expr!(Mul, mul, $vr, $m, $vc);
  };
}

impl_mat_Expr!(M22, f32, V2<f32>, V2<f32>);
impl_mat_Expr!(M23, f32, V2<f32>, V3<f32>);
impl_mat_Expr!(M24, f32, V2<f32>, V4<f32>);
impl_mat_Expr!(M32, f32, V3<f32>, V2<f32>);
impl_mat_Expr!(M33, f32, V3<f32>, V3<f32>);
impl_mat_Expr!(M34, f32, V3<f32>, V4<f32>);
impl_mat_Expr!(M42, f32, V4<f32>, V2<f32>);
impl_mat_Expr!(M43, f32, V4<f32>, V3<f32>);
impl_mat_Expr!(M44, f32, V4<f32>, V4<f32>);
impl_mat_Expr!(DM22, f64, V2<f64>, V2<f64>);
impl_mat_Expr!(DM33, f64, V3<f64>, V3<f64>);
impl_mat_Expr!(DM44, f64, V4<f64>, V4<f64>);

impl_binop_Expr!(Mul, mul, M22, M22);
impl_binop_Expr!(Mul, mul, M33, M33);
impl_binop_Expr!(Mul, mul, M44, M44);
impl_binop_Expr!(Mul, mul, M23, M32, M33);
impl_binop_Expr!(Mul, mul, M32, M23, M22);
impl_binop_Expr!(Mul, mul, M34, M43, M44);
impl_binop_Expr!(Mul, mul, M43, M34, M33);
impl_binop_Expr!(Mul, mul, DM22, DM22);
impl_binop_Expr!(Mul, mul, DM33, DM33);
impl_binop_Expr!(Mul, mul, DM44, DM44);

macro_rules! impl_binshift_Expr {
  ($op:ident, $meth_name:ident, $ty:ty) => {
    // expr OP expr
    impl ops::$op<Expr<u32>> for Expr<$ty> {
      type Output = Expr<$ty>;

      fn $meth_name(self, rhs: Expr<u32>) -> Self::Output {
        binary(BinOp::$op, self.erased, rhs.erased)
      }
    }

    impl<'a> ops::$op<Expr<u32>> for &'a Expr<$ty> {
      type Output = Expr<$ty>;

      fn $meth_name(self, rhs: Expr<u32>) -> Self::Output {
        binary(BinOp::$op, self.erased.clone(), rhs.erased)
      }
    }

    impl<'a> ops::$op<&'a Expr<u32>> for Expr<$ty> {
      type Output = Expr<$ty>;

      fn $meth_name(self, rhs: &'a Expr<u32>) -> Self::Output {
        binary(BinOp::$op, self.erased, rhs.erased.clone())
      }
    }

    impl<'a> ops::$op<&'a Expr<u32>> for &'a Expr<$ty> {
      type Output = Expr<$ty>;

      fn $meth_name(self, rhs: &'a Expr<u32>) -> Self::Output {
        binary(BinOp::$op, self.erased.clone(), rhs.erased.clone())
      }
    }

    impl<'a> ops::$op<&'a Var<u32>> for &'a Var<$ty> {
      type Output = Expr<$ty>;

      fn $meth_name(self, rhs: &'a Var<u32>) -> Self::Output {
        binary(BinOp::$op, self.0.erased.clone(), rhs.0.erased.clone())
      }
    }

    // expr OP bits
    impl ops::$op<u32> for Expr<$ty> {
      type Output = Self;

      fn $meth_name(self, rhs: u32) -> Self::Output {
        binary(BinOp::$op, self.erased, Expr::from(rhs).erased)
      }
    }

    impl<'a> ops::$op<u32> for &'a Expr<$ty> {
      type Output = Expr<$ty>;

      fn $meth_name(self, rhs: u32) -> Self::Output {
        binary(BinOp::$op, self.erased.clone(), Expr::from(rhs).erased)
      }
    }

    impl<'a> ops::$op<u32> for &'a Var<$ty> {
      type Output = Expr<$ty>;

      fn $meth_name(self, rhs: u32) -> Self::Output {
        binary(BinOp::$op, self.0.erased.clone(), Expr::from(rhs).erased)
      }
    }
  };
}

/// Binary shift generating macro.
macro_rules! impl_binshifts_Expr {
  ($op:ident, $meth_name:ident) => {
    impl_binshift_Expr!($op, $meth_name, i32);
    impl_binshift_Expr!($op, $meth_name, V2<i32>);
    impl_binshift_Expr!($op, $meth_name, V3<i32>);
    impl_binshift_Expr!($op, $meth_name, V4<i32>);

    impl_binshift_Expr!($op, $meth_name, u32);
    impl_binshift_Expr!($op, $meth_name, V2<u32>);
    impl_binshift_Expr!($op, $meth_name, V3<u32>);
    impl_binshift_Expr!($op, $meth_name, V4<u32>);

    impl_binshift_Expr!($op, $meth_name, i64);
    impl_binshift_Expr!($op, $meth_name, u64);
  };
}

impl_binshifts_Expr!(Shl, shl);
impl_binshifts_Expr!(Shr, shr);

macro_rules! impl_From_Expr_scalar {
  ($t:ty, $q:ident) => {
    impl Expr<$t> {
      pub fn lit(a: $t) -> Expr<$t> {
        Self::from_erased(ErasedExpr::lit(Literal::$q(a)))
      }
    }

    impl From<$t> for Expr<$t> {
      fn from(a: $t) -> Self {
        Self::lit(a)
      }
    }

    impl<'a> From<&'a $t> for Expr<$t> {
      fn from(a: &'a $t) -> Self {
        Self::lit(*a)
      }
    }
  };
}

impl_From_Expr_scalar!(bool, Bool);
impl_From_Expr_scalar!(i32, Int);
impl_From_Expr_scalar!(u32, UInt);
impl_From_Expr_scalar!(f32, Float);
impl_From_Expr_scalar!(f64, Double);
impl_From_Expr_scalar!(i64, Int64);
impl_From_Expr_scalar!(u64, UInt64);

macro_rules! impl_From_Expr_vn {
  ($v:ident, $($t:ty),*) => {
    $(
      impl Expr<$v<$t>> {
        pub fn lit(a: $v<$t>) -> Expr<$v<$t>> {
          let parts = a.0.iter().map(|&x| Expr::<$t>::lit(x).erased).collect();
          Self::new(ExprNode::Construct(parts))
        }
      }

      impl From<$v<$t>> for Expr<$v<$t>> {
        fn from(a: $v<$t>) -> Self {
          Self::lit(a)
        }
      }

      impl<'a> From<&'a $v<$t>> for Expr<$v<$t>> {
        fn from(a: &'a $v<$t>) -> Self {
          Self::lit(*a)
        }
      }
    )*
  };
}

impl_From_Expr_vn!(V2, bool, i32, u32, f32, f64, i64, u64);
impl_From_Expr_vn!(V3, bool, i32, u32, f32, f64, i64, u64);
impl_From_Expr_vn!(V4, bool, i32, u32, f32, f64, i64, u64);

impl<T, const R: usize, const C: usize> From<Matrix<[[T; R]; C]>> for Expr<Matrix<[[T; R]; C]>>
where
  Matrix<[[T; R]; C]>: ToType,
  T: Copy,
  Expr<T>: From<T>,
{
  fn from(m: Matrix<[[T; R]; C]>) -> Self {
    let ty = <Matrix<[[T; R]; C]> as ToType>::ty();
    let column_ty = ty.element().unwrap_or(Type::Void);
    let columns = m
      .0
      .iter()
      .map(|column| {
        let parts = column.iter().map(|&x| Expr::from(x).erased).collect();
        ErasedExpr::new(column_ty.clone(), ExprNode::Construct(parts))
      })
      .collect();

    Self::from_erased(ErasedExpr::new(ty, ExprNode::Construct(columns)))
  }
}

impl<T, const N: usize> From<[T; N]> for Expr<[T; N]>
where
  Expr<T>: From<T>,
  T: Clone + ToType,
{
  fn from(array: [T; N]) -> Self {
    let array = array.iter().cloned().map(|t| Expr::from(t).erased).collect();
    Self::new(ExprNode::Construct(array))
  }
}

impl<'a, T, const N: usize> From<&'a [T; N]> for Expr<[T; N]>
where
  Expr<T>: From<T>,
  T: Clone + ToType,
{
  fn from(array: &'a [T; N]) -> Self {
    let array = array.iter().cloned().map(|t| Expr::from(t).erased).collect();
    Self::new(ExprNode::Construct(array))
  }
}

impl<T, const N: usize> From<[Expr<T>; N]> for Expr<[T; N]>
where
  T: ToType,
{
  fn from(array: [Expr<T>; N]) -> Self {
    let array = array.iter().map(|e| e.erased.clone()).collect();
    Self::new(ExprNode::Construct(array))
  }
}

impl<'a, T, const N: usize> From<&'a [Expr<T>; N]> for Expr<[T; N]>
where
  T: ToType,
{
  fn from(array: &'a [Expr<T>; N]) -> Self {
    let array = array.iter().map(|e| e.erased.clone()).collect();
    Self::new(ExprNode::Construct(array))
  }
}

/// Create various forms of literal expressions.
///
/// This macro allows you to create _literal expressions_ by lifting Rust constants into the EDSL. The way this is done
/// is via several forms:
///
/// - `lit!(x)` lifts a single Rust expression into the EDSL. It’s isomorphic to `Expr::from(x)`.
/// - `lit!(x, y)` lifts two Rust expressions into the EDSL as a 2D scalar vector. It’s isomorphic to
///   `Expr::from(V2::from([x, y]))`.
/// - `lit!(x, y, z)` lifts three Rust expressions into the EDSL as a 3D scalar vector.
/// - `lit!(x, y, z, w)` lifts four Rust expressions into the EDSL as a 4D scalar vector.
/// - `lit!([a, b, ...])` lifts an array.
///
/// # Examples
///
/// ```
/// use sable::lit;
///
/// let _ = lit!(1);
/// let _ = lit!(false);
/// let _ = lit!(1f32, 2., 3., 4.);
/// ```
#[macro_export]
macro_rules! lit {
  ($e:expr) => {
    $crate::expr::Expr::from($e)
  };

  ($a:expr, $b:expr) => {
    $crate::expr::Expr::from($crate::types::V2::from([$a, $b]))
  };

  ($a:expr, $b:expr, $c:expr) => {
    $crate::expr::Expr::from($crate::types::V3::from([$a, $b, $c]))
  };

  ($a:expr, $b:expr, $c:expr, $d:expr) => {
    $crate::expr::Expr::from($crate::types::V4::from([$a, $b, $c, $d]))
  };

  ([ $($item:expr),* ]) => {
    $crate::expr::Expr::from([ $($item),* ])
  }
}

/// Create 2D scalar vectors via different forms.
///
/// - `vec2!(x, y)`, which builds a [`V2<T>`](crate::types::V2) for `x: T` and `y: T`.
///
/// # Examples
///
/// ```
/// use sable::vec2;
///
/// let _ = vec2!(1, 2);
/// ```
#[macro_export]
macro_rules! vec2 {
  ($x:expr, $y:expr) => {{
    use $crate::types::Vec2 as _;
    $crate::expr::Expr::vec2(($crate::expr::Expr::from(&$x), $crate::expr::Expr::from(&$y)))
  }};
}

/// Create 3D scalar vectors via different forms.
///
/// - `vec3!(xy, z)`, which builds a [`V3<T>`](crate::types::V3) with `xy` a value that can be turned into a
///   `Expr<V2<T>>` and `z: T`
/// - `vec3!(x, y, z)`, which builds a [`V3<T>`](crate::types::V3) for `x: T`, `y: T` and `z: T`.
///
/// # Examples
///
/// ```
/// use sable::{vec2, vec3};
///
/// let _ = vec3!(1, 2, 3);
/// let _ = vec3!(vec2!(1, 2), 3);
/// ```
#[macro_export]
macro_rules! vec3 {
  ($xy:expr, $z:expr) => {{
    use $crate::types::Vec3 as _;
    $crate::expr::Expr::vec3(($crate::expr::Expr::from(&$xy), $crate::expr::Expr::from(&$z)))
  }};

  ($x:expr, $y:expr, $z:expr) => {{
    use $crate::types::Vec3 as _;
    $crate::expr::Expr::vec3((
      $crate::expr::Expr::from(&$x),
      $crate::expr::Expr::from(&$y),
      $crate::expr::Expr::from(&$z),
    ))
  }};
}

/// Create 4D scalar vectors via different forms.
///
/// - `vec4!(xyz, w)`, which builds a [`V4<T>`](crate::types::V4) with `xyz` a value that can be turned into a
///   `Expr<V3<T>>` and `w: T`.
/// - `vec4!(xy, zw)`, which builds a [`V4<T>`](crate::types::V4) with `xy` and `zw` values that can be turned into
///   `Expr<V2<T>>`.
/// - `vec4!(xy, z, w)`, which builds a [`V4<T>`](crate::types::V4) with `xy`, `z: T` and `w: T`.
/// - `vec4!(x, y, z, w)`, which builds a [`V4<T>`](crate::types::V4) for `x: T`, `y: T`, `z: T` and `w: T`.
///
/// # Examples
///
/// ```
/// use sable::{vec2, vec3, vec4};
///
/// let _ = vec4!(1, 2, 3, 4);
/// let _ = vec4!(vec3!(1, 2, 3), 4);
/// let _ = vec4!(vec2!(1, 2), vec2!(3, 4));
/// let _ = vec4!(vec2!(1, 2), 3, 4);
/// ```
#[macro_export]
macro_rules! vec4 {
  ($xy:expr, $zw:expr) => {{
    use $crate::types::Vec4 as _;
    $crate::expr::Expr::vec4(($crate::expr::Expr::from(&$xy), $crate::expr::Expr::from(&$zw)))
  }};

  ($xy:expr, $z:expr, $w:expr) => {{
    use $crate::types::Vec4 as _;
    $crate::expr::Expr::vec4((
      $crate::expr::Expr::from(&$xy),
      $crate::expr::Expr::from(&$z),
      $crate::expr::Expr::from(&$w),
    ))
  }};

  ($x:expr, $y:expr, $z:expr, $w:expr) => {{
    use $crate::types::Vec4 as _;
    $crate::expr::Expr::vec4((
      $crate::expr::Expr::from(&$x),
      $crate::expr::Expr::from(&$y),
      $crate::expr::Expr::from(&$z),
      $crate::expr::Expr::from(&$w),
    ))
  }};
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::scope::{Scope, ScopeInstr};

  fn int(i: i32) -> ErasedExpr {
    ErasedExpr::lit(Literal::Int(i))
  }

  fn float(f: f32) -> ErasedExpr {
    ErasedExpr::lit(Literal::Float(f))
  }

  #[test]
  fn lit() {
    assert_eq!(lit!(true).erased, ErasedExpr::lit(Literal::Bool(true)));
    assert_eq!(
      lit![1, 2].erased,
      ErasedExpr::new(Type::Vector(ScalarType::Int, 2), ExprNode::Construct(vec![int(1), int(2)]))
    );
    assert_eq!(
      (lit!(1f32) + lit!(2f32)).erased,
      ErasedExpr::binary(f32::ty(), BinOp::Add, float(1.), float(2.))
    );
  }

  #[test]
  fn unary() {
    let mut scope = Scope::<()>::new(0);

    let a = !lit!(true);
    let b = -lit!(3i32);
    let c = scope.var(17);

    assert_eq!(a.erased.node(), &ExprNode::Unary(UnOp::Not, ErasedExpr::lit(Literal::Bool(true))));
    assert_eq!(b.erased.node(), &ExprNode::Unary(UnOp::Neg, int(3)));
    assert_eq!(c.erased.node(), &ExprNode::Var(ScopedHandle::fun_var(0, 0)));
  }

  #[test]
  fn binary() {
    let a = lit!(1i32) + lit!(2);
    let b = lit!(1i32) + 2;

    assert_eq!(a.erased, b.erased);
    assert_eq!(a.erased, ErasedExpr::binary(i32::ty(), BinOp::Add, int(1), int(2)));

    let a = lit!(1i32) - lit!(2);
    let b = lit!(1i32) - 2;

    assert_eq!(a.erased, b.erased);
    assert_eq!(a.erased, ErasedExpr::binary(i32::ty(), BinOp::Sub, int(1), int(2)));

    let a = lit!(7u32) % 2;
    assert_eq!(
      a.erased,
      ErasedExpr::binary(u32::ty(), BinOp::Rem, ErasedExpr::lit(Literal::UInt(7)), ErasedExpr::lit(Literal::UInt(2)))
    );

    let a = lit!(0xf0u32) >> 4;
    assert_eq!(a.erased.node(), &ExprNode::Binary(BinOp::Shr, ErasedExpr::lit(Literal::UInt(0xf0)), ErasedExpr::lit(Literal::UInt(4))));
  }

  #[test]
  fn vector_scalar_products() {
    let v = lit!(1f32, 2., 3.);
    let scaled = &v * 2.;

    assert_eq!(scaled.erased.ty(), &Type::Vector(ScalarType::Float, 3));

    let m: M23 = Matrix([[1., 0., 0.], [0., 1., 0.]]);
    let m = Expr::from(m);
    let column = m * lit!(1f32, 1.);
    assert_eq!(column.erased.ty(), &Type::Vector(ScalarType::Float, 3));
  }

  #[test]
  fn ref_inference() {
    let a = lit!(1i32);
    let b = a.clone() + 1;
    let c = a + 1;

    assert_eq!(b.erased, c.erased);
  }

  #[test]
  fn shared_nodes() {
    let a = lit!(1i32) + 2;
    let b = a.clone();

    assert_eq!(a.erased.id(), b.erased.id());
  }

  #[test]
  fn var() {
    let mut scope = Scope::<()>::new(0);

    let x = scope.var(0);
    let y = scope.var(1u32);
    let z = scope.var(lit![false, true, false]);

    assert_eq!(x.erased.node(), &ExprNode::Var(ScopedHandle::fun_var(0, 0)));
    assert_eq!(y.erased.node(), &ExprNode::Var(ScopedHandle::fun_var(0, 1)));
    assert_eq!(z.erased.node(), &ExprNode::Var(ScopedHandle::fun_var(0, 2)));
    assert_eq!(scope.erased.instructions.len(), 3);
    assert_eq!(
      scope.erased.instructions[1],
      ScopeInstr::VarDecl {
        ty: u32::ty(),
        handle: ScopedHandle::fun_var(0, 1),
        init_value: Some(ErasedExpr::lit(Literal::UInt(1))),
      }
    );
  }

  #[test]
  fn casts() {
    let x = lit!(3i32);
    let f: Expr<f32> = x.cast();
    let same: Expr<f32> = f.cast();
    let bits: Expr<u32> = reinterpret_cast(same.clone());

    assert_eq!(f.erased.node(), &ExprNode::Cast(int(3)));
    assert_eq!(same.erased.node(), &ExprNode::Cast(f.erased.clone()));
    assert_eq!(bits.erased.ty(), &u32::ty());
  }

  #[test]
  fn array_creation() {
    let _ = Expr::from([1, 2, 3]);
    let _ = Expr::from(&[1, 2, 3]);
    let two_d = Expr::from([[1, 2], [3, 4]]);

    assert_eq!(two_d.erased.ty(), &<[[i32; 2]; 2] as ToType>::ty());
    assert_eq!(
      two_d.erased.node(),
      &ExprNode::Construct(vec![
        ErasedExpr::new(<[i32; 2] as ToType>::ty(), ExprNode::Construct(vec![int(1), int(2)])),
        ErasedExpr::new(<[i32; 2] as ToType>::ty(), ExprNode::Construct(vec![int(3), int(4)])),
      ])
    );

    let looked_up = two_d.at(1u32);
    assert_eq!(looked_up.erased.ty(), &<[i32; 2] as ToType>::ty());
  }

  #[test]
  fn vec3_ctor() {
    let xy = lit!(1f32, 2f32);
    let xyz2 = vec3!(xy, lit!(3f32));
    let xyz3 = vec3!(lit!(1f32), lit!(2f32), lit!(3f32));

    assert_eq!(xyz2.erased.node(), &ExprNode::Construct(vec![xy.erased.clone(), float(3.)]));
    assert_eq!(xyz3.erased.node(), &ExprNode::Construct(vec![float(1.), float(2.), float(3.)]));
  }

  #[test]
  fn vec4_ctor() {
    let xy: Expr<V2<f32>> = lit!(1., 2.);
    let xyzw22 = vec4!(xy, xy);
    let xyzw211 = vec4!(xy, 3f32, 4f32);
    let xyzw4 = vec4!(1f32, 2f32, 3f32, 4f32);

    assert_eq!(xyzw22.erased.node(), &ExprNode::Construct(vec![xy.erased.clone(), xy.erased.clone()]));
    assert_eq!(
      xyzw211.erased.node(),
      &ExprNode::Construct(vec![xy.erased.clone(), float(3.), float(4.)])
    );
    assert_eq!(xyzw4.erased.ty(), &Type::Vector(ScalarType::Float, 4));
  }
}
