use std::marker::PhantomData;

use crate::{
  error::UsageError,
  expr::{ErasedExpr, Expr, ExprNode},
  scope::{ErasedScope, Scope, ScopedHandle},
  types::{ToType, Type},
};

/// Function return.
///
/// This type represents a function return and is used to annotate values that can be returned from functions (i.e.
/// expressions).
#[derive(Clone, Debug, PartialEq)]
pub struct Return {
  pub(crate) erased: ErasedReturn,
}

/// Erased return.
///
/// Either `Void` (i.e. `void`) or an expression. The type of the expression is also present for convenience.
#[derive(Clone, Debug, PartialEq)]
pub enum ErasedReturn {
  Void,
  Expr(Type, ErasedExpr),
}

impl ErasedReturn {
  pub fn ty(&self) -> Type {
    match self {
      ErasedReturn::Void => Type::Void,
      ErasedReturn::Expr(ty, _) => ty.clone(),
    }
  }
}

impl From<()> for Return {
  fn from(_: ()) -> Self {
    Return {
      erased: ErasedReturn::Void,
    }
  }
}

impl<T> From<Expr<T>> for Return
where
  T: ToType,
{
  fn from(expr: Expr<T>) -> Self {
    Return {
      erased: ErasedReturn::Expr(T::ty(), expr.erased),
    }
  }
}

/// Return of a function which return type is only known at runtime.
///
/// Scopes of functions declared with [`StageBuilder::function`](crate::stage::StageBuilder::function) are
/// `Scope<AnyReturn>`: both `s.leave(expr)` and `s.leave(())` record, and the returned type is checked against the
/// declared one when the stage is compiled.
#[derive(Clone, Debug, PartialEq)]
pub struct AnyReturn(pub(crate) ErasedReturn);

impl From<()> for AnyReturn {
  fn from(_: ()) -> Self {
    AnyReturn(ErasedReturn::Void)
  }
}

impl<T> From<Expr<T>> for AnyReturn
where
  T: ToType,
{
  fn from(expr: Expr<T>) -> Self {
    AnyReturn(ErasedReturn::Expr(T::ty(), expr.erased))
  }
}

impl<'a, T> From<&'a Expr<T>> for AnyReturn
where
  T: ToType,
{
  fn from(expr: &'a Expr<T>) -> Self {
    AnyReturn(ErasedReturn::Expr(T::ty(), expr.erased.clone()))
  }
}

impl From<AnyReturn> for Return {
  fn from(ret: AnyReturn) -> Self {
    Return { erased: ret.0 }
  }
}

/// Types a function can return: `()` or [`Expr<T>`].
pub trait ReturnType {
  /// Type of the value produced by a call.
  type Value: ToType;
}

impl ReturnType for () {
  type Value = ();
}

impl<T> ReturnType for Expr<T>
where
  T: ToType,
{
  type Value = T;
}

/// Closures that can be turned into shader functions.
///
/// Implemented for closures taking a `&mut Scope<R>` followed by up to eight [`Expr`] arguments and returning `R`,
/// where `R` is `()` or an [`Expr<T>`].
pub trait ToFun<R, A> {
  fn build_fn(self) -> FunDef<R, A>;
}

impl<F, R> ToFun<R, ()> for F
where
  Self: FnOnce(&mut Scope<R>) -> R,
  Return: From<R>,
  R: ReturnType,
{
  fn build_fn(self) -> FunDef<R, ()> {
    let mut scope = Scope::new(0);
    let ret = self(&mut scope);
    let scope = scope.finish();

    let erased = ErasedFun::new(Vec::new(), <R::Value as ToType>::ty(), scope, Some(Return::from(ret).erased));

    FunDef::new(erased)
  }
}

impl<F, R, A> ToFun<R, Expr<A>> for F
where
  Self: FnOnce(&mut Scope<R>, Expr<A>) -> R,
  Return: From<R>,
  R: ReturnType,
  A: ToType,
{
  fn build_fn(self) -> FunDef<R, Expr<A>> {
    let arg = Expr::new(ExprNode::Var(ScopedHandle::fun_arg(0)));

    let mut scope = Scope::new(0);
    let ret = self(&mut scope, arg);
    let scope = scope.finish();

    let erased = ErasedFun::new(
      vec![A::ty()],
      <R::Value as ToType>::ty(),
      scope,
      Some(Return::from(ret).erased),
    );

    FunDef::new(erased)
  }
}

macro_rules! impl_ToFun_args {
  ($($arg:ident , $arg_ident:ident , $arg_rank:expr),*) => {
    impl<F, R, $($arg),*> ToFun<R, ($(Expr<$arg>),*)> for F
    where
      Self: FnOnce(&mut Scope<R>, $(Expr<$arg>),*) -> R,
      Return: From<R>,
      R: ReturnType,
      $($arg: ToType),*
    {
      fn build_fn(self) -> FunDef<R, ($(Expr<$arg>),*)> {
        $( let $arg_ident = Expr::new(ExprNode::Var(ScopedHandle::fun_arg($arg_rank))); )*
        let args = vec![$( $arg::ty() ),*];

        let mut scope = Scope::new(0);
        let ret = self(&mut scope, $($arg_ident),*);
        let scope = scope.finish();

        let erased = ErasedFun::new(args, <R::Value as ToType>::ty(), scope, Some(Return::from(ret).erased));

        FunDef::new(erased)
      }
    }
  }
}

impl_ToFun_args!(A0, a0, 0, A1, a1, 1);
impl_ToFun_args!(A0, a0, 0, A1, a1, 1, A2, a2, 2);
impl_ToFun_args!(A0, a0, 0, A1, a1, 1, A2, a2, 2, A3, a3, 3);
impl_ToFun_args!(A0, a0, 0, A1, a1, 1, A2, a2, 2, A3, a3, 3, A4, a4, 4);
impl_ToFun_args!(A0, a0, 0, A1, a1, 1, A2, a2, 2, A3, a3, 3, A4, a4, 4, A5, a5, 5);
impl_ToFun_args!(A0, a0, 0, A1, a1, 1, A2, a2, 2, A3, a3, 3, A4, a4, 4, A5, a5, 5, A6, a6, 6);
impl_ToFun_args!(A0, a0, 0, A1, a1, 1, A2, a2, 2, A3, a3, 3, A4, a4, 4, A5, a5, 5, A6, a6, 6, A7, a7, 7);

/// An opaque function handle, used to call user-defined functions.
///
/// Function handles are created with the [`StageBuilder::fun`](crate::stage::StageBuilder::fun) function, introducing
/// new functions in the EDSL. You can then call the functions in the context of generating new expressions, returning
/// them or creating variables. Calling a function returning `()` yields an `Expr<()>`, which is recorded as a
/// statement with [`Scope::exec`].
///
/// # Examples
///
/// A unary function squaring its argument:
///
/// ```
/// # use sable::StageBuilder;
/// # StageBuilder::new_vertex_shader(|mut s, _, _| {
/// use sable::{Expr, FunHandle, Scope, lit};
///
/// let square = s.fun(|s: &mut Scope<Expr<i32>>, a: Expr<i32>| {
///   &a * &a
/// });
///
/// s.main_fun(|s: &mut Scope<()>| {
///   // call square with 3 and bind the result to a variable
///   let squared = s.var(square.call(lit!(3)));
/// })
/// # });
/// ```
///
/// A function taking two 3D vectors and a floating scalar and returning their linear interpolation, called with
/// three arguments:
///
/// ```
/// # use sable::StageBuilder;
/// # StageBuilder::new_vertex_shader(|mut s, _, _| {
/// use sable::{Expr, Mix as _, Scope, V3, lit, vec3};
///
/// let lerp = s.fun(|s: &mut Scope<Expr<V3<f32>>>, a: Expr<V3<f32>>, b: Expr<V3<f32>>, t: Expr<f32>| {
///   a.mix(b, t)
/// });
///
/// s.main_fun(|s: &mut Scope<()>| {
///   let a = vec3!(0f32, 0., 0.);
///   let b = vec3!(1f32, 1., 1.);
///
///   // call lerp here and bind it to a local variable
///   let result = s.var(lerp.call(a, b, lit!(0.75f32)));
/// })
/// # });
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FunHandle<R, A> {
  pub(crate) erased: ErasedFunHandle,
  _phantom: PhantomData<(R, A)>,
}

impl<R, A> FunHandle<R, A> {
  pub(crate) fn new(erased: ErasedFunHandle) -> Self {
    Self {
      erased,
      _phantom: PhantomData,
    }
  }
}

impl<R> FunHandle<R, ()>
where
  R: ReturnType,
{
  /// Create an expression representing a function call to this function.
  ///
  /// See the documentation of [`FunHandle`] for examples.
  pub fn call(&self) -> Expr<R::Value> {
    Expr::new(ExprNode::FunCall(self.erased.clone(), Vec::new()))
  }
}

impl<R, A> FunHandle<R, Expr<A>>
where
  R: ReturnType,
{
  /// Create an expression representing a function call to this function.
  ///
  /// See the documentation of [`FunHandle`] for examples.
  pub fn call(&self, a: impl Into<Expr<A>>) -> Expr<R::Value> {
    Expr::new(ExprNode::FunCall(self.erased.clone(), vec![a.into().erased]))
  }
}

// the first stage must be named S0
macro_rules! impl_FunCall {
  ( $( ( $arg_name:ident, $arg_ty:ident ) ),*) => {
    impl<R, $($arg_ty),*> FunHandle<R, ($(Expr<$arg_ty>),*)>
    where
      R: ReturnType,
    {
      /// Create an expression representing a function call to this function.
      ///
      /// See the documentation of [`FunHandle`] for examples.
      pub fn call(&self, $($arg_name : impl Into<Expr<$arg_ty>>),*) -> Expr<R::Value> {
        Expr::new(ExprNode::FunCall(self.erased.clone(), vec![$($arg_name.into().erased),*]))
      }
    }
  };
}

// implement function calls for Expr up to 8 arguments
macro_rules! impl_FunCall_rec {
  ( ( $a:ident, $b:ident ) , ( $x:ident, $y:ident )) => {
    impl_FunCall!(($a, $b), ($x, $y));
  };

  ( ( $a:ident, $b:ident ) , ( $x: ident, $y: ident ) , $($r:tt)* ) => {
    impl_FunCall_rec!(($a, $b), $($r)*);
    impl_FunCall!(($a, $b), ($x, $y), $($r)*);
  };
}

impl_FunCall_rec!((a, A), (b, B), (c, C), (d, D), (e, E), (f, F), (g, G), (h, H));

/// Subgroup operations.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SubgroupOp {
  /// Whether the invocation is the elected (lowest active) one.
  Elect,
  All,
  Any,
  /// Value of the lowest active invocation.
  BroadcastFirst,
  Add(GroupOperation),
  Mul(GroupOperation),
  Min(GroupOperation),
  Max(GroupOperation),
}

/// Flavor of a subgroup arithmetic operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GroupOperation {
  Reduce,
  InclusiveScan,
  ExclusiveScan,
}

/// Erased function handle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErasedFunHandle {
  // trigonometry
  Radians,
  Degrees,
  Sin,
  Cos,
  Tan,
  ASin,
  ACos,
  ATan,
  ATan2,
  SinH,
  CosH,
  TanH,
  ASinH,
  ACosH,
  ATanH,
  // exponential
  Pow,
  Exp,
  Exp2,
  Log,
  Log2,
  Sqrt,
  InverseSqrt,
  // common
  Abs,
  Sign,
  Floor,
  Trunc,
  Round,
  RoundEven,
  Ceil,
  Fract,
  Min,
  Max,
  Clamp,
  Mix,
  Step,
  SmoothStep,
  IsNan,
  IsInf,
  FMA,
  // floating-point pack and unpack functions
  PackUnorm4x8,
  PackSnorm4x8,
  UnpackUnorm4x8,
  UnpackSnorm4x8,
  PackHalf2x16,
  UnpackHalf2x16,
  // geometry functions
  Length,
  Distance,
  Dot,
  Cross,
  Normalize,
  FaceForward,
  Reflect,
  Refract,
  // matrix functions
  Transpose,
  Determinant,
  Inverse,
  // vector relational functions
  Any,
  All,
  // integer functions
  BitCount,
  BitfieldReverse,
  FindLSB,
  FindMSB,
  // fragment processing functions
  DFDX,
  DFDY,
  DFDXFine,
  DFDYFine,
  DFDXCoarse,
  DFDYCoarse,
  FWidth,
  FWidthFine,
  FWidthCoarse,
  // image functions; the first argument is the image
  ImageSample,
  ImageSampleLod,
  ImageFetch,
  ImageRead,
  ImageSize,
  // shader invocation group functions
  Subgroup(SubgroupOp),
  UserDefined(u16),
}

/// A function definition.
///
/// Function definitions contain the information required to know how to represent a function’s arguments, return type
/// and its body.
#[derive(Debug)]
pub struct FunDef<R, A> {
  pub(crate) erased: ErasedFun,
  _phantom: PhantomData<(R, A)>,
}

impl<R, A> FunDef<R, A> {
  pub fn new(erased: ErasedFun) -> Self {
    Self {
      erased,
      _phantom: PhantomData,
    }
  }
}

/// Erased function definition.
#[derive(Clone, Debug, PartialEq)]
pub struct ErasedFun {
  pub(crate) args: Vec<Type>,
  pub(crate) ret_ty: Type,
  pub(crate) scope: ErasedScope,
  /// Value returned when the end of the body is reached; `None` means reaching the end returns only from void
  /// functions.
  pub(crate) tail: Option<ErasedReturn>,
}

impl ErasedFun {
  pub fn new(args: Vec<Type>, ret_ty: Type, scope: ErasedScope, tail: Option<ErasedReturn>) -> Self {
    Self {
      args,
      ret_ty,
      scope,
      tail,
    }
  }
}

/// Function being declared with [`StageBuilder::function`](crate::stage::StageBuilder::function).
///
/// Parameters are declared with [`FunctionBuilder::par`], in order; [`FunctionBuilder::begin`] then opens the body.
#[derive(Debug)]
pub struct FunctionBuilder {
  pub(crate) handle: u16,
  pub(crate) name: String,
  pub(crate) ret_ty: Type,
  pub(crate) args: Vec<Type>,
}

impl FunctionBuilder {
  pub(crate) fn new(handle: u16, name: String, ret_ty: Type) -> Self {
    Self {
      handle,
      name,
      ret_ty,
      args: Vec::new(),
    }
  }

  /// Declare the next parameter of the function.
  pub fn par<T>(&mut self) -> Expr<T>
  where
    T: ToType,
  {
    let rank = self.args.len() as u16;
    self.args.push(T::ty());
    Expr::new(ExprNode::Var(ScopedHandle::fun_arg(rank)))
  }

  /// Open the body of the function.
  pub fn begin(self) -> FunctionBody {
    FunctionBody {
      decl: self,
      scope: Scope::new(0),
    }
  }
}

/// Body of a function declared with [`StageBuilder::function`](crate::stage::StageBuilder::function).
///
/// Dereferences to the [`Scope`] of the body. The body is closed by
/// [`StageBuilder::end_function`](crate::stage::StageBuilder::end_function); a body that is never closed fails the
/// compilation of the stage.
#[derive(Debug)]
pub struct FunctionBody {
  pub(crate) decl: FunctionBuilder,
  pub(crate) scope: Scope<AnyReturn>,
}

impl std::ops::Deref for FunctionBody {
  type Target = Scope<AnyReturn>;

  fn deref(&self) -> &Self::Target {
    &self.scope
  }
}

impl std::ops::DerefMut for FunctionBody {
  fn deref_mut(&mut self) -> &mut Self::Target {
    &mut self.scope
  }
}

/// Handle of a function declared with [`StageBuilder::function`](crate::stage::StageBuilder::function).
///
/// Arguments and return type are checked when the call is built; a mismatch makes the call an invalid expression that
/// fails compilation with [`UsageError::ArgumentMismatch`] or [`UsageError::ReturnMismatch`].
#[derive(Clone, Debug, PartialEq)]
pub struct DynFunHandle {
  pub(crate) erased: ErasedFunHandle,
  pub(crate) name: String,
  pub(crate) args: Vec<Type>,
  pub(crate) ret_ty: Type,
}

impl DynFunHandle {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn ret_ty(&self) -> &Type {
    &self.ret_ty
  }

  /// Call the function with type-erased arguments.
  pub fn call<T>(&self, args: Vec<ErasedExpr>) -> Expr<T>
  where
    T: ToType,
  {
    let found: Vec<Type> = args.iter().map(|a| a.ty().clone()).collect();

    if found != self.args {
      return Expr::from_erased(ErasedExpr::invalid(
        T::ty(),
        UsageError::ArgumentMismatch {
          function: self.name.clone(),
          expected: self.args.clone(),
          found,
        },
      ));
    }

    if T::ty() != self.ret_ty {
      return Expr::from_erased(ErasedExpr::invalid(
        T::ty(),
        UsageError::ReturnMismatch {
          function: self.name.clone(),
          expected: self.ret_ty.clone(),
          found: T::ty(),
        },
      ));
    }

    Expr::new(ExprNode::FunCall(self.erased, args))
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::lit;

  #[test]
  fn typed_function_definition() {
    let fundef: FunDef<Expr<i32>, (Expr<i32>, Expr<i32>)> =
      ToFun::build_fn(|s: &mut Scope<Expr<i32>>, a: Expr<i32>, b: Expr<i32>| {
        let c = s.var(a + 1);
        c.to_expr() * b
      });

    assert_eq!(fundef.erased.args, vec![i32::ty(), i32::ty()]);
    assert_eq!(fundef.erased.ret_ty, i32::ty());
    assert_eq!(fundef.erased.scope.instructions.len(), 1);
    assert!(matches!(fundef.erased.tail, Some(ErasedReturn::Expr(..))));
  }

  #[test]
  fn call_checks_dynamic_signature() {
    let handle = DynFunHandle {
      erased: ErasedFunHandle::UserDefined(3),
      name: "scale".to_owned(),
      args: vec![f32::ty()],
      ret_ty: f32::ty(),
    };

    let ok: Expr<f32> = handle.call(vec![lit!(2f32).erase()]);
    assert_eq!(
      ok.erased().node(),
      &ExprNode::FunCall(ErasedFunHandle::UserDefined(3), vec![lit!(2f32).erase()])
    );

    let bad: Expr<f32> = handle.call(vec![lit!(2).erase()]);
    assert!(matches!(
      bad.erased().node(),
      ExprNode::Invalid(UsageError::ArgumentMismatch { .. })
    ));

    let bad_ret: Expr<u32> = handle.call(vec![lit!(2f32).erase()]);
    assert!(matches!(
      bad_ret.erased().node(),
      ExprNode::Invalid(UsageError::ReturnMismatch { .. })
    ));
  }
}
