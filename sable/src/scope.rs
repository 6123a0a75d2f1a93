use std::{
  marker::PhantomData,
  mem,
  ops::{Deref, DerefMut},
};

use crate::{
  barrier::Barrier,
  builtin::BuiltIn,
  error::UsageError,
  expr::{ErasedExpr, Expr},
  fun::{AnyReturn, ErasedReturn, Return},
  types::{Numeric, ToType, Type},
  var::Var,
};

/// Lexical scope that must output an `R`.
///
/// Scopes are the only way to add control flow expressions to shaders. [`Scope<R>`] is the most general one, parent
/// of all scopes. [`LoopScope<R>`] is a special kind of [`Scope<R>`] that also allows to escape local looping
/// expressions, such as `for` and `while` loops.
///
/// A [`Scope<R>`] allows to perform a bunch of actions:
///
/// - Creating variable via [`Scope::var`]. Expressions of type [`Expr<T>`] where [`T: ToType`](ToType) are bound in a
///   [`Scope<R>`] via [`Scope::var`] and a [`Var<T>`] is returned, representing the bound variable.
/// - Variable mutation via [`Scope::set`]. Any [`Var<T>`] declared previously and still reachable in the current
///   [`Scope`] can be mutated.
/// - Introducing conditional statements with [`Conditional::when`] and [`Conditional::unless`].
/// - Introducing looping statements with [`Scope::loop_for`], [`Scope::for_range`], [`Scope::loop_while`] and
///   [`Scope::loop_do`].
/// - Introducing multi-way branches with [`Scope::switch`].
///
/// # Marker form
///
/// Besides closures, control flow can be recorded with paired marker calls, such as [`Scope::if_`] and
/// [`Scope::fi`]. Markers open and close regions on a stack owned by the scope; closing a region that is not the
/// innermost open one, or leaving a region open when the function ends, fails the compilation of the stage. The
/// `scoped_*` methods open the same regions but return a [`Region`] guard closing them when dropped.
///
/// ```
/// use sable::{Scope, StageBuilder, lit};
///
/// StageBuilder::new_vertex_shader(|mut s, _, _| {
///   s.main_fun(|s: &mut Scope<()>| {
///     let x = s.var(lit!(3));
///
///     s.if_(x.lt(10));
///     s.set(&x, 10);
///     s.else_();
///     s.set(&x, 0);
///     s.fi();
///   })
/// });
/// ```
#[derive(Debug)]
pub struct Scope<R> {
  pub(crate) erased: ErasedScope,
  _phantom: PhantomData<R>,
}

impl<R> Scope<R>
where
  Return: From<R>,
{
  /// Create a new [`Scope<R>`] for which the ID is explicitly passed.
  ///
  /// The ID is unique in the scope hierarchy, but is not necessarily unique in the parent scope. What it means is that
  /// creating a scope `s` in a (parent) scope of ID `p` will give `s` the ID `p + 1`. So any scope created directly
  /// under the scope of ID `p` will get the `p + 1` ID. The reason for this is that variables go out of scope at the
  /// end of the scope they were created in, so it’s safe to reuse the same ID for sibling scopes, as they can’t share
  /// variables.
  pub fn new(id: u16) -> Self {
    Self {
      erased: ErasedScope::new(id),
      _phantom: PhantomData,
    }
  }

  /// Close the scope and return what it recorded; regions left open are reported as errors.
  pub(crate) fn finish(self) -> ErasedScope {
    self.erased.finish()
  }

  /// Bind an expression to a variable in the current scope.
  ///
  /// `let v = s.var(e);` binds the `e` expression to `v` in the `s` [`Scope<T>`], and `e` must have type [`Expr<T>`]
  /// and `v` must be a [`Var<T>`], with [`T: ToType`](ToType).
  ///
  /// # Return
  ///
  /// The resulting [`Var<T>`] contains the representation of the binding in the EDSL and the actual binding is
  /// recorded in the current scope.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let v = s.var(3.1415f32); // assign the literal 3.1415 to v
  /// let q = s.var(v * 2.); // assign v * 2. to q
  /// #   })
  /// # });
  /// ```
  pub fn var<T>(&mut self, init_value: impl Into<Expr<T>>) -> Var<T>
  where
    T: ToType,
  {
    let handle = self.erased.declare(T::ty(), Some(init_value.into().erased));
    Var::new(handle)
  }

  /// Declare a variable without initializer; it holds the zero value of its type until assigned.
  pub fn declare<T>(&mut self) -> Var<T>
  where
    T: ToType,
  {
    let handle = self.erased.declare(T::ty(), None);
    Var::new(handle)
  }

  /// For looping statement: `for`.
  ///
  /// `s.loop_for(i, |i| /* cond */, |i| /* fold */, |i| /* body */ )` inserts a looping statement into the EDSL
  /// representing a typical “for” loop. `i` is an [`Expr<T>`] satisfying [`T: ToType`](ToType) and is used as
  /// _initial_ value.
  ///
  /// In all the following closures, `i` refers to the loop counter.
  ///
  /// The first `cond` closure must return an [`Expr<bool>`], representing the condition that is held until the loop
  /// exits. The second `fold` closure is a pure computation that must return an [`Expr<T>`] and that will be evaluated
  /// at the end of each iteration before the next check on `cond`. The last and third `body` closure is the body of the
  /// loop.
  ///
  /// The [`LoopScope<R>`] argument to the `body` closure is a specialization of [`Scope<R>`] that allows breaking out
  /// of loops.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Conditional as _, LoopScope, Scope, StageBuilder};
  ///
  /// StageBuilder::new_vertex_shader(|mut s, _, _| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     s.loop_for(0, |i| i.lt(10), |i| i + 1, |s: &mut LoopScope<()>, i| {
  ///       s.when(i.eq(5), |s: &mut LoopScope<()>| {
  ///         // when i == 5, abort from the main function
  ///         s.abort();
  ///       });
  ///     });
  ///   })
  /// });
  /// ```
  pub fn loop_for<T>(
    &mut self,
    init_value: impl Into<Expr<T>>,
    condition: impl FnOnce(&Expr<T>) -> Expr<bool>,
    iter_fold: impl FnOnce(&Expr<T>) -> Expr<T>,
    body: impl FnOnce(&mut LoopScope<R>, &Expr<T>),
  ) where
    T: ToType,
  {
    let mut scope = LoopScope::new(self.deeper());

    // the counter is the first variable of the loop scope; it is initialized by the loop itself
    let init_handle = ScopedHandle::fun_var(scope.erased.id, 0);
    scope.erased.next_var = 1;
    let counter = Var::<T>::new(init_handle.clone()).to_expr();

    let condition = condition(&counter);

    // generate the “post expr”, which is basically the free from of the third part of the for loop; people usually
    // set this to ++i, i++, etc., but in our case, the expression is to treat as a fold’s accumulator
    let post_expr = iter_fold(&counter);

    body(&mut scope, &counter);

    let scope = self.erased.nest(scope.to_erased().finish());
    self.erased.push(ScopeInstr::For {
      init_ty: T::ty(),
      init_handle,
      init_expr: init_value.into().erased,
      condition: condition.erased,
      post_expr: post_expr.erased,
      scope,
    });
  }

  /// Counting loop over `begin..end`.
  ///
  /// The loop runs zero times when `begin >= end`.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let sum = s.var(0u32);
  ///
  /// s.for_range(0u32, 8u32, |s, i| {
  ///   s.set(&sum, &sum + i);
  /// });
  /// #   })
  /// # });
  /// ```
  pub fn for_range<T>(
    &mut self,
    begin: impl Into<Expr<T>>,
    end: impl Into<Expr<T>>,
    body: impl FnOnce(&mut LoopScope<R>, &Expr<T>),
  ) where
    T: Counter,
  {
    let end = end.into();
    self.loop_for(begin, |i| i.lt(end), |i| add(i, T::one()), body);
  }

  /// While looping statement: `while`.
  ///
  /// `s.loop_while(cond, body)` inserts a looping statement into the EDSL representing a typical “while” loop.
  ///
  /// `cond` is an [`Expr<bool>`], representing the condition that is held until the loop exits. `body` is the content
  /// the loop will execute at each iteration.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Scope, StageBuilder};
  ///
  /// StageBuilder::new_vertex_shader(|mut s, _, _| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     let i = s.var(0);
  ///
  ///     s.loop_while(i.lt(10), |s| {
  ///       s.set(&i, &i + 1);
  ///     });
  ///   })
  /// });
  /// ```
  pub fn loop_while(&mut self, condition: impl Into<Expr<bool>>, body: impl FnOnce(&mut LoopScope<R>)) {
    let mut scope = LoopScope::new(self.deeper());
    body(&mut scope);

    let scope = self.erased.nest(scope.to_erased().finish());
    self.erased.push(ScopeInstr::While {
      condition: condition.into().erased,
      scope,
    });
  }

  /// Post-tested loop: `do { … } while (cond)`.
  ///
  /// The body runs at least once; `condition` is evaluated after each iteration, so it sees the writes of the body.
  pub fn loop_do(&mut self, body: impl FnOnce(&mut LoopScope<R>), condition: impl Into<Expr<bool>>) {
    let mut scope = LoopScope::new(self.deeper());
    body(&mut scope);

    let scope = self.erased.nest(scope.to_erased().finish());
    let id = scope.id;
    self.erased.push(ScopeInstr::Loop {
      prelude: ErasedScope::new(id),
      condition: None,
      scope,
      continuing: ErasedScope::new(id),
      post_condition: Some(condition.into().erased),
    });
  }

  /// Multi-way branch.
  ///
  /// Cases fall through into the next one unless they end with [`Scope::break_`], as in C. The branch is recorded when
  /// the returned [`Switch`] is dropped.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let mode = s.var(2u32);
  /// let scale = s.var(1f32);
  ///
  /// s.switch(&mode)
  ///   .case(0, |s| {
  ///     s.set(&scale, 0.5);
  ///     s.break_();
  ///   })
  ///   .case(1, |s| s.set(&scale, 2.)) // falls through
  ///   .default(|s| s.set(&scale, &scale * 3.));
  /// #   })
  /// # });
  /// ```
  pub fn switch<T>(&mut self, selector: impl Into<Expr<T>>) -> Switch<'_, R, T>
  where
    T: CaseValue,
  {
    Switch {
      selector: selector.into().erased,
      cases: Vec::new(),
      parent: self,
      _phantom: PhantomData,
    }
  }

  /// Mutate a variable in the current scope.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// use sable::scope::MutateBinOp;
  ///
  /// let v = s.var(1); // v = 1
  /// s.set(&v, 10); // v = 10
  /// s.set_with(&v, MutateBinOp::Add, 2); // v += 2
  /// #   })
  /// # });
  /// ```
  pub fn set<T>(&mut self, var: impl Into<Var<T>>, value: impl Into<Expr<T>>)
  where
    T: ?Sized,
  {
    self.erased.push(ScopeInstr::MutateVar {
      var: var.into().0.erased,
      bin_op: None,
      expr: value.into().erased,
    });
  }

  /// Mutate a variable with a compound assignment, such as `+=`.
  pub fn set_with<T>(&mut self, var: impl Into<Var<T>>, bin_op: MutateBinOp, value: impl Into<Expr<T>>)
  where
    T: ?Sized,
  {
    self.erased.push(ScopeInstr::MutateVar {
      var: var.into().0.erased,
      bin_op: Some(bin_op),
      expr: value.into().erased,
    });
  }

  /// Evaluate an expression for its side effects, such as a call to a function returning `()`.
  pub fn exec<T>(&mut self, expr: impl Into<Expr<T>>)
  where
    T: ?Sized,
  {
    self.erased.push(ScopeInstr::Expr(expr.into().erased));
  }

  /// Early-return the current function with an expression.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::StageBuilder;
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// use sable::{Conditional as _, Expr, Scope};
  ///
  /// let _fun = s.fun(|s: &mut Scope<Expr<i32>>, arg: Expr<i32>| {
  ///   // if arg is less than 10, early-return with 0
  ///   s.when(arg.lt(10), |s| {
  ///     s.leave(0);
  ///   });
  ///
  ///   arg
  /// });
  ///
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// #   })
  /// # });
  /// ```
  pub fn leave(&mut self, ret: impl Into<R>) {
    self.erased.push(ScopeInstr::Return(Return::from(ret.into()).erased));
  }

  /// Discard the current fragment; only valid in fragment shaders.
  pub fn kill(&mut self) {
    self.erased.push(ScopeInstr::Kill);
  }

  /// Emit the current values of the outputs as a vertex; only valid in geometry shaders.
  pub fn emit_vertex(&mut self) {
    self.erased.push(ScopeInstr::EmitVertex);
  }

  /// End the current output primitive; only valid in geometry shaders.
  pub fn end_primitive(&mut self) {
    self.erased.push(ScopeInstr::EndPrimitive);
  }

  /// Open a conditional region: `if`.
  pub fn if_(&mut self, condition: impl Into<Expr<bool>>) {
    self.erased.open(FrameKind::If {
      branches: Vec::new(),
      condition: Some(condition.into().erased),
    });
  }

  /// Close the current branch of a conditional region and open another one: `else if`.
  pub fn elif_(&mut self, condition: impl Into<Expr<bool>>) {
    let condition = condition.into().erased;

    match self.erased.frames.last_mut() {
      Some(Frame {
        kind: FrameKind::If {
          branches,
          condition: current @ Some(_),
        },
        scope,
      }) => {
        let id = scope.id;
        let branch = mem::replace(scope, ErasedScope::new(id));
        if let Some(previous) = current.replace(condition) {
          branches.push((previous, branch));
        }
      }

      _ => self.erased.error(UsageError::UnmatchedCloser {
        closer: "elif_",
        opener: "if_",
      }),
    }
  }

  /// Close the current branch of a conditional region and open the catch-all one: `else`.
  pub fn else_(&mut self) {
    match self.erased.frames.last_mut() {
      Some(Frame {
        kind: FrameKind::If {
          branches,
          condition: current @ Some(_),
        },
        scope,
      }) => {
        let id = scope.id;
        let branch = mem::replace(scope, ErasedScope::new(id));
        if let Some(previous) = current.take() {
          branches.push((previous, branch));
        }
      }

      _ => self.erased.error(UsageError::UnmatchedCloser {
        closer: "else_",
        opener: "if_",
      }),
    }
  }

  /// Close a conditional region: `fi`.
  pub fn fi(&mut self) {
    let Some(Frame { kind, scope }) = self.erased.close("fi", "if_", |k| matches!(k, FrameKind::If { .. })) else {
      return;
    };

    if let FrameKind::If { branches, condition } = kind {
      let mut branches = branches.into_iter();

      let else_scope = match condition {
        Some(condition) => {
          let (first, rest) = match branches.next() {
            Some(first) => (first, Some((condition, scope))),
            None => ((condition, scope), None),
          };

          self.erased.push(ScopeInstr::If {
            condition: first.0,
            scope: first.1,
          });

          for (condition, scope) in branches.by_ref() {
            self.erased.push(ScopeInstr::ElseIf { condition, scope });
          }

          if let Some((condition, scope)) = rest {
            self.erased.push(ScopeInstr::ElseIf { condition, scope });
          }

          None
        }

        None => {
          if let Some((condition, scope)) = branches.next() {
            self.erased.push(ScopeInstr::If { condition, scope });
          }

          for (condition, scope) in branches.by_ref() {
            self.erased.push(ScopeInstr::ElseIf { condition, scope });
          }

          Some(scope)
        }
      };

      if let Some(scope) = else_scope {
        self.erased.push(ScopeInstr::Else { scope });
      }
    }
  }

  /// Open a loop region: `do`.
  ///
  /// Statements recorded before [`Scope::while_`] run at the start of every iteration, before the condition is
  /// tested; statements recorded after it form the body. Without [`Scope::while_`], the loop only exits through
  /// [`Scope::break_`] or a return.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let i = s.var(0);
  ///
  /// s.do_();
  /// s.while_(i.lt(4));
  /// s.set(&i, &i + 1);
  /// s.od();
  /// #   })
  /// # });
  /// ```
  pub fn do_(&mut self) {
    self.erased.open(FrameKind::Do {
      prelude: None,
      condition: None,
    });
  }

  /// Set the exit condition of the innermost `do` region: `while`.
  pub fn while_(&mut self, condition: impl Into<Expr<bool>>) {
    match self.erased.frames.last_mut() {
      Some(Frame {
        kind: FrameKind::Do {
          prelude: prelude @ None,
          condition: slot,
        },
        scope,
      }) => {
        // the body continues the numbering of the prelude, so prelude variables stay visible
        let body = ErasedScope {
          next_var: scope.next_var,
          ..ErasedScope::new(scope.id)
        };

        *prelude = Some(mem::replace(scope, body));
        *slot = Some(condition.into().erased);
      }

      _ => self.erased.error(UsageError::UnmatchedCloser {
        closer: "while_",
        opener: "do_",
      }),
    }
  }

  /// Close a loop region: `od`.
  pub fn od(&mut self) {
    let Some(Frame { kind, scope }) = self.erased.close("od", "do_", |k| matches!(k, FrameKind::Do { .. })) else {
      return;
    };

    if let FrameKind::Do { prelude, condition } = kind {
      let id = scope.id;

      self.erased.push(ScopeInstr::Loop {
        prelude: prelude.unwrap_or_else(|| ErasedScope::new(id)),
        condition,
        scope,
        continuing: ErasedScope::new(id),
        post_condition: None,
      });
    }
  }

  /// Open a counting loop region: `for`.
  ///
  /// `var` is set to `begin` before the loop; each iteration runs while `var` has not reached `end` and ends by adding
  /// `step` to `var`. The direction of the test follows the sign of `step`: `var < end` for positive steps and
  /// `var > end` for negative ones. A loop which `begin` already reached `end` runs zero times.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let i = s.var(0);
  /// let acc = s.var(0);
  ///
  /// s.for_(&i, 10, 0, -2);
  /// s.set(&acc, &acc + &i);
  /// s.rof();
  /// #   })
  /// # });
  /// ```
  pub fn for_<T>(
    &mut self,
    var: &Var<T>,
    begin: impl Into<Expr<T>>,
    end: impl Into<Expr<T>>,
    step: impl Into<Expr<T>>,
  ) where
    T: Counter,
  {
    let counter = var.to_expr();
    let end = end.into();
    let step = step.into();

    self.erased.push(ScopeInstr::MutateVar {
      var: counter.erased.clone(),
      bin_op: None,
      expr: begin.into().erased,
    });

    let condition = match step.erased.as_literal() {
      Some(lit) if lit.is_negative() => counter.gt(end),
      Some(_) => counter.lt(end),
      None => step.gt(T::zero()).select(counter.lt(&end), counter.gt(end)),
    };

    let mut continuing = ErasedScope::new(self.erased.current_id() + 1);
    continuing.push(ScopeInstr::MutateVar {
      var: counter.erased,
      bin_op: Some(MutateBinOp::Add),
      expr: step.erased,
    });

    self.erased.open(FrameKind::For {
      condition: condition.erased,
      continuing,
    });
  }

  /// Close a counting loop region: `rof`.
  pub fn rof(&mut self) {
    let Some(Frame { kind, scope }) = self.erased.close("rof", "for_", |k| matches!(k, FrameKind::For { .. })) else {
      return;
    };

    if let FrameKind::For { condition, continuing } = kind {
      self.erased.push(ScopeInstr::Loop {
        prelude: ErasedScope::new(scope.id),
        condition: Some(condition),
        scope,
        continuing,
        post_condition: None,
      });
    }
  }

  /// Open a multi-way branch region: `switch`.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let e = s.var(1);
  /// let x = s.var(0);
  ///
  /// s.switch_(&e);
  /// s.case_(1);
  /// s.set(&x, 1); // falls through
  /// s.case_(2);
  /// s.set(&x, &x + 2);
  /// s.break_();
  /// s.end_switch();
  /// #   })
  /// # });
  /// ```
  pub fn switch_<T>(&mut self, selector: impl Into<Expr<T>>)
  where
    T: CaseValue,
  {
    self.erased.open(FrameKind::Switch {
      selector: selector.into().erased,
      cases: Vec::new(),
      current: None,
    });
  }

  /// Start a case of the innermost `switch` region: `case`.
  pub fn case_<T>(&mut self, value: T)
  where
    T: CaseValue,
  {
    self.erased.start_case("case_", CaseLabel::Value(value.label()));
  }

  /// Start the default case of the innermost `switch` region: `default`.
  pub fn default_(&mut self) {
    self.erased.start_case("default_", CaseLabel::Default);
  }

  /// Close a multi-way branch region: `end switch`.
  pub fn end_switch(&mut self) {
    let Some(Frame { kind, scope }) =
      self
        .erased
        .close("end_switch", "switch_", |k| matches!(k, FrameKind::Switch { .. }))
    else {
      return;
    };

    if let FrameKind::Switch {
      selector,
      mut cases,
      current,
    } = kind
    {
      match current {
        Some(label) => cases.push(SwitchCase { label, scope }),
        None if !scope.instructions.is_empty() => self.erased.error(UsageError::StatementOutsideCase),
        None => (),
      }

      self.erased.push(ScopeInstr::Switch { selector, cases });
    }
  }

  /// Leave the innermost loop or switch: `break`.
  pub fn break_(&mut self) {
    self.erased.push(ScopeInstr::Break);
  }

  /// Jump to the next iteration of the innermost loop: `continue`.
  pub fn continue_(&mut self) {
    self.erased.push(ScopeInstr::Continue);
  }

  /// Open a conditional region closed when the returned guard is dropped.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// let x = s.var(1f32);
  ///
  /// {
  ///   let mut s = s.scoped_if(x.gt(0.));
  ///   s.set(&x, 0.);
  ///   s.else_();
  ///   s.set(&x, 1.);
  /// } // fi
  /// #   })
  /// # });
  /// ```
  pub fn scoped_if(&mut self, condition: impl Into<Expr<bool>>) -> Region<'_, R> {
    self.if_(condition);
    Region {
      scope: self,
      close: Scope::fi,
    }
  }

  /// Open a loop region closed when the returned guard is dropped; see [`Scope::do_`].
  pub fn scoped_do(&mut self) -> Region<'_, R> {
    self.do_();
    Region {
      scope: self,
      close: Scope::od,
    }
  }

  /// Open a counting loop region closed when the returned guard is dropped; see [`Scope::for_`].
  pub fn scoped_for<T>(
    &mut self,
    var: &Var<T>,
    begin: impl Into<Expr<T>>,
    end: impl Into<Expr<T>>,
    step: impl Into<Expr<T>>,
  ) -> Region<'_, R>
  where
    T: Counter,
  {
    self.for_(var, begin, end, step);
    Region {
      scope: self,
      close: Scope::rof,
    }
  }

  /// Open a multi-way branch region closed when the returned guard is dropped; see [`Scope::switch_`].
  pub fn scoped_switch<T>(&mut self, selector: impl Into<Expr<T>>) -> Region<'_, R>
  where
    T: CaseValue,
  {
    self.switch_(selector);
    Region {
      scope: self,
      close: Scope::end_switch,
    }
  }
}

impl Scope<()> {
  /// Early-abort the current function.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::StageBuilder;
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// use sable::{Conditional as _, Expr, Scope};
  ///
  /// let _fun = s.fun(|s: &mut Scope<()>, arg: Expr<i32>| {
  ///   s.when(arg.lt(10), |s| {
  ///     s.abort();
  ///   });
  ///
  ///   // do something else…
  /// });
  ///
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// #   })
  /// # });
  /// ```
  pub fn abort(&mut self) {
    self.erased.push(ScopeInstr::Return(ErasedReturn::Void));
  }
}

impl Scope<AnyReturn> {
  /// Early-abort a function declared with [`StageBuilder::function`](crate::stage::StageBuilder::function).
  ///
  /// Aborting a function declared with a non-void return type fails the compilation of the stage.
  pub fn abort(&mut self) {
    self.erased.push(ScopeInstr::Return(ErasedReturn::Void));
  }
}

fn add<T>(a: &Expr<T>, b: Expr<T>) -> Expr<T>
where
  T: ToType,
{
  Expr::from_erased(ErasedExpr::binary(
    T::ty(),
    crate::expr::BinOp::Add,
    a.erased.clone(),
    b.erased,
  ))
}

/// Integer types usable as loop counters.
pub trait Counter: Numeric + PartialOrd + Sized {
  fn zero() -> Expr<Self>;
  fn one() -> Expr<Self>;
}

macro_rules! impl_Counter {
  ($($t:ty),*) => {
    $(
      impl Counter for $t {
        fn zero() -> Expr<Self> {
          Expr::from(0 as $t)
        }

        fn one() -> Expr<Self> {
          Expr::from(1 as $t)
        }
      }
    )*
  };
}

impl_Counter!(i32, u32, i64, u64);

/// Types usable as switch selectors and case labels.
pub trait CaseValue: ToType {
  fn label(self) -> i64;
}

impl CaseValue for i32 {
  fn label(self) -> i64 {
    self as i64
  }
}

impl CaseValue for u32 {
  fn label(self) -> i64 {
    self as i64
  }
}

/// Closure form of a multi-way branch, created by [`Scope::switch`].
///
/// The branch is recorded when this value is dropped.
#[derive(Debug)]
pub struct Switch<'a, R, T>
where
  Return: From<R>,
{
  parent: &'a mut Scope<R>,
  selector: ErasedExpr,
  cases: Vec<SwitchCase>,
  _phantom: PhantomData<T>,
}

impl<R, T> Switch<'_, R, T>
where
  Return: From<R>,
  T: CaseValue,
{
  /// Add a case; it falls through into the next one unless it ends with [`Scope::break_`].
  pub fn case(mut self, value: T, body: impl FnOnce(&mut Scope<R>)) -> Self {
    let label = CaseLabel::Value(value.label());
    self.add(label, body);
    self
  }

  /// Add the default case.
  pub fn default(mut self, body: impl FnOnce(&mut Scope<R>)) -> Self {
    self.add(CaseLabel::Default, body);
    self
  }

  fn add(&mut self, label: CaseLabel, body: impl FnOnce(&mut Scope<R>)) {
    if let Some(error) = duplicate_label(&self.cases, label) {
      self.parent.erased.error(error);
    }

    let mut scope = self.parent.deeper();
    body(&mut scope);

    let scope = self.parent.erased.nest(scope.finish());
    self.cases.push(SwitchCase { label, scope });
  }
}

impl<R, T> Drop for Switch<'_, R, T>
where
  Return: From<R>,
{
  fn drop(&mut self) {
    let cases = mem::take(&mut self.cases);
    self.parent.erased.push(ScopeInstr::Switch {
      selector: self.selector.clone(),
      cases,
    });
  }
}

fn duplicate_label(cases: &[SwitchCase], label: CaseLabel) -> Option<UsageError> {
  // labels are compared as the literals they become, so that -1 and u32::MAX clash
  if !cases.iter().any(|case| case.label.literal() == label.literal()) {
    return None;
  }

  Some(match label {
    CaseLabel::Value(v) => UsageError::DuplicateCase(v),
    CaseLabel::Default => UsageError::DuplicateDefault,
  })
}

/// Guard of a region opened by one of the `scoped_*` methods of [`Scope`].
///
/// Dereferences to the scope the region was opened in; markers such as [`Scope::else_`] and [`Scope::case_`] can be
/// called through it. The region is closed when the guard is dropped.
pub struct Region<'a, R>
where
  Return: From<R>,
{
  scope: &'a mut Scope<R>,
  close: fn(&mut Scope<R>),
}

impl<R> Deref for Region<'_, R>
where
  Return: From<R>,
{
  type Target = Scope<R>;

  fn deref(&self) -> &Self::Target {
    self.scope
  }
}

impl<R> DerefMut for Region<'_, R>
where
  Return: From<R>,
{
  fn deref_mut(&mut self) -> &mut Self::Target {
    self.scope
  }
}

impl<R> Drop for Region<'_, R>
where
  Return: From<R>,
{
  fn drop(&mut self) {
    (self.close)(self.scope);
  }
}

/// Erase the type of a scope.
pub trait Erased {
  type Erased;

  fn to_erased(self) -> Self::Erased;

  fn erased(&self) -> &Self::Erased;

  fn erased_mut(&mut self) -> &mut Self::Erased;
}

impl<R> Erased for Scope<R> {
  type Erased = ErasedScope;

  fn to_erased(self) -> Self::Erased {
    self.erased
  }

  fn erased(&self) -> &Self::Erased {
    &self.erased
  }

  fn erased_mut(&mut self) -> &mut Self::Erased {
    &mut self.erased
  }
}

/// A special kind of [`Scope`] that can also break loops.
#[derive(Debug)]
pub struct LoopScope<R>(Scope<R>);

impl<R> From<LoopScope<R>> for Scope<R> {
  fn from(s: LoopScope<R>) -> Self {
    s.0
  }
}

impl<R> Deref for LoopScope<R> {
  type Target = Scope<R>;

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl<R> DerefMut for LoopScope<R> {
  fn deref_mut(&mut self) -> &mut Self::Target {
    &mut self.0
  }
}

impl<R> LoopScope<R>
where
  Return: From<R>,
{
  fn new(s: Scope<R>) -> Self {
    Self(s)
  }

  /// Break the current iteration of the nearest loop and continue to the next iteration.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// s.loop_while(true, |s| {
  ///   s.loop_continue();
  /// });
  /// #   })
  /// # });
  /// ```
  pub fn loop_continue(&mut self) {
    self.erased.push(ScopeInstr::Continue);
  }

  /// Break the nearest loop.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// s.loop_while(true, |s| {
  ///   s.loop_break();
  /// });
  /// #   })
  /// # });
  /// ```
  pub fn loop_break(&mut self) {
    self.erased.push(ScopeInstr::Break);
  }
}

impl<R> Erased for LoopScope<R> {
  type Erased = ErasedScope;

  fn to_erased(self) -> Self::Erased {
    self.0.erased
  }

  fn erased(&self) -> &Self::Erased {
    &self.erased
  }

  fn erased_mut(&mut self) -> &mut Self::Erased {
    &mut self.erased
  }
}

/// Recorded statements of a scope.
#[derive(Clone, Debug, PartialEq)]
pub struct ErasedScope {
  pub(crate) id: u16,
  pub(crate) instructions: Vec<ScopeInstr>,
  pub(crate) next_var: u16,
  /// Usage errors found while recording this scope and its children.
  pub(crate) errors: Vec<UsageError>,
  frames: Vec<Frame>,
}

impl ErasedScope {
  pub(crate) fn new(id: u16) -> Self {
    Self {
      id,
      instructions: Vec::new(),
      next_var: 0,
      errors: Vec::new(),
      frames: Vec::new(),
    }
  }

  pub fn instructions(&self) -> &[ScopeInstr] {
    &self.instructions
  }

  /// Scope statements are currently recorded in: the innermost open region, or this scope.
  fn target(&mut self) -> &mut ErasedScope {
    if self.frames.is_empty() {
      self
    } else {
      let last = self.frames.len() - 1;
      &mut self.frames[last].scope
    }
  }

  /// ID of the scope statements are currently recorded in.
  pub(crate) fn current_id(&self) -> u16 {
    self.frames.last().map_or(self.id, |frame| frame.scope.id)
  }

  pub(crate) fn push(&mut self, instr: ScopeInstr) {
    self.target().instructions.push(instr);
  }

  pub(crate) fn declare(&mut self, ty: Type, init_value: Option<ErasedExpr>) -> ScopedHandle {
    if ty.is_opaque() {
      self.error(UsageError::OpaqueVariable(ty.clone()));
    }

    let target = self.target();
    let handle = ScopedHandle::fun_var(target.id, target.next_var);
    target.next_var += 1;

    target.instructions.push(ScopeInstr::VarDecl {
      ty,
      handle: handle.clone(),
      init_value,
    });

    handle
  }

  pub(crate) fn error(&mut self, error: UsageError) {
    if self.errors.is_empty() {
      log::error!("{}", error);
    }

    self.errors.push(error);
  }

  /// Take the errors of a finished child scope and return it.
  pub(crate) fn nest(&mut self, mut child: ErasedScope) -> ErasedScope {
    let child_errors = mem::take(&mut child.errors);
    for error in child_errors {
      self.error(error);
    }

    child
  }

  fn open(&mut self, kind: FrameKind) {
    let id = self.current_id() + 1;
    self.frames.push(Frame {
      kind,
      scope: ErasedScope::new(id),
    });
  }

  fn close(&mut self, closer: &'static str, opener: &'static str, is_opener: fn(&FrameKind) -> bool) -> Option<Frame> {
    match self.frames.last() {
      Some(frame) if is_opener(&frame.kind) => self.frames.pop(),
      _ => {
        self.error(UsageError::UnmatchedCloser { closer, opener });
        None
      }
    }
  }

  fn start_case(&mut self, closer: &'static str, label: CaseLabel) {
    let error = match self.frames.last_mut() {
      Some(Frame {
        kind: FrameKind::Switch { cases, current, .. },
        scope,
      }) => {
        let id = scope.id;
        let body = mem::replace(scope, ErasedScope::new(id));

        let statements_before_case = match current.replace(label) {
          Some(previous) => {
            cases.push(SwitchCase {
              label: previous,
              scope: body,
            });
            false
          }
          None => !body.instructions.is_empty(),
        };

        if statements_before_case {
          Some(UsageError::StatementOutsideCase)
        } else {
          // the label being started is not in `cases` yet
          duplicate_label(cases, label)
        }
      }

      _ => Some(UsageError::UnmatchedCloser {
        closer,
        opener: "switch_",
      }),
    };

    if let Some(error) = error {
      self.error(error);
    }
  }

  /// Close the recording; regions still open are reported as errors.
  pub(crate) fn finish(mut self) -> Self {
    while let Some(frame) = self.frames.pop() {
      self.error(UsageError::UnclosedRegion {
        opener: frame.kind.opener(),
      });
    }

    self
  }
}

/// Region opened by a marker call, recording into its own scope.
#[derive(Clone, Debug, PartialEq)]
struct Frame {
  kind: FrameKind,
  scope: ErasedScope,
}

#[derive(Clone, Debug, PartialEq)]
enum FrameKind {
  If {
    /// Branches closed so far.
    branches: Vec<(ErasedExpr, ErasedScope)>,
    /// Condition of the branch being recorded; `None` in the `else` branch.
    condition: Option<ErasedExpr>,
  },

  Do {
    prelude: Option<ErasedScope>,
    condition: Option<ErasedExpr>,
  },

  For {
    condition: ErasedExpr,
    continuing: ErasedScope,
  },

  Switch {
    selector: ErasedExpr,
    cases: Vec<SwitchCase>,
    current: Option<CaseLabel>,
  },
}

impl FrameKind {
  fn opener(&self) -> &'static str {
    match self {
      FrameKind::If { .. } => "if_",
      FrameKind::Do { .. } => "do_",
      FrameKind::For { .. } => "for_",
      FrameKind::Switch { .. } => "switch_",
    }
  }
}

/// Go one level deeper in the scope.
pub trait DeepScope {
  /// Create a new fresh scope under the current scope.
  fn deeper(&self) -> Self;
}

impl<R> DeepScope for Scope<R>
where
  Return: From<R>,
{
  fn deeper(&self) -> Self {
    Scope::new(self.erased.current_id() + 1)
  }
}

impl<R> DeepScope for LoopScope<R>
where
  Return: From<R>,
{
  fn deeper(&self) -> Self {
    LoopScope(self.0.deeper())
  }
}

/// Scopes allowing to enter conditional scopes.
pub trait Conditional: Sized {
  /// Conditional statement: `if`.
  ///
  /// `s.when(cond, |s| { /* body */ })` inserts a conditional branch in the EDSL using the `cond` expression as truth
  /// and the passed closure as body to run when the represented condition is `true`. The scope passed to the closure
  /// has the same kind as the current one, so a branch in a loop can break out of it.
  ///
  /// # Return
  ///
  /// A [`When`], allowing to chain other conditional statements, commonly referred to as `else if` and `else` in
  /// common languages.
  ///
  /// # Examples
  ///
  /// Early-return:
  ///
  /// ```
  /// use sable::{Conditional as _, Expr, Scope, StageBuilder, lit};
  ///
  /// StageBuilder::new_vertex_shader(|mut s, _, _| {
  ///   let f = s.fun(|s: &mut Scope<Expr<i32>>| {
  ///     s.when(lit!(1).lt(3), |s: &mut Scope<Expr<i32>>| {
  ///       // early-return with 0; only possible if the function returns Expr<i32>
  ///       s.leave(0);
  ///     });
  ///
  ///     lit!(1)
  ///   });
  ///
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     let x = s.var(f.call());
  ///   })
  /// });
  /// ```
  fn when<'a>(&'a mut self, condition: impl Into<Expr<bool>>, body: impl FnOnce(&mut Self)) -> When<'a, Self>;

  /// Complement form of [`Conditional::when`].
  ///
  /// This method does the same thing as [`Conditional::when`] but applies the [`Not::not`](std::ops::Not::not)
  /// operator on the condition first.
  fn unless<'a>(&'a mut self, condition: impl Into<Expr<bool>>, body: impl FnOnce(&mut Self)) -> When<'a, Self> {
    self.when(!condition.into(), body)
  }
}

impl<S> Conditional for S
where
  S: DeepScope + Erased<Erased = ErasedScope>,
{
  fn when<'a>(&'a mut self, condition: impl Into<Expr<bool>>, body: impl FnOnce(&mut Self)) -> When<'a, Self> {
    let mut scope = self.deeper();
    body(&mut scope);

    let scope = self.erased_mut().nest(scope.to_erased().finish());
    self.erased_mut().push(ScopeInstr::If {
      condition: condition.into().erased,
      scope,
    });

    When { parent_scope: self }
  }
}

/// Conditional combinator.
///
/// A [`When`] is returned from functions such as [`Conditional::when`] or [`Conditional::unless`] and allows to
/// continue chaining conditional statements, encoding the concept of `else if` and `else` in more traditional
/// languages.
#[derive(Debug)]
pub struct When<'a, S> {
  /// The scope from which this [`When`] expression comes from.
  ///
  /// This will be handy if we want to chain this when with others (corresponding to `else if` and `else`, for
  /// instance).
  parent_scope: &'a mut S,
}

impl<S> When<'_, S>
where
  S: DeepScope + Erased<Erased = ErasedScope>,
{
  /// Add a conditional branch: `else if`.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// use sable::{Conditional as _, lit};
  ///
  /// let x = lit!(1);
  ///
  /// s.when(x.lt(2), |s| {
  ///   // do something if x < 2
  /// }).or_else(x.lt(10), |s| {
  ///   // do something if x < 10
  /// });
  /// #   })
  /// # });
  /// ```
  pub fn or_else(self, condition: impl Into<Expr<bool>>, body: impl FnOnce(&mut S)) -> Self {
    let mut scope = self.parent_scope.deeper();
    body(&mut scope);

    let scope = self.parent_scope.erased_mut().nest(scope.to_erased().finish());
    self.parent_scope.erased_mut().push(ScopeInstr::ElseIf {
      condition: condition.into().erased,
      scope,
    });

    self
  }

  /// Add a final catch-all conditional branch: `else`.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// # StageBuilder::new_vertex_shader(|mut s, _, _| {
  /// #   s.main_fun(|s: &mut Scope<()>| {
  /// use sable::{Conditional as _, lit};
  ///
  /// let x = lit!(1);
  ///
  /// s.when(x.lt(2), |s| {
  ///   // do something if x < 2
  /// }).or_else(x.lt(5), |s| {
  ///   // do something if x < 5
  /// }).or(|s| {
  ///   // else, do this
  /// });
  /// #   })
  /// # });
  /// ```
  pub fn or(self, body: impl FnOnce(&mut S)) {
    let mut scope = self.parent_scope.deeper();
    body(&mut scope);

    let scope = self.parent_scope.erased_mut().nest(scope.to_erased().finish());
    self.parent_scope.erased_mut().push(ScopeInstr::Else { scope });
  }
}

/// Hierarchical and namespaced handle.
///
/// Handles live in different namespaces:
///
/// - The _built-in_ namespace gathers all built-ins.
/// - The _global_ namespace gathers constants declared at top-level of a shader stage.
/// - The _shared_ namespace gathers workgroup-shared variables.
/// - The _function argument_ namespace gives handles to function arguments, which exist only in a function body.
/// - The _function variable_ namespace gives handles to variables defined in function bodies. This namespace is
///   hierarchical: for each scope, a new namespace is created. The depth at which a namespace is located is referred
///   to as its _subscope_.
/// - The _interface_ namespace gathers what a [`PipelineLayout`](crate::layout::PipelineLayout) declares: bindings,
///   push constants, vertex attributes, varyings and color outputs.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ScopedHandle {
  BuiltIn(BuiltIn),
  Global(u16),
  Shared(u16),
  FunArg(u16),
  FunVar { subscope: u16, handle: u16 },
  Interface(InterfaceHandle),
}

impl ScopedHandle {
  pub(crate) const fn builtin(b: BuiltIn) -> Self {
    Self::BuiltIn(b)
  }

  pub(crate) const fn global(handle: u16) -> Self {
    Self::Global(handle)
  }

  pub(crate) const fn shared(handle: u16) -> Self {
    Self::Shared(handle)
  }

  pub(crate) const fn fun_arg(handle: u16) -> Self {
    Self::FunArg(handle)
  }

  pub(crate) const fn fun_var(subscope: u16, handle: u16) -> Self {
    Self::FunVar { subscope, handle }
  }
}

/// Item declared by a [`PipelineLayout`](crate::layout::PipelineLayout).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InterfaceHandle {
  /// Identity of the declaring layout.
  pub layout: u32,
  pub kind: InterfaceKind,
  /// Index of the item among the items of the same kind.
  pub index: u32,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum InterfaceKind {
  Binding,
  PushConstant,
  Attribute,
  /// Varying, as read by the consuming stage.
  VaryingIn,
  /// Varying, as written by the producing stage.
  VaryingOut,
  ColorOutput,
}

/// Label of a switch case.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CaseLabel {
  Value(i64),
  Default,
}

impl CaseLabel {
  /// The 32-bit literal of the label, as the selector sees it.
  pub fn literal(self) -> Option<u32> {
    match self {
      CaseLabel::Value(value) => Some(value as u32),
      CaseLabel::Default => None,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
  pub label: CaseLabel,
  pub scope: ErasedScope,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScopeInstr {
  VarDecl {
    ty: Type,
    handle: ScopedHandle,
    /// `None` declares a zero-initialized variable.
    init_value: Option<ErasedExpr>,
  },

  Return(ErasedReturn),

  Continue,

  Break,

  If {
    condition: ErasedExpr,
    scope: ErasedScope,
  },

  ElseIf {
    condition: ErasedExpr,
    scope: ErasedScope,
  },

  Else {
    scope: ErasedScope,
  },

  For {
    init_ty: Type,
    init_handle: ScopedHandle,
    init_expr: ErasedExpr,
    condition: ErasedExpr,
    post_expr: ErasedExpr,
    scope: ErasedScope,
  },

  While {
    condition: ErasedExpr,
    scope: ErasedScope,
  },

  /// General loop: `prelude` runs at the start of each iteration, then `condition` is tested, then `scope` (the body)
  /// and `continuing` run, and `post_condition` is tested before jumping back.
  ///
  /// Variables of `prelude` are visible in `scope`.
  Loop {
    prelude: ErasedScope,
    condition: Option<ErasedExpr>,
    scope: ErasedScope,
    continuing: ErasedScope,
    post_condition: Option<ErasedExpr>,
  },

  Switch {
    selector: ErasedExpr,
    cases: Vec<SwitchCase>,
  },

  MutateVar {
    var: ErasedExpr,
    bin_op: Option<MutateBinOp>,
    expr: ErasedExpr,
  },

  /// Expression evaluated for its side effects.
  Expr(ErasedExpr),

  Barrier(Barrier),

  Kill,

  EmitVertex,

  EndPrimitive,

  ImageWrite {
    image: ErasedExpr,
    coordinate: ErasedExpr,
    texel: ErasedExpr,
  },
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MutateBinOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Xor,
  And,
  Or,
  Shl,
  Shr,
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    expr::{BinOp, ExprNode},
    lit,
    types::V4,
  };

  fn int(i: i32) -> ErasedExpr {
    lit!(i).erase()
  }

  fn var(ty: Type, subscope: u16, handle: u16) -> ErasedExpr {
    ErasedExpr::var(ty, ScopedHandle::fun_var(subscope, handle))
  }

  #[test]
  fn when() {
    let mut s = Scope::<Expr<V4<f32>>>::new(0);

    let x = s.var(1);
    s.when(x.eq(lit!(2)), |s| {
      let y = s.var(lit![1f32, 2., 3., 4.]);
      s.leave(y);
    })
    .or_else(x.eq(lit!(0)), |s| s.leave(lit![0f32, 0., 0., 0.]))
    .or(|_| ());

    assert_eq!(s.erased.instructions.len(), 4);

    assert_eq!(
      s.erased.instructions[0],
      ScopeInstr::VarDecl {
        ty: i32::ty(),
        handle: ScopedHandle::fun_var(0, 0),
        init_value: Some(int(1)),
      }
    );

    // if
    let mut scope = ErasedScope::new(1);
    scope.next_var = 1;
    scope.instructions.push(ScopeInstr::VarDecl {
      ty: V4::<f32>::ty(),
      handle: ScopedHandle::fun_var(1, 0),
      init_value: Some(lit![1f32, 2., 3., 4.].erase()),
    });
    scope.instructions.push(ScopeInstr::Return(ErasedReturn::Expr(
      V4::<f32>::ty(),
      var(V4::<f32>::ty(), 1, 0),
    )));

    assert_eq!(
      s.erased.instructions[1],
      ScopeInstr::If {
        condition: ErasedExpr::binary(bool::ty(), BinOp::Eq, var(i32::ty(), 0, 0), int(2)),
        scope,
      }
    );

    // else if
    let mut scope = ErasedScope::new(1);
    scope.instructions.push(ScopeInstr::Return(ErasedReturn::Expr(
      V4::<f32>::ty(),
      lit![0f32, 0., 0., 0.].erase(),
    )));

    assert_eq!(
      s.erased.instructions[2],
      ScopeInstr::ElseIf {
        condition: ErasedExpr::binary(bool::ty(), BinOp::Eq, var(i32::ty(), 0, 0), int(0)),
        scope,
      }
    );

    // else
    assert_eq!(
      s.erased.instructions[3],
      ScopeInstr::Else {
        scope: ErasedScope::new(1)
      }
    );
  }

  #[test]
  fn for_loop() {
    let mut scope: Scope<Expr<i32>> = Scope::new(0);

    scope.loop_for(
      0,
      |a| a.lt(lit!(10)),
      |a| a + 1,
      |s, a| {
        s.leave(a);
      },
    );

    assert_eq!(scope.erased.instructions.len(), 1);

    let mut loop_scope = ErasedScope::new(1);
    loop_scope.next_var = 1;
    loop_scope
      .instructions
      .push(ScopeInstr::Return(ErasedReturn::Expr(i32::ty(), var(i32::ty(), 1, 0))));

    assert_eq!(
      scope.erased.instructions[0],
      ScopeInstr::For {
        init_ty: i32::ty(),
        init_handle: ScopedHandle::fun_var(1, 0),
        init_expr: int(0),
        condition: ErasedExpr::binary(bool::ty(), BinOp::Lt, var(i32::ty(), 1, 0), int(10)),
        post_expr: ErasedExpr::binary(i32::ty(), BinOp::Add, var(i32::ty(), 1, 0), int(1)),
        scope: loop_scope,
      }
    );
  }

  #[test]
  fn while_loop() {
    let mut scope: Scope<Expr<i32>> = Scope::new(0);

    scope.loop_while(lit!(1).lt(lit!(2)), LoopScope::loop_continue);

    let mut loop_scope = ErasedScope::new(1);
    loop_scope.instructions.push(ScopeInstr::Continue);

    assert_eq!(scope.erased.instructions.len(), 1);
    assert_eq!(
      scope.erased.instructions[0],
      ScopeInstr::While {
        condition: ErasedExpr::binary(bool::ty(), BinOp::Lt, int(1), int(2)),
        scope: loop_scope,
      }
    );
  }

  #[test]
  fn while_loop_if() {
    let mut scope: Scope<Expr<i32>> = Scope::new(0);

    scope.loop_while(lit!(1).lt(lit!(2)), |scope| {
      scope
        .when(lit!(1).lt(lit!(2)), |scope| scope.loop_break())
        .or(|scope| scope.loop_break());
    });

    match &scope.erased.instructions[..] {
      [ScopeInstr::While { scope, .. }] => {
        assert!(matches!(scope.instructions[..], [ScopeInstr::If { .. }, ScopeInstr::Else { .. }]));
      }
      instrs => panic!("unexpected instructions {:?}", instrs),
    }
  }

  #[test]
  fn balanced_markers() {
    let mut s = Scope::<()>::new(0);
    let x = s.var(0);

    s.if_(x.lt(1));
    s.set(&x, 1);
    s.elif_(x.lt(2));
    s.set(&x, 2);
    s.else_();
    s.set(&x, 3);
    s.fi();

    let s = s.finish();
    assert!(s.errors.is_empty());
    assert!(matches!(
      s.instructions[..],
      [
        ScopeInstr::VarDecl { .. },
        ScopeInstr::If { .. },
        ScopeInstr::ElseIf { .. },
        ScopeInstr::Else { .. }
      ]
    ));
  }

  #[test]
  fn unclosed_if() {
    let mut s = Scope::<()>::new(0);
    s.if_(lit!(true));

    let s = s.finish();
    assert_eq!(s.errors, vec![UsageError::UnclosedRegion { opener: "if_" }]);
  }

  #[test]
  fn closer_without_opener() {
    let mut s = Scope::<()>::new(0);
    s.fi();
    s.do_();
    s.rof();
    s.od();

    let s = s.finish();
    assert_eq!(
      s.errors,
      vec![
        UsageError::UnmatchedCloser {
          closer: "fi",
          opener: "if_"
        },
        UsageError::UnmatchedCloser {
          closer: "rof",
          opener: "for_"
        },
      ]
    );
    assert!(matches!(s.instructions[..], [ScopeInstr::Loop { .. }]));
  }

  #[test]
  fn nested_regions_record_in_innermost() {
    let mut s = Scope::<()>::new(0);
    let x = s.var(0);

    s.if_(x.lt(1));
    let y = s.var(1);
    s.do_();
    s.while_(y.lt(4));
    s.set(&y, &y + 1);
    s.od();
    s.fi();

    let s = s.finish();
    assert!(s.errors.is_empty());

    match &s.instructions[..] {
      [ScopeInstr::VarDecl { .. }, ScopeInstr::If { scope, .. }] => {
        assert_eq!(scope.id, 1);
        assert!(matches!(
          scope.instructions[..],
          [ScopeInstr::VarDecl { .. }, ScopeInstr::Loop { .. }]
        ));
        assert_eq!(y.0.erased.as_handle(), Some(&ScopedHandle::fun_var(1, 0)));
      }
      instrs => panic!("unexpected instructions {:?}", instrs),
    }
  }

  #[test]
  fn do_while_prelude() {
    let mut s = Scope::<()>::new(0);

    s.do_();
    let probe = s.var(lit!(2) * 2);
    s.while_(probe.lt(10));
    let inner = s.var(1);
    s.od();

    let s = s.finish();
    match &s.instructions[..] {
      [ScopeInstr::Loop {
        prelude,
        condition: Some(_),
        scope,
        post_condition: None,
        ..
      }] => {
        assert_eq!(prelude.instructions.len(), 1);
        assert_eq!(scope.instructions.len(), 1);
        assert_eq!(inner.0.erased.as_handle(), Some(&ScopedHandle::fun_var(1, 1)));
      }
      instrs => panic!("unexpected instructions {:?}", instrs),
    }
  }

  #[test]
  fn for_marker() {
    let mut s = Scope::<()>::new(0);
    let i = s.var(0);

    s.for_(&i, 5, 5, 1);
    s.rof();

    let s = s.finish();
    match &s.instructions[..] {
      [ScopeInstr::VarDecl { .. }, ScopeInstr::MutateVar { bin_op: None, expr, .. }, ScopeInstr::Loop {
        condition: Some(condition),
        continuing,
        ..
      }] => {
        assert_eq!(expr, &int(5));
        assert_eq!(condition.node(), &ExprNode::Binary(BinOp::Lt, var(i32::ty(), 0, 0), int(5)));
        assert!(matches!(
          continuing.instructions[..],
          [ScopeInstr::MutateVar {
            bin_op: Some(MutateBinOp::Add),
            ..
          }]
        ));
      }
      instrs => panic!("unexpected instructions {:?}", instrs),
    }
  }

  #[test]
  fn descending_for_marker() {
    let mut s = Scope::<()>::new(0);
    let i = s.var(0);

    s.for_(&i, 10, 0, -2);
    s.rof();

    match &s.erased.instructions[2] {
      ScopeInstr::Loop {
        condition: Some(condition),
        ..
      } => assert!(matches!(condition.node(), ExprNode::Binary(BinOp::Gt, ..))),
      instr => panic!("unexpected instruction {:?}", instr),
    }
  }

  #[test]
  fn switch_markers() {
    let mut s = Scope::<()>::new(0);
    let e = s.var(1);
    let x = s.var(0);

    s.switch_(&e);
    s.case_(1);
    s.set(&x, 1);
    s.case_(2);
    s.set(&x, 2);
    s.break_();
    s.default_();
    s.end_switch();

    let s = s.finish();
    assert!(s.errors.is_empty());

    match &s.instructions[2] {
      ScopeInstr::Switch { cases, .. } => {
        let labels: Vec<_> = cases.iter().map(|c| c.label).collect();
        assert_eq!(labels, vec![CaseLabel::Value(1), CaseLabel::Value(2), CaseLabel::Default]);
        assert_eq!(cases[0].scope.instructions.len(), 1);
        assert!(matches!(cases[1].scope.instructions[..], [_, ScopeInstr::Break]));
        assert!(cases[2].scope.instructions.is_empty());
      }
      instr => panic!("unexpected instruction {:?}", instr),
    }
  }

  #[test]
  fn switch_errors() {
    let mut s = Scope::<()>::new(0);
    let e = s.var(1);

    s.switch_(&e);
    s.set(&e, 2);
    s.case_(1);
    s.case_(1);
    s.default_();
    s.default_();
    s.end_switch();
    s.case_(3);

    let s = s.finish();
    assert_eq!(
      s.errors,
      vec![
        UsageError::StatementOutsideCase,
        UsageError::DuplicateCase(1),
        UsageError::DuplicateDefault,
        UsageError::UnmatchedCloser {
          closer: "case_",
          opener: "switch_"
        },
      ]
    );
  }

  #[test]
  fn case_labels_clash_on_their_literal() {
    let mut s = Scope::<()>::new(0);
    let e = s.var(0i32);

    s.switch_(&e);
    s.case_(-1i32);
    s.break_();
    s.case_(u32::MAX);
    s.break_();
    s.end_switch();

    let x = s.var(0u32);
    s.switch(&x).case(7, |_| ()).case(8, |_| ()).case(7, |_| ());

    let s = s.finish();
    assert_eq!(s.errors, vec![UsageError::DuplicateCase(u32::MAX as i64), UsageError::DuplicateCase(7)]);
    assert_eq!(CaseLabel::Value(-1).literal(), Some(u32::MAX));
    assert_eq!(CaseLabel::Default.literal(), None);
  }

  #[test]
  fn closure_switch() {
    let mut s = Scope::<()>::new(0);
    let x = s.var(0u32);

    s.switch(&x)
      .case(0, |s| {
        s.set(&x, 1u32);
        s.break_();
      })
      .case(0, |_| ())
      .default(|s| s.set(&x, 2u32));

    let s = s.finish();
    assert_eq!(s.errors, vec![UsageError::DuplicateCase(0)]);
    match &s.instructions[1] {
      ScopeInstr::Switch { cases, .. } => assert_eq!(cases.len(), 3),
      instr => panic!("unexpected instruction {:?}", instr),
    }
  }

  #[test]
  fn region_guard_closes() {
    let mut s = Scope::<()>::new(0);
    let x = s.var(1f32);

    {
      let mut s = s.scoped_if(x.gt(0.));
      s.set(&x, 0.);
      s.else_();
      s.set(&x, 1.);
    }

    let s = s.finish();
    assert!(s.errors.is_empty());
    assert!(matches!(
      s.instructions[..],
      [ScopeInstr::VarDecl { .. }, ScopeInstr::If { .. }, ScopeInstr::Else { .. }]
    ));
  }

  #[test]
  fn child_errors_reach_parent() {
    let mut s = Scope::<()>::new(0);

    s.loop_while(true, |s| {
      s.if_(lit!(true));
    });

    let s = s.finish();
    assert_eq!(s.errors, vec![UsageError::UnclosedRegion { opener: "if_" }]);
  }
}
