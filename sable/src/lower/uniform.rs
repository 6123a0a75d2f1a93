//! Detection of control barriers reached under invocation-dependent control flow.
//!
//! The analysis is a taint propagation over the recorded statements. Values are *varying* when they derive from
//! per-invocation built-ins, stage inputs, subgroup operations or writable storage; variables assigned a varying value
//! or assigned under varying control become varying too. Loops are walked until no more variable becomes varying.
//! Function parameters are assumed uniform.

use std::collections::HashSet;

use crate::{
  barrier::SyncScope,
  builtin::{BuiltIn, ComputeBuiltIn},
  config::DivergencePolicy,
  error::{CompileError, UsageError},
  expr::{ErasedExpr, ExprNode},
  fun::{ErasedFun, ErasedFunHandle, ErasedReturn},
  layout::PipelineLayout,
  scope::{ErasedScope, InterfaceKind, ScopeInstr, ScopedHandle},
};

/// Check the control barriers of `fun` according to `policy`.
pub(crate) fn check_barriers(
  name: &str,
  fun: &ErasedFun,
  layout: &PipelineLayout,
  policy: DivergencePolicy,
) -> Result<(), CompileError> {
  if policy == DivergencePolicy::Ignore {
    return Ok(());
  }

  let mut analysis = Uniformity {
    layout,
    varying: HashSet::new(),
    divergent_barriers: 0,
  };

  // a pass can only add varying variables, so this terminates
  loop {
    let known = analysis.varying.len();
    analysis.divergent_barriers = 0;
    analysis.scope(&fun.scope, false);

    if analysis.varying.len() == known {
      break;
    }
  }

  if analysis.divergent_barriers == 0 {
    return Ok(());
  }

  match policy {
    DivergencePolicy::Deny => Err(
      UsageError::DivergentBarrier {
        function: name.to_owned(),
      }
      .into(),
    ),
    _ => {
      log::warn!(
        "{} control barrier(s) of `{}` may be reached by only some invocations",
        analysis.divergent_barriers,
        name
      );
      Ok(())
    }
  }
}

/// Divergent exits leaving a construct.
#[derive(Clone, Copy, Debug, Default)]
struct Exits {
  /// `return` or `kill` under varying control.
  leaves: bool,
  /// `break` or `continue` under varying control.
  breaks: bool,
}

impl Exits {
  fn any(self) -> bool {
    self.leaves || self.breaks
  }

  fn merge(self, other: Self) -> Self {
    Exits {
      leaves: self.leaves || other.leaves,
      breaks: self.breaks || other.breaks,
    }
  }
}

struct Uniformity<'a> {
  layout: &'a PipelineLayout,
  varying: HashSet<ScopedHandle>,
  divergent_barriers: usize,
}

impl<'a> Uniformity<'a> {
  fn scope(&mut self, scope: &ErasedScope, divergent: bool) -> Exits {
    let mut divergent = divergent;
    let mut exits = Exits::default();
    // whether one of the conditions of the current if/else-if chain is varying
    let mut chain = false;

    for instr in &scope.instructions {
      let found = match instr {
        ScopeInstr::VarDecl {
          handle, init_value, ..
        } => {
          let varying = init_value.as_ref().map_or(false, |init| self.is_varying(init));
          self.assign(handle.clone(), divergent || varying);
          Exits::default()
        }

        ScopeInstr::Return(ret) => {
          if let ErasedReturn::Expr(_, e) = ret {
            self.is_varying(e);
          }

          Exits {
            leaves: divergent,
            breaks: false,
          }
        }

        ScopeInstr::Kill => Exits {
          leaves: divergent,
          breaks: false,
        },

        ScopeInstr::Break | ScopeInstr::Continue => Exits {
          leaves: false,
          breaks: divergent,
        },

        ScopeInstr::If { condition, scope } => {
          chain = self.is_varying(condition);
          self.scope(scope, divergent || chain)
        }

        ScopeInstr::ElseIf { condition, scope } => {
          chain = chain || self.is_varying(condition);
          self.scope(scope, divergent || chain)
        }

        ScopeInstr::Else { scope } => self.scope(scope, divergent || chain),

        ScopeInstr::For {
          init_handle,
          init_expr,
          condition,
          post_expr,
          scope,
          ..
        } => {
          let init = self.is_varying(init_expr);
          self.assign(init_handle.clone(), divergent || init);
          let post = self.is_varying(post_expr);
          self.assign(init_handle.clone(), divergent || post);

          let varying = self.is_varying(condition);
          self.loop_body(&[scope], divergent || varying)
        }

        ScopeInstr::While { condition, scope } => {
          let varying = self.is_varying(condition);
          self.loop_body(&[scope], divergent || varying)
        }

        ScopeInstr::Loop {
          prelude,
          condition,
          scope,
          continuing,
          post_condition,
        } => {
          let prelude_exits = self.scope(prelude, divergent);
          let varying = condition.as_ref().map_or(false, |c| self.is_varying(c))
            || post_condition.as_ref().map_or(false, |c| self.is_varying(c))
            || prelude_exits.any();
          self.loop_body(&[scope, continuing], divergent || varying)
        }

        ScopeInstr::Switch { selector, cases } => {
          let mut case_divergent = divergent || self.is_varying(selector);
          let mut leaves = false;

          // falling through from a case left by some invocations only is divergent
          for case in cases {
            let case_exits = self.scope(&case.scope, case_divergent);
            case_divergent = case_divergent || case_exits.breaks;
            leaves = leaves || case_exits.leaves;
          }

          Exits { leaves, breaks: false }
        }

        ScopeInstr::MutateVar { var, expr, .. } => {
          let varying = self.is_varying(expr) || self.is_varying(var);
          if let Some(root) = root_handle(var) {
            self.assign(root.clone(), divergent || varying);
          }

          Exits::default()
        }

        ScopeInstr::Expr(e) => {
          self.is_varying(e);
          Exits::default()
        }

        ScopeInstr::Barrier(barrier) => {
          if divergent && barrier.is_control() && barrier.execution != Some(SyncScope::Subgroup) {
            self.divergent_barriers += 1;
          }

          Exits::default()
        }

        ScopeInstr::EmitVertex | ScopeInstr::EndPrimitive | ScopeInstr::ImageWrite { .. } => Exits::default(),
      };

      if !matches!(instr, ScopeInstr::If { .. } | ScopeInstr::ElseIf { .. }) {
        chain = false;
      }

      // invocations that left early do not run the rest of the scope
      if found.any() {
        divergent = true;
      }

      exits = exits.merge(found);
    }

    exits
  }

  /// Walk a loop body; a divergent `break` makes the whole body divergent for the next iterations.
  fn loop_body(&mut self, scopes: &[&ErasedScope], divergent: bool) -> Exits {
    let mut exits = Exits::default();
    for scope in scopes {
      exits = exits.merge(self.scope(scope, divergent));
    }

    if exits.breaks && !divergent {
      for scope in scopes {
        self.scope(scope, true);
      }
    }

    Exits {
      leaves: exits.leaves,
      breaks: false,
    }
  }

  fn assign(&mut self, handle: ScopedHandle, varying: bool) {
    if varying {
      self.varying.insert(handle);
    }
  }

  fn is_varying(&self, expr: &ErasedExpr) -> bool {
    match expr.node() {
      ExprNode::Lit(_) | ExprNode::Invalid(_) => false,

      ExprNode::Var(handle) => self.is_varying_handle(handle),

      ExprNode::FunCall(ErasedFunHandle::Subgroup(_), _) => true,

      ExprNode::Construct(parts) | ExprNode::FunCall(_, parts) => parts.iter().any(|p| self.is_varying(p)),

      ExprNode::Unary(_, a)
      | ExprNode::Cast(a)
      | ExprNode::Bitcast(a)
      | ExprNode::Swizzle(a, _)
      | ExprNode::Field { object: a, .. }
      | ExprNode::ArrayLength(a) => self.is_varying(a),

      ExprNode::Binary(_, a, b) | ExprNode::ArrayLookup { object: a, index: b } => {
        self.is_varying(a) || self.is_varying(b)
      }

      ExprNode::Select(c, a, b) => self.is_varying(c) || self.is_varying(a) || self.is_varying(b),
    }
  }

  fn is_varying_handle(&self, handle: &ScopedHandle) -> bool {
    match handle {
      ScopedHandle::BuiltIn(b) => !matches!(
        b,
        BuiltIn::Compute(ComputeBuiltIn::WorkgroupId | ComputeBuiltIn::NumWorkgroups | ComputeBuiltIn::SubgroupSize)
      ),

      ScopedHandle::Global(_) | ScopedHandle::FunArg(_) => false,

      // other invocations may write shared memory at any time
      ScopedHandle::Shared(_) => true,

      ScopedHandle::FunVar { .. } => self.varying.contains(handle),

      ScopedHandle::Interface(ih) => match ih.kind {
        InterfaceKind::Binding => self
          .layout
          .binding_decl(ih.index)
          .map_or(false, |decl| decl.access.can_write()),
        InterfaceKind::PushConstant => false,
        InterfaceKind::Attribute
        | InterfaceKind::VaryingIn
        | InterfaceKind::VaryingOut
        | InterfaceKind::ColorOutput => true,
      },
    }
  }
}

/// Variable a place expression refers to.
fn root_handle(expr: &ErasedExpr) -> Option<&ScopedHandle> {
  match expr.node() {
    ExprNode::Var(handle) => Some(handle),
    ExprNode::Swizzle(object, _) | ExprNode::Field { object, .. } | ExprNode::ArrayLookup { object, .. } => {
      root_handle(object)
    }
    _ => None,
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    config::CompileOptions,
    lit,
    scope::{Conditional as _, LoopScope, Scope},
    stage::{Stage, StageBuilder},
    swizzle::HasX as _,
  };

  fn compile(stage: &Stage, policy: DivergencePolicy) -> Result<(), CompileError> {
    let options = CompileOptions::default().divergent_barriers(policy);
    stage.compile(&PipelineLayout::new(), &options).map(|_| ())
  }

  fn denied() -> CompileError {
    UsageError::DivergentBarrier {
      function: "main".to_owned(),
    }
    .into()
  }

  #[test]
  fn barrier_under_invocation_condition() {
    let stage = StageBuilder::new_compute_shader([64, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        s.when(input.local_invocation_index.lt(32u32), |s| s.workgroup_barrier());
      })
    });

    assert_eq!(compile(&stage, DivergencePolicy::Deny), Err(denied()));
    assert_eq!(compile(&stage, DivergencePolicy::Warn), Ok(()));
    assert_eq!(compile(&stage, DivergencePolicy::Ignore), Ok(()));
  }

  #[test]
  fn barrier_under_uniform_condition() {
    let stage = StageBuilder::new_compute_shader([64, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        s.when(input.workgroup_id.x().eq(0u32), |s| s.workgroup_barrier());
        s.loop_for(0u32, |i| i.lt(4u32), |i| i + 1u32, |s: &mut LoopScope<()>, _| {
          s.workgroup_barrier();
        });
      })
    });

    assert_eq!(compile(&stage, DivergencePolicy::Deny), Ok(()));
  }

  #[test]
  fn varying_values_flow_through_variables() {
    let stage = StageBuilder::new_compute_shader([64, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let n = s.var(lit!(0u32));
        let count = s.var(lit!(4u32));
        s.set(&n, input.local_invocation_index.clone());
        // `count` becomes varying once the loop body has been seen
        s.loop_while(n.lt(&count), |s: &mut LoopScope<()>| {
          s.set(&n, &n + 1u32);
        });
        s.set(&count, &n);
        s.loop_while(count.lt(8u32), |s: &mut LoopScope<()>| {
          s.workgroup_barrier();
          s.set(&count, &count + 1u32);
        });
      })
    });

    assert_eq!(compile(&stage, DivergencePolicy::Deny), Err(denied()));
  }

  #[test]
  fn early_return_makes_the_rest_divergent() {
    let stage = StageBuilder::new_compute_shader([64, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        s.when(input.local_invocation_index.gt(60u32), |s| s.abort());
        s.workgroup_barrier();
      })
    });

    assert_eq!(compile(&stage, DivergencePolicy::Deny), Err(denied()));
  }

  #[test]
  fn subgroup_barriers_are_not_checked() {
    let stage = StageBuilder::new_compute_shader([64, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        s.when(input.local_invocation_index.lt(32u32), |s| s.subgroup_barrier());
      })
    });

    assert_eq!(compile(&stage, DivergencePolicy::Deny), Ok(()));
  }
}
