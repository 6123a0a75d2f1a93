//! Structured control flow.
//!
//! Every recorded scope becomes a region of blocks following the structured rules of SPIR-V: conditionals are
//! selections with a merge block, loops have a header, a continue block and a merge block. Statements recorded after
//! a `return`, a `break`, a `continue` or a `kill` are never reached: they are lowered into a detached copy of the
//! function, so that their errors are reported, and are left out of the module.

use std::collections::{HashMap, HashSet};

use crate::{
  error::{CompileError, UsageError},
  expr::{BinOp, ErasedExpr, ExprNode},
  fun::{ErasedFun, ErasedReturn},
  ir::{Block, Function, Handle, Instr, IrType, LocalVariable, Merge, Op, Operand, Terminator, Value},
  memory::MemoryLayout,
  scope::{ErasedScope, MutateBinOp, ScopeInstr, ScopedHandle, SwitchCase},
  stage::ShaderStage,
  types::Type,
};

use super::Lowerer;

/// Function being lowered.
pub(crate) struct FunCtx {
  pub(crate) name: String,
  ret_ty: Type,
  pub(crate) fun: Function,
  pub(crate) current: Handle<Block>,
  /// The current block cannot be reached.
  dead: bool,
  reached: HashSet<Handle<Block>>,
  vars: HashMap<(u16, u16), u32>,
  free_slots: HashMap<Handle<IrType>, Vec<u32>>,
  /// Variables declared by each open scope.
  frames: Vec<Vec<(u16, u16)>>,
  targets: Vec<Target>,
  /// Values of the nodes of the expression being lowered.
  pub(crate) memo: HashMap<*const ExprNode, Operand>,
}

#[derive(Clone, Copy, Debug)]
enum Target {
  Loop {
    merge: Handle<Block>,
    continuing: Handle<Block>,
  },
  Switch {
    merge: Handle<Block>,
  },
}

/// What runs in the continue block of a loop.
enum Continuing<'a> {
  Scope(&'a ErasedScope),
  /// Store `expr` into the counter of a `for` loop.
  Counter(u32, &'a ErasedExpr),
}

impl FunCtx {
  fn new(name: &str, ret_ty: Type, fun: Function) -> Self {
    let mut fun = fun;
    let entry = fun.blocks.append(Block::new());

    Self {
      name: name.to_owned(),
      ret_ty,
      fun,
      current: entry,
      dead: false,
      reached: std::iter::once(entry).collect(),
      vars: HashMap::new(),
      free_slots: HashMap::new(),
      frames: Vec::new(),
      targets: Vec::new(),
      memo: HashMap::new(),
    }
  }

  pub(crate) fn new_block(&mut self) -> Handle<Block> {
    self.fun.blocks.append(Block::new())
  }

  /// Push an instruction producing a value of type `ty`.
  pub(crate) fn value(&mut self, ty: Handle<IrType>, op: Op) -> Operand {
    let value = self.fun.values.append(Value { ty });
    self.fun.blocks[self.current].body.push(Instr {
      result: Some(value),
      op,
    });

    Operand::Value(value)
  }

  /// Push an instruction without result.
  pub(crate) fn effect(&mut self, op: Op) {
    self.fun.blocks[self.current].body.push(Instr { result: None, op });
  }

  fn set_merge(&mut self, merge: Merge) {
    self.fun.blocks[self.current].merge = Some(merge);
  }

  /// End the current block; what follows is unreachable until another block begins.
  fn terminate(&mut self, terminator: Terminator) {
    if self.dead {
      return;
    }

    self.reached.extend(terminator.successors());
    self.fun.blocks[self.current].terminator = terminator;
    self.dead = true;
  }

  fn begin(&mut self, block: Handle<Block>) {
    self.current = block;
    self.dead = !self.reached.contains(&block);
  }

  /// A copy of the function continuing in a fresh block, to lower statements that nothing reaches. Whatever it
  /// emits is dropped with it.
  fn detached(&self) -> Self {
    let mut fun = self.fun.clone();
    let current = fun.blocks.append(Block::new());

    Self {
      name: self.name.clone(),
      ret_ty: self.ret_ty.clone(),
      fun,
      current,
      dead: false,
      reached: std::iter::once(current).collect(),
      vars: self.vars.clone(),
      free_slots: self.free_slots.clone(),
      frames: self.frames.clone(),
      targets: self.targets.clone(),
      memo: HashMap::new(),
    }
  }

  pub(crate) fn local(&mut self, name: Option<String>, ty: Handle<IrType>, pointee: Handle<IrType>) -> u32 {
    if let Some(slot) = self.free_slots.get_mut(&pointee).and_then(Vec::pop) {
      return slot;
    }

    self.fun.locals.push(LocalVariable { name, ty, pointee });
    self.fun.locals.len() as u32 - 1
  }

  fn release(&mut self, slot: u32) {
    let pointee = self.fun.locals[slot as usize].pointee;
    self.free_slots.entry(pointee).or_default().push(slot);
  }

  pub(crate) fn var_slot(&self, subscope: u16, handle: u16) -> Option<u32> {
    self.vars.get(&(subscope, handle)).copied()
  }

  fn innermost_merge(&self) -> Option<Handle<Block>> {
    self.targets.last().map(|target| match *target {
      Target::Loop { merge, .. } | Target::Switch { merge } => merge,
    })
  }

  fn innermost_continue(&self) -> Option<Handle<Block>> {
    self.targets.iter().rev().find_map(|target| match *target {
      Target::Loop { continuing, .. } => Some(continuing),
      Target::Switch { .. } => None,
    })
  }
}

/// Lower the body of a function.
pub(crate) fn lower_function(lowerer: &mut Lowerer, name: &str, erased: &ErasedFun) -> Result<Function, CompileError> {
  let ret = lowerer.ir_type(&erased.ret_ty, MemoryLayout::Logical);

  let mut params = Vec::with_capacity(erased.args.len());
  for arg in &erased.args {
    if arg.is_opaque() {
      return Err(UsageError::OpaqueVariable(arg.clone()).into());
    }

    params.push(lowerer.ir_type(arg, MemoryLayout::Logical));
  }

  let ty = lowerer.types.insert(IrType::Function {
    ret,
    params: params.clone(),
  });

  let fun = Function {
    name: name.to_owned(),
    ret,
    ty,
    params,
    locals: Vec::new(),
    blocks: Default::default(),
    values: Default::default(),
  };

  let mut f = FunCtx::new(name, erased.ret_ty.clone(), fun);

  // the tail sees the variables of the body
  f.frames.push(Vec::new());
  lowerer.statements(&mut f, &erased.scope.instructions)?;

  match &erased.tail {
    Some(ret) if f.dead => {
      lowerer.ret(&mut f.detached(), ret)?;
    }

    Some(ret) => {
      let terminator = lowerer.ret(&mut f, ret)?;
      f.terminate(terminator);
    }

    None if f.dead => (),
    None if erased.ret_ty == Type::Void => f.terminate(Terminator::Return),

    None => {
      return Err(
        UsageError::MissingReturn {
          function: name.to_owned(),
          expected: erased.ret_ty.clone(),
        }
        .into(),
      )
    }
  }

  Ok(f.fun)
}

impl<'a> Lowerer<'a> {
  /// Lower the statements of a scope, in a frame of its own.
  pub(crate) fn scope(&mut self, f: &mut FunCtx, scope: &ErasedScope) -> Result<(), CompileError> {
    f.frames.push(Vec::new());
    let result = self.statements(f, &scope.instructions);
    self.close_frame(f);
    result
  }

  fn close_frame(&mut self, f: &mut FunCtx) {
    for key in f.frames.pop().unwrap_or_default() {
      if let Some(slot) = f.vars.remove(&key) {
        f.release(slot);
      }
    }
  }

  fn statements(&mut self, f: &mut FunCtx, instructions: &[ScopeInstr]) -> Result<(), CompileError> {
    let mut i = 0;

    while i < instructions.len() && !f.dead {
      match &instructions[i] {
        ScopeInstr::If { condition, scope } => {
          let mut branches = vec![(condition, scope)];
          let mut otherwise = None;

          // gather the following `else if` and `else` branches
          while let Some(next) = instructions.get(i + 1) {
            match next {
              ScopeInstr::ElseIf { condition, scope } if otherwise.is_none() => branches.push((condition, scope)),
              ScopeInstr::Else { scope } if otherwise.is_none() => otherwise = Some(scope),
              _ => break,
            }

            i += 1;
          }

          self.selection(f, &branches, otherwise)?;
        }

        ScopeInstr::ElseIf { .. } => {
          return Err(
            UsageError::UnmatchedCloser {
              closer: "elif_",
              opener: "if_",
            }
            .into(),
          )
        }

        ScopeInstr::Else { .. } => {
          return Err(
            UsageError::UnmatchedCloser {
              closer: "else_",
              opener: "if_",
            }
            .into(),
          )
        }

        instr => self.statement(f, instr)?,
      }

      i += 1;
    }

    if i < instructions.len() {
      // never executed, but still checked
      self.statements(&mut f.detached(), &instructions[i..])?;
    }

    Ok(())
  }

  fn statement(&mut self, f: &mut FunCtx, instr: &ScopeInstr) -> Result<(), CompileError> {
    match instr {
      ScopeInstr::VarDecl {
        ty,
        handle,
        init_value,
      } => {
        let ScopedHandle::FunVar { subscope, handle } = *handle else {
          return Err(UsageError::NotAssignable.into());
        };

        let slot = self.declare_var(f, ty, subscope, handle)?;
        let value = match init_value {
          Some(init) => self.eval(f, init)?,
          None => {
            let ty = self.ir_type(ty, MemoryLayout::Logical);
            Operand::Constant(self.null(ty))
          }
        };

        f.effect(Op::Store {
          pointer: Operand::Local(slot),
          value,
        });
      }

      ScopeInstr::Return(ret) => {
        let terminator = self.ret(f, ret)?;
        f.terminate(terminator);
      }

      ScopeInstr::Break => {
        let merge = f.innermost_merge().ok_or(UsageError::OutsideOf {
          what: "break",
          context: "a loop or switch",
        })?;
        f.terminate(Terminator::Branch(merge));
      }

      ScopeInstr::Continue => {
        let continuing = f.innermost_continue().ok_or(UsageError::OutsideOf {
          what: "continue",
          context: "a loop",
        })?;
        f.terminate(Terminator::Branch(continuing));
      }

      ScopeInstr::If { .. } | ScopeInstr::ElseIf { .. } | ScopeInstr::Else { .. } => {
        self.statements(f, std::slice::from_ref(instr))?;
      }

      ScopeInstr::For {
        init_ty,
        init_handle,
        init_expr,
        condition,
        post_expr,
        scope,
      } => {
        let ScopedHandle::FunVar { subscope, handle } = *init_handle else {
          return Err(UsageError::NotAssignable.into());
        };

        // the counter lives in a frame enclosing the loop
        f.frames.push(Vec::new());
        let slot = self.declare_var(f, init_ty, subscope, handle)?;
        let init = self.eval(f, init_expr)?;
        f.effect(Op::Store {
          pointer: Operand::Local(slot),
          value: init,
        });

        let result = self.lower_loop(
          f,
          None,
          Some(condition),
          scope,
          Continuing::Counter(slot, post_expr),
          None,
        );
        self.close_frame(f);
        result?;
      }

      ScopeInstr::While { condition, scope } => {
        self.lower_loop(f, None, Some(condition), scope, Continuing::Scope(&ErasedScope::new(scope.id)), None)?;
      }

      ScopeInstr::Loop {
        prelude,
        condition,
        scope,
        continuing,
        post_condition,
      } => {
        self.lower_loop(
          f,
          Some(prelude),
          condition.as_ref(),
          scope,
          Continuing::Scope(continuing),
          post_condition.as_ref(),
        )?;
      }

      ScopeInstr::Switch { selector, cases } => self.switch(f, selector, cases)?,

      ScopeInstr::MutateVar { var, bin_op, expr } => {
        let place = self.place(f, var)?.ok_or(UsageError::NotAssignable)?;

        let value = match bin_op {
          None => self.eval(f, expr)?,
          Some(op) => {
            let combined = ErasedExpr::binary(var.ty.clone(), binop(*op), var.clone(), expr.clone());
            self.eval(f, &combined)?
          }
        };

        self.store(f, &place, value)?;
      }

      ScopeInstr::Expr(expr) => {
        self.eval(f, expr)?;
      }

      ScopeInstr::Barrier(barrier) => {
        let semantics = barrier.semantics();

        match barrier.execution {
          Some(execution) => {
            if execution == crate::barrier::SyncScope::Workgroup
              && !matches!(self.stage, ShaderStage::Compute | ShaderStage::TessControl)
            {
              return Err(self.invalid_stage("workgroup barriers"));
            }

            f.effect(Op::ControlBarrier {
              execution: execution.to_spirv(),
              memory: barrier.memory.to_spirv(),
              semantics,
            });
          }

          None => f.effect(Op::MemoryBarrier {
            memory: barrier.memory.to_spirv(),
            semantics,
          }),
        }
      }

      ScopeInstr::Kill => {
        if self.stage != ShaderStage::Fragment {
          return Err(self.invalid_stage("discarding"));
        }

        f.terminate(Terminator::Kill);
      }

      ScopeInstr::EmitVertex => {
        if self.stage != ShaderStage::Geometry {
          return Err(self.invalid_stage("emitting vertices"));
        }

        f.effect(Op::EmitVertex);
      }

      ScopeInstr::EndPrimitive => {
        if self.stage != ShaderStage::Geometry {
          return Err(self.invalid_stage("ending primitives"));
        }

        f.effect(Op::EndPrimitive);
      }

      ScopeInstr::ImageWrite {
        image,
        coordinate,
        texel,
      } => {
        self.check_access(image, true)?;

        f.memo.clear();
        let image = self.expr(f, image)?;
        let coordinate = self.expr(f, coordinate)?;
        let texel = self.expr(f, texel)?;
        f.effect(Op::ImageWrite {
          image,
          coordinate,
          texel,
        });
      }
    }

    Ok(())
  }

  fn declare_var(&mut self, f: &mut FunCtx, ty: &Type, subscope: u16, handle: u16) -> Result<u32, CompileError> {
    if ty.is_opaque() {
      return Err(UsageError::OpaqueVariable(ty.clone()).into());
    }

    let pointee = self.ir_type(ty, MemoryLayout::Logical);
    let pointer = self.types.insert(IrType::Pointer {
      class: spirv::StorageClass::Function,
      pointee,
    });

    let slot = f.local(Some(format!("var{}_{}", subscope, handle)), pointer, pointee);

    // a sibling scope may have declared the same key
    if let Some(previous) = f.vars.insert((subscope, handle), slot) {
      f.release(previous);
    }

    if let Some(frame) = f.frames.last_mut() {
      frame.push((subscope, handle));
    }

    Ok(slot)
  }

  fn ret(&mut self, f: &mut FunCtx, ret: &ErasedReturn) -> Result<Terminator, CompileError> {
    let found = ret.ty();
    if found != f.ret_ty {
      return Err(
        UsageError::ReturnMismatch {
          function: f.name.clone(),
          expected: f.ret_ty.clone(),
          found,
        }
        .into(),
      );
    }

    match ret {
      ErasedReturn::Void => Ok(Terminator::Return),
      ErasedReturn::Expr(_, expr) => Ok(Terminator::ReturnValue(self.eval(f, expr)?)),
    }
  }

  fn selection(
    &mut self,
    f: &mut FunCtx,
    branches: &[(&ErasedExpr, &ErasedScope)],
    otherwise: Option<&ErasedScope>,
  ) -> Result<(), CompileError> {
    let Some(((condition, scope), rest)) = branches.split_first() else {
      // only reached through the `else` of the last branch
      if let Some(otherwise) = otherwise {
        self.scope(f, otherwise)?;
      }

      return Ok(());
    };

    let condition = self.eval(f, condition)?;
    let accept = f.new_block();
    let merge = f.new_block();
    let reject = if rest.is_empty() && otherwise.is_none() {
      None
    } else {
      Some(f.new_block())
    };

    f.set_merge(Merge::Selection { merge });
    f.terminate(Terminator::BranchConditional {
      condition,
      accept,
      reject: reject.unwrap_or(merge),
    });

    f.begin(accept);
    self.scope(f, scope)?;
    f.terminate(Terminator::Branch(merge));

    if let Some(reject) = reject {
      f.begin(reject);
      self.selection(f, rest, otherwise)?;
      f.terminate(Terminator::Branch(merge));
    }

    f.begin(merge);
    Ok(())
  }

  fn lower_loop(
    &mut self,
    f: &mut FunCtx,
    prelude: Option<&ErasedScope>,
    condition: Option<&ErasedExpr>,
    body: &ErasedScope,
    continuing: Continuing,
    post_condition: Option<&ErasedExpr>,
  ) -> Result<(), CompileError> {
    let header = f.new_block();
    let start = f.new_block();
    let continue_block = f.new_block();
    let merge = f.new_block();

    f.terminate(Terminator::Branch(header));
    f.begin(header);
    f.set_merge(Merge::Loop {
      merge,
      continuing: continue_block,
    });
    f.terminate(Terminator::Branch(start));

    f.targets.push(Target::Loop {
      merge,
      continuing: continue_block,
    });

    f.begin(start);

    // the prelude shares its variables with the body
    f.frames.push(Vec::new());
    let result = self.loop_body(f, prelude, condition, body, merge, continue_block);
    self.close_frame(f);
    f.targets.pop();
    result?;

    f.begin(continue_block);
    if f.dead {
      // an unreachable continue target still branches back to its header
      f.fun.blocks[continue_block].terminator = Terminator::Branch(header);

      let mut detached = f.detached();
      self.continuing(&mut detached, &continuing)?;
      if let Some(condition) = post_condition {
        self.eval(&mut detached, condition)?;
      }
    } else {
      self.continuing(f, &continuing)?;

      let terminator = match post_condition {
        Some(condition) => Terminator::BranchConditional {
          condition: self.eval(f, condition)?,
          accept: header,
          reject: merge,
        },
        None => Terminator::Branch(header),
      };

      if f.dead {
        f.fun.blocks[f.current].terminator = Terminator::Branch(header);
      } else {
        f.terminate(terminator);
      }
    }

    f.begin(merge);
    Ok(())
  }

  fn continuing(&mut self, f: &mut FunCtx, continuing: &Continuing) -> Result<(), CompileError> {
    match *continuing {
      Continuing::Scope(scope) => self.scope(f, scope),
      Continuing::Counter(slot, post) => {
        let value = self.eval(f, post)?;
        f.effect(Op::Store {
          pointer: Operand::Local(slot),
          value,
        });
        Ok(())
      }
    }
  }

  fn loop_body(
    &mut self,
    f: &mut FunCtx,
    prelude: Option<&ErasedScope>,
    condition: Option<&ErasedExpr>,
    body: &ErasedScope,
    merge: Handle<Block>,
    continue_block: Handle<Block>,
  ) -> Result<(), CompileError> {
    if let Some(prelude) = prelude {
      self.statements(f, &prelude.instructions)?;
    }

    if let Some(condition) = condition {
      if !f.dead {
        let condition = self.eval(f, condition)?;
        let accept = f.new_block();
        f.terminate(Terminator::BranchConditional {
          condition,
          accept,
          reject: merge,
        });
        f.begin(accept);
      } else {
        self.eval(&mut f.detached(), condition)?;
      }
    }

    self.statements(f, &body.instructions)?;
    f.terminate(Terminator::Branch(continue_block));
    Ok(())
  }

  fn switch(&mut self, f: &mut FunCtx, selector: &ErasedExpr, cases: &[SwitchCase]) -> Result<(), CompileError> {
    let selector = self.eval(f, selector)?;
    let merge = f.new_block();
    let blocks: Vec<_> = cases.iter().map(|_| f.new_block()).collect();

    let mut default = merge;
    let mut targets = Vec::new();
    for (case, &block) in cases.iter().zip(&blocks) {
      match case.label.literal() {
        Some(literal) => targets.push((literal, block)),
        None => default = block,
      }
    }

    f.set_merge(Merge::Selection { merge });
    f.terminate(Terminator::Switch {
      selector,
      default,
      targets,
    });

    f.targets.push(Target::Switch { merge });

    let mut result = Ok(());
    for (i, case) in cases.iter().enumerate() {
      f.begin(blocks[i]);
      result = self.scope(f, &case.scope);
      if result.is_err() {
        break;
      }

      // fall through the next case
      let next = blocks.get(i + 1).copied().unwrap_or(merge);
      f.terminate(Terminator::Branch(next));
    }

    f.targets.pop();
    result?;

    f.begin(merge);
    Ok(())
  }
}

fn binop(op: MutateBinOp) -> BinOp {
  match op {
    MutateBinOp::Add => BinOp::Add,
    MutateBinOp::Sub => BinOp::Sub,
    MutateBinOp::Mul => BinOp::Mul,
    MutateBinOp::Div => BinOp::Div,
    MutateBinOp::Rem => BinOp::Rem,
    MutateBinOp::Xor => BinOp::BitXor,
    MutateBinOp::And => BinOp::BitAnd,
    MutateBinOp::Or => BinOp::BitOr,
    MutateBinOp::Shl => BinOp::Shl,
    MutateBinOp::Shr => BinOp::Shr,
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    config::CompileOptions,
    expr::Expr,
    ir::Module,
    layout::PipelineLayout,
    lit,
    scope::{Conditional as _, Scope},
    stage::{Stage, StageBuilder},
    types::ToType,
  };

  fn lower(stage: &Stage) -> Result<Module, CompileError> {
    let options = CompileOptions::default().promote_variables(false);
    stage.compile(&PipelineLayout::new(), &options)
  }

  fn main_fun(module: &Module) -> &Function {
    &module.functions[module.entry_point]
  }

  fn headers(fun: &Function) -> (usize, usize) {
    fun.blocks.iter().fold((0, 0), |(sel, lp), (_, block)| match block.merge {
      Some(Merge::Selection { .. }) => (sel + 1, lp),
      Some(Merge::Loop { .. }) => (sel, lp + 1),
      None => (sel, lp),
    })
  }

  #[test]
  fn if_else_chain() {
    let stage = StageBuilder::new_vertex_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let x = s.var(1);
        s.when(x.lt(0), |s| s.set(&x, 0))
          .or_else(x.gt(10), |s| s.set(&x, 10))
          .or(|s| s.set(&x, 5));
      })
    });

    let module = lower(&stage).unwrap();
    let fun = main_fun(&module);

    // the `else if` is a selection nested in the `else` branch
    assert_eq!(headers(fun), (2, 0));
    assert_eq!(fun.locals.len(), 1);
  }

  #[test]
  fn code_after_return_is_skipped() {
    let stage = StageBuilder::new_vertex_shader(|mut s, _, _| {
      let f = s.fun(|s: &mut Scope<Expr<i32>>, a: Expr<i32>| {
        s.leave(a.clone());
        let _unused = s.var(3);
        a + 1
      });

      s.main_fun(|s: &mut Scope<()>| {
        let _x = s.var(f.call(lit!(1)));
      })
    });

    let module = lower(&stage).unwrap();
    let (_, callee) = module.functions.iter().next().unwrap();
    assert_eq!(callee.blocks.len(), 1);
    assert!(callee.locals.is_empty());
    assert!(matches!(
      callee.blocks[callee.entry()].terminator,
      Terminator::ReturnValue(Operand::Param(0))
    ));
  }

  #[test]
  fn unreachable_code_is_checked() {
    let mut other = PipelineLayout::new();
    let data = other.storage_array::<u32>(0);

    let after_abort = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.abort();
        s.set(data.at(0u32), 1u32);
      })
    });

    let after_break = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.loop_while(lit!(true), |s| {
          s.loop_break();
          s.set(data.at(0u32), 1u32);
        });
      })
    });

    let after_nested_abort = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.when(lit!(true), |s| s.abort()).or(|s| s.abort());
        s.set(data.at(0u32), 1u32);
      })
    });

    for stage in [after_abort, after_break, after_nested_abort] {
      assert!(matches!(
        lower(&stage),
        Err(CompileError::Usage(UsageError::UndeclaredBinding(_)))
      ));
    }

    let stray_break = StageBuilder::new_vertex_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.abort();
        s.break_();
      })
    });

    assert_eq!(
      lower(&stray_break).unwrap_err(),
      UsageError::OutsideOf {
        what: "break",
        context: "a loop or switch"
      }
      .into()
    );
  }

  #[test]
  fn loop_with_break_and_continue() {
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let sum = s.var(0u32);
        s.loop_for(
          0u32,
          |i| i.lt(10u32),
          |i| i + 1u32,
          |s, i| {
            s.when(i.eq(3u32), |s| s.loop_continue());
            s.when(i.eq(8u32), |s| s.loop_break());
            s.set(&sum, &sum + i);
          },
        );
      })
    });

    let module = lower(&stage).unwrap();
    let fun = main_fun(&module);
    assert_eq!(headers(fun), (2, 1));

    let (header, merge, continuing) = fun
      .blocks
      .iter()
      .find_map(|(h, b)| match b.merge {
        Some(Merge::Loop { merge, continuing }) => Some((h, merge, continuing)),
        _ => None,
      })
      .unwrap();

    assert_eq!(fun.blocks[continuing].terminator, Terminator::Branch(header));
    assert!(fun.predecessors()[merge.index()].len() >= 2);
  }

  #[test]
  fn break_outside_of_loops() {
    let stage = StageBuilder::new_vertex_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.break_();
      })
    });

    assert_eq!(
      lower(&stage).unwrap_err(),
      UsageError::OutsideOf {
        what: "break",
        context: "a loop or switch"
      }
      .into()
    );
  }

  #[test]
  fn missing_return() {
    let stage = StageBuilder::new_vertex_shader(|mut s, _, _| {
      let mut f = s.function::<f32>("half");
      let x = f.par::<f32>();
      let mut body = f.begin();
      body.when(x.lt(0.), |s| s.leave(&x * 0.5));
      let _half = s.end_function(body);

      s.main_fun(|_: &mut Scope<()>| {})
    });

    assert_eq!(
      lower(&stage).unwrap_err(),
      UsageError::MissingReturn {
        function: "half".to_owned(),
        expected: f32::ty()
      }
      .into()
    );
  }

  #[test]
  fn switch_falls_through() {
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let x = s.var(0);
        s.switch(input.local_invocation_index.cast::<i32>())
          .case(0, |s| s.set(&x, 1))
          .case(1, |s| s.break_())
          .default(|s| s.set(&x, 2));
      })
    });

    let module = lower(&stage).unwrap();
    let fun = main_fun(&module);

    let (targets, default) = fun
      .blocks
      .iter()
      .find_map(|(_, b)| match &b.terminator {
        Terminator::Switch { targets, default, .. } => Some((targets.clone(), *default)),
        _ => None,
      })
      .unwrap();

    assert_eq!(targets.iter().map(|(v, _)| *v).collect::<Vec<_>>(), vec![0, 1]);
    // case 0 falls into case 1
    assert_eq!(fun.blocks[targets[0].1].terminator, Terminator::Branch(targets[1].1));
    assert_ne!(default, targets[1].1);
  }

  #[test]
  fn kill_outside_fragment() {
    let stage = StageBuilder::new_vertex_shader(|s, _, _| s.main_fun(|s: &mut Scope<()>| s.kill()));

    assert!(matches!(
      lower(&stage),
      Err(CompileError::Usage(UsageError::InvalidStage { .. }))
    ));
  }
}
