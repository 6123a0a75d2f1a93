//! Promotion of function variables to SSA values.
//!
//! A function variable holding a scalar, a vector or a matrix that is only ever loaded and stored as a whole is
//! replaced by the values stored into it. Where several definitions reach a block, an `OpPhi` merges them. Reads are
//! resolved on demand, walking predecessors backwards, and a phi whose incoming values are all the same is replaced
//! by that value.

use std::collections::{HashMap, HashSet};

use crate::ir::{
  Arena, Block, Constant, Function, Handle, Instr, IrType, Module, Op, Operand, Terminator, UniqueArena, Value,
};

/// Promote the variables of every function of `module`.
pub(crate) fn promote(module: &mut Module) {
  let Module {
    types,
    constants,
    functions,
    ..
  } = module;

  for (_, function) in functions.iter_mut() {
    let promoted = promote_function(function, types, constants);

    if promoted > 0 {
      log::trace!("promoted {} variable(s) of `{}`", promoted, function.name);
    }
  }
}

/// Promote the variables of `function`; return how many were promoted.
fn promote_function(
  function: &mut Function,
  types: &UniqueArena<IrType>,
  constants: &mut UniqueArena<Constant>,
) -> usize {
  let candidates = candidates(function, types);
  if candidates.is_empty() {
    return 0;
  }

  let mut promoter = Promoter {
    candidates: &candidates,
    locals: function.locals.iter().map(|l| l.pointee).collect(),
    preds: function.predecessors(),
    end_defs: HashMap::new(),
    entry_defs: HashMap::new(),
    phis: Vec::new(),
    replacements: HashMap::new(),
    values: &mut function.values,
    constants,
  };

  // definitions local to each block; loads before any store read the value live at the entry of the block
  let mut entry_reads = Vec::new();
  for (handle, block) in function.blocks.iter() {
    let mut defs: HashMap<u32, Operand> = HashMap::new();

    for instr in &block.body {
      match (&instr.op, instr.result) {
        (Op::Load { pointer: Operand::Local(var) }, Some(result)) if candidates.contains(var) => match defs.get(var) {
          Some(&def) => {
            promoter.replacements.insert(result, def);
          }
          None => entry_reads.push((handle, *var, result)),
        },

        (
          Op::Store {
            pointer: Operand::Local(var),
            value,
          },
          _,
        ) if candidates.contains(var) => {
          defs.insert(*var, *value);
        }

        _ => (),
      }
    }

    for (var, def) in defs {
      promoter.end_defs.insert((handle, var), def);
    }
  }

  for (block, var, result) in entry_reads {
    let def = promoter.entry_value(var, block);
    promoter.replacements.insert(result, def);
  }

  let Promoter {
    phis, replacements, ..
  } = promoter;

  rewrite(function, &candidates, phis, &replacements);
  candidates.len()
}

/// Variables of `function` that can be promoted.
fn candidates(function: &Function, types: &UniqueArena<IrType>) -> HashSet<u32> {
  let mut candidates: HashSet<u32> = function
    .locals
    .iter()
    .enumerate()
    .filter(|(_, local)| {
      matches!(
        types[local.pointee],
        IrType::Bool | IrType::Int { .. } | IrType::Float { .. } | IrType::Vector { .. } | IrType::Matrix { .. }
      )
    })
    .map(|(i, _)| i as u32)
    .collect();

  // any use other than a whole load or store disqualifies the variable
  for (_, block) in function.blocks.iter() {
    for instr in &block.body {
      let operands = match &instr.op {
        Op::Load { .. } => Vec::new(),
        Op::Store { value, .. } => vec![*value],
        op => op.operands(),
      };

      for operand in operands {
        if let Operand::Local(var) = operand {
          candidates.remove(&var);
        }
      }
    }
  }

  candidates
}

struct Promoter<'a> {
  candidates: &'a HashSet<u32>,
  /// Pointee type of every local.
  locals: Vec<Handle<IrType>>,
  preds: Vec<Vec<Handle<Block>>>,
  /// Last value stored into a variable in a block.
  end_defs: HashMap<(Handle<Block>, u32), Operand>,
  /// Value of a variable at the entry of a block.
  entry_defs: HashMap<(Handle<Block>, u32), Operand>,
  phis: Vec<(Handle<Block>, Handle<Value>, Vec<(Operand, Handle<Block>)>)>,
  replacements: HashMap<Handle<Value>, Operand>,
  values: &'a mut Arena<Value>,
  constants: &'a mut UniqueArena<Constant>,
}

impl<'a> Promoter<'a> {
  fn end_value(&mut self, var: u32, block: Handle<Block>) -> Operand {
    match self.end_defs.get(&(block, var)) {
      Some(&def) => def,
      None => self.entry_value(var, block),
    }
  }

  fn entry_value(&mut self, var: u32, block: Handle<Block>) -> Operand {
    debug_assert!(self.candidates.contains(&var));

    if let Some(&def) = self.entry_defs.get(&(block, var)) {
      return def;
    }

    let preds = self.preds[block.index()].clone();
    let ty = self.locals[var as usize];

    let def = match preds[..] {
      // variables are always initialized before being read; this is only reached from dead code
      [] => Operand::Constant(self.constants.insert(Constant::Null { ty })),

      [pred] => {
        let def = self.end_value(var, pred);
        self.entry_defs.insert((block, var), def);
        def
      }

      _ => {
        // the phi is registered before its operands are looked up, so that loops find it
        let phi = self.values.append(Value { ty });
        self.entry_defs.insert((block, var), Operand::Value(phi));

        let incoming: Vec<_> = preds.iter().map(|&pred| (self.end_value(var, pred), pred)).collect();

        let mut distinct = incoming
          .iter()
          .map(|(operand, _)| *operand)
          .filter(|&operand| operand != Operand::Value(phi));
        let first = distinct.next();

        match first {
          Some(same) if distinct.all(|operand| operand == same) => {
            self.replacements.insert(phi, same);
            self.entry_defs.insert((block, var), same);
            same
          }

          _ => {
            self.phis.push((block, phi, incoming));
            Operand::Value(phi)
          }
        }
      }
    };

    self.entry_defs.insert((block, var), def);
    def
  }
}

/// Follow replacements until a value that is kept.
fn resolve(operand: Operand, replacements: &HashMap<Handle<Value>, Operand>) -> Operand {
  let mut current = operand;
  let mut steps = 0;

  while let Operand::Value(value) = current {
    match replacements.get(&value) {
      Some(&next) if steps <= replacements.len() => {
        current = next;
        steps += 1;
      }
      _ => break,
    }
  }

  current
}

fn rewrite(
  function: &mut Function,
  candidates: &HashSet<u32>,
  phis: Vec<(Handle<Block>, Handle<Value>, Vec<(Operand, Handle<Block>)>)>,
  replacements: &HashMap<Handle<Value>, Operand>,
) {
  // remaining locals are renumbered
  let mut renumbered = HashMap::new();
  let mut locals = Vec::new();
  for (i, local) in function.locals.drain(..).enumerate() {
    if !candidates.contains(&(i as u32)) {
      renumbered.insert(i as u32, locals.len() as u32);
      locals.push(local);
    }
  }
  function.locals = locals;

  let map = |operand: Operand| match resolve(operand, replacements) {
    Operand::Local(i) => Operand::Local(renumbered.get(&i).copied().unwrap_or(i)),
    other => other,
  };

  let mut phis_by_block: HashMap<Handle<Block>, Vec<Instr>> = HashMap::new();
  for (block, phi, incoming) in phis {
    if replacements.contains_key(&phi) {
      continue;
    }

    phis_by_block.entry(block).or_default().push(Instr {
      result: Some(phi),
      op: Op::Phi { incoming },
    });
  }

  for (handle, block) in function.blocks.iter_mut() {
    let body = std::mem::take(&mut block.body);
    let mut rewritten = phis_by_block.remove(&handle).unwrap_or_default();

    for instr in body {
      let promoted = match &instr.op {
        Op::Load {
          pointer: Operand::Local(var),
        }
        | Op::Store {
          pointer: Operand::Local(var),
          ..
        } => candidates.contains(var),
        _ => false,
      };

      if !promoted {
        rewritten.push(instr);
      }
    }

    for instr in &mut rewritten {
      instr.op.map_operands(map);
    }

    match &mut block.terminator {
      Terminator::BranchConditional { condition, .. } => *condition = map(*condition),
      Terminator::Switch { selector, .. } => *selector = map(*selector),
      Terminator::ReturnValue(value) => *value = map(*value),
      _ => (),
    }

    block.body = rewritten;
  }
}

#[cfg(test)]
mod test {
  use crate::{
    config::CompileOptions,
    ir::{Module, Op, Operand},
    layout::PipelineLayout,
    lit,
    scope::{Conditional as _, LoopScope, Scope},
    stage::{Stage, StageBuilder},
  };

  fn compile(stage: &Stage) -> Module {
    stage.compile(&PipelineLayout::new(), &CompileOptions::default()).unwrap()
  }

  fn ops(module: &Module) -> Vec<&Op> {
    let fun = &module.functions[module.entry_point];
    fun.blocks.iter().flat_map(|(_, b)| b.body.iter().map(|i| &i.op)).collect()
  }

  #[test]
  fn branches_merge_with_phi() {
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let x = s.var(lit!(1u32));
        s.when(input.local_invocation_index.eq(0u32), |s| s.set(&x, 2u32))
          .or(|s| s.set(&x, 3u32));
        let _y = s.var(&x + 1u32);
      })
    });

    let module = compile(&stage);
    let fun = &module.functions[module.entry_point];
    assert!(fun.locals.is_empty());

    let phis: Vec<_> = ops(&module)
      .into_iter()
      .filter_map(|op| match op {
        Op::Phi { incoming } => Some(incoming.len()),
        _ => None,
      })
      .collect();
    assert_eq!(phis, vec![2]);
    assert!(ops(&module).iter().all(|op| !matches!(
      op,
      Op::Load {
        pointer: Operand::Local(_)
      } | Op::Store {
        pointer: Operand::Local(_),
        ..
      }
    )));
  }

  #[test]
  fn loop_counter_gets_header_phi() {
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let sum = s.var(lit!(0u32));
        s.loop_for(0u32, |i| i.lt(8u32), |i| i + 1u32, |s: &mut LoopScope<()>, i| {
          s.set(&sum, &sum + i);
        });
      })
    });

    let module = compile(&stage);
    let fun = &module.functions[module.entry_point];
    assert!(fun.locals.is_empty());

    // the counter and the sum both live across the back-edge
    let phis = ops(&module).into_iter().filter(|op| matches!(op, Op::Phi { .. })).count();
    assert_eq!(phis, 2);
  }

  #[test]
  fn arrays_stay_in_memory() {
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let weights = s.array::<f32>(4);
        s.set(weights.at(input.local_invocation_index.clone()), 1.);
        let counter = s.var(lit!(0i32));
        s.set(&counter, &counter + 1);
      })
    });

    let module = compile(&stage);
    let fun = &module.functions[module.entry_point];
    assert_eq!(fun.locals.len(), 1);
    assert!(ops(&module).iter().any(|op| matches!(op, Op::AccessChain { .. })));
  }
}
