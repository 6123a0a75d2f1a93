//! Lowered representation of a shader stage.
//!
//! Lowering turns the statements recorded by a stage into a [`Module`]: structured basic blocks of instructions in
//! SSA form, close to what SPIR-V encodes, but with arena handles instead of result IDs. IDs are only assigned by the
//! [writer](crate::writer) when the module is assembled, so the module can still be rewritten (variable promotion)
//! and interpreted (the [executor](crate::exec)) before that.

pub mod arena;

use std::collections::BTreeSet;

pub use arena::{Arena, Handle, UniqueArena};

use crate::{
  config::SpirvVersion,
  reflect::StageReflection,
  stage::{ShaderStage, StageConfig},
};

/// Type declared by a module.
///
/// Types are deduplicated: two structurally equal types share one handle. Aggregates in explicitly laid out memory
/// carry their strides and offsets, so the same shading type can map to several module types.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum IrType {
  Void,
  Bool,
  Int {
    width: u32,
    signed: bool,
  },
  Float {
    width: u32,
  },
  Vector {
    component: Handle<IrType>,
    size: u32,
  },
  Matrix {
    column: Handle<IrType>,
    columns: u32,
  },
  Array {
    element: Handle<IrType>,
    len: Handle<Constant>,
    stride: Option<u32>,
  },
  RuntimeArray {
    element: Handle<IrType>,
    stride: Option<u32>,
  },
  Struct(IrStruct),
  Pointer {
    class: spirv::StorageClass,
    pointee: Handle<IrType>,
  },
  Function {
    ret: Handle<IrType>,
    params: Vec<Handle<IrType>>,
  },
  Image(IrImage),
  Sampler,
  SampledImage {
    image: Handle<IrType>,
  },
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IrStruct {
  pub name: String,
  pub members: Vec<Member>,
  pub block: Option<BlockDecoration>,
}

/// Member of a struct type.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Member {
  pub name: String,
  pub ty: Handle<IrType>,
  pub offset: Option<u32>,
  /// Stride of the columns of a matrix member, or of the matrices of an array-of-matrices member.
  pub matrix_stride: Option<u32>,
  pub relaxed: bool,
  pub non_writable: bool,
}

/// Decoration of the struct wrapping the content of a buffer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BlockDecoration {
  Block,
  BufferBlock,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IrImage {
  pub sampled_type: Handle<IrType>,
  pub dim: spirv::Dim,
  pub arrayed: bool,
  pub multisampled: bool,
  /// `1` for images used with a sampler, `2` for storage images and subpass data.
  pub sampled: u32,
  pub format: spirv::ImageFormat,
}

/// Constant declared by a module.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Constant {
  Bool { ty: Handle<IrType>, value: bool },
  /// Number, as its bit pattern; the width is given by the type.
  Scalar { ty: Handle<IrType>, bits: u64 },
  Composite { ty: Handle<IrType>, parts: Vec<Handle<Constant>> },
  Null { ty: Handle<IrType> },
}

impl Constant {
  pub fn ty(&self) -> Handle<IrType> {
    match *self {
      Constant::Bool { ty, .. } | Constant::Scalar { ty, .. } | Constant::Composite { ty, .. } | Constant::Null { ty } => {
        ty
      }
    }
  }
}

/// Decoration of a global variable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Decoration {
  BuiltIn(spirv::BuiltIn),
  Location(u32),
  DescriptorSet(u32),
  Binding(u32),
  InputAttachmentIndex(u32),
  Flat,
  NoPerspective,
  Centroid,
  Sample,
  Patch,
  RelaxedPrecision,
  NonWritable,
  NonReadable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalVariable {
  pub name: Option<String>,
  pub class: spirv::StorageClass,
  /// Pointer type of the variable.
  pub ty: Handle<IrType>,
  pub pointee: Handle<IrType>,
  pub decorations: Vec<Decoration>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariable {
  pub name: Option<String>,
  pub ty: Handle<IrType>,
  pub pointee: Handle<IrType>,
}

/// SSA value produced by an instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Value {
  pub ty: Handle<IrType>,
}

/// Operand of an instruction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operand {
  Value(Handle<Value>),
  Constant(Handle<Constant>),
  Global(Handle<GlobalVariable>),
  /// Function variable, by its index in [`Function::locals`].
  Local(u32),
  Param(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
  Load {
    pointer: Operand,
  },
  Store {
    pointer: Operand,
    value: Operand,
  },
  AccessChain {
    base: Operand,
    indices: Vec<Operand>,
  },
  /// One-operand core instruction: negations, conversions, derivatives, relational tests…
  Unary {
    op: spirv::Op,
    operand: Operand,
  },
  /// Two-operand core instruction: arithmetic, comparisons, matrix products…
  Binary {
    op: spirv::Op,
    left: Operand,
    right: Operand,
  },
  Construct {
    parts: Vec<Operand>,
  },
  Extract {
    composite: Operand,
    indices: Vec<u32>,
  },
  Insert {
    object: Operand,
    composite: Operand,
    indices: Vec<u32>,
  },
  Shuffle {
    first: Operand,
    second: Operand,
    components: Vec<u32>,
  },
  Select {
    condition: Operand,
    accept: Operand,
    reject: Operand,
  },
  /// Instruction of the `GLSL.std.450` set.
  Ext {
    op: spirv::GLOp,
    args: Vec<Operand>,
  },
  Call {
    function: Handle<Function>,
    args: Vec<Operand>,
  },
  ArrayLength {
    structure: Operand,
    member: u32,
  },
  SampledImage {
    image: Operand,
    sampler: Operand,
  },
  Image {
    sampled_image: Operand,
  },
  /// Filtered read; `lod: None` selects the level of detail implicitly.
  ImageSample {
    sampled_image: Operand,
    coordinate: Operand,
    lod: Option<Operand>,
  },
  ImageFetch {
    image: Operand,
    coordinate: Operand,
    lod: Option<Operand>,
  },
  ImageRead {
    image: Operand,
    coordinate: Operand,
  },
  ImageWrite {
    image: Operand,
    coordinate: Operand,
    texel: Operand,
  },
  ImageQuerySize {
    image: Operand,
    lod: Option<Operand>,
  },
  ControlBarrier {
    execution: spirv::Scope,
    memory: spirv::Scope,
    semantics: spirv::MemorySemantics,
  },
  MemoryBarrier {
    memory: spirv::Scope,
    semantics: spirv::MemorySemantics,
  },
  /// Subgroup operation; `group` is set for arithmetic operations, `value` for all but elections.
  GroupNonUniform {
    op: spirv::Op,
    group: Option<spirv::GroupOperation>,
    value: Option<Operand>,
  },
  EmitVertex,
  EndPrimitive,
  Phi {
    incoming: Vec<(Operand, Handle<Block>)>,
  },
}

impl Op {
  /// Operands read by the instruction, in order.
  pub fn operands(&self) -> Vec<Operand> {
    match self {
      Op::Load { pointer } => vec![*pointer],
      Op::Store { pointer, value } => vec![*pointer, *value],
      Op::AccessChain { base, indices } => std::iter::once(*base).chain(indices.iter().copied()).collect(),
      Op::Unary { operand, .. } => vec![*operand],
      Op::Binary { left, right, .. } => vec![*left, *right],
      Op::Construct { parts } => parts.clone(),
      Op::Extract { composite, .. } => vec![*composite],
      Op::Insert { object, composite, .. } => vec![*object, *composite],
      Op::Shuffle { first, second, .. } => vec![*first, *second],
      Op::Select {
        condition,
        accept,
        reject,
      } => vec![*condition, *accept, *reject],
      Op::Ext { args, .. } | Op::Call { args, .. } => args.clone(),
      Op::ArrayLength { structure, .. } => vec![*structure],
      Op::SampledImage { image, sampler } => vec![*image, *sampler],
      Op::Image { sampled_image } => vec![*sampled_image],
      Op::ImageSample {
        sampled_image,
        coordinate,
        lod,
      } => [Some(*sampled_image), Some(*coordinate), *lod].into_iter().flatten().collect(),
      Op::ImageFetch { image, coordinate, lod } => [Some(*image), Some(*coordinate), *lod].into_iter().flatten().collect(),
      Op::ImageRead { image, coordinate } => vec![*image, *coordinate],
      Op::ImageWrite {
        image,
        coordinate,
        texel,
      } => vec![*image, *coordinate, *texel],
      Op::ImageQuerySize { image, lod } => [Some(*image), *lod].into_iter().flatten().collect(),
      Op::GroupNonUniform { value, .. } => value.iter().copied().collect(),
      Op::Phi { incoming } => incoming.iter().map(|(operand, _)| *operand).collect(),
      Op::ControlBarrier { .. } | Op::MemoryBarrier { .. } | Op::EmitVertex | Op::EndPrimitive => Vec::new(),
    }
  }

  /// Apply `f` to every operand of the instruction.
  pub fn map_operands(&mut self, mut f: impl FnMut(Operand) -> Operand) {
    let mut apply = |operand: &mut Operand| *operand = f(*operand);

    match self {
      Op::Load { pointer } => apply(pointer),
      Op::Store { pointer, value } => {
        apply(pointer);
        apply(value);
      }
      Op::AccessChain { base, indices } => {
        apply(base);
        indices.iter_mut().for_each(apply);
      }
      Op::Unary { operand, .. } => apply(operand),
      Op::Binary { left, right, .. } => {
        apply(left);
        apply(right);
      }
      Op::Construct { parts } => parts.iter_mut().for_each(apply),
      Op::Extract { composite, .. } => apply(composite),
      Op::Insert { object, composite, .. } => {
        apply(object);
        apply(composite);
      }
      Op::Shuffle { first, second, .. } => {
        apply(first);
        apply(second);
      }
      Op::Select {
        condition,
        accept,
        reject,
      } => {
        apply(condition);
        apply(accept);
        apply(reject);
      }
      Op::Ext { args, .. } | Op::Call { args, .. } => args.iter_mut().for_each(apply),
      Op::ArrayLength { structure, .. } => apply(structure),
      Op::SampledImage { image, sampler } => {
        apply(image);
        apply(sampler);
      }
      Op::Image { sampled_image } => apply(sampled_image),
      Op::ImageSample {
        sampled_image,
        coordinate,
        lod,
      } => {
        apply(sampled_image);
        apply(coordinate);
        lod.iter_mut().for_each(apply);
      }
      Op::ImageFetch { image, coordinate, lod } => {
        apply(image);
        apply(coordinate);
        lod.iter_mut().for_each(apply);
      }
      Op::ImageRead { image, coordinate } => {
        apply(image);
        apply(coordinate);
      }
      Op::ImageWrite {
        image,
        coordinate,
        texel,
      } => {
        apply(image);
        apply(coordinate);
        apply(texel);
      }
      Op::ImageQuerySize { image, lod } => {
        apply(image);
        lod.iter_mut().for_each(apply);
      }
      Op::GroupNonUniform { value, .. } => value.iter_mut().for_each(apply),
      Op::Phi { incoming } => incoming.iter_mut().for_each(|(operand, _)| apply(operand)),
      Op::ControlBarrier { .. } | Op::MemoryBarrier { .. } | Op::EmitVertex | Op::EndPrimitive => (),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
  pub result: Option<Handle<Value>>,
  pub op: Op,
}

/// Structured control flow declaration ending a header block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Merge {
  Selection {
    merge: Handle<Block>,
  },
  Loop {
    merge: Handle<Block>,
    continuing: Handle<Block>,
  },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
  Branch(Handle<Block>),
  BranchConditional {
    condition: Operand,
    accept: Handle<Block>,
    reject: Handle<Block>,
  },
  /// Multi-way branch; case literals are 32-bit words.
  Switch {
    selector: Operand,
    default: Handle<Block>,
    targets: Vec<(u32, Handle<Block>)>,
  },
  Return,
  ReturnValue(Operand),
  Kill,
  Unreachable,
}

impl Terminator {
  pub fn successors(&self) -> Vec<Handle<Block>> {
    match self {
      Terminator::Branch(target) => vec![*target],
      Terminator::BranchConditional { accept, reject, .. } => vec![*accept, *reject],
      Terminator::Switch { default, targets, .. } => std::iter::once(*default)
        .chain(targets.iter().map(|(_, target)| *target))
        .collect(),
      _ => Vec::new(),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
  pub body: Vec<Instr>,
  pub merge: Option<Merge>,
  pub terminator: Terminator,
}

impl Block {
  pub fn new() -> Self {
    Self {
      body: Vec::new(),
      merge: None,
      terminator: Terminator::Unreachable,
    }
  }
}

impl Default for Block {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
  pub name: String,
  pub ret: Handle<IrType>,
  /// Function type.
  pub ty: Handle<IrType>,
  pub params: Vec<Handle<IrType>>,
  pub locals: Vec<LocalVariable>,
  /// Blocks; the first one is the entry block.
  pub blocks: Arena<Block>,
  pub values: Arena<Value>,
}

impl Function {
  pub fn entry(&self) -> Handle<Block> {
    Handle::new(0)
  }

  /// Predecessors of every block, indexed by block.
  pub fn predecessors(&self) -> Vec<Vec<Handle<Block>>> {
    let mut preds = vec![Vec::new(); self.blocks.len()];

    for (handle, block) in self.blocks.iter() {
      for succ in block.terminator.successors() {
        if !preds[succ.index()].contains(&handle) {
          preds[succ.index()].push(handle);
        }
      }
    }

    preds
  }

  /// Blocks in the order they are emitted: reachable blocks in reverse post-order (headers before their constructs,
  /// merge blocks after them), then the unreachable ones.
  pub fn block_order(&self) -> Vec<Handle<Block>> {
    let len = self.blocks.len();
    let mut visited = vec![false; len];
    let mut post_order = Vec::with_capacity(len);

    // iterative DFS; merge and continue targets are visited first so that they end up after the blocks they close
    let mut stack = vec![(self.entry(), false)];
    while let Some((handle, done)) = stack.pop() {
      if done {
        post_order.push(handle);
        continue;
      }

      if visited[handle.index()] {
        continue;
      }

      visited[handle.index()] = true;
      stack.push((handle, true));

      let block = &self.blocks[handle];
      let mut next = Vec::new();

      match block.merge {
        Some(Merge::Selection { merge }) => next.push(merge),
        Some(Merge::Loop { merge, continuing }) => {
          next.push(merge);
          next.push(continuing);
        }
        None => (),
      }

      // branches are visited last to first so that the first one comes first in the reverse post-order
      next.extend(block.terminator.successors().into_iter().rev());

      // the stack pops in reverse: push the blocks to visit last first
      for succ in next.into_iter().rev() {
        if !visited[succ.index()] {
          stack.push((succ, false));
        }
      }
    }

    let mut order: Vec<_> = post_order.into_iter().rev().collect();
    order.extend(self.blocks.iter().map(|(h, _)| h).filter(|h| !visited[h.index()]));
    order
  }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionMode {
  pub mode: spirv::ExecutionMode,
  pub operands: Vec<u32>,
}

impl ExecutionMode {
  pub fn new(mode: spirv::ExecutionMode) -> Self {
    Self {
      mode,
      operands: Vec::new(),
    }
  }

  pub fn with(mode: spirv::ExecutionMode, operands: Vec<u32>) -> Self {
    Self { mode, operands }
  }
}

/// Compiled shader stage.
#[derive(Clone, Debug)]
pub struct Module {
  pub stage: ShaderStage,
  pub config: StageConfig,
  pub version: SpirvVersion,
  pub capabilities: BTreeSet<spirv::Capability>,
  pub extensions: BTreeSet<String>,
  /// Whether the `GLSL.std.450` instruction set is imported.
  pub uses_glsl: bool,
  pub types: UniqueArena<IrType>,
  pub constants: UniqueArena<Constant>,
  pub globals: Arena<GlobalVariable>,
  pub functions: Arena<Function>,
  pub entry_point: Handle<Function>,
  /// Global variables listed by the entry point.
  pub interface: Vec<Handle<GlobalVariable>>,
  pub execution_modes: Vec<ExecutionMode>,
  pub reflection: StageReflection,
  pub debug_names: bool,
}

impl Module {
  pub fn stage(&self) -> ShaderStage {
    self.stage
  }

  /// Binding metadata of the stage.
  pub fn reflection(&self) -> &StageReflection {
    &self.reflection
  }

  /// Type of an operand used in `function`.
  pub fn operand_type(&self, function: &Function, operand: Operand) -> Option<Handle<IrType>> {
    match operand {
      Operand::Value(v) => function.values.try_get(v).map(|v| v.ty),
      Operand::Constant(c) => self.constants.try_get(c).map(Constant::ty),
      Operand::Global(g) => self.globals.try_get(g).map(|g| g.ty),
      Operand::Local(i) => function.locals.get(i as usize).map(|l| l.ty),
      Operand::Param(i) => function.params.get(i as usize).copied(),
    }
  }

  /// Encode the module as SPIR-V words.
  pub fn assemble(&self) -> Vec<u32> {
    crate::writer::spirv::assemble(self)
  }

  /// Human-readable dump of the module, in SPIR-V assembly syntax.
  pub fn to_text(&self) -> String {
    crate::writer::text::dump(self)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn block(terminator: Terminator) -> Block {
    Block {
      terminator,
      ..Block::new()
    }
  }

  fn function(blocks: Vec<Block>) -> Function {
    let mut arena = Arena::new();
    for b in blocks {
      arena.append(b);
    }

    Function {
      name: "f".to_owned(),
      ret: Handle::new(0),
      ty: Handle::new(1),
      params: Vec::new(),
      locals: Vec::new(),
      blocks: arena,
      values: Arena::new(),
    }
  }

  #[test]
  fn selection_merge_comes_after_branches() {
    // 0: header -> 1 | 2, merge 3; 1 -> 3; 2 -> 3; 4 is unreachable
    let cond = Operand::Constant(Handle::new(0));
    let mut header = block(Terminator::BranchConditional {
      condition: cond,
      accept: Handle::new(1),
      reject: Handle::new(2),
    });
    header.merge = Some(Merge::Selection { merge: Handle::new(3) });

    let f = function(vec![
      header,
      block(Terminator::Branch(Handle::new(3))),
      block(Terminator::Branch(Handle::new(3))),
      block(Terminator::Return),
      block(Terminator::Branch(Handle::new(3))),
    ]);

    let order: Vec<_> = f.block_order().into_iter().map(|h| h.index()).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);

    let preds = f.predecessors();
    assert_eq!(preds[3].len(), 3);
    assert!(preds[0].is_empty());
  }

  #[test]
  fn loop_blocks_order() {
    // 0 -> 1 (header, merge 4, continue 3) -> 2 | 4; 2 -> 3; 3 -> 1
    let cond = Operand::Constant(Handle::new(0));
    let mut header = block(Terminator::BranchConditional {
      condition: cond,
      accept: Handle::new(2),
      reject: Handle::new(4),
    });
    header.merge = Some(Merge::Loop {
      merge: Handle::new(4),
      continuing: Handle::new(3),
    });

    let f = function(vec![
      block(Terminator::Branch(Handle::new(1))),
      header,
      block(Terminator::Branch(Handle::new(3))),
      block(Terminator::Branch(Handle::new(1))),
      block(Terminator::Return),
    ]);

    let order: Vec<_> = f.block_order().into_iter().map(|h| h.index()).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
  }

  #[test]
  fn operands_are_mapped() {
    let a = Operand::Param(0);
    let b = Operand::Param(1);
    let mut op = Op::Binary {
      op: spirv::Op::IAdd,
      left: a,
      right: b,
    };

    op.map_operands(|o| if o == a { Operand::Local(3) } else { o });
    assert_eq!(op.operands(), vec![Operand::Local(3), b]);
  }
}
