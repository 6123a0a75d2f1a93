//! SPIR-V binary writer.
//!
//! IDs are assigned in one pass over the module before anything is written, since debug names and the entry point
//! refer to IDs of functions and variables declared later in the module. Scope and memory-semantics operands of
//! barriers and subgroup instructions are IDs of `u32` constants; the ones the module does not declare are added by
//! the writer.

use std::collections::BTreeMap;

use super::{declaration_order, Decl};
use crate::ir::{Block, Constant, Function, Handle, Instr, IrType, Merge, Module, Op, Operand, Terminator};

/// Generator magic number; `0` is reserved for unregistered tools.
const GENERATOR: u32 = 0;

/// Name of the imported extended instruction set.
const GLSL_STD_450: &str = "GLSL.std.450";

/// Encode `module` as SPIR-V words.
pub fn assemble(module: &Module) -> Vec<u32> {
  let writer = Writer::new(module);
  let words = writer.write();

  log::debug!("assembled {} stage: {} words", module.stage, words.len());
  words
}

/// IDs of the items of a function.
struct FunctionIds {
  id: u32,
  params: Vec<u32>,
  locals: Vec<u32>,
  blocks: Vec<u32>,
  values: Vec<u32>,
}

/// `u32` type and constants used as scope and semantics operands.
struct Uints {
  ty: u32,
  /// Whether the type must be declared by the writer.
  declare_ty: bool,
  /// Constants by value, with whether they must be declared by the writer.
  constants: BTreeMap<u32, (u32, bool)>,
}

struct Writer<'a> {
  module: &'a Module,
  bound: u32,
  glsl: u32,
  types: Vec<u32>,
  constants: Vec<u32>,
  globals: Vec<u32>,
  functions: Vec<FunctionIds>,
  uints: Uints,
}

impl<'a> Writer<'a> {
  fn new(module: &'a Module) -> Self {
    let mut bound = 1;
    let mut next = || {
      let id = bound;
      bound += 1;
      id
    };

    let glsl = next();
    let types = (0..module.types.len()).map(|_| next()).collect();
    let constants = (0..module.constants.len()).map(|_| next()).collect();
    let globals = (0..module.globals.len()).map(|_| next()).collect();
    let functions = module
      .functions
      .iter()
      .map(|(_, function)| FunctionIds {
        id: next(),
        params: function.params.iter().map(|_| next()).collect(),
        locals: function.locals.iter().map(|_| next()).collect(),
        blocks: (0..function.blocks.len()).map(|_| next()).collect(),
        values: (0..function.values.len()).map(|_| next()).collect(),
      })
      .collect();

    let mut writer = Self {
      module,
      bound,
      glsl,
      types,
      constants,
      globals,
      functions,
      uints: Uints {
        ty: 0,
        declare_ty: false,
        constants: BTreeMap::new(),
      },
    };

    writer.plan_uints();
    writer
  }

  fn next_id(&mut self) -> u32 {
    let id = self.bound;
    self.bound += 1;
    id
  }

  /// Find or allocate the `u32` constants used as scope and semantics operands.
  fn plan_uints(&mut self) {
    let module = self.module;
    let mut values = Vec::new();

    for (_, function) in module.functions.iter() {
      for (_, block) in function.blocks.iter() {
        for instr in &block.body {
          match instr.op {
            Op::ControlBarrier {
              execution,
              memory,
              semantics,
            } => values.extend([execution as u32, memory as u32, semantics.bits()]),
            Op::MemoryBarrier { memory, semantics } => values.extend([memory as u32, semantics.bits()]),
            Op::GroupNonUniform { .. } => values.push(spirv::Scope::Subgroup as u32),
            _ => (),
          }
        }
      }
    }

    if values.is_empty() {
      return;
    }

    let uint = module.types.get_handle(&IrType::Int {
      width: 32,
      signed: false,
    });

    match uint {
      Some(handle) => self.uints.ty = self.types[handle.index()],
      None => {
        self.uints.ty = self.next_id();
        self.uints.declare_ty = true;
      }
    }

    for value in values {
      if self.uints.constants.contains_key(&value) {
        continue;
      }

      let existing = uint.and_then(|ty| {
        module.constants.get_handle(&Constant::Scalar {
          ty,
          bits: value as u64,
        })
      });

      let entry = match existing {
        Some(handle) => (self.constants[handle.index()], false),
        None => (self.next_id(), true),
      };

      self.uints.constants.insert(value, entry);
    }
  }

  fn uint(&self, value: u32) -> u32 {
    self.uints.constants.get(&value).map_or(0, |&(id, _)| id)
  }

  fn ty(&self, handle: Handle<IrType>) -> u32 {
    self.types[handle.index()]
  }

  fn constant(&self, handle: Handle<Constant>) -> u32 {
    self.constants[handle.index()]
  }

  fn write(mut self) -> Vec<u32> {
    let module = self.module;
    let mut out = Vec::new();

    // header; the bound is patched once every ID is known
    out.extend([spirv::MAGIC_NUMBER, module.version.word(), GENERATOR, 0, 0]);

    for &capability in &module.capabilities {
      push(&mut out, spirv::Op::Capability, &[capability as u32]);
    }

    for extension in &module.extensions {
      push(&mut out, spirv::Op::Extension, &string(extension));
    }

    if module.uses_glsl {
      let mut operands = vec![self.glsl];
      operands.extend(string(GLSL_STD_450));
      push(&mut out, spirv::Op::ExtInstImport, &operands);
    }

    push(
      &mut out,
      spirv::Op::MemoryModel,
      &[spirv::AddressingModel::Logical as u32, spirv::MemoryModel::GLSL450 as u32],
    );

    let entry = self.functions[module.entry_point.index()].id;
    let mut operands = vec![module.stage.execution_model() as u32, entry];
    operands.extend(string("main"));
    operands.extend(module.interface.iter().map(|g| self.globals[g.index()]));
    push(&mut out, spirv::Op::EntryPoint, &operands);

    for mode in &module.execution_modes {
      let mut operands = vec![entry, mode.mode as u32];
      operands.extend_from_slice(&mode.operands);
      push(&mut out, spirv::Op::ExecutionMode, &operands);
    }

    if module.debug_names {
      self.write_names(&mut out);
    }

    self.write_annotations(&mut out);
    self.write_declarations(&mut out);

    for (handle, function) in module.functions.iter() {
      self.write_function(&mut out, handle.index(), function);
    }

    out[3] = self.bound;
    out
  }

  fn write_names(&self, out: &mut Vec<u32>) {
    let module = self.module;
    let name = |out: &mut Vec<u32>, id: u32, name: &str| {
      let mut operands = vec![id];
      operands.extend(string(name));
      push(out, spirv::Op::Name, &operands);
    };

    for (handle, ty) in module.types.iter() {
      if let IrType::Struct(st) = ty {
        let id = self.ty(handle);
        name(out, id, &st.name);

        for (i, member) in st.members.iter().enumerate() {
          let mut operands = vec![id, i as u32];
          operands.extend(string(&member.name));
          push(out, spirv::Op::MemberName, &operands);
        }
      }
    }

    for (handle, global) in module.globals.iter() {
      if let Some(global_name) = &global.name {
        name(out, self.globals[handle.index()], global_name);
      }
    }

    for (handle, function) in module.functions.iter() {
      let ids = &self.functions[handle.index()];
      name(out, ids.id, &function.name);

      for (local, &id) in function.locals.iter().zip(&ids.locals) {
        if let Some(local_name) = &local.name {
          name(out, id, local_name);
        }
      }
    }
  }

  fn write_annotations(&self, out: &mut Vec<u32>) {
    use spirv::Decoration as D;

    let module = self.module;

    for (handle, ty) in module.types.iter() {
      let id = self.ty(handle);

      match ty {
        IrType::Array {
          stride: Some(stride), ..
        }
        | IrType::RuntimeArray {
          stride: Some(stride), ..
        } => push(out, spirv::Op::Decorate, &[id, D::ArrayStride as u32, *stride]),

        IrType::Struct(st) => {
          match st.block {
            Some(crate::ir::BlockDecoration::Block) => push(out, spirv::Op::Decorate, &[id, D::Block as u32]),
            Some(crate::ir::BlockDecoration::BufferBlock) => {
              push(out, spirv::Op::Decorate, &[id, D::BufferBlock as u32])
            }
            None => (),
          }

          for (i, member) in st.members.iter().enumerate() {
            let i = i as u32;
            let mut member_decorate = |operands: &[u32]| {
              let mut words = vec![id, i];
              words.extend_from_slice(operands);
              push(out, spirv::Op::MemberDecorate, &words);
            };

            if let Some(offset) = member.offset {
              member_decorate(&[D::Offset as u32, offset]);
            }

            if let Some(stride) = member.matrix_stride {
              member_decorate(&[D::ColMajor as u32]);
              member_decorate(&[D::MatrixStride as u32, stride]);
            }

            if member.relaxed {
              member_decorate(&[D::RelaxedPrecision as u32]);
            }

            if member.non_writable {
              member_decorate(&[D::NonWritable as u32]);
            }
          }
        }

        _ => (),
      }
    }

    for (handle, global) in module.globals.iter() {
      let id = self.globals[handle.index()];

      for decoration in &global.decorations {
        use crate::ir::Decoration as Ir;

        let operands = match *decoration {
          Ir::BuiltIn(builtin) => vec![id, D::BuiltIn as u32, builtin as u32],
          Ir::Location(location) => vec![id, D::Location as u32, location],
          Ir::DescriptorSet(set) => vec![id, D::DescriptorSet as u32, set],
          Ir::Binding(binding) => vec![id, D::Binding as u32, binding],
          Ir::InputAttachmentIndex(index) => vec![id, D::InputAttachmentIndex as u32, index],
          Ir::Flat => vec![id, D::Flat as u32],
          Ir::NoPerspective => vec![id, D::NoPerspective as u32],
          Ir::Centroid => vec![id, D::Centroid as u32],
          Ir::Sample => vec![id, D::Sample as u32],
          Ir::Patch => vec![id, D::Patch as u32],
          Ir::RelaxedPrecision => vec![id, D::RelaxedPrecision as u32],
          Ir::NonWritable => vec![id, D::NonWritable as u32],
          Ir::NonReadable => vec![id, D::NonReadable as u32],
        };

        push(out, spirv::Op::Decorate, &operands);
      }
    }
  }

  /// Types, constants and global variables.
  fn write_declarations(&self, out: &mut Vec<u32>) {
    let module = self.module;

    if self.uints.declare_ty {
      push(out, spirv::Op::TypeInt, &[self.uints.ty, 32, 0]);
    }

    for decl in declaration_order(module) {
      match decl {
        Decl::Type(handle) => self.write_type(out, handle),
        Decl::Constant(handle) => self.write_constant(out, handle),
      }
    }

    for (&value, &(id, declare)) in &self.uints.constants {
      if declare {
        push(out, spirv::Op::Constant, &[self.uints.ty, id, value]);
      }
    }

    for (handle, global) in module.globals.iter() {
      push(
        out,
        spirv::Op::Variable,
        &[self.ty(global.ty), self.globals[handle.index()], global.class as u32],
      );
    }
  }

  fn write_type(&self, out: &mut Vec<u32>, handle: Handle<IrType>) {
    let id = self.ty(handle);

    match &self.module.types[handle] {
      IrType::Void => push(out, spirv::Op::TypeVoid, &[id]),
      IrType::Bool => push(out, spirv::Op::TypeBool, &[id]),
      IrType::Int { width, signed } => push(out, spirv::Op::TypeInt, &[id, *width, *signed as u32]),
      IrType::Float { width } => push(out, spirv::Op::TypeFloat, &[id, *width]),
      IrType::Vector { component, size } => push(out, spirv::Op::TypeVector, &[id, self.ty(*component), *size]),
      IrType::Matrix { column, columns } => push(out, spirv::Op::TypeMatrix, &[id, self.ty(*column), *columns]),

      IrType::Array { element, len, .. } => {
        push(out, spirv::Op::TypeArray, &[id, self.ty(*element), self.constant(*len)])
      }

      IrType::RuntimeArray { element, .. } => push(out, spirv::Op::TypeRuntimeArray, &[id, self.ty(*element)]),

      IrType::Struct(st) => {
        let mut operands = vec![id];
        operands.extend(st.members.iter().map(|m| self.ty(m.ty)));
        push(out, spirv::Op::TypeStruct, &operands);
      }

      IrType::Pointer { class, pointee } => push(out, spirv::Op::TypePointer, &[id, *class as u32, self.ty(*pointee)]),

      IrType::Function { ret, params } => {
        let mut operands = vec![id, self.ty(*ret)];
        operands.extend(params.iter().map(|&p| self.ty(p)));
        push(out, spirv::Op::TypeFunction, &operands);
      }

      IrType::Image(image) => push(
        out,
        spirv::Op::TypeImage,
        &[
          id,
          self.ty(image.sampled_type),
          image.dim as u32,
          0,
          image.arrayed as u32,
          image.multisampled as u32,
          image.sampled,
          image.format as u32,
        ],
      ),

      IrType::Sampler => push(out, spirv::Op::TypeSampler, &[id]),
      IrType::SampledImage { image } => push(out, spirv::Op::TypeSampledImage, &[id, self.ty(*image)]),
    }
  }

  fn write_constant(&self, out: &mut Vec<u32>, handle: Handle<Constant>) {
    let id = self.constant(handle);

    match &self.module.constants[handle] {
      Constant::Bool { ty, value: true } => push(out, spirv::Op::ConstantTrue, &[self.ty(*ty), id]),
      Constant::Bool { ty, value: false } => push(out, spirv::Op::ConstantFalse, &[self.ty(*ty), id]),

      Constant::Scalar { ty, bits } => {
        let wide = matches!(
          self.module.types[*ty],
          IrType::Int { width: 64, .. } | IrType::Float { width: 64 }
        );

        if wide {
          push(
            out,
            spirv::Op::Constant,
            &[self.ty(*ty), id, *bits as u32, (*bits >> 32) as u32],
          );
        } else {
          push(out, spirv::Op::Constant, &[self.ty(*ty), id, *bits as u32]);
        }
      }

      Constant::Composite { ty, parts } => {
        let mut operands = vec![self.ty(*ty), id];
        operands.extend(parts.iter().map(|&p| self.constant(p)));
        push(out, spirv::Op::ConstantComposite, &operands);
      }

      Constant::Null { ty } => push(out, spirv::Op::ConstantNull, &[self.ty(*ty), id]),
    }
  }

  fn write_function(&mut self, out: &mut Vec<u32>, index: usize, function: &Function) {
    let (id, params) = {
      let ids = &self.functions[index];
      (ids.id, ids.params.clone())
    };

    push(
      out,
      spirv::Op::Function,
      &[
        self.ty(function.ret),
        id,
        spirv::FunctionControl::NONE.bits(),
        self.ty(function.ty),
      ],
    );

    for (&ty, &param) in function.params.iter().zip(&params) {
      push(out, spirv::Op::FunctionParameter, &[self.ty(ty), param]);
    }

    let entry = function.entry();
    for handle in function.block_order() {
      let block = &function.blocks[handle];
      push(out, spirv::Op::Label, &[self.functions[index].blocks[handle.index()]]);

      // function variables are declared first in the entry block
      if handle == entry {
        for (i, local) in function.locals.iter().enumerate() {
          let local_id = self.functions[index].locals[i];
          push(
            out,
            spirv::Op::Variable,
            &[self.ty(local.ty), local_id, spirv::StorageClass::Function as u32],
          );
        }
      }

      for instr in &block.body {
        self.write_instr(out, index, function, instr);
      }

      self.write_block_end(out, index, block);
    }

    push(out, spirv::Op::FunctionEnd, &[]);
  }

  fn operand(&self, index: usize, operand: Operand) -> u32 {
    let ids = &self.functions[index];

    match operand {
      Operand::Value(v) => ids.values[v.index()],
      Operand::Constant(c) => self.constant(c),
      Operand::Global(g) => self.globals[g.index()],
      Operand::Local(i) => ids.locals[i as usize],
      Operand::Param(i) => ids.params[i as usize],
    }
  }

  fn label(&self, index: usize, block: Handle<Block>) -> u32 {
    self.functions[index].blocks[block.index()]
  }

  /// Result type and ID of an instruction; results nobody reads still get an ID.
  fn result(&mut self, index: usize, function: &Function, instr: &Instr) -> [u32; 2] {
    match instr.result {
      Some(value) => [
        self.ty(function.values[value].ty),
        self.functions[index].values[value.index()],
      ],
      None => {
        let void = self.module.functions[self.module.entry_point].ret;
        [self.ty(void), self.next_id()]
      }
    }
  }

  fn write_instr(&mut self, out: &mut Vec<u32>, index: usize, function: &Function, instr: &Instr) {
    use spirv::Op as S;

    let o = |operand: Operand| self.operand(index, operand);

    // instructions without result
    match &instr.op {
      Op::Store { pointer, value } => return push(out, S::Store, &[o(*pointer), o(*value)]),

      Op::ImageWrite {
        image,
        coordinate,
        texel,
      } => return push(out, S::ImageWrite, &[o(*image), o(*coordinate), o(*texel)]),

      Op::ControlBarrier {
        execution,
        memory,
        semantics,
      } => {
        let operands = [
          self.uint(*execution as u32),
          self.uint(*memory as u32),
          self.uint(semantics.bits()),
        ];
        return push(out, S::ControlBarrier, &operands);
      }

      Op::MemoryBarrier { memory, semantics } => {
        let operands = [self.uint(*memory as u32), self.uint(semantics.bits())];
        return push(out, S::MemoryBarrier, &operands);
      }

      Op::EmitVertex => return push(out, S::EmitVertex, &[]),
      Op::EndPrimitive => return push(out, S::EndPrimitive, &[]),
      _ => (),
    }

    let [ty, id] = self.result(index, function, instr);
    let o = |operand: Operand| self.operand(index, operand);
    let mut words = vec![ty, id];

    let op = match &instr.op {
      Op::Load { pointer } => {
        words.push(o(*pointer));
        S::Load
      }

      Op::AccessChain { base, indices } => {
        words.push(o(*base));
        words.extend(indices.iter().map(|&i| o(i)));
        S::AccessChain
      }

      Op::Unary { op, operand } => {
        words.push(o(*operand));
        *op
      }

      Op::Binary { op, left, right } => {
        words.extend([o(*left), o(*right)]);
        *op
      }

      Op::Construct { parts } => {
        words.extend(parts.iter().map(|&p| o(p)));
        S::CompositeConstruct
      }

      Op::Extract { composite, indices } => {
        words.push(o(*composite));
        words.extend_from_slice(indices);
        S::CompositeExtract
      }

      Op::Insert {
        object,
        composite,
        indices,
      } => {
        words.extend([o(*object), o(*composite)]);
        words.extend_from_slice(indices);
        S::CompositeInsert
      }

      Op::Shuffle {
        first,
        second,
        components,
      } => {
        words.extend([o(*first), o(*second)]);
        words.extend_from_slice(components);
        S::VectorShuffle
      }

      Op::Select {
        condition,
        accept,
        reject,
      } => {
        words.extend([o(*condition), o(*accept), o(*reject)]);
        S::Select
      }

      Op::Ext { op, args } => {
        words.extend([self.glsl, *op as u32]);
        words.extend(args.iter().map(|&a| o(a)));
        S::ExtInst
      }

      Op::Call { function, args } => {
        words.push(self.functions[function.index()].id);
        words.extend(args.iter().map(|&a| o(a)));
        S::FunctionCall
      }

      Op::ArrayLength { structure, member } => {
        words.extend([o(*structure), *member]);
        S::ArrayLength
      }

      Op::SampledImage { image, sampler } => {
        words.extend([o(*image), o(*sampler)]);
        S::SampledImage
      }

      Op::Image { sampled_image } => {
        words.push(o(*sampled_image));
        S::Image
      }

      Op::ImageSample {
        sampled_image,
        coordinate,
        lod,
      } => {
        words.extend([o(*sampled_image), o(*coordinate)]);
        match lod {
          Some(lod) => {
            words.extend([spirv::ImageOperands::LOD.bits(), o(*lod)]);
            S::ImageSampleExplicitLod
          }
          None => S::ImageSampleImplicitLod,
        }
      }

      Op::ImageFetch { image, coordinate, lod } => {
        words.extend([o(*image), o(*coordinate)]);
        if let Some(lod) = lod {
          words.extend([spirv::ImageOperands::LOD.bits(), o(*lod)]);
        }
        S::ImageFetch
      }

      Op::ImageRead { image, coordinate } => {
        words.extend([o(*image), o(*coordinate)]);
        S::ImageRead
      }

      Op::ImageQuerySize { image, lod } => {
        words.push(o(*image));
        match lod {
          Some(lod) => {
            words.push(o(*lod));
            S::ImageQuerySizeLod
          }
          None => S::ImageQuerySize,
        }
      }

      Op::GroupNonUniform { op, group, value } => {
        words.push(self.uint(spirv::Scope::Subgroup as u32));
        if let Some(group) = group {
          words.push(*group as u32);
        }
        if let Some(value) = value {
          words.push(o(*value));
        }
        *op
      }

      Op::Phi { incoming } => {
        for &(value, block) in incoming {
          words.extend([o(value), self.label(index, block)]);
        }
        S::Phi
      }

      // handled above
      Op::Store { .. }
      | Op::ImageWrite { .. }
      | Op::ControlBarrier { .. }
      | Op::MemoryBarrier { .. }
      | Op::EmitVertex
      | Op::EndPrimitive => return,
    };

    push(out, op, &words);
  }

  fn write_block_end(&self, out: &mut Vec<u32>, index: usize, block: &Block) {
    let label = |block: Handle<Block>| self.label(index, block);

    match block.merge {
      Some(Merge::Selection { merge }) => push(
        out,
        spirv::Op::SelectionMerge,
        &[label(merge), spirv::SelectionControl::NONE.bits()],
      ),
      Some(Merge::Loop { merge, continuing }) => push(
        out,
        spirv::Op::LoopMerge,
        &[label(merge), label(continuing), spirv::LoopControl::NONE.bits()],
      ),
      None => (),
    }

    match &block.terminator {
      Terminator::Branch(target) => push(out, spirv::Op::Branch, &[label(*target)]),

      Terminator::BranchConditional {
        condition,
        accept,
        reject,
      } => push(
        out,
        spirv::Op::BranchConditional,
        &[self.operand(index, *condition), label(*accept), label(*reject)],
      ),

      Terminator::Switch {
        selector,
        default,
        targets,
      } => {
        let mut operands = vec![self.operand(index, *selector), label(*default)];
        for &(literal, target) in targets {
          operands.extend([literal, label(target)]);
        }
        push(out, spirv::Op::Switch, &operands);
      }

      Terminator::Return => push(out, spirv::Op::Return, &[]),
      Terminator::ReturnValue(value) => push(out, spirv::Op::ReturnValue, &[self.operand(index, *value)]),
      Terminator::Kill => push(out, spirv::Op::Kill, &[]),
      Terminator::Unreachable => push(out, spirv::Op::Unreachable, &[]),
    }
  }
}

/// Append an instruction.
fn push(out: &mut Vec<u32>, op: spirv::Op, operands: &[u32]) {
  let count = operands.len() as u32 + 1;
  out.push((count << 16) | op as u32);
  out.extend_from_slice(operands);
}

/// Nul-terminated UTF-8 string, packed in little-endian words.
fn string(s: &str) -> Vec<u32> {
  let bytes = s.as_bytes();
  let mut words = Vec::with_capacity(bytes.len() / 4 + 1);

  // the terminating nul always fits: a string whose length is a multiple of 4 gets a word of zeroes
  for chunk in bytes.chunks(4) {
    let mut word = [0; 4];
    word[..chunk.len()].copy_from_slice(chunk);
    words.push(u32::from_le_bytes(word));
  }

  if bytes.len() % 4 == 0 {
    words.push(0);
  }

  words
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{config::CompileOptions, layout::PipelineLayout, lit, scope::Scope, stage::StageBuilder};

  #[test]
  fn strings_are_nul_terminated() {
    assert_eq!(string("main"), vec![u32::from_le_bytes(*b"main"), 0]);
    assert_eq!(string("GLSL.std.450").len(), 4);
    assert_eq!(string("ab"), vec![u32::from_le_bytes([b'a', b'b', 0, 0])]);
  }

  #[test]
  fn instruction_word_count() {
    let mut out = Vec::new();
    push(&mut out, spirv::Op::TypeInt, &[1, 32, 0]);
    assert_eq!(out, vec![(4 << 16) | spirv::Op::TypeInt as u32, 1, 32, 0]);
  }

  #[test]
  fn header_and_bound() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let _x = s.var(lit!(1u32));
      })
    });

    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();
    let words = assemble(&module);

    assert_eq!(words[0], spirv::MAGIC_NUMBER);
    assert_eq!(words[1], 0x0001_0300);
    assert_eq!(words[4], 0);

    // every instruction ends where the next one starts
    let mut i = 5;
    let mut ops = Vec::new();
    while i < words.len() {
      let count = (words[i] >> 16) as usize;
      assert!(count > 0);
      ops.push(words[i] & 0xffff);
      i += count;
    }
    assert_eq!(i, words.len());

    assert_eq!(ops[0], spirv::Op::Capability as u32);
    assert!(ops.contains(&(spirv::Op::EntryPoint as u32)));
    assert_eq!(ops.last(), Some(&(spirv::Op::FunctionEnd as u32)));
  }

  #[test]
  fn barriers_get_scope_constants() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_compute_shader([4, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.workgroup_barrier();
      })
    });

    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();
    let writer = Writer::new(&module);

    // workgroup execution and memory scopes share the same constant
    assert!(writer.uints.constants.contains_key(&(spirv::Scope::Workgroup as u32)));
    assert!(writer.uints.constants.len() >= 2);
    assert!(writer.uints.constants.values().all(|&(id, _)| id != 0));
  }
}
