//! Textual dump of modules.
//!
//! The dump follows the SPIR-V assembly syntax, with symbolic IDs: `%t` for types, `%c` for constants, `%g` for
//! global variables, `%f` for functions, and inside functions `%p` for parameters, `%l` for variables, `%b` for blocks
//! and `%v` for values.

use std::fmt;

use super::{declaration_order, Decl};
use crate::ir::{
  BlockDecoration, Constant, Decoration, Function, Handle, Instr, IrType, Merge, Module, Op, Operand, Terminator,
};

// Number of spaces an indent level represents.
const INDENT_SPACES: usize = 2;

/// Dump `module` to a [`String`].
pub fn dump(module: &Module) -> String {
  let mut output = String::new();

  // writing to a string does not fail
  let _ = write_module(&mut output, module);
  output
}

/// Dump `module` to a [`fmt::Write`].
pub fn write_module(f: &mut impl fmt::Write, module: &Module) -> Result<(), fmt::Error> {
  writeln!(f, "; SPIR-V {}", module.version)?;
  writeln!(f, "; {} stage", module.stage)?;

  for capability in &module.capabilities {
    writeln!(f, "OpCapability {:?}", capability)?;
  }

  for extension in &module.extensions {
    writeln!(f, "OpExtension {:?}", extension)?;
  }

  if module.uses_glsl {
    writeln!(f, "%glsl = OpExtInstImport \"GLSL.std.450\"")?;
  }

  writeln!(f, "OpMemoryModel Logical GLSL450")?;

  write!(
    f,
    "OpEntryPoint {:?} %f{} \"main\"",
    module.stage.execution_model(),
    module.entry_point.index()
  )?;
  for global in &module.interface {
    write!(f, " %g{}", global.index())?;
  }
  f.write_str("\n")?;

  for mode in &module.execution_modes {
    write!(f, "OpExecutionMode %f{} {:?}", module.entry_point.index(), mode.mode)?;
    for operand in &mode.operands {
      write!(f, " {}", operand)?;
    }
    f.write_str("\n")?;
  }

  write_decorations(f, module)?;

  for decl in declaration_order(module) {
    match decl {
      Decl::Type(handle) => write_type(f, module, handle)?,
      Decl::Constant(handle) => write_constant(f, module, handle)?,
    }
  }

  for (handle, global) in module.globals.iter() {
    write!(f, "%g{} = OpVariable %t{} {:?}", handle.index(), global.ty.index(), global.class)?;
    if let Some(name) = &global.name {
      write!(f, " ; {}", name)?;
    }
    f.write_str("\n")?;
  }

  for (handle, function) in module.functions.iter() {
    write_function(f, module, handle.index(), function)?;
  }

  Ok(())
}

fn write_decorations(f: &mut impl fmt::Write, module: &Module) -> Result<(), fmt::Error> {
  for (handle, ty) in module.types.iter() {
    let id = handle.index();

    match ty {
      IrType::Array {
        stride: Some(stride), ..
      }
      | IrType::RuntimeArray {
        stride: Some(stride), ..
      } => writeln!(f, "OpDecorate %t{} ArrayStride {}", id, stride)?,

      IrType::Struct(st) => {
        match st.block {
          Some(BlockDecoration::Block) => writeln!(f, "OpDecorate %t{} Block", id)?,
          Some(BlockDecoration::BufferBlock) => writeln!(f, "OpDecorate %t{} BufferBlock", id)?,
          None => (),
        }

        for (i, member) in st.members.iter().enumerate() {
          if let Some(offset) = member.offset {
            writeln!(f, "OpMemberDecorate %t{} {} Offset {}", id, i, offset)?;
          }

          if let Some(stride) = member.matrix_stride {
            writeln!(f, "OpMemberDecorate %t{} {} ColMajor", id, i)?;
            writeln!(f, "OpMemberDecorate %t{} {} MatrixStride {}", id, i, stride)?;
          }

          if member.relaxed {
            writeln!(f, "OpMemberDecorate %t{} {} RelaxedPrecision", id, i)?;
          }

          if member.non_writable {
            writeln!(f, "OpMemberDecorate %t{} {} NonWritable", id, i)?;
          }
        }
      }

      _ => (),
    }
  }

  for (handle, global) in module.globals.iter() {
    for decoration in &global.decorations {
      write!(f, "OpDecorate %g{} ", handle.index())?;

      match decoration {
        Decoration::BuiltIn(builtin) => writeln!(f, "BuiltIn {:?}", builtin)?,
        Decoration::Location(location) => writeln!(f, "Location {}", location)?,
        Decoration::DescriptorSet(set) => writeln!(f, "DescriptorSet {}", set)?,
        Decoration::Binding(binding) => writeln!(f, "Binding {}", binding)?,
        Decoration::InputAttachmentIndex(index) => writeln!(f, "InputAttachmentIndex {}", index)?,
        decoration => writeln!(f, "{:?}", decoration)?,
      }
    }
  }

  Ok(())
}

fn write_type(f: &mut impl fmt::Write, module: &Module, handle: Handle<IrType>) -> Result<(), fmt::Error> {
  write!(f, "%t{} = ", handle.index())?;

  match &module.types[handle] {
    IrType::Void => writeln!(f, "OpTypeVoid"),
    IrType::Bool => writeln!(f, "OpTypeBool"),
    IrType::Int { width, signed } => writeln!(f, "OpTypeInt {} {}", width, *signed as u32),
    IrType::Float { width } => writeln!(f, "OpTypeFloat {}", width),
    IrType::Vector { component, size } => writeln!(f, "OpTypeVector %t{} {}", component.index(), size),
    IrType::Matrix { column, columns } => writeln!(f, "OpTypeMatrix %t{} {}", column.index(), columns),
    IrType::Array { element, len, .. } => writeln!(f, "OpTypeArray %t{} %c{}", element.index(), len.index()),
    IrType::RuntimeArray { element, .. } => writeln!(f, "OpTypeRuntimeArray %t{}", element.index()),

    IrType::Struct(st) => {
      f.write_str("OpTypeStruct")?;
      for member in &st.members {
        write!(f, " %t{}", member.ty.index())?;
      }
      writeln!(f, " ; {}", st.name)
    }

    IrType::Pointer { class, pointee } => writeln!(f, "OpTypePointer {:?} %t{}", class, pointee.index()),

    IrType::Function { ret, params } => {
      write!(f, "OpTypeFunction %t{}", ret.index())?;
      for param in params {
        write!(f, " %t{}", param.index())?;
      }
      f.write_str("\n")
    }

    IrType::Image(image) => writeln!(
      f,
      "OpTypeImage %t{} {:?} 0 {} {} {} {:?}",
      image.sampled_type.index(),
      image.dim,
      image.arrayed as u32,
      image.multisampled as u32,
      image.sampled,
      image.format
    ),

    IrType::Sampler => writeln!(f, "OpTypeSampler"),
    IrType::SampledImage { image } => writeln!(f, "OpTypeSampledImage %t{}", image.index()),
  }
}

fn write_constant(f: &mut impl fmt::Write, module: &Module, handle: Handle<Constant>) -> Result<(), fmt::Error> {
  write!(f, "%c{} = ", handle.index())?;

  match &module.constants[handle] {
    Constant::Bool { ty, value: true } => writeln!(f, "OpConstantTrue %t{}", ty.index()),
    Constant::Bool { ty, value: false } => writeln!(f, "OpConstantFalse %t{}", ty.index()),

    Constant::Scalar { ty, bits } => {
      write!(f, "OpConstant %t{} ", ty.index())?;

      match module.types[*ty] {
        IrType::Float { width: 32 } => writeln!(f, "{:?}", f32::from_bits(*bits as u32)),
        IrType::Float { .. } => writeln!(f, "{:?}", f64::from_bits(*bits)),
        IrType::Int { width: 32, signed: true } => writeln!(f, "{}", *bits as u32 as i32),
        IrType::Int { signed: true, .. } => writeln!(f, "{}", *bits as i64),
        _ => writeln!(f, "{}", bits),
      }
    }

    Constant::Composite { ty, parts } => {
      write!(f, "OpConstantComposite %t{}", ty.index())?;
      for part in parts {
        write!(f, " %c{}", part.index())?;
      }
      f.write_str("\n")
    }

    Constant::Null { ty } => writeln!(f, "OpConstantNull %t{}", ty.index()),
  }
}

fn write_function(
  f: &mut impl fmt::Write,
  module: &Module,
  index: usize,
  function: &Function,
) -> Result<(), fmt::Error> {
  writeln!(
    f,
    "\n%f{} = OpFunction %t{} None %t{} ; {}",
    index,
    function.ret.index(),
    function.ty.index(),
    function.name
  )?;

  for (i, param) in function.params.iter().enumerate() {
    writeln!(f, "%p{} = OpFunctionParameter %t{}", i, param.index())?;
  }

  let entry = function.entry();
  for handle in function.block_order() {
    let block = &function.blocks[handle];
    writeln!(f, "%b{} = OpLabel", handle.index())?;

    if handle == entry {
      for (i, local) in function.locals.iter().enumerate() {
        write_indent(f, 1)?;
        write!(f, "%l{} = OpVariable %t{} Function", i, local.ty.index())?;
        if let Some(name) = &local.name {
          write!(f, " ; {}", name)?;
        }
        f.write_str("\n")?;
      }
    }

    for instr in &block.body {
      write_indent(f, 1)?;
      write_instr(f, module, function, instr)?;
    }

    match block.merge {
      Some(Merge::Selection { merge }) => {
        write_indent(f, 1)?;
        writeln!(f, "OpSelectionMerge %b{} None", merge.index())?;
      }
      Some(Merge::Loop { merge, continuing }) => {
        write_indent(f, 1)?;
        writeln!(f, "OpLoopMerge %b{} %b{} None", merge.index(), continuing.index())?;
      }
      None => (),
    }

    write_indent(f, 1)?;
    write_terminator(f, &block.terminator)?;
  }

  writeln!(f, "OpFunctionEnd")
}

fn write_instr(f: &mut impl fmt::Write, module: &Module, function: &Function, instr: &Instr) -> Result<(), fmt::Error> {
  if let Some(value) = instr.result {
    write!(f, "%v{} = ", value.index())?;
  }

  let ty = instr.result.map(|v| function.values[v].ty.index());
  let ty = |f: &mut dyn fmt::Write| match ty {
    Some(ty) => write!(f, " %t{}", ty),
    None => Ok(()),
  };

  match &instr.op {
    Op::Load { pointer } => {
      f.write_str("OpLoad")?;
      ty(f)?;
      write_operands(f, &[*pointer])?;
    }

    Op::Store { pointer, value } => {
      f.write_str("OpStore")?;
      write_operands(f, &[*pointer, *value])?;
    }

    Op::AccessChain { base, indices } => {
      f.write_str("OpAccessChain")?;
      ty(f)?;
      write_operands(f, &[*base])?;
      write_operands(f, indices)?;
    }

    Op::Unary { op, operand } => {
      write!(f, "Op{:?}", op)?;
      ty(f)?;
      write_operands(f, &[*operand])?;
    }

    Op::Binary { op, left, right } => {
      write!(f, "Op{:?}", op)?;
      ty(f)?;
      write_operands(f, &[*left, *right])?;
    }

    Op::Construct { parts } => {
      f.write_str("OpCompositeConstruct")?;
      ty(f)?;
      write_operands(f, parts)?;
    }

    Op::Extract { composite, indices } => {
      f.write_str("OpCompositeExtract")?;
      ty(f)?;
      write_operands(f, &[*composite])?;
      write_literals(f, indices)?;
    }

    Op::Insert {
      object,
      composite,
      indices,
    } => {
      f.write_str("OpCompositeInsert")?;
      ty(f)?;
      write_operands(f, &[*object, *composite])?;
      write_literals(f, indices)?;
    }

    Op::Shuffle {
      first,
      second,
      components,
    } => {
      f.write_str("OpVectorShuffle")?;
      ty(f)?;
      write_operands(f, &[*first, *second])?;
      write_literals(f, components)?;
    }

    Op::Select {
      condition,
      accept,
      reject,
    } => {
      f.write_str("OpSelect")?;
      ty(f)?;
      write_operands(f, &[*condition, *accept, *reject])?;
    }

    Op::Ext { op, args } => {
      f.write_str("OpExtInst")?;
      ty(f)?;
      write!(f, " %glsl {:?}", op)?;
      write_operands(f, args)?;
    }

    Op::Call { function: callee, args } => {
      f.write_str("OpFunctionCall")?;
      ty(f)?;
      write!(f, " %f{}", callee.index())?;
      write_operands(f, args)?;

      if let Some(callee) = module.functions.try_get(*callee) {
        write!(f, " ; {}", callee.name)?;
      }
    }

    Op::ArrayLength { structure, member } => {
      f.write_str("OpArrayLength")?;
      ty(f)?;
      write_operands(f, &[*structure])?;
      write!(f, " {}", member)?;
    }

    Op::SampledImage { image, sampler } => {
      f.write_str("OpSampledImage")?;
      ty(f)?;
      write_operands(f, &[*image, *sampler])?;
    }

    Op::Image { sampled_image } => {
      f.write_str("OpImage")?;
      ty(f)?;
      write_operands(f, &[*sampled_image])?;
    }

    Op::ImageSample {
      sampled_image,
      coordinate,
      lod,
    } => {
      match lod {
        Some(_) => f.write_str("OpImageSampleExplicitLod")?,
        None => f.write_str("OpImageSampleImplicitLod")?,
      }
      ty(f)?;
      write_operands(f, &[*sampled_image, *coordinate])?;
      write_lod(f, *lod)?;
    }

    Op::ImageFetch { image, coordinate, lod } => {
      f.write_str("OpImageFetch")?;
      ty(f)?;
      write_operands(f, &[*image, *coordinate])?;
      write_lod(f, *lod)?;
    }

    Op::ImageRead { image, coordinate } => {
      f.write_str("OpImageRead")?;
      ty(f)?;
      write_operands(f, &[*image, *coordinate])?;
    }

    Op::ImageWrite {
      image,
      coordinate,
      texel,
    } => {
      f.write_str("OpImageWrite")?;
      write_operands(f, &[*image, *coordinate, *texel])?;
    }

    Op::ImageQuerySize { image, lod } => {
      match lod {
        Some(_) => f.write_str("OpImageQuerySizeLod")?,
        None => f.write_str("OpImageQuerySize")?,
      }
      ty(f)?;
      write_operands(f, &[*image])?;
      if let Some(lod) = lod {
        write_operands(f, &[*lod])?;
      }
    }

    Op::ControlBarrier {
      execution,
      memory,
      semantics,
    } => write!(f, "OpControlBarrier {:?} {:?} {:?}", execution, memory, semantics)?,

    Op::MemoryBarrier { memory, semantics } => write!(f, "OpMemoryBarrier {:?} {:?}", memory, semantics)?,

    Op::GroupNonUniform { op, group, value } => {
      write!(f, "Op{:?}", op)?;
      ty(f)?;
      f.write_str(" Subgroup")?;
      if let Some(group) = group {
        write!(f, " {:?}", group)?;
      }
      if let Some(value) = value {
        write_operands(f, &[*value])?;
      }
    }

    Op::EmitVertex => f.write_str("OpEmitVertex")?,
    Op::EndPrimitive => f.write_str("OpEndPrimitive")?,

    Op::Phi { incoming } => {
      f.write_str("OpPhi")?;
      ty(f)?;
      for (value, block) in incoming {
        write_operands(f, &[*value])?;
        write!(f, " %b{}", block.index())?;
      }
    }
  }

  f.write_str("\n")
}

fn write_terminator(f: &mut impl fmt::Write, terminator: &Terminator) -> Result<(), fmt::Error> {
  match terminator {
    Terminator::Branch(target) => writeln!(f, "OpBranch %b{}", target.index()),

    Terminator::BranchConditional {
      condition,
      accept,
      reject,
    } => {
      f.write_str("OpBranchConditional")?;
      write_operands(f, &[*condition])?;
      writeln!(f, " %b{} %b{}", accept.index(), reject.index())
    }

    Terminator::Switch {
      selector,
      default,
      targets,
    } => {
      f.write_str("OpSwitch")?;
      write_operands(f, &[*selector])?;
      write!(f, " %b{}", default.index())?;
      for (literal, target) in targets {
        write!(f, " {} %b{}", literal, target.index())?;
      }
      f.write_str("\n")
    }

    Terminator::Return => writeln!(f, "OpReturn"),

    Terminator::ReturnValue(value) => {
      f.write_str("OpReturnValue")?;
      write_operands(f, &[*value])?;
      f.write_str("\n")
    }

    Terminator::Kill => writeln!(f, "OpKill"),
    Terminator::Unreachable => writeln!(f, "OpUnreachable"),
  }
}

fn write_operands(f: &mut (impl fmt::Write + ?Sized), operands: &[Operand]) -> Result<(), fmt::Error> {
  for operand in operands {
    match operand {
      Operand::Value(v) => write!(f, " %v{}", v.index())?,
      Operand::Constant(c) => write!(f, " %c{}", c.index())?,
      Operand::Global(g) => write!(f, " %g{}", g.index())?,
      Operand::Local(i) => write!(f, " %l{}", i)?,
      Operand::Param(i) => write!(f, " %p{}", i)?,
    }
  }

  Ok(())
}

fn write_literals(f: &mut impl fmt::Write, literals: &[u32]) -> Result<(), fmt::Error> {
  for literal in literals {
    write!(f, " {}", literal)?;
  }

  Ok(())
}

fn write_lod(f: &mut impl fmt::Write, lod: Option<Operand>) -> Result<(), fmt::Error> {
  if let Some(lod) = lod {
    f.write_str(" Lod")?;
    write_operands(f, &[lod])?;
  }

  Ok(())
}

fn write_indent(f: &mut impl fmt::Write, indent_lvl: usize) -> Result<(), fmt::Error> {
  write!(f, "{:indent$}", "", indent = indent_lvl * INDENT_SPACES)
}

#[cfg(test)]
mod test {
  use crate::{config::CompileOptions, layout::PipelineLayout, lit, scope::Scope, stage::StageBuilder};

  #[test]
  fn dump_lists_sections() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_compute_shader([2, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let x = s.var(lit!(1u32));
        s.set(&x, &x + input.local_invocation_index.clone());
      })
    });

    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();
    let text = module.to_text();

    assert!(text.starts_with("; SPIR-V 1.3\n; compute stage\nOpCapability Shader\n"));
    assert!(text.contains("OpEntryPoint GLCompute %f0 \"main\""));
    assert!(text.contains("OpExecutionMode %f0 LocalSize 2 1 1"));
    assert!(text.contains("OpDecorate %g0 BuiltIn LocalInvocationIndex"));
    assert!(text.contains("OpIAdd"));
    assert!(text.trim_end().ends_with("OpFunctionEnd"));
  }
}
