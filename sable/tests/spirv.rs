//! Structure of the emitted SPIR-V, checked by parsing it back with rspirv.

use rspirv::dr::{self, Operand};
use sable::{group, CompileOptions, HasX as _, PipelineLayout, Scope, SpirvVersion, StageBuilder};
use spirv::{Capability, Decoration, ExecutionMode, ExecutionModel, Op, StorageClass};

fn parse(words: &[u32]) -> dr::Module {
  let _ = env_logger::builder().is_test(true).try_init();
  dr::load_words(words).unwrap()
}

/// Doubles a storage array of floats, one element per invocation.
fn doubling(options: &CompileOptions) -> dr::Module {
  let mut layout = PipelineLayout::new();
  let data = layout.storage_array::<f32>((1, 3));

  let stage = StageBuilder::new_compute_shader([64, 2, 1], |s, input| {
    s.main_fun(|s: &mut Scope<()>| {
      let i = input.global_invocation_id.x();
      s.set(data.at(&i), data.at(&i) * 2.);
    })
  });

  let module = stage.compile(&layout, options).unwrap();
  parse(&module.assemble())
}

fn decorations(module: &dr::Module, decoration: Decoration) -> Vec<&dr::Instruction> {
  module
    .annotations
    .iter()
    .filter(|inst| inst.operands.iter().any(|op| *op == Operand::Decoration(decoration)))
    .collect()
}

#[test]
fn compute_module() {
  let module = doubling(&CompileOptions::default());

  let header = module.header.as_ref().unwrap();
  assert_eq!(header.version(), (1, 3));

  let capabilities: Vec<_> = module.capabilities.iter().map(|inst| inst.operands[0].clone()).collect();
  assert!(capabilities.contains(&Operand::Capability(Capability::Shader)));

  let [entry] = module.entry_points.as_slice() else {
    panic!("expected a single entry point");
  };
  assert_eq!(entry.operands[0], Operand::ExecutionModel(ExecutionModel::GLCompute));
  assert_eq!(entry.operands[2], Operand::LiteralString("main".to_owned()));

  let local_size = module
    .execution_modes
    .iter()
    .find(|inst| inst.operands[1] == Operand::ExecutionMode(ExecutionMode::LocalSize))
    .unwrap();
  assert_eq!(
    &local_size.operands[2..],
    &[Operand::LiteralBit32(64), Operand::LiteralBit32(2), Operand::LiteralBit32(1)]
  );
}

#[test]
fn storage_array_layout() {
  let module = doubling(&CompileOptions::default());

  let strides = decorations(&module, Decoration::ArrayStride);
  assert_eq!(strides.len(), 1);
  assert_eq!(strides[0].operands[2], Operand::LiteralBit32(4));

  let offsets = decorations(&module, Decoration::Offset);
  assert_eq!(offsets.len(), 1);
  assert_eq!(offsets[0].operands[3], Operand::LiteralBit32(0));

  let sets = decorations(&module, Decoration::DescriptorSet);
  let bindings = decorations(&module, Decoration::Binding);
  assert_eq!(sets[0].operands[2], Operand::LiteralBit32(1));
  assert_eq!(bindings[0].operands[2], Operand::LiteralBit32(3));

  assert_eq!(decorations(&module, Decoration::Block).len(), 1);
  assert!(decorations(&module, Decoration::BufferBlock).is_empty());
}

#[test]
fn storage_buffers_before_1_3() {
  let storage_classes = |module: &dr::Module| -> Vec<Operand> {
    module
      .types_global_values
      .iter()
      .filter(|inst| inst.class.opcode == Op::Variable)
      .map(|inst| inst.operands[0].clone())
      .collect()
  };

  let old = doubling(&CompileOptions::default().spirv_version(SpirvVersion::V1_0));
  assert_eq!(old.header.as_ref().unwrap().version(), (1, 0));
  assert_eq!(decorations(&old, Decoration::BufferBlock).len(), 1);
  assert!(decorations(&old, Decoration::Block).is_empty());
  assert!(storage_classes(&old).contains(&Operand::StorageClass(StorageClass::Uniform)));
  assert!(!storage_classes(&old).contains(&Operand::StorageClass(StorageClass::StorageBuffer)));

  let new = doubling(&CompileOptions::default());
  assert!(storage_classes(&new).contains(&Operand::StorageClass(StorageClass::StorageBuffer)));
}

#[test]
fn debug_names_are_optional() {
  let named = doubling(&CompileOptions::default());
  assert!(named.debug_names.iter().any(|inst| inst.class.opcode == Op::Name));

  let anonymous = doubling(&CompileOptions {
    debug_names: false,
    ..CompileOptions::default()
  });
  assert!(anonymous.debug_names.is_empty());
}

#[test]
fn ids_are_below_the_bound() {
  let module = doubling(&CompileOptions::default());
  let bound = module.header.as_ref().unwrap().bound;

  let ids = module
    .all_inst_iter()
    .filter_map(|inst| inst.result_id)
    .collect::<Vec<_>>();

  assert!(!ids.is_empty());
  assert!(ids.iter().all(|&id| id > 0 && id < bound));
}

#[test]
fn subgroup_capabilities() {
  let mut layout = PipelineLayout::new();
  let out = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([32, 1, 1], |s, input| {
    s.main_fun(|s: &mut Scope<()>| {
      let i = input.local_invocation_index.clone();
      let sum = s.var(group::subgroup_inclusive_add(i.clone()));
      s.set(out.at(&i), &sum);
    })
  });

  let module = parse(&stage.compile(&layout, &CompileOptions::default()).unwrap().assemble());
  let capabilities: Vec<_> = module.capabilities.iter().map(|inst| inst.operands[0].clone()).collect();

  assert!(capabilities.contains(&Operand::Capability(Capability::GroupNonUniform)));
  assert!(capabilities.contains(&Operand::Capability(Capability::GroupNonUniformArithmetic)));
  assert!(module.all_inst_iter().any(|inst| inst.class.opcode == Op::GroupNonUniformIAdd));
}
