//! Pipelines: stages compiled together against one layout.
//!
//! Compiling the stages of a pipeline together merges what the backend needs to create it: one descriptor table
//! whose entries carry the stages using them, one push-constant range and the vertex input layout. Varyings written
//! by a stage and never read by the next one (or read without being written) are reported with [`log::warn!`].
//!
//! ```
//! use sable::{pipeline::Pipeline, vec4, CompileOptions, Interpolation, PipelineLayout, Sampling, Scope, StageBuilder, V4};
//!
//! let mut layout = PipelineLayout::new();
//! let color = layout.varying::<V4<f32>>(Interpolation::Smooth, Sampling::Center);
//! let out = layout.color_output::<V4<f32>>();
//!
//! let vs = StageBuilder::new_vertex_shader(|s, _, output| {
//!   s.main_fun(|s: &mut Scope<()>| {
//!     s.set(&output.position, vec4!(0., 0., 0., 1.));
//!     s.set(color.output(), vec4!(1., 0., 0., 1.));
//!   })
//! });
//!
//! let fs = StageBuilder::new_fragment_shader(|s, _, _| {
//!   s.main_fun(|s: &mut Scope<()>| {
//!     s.set(&*out, color.input());
//!   })
//! });
//!
//! let pipeline = Pipeline::compile(&layout, &[&vs, &fs], &CompileOptions::default())?;
//! assert_eq!(pipeline.modules().len(), 2);
//! # Ok::<(), sable::CompileError>(())
//! ```

use std::collections::BTreeSet;

use crate::{
  config::CompileOptions,
  error::{CompileError, UsageError},
  ir::Module,
  layout::PipelineLayout,
  reflect::{DescriptorTable, PushConstantRange, VertexInputLayout},
  report::{report_module, DebugReporter},
  stage::{ShaderStage, Stage},
};

/// Compiled stages of a pipeline, with their merged reflection.
#[derive(Clone, Debug)]
pub struct Pipeline {
  modules: Vec<Module>,
  descriptors: DescriptorTable,
  push_constants: Option<PushConstantRange>,
  vertex_input: VertexInputLayout,
}

impl Pipeline {
  /// Compile `stages` against `layout`.
  ///
  /// Stages can be given in any order; a stage kind can only appear once, and a compute stage must be alone.
  pub fn compile(layout: &PipelineLayout, stages: &[&Stage], options: &CompileOptions) -> Result<Self, CompileError> {
    Self::compile_inner(layout, stages, options, None)
  }

  /// Compile `stages` against `layout`, sending the dump of every module to `reporter`.
  pub fn compile_with_reporter(
    layout: &PipelineLayout,
    stages: &[&Stage],
    options: &CompileOptions,
    reporter: &mut dyn DebugReporter,
  ) -> Result<Self, CompileError> {
    Self::compile_inner(layout, stages, options, Some(reporter))
  }

  fn compile_inner(
    layout: &PipelineLayout,
    stages: &[&Stage],
    options: &CompileOptions,
    mut reporter: Option<&mut dyn DebugReporter>,
  ) -> Result<Self, CompileError> {
    let mut kinds = BTreeSet::new();
    for stage in stages {
      if !kinds.insert(stage.stage()) {
        return Err(UsageError::DuplicateStage(stage.stage()).into());
      }
    }

    if kinds.contains(&ShaderStage::Compute) && kinds.len() > 1 {
      return Err(UsageError::MixedPipeline.into());
    }

    let mut sorted = stages.to_vec();
    sorted.sort_by_key(|stage| stage.stage());

    let mut modules = Vec::with_capacity(sorted.len());
    for stage in sorted {
      let module = stage.compile(layout, options)?;

      if let Some(reporter) = reporter.as_deref_mut() {
        report_module(reporter, &module);
      }

      modules.push(module);
    }

    check_varyings(&modules);

    let mut descriptors = DescriptorTable::new();
    let mut push_constants: Option<PushConstantRange> = None;
    let mut vertex_input = VertexInputLayout::default();

    for module in &modules {
      let reflection = module.reflection();
      descriptors.merge(&reflection.descriptors);

      if let Some(range) = reflection.push_constants {
        push_constants = Some(match push_constants {
          Some(merged) => PushConstantRange {
            stages: merged.stages | range.stages,
            offset: merged.offset.min(range.offset),
            size: merged.size.max(range.size),
          },
          None => range,
        });
      }

      if module.stage == ShaderStage::Vertex {
        vertex_input = reflection.vertex_input.clone();
      }
    }

    log::debug!(
      "pipeline compiled: {} stage(s), {} descriptor(s)",
      modules.len(),
      descriptors.len()
    );

    Ok(Pipeline {
      modules,
      descriptors,
      push_constants,
      vertex_input,
    })
  }

  /// Modules, in pipeline order.
  pub fn modules(&self) -> &[Module] {
    &self.modules
  }

  pub fn module(&self, stage: ShaderStage) -> Option<&Module> {
    self.modules.iter().find(|m| m.stage == stage)
  }

  /// Descriptors used by any stage.
  pub fn descriptors(&self) -> &DescriptorTable {
    &self.descriptors
  }

  pub fn push_constants(&self) -> Option<PushConstantRange> {
    self.push_constants
  }

  pub fn vertex_input(&self) -> &VertexInputLayout {
    &self.vertex_input
  }

  /// Encode every module.
  pub fn assemble(&self) -> Vec<(ShaderStage, Vec<u32>)> {
    self.modules.iter().map(|m| (m.stage, m.assemble())).collect()
  }
}

/// Compare the varyings of consecutive stages.
fn check_varyings(modules: &[Module]) {
  for pair in modules.windows(2) {
    let (producer, consumer) = (pair[0].reflection(), pair[1].reflection());

    for location in &producer.varyings_written {
      if !consumer.varyings_read.contains(location) {
        log::warn!(
          "varying at location {} is written by the {} stage but never read by the {} stage",
          location,
          producer.stage,
          consumer.stage
        );
      }
    }

    for location in &consumer.varyings_read {
      if !producer.varyings_written.contains(location) {
        log::warn!(
          "varying at location {} is read by the {} stage but never written by the {} stage",
          location,
          consumer.stage,
          producer.stage
        );
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    binding::Access,
    lit,
    reflect::StageFlags,
    scope::Scope,
    stage::StageBuilder,
    types::V4,
    vec4,
  };

  #[test]
  fn descriptors_are_merged() {
    let mut layout = PipelineLayout::new();
    let shared = layout.storage_array_with::<f32>(0, Access::ReadOnly);
    let tint = layout.push_constant::<V4<f32>>();
    let out = layout.color_output::<V4<f32>>();

    let vs = StageBuilder::new_vertex_shader(|s, input, output| {
      s.main_fun(|s: &mut Scope<()>| {
        let x = shared.at(input.vertex_index.cast::<u32>());
        s.set(&output.position, vec4!(x, 0., 0., 1.));
      })
    });

    let fs = StageBuilder::new_fragment_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let w = shared.at(lit!(0u32));
        s.set(&*out, vec4!(w, 0., 0., 1.) + (*tint).clone());
      })
    });

    let pipeline = Pipeline::compile(&layout, &[&fs, &vs], &CompileOptions::default()).unwrap();

    let stages: Vec<_> = pipeline.modules().iter().map(|m| m.stage).collect();
    assert_eq!(stages, vec![ShaderStage::Vertex, ShaderStage::Fragment]);

    assert_eq!(
      pipeline.descriptors().get(0, 0).map(|e| e.stages),
      Some(StageFlags::VERTEX | StageFlags::FRAGMENT)
    );
    assert_eq!(pipeline.push_constants().map(|r| r.stages), Some(StageFlags::FRAGMENT));
    assert_eq!(pipeline.assemble().len(), 2);
  }

  #[test]
  fn stages_appear_once() {
    let layout = PipelineLayout::new();
    let a = StageBuilder::new_compute_shader([1, 1, 1], |s, _| s.main_fun(|_: &mut Scope<()>| {}));
    let b = StageBuilder::new_compute_shader([1, 1, 1], |s, _| s.main_fun(|_: &mut Scope<()>| {}));
    let f = StageBuilder::new_fragment_shader(|s, _, _| s.main_fun(|_: &mut Scope<()>| {}));

    assert_eq!(
      Pipeline::compile(&layout, &[&a, &b], &CompileOptions::default()).unwrap_err(),
      UsageError::DuplicateStage(ShaderStage::Compute).into()
    );
    assert_eq!(
      Pipeline::compile(&layout, &[&a, &f], &CompileOptions::default()).unwrap_err(),
      UsageError::MixedPipeline.into()
    );
  }

  #[test]
  fn reporter_gets_every_stage() {
    let layout = PipelineLayout::new();
    let vs = StageBuilder::new_vertex_shader(|s, _, _| s.main_fun(|_: &mut Scope<()>| {}));
    let fs = StageBuilder::new_fragment_shader(|s, _, _| s.main_fun(|_: &mut Scope<()>| {}));

    let mut seen = Vec::new();
    let mut reporter = |stage: ShaderStage, _: &str| seen.push(stage);
    Pipeline::compile_with_reporter(&layout, &[&vs, &fs], &CompileOptions::default(), &mut reporter).unwrap();

    assert_eq!(seen, vec![ShaderStage::Vertex, ShaderStage::Fragment]);
  }
}
