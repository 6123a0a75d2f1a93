//! Diagnostic hook.
//!
//! A [`DebugReporter`] receives the textual dump of every module a [`Pipeline`](crate::pipeline::Pipeline) compiles.
//! Reporting is advisory: it never changes what is compiled.

use crate::{ir::Module, stage::ShaderStage};

/// Receiver of module dumps.
pub trait DebugReporter {
  fn report(&mut self, stage: ShaderStage, dump: &str);
}

/// Reporter forwarding dumps to [`log::debug!`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl DebugReporter for LogReporter {
  fn report(&mut self, stage: ShaderStage, dump: &str) {
    log::debug!("{} stage module:\n{}", stage, dump);
  }
}

impl<F> DebugReporter for F
where
  F: FnMut(ShaderStage, &str),
{
  fn report(&mut self, stage: ShaderStage, dump: &str) {
    self(stage, dump)
  }
}

/// Send the dump of `module` to `reporter`.
pub fn report_module(reporter: &mut dyn DebugReporter, module: &Module) {
  reporter.report(module.stage, &module.to_text());
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{config::CompileOptions, layout::PipelineLayout, scope::Scope, stage::StageBuilder};

  #[test]
  fn closures_receive_dumps() {
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| s.main_fun(|_: &mut Scope<()>| {}));
    let module = stage.compile(&PipelineLayout::new(), &CompileOptions::default()).unwrap();

    let mut dumps = Vec::new();
    let mut reporter = |stage: ShaderStage, dump: &str| dumps.push((stage, dump.to_owned()));
    report_module(&mut reporter, &module);

    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].0, ShaderStage::Compute);
    assert!(dumps[0].1.contains("OpEntryPoint GLCompute"));
  }
}
