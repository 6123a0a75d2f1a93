//! Compilation options.

use std::fmt;

/// Version of the emitted SPIR-V.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SpirvVersion {
  V1_0,
  V1_1,
  V1_2,
  V1_3,
  V1_4,
  V1_5,
}

impl SpirvVersion {
  /// Version word of the module header.
  pub const fn word(self) -> u32 {
    let minor = match self {
      SpirvVersion::V1_0 => 0,
      SpirvVersion::V1_1 => 1,
      SpirvVersion::V1_2 => 2,
      SpirvVersion::V1_3 => 3,
      SpirvVersion::V1_4 => 4,
      SpirvVersion::V1_5 => 5,
    };

    (1 << 16) | (minor << 8)
  }

  /// Whether the `StorageBuffer` storage class is available (it is core from 1.3 on).
  pub fn has_storage_buffer_class(self) -> bool {
    self >= SpirvVersion::V1_3
  }

  /// Whether entry points must list every global they reference, and not only inputs and outputs.
  pub fn lists_all_globals(self) -> bool {
    self >= SpirvVersion::V1_4
  }
}

impl fmt::Display for SpirvVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let word = self.word();
    write!(f, "{}.{}", word >> 16, (word >> 8) & 0xff)
  }
}

impl Default for SpirvVersion {
  fn default() -> Self {
    SpirvVersion::V1_3
  }
}

/// Limits of the device a module is compiled for.
///
/// The defaults are the minimum values every Vulkan implementation guarantees.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceLimits {
  pub max_compute_shared_memory_size: u32,
  pub max_compute_work_group_size: [u32; 3],
  pub max_compute_work_group_invocations: u32,
  pub max_descriptor_array_len: u32,
  pub max_push_constants_size: u32,
  pub max_vertex_input_attributes: u32,
}

impl Default for DeviceLimits {
  fn default() -> Self {
    Self {
      max_compute_shared_memory_size: 16384,
      max_compute_work_group_size: [128, 128, 64],
      max_compute_work_group_invocations: 128,
      max_descriptor_array_len: 1024,
      max_push_constants_size: 128,
      max_vertex_input_attributes: 16,
    }
  }
}

/// What to do with barriers reachable under a non-uniform condition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DivergencePolicy {
  /// Do not look for divergent barriers.
  Ignore,
  /// Log a warning for each divergent barrier.
  Warn,
  /// Fail compilation with a usage error.
  Deny,
}

impl Default for DivergencePolicy {
  fn default() -> Self {
    DivergencePolicy::Warn
  }
}

/// Options driving the compilation of stages into modules.
#[derive(Clone, Debug, PartialEq)]
pub struct CompileOptions {
  pub spirv_version: SpirvVersion,
  pub limits: DeviceLimits,
  /// Rewrite function variables that are only loaded and stored into SSA values.
  pub promote_variables: bool,
  /// Emit `OpName` and `OpMemberName`.
  pub debug_names: bool,
  pub divergent_barriers: DivergencePolicy,
  /// Force early fragment tests in fragment shaders.
  pub early_fragment_tests: bool,
}

impl Default for CompileOptions {
  fn default() -> Self {
    Self {
      spirv_version: SpirvVersion::default(),
      limits: DeviceLimits::default(),
      promote_variables: true,
      debug_names: true,
      divergent_barriers: DivergencePolicy::default(),
      early_fragment_tests: false,
    }
  }
}

impl CompileOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn spirv_version(mut self, version: SpirvVersion) -> Self {
    self.spirv_version = version;
    self
  }

  pub fn limits(mut self, limits: DeviceLimits) -> Self {
    self.limits = limits;
    self
  }

  pub fn promote_variables(mut self, promote: bool) -> Self {
    self.promote_variables = promote;
    self
  }

  pub fn debug_names(mut self, names: bool) -> Self {
    self.debug_names = names;
    self
  }

  pub fn divergent_barriers(mut self, policy: DivergencePolicy) -> Self {
    self.divergent_barriers = policy;
    self
  }

  pub fn early_fragment_tests(mut self, early: bool) -> Self {
    self.early_fragment_tests = early;
    self
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn version_words() {
    assert_eq!(SpirvVersion::V1_0.word(), 0x0001_0000);
    assert_eq!(SpirvVersion::V1_3.word(), 0x0001_0300);
    assert_eq!(SpirvVersion::default(), SpirvVersion::V1_3);
    assert_eq!(SpirvVersion::V1_4.to_string(), "1.4");
  }

  #[test]
  fn builder_setters() {
    let options = CompileOptions::new()
      .spirv_version(SpirvVersion::V1_5)
      .promote_variables(false)
      .divergent_barriers(DivergencePolicy::Deny);

    assert_eq!(options.spirv_version, SpirvVersion::V1_5);
    assert!(!options.promote_variables);
    assert_eq!(options.divergent_barriers, DivergencePolicy::Deny);
    assert!(options.spirv_version.lists_all_globals());
  }
}
