//! Binding metadata of compiled stages and pipelines.
//!
//! A [`StageReflection`] is produced alongside every lowered module. It lists the descriptors the stage references,
//! the push-constant range it reads, the vertex input layout (vertex shaders) and the workgroup size (compute
//! shaders). Pipelines merge the descriptor tables of their stages.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::{
  binding::Access,
  error::{CompileError, SyncError},
  stage::ShaderStage,
  sync::{BufferUsage, ImageUsage},
  types::Type,
  vertex::{InputRate, VertexFormat},
};

/// Kind of descriptor, with the values of `VkDescriptorType`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DescriptorKind {
  Sampler,
  CombinedImageSampler,
  SampledImage,
  StorageImage,
  UniformTexelBuffer,
  StorageTexelBuffer,
  UniformBuffer,
  StorageBuffer,
  InputAttachment,
}

impl DescriptorKind {
  pub fn vk_descriptor_type(self) -> u32 {
    match self {
      DescriptorKind::Sampler => 0,
      DescriptorKind::CombinedImageSampler => 1,
      DescriptorKind::SampledImage => 2,
      DescriptorKind::StorageImage => 3,
      DescriptorKind::UniformTexelBuffer => 4,
      DescriptorKind::StorageTexelBuffer => 5,
      DescriptorKind::UniformBuffer => 6,
      DescriptorKind::StorageBuffer => 7,
      DescriptorKind::InputAttachment => 10,
    }
  }

  /// Whether the descriptor refers to a buffer.
  pub fn is_buffer(self) -> bool {
    matches!(
      self,
      DescriptorKind::UniformBuffer
        | DescriptorKind::StorageBuffer
        | DescriptorKind::UniformTexelBuffer
        | DescriptorKind::StorageTexelBuffer
    )
  }

  /// Usage a buffer needs to be bound to a descriptor of this kind; empty for image descriptors.
  pub fn buffer_usage(self) -> BufferUsage {
    match self {
      DescriptorKind::UniformBuffer => BufferUsage::UNIFORM_BUFFER,
      DescriptorKind::StorageBuffer => BufferUsage::STORAGE_BUFFER,
      DescriptorKind::UniformTexelBuffer => BufferUsage::UNIFORM_TEXEL_BUFFER,
      DescriptorKind::StorageTexelBuffer => BufferUsage::STORAGE_TEXEL_BUFFER,
      _ => BufferUsage::empty(),
    }
  }

  /// Usage an image needs to be bound to a descriptor of this kind; empty for buffer descriptors and samplers.
  pub fn image_usage(self) -> ImageUsage {
    match self {
      DescriptorKind::CombinedImageSampler | DescriptorKind::SampledImage => ImageUsage::SAMPLED,
      DescriptorKind::StorageImage => ImageUsage::STORAGE,
      DescriptorKind::InputAttachment => ImageUsage::INPUT_ATTACHMENT,
      _ => ImageUsage::empty(),
    }
  }

  fn name(self) -> &'static str {
    match self {
      DescriptorKind::Sampler => "sampler",
      DescriptorKind::CombinedImageSampler => "combined image sampler",
      DescriptorKind::SampledImage => "sampled image",
      DescriptorKind::StorageImage => "storage image",
      DescriptorKind::UniformTexelBuffer => "uniform texel buffer",
      DescriptorKind::StorageTexelBuffer => "storage texel buffer",
      DescriptorKind::UniformBuffer => "uniform buffer",
      DescriptorKind::StorageBuffer => "storage buffer",
      DescriptorKind::InputAttachment => "input attachment",
    }
  }
}

bitflags! {
  /// Shader stages, with the values of `VkShaderStageFlagBits`.
  #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
  pub struct StageFlags: u32 {
    const VERTEX = 0x1;
    const TESSELLATION_CONTROL = 0x2;
    const TESSELLATION_EVALUATION = 0x4;
    const GEOMETRY = 0x8;
    const FRAGMENT = 0x10;
    const COMPUTE = 0x20;
  }
}

impl From<ShaderStage> for StageFlags {
  fn from(stage: ShaderStage) -> Self {
    match stage {
      ShaderStage::Vertex => StageFlags::VERTEX,
      ShaderStage::TessControl => StageFlags::TESSELLATION_CONTROL,
      ShaderStage::TessEval => StageFlags::TESSELLATION_EVALUATION,
      ShaderStage::Geometry => StageFlags::GEOMETRY,
      ShaderStage::Fragment => StageFlags::FRAGMENT,
      ShaderStage::Compute => StageFlags::COMPUTE,
    }
  }
}

/// Descriptor referenced by a stage.
#[derive(Clone, Debug, PartialEq)]
pub struct DescriptorEntry {
  pub set: u32,
  pub binding: u32,
  pub name: String,
  pub kind: DescriptorKind,
  /// Type of the resource; for binding arrays, the type of one element.
  pub ty: Type,
  /// Number of descriptors of binding arrays.
  pub count: Option<u32>,
  pub access: Access,
  /// Whether a binding array is indexed with a value computed by the shader.
  pub dynamically_indexed: bool,
  pub stages: StageFlags,
}

impl DescriptorEntry {
  /// Number of descriptors the binding takes.
  pub fn descriptor_count(&self) -> u32 {
    self.count.unwrap_or(1)
  }
}

/// Descriptors by `(set, binding)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DescriptorTable(BTreeMap<(u32, u32), DescriptorEntry>);

impl DescriptorTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn insert(&mut self, entry: DescriptorEntry) {
    self.0.insert((entry.set, entry.binding), entry);
  }

  pub fn get(&self, set: u32, binding: u32) -> Option<&DescriptorEntry> {
    self.0.get(&(set, binding))
  }

  /// Entries ordered by set, then binding.
  pub fn iter(&self) -> impl Iterator<Item = &DescriptorEntry> {
    self.0.values()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Sets referenced by the table, in increasing order.
  pub fn sets(&self) -> Vec<u32> {
    let mut sets: Vec<_> = self.0.keys().map(|(set, _)| *set).collect();
    sets.dedup();
    sets
  }

  /// Add the entries of another stage; entries present in both get the union of their stages.
  pub fn merge(&mut self, other: &DescriptorTable) {
    for (key, entry) in &other.0 {
      match self.0.get_mut(key) {
        Some(existing) => {
          existing.stages |= entry.stages;
          existing.dynamically_indexed |= entry.dynamically_indexed;
        }

        None => {
          self.0.insert(*key, entry.clone());
        }
      }
    }
  }

  fn entry(&self, set: u32, binding: u32) -> Result<&DescriptorEntry, CompileError> {
    self
      .get(set, binding)
      .ok_or(CompileError::InvalidBarrier(SyncError::UnknownBinding { set, binding }))
  }

  /// Check that a buffer created with `usage` can be bound at `(set, binding)`.
  pub fn check_buffer_usage(&self, set: u32, binding: u32, usage: BufferUsage) -> Result<(), CompileError> {
    let entry = self.entry(set, binding)?;
    let required = entry.kind.buffer_usage();

    if required.is_empty() || !usage.contains(required) {
      return Err(
        SyncError::MissingUsage {
          resource: format!("buffer bound to `{}`", entry.name),
          access: format!("{} descriptor", entry.kind.name()),
          required: format!("{:?}", required),
        }
        .into(),
      );
    }

    Ok(())
  }

  /// Check that an image created with `usage` can be bound at `(set, binding)`.
  pub fn check_image_usage(&self, set: u32, binding: u32, usage: ImageUsage) -> Result<(), CompileError> {
    let entry = self.entry(set, binding)?;
    let required = entry.kind.image_usage();

    if required.is_empty() || !usage.contains(required) {
      return Err(
        SyncError::MissingUsage {
          resource: format!("image bound to `{}`", entry.name),
          access: format!("{} descriptor", entry.kind.name()),
          required: format!("{:?}", required),
        }
        .into(),
      );
    }

    Ok(())
  }
}

/// Push-constant range read by a set of stages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PushConstantRange {
  pub stages: StageFlags,
  pub offset: u32,
  pub size: u32,
}

/// Vertex buffer binding description.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VertexBufferLayout {
  pub binding: u32,
  pub stride: u32,
  pub rate: InputRate,
}

/// Vertex attribute description.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VertexAttributeLayout {
  pub location: u32,
  pub binding: u32,
  pub format: VertexFormat,
  pub offset: u32,
}

/// Vertex input state of a pipeline.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VertexInputLayout {
  pub buffers: Vec<VertexBufferLayout>,
  pub attributes: Vec<VertexAttributeLayout>,
}

/// What a stage reads and writes through its interface.
#[derive(Clone, Debug, PartialEq)]
pub struct StageReflection {
  pub stage: ShaderStage,
  pub descriptors: DescriptorTable,
  pub push_constants: Option<PushConstantRange>,
  /// Attributes read by a vertex shader, with the buffers they come from.
  pub vertex_input: VertexInputLayout,
  /// Workgroup size of compute shaders.
  pub local_size: Option<[u32; 3]>,
  /// Locations of the varyings read by the stage.
  pub varyings_read: Vec<u32>,
  /// Locations of the varyings written by the stage.
  pub varyings_written: Vec<u32>,
}

impl StageReflection {
  pub(crate) fn new(stage: ShaderStage) -> Self {
    Self {
      stage,
      descriptors: DescriptorTable::new(),
      push_constants: None,
      vertex_input: VertexInputLayout::default(),
      local_size: None,
      varyings_read: Vec::new(),
      varyings_written: Vec::new(),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::types::ToType;

  fn entry(set: u32, binding: u32, kind: DescriptorKind, stages: StageFlags) -> DescriptorEntry {
    DescriptorEntry {
      set,
      binding,
      name: format!("b{}", binding),
      kind,
      ty: f32::ty(),
      count: None,
      access: Access::ReadWrite,
      dynamically_indexed: false,
      stages,
    }
  }

  #[test]
  fn merge_unions_stages() {
    let mut vs = DescriptorTable::new();
    vs.insert(entry(0, 0, DescriptorKind::UniformBuffer, StageFlags::VERTEX));

    let mut fs = DescriptorTable::new();
    fs.insert(entry(0, 0, DescriptorKind::UniformBuffer, StageFlags::FRAGMENT));
    fs.insert(entry(1, 0, DescriptorKind::CombinedImageSampler, StageFlags::FRAGMENT));

    vs.merge(&fs);

    assert_eq!(vs.len(), 2);
    assert_eq!(vs.sets(), vec![0, 1]);
    assert_eq!(
      vs.get(0, 0).map(|e| e.stages),
      Some(StageFlags::VERTEX | StageFlags::FRAGMENT)
    );
  }

  #[test]
  fn usage_checks() {
    let mut table = DescriptorTable::new();
    table.insert(entry(0, 0, DescriptorKind::StorageBuffer, StageFlags::COMPUTE));
    table.insert(entry(0, 1, DescriptorKind::StorageImage, StageFlags::COMPUTE));

    assert!(table
      .check_buffer_usage(0, 0, BufferUsage::STORAGE_BUFFER | BufferUsage::TRANSFER_DST)
      .is_ok());
    assert!(matches!(
      table.check_buffer_usage(0, 0, BufferUsage::UNIFORM_BUFFER),
      Err(CompileError::InvalidBarrier(SyncError::MissingUsage { .. }))
    ));
    assert!(table.check_image_usage(0, 1, ImageUsage::STORAGE).is_ok());
    assert!(table.check_image_usage(0, 0, ImageUsage::STORAGE).is_err());
    assert_eq!(
      table.check_image_usage(3, 0, ImageUsage::SAMPLED),
      Err(CompileError::InvalidBarrier(SyncError::UnknownBinding { set: 3, binding: 0 }))
    );
  }

  #[test]
  fn vk_values() {
    assert_eq!(DescriptorKind::StorageBuffer.vk_descriptor_type(), 7);
    assert_eq!(DescriptorKind::InputAttachment.vk_descriptor_type(), 10);
    assert_eq!(StageFlags::from(ShaderStage::Compute).bits(), 0x20);
  }
}
