//! Host-side synchronization scenarios.
//!
//! [`BufferBarrier`] and [`ImageBarrier`] describe pipeline barriers the way a device backend records them. Building
//! one validates that every access can happen at the pipeline stages it is paired with, and that the resource was
//! created with the usage the access needs.

use bitflags::bitflags;

use crate::error::{CompileError, SyncError};

bitflags! {
  /// Pipeline stages, with the values of `VkPipelineStageFlagBits`.
  #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
  pub struct PipelineStage: u32 {
    const TOP_OF_PIPE = 0x1;
    const DRAW_INDIRECT = 0x2;
    const VERTEX_INPUT = 0x4;
    const VERTEX_SHADER = 0x8;
    const TESSELLATION_CONTROL_SHADER = 0x10;
    const TESSELLATION_EVALUATION_SHADER = 0x20;
    const GEOMETRY_SHADER = 0x40;
    const FRAGMENT_SHADER = 0x80;
    const EARLY_FRAGMENT_TESTS = 0x100;
    const LATE_FRAGMENT_TESTS = 0x200;
    const COLOR_ATTACHMENT_OUTPUT = 0x400;
    const COMPUTE_SHADER = 0x800;
    const TRANSFER = 0x1000;
    const BOTTOM_OF_PIPE = 0x2000;
    const HOST = 0x4000;
    const ALL_GRAPHICS = 0x8000;
    const ALL_COMMANDS = 0x10000;
  }
}

bitflags! {
  /// Memory accesses, with the values of `VkAccessFlagBits`.
  #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
  pub struct AccessFlags: u32 {
    const INDIRECT_COMMAND_READ = 0x1;
    const INDEX_READ = 0x2;
    const VERTEX_ATTRIBUTE_READ = 0x4;
    const UNIFORM_READ = 0x8;
    const INPUT_ATTACHMENT_READ = 0x10;
    const SHADER_READ = 0x20;
    const SHADER_WRITE = 0x40;
    const COLOR_ATTACHMENT_READ = 0x80;
    const COLOR_ATTACHMENT_WRITE = 0x100;
    const DEPTH_STENCIL_ATTACHMENT_READ = 0x200;
    const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x400;
    const TRANSFER_READ = 0x800;
    const TRANSFER_WRITE = 0x1000;
    const HOST_READ = 0x2000;
    const HOST_WRITE = 0x4000;
    const MEMORY_READ = 0x8000;
    const MEMORY_WRITE = 0x10000;
  }
}

bitflags! {
  /// Buffer usages, with the values of `VkBufferUsageFlagBits`.
  #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
  pub struct BufferUsage: u32 {
    const TRANSFER_SRC = 0x1;
    const TRANSFER_DST = 0x2;
    const UNIFORM_TEXEL_BUFFER = 0x4;
    const STORAGE_TEXEL_BUFFER = 0x8;
    const UNIFORM_BUFFER = 0x10;
    const STORAGE_BUFFER = 0x20;
    const INDEX_BUFFER = 0x40;
    const VERTEX_BUFFER = 0x80;
    const INDIRECT_BUFFER = 0x100;
  }
}

bitflags! {
  /// Image usages, with the values of `VkImageUsageFlagBits`.
  #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
  pub struct ImageUsage: u32 {
    const TRANSFER_SRC = 0x1;
    const TRANSFER_DST = 0x2;
    const SAMPLED = 0x4;
    const STORAGE = 0x8;
    const COLOR_ATTACHMENT = 0x10;
    const DEPTH_STENCIL_ATTACHMENT = 0x20;
    const TRANSIENT_ATTACHMENT = 0x40;
    const INPUT_ATTACHMENT = 0x80;
  }
}

const SHADER_STAGES: PipelineStage = PipelineStage::VERTEX_SHADER
  .union(PipelineStage::TESSELLATION_CONTROL_SHADER)
  .union(PipelineStage::TESSELLATION_EVALUATION_SHADER)
  .union(PipelineStage::GEOMETRY_SHADER)
  .union(PipelineStage::FRAGMENT_SHADER)
  .union(PipelineStage::COMPUTE_SHADER);

const GRAPHICS_STAGES: PipelineStage = PipelineStage::DRAW_INDIRECT
  .union(PipelineStage::VERTEX_INPUT)
  .union(PipelineStage::VERTEX_SHADER)
  .union(PipelineStage::TESSELLATION_CONTROL_SHADER)
  .union(PipelineStage::TESSELLATION_EVALUATION_SHADER)
  .union(PipelineStage::GEOMETRY_SHADER)
  .union(PipelineStage::FRAGMENT_SHADER)
  .union(PipelineStage::EARLY_FRAGMENT_TESTS)
  .union(PipelineStage::LATE_FRAGMENT_TESTS)
  .union(PipelineStage::COLOR_ATTACHMENT_OUTPUT);

/// Stages at which each access may happen; accesses not listed may happen at any stage.
const ACCESS_STAGES: &[(AccessFlags, PipelineStage)] = &[
  (AccessFlags::INDIRECT_COMMAND_READ, PipelineStage::DRAW_INDIRECT),
  (AccessFlags::INDEX_READ, PipelineStage::VERTEX_INPUT),
  (AccessFlags::VERTEX_ATTRIBUTE_READ, PipelineStage::VERTEX_INPUT),
  (AccessFlags::UNIFORM_READ, SHADER_STAGES),
  (AccessFlags::SHADER_READ, SHADER_STAGES),
  (AccessFlags::SHADER_WRITE, SHADER_STAGES),
  (AccessFlags::INPUT_ATTACHMENT_READ, PipelineStage::FRAGMENT_SHADER),
  (AccessFlags::COLOR_ATTACHMENT_READ, PipelineStage::COLOR_ATTACHMENT_OUTPUT),
  (AccessFlags::COLOR_ATTACHMENT_WRITE, PipelineStage::COLOR_ATTACHMENT_OUTPUT),
  (
    AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
    PipelineStage::EARLY_FRAGMENT_TESTS.union(PipelineStage::LATE_FRAGMENT_TESTS),
  ),
  (
    AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
    PipelineStage::EARLY_FRAGMENT_TESTS.union(PipelineStage::LATE_FRAGMENT_TESTS),
  ),
  (AccessFlags::TRANSFER_READ, PipelineStage::TRANSFER),
  (AccessFlags::TRANSFER_WRITE, PipelineStage::TRANSFER),
  (AccessFlags::HOST_READ, PipelineStage::HOST),
  (AccessFlags::HOST_WRITE, PipelineStage::HOST),
];

/// Buffer usages allowing each access; an empty set means the access never applies to buffers. Accesses not listed
/// need no particular usage.
const BUFFER_USAGES: &[(AccessFlags, BufferUsage)] = &[
  (AccessFlags::INDIRECT_COMMAND_READ, BufferUsage::INDIRECT_BUFFER),
  (AccessFlags::INDEX_READ, BufferUsage::INDEX_BUFFER),
  (AccessFlags::VERTEX_ATTRIBUTE_READ, BufferUsage::VERTEX_BUFFER),
  (
    AccessFlags::UNIFORM_READ,
    BufferUsage::UNIFORM_BUFFER.union(BufferUsage::UNIFORM_TEXEL_BUFFER),
  ),
  (
    AccessFlags::SHADER_READ,
    BufferUsage::STORAGE_BUFFER
      .union(BufferUsage::UNIFORM_BUFFER)
      .union(BufferUsage::UNIFORM_TEXEL_BUFFER)
      .union(BufferUsage::STORAGE_TEXEL_BUFFER),
  ),
  (
    AccessFlags::SHADER_WRITE,
    BufferUsage::STORAGE_BUFFER.union(BufferUsage::STORAGE_TEXEL_BUFFER),
  ),
  (AccessFlags::INPUT_ATTACHMENT_READ, BufferUsage::empty()),
  (AccessFlags::COLOR_ATTACHMENT_READ, BufferUsage::empty()),
  (AccessFlags::COLOR_ATTACHMENT_WRITE, BufferUsage::empty()),
  (AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ, BufferUsage::empty()),
  (AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE, BufferUsage::empty()),
  (AccessFlags::TRANSFER_READ, BufferUsage::TRANSFER_SRC),
  (AccessFlags::TRANSFER_WRITE, BufferUsage::TRANSFER_DST),
];

const IMAGE_USAGES: &[(AccessFlags, ImageUsage)] = &[
  (AccessFlags::INDIRECT_COMMAND_READ, ImageUsage::empty()),
  (AccessFlags::INDEX_READ, ImageUsage::empty()),
  (AccessFlags::VERTEX_ATTRIBUTE_READ, ImageUsage::empty()),
  (AccessFlags::UNIFORM_READ, ImageUsage::empty()),
  (AccessFlags::SHADER_READ, ImageUsage::SAMPLED.union(ImageUsage::STORAGE)),
  (AccessFlags::SHADER_WRITE, ImageUsage::STORAGE),
  (AccessFlags::INPUT_ATTACHMENT_READ, ImageUsage::INPUT_ATTACHMENT),
  (AccessFlags::COLOR_ATTACHMENT_READ, ImageUsage::COLOR_ATTACHMENT),
  (AccessFlags::COLOR_ATTACHMENT_WRITE, ImageUsage::COLOR_ATTACHMENT),
  (AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ, ImageUsage::DEPTH_STENCIL_ATTACHMENT),
  (AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE, ImageUsage::DEPTH_STENCIL_ATTACHMENT),
  (AccessFlags::TRANSFER_READ, ImageUsage::TRANSFER_SRC),
  (AccessFlags::TRANSFER_WRITE, ImageUsage::TRANSFER_DST),
];

fn rule<T>(table: &[(AccessFlags, T)], access: AccessFlags) -> Option<T>
where
  T: Copy,
{
  table.iter().find(|(a, _)| *a == access).map(|(_, t)| *t)
}

fn check_stages(access: AccessFlags, stages: PipelineStage, side: &'static str) -> Result<(), SyncError> {
  if stages.is_empty() {
    return Err(SyncError::EmptyStageMask(side));
  }

  // the meta stages cover the accesses of the stages they stand for
  let mut effective = stages;
  if stages.contains(PipelineStage::ALL_COMMANDS) {
    return Ok(());
  }
  if stages.contains(PipelineStage::ALL_GRAPHICS) {
    effective |= GRAPHICS_STAGES;
  }

  for bit in access.iter() {
    if let Some(allowed) = rule(ACCESS_STAGES, bit) {
      if !effective.intersects(allowed) {
        return Err(SyncError::InvalidStage {
          access: format!("{:?}", bit),
          stage: format!("{:?}", stages),
        });
      }
    }
  }

  Ok(())
}

/// Barrier on a range of a buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BufferBarrier {
  pub resource: String,
  pub src_stages: PipelineStage,
  pub src_access: AccessFlags,
  pub dst_stages: PipelineStage,
  pub dst_access: AccessFlags,
  pub offset: u64,
  /// Size of the range; `None` covers the rest of the buffer.
  pub size: Option<u64>,
}

impl BufferBarrier {
  /// Start describing a barrier on `resource`, a buffer created with `usage`.
  pub fn builder(resource: impl Into<String>, usage: BufferUsage) -> BufferBarrierBuilder {
    BufferBarrierBuilder {
      resource: resource.into(),
      usage,
      src: (PipelineStage::empty(), AccessFlags::empty()),
      dst: (PipelineStage::empty(), AccessFlags::empty()),
      offset: 0,
      size: None,
    }
  }
}

#[derive(Clone, Debug)]
pub struct BufferBarrierBuilder {
  resource: String,
  usage: BufferUsage,
  src: (PipelineStage, AccessFlags),
  dst: (PipelineStage, AccessFlags),
  offset: u64,
  size: Option<u64>,
}

impl BufferBarrierBuilder {
  /// Stages and accesses to wait for.
  pub fn src(mut self, stages: PipelineStage, access: AccessFlags) -> Self {
    self.src = (stages, access);
    self
  }

  /// Stages and accesses that wait.
  pub fn dst(mut self, stages: PipelineStage, access: AccessFlags) -> Self {
    self.dst = (stages, access);
    self
  }

  pub fn range(mut self, offset: u64, size: u64) -> Self {
    self.offset = offset;
    self.size = Some(size);
    self
  }

  pub fn build(self) -> Result<BufferBarrier, CompileError> {
    for (side, (stages, access)) in [("source", self.src), ("destination", self.dst)] {
      check_stages(access, stages, side)?;

      for bit in access.iter() {
        if let Some(required) = rule(BUFFER_USAGES, bit) {
          if !self.usage.intersects(required) {
            return Err(
              SyncError::MissingUsage {
                resource: self.resource.clone(),
                access: format!("{:?}", bit),
                required: format!("{:?}", required),
              }
              .into(),
            );
          }
        }
      }
    }

    Ok(BufferBarrier {
      resource: self.resource,
      src_stages: self.src.0,
      src_access: self.src.1,
      dst_stages: self.dst.0,
      dst_access: self.dst.1,
      offset: self.offset,
      size: self.size,
    })
  }
}

/// Layout of the texels of an image in memory.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ImageLayout {
  Undefined,
  General,
  ColorAttachment,
  DepthStencilAttachment,
  ShaderReadOnly,
  TransferSrc,
  TransferDst,
  PresentSrc,
}

impl ImageLayout {
  fn required_usage(self) -> Option<ImageUsage> {
    match self {
      ImageLayout::ColorAttachment => Some(ImageUsage::COLOR_ATTACHMENT),
      ImageLayout::DepthStencilAttachment => Some(ImageUsage::DEPTH_STENCIL_ATTACHMENT),
      ImageLayout::ShaderReadOnly => Some(ImageUsage::SAMPLED | ImageUsage::INPUT_ATTACHMENT),
      ImageLayout::TransferSrc => Some(ImageUsage::TRANSFER_SRC),
      ImageLayout::TransferDst => Some(ImageUsage::TRANSFER_DST),
      _ => None,
    }
  }
}

/// Barrier on an image, with an optional layout transition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageBarrier {
  pub resource: String,
  pub src_stages: PipelineStage,
  pub src_access: AccessFlags,
  pub dst_stages: PipelineStage,
  pub dst_access: AccessFlags,
  pub old_layout: ImageLayout,
  pub new_layout: ImageLayout,
}

impl ImageBarrier {
  pub fn builder(resource: impl Into<String>, usage: ImageUsage) -> ImageBarrierBuilder {
    ImageBarrierBuilder {
      resource: resource.into(),
      usage,
      src: (PipelineStage::empty(), AccessFlags::empty()),
      dst: (PipelineStage::empty(), AccessFlags::empty()),
      layouts: (ImageLayout::Undefined, ImageLayout::General),
    }
  }
}

#[derive(Clone, Debug)]
pub struct ImageBarrierBuilder {
  resource: String,
  usage: ImageUsage,
  src: (PipelineStage, AccessFlags),
  dst: (PipelineStage, AccessFlags),
  layouts: (ImageLayout, ImageLayout),
}

impl ImageBarrierBuilder {
  pub fn src(mut self, stages: PipelineStage, access: AccessFlags) -> Self {
    self.src = (stages, access);
    self
  }

  pub fn dst(mut self, stages: PipelineStage, access: AccessFlags) -> Self {
    self.dst = (stages, access);
    self
  }

  /// Transition the image from `old` to `new`.
  pub fn transition(mut self, old: ImageLayout, new: ImageLayout) -> Self {
    self.layouts = (old, new);
    self
  }

  pub fn build(self) -> Result<ImageBarrier, CompileError> {
    let missing = |access: String, required: ImageUsage| SyncError::MissingUsage {
      resource: self.resource.clone(),
      access,
      required: format!("{:?}", required),
    };

    for (side, (stages, access)) in [("source", self.src), ("destination", self.dst)] {
      check_stages(access, stages, side)?;

      for bit in access.iter() {
        if let Some(required) = rule(IMAGE_USAGES, bit) {
          if !self.usage.intersects(required) {
            return Err(missing(format!("{:?}", bit), required).into());
          }
        }
      }
    }

    for layout in [self.layouts.0, self.layouts.1] {
      if let Some(required) = layout.required_usage() {
        if !self.usage.intersects(required) {
          return Err(missing(format!("layout {:?}", layout), required).into());
        }
      }
    }

    Ok(ImageBarrier {
      src_stages: self.src.0,
      src_access: self.src.1,
      dst_stages: self.dst.0,
      dst_access: self.dst.1,
      old_layout: self.layouts.0,
      new_layout: self.layouts.1,
      resource: self.resource,
    })
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn compute_write_then_vertex_read() {
    let barrier = BufferBarrier::builder("particles", BufferUsage::STORAGE_BUFFER | BufferUsage::VERTEX_BUFFER)
      .src(PipelineStage::COMPUTE_SHADER, AccessFlags::SHADER_WRITE)
      .dst(PipelineStage::VERTEX_INPUT, AccessFlags::VERTEX_ATTRIBUTE_READ)
      .build()
      .unwrap();

    assert_eq!(barrier.size, None);
    assert_eq!(barrier.dst_access, AccessFlags::VERTEX_ATTRIBUTE_READ);
  }

  #[test]
  fn missing_buffer_usage() {
    let err = BufferBarrier::builder("particles", BufferUsage::STORAGE_BUFFER)
      .src(PipelineStage::COMPUTE_SHADER, AccessFlags::SHADER_WRITE)
      .dst(PipelineStage::VERTEX_INPUT, AccessFlags::VERTEX_ATTRIBUTE_READ)
      .build()
      .unwrap_err();

    assert!(matches!(
      err,
      CompileError::InvalidBarrier(SyncError::MissingUsage { ref resource, .. }) if resource == "particles"
    ));
  }

  #[test]
  fn access_at_wrong_stage() {
    let err = BufferBarrier::builder("ubo", BufferUsage::UNIFORM_BUFFER)
      .src(PipelineStage::TRANSFER, AccessFlags::UNIFORM_READ)
      .dst(PipelineStage::FRAGMENT_SHADER, AccessFlags::UNIFORM_READ)
      .build()
      .unwrap_err();

    assert!(matches!(err, CompileError::InvalidBarrier(SyncError::InvalidStage { .. })));
  }

  #[test]
  fn empty_stage_mask() {
    let err = ImageBarrier::builder("depth", ImageUsage::DEPTH_STENCIL_ATTACHMENT)
      .dst(PipelineStage::LATE_FRAGMENT_TESTS, AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
      .build()
      .unwrap_err();

    assert_eq!(err, CompileError::InvalidBarrier(SyncError::EmptyStageMask("source")));
  }

  #[test]
  fn image_layout_transition_needs_usage() {
    let ok = ImageBarrier::builder("albedo", ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED)
      .src(PipelineStage::COLOR_ATTACHMENT_OUTPUT, AccessFlags::COLOR_ATTACHMENT_WRITE)
      .dst(PipelineStage::FRAGMENT_SHADER, AccessFlags::SHADER_READ)
      .transition(ImageLayout::ColorAttachment, ImageLayout::ShaderReadOnly)
      .build();
    assert!(ok.is_ok());

    let err = ImageBarrier::builder("albedo", ImageUsage::COLOR_ATTACHMENT)
      .src(PipelineStage::ALL_GRAPHICS, AccessFlags::COLOR_ATTACHMENT_WRITE)
      .dst(PipelineStage::ALL_COMMANDS, AccessFlags::MEMORY_READ)
      .transition(ImageLayout::ColorAttachment, ImageLayout::ShaderReadOnly)
      .build()
      .unwrap_err();
    assert!(matches!(err, CompileError::InvalidBarrier(SyncError::MissingUsage { .. })));
  }
}
