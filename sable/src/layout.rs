//! Pipeline layouts: the binding points shared by the stages of a pipeline.
//!
//! A [`PipelineLayout`] is declared before the stages. Each declaration returns a typed token (a buffer, an image, a
//! varying…) that the closures building the stages capture and use as any other expression. When a stage is compiled
//! against the layout, the layout is _resolved_: auto bindings get their numbers, push constants get their offsets
//! and vertex attributes and varyings get their locations.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
  binding::{
    binding_expr, input_attachment, input_attachment_ty, resource, storage_image, storage_texel_buffer, Access,
    BindingArray, Dimension, InputAttachment, PushConstant, Resource, SampledTexture, Sampler, StorageArray,
    StorageBuffer, StorageImage, StorageTexelBuffer, TexelScalar, Texture, UniformBuffer, UniformTexelBuffer,
    WritableImage,
  },
  error::{CompileError, UsageError},
  interface::{locations, ColorOutput, Interpolation, Sampling, Varying},
  memory::{size_align, MemoryLayout},
  reflect::DescriptorKind,
  scope::InterfaceKind,
  types::{ScalarType, ToType, Type, V4},
  vertex::{AttributeFormat, InputRate, VertexAttribute, VertexBuffer, VertexFormat},
};

static NEXT_LAYOUT_ID: AtomicU32 = AtomicU32::new(0);

/// Descriptor set and binding of a declaration.
///
/// A bare set number (`0`) asks for the next free binding of the set; a `(set, binding)` pair asks for an explicit
/// binding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Slot {
  pub set: u32,
  pub binding: Option<u32>,
}

impl From<u32> for Slot {
  fn from(set: u32) -> Self {
    Slot { set, binding: None }
  }
}

impl From<(u32, u32)> for Slot {
  fn from((set, binding): (u32, u32)) -> Self {
    Slot {
      set,
      binding: Some(binding),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BindingDecl {
  pub(crate) name: String,
  pub(crate) slot: Slot,
  pub(crate) kind: DescriptorKind,
  /// Type of one descriptor.
  pub(crate) ty: Type,
  pub(crate) count: Option<u32>,
  pub(crate) access: Access,
  pub(crate) attachment_index: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AttributeDecl {
  pub(crate) buffer: u32,
  pub(crate) format: VertexFormat,
  pub(crate) ty: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct VaryingDecl {
  pub(crate) ty: Type,
  pub(crate) interpolation: Interpolation,
  pub(crate) sampling: Sampling,
  pub(crate) relaxed: bool,
}

/// Binding points of a pipeline.
///
/// # Examples
///
/// ```
/// use sable::{Access, GpuStruct, PipelineLayout, V4};
///
/// #[derive(GpuStruct)]
/// struct Camera {
///   view: sable::M44,
///   projection: sable::M44,
/// }
///
/// let mut layout = PipelineLayout::new();
/// let camera = layout.uniform_buffer::<Camera>(0); // (0, 0)
/// let lights = layout.storage_array_with::<V4<f32>>(0, Access::ReadOnly); // (0, 1)
/// let history = layout.storage_array::<f32>((1, 4)); // explicit (1, 4)
///
/// let resolved = layout.resolve().unwrap();
/// assert_eq!(resolved.binding(1), Some((0, 1)));
/// assert_eq!(resolved.binding(2), Some((1, 4)));
/// ```
#[derive(Debug)]
pub struct PipelineLayout {
  id: u32,
  pub(crate) bindings: Vec<BindingDecl>,
  pub(crate) push_constants: Vec<Type>,
  pub(crate) vertex_buffers: Vec<InputRate>,
  pub(crate) attributes: Vec<AttributeDecl>,
  pub(crate) varyings: Vec<VaryingDecl>,
  pub(crate) color_outputs: Vec<Type>,
  errors: Vec<UsageError>,
}

impl Default for PipelineLayout {
  fn default() -> Self {
    Self::new()
  }
}

impl PipelineLayout {
  pub fn new() -> Self {
    Self {
      id: NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed),
      bindings: Vec::new(),
      push_constants: Vec::new(),
      vertex_buffers: Vec::new(),
      attributes: Vec::new(),
      varyings: Vec::new(),
      color_outputs: Vec::new(),
      errors: Vec::new(),
    }
  }

  /// Identity of the layout, carried by the tokens it returns.
  pub fn id(&self) -> u32 {
    self.id
  }

  fn declare(
    &mut self,
    slot: Slot,
    kind: DescriptorKind,
    ty: Type,
    count: Option<u32>,
    access: Access,
    attachment_index: Option<u32>,
  ) -> u32 {
    let index = self.bindings.len() as u32;
    let prefix = match kind {
      DescriptorKind::Sampler => "sampler",
      DescriptorKind::CombinedImageSampler => "sampled_texture",
      DescriptorKind::SampledImage => "texture",
      DescriptorKind::StorageImage => "storage_image",
      DescriptorKind::UniformTexelBuffer => "uniform_texel_buffer",
      DescriptorKind::StorageTexelBuffer => "storage_texel_buffer",
      DescriptorKind::UniformBuffer => "uniform_buffer",
      DescriptorKind::StorageBuffer => "storage_buffer",
      DescriptorKind::InputAttachment => "input_attachment",
    };

    self.bindings.push(BindingDecl {
      name: format!("{}_{}", prefix, index),
      slot,
      kind,
      ty,
      count,
      access,
      attachment_index,
    });

    index
  }

  fn declare_resource<B>(&mut self, slot: impl Into<Slot>, access: Access) -> B
  where
    B: Resource,
  {
    let index = self.declare(slot.into(), B::KIND, B::resource_ty(), None, access, None);
    resource(self.id, index)
  }

  /// Declare a uniform buffer holding an `S`.
  pub fn uniform_buffer<S>(&mut self, slot: impl Into<Slot>) -> UniformBuffer<S>
  where
    S: ToType,
  {
    self.declare_resource(slot, Access::ReadOnly)
  }

  /// Declare a read-write storage buffer holding an `S`.
  pub fn storage_buffer<S>(&mut self, slot: impl Into<Slot>) -> StorageBuffer<S>
  where
    S: ToType,
  {
    self.declare_resource(slot, Access::ReadWrite)
  }

  /// Declare a storage buffer holding an `S` with the given access.
  pub fn storage_buffer_with<S>(&mut self, slot: impl Into<Slot>, access: Access) -> StorageBuffer<S>
  where
    S: ToType,
  {
    self.declare_resource(slot, access)
  }

  /// Declare a read-write storage buffer holding a runtime-sized array of `T`.
  pub fn storage_array<T>(&mut self, slot: impl Into<Slot>) -> StorageArray<T>
  where
    T: ToType,
  {
    self.declare_resource(slot, Access::ReadWrite)
  }

  /// Declare a storage buffer holding a runtime-sized array of `T` with the given access.
  pub fn storage_array_with<T>(&mut self, slot: impl Into<Slot>, access: Access) -> StorageArray<T>
  where
    T: ToType,
  {
    self.declare_resource(slot, access)
  }

  pub fn uniform_texel_buffer<T>(&mut self, slot: impl Into<Slot>) -> UniformTexelBuffer<T>
  where
    T: TexelScalar,
    V4<T>: ToType,
  {
    self.declare_resource(slot, Access::ReadOnly)
  }

  pub fn storage_texel_buffer<T>(
    &mut self,
    slot: impl Into<Slot>,
    format: spirv::ImageFormat,
    access: Access,
  ) -> StorageTexelBuffer<T>
  where
    T: TexelScalar,
    V4<T>: ToType,
  {
    let token = storage_texel_buffer::<T>(self.id, self.bindings.len() as u32, format);
    let ty = token.image().ty().clone();
    self.declare(slot.into(), DescriptorKind::StorageTexelBuffer, ty, None, access, None);
    token
  }

  /// Declare a sampled image, read through a separate [`Sampler`].
  pub fn texture<D, T>(&mut self, slot: impl Into<Slot>) -> Texture<D, T>
  where
    D: Dimension,
    T: TexelScalar,
  {
    self.declare_resource(slot, Access::ReadOnly)
  }

  /// Declare an image combined with its sampler.
  pub fn sampled_texture<D, T>(&mut self, slot: impl Into<Slot>) -> SampledTexture<D, T>
  where
    D: Dimension,
    T: TexelScalar,
  {
    self.declare_resource(slot, Access::ReadOnly)
  }

  pub fn sampler(&mut self, slot: impl Into<Slot>) -> Sampler {
    self.declare_resource(slot, Access::ReadOnly)
  }

  pub fn storage_image<D, T>(
    &mut self,
    slot: impl Into<Slot>,
    format: spirv::ImageFormat,
    access: Access,
  ) -> StorageImage<D, T>
  where
    D: Dimension,
    T: TexelScalar,
    V4<T>: ToType,
  {
    let token = storage_image::<D, T>(self.id, self.bindings.len() as u32, format);
    let ty = token.image().ty().clone();
    self.declare(slot.into(), DescriptorKind::StorageImage, ty, None, access, None);
    token
  }

  /// Declare the input attachment of index `attachment_index` in the subpass.
  pub fn input_attachment<T>(&mut self, slot: impl Into<Slot>, attachment_index: u32) -> InputAttachment<T>
  where
    T: TexelScalar,
    V4<T>: ToType,
  {
    let token = input_attachment::<T>(self.id, self.bindings.len() as u32);
    let ty = input_attachment_ty::<T>();
    self.declare(
      slot.into(),
      DescriptorKind::InputAttachment,
      ty,
      None,
      Access::ReadOnly,
      Some(attachment_index),
    );
    token
  }

  /// Declare an array of `count` descriptors sharing one binding.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Dim2, PipelineLayout, SampledTexture};
  ///
  /// let mut layout = PipelineLayout::new();
  /// let materials = layout.binding_array::<SampledTexture<Dim2, f32>>(0, 16);
  /// assert_eq!(materials.count(), 16);
  /// ```
  pub fn binding_array<B>(&mut self, slot: impl Into<Slot>, count: u32) -> BindingArray<B>
  where
    B: Resource,
  {
    if count == 0 {
      self.errors.push(UsageError::NonPositiveArraySize {
        name: format!("binding array {}", self.bindings.len()),
      });
    }

    let access = match B::KIND {
      DescriptorKind::StorageBuffer | DescriptorKind::StorageImage | DescriptorKind::StorageTexelBuffer => {
        Access::ReadWrite
      }
      _ => Access::ReadOnly,
    };

    let index = self.declare(slot.into(), B::KIND, B::resource_ty(), Some(count), access, None);
    let ty = Type::Array(Box::new(B::resource_ty()), count);
    BindingArray::new(binding_expr(ty, self.id, InterfaceKind::Binding, index), count)
  }

  /// Declare a push constant; all push constants of a layout are packed in one block.
  pub fn push_constant<S>(&mut self) -> PushConstant<S>
  where
    S: ToType,
  {
    let index = self.push_constants.len() as u32;
    self.push_constants.push(S::ty());
    PushConstant::new(self.id, index)
  }

  /// Declare a vertex buffer, advancing at `rate`.
  pub fn vertex_buffer(&mut self, rate: InputRate) -> VertexBuffer {
    let index = self.vertex_buffers.len() as u32;
    self.vertex_buffers.push(rate);
    VertexBuffer { layout: self.id, index }
  }

  /// Declare a vertex attribute read from `buffer`, right after the previous attributes of the buffer.
  ///
  /// The format is given by a tuple of component tags; see [`vertex`](crate::vertex).
  pub fn vertex_attribute<F>(&mut self, buffer: &VertexBuffer) -> VertexAttribute<F::Value>
  where
    F: AttributeFormat,
  {
    if buffer.layout != self.id {
      self.errors.push(UsageError::UndeclaredBinding(format!(
        "vertex buffer {}",
        buffer.index
      )));
    }

    let index = self.attributes.len() as u32;
    self.attributes.push(AttributeDecl {
      buffer: buffer.index,
      format: F::format(),
      ty: <F::Value as ToType>::ty(),
    });

    VertexAttribute::new(self.id, index)
  }

  /// Declare a variable passed from a stage to the next one.
  ///
  /// Integer varyings read by fragment shaders are always flat.
  pub fn varying<T>(&mut self, interpolation: Interpolation, sampling: Sampling) -> Varying<T>
  where
    T: ToType,
  {
    self.add_varying::<T>(interpolation, sampling, false)
  }

  /// Declare a varying which may be computed with relaxed precision.
  pub fn varying_relaxed<T>(&mut self, interpolation: Interpolation, sampling: Sampling) -> Varying<T>
  where
    T: ToType,
  {
    self.add_varying::<T>(interpolation, sampling, true)
  }

  fn add_varying<T>(&mut self, interpolation: Interpolation, sampling: Sampling, relaxed: bool) -> Varying<T>
  where
    T: ToType,
  {
    let index = self.varyings.len() as u32;
    self.varyings.push(VaryingDecl {
      ty: T::ty(),
      interpolation,
      sampling,
      relaxed,
    });

    Varying::new(self.id, index)
  }

  /// Declare the next color attachment written by fragment shaders.
  pub fn color_output<T>(&mut self) -> ColorOutput<T>
  where
    T: ToType,
  {
    let index = self.color_outputs.len() as u32;
    self.color_outputs.push(T::ty());
    ColorOutput::new(self.id, index)
  }

  /// Assign binding numbers, push-constant offsets and locations.
  ///
  /// Per set, explicit bindings are reserved first; auto bindings then take the next free number, in declaration
  /// order.
  pub fn resolve(&self) -> Result<ResolvedLayout, CompileError> {
    if let Some(error) = self.errors.first() {
      return Err(error.clone().into());
    }

    let bindings = self.resolve_bindings()?;

    // push constants
    let mut push_constant_offsets = Vec::with_capacity(self.push_constants.len());
    let mut push_constant_size = 0u32;
    for ty in &self.push_constants {
      let (size, align) = size_align(ty, MemoryLayout::Std430);
      let offset = push_constant_size.div_ceil(align.max(1)) * align.max(1);
      push_constant_offsets.push(offset);
      push_constant_size = offset + size;
    }

    // vertex attributes: packed per buffer, locations in declaration order
    let mut strides = vec![0; self.vertex_buffers.len()];
    let mut attribute_offsets = Vec::with_capacity(self.attributes.len());
    let mut attribute_locations = Vec::with_capacity(self.attributes.len());
    let mut location = 0;
    for attr in &self.attributes {
      let offset = match strides.get_mut(attr.buffer as usize) {
        Some(stride) => {
          let offset = *stride;
          *stride += attr.format.size();
          offset
        }

        None => 0,
      };

      attribute_offsets.push(offset);
      attribute_locations.push(location);
      location += attr.format.locations();
    }

    let mut varying_locations = Vec::with_capacity(self.varyings.len());
    let mut location = 0;
    for varying in &self.varyings {
      varying_locations.push(location);
      location += locations(&varying.ty);
    }

    Ok(ResolvedLayout {
      bindings,
      push_constant_offsets,
      push_constant_size,
      strides,
      attribute_offsets,
      attribute_locations,
      attribute_location_count: self.attributes.iter().map(|a| a.format.locations()).sum(),
      varying_locations,
    })
  }

  fn resolve_bindings(&self) -> Result<Vec<(u32, u32)>, CompileError> {
    let mut taken: Vec<(u32, u32)> = Vec::new();

    for decl in &self.bindings {
      if let Some(binding) = decl.slot.binding {
        let pair = (decl.slot.set, binding);
        if taken.contains(&pair) {
          return Err(
            UsageError::DuplicateBinding {
              set: pair.0,
              binding: pair.1,
            }
            .into(),
          );
        }

        taken.push(pair);
      }
    }

    let mut resolved = Vec::with_capacity(self.bindings.len());
    let mut next = std::collections::HashMap::new();
    for decl in &self.bindings {
      let set = decl.slot.set;
      let binding = match decl.slot.binding {
        Some(binding) => binding,

        None => {
          let cursor = next.entry(set).or_insert(0u32);
          while taken.contains(&(set, *cursor)) {
            *cursor += 1;
          }

          let binding = *cursor;
          taken.push((set, binding));
          binding
        }
      };

      resolved.push((set, binding));
    }

    Ok(resolved)
  }

  pub(crate) fn color_output_ty(&self, index: u32) -> Option<&Type> {
    self.color_outputs.get(index as usize)
  }

  pub(crate) fn binding_decl(&self, index: u32) -> Option<&BindingDecl> {
    self.bindings.get(index as usize)
  }
}

/// Numbers assigned by [`PipelineLayout::resolve`].
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedLayout {
  bindings: Vec<(u32, u32)>,
  push_constant_offsets: Vec<u32>,
  push_constant_size: u32,
  strides: Vec<u32>,
  attribute_offsets: Vec<u32>,
  attribute_locations: Vec<u32>,
  attribute_location_count: u32,
  varying_locations: Vec<u32>,
}

impl ResolvedLayout {
  /// `(set, binding)` of the binding declared at `index`.
  pub fn binding(&self, index: u32) -> Option<(u32, u32)> {
    self.bindings.get(index as usize).copied()
  }

  pub fn push_constant_offset(&self, index: u32) -> Option<u32> {
    self.push_constant_offsets.get(index as usize).copied()
  }

  /// Size of the push-constant block.
  pub fn push_constant_size(&self) -> u32 {
    self.push_constant_size
  }

  /// Stride of the vertex buffer at `index`.
  pub fn stride(&self, index: u32) -> Option<u32> {
    self.strides.get(index as usize).copied()
  }

  pub fn attribute_offset(&self, index: u32) -> Option<u32> {
    self.attribute_offsets.get(index as usize).copied()
  }

  pub fn attribute_location(&self, index: u32) -> Option<u32> {
    self.attribute_locations.get(index as usize).copied()
  }

  /// Number of input locations the vertex attributes take.
  pub fn attribute_location_count(&self) -> u32 {
    self.attribute_location_count
  }

  pub fn varying_location(&self, index: u32) -> Option<u32> {
    self.varying_locations.get(index as usize).copied()
  }
}

/// Whether a varying of type `ty` must be flat when read by a fragment shader.
pub(crate) fn is_integer_varying(ty: &Type) -> bool {
  ty.uses_scalar(|s| s.is_integer() || s == ScalarType::Bool)
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    binding::Dim2,
    types::{V2, V3},
    vertex::{Float32, Unorm8},
  };

  #[test]
  fn auto_bindings_follow_declaration_order() {
    let mut layout = PipelineLayout::new();
    let _ = layout.uniform_buffer::<V4<f32>>(0);
    let _ = layout.storage_array::<u32>(0);
    let _ = layout.sampler(1);
    let _ = layout.texture::<Dim2, f32>(0);

    let resolved = layout.resolve().unwrap();
    assert_eq!(resolved.binding(0), Some((0, 0)));
    assert_eq!(resolved.binding(1), Some((0, 1)));
    assert_eq!(resolved.binding(2), Some((1, 0)));
    assert_eq!(resolved.binding(3), Some((0, 2)));
  }

  #[test]
  fn explicit_bindings_are_reserved_first() {
    let mut layout = PipelineLayout::new();
    let _ = layout.uniform_buffer::<f32>(0);
    let _ = layout.uniform_buffer::<f32>(0);
    let _ = layout.uniform_buffer::<f32>((0, 1));

    let resolved = layout.resolve().unwrap();
    assert_eq!(resolved.binding(0), Some((0, 0)));
    assert_eq!(resolved.binding(1), Some((0, 2)));
    assert_eq!(resolved.binding(2), Some((0, 1)));
  }

  #[test]
  fn duplicate_explicit_binding() {
    let mut layout = PipelineLayout::new();
    let _ = layout.uniform_buffer::<f32>((2, 3));
    let _ = layout.sampler((2, 3));

    assert_eq!(
      layout.resolve(),
      Err(CompileError::Usage(UsageError::DuplicateBinding { set: 2, binding: 3 }))
    );
  }

  #[test]
  fn push_constants_are_packed() {
    let mut layout = PipelineLayout::new();
    let _ = layout.push_constant::<f32>();
    let _ = layout.push_constant::<V3<f32>>();
    let _ = layout.push_constant::<u32>();

    let resolved = layout.resolve().unwrap();
    assert_eq!(resolved.push_constant_offset(0), Some(0));
    assert_eq!(resolved.push_constant_offset(1), Some(16));
    assert_eq!(resolved.push_constant_offset(2), Some(28));
    assert_eq!(resolved.push_constant_size(), 32);
  }

  #[test]
  fn vertex_attributes_are_packed_per_buffer() {
    let mut layout = PipelineLayout::new();
    let vertices = layout.vertex_buffer(InputRate::Vertex);
    let instances = layout.vertex_buffer(InputRate::Instance);
    let _ = layout.vertex_attribute::<(Float32, Float32, Float32)>(&vertices);
    let _ = layout.vertex_attribute::<(Unorm8, Unorm8, Unorm8, Unorm8)>(&vertices);
    let _ = layout.vertex_attribute::<(Float32, Float32)>(&instances);

    let resolved = layout.resolve().unwrap();
    assert_eq!(resolved.stride(0), Some(16));
    assert_eq!(resolved.stride(1), Some(8));
    assert_eq!(resolved.attribute_offset(1), Some(12));
    assert_eq!(resolved.attribute_offset(2), Some(0));
    assert_eq!(resolved.attribute_location(2), Some(2));
  }

  #[test]
  fn varying_locations() {
    let mut layout = PipelineLayout::new();
    let _ = layout.varying::<crate::types::M44>(Interpolation::Smooth, Sampling::Center);
    let _ = layout.varying::<V2<f32>>(Interpolation::Flat, Sampling::Center);

    let resolved = layout.resolve().unwrap();
    assert_eq!(resolved.varying_location(0), Some(0));
    assert_eq!(resolved.varying_location(1), Some(4));
  }

  #[test]
  fn empty_binding_array() {
    let mut layout = PipelineLayout::new();
    let _ = layout.binding_array::<Sampler>(0, 0);

    assert!(matches!(
      layout.resolve(),
      Err(CompileError::Usage(UsageError::NonPositiveArraySize { .. }))
    ));
  }

  #[test]
  fn layouts_have_distinct_ids() {
    assert_ne!(PipelineLayout::new().id(), PipelineLayout::new().id());
  }
}
