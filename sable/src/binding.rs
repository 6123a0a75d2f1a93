//! Resource tokens: buffers, texel buffers, images, samplers and push constants.
//!
//! Tokens are returned by a [`PipelineLayout`](crate::layout::PipelineLayout) and captured by the closures building the
//! stages. They carry the identity of their layout, so that compiling a stage against another layout fails with
//! [`UsageError::UndeclaredBinding`](crate::error::UsageError::UndeclaredBinding).

use std::{marker::PhantomData, ops::Deref};

use crate::{
  expr::{ArrayIndex, ErasedExpr, Expr, ExprNode},
  fun::{ErasedFunHandle, Return},
  reflect::DescriptorKind,
  scope::{InterfaceHandle, InterfaceKind, Scope, ScopeInstr, ScopedHandle},
  types::{ImageClass, ImageDim, ImageType, ScalarType, ToType, Type, V2, V3, V4},
  var::Var,
};

/// How shaders may access a binding.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Access {
  ReadOnly,
  WriteOnly,
  #[default]
  ReadWrite,
}

impl Access {
  pub fn can_read(self) -> bool {
    !matches!(self, Access::WriteOnly)
  }

  pub fn can_write(self) -> bool {
    !matches!(self, Access::ReadOnly)
  }

  pub(crate) fn name(self) -> &'static str {
    match self {
      Access::ReadOnly => "read-only",
      Access::WriteOnly => "write-only",
      Access::ReadWrite => "read-write",
    }
  }
}

pub(crate) fn binding_expr(ty: Type, layout: u32, kind: InterfaceKind, index: u32) -> ErasedExpr {
  ErasedExpr::var(ty, ScopedHandle::Interface(InterfaceHandle { layout, kind, index }))
}

/// Dimensionality of an image.
pub trait Dimension {
  const DIM: ImageDim;
  const ARRAYED: bool;

  /// Normalized coordinates used to sample the image.
  type Coord: ToType;

  /// Integer coordinates of a texel.
  type Texel: ToType;

  /// Size of the image, as returned by size queries.
  type Size: ToType;
}

macro_rules! make_dim {
  ($(#[$doc:meta])* $name:ident, $dim:ident, $arrayed:expr, $coord:ty, $texel:ty, $size:ty) => {
    $(#[$doc])*
    #[derive(Clone, Copy, Debug)]
    pub struct $name;

    impl Dimension for $name {
      const DIM: ImageDim = ImageDim::$dim;
      const ARRAYED: bool = $arrayed;

      type Coord = $coord;
      type Texel = $texel;
      type Size = $size;
    }
  };
}

make_dim!(Dim1, D1, false, f32, i32, i32);
make_dim!(Dim2, D2, false, V2<f32>, V2<i32>, V2<i32>);
make_dim!(Dim3, D3, false, V3<f32>, V3<i32>, V3<i32>);
make_dim!(
  /// Cube map; sampled with a direction.
  DimCube, Cube, false, V3<f32>, V3<i32>, V2<i32>
);
make_dim!(
  /// Array of 2D layers; the last coordinate is the layer.
  Dim2Array, D2, true, V3<f32>, V3<i32>, V3<i32>
);

/// Scalar type of the texels of an image: `f32`, `i32` or `u32`.
pub trait TexelScalar: ToType {
  const SCALAR: ScalarType;
}

impl TexelScalar for f32 {
  const SCALAR: ScalarType = ScalarType::Float;
}

impl TexelScalar for i32 {
  const SCALAR: ScalarType = ScalarType::Int;
}

impl TexelScalar for u32 {
  const SCALAR: ScalarType = ScalarType::UInt;
}

pub(crate) fn image_type<D, T>(class: ImageClass) -> ImageType
where
  D: Dimension,
  T: TexelScalar,
{
  ImageType {
    dim: D::DIM,
    sampled_type: T::SCALAR,
    arrayed: D::ARRAYED,
    multisampled: false,
    class,
  }
}

fn buffer_image_type<T>(class: ImageClass) -> ImageType
where
  T: TexelScalar,
{
  ImageType {
    dim: ImageDim::Buffer,
    sampled_type: T::SCALAR,
    arrayed: false,
    multisampled: false,
    class,
  }
}

fn image_call<T>(f: ErasedFunHandle, args: Vec<ErasedExpr>) -> Expr<T>
where
  T: ToType,
{
  Expr::new(ExprNode::FunCall(f, args))
}

/// Descriptor-backed resources, which can be gathered in a [`BindingArray`].
pub trait Resource: Sized {
  const KIND: DescriptorKind;

  /// Type of one descriptor of this resource.
  fn resource_ty() -> Type;

  #[doc(hidden)]
  fn from_erased(erased: ErasedExpr) -> Self;
}

/// Uniform buffer, read-only.
///
/// Dereferences to the content of the buffer; fields of struct contents are read with
/// [`Expr::field`](crate::expr::Expr::field).
#[derive(Debug)]
pub struct UniformBuffer<S> {
  expr: Expr<S>,
}

impl<S> Deref for UniformBuffer<S> {
  type Target = Expr<S>;

  fn deref(&self) -> &Self::Target {
    &self.expr
  }
}

impl<S> Resource for UniformBuffer<S>
where
  S: ToType,
{
  const KIND: DescriptorKind = DescriptorKind::UniformBuffer;

  fn resource_ty() -> Type {
    S::ty()
  }

  fn from_erased(erased: ErasedExpr) -> Self {
    Self {
      expr: Expr::from_erased(erased),
    }
  }
}

/// Storage buffer.
///
/// Dereferences to the content of the buffer as a variable; what can be read and written depends on the
/// [`Access`] it was declared with.
#[derive(Debug)]
pub struct StorageBuffer<S> {
  var: Var<S>,
}

impl<S> Deref for StorageBuffer<S> {
  type Target = Var<S>;

  fn deref(&self) -> &Self::Target {
    &self.var
  }
}

impl<S> Resource for StorageBuffer<S>
where
  S: ToType,
{
  const KIND: DescriptorKind = DescriptorKind::StorageBuffer;

  fn resource_ty() -> Type {
    S::ty()
  }

  fn from_erased(erased: ErasedExpr) -> Self {
    Self {
      var: Var::from_erased(erased),
    }
  }
}

/// Storage buffer holding a runtime-sized array of `T`.
///
/// # Examples
///
/// ```
/// use sable::{Conditional as _, HasX as _, PipelineLayout, Scope, StageBuilder};
///
/// let mut layout = PipelineLayout::new();
/// let data = layout.storage_array::<u32>(0);
///
/// let stage = StageBuilder::new_compute_shader([64, 1, 1], |mut s, input| {
///   s.main_fun(|s: &mut Scope<()>| {
///     let i = input.global_invocation_id.x();
///     s.when(i.lt(data.length()), |s| {
///       s.set(data.at(&i), data.at(&i) + 1u32);
///     });
///   })
/// });
/// ```
#[derive(Debug)]
pub struct StorageArray<T> {
  var: Var<[T]>,
}

impl<T> StorageArray<T>
where
  T: ToType,
{
  /// Element at `index`; the element is assignable.
  pub fn at(&self, index: impl ArrayIndex) -> Var<T> {
    self.var.at(index)
  }

  /// Number of elements of the array, as given by the size of the bound buffer.
  pub fn length(&self) -> Expr<u32> {
    self.var.length()
  }

  /// The whole array as a variable.
  pub fn as_var(&self) -> &Var<[T]> {
    &self.var
  }
}

impl<T> Resource for StorageArray<T>
where
  T: ToType,
{
  const KIND: DescriptorKind = DescriptorKind::StorageBuffer;

  fn resource_ty() -> Type {
    Type::RuntimeArray(Box::new(T::ty()))
  }

  fn from_erased(erased: ErasedExpr) -> Self {
    Self {
      var: Var::from_erased(erased),
    }
  }
}

impl<T> Expr<[T]>
where
  T: ToType,
{
  /// Number of elements of a runtime-sized array.
  ///
  /// Only the arrays ending a storage buffer are runtime-sized.
  pub fn length(&self) -> Expr<u32> {
    Expr::new(ExprNode::ArrayLength(self.erased.clone()))
  }
}

/// Read-only buffer of formatted texels.
#[derive(Debug)]
pub struct UniformTexelBuffer<T> {
  erased: ErasedExpr,
  _phantom: PhantomData<T>,
}

impl<T> UniformTexelBuffer<T>
where
  T: TexelScalar,
  V4<T>: ToType,
{
  /// Texel at `index`.
  pub fn fetch(&self, index: impl Into<Expr<i32>>) -> Expr<V4<T>> {
    image_call(ErasedFunHandle::ImageFetch, vec![self.erased.clone(), index.into().erased])
  }

  /// Number of texels.
  pub fn size(&self) -> Expr<i32> {
    image_call(ErasedFunHandle::ImageSize, vec![self.erased.clone()])
  }
}

impl<T> Resource for UniformTexelBuffer<T>
where
  T: TexelScalar,
{
  const KIND: DescriptorKind = DescriptorKind::UniformTexelBuffer;

  fn resource_ty() -> Type {
    Type::Image(buffer_image_type::<T>(ImageClass::Sampled))
  }

  fn from_erased(erased: ErasedExpr) -> Self {
    Self {
      erased,
      _phantom: PhantomData,
    }
  }
}

/// Buffer of formatted texels, read and written by shaders.
#[derive(Debug)]
pub struct StorageTexelBuffer<T> {
  erased: ErasedExpr,
  format: spirv::ImageFormat,
  _phantom: PhantomData<T>,
}

impl<T> StorageTexelBuffer<T>
where
  T: TexelScalar,
  V4<T>: ToType,
{
  pub(crate) fn new(erased: ErasedExpr, format: spirv::ImageFormat) -> Self {
    Self {
      erased,
      format,
      _phantom: PhantomData,
    }
  }

  /// Texel at `index`.
  pub fn load(&self, index: impl Into<Expr<i32>>) -> Expr<V4<T>> {
    image_call(ErasedFunHandle::ImageRead, vec![self.erased.clone(), index.into().erased])
  }

  /// Number of texels.
  pub fn size(&self) -> Expr<i32> {
    image_call(ErasedFunHandle::ImageSize, vec![self.erased.clone()])
  }

  pub fn format(&self) -> spirv::ImageFormat {
    self.format
  }
}

/// Image read through a [`Sampler`].
#[derive(Debug)]
pub struct Texture<D, T> {
  erased: ErasedExpr,
  _phantom: PhantomData<(D, T)>,
}

impl<D, T> Texture<D, T>
where
  D: Dimension,
  T: TexelScalar,
  V4<T>: ToType,
{
  /// Filtered texel at `coord`, with implicit level of detail; only available in fragment shaders.
  pub fn sample(&self, sampler: &Sampler, coord: impl Into<Expr<D::Coord>>) -> Expr<V4<T>> {
    image_call(
      ErasedFunHandle::ImageSample,
      vec![self.erased.clone(), sampler.erased.clone(), coord.into().erased],
    )
  }

  /// Filtered texel at `coord`, in the mipmap level `lod`.
  pub fn sample_lod(
    &self,
    sampler: &Sampler,
    coord: impl Into<Expr<D::Coord>>,
    lod: impl Into<Expr<f32>>,
  ) -> Expr<V4<T>> {
    image_call(
      ErasedFunHandle::ImageSampleLod,
      vec![
        self.erased.clone(),
        sampler.erased.clone(),
        coord.into().erased,
        lod.into().erased,
      ],
    )
  }

  /// Unfiltered texel at integer coordinates, in the mipmap level `lod`.
  pub fn fetch(&self, coord: impl Into<Expr<D::Texel>>, lod: impl Into<Expr<i32>>) -> Expr<V4<T>> {
    image_call(
      ErasedFunHandle::ImageFetch,
      vec![self.erased.clone(), coord.into().erased, lod.into().erased],
    )
  }

  /// Size of the mipmap level `lod`.
  pub fn size(&self, lod: impl Into<Expr<i32>>) -> Expr<D::Size> {
    image_call(ErasedFunHandle::ImageSize, vec![self.erased.clone(), lod.into().erased])
  }
}

impl<D, T> Resource for Texture<D, T>
where
  D: Dimension,
  T: TexelScalar,
{
  const KIND: DescriptorKind = DescriptorKind::SampledImage;

  fn resource_ty() -> Type {
    Type::Image(image_type::<D, T>(ImageClass::Sampled))
  }

  fn from_erased(erased: ErasedExpr) -> Self {
    Self {
      erased,
      _phantom: PhantomData,
    }
  }
}

/// Image combined with its sampler in a single descriptor.
#[derive(Debug)]
pub struct SampledTexture<D, T> {
  erased: ErasedExpr,
  _phantom: PhantomData<(D, T)>,
}

impl<D, T> SampledTexture<D, T>
where
  D: Dimension,
  T: TexelScalar,
  V4<T>: ToType,
{
  /// Filtered texel at `coord`, with implicit level of detail; only available in fragment shaders.
  pub fn sample(&self, coord: impl Into<Expr<D::Coord>>) -> Expr<V4<T>> {
    image_call(
      ErasedFunHandle::ImageSample,
      vec![self.erased.clone(), coord.into().erased],
    )
  }

  pub fn sample_lod(&self, coord: impl Into<Expr<D::Coord>>, lod: impl Into<Expr<f32>>) -> Expr<V4<T>> {
    image_call(
      ErasedFunHandle::ImageSampleLod,
      vec![self.erased.clone(), coord.into().erased, lod.into().erased],
    )
  }

  pub fn fetch(&self, coord: impl Into<Expr<D::Texel>>, lod: impl Into<Expr<i32>>) -> Expr<V4<T>> {
    image_call(
      ErasedFunHandle::ImageFetch,
      vec![self.erased.clone(), coord.into().erased, lod.into().erased],
    )
  }

  pub fn size(&self, lod: impl Into<Expr<i32>>) -> Expr<D::Size> {
    image_call(ErasedFunHandle::ImageSize, vec![self.erased.clone(), lod.into().erased])
  }
}

impl<D, T> Resource for SampledTexture<D, T>
where
  D: Dimension,
  T: TexelScalar,
{
  const KIND: DescriptorKind = DescriptorKind::CombinedImageSampler;

  fn resource_ty() -> Type {
    Type::SampledImage(image_type::<D, T>(ImageClass::Sampled))
  }

  fn from_erased(erased: ErasedExpr) -> Self {
    Self {
      erased,
      _phantom: PhantomData,
    }
  }
}

/// Sampler state, combined with a [`Texture`] when sampling it.
#[derive(Debug)]
pub struct Sampler {
  erased: ErasedExpr,
}

impl Resource for Sampler {
  const KIND: DescriptorKind = DescriptorKind::Sampler;

  fn resource_ty() -> Type {
    Type::Sampler
  }

  fn from_erased(erased: ErasedExpr) -> Self {
    Self { erased }
  }
}

/// Image read and written texel by texel.
///
/// Texels are written with [`Scope::image_write`].
#[derive(Debug)]
pub struct StorageImage<D, T> {
  erased: ErasedExpr,
  format: spirv::ImageFormat,
  _phantom: PhantomData<(D, T)>,
}

impl<D, T> StorageImage<D, T>
where
  D: Dimension,
  T: TexelScalar,
  V4<T>: ToType,
{
  pub(crate) fn new(erased: ErasedExpr, format: spirv::ImageFormat) -> Self {
    Self {
      erased,
      format,
      _phantom: PhantomData,
    }
  }

  /// Texel at `coord`.
  pub fn load(&self, coord: impl Into<Expr<D::Texel>>) -> Expr<V4<T>> {
    image_call(ErasedFunHandle::ImageRead, vec![self.erased.clone(), coord.into().erased])
  }

  pub fn size(&self) -> Expr<D::Size> {
    image_call(ErasedFunHandle::ImageSize, vec![self.erased.clone()])
  }

  pub fn format(&self) -> spirv::ImageFormat {
    self.format
  }
}

/// Attachment written by a previous subpass, read at the location of the current fragment.
#[derive(Debug)]
pub struct InputAttachment<T> {
  erased: ErasedExpr,
  _phantom: PhantomData<T>,
}

impl<T> InputAttachment<T>
where
  T: TexelScalar,
  V4<T>: ToType,
{
  pub(crate) fn new(erased: ErasedExpr) -> Self {
    Self {
      erased,
      _phantom: PhantomData,
    }
  }

  /// Value of the attachment for the current fragment.
  pub fn read(&self) -> Expr<V4<T>> {
    let origin = Expr::<V2<i32>>::from(V2([0, 0]));
    image_call(ErasedFunHandle::ImageRead, vec![self.erased.clone(), origin.erased])
  }
}

/// Images which texels can be written with [`Scope::image_write`].
pub trait WritableImage {
  type Coord: ToType;
  type Texel: ToType;

  #[doc(hidden)]
  fn image(&self) -> &ErasedExpr;
}

impl<D, T> WritableImage for StorageImage<D, T>
where
  D: Dimension,
  T: TexelScalar,
  V4<T>: ToType,
{
  type Coord = D::Texel;
  type Texel = V4<T>;

  fn image(&self) -> &ErasedExpr {
    &self.erased
  }
}

impl<T> WritableImage for StorageTexelBuffer<T>
where
  T: TexelScalar,
  V4<T>: ToType,
{
  type Coord = i32;
  type Texel = V4<T>;

  fn image(&self) -> &ErasedExpr {
    &self.erased
  }
}

impl<R> Scope<R>
where
  Return: From<R>,
{
  /// Write a texel of a storage image or a storage texel buffer.
  ///
  /// # Examples
  ///
  /// ```
  /// use sable::{Dim2, HasX as _, HasY as _, PipelineLayout, Scope, StageBuilder, ImageFormat, Access, vec4};
  ///
  /// let mut layout = PipelineLayout::new();
  /// let target = layout.storage_image::<Dim2, f32>(0, ImageFormat::Rgba32f, Access::WriteOnly);
  ///
  /// let stage = StageBuilder::new_compute_shader([8, 8, 1], |mut s, input| {
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     let id = input.global_invocation_id.cast::<sable::V3<i32>>();
  ///     s.image_write(&target, sable::vec2!(id.x(), id.y()), vec4!(1., 0., 0., 1.));
  ///   })
  /// });
  /// ```
  pub fn image_write<I>(
    &mut self,
    image: &I,
    coordinate: impl Into<Expr<I::Coord>>,
    texel: impl Into<Expr<I::Texel>>,
  ) where
    I: WritableImage,
  {
    self.erased.push(ScopeInstr::ImageWrite {
      image: image.image().clone(),
      coordinate: coordinate.into().erased,
      texel: texel.into().erased,
    });
  }
}

/// Push constant, read-only.
#[derive(Debug)]
pub struct PushConstant<S> {
  expr: Expr<S>,
}

impl<S> PushConstant<S>
where
  S: ToType,
{
  pub(crate) fn new(layout: u32, index: u32) -> Self {
    Self {
      expr: Expr::from_erased(binding_expr(S::ty(), layout, InterfaceKind::PushConstant, index)),
    }
  }
}

impl<S> Deref for PushConstant<S> {
  type Target = Expr<S>;

  fn deref(&self) -> &Self::Target {
    &self.expr
  }
}

/// Fixed-size array of descriptors of the same kind, sharing one binding.
///
/// Indexing with a non-literal index requires dynamic indexing support from the device; the matching capability is
/// declared by the module and reported in its descriptor table.
#[derive(Debug)]
pub struct BindingArray<B> {
  erased: ErasedExpr,
  count: u32,
  _phantom: PhantomData<B>,
}

impl<B> BindingArray<B>
where
  B: Resource,
{
  pub(crate) fn new(erased: ErasedExpr, count: u32) -> Self {
    Self {
      erased,
      count,
      _phantom: PhantomData,
    }
  }

  /// Resource at `index`.
  pub fn at(&self, index: impl ArrayIndex) -> B {
    B::from_erased(ErasedExpr::new(
      B::resource_ty(),
      ExprNode::ArrayLookup {
        object: self.erased.clone(),
        index: index.into_index(),
      },
    ))
  }

  pub fn count(&self) -> u32 {
    self.count
  }
}

/// Build the token of a binding declared at `index` of layout `layout`.
pub(crate) fn resource<B>(layout: u32, index: u32) -> B
where
  B: Resource,
{
  B::from_erased(binding_expr(B::resource_ty(), layout, InterfaceKind::Binding, index))
}

/// Tokens which are not [`Resource`]s because they carry their format.
pub(crate) fn storage_image<D, T>(layout: u32, index: u32, format: spirv::ImageFormat) -> StorageImage<D, T>
where
  D: Dimension,
  T: TexelScalar,
  V4<T>: ToType,
{
  let ty = Type::Image(image_type::<D, T>(ImageClass::Storage(format)));
  StorageImage::new(binding_expr(ty, layout, InterfaceKind::Binding, index), format)
}

pub(crate) fn storage_texel_buffer<T>(layout: u32, index: u32, format: spirv::ImageFormat) -> StorageTexelBuffer<T>
where
  T: TexelScalar,
  V4<T>: ToType,
{
  let ty = Type::Image(buffer_image_type::<T>(ImageClass::Storage(format)));
  StorageTexelBuffer::new(binding_expr(ty, layout, InterfaceKind::Binding, index), format)
}

pub(crate) fn input_attachment<T>(layout: u32, index: u32) -> InputAttachment<T>
where
  T: TexelScalar,
  V4<T>: ToType,
{
  InputAttachment::new(binding_expr(input_attachment_ty::<T>(), layout, InterfaceKind::Binding, index))
}

pub(crate) fn input_attachment_ty<T>() -> Type
where
  T: TexelScalar,
{
  Type::Image(ImageType {
    dim: ImageDim::SubpassData,
    sampled_type: T::SCALAR,
    arrayed: false,
    multisampled: false,
    class: ImageClass::Attachment,
  })
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::expr::Literal;

  #[test]
  fn texture_sampling_records_image_calls() {
    let texture = resource::<Texture<Dim2, f32>>(0, 0);
    let sampler = resource::<Sampler>(0, 1);
    let texel = texture.sample(&sampler, V2([0.5, 0.5]));

    match texel.erased().node() {
      ExprNode::FunCall(ErasedFunHandle::ImageSample, args) => {
        assert_eq!(args.len(), 3);
        assert!(matches!(args[0].ty(), Type::Image(img) if img.dim == ImageDim::D2));
        assert_eq!(args[1].ty(), &Type::Sampler);
      }
      node => panic!("unexpected node {:?}", node),
    }

    assert_eq!(texel.erased().ty(), &V4::<f32>::ty());
  }

  #[test]
  fn binding_array_elements_keep_the_resource_type() {
    let textures = BindingArray::<SampledTexture<Dim2, f32>>::new(
      binding_expr(
        Type::Array(Box::new(SampledTexture::<Dim2, f32>::resource_ty()), 4),
        0,
        InterfaceKind::Binding,
        0,
      ),
      4,
    );

    let third = textures.at(2);
    assert_eq!(third.erased.ty(), &SampledTexture::<Dim2, f32>::resource_ty());
    match third.erased.node() {
      ExprNode::ArrayLookup { index, .. } => assert_eq!(index.as_literal(), Some(Literal::Int(2))),
      node => panic!("unexpected node {:?}", node),
    }
  }

  #[test]
  fn image_write_is_a_statement() {
    let image = storage_image::<Dim2, u32>(0, 0, spirv::ImageFormat::R32ui);
    let mut scope = Scope::<()>::new(0);
    scope.image_write(&image, V2([1, 2]), V4([7u32, 0, 0, 0]));

    assert!(matches!(scope.erased.instructions[..], [ScopeInstr::ImageWrite { .. }]));
  }

  #[test]
  fn access_modes() {
    assert!(Access::ReadOnly.can_read() && !Access::ReadOnly.can_write());
    assert!(!Access::WriteOnly.can_read() && Access::WriteOnly.can_write());
    assert!(Access::ReadWrite.can_read() && Access::ReadWrite.can_write());
  }
}
