//! Vertex input: component tags, attribute formats and input rates.
//!
//! The format of a vertex attribute is derived from the tags of its components, not from their width only:
//! `(Unorm8, Unorm8, Unorm8, Unorm8)` is four bytes read as normalized floats (`R8G8B8A8_UNORM`), while
//! `(Uint8, Uint8, Uint8, Uint8)` is four bytes read as integers (`R8G8B8A8_UINT`).

use std::{fmt, ops::Deref};

use crate::{
  expr::{ErasedExpr, Expr},
  scope::{InterfaceHandle, InterfaceKind, ScopedHandle},
  types::{Scalar, ToType, V2, V3, V4},
};

/// Encoding of a vertex attribute component in memory.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ComponentFormat {
  Unorm8,
  Snorm8,
  Uscaled8,
  Sscaled8,
  Uint8,
  Sint8,
  Unorm16,
  Snorm16,
  Uscaled16,
  Sscaled16,
  Uint16,
  Sint16,
  Float16,
  Uint32,
  Sint32,
  Float32,
  Float64,
}

impl ComponentFormat {
  /// Size in bytes.
  pub const fn size(self) -> u32 {
    match self {
      ComponentFormat::Unorm8
      | ComponentFormat::Snorm8
      | ComponentFormat::Uscaled8
      | ComponentFormat::Sscaled8
      | ComponentFormat::Uint8
      | ComponentFormat::Sint8 => 1,

      ComponentFormat::Unorm16
      | ComponentFormat::Snorm16
      | ComponentFormat::Uscaled16
      | ComponentFormat::Sscaled16
      | ComponentFormat::Uint16
      | ComponentFormat::Sint16
      | ComponentFormat::Float16 => 2,

      ComponentFormat::Uint32 | ComponentFormat::Sint32 | ComponentFormat::Float32 => 4,

      ComponentFormat::Float64 => 8,
    }
  }

  fn suffix(self) -> &'static str {
    match self {
      ComponentFormat::Unorm8 | ComponentFormat::Unorm16 => "UNORM",
      ComponentFormat::Snorm8 | ComponentFormat::Snorm16 => "SNORM",
      ComponentFormat::Uscaled8 | ComponentFormat::Uscaled16 => "USCALED",
      ComponentFormat::Sscaled8 | ComponentFormat::Sscaled16 => "SSCALED",
      ComponentFormat::Uint8 | ComponentFormat::Uint16 | ComponentFormat::Uint32 => "UINT",
      ComponentFormat::Sint8 | ComponentFormat::Sint16 | ComponentFormat::Sint32 => "SINT",
      ComponentFormat::Float16 | ComponentFormat::Float32 | ComponentFormat::Float64 => "SFLOAT",
    }
  }

  // rank of the encoding in the Vulkan format enumeration, within a family of same-width formats
  fn rank(self) -> u32 {
    match self {
      ComponentFormat::Unorm8 | ComponentFormat::Unorm16 => 0,
      ComponentFormat::Snorm8 | ComponentFormat::Snorm16 => 1,
      ComponentFormat::Uscaled8 | ComponentFormat::Uscaled16 => 2,
      ComponentFormat::Sscaled8 | ComponentFormat::Sscaled16 => 3,
      ComponentFormat::Uint8 | ComponentFormat::Uint16 => 4,
      ComponentFormat::Sint8 | ComponentFormat::Sint16 => 5,
      ComponentFormat::Float16 => 6,
      ComponentFormat::Uint32 => 0,
      ComponentFormat::Sint32 => 1,
      ComponentFormat::Float32 | ComponentFormat::Float64 => 2,
    }
  }
}

/// Format of a vertex attribute: `count` components encoded as `component`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct VertexFormat {
  pub component: ComponentFormat,
  pub count: u32,
}

impl VertexFormat {
  /// Size of an attribute in bytes.
  pub const fn size(&self) -> u32 {
    self.component.size() * self.count
  }

  /// Number of input locations the attribute consumes.
  pub fn locations(&self) -> u32 {
    if self.component == ComponentFormat::Float64 && self.count > 2 {
      2
    } else {
      1
    }
  }

  /// Numeric value of the matching `VkFormat`.
  pub fn vk_format(&self) -> u32 {
    let n = self.count.clamp(1, 4) as usize;
    let base = match self.component.size() {
      1 => [9, 16, 23, 37][n - 1],
      2 => [70, 77, 84, 91][n - 1],
      4 => [98, 101, 104, 107][n - 1],
      _ => [110, 113, 116, 119][n - 1],
    };

    base + self.component.rank()
  }
}

impl fmt::Display for VertexFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let bits = self.component.size() * 8;
    for channel in ["R", "G", "B", "A"].iter().take(self.count as usize) {
      write!(f, "{}{}", channel, bits)?;
    }

    write!(f, "_{}", self.component.suffix())
  }
}

/// Component tag of a vertex attribute.
pub trait Component {
  /// Scalar type the component is read as in shaders.
  type Value: Scalar;

  const FORMAT: ComponentFormat;
}

macro_rules! make_component {
  ($($(#[$doc:meta])* $tag:ident => $value:ty),* $(,)?) => {
    $(
      $(#[$doc])*
      #[derive(Clone, Copy, Debug)]
      pub struct $tag;

      impl Component for $tag {
        type Value = $value;

        const FORMAT: ComponentFormat = ComponentFormat::$tag;
      }
    )*
  };
}

make_component! {
  /// Unsigned byte normalized to `[0, 1]`.
  Unorm8 => f32,
  /// Signed byte normalized to `[-1, 1]`.
  Snorm8 => f32,
  /// Unsigned byte converted to float.
  Uscaled8 => f32,
  /// Signed byte converted to float.
  Sscaled8 => f32,
  Uint8 => u32,
  Sint8 => i32,
  Unorm16 => f32,
  Snorm16 => f32,
  Uscaled16 => f32,
  Sscaled16 => f32,
  Uint16 => u32,
  Sint16 => i32,
  /// Half-precision float.
  Float16 => f32,
  Uint32 => u32,
  Sint32 => i32,
  Float32 => f32,
  Float64 => f64,
}

/// Tuples of component tags usable as vertex attributes.
pub trait AttributeFormat {
  /// Type of the attribute in shaders.
  type Value: ToType;

  fn format() -> VertexFormat;
}

impl<C> AttributeFormat for C
where
  C: Component,
{
  type Value = C::Value;

  fn format() -> VertexFormat {
    VertexFormat {
      component: C::FORMAT,
      count: 1,
    }
  }
}

macro_rules! impl_AttributeFormat_tuple {
  ($v:ident, $n:expr, $($c:ident),*) => {
    impl<C> AttributeFormat for ($($c),*)
    where
      C: Component,
      $v<C::Value>: ToType,
    {
      type Value = $v<C::Value>;

      fn format() -> VertexFormat {
        VertexFormat {
          component: C::FORMAT,
          count: $n,
        }
      }
    }
  };
}

impl_AttributeFormat_tuple!(V2, 2, C, C);
impl_AttributeFormat_tuple!(V3, 3, C, C, C);
impl_AttributeFormat_tuple!(V4, 4, C, C, C, C);

/// Whether a vertex buffer advances per vertex or per instance.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InputRate {
  Vertex,
  Instance,
}

/// Vertex buffer declared in a [`PipelineLayout`](crate::layout::PipelineLayout).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct VertexBuffer {
  pub(crate) layout: u32,
  pub(crate) index: u32,
}

impl VertexBuffer {
  /// Binding index of the buffer.
  pub fn binding(&self) -> u32 {
    self.index
  }
}

/// Vertex attribute, read by vertex shaders.
#[derive(Debug)]
pub struct VertexAttribute<T> {
  expr: Expr<T>,
}

impl<T> VertexAttribute<T>
where
  T: ToType,
{
  pub(crate) fn new(layout: u32, index: u32) -> Self {
    let handle = InterfaceHandle {
      layout,
      kind: InterfaceKind::Attribute,
      index,
    };

    Self {
      expr: Expr::from_erased(ErasedExpr::var(T::ty(), ScopedHandle::Interface(handle))),
    }
  }

  pub fn to_expr(&self) -> Expr<T> {
    self.expr.clone()
  }
}

impl<T> Deref for VertexAttribute<T> {
  type Target = Expr<T>;

  fn deref(&self) -> &Self::Target {
    &self.expr
  }
}

impl<'a, T> From<&'a VertexAttribute<T>> for Expr<T> {
  fn from(attr: &'a VertexAttribute<T>) -> Self {
    attr.expr.clone()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn formats_from_tags() {
    let rgba8 = <(Unorm8, Unorm8, Unorm8, Unorm8)>::format();
    assert_eq!(rgba8.to_string(), "R8G8B8A8_UNORM");
    assert_eq!(rgba8.vk_format(), 37);
    assert_eq!(rgba8.size(), 4);

    assert_eq!(<(Uint8, Uint8, Uint8, Uint8)>::format().vk_format(), 41);
    assert_eq!(<(Float32, Float32, Float32)>::format().vk_format(), 106);
    assert_eq!(<(Float32, Float32, Float32)>::format().to_string(), "R32G32B32_SFLOAT");
    assert_eq!(<Float16>::format().vk_format(), 76);
    assert_eq!(<(Sint16, Sint16)>::format().vk_format(), 82);
    assert_eq!(<(Float64, Float64, Float64, Float64)>::format().vk_format(), 121);
  }

  #[test]
  fn double_vectors_take_two_locations() {
    assert_eq!(<(Float64, Float64)>::format().locations(), 1);
    assert_eq!(<(Float64, Float64, Float64)>::format().locations(), 2);
    assert_eq!(<(Float32, Float32, Float32, Float32)>::format().locations(), 1);
  }

  #[test]
  fn shader_types_of_tags() {
    assert_eq!(<<(Snorm16, Snorm16) as AttributeFormat>::Value as ToType>::ty(), V2::<f32>::ty());
    assert_eq!(<<Sint8 as AttributeFormat>::Value as ToType>::ty(), i32::ty());
  }
}
