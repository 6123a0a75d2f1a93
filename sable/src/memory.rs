//! Explicit memory layouts of buffer contents.
//!
//! Uniform buffers use the std140 rules, storage buffers and push constants the std430 rules. Booleans have no
//! defined representation in buffers and are stored as 32-bit unsigned integers.

use crate::types::{ScalarType, StructType, Type};

/// Layout rules of a block of memory.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MemoryLayout {
  /// Function and workgroup memory: no explicit offsets nor strides.
  Logical,
  Std140,
  Std430,
}

impl MemoryLayout {
  pub fn is_explicit(self) -> bool {
    !matches!(self, MemoryLayout::Logical)
  }
}

fn round_up(value: u32, align: u32) -> u32 {
  if align == 0 {
    value
  } else {
    value.div_ceil(align) * align
  }
}

fn scalar_size(s: ScalarType) -> u32 {
  // booleans are stored as u32
  s.size()
}

/// Size and alignment of `ty` under `layout`, in bytes.
pub fn size_align(ty: &Type, layout: MemoryLayout) -> (u32, u32) {
  match ty {
    Type::Scalar(s) => (scalar_size(*s), scalar_size(*s)),

    Type::Vector(s, n) => {
      let size = scalar_size(*s);
      let align = if *n == 2 { 2 * size } else { 4 * size };
      (n * size, align)
    }

    Type::Matrix { columns, .. } => {
      // a matrix is laid out as an array of its columns
      let stride = matrix_stride(ty, layout).unwrap_or(0);
      (stride * columns, stride)
    }

    Type::Array(elem, n) => {
      let stride = array_stride(elem, layout);
      let (_, align) = size_align(elem, layout);
      let align = if layout == MemoryLayout::Std140 { round_up(align, 16) } else { align };
      (stride * n, align)
    }

    Type::RuntimeArray(elem) => {
      let (_, align) = size_align(elem, layout);
      let align = if layout == MemoryLayout::Std140 { round_up(align, 16) } else { align };
      (0, align)
    }

    Type::Struct(st) => {
      let offsets = struct_offsets(st, layout);
      let align = struct_align(st, layout);
      let end = st
        .fields
        .iter()
        .zip(&offsets)
        .map(|(f, offset)| offset + size_align(&f.ty, layout).0)
        .max()
        .unwrap_or(0);
      (round_up(end, align), align)
    }

    _ => (0, 1),
  }
}

fn struct_align(st: &StructType, layout: MemoryLayout) -> u32 {
  let align = st
    .fields
    .iter()
    .map(|f| size_align(&f.ty, layout).1)
    .max()
    .unwrap_or(1);

  if layout == MemoryLayout::Std140 {
    round_up(align, 16)
  } else {
    align
  }
}

/// Offset of each field of `st`.
pub fn struct_offsets(st: &StructType, layout: MemoryLayout) -> Vec<u32> {
  let mut offset = 0;
  st.fields
    .iter()
    .map(|f| {
      let (size, align) = size_align(&f.ty, layout);
      let field_offset = round_up(offset, align);
      offset = field_offset + size;
      field_offset
    })
    .collect()
}

/// Distance between consecutive elements of an array of `elem`.
pub fn array_stride(elem: &Type, layout: MemoryLayout) -> u32 {
  let (size, align) = size_align(elem, layout);
  let stride = round_up(size, align);

  if layout == MemoryLayout::Std140 {
    round_up(stride, 16)
  } else {
    stride
  }
}

/// Distance between the columns of a matrix, or of the matrices of an array.
pub fn matrix_stride(ty: &Type, layout: MemoryLayout) -> Option<u32> {
  match ty {
    Type::Matrix { scalar, rows, .. } => {
      let (_, align) = size_align(&Type::Vector(*scalar, *rows), layout);
      Some(if layout == MemoryLayout::Std140 { round_up(align, 16) } else { align })
    }
    Type::Array(elem, _) | Type::RuntimeArray(elem) => matrix_stride(elem, layout),
    _ => None,
  }
}

#[cfg(test)]
mod test {
  use std::rc::Rc;

  use super::*;
  use crate::types::{StructField, ToType, M33, M44, V2, V3, V4};

  fn st(fields: Vec<Type>) -> StructType {
    StructType {
      name: "S".to_owned(),
      fields: fields
        .into_iter()
        .enumerate()
        .map(|(i, ty)| StructField::new(format!("f{}", i), ty))
        .collect(),
    }
  }

  #[test]
  fn vec3_followed_by_scalar_packs() {
    let s = st(vec![V3::<f32>::ty(), f32::ty()]);

    assert_eq!(struct_offsets(&s, MemoryLayout::Std430), vec![0, 12]);
    assert_eq!(size_align(&Type::Struct(Rc::new(s.clone())), MemoryLayout::Std430), (16, 16));
    assert_eq!(struct_offsets(&s, MemoryLayout::Std140), vec![0, 12]);
  }

  #[test]
  fn std140_rounds_arrays_to_sixteen() {
    assert_eq!(array_stride(&f32::ty(), MemoryLayout::Std140), 16);
    assert_eq!(array_stride(&f32::ty(), MemoryLayout::Std430), 4);
    assert_eq!(array_stride(&V2::<f32>::ty(), MemoryLayout::Std430), 8);
    assert_eq!(array_stride(&V3::<f32>::ty(), MemoryLayout::Std430), 16);

    let s = st(vec![f32::ty(), <[f32; 2]>::ty(), V4::<f32>::ty()]);
    assert_eq!(struct_offsets(&s, MemoryLayout::Std140), vec![0, 16, 48]);
    assert_eq!(struct_offsets(&s, MemoryLayout::Std430), vec![0, 4, 16]);
  }

  #[test]
  fn matrices() {
    assert_eq!(matrix_stride(&M33::ty(), MemoryLayout::Std430), Some(16));
    assert_eq!(size_align(&M44::ty(), MemoryLayout::Std140), (64, 16));
    assert_eq!(size_align(&M33::ty(), MemoryLayout::Std430), (48, 16));
  }

  #[test]
  fn doubles() {
    assert_eq!(size_align(&V3::<f64>::ty(), MemoryLayout::Std430), (24, 32));
    assert_eq!(array_stride(&f64::ty(), MemoryLayout::Std430), 8);
  }
}
