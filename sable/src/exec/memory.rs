//! Byte buffers seen through the explicit layout of their module types.

use super::value::{constant_len, from_bits, Val};
use crate::{
  error::ExecError,
  ir::{arena::Handle, IrType, Module},
};

/// Decoder and encoder of the bytes of one buffer.
///
/// Offsets and strides come from the module types, so a buffer is read exactly as a driver would read it. Reading or
/// writing past the end of the bytes yields `short`.
pub struct Codec<'a> {
  pub module: &'a Module,
  pub short: ExecError,
}

impl<'a> Codec<'a> {
  pub fn decode(&self, bytes: &[u8], ty: Handle<IrType>, offset: usize, matrix_stride: Option<u32>) -> Result<Val, ExecError> {
    match &self.module.types[ty] {
      IrType::Bool => Ok(Val::Bool(self.read(bytes, offset, 4)? != 0)),
      scalar @ (IrType::Int { width, .. } | IrType::Float { width }) => {
        from_bits(scalar, self.read(bytes, offset, *width as usize / 8)?)
      }

      IrType::Vector { component, size } => {
        let step = scalar_size(&self.module.types[*component]);
        (0..*size as usize)
          .map(|i| self.decode(bytes, *component, offset + i * step, None))
          .collect::<Result<_, _>>()
          .map(Val::Composite)
      }

      IrType::Matrix { column, columns } => {
        let stride = matrix_stride.ok_or_else(|| ExecError::Malformed("matrix without a stride".to_owned()))?;
        (0..*columns as usize)
          .map(|i| self.decode(bytes, *column, offset + i * stride as usize, None))
          .collect::<Result<_, _>>()
          .map(Val::Composite)
      }

      IrType::Array { element, len, stride } => {
        let stride = array_stride(*stride)?;
        (0..constant_len(self.module, *len)?)
          .map(|i| self.decode(bytes, *element, offset + i * stride, matrix_stride))
          .collect::<Result<_, _>>()
          .map(Val::Composite)
      }

      // a runtime array spans the rest of the buffer
      IrType::RuntimeArray { element, stride } => {
        let stride = array_stride(*stride)?;
        (0..bytes.len().saturating_sub(offset) / stride)
          .map(|i| self.decode(bytes, *element, offset + i * stride, matrix_stride))
          .collect::<Result<_, _>>()
          .map(Val::Composite)
      }

      IrType::Struct(st) => st
        .members
        .iter()
        .map(|m| self.decode(bytes, m.ty, offset + m.offset.unwrap_or(0) as usize, m.matrix_stride))
        .collect::<Result<_, _>>()
        .map(Val::Composite),

      other => Err(ExecError::Unsupported(format!("{:?} in a buffer", other))),
    }
  }

  pub fn encode(
    &self,
    bytes: &mut [u8],
    ty: Handle<IrType>,
    offset: usize,
    matrix_stride: Option<u32>,
    val: &Val,
  ) -> Result<(), ExecError> {
    match &self.module.types[ty] {
      IrType::Bool => self.write(bytes, offset, 4, val.unsigned()?),
      IrType::Int { width, .. } | IrType::Float { width } => self.write(bytes, offset, *width as usize / 8, val.unsigned()?),

      IrType::Vector { component, .. } => {
        let step = scalar_size(&self.module.types[*component]);
        for (i, part) in val.components()?.iter().enumerate() {
          self.encode(bytes, *component, offset + i * step, None, part)?;
        }
        Ok(())
      }

      IrType::Matrix { column, .. } => {
        let stride = matrix_stride.ok_or_else(|| ExecError::Malformed("matrix without a stride".to_owned()))?;
        for (i, part) in val.components()?.iter().enumerate() {
          self.encode(bytes, *column, offset + i * stride as usize, None, part)?;
        }
        Ok(())
      }

      IrType::Array { element, stride, .. } | IrType::RuntimeArray { element, stride } => {
        let stride = array_stride(*stride)?;
        for (i, part) in val.components()?.iter().enumerate() {
          self.encode(bytes, *element, offset + i * stride, matrix_stride, part)?;
        }
        Ok(())
      }

      IrType::Struct(st) => {
        for (m, part) in st.members.iter().zip(val.components()?) {
          self.encode(bytes, m.ty, offset + m.offset.unwrap_or(0) as usize, m.matrix_stride, part)?;
        }
        Ok(())
      }

      other => Err(ExecError::Unsupported(format!("{:?} in a buffer", other))),
    }
  }

  fn read(&self, bytes: &[u8], offset: usize, size: usize) -> Result<u64, ExecError> {
    let src = bytes.get(offset..offset + size).ok_or_else(|| self.short.clone())?;
    let mut word = [0; 8];
    word[..size].copy_from_slice(src);
    Ok(u64::from_le_bytes(word))
  }

  fn write(&self, bytes: &mut [u8], offset: usize, size: usize, bits: u64) -> Result<(), ExecError> {
    let dst = bytes.get_mut(offset..offset + size).ok_or_else(|| self.short.clone())?;
    dst.copy_from_slice(&bits.to_le_bytes()[..size]);
    Ok(())
  }
}

fn scalar_size(ty: &IrType) -> usize {
  match *ty {
    IrType::Int { width, .. } | IrType::Float { width } => width as usize / 8,
    _ => 4,
  }
}

fn array_stride(stride: Option<u32>) -> Result<usize, ExecError> {
  match stride {
    Some(stride) if stride > 0 => Ok(stride as usize),
    _ => Err(ExecError::Malformed("array without a stride in a buffer".to_owned())),
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::ir::{Constant, IrStruct, Member};

  fn module_with(f: impl FnOnce(&mut Module) -> Handle<IrType>) -> (Module, Handle<IrType>) {
    let stage = crate::stage::StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|_: &mut crate::scope::Scope<()>| {})
    });
    let mut module = stage
      .compile(&crate::layout::PipelineLayout::new(), &Default::default())
      .unwrap();
    let ty = f(&mut module);
    (module, ty)
  }

  #[test]
  fn struct_with_runtime_array() {
    // struct { uint count; vec2 data[]; } with std430 offsets
    let (module, ty) = module_with(|m| {
      let uint = m.types.insert(IrType::Int { width: 32, signed: false });
      let float = m.types.insert(IrType::Float { width: 32 });
      let vec2 = m.types.insert(IrType::Vector { component: float, size: 2 });
      let array = m.types.insert(IrType::RuntimeArray { element: vec2, stride: Some(8) });
      let member = |name: &str, ty, offset| Member {
        name: name.to_owned(),
        ty,
        offset: Some(offset),
        matrix_stride: None,
        relaxed: false,
        non_writable: false,
      };

      m.types.insert(IrType::Struct(IrStruct {
        name: "block".to_owned(),
        members: vec![member("count", uint, 0), member("data", array, 8)],
        block: None,
      }))
    });

    let codec = Codec {
      module: &module,
      short: ExecError::BufferSize { set: 0, binding: 0, len: 0 },
    };

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&[0; 4]);
    for x in [1f32, 2., 3., 4.] {
      bytes.extend_from_slice(&x.to_le_bytes());
    }

    let val = codec.decode(&bytes, ty, 0, None).unwrap();
    assert_eq!(val.at(&[0]), Ok(&Val::U32(2)));
    assert_eq!(val.at(&[1]).unwrap().components().unwrap().len(), 2);
    assert_eq!(val.at(&[1, 1, 0]), Ok(&Val::F32(3.)));

    let mut out = vec![0; bytes.len()];
    codec.encode(&mut out, ty, 0, None, &val).unwrap();
    assert_eq!(out, bytes);

    assert_eq!(codec.decode(&bytes[..2], ty, 0, None), Err(codec.short.clone()));
  }

  #[test]
  fn arrays_need_their_stride() {
    let (module, ty) = module_with(|m| {
      let float = m.types.insert(IrType::Float { width: 32 });
      let uint = m.types.insert(IrType::Int { width: 32, signed: false });
      let len = m.constants.insert(Constant::Scalar { ty: uint, bits: 2 });
      m.types.insert(IrType::Array {
        element: float,
        len,
        stride: None,
      })
    });

    let codec = Codec {
      module: &module,
      short: ExecError::BufferSize { set: 0, binding: 0, len: 0 },
    };
    assert!(matches!(codec.decode(&[0; 8], ty, 0, None), Err(ExecError::Malformed(_))));
  }
}
