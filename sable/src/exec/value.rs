//! Runtime values of the executor.

use crate::{
  error::ExecError,
  ir::{arena::Handle, IrType, Module},
};

/// Value held by an invocation.
///
/// Scalars keep the type they were produced with; integer instructions read them through [`Val::unsigned`] or
/// [`Val::signed`], which reinterpret the bits the way the instruction expects.
#[derive(Clone, Debug, PartialEq)]
pub enum Val {
  Bool(bool),
  I32(i32),
  U32(u32),
  I64(i64),
  U64(u64),
  F32(f32),
  F64(f64),
  /// Vector, matrix (as columns), array or structure.
  Composite(Vec<Val>),
  Pointer(Pointer),
}

/// Memory a pointer points into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Root {
  Global(usize),
  /// Function variable of the frame at `depth` in the call stack.
  Local { depth: usize, index: usize },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pointer {
  pub root: Root,
  pub path: Vec<usize>,
}

impl Val {
  /// Bits of a scalar, zero-extended to 64 bits.
  pub fn unsigned(&self) -> Result<u64, ExecError> {
    match *self {
      Val::Bool(b) => Ok(b as u64),
      Val::I32(x) => Ok(x as u32 as u64),
      Val::U32(x) => Ok(x as u64),
      Val::I64(x) => Ok(x as u64),
      Val::U64(x) => Ok(x),
      Val::F32(x) => Ok(x.to_bits() as u64),
      Val::F64(x) => Ok(x.to_bits()),
      _ => Err(not_scalar(self)),
    }
  }

  /// Bits of a scalar, sign-extended to 64 bits.
  pub fn signed(&self) -> Result<i64, ExecError> {
    match *self {
      Val::I32(x) => Ok(x as i64),
      Val::U32(x) => Ok(x as i32 as i64),
      Val::F32(x) => Ok(x.to_bits() as i32 as i64),
      _ => self.unsigned().map(|x| x as i64),
    }
  }

  pub fn float(&self) -> Result<f64, ExecError> {
    match *self {
      Val::F32(x) => Ok(x as f64),
      Val::F64(x) => Ok(x),
      _ => Err(ExecError::Malformed(format!("expected a float, got {:?}", self))),
    }
  }

  pub fn boolean(&self) -> Result<bool, ExecError> {
    match *self {
      Val::Bool(b) => Ok(b),
      _ => Err(ExecError::Malformed(format!("expected a boolean, got {:?}", self))),
    }
  }

  pub fn pointer(&self) -> Result<&Pointer, ExecError> {
    match self {
      Val::Pointer(p) => Ok(p),
      _ => Err(ExecError::Malformed(format!("expected a pointer, got {:?}", self))),
    }
  }

  pub fn components(&self) -> Result<&[Val], ExecError> {
    match self {
      Val::Composite(parts) => Ok(parts),
      _ => Err(ExecError::Malformed(format!("expected a composite, got {:?}", self))),
    }
  }

  /// Follow `path` through nested composites.
  pub fn at(&self, path: &[usize]) -> Result<&Val, ExecError> {
    path.iter().try_fold(self, |val, &i| {
      val.components()?.get(i).ok_or_else(|| out_of_bounds(i))
    })
  }

  pub fn at_mut(&mut self, path: &[usize]) -> Result<&mut Val, ExecError> {
    let mut val = self;
    for &i in path {
      val = match val {
        Val::Composite(parts) => parts.get_mut(i).ok_or_else(|| out_of_bounds(i))?,
        other => return Err(ExecError::Malformed(format!("cannot index into {:?}", other))),
      };
    }
    Ok(val)
  }
}

fn not_scalar(val: &Val) -> ExecError {
  ExecError::Malformed(format!("expected a scalar, got {:?}", val))
}

fn out_of_bounds(i: usize) -> ExecError {
  ExecError::Malformed(format!("index {} is out of bounds", i))
}

/// Scalar of type `ty` from its bit pattern, truncated to the width of the type.
pub fn from_bits(ty: &IrType, bits: u64) -> Result<Val, ExecError> {
  match *ty {
    IrType::Bool => Ok(Val::Bool(bits != 0)),
    IrType::Int { width: 32, signed: true } => Ok(Val::I32(bits as u32 as i32)),
    IrType::Int { width: 32, signed: false } => Ok(Val::U32(bits as u32)),
    IrType::Int { width: 64, signed: true } => Ok(Val::I64(bits as i64)),
    IrType::Int { width: 64, signed: false } => Ok(Val::U64(bits)),
    IrType::Float { width: 32 } => Ok(Val::F32(f32::from_bits(bits as u32))),
    IrType::Float { width: 64 } => Ok(Val::F64(f64::from_bits(bits))),
    _ => Err(ExecError::Unsupported(format!("scalar type {:?}", ty))),
  }
}

/// Scalar of type `ty` from a float, rounded for 32-bit floats and converted for integers.
pub fn from_float(ty: &IrType, x: f64) -> Result<Val, ExecError> {
  match *ty {
    IrType::Float { width: 32 } => Ok(Val::F32(x as f32)),
    IrType::Float { width: 64 } => Ok(Val::F64(x)),
    IrType::Int { signed: true, .. } => from_bits(ty, x as i64 as u64),
    IrType::Int { signed: false, .. } => from_bits(ty, x as u64),
    _ => Err(ExecError::Malformed(format!("cannot make a {:?} from a float", ty))),
  }
}

/// Zero value of a type.
pub fn zero(module: &Module, ty: Handle<IrType>) -> Result<Val, ExecError> {
  let repeat = |element: Handle<IrType>, n: usize| -> Result<Val, ExecError> {
    let element = zero(module, element)?;
    Ok(Val::Composite(vec![element; n]))
  };

  match &module.types[ty] {
    IrType::Vector { component, size } => repeat(*component, *size as usize),
    IrType::Matrix { column, columns } => repeat(*column, *columns as usize),
    IrType::Array { element, len, .. } => repeat(*element, constant_len(module, *len)?),
    IrType::RuntimeArray { .. } => Ok(Val::Composite(Vec::new())),
    IrType::Struct(st) => st
      .members
      .iter()
      .map(|m| zero(module, m.ty))
      .collect::<Result<_, _>>()
      .map(Val::Composite),
    scalar => from_bits(scalar, 0),
  }
}

/// Length of a fixed-size array.
pub fn constant_len(module: &Module, len: Handle<crate::ir::Constant>) -> Result<usize, ExecError> {
  match module.constants[len] {
    crate::ir::Constant::Scalar { bits, .. } => Ok(bits as usize),
    ref other => Err(ExecError::Malformed(format!("array length {:?}", other))),
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn bits_are_reinterpreted() {
    assert_eq!(Val::I32(-1).unsigned(), Ok(0xffff_ffff));
    assert_eq!(Val::U32(0xffff_ffff).signed(), Ok(-1));
    assert_eq!(Val::I64(-2).unsigned(), Ok(u64::MAX - 1));
    assert_eq!(Val::F32(1.).unsigned(), Ok(0x3f80_0000));
  }

  #[test]
  fn scalars_are_truncated_to_their_width() {
    let int = IrType::Int { width: 32, signed: true };
    assert_eq!(from_bits(&int, 0x1_0000_0005), Ok(Val::I32(5)));
    assert_eq!(from_bits(&int, u64::MAX), Ok(Val::I32(-1)));

    let float = IrType::Float { width: 32 };
    assert_eq!(from_float(&float, 0.5), Ok(Val::F32(0.5)));
    assert_eq!(from_float(&IrType::Int { width: 32, signed: false }, 3.9), Ok(Val::U32(3)));
  }

  #[test]
  fn paths_index_composites() {
    let mut v = Val::Composite(vec![Val::U32(1), Val::Composite(vec![Val::U32(2), Val::U32(3)])]);
    assert_eq!(v.at(&[1, 0]), Ok(&Val::U32(2)));
    assert!(v.at(&[2]).is_err());

    *v.at_mut(&[1, 1]).unwrap() = Val::U32(7);
    assert_eq!(v.at(&[1, 1]), Ok(&Val::U32(7)));
  }
}
