//! Arithmetic of the executor.

use spirv::{GLOp, GroupOperation, Op as O};

use super::{
  value::{from_bits, from_float, zero, Val},
  Executor,
};
use crate::{
  error::ExecError,
  ir::{arena::Handle, IrType},
};

type Lane<'f> = &'f dyn Fn(&IrType, &[Val]) -> Result<Val, ExecError>;

impl<'m> Executor<'m> {
  /// Apply `f` to every scalar lane of `ty`, scalar arguments being broadcast to all lanes.
  pub(super) fn lanes(&self, ty: Handle<IrType>, args: &[Val], f: Lane) -> Result<Val, ExecError> {
    let (element, n) = match self.module.types[ty] {
      IrType::Vector { component, size } => (component, size),
      IrType::Matrix { column, columns } => (column, columns),
      ref scalar => return f(scalar, args),
    };

    (0..n as usize)
      .map(|i| {
        let lane = args
          .iter()
          .map(|arg| match arg {
            Val::Composite(parts) => parts
              .get(i)
              .cloned()
              .ok_or_else(|| ExecError::Malformed(format!("operand has no lane {}", i))),
            scalar => Ok(scalar.clone()),
          })
          .collect::<Result<Vec<_>, _>>()?;
        self.lanes(element, &lane, f)
      })
      .collect::<Result<_, _>>()
      .map(Val::Composite)
  }

  fn scalar_of(&self, mut ty: Handle<IrType>) -> &'m IrType {
    loop {
      match self.module.types[ty] {
        IrType::Vector { component, .. } => ty = component,
        IrType::Matrix { column, .. } => ty = column,
        _ => return &self.module.types[ty],
      }
    }
  }

  /// Vector (or scalar, for one component) of type `ty` from floats.
  fn floats_to(&self, ty: Handle<IrType>, xs: &[f64]) -> Result<Val, ExecError> {
    let scalar = self.scalar_of(ty);
    match self.module.types[ty] {
      IrType::Vector { .. } => xs
        .iter()
        .map(|&x| from_float(scalar, x))
        .collect::<Result<_, _>>()
        .map(Val::Composite),
      _ => from_float(scalar, xs.first().copied().unwrap_or(0.)),
    }
  }

  pub(super) fn unary(&self, op: O, ty: Handle<IrType>, a: &Val) -> Result<Val, ExecError> {
    match op {
      O::Any => Ok(Val::Bool(booleans(a)?.into_iter().any(|b| b))),
      O::All => Ok(Val::Bool(booleans(a)?.into_iter().all(|b| b))),
      O::Transpose => {
        let columns = a.components()?;
        let rows = columns.first().map_or(Ok(0), |c| c.components().map(<[Val]>::len))?;
        (0..rows)
          .map(|r| {
            columns
              .iter()
              .map(|c| c.at(&[r]).cloned())
              .collect::<Result<_, _>>()
              .map(Val::Composite)
          })
          .collect::<Result<_, _>>()
          .map(Val::Composite)
      }
      _ => self.lanes(ty, std::slice::from_ref(a), &|s, lane| unary_scalar(op, s, &lane[0])),
    }
  }

  pub(super) fn binary(&self, op: O, ty: Handle<IrType>, l: &Val, r: &Val) -> Result<Val, ExecError> {
    match op {
      O::Dot => from_float(self.scalar_of(ty), dot(&floats(l)?, &floats(r)?)),

      O::MatrixTimesVector => {
        let v = floats(r)?;
        let columns = matrix(l)?;
        self.floats_to(ty, &mat_vec(&columns, &v))
      }

      O::VectorTimesMatrix => {
        let v = floats(l)?;
        let xs: Vec<_> = matrix(r)?.iter().map(|c| dot(&v, c)).collect();
        self.floats_to(ty, &xs)
      }

      O::MatrixTimesMatrix => {
        let a = matrix(l)?;
        let column_ty = match self.module.types[ty] {
          IrType::Matrix { column, .. } => column,
          _ => return Err(ExecError::Malformed("matrix product is not a matrix".to_owned())),
        };

        matrix(r)?
          .iter()
          .map(|c| self.floats_to(column_ty, &mat_vec(&a, c)))
          .collect::<Result<_, _>>()
          .map(Val::Composite)
      }

      _ => self.lanes(ty, &[l.clone(), r.clone()], &|s, lane| binary_scalar(op, s, &lane[0], &lane[1])),
    }
  }

  pub(super) fn ext(&self, op: GLOp, ty: Handle<IrType>, args: &[Val]) -> Result<Val, ExecError> {
    let v = |i: usize| arg(args, i).and_then(floats);

    match op {
      GLOp::Length => from_float(self.scalar_of(ty), norm(&v(0)?)),

      GLOp::Distance => {
        let d: Vec<_> = v(0)?.iter().zip(v(1)?).map(|(a, b)| a - b).collect();
        from_float(self.scalar_of(ty), norm(&d))
      }

      GLOp::Normalize => {
        let x = v(0)?;
        let n = norm(&x);
        self.floats_to(ty, &x.iter().map(|c| c / n).collect::<Vec<_>>())
      }

      GLOp::Cross => {
        let (a, b) = (v(0)?, v(1)?);
        if a.len() != 3 || b.len() != 3 {
          return Err(ExecError::Malformed("cross product of non-3D vectors".to_owned()));
        }
        self.floats_to(
          ty,
          &[a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]],
        )
      }

      GLOp::Reflect => {
        let (i, n) = (v(0)?, v(1)?);
        let d = dot(&n, &i);
        self.floats_to(ty, &i.iter().zip(&n).map(|(i, n)| i - 2. * d * n).collect::<Vec<_>>())
      }

      GLOp::Refract => {
        let (i, n, eta) = (v(0)?, v(1)?, arg(args, 2)?.float()?);
        let d = dot(&n, &i);
        let k = 1. - eta * eta * (1. - d * d);
        let xs: Vec<_> = if k < 0. {
          vec![0.; i.len()]
        } else {
          i.iter().zip(&n).map(|(i, n)| eta * i - (eta * d + k.sqrt()) * n).collect()
        };
        self.floats_to(ty, &xs)
      }

      GLOp::FaceForward => {
        let (n, i, nref) = (v(0)?, v(1)?, v(2)?);
        let sign = if dot(&nref, &i) < 0. { 1. } else { -1. };
        self.floats_to(ty, &n.iter().map(|n| sign * n).collect::<Vec<_>>())
      }

      GLOp::Determinant => from_float(self.scalar_of(ty), determinant(&matrix(arg(args, 0)?)?)),

      GLOp::MatrixInverse => {
        let column_ty = match self.module.types[ty] {
          IrType::Matrix { column, .. } => column,
          _ => return Err(ExecError::Malformed("inverse is not a matrix".to_owned())),
        };

        inverse(&matrix(arg(args, 0)?)?)
          .iter()
          .map(|c| self.floats_to(column_ty, c))
          .collect::<Result<_, _>>()
          .map(Val::Composite)
      }

      _ => self.lanes(ty, args, &|s, lane| ext_scalar(op, s, lane)),
    }
  }

  /// Results of a subgroup operation for each of the active invocations, given the values they contributed.
  pub(super) fn subgroup(
    &self,
    op: O,
    group: Option<GroupOperation>,
    ty: Option<Handle<IrType>>,
    values: &[Val],
  ) -> Result<Vec<Val>, ExecError> {
    let n = values.len();

    match op {
      O::GroupNonUniformElect => return Ok((0..n).map(|i| Val::Bool(i == 0)).collect()),

      O::GroupNonUniformAll | O::GroupNonUniformAny => {
        let bools = values.iter().map(Val::boolean).collect::<Result<Vec<_>, _>>()?;
        let result = if op == O::GroupNonUniformAll {
          bools.iter().all(|&b| b)
        } else {
          bools.iter().any(|&b| b)
        };
        return Ok(vec![Val::Bool(result); n]);
      }

      O::GroupNonUniformBroadcastFirst => return Ok(vec![values[0].clone(); n]),

      _ => (),
    }

    let ty = ty.ok_or_else(|| ExecError::Malformed(format!("{:?} without a result", op)))?;
    let combine = |a: &Val, b: &Val| -> Result<Val, ExecError> {
      match op {
        O::GroupNonUniformIAdd => self.binary(O::IAdd, ty, a, b),
        O::GroupNonUniformFAdd => self.binary(O::FAdd, ty, a, b),
        O::GroupNonUniformIMul => self.binary(O::IMul, ty, a, b),
        O::GroupNonUniformFMul => self.binary(O::FMul, ty, a, b),
        O::GroupNonUniformSMin => self.ext(GLOp::SMin, ty, &[a.clone(), b.clone()]),
        O::GroupNonUniformUMin => self.ext(GLOp::UMin, ty, &[a.clone(), b.clone()]),
        O::GroupNonUniformFMin => self.ext(GLOp::FMin, ty, &[a.clone(), b.clone()]),
        O::GroupNonUniformSMax => self.ext(GLOp::SMax, ty, &[a.clone(), b.clone()]),
        O::GroupNonUniformUMax => self.ext(GLOp::UMax, ty, &[a.clone(), b.clone()]),
        O::GroupNonUniformFMax => self.ext(GLOp::FMax, ty, &[a.clone(), b.clone()]),
        _ => Err(ExecError::Unsupported(format!("{:?}", op))),
      }
    };

    // invocations combine in increasing subgroup order
    let mut acc = self.lanes(ty, &[zero(self.module, ty)?], &|s, _| identity(op, s))?;
    let mut scan = Vec::with_capacity(n);
    for value in values {
      let next = combine(&acc, value)?;
      scan.push(match group {
        Some(GroupOperation::ExclusiveScan) => acc,
        _ => next.clone(),
      });
      acc = next;
    }

    match group {
      Some(GroupOperation::InclusiveScan | GroupOperation::ExclusiveScan) => Ok(scan),
      Some(GroupOperation::Reduce) | None => Ok(vec![acc; n]),
      Some(other) => Err(ExecError::Unsupported(format!("group operation {:?}", other))),
    }
  }
}

fn arg(args: &[Val], i: usize) -> Result<&Val, ExecError> {
  args
    .get(i)
    .ok_or_else(|| ExecError::Malformed(format!("missing operand {}", i)))
}

fn width(s: &IrType) -> u32 {
  match *s {
    IrType::Int { width, .. } | IrType::Float { width } => width,
    _ => 32,
  }
}

fn booleans(v: &Val) -> Result<Vec<bool>, ExecError> {
  match v {
    Val::Composite(parts) => parts.iter().map(Val::boolean).collect(),
    scalar => Ok(vec![scalar.boolean()?]),
  }
}

fn floats(v: &Val) -> Result<Vec<f64>, ExecError> {
  match v {
    Val::Composite(parts) => parts.iter().map(Val::float).collect(),
    scalar => Ok(vec![scalar.float()?]),
  }
}

fn matrix(v: &Val) -> Result<Vec<Vec<f64>>, ExecError> {
  v.components()?.iter().map(floats).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn norm(a: &[f64]) -> f64 {
  dot(a, a).sqrt()
}

/// Product of a matrix, given as columns, and a vector.
fn mat_vec(columns: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
  let rows = columns.first().map_or(0, Vec::len);
  (0..rows)
    .map(|r| columns.iter().zip(v).map(|(c, x)| c[r] * x).sum())
    .collect()
}

fn determinant(m: &[Vec<f64>]) -> f64 {
  match m.len() {
    0 => 1.,
    1 => m[0][0],
    2 => m[0][0] * m[1][1] - m[1][0] * m[0][1],
    n => (0..n)
      .map(|c| {
        let minor: Vec<Vec<f64>> = m
          .iter()
          .enumerate()
          .filter(|&(i, _)| i != c)
          .map(|(_, column)| column[1..].to_vec())
          .collect();
        let sign = if c % 2 == 0 { 1. } else { -1. };
        sign * m[c][0] * determinant(&minor)
      })
      .sum(),
  }
}

/// Gauss-Jordan inversion; singular matrices yield non-finite values.
fn inverse(m: &[Vec<f64>]) -> Vec<Vec<f64>> {
  let n = m.len();
  // rows of [m | I]
  let mut rows: Vec<Vec<f64>> = (0..n)
    .map(|r| {
      (0..2 * n)
        .map(|c| if c < n { m[c][r] } else if c - n == r { 1. } else { 0. })
        .collect()
    })
    .collect();

  for col in 0..n {
    let pivot = (col..n)
      .max_by(|&a, &b| rows[a][col].abs().total_cmp(&rows[b][col].abs()))
      .unwrap_or(col);
    rows.swap(col, pivot);

    let p = rows[col][col];
    for x in rows[col].iter_mut() {
      *x /= p;
    }

    for r in 0..n {
      if r != col {
        let factor = rows[r][col];
        for c in 0..2 * n {
          rows[r][c] -= factor * rows[col][c];
        }
      }
    }
  }

  (0..n).map(|c| (0..n).map(|r| rows[r][n + c]).collect()).collect()
}

fn unary_scalar(op: O, s: &IrType, a: &Val) -> Result<Val, ExecError> {
  match op {
    O::FNegate => from_float(s, -a.float()?),
    O::SNegate => from_bits(s, a.signed()?.wrapping_neg() as u64),
    O::Not => from_bits(s, !a.unsigned()?),
    O::LogicalNot => Ok(Val::Bool(!a.boolean()?)),
    O::ConvertFToS => from_bits(s, a.float()? as i64 as u64),
    O::ConvertFToU => from_bits(s, a.float()? as u64),
    O::ConvertSToF => from_float(s, a.signed()? as f64),
    O::ConvertUToF => from_float(s, a.unsigned()? as f64),
    O::UConvert | O::Bitcast => from_bits(s, a.unsigned()?),
    O::SConvert => from_bits(s, a.signed()? as u64),
    O::FConvert => from_float(s, a.float()?),
    O::IsNan => Ok(Val::Bool(a.float()?.is_nan())),
    O::IsInf => Ok(Val::Bool(a.float()?.is_infinite())),
    O::BitCount => from_bits(s, a.unsigned()?.count_ones() as u64),
    O::BitReverse => from_bits(s, a.unsigned()?.reverse_bits() >> (64 - width(s))),
    O::DPdx | O::DPdy | O::Fwidth | O::DPdxFine | O::DPdyFine | O::DPdxCoarse | O::DPdyCoarse => {
      Err(ExecError::Unsupported("derivatives outside of fragment shaders".to_owned()))
    }
    _ => Err(ExecError::Unsupported(format!("{:?}", op))),
  }
}

fn binary_scalar(op: O, s: &IrType, a: &Val, b: &Val) -> Result<Val, ExecError> {
  let int = |bits: u64| from_bits(s, bits);
  let float = |x: f64| from_float(s, x);
  let shift = || b.unsigned().map(|n| n.min(64) as u32);

  match op {
    O::IAdd => int(a.unsigned()?.wrapping_add(b.unsigned()?)),
    O::ISub => int(a.unsigned()?.wrapping_sub(b.unsigned()?)),
    O::IMul => int(a.unsigned()?.wrapping_mul(b.unsigned()?)),
    O::UDiv => int(a.unsigned()?.checked_div(b.unsigned()?).unwrap_or(0)),
    O::UMod => int(a.unsigned()?.checked_rem(b.unsigned()?).unwrap_or(0)),
    O::SDiv => int(a.signed()?.checked_div(b.signed()?).unwrap_or(0) as u64),
    O::SRem => int(a.signed()?.checked_rem(b.signed()?).unwrap_or(0) as u64),

    O::FAdd => float(a.float()? + b.float()?),
    O::FSub => float(a.float()? - b.float()?),
    O::FMul | O::VectorTimesScalar | O::MatrixTimesScalar => float(a.float()? * b.float()?),
    O::FDiv => float(a.float()? / b.float()?),
    O::FRem => float(a.float()? % b.float()?),

    O::IEqual => Ok(Val::Bool(a.unsigned()? == b.unsigned()?)),
    O::INotEqual => Ok(Val::Bool(a.unsigned()? != b.unsigned()?)),
    O::ULessThan => Ok(Val::Bool(a.unsigned()? < b.unsigned()?)),
    O::ULessThanEqual => Ok(Val::Bool(a.unsigned()? <= b.unsigned()?)),
    O::UGreaterThan => Ok(Val::Bool(a.unsigned()? > b.unsigned()?)),
    O::UGreaterThanEqual => Ok(Val::Bool(a.unsigned()? >= b.unsigned()?)),
    O::SLessThan => Ok(Val::Bool(a.signed()? < b.signed()?)),
    O::SLessThanEqual => Ok(Val::Bool(a.signed()? <= b.signed()?)),
    O::SGreaterThan => Ok(Val::Bool(a.signed()? > b.signed()?)),
    O::SGreaterThanEqual => Ok(Val::Bool(a.signed()? >= b.signed()?)),

    // comparisons with NaN are false, except the unordered one
    O::FOrdEqual => Ok(Val::Bool(a.float()? == b.float()?)),
    O::FOrdNotEqual => {
      let (x, y) = (a.float()?, b.float()?);
      Ok(Val::Bool(x < y || x > y))
    }
    O::FUnordNotEqual => Ok(Val::Bool(a.float()? != b.float()?)),
    O::FOrdLessThan => Ok(Val::Bool(a.float()? < b.float()?)),
    O::FOrdLessThanEqual => Ok(Val::Bool(a.float()? <= b.float()?)),
    O::FOrdGreaterThan => Ok(Val::Bool(a.float()? > b.float()?)),
    O::FOrdGreaterThanEqual => Ok(Val::Bool(a.float()? >= b.float()?)),

    O::LogicalAnd => Ok(Val::Bool(a.boolean()? && b.boolean()?)),
    O::LogicalOr => Ok(Val::Bool(a.boolean()? || b.boolean()?)),
    O::LogicalEqual => Ok(Val::Bool(a.boolean()? == b.boolean()?)),
    O::LogicalNotEqual => Ok(Val::Bool(a.boolean()? != b.boolean()?)),

    O::BitwiseAnd => int(a.unsigned()? & b.unsigned()?),
    O::BitwiseOr => int(a.unsigned()? | b.unsigned()?),
    O::BitwiseXor => int(a.unsigned()? ^ b.unsigned()?),
    O::ShiftLeftLogical => int(a.unsigned()?.checked_shl(shift()?).unwrap_or(0)),
    O::ShiftRightLogical => int(a.unsigned()?.checked_shr(shift()?).unwrap_or(0)),
    O::ShiftRightArithmetic => int((a.signed()? >> shift()?.min(63)) as u64),

    _ => Err(ExecError::Unsupported(format!("{:?}", op))),
  }
}

fn ext_scalar(op: GLOp, s: &IrType, args: &[Val]) -> Result<Val, ExecError> {
  let x = |i: usize| arg(args, i).and_then(Val::float);
  let i = |k: usize| arg(args, k).and_then(Val::signed);
  let u = |k: usize| arg(args, k).and_then(Val::unsigned);
  let float = |v: f64| from_float(s, v);
  let int = |bits: u64| from_bits(s, bits);

  match op {
    GLOp::Round => float(x(0)?.round()),
    GLOp::RoundEven => float(x(0)?.round_ties_even()),
    GLOp::Trunc => float(x(0)?.trunc()),
    GLOp::FAbs => float(x(0)?.abs()),
    GLOp::FSign => {
      let v = x(0)?;
      float(if v > 0. { 1. } else if v < 0. { -1. } else { v })
    }
    GLOp::Floor => float(x(0)?.floor()),
    GLOp::Ceil => float(x(0)?.ceil()),
    GLOp::Fract => float(x(0)? - x(0)?.floor()),
    GLOp::Radians => float(x(0)?.to_radians()),
    GLOp::Degrees => float(x(0)?.to_degrees()),
    GLOp::Sin => float(x(0)?.sin()),
    GLOp::Cos => float(x(0)?.cos()),
    GLOp::Tan => float(x(0)?.tan()),
    GLOp::Asin => float(x(0)?.asin()),
    GLOp::Acos => float(x(0)?.acos()),
    GLOp::Atan => float(x(0)?.atan()),
    GLOp::Sinh => float(x(0)?.sinh()),
    GLOp::Cosh => float(x(0)?.cosh()),
    GLOp::Tanh => float(x(0)?.tanh()),
    GLOp::Asinh => float(x(0)?.asinh()),
    GLOp::Acosh => float(x(0)?.acosh()),
    GLOp::Atanh => float(x(0)?.atanh()),
    GLOp::Atan2 => float(x(0)?.atan2(x(1)?)),
    GLOp::Pow => float(x(0)?.powf(x(1)?)),
    GLOp::Exp => float(x(0)?.exp()),
    GLOp::Log => float(x(0)?.ln()),
    GLOp::Exp2 => float(x(0)?.exp2()),
    GLOp::Log2 => float(x(0)?.log2()),
    GLOp::Sqrt => float(x(0)?.sqrt()),
    GLOp::InverseSqrt => float(1. / x(0)?.sqrt()),

    GLOp::FMin => float(x(0)?.min(x(1)?)),
    GLOp::FMax => float(x(0)?.max(x(1)?)),
    GLOp::FClamp => float(x(0)?.max(x(1)?).min(x(2)?)),
    GLOp::FMix => float(x(0)? * (1. - x(2)?) + x(1)? * x(2)?),
    GLOp::Fma => float(x(0)?.mul_add(x(1)?, x(2)?)),
    GLOp::Step => float(if x(1)? < x(0)? { 0. } else { 1. }),
    GLOp::SmoothStep => {
      let (e0, e1) = (x(0)?, x(1)?);
      let t = ((x(2)? - e0) / (e1 - e0)).clamp(0., 1.);
      float(t * t * (3. - 2. * t))
    }

    GLOp::SAbs => int(i(0)?.wrapping_abs() as u64),
    GLOp::SSign => int(i(0)?.signum() as u64),
    GLOp::SMin => int(i(0)?.min(i(1)?) as u64),
    GLOp::SMax => int(i(0)?.max(i(1)?) as u64),
    GLOp::SClamp => int(i(0)?.max(i(1)?).min(i(2)?) as u64),
    GLOp::UMin => int(u(0)?.min(u(1)?)),
    GLOp::UMax => int(u(0)?.max(u(1)?)),
    GLOp::UClamp => int(u(0)?.max(u(1)?).min(u(2)?)),

    // -1 when no bit is set
    GLOp::FindILsb => int(match u(0)? {
      0 => u64::MAX,
      bits => bits.trailing_zeros() as u64,
    }),
    GLOp::FindUMsb => int(msb(u(0)?)),
    GLOp::FindSMsb => {
      let v = i(0)?;
      int(msb(if v < 0 { !v as u64 } else { v as u64 }))
    }

    _ => Err(ExecError::Unsupported(format!("{:?}", op))),
  }
}

fn msb(bits: u64) -> u64 {
  match bits {
    0 => u64::MAX,
    _ => 63 - bits.leading_zeros() as u64,
  }
}

/// Identity element of the combining operation of a subgroup arithmetic operation.
fn identity(op: O, s: &IrType) -> Result<Val, ExecError> {
  let w = width(s);
  match op {
    O::GroupNonUniformIAdd | O::GroupNonUniformFAdd | O::GroupNonUniformUMax => from_bits(s, 0),
    O::GroupNonUniformIMul => from_bits(s, 1),
    O::GroupNonUniformFMul => from_float(s, 1.),
    O::GroupNonUniformUMin => from_bits(s, u64::MAX),
    O::GroupNonUniformSMin => from_bits(s, (1 << (w - 1)) - 1),
    O::GroupNonUniformSMax => from_bits(s, 1 << (w - 1)),
    O::GroupNonUniformFMin => from_float(s, f64::INFINITY),
    O::GroupNonUniformFMax => from_float(s, f64::NEG_INFINITY),
    _ => Err(ExecError::Unsupported(format!("{:?}", op))),
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn integer_arithmetic_wraps() {
    let int = IrType::Int { width: 32, signed: true };
    assert_eq!(
      binary_scalar(O::IAdd, &int, &Val::I32(i32::MAX), &Val::I32(1)),
      Ok(Val::I32(i32::MIN))
    );
    assert_eq!(binary_scalar(O::SDiv, &int, &Val::I32(-7), &Val::I32(2)), Ok(Val::I32(-3)));
    assert_eq!(binary_scalar(O::SRem, &int, &Val::I32(-7), &Val::I32(2)), Ok(Val::I32(-1)));
    assert_eq!(
      binary_scalar(O::ShiftRightArithmetic, &int, &Val::I32(-8), &Val::U32(1)),
      Ok(Val::I32(-4))
    );

    let uint = IrType::Int { width: 32, signed: false };
    assert_eq!(binary_scalar(O::UDiv, &uint, &Val::U32(1), &Val::U32(0)), Ok(Val::U32(0)));
    assert_eq!(binary_scalar(O::ShiftLeftLogical, &uint, &Val::U32(1), &Val::U32(31)), Ok(Val::U32(1 << 31)));
    assert_eq!(binary_scalar(O::ShiftLeftLogical, &uint, &Val::U32(1), &Val::U32(32)), Ok(Val::U32(0)));
  }

  #[test]
  fn unordered_comparisons() {
    let nan = Val::F32(f32::NAN);
    assert_eq!(binary_scalar(O::FOrdEqual, &IrType::Bool, &nan, &nan), Ok(Val::Bool(false)));
    assert_eq!(binary_scalar(O::FUnordNotEqual, &IrType::Bool, &nan, &nan), Ok(Val::Bool(true)));
    assert_eq!(binary_scalar(O::FOrdNotEqual, &IrType::Bool, &nan, &nan), Ok(Val::Bool(false)));
  }

  #[test]
  fn bit_queries() {
    let int = IrType::Int { width: 32, signed: true };
    assert_eq!(ext_scalar(GLOp::FindILsb, &int, &[Val::I32(0)]), Ok(Val::I32(-1)));
    assert_eq!(ext_scalar(GLOp::FindILsb, &int, &[Val::I32(8)]), Ok(Val::I32(3)));
    assert_eq!(ext_scalar(GLOp::FindSMsb, &int, &[Val::I32(-1)]), Ok(Val::I32(-1)));
    assert_eq!(ext_scalar(GLOp::FindSMsb, &int, &[Val::I32(5)]), Ok(Val::I32(2)));
    assert_eq!(unary_scalar(O::BitReverse, &int, &Val::I32(1)), Ok(Val::I32(i32::MIN)));
  }

  #[test]
  fn matrices() {
    let m = vec![vec![2., 0.], vec![1., 1.]];
    assert_eq!(mat_vec(&m, &[1., 1.]), vec![3., 1.]);
    assert_eq!(determinant(&m), 2.);
    assert_eq!(inverse(&m), vec![vec![0.5, 0.], vec![-0.5, 1.]]);

    let m3 = vec![vec![1., 0., 0.], vec![0., 2., 0.], vec![0., 0., 3.]];
    assert_eq!(determinant(&m3), 6.);
  }

  #[test]
  fn scan_identities() {
    let int = IrType::Int { width: 32, signed: true };
    assert_eq!(identity(O::GroupNonUniformSMin, &int), Ok(Val::I32(i32::MAX)));
    assert_eq!(identity(O::GroupNonUniformSMax, &int), Ok(Val::I32(i32::MIN)));
    assert_eq!(
      identity(O::GroupNonUniformFMin, &IrType::Float { width: 32 }),
      Ok(Val::F32(f32::INFINITY))
    );
  }
}
