//! Expressions.

use crate::{
  config::SpirvVersion,
  error::{CompileError, UsageError},
  expr::{BinOp, ErasedExpr, ExprNode, Literal, UnOp},
  fun::{ErasedFunHandle, GroupOperation, SubgroupOp},
  ir::{Constant, IrType, Op, Operand},
  memory::MemoryLayout,
  scope::ScopedHandle,
  stage::ShaderStage,
  types::{ScalarType, Type},
};

use super::{FunCtx, Lowerer};

impl<'a> Lowerer<'a> {
  /// Lower a whole expression, as used by a statement.
  pub(crate) fn eval(&mut self, f: &mut FunCtx, expr: &ErasedExpr) -> Result<Operand, CompileError> {
    f.memo.clear();
    self.expr(f, expr)
  }

  /// Lower a sub-expression; shared nodes are lowered once per statement.
  pub(crate) fn expr(&mut self, f: &mut FunCtx, expr: &ErasedExpr) -> Result<Operand, CompileError> {
    if let Some(&value) = f.memo.get(&expr.id()) {
      return Ok(value);
    }

    let value = self.node(f, expr)?;
    f.memo.insert(expr.id(), value);
    Ok(value)
  }

  fn node(&mut self, f: &mut FunCtx, expr: &ErasedExpr) -> Result<Operand, CompileError> {
    let ty = expr.ty();

    match expr.node() {
      ExprNode::Lit(lit) => Ok(Operand::Constant(self.literal(*lit))),

      ExprNode::Construct(parts) => self.construct(f, ty, parts),

      ExprNode::Var(ScopedHandle::FunArg(index)) => Ok(Operand::Param(*index as u32)),

      ExprNode::Var(ScopedHandle::Global(handle)) => self
        .consts
        .get(handle)
        .map(|&constant| Operand::Constant(constant))
        .ok_or_else(|| UsageError::UndefinedVariable(format!("constant{}", handle)).into()),

      ExprNode::Var(_) => {
        let place = self.place(f, expr)?.ok_or(UsageError::NotAssignable)?;
        self.load(f, &place)
      }

      ExprNode::Unary(op, a) => {
        let value = self.expr(f, a)?;
        self.unary(f, *op, value, ty)
      }

      ExprNode::Binary(op, a, b) => {
        let left = self.expr(f, a)?;
        let right = self.expr(f, b)?;
        self.binary(f, *op, (left, a.ty()), (right, b.ty()), ty)
      }

      ExprNode::Cast(a) => {
        let value = self.expr(f, a)?;
        Ok(self.cast(f, value, a.ty(), ty))
      }

      ExprNode::Bitcast(a) => {
        let value = self.expr(f, a)?;
        let from = self.ir_type(a.ty(), MemoryLayout::Logical);
        let to = self.ir_type(ty, MemoryLayout::Logical);

        if from == to {
          Ok(value)
        } else {
          Ok(f.value(
            to,
            Op::Unary {
              op: spirv::Op::Bitcast,
              operand: value,
            },
          ))
        }
      }

      ExprNode::Select(condition, accept, reject) => {
        let condition = self.expr(f, condition)?;
        let accept = self.expr(f, accept)?;
        let reject = self.expr(f, reject)?;
        Ok(self.select(f, condition, accept, reject, ty))
      }

      ExprNode::FunCall(handle, args) => self.call(f, *handle, args, ty),

      ExprNode::Swizzle(object, swizzle) => {
        if let Some(place) = self.place(f, expr)? {
          return self.load(f, &place);
        }

        let value = self.expr(f, object)?;
        let result = self.ir_type(ty, MemoryLayout::Logical);
        let indices = swizzle.indices();

        if let [index] = indices[..] {
          Ok(f.value(
            result,
            Op::Extract {
              composite: value,
              indices: vec![index],
            },
          ))
        } else {
          Ok(f.value(
            result,
            Op::Shuffle {
              first: value,
              second: value,
              components: indices,
            },
          ))
        }
      }

      ExprNode::Field { object, index } => {
        if let Some(place) = self.place(f, expr)? {
          return self.load(f, &place);
        }

        let value = self.expr(f, object)?;
        let result = self.ir_type(ty, MemoryLayout::Logical);
        Ok(f.value(
          result,
          Op::Extract {
            composite: value,
            indices: vec![*index],
          },
        ))
      }

      ExprNode::ArrayLookup { object, index } => {
        if let Some(place) = self.place(f, expr)? {
          return self.load(f, &place);
        }

        let value = self.expr(f, object)?;
        let result = self.ir_type(ty, MemoryLayout::Logical);

        if let Some(index) = literal_index(index) {
          return Ok(f.value(
            result,
            Op::Extract {
              composite: value,
              indices: vec![index],
            },
          ));
        }

        // dynamic indexing goes through memory
        let index = self.expr(f, index)?;
        let pointee = self.ir_type(object.ty(), MemoryLayout::Logical);
        let pointer = self.types.insert(IrType::Pointer {
          class: spirv::StorageClass::Function,
          pointee,
        });
        let temp = f.local(None, pointer, pointee);
        f.effect(Op::Store {
          pointer: Operand::Local(temp),
          value,
        });

        let element = self.types.insert(IrType::Pointer {
          class: spirv::StorageClass::Function,
          pointee: result,
        });
        let chain = f.value(
          element,
          Op::AccessChain {
            base: Operand::Local(temp),
            indices: vec![index],
          },
        );

        Ok(f.value(result, Op::Load { pointer: chain }))
      }

      ExprNode::ArrayLength(array) => self.array_length(f, array),

      ExprNode::Invalid(error) => Err(error.clone().into()),
    }
  }

  fn construct(&mut self, f: &mut FunCtx, ty: &Type, parts: &[ErasedExpr]) -> Result<Operand, CompileError> {
    let mut values = Vec::with_capacity(parts.len());
    for part in parts {
      values.push(self.expr(f, part)?);
    }

    let result = self.ir_type(ty, MemoryLayout::Logical);

    match ty {
      Type::Vector(_, n) => {
        // a single scalar fills the vector
        if let ([value], [part]) = (&values[..], parts) {
          if part.ty().is_scalar() {
            values = vec![*value; *n as usize];
          }
        }

        // vector constants are flattened into their components
        let mut scalars = Vec::new();
        for value in &values {
          match value {
            Operand::Constant(c) => match &self.constants[*c] {
              Constant::Composite { parts, .. } => scalars.extend(parts.iter().copied()),
              _ => scalars.push(*c),
            },
            _ => break,
          }
        }

        if scalars.len() == *n as usize {
          return Ok(Operand::Constant(self.constants.insert(Constant::Composite {
            ty: result,
            parts: scalars,
          })));
        }
      }

      Type::Matrix { scalar, columns, rows }
        if values.len() == (columns * rows) as usize && parts[0].ty().is_scalar() =>
      {
        // column-major scalars
        let column = Type::Vector(*scalar, *rows);
        let mut grouped = Vec::with_capacity(*columns as usize);
        for chunk in parts.chunks(*rows as usize) {
          grouped.push(self.construct(f, &column, chunk)?);
        }

        values = grouped;
      }

      _ => (),
    }

    let constants: Option<Vec<_>> = values
      .iter()
      .map(|value| match value {
        Operand::Constant(c) => Some(*c),
        _ => None,
      })
      .collect();

    match constants {
      Some(parts) => Ok(Operand::Constant(self.constants.insert(Constant::Composite { ty: result, parts }))),
      None => Ok(f.value(result, Op::Construct { parts: values })),
    }
  }

  /// Repeat a scalar to fill a vector of type `ty`; other types are left untouched.
  fn splat(&mut self, f: &mut FunCtx, value: Operand, ty: &Type) -> Operand {
    let Type::Vector(_, n) = ty else {
      return value;
    };

    let result = self.ir_type(ty, MemoryLayout::Logical);
    match value {
      Operand::Constant(c) => Operand::Constant(self.constants.insert(Constant::Composite {
        ty: result,
        parts: vec![c; *n as usize],
      })),
      _ => f.value(
        result,
        Op::Construct {
          parts: vec![value; *n as usize],
        },
      ),
    }
  }

  fn unary(&mut self, f: &mut FunCtx, op: UnOp, value: Operand, ty: &Type) -> Result<Operand, CompileError> {
    let s = ty.scalar().unwrap_or(ScalarType::Float);
    let result = self.ir_type(ty, MemoryLayout::Logical);

    let op = match (op, s) {
      (UnOp::Not, ScalarType::Bool) => spirv::Op::LogicalNot,
      (UnOp::Not, _) => spirv::Op::Not,
      (UnOp::Neg, ScalarType::Float | ScalarType::Double) => spirv::Op::FNegate,
      (UnOp::Neg, _) => spirv::Op::SNegate,
    };

    if let Type::Matrix { scalar, columns, rows } = ty {
      let column = Type::Vector(*scalar, *rows);
      return Ok(self.per_column(f, *columns, &column, result, |_, f, column_ty, c| {
        f.value(column_ty, Op::Unary { op, operand: c[0] })
      }, &[value]));
    }

    Ok(f.value(result, Op::Unary { op, operand: value }))
  }

  /// Apply `op` to every column of matrices.
  fn per_column(
    &mut self,
    f: &mut FunCtx,
    columns: u32,
    column: &Type,
    result: crate::ir::Handle<IrType>,
    mut op: impl FnMut(&mut Self, &mut FunCtx, crate::ir::Handle<IrType>, &[Operand]) -> Operand,
    matrices: &[Operand],
  ) -> Operand {
    let column_ty = self.ir_type(column, MemoryLayout::Logical);
    let parts = (0..columns)
      .map(|i| {
        let extracted: Vec<_> = matrices
          .iter()
          .map(|&m| {
            f.value(
              column_ty,
              Op::Extract {
                composite: m,
                indices: vec![i],
              },
            )
          })
          .collect();

        op(self, f, column_ty, &extracted)
      })
      .collect();

    f.value(result, Op::Construct { parts })
  }

  fn binary(
    &mut self,
    f: &mut FunCtx,
    op: BinOp,
    (left, left_ty): (Operand, &Type),
    (right, right_ty): (Operand, &Type),
    ty: &Type,
  ) -> Result<Operand, CompileError> {
    if op.is_comparison() {
      return Ok(self.compare(f, op, left, right, left_ty));
    }

    let result = self.ir_type(ty, MemoryLayout::Logical);
    let s = left_ty.scalar().unwrap_or(ScalarType::Float);
    let float = matches!(s, ScalarType::Float | ScalarType::Double);

    // matrix arithmetic
    match (left_ty, right_ty) {
      (Type::Matrix { scalar, columns, rows }, Type::Matrix { .. }) if matches!(op, BinOp::Add | BinOp::Sub) => {
        let column_op = if op == BinOp::Add {
          spirv::Op::FAdd
        } else {
          spirv::Op::FSub
        };
        let column = Type::Vector(*scalar, *rows);
        return Ok(self.per_column(f, *columns, &column, result, |_, f, column_ty, c| {
          f.value(
            column_ty,
            Op::Binary {
              op: column_op,
              left: c[0],
              right: c[1],
            },
          )
        }, &[left, right]));
      }

      (Type::Matrix { .. }, _) | (_, Type::Matrix { .. }) if op == BinOp::Mul => {
        let (op, left, right) = match (left_ty, right_ty) {
          (Type::Matrix { .. }, Type::Matrix { .. }) => (spirv::Op::MatrixTimesMatrix, left, right),
          (Type::Matrix { .. }, Type::Vector(..)) => (spirv::Op::MatrixTimesVector, left, right),
          (Type::Vector(..), Type::Matrix { .. }) => (spirv::Op::VectorTimesMatrix, left, right),
          (Type::Matrix { .. }, _) => (spirv::Op::MatrixTimesScalar, left, right),
          _ => (spirv::Op::MatrixTimesScalar, right, left),
        };

        return Ok(f.value(result, Op::Binary { op, left, right }));
      }

      _ => (),
    }

    // vector times scalar has its own instruction
    if float && op == BinOp::Mul {
      match (left_ty, right_ty) {
        (Type::Vector(..), Type::Scalar(_)) => {
          return Ok(f.value(
            result,
            Op::Binary {
              op: spirv::Op::VectorTimesScalar,
              left,
              right,
            },
          ))
        }
        (Type::Scalar(_), Type::Vector(..)) => {
          return Ok(f.value(
            result,
            Op::Binary {
              op: spirv::Op::VectorTimesScalar,
              left: right,
              right: left,
            },
          ))
        }
        _ => (),
      }
    }

    let spirv_op = match op {
      BinOp::Add if float => spirv::Op::FAdd,
      BinOp::Add => spirv::Op::IAdd,
      BinOp::Sub if float => spirv::Op::FSub,
      BinOp::Sub => spirv::Op::ISub,
      BinOp::Mul if float => spirv::Op::FMul,
      BinOp::Mul => spirv::Op::IMul,
      BinOp::Div if float => spirv::Op::FDiv,
      BinOp::Div if s.is_signed() => spirv::Op::SDiv,
      BinOp::Div => spirv::Op::UDiv,
      BinOp::Rem if float => spirv::Op::FRem,
      BinOp::Rem if s.is_signed() => spirv::Op::SRem,
      BinOp::Rem => spirv::Op::UMod,
      BinOp::Shl => spirv::Op::ShiftLeftLogical,
      BinOp::Shr if s.is_signed() => spirv::Op::ShiftRightArithmetic,
      BinOp::Shr => spirv::Op::ShiftRightLogical,
      BinOp::BitAnd | BinOp::And if s == ScalarType::Bool => spirv::Op::LogicalAnd,
      BinOp::BitOr | BinOp::Or if s == ScalarType::Bool => spirv::Op::LogicalOr,
      BinOp::BitXor | BinOp::Xor if s == ScalarType::Bool => spirv::Op::LogicalNotEqual,
      BinOp::BitAnd | BinOp::And => spirv::Op::BitwiseAnd,
      BinOp::BitOr | BinOp::Or => spirv::Op::BitwiseOr,
      BinOp::BitXor | BinOp::Xor => spirv::Op::BitwiseXor,
      BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => unreachable!(),
    };

    // scalar operands of vector operations are repeated
    let (left, right) = match (left_ty, right_ty) {
      (Type::Vector(..), Type::Scalar(rs)) => {
        let splat_ty = Type::with_components(*rs, left_ty.components().unwrap_or(1));
        (left, self.splat(f, right, &splat_ty))
      }
      (Type::Scalar(_), Type::Vector(..)) => (self.splat(f, left, ty), right),
      _ => (left, right),
    };

    Ok(f.value(
      result,
      Op::Binary {
        op: spirv_op,
        left,
        right,
      },
    ))
  }

  /// Compare two values of type `ty`; the result is a single boolean.
  fn compare(&mut self, f: &mut FunCtx, op: BinOp, left: Operand, right: Operand, ty: &Type) -> Operand {
    let bool_ty = self.bool_type();

    let members: Option<Vec<(u32, Type)>> = match ty {
      Type::Matrix { scalar, columns, rows } => {
        Some((0..*columns).map(|i| (i, Type::Vector(*scalar, *rows))).collect())
      }
      Type::Array(elem, n) => Some((0..*n).map(|i| (i, (**elem).clone())).collect()),
      Type::Struct(st) => Some(st.fields.iter().enumerate().map(|(i, f)| (i as u32, f.ty.clone())).collect()),
      _ => None,
    };

    // aggregates are equal when all their members are
    if let Some(members) = members {
      let mut all = None;
      for (i, member_ty) in members {
        let member = self.ir_type(&member_ty, MemoryLayout::Logical);
        let l = f.value(
          member,
          Op::Extract {
            composite: left,
            indices: vec![i],
          },
        );
        let r = f.value(
          member,
          Op::Extract {
            composite: right,
            indices: vec![i],
          },
        );
        let eq = self.compare(f, BinOp::Eq, l, r, &member_ty);

        all = Some(match all {
          None => eq,
          Some(acc) => f.value(
            bool_ty,
            Op::Binary {
              op: spirv::Op::LogicalAnd,
              left: acc,
              right: eq,
            },
          ),
        });
      }

      let all = all.unwrap_or_else(|| Operand::Constant(self.scalar(ScalarType::Bool, 1)));
      return if op == BinOp::Neq {
        f.value(
          bool_ty,
          Op::Unary {
            op: spirv::Op::LogicalNot,
            operand: all,
          },
        )
      } else {
        all
      };
    }

    let s = ty.scalar().unwrap_or(ScalarType::Float);
    let spirv_op = match (s, op) {
      (ScalarType::Bool, BinOp::Eq) => spirv::Op::LogicalEqual,
      (ScalarType::Bool, _) => spirv::Op::LogicalNotEqual,
      (ScalarType::Float | ScalarType::Double, BinOp::Eq) => spirv::Op::FOrdEqual,
      (ScalarType::Float | ScalarType::Double, BinOp::Neq) => spirv::Op::FUnordNotEqual,
      (ScalarType::Float | ScalarType::Double, BinOp::Lt) => spirv::Op::FOrdLessThan,
      (ScalarType::Float | ScalarType::Double, BinOp::Lte) => spirv::Op::FOrdLessThanEqual,
      (ScalarType::Float | ScalarType::Double, BinOp::Gt) => spirv::Op::FOrdGreaterThan,
      (ScalarType::Float | ScalarType::Double, _) => spirv::Op::FOrdGreaterThanEqual,
      (_, BinOp::Eq) => spirv::Op::IEqual,
      (_, BinOp::Neq) => spirv::Op::INotEqual,
      (s, BinOp::Lt) if s.is_signed() => spirv::Op::SLessThan,
      (_, BinOp::Lt) => spirv::Op::ULessThan,
      (s, BinOp::Lte) if s.is_signed() => spirv::Op::SLessThanEqual,
      (_, BinOp::Lte) => spirv::Op::ULessThanEqual,
      (s, BinOp::Gt) if s.is_signed() => spirv::Op::SGreaterThan,
      (_, BinOp::Gt) => spirv::Op::UGreaterThan,
      (s, _) if s.is_signed() => spirv::Op::SGreaterThanEqual,
      _ => spirv::Op::UGreaterThanEqual,
    };

    let n = ty.components().unwrap_or(1);
    let result = self.ir_type(&Type::with_components(ScalarType::Bool, n), MemoryLayout::Logical);
    let compared = f.value(
      result,
      Op::Binary {
        op: spirv_op,
        left,
        right,
      },
    );

    if n == 1 {
      return compared;
    }

    // vectors are equal when all their components are, different when any is
    let reduce = if op == BinOp::Neq {
      spirv::Op::Any
    } else {
      spirv::Op::All
    };

    f.value(
      bool_ty,
      Op::Unary {
        op: reduce,
        operand: compared,
      },
    )
  }

  /// Value-preserving conversion of scalars and vectors.
  pub(crate) fn cast(&mut self, f: &mut FunCtx, value: Operand, from: &Type, to: &Type) -> Operand {
    let (Some(fs), Some(ts)) = (from.scalar(), to.scalar()) else {
      return value;
    };

    if fs == ts {
      return value;
    }

    let n = to.components().unwrap_or(1);
    let result = self.ir_type(to, MemoryLayout::Logical);
    let is_float = |s: ScalarType| matches!(s, ScalarType::Float | ScalarType::Double);

    if fs == ScalarType::Bool {
      let one = Operand::Constant(self.splat_constant(to, true));
      let zero = Operand::Constant(self.splat_constant(to, false));
      return f.value(
        result,
        Op::Select {
          condition: value,
          accept: one,
          reject: zero,
        },
      );
    }

    if ts == ScalarType::Bool {
      let zero = Operand::Constant(self.splat_constant(from, false));
      let op = if is_float(fs) {
        spirv::Op::FUnordNotEqual
      } else {
        spirv::Op::INotEqual
      };

      return f.value(
        result,
        Op::Binary {
          op,
          left: value,
          right: zero,
        },
      );
    }

    let unary = |f: &mut FunCtx, ty, op, operand| f.value(ty, Op::Unary { op, operand });

    match (is_float(fs), is_float(ts)) {
      (true, true) => unary(f, result, spirv::Op::FConvert, value),
      (false, true) if fs.is_signed() => unary(f, result, spirv::Op::ConvertSToF, value),
      (false, true) => unary(f, result, spirv::Op::ConvertUToF, value),
      (true, false) if ts.is_signed() => unary(f, result, spirv::Op::ConvertFToS, value),
      (true, false) => unary(f, result, spirv::Op::ConvertFToU, value),

      (false, false) if fs.width() == ts.width() => unary(f, result, spirv::Op::Bitcast, value),

      // width conversions keep the signedness of the source, then reinterpret
      (false, false) => {
        let widened = match (fs.is_signed(), ts.width()) {
          (true, 64) => ScalarType::Int64,
          (true, _) => ScalarType::Int,
          (false, 64) => ScalarType::UInt64,
          (false, _) => ScalarType::UInt,
        };
        let op = if fs.is_signed() {
          spirv::Op::SConvert
        } else {
          spirv::Op::UConvert
        };

        let widened_ty = Type::with_components(widened, n);
        let widened_ir = self.ir_type(&widened_ty, MemoryLayout::Logical);
        let converted = unary(f, widened_ir, op, value);

        if widened == ts {
          converted
        } else {
          unary(f, result, spirv::Op::Bitcast, converted)
        }
      }
    }
  }

  fn select(&mut self, f: &mut FunCtx, condition: Operand, accept: Operand, reject: Operand, ty: &Type) -> Operand {
    let result = self.ir_type(ty, MemoryLayout::Logical);

    let members: Option<Vec<Type>> = match ty {
      Type::Matrix { scalar, columns, rows } => Some(vec![Type::Vector(*scalar, *rows); *columns as usize]),
      Type::Array(elem, n) => Some(vec![(**elem).clone(); *n as usize]),
      Type::Struct(st) => Some(st.fields.iter().map(|field| field.ty.clone()).collect()),
      _ => None,
    };

    // composites are selected member per member
    if let Some(members) = members {
      let parts = members
        .iter()
        .enumerate()
        .map(|(i, member_ty)| {
          let member = self.ir_type(member_ty, MemoryLayout::Logical);
          let extract = |f: &mut FunCtx, composite| {
            f.value(
              member,
              Op::Extract {
                composite,
                indices: vec![i as u32],
              },
            )
          };
          let a = extract(f, accept);
          let r = extract(f, reject);
          self.select(f, condition, a, r, member_ty)
        })
        .collect();

      return f.value(result, Op::Construct { parts });
    }

    let condition = match ty {
      Type::Vector(_, n) => self.splat(f, condition, &Type::Vector(ScalarType::Bool, *n)),
      _ => condition,
    };

    f.value(
      result,
      Op::Select {
        condition,
        accept,
        reject,
      },
    )
  }

  fn call(
    &mut self,
    f: &mut FunCtx,
    handle: ErasedFunHandle,
    args: &[ErasedExpr],
    ty: &Type,
  ) -> Result<Operand, CompileError> {
    use spirv::GLOp;
    use ErasedFunHandle as H;

    match handle {
      H::UserDefined(index) => return self.call_user(f, index, args, ty),
      H::Subgroup(op) => return self.subgroup(f, op, args, ty),
      H::ImageSample | H::ImageSampleLod | H::ImageFetch | H::ImageRead | H::ImageSize => {
        return self.image(f, handle, args, ty)
      }
      _ => (),
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
      values.push(self.expr(f, arg)?);
    }

    let result = self.ir_type(ty, MemoryLayout::Logical);
    let s = args
      .first()
      .and_then(|arg| arg.ty().scalar())
      .unwrap_or(ScalarType::Float);
    let float = matches!(s, ScalarType::Float | ScalarType::Double);
    let by_sign = |fl, si, un| {
      if float {
        fl
      } else if s.is_signed() {
        si
      } else {
        un
      }
    };

    let core = |op: spirv::Op| Some(op);
    let (ext, core_op) = match handle {
      H::Radians => (Some(GLOp::Radians), None),
      H::Degrees => (Some(GLOp::Degrees), None),
      H::Sin => (Some(GLOp::Sin), None),
      H::Cos => (Some(GLOp::Cos), None),
      H::Tan => (Some(GLOp::Tan), None),
      H::ASin => (Some(GLOp::Asin), None),
      H::ACos => (Some(GLOp::Acos), None),
      H::ATan => (Some(GLOp::Atan), None),
      H::ATan2 => (Some(GLOp::Atan2), None),
      H::SinH => (Some(GLOp::Sinh), None),
      H::CosH => (Some(GLOp::Cosh), None),
      H::TanH => (Some(GLOp::Tanh), None),
      H::ASinH => (Some(GLOp::Asinh), None),
      H::ACosH => (Some(GLOp::Acosh), None),
      H::ATanH => (Some(GLOp::Atanh), None),
      H::Pow => (Some(GLOp::Pow), None),
      H::Exp => (Some(GLOp::Exp), None),
      H::Exp2 => (Some(GLOp::Exp2), None),
      H::Log => (Some(GLOp::Log), None),
      H::Log2 => (Some(GLOp::Log2), None),
      H::Sqrt => (Some(GLOp::Sqrt), None),
      H::InverseSqrt => (Some(GLOp::InverseSqrt), None),
      H::Abs => (Some(by_sign(GLOp::FAbs, GLOp::SAbs, GLOp::SAbs)), None),
      H::Sign => (Some(by_sign(GLOp::FSign, GLOp::SSign, GLOp::SSign)), None),
      H::Floor => (Some(GLOp::Floor), None),
      H::Trunc => (Some(GLOp::Trunc), None),
      H::Round => (Some(GLOp::Round), None),
      H::RoundEven => (Some(GLOp::RoundEven), None),
      H::Ceil => (Some(GLOp::Ceil), None),
      H::Fract => (Some(GLOp::Fract), None),
      H::Min => (Some(by_sign(GLOp::FMin, GLOp::SMin, GLOp::UMin)), None),
      H::Max => (Some(by_sign(GLOp::FMax, GLOp::SMax, GLOp::UMax)), None),
      H::Clamp => (Some(by_sign(GLOp::FClamp, GLOp::SClamp, GLOp::UClamp)), None),
      H::Mix if args.get(2).and_then(|a| a.ty().scalar()) == Some(ScalarType::Bool) => {
        // boolean selectors pick the second value where they are true
        return Ok(self.select(f, values[2], values[1], values[0], ty));
      }
      H::Mix => (Some(GLOp::FMix), None),
      H::Step => (Some(GLOp::Step), None),
      H::SmoothStep => (Some(GLOp::SmoothStep), None),
      H::IsNan => (None, core(spirv::Op::IsNan)),
      H::IsInf => (None, core(spirv::Op::IsInf)),
      H::FMA => (Some(GLOp::Fma), None),
      H::PackUnorm4x8 => (Some(GLOp::PackUnorm4x8), None),
      H::PackSnorm4x8 => (Some(GLOp::PackSnorm4x8), None),
      H::UnpackUnorm4x8 => (Some(GLOp::UnpackUnorm4x8), None),
      H::UnpackSnorm4x8 => (Some(GLOp::UnpackSnorm4x8), None),
      H::PackHalf2x16 => (Some(GLOp::PackHalf2x16), None),
      H::UnpackHalf2x16 => (Some(GLOp::UnpackHalf2x16), None),
      H::Length => (Some(GLOp::Length), None),
      H::Distance => (Some(GLOp::Distance), None),
      H::Dot if float => (None, core(spirv::Op::Dot)),
      H::Dot => return Ok(self.integer_dot(f, values[0], values[1], args[0].ty(), ty)),
      H::Cross => (Some(GLOp::Cross), None),
      H::Normalize => (Some(GLOp::Normalize), None),
      H::FaceForward => (Some(GLOp::FaceForward), None),
      H::Reflect => (Some(GLOp::Reflect), None),
      H::Refract => (Some(GLOp::Refract), None),
      H::Transpose => (None, core(spirv::Op::Transpose)),
      H::Determinant => (Some(GLOp::Determinant), None),
      H::Inverse => (Some(GLOp::MatrixInverse), None),
      H::Any => (None, core(spirv::Op::Any)),
      H::All => (None, core(spirv::Op::All)),
      H::BitCount => (None, core(spirv::Op::BitCount)),
      H::BitfieldReverse => (None, core(spirv::Op::BitReverse)),
      H::FindLSB => (Some(GLOp::FindILsb), None),
      H::FindMSB => (Some(if s.is_signed() { GLOp::FindSMsb } else { GLOp::FindUMsb }), None),
      H::DFDX | H::DFDY | H::FWidth | H::DFDXFine | H::DFDYFine | H::FWidthFine | H::DFDXCoarse | H::DFDYCoarse
      | H::FWidthCoarse => {
        if self.stage != ShaderStage::Fragment {
          return Err(self.invalid_stage("derivatives"));
        }

        let op = match handle {
          H::DFDX => spirv::Op::DPdx,
          H::DFDY => spirv::Op::DPdy,
          H::FWidth => spirv::Op::Fwidth,
          H::DFDXFine => spirv::Op::DPdxFine,
          H::DFDYFine => spirv::Op::DPdyFine,
          H::FWidthFine => spirv::Op::FwidthFine,
          H::DFDXCoarse => spirv::Op::DPdxCoarse,
          H::DFDYCoarse => spirv::Op::DPdyCoarse,
          _ => spirv::Op::FwidthCoarse,
        };

        if !matches!(handle, H::DFDX | H::DFDY | H::FWidth) {
          self.capabilities.insert(spirv::Capability::DerivativeControl);
        }

        (None, Some(op))
      }
      H::ImageSample
      | H::ImageSampleLod
      | H::ImageFetch
      | H::ImageRead
      | H::ImageSize
      | H::Subgroup(_)
      | H::UserDefined(_) => unreachable!(),
    };

    if let Some(op) = core_op {
      let op = match values[..] {
        [operand] => Op::Unary { op, operand },
        [left, right, ..] => Op::Binary { op, left, right },
        [] => return Err(UsageError::NotConstant(ty.clone()).into()),
      };

      return Ok(f.value(result, op));
    }

    let Some(op) = ext else {
      return Err(UsageError::NotConstant(ty.clone()).into());
    };

    // scalar arguments of vector functions are repeated, except refraction indices
    let repeats = !matches!(
      handle,
      H::Refract | H::UnpackUnorm4x8 | H::UnpackSnorm4x8 | H::UnpackHalf2x16
    );
    if ty.components().unwrap_or(1) > 1 && repeats {
      for (value, arg) in values.iter_mut().zip(args) {
        if arg.ty().is_scalar() {
          let splat_ty = Type::with_components(arg.ty().scalar().unwrap_or(s), ty.components().unwrap_or(1));
          *value = self.splat(f, *value, &splat_ty);
        }
      }
    }

    self.uses_glsl = true;
    Ok(f.value(result, Op::Ext { op, args: values }))
  }

  fn integer_dot(&mut self, f: &mut FunCtx, a: Operand, b: Operand, vector: &Type, ty: &Type) -> Operand {
    let vector_ty = self.ir_type(vector, MemoryLayout::Logical);
    let scalar_ty = self.ir_type(ty, MemoryLayout::Logical);

    let product = f.value(
      vector_ty,
      Op::Binary {
        op: spirv::Op::IMul,
        left: a,
        right: b,
      },
    );

    let mut sum = f.value(
      scalar_ty,
      Op::Extract {
        composite: product,
        indices: vec![0],
      },
    );

    for i in 1..vector.components().unwrap_or(1) {
      let component = f.value(
        scalar_ty,
        Op::Extract {
          composite: product,
          indices: vec![i],
        },
      );
      sum = f.value(
        scalar_ty,
        Op::Binary {
          op: spirv::Op::IAdd,
          left: sum,
          right: component,
        },
      );
    }

    sum
  }

  fn call_user(&mut self, f: &mut FunCtx, index: u16, args: &[ErasedExpr], ty: &Type) -> Result<Operand, CompileError> {
    let callee = self
      .user_functions
      .get(&index)
      .cloned()
      .ok_or_else(|| UsageError::UndefinedVariable(format!("fun{}", index)))?;

    let found: Vec<Type> = args.iter().map(|arg| arg.ty().clone()).collect();
    if found != callee.args {
      return Err(
        UsageError::ArgumentMismatch {
          function: callee.name,
          expected: callee.args,
          found,
        }
        .into(),
      );
    }

    if *ty != callee.ret {
      return Err(
        UsageError::ReturnMismatch {
          function: callee.name,
          expected: ty.clone(),
          found: callee.ret,
        }
        .into(),
      );
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
      values.push(self.expr(f, arg)?);
    }

    let result = self.ir_type(ty, MemoryLayout::Logical);
    Ok(f.value(
      result,
      Op::Call {
        function: callee.handle,
        args: values,
      },
    ))
  }

  fn subgroup(
    &mut self,
    f: &mut FunCtx,
    op: SubgroupOp,
    args: &[ErasedExpr],
    ty: &Type,
  ) -> Result<Operand, CompileError> {
    if self.version() < SpirvVersion::V1_3 {
      return Err(
        UsageError::VersionTooLow {
          what: "subgroup operations",
          required: SpirvVersion::V1_3,
        }
        .into(),
      );
    }

    let value = match args.first() {
      Some(arg) => Some(self.expr(f, arg)?),
      None => None,
    };

    let s = ty.scalar().unwrap_or(ScalarType::Float);
    let float = matches!(s, ScalarType::Float | ScalarType::Double);
    let pick = |fl, si, un| {
      if float {
        fl
      } else if s.is_signed() {
        si
      } else {
        un
      }
    };

    let (spirv_op, group, capability) = match op {
      SubgroupOp::Elect => (spirv::Op::GroupNonUniformElect, None, None),
      SubgroupOp::All => (
        spirv::Op::GroupNonUniformAll,
        None,
        Some(spirv::Capability::GroupNonUniformVote),
      ),
      SubgroupOp::Any => (
        spirv::Op::GroupNonUniformAny,
        None,
        Some(spirv::Capability::GroupNonUniformVote),
      ),
      SubgroupOp::BroadcastFirst => (
        spirv::Op::GroupNonUniformBroadcastFirst,
        None,
        Some(spirv::Capability::GroupNonUniformBallot),
      ),
      SubgroupOp::Add(g) => (
        pick(
          spirv::Op::GroupNonUniformFAdd,
          spirv::Op::GroupNonUniformIAdd,
          spirv::Op::GroupNonUniformIAdd,
        ),
        Some(g),
        Some(spirv::Capability::GroupNonUniformArithmetic),
      ),
      SubgroupOp::Mul(g) => (
        pick(
          spirv::Op::GroupNonUniformFMul,
          spirv::Op::GroupNonUniformIMul,
          spirv::Op::GroupNonUniformIMul,
        ),
        Some(g),
        Some(spirv::Capability::GroupNonUniformArithmetic),
      ),
      SubgroupOp::Min(g) => (
        pick(
          spirv::Op::GroupNonUniformFMin,
          spirv::Op::GroupNonUniformSMin,
          spirv::Op::GroupNonUniformUMin,
        ),
        Some(g),
        Some(spirv::Capability::GroupNonUniformArithmetic),
      ),
      SubgroupOp::Max(g) => (
        pick(
          spirv::Op::GroupNonUniformFMax,
          spirv::Op::GroupNonUniformSMax,
          spirv::Op::GroupNonUniformUMax,
        ),
        Some(g),
        Some(spirv::Capability::GroupNonUniformArithmetic),
      ),
    };

    self.capabilities.insert(spirv::Capability::GroupNonUniform);
    if let Some(capability) = capability {
      self.capabilities.insert(capability);
    }

    let group = group.map(|g| match g {
      GroupOperation::Reduce => spirv::GroupOperation::Reduce,
      GroupOperation::InclusiveScan => spirv::GroupOperation::InclusiveScan,
      GroupOperation::ExclusiveScan => spirv::GroupOperation::ExclusiveScan,
    });

    let result = self.ir_type(ty, MemoryLayout::Logical);
    Ok(f.value(
      result,
      Op::GroupNonUniform {
        op: spirv_op,
        group,
        value,
      },
    ))
  }

  fn image(
    &mut self,
    f: &mut FunCtx,
    handle: ErasedFunHandle,
    args: &[ErasedExpr],
    ty: &Type,
  ) -> Result<Operand, CompileError> {
    let Some(image_arg) = args.first() else {
      return Err(UsageError::NotConstant(ty.clone()).into());
    };

    self.check_access(image_arg, false)?;

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
      values.push(self.expr(f, arg)?);
    }

    let result = self.ir_type(ty, MemoryLayout::Logical);

    // separate images are combined with their sampler
    let (image, rest) = match (image_arg.ty(), args.get(1).map(|arg| arg.ty())) {
      (Type::Image(img), Some(Type::Sampler))
        if matches!(handle, ErasedFunHandle::ImageSample | ErasedFunHandle::ImageSampleLod) =>
      {
        let sampled_ty = self.ir_type(&Type::SampledImage(*img), MemoryLayout::Logical);
        let combined = f.value(
          sampled_ty,
          Op::SampledImage {
            image: values[0],
            sampler: values[1],
          },
        );
        (combined, &values[2..])
      }
      _ => (values[0], &values[1..]),
    };
    let rest = rest.to_vec();

    match handle {
      ErasedFunHandle::ImageSample | ErasedFunHandle::ImageSampleLod => {
        let coordinate = rest.first().copied().ok_or(UsageError::NotConstant(ty.clone()))?;
        let lod = match (handle, rest.get(1)) {
          (ErasedFunHandle::ImageSampleLod, Some(&lod)) => Some(lod),
          // implicit levels of detail need derivatives
          _ if self.stage != ShaderStage::Fragment => {
            Some(Operand::Constant(self.scalar(ScalarType::Float, 0f32.to_bits() as u64)))
          }
          _ => None,
        };

        Ok(f.value(
          result,
          Op::ImageSample {
            sampled_image: image,
            coordinate,
            lod,
          },
        ))
      }

      ErasedFunHandle::ImageFetch => {
        let image = self.underlying_image(f, image, image_arg.ty());
        let coordinate = rest.first().copied().ok_or(UsageError::NotConstant(ty.clone()))?;
        Ok(f.value(
          result,
          Op::ImageFetch {
            image,
            coordinate,
            lod: rest.get(1).copied(),
          },
        ))
      }

      ErasedFunHandle::ImageRead => {
        let coordinate = rest.first().copied().ok_or(UsageError::NotConstant(ty.clone()))?;
        Ok(f.value(result, Op::ImageRead { image, coordinate }))
      }

      _ => {
        self.capabilities.insert(spirv::Capability::ImageQuery);
        let image = self.underlying_image(f, image, image_arg.ty());
        Ok(f.value(
          result,
          Op::ImageQuerySize {
            image,
            lod: rest.first().copied(),
          },
        ))
      }
    }
  }

  /// Image of a combined image-sampler.
  fn underlying_image(&mut self, f: &mut FunCtx, image: Operand, ty: &Type) -> Operand {
    match ty {
      Type::SampledImage(img) => {
        let image_ty = self.ir_type(&Type::Image(*img), MemoryLayout::Logical);
        f.value(image_ty, Op::Image { sampled_image: image })
      }
      _ => image,
    }
  }
}

/// Constant non-negative index.
fn literal_index(index: &ErasedExpr) -> Option<u32> {
  match index.as_literal()? {
    Literal::Int(i) if i >= 0 => Some(i as u32),
    Literal::UInt(u) => Some(u),
    _ => None,
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    config::CompileOptions,
    ir::{Module, Terminator},
    layout::PipelineLayout,
    lit,
    scope::Scope,
    stage::StageBuilder,
    stdlib::{Geometry as _, Trigonometry as _},
    types::{V3, V4},
  };

  fn main_body(module: &Module) -> Vec<&Op> {
    let fun = &module.functions[module.entry_point];
    fun
      .block_order()
      .into_iter()
      .flat_map(|b| fun.blocks[b].body.iter().map(|i| &i.op))
      .collect()
  }

  fn compile(stage: &crate::stage::Stage) -> Module {
    let options = CompileOptions::default().promote_variables(false);
    stage.compile(&PipelineLayout::new(), &options).unwrap()
  }

  #[test]
  fn constant_vectors_are_folded() {
    let stage = StageBuilder::new_vertex_shader(|s, _, out| {
      s.main_fun(|s: &mut Scope<()>| {
        s.set(&out.position, lit!(0f32, 0., 0., 1.));
      })
    });

    let module = compile(&stage);
    let ops = main_body(&module);
    assert!(ops.iter().all(|op| !matches!(op, Op::Construct { .. })));
    assert!(matches!(
      ops.last(),
      Some(Op::Store {
        value: Operand::Constant(_),
        ..
      })
    ));
  }

  #[test]
  fn vector_comparisons_reduce() {
    let stage = StageBuilder::new_vertex_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let a = s.var(lit!(1f32, 2., 3.));
        let _eq = s.var(a.eq(lit!(1f32, 2., 3.)));
        let _neq = s.var(a.neq(lit!(1f32, 2., 3.)));
      })
    });

    let module = compile(&stage);
    let ops = main_body(&module);
    let reductions: Vec<_> = ops
      .iter()
      .filter_map(|op| match op {
        Op::Unary { op, .. } if matches!(op, spirv::Op::All | spirv::Op::Any) => Some(*op),
        _ => None,
      })
      .collect();
    assert_eq!(reductions, vec![spirv::Op::All, spirv::Op::Any]);
  }

  #[test]
  fn widening_unsigned_to_signed() {
    let stage = StageBuilder::new_vertex_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let x = s.var(3u32);
        let _y = s.var(x.cast::<i64>());
      })
    });

    let module = compile(&stage);
    let conversions: Vec<_> = main_body(&module)
      .into_iter()
      .filter_map(|op| match op {
        Op::Unary { op, .. } => Some(*op),
        _ => None,
      })
      .collect();

    assert_eq!(conversions, vec![spirv::Op::UConvert, spirv::Op::Bitcast]);
    assert!(module.capabilities.contains(&spirv::Capability::Int64));
  }

  #[test]
  fn extended_instructions() {
    let stage = StageBuilder::new_vertex_shader(|s, _, out| {
      s.main_fun(|s: &mut Scope<()>| {
        let n = s.var(lit!(0f32, 1., 0.).normalize());
        let angle = s.var(lit!(0.5f32).sin());
        s.set(&out.position, crate::vec4!(n * angle, 1f32));
      })
    });

    let module = compile(&stage);
    assert!(module.uses_glsl);

    let ext: Vec<_> = main_body(&module)
      .into_iter()
      .filter_map(|op| match op {
        Op::Ext { op, .. } => Some(*op),
        _ => None,
      })
      .collect();
    assert_eq!(ext, vec![spirv::GLOp::Normalize, spirv::GLOp::Sin]);
  }

  #[test]
  fn subgroups_need_recent_versions() {
    let stage = StageBuilder::new_compute_shader([32, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let _sum = s.var(crate::group::subgroup_add(input.local_invocation_index.clone()));
      })
    });

    let options = CompileOptions::default().spirv_version(SpirvVersion::V1_0);
    assert_eq!(
      stage.compile(&PipelineLayout::new(), &options).unwrap_err(),
      UsageError::VersionTooLow {
        what: "subgroup operations",
        required: SpirvVersion::V1_3
      }
      .into()
    );

    let module = stage.compile(&PipelineLayout::new(), &CompileOptions::default()).unwrap();
    assert!(module.capabilities.contains(&spirv::Capability::GroupNonUniformArithmetic));
  }

  #[test]
  fn argument_mismatch() {
    let stage = StageBuilder::new_vertex_shader(|mut s, _, _| {
      let mut f = s.function::<f32>("scale");
      let x = f.par::<f32>();
      let mut body = f.begin();
      body.leave(&x * 2.);
      let scale = s.end_function(body);

      s.main_fun(|s: &mut Scope<()>| {
        let _y = s.var(scale.call::<f32>(vec![lit!(1i32).erase()]));
      })
    });

    let err = stage
      .compile(&PipelineLayout::new(), &CompileOptions::default())
      .unwrap_err();
    assert!(matches!(
      err,
      CompileError::Usage(UsageError::ArgumentMismatch { .. })
    ));
  }

  #[test]
  fn void_main_ends_with_return() {
    let stage = StageBuilder::new_vertex_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let _v = s.var(V4::<f32>::from([1., 2., 3., 4.]));
        let _w = s.var(V3::<i32>::from([1, 2, 3]));
      })
    });

    let module = compile(&stage);
    let fun = &module.functions[module.entry_point];
    assert_eq!(fun.blocks[fun.entry()].terminator, Terminator::Return);
  }
}
