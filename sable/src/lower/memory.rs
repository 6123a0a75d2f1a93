//! Memory accesses.
//!
//! Assignable expressions (variables, and the fields, elements and swizzles of variables) designate a [`Place`]: a
//! variable and the access chain into it. Interface variables are created the first time a place refers to them.

use crate::{
  binding::Access,
  builtin::BuiltIn,
  error::{CompileError, UsageError},
  expr::{ErasedExpr, ExprNode},
  interface::{Interpolation, Sampling},
  ir::{BlockDecoration, Decoration, IrStruct, IrType, Member, Op, Operand},
  layout::is_integer_varying,
  memory::{matrix_stride, MemoryLayout},
  reflect::DescriptorKind,
  scope::{InterfaceHandle, InterfaceKind, ScopedHandle},
  stage::{ShaderStage, StageConfig},
  types::{ScalarType, Type},
};

use super::{FunCtx, InterfaceGlobal, Lowerer};

/// Number of vertices of the input patches of tessellation shaders.
const MAX_PATCH_VERTICES: u32 = 32;

/// Variable, or part of a variable, designated by an expression.
#[derive(Clone, Debug)]
pub(crate) struct Place {
  base: Operand,
  indices: Vec<Operand>,
  root: Root,
  layout: MemoryLayout,
  class: spirv::StorageClass,
  /// Type of the designated value, before swizzling.
  ty: Type,
  swizzle: Option<Vec<u32>>,
  /// The place is a whole array of descriptors; the flag tells whether they are buffers.
  binding_array: Option<bool>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Root {
  Local,
  Shared,
  Input,
  Output,
  Binding(u32),
  PushConstant,
  /// Varying, by location.
  VaryingIn(u32),
  VaryingOut(u32),
}

impl<'a> Lowerer<'a> {
  /// Place designated by `expr`, or `None` if `expr` is a plain value.
  pub(crate) fn place(&mut self, f: &mut FunCtx, expr: &ErasedExpr) -> Result<Option<Place>, CompileError> {
    match expr.node() {
      ExprNode::Var(handle) => self.variable(f, handle, expr.ty()),

      ExprNode::Field { object, index } => {
        let Some(mut place) = self.place(f, object)? else {
          return Ok(None);
        };

        if place.swizzle.is_some() {
          return Ok(None);
        }

        let index = self.uint(*index);
        place.indices.push(Operand::Constant(index));
        place.ty = expr.ty().clone();
        Ok(Some(place))
      }

      ExprNode::ArrayLookup { object, index } => {
        let Some(mut place) = self.place(f, object)? else {
          return Ok(None);
        };

        if place.swizzle.is_some() {
          return Ok(None);
        }

        let index_operand = self.expr(f, index)?;
        place.indices.push(index_operand);

        if let Some(buffers) = place.binding_array.take() {
          if index.as_literal().is_none() {
            self.dynamic_binding_index(&place)?;
          }

          if buffers {
            let member = self.uint(0);
            place.indices.push(Operand::Constant(member));
          }
        }

        place.ty = expr.ty().clone();
        Ok(Some(place))
      }

      ExprNode::Swizzle(object, swizzle) => {
        let Some(mut place) = self.place(f, object)? else {
          return Ok(None);
        };

        if place.swizzle.is_some() {
          return Ok(None);
        }

        let indices = swizzle.indices();
        if let [index] = indices[..] {
          let index = self.uint(index);
          place.indices.push(Operand::Constant(index));
          place.ty = expr.ty().clone();
        } else {
          place.swizzle = Some(indices);
        }

        Ok(Some(place))
      }

      _ => Ok(None),
    }
  }

  fn variable(&mut self, f: &mut FunCtx, handle: &ScopedHandle, ty: &Type) -> Result<Option<Place>, CompileError> {
    let place = match *handle {
      ScopedHandle::FunVar { subscope, handle } => {
        let slot = f
          .var_slot(subscope, handle)
          .ok_or_else(|| UsageError::UndefinedVariable(format!("var{}_{}", subscope, handle)))?;

        Place::new(
          Operand::Local(slot),
          Root::Local,
          spirv::StorageClass::Function,
          ty.clone(),
        )
      }

      ScopedHandle::FunArg(_) | ScopedHandle::Global(_) => return Ok(None),

      ScopedHandle::Shared(handle) => {
        let global = self
          .shared
          .get(&handle)
          .copied()
          .ok_or_else(|| UsageError::UndefinedVariable(format!("shared_{}", handle)))?;

        Place::new(
          Operand::Global(global),
          Root::Shared,
          spirv::StorageClass::Workgroup,
          ty.clone(),
        )
      }

      ScopedHandle::BuiltIn(builtin) => self.builtin_place(builtin)?,

      ScopedHandle::Interface(ih) => {
        if ih.layout != self.layout.id() {
          return Err(UsageError::UndeclaredBinding(describe(ih)).into());
        }

        match ih.kind {
          InterfaceKind::Binding => self.binding_place(ih)?,
          InterfaceKind::PushConstant => self.push_constant_place(ih)?,
          InterfaceKind::Attribute => self.attribute_place(ih)?,
          InterfaceKind::VaryingIn | InterfaceKind::VaryingOut => self.varying_place(ih, ty)?,
          InterfaceKind::ColorOutput => self.color_output_place(ih)?,
        }
      }
    };

    Ok(Some(place))
  }

  fn builtin_place(&mut self, builtin: BuiltIn) -> Result<Place, CompileError> {
    if builtin.stage() != self.stage {
      return Err(self.invalid_stage(format!("built-in {:?}", builtin.to_spirv())));
    }

    let class = if builtin.is_output() {
      spirv::StorageClass::Output
    } else {
      spirv::StorageClass::Input
    };

    let global = match self.builtins.get(&builtin) {
      Some(&global) => global,
      None => {
        if let Some(capability) = builtin.capability() {
          self.capabilities.insert(capability);
        }

        let mut decorations = vec![Decoration::BuiltIn(builtin.to_spirv())];
        if builtin.is_patch() {
          decorations.push(Decoration::Patch);
        }

        if builtin == BuiltIn::Fragment(crate::builtin::FragmentBuiltIn::FragDepth) {
          self.writes_depth = true;
        }

        let pointee = self.ir_type(&builtin.ty(), MemoryLayout::Logical);
        let global = self.add_global(Some(format!("{:?}", builtin.to_spirv())), class, pointee, decorations);
        self.builtins.insert(builtin, global);
        global
      }
    };

    let root = if builtin.is_output() { Root::Output } else { Root::Input };
    Ok(Place::new(Operand::Global(global), root, class, builtin.ty()))
  }

  fn binding_place(&mut self, ih: InterfaceHandle) -> Result<Place, CompileError> {
    let decl = self
      .layout
      .binding_decl(ih.index)
      .cloned()
      .ok_or_else(|| UsageError::UndeclaredBinding(describe(ih)))?;
    let (set, binding) = self
      .resolved
      .binding(ih.index)
      .ok_or_else(|| UsageError::UndeclaredBinding(describe(ih)))?;

    self.used_bindings.insert(ih.index);

    // texel buffers are images
    let is_buffer = matches!(decl.kind, DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer);
    let (class, layout) = match decl.kind {
      DescriptorKind::UniformBuffer => (spirv::StorageClass::Uniform, MemoryLayout::Std140),
      DescriptorKind::StorageBuffer if self.version().has_storage_buffer_class() => {
        (spirv::StorageClass::StorageBuffer, MemoryLayout::Std430)
      }
      DescriptorKind::StorageBuffer => (spirv::StorageClass::Uniform, MemoryLayout::Std430),
      _ => (spirv::StorageClass::UniformConstant, MemoryLayout::Logical),
    };

    let key = (InterfaceKind::Binding, ih.index);
    let global = match self.interface.get(&key) {
      Some(interface) => interface.global,
      None => {
        let descriptor = if is_buffer {
          let block = if class == spirv::StorageClass::StorageBuffer || decl.kind == DescriptorKind::UniformBuffer {
            BlockDecoration::Block
          } else {
            BlockDecoration::BufferBlock
          };

          let member = Member {
            name: "data".to_owned(),
            ty: self.ir_type(&decl.ty, layout),
            offset: Some(0),
            matrix_stride: matrix_stride(&decl.ty, layout),
            relaxed: false,
            non_writable: !decl.access.can_write() || decl.kind == DescriptorKind::UniformBuffer,
          };

          self.types.insert(IrType::Struct(IrStruct {
            name: format!("{}_block", decl.name),
            members: vec![member],
            block: Some(block),
          }))
        } else {
          self.ir_type(&decl.ty, MemoryLayout::Logical)
        };

        let pointee = match decl.count {
          Some(count) => {
            let len = self.uint(count);
            self.types.insert(IrType::Array {
              element: descriptor,
              len,
              stride: None,
            })
          }
          None => descriptor,
        };

        let mut decorations = vec![Decoration::DescriptorSet(set), Decoration::Binding(binding)];

        if decl.kind == DescriptorKind::StorageImage || decl.kind == DescriptorKind::StorageTexelBuffer {
          if !decl.access.can_write() {
            decorations.push(Decoration::NonWritable);
          }

          if !decl.access.can_read() {
            decorations.push(Decoration::NonReadable);
          }
        }

        if let Some(index) = decl.attachment_index {
          decorations.push(Decoration::InputAttachmentIndex(index));
        }

        let global = self.add_global(Some(decl.name.clone()), class, pointee, decorations);
        self.interface.insert(key, InterfaceGlobal { global, arrayed: false });
        global
      }
    };

    let mut place = Place::new(Operand::Global(global), Root::Binding(ih.index), class, decl.ty.clone());
    place.layout = layout;

    match decl.count {
      Some(count) => {
        place.ty = Type::Array(Box::new(decl.ty.clone()), count);
        place.binding_array = Some(is_buffer);
      }
      None if is_buffer => {
        let member = self.uint(0);
        place.indices.push(Operand::Constant(member));
      }
      None => (),
    }

    Ok(place)
  }

  fn push_constant_place(&mut self, ih: InterfaceHandle) -> Result<Place, CompileError> {
    let ty = self
      .layout
      .push_constants
      .get(ih.index as usize)
      .cloned()
      .ok_or_else(|| UsageError::UndeclaredBinding(describe(ih)))?;

    let global = match self.push_block {
      Some(global) => global,
      None => {
        let members = self
          .layout
          .push_constants
          .clone()
          .iter()
          .enumerate()
          .map(|(i, ty)| Member {
            name: format!("constant{}", i),
            ty: self.ir_type(ty, MemoryLayout::Std430),
            offset: self.resolved.push_constant_offset(i as u32),
            matrix_stride: matrix_stride(ty, MemoryLayout::Std430),
            relaxed: false,
            non_writable: false,
          })
          .collect();

        let pointee = self.types.insert(IrType::Struct(IrStruct {
          name: "push_constants_block".to_owned(),
          members,
          block: Some(BlockDecoration::Block),
        }));

        let global = self.add_global(
          Some("push_constants".to_owned()),
          spirv::StorageClass::PushConstant,
          pointee,
          Vec::new(),
        );
        self.push_block = Some(global);
        global
      }
    };

    let mut place = Place::new(
      Operand::Global(global),
      Root::PushConstant,
      spirv::StorageClass::PushConstant,
      ty,
    );
    place.layout = MemoryLayout::Std430;
    let index = self.uint(ih.index);
    place.indices.push(Operand::Constant(index));

    Ok(place)
  }

  fn attribute_place(&mut self, ih: InterfaceHandle) -> Result<Place, CompileError> {
    if self.stage != ShaderStage::Vertex {
      return Err(self.invalid_stage("vertex attributes"));
    }

    let attribute = self
      .layout
      .attributes
      .get(ih.index as usize)
      .cloned()
      .ok_or_else(|| UsageError::UndeclaredBinding(describe(ih)))?;

    let key = (InterfaceKind::Attribute, ih.index);
    let global = match self.interface.get(&key) {
      Some(interface) => interface.global,
      None => {
        let location = self.resolved.attribute_location(ih.index).unwrap_or(0);
        let pointee = self.ir_type(&attribute.ty, MemoryLayout::Logical);
        let global = self.add_global(
          Some(format!("attribute{}", ih.index)),
          spirv::StorageClass::Input,
          pointee,
          vec![Decoration::Location(location)],
        );

        self.interface.insert(key, InterfaceGlobal { global, arrayed: false });
        global
      }
    };

    Ok(Place::new(
      Operand::Global(global),
      Root::Input,
      spirv::StorageClass::Input,
      attribute.ty,
    ))
  }

  fn varying_place(&mut self, ih: InterfaceHandle, ty: &Type) -> Result<Place, CompileError> {
    let decl = self
      .layout
      .varyings
      .get(ih.index as usize)
      .cloned()
      .ok_or_else(|| UsageError::UndeclaredBinding(describe(ih)))?;
    let location = self
      .resolved
      .varying_location(ih.index)
      .ok_or_else(|| UsageError::UndeclaredBinding(describe(ih)))?;

    let input = ih.kind == InterfaceKind::VaryingIn;
    let arrayed = matches!(ty, Type::RuntimeArray(_));

    // number of elements of per-vertex varyings
    let vertices = match (self.config, input) {
      (StageConfig::Vertex, true) => return Err(self.invalid_stage("reading varyings")),
      (StageConfig::Fragment | StageConfig::Compute { .. }, false) | (StageConfig::Compute { .. }, true) => {
        return Err(self.invalid_stage("writing varyings"))
      }
      (StageConfig::TessControl(_) | StageConfig::TessEval(_), true) => Some(MAX_PATCH_VERTICES),
      (StageConfig::TessControl(config), false) => Some(config.output_vertices),
      (StageConfig::Geometry(config), true) => Some(config.input.vertices()),
      _ => None,
    };

    let patch = match (self.stage, input, arrayed) {
      (_, _, true) if vertices.is_none() => return Err(self.invalid_stage("per-vertex varyings")),
      (ShaderStage::TessControl | ShaderStage::Geometry, true, false) => {
        return Err(self.invalid_stage("reading varyings without a vertex index"))
      }
      (ShaderStage::TessEval, true, false) | (ShaderStage::TessControl, false, false) => true,
      _ => false,
    };

    let (class, root) = if input {
      (spirv::StorageClass::Input, Root::VaryingIn(location))
    } else {
      (spirv::StorageClass::Output, Root::VaryingOut(location))
    };

    let stored_ty = match (arrayed, vertices) {
      (true, Some(n)) => Type::Array(Box::new(decl.ty.clone()), n),
      _ => decl.ty.clone(),
    };

    let key = (ih.kind, ih.index);
    let global = match self.interface.get(&key) {
      Some(interface) if interface.arrayed != arrayed => {
        return Err(self.invalid_stage("varyings accessed both per vertex and per patch"));
      }
      Some(interface) => interface.global,
      None => {
        let mut decorations = vec![Decoration::Location(location)];

        if patch {
          decorations.push(Decoration::Patch);
        }

        if input && self.stage == ShaderStage::Fragment {
          if decl.interpolation == Interpolation::Flat || is_integer_varying(&decl.ty) {
            decorations.push(Decoration::Flat);
          } else if decl.interpolation == Interpolation::NoPerspective {
            decorations.push(Decoration::NoPerspective);
          }

          match decl.sampling {
            Sampling::Center => (),
            Sampling::Centroid => decorations.push(Decoration::Centroid),
            Sampling::Sample => {
              self.capabilities.insert(spirv::Capability::SampleRateShading);
              decorations.push(Decoration::Sample);
            }
          }
        }

        if decl.relaxed {
          decorations.push(Decoration::RelaxedPrecision);
        }

        let direction = if input { "in" } else { "out" };
        let pointee = self.ir_type(&stored_ty, MemoryLayout::Logical);
        let global = self.add_global(
          Some(format!("varying{}_{}", ih.index, direction)),
          class,
          pointee,
          decorations,
        );

        self.interface.insert(key, InterfaceGlobal { global, arrayed });
        global
      }
    };

    Ok(Place::new(Operand::Global(global), root, class, stored_ty))
  }

  fn color_output_place(&mut self, ih: InterfaceHandle) -> Result<Place, CompileError> {
    if self.stage != ShaderStage::Fragment {
      return Err(self.invalid_stage("color outputs"));
    }

    let ty = self
      .layout
      .color_output_ty(ih.index)
      .cloned()
      .ok_or_else(|| UsageError::UndeclaredBinding(describe(ih)))?;

    let key = (InterfaceKind::ColorOutput, ih.index);
    let global = match self.interface.get(&key) {
      Some(interface) => interface.global,
      None => {
        let pointee = self.ir_type(&ty, MemoryLayout::Logical);
        let global = self.add_global(
          Some(format!("color{}", ih.index)),
          spirv::StorageClass::Output,
          pointee,
          vec![Decoration::Location(ih.index)],
        );

        self.interface.insert(key, InterfaceGlobal { global, arrayed: false });
        global
      }
    };

    Ok(Place::new(Operand::Global(global), Root::Output, spirv::StorageClass::Output, ty))
  }

  /// Record a non-constant index into an array of descriptors.
  fn dynamic_binding_index(&mut self, place: &Place) -> Result<(), CompileError> {
    let Root::Binding(index) = place.root else {
      return Ok(());
    };

    let kind = self
      .layout
      .binding_decl(index)
      .map(|decl| decl.kind)
      .ok_or_else(|| UsageError::UndeclaredBinding(format!("binding {}", index)))?;

    let capability = match kind {
      DescriptorKind::Sampler | DescriptorKind::CombinedImageSampler | DescriptorKind::SampledImage => {
        spirv::Capability::SampledImageArrayDynamicIndexing
      }
      DescriptorKind::StorageImage => spirv::Capability::StorageImageArrayDynamicIndexing,
      DescriptorKind::UniformTexelBuffer => spirv::Capability::UniformTexelBufferArrayDynamicIndexing,
      DescriptorKind::StorageTexelBuffer => spirv::Capability::StorageTexelBufferArrayDynamicIndexing,
      DescriptorKind::UniformBuffer => spirv::Capability::UniformBufferArrayDynamicIndexing,
      DescriptorKind::StorageBuffer => spirv::Capability::StorageBufferArrayDynamicIndexing,
      DescriptorKind::InputAttachment => spirv::Capability::InputAttachmentArrayDynamicIndexing,
    };

    self.capabilities.insert(capability);
    self.dynamic_bindings.insert(index);
    Ok(())
  }

  fn pointer(&mut self, f: &mut FunCtx, place: &Place) -> Operand {
    if place.indices.is_empty() {
      return place.base;
    }

    let pointee = self.ir_type(&place.ty, place.layout);
    let ty = self.types.insert(IrType::Pointer {
      class: place.class,
      pointee,
    });

    f.value(
      ty,
      Op::AccessChain {
        base: place.base,
        indices: place.indices.clone(),
      },
    )
  }

  fn binding_access(&self, place: &Place) -> Option<(String, Access)> {
    match place.root {
      Root::Binding(index) => self
        .layout
        .binding_decl(index)
        .map(|decl| (decl.name.clone(), decl.access)),
      _ => None,
    }
  }

  /// Read the value of a place.
  pub(crate) fn load(&mut self, f: &mut FunCtx, place: &Place) -> Result<Operand, CompileError> {
    if matches!(place.ty, Type::RuntimeArray(_)) || place.binding_array.is_some() && !place.ty.is_opaque() {
      return Err(UsageError::OpaqueVariable(place.ty.clone()).into());
    }

    // descriptors are loaded to be written too; image operations check their own access
    if let Some((binding, access)) = self.binding_access(place).filter(|_| !place.ty.is_opaque()) {
      if !access.can_read() {
        return Err(
          UsageError::AccessViolation {
            binding,
            access: "read",
            declared: access.name(),
          }
          .into(),
        );
      }
    }

    if let Root::VaryingIn(location) = place.root {
      self.varyings_read.insert(location);
    }

    let pointer = self.pointer(f, place);
    let stored = self.ir_type(&place.ty, place.layout);
    let value = f.value(stored, Op::Load { pointer });
    let value = self.convert(f, value, &place.ty, place.layout, MemoryLayout::Logical);

    match &place.swizzle {
      Some(components) => {
        let ty = Type::with_components(place.ty.scalar().unwrap_or(ScalarType::Float), components.len() as u32);
        let ty = self.ir_type(&ty, MemoryLayout::Logical);
        Ok(f.value(
          ty,
          Op::Shuffle {
            first: value,
            second: value,
            components: components.clone(),
          },
        ))
      }
      None => Ok(value),
    }
  }

  /// Write `value` to a place.
  pub(crate) fn store(&mut self, f: &mut FunCtx, place: &Place, value: Operand) -> Result<(), CompileError> {
    match place.root {
      Root::Input | Root::VaryingIn(_) | Root::PushConstant => return Err(UsageError::NotAssignable.into()),

      Root::Binding(index) => {
        let decl = self
          .layout
          .binding_decl(index)
          .ok_or_else(|| UsageError::UndeclaredBinding(format!("binding {}", index)))?;

        if decl.kind != DescriptorKind::StorageBuffer {
          return Err(UsageError::NotAssignable.into());
        }

        if !decl.access.can_write() {
          return Err(
            UsageError::AccessViolation {
              binding: decl.name.clone(),
              access: "write",
              declared: decl.access.name(),
            }
            .into(),
          );
        }
      }

      Root::VaryingOut(location) => {
        self.varyings_written.insert(location);
      }

      Root::Local | Root::Shared | Root::Output => (),
    }

    let pointer = self.pointer(f, place);

    let value = match &place.swizzle {
      // writing some components of a vector: merge the written components with the others
      Some(components) => {
        let size = place.ty.components().unwrap_or(1);
        let ty = self.ir_type(&place.ty, place.layout);
        let current = f.value(ty, Op::Load { pointer });

        let merged = (0..size)
          .map(|i| match components.iter().position(|&c| c == i) {
            Some(k) => size + k as u32,
            None => i,
          })
          .collect();

        f.value(
          ty,
          Op::Shuffle {
            first: current,
            second: value,
            components: merged,
          },
        )
      }

      None => self.convert(f, value, &place.ty, MemoryLayout::Logical, place.layout),
    };

    f.effect(Op::Store { pointer, value });
    Ok(())
  }

  /// Convert a value of type `ty` between the representations of two memory layouts.
  fn convert(&mut self, f: &mut FunCtx, value: Operand, ty: &Type, from: MemoryLayout, to: MemoryLayout) -> Operand {
    let from_ty = self.ir_type(ty, from);
    let to_ty = self.ir_type(ty, to);

    if from_ty == to_ty {
      return value;
    }

    match ty {
      Type::Scalar(ScalarType::Bool) | Type::Vector(ScalarType::Bool, _) => {
        let n = ty.components().unwrap_or(1);
        let uints = Type::with_components(ScalarType::UInt, n);
        let zero = Operand::Constant(self.splat_constant(&uints, false));

        if from.is_explicit() {
          f.value(
            to_ty,
            Op::Binary {
              op: spirv::Op::INotEqual,
              left: value,
              right: zero,
            },
          )
        } else {
          let one = Operand::Constant(self.splat_constant(&uints, true));
          f.value(
            to_ty,
            Op::Select {
              condition: value,
              accept: one,
              reject: zero,
            },
          )
        }
      }

      Type::Array(elem, n) => {
        let elem_ty = self.ir_type(elem, from);
        let parts = (0..*n)
          .map(|i| {
            let part = f.value(
              elem_ty,
              Op::Extract {
                composite: value,
                indices: vec![i],
              },
            );
            self.convert(f, part, elem, from, to)
          })
          .collect();

        f.value(to_ty, Op::Construct { parts })
      }

      Type::Struct(st) => {
        let parts = st
          .fields
          .iter()
          .enumerate()
          .map(|(i, field)| {
            let field_ty = self.ir_type(&field.ty, from);
            let part = f.value(
              field_ty,
              Op::Extract {
                composite: value,
                indices: vec![i as u32],
              },
            );
            self.convert(f, part, &field.ty, from, to)
          })
          .collect();

        f.value(to_ty, Op::Construct { parts })
      }

      _ => value,
    }
  }

  /// Number of elements of the runtime-sized array ending a storage buffer.
  pub(crate) fn array_length(&mut self, f: &mut FunCtx, array: &ErasedExpr) -> Result<Operand, CompileError> {
    let not_a_buffer = || UsageError::OpaqueVariable(array.ty().clone());

    let mut place = self.place(f, array)?.ok_or_else(not_a_buffer)?;
    let global = match (place.root, place.base, &place.ty) {
      (Root::Binding(_), Operand::Global(global), Type::RuntimeArray(_)) => global,
      _ => return Err(not_a_buffer().into()),
    };

    // the array is the only member of the block
    place.indices.pop();

    let mut block = self.globals[global].pointee;
    if let IrType::Array { element, .. } = self.types[block] {
      block = element;
    }

    let structure = if place.indices.is_empty() {
      place.base
    } else {
      let ty = self.types.insert(IrType::Pointer {
        class: place.class,
        pointee: block,
      });
      f.value(
        ty,
        Op::AccessChain {
          base: place.base,
          indices: place.indices.clone(),
        },
      )
    };

    let uint = self.ir_type(&Type::Scalar(ScalarType::UInt), MemoryLayout::Logical);
    Ok(f.value(uint, Op::ArrayLength { structure, member: 0 }))
  }

  /// Check that the binding `expr` refers to, if any, can be read or written.
  pub(crate) fn check_access(&self, expr: &ErasedExpr, write: bool) -> Result<(), CompileError> {
    let Some(index) = binding_root(expr, self.layout.id()) else {
      return Ok(());
    };

    let Some(decl) = self.layout.binding_decl(index) else {
      return Ok(());
    };

    let allowed = if write {
      decl.access.can_write()
    } else {
      decl.access.can_read()
    };

    if allowed {
      Ok(())
    } else {
      Err(
        UsageError::AccessViolation {
          binding: decl.name.clone(),
          access: if write { "write" } else { "read" },
          declared: decl.access.name(),
        }
        .into(),
      )
    }
  }
}

impl Place {
  fn new(base: Operand, root: Root, class: spirv::StorageClass, ty: Type) -> Self {
    Self {
      base,
      indices: Vec::new(),
      root,
      layout: MemoryLayout::Logical,
      class,
      ty,
      swizzle: None,
      binding_array: None,
    }
  }
}

/// Binding an expression refers to, looking through array lookups.
pub(crate) fn binding_root(expr: &ErasedExpr, layout: u32) -> Option<u32> {
  match expr.node() {
    ExprNode::Var(ScopedHandle::Interface(InterfaceHandle {
      layout: id,
      kind: InterfaceKind::Binding,
      index,
    })) if *id == layout => Some(*index),
    ExprNode::ArrayLookup { object, .. } | ExprNode::Field { object, .. } => binding_root(object, layout),
    ExprNode::Swizzle(object, _) => binding_root(object, layout),
    _ => None,
  }
}

fn describe(ih: InterfaceHandle) -> String {
  let what = match ih.kind {
    InterfaceKind::Binding => "binding",
    InterfaceKind::PushConstant => "push constant",
    InterfaceKind::Attribute => "vertex attribute",
    InterfaceKind::VaryingIn | InterfaceKind::VaryingOut => "varying",
    InterfaceKind::ColorOutput => "color output",
  };

  format!("{} {}", what, ih.index)
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    config::{CompileOptions, SpirvVersion},
    interface::{Interpolation, Sampling},
    ir::Module,
    layout::PipelineLayout,
    scope::Scope,
    stage::{Stage, StageBuilder},
    swizzle::HasX as _,
    types::V4,
  };

  fn compile(stage: &Stage, layout: &PipelineLayout) -> Result<Module, CompileError> {
    stage.compile(layout, &CompileOptions::default())
  }

  #[test]
  fn write_through_read_only_binding() {
    let mut layout = PipelineLayout::new();
    let input = layout.storage_array_with::<f32>(0, Access::ReadOnly);

    let stage = StageBuilder::new_compute_shader([64, 1, 1], |s, inputs| {
      s.main_fun(|s: &mut Scope<()>| {
        let i = inputs.global_invocation_id.x();
        s.set(input.at(&i), 0.);
      })
    });

    let err = compile(&stage, &layout).unwrap_err();
    assert_eq!(
      err,
      UsageError::AccessViolation {
        binding: "storage_buffer_0".to_owned(),
        access: "write",
        declared: "read-only",
      }
      .into()
    );
  }

  #[test]
  fn token_of_another_layout() {
    let mut other = PipelineLayout::new();
    let data = other.storage_array::<u32>(0);
    let layout = PipelineLayout::new();

    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.set(data.at(0), 1u32);
      })
    });

    assert_eq!(
      compile(&stage, &layout).unwrap_err(),
      UsageError::UndeclaredBinding("binding 0".to_owned()).into()
    );
  }

  #[test]
  fn storage_buffer_class_follows_version() {
    let mut layout = PipelineLayout::new();
    let data = layout.storage_array::<u32>(0);

    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.set(data.at(0), 1u32);
      })
    });

    for (version, class, block) in [
      (SpirvVersion::V1_0, spirv::StorageClass::Uniform, BlockDecoration::BufferBlock),
      (SpirvVersion::V1_3, spirv::StorageClass::StorageBuffer, BlockDecoration::Block),
    ] {
      let module = stage
        .compile(&layout, &CompileOptions::default().spirv_version(version))
        .unwrap();
      let (_, global) = module.globals.iter().next().unwrap();
      assert_eq!(global.class, class);

      match &module.types[global.pointee] {
        IrType::Struct(st) => assert_eq!(st.block, Some(block)),
        ty => panic!("unexpected type {:?}", ty),
      }
    }
  }

  #[test]
  fn flat_integer_varyings() {
    let mut layout = PipelineLayout::new();
    let id = layout.varying::<u32>(Interpolation::Smooth, Sampling::Center);
    let color = layout.color_output::<V4<f32>>();

    let stage = StageBuilder::new_fragment_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let x = id.input().cast::<f32>();
        s.set(&*color, crate::vec4!(x, x, x, 1.));
      })
    });

    let module = compile(&stage, &layout).unwrap();
    let varying = module
      .globals
      .iter()
      .map(|(_, g)| g)
      .find(|g| g.class == spirv::StorageClass::Input)
      .unwrap();

    assert!(varying.decorations.contains(&Decoration::Flat));
    assert!(varying.decorations.contains(&Decoration::Location(0)));
    assert_eq!(module.reflection().varyings_read, vec![0]);
  }

  #[test]
  fn push_constants_are_read_only() {
    let mut layout = PipelineLayout::new();
    let scale = layout.push_constant::<f32>();

    let stage = StageBuilder::new_vertex_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.set(crate::var::Var((*scale).clone()), 2.);
      })
    });

    assert_eq!(compile(&stage, &layout).unwrap_err(), UsageError::NotAssignable.into());
  }

  #[test]
  fn builtin_of_another_stage() {
    let layout = PipelineLayout::new();
    let stage = StageBuilder::new_fragment_shader(|s, _, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let _x = s.var(crate::input::builtin_expr::<u32>(BuiltIn::Vertex(crate::builtin::VertexBuiltIn::VertexIndex)));
      })
    });

    assert!(matches!(
      compile(&stage, &layout),
      Err(CompileError::Usage(UsageError::InvalidStage { .. }))
    ));
  }
}
