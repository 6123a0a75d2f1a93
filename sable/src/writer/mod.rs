//! Module writers.
//!
//! [`spirv`] encodes a [`Module`] as the binary words consumed by drivers; [`text`] dumps it in the SPIR-V assembly
//! syntax, for logs and debugging.

pub mod spirv;
pub mod text;

use crate::ir::{Constant, Handle, IrType, Module};

/// Type or constant declaration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Decl {
  Type(Handle<IrType>),
  Constant(Handle<Constant>),
}

/// Types and constants of `module`, every declaration coming after the ones it refers to.
///
/// Types and constants live in two arenas but depend on each other (array lengths are constants), so neither arena
/// order is enough on its own.
pub(crate) fn declaration_order(module: &Module) -> Vec<Decl> {
  let mut order = Order {
    module,
    types: vec![false; module.types.len()],
    constants: vec![false; module.constants.len()],
    decls: Vec::with_capacity(module.types.len() + module.constants.len()),
  };

  for (handle, _) in module.types.iter() {
    order.visit_type(handle);
  }

  for (handle, _) in module.constants.iter() {
    order.visit_constant(handle);
  }

  order.decls
}

struct Order<'a> {
  module: &'a Module,
  types: Vec<bool>,
  constants: Vec<bool>,
  decls: Vec<Decl>,
}

impl Order<'_> {
  fn visit_type(&mut self, handle: Handle<IrType>) {
    if self.types[handle.index()] {
      return;
    }
    self.types[handle.index()] = true;

    match &self.module.types[handle] {
      IrType::Void | IrType::Bool | IrType::Int { .. } | IrType::Float { .. } | IrType::Sampler => (),
      IrType::Vector { component, .. } => self.visit_type(*component),
      IrType::Matrix { column, .. } => self.visit_type(*column),

      IrType::Array { element, len, .. } => {
        self.visit_type(*element);
        self.visit_constant(*len);
      }

      IrType::RuntimeArray { element, .. } => self.visit_type(*element),

      IrType::Struct(st) => {
        for member in &st.members {
          self.visit_type(member.ty);
        }
      }

      IrType::Pointer { pointee, .. } => self.visit_type(*pointee),

      IrType::Function { ret, params } => {
        self.visit_type(*ret);
        for &param in params {
          self.visit_type(param);
        }
      }

      IrType::Image(image) => self.visit_type(image.sampled_type),
      IrType::SampledImage { image } => self.visit_type(*image),
    }

    self.decls.push(Decl::Type(handle));
  }

  fn visit_constant(&mut self, handle: Handle<Constant>) {
    if self.constants[handle.index()] {
      return;
    }
    self.constants[handle.index()] = true;

    let constant = &self.module.constants[handle];
    self.visit_type(constant.ty());

    if let Constant::Composite { parts, .. } = constant {
      for &part in parts {
        self.visit_constant(part);
      }
    }

    self.decls.push(Decl::Constant(handle));
  }
}
