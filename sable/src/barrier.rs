//! Control and memory barriers.
//!
//! Workgroup-shared arrays written by one invocation are only guaranteed to be visible to the other invocations of
//! the workgroup after a control barrier with matching memory semantics. [`Scope::workgroup_barrier`] is the barrier
//! to use between a write phase and a read phase over shared memory.
//!
//! Control barriers must be reached by every invocation of their scope: recording one under a condition that differs
//! between invocations is reported according to
//! [`CompileOptions::divergent_barriers`](crate::config::CompileOptions::divergent_barriers).

use bitflags::bitflags;

use crate::{
  fun::Return,
  scope::{Scope, ScopeInstr},
};

bitflags! {
  /// Storage classes a memory barrier makes visible.
  #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
  pub struct MemoryClass: u32 {
    const UNIFORM = 1 << 0;
    const SUBGROUP = 1 << 1;
    const WORKGROUP = 1 << 2;
    const IMAGE = 1 << 3;
  }
}

/// Ordering of a memory barrier.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MemoryOrder {
  Acquire,
  Release,
  AcquireRelease,
}

/// Set of invocations a barrier applies to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SyncScope {
  Device,
  Workgroup,
  Subgroup,
}

impl SyncScope {
  pub fn to_spirv(self) -> spirv::Scope {
    match self {
      SyncScope::Device => spirv::Scope::Device,
      SyncScope::Workgroup => spirv::Scope::Workgroup,
      SyncScope::Subgroup => spirv::Scope::Subgroup,
    }
  }
}

/// A recorded barrier.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Barrier {
  /// Invocations waiting for each other; `None` for a memory-only barrier.
  pub execution: Option<SyncScope>,
  pub memory: SyncScope,
  pub order: MemoryOrder,
  pub classes: MemoryClass,
}

impl Barrier {
  pub const fn workgroup() -> Self {
    Self {
      execution: Some(SyncScope::Workgroup),
      memory: SyncScope::Workgroup,
      order: MemoryOrder::AcquireRelease,
      classes: MemoryClass::WORKGROUP,
    }
  }

  pub const fn subgroup() -> Self {
    Self {
      execution: Some(SyncScope::Subgroup),
      memory: SyncScope::Subgroup,
      order: MemoryOrder::AcquireRelease,
      classes: MemoryClass::SUBGROUP,
    }
  }

  /// Whether invocations wait for each other at this barrier.
  pub fn is_control(&self) -> bool {
    self.execution.is_some()
  }

  /// Memory semantics operand of the barrier instruction.
  pub fn semantics(&self) -> spirv::MemorySemantics {
    let mut semantics = match self.order {
      MemoryOrder::Acquire => spirv::MemorySemantics::ACQUIRE,
      MemoryOrder::Release => spirv::MemorySemantics::RELEASE,
      MemoryOrder::AcquireRelease => spirv::MemorySemantics::ACQUIRE_RELEASE,
    };

    if self.classes.contains(MemoryClass::UNIFORM) {
      semantics |= spirv::MemorySemantics::UNIFORM_MEMORY;
    }

    if self.classes.contains(MemoryClass::SUBGROUP) {
      semantics |= spirv::MemorySemantics::SUBGROUP_MEMORY;
    }

    if self.classes.contains(MemoryClass::WORKGROUP) {
      semantics |= spirv::MemorySemantics::WORKGROUP_MEMORY;
    }

    if self.classes.contains(MemoryClass::IMAGE) {
      semantics |= spirv::MemorySemantics::IMAGE_MEMORY;
    }

    semantics
  }
}

impl<R> Scope<R>
where
  Return: From<R>,
{
  /// Wait for all the invocations of the workgroup and make their workgroup-shared writes visible.
  ///
  /// # Examples
  ///
  /// ```
  /// # use sable::{Scope, StageBuilder};
  /// StageBuilder::new_compute_shader([64, 1, 1], |mut s, input| {
  ///   let tile = s.shared_array::<f32>(64);
  ///
  ///   s.main_fun(|s: &mut Scope<()>| {
  ///     s.set(tile.at(input.local_invocation_index.clone()), 1.);
  ///     s.workgroup_barrier();
  ///   })
  /// });
  /// ```
  pub fn workgroup_barrier(&mut self) {
    self.barrier(Barrier::workgroup());
  }

  /// Workgroup control barrier with explicit memory semantics.
  pub fn workgroup_barrier_with(&mut self, order: MemoryOrder, classes: MemoryClass) {
    self.barrier(Barrier {
      order,
      classes,
      ..Barrier::workgroup()
    });
  }

  /// Wait for all the active invocations of the subgroup.
  pub fn subgroup_barrier(&mut self) {
    self.barrier(Barrier::subgroup());
  }

  /// Subgroup control barrier with explicit memory semantics.
  pub fn subgroup_barrier_with(&mut self, order: MemoryOrder, classes: MemoryClass) {
    self.barrier(Barrier {
      order,
      classes,
      ..Barrier::subgroup()
    });
  }

  /// Memory barrier, without any execution synchronization.
  pub fn memory_barrier(&mut self, scope: SyncScope, order: MemoryOrder, classes: MemoryClass) {
    self.barrier(Barrier {
      execution: None,
      memory: scope,
      order,
      classes,
    });
  }

  fn barrier(&mut self, barrier: Barrier) {
    self.erased.push(ScopeInstr::Barrier(barrier));
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn workgroup_semantics() {
    let semantics = Barrier::workgroup().semantics();

    assert_eq!(semantics.bits(), 0x8 | 0x100);
  }

  #[test]
  fn custom_semantics() {
    let mut scope = Scope::<()>::new(0);
    scope.workgroup_barrier_with(MemoryOrder::Release, MemoryClass::WORKGROUP | MemoryClass::IMAGE);
    scope.memory_barrier(SyncScope::Device, MemoryOrder::Acquire, MemoryClass::UNIFORM);

    match &scope.erased.instructions[..] {
      [ScopeInstr::Barrier(a), ScopeInstr::Barrier(b)] => {
        assert_eq!(a.semantics().bits(), 0x4 | 0x100 | 0x800);
        assert!(a.is_control());
        assert_eq!(b.semantics().bits(), 0x2 | 0x40);
        assert!(!b.is_control());
      }
      instrs => panic!("unexpected instructions {:?}", instrs),
    }
  }
}
