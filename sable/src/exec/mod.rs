//! Reference executor for compute modules.
//!
//! The executor interprets a compiled compute [`Module`] on the CPU. It runs one workgroup at a time; every
//! invocation has its own call stack, control barriers and subgroup operations are rendezvous points, and the order
//! in which invocations make progress between them is either sequential or driven by a seeded random generator. A
//! shader free of data races computes the same result whatever the interleaving, which is what the seeded mode is
//! there to check.
//!
//! Storage and uniform buffers are bound as plain bytes, decoded and encoded with the offsets and strides of the
//! module. Images are not supported.
//!
//! ```
//! use sable::{exec::Executor, CompileOptions, HasX as _, PipelineLayout, Scope, StageBuilder};
//!
//! let mut layout = PipelineLayout::new();
//! let data = layout.storage_array::<u32>(0);
//!
//! let stage = StageBuilder::new_compute_shader([4, 1, 1], |s, input| {
//!   s.main_fun(|s: &mut Scope<()>| {
//!     let i = input.global_invocation_id.x();
//!     s.set(data.at(&i), data.at(&i) * 10u32);
//!   })
//! });
//!
//! let module = stage.compile(&layout, &CompileOptions::default())?;
//! let input: Vec<u8> = [1u32, 2, 3, 4].iter().flat_map(|x| x.to_le_bytes()).collect();
//!
//! let mut exec = Executor::new(&module)?;
//! exec.bind(0, 0, input);
//! exec.dispatch([1, 1, 1])?;
//!
//! let output = exec.buffer(0, 0).unwrap();
//! assert_eq!(&output[4..8], &20u32.to_le_bytes());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod memory;
mod ops;
pub mod value;

use std::collections::{BTreeMap, HashMap};

use rand::{rngs::StdRng, Rng, SeedableRng};

use self::{
  memory::Codec,
  value::{zero, Pointer, Root, Val},
};
use crate::{
  error::ExecError,
  ir::{
    arena::Handle, BlockDecoration, Constant, Decoration, Function, Instr, IrType, Module, Op, Operand, Terminator,
    Block,
  },
  stage::StageConfig,
};

/// Default maximum number of instructions a dispatch can execute.
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

/// Default number of invocations per subgroup.
pub const DEFAULT_SUBGROUP_SIZE: u32 = 32;

/// CPU interpreter of a compute module.
#[derive(Debug)]
pub struct Executor<'m> {
  module: &'m Module,
  constants: Vec<Val>,
  local_size: [u32; 3],
  buffers: BTreeMap<(u32, u32), Vec<u8>>,
  push_constants: Vec<u8>,
  seed: Option<u64>,
  step_limit: u64,
  subgroup_size: u32,
}

impl<'m> Executor<'m> {
  /// Prepare the execution of `module`, which must be a compute module.
  pub fn new(module: &'m Module) -> Result<Self, ExecError> {
    let local_size = match module.config {
      StageConfig::Compute { local_size } => local_size,
      _ => return Err(ExecError::NotCompute),
    };

    // composite constants only refer to constants inserted before them
    let mut constants = Vec::with_capacity(module.constants.len());
    for (_, constant) in module.constants.iter() {
      let val = match constant {
        Constant::Bool { value, .. } => Val::Bool(*value),
        Constant::Scalar { ty, bits } => value::from_bits(&module.types[*ty], *bits)?,
        Constant::Composite { parts, .. } => Val::Composite(
          parts
            .iter()
            .map(|part| {
              constants
                .get(part.index())
                .cloned()
                .ok_or_else(|| ExecError::Malformed("constant used before its declaration".to_owned()))
            })
            .collect::<Result<_, _>>()?,
        ),
        Constant::Null { ty } => zero(module, *ty)?,
      };
      constants.push(val);
    }

    Ok(Executor {
      module,
      constants,
      local_size,
      buffers: BTreeMap::new(),
      push_constants: Vec::new(),
      seed: None,
      step_limit: DEFAULT_STEP_LIMIT,
      subgroup_size: DEFAULT_SUBGROUP_SIZE,
    })
  }

  /// Bind the bytes of the buffer at (`set`, `binding`).
  pub fn bind(&mut self, set: u32, binding: u32, bytes: impl Into<Vec<u8>>) -> &mut Self {
    self.buffers.insert((set, binding), bytes.into());
    self
  }

  pub fn push_constants(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
    self.push_constants = bytes.into();
    self
  }

  /// Interleave invocations randomly, from `seed`.
  ///
  /// Without a seed, every invocation runs until it blocks, in invocation order.
  pub fn seed(&mut self, seed: u64) -> &mut Self {
    self.seed = Some(seed);
    self
  }

  pub fn step_limit(&mut self, limit: u64) -> &mut Self {
    self.step_limit = limit;
    self
  }

  pub fn subgroup_size(&mut self, size: u32) -> &mut Self {
    self.subgroup_size = size.max(1);
    self
  }

  /// Current bytes of the buffer at (`set`, `binding`).
  pub fn buffer(&self, set: u32, binding: u32) -> Option<&[u8]> {
    self.buffers.get(&(set, binding)).map(Vec::as_slice)
  }

  /// Run `groups` workgroups.
  ///
  /// Buffers are only updated if the whole dispatch succeeds.
  pub fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), ExecError> {
    let mut globals = self.load_globals()?;
    let mut rng = self.seed.map(StdRng::seed_from_u64);
    let mut steps = 0;

    log::debug!(
      "dispatching {:?} workgroups of {:?} invocations ({})",
      groups,
      self.local_size,
      if self.seed.is_some() { "random interleaving" } else { "sequential" }
    );

    for z in 0..groups[2] {
      for y in 0..groups[1] {
        for x in 0..groups[0] {
          let mut run = Workgroup {
            exec: self,
            globals: &mut globals,
            rng: rng.as_mut(),
            steps: &mut steps,
          };
          run.run([x, y, z], groups)?;
        }
      }
    }

    log::debug!("dispatch done in {} steps", steps);
    self.store_globals(&globals)
  }

  fn binding(decorations: &[Decoration]) -> (u32, u32) {
    let mut set_binding = (0, 0);
    for decoration in decorations {
      match *decoration {
        Decoration::DescriptorSet(set) => set_binding.0 = set,
        Decoration::Binding(binding) => set_binding.1 = binding,
        _ => (),
      }
    }
    set_binding
  }

  /// Decode the buffers and push constants used by the module.
  fn load_globals(&self) -> Result<Vec<Option<Val>>, ExecError> {
    let mut globals = vec![None; self.module.globals.len()];

    for (handle, global) in self.module.globals.iter() {
      let (bytes, short) = match global.class {
        spirv::StorageClass::Uniform | spirv::StorageClass::StorageBuffer => {
          let (set, binding) = Self::binding(&global.decorations);
          let bytes = self
            .buffers
            .get(&(set, binding))
            .ok_or(ExecError::UnboundBuffer { set, binding })?;
          let short = ExecError::BufferSize {
            set,
            binding,
            len: bytes.len(),
          };
          (bytes.as_slice(), short)
        }

        spirv::StorageClass::PushConstant => {
          let short = ExecError::PushConstantSize {
            len: self.push_constants.len(),
          };
          (self.push_constants.as_slice(), short)
        }

        _ => continue,
      };

      if !matches!(self.module.types[global.pointee], IrType::Struct(_)) {
        return Err(ExecError::Unsupported("arrays of buffers".to_owned()));
      }

      let codec = Codec {
        module: self.module,
        short,
      };
      globals[handle.index()] = Some(codec.decode(bytes, global.pointee, 0, None)?);
    }

    Ok(globals)
  }

  /// Encode the storage buffers back into their bytes.
  fn store_globals(&mut self, globals: &[Option<Val>]) -> Result<(), ExecError> {
    for (handle, global) in self.module.globals.iter() {
      let storage = match (&global.class, &self.module.types[global.pointee]) {
        (spirv::StorageClass::StorageBuffer, _) => true,
        (spirv::StorageClass::Uniform, IrType::Struct(st)) => st.block == Some(BlockDecoration::BufferBlock),
        _ => false,
      };

      let Some(val) = globals.get(handle.index()).and_then(Option::as_ref) else {
        continue;
      };

      if !storage {
        continue;
      }

      let (set, binding) = Self::binding(&global.decorations);
      if let Some(bytes) = self.buffers.get_mut(&(set, binding)) {
        let codec = Codec {
          module: self.module,
          short: ExecError::BufferSize {
            set,
            binding,
            len: bytes.len(),
          },
        };
        codec.encode(bytes, global.pointee, 0, None, val)?;
      }
    }

    Ok(())
  }
}

/// Where an invocation stands in its code.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct Site {
  depth: usize,
  function: Handle<Function>,
  block: Handle<Block>,
  instr: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Status {
  Running,
  Barrier { site: Site, scope: spirv::Scope },
  Subgroup { site: Site },
  Done,
}

#[derive(Debug)]
struct Frame {
  function: Handle<Function>,
  block: Handle<Block>,
  instr: usize,
  values: Vec<Option<Val>>,
  locals: Vec<Val>,
  params: Vec<Val>,
  /// Value of the caller receiving the returned value.
  ret: Option<Handle<crate::ir::Value>>,
}

#[derive(Debug)]
struct Invocation {
  subgroup: u32,
  builtins: HashMap<usize, Val>,
  frames: Vec<Frame>,
  status: Status,
}

impl Invocation {
  fn frame(&self) -> Result<&Frame, ExecError> {
    self
      .frames
      .last()
      .ok_or_else(|| ExecError::Malformed("invocation without a frame".to_owned()))
  }

  fn frame_mut(&mut self) -> Result<&mut Frame, ExecError> {
    self
      .frames
      .last_mut()
      .ok_or_else(|| ExecError::Malformed("invocation without a frame".to_owned()))
  }

  fn site(&self) -> Result<Site, ExecError> {
    let frame = self.frame()?;
    Ok(Site {
      depth: self.frames.len() - 1,
      function: frame.function,
      block: frame.block,
      instr: frame.instr,
    })
  }

  /// Move past a rendezvous.
  fn release(&mut self) -> Result<(), ExecError> {
    self.frame_mut()?.instr += 1;
    self.status = Status::Running;
    Ok(())
  }
}

/// Execution of one workgroup.
struct Workgroup<'a, 'm> {
  exec: &'a Executor<'m>,
  globals: &'a mut Vec<Option<Val>>,
  rng: Option<&'a mut StdRng>,
  steps: &'a mut u64,
}

impl<'a, 'm> Workgroup<'a, 'm> {
  fn module(&self) -> &'m Module {
    self.exec.module
  }

  fn run(&mut self, workgroup: [u32; 3], groups: [u32; 3]) -> Result<(), ExecError> {
    let module = self.module();

    // workgroup memory starts zeroed for every workgroup
    for (handle, global) in module.globals.iter() {
      if global.class == spirv::StorageClass::Workgroup {
        self.globals[handle.index()] = Some(zero(module, global.pointee)?);
      }
    }

    let [sx, sy, sz] = self.exec.local_size;
    let mut invocations = (0..sx * sy * sz)
      .map(|index| self.invocation(index, [index % sx, index / sx % sy, index / (sx * sy)], workgroup, groups))
      .collect::<Result<Vec<_>, _>>()?;

    loop {
      let runnable: Vec<usize> = invocations
        .iter()
        .enumerate()
        .filter(|(_, inv)| inv.status == Status::Running)
        .map(|(i, _)| i)
        .collect();

      if runnable.is_empty() {
        if invocations.iter().all(|inv| inv.status == Status::Done) {
          return Ok(());
        }

        if !self.rendezvous(&mut invocations)? {
          return Err(ExecError::DivergentBarrier);
        }

        continue;
      }

      let (pick, budget) = match self.rng.as_deref_mut() {
        Some(rng) => (runnable[rng.random_range(0..runnable.len())], rng.random_range(1..=8)),
        None => (runnable[0], u64::MAX),
      };

      let inv = &mut invocations[pick];
      let mut n = 0;
      while inv.status == Status::Running && n < budget {
        *self.steps += 1;
        if *self.steps > self.exec.step_limit {
          return Err(ExecError::StepLimit(self.exec.step_limit));
        }

        self.step(inv)?;
        n += 1;
      }
    }
  }

  fn invocation(&self, index: u32, local: [u32; 3], workgroup: [u32; 3], groups: [u32; 3]) -> Result<Invocation, ExecError> {
    let module = self.module();
    let size = self.exec.local_size;
    let uvec3 = |v: [u32; 3]| Val::Composite(v.iter().map(|&x| Val::U32(x)).collect());

    let mut builtins = HashMap::new();
    for (handle, global) in module.globals.iter() {
      if global.class != spirv::StorageClass::Input {
        continue;
      }

      for decoration in &global.decorations {
        if let Decoration::BuiltIn(builtin) = *decoration {
          let val = match builtin {
            spirv::BuiltIn::LocalInvocationId => uvec3(local),
            spirv::BuiltIn::LocalInvocationIndex => Val::U32(index),
            spirv::BuiltIn::GlobalInvocationId => uvec3([0, 1, 2].map(|i| workgroup[i] * size[i] + local[i])),
            spirv::BuiltIn::WorkgroupId => uvec3(workgroup),
            spirv::BuiltIn::NumWorkgroups => uvec3(groups),
            spirv::BuiltIn::SubgroupSize => Val::U32(self.exec.subgroup_size),
            spirv::BuiltIn::SubgroupLocalInvocationId => Val::U32(index % self.exec.subgroup_size),
            other => return Err(ExecError::Unsupported(format!("built-in {:?}", other))),
          };
          builtins.insert(handle.index(), val);
        }
      }
    }

    Ok(Invocation {
      subgroup: index / self.exec.subgroup_size,
      builtins,
      frames: vec![self.frame(module.entry_point, Vec::new(), None)?],
      status: Status::Running,
    })
  }

  fn frame(
    &self,
    function: Handle<Function>,
    params: Vec<Val>,
    ret: Option<Handle<crate::ir::Value>>,
  ) -> Result<Frame, ExecError> {
    let module = self.module();
    let f = &module.functions[function];

    Ok(Frame {
      function,
      block: f.entry(),
      instr: 0,
      values: vec![None; f.values.len()],
      locals: f
        .locals
        .iter()
        .map(|local| zero(module, local.pointee))
        .collect::<Result<_, _>>()?,
      params,
      ret,
    })
  }

  /// Execute one instruction or terminator of `inv`.
  fn step(&mut self, inv: &mut Invocation) -> Result<(), ExecError> {
    let module = self.module();
    let frame = inv.frame()?;
    let function = &module.functions[frame.function];
    let block = &function.blocks[frame.block];

    match block.body.get(frame.instr) {
      Some(instr) => self.execute(inv, function, instr),
      None => self.terminate(inv, &block.terminator),
    }
  }

  fn operand(&self, inv: &Invocation, operand: Operand) -> Result<Val, ExecError> {
    let frame = inv.frame()?;

    match operand {
      Operand::Value(v) => frame
        .values
        .get(v.index())
        .cloned()
        .flatten()
        .ok_or_else(|| ExecError::Malformed(format!("{:?} used before its definition", v))),
      Operand::Constant(c) => self
        .exec
        .constants
        .get(c.index())
        .cloned()
        .ok_or_else(|| ExecError::Malformed(format!("unknown constant {:?}", c))),
      Operand::Global(g) => Ok(Val::Pointer(Pointer {
        root: Root::Global(g.index()),
        path: Vec::new(),
      })),
      Operand::Local(index) => Ok(Val::Pointer(Pointer {
        root: Root::Local {
          depth: inv.frames.len() - 1,
          index: index as usize,
        },
        path: Vec::new(),
      })),
      Operand::Param(i) => frame
        .params
        .get(i as usize)
        .cloned()
        .ok_or_else(|| ExecError::Malformed(format!("unknown parameter {}", i))),
    }
  }

  fn load(&self, inv: &Invocation, pointer: &Pointer) -> Result<Val, ExecError> {
    let root = match pointer.root {
      Root::Global(g) => match inv.builtins.get(&g) {
        Some(val) => Some(val),
        None => self.globals.get(g).and_then(Option::as_ref),
      },
      Root::Local { depth, index } => inv.frames.get(depth).and_then(|f| f.locals.get(index)),
    };

    root
      .ok_or_else(|| ExecError::Unsupported(format!("access to {:?}", pointer.root)))?
      .at(&pointer.path)
      .cloned()
  }

  fn store(&mut self, inv: &mut Invocation, pointer: &Pointer, val: Val) -> Result<(), ExecError> {
    let root = match pointer.root {
      Root::Global(g) if inv.builtins.contains_key(&g) => {
        return Err(ExecError::Malformed("store to an input variable".to_owned()))
      }
      Root::Global(g) => self.globals.get_mut(g).and_then(Option::as_mut),
      Root::Local { depth, index } => inv.frames.get_mut(depth).and_then(|f| f.locals.get_mut(index)),
    };

    *root
      .ok_or_else(|| ExecError::Unsupported(format!("access to {:?}", pointer.root)))?
      .at_mut(&pointer.path)? = val;
    Ok(())
  }

  fn execute(&mut self, inv: &mut Invocation, function: &'m Function, instr: &'m Instr) -> Result<(), ExecError> {
    let result_ty = || {
      instr
        .result
        .map(|r| function.values[r].ty)
        .ok_or_else(|| ExecError::Malformed(format!("{:?} without a result", instr.op)))
    };

    let result = match &instr.op {
      Op::Load { pointer } => {
        let pointer = self.operand(inv, *pointer)?;
        Some(self.load(inv, pointer.pointer()?)?)
      }

      Op::Store { pointer, value } => {
        let pointer = self.operand(inv, *pointer)?;
        let value = self.operand(inv, *value)?;
        self.store(inv, pointer.pointer()?, value)?;
        None
      }

      Op::AccessChain { base, indices } => {
        let mut pointer = self.operand(inv, *base)?.pointer()?.clone();
        for index in indices {
          pointer.path.push(self.operand(inv, *index)?.unsigned()? as usize);
        }
        Some(Val::Pointer(pointer))
      }

      Op::Unary { op, operand } => {
        let operand = self.operand(inv, *operand)?;
        Some(self.exec.unary(*op, result_ty()?, &operand)?)
      }

      Op::Binary { op, left, right } => {
        let left = self.operand(inv, *left)?;
        let right = self.operand(inv, *right)?;
        Some(self.exec.binary(*op, result_ty()?, &left, &right)?)
      }

      Op::Construct { parts } => {
        let parts = parts
          .iter()
          .map(|part| self.operand(inv, *part))
          .collect::<Result<Vec<_>, _>>()?;

        // vectors can be built from smaller vectors
        match self.module().types[result_ty()?] {
          IrType::Vector { .. } => Some(Val::Composite(
            parts
              .into_iter()
              .flat_map(|part| match part {
                Val::Composite(components) => components,
                scalar => vec![scalar],
              })
              .collect(),
          )),
          _ => Some(Val::Composite(parts)),
        }
      }

      Op::Extract { composite, indices } => {
        let path: Vec<_> = indices.iter().map(|&i| i as usize).collect();
        Some(self.operand(inv, *composite)?.at(&path)?.clone())
      }

      Op::Insert {
        object,
        composite,
        indices,
      } => {
        let path: Vec<_> = indices.iter().map(|&i| i as usize).collect();
        let mut composite = self.operand(inv, *composite)?;
        *composite.at_mut(&path)? = self.operand(inv, *object)?;
        Some(composite)
      }

      Op::Shuffle {
        first,
        second,
        components,
      } => {
        let first = self.operand(inv, *first)?;
        let second = self.operand(inv, *second)?;
        let all: Vec<_> = first.components()?.iter().chain(second.components()?).collect();
        Some(Val::Composite(
          components
            .iter()
            .map(|&c| {
              all
                .get(c as usize)
                .map(|&v| v.clone())
                .ok_or_else(|| ExecError::Malformed(format!("shuffle component {}", c)))
            })
            .collect::<Result<_, _>>()?,
        ))
      }

      Op::Select {
        condition,
        accept,
        reject,
      } => {
        let args = [
          self.operand(inv, *condition)?,
          self.operand(inv, *accept)?,
          self.operand(inv, *reject)?,
        ];
        Some(self.exec.lanes(result_ty()?, &args, &|_, lane| {
          Ok(if lane[0].boolean()? { lane[1].clone() } else { lane[2].clone() })
        })?)
      }

      Op::Ext { op, args } => {
        let args = args
          .iter()
          .map(|arg| self.operand(inv, *arg))
          .collect::<Result<Vec<_>, _>>()?;
        Some(self.exec.ext(*op, result_ty()?, &args)?)
      }

      Op::Call { function: callee, args } => {
        let args = args
          .iter()
          .map(|arg| self.operand(inv, *arg))
          .collect::<Result<Vec<_>, _>>()?;
        let frame = self.frame(*callee, args, instr.result)?;

        inv.frame_mut()?.instr += 1;
        inv.frames.push(frame);
        return Ok(());
      }

      Op::ArrayLength { structure, member } => {
        let structure = self.operand(inv, *structure)?;
        let structure = self.load(inv, structure.pointer()?)?;
        let len = structure.at(&[*member as usize])?.components()?.len();
        Some(Val::U32(len as u32))
      }

      Op::ControlBarrier { execution, .. } => {
        inv.status = Status::Barrier {
          site: inv.site()?,
          scope: *execution,
        };
        return Ok(());
      }

      // memory is coherent in the executor
      Op::MemoryBarrier { .. } => None,

      Op::GroupNonUniform { .. } => {
        inv.status = Status::Subgroup { site: inv.site()? };
        return Ok(());
      }

      // evaluated when entering the block
      Op::Phi { .. } => None,

      other => return Err(ExecError::Unsupported(format!("{:?}", other))),
    };

    let frame = inv.frame_mut()?;
    if let (Some(r), Some(val)) = (instr.result, result) {
      frame.values[r.index()] = Some(val);
    }
    frame.instr += 1;

    Ok(())
  }

  fn terminate(&mut self, inv: &mut Invocation, terminator: &'m Terminator) -> Result<(), ExecError> {
    match terminator {
      Terminator::Branch(target) => self.enter(inv, *target),

      Terminator::BranchConditional {
        condition,
        accept,
        reject,
      } => {
        let target = if self.operand(inv, *condition)?.boolean()? {
          accept
        } else {
          reject
        };
        self.enter(inv, *target)
      }

      Terminator::Switch {
        selector,
        default,
        targets,
      } => {
        let selector = self.operand(inv, *selector)?.unsigned()? as u32;
        let target = targets
          .iter()
          .find(|(literal, _)| *literal == selector)
          .map_or(*default, |(_, target)| *target);
        self.enter(inv, target)
      }

      Terminator::Return => self.ret(inv, None),

      Terminator::ReturnValue(value) => {
        let value = self.operand(inv, *value)?;
        self.ret(inv, Some(value))
      }

      Terminator::Kill => {
        inv.frames.clear();
        inv.status = Status::Done;
        Ok(())
      }

      Terminator::Unreachable => Err(ExecError::Malformed("reached an unreachable block".to_owned())),
    }
  }

  /// Branch to `target`, evaluating its φ-functions against the block being left.
  fn enter(&mut self, inv: &mut Invocation, target: Handle<Block>) -> Result<(), ExecError> {
    let frame = inv.frame()?;
    let from = frame.block;
    let block = &self.module().functions[frame.function].blocks[target];

    let mut phis = Vec::new();
    for instr in &block.body {
      let Op::Phi { incoming } = &instr.op else {
        break;
      };

      let (value, _) = incoming
        .iter()
        .find(|(_, pred)| *pred == from)
        .ok_or_else(|| ExecError::Malformed(format!("φ-function without an entry for {:?}", from)))?;
      phis.push((instr.result, self.operand(inv, *value)?));
    }

    let frame = inv.frame_mut()?;
    frame.instr = phis.len();
    frame.block = target;
    for (result, val) in phis {
      if let Some(r) = result {
        frame.values[r.index()] = Some(val);
      }
    }

    Ok(())
  }

  fn ret(&mut self, inv: &mut Invocation, value: Option<Val>) -> Result<(), ExecError> {
    let callee = inv.frames.pop();

    match inv.frames.last_mut() {
      Some(caller) => {
        if let (Some(r), Some(val)) = (callee.and_then(|f| f.ret), value) {
          caller.values[r.index()] = Some(val);
        }
      }
      None => inv.status = Status::Done,
    }

    Ok(())
  }

  /// Resolve blocked invocations; `false` if none can make progress.
  fn rendezvous(&mut self, invocations: &mut [Invocation]) -> Result<bool, ExecError> {
    // subgroup operations run with the members of the subgroup that reached them
    let mut groups: BTreeMap<(u32, usize, usize, usize, usize), Vec<usize>> = BTreeMap::new();
    for (i, inv) in invocations.iter().enumerate() {
      if let Status::Subgroup { site } = inv.status {
        let key = (inv.subgroup, site.depth, site.function.index(), site.block.index(), site.instr);
        groups.entry(key).or_default().push(i);
      }
    }

    if !groups.is_empty() {
      for members in groups.values() {
        self.subgroup_op(invocations, members)?;
      }
      return Ok(true);
    }

    // subgroup barriers wait for the live members of their subgroup
    let mut released = false;
    let subgroups = invocations.iter().map(|inv| inv.subgroup).max().unwrap_or(0);
    for subgroup in 0..=subgroups {
      let mut live = invocations
        .iter()
        .filter(|inv| inv.subgroup == subgroup && inv.status != Status::Done)
        .map(|inv| inv.status);

      let Some(first) = live.next() else {
        continue;
      };

      let matching = matches!(first, Status::Barrier { scope: spirv::Scope::Subgroup, .. })
        && live.all(|status| status == first);

      let any_done = invocations
        .iter()
        .any(|inv| inv.subgroup == subgroup && inv.status == Status::Done);

      if matching && !any_done {
        for inv in invocations.iter_mut().filter(|inv| inv.subgroup == subgroup) {
          inv.release()?;
        }
        released = true;
      }
    }

    if released {
      return Ok(true);
    }

    // workgroup barriers wait for every invocation
    let first = invocations[0].status;
    if matches!(first, Status::Barrier { scope, .. } if scope != spirv::Scope::Subgroup)
      && invocations.iter().all(|inv| inv.status == first)
    {
      log::trace!("workgroup barrier released");
      for inv in invocations.iter_mut() {
        inv.release()?;
      }
      return Ok(true);
    }

    Ok(false)
  }

  /// Run the subgroup operation `members` stopped at, `members` being sorted by invocation index.
  fn subgroup_op(&mut self, invocations: &mut [Invocation], members: &[usize]) -> Result<(), ExecError> {
    let module = self.module();
    let leader = &invocations[members[0]];
    let frame = leader.frame()?;
    let function = &module.functions[frame.function];
    let instr = function.blocks[frame.block]
      .body
      .get(frame.instr)
      .ok_or_else(|| ExecError::Malformed("subgroup operation out of its block".to_owned()))?;

    let Op::GroupNonUniform { op, group, value } = &instr.op else {
      return Err(ExecError::Malformed(format!("{:?} is not a subgroup operation", instr.op)));
    };

    let values = members
      .iter()
      .map(|&i| match value {
        Some(value) => self.operand(&invocations[i], *value),
        None => Ok(Val::Bool(false)),
      })
      .collect::<Result<Vec<_>, _>>()?;

    let results = self.exec.subgroup(*op, *group, instr.result.map(|r| function.values[r].ty), &values)?;

    for (&i, result) in members.iter().zip(results) {
      let inv = &mut invocations[i];
      if let Some(r) = instr.result {
        inv.frame_mut()?.values[r.index()] = Some(result);
      }
      inv.release()?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    config::CompileOptions,
    layout::PipelineLayout,
    lit,
    scope::{Conditional as _, Scope},
    stage::StageBuilder,
    swizzle::HasX as _,
    types::V4,
  };

  fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
      .chunks_exact(4)
      .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect()
  }

  fn bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
  }

  #[test]
  fn only_compute_modules_run() {
    let stage = StageBuilder::new_fragment_shader(|s, _, _| s.main_fun(|_: &mut Scope<()>| {}));
    let module = stage.compile(&PipelineLayout::new(), &CompileOptions::default()).unwrap();
    assert_eq!(Executor::new(&module).unwrap_err(), ExecError::NotCompute);
  }

  #[test]
  fn buffers_must_fit_their_layout() {
    let mut layout = PipelineLayout::new();
    let v = layout.storage_buffer::<V4<f32>>(0);

    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.set(&*v, v.to_expr() * 2.);
      })
    });
    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

    let mut exec = Executor::new(&module).unwrap();
    assert_eq!(exec.dispatch([1, 1, 1]), Err(ExecError::UnboundBuffer { set: 0, binding: 0 }));

    exec.bind(0, 0, vec![0; 8]);
    assert_eq!(
      exec.dispatch([1, 1, 1]),
      Err(ExecError::BufferSize {
        set: 0,
        binding: 0,
        len: 8
      })
    );

    let input: Vec<u8> = [1f32, 2., 3., 4.].iter().flat_map(|x| x.to_le_bytes()).collect();
    exec.bind(0, 0, input);
    exec.dispatch([1, 1, 1]).unwrap();
    assert_eq!(&exec.buffer(0, 0).unwrap()[12..16], &8f32.to_le_bytes());
  }

  #[test]
  fn shared_memory_and_barriers() {
    let mut layout = PipelineLayout::new();
    let data = layout.storage_array::<u32>(0);

    // reverse each workgroup-sized chunk through shared memory
    let stage = StageBuilder::new_compute_shader([8, 1, 1], |mut s, input| {
      let tmp = s.shared_array::<u32>(8);

      s.main_fun(|s: &mut Scope<()>| {
        let lid = input.local_invocation_index.clone();
        let gid = input.global_invocation_id.x();
        s.set(tmp.at(&lid), data.at(&gid));
        s.workgroup_barrier();
        s.set(data.at(&gid), tmp.at(lit!(7u32) - &lid));
      })
    });
    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

    let input: Vec<u32> = (0..16).collect();
    let mut expected: Vec<u32> = (0..8).rev().collect();
    expected.extend((8..16).rev());

    for seed in [None, Some(1), Some(2), Some(42)] {
      let mut exec = Executor::new(&module).unwrap();
      exec.bind(0, 0, bytes(&input));
      if let Some(seed) = seed {
        exec.seed(seed);
      }

      exec.dispatch([2, 1, 1]).unwrap();
      assert_eq!(words(exec.buffer(0, 0).unwrap()), expected);
    }
  }

  #[test]
  fn divergent_barriers_are_detected() {
    let mut layout = PipelineLayout::new();
    let data = layout.storage_array::<u32>(0);

    let stage = StageBuilder::new_compute_shader([4, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let lid = input.local_invocation_index.clone();
        s.when(lid.lt(2u32), |s| {
          s.workgroup_barrier();
        });
        s.set(data.at(&lid), lid.clone());
      })
    });
    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

    let mut exec = Executor::new(&module).unwrap();
    exec.bind(0, 0, vec![0; 16]);
    assert_eq!(exec.dispatch([1, 1, 1]), Err(ExecError::DivergentBarrier));
    // nothing is written back on failure
    assert_eq!(exec.buffer(0, 0).unwrap(), &[0; 16]);
  }

  #[test]
  fn runaway_loops_hit_the_step_limit() {
    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        let x = s.var(0u32);
        s.loop_while(lit!(true), |s| {
          s.set(&x, &x + 1u32);
        });
      })
    });
    let module = stage.compile(&PipelineLayout::new(), &CompileOptions::default()).unwrap();

    let mut exec = Executor::new(&module).unwrap();
    exec.step_limit(1000);
    assert_eq!(exec.dispatch([1, 1, 1]), Err(ExecError::StepLimit(1000)));
  }

  #[test]
  fn subgroup_scans() {
    let mut layout = PipelineLayout::new();
    let data = layout.storage_array::<u32>(0);

    let stage = StageBuilder::new_compute_shader([8, 1, 1], |s, input| {
      s.main_fun(|s: &mut Scope<()>| {
        let lid = input.local_invocation_index.clone();
        let sum = s.var(crate::group::subgroup_exclusive_add(data.at(&lid).to_expr()));
        s.set(data.at(&lid), sum);
      })
    });
    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

    let mut exec = Executor::new(&module).unwrap();
    exec.subgroup_size(4).seed(7).bind(0, 0, bytes(&[1; 8]));
    exec.dispatch([1, 1, 1]).unwrap();
    assert_eq!(words(exec.buffer(0, 0).unwrap()), vec![0, 1, 2, 3, 0, 1, 2, 3]);
  }
}
