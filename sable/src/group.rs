//! Workgroup and subgroup algorithms.
//!
//! The workgroup algorithms operate on [`WArray`]s and are recorded like any other shading code: every invocation of
//! the workgroup runs them with its own [`GroupInvocation`]. Elements are distributed with a stride of the workgroup
//! size, so arrays may be larger than the workgroup.
//!
//! Every algorithm ends with a workgroup barrier, so its results are visible to the whole workgroup when it returns.
//! Algorithms reading elements written by other invocations ([`reduce`], the scans and the sorts) also start with
//! one. They must therefore be called in uniform control flow.
//!
//! The subgroup functions map to the group non-uniform instructions and need SPIR-V 1.3.

use crate::{
  array::{VArray, WArray},
  binding::StorageArray,
  expr::{Expr, ExprNode},
  fun::{ErasedFunHandle, GroupOperation, Return, SubgroupOp},
  input::ComputeShaderInputs,
  scope::{Conditional as _, LoopScope, Scope},
  types::{Numeric, ToType},
  var::Var,
};

/// Identity of the invocation running a workgroup algorithm.
#[derive(Clone, Debug)]
pub struct GroupInvocation {
  local_id: Expr<u32>,
  size: u32,
}

impl GroupInvocation {
  /// Invocation `local_id` of a workgroup of `size` invocations.
  pub fn new(local_id: impl Into<Expr<u32>>, size: u32) -> Self {
    Self {
      local_id: local_id.into(),
      size: size.max(1),
    }
  }

  /// Invocation of a compute shader running workgroups of `local_size` invocations.
  ///
  /// ```
  /// use sable::{group::GroupInvocation, Scope, StageBuilder};
  ///
  /// let local_size = [32, 2, 1];
  /// StageBuilder::new_compute_shader(local_size, |s, input| {
  ///   let group = GroupInvocation::compute(&input, local_size);
  ///   assert_eq!(group.size(), 64);
  ///
  ///   s.main_fun(|s: &mut Scope<()>| {})
  /// });
  /// ```
  pub fn compute(input: &ComputeShaderInputs, local_size: [u32; 3]) -> Self {
    Self::new(
      input.local_invocation_index.clone(),
      local_size.iter().product(),
    )
  }

  /// Linear index of the invocation in its workgroup.
  pub fn local_id(&self) -> &Expr<u32> {
    &self.local_id
  }

  /// Number of invocations of the workgroup.
  pub fn size(&self) -> u32 {
    self.size
  }

  /// Number of strided iterations needed to cover `count` elements.
  fn rounds(&self, count: u32) -> u32 {
    count.div_ceil(self.size)
  }
}

/// Run `body` for every index in `0..count` owned by the invocation: `local_id`, `local_id + size`…
pub fn apply<R>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  count: u32,
  body: impl FnOnce(&mut LoopScope<R>, &Expr<u32>),
) where
  Return: From<R>,
{
  strided(s, group, count, body);
  s.workgroup_barrier();
}

fn strided<R>(s: &mut Scope<R>, group: &GroupInvocation, count: u32, body: impl FnOnce(&mut LoopScope<R>, &Expr<u32>))
where
  Return: From<R>,
{
  let size = group.size;
  s.loop_for(group.local_id.clone(), |i| i.lt(count), |i| i + size, body);
}

/// Set every element of `array` to `value`.
pub fn fill<R, T>(s: &mut Scope<R>, group: &GroupInvocation, array: &WArray<T>, value: impl Into<Expr<T>>)
where
  Return: From<R>,
  T: ToType,
{
  let value = value.into();
  apply(s, group, array.len(), |s, i| s.set(array.at(i), value));
}

/// Set every element of `array` to the value `f` computes out of its index.
pub fn generate<R, T>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  array: &WArray<T>,
  f: impl FnOnce(&Expr<u32>) -> Expr<T>,
) where
  Return: From<R>,
  T: ToType,
{
  apply(s, group, array.len(), |s, i| s.set(array.at(i), f(i)));
}

/// Map the elements of `src` with `f` into `dst`, up to the length of the shortest array.
pub fn transform<R, T, U>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  src: &WArray<T>,
  dst: &WArray<U>,
  f: impl FnOnce(&Expr<T>) -> Expr<U>,
) where
  Return: From<R>,
  T: ToType,
  U: ToType,
{
  let len = src.len().min(dst.len());
  apply(s, group, len, |s, i| {
    let value = src.at(i).to_expr();
    s.set(dst.at(i), f(&value));
  });
}

/// Copy `src` into `dst`, up to the length of the shortest array.
pub fn copy<R, T>(s: &mut Scope<R>, group: &GroupInvocation, src: &WArray<T>, dst: &WArray<T>)
where
  Return: From<R>,
  T: ToType,
{
  transform(s, group, src, dst, |x| x.clone());
}

/// Fill `dst` with the elements of the storage array `src` starting at `offset`.
pub fn load<R, T>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  dst: &WArray<T>,
  src: &StorageArray<T>,
  offset: impl Into<Expr<u32>>,
) where
  Return: From<R>,
  T: ToType,
{
  let offset = offset.into();
  apply(s, group, dst.len(), |s, i| s.set(dst.at(i), src.at(&offset + i)));
}

/// Write the elements of `src` to the storage array `dst`, starting at `offset`.
pub fn store<R, T>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  src: &WArray<T>,
  dst: &StorageArray<T>,
  offset: impl Into<Expr<u32>>,
) where
  Return: From<R>,
  T: ToType,
{
  let offset = offset.into();
  s.workgroup_barrier();
  apply(s, group, src.len(), |s, i| s.set(dst.at(&offset + i), src.at(i)));
}

/// Combine all the elements of `array` with `combine`, in place; the result is the first element.
///
/// Contiguous segments are combined pairwise with a doubling stride: `a[0] ⊕ a[1]`, then `(a[0] ⊕ a[1]) ⊕ (a[2] ⊕
/// a[3])`… The pairing only depends on the length of the array, so the result is the same on every run, and
/// `combine` only needs to be associative.
///
/// # Examples
///
/// ```
/// use sable::{group::{self, GroupInvocation}, Scope, StageBuilder};
///
/// StageBuilder::new_compute_shader([64, 1, 1], |mut s, input| {
///   let values = s.shared_array::<u32>(256);
///   let group = GroupInvocation::compute(&input, [64, 1, 1]);
///
///   s.main_fun(|s: &mut Scope<()>| {
///     group::generate(s, &group, &values, |i| i * 2u32);
///     let total = group::reduce(s, &group, &values, |a, b| a + b);
///     let sum = s.var(total);
///   })
/// });
/// ```
pub fn reduce<R, T>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  array: &WArray<T>,
  combine: impl Fn(&Expr<T>, &Expr<T>) -> Expr<T>,
) -> Expr<T>
where
  Return: From<R>,
  T: ToType,
{
  let n = array.len();
  s.workgroup_barrier();

  let mut stride = 1;
  while stride < n {
    // pair `p` combines a[2 · stride · p] with a[2 · stride · p + stride]; only the first one is written
    let pairs = (n - stride).div_ceil(2 * stride);
    strided(s, group, pairs, |s, p| {
      let i = s.var(p * (2 * stride));
      let left = array.at(&i).to_expr();
      let right = array.at(&i + stride).to_expr();
      s.set(array.at(&i), combine(&left, &right));
    });
    s.workgroup_barrier();

    stride *= 2;
  }

  array.at(0u32).to_expr()
}

/// Inclusive prefix scan of `array` with `combine`, in place: `a[i]` becomes `a[0] ⊕ … ⊕ a[i]`.
///
/// The scan runs `⌈log2(n)⌉` rounds; each round reads every element, waits for the workgroup, then writes the new
/// values, so no invocation reads an element another one already updated.
pub fn inclusive_scan<R, T>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  array: &WArray<T>,
  combine: impl Fn(&Expr<T>, &Expr<T>) -> Expr<T>,
) where
  Return: From<R>,
  T: ToType,
{
  let n = array.len();
  let rounds = group.rounds(n);
  let staging = s.array::<T>(rounds.max(1));
  s.workgroup_barrier();

  let mut offset = 1;
  while offset < n {
    for_owned(s, group, n, |s, i, j| {
      s.when(i.gte(offset), |s| {
        let left = array.at(i - offset).to_expr();
        let right = array.at(i).to_expr();
        s.set(staging.at(j), combine(&left, &right));
      })
      .or(|s| s.set(staging.at(j), array.at(i)));
    });
    s.workgroup_barrier();

    write_back(s, group, array, &staging);
    offset *= 2;
  }
}

/// Exclusive prefix scan of `array` with `combine`, in place: `a[0]` becomes `identity` and `a[i]` becomes
/// `a[0] ⊕ … ⊕ a[i - 1]`.
pub fn exclusive_scan<R, T>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  array: &WArray<T>,
  identity: impl Into<Expr<T>>,
  combine: impl Fn(&Expr<T>, &Expr<T>) -> Expr<T>,
) where
  Return: From<R>,
  T: ToType,
{
  let identity = identity.into();
  inclusive_scan(s, group, array, &combine);

  // shift the inclusive scan by one element
  let n = array.len();
  let staging = s.array::<T>(group.rounds(n).max(1));
  for_owned(s, group, n, |s, i, j| {
    s.when(i.eq(0u32), |s| s.set(staging.at(j), &identity))
      .or(|s| s.set(staging.at(j), array.at(i - 1u32)));
  });
  s.workgroup_barrier();

  write_back(s, group, array, &staging);
}

/// Run `body` with every index `i` in `0..count` owned by the invocation and its rank `j` among them.
fn for_owned<R>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  count: u32,
  body: impl FnOnce(&mut LoopScope<R>, &Var<u32>, &Expr<u32>),
) where
  Return: From<R>,
{
  let size = group.size;
  let local_id = group.local_id.clone();

  s.for_range(0u32, group.rounds(count), |s, j| {
    let i = s.var(local_id + j * size);
    s.when(i.lt(count), |s| body(s, &i, j));
  });
}

fn write_back<R, T>(s: &mut Scope<R>, group: &GroupInvocation, array: &WArray<T>, staging: &VArray<T>)
where
  Return: From<R>,
  T: ToType,
{
  for_owned(s, group, array.len(), |s, i, j| s.set(array.at(i), staging.at(j)));
  s.workgroup_barrier();
}

/// Sort `array` in ascending order.
///
/// See [`sort_by`].
pub fn sort<R, T>(s: &mut Scope<R>, group: &GroupInvocation, array: &WArray<T>)
where
  Return: From<R>,
  T: Numeric + PartialOrd,
{
  sort_by(s, group, array, |a, b| a.lt(b));
}

/// Sort `array` so that `less` holds for no pair of elements in decreasing order.
///
/// The sort is a bitonic network: a fixed sequence of compare-and-swap steps that only depends on the length of the
/// array. Each merge stage starts with a _flip_ (element `i` of a block compared with the mirrored one) followed by
/// half-cleaners of decreasing distance. Elements past the end of the array behave as if they were larger than any
/// other, so any length is supported.
pub fn sort_by<R, T>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  array: &WArray<T>,
  less: impl Fn(&Expr<T>, &Expr<T>) -> Expr<bool>,
) where
  Return: From<R>,
  T: ToType,
{
  let n = array.len();
  let padded = n.next_power_of_two();
  let pairs = padded / 2;
  s.workgroup_barrier();

  let mut block = 2;
  while block <= padded {
    let half = block / 2;
    compare_swap(s, group, array, pairs, &less, |p| {
      let base = p / half * block;
      let offset = p % half;
      (&base + &offset, base + (block - 1) - offset)
    });

    let mut distance = block / 4;
    while distance >= 1 {
      compare_swap(s, group, array, pairs, &less, |p| {
        let i = p / distance * (2 * distance) + p % distance;
        (i.clone(), i + distance)
      });
      distance /= 2;
    }

    block *= 2;
  }
}

/// Order the pairs `(i, j)` with `i < j` given by `pair` for every pair index.
fn compare_swap<R, T>(
  s: &mut Scope<R>,
  group: &GroupInvocation,
  array: &WArray<T>,
  pairs: u32,
  less: &impl Fn(&Expr<T>, &Expr<T>) -> Expr<bool>,
  pair: impl FnOnce(&Expr<u32>) -> (Expr<u32>, Expr<u32>),
) where
  Return: From<R>,
  T: ToType,
{
  let n = array.len();

  strided(s, group, pairs, |s, p| {
    let (i, j) = pair(p);
    let i = s.var(i);
    let j = s.var(j);

    s.when(j.lt(n), |s| {
      let x = s.var(array.at(&i));
      let y = s.var(array.at(&j));

      s.when(less(&y.to_expr(), &x.to_expr()), |s| {
        s.set(array.at(&i), &y);
        s.set(array.at(&j), &x);
      });
    });
  });

  s.workgroup_barrier();
}

/// Index of the first element of the sorted `array` that is not less than `value`, or the length of the array.
///
/// Unlike the other algorithms, the search is run by each invocation on its own and has no barrier: the array must
/// already be visible, as it is after [`sort`].
pub fn lower_bound<R, T>(s: &mut Scope<R>, array: &WArray<T>, value: impl Into<Expr<T>>) -> Expr<u32>
where
  Return: From<R>,
  T: Numeric + PartialOrd,
{
  let value = value.into();
  binary_search(s, array, |element| element.lt(&value))
}

/// Index of the first element of the sorted `array` that is greater than `value`, or the length of the array.
pub fn upper_bound<R, T>(s: &mut Scope<R>, array: &WArray<T>, value: impl Into<Expr<T>>) -> Expr<u32>
where
  Return: From<R>,
  T: Numeric + PartialOrd,
{
  let value = value.into();
  binary_search(s, array, |element| element.lte(&value))
}

/// Index of the first element for which `before` is false, `before` holding on a prefix of the array.
fn binary_search<R, T>(s: &mut Scope<R>, array: &WArray<T>, before: impl FnOnce(&Expr<T>) -> Expr<bool>) -> Expr<u32>
where
  Return: From<R>,
  T: ToType,
{
  let lo = s.var(0u32);
  let hi = s.var(array.len());

  s.loop_while(lo.lt(&hi), |s| {
    let mid = s.var((&lo + &hi) / 2u32);
    let element = array.at(&mid).to_expr();

    s.when(before(&element), |s| s.set(&lo, &mid + 1u32))
      .or(|s| s.set(&hi, &mid));
  });

  lo.to_expr()
}

fn subgroup<T>(op: SubgroupOp, args: Vec<Expr<T>>) -> Expr<T>
where
  T: ToType,
{
  Expr::new(ExprNode::FunCall(
    ErasedFunHandle::Subgroup(op),
    args.into_iter().map(Expr::erase).collect(),
  ))
}

macro_rules! subgroup_arithmetic {
  ($($reduce:ident, $inclusive:ident, $exclusive:ident => $op:ident;)*) => {
    $(
      #[doc = concat!("Subgroup `", stringify!($op), "` of `value` over the active invocations.")]
      pub fn $reduce<T>(value: impl Into<Expr<T>>) -> Expr<T>
      where
        T: Numeric,
      {
        subgroup(SubgroupOp::$op(GroupOperation::Reduce), vec![value.into()])
      }

      #[doc = concat!("Inclusive subgroup `", stringify!($op), "` scan of `value`.")]
      pub fn $inclusive<T>(value: impl Into<Expr<T>>) -> Expr<T>
      where
        T: Numeric,
      {
        subgroup(SubgroupOp::$op(GroupOperation::InclusiveScan), vec![value.into()])
      }

      #[doc = concat!("Exclusive subgroup `", stringify!($op), "` scan of `value`.")]
      pub fn $exclusive<T>(value: impl Into<Expr<T>>) -> Expr<T>
      where
        T: Numeric,
      {
        subgroup(SubgroupOp::$op(GroupOperation::ExclusiveScan), vec![value.into()])
      }
    )*
  };
}

subgroup_arithmetic! {
  subgroup_add, subgroup_inclusive_add, subgroup_exclusive_add => Add;
  subgroup_mul, subgroup_inclusive_mul, subgroup_exclusive_mul => Mul;
  subgroup_min, subgroup_inclusive_min, subgroup_exclusive_min => Min;
  subgroup_max, subgroup_inclusive_max, subgroup_exclusive_max => Max;
}

/// Whether the invocation is the elected one of its subgroup: the active invocation with the lowest index.
pub fn subgroup_elect() -> Expr<bool> {
  subgroup::<bool>(SubgroupOp::Elect, Vec::new())
}

/// Whether `predicate` holds for all the active invocations of the subgroup.
pub fn subgroup_all(predicate: impl Into<Expr<bool>>) -> Expr<bool> {
  subgroup(SubgroupOp::All, vec![predicate.into()])
}

/// Whether `predicate` holds for any active invocation of the subgroup.
pub fn subgroup_any(predicate: impl Into<Expr<bool>>) -> Expr<bool> {
  subgroup(SubgroupOp::Any, vec![predicate.into()])
}

/// `value` as seen by the elected invocation of the subgroup.
pub fn subgroup_broadcast_first<T>(value: impl Into<Expr<T>>) -> Expr<T>
where
  T: ToType,
{
  subgroup(SubgroupOp::BroadcastFirst, vec![value.into()])
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    barrier::Barrier,
    lit,
    scope::ScopeInstr,
    stage::{ShaderDecl, Stage, StageBuilder},
  };

  fn main_instructions(stage: &Stage) -> &[ScopeInstr] {
    stage
      .decls
      .iter()
      .find_map(|decl| match decl {
        ShaderDecl::Main(fun) => Some(fun.scope.instructions()),
        _ => None,
      })
      .unwrap_or(&[])
  }

  fn barriers(instrs: &[ScopeInstr]) -> usize {
    instrs
      .iter()
      .filter(|instr| matches!(instr, ScopeInstr::Barrier(b) if *b == Barrier::workgroup()))
      .count()
  }

  #[test]
  fn reduce_runs_log_rounds() {
    let stage = StageBuilder::new_compute_shader([4, 1, 1], |mut s, input| {
      let values = s.shared_array::<u32>(10);
      let group = GroupInvocation::compute(&input, [4, 1, 1]);

      s.main_fun(|s: &mut Scope<()>| {
        let _ = reduce(s, &group, &values, |a, b| a + b);
      })
    });

    // one barrier before the first round, then one per round: strides 1, 2, 4 and 8
    assert!(stage.errors().is_empty());
    assert_eq!(barriers(main_instructions(&stage)), 5);
  }

  #[test]
  fn sort_network_size() {
    let stage = StageBuilder::new_compute_shader([8, 1, 1], |mut s, input| {
      let keys = s.shared_array::<f32>(5);
      let group = GroupInvocation::compute(&input, [8, 1, 1]);

      s.main_fun(|s: &mut Scope<()>| {
        sort(s, &group, &keys);
      })
    });

    // padded to 8: merge stages of 2, 4 and 8 elements with 1, 2 and 3 steps
    assert_eq!(barriers(main_instructions(&stage)), 1 + 1 + 2 + 3);
  }

  #[test]
  fn searches_have_no_barrier() {
    let stage = StageBuilder::new_compute_shader([8, 1, 1], |mut s, _| {
      let keys = s.shared_array::<i32>(16);

      s.main_fun(|s: &mut Scope<()>| {
        let first = lower_bound(s, &keys, 3);
        let last = upper_bound(s, &keys, 3);
        let _count = s.var(last - first);
      })
    });

    let instrs = main_instructions(&stage);
    assert_eq!(barriers(instrs), 0);
    assert_eq!(
      instrs.iter().filter(|instr| matches!(instr, ScopeInstr::While { .. })).count(),
      2
    );
  }

  #[test]
  fn subgroup_calls() {
    let sum = subgroup_inclusive_add(lit!(1u32));

    match sum.erased().node() {
      ExprNode::FunCall(ErasedFunHandle::Subgroup(op), args) => {
        assert_eq!(*op, SubgroupOp::Add(GroupOperation::InclusiveScan));
        assert_eq!(args.len(), 1);
      }
      node => panic!("unexpected node {:?}", node),
    }

    assert!(matches!(
      subgroup_elect().erased().node(),
      ExprNode::FunCall(ErasedFunHandle::Subgroup(SubgroupOp::Elect), args) if args.is_empty()
    ));
  }
}
