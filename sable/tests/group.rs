//! Workgroup algorithms, run on the reference executor under several interleavings.

use sable::{
  exec::Executor,
  group::{self, GroupInvocation},
  ir::Module,
  CompileOptions, PipelineLayout, Scope, StageBuilder,
};

const SEEDS: [Option<u64>; 5] = [None, Some(0), Some(7), Some(1234), Some(u64::MAX)];

fn run(module: &Module, input: &[u32], output_len: usize, seed: Option<u64>) -> Vec<u32> {
  let _ = env_logger::builder().is_test(true).try_init();

  let mut exec = Executor::new(module).unwrap();
  exec
    .bind(0, 0, bytemuck::cast_slice::<u32, u8>(input).to_vec())
    .bind(0, 1, vec![0u8; output_len * 4]);

  if let Some(seed) = seed {
    exec.seed(seed);
  }

  exec.dispatch([1, 1, 1]).unwrap();
  bytemuck::pod_collect_to_vec(exec.buffer(0, 1).unwrap())
}

/// A compute stage of 8 invocations loading `len` elements of binding 0 into shared memory, running `algorithm`
/// on them and storing the result to binding 1.
fn shared_round_trip(
  len: u32,
  algorithm: impl FnOnce(&mut Scope<()>, &GroupInvocation, &sable::WArray<u32>),
) -> Module {
  let mut layout = PipelineLayout::new();
  let input = layout.storage_array::<u32>(0);
  let output = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([8, 1, 1], |mut s, compute| {
    let values = s.shared_array::<u32>(len);
    let group = GroupInvocation::compute(&compute, [8, 1, 1]);

    s.main_fun(|s: &mut Scope<()>| {
      group::load(s, &group, &values, &input, 0u32);
      algorithm(s, &group, &values);
      group::store(s, &group, &values, &output, 0u32);
    })
  });

  stage.compile(&layout, &CompileOptions::default()).unwrap()
}

#[test]
fn sort() {
  let input = [9, 3, 12, 0, 7, 7, 1, 42, 5, 11, 2, 8, 6];
  let module = shared_round_trip(input.len() as u32, |s, group, values| group::sort(s, group, values));

  let mut expected = input.to_vec();
  expected.sort_unstable();

  for seed in SEEDS {
    assert_eq!(run(&module, &input, input.len(), seed), expected, "seed {:?}", seed);
  }
}

#[test]
fn sort_descending() {
  let input = [4, 8, 15, 16, 23, 42, 1];
  let module = shared_round_trip(input.len() as u32, |s, group, values| {
    group::sort_by(s, group, values, |a, b| a.gt(b))
  });

  for seed in SEEDS {
    assert_eq!(run(&module, &input, input.len(), seed), vec![42, 23, 16, 15, 8, 4, 1]);
  }
}

#[test]
fn scans() {
  let input: Vec<u32> = (1..=19).collect();

  let inclusive = shared_round_trip(input.len() as u32, |s, group, values| {
    group::inclusive_scan(s, group, values, |a, b| a + b)
  });
  let exclusive = shared_round_trip(input.len() as u32, |s, group, values| {
    group::exclusive_scan(s, group, values, 0u32, |a, b| a + b)
  });

  let mut inclusive_sums = Vec::new();
  let mut exclusive_sums = Vec::new();
  let mut acc = 0;
  for x in &input {
    exclusive_sums.push(acc);
    acc += x;
    inclusive_sums.push(acc);
  }

  for seed in SEEDS {
    assert_eq!(run(&inclusive, &input, input.len(), seed), inclusive_sums, "seed {:?}", seed);
    assert_eq!(run(&exclusive, &input, input.len(), seed), exclusive_sums, "seed {:?}", seed);
  }
}

#[test]
fn fill_and_generate() {
  let filled = shared_round_trip(11, |s, group, values| group::fill(s, group, values, 3u32));
  let generated = shared_round_trip(11, |s, group, values| group::generate(s, group, values, |i| i * i));

  let input = [0; 11];
  assert_eq!(run(&filled, &input, 11, Some(5)), vec![3; 11]);
  assert_eq!(
    run(&generated, &input, 11, Some(5)),
    (0..11).map(|i| i * i).collect::<Vec<u32>>()
  );
}

#[test]
fn searches() {
  // sorted, with a run of duplicates
  let input = [1, 3, 3, 3, 8, 13, 21];
  let probes = [0u32, 1, 3, 4, 21, 22];

  let mut layout = PipelineLayout::new();
  let data = layout.storage_array::<u32>(0);
  let output = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([8, 1, 1], |mut s, compute| {
    let values = s.shared_array::<u32>(input.len() as u32);
    let group = GroupInvocation::compute(&compute, [8, 1, 1]);

    s.main_fun(|s: &mut Scope<()>| {
      group::load(s, &group, &values, &data, 0u32);

      for (k, probe) in probes.iter().enumerate() {
        let lower = group::lower_bound(s, &values, *probe);
        let lower = s.var(lower);
        let upper = group::upper_bound(s, &values, *probe);
        let upper = s.var(upper);

        // every invocation finds the same bounds and writes the same values
        s.set(output.at(2 * k as u32), &lower);
        s.set(output.at(2 * k as u32 + 1), &upper);
      }
    })
  });
  let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

  let expected: Vec<u32> = probes
    .iter()
    .flat_map(|&p| {
      [
        input.partition_point(|&x| x < p) as u32,
        input.partition_point(|&x| x <= p) as u32,
      ]
    })
    .collect();

  for seed in SEEDS {
    assert_eq!(run(&module, &input, probes.len() * 2, seed), expected, "seed {:?}", seed);
  }
}
