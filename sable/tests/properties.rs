//! Runtime properties of compiled shaders, checked with the reference executor.

use sable::{
  exec::Executor,
  group::{self, GroupInvocation},
  ir::Module,
  lit,
  reflect::DescriptorKind,
  reinterpret_cast, static_cast, CompileError, CompileOptions, Conditional as _, HasX as _, PipelineLayout, Scope,
  StageBuilder, UsageError, V4,
};

fn init_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// Run one workgroup of `module` with `buffers` bound at (0, 0), (0, 1)…, returning their final contents.
fn run(module: &Module, buffers: &[Vec<u32>], seed: Option<u64>) -> Vec<Vec<u32>> {
  let mut exec = Executor::new(module).unwrap();

  for (binding, words) in buffers.iter().enumerate() {
    exec.bind(0, binding as u32, bytemuck::cast_slice::<u32, u8>(words).to_vec());
  }

  if let Some(seed) = seed {
    exec.seed(seed);
  }

  exec.dispatch([1, 1, 1]).unwrap();

  (0..buffers.len() as u32)
    .map(|binding| bytemuck::pod_collect_to_vec(exec.buffer(0, binding).unwrap()))
    .collect()
}

#[test]
fn regions_must_be_balanced() {
  init_logger();

  let balanced = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let c = s.var(1u32);
      s.if_(c.lt(2u32));
      s.set(&c, 3u32);
      s.fi();
    })
  });
  assert!(balanced.compile(&PipelineLayout::new(), &CompileOptions::default()).is_ok());

  let unclosed = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let c = s.var(1u32);
      s.if_(c.lt(2u32));
      s.set(&c, 3u32);
    })
  });
  assert_eq!(
    unclosed.compile(&PipelineLayout::new(), &CompileOptions::default()).err(),
    Some(CompileError::Usage(UsageError::UnclosedRegion { opener: "if_" }))
  );

  let stray = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      s.fi();
    })
  });
  assert!(matches!(
    stray.compile(&PipelineLayout::new(), &CompileOptions::default()),
    Err(CompileError::Usage(UsageError::UnmatchedCloser { .. }))
  ));
}

#[test]
fn empty_counting_loops_never_run() {
  init_logger();

  let mut layout = PipelineLayout::new();
  let out = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let i = s.var(0i32);
      let runs = s.var(0u32);

      s.for_(&i, 5, 5, 1);
      s.set(&runs, &runs + 1u32);
      s.rof();

      s.set(out.at(0u32), i.cast::<u32>());
      s.set(out.at(1u32), &runs);
    })
  });

  let module = stage.compile(&layout, &CompileOptions::default()).unwrap();
  assert_eq!(run(&module, &[vec![9, 9]], None), vec![vec![5, 0]]);
}

#[test]
fn switch_cases_fall_through() {
  init_logger();

  let mut layout = PipelineLayout::new();
  let io = layout.storage_array::<u32>(0);

  // io[0] selects; io[1] and io[2] record which of the two cases ran
  let marker = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let e = s.var(io.at(0u32));

      s.switch_(&e);
      s.case_(1u32);
      s.set(io.at(1u32), 1u32);
      s.case_(2u32);
      s.set(io.at(2u32), 1u32);
      s.break_();
      s.end_switch();
    })
  });

  let closures = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let e = s.var(io.at(0u32));

      s.switch(&e)
        .case(1, |s| s.set(io.at(1u32), 1u32))
        .case(2, |s| {
          s.set(io.at(2u32), 1u32);
          s.break_();
        });
    })
  });

  for stage in [marker, closures] {
    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

    assert_eq!(run(&module, &[vec![1, 0, 0]], None), vec![vec![1, 1, 1]]);
    assert_eq!(run(&module, &[vec![2, 0, 0]], None), vec![vec![2, 0, 1]]);
    assert_eq!(run(&module, &[vec![3, 0, 0]], None), vec![vec![3, 0, 0]]);
  }
}

#[test]
fn casts_round_trip() {
  init_logger();

  let mut layout = PipelineLayout::new();
  let floats = layout.storage_array::<f32>(0);
  let ints = layout.storage_array::<i32>(0);

  let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let x = floats.at(0u32).to_expr();
      s.set(floats.at(1u32), static_cast::<f32, f64>(static_cast::<f64, f32>(x.clone())));
      s.set(floats.at(2u32), static_cast::<f32, f32>(x));

      let bits = ints.at(0u32).to_expr();
      s.set(ints.at(1u32), reinterpret_cast::<i32, f32>(reinterpret_cast::<f32, i32>(bits)));
    })
  });
  let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

  let float_words = [1.25f32, 0., 0.].map(f32::to_bits).to_vec();
  let int_words = [-123_456_789i32, 0].map(|x| x as u32).to_vec();
  let out = run(&module, &[float_words, int_words], None);

  assert_eq!(out[0][1], 1.25f32.to_bits());
  assert_eq!(out[0][1], out[0][2]);
  assert_eq!(out[1][1] as i32, -123_456_789);
}

#[test]
fn reused_slots_do_not_leak_values() {
  init_logger();

  let mut layout = PipelineLayout::new();
  let out = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      s.when(lit!(true), |s| {
        let a = s.var(42u32);
        s.set(out.at(0u32), &a);
      });

      // same type, disjoint block: the slot of `a` may be reused, its value must not
      s.when(lit!(true), |s| {
        let b = s.declare::<u32>();
        s.set(out.at(1u32), &b);
      });
    })
  });

  for promote_variables in [true, false] {
    let options = CompileOptions {
      promote_variables,
      ..CompileOptions::default()
    };
    let module = stage.compile(&layout, &options).unwrap();
    assert_eq!(run(&module, &[vec![7, 7]], None), vec![vec![42, 0]]);
  }
}

/// Pairwise reduction with the pairing of the workgroup reduction.
fn pairwise_sum(mut a: Vec<f32>) -> f32 {
  let n = a.len();
  let mut stride = 1;
  while stride < n {
    let mut i = 0;
    while i + stride < n {
      a[i] += a[i + stride];
      i += 2 * stride;
    }
    stride *= 2;
  }
  a[0]
}

#[test]
fn reductions_are_deterministic() {
  init_logger();

  const N: u32 = 37;
  let mut layout = PipelineLayout::new();
  let input = layout.storage_array::<f32>(0);
  let output = layout.storage_array::<f32>(0);

  let stage = StageBuilder::new_compute_shader([8, 1, 1], |mut s, compute| {
    let values = s.shared_array::<f32>(N);
    let group = GroupInvocation::compute(&compute, [8, 1, 1]);

    s.main_fun(|s: &mut Scope<()>| {
      group::load(s, &group, &values, &input, 0u32);
      let total = group::reduce(s, &group, &values, |a, b| a + b);
      let total = s.var(total);

      s.when(group.local_id().eq(0u32), |s| {
        s.set(output.at(0u32), &total);
      });
    })
  });
  let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

  // magnitudes far apart make the result depend on the summation order
  let values: Vec<f32> = (0..N)
    .map(|i| if i % 3 == 0 { 1.0e8 } else { 0.3 + i as f32 })
    .collect();
  let words: Vec<u32> = values.iter().map(|x| x.to_bits()).collect();
  let expected = pairwise_sum(values).to_bits();

  for seed in [None, Some(0), Some(1), Some(2), Some(3), Some(0xdead_beef)] {
    let out = run(&module, &[words.clone(), vec![0]], seed);
    assert_eq!(out[1][0], expected, "seed {:?}", seed);
  }
}

#[test]
fn bindings_are_numbered_in_declaration_order() {
  init_logger();

  let declare = || {
    let mut layout = PipelineLayout::new();
    let a = layout.storage_array::<u32>(0);
    let b = layout.uniform_buffer::<V4<f32>>(0);
    let c = layout.storage_array::<u32>((0, 0));
    let d = layout.storage_array::<u32>(1);
    (layout, a, b, c, d)
  };

  for _ in 0..2 {
    let (layout, a, b, c, d) = declare();

    let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
      s.main_fun(|s: &mut Scope<()>| {
        s.set(a.at(0u32), c.at(0u32) + d.at(0u32));
        s.set(c.at(1u32), b.x().cast::<u32>());
      })
    });
    let module = stage.compile(&layout, &CompileOptions::default()).unwrap();
    let descriptors = &module.reflection().descriptors;

    // explicit bindings are reserved first; automatic ones follow in declaration order
    assert_eq!(descriptors.get(0, 0).map(|e| e.kind), Some(DescriptorKind::StorageBuffer));
    assert_eq!(descriptors.get(0, 1).map(|e| e.kind), Some(DescriptorKind::StorageBuffer));
    assert_eq!(descriptors.get(0, 2).map(|e| e.kind), Some(DescriptorKind::UniformBuffer));
    assert_eq!(descriptors.get(1, 0).map(|e| e.kind), Some(DescriptorKind::StorageBuffer));
    assert_eq!(descriptors.len(), 4);
  }
}
