//! Emitted modules checked by the SPIR-V validator, for Vulkan 1.1.

use sable::{
  group::{self, GroupInvocation},
  vec4, CompileOptions, Conditional as _, Float32, HasX as _, InputRate, Interpolation, PipelineLayout, Sampling,
  Scope, Stage, StageBuilder, V4,
};
use spirv_tools::{val::Validator as _, TargetEnv};

/// Compile `stage` with and without variable promotion and validate both modules.
fn validate(name: &str, stage: &Stage, layout: &PipelineLayout) {
  let _ = env_logger::builder().is_test(true).try_init();
  let validator = spirv_tools::val::create(Some(TargetEnv::Vulkan_1_1));

  for promote_variables in [true, false] {
    let options = CompileOptions {
      promote_variables,
      ..CompileOptions::default()
    };

    let module = stage.compile(layout, &options).unwrap();
    let words = module.assemble();

    if let Err(error) = validator.validate(&words, None) {
      panic!("{} (promote_variables: {}): {}", name, promote_variables, error);
    }
  }
}

#[test]
fn straight_line_compute() {
  let mut layout = PipelineLayout::new();
  let data = layout.storage_array::<f32>(0);

  let stage = StageBuilder::new_compute_shader([64, 1, 1], |s, input| {
    s.main_fun(|s: &mut Scope<()>| {
      let i = input.global_invocation_id.x();
      s.set(data.at(&i), data.at(&i) * 2.);
    })
  });

  validate("straight line", &stage, &layout);
}

#[test]
fn markers() {
  let mut layout = PipelineLayout::new();
  let out = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let i = s.var(0i32);
      let acc = s.var(0u32);

      s.for_(&i, 0, 8, 1);
      s.if_(i.lt(4));
      s.set(&acc, &acc + 1u32);
      s.else_();
      s.set(&acc, &acc + 2u32);
      s.fi();
      s.rof();

      s.switch_(&acc);
      s.case_(12u32);
      s.set(out.at(0u32), 1u32);
      s.break_();
      s.default_();
      s.set(out.at(0u32), 2u32);
      s.end_switch();
    })
  });

  validate("markers", &stage, &layout);
}

#[test]
fn early_exits() {
  let mut layout = PipelineLayout::new();
  let out = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([4, 1, 1], |s, input| {
    s.main_fun(|s: &mut Scope<()>| {
      let id = input.local_invocation_index.clone();
      let sum = s.var(0u32);

      s.loop_for(
        0u32,
        |i| i.lt(10u32),
        |i| i + 1u32,
        |s, i| {
          s.when(i.eq(3u32), |s| s.loop_continue());
          s.when(i.eq(8u32), |s| s.loop_break());
          s.set(&sum, &sum + i);
        },
      );

      s.when(id.eq(0u32), |s| s.abort());

      s.switch(&id)
        .case(1, |s| {
          s.set(out.at(&id), &sum);
          s.abort();
        })
        .default(|s| s.break_());

      s.set(out.at(&id), 0u32);
    })
  });

  validate("early exits", &stage, &layout);
}

#[test]
fn user_functions() {
  let mut layout = PipelineLayout::new();
  let out = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([4, 1, 1], |mut s, input| {
    let clamp_double = s.fun(|s: &mut Scope<sable::Expr<u32>>, a: sable::Expr<u32>| {
      s.when(a.gt(100u32), |s| s.leave(100u32));
      a * 2u32
    });

    s.main_fun(|s: &mut Scope<()>| {
      let id = input.local_invocation_index.clone();
      let x = s.var(clamp_double.call(out.at(&id).to_expr()));
      s.set(out.at(&id), &x);
    })
  });

  validate("user functions", &stage, &layout);
}

#[test]
fn workgroup_algorithms() {
  let mut layout = PipelineLayout::new();
  let input = layout.storage_array::<u32>(0);
  let output = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([8, 1, 1], |mut s, compute| {
    let values = s.shared_array::<u32>(13);
    let group = GroupInvocation::compute(&compute, [8, 1, 1]);

    s.main_fun(|s: &mut Scope<()>| {
      group::load(s, &group, &values, &input, 0u32);
      group::sort(s, &group, &values);
      group::inclusive_scan(s, &group, &values, |a, b| a + b);
      group::store(s, &group, &values, &output, 0u32);
    })
  });

  validate("workgroup algorithms", &stage, &layout);
}

#[test]
fn subgroup_operations() {
  let mut layout = PipelineLayout::new();
  let out = layout.storage_array::<u32>(0);

  let stage = StageBuilder::new_compute_shader([32, 1, 1], |s, input| {
    s.main_fun(|s: &mut Scope<()>| {
      let i = input.local_invocation_index.clone();
      let sum = s.var(group::subgroup_inclusive_add(i.clone()));
      s.set(out.at(&i), &sum);
    })
  });

  validate("subgroup operations", &stage, &layout);
}

#[test]
fn graphics_stages() {
  let mut layout = PipelineLayout::new();
  let vertices = layout.vertex_buffer(InputRate::Vertex);
  let position = layout.vertex_attribute::<(Float32, Float32, Float32)>(&vertices);
  let tint = layout.uniform_buffer::<V4<f32>>(0);
  let color = layout.varying::<V4<f32>>(Interpolation::Smooth, Sampling::Center);
  let out = layout.color_output::<V4<f32>>();

  let vs = StageBuilder::new_vertex_shader(|s, _, output| {
    s.main_fun(|s: &mut Scope<()>| {
      s.set(&output.position, vec4!(position.to_expr(), 1f32));
      s.set(color.output(), (*tint).clone());
    })
  });

  let fs = StageBuilder::new_fragment_shader(|s, _, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let c = s.var(color.input());
      s.when(c.x().lt(0.1f32), |s| s.kill());
      s.set(&*out, &c);
    })
  });

  validate("vertex", &vs, &layout);
  validate("fragment", &fs, &layout);
}
