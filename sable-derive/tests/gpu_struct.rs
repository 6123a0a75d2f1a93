use sable::{
  exec::Executor,
  field::FieldFlags,
  types::{Type, V4},
  CompileOptions, GpuStruct, PipelineLayout, Scope, StageBuilder, ToType,
};

#[derive(GpuStruct)]
pub struct Particle {
  position: V4<f32>,
  #[gpu(relaxed_precision)]
  speed: f32,
}

#[test]
fn struct_type() {
  let Type::Struct(st) = Particle::ty() else {
    panic!("not a struct");
  };

  assert_eq!(st.name, "Particle");
  assert_eq!(st.fields.len(), 2);
  assert_eq!(st.fields[0].name, "position");
  assert_eq!(st.fields[0].ty, <V4<f32>>::ty());
  assert_eq!(st.fields[0].flags, FieldFlags::empty());
  assert_eq!(st.fields[1].ty, f32::ty());
  assert_eq!(st.fields[1].flags, FieldFlags::RELAXED_PRECISION);
}

#[test]
fn field_tokens() {
  let fields = Particle::fields();

  assert_eq!(fields.position.index(), 0);
  assert_eq!(fields.position.name(), "position");
  assert_eq!(fields.speed.index(), 1);
  assert_eq!(fields.speed.flags(), FieldFlags::RELAXED_PRECISION);
}

#[test]
fn fields_in_a_storage_buffer() {
  let mut layout = PipelineLayout::new();
  let particle = layout.storage_buffer::<Particle>(0);

  let stage = StageBuilder::new_compute_shader([1, 1, 1], |s, _| {
    s.main_fun(|s: &mut Scope<()>| {
      let speed = particle.field(&Particle::fields().speed);
      s.set(&speed, speed.to_expr() * 2.);
    })
  });

  let module = stage.compile(&layout, &CompileOptions::default()).unwrap();

  // std430: a vec4 then a float, padded to the alignment of the vec4
  let mut bytes = vec![0u8; 32];
  bytes[16..20].copy_from_slice(&1.5f32.to_le_bytes());

  let mut exec = Executor::new(&module).unwrap();
  exec.bind(0, 0, bytes);
  exec.dispatch([1, 1, 1]).unwrap();

  assert_eq!(&exec.buffer(0, 0).unwrap()[16..20], &3f32.to_le_bytes());
}
