use std::io::Cursor;

use sponza_viewer::{
  FrameState,
  ImportOptions,
  Mesh,
  ObjImporter,
  RenderSettings,
  Renderer,
  RendererError,
  RendererResult,
  gpu::{
    BackBufferState,
    ClearValues,
    NoOverlay,
    dummy::{DummyCommand, DummyDevice, DummyEvent, DummyRecorder},
  },
};

fn scene() -> Vec<Mesh> {
  ObjImporter::new(ImportOptions::default())
    .import_reader(&mut Cursor::new(
      "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 0 0 1\n\
       o first\nf 1 2 3\n\
       o second\nf 1 3 4\nf 2 3 4\n",
    ))
    .unwrap()
}

fn renderer(device: &DummyDevice, frames_in_flight: usize) -> Renderer<DummyDevice> {
  let mut renderer = Renderer::new(device.clone(), RenderSettings {
    frames_in_flight,
    ..Default::default()
  })
  .unwrap();
  renderer.load_scene(&scene()).unwrap();
  device.clear_events();
  renderer
}

fn overlay(recorder: &mut DummyRecorder, frame_index: u64) -> RendererResult<()> {
  recorder.marker(format!("overlay {frame_index}"));
  Ok(())
}

#[test]
fn frame_commands_follow_the_pipeline_order() {
  let device = DummyDevice::new();
  let mut renderer = renderer(&device, 2);

  assert!(
    renderer
      .render_frame(&FrameState::default(), &mut overlay)
      .unwrap()
  );

  let events = device.events();
  assert!(matches!(events[0], DummyEvent::Acquire(0)));
  assert!(matches!(events[1], DummyEvent::MappedWrite(_)));
  assert!(matches!(events[2], DummyEvent::MappedWrite(_)));
  assert!(matches!(events[4], DummyEvent::Present(0)));
  // Texture upload took fence 1, the scene upload fence 2.
  assert!(matches!(events[5], DummyEvent::Signal(3)));
  assert_eq!(events.len(), 6);

  let DummyEvent::Submit(commands) = &events[3] else {
    panic!("expected a submission, got {:?}", events[3]);
  };
  assert_eq!(commands[0], DummyCommand::Transition {
    index: 0,
    from:  BackBufferState::Present,
    to:    BackBufferState::RenderTarget,
  });
  assert_eq!(commands[1], DummyCommand::BindTargets {
    index: 0,
    clear: ClearValues::default(),
  });
  assert!(matches!(commands[2], DummyCommand::BindScene { .. }));
  assert!(matches!(commands[3], DummyCommand::DrawIndexed { index_count: 3, .. }));
  assert!(matches!(commands[4], DummyCommand::DrawIndexed { index_count: 6, .. }));
  assert_eq!(commands[5], DummyCommand::Marker("overlay 0".into()));
  assert_eq!(commands[6], DummyCommand::Transition {
    index: 0,
    from:  BackBufferState::RenderTarget,
    to:    BackBufferState::Present,
  });
  assert_eq!(commands.len(), 7);
}

#[test]
fn overlay_sees_increasing_frame_indices() {
  let device = DummyDevice::new();
  let mut renderer = renderer(&device, 2);
  let mut seen = Vec::new();

  for _ in 0..3 {
    renderer
      .render_frame(
        &FrameState::default(),
        &mut |_: &mut DummyRecorder, frame: u64| -> RendererResult<()> {
          seen.push(frame);
          Ok(())
        },
      )
      .unwrap();
  }
  assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn fences_increase_and_slots_are_never_overwritten_in_flight() {
  let device = DummyDevice::new();
  let mut renderer = renderer(&device, 2);

  for _ in 0..10 {
    renderer.render_frame(&FrameState::default(), &mut NoOverlay).unwrap();
  }

  let signals: Vec<_> = device
    .events()
    .into_iter()
    .filter_map(|e| match e {
      DummyEvent::Signal(v) => Some(v),
      _ => None,
    })
    .collect();
  assert_eq!(signals.len(), 10);
  assert!(signals.windows(2).all(|w| w[1] == w[0] + 1));
  assert!(device.violations().is_empty(), "{:?}", device.violations());
  assert_eq!(renderer.stats().frames_rendered, 10);
  assert_eq!(renderer.stats().last_signaled, device.last_signaled());
}

#[test]
fn cpu_stays_within_frames_in_flight() {
  for frames_in_flight in 1..=3 {
    let device = DummyDevice::new();
    let mut renderer = renderer(&device, frames_in_flight);
    for _ in 0..8 {
      renderer.render_frame(&FrameState::default(), &mut NoOverlay).unwrap();
    }

    let events = device.events();
    let mut last_signal = None;
    for event in &events {
      match *event {
        DummyEvent::Signal(v) => last_signal = Some(v),
        DummyEvent::Wait(v) => {
          let signaled = last_signal.unwrap();
          assert_eq!(
            signaled - v,
            frames_in_flight as u64 - 1,
            "{frames_in_flight} frames in flight"
          );
        }
        _ => {}
      }
    }
    assert!(events.iter().any(|e| matches!(e, DummyEvent::Wait(_))));
    assert!(device.violations().is_empty());
  }
}

#[test]
fn uploads_are_released_once_complete() {
  let device = DummyDevice::new();
  let mut renderer = renderer(&device, 2);
  renderer.render_frame(&FrameState::default(), &mut NoOverlay).unwrap();

  assert_eq!(renderer.stats().uploads_in_flight, 0);
  assert_eq!(renderer.stats().meshes, 2);
  assert_eq!(renderer.stats().triangles, 3);
  assert!(device.violations().is_empty());
}

#[test]
fn hung_gpu_is_reported_as_device_lost() {
  let device = DummyDevice::new();
  let mut renderer = renderer(&device, 2);
  device.set_hang(true);

  renderer.render_frame(&FrameState::default(), &mut NoOverlay).unwrap();
  let err = renderer
    .render_frame(&FrameState::default(), &mut NoOverlay)
    .unwrap_err();
  assert!(matches!(err, RendererError::DeviceLost(_)));
  assert!(err.is_fatal());
}

#[test]
fn out_of_date_back_buffer_skips_the_frame() {
  let device = DummyDevice::new();
  let mut renderer = renderer(&device, 2);
  device.set_out_of_date(1);

  assert!(!renderer.render_frame(&FrameState::default(), &mut NoOverlay).unwrap());
  assert!(device.events().is_empty());
  assert_eq!(renderer.stats().frames_skipped, 1);
  assert_eq!(renderer.frame_index(), 0);

  assert!(renderer.render_frame(&FrameState::default(), &mut NoOverlay).unwrap());
  assert_eq!(renderer.frame_index(), 1);
}

#[test]
fn failed_allocation_is_fatal() {
  let device = DummyDevice::new();
  let mut renderer = renderer(&device, 2);
  device.set_fail_allocation(true);

  let err = renderer.load_scene(&scene()).unwrap_err();
  assert!(matches!(err, RendererError::ResourceCreationFailed { .. }));
  assert!(err.is_fatal());
}
