//! Window and event loop glue.
//!
//! [`App`] owns everything that only exists while the window does: the
//! renderer on top of the Vulkan device and the egui overlay. Input is
//! collected into a [`CameraIntent`] that is applied once per redraw.
//!
//! # Example
//! ```no_run
//! use clap::Parser;
//! use sponza_viewer::{App, config::Config};
//! use winit::event_loop::EventLoop;
//!
//! let event_loop = EventLoop::new().expect("event loop");
//! let mut app = App::new(Config::parse());
//! event_loop.run_app(&mut app).expect("event loop failed");
//! ```

use std::{sync::Arc, time::Instant};

use egui_winit_vulkano::{Gui, GuiConfig};
use winit::{
  application::ApplicationHandler,
  dpi::LogicalSize,
  event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseButton, WindowEvent},
  event_loop::ActiveEventLoop,
  keyboard::{KeyCode, PhysicalKey},
  window::{CursorGrabMode, Window, WindowId},
};

use crate::{
  camera::{Camera, CameraIntent},
  config::Config,
  error::{RendererError, RendererResult},
  gpu::{Presenter, vulkan::VulkanDevice},
  gui::{EguiOverlay, GuiState, draw_gui},
  mesh::ObjImporter,
  render::{FrameState, LightSettings, Renderer},
  texture::DecodedImage,
};

/// Longest frame step fed to the camera, in seconds.
const MAX_FRAME_TIME: f64 = 0.1;

struct RenderContext {
  renderer: Renderer<VulkanDevice>,
  gui:      Gui,
}

pub struct App {
  config:          Config,
  rcx:             Option<RenderContext>,
  gui_state:       GuiState,
  camera:          Camera,
  lights:          LightSettings,
  /// Keys currently held; look delta and time step are filled per frame.
  held:            CameraIntent,
  look_delta:      (f64, f64),
  cursor_captured: bool,
  last_frame_time: Instant,
  error:           Option<RendererError>,
}

impl App {
  pub fn new(config: Config) -> Self {
    Self {
      config,
      rcx: None,
      gui_state: GuiState::default(),
      camera: Camera::new(),
      lights: LightSettings::default(),
      held: CameraIntent::default(),
      look_delta: (0.0, 0.0),
      cursor_captured: false,
      last_frame_time: Instant::now(),
      error: None,
    }
  }

  /// The error that ended the event loop, if any.
  pub fn take_error(&mut self) -> Option<RendererError> {
    self.error.take()
  }

  fn fail(&mut self, event_loop: &ActiveEventLoop, error: RendererError) {
    log::error!("{error}");
    self.error = Some(error);
    event_loop.exit();
  }

  fn create_render_context(&mut self, event_loop: &ActiveEventLoop) -> RendererResult<()> {
    let window_attrs = Window::default_attributes()
      .with_decorations(true)
      .with_title("Sponza Viewer")
      .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
    let window = Arc::new(
      event_loop
        .create_window(window_attrs)
        .map_err(|e| RendererError::resource("window", e))?,
    );

    let device = VulkanDevice::new(event_loop, window, &self.config.vulkan_settings())?;
    let gui = Gui::new_with_subpass(
      event_loop,
      device.surface().clone(),
      device.queue().clone(),
      device.overlay_subpass()?,
      device.image_format(),
      GuiConfig::default(),
    );

    let mut renderer = Renderer::new(device, self.config.render_settings())?;

    match ObjImporter::new(self.config.import_options()).import(&self.config.model) {
      Ok(meshes) => renderer.load_scene(&meshes)?,
      Err(e) if !e.is_fatal() => {
        log::warn!("{e}; rendering an empty scene");
        self.gui_state.import_error = Some(e.to_string());
      }
      Err(e) => return Err(e),
    }

    if let Some(path) = &self.config.texture {
      match DecodedImage::open(path) {
        Ok(image) => renderer.set_texture(&image)?,
        Err(e) => log::warn!("{e}; using a white texture"),
      }
    }

    self.rcx = Some(RenderContext { renderer, gui });
    self.last_frame_time = Instant::now();
    Ok(())
  }

  fn set_cursor_captured(&mut self, captured: bool) {
    let Some(rcx) = &self.rcx else { return };
    let window = rcx.renderer.device().window();

    let grabbed = if captured {
      window
        .set_cursor_grab(CursorGrabMode::Locked)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
    } else {
      window.set_cursor_grab(CursorGrabMode::None)
    };
    if let Err(e) = grabbed {
      log::warn!("cursor grab failed: {e}");
      return;
    }

    window.set_cursor_visible(!captured);
    self.cursor_captured = captured;
    self.look_delta = (0.0, 0.0);
  }

  fn redraw(&mut self) -> RendererResult<()> {
    let now = Instant::now();
    let delta_time = now
      .duration_since(self.last_frame_time)
      .as_secs_f64()
      .min(MAX_FRAME_TIME);
    self.last_frame_time = now;

    self.camera.apply_intent(&CameraIntent {
      look_delta: std::mem::take(&mut self.look_delta),
      delta_time,
      ..self.held
    });

    let Some(rcx) = self.rcx.as_mut() else {
      return Ok(());
    };

    let stats = rcx.renderer.stats();
    let changes = draw_gui(
      &mut rcx.gui,
      &mut self.gui_state,
      &mut self.camera,
      &mut self.lights,
      &stats,
    );
    if changes.camera_reset {
      self.camera.reset_pose();
    }

    let [width, height] = rcx.renderer.device().extent();
    let aspect_ratio = width as f32 / height.max(1) as f32;
    let state = FrameState::new(&self.camera, aspect_ratio, &self.lights);

    rcx
      .renderer
      .render_frame(&state, &mut EguiOverlay { gui: &mut rcx.gui })?;
    Ok(())
  }
}

/// The held-key flag `key` controls, if any.
fn key_flag(intent: &mut CameraIntent, key: KeyCode) -> Option<&mut bool> {
  let flag = match key {
    KeyCode::KeyW => &mut intent.move_forward,
    KeyCode::KeyS => &mut intent.move_backward,
    KeyCode::KeyA => &mut intent.move_left,
    KeyCode::KeyD => &mut intent.move_right,
    KeyCode::KeyQ | KeyCode::Space => &mut intent.move_up,
    KeyCode::KeyE | KeyCode::ShiftLeft => &mut intent.move_down,
    KeyCode::ArrowLeft => &mut intent.rotate_left,
    KeyCode::ArrowRight => &mut intent.rotate_right,
    KeyCode::ArrowUp => &mut intent.rotate_up,
    KeyCode::ArrowDown => &mut intent.rotate_down,
    _ => return None,
  };
  Some(flag)
}

impl ApplicationHandler for App {
  fn resumed(&mut self, event_loop: &ActiveEventLoop) {
    if self.rcx.is_some() {
      return;
    }
    if let Err(e) = self.create_render_context(event_loop) {
      self.fail(event_loop, e);
    }
  }

  fn window_event(
    &mut self,
    event_loop: &ActiveEventLoop,
    _window_id: WindowId,
    event: WindowEvent,
  ) {
    let Some(rcx) = self.rcx.as_mut() else { return };
    let pass_events_to_game = !rcx.gui.update(&event);

    match event {
      WindowEvent::CloseRequested => {
        if let Err(e) = rcx.renderer.wait_idle() {
          log::warn!("failed to drain the GPU before exit: {e}");
        }
        event_loop.exit();
      }
      WindowEvent::Resized(_) => {
        rcx.renderer.device_mut().request_resize();
      }
      WindowEvent::Focused(false) => {
        self.held = CameraIntent::default();
      }
      WindowEvent::MouseInput {
        state: ElementState::Pressed,
        button: MouseButton::Left,
        ..
      } if pass_events_to_game && !self.cursor_captured => {
        self.set_cursor_captured(true);
      }
      WindowEvent::KeyboardInput {
        event:
          KeyEvent {
            physical_key: PhysicalKey::Code(key),
            state,
            ..
          },
        ..
      } => {
        let pressed = state == ElementState::Pressed;
        if key == KeyCode::Escape {
          if pressed && self.cursor_captured {
            self.set_cursor_captured(false);
          }
          return;
        }

        // Releases always go through so no key stays stuck under the overlay.
        if pressed && !pass_events_to_game && !self.cursor_captured {
          return;
        }
        if let Some(flag) = key_flag(&mut self.held, key) {
          *flag = pressed;
        }
      }
      WindowEvent::RedrawRequested => {
        if let Err(e) = self.redraw() {
          if e.is_fatal() {
            self.fail(event_loop, e);
          } else {
            log::warn!("{e}");
          }
        }
      }
      _ => {}
    }
  }

  fn device_event(
    &mut self,
    _event_loop: &ActiveEventLoop,
    _device_id: DeviceId,
    event: DeviceEvent,
  ) {
    if let DeviceEvent::MouseMotion { delta } = event {
      if self.cursor_captured {
        self.look_delta.0 += delta.0;
        self.look_delta.1 += delta.1;
      }
    }
  }

  fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
    if let Some(rcx) = &self.rcx {
      rcx.renderer.device().window().request_redraw();
    }
  }

  fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
    if let Some(mut rcx) = self.rcx.take() {
      if let Err(e) = rcx.renderer.wait_idle() {
        log::warn!("failed to drain the GPU before exit: {e}");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn movement_keys_map_to_intent() {
    let mut intent = CameraIntent::default();
    for key in [KeyCode::KeyW, KeyCode::KeyQ, KeyCode::ArrowLeft] {
      *key_flag(&mut intent, key).unwrap() = true;
    }
    assert!(intent.move_forward);
    assert!(intent.move_up);
    assert!(intent.rotate_left);
    assert!(!intent.move_down);
    assert!(key_flag(&mut intent, KeyCode::KeyZ).is_none());
  }

  #[test]
  fn e_moves_down() {
    let mut intent = CameraIntent::default();
    *key_flag(&mut intent, KeyCode::KeyE).unwrap() = true;
    assert!(intent.move_down);
    assert!(!intent.move_up);
  }
}
