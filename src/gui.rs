//! Debug overlay drawn with egui in the second subpass.

use std::time::Instant;

use egui_winit_vulkano::Gui;

use crate::{
  camera::Camera,
  error::RendererResult,
  gpu::{Overlay, vulkan::VulkanRecorder},
  render::{FrameStats, LightSettings},
};

/// Overlay state that lives across frames.
#[derive(Debug, Clone)]
pub struct GuiState {
  pub fps:                    f32,
  pub avg_fps:                f32,
  pub frame_count:            u32,
  pub frame_time_accumulator: f32,
  pub last_frame_time:        Instant,
  pub last_avg_update:        Instant,
  /// Message of the last failed scene import, shown until dismissed.
  pub import_error:           Option<String>,
}

impl Default for GuiState {
  fn default() -> Self {
    Self {
      fps:                    0.0,
      avg_fps:                0.0,
      frame_count:            0,
      frame_time_accumulator: 0.0,
      last_frame_time:        Instant::now(),
      last_avg_update:        Instant::now(),
      import_error:           None,
    }
  }
}

impl GuiState {
  fn tick(&mut self) -> f32 {
    let now = Instant::now();
    let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
    self.fps = if frame_time > 0.0 { 1.0 / frame_time } else { 0.0 };
    self.frame_time_accumulator += frame_time;
    self.frame_count += 1;

    if now.duration_since(self.last_avg_update).as_secs_f32() >= 1.0 {
      self.avg_fps = self.frame_count as f32 / self.frame_time_accumulator;
      self.frame_count = 0;
      self.frame_time_accumulator = 0.0;
      self.last_avg_update = now;
    }

    self.last_frame_time = now;
    frame_time
  }
}

/// What the user asked for through the overlay this frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GuiStateChanges {
  pub camera_reset:        bool,
  /// The pointer and keyboard are not used by egui.
  pub pass_events_to_game: bool,
}

/// Lays out the overlay for this frame. Sliders edit `camera` and `lights`
/// in place.
pub fn draw_gui(
  gui: &mut Gui,
  state: &mut GuiState,
  camera: &mut Camera,
  lights: &mut LightSettings,
  stats: &FrameStats,
) -> GuiStateChanges {
  let mut changes = GuiStateChanges::default();
  let frame_time = state.tick();

  gui.immediate_ui(|gui| {
    let ctx = gui.context();
    changes.pass_events_to_game = !ctx.wants_pointer_input() && !ctx.wants_keyboard_input();

    egui::Window::new("Stats & Controls")
      .default_pos([10.0, 10.0])
      .show(&ctx, |ui| {
        ui.heading("Performance");
        ui.label(format!("FPS: {:.1}", state.fps));
        ui.label(format!("Avg FPS: {:.1}", state.avg_fps));
        ui.label(format!("Frame Time: {:.2}ms", frame_time * 1000.0));
        ui.label(format!(
          "Frames: {} rendered, {} skipped",
          stats.frames_rendered, stats.frames_skipped
        ));

        ui.separator();

        ui.heading("Synchronization");
        ui.label(format!("Fence signaled: {}", stats.last_signaled));
        ui.label(format!("Fence completed: {}", stats.last_completed));
        ui.label(format!("Uploads in flight: {}", stats.uploads_in_flight));

        ui.separator();

        ui.heading("Scene");
        ui.label(format!("Meshes: {}", stats.meshes));
        ui.label(format!("Triangles: {}", stats.triangles));
        ui.label(format!("Draw calls: {}", stats.draw_calls));

        ui.separator();

        ui.heading("Camera Position");
        ui.label(format!("X: {:.2}", camera.position.x));
        ui.label(format!("Y: {:.2}", camera.position.y));
        ui.label(format!("Z: {:.2}", camera.position.z));
        ui.label(format!("Yaw: {:.1}°", camera.yaw.to_degrees()));
        ui.label(format!("Pitch: {:.1}°", camera.pitch.to_degrees()));

        ui.horizontal(|ui| {
          ui.label("Move speed:");
          ui.add(egui::Slider::new(&mut camera.move_speed, 0.5..=100.0).logarithmic(true));
        });
        ui.horizontal(|ui| {
          ui.label("Rotation speed:");
          ui.add(egui::Slider::new(&mut camera.rotation_speed, 0.1..=5.0).step_by(0.1));
        });

        ui.separator();

        ui.heading("Light");
        ui.horizontal(|ui| {
          ui.label("Intensity:");
          ui.add(egui::Slider::new(&mut lights.intensity, 0.0..=4.0));
        });
        ui.horizontal(|ui| {
          ui.label("Ambient:");
          ui.add(egui::Slider::new(&mut lights.ambient, 0.0..=1.0));
        });
        ui.horizontal(|ui| {
          ui.label("Specular power:");
          ui.add(egui::Slider::new(&mut lights.specular_power, 1.0..=256.0).logarithmic(true));
        });

        ui.separator();

        ui.heading("Controls");
        ui.label("Click - Capture mouse, Escape - Release");
        ui.label("WASD - Move horizontally");
        ui.label("Q/E - Move up/down");
        ui.label("Arrows - Rotate");

        ui.separator();

        if ui.button("Reset Camera Position").clicked() {
          changes.camera_reset = true;
        }
      });

    let mut open = state.import_error.is_some();
    if let Some(message) = &state.import_error {
      egui::Window::new("Import failed")
        .open(&mut open)
        .default_pos([400.0, 10.0])
        .show(&ctx, |ui| {
          ui.label(message);
          ui.label("Rendering an empty scene.");
        });
    }
    if !open {
      state.import_error = None;
    }
  });

  changes
}

/// Hands the egui draw data laid out by [`draw_gui`] to a frame.
pub struct EguiOverlay<'a> {
  pub gui: &'a mut Gui,
}

impl Overlay<VulkanRecorder> for EguiOverlay<'_> {
  fn record(&mut self, recorder: &mut VulkanRecorder, frame_index: u64) -> RendererResult<()> {
    let commands = self.gui.draw_on_subpass_image(recorder.extent());
    log::trace!("overlay recorded for frame {frame_index}");
    recorder.execute_overlay(commands)
  }
}
