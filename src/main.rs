use std::error::Error;

use clap::Parser;
use sponza_viewer::{App, config::Config, logging::init_logging};
use winit::event_loop::EventLoop;

fn main() -> Result<(), Box<dyn Error>> {
  let config = Config::parse();
  init_logging(config.logging_config());

  let event_loop = EventLoop::new()?;
  let mut app = App::new(config);
  event_loop.run_app(&mut app)?;

  match app.take_error() {
    Some(e) => Err(e.into()),
    None => Ok(()),
  }
}
