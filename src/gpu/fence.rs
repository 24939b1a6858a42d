//! Frame fence bookkeeping.

use std::time::Duration;

use super::{FenceSource, FenceValue};
use crate::error::{RendererError, RendererResult};

/// Hands out fence values and blocks the CPU when it would outrun the GPU.
///
/// Values start at 1 and grow by one per [`signal`](Self::signal), so `0`
/// can be used as "never submitted" by callers tagging resources.
#[derive(Debug)]
pub struct FrameSynchronizer {
  next_value:    FenceValue,
  last_signaled: FenceValue,
  timeout:       Option<Duration>,
}

impl FrameSynchronizer {
  pub fn new(timeout: Option<Duration>) -> Self {
    Self {
      next_value: 1,
      last_signaled: 0,
      timeout,
    }
  }

  /// Signals the next fence value behind everything submitted so far.
  pub fn signal<F: FenceSource + ?Sized>(&mut self, device: &mut F) -> RendererResult<FenceValue> {
    let value = self.next_value;
    device.signal(value)?;
    self.last_signaled = value;
    self.next_value += 1;
    log::trace!("signaled fence {value}");
    Ok(value)
  }

  /// Blocks until `value` has completed on the GPU.
  pub fn wait_for<F: FenceSource + ?Sized>(
    &self,
    device: &mut F,
    value: FenceValue,
  ) -> RendererResult<()> {
    if value == 0 || device.completed_value()? >= value {
      return Ok(());
    }

    if value > self.last_signaled {
      return Err(RendererError::DeviceLost(format!(
        "waiting for fence {value} which was never signaled (last {})",
        self.last_signaled
      )));
    }

    log::trace!("waiting for fence {value}");
    if device.wait_for(value, self.timeout)? {
      Ok(())
    } else {
      log::error!("fence {value} did not complete within {:?}", self.timeout);
      Err(RendererError::DeviceLost(format!(
        "fence {value} did not complete within {:?}",
        self.timeout
      )))
    }
  }

  pub fn is_complete<F: FenceSource + ?Sized>(
    &self,
    device: &mut F,
    value: FenceValue,
  ) -> RendererResult<bool> {
    Ok(device.completed_value()? >= value)
  }

  /// Waits for everything signaled so far.
  pub fn wait_idle<F: FenceSource + ?Sized>(&self, device: &mut F) -> RendererResult<()> {
    self.wait_for(device, self.last_signaled)
  }

  pub fn last_signaled(&self) -> FenceValue {
    self.last_signaled
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Completes fences only when waited on, unless `hang` is set.
  #[derive(Default)]
  struct ManualFence {
    signaled:  Vec<FenceValue>,
    completed: FenceValue,
    waits:     Vec<FenceValue>,
    hang:      bool,
  }

  impl FenceSource for ManualFence {
    fn signal(&mut self, value: FenceValue) -> RendererResult<()> {
      self.signaled.push(value);
      Ok(())
    }

    fn completed_value(&mut self) -> RendererResult<FenceValue> {
      Ok(self.completed)
    }

    fn wait_for(&mut self, value: FenceValue, _timeout: Option<Duration>) -> RendererResult<bool> {
      self.waits.push(value);
      if self.hang {
        return Ok(false);
      }
      self.completed = self.completed.max(value);
      Ok(true)
    }
  }

  #[test]
  fn values_start_at_one_and_increase() {
    let mut fence = ManualFence::default();
    let mut sync = FrameSynchronizer::new(None);
    let values: Vec<_> = (0..4).map(|_| sync.signal(&mut fence).unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
    assert_eq!(fence.signaled, values);
    assert_eq!(sync.last_signaled(), 4);
  }

  #[test]
  fn completed_values_do_not_block() {
    let mut fence = ManualFence::default();
    let mut sync = FrameSynchronizer::new(None);
    sync.signal(&mut fence).unwrap();
    fence.completed = 1;

    sync.wait_for(&mut fence, 1).unwrap();
    sync.wait_for(&mut fence, 0).unwrap();
    assert!(fence.waits.is_empty());
  }

  #[test]
  fn pending_values_block_until_complete() {
    let mut fence = ManualFence::default();
    let mut sync = FrameSynchronizer::new(None);
    let value = sync.signal(&mut fence).unwrap();

    assert!(!sync.is_complete(&mut fence, value).unwrap());
    sync.wait_for(&mut fence, value).unwrap();
    assert!(sync.is_complete(&mut fence, value).unwrap());
    assert_eq!(fence.waits, vec![value]);
  }

  #[test]
  fn timeout_is_device_lost() {
    let mut fence = ManualFence {
      hang: true,
      ..Default::default()
    };
    let mut sync = FrameSynchronizer::new(Some(Duration::from_millis(10)));
    let value = sync.signal(&mut fence).unwrap();

    let err = sync.wait_for(&mut fence, value).unwrap_err();
    assert!(matches!(err, RendererError::DeviceLost(_)));
    assert!(err.is_fatal());
  }

  #[test]
  fn unsignaled_value_is_rejected() {
    let mut fence = ManualFence::default();
    let sync = FrameSynchronizer::new(None);
    assert!(matches!(
      sync.wait_for(&mut fence, 7),
      Err(RendererError::DeviceLost(_))
    ));
  }

  #[test]
  fn wait_idle_covers_last_signal() {
    let mut fence = ManualFence::default();
    let mut sync = FrameSynchronizer::new(None);
    sync.signal(&mut fence).unwrap();
    sync.signal(&mut fence).unwrap();
    sync.wait_idle(&mut fence).unwrap();
    assert_eq!(fence.completed, 2);
  }
}
