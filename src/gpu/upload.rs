//! Transient upload resources waiting for the GPU to finish reading them.

use std::collections::VecDeque;

use super::FenceValue;

/// Upload buffers keyed by the fence value that must complete before they
/// may be dropped.
///
/// Fence values handed to [`retain`](Self::retain) never decrease, so the
/// queue stays sorted and releasing is a pop from the front.
#[derive(Debug)]
pub struct UploadArena<U> {
  entries: VecDeque<(FenceValue, U)>,
}

impl<U> Default for UploadArena<U> {
  fn default() -> Self {
    Self {
      entries: VecDeque::new(),
    }
  }
}

impl<U> UploadArena<U> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn retain(&mut self, fence: FenceValue, upload: U) {
    debug_assert!(
      self.entries.back().is_none_or(|(last, _)| *last <= fence),
      "upload retained behind an older fence"
    );
    self.entries.push_back((fence, upload));
  }

  /// Drops every upload whose fence is `<= completed` and returns how many
  /// were released.
  pub fn release_completed(&mut self, completed: FenceValue) -> usize {
    let mut released = 0;
    while self
      .entries
      .front()
      .is_some_and(|(fence, _)| *fence <= completed)
    {
      self.entries.pop_front();
      released += 1;
    }
    if released > 0 {
      log::trace!("released {released} upload buffers up to fence {completed}");
    }
    released
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Fence value the newest retained upload waits for.
  pub fn newest_fence(&self) -> Option<FenceValue> {
    self.entries.back().map(|(fence, _)| *fence)
  }
}
