//! RGBA8 texture data decoded on the CPU.

use std::{borrow::Cow, path::Path};

use crate::error::{RendererError, RendererResult};

/// Decoded RGBA8 pixels, `stride` bytes per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
  pub width:  u32,
  pub height: u32,
  pub stride: u32,
  pub pixels: Vec<u8>,
}

impl DecodedImage {
  pub const BYTES_PER_PIXEL: u32 = 4;

  pub fn open(path: impl AsRef<Path>) -> RendererResult<Self> {
    let path = path.as_ref();
    let decoded = image::open(path)
      .map_err(|e| RendererError::TextureDecode {
        path:   path.to_path_buf(),
        reason: e.to_string(),
      })?
      .to_rgba8();

    let (width, height) = decoded.dimensions();
    log::info!("decoded texture {} ({width}x{height})", path.display());
    Ok(Self {
      width,
      height,
      stride: width * Self::BYTES_PER_PIXEL,
      pixels: decoded.into_raw(),
    })
  }

  /// A single opaque white pixel, bound when no texture is available.
  pub fn white() -> Self {
    Self {
      width:  1,
      height: 1,
      stride: Self::BYTES_PER_PIXEL,
      pixels: vec![255; 4],
    }
  }

  pub fn row_bytes(&self) -> usize {
    (self.width * Self::BYTES_PER_PIXEL) as usize
  }

  /// Checks that the dimensions are non-zero and that every row lies inside
  /// `pixels`. [`tight_pixels`](Self::tight_pixels) relies on this.
  pub fn check_layout(&self) -> Result<(), String> {
    if self.width == 0 || self.height == 0 {
      return Err(format!("image is {}x{}", self.width, self.height));
    }
    let row = self.row_bytes();
    let stride = self.stride as usize;
    if stride < row {
      return Err(format!("stride {stride} is shorter than a {row} byte row"));
    }
    let required = stride * (self.height as usize - 1) + row;
    if self.pixels.len() < required {
      return Err(format!(
        "{} bytes of pixels, {required} needed for {} rows",
        self.pixels.len(),
        self.height
      ));
    }
    Ok(())
  }

  /// Pixels without row padding, as a texture copy expects them. The layout
  /// must pass [`check_layout`](Self::check_layout).
  pub fn tight_pixels(&self) -> Cow<'_, [u8]> {
    let row = self.row_bytes();
    let stride = self.stride as usize;
    if stride == row {
      return Cow::Borrowed(&self.pixels[..row * self.height as usize]);
    }

    let mut packed = Vec::with_capacity(row * self.height as usize);
    for y in 0..self.height as usize {
      let start = y * stride;
      packed.extend_from_slice(&self.pixels[start..start + row]);
    }
    Cow::Owned(packed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tight_rows_are_borrowed() {
    let image = DecodedImage {
      width:  2,
      height: 1,
      stride: 8,
      pixels: (0..8).collect(),
    };
    assert!(matches!(image.tight_pixels(), Cow::Borrowed(_)));
  }

  #[test]
  fn padded_rows_are_repacked() {
    let image = DecodedImage {
      width:  1,
      height: 3,
      stride: 12,
      pixels: (0..36).collect(),
    };
    assert_eq!(
      image.tight_pixels().as_ref(),
      &[0, 1, 2, 3, 12, 13, 14, 15, 24, 25, 26, 27]
    );
  }

  #[test]
  fn missing_file_is_a_decode_error() {
    let err = DecodedImage::open("no/such/texture.png").unwrap_err();
    assert!(matches!(err, RendererError::TextureDecode { .. }));
    assert!(!err.is_fatal());
  }

  #[test]
  fn short_stride_or_buffer_fails_layout_check() {
    let short_stride = DecodedImage {
      width:  2,
      height: 2,
      stride: 4,
      pixels: vec![0; 8],
    };
    assert!(short_stride.check_layout().unwrap_err().contains("stride"));

    let short_buffer = DecodedImage {
      width:  2,
      height: 2,
      stride: 12,
      pixels: vec![0; 16],
    };
    assert!(short_buffer.check_layout().unwrap_err().contains("needed"));

    // The last row does not need its padding.
    let unpadded_tail = DecodedImage {
      width:  1,
      height: 2,
      stride: 8,
      pixels: vec![0; 12],
    };
    assert!(unpadded_tail.check_layout().is_ok());
    assert_eq!(unpadded_tail.tight_pixels().len(), 8);
  }

  #[test]
  fn white_is_one_opaque_pixel() {
    assert!(DecodedImage::white().check_layout().is_ok());
    let white = DecodedImage::white();
    assert_eq!(white.tight_pixels().as_ref(), &[255, 255, 255, 255]);
  }
}
