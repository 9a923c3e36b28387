/// Borrowed view of a decoded raster handed to the segmentation and
/// detection collaborators.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub width: usize,
    pub height: usize,
    /// Interleaved samples per pixel (1 = gray, 3 = RGB, 4 = RGBA).
    pub channels: usize,
    pub data: &'a [u8], // row-major, len = w*h*channels
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame dimensions (width={width}, height={height}, channels={channels})")]
    InvalidDimensions {
        width: usize,
        height: usize,
        channels: usize,
    },
    #[error("invalid frame buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },
}

impl<'a> FrameView<'a> {
    /// Build a view and check that the buffer matches the dimensions.
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        data: &'a [u8],
    ) -> Result<Self, FrameError> {
        let view = Self {
            width,
            height,
            channels,
            data,
        };
        view.validate()?;
        Ok(view)
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        let dims = FrameError::InvalidDimensions {
            width: self.width,
            height: self.height,
            channels: self.channels,
        };
        if self.width == 0 || self.height == 0 || self.channels == 0 {
            return Err(dims);
        }
        let expected = self
            .width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.channels))
            .ok_or(dims)?;
        if self.data.len() != expected {
            return Err(FrameError::InvalidBuffer {
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }
}
