use serde::{Deserialize, Serialize};

/// Binary occupancy grid for one segmented object.
///
/// Stored row-major, `len = width * height`. Any non-zero byte counts as
/// occupied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

/// Inclusive axis-aligned pixel bounds `[x0, x1] × [y0, y1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl PixelBounds {
    #[inline]
    pub fn width(&self) -> usize {
        self.x1 - self.x0 + 1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.y1 - self.y0 + 1
    }

    /// Grow the bounds to include `(x, y)`.
    #[inline]
    pub fn include(&mut self, x: usize, y: usize) {
        self.x0 = self.x0.min(x);
        self.y0 = self.y0.min(y);
        self.x1 = self.x1.max(x);
        self.y1 = self.y1.max(y);
    }
}

impl Mask {
    /// All-empty mask of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Wrap a raw row-major buffer. Returns `None` on a length mismatch.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        (width.checked_mul(height)? == data.len()).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Build a mask from rows of values; rows shorter than the first one are
    /// padded with empty pixels.
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R]) -> Self {
        let height = rows.len();
        let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut mask = Self::new(width, height);
        for (y, row) in rows.iter().enumerate() {
            for (x, &v) in row.as_ref().iter().take(width).enumerate() {
                mask.data[y * width + x] = v;
            }
        }
        mask
    }

    /// Mask with the filled rectangle `[x, x + w) × [y, y + h)` set.
    ///
    /// The rectangle is clipped to the mask extent.
    pub fn with_rect(width: usize, height: usize, x: usize, y: usize, w: usize, h: usize) -> Self {
        let mut mask = Self::new(width, height);
        mask.fill_rect(x, y, w, h);
        mask
    }

    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize) {
        let x1 = (x + w).min(self.width);
        let y1 = (y + h).min(self.height);
        for yy in y.min(y1)..y1 {
            for xx in x.min(x1)..x1 {
                if let Some(v) = self.data.get_mut(yy * self.width + xx) {
                    *v = 255;
                }
            }
        }
    }

    /// Whether `data` holds exactly `width * height` samples. Masks from
    /// external collaborators are not guaranteed to.
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.width.checked_mul(self.height) == Some(self.data.len())
    }

    /// Pixels outside the grid or the buffer read as empty.
    #[inline]
    pub fn is_set(&self, x: usize, y: usize) -> bool {
        x < self.width
            && y < self.height
            && self.data.get(y * self.width + x).is_some_and(|&v| v != 0)
    }

    /// Signed lookup; anything outside the grid is empty.
    #[inline]
    pub fn is_set_i(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && self.is_set(x as usize, y as usize)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x < self.width && y < self.height {
            if let Some(v) = self.data.get_mut(y * self.width + x) {
                *v = if on { 255 } else { 0 };
            }
        }
    }

    /// Number of occupied pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Bounds of all occupied pixels, `None` for an empty mask.
    pub fn bounds(&self) -> Option<PixelBounds> {
        let mut out: Option<PixelBounds> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.is_set(x, y) {
                    continue;
                }
                match out.as_mut() {
                    Some(b) => b.include(x, y),
                    None => {
                        out = Some(PixelBounds {
                            x0: x,
                            y0: y,
                            x1: x,
                            y1: y,
                        })
                    }
                }
            }
        }
        out
    }

    /// Occupied-pixel count of every column (`len = width`).
    pub fn column_sums(&self) -> Vec<u32> {
        let mut sums = vec![0u32; self.width];
        for row in self.data.chunks_exact(self.width.max(1)) {
            for (s, &v) in sums.iter_mut().zip(row) {
                if v != 0 {
                    *s += 1;
                }
            }
        }
        sums
    }
}
