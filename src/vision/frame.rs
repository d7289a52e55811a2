//! Frame and detection value types.

use image::{ImageBuffer, Rgb, RgbImage};

/// A BGR colour triple, in the same channel order the capture device uses.
pub type Bgr = [u8; 3];

/// Immutable snapshot of the game view with three 8-bit channels in BGR order.
#[derive(Clone, Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Builds a frame from tightly packed BGR bytes.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Builds a frame from a BGRA buffer with the given row pitch,
    /// dropping the alpha channel.
    pub fn from_bgra(width: u32, height: u32, row_pitch: usize, src: &[u8]) -> Option<Self> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height as usize {
            let row = src.get(y * row_pitch..y * row_pitch + width as usize * 4)?;
            for px in row.chunks_exact(4) {
                data.extend_from_slice(&px[..3]);
            }
        }
        Self::from_bgr(width, height, data)
    }

    pub fn from_rgb_image(img: &RgbImage) -> Self {
        let mut data = Vec::with_capacity(img.as_raw().len());
        for px in img.pixels() {
            data.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        Self {
            width: img.width(),
            height: img.height(),
            data,
        }
    }

    /// A frame filled with a single colour.
    pub fn filled(width: u32, height: u32, color: Bgr) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Full-frame region.
    pub fn bounds(&self) -> Region {
        Region::new(0, 0, self.width, self.height)
    }

    /// BGR value at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Bgr> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Bgr) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.data[offset..offset + 3].copy_from_slice(&color);
    }

    /// Crops `region` (clamped to the frame) into an RGB image.
    pub fn crop_rgb(&self, region: Region) -> RgbImage {
        let r = region.clamp_to(self.width, self.height);
        ImageBuffer::from_fn(r.width, r.height, |x, y| {
            let offset =
                ((r.y as u32 + y) as usize * self.width as usize + (r.x as u32 + x) as usize) * 3;
            Rgb([
                self.data[offset + 2],
                self.data[offset + 1],
                self.data[offset],
            ])
        })
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        self.crop_rgb(self.bounds())
    }
}

/// Axis-aligned rectangle in frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region spanning two corner points.
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: x1.abs_diff(x2),
            height: y1.abs_diff(y2),
        }
    }

    /// Intersects the region with a `width`×`height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Region {
        let x0 = self.x.clamp(0, width as i32);
        let y0 = self.y.clamp(0, height as i32);
        let x1 = (self.x + self.width as i32).clamp(x0, width as i32);
        let y1 = (self.y + self.height as i32).clamp(y0, height as i32);
        Region::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One perception hit.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Match score in [0, 1].
    pub confidence: f32,
    /// What matched (template label).
    pub label: String,
}

impl DetectionBox {
    pub fn new(
        label: impl Into<String>,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        confidence: f32,
    ) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            label: label.into(),
        }
    }

    /// Upper-left plus half extents, truncated.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn region(&self) -> Region {
        Region::new(self.x, self.y, self.width, self.height)
    }

    /// Manhattan distance between this box's center and `point`.
    pub fn manhattan_to(&self, point: (i32, i32)) -> u32 {
        let (cx, cy) = self.center();
        cx.abs_diff(point.0) + cy.abs_diff(point.1)
    }
}

/// OCR hit: a recognised line of text and where it sits in the frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBox {
    pub bounds: Region,
    pub confidence: f32,
    pub text: String,
}

/// Sum of absolute channel differences.
pub fn color_distance(a: Bgr, b: Bgr) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| x.abs_diff(*y) as u32).sum()
}

pub fn color_similar(a: Bgr, b: Bgr, tolerance: u32) -> bool {
    color_distance(a, b) < tolerance
}

/// All channels in 245..=255.
pub fn is_white(color: Bgr) -> bool {
    color.iter().all(|c| *c >= 245)
}
