//! Coordinate conversion utilities.
//!
//! Game UI positions are authored against a 1920x1080 client area. These
//! helpers map them onto whatever resolution the current frame has.

use super::frame::{Frame, Region};

/// Resolution the UI landmarks were measured at.
pub const REFERENCE_WIDTH: u32 = 1920;
pub const REFERENCE_HEIGHT: u32 = 1080;

/// Maps reference-resolution coordinates onto the observed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinateMapper {
    current: Option<(u32, u32)>,
}

impl CoordinateMapper {
    pub fn new(current: Option<(u32, u32)>) -> Self {
        Self { current }
    }

    pub fn for_frame(frame: Option<&Frame>) -> Self {
        Self::new(frame.map(Frame::dimensions))
    }

    /// Scales a reference point, truncating toward zero.
    ///
    /// Without a known frame size the input is returned unchanged; callers
    /// bounds-check against the real frame before reading pixels.
    pub fn scale(&self, ref_x: i32, ref_y: i32) -> (i32, i32) {
        match self.current {
            Some((width, height)) => (
                (ref_x as i64 * width as i64 / REFERENCE_WIDTH as i64) as i32,
                (ref_y as i64 * height as i64 / REFERENCE_HEIGHT as i64) as i32,
            ),
            None => (ref_x, ref_y),
        }
    }

    /// Scales the rectangle spanning two reference corners.
    pub fn scale_region(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Region {
        let (sx1, sy1) = self.scale(x1, y1);
        let (sx2, sy2) = self.scale(x2, y2);
        Region::from_corners(sx1, sy1, sx2, sy2)
    }
}

/// `extent * part / whole` in integer arithmetic, truncated.
pub fn ratio_of(extent: u32, part: u32, whole: u32) -> i32 {
    if whole == 0 {
        return 0;
    }
    (extent as u64 * part as u64 / whole as u64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_at_reference_resolution() {
        let mapper = CoordinateMapper::new(Some((1920, 1080)));
        assert_eq!(mapper.scale(1900, 320), (1900, 320));
        assert_eq!(mapper.scale(0, 0), (0, 0));
        assert_eq!(mapper.scale(1919, 1079), (1919, 1079));
    }

    #[test]
    fn test_half_resolution() {
        let mapper = CoordinateMapper::new(Some((960, 540)));
        assert_eq!(mapper.scale(1900, 320), (950, 160));
    }

    #[test]
    fn test_truncates_non_integral_results() {
        let mapper = CoordinateMapper::new(Some((1280, 720)));
        // 22 * 1280 / 1920 = 14.67, 63 * 720 / 1080 = 42
        assert_eq!(mapper.scale(22, 63), (14, 42));
    }

    #[test]
    fn test_no_frame_is_passthrough() {
        let mapper = CoordinateMapper::for_frame(None);
        assert_eq!(mapper.scale(1900, 320), (1900, 320));
    }

    #[test]
    fn test_scale_region() {
        let mapper = CoordinateMapper::new(Some((960, 540)));
        let region = mapper.scale_region(1110, 520, 1280, 575);
        assert_eq!(region, Region::new(555, 260, 85, 27));
    }

    #[test]
    fn test_ratio_of() {
        assert_eq!(ratio_of(1000, 450, 1920), 234);
        assert_eq!(ratio_of(1000, 1470, 1920), 765);
        assert_eq!(ratio_of(1080, 800, 1080), 800);
        assert_eq!(ratio_of(1000, 5, 100), 50);
        assert_eq!(ratio_of(1000, 5, 0), 0);
    }
}
