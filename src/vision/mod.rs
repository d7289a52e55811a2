//! Perception: frames, coordinate mapping, template matching and OCR.

pub mod coords;
pub mod frame;
pub mod gateway;
pub mod ocr;
pub mod template;
pub mod tesseract;

pub use coords::{CoordinateMapper, REFERENCE_HEIGHT, REFERENCE_WIDTH, ratio_of};
pub use frame::{Bgr, DetectionBox, Frame, Region, TextBox, color_distance, color_similar, is_white};
pub use gateway::{DetectionGateway, FrameSource, Matcher, Perception, TextReader};
pub use ocr::TesseractReader;
pub use template::{TemplateMatcher, TemplateSettings};
pub use tesseract::{TesseractPaths, ensure_tesseract};
