//! Template matching over captured frames.
//!
//! Each detection label maps to one reference PNG authored at the reference
//! resolution. Templates are rescaled to the frame's resolution, then matched
//! with normalized cross-correlation on grayscale images.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::template_matching::{MatchTemplateMethod, match_template};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::coords::{REFERENCE_HEIGHT, REFERENCE_WIDTH};
use super::frame::{DetectionBox, Frame, Region};
use super::gateway::{Matcher, rank};

/// Templates smaller than this after scaling are skipped.
const MIN_TEMPLATE_SIDE: u32 = 4;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    /// Resolution the template PNGs were cut from.
    pub reference_width: u32,
    pub reference_height: u32,
    /// Integer downscale applied to frame and template before matching.
    pub downscale: u32,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            reference_width: REFERENCE_WIDTH,
            reference_height: REFERENCE_HEIGHT,
            downscale: 2,
        }
    }
}

pub struct TemplateMatcher {
    templates: HashMap<String, GrayImage>,
    settings: TemplateSettings,
}

impl TemplateMatcher {
    pub fn new(templates: HashMap<String, GrayImage>, settings: TemplateSettings) -> Self {
        Self {
            templates,
            settings,
        }
    }

    /// Loads every `<label>.png` in `dir`.
    pub fn load_dir(dir: &Path, settings: TemplateSettings) -> Result<Self> {
        let mut templates = HashMap::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read template dir {}", dir.display()))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let Some(label) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match image::open(&path) {
                Ok(img) => {
                    tracing::debug!(label, path = %path.display(), "loaded template");
                    templates.insert(label.to_string(), img.to_luma8());
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to decode template");
                }
            }
        }

        tracing::info!(count = templates.len(), dir = %dir.display(), "templates loaded");
        Ok(Self::new(templates, settings))
    }

    /// Resizes a reference template to the frame resolution, then applies
    /// the downscale factor.
    fn prepare_template(&self, template: &GrayImage, frame: &Frame) -> GrayImage {
        let factor = self.settings.downscale.max(1);
        let sx = frame.width() as f64 / self.settings.reference_width.max(1) as f64;
        let sy = frame.height() as f64 / self.settings.reference_height.max(1) as f64;
        let w = ((template.width() as f64 * sx) as u32 / factor).max(1);
        let h = ((template.height() as f64 * sy) as u32 / factor).max(1);
        if (w, h) == template.dimensions() {
            return template.clone();
        }
        DynamicImage::ImageLuma8(template.clone())
            .resize_exact(w, h, FilterType::Triangle)
            .to_luma8()
    }

    fn prepare_haystack(&self, frame: &Frame, region: Region) -> GrayImage {
        let factor = self.settings.downscale.max(1);
        let crop = DynamicImage::ImageRgb8(frame.crop_rgb(region)).to_luma8();
        if factor == 1 {
            return crop;
        }
        let w = (crop.width() / factor).max(1);
        let h = (crop.height() / factor).max(1);
        DynamicImage::ImageLuma8(crop)
            .resize_exact(w, h, FilterType::Triangle)
            .to_luma8()
    }
}

impl Matcher for TemplateMatcher {
    fn find(
        &self,
        frame: &Frame,
        labels: &[&str],
        region: Region,
        threshold: f32,
    ) -> Result<Vec<DetectionBox>> {
        let factor = self.settings.downscale.max(1);
        let haystack = self.prepare_haystack(frame, region);
        let mut boxes = Vec::new();

        for label in labels {
            let Some(reference) = self.templates.get(*label) else {
                tracing::warn!(label, "no template for label");
                continue;
            };
            let template = self.prepare_template(reference, frame);
            if template.width() < MIN_TEMPLATE_SIDE || template.height() < MIN_TEMPLATE_SIDE {
                tracing::debug!(label, "template too small after scaling, skipping");
                continue;
            }
            if template.width() > haystack.width() || template.height() > haystack.height() {
                continue;
            }

            let hits = find_peaks(&haystack, &template, threshold);
            tracing::trace!(label, hits = hits.len(), "template matched");
            boxes.extend(hits.into_iter().map(|(x, y, score)| {
                DetectionBox::new(
                    *label,
                    region.x + (x * factor) as i32,
                    region.y + (y * factor) as i32,
                    template.width() * factor,
                    template.height() * factor,
                    score,
                )
            }));
        }

        rank(&mut boxes);
        Ok(boxes)
    }
}

/// Positions (upper-left, haystack pixels) scoring at least `threshold`,
/// with overlapping hits collapsed onto the best one.
fn find_peaks(haystack: &GrayImage, template: &GrayImage, threshold: f32) -> Vec<(u32, u32, f32)> {
    let scores = match_template(
        haystack,
        template,
        MatchTemplateMethod::CrossCorrelationNormalized,
    );

    let mut raw = Vec::new();
    for (x, y, px) in scores.enumerate_pixels() {
        let score = px.0[0];
        if score.is_finite() && score >= threshold {
            raw.push((x, y, score.min(1.0)));
        }
    }
    raw.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let min_dx = (template.width() / 2).max(1);
    let min_dy = (template.height() / 2).max(1);
    let mut kept: Vec<(u32, u32, f32)> = Vec::new();
    for hit in raw {
        let overlaps = kept
            .iter()
            .any(|k| hit.0.abs_diff(k.0) < min_dx && hit.1.abs_diff(k.1) < min_dy);
        if !overlaps {
            kept.push(hit);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage};

    fn textured(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let v = ((x * 7 + y * 13 + (x * y) % 17) % 251) as u8;
            Rgb([v, v.wrapping_mul(3), v.wrapping_add(40)])
        })
    }

    fn matcher_for(frame: &Frame, label: &str, region: Region) -> TemplateMatcher {
        let gray = DynamicImage::ImageRgb8(frame.to_rgb_image()).to_luma8();
        let template = image::imageops::crop_imm(
            &gray,
            region.x as u32,
            region.y as u32,
            region.width,
            region.height,
        )
        .to_image();
        let mut templates = HashMap::new();
        templates.insert(label.to_string(), template);
        TemplateMatcher::new(
            templates,
            TemplateSettings {
                reference_width: frame.width(),
                reference_height: frame.height(),
                downscale: 1,
            },
        )
    }

    #[test]
    fn test_finds_template_at_source_location() {
        let frame = Frame::from_rgb_image(&textured(120, 80));
        let matcher = matcher_for(&frame, "chest1", Region::new(40, 30, 16, 12));

        let boxes = matcher
            .find(&frame, &["chest1"], frame.bounds(), 0.99)
            .unwrap();

        assert!(!boxes.is_empty());
        let best = &boxes[0];
        assert_eq!((best.x, best.y), (40, 30));
        assert_eq!((best.width, best.height), (16, 12));
        assert_eq!(best.label, "chest1");
    }

    #[test]
    fn test_region_offsets_results() {
        let frame = Frame::from_rgb_image(&textured(120, 80));
        let matcher = matcher_for(&frame, "gotoboss", Region::new(60, 40, 16, 12));

        let boxes = matcher
            .find(&frame, &["gotoboss"], Region::new(50, 30, 50, 40), 0.99)
            .unwrap();

        assert_eq!((boxes[0].x, boxes[0].y), (60, 40));
    }

    #[test]
    fn test_unknown_label_yields_nothing() {
        let frame = Frame::from_rgb_image(&textured(60, 40));
        let matcher = TemplateMatcher::new(HashMap::new(), TemplateSettings::default());
        let boxes = matcher.find(&frame, &["missing"], frame.bounds(), 0.5).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_find_peaks_collapses_neighbours() {
        let img = textured(60, 40);
        let gray = DynamicImage::ImageRgb8(img).to_luma8();
        let template = image::imageops::crop_imm(&gray, 10, 10, 12, 10).to_image();
        let peaks = find_peaks(&gray, &template, 0.999);
        assert_eq!(peaks.len(), 1);
        assert_eq!((peaks[0].0, peaks[0].1), (10, 10));
    }
}
