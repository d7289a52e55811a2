use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use image::imageops::FilterType;
use std::process::Command;
use tempfile::NamedTempFile;

use super::frame::{Frame, Region, TextBox};
use super::gateway::TextReader;
use super::tesseract::TesseractPaths;

/// Runs the Tesseract CLI over cropped frame regions.
pub struct TesseractReader {
    paths: TesseractPaths,
    language: String,
    /// Crops shorter than this are upscaled before recognition.
    min_height: u32,
}

impl TesseractReader {
    pub fn new(paths: TesseractPaths, language: impl Into<String>) -> Self {
        Self {
            paths,
            language: language.into(),
            min_height: 64,
        }
    }
}

impl TextReader for TesseractReader {
    fn read(&self, frame: &Frame, region: Region) -> Result<Vec<TextBox>> {
        let crop = frame.crop_rgb(region);
        let scale = if crop.height() > 0 && crop.height() < self.min_height {
            self.min_height as f32 / crop.height() as f32
        } else {
            1.0
        };
        let img = if scale > 1.0 {
            DynamicImage::ImageRgb8(crop).resize_exact(
                (region.width as f32 * scale) as u32,
                self.min_height,
                FilterType::CatmullRom,
            )
        } else {
            DynamicImage::ImageRgb8(crop)
        };

        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let output = Command::new(&self.paths.executable)
            .arg(temp_input.path())
            .arg(&output_base)
            .arg("--tessdata-dir")
            .arg(&self.paths.tessdata)
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg("6") // Assume single uniform block of text
            .arg("tsv")
            .output()
            .context("Failed to launch tesseract")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_lines(&tsv_content, region, scale))
    }
}

struct LineAccumulator {
    key: (i32, i32, i32),
    words: Vec<String>,
    conf_sum: f32,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl LineAccumulator {
    fn finish(self, region: Region, scale: f32) -> TextBox {
        let unscale = |v: i32| (v as f32 / scale) as i32;
        TextBox {
            bounds: Region::from_corners(
                region.x + unscale(self.left),
                region.y + unscale(self.top),
                region.x + unscale(self.right),
                region.y + unscale(self.bottom),
            ),
            confidence: self.conf_sum / self.words.len() as f32 / 100.0,
            text: self.words.join(" "),
        }
    }
}

/// Parses Tesseract TSV output into one TextBox per recognised line.
///
/// Word boxes are in crop pixels (after `scale`); they are mapped back into
/// frame coordinates relative to `region`.
fn parse_tsv_lines(tsv: &str, region: Region, scale: f32) -> Vec<TextBox> {
    let mut lines = Vec::new();
    let mut current: Option<LineAccumulator> = None;

    for line in tsv.lines().skip(1) {
        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let num = |i: usize| fields[i].trim().parse::<i32>().unwrap_or(-1);

        // Level 5 = word
        if num(0) != 5 {
            continue;
        }
        let text = fields[11].trim();
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (num(2), num(3), num(4));
        let (left, top, width, height) = (num(6), num(7), num(8), num(9));

        if current.as_ref().is_some_and(|c| c.key != key) {
            if let Some(done) = current.take() {
                lines.push(done.finish(region, scale));
            }
        }

        match current.as_mut() {
            Some(acc) => {
                acc.words.push(text.to_string());
                acc.conf_sum += conf;
                acc.left = acc.left.min(left);
                acc.top = acc.top.min(top);
                acc.right = acc.right.max(left + width);
                acc.bottom = acc.bottom.max(top + height);
            }
            None => {
                current = Some(LineAccumulator {
                    key,
                    words: vec![text.to_string()],
                    conf_sum: conf,
                    left,
                    top,
                    right: left + width,
                    bottom: top + height,
                });
            }
        }
    }

    if let Some(done) = current {
        lines.push(done.finish(region, scale));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_groups_words_into_lines() {
        let tsv = format!(
            "{HEADER}\n\
             4\t1\t1\t1\t1\t0\t0\t0\t100\t20\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t4\t30\t16\t90\t高级\n\
             5\t1\t1\t1\t1\t2\t44\t2\t30\t18\t80\t密码箱\n\
             5\t1\t1\t1\t2\t1\t10\t30\t20\t10\t70\t太极匣\n"
        );
        let lines = parse_tsv_lines(&tsv, Region::new(100, 200, 200, 60), 1.0);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "高级 密码箱");
        assert_eq!(lines[0].bounds, Region::new(110, 202, 64, 18));
        assert!((lines[0].confidence - 0.85).abs() < 1e-4);
        assert_eq!(lines[1].text, "太极匣");
    }

    #[test]
    fn test_parse_maps_back_through_scale() {
        let tsv = format!("{HEADER}\n5\t1\t1\t1\t1\t1\t20\t10\t40\t20\t95\tchest\n");
        let lines = parse_tsv_lines(&tsv, Region::new(50, 50, 100, 30), 2.0);
        assert_eq!(lines[0].bounds, Region::new(60, 55, 20, 10));
    }

    #[test]
    fn test_parse_skips_empty_and_malformed_rows() {
        let tsv = format!("{HEADER}\n5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t-1\t \nnot a row\n");
        assert!(parse_tsv_lines(&tsv, Region::new(0, 0, 10, 10), 1.0).is_empty());
    }
}
