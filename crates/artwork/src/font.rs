use std::fs;
use std::path::Path;

use ab_glyph::{point, Font, FontVec, GlyphId, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use tracing::debug;

use crate::ArtworkError;

/// Bold faces first, then wide-coverage families for non-Latin names.
pub const DEFAULT_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Bold.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Bold.ttc",
    "/usr/share/fonts/truetype/noto/NotoSansArabic-Bold.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansHebrew-Bold.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansDevanagari-Bold.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansThai-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
    "C:\\Windows\\Fonts\\seguisb.ttf",
];

/// Ordered fonts; each character is drawn with the first font that has a glyph for it.
pub struct FontStack {
    fonts: Vec<FontVec>,
}

impl FontStack {
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ArtworkError> {
        let mut fonts = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let data = match fs::read(path) {
                Ok(data) => data,
                Err(_) => continue,
            };
            match FontVec::try_from_vec(data) {
                Ok(font) => {
                    debug!("Loaded font {:?}", path);
                    fonts.push(font);
                }
                Err(err) => debug!("Skipping font {:?}: {}", path, err),
            }
        }
        Self::from_fonts(fonts)
    }

    pub fn from_fonts(fonts: Vec<FontVec>) -> Result<Self, ArtworkError> {
        if fonts.is_empty() {
            return Err(ArtworkError::NoFont);
        }
        Ok(Self { fonts })
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    fn pick(&self, ch: char) -> (usize, GlyphId) {
        for (idx, font) in self.fonts.iter().enumerate() {
            let id = font.glyph_id(ch);
            if id.0 != 0 {
                return (idx, id);
            }
        }
        (0, self.fonts[0].glyph_id(ch))
    }

    pub(crate) fn shape(&self, text: &str) -> ShapedLine {
        let glyphs = text
            .chars()
            .filter(|ch| !ch.is_control())
            .map(|ch| self.pick(ch))
            .collect();
        ShapedLine { glyphs }
    }

    pub(crate) fn ascent(&self, scale: f32) -> f32 {
        self.fonts[0].as_scaled(PxScale::from(scale)).ascent()
    }

    pub(crate) fn descent(&self, scale: f32) -> f32 {
        self.fonts[0].as_scaled(PxScale::from(scale)).descent()
    }

    pub(crate) fn width(&self, line: &ShapedLine, scale: f32) -> f32 {
        let px = PxScale::from(scale);
        let mut width = 0.0;
        let mut prev: Option<(usize, GlyphId)> = None;
        for (font_idx, id) in &line.glyphs {
            let scaled = self.fonts[*font_idx].as_scaled(px);
            if let Some((prev_font, prev_id)) = prev {
                if prev_font == *font_idx {
                    width += scaled.kern(prev_id, *id);
                }
            }
            width += scaled.h_advance(*id);
            prev = Some((*font_idx, *id));
        }
        width
    }

    /// Alpha-blends the line onto `canvas` with its baseline starting at (x, baseline).
    pub(crate) fn draw(
        &self,
        canvas: &mut RgbImage,
        line: &ShapedLine,
        scale: f32,
        x: f32,
        baseline: f32,
        ink: Ink,
    ) {
        let px = PxScale::from(scale);
        let (width, height) = canvas.dimensions();
        let mut cursor = x;
        let mut prev: Option<(usize, GlyphId)> = None;
        for (font_idx, id) in &line.glyphs {
            let font = &self.fonts[*font_idx];
            let scaled = font.as_scaled(px);
            if let Some((prev_font, prev_id)) = prev {
                if prev_font == *font_idx {
                    cursor += scaled.kern(prev_id, *id);
                }
            }
            let glyph = id.with_scale_and_position(px, point(cursor, baseline));
            if let Some(outlined) = font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, coverage| {
                    let px_x = bounds.min.x as i64 + gx as i64;
                    let px_y = bounds.min.y as i64 + gy as i64;
                    if px_x < 0 || px_y < 0 || px_x >= width as i64 || px_y >= height as i64 {
                        return;
                    }
                    let alpha = (coverage * ink.opacity).clamp(0.0, 1.0);
                    let pixel = canvas.get_pixel_mut(px_x as u32, px_y as u32);
                    for channel in 0..3 {
                        let base = pixel.0[channel] as f32;
                        let over = ink.color.0[channel] as f32;
                        pixel.0[channel] = (base + (over - base) * alpha).round() as u8;
                    }
                });
            }
            cursor += scaled.h_advance(*id);
            prev = Some((*font_idx, *id));
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Ink {
    pub color: Rgb<u8>,
    pub opacity: f32,
}

pub(crate) struct ShapedLine {
    glyphs: Vec<(usize, GlyphId)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stack_is_an_error() {
        let missing = ["/nonexistent/font-a.ttf", "/nonexistent/font-b.ttf"];
        assert!(matches!(FontStack::load(&missing), Err(ArtworkError::NoFont)));
        assert!(matches!(
            FontStack::from_fonts(Vec::new()),
            Err(ArtworkError::NoFont)
        ));
    }

    #[test]
    fn invalid_font_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        fs::write(&bogus, b"not a font").unwrap();
        assert!(matches!(FontStack::load(&[bogus]), Err(ArtworkError::NoFont)));
    }
}
