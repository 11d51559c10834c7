mod font;

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

pub use font::{FontStack, DEFAULT_FONT_PATHS};
use font::Ink;

/// Extension of every generated cover.
pub const OUTPUT_EXT: &str = "jpg";
pub const HEADING: &str = "This is";
/// Second line of a genre banner.
pub const BANNER_SUFFIX: &str = "RADIO";

const LIGHT_THRESHOLD: f32 = 128.0;
const SAMPLE_GRID: u32 = 32;
const OUTLINE: [(f32, f32); 8] = [
    (-1.0, -1.0),
    (0.0, -1.0),
    (1.0, -1.0),
    (-1.0, 0.0),
    (1.0, 0.0),
    (-1.0, 1.0),
    (0.0, 1.0),
    (1.0, 1.0),
];

#[derive(Clone, Debug)]
pub struct CoverStyle {
    pub size: u32,
    pub quality: u8,
}

impl Default for CoverStyle {
    fn default() -> Self {
        Self {
            size: 640,
            quality: 92,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Light,
    Dark,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub text: Rgb<u8>,
    pub shadow: Rgb<u8>,
}

impl Palette {
    pub fn for_tone(tone: Tone) -> Self {
        match tone {
            Tone::Dark => Self {
                text: Rgb([255, 255, 255]),
                shadow: Rgb([0, 0, 0]),
            },
            Tone::Light => Self {
                text: Rgb([16, 16, 16]),
                shadow: Rgb([255, 255, 255]),
            },
        }
    }
}

#[derive(Debug)]
pub enum ArtworkError {
    Io(std::io::Error),
    Image(image::ImageError),
    NoFont,
}

impl std::fmt::Display for ArtworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtworkError::Io(err) => write!(f, "io error: {}", err),
            ArtworkError::Image(err) => write!(f, "image error: {}", err),
            ArtworkError::NoFont => write!(f, "no usable font found"),
        }
    }
}

impl std::error::Error for ArtworkError {}

impl From<std::io::Error> for ArtworkError {
    fn from(err: std::io::Error) -> Self {
        ArtworkError::Io(err)
    }
}

impl From<image::ImageError> for ArtworkError {
    fn from(err: image::ImageError) -> Self {
        ArtworkError::Image(err)
    }
}

/// Rec.601 luma averaged over an evenly spaced sample grid.
pub fn average_luminance(image: &RgbImage) -> f32 {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let step_x = (width / SAMPLE_GRID).max(1);
    let step_y = (height / SAMPLE_GRID).max(1);
    let mut total = 0.0f64;
    let mut samples = 0u64;
    let mut y = step_y / 2;
    while y < height {
        let mut x = step_x / 2;
        while x < width {
            let [r, g, b] = image.get_pixel(x, y).0;
            total += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            samples += 1;
            x += step_x;
        }
        y += step_y;
    }
    (total / samples.max(1) as f64) as f32
}

pub fn classify(image: &RgbImage) -> Tone {
    if average_luminance(image) < LIGHT_THRESHOLD {
        Tone::Dark
    } else {
        Tone::Light
    }
}

/// Largest scale not above `preferred` at which a line of `width_at_preferred` fits.
pub fn fit_scale(preferred: f32, width_at_preferred: f32, max_width: f32, floor: f32) -> f32 {
    if width_at_preferred <= max_width || width_at_preferred <= 0.0 {
        return preferred;
    }
    (preferred * max_width / width_at_preferred).max(floor)
}

/// Crops the source to a square and lays "This is" / artist name over the bottom-left corner.
pub fn compose(
    source: &DynamicImage,
    artist: &str,
    fonts: &FontStack,
    style: &CoverStyle,
) -> RgbImage {
    let size = style.size.max(64);
    let mut canvas = source
        .resize_to_fill(size, size, FilterType::Lanczos3)
        .to_rgb8();
    let palette = Palette::for_tone(classify(&canvas));

    let side = size as f32;
    let margin = (side * 0.06).round();
    let max_width = side - margin * 2.0;
    let shadow_offset = (side / 175.0).max(1.0);

    let heading = fonts.shape(HEADING);
    let heading_scale = side * 0.075;
    let name = fonts.shape(artist.trim());
    let preferred = side * 0.13;
    let name_scale = fit_scale(
        preferred,
        fonts.width(&name, preferred),
        max_width,
        side * 0.035,
    );

    let name_baseline = side - margin + fonts.descent(name_scale);
    let name_top = name_baseline - fonts.ascent(name_scale);
    let heading_baseline = name_top - side * 0.015 + fonts.descent(heading_scale);

    let shadow = Ink {
        color: palette.shadow,
        opacity: 0.7,
    };
    let text = Ink {
        color: palette.text,
        opacity: 1.0,
    };
    for (ink, offset) in [(shadow, shadow_offset), (text, 0.0)] {
        fonts.draw(
            &mut canvas,
            &heading,
            heading_scale,
            margin + offset,
            heading_baseline + offset,
            ink,
        );
        fonts.draw(
            &mut canvas,
            &name,
            name_scale,
            margin + offset,
            name_baseline + offset,
            ink,
        );
    }
    canvas
}

/// Centers the upper-cased genre over "RADIO" on a square crop of `background`, outlined for contrast.
pub fn compose_banner(
    background: &DynamicImage,
    genre: &str,
    fonts: &FontStack,
    style: &CoverStyle,
) -> RgbImage {
    let size = style.size.max(64);
    let mut canvas = background
        .resize_to_fill(size, size, FilterType::Lanczos3)
        .to_rgb8();
    let palette = Palette::for_tone(classify(&canvas));

    let side = size as f32;
    let max_width = side * 0.88;
    let preferred = side * 0.2;
    let outline = (side / 200.0).max(1.0);
    let gap = side * 0.03;

    let genre = genre.trim().to_uppercase();
    let lines: Vec<_> = [genre.as_str(), BANNER_SUFFIX]
        .into_iter()
        .map(|text| {
            let shaped = fonts.shape(text);
            let scale = fit_scale(
                preferred,
                fonts.width(&shaped, preferred),
                max_width,
                side * 0.05,
            );
            (shaped, scale)
        })
        .collect();
    let height: f32 = lines
        .iter()
        .map(|(_, scale)| fonts.ascent(*scale) - fonts.descent(*scale))
        .sum::<f32>()
        + gap;

    let edge = Ink {
        color: palette.shadow,
        opacity: 1.0,
    };
    let text = Ink {
        color: palette.text,
        opacity: 1.0,
    };
    let mut top = (side - height) / 2.0;
    for (shaped, scale) in &lines {
        let baseline = top + fonts.ascent(*scale);
        let x = (side - fonts.width(shaped, *scale)) / 2.0;
        for (dx, dy) in OUTLINE {
            fonts.draw(
                &mut canvas,
                shaped,
                *scale,
                x + dx * outline,
                baseline + dy * outline,
                edge,
            );
        }
        fonts.draw(&mut canvas, shaped, *scale, x, baseline, text);
        top = baseline - fonts.descent(*scale) + gap;
    }
    canvas
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ArtworkError> {
    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode_image(image)?;
    }
    Ok(out)
}

pub fn render_cover(
    source: &Path,
    artist: &str,
    fonts: &FontStack,
    style: &CoverStyle,
) -> Result<Vec<u8>, ArtworkError> {
    let image = image::open(source)?;
    let canvas = compose(&image, artist, fonts, style);
    encode_jpeg(&canvas, style.quality)
}

pub fn write_cover(
    source: &Path,
    artist: &str,
    fonts: &FontStack,
    style: &CoverStyle,
    dest: &Path,
) -> Result<(), ArtworkError> {
    let data = render_cover(source, artist, fonts, style)?;
    common::write_atomic(dest, &data)?;
    Ok(())
}

/// Renders a genre banner over `background` and writes it atomically to `dest`.
pub fn write_banner(
    background: &Path,
    genre: &str,
    fonts: &FontStack,
    style: &CoverStyle,
    dest: &Path,
) -> Result<(), ArtworkError> {
    let image = image::open(background)?;
    let canvas = compose_banner(&image, genre, fonts, style);
    common::write_atomic(dest, &encode_jpeg(&canvas, style.quality)?)?;
    Ok(())
}
