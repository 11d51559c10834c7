use std::env;
use std::path::PathBuf;

use artwork::{CoverStyle, FontStack, DEFAULT_FONT_PATHS};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let usage = "usage: render_cover <source image> <artist> [dest.jpg]";
    let source = PathBuf::from(args.next().ok_or(usage)?);
    let artist = args.next().ok_or(usage)?;
    let dest = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("{}.{}", artist, artwork::OUTPUT_EXT)));

    let font_paths: Vec<PathBuf> = match env::var("FONT_PATH") {
        Ok(value) if !value.trim().is_empty() => env::split_paths(&value).collect(),
        _ => DEFAULT_FONT_PATHS.iter().map(PathBuf::from).collect(),
    };
    let fonts = FontStack::load(&font_paths)?;
    let mut style = CoverStyle::default();
    if let Ok(size) = env::var("COVER_SIZE") {
        style.size = size.parse()?;
    }

    artwork::write_cover(&source, &artist, &fonts, &style, &dest)?;
    info!("Wrote {} ({} px)", dest.display(), style.size);
    Ok(())
}
