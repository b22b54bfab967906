//! Page rasterization, using poppler's `pdftocairo` CLI tool.
//!
//! Scanned permit pages are frequently faded, so every rendered bitmap gets a
//! linear contrast stretch before recognition sees it.

use clap::{Args, ValueEnum};
use image::DynamicImage;

use crate::{
    command::run_command,
    document::Document,
    prelude::*,
};

/// Contrast-stretch factor applied to every channel of a rendered page.
const CONTRAST_FACTOR: f32 = 1.4;

/// Options controlling page rasterization.
#[derive(Args, Clone, Debug)]
pub struct RasterOptions {
    /// The resolution scale to render at, as a multiple of 72 DPI. Single
    /// characters must stay legible to the recognition engine, so this
    /// defaults high.
    #[clap(long, default_value = "4")]
    pub scale: u32,

    /// Rotation to apply to every rendered page, for batches scanned
    /// sideways or upside down.
    #[clap(long, value_enum, default_value = "none")]
    pub rotation: Rotation,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 4,
            rotation: Rotation::None,
        }
    }
}

/// Rotation applied after rendering.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

/// A crop rectangle, as fractions of the page size. The origin is the top
/// left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A rasterized page (or page region), decoded and contrast-adjusted.
///
/// The pixel buffer is owned solely by the extraction step that requested it
/// and is reclaimed when this value drops. The backing PNG lives in the
/// document's scratch directory and reflects the adjusted pixels, so the
/// recognition engine can be pointed straight at it.
pub struct PageBitmap {
    /// The decoded, contrast-adjusted image.
    pub image: DynamicImage,

    /// The PNG file holding the adjusted image.
    pub png_path: PathBuf,
}

/// Render one full page of `doc` at `opts.scale`.
#[instrument(level = "debug", skip(doc, opts), fields(path = %doc.path().display()))]
pub async fn render_page(
    doc: &Document,
    page: u32,
    opts: &RasterOptions,
) -> Result<PageBitmap> {
    doc.check_page(page)?;
    let out_base = doc.scratch_dir().join(format!("page-{page:05}"));
    let mut cmd = base_render_command(doc, page, opts.scale);
    cmd.arg(doc.path()).arg(&out_base);
    run_command("pdftocairo", &mut cmd).await?;
    finish_bitmap(out_base.with_extension("png"), opts.rotation).await
}

/// Render only a sub-rectangle of one page, without rendering the whole page
/// first. Used by extractor fallbacks that re-recognize a small area at high
/// resolution.
#[instrument(level = "debug", skip(doc), fields(path = %doc.path().display()))]
pub async fn render_crop(
    doc: &Document,
    page: u32,
    rect: CropRect,
    scale: u32,
) -> Result<PageBitmap> {
    doc.check_page(page)?;
    let size = doc.page_size(page).await?;
    let dpi = (scale * 72) as f32;

    // pdftocairo takes the crop window in device pixels at the requested
    // resolution.
    let to_px = |pts: f32| (pts * dpi / 72.0).round() as u32;
    let x = to_px(size.width * rect.x);
    let y = to_px(size.height * rect.y);
    let width = to_px(size.width * rect.width).max(1);
    let height = to_px(size.height * rect.height).max(1);

    let out_base = doc.scratch_dir().join(format!("crop-{page:05}"));
    let mut cmd = base_render_command(doc, page, scale);
    cmd.arg("-x")
        .arg(x.to_string())
        .arg("-y")
        .arg(y.to_string())
        .arg("-W")
        .arg(width.to_string())
        .arg("-H")
        .arg(height.to_string());
    cmd.arg(doc.path()).arg(&out_base);
    run_command("pdftocairo", &mut cmd).await?;
    finish_bitmap(out_base.with_extension("png"), Rotation::None).await
}

/// Build the `pdftocairo` invocation shared by full-page and crop renders.
fn base_render_command(doc: &Document, page: u32, scale: u32) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("pdftocairo");
    cmd.arg("-png")
        .arg("-r")
        .arg((scale * 72).to_string())
        .arg("-f")
        .arg(page.to_string())
        .arg("-l")
        .arg(page.to_string())
        .arg("-singlefile");
    cmd
}

/// Decode a rendered PNG, stretch its contrast, apply any rotation, and
/// write the adjusted pixels back so external tools see them too.
async fn finish_bitmap(png_path: PathBuf, rotation: Rotation) -> Result<PageBitmap> {
    let worker_path = png_path.clone();
    let image = tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
        let image = image::open(&worker_path)
            .with_context(|| format!("failed to decode {:?}", worker_path.display()))?;
        let image = stretch_contrast(image, CONTRAST_FACTOR);
        let image = match rotation {
            Rotation::None => image,
            Rotation::Deg90 => image.rotate90(),
            Rotation::Deg180 => image.rotate180(),
            Rotation::Deg270 => image.rotate270(),
        };
        image
            .save(&worker_path)
            .with_context(|| format!("failed to rewrite {:?}", worker_path.display()))?;
        Ok(image)
    })
    .await
    .context("image worker panicked")??;

    debug!(
        width = image.width(),
        height = image.height(),
        path = %png_path.display(),
        "bitmap ready"
    );
    Ok(PageBitmap { image, png_path })
}

/// Apply a linear contrast stretch about the channel midpoint.
fn stretch_contrast(image: DynamicImage, factor: f32) -> DynamicImage {
    let mut rgb = image.into_rgb8();
    for pixel in rgb.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let stretched = (f32::from(*channel) - 127.5) * factor + 127.5;
            *channel = stretched.clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contrast_stretch_pushes_channels_apart() {
        let mut img = image::RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([100, 100, 100]));
        img.put_pixel(1, 0, image::Rgb([160, 160, 160]));
        let stretched = stretch_contrast(DynamicImage::ImageRgb8(img), CONTRAST_FACTOR);
        let rgb = stretched.to_rgb8();
        // Dark pixels get darker, light pixels get lighter.
        assert!(rgb.get_pixel(0, 0).0[0] < 100);
        assert!(rgb.get_pixel(1, 0).0[0] > 160);
    }

    #[test]
    fn contrast_stretch_clamps_to_valid_range() {
        let mut img = image::RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([0, 5, 10]));
        img.put_pixel(1, 0, image::Rgb([255, 250, 245]));
        let stretched = stretch_contrast(DynamicImage::ImageRgb8(img), CONTRAST_FACTOR);
        let rgb = stretched.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0[0], 0);
        assert_eq!(rgb.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn midpoint_is_a_fixed_point_of_the_stretch() {
        let mut img = image::RgbImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgb([127, 128, 128]));
        let stretched = stretch_contrast(DynamicImage::ImageRgb8(img), CONTRAST_FACTOR);
        let rgb = stretched.to_rgb8();
        let px = rgb.get_pixel(0, 0).0;
        assert!(px[1] >= 127 && px[1] <= 128);
        assert!(px[2] >= 127 && px[2] <= 128);
    }
}
