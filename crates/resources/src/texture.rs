//! Floor texture images.

use std::path::Path;

use image::{Rgba, RgbaImage};

use crate::error::{ResourceError, ResourceResult};

/// Edge length of the generated grid cell.
pub const GRID_CELL_SIZE: u32 = 256;

/// Line width of the generated grid cell border, in texels.
pub const GRID_LINE_WIDTH: u32 = 6;

const CELL_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const CELL_LINE: Rgba<u8> = Rgba([70, 70, 70, 255]);

/// One grid cell: white fill with a dark border.
///
/// Tiled with a repeating sampler this draws a grid with lines
/// `2 * GRID_LINE_WIDTH` texels wide.
pub fn grid_cell_image() -> RgbaImage {
    let size = GRID_CELL_SIZE;
    RgbaImage::from_fn(size, size, |x, y| {
        let on_border = x < GRID_LINE_WIDTH
            || y < GRID_LINE_WIDTH
            || x >= size - GRID_LINE_WIDTH
            || y >= size - GRID_LINE_WIDTH;
        if on_border { CELL_LINE } else { CELL_FILL }
    })
}

/// Load an image file as RGBA8.
pub fn load_image(path: &Path) -> ResourceResult<RgbaImage> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }
    let image = image::open(path)?.into_rgba8();
    tracing::info!(
        "Loaded texture {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}
