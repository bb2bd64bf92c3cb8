//! Extends a local image and writes the canvas and mask, without calling any API.
//!
//! Run with: `cargo run --example extend_canvas -- <image.png> [16:9|9:16]`

use widefill::{extend_with_mask, AspectRatio, CanvasOptions};

fn main() -> widefill::Result<()> {
    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .expect("Usage: extend_canvas <image.png> [16:9|9:16]");
    let ratio: AspectRatio = args.next().as_deref().unwrap_or("16:9").parse()?;

    let image = image::open(&input)?.to_rgb8();
    let (extended, mask) = extend_with_mask(&image, ratio, &CanvasOptions::default())?;

    extended.canvas.save("canvas.png")?;
    mask.save("mask.png")?;
    println!(
        "Wrote canvas.png and mask.png ({}x{}, original at {:?})",
        extended.canvas.width(),
        extended.canvas.height(),
        (extended.placement.x, extended.placement.y)
    );

    Ok(())
}
