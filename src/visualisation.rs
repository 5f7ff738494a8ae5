// src/visualisation.rs

use std::path::Path;

use plotters::prelude::*;

use crate::grid::{Grid3D, X, Y};

/// Map a value to a blue–white–red colour, symmetric about zero so the sign
/// of off-diagonal components is visible.
fn value_to_color(v: f64, max_abs: f64) -> RGBColor {
    let scale = if max_abs.is_finite() && max_abs > 0.0 {
        max_abs
    } else {
        1.0
    };
    let x = (0.5 + 0.5 * v / scale).clamp(0.0, 1.0);

    // x=0 -> blue, x=0.5 -> white, x=1 -> red
    let r = (255.0 * (2.0 * x).min(1.0)) as u8;
    let b = (255.0 * (2.0 * (1.0 - x)).min(1.0)) as u8;
    let g = (255.0 * (1.0 - 2.0 * (x - 0.5).abs())).clamp(0.0, 255.0) as u8;

    RGBColor(r, g, b)
}

/// Reorder an index so the zero displacement sits in the middle of the plot.
#[inline]
fn centred(i: usize, n: usize) -> usize {
    (i + n / 2) % n
}

/// Save one z-plane of a kernel component as a PNG heatmap.
/// The zero displacement is drawn at the centre of the image.
pub fn save_kernel_slice_plot(
    grid: &Grid3D,
    z: usize,
    filename: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let nx = grid.size[X];
    let ny = grid.size[Y];

    // The self term dwarfs everything else; scale on the rest of the plane.
    let mut max_abs = 0.0f64;
    for y in 0..ny {
        for x in 0..nx {
            if x == 0 && y == 0 {
                continue;
            }
            let v = grid.get(z, y, x) as f64;
            if v.is_finite() {
                max_abs = max_abs.max(v.abs());
            }
        }
    }

    let px = 8 * nx.max(1) as u32;
    let py = 8 * ny.max(1) as u32;
    let side = px.max(py).clamp(256, 1024);
    let root = BitMapBackend::new(filename, (side, side)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0..nx as i32, 0..ny as i32)?;

    chart.draw_series((0..nx).flat_map(|x| {
        (0..ny).map(move |y| {
            let v = grid.get(z, y, x) as f64;
            let color = value_to_color(v, max_abs);
            let cx = centred(x, nx) as i32;
            let cy = centred(y, ny) as i32;
            Rectangle::new([(cx, cy), (cx + 1, cy + 1)], color.filled())
        })
    }))?;

    root.present()?;
    Ok(())
}
