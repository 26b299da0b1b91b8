//! Debug bitmap output: binary PPM for congestion maps and binary PGM for
//! density maps.
//!
//! Bitmaps are stored row-major, `width * height` pixels, row 0 at the
//! bottom of the image data.

use anyhow::Result;
use std::io::Write;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Linear blend from `self` to `other`; `t` is clamped to [0, 1].
    pub fn interpolate(&self, other: &Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

#[derive(Clone, Debug, Default)]
pub struct Bitmap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<Rgb>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![Rgb::default(); width * height],
        }
    }

    pub fn at(&self, x: usize, y: usize) -> Rgb {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, pixel: Rgb) {
        self.data[y * self.width + x] = pixel;
    }
}

/// Write a binary PPM (P6).
pub fn write_ppm(w: &mut impl Write, bitmap: &Bitmap) -> Result<()> {
    writeln!(w, "P6 {} {} 255", bitmap.width, bitmap.height)?;
    for y in 0..bitmap.height {
        for x in 0..bitmap.width {
            let pixel = bitmap.at(x, y);
            w.write_all(&[pixel.r, pixel.g, pixel.b])?;
        }
    }
    Ok(())
}

/// Write a density map as a binary PGM (P5) with a logarithmic grey
/// scale: 10% utilization maps to 0, 100% to 100, 1000% to 200.
pub fn write_density_pgm(
    w: &mut impl Write,
    width: usize,
    height: usize,
    densities: &[f64],
) -> Result<()> {
    anyhow::ensure!(
        densities.len() == width * height,
        "density map is {} entries, expected {}x{}",
        densities.len(),
        width,
        height
    );

    writeln!(w, "P5 {} {} 255", width, height)?;
    for y in 0..height {
        for x in 0..width {
            let density = densities[y * width + x];
            let value = if density > 0.0 {
                (100.0 * density.log10() + 100.0).clamp(0.0, 255.0) as u8
            } else {
                0
            };
            w.write_all(&[value])?;
        }
    }
    Ok(())
}
