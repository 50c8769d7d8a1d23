use anyhow::{bail, format_err, Error};
use plotters::coord::Shift;
use plotters::prelude::*;

/// Points per inch of typographic sizes
const POINTS_PER_INCH: f64 = 72.0;
/// Inches per meter, for the PNG physical pixel size
const INCHES_PER_METER: f64 = 39.370_078_740_157_48;
/// Family every figure draws its text in
const FONT_FAMILY: &str = "sans-serif";
/// DejaVu Sans, shipped with the crate so that text renders without system fonts
const FONT_DATA: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");

/// Convert any plotters failure into an `anyhow` error.
pub(crate) fn draw_err<E: std::fmt::Display>(e: E) -> Error {
    format_err!("drawing failed: {}", e)
}

/// Make the bundled font available under the family name used by [`Canvas::font`]. Axis and
/// legend labels fall back to the same family.
fn register_font() -> Result<(), Error> {
    plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, FONT_DATA)
        .map_err(|e| format_err!("cannot load the bundled font: {:?}", e))
}

/// Padded range covering `values`
pub(crate) fn span(values: impl Iterator<Item = f64>, floor_zero: bool) -> (f64, f64) {
    let (mut lo, mut hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if floor_zero {
        lo = lo.min(0.0);
    }
    if hi - lo < 1e-12 {
        lo -= 0.5;
        hi += 0.5;
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// Physical size and resolution of a figure, used to convert typographic sizes to pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Canvas {
    /// Width in inches
    pub width_in: f64,
    /// Height in inches
    pub height_in: f64,
    /// Pixels per inch
    pub dpi: u32,
}

impl Canvas {
    /// Canvas of the given size in inches
    pub fn new(width_in: f64, height_in: f64, dpi: u32) -> Canvas {
        Canvas {
            width_in,
            height_in,
            dpi,
        }
    }

    /// Pixel dimensions
    pub fn pixels(&self) -> (u32, u32) {
        let w = (self.width_in * self.dpi as f64).round().max(1.0) as u32;
        let h = (self.height_in * self.dpi as f64).round().max(1.0) as u32;
        (w, h)
    }

    /// Pixels spanned by a length given in points
    pub fn pt(&self, points: f64) -> u32 {
        (points * self.dpi as f64 / POINTS_PER_INCH).round().max(1.0) as u32
    }

    /// Font of the given point size
    pub fn font(&self, points: f64) -> FontDesc<'static> {
        (FONT_FAMILY, self.pt(points) as f64).into_font()
    }

    /// Render into a white RGB buffer with `draw` and return the finished figure.
    pub fn render<F>(&self, draw: F) -> Result<Figure, Error>
    where
        F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> Result<(), Error>,
    {
        register_font()?;
        let (width, height) = self.pixels();
        let mut pixels = vec![255u8; width as usize * height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
            root.fill(&WHITE).map_err(draw_err)?;
            draw(&root)?;
            root.present().map_err(draw_err)?;
        }
        Ok(Figure { width, height, pixels })
    }
}

/// A rendered RGB raster image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Figure {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major RGB bytes
    pub pixels: Vec<u8>,
}

impl Figure {
    /// Encode as an 8-bit RGB PNG whose physical pixel size records `dpi`.
    pub fn to_png(&self, dpi: u32) -> Result<Vec<u8>, Error> {
        if self.pixels.len() != self.width as usize * self.height as usize * 3 {
            bail!(
                "figure buffer holds {} bytes, expected {}x{} RGB pixels",
                self.pixels.len(),
                self.width,
                self.height
            );
        }
        let ppm = (dpi as f64 * INCHES_PER_METER).round() as u32;

        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: png::Unit::Meter,
            }));
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&self.pixels)?;
            writer.finish()?;
        }
        Ok(out)
    }
}

/// A figure made of several panels, with the layout of its panels.
#[derive(Clone, Debug)]
pub struct PlotGrid {
    /// The composed figure
    pub figure: Figure,
    /// Panel names in drawing order
    pub panels: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_canvas_pixels() {
        let c = Canvas::new(6.4, 4.8, 300);
        assert_eq!(c.pixels(), (1920, 1440));
        assert_eq!(c.pt(12.0), 50);
        assert_eq!(Canvas::new(1.0, 1.0, 72).pt(10.0), 10);
    }

    #[test]
    fn test_png_records_dpi() {
        let fig = Figure {
            width: 2,
            height: 1,
            pixels: vec![255, 0, 0, 0, 0, 255],
        };
        let bytes = fig.to_png(300).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoder = png::Decoder::new(bytes.as_slice());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!((info.width, info.height), (2, 1));
        let dims = info.pixel_dims.unwrap();
        assert_eq!(dims.unit, png::Unit::Meter);
        // 300 dots per inch
        assert_eq!(dims.xppu, 11811);
        assert_eq!(dims.yppu, 11811);
    }

    #[test]
    fn test_bad_buffer_rejected() {
        let fig = Figure {
            width: 2,
            height: 2,
            pixels: vec![0; 3],
        };
        assert!(fig.to_png(300).is_err());
    }

    #[test]
    fn test_span() {
        assert_eq!(span(vec![].into_iter(), false), (0.0, 1.0));
        let (lo, hi) = span(vec![1.0, 3.0].into_iter(), true);
        assert!(lo < 0.0 && hi > 3.0);
        let (lo, hi) = span(vec![2.0].into_iter(), false);
        assert!(lo < 2.0 && hi > 2.0);
    }

    #[test]
    fn test_render_blank() {
        let fig = Canvas::new(0.1, 0.1, 100).render(|_| Ok(())).unwrap();
        assert_eq!((fig.width, fig.height), (10, 10));
        assert!(fig.pixels.iter().all(|&p| p == 255));
    }

    #[test]
    fn test_render_text_with_bundled_font() {
        let canvas = Canvas::new(1.0, 0.5, 100);
        let fig = canvas
            .render(|root| {
                root.draw(&Text::new("CD3E", (5, 5), canvas.font(12.0)))
                    .map_err(draw_err)
            })
            .unwrap();
        assert!(fig.pixels.iter().any(|&p| p < 128));
    }
}
