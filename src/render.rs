//! Frame composition and PPM output.
//!
//! Converts a retired time bin plus the run-level residue map and
//! non-routable mask into an RGB pixel grid, then writes it as a
//! binary PPM (P6) frame.
//!
//! Layering, per cell:
//! 1. residue gray for cells with history but no current activity
//! 2. otherwise the intensity gradient
//! 3. a dim blue tint over non-routable space, never on top of residue
//!
//! The gradient starts at 50% brightness so a single probe is plainly
//! visible against black; hue then carries volume from white through
//! yellow to red.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::Result;
use crate::timebin::TimeBin;

/// Height in pixels of the optional timestamp strip.
pub const TIMESTAMP_STRIP_HEIGHT: u32 = 30;

const TIMESTAMP_MARGIN: u32 = 10;
const FONT_WIDTH: u32 = 5;
const FONT_SCALE: u32 = 2;

/// Glyphs for '0'-'9', space, ':', '-'. One byte per row, bit 7 is the
/// leftmost column.
const FONT_5X7: [[u8; 7]; 13] = [
    [0x7C, 0xC6, 0xCE, 0xD6, 0xE6, 0xC6, 0x7C], // 0
    [0x18, 0x38, 0x18, 0x18, 0x18, 0x18, 0x7E], // 1
    [0x7C, 0xC6, 0x06, 0x0C, 0x30, 0x60, 0xFE], // 2
    [0x7C, 0xC6, 0x06, 0x3C, 0x06, 0xC6, 0x7C], // 3
    [0x0C, 0x1C, 0x3C, 0x6C, 0xCC, 0xFE, 0x0C], // 4
    [0xFE, 0xC0, 0xFC, 0x06, 0x06, 0xC6, 0x7C], // 5
    [0x38, 0x60, 0xC0, 0xFC, 0xC6, 0xC6, 0x7C], // 6
    [0xFE, 0xC6, 0x0C, 0x18, 0x30, 0x30, 0x30], // 7
    [0x7C, 0xC6, 0xC6, 0x7C, 0xC6, 0xC6, 0x7C], // 8
    [0x7C, 0xC6, 0xC6, 0x7E, 0x06, 0x0C, 0x78], // 9
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // space
    [0x00, 0x18, 0x18, 0x00, 0x18, 0x18, 0x00], // :
    [0x00, 0x00, 0x00, 0x7E, 0x00, 0x00, 0x00], // -
];

/// An 8-bit RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Black, the background everywhere outside the curve.
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Dark gray marking cells with historical but no current activity.
    pub const RESIDUE: Rgb = Rgb { r: 54, g: 54, b: 54 };

    /// Dim blue baseline for quiet non-routable space.
    pub const NONROUTABLE: Rgb = Rgb { r: 0, g: 0, b: 30 };
}

/// Map a cell intensity to the white-yellow-red gradient.
///
/// Zero intensity is black. Any activity starts at 50% brightness so
/// it reads against the background; from there the hue runs white to
/// yellow (blue channel drains) and yellow to red (green drains) as
/// the cell approaches the bin's peak.
pub fn gradient(intensity: u32, max_intensity: u32) -> Rgb {
    if intensity == 0 {
        return Rgb::BLACK;
    }

    let normalized = f64::from(intensity) / f64::from(max_intensity.max(1));
    let enhanced = (0.5 + 0.5 * normalized).clamp(0.5, 1.0);
    let t = (enhanced - 0.5) / 0.5;

    if t < 0.5 {
        Rgb {
            r: 255,
            g: 255,
            b: (255.0 * (1.0 - 2.0 * t)) as u8,
        }
    } else {
        Rgb {
            r: 255,
            g: (255.0 * (2.0 - 2.0 * t)) as u8,
            b: 0,
        }
    }
}

/// Renders retired bins into RGB frames and writes PPM files.
pub struct FrameRenderer {
    width: u32,
    height: u32,
    show_timestamp: bool,
}

impl FrameRenderer {
    /// Create a renderer for the given output size.
    pub fn new(width: u32, height: u32, show_timestamp: bool) -> Self {
        Self {
            width,
            height,
            show_timestamp,
        }
    }

    /// Heatmap area width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Full frame height: the heatmap area plus the timestamp strip
    /// when enabled.
    pub fn frame_height(&self) -> u32 {
        if self.show_timestamp {
            self.height + TIMESTAMP_STRIP_HEIGHT
        } else {
            self.height
        }
    }

    /// Compose one frame into a row-major RGB buffer.
    ///
    /// The n x n grid is scaled into the largest centered square that
    /// fits; everything outside it is black. `residue` and `mask` are
    /// row-major grids parallel to the bin's heatmap.
    pub fn compose(&self, bin: &TimeBin, residue: &[u32], mask: &[u8]) -> Vec<u8> {
        let width = self.width;
        let height = self.height;
        let frame_height = self.frame_height();
        let dimension = bin.dimension();

        let mut pixels = vec![0u8; (frame_height * width * 3) as usize];

        let scale = f64::from(width.min(height)) / f64::from(dimension);
        let span = (f64::from(dimension) * scale) as u32;
        let offset_x = (width - span) / 2;
        let offset_y = (height - span) / 2;

        for py in 0..height {
            for px in 0..width {
                let inside = px >= offset_x
                    && px < offset_x + span
                    && py >= offset_y
                    && py < offset_y + span;
                if !inside {
                    continue;
                }

                let src_x = (f64::from(px - offset_x) / scale) as u32;
                let src_y = (f64::from(py - offset_y) / scale) as u32;
                if src_x >= dimension || src_y >= dimension {
                    continue;
                }

                let idx = (src_y * dimension + src_x) as usize;
                let intensity = bin.heatmap()[idx];

                let mut residue_shown = false;
                let mut color = if intensity == 0 && residue[idx] > 0 {
                    residue_shown = true;
                    Rgb::RESIDUE
                } else {
                    gradient(intensity, bin.max_intensity())
                };

                if mask[idx] != 0 && !residue_shown {
                    color = if intensity == 0 {
                        Rgb::NONROUTABLE
                    } else {
                        // 60% of the activity color over 40% of the tint.
                        Rgb {
                            r: (f64::from(color.r) * 0.6) as u8,
                            g: (f64::from(color.g) * 0.6) as u8,
                            b: (f64::from(color.b) * 0.6 + f64::from(Rgb::NONROUTABLE.b) * 0.4)
                                as u8,
                        }
                    };
                }

                let offset = ((py * width + px) * 3) as usize;
                pixels[offset] = color.r;
                pixels[offset + 1] = color.g;
                pixels[offset + 2] = color.b;
            }
        }

        if self.show_timestamp {
            draw_timestamp(&mut pixels, width, frame_height, bin.bin_start());
        }

        pixels
    }

    /// Compose a frame and write it to `path` as PPM.
    pub fn render_to_file(
        &self,
        path: &Path,
        bin: &TimeBin,
        residue: &[u32],
        mask: &[u8],
    ) -> Result<()> {
        let pixels = self.compose(bin, residue, mask);
        write_ppm(path, self.width, self.frame_height(), &pixels)
    }
}

/// Write a binary PPM (P6) image: ASCII header, then raw interleaved
/// RGB bytes in row-major order.
pub fn write_ppm(path: &Path, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    write!(out, "P6\n{} {}\n255\n", width, height)?;
    out.write_all(pixels)?;
    out.flush()?;
    Ok(())
}

/// Frame path: `<dir>/<prefix>_<YYYYMMDD_HHMMSS>_<NNNN>.ppm`, with the
/// bin start rendered in local time.
pub fn frame_filename(dir: &Path, prefix: &str, bin_start: i64, sequence: u32) -> PathBuf {
    let stamp = local_time(bin_start).format("%Y%m%d_%H%M%S");
    dir.join(format!("{}_{}_{:04}.ppm", prefix, stamp, sequence))
}

fn local_time(timestamp: i64) -> DateTime<Local> {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .with_timezone(&Local)
}

fn font_index(c: char) -> usize {
    match c {
        '0'..='9' => (c as usize) - ('0' as usize),
        ':' => 11,
        '-' => 12,
        _ => 10,
    }
}

fn draw_char(pixels: &mut [u8], width: u32, height: u32, x: u32, y: u32, c: char, color: Rgb) {
    let glyph = &FONT_5X7[font_index(c)];

    for (cy, row) in glyph.iter().enumerate() {
        for cx in 0..8u32 {
            if row & (1 << (7 - cx)) == 0 {
                continue;
            }
            for sy in 0..FONT_SCALE {
                for sx in 0..FONT_SCALE {
                    let px = x + cx * FONT_SCALE + sx;
                    let py = y + cy as u32 * FONT_SCALE + sy;
                    if px < width && py < height {
                        let offset = ((py * width + px) * 3) as usize;
                        pixels[offset] = color.r;
                        pixels[offset + 1] = color.g;
                        pixels[offset + 2] = color.b;
                    }
                }
            }
        }
    }
}

/// Render `YYYY-MM-DD HH:MM:SS` in white at the bottom left of the
/// timestamp strip.
fn draw_timestamp(pixels: &mut [u8], width: u32, height: u32, timestamp: i64) {
    let text = local_time(timestamp).format("%Y-%m-%d %H:%M:%S").to_string();
    let char_spacing = (FONT_WIDTH + 2) * FONT_SCALE;
    let white = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    let mut x = TIMESTAMP_MARGIN;
    let y = height - TIMESTAMP_STRIP_HEIGHT + 5;

    for c in text.chars() {
        if x + char_spacing >= width {
            break;
        }
        draw_char(pixels, width, height, x, y, c, white);
        x += char_spacing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::HilbertOrder;
    use crate::timebin::TimeBinManager;

    const DIM: u32 = 16;

    /// A retired 16x16 bin with a single event at (1, 1). The event
    /// timestamp sits after the bin start so the decay echo of the
    /// event itself is skipped and cell values stay exact.
    fn single_event_bin() -> TimeBin {
        let mut mgr = TimeBinManager::new(60, HilbertOrder::new(4).unwrap(), 3_600).unwrap();
        mgr.process(61, 1, 1).unwrap();
        mgr.finish().unwrap()
    }

    fn empty_grid_u32() -> Vec<u32> {
        vec![0u32; (DIM * DIM) as usize]
    }

    fn empty_grid_u8() -> Vec<u8> {
        vec![0u8; (DIM * DIM) as usize]
    }

    fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> Rgb {
        let offset = ((y * width + x) * 3) as usize;
        Rgb {
            r: pixels[offset],
            g: pixels[offset + 1],
            b: pixels[offset + 2],
        }
    }

    #[test]
    fn test_gradient_boundaries() {
        assert_eq!(gradient(0, 1000), Rgb::BLACK);
        assert_eq!(gradient(1000, 1000), Rgb { r: 255, g: 0, b: 0 });

        // Midpoint sits on the yellow hinge: full red, full green.
        let mid = gradient(500, 1000);
        assert_eq!(mid.r, 255);
        assert_eq!(mid.g, 255);
        assert_eq!(mid.b, 0);
    }

    #[test]
    fn test_gradient_single_hit_is_bright() {
        // One probe against a peak of 1000 still renders near white.
        let c = gradient(1, 1000);
        assert_eq!(c.r, 255);
        assert_eq!(c.g, 255);
        assert!(c.b > 250);
    }

    #[test]
    fn test_gradient_zero_peak_does_not_divide_by_zero() {
        let c = gradient(1, 0);
        assert_eq!(c, Rgb { r: 255, g: 0, b: 0 });
    }

    #[test]
    fn test_compose_active_cell_and_black_border() {
        let bin = single_event_bin();
        let renderer = FrameRenderer::new(64, 32, false);
        let pixels = renderer.compose(&bin, &empty_grid_u32(), &empty_grid_u8());

        // 32x32 square centered in 64x32: columns 0..16 stay black.
        assert_eq!(pixel(&pixels, 64, 0, 0), Rgb::BLACK);
        assert_eq!(pixel(&pixels, 64, 63, 31), Rgb::BLACK);

        // Cell (1,1) at scale 2 with offset 16 lands at pixel (18, 2).
        // Sole event means intensity == max, which is pure red.
        assert_eq!(pixel(&pixels, 64, 18, 2), Rgb { r: 255, g: 0, b: 0 });

        // A quiet in-square cell is black.
        assert_eq!(pixel(&pixels, 64, 30, 30), Rgb::BLACK);
    }

    #[test]
    fn test_compose_residue_wins_over_gradient_and_overlay() {
        let bin = single_event_bin();
        let mut residue = empty_grid_u32();
        let mut mask = empty_grid_u8();

        // Quiet cell (5,5) with history and a mask bit: residue gray
        // wins over the non-routable tint.
        let idx = (5 * DIM + 5) as usize;
        residue[idx] = 5;
        mask[idx] = 1;

        let renderer = FrameRenderer::new(32, 32, false);
        let pixels = renderer.compose(&bin, &residue, &mask);
        assert_eq!(pixel(&pixels, 32, 10, 10), Rgb::RESIDUE);
    }

    #[test]
    fn test_compose_nonroutable_baseline_and_blend() {
        let bin = single_event_bin();
        let mut mask = empty_grid_u8();

        // Quiet masked cell renders the dim blue baseline.
        mask[(5 * DIM + 5) as usize] = 1;
        // Active masked cell (the event at (1,1)) blends 60/40.
        mask[(1 * DIM + 1) as usize] = 1;

        let renderer = FrameRenderer::new(32, 32, false);
        let pixels = renderer.compose(&bin, &empty_grid_u32(), &mask);

        assert_eq!(pixel(&pixels, 32, 10, 10), Rgb::NONROUTABLE);
        // gradient is (255,0,0); blended: (153, 0, 12)
        assert_eq!(pixel(&pixels, 32, 2, 2), Rgb { r: 153, g: 0, b: 12 });
    }

    #[test]
    fn test_timestamp_strip_extends_frame() {
        let renderer = FrameRenderer::new(32, 32, true);
        assert_eq!(renderer.frame_height(), 32 + TIMESTAMP_STRIP_HEIGHT);

        let bin = single_event_bin();
        let pixels = renderer.compose(&bin, &empty_grid_u32(), &empty_grid_u8());
        assert_eq!(pixels.len(), (62 * 32 * 3) as usize);

        // Some strip pixels are white text.
        let strip = &pixels[(32 * 32 * 3) as usize..];
        assert!(strip.iter().any(|&v| v == 255));
    }

    #[test]
    fn test_write_ppm_header_and_payload() {
        let dir = std::env::temp_dir().join("tplot_render_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.ppm");

        let pixels = vec![7u8; 2 * 2 * 3];
        write_ppm(&path, 2, 2, &pixels).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"P6\n2 2\n255\n"));
        assert_eq!(bytes.len(), b"P6\n2 2\n255\n".len() + 12);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_frame_filename_format() {
        let path = frame_filename(Path::new("plots"), "frame", 1_700_000_040, 7);
        let name = path.file_name().unwrap().to_str().unwrap();

        let stamp = local_time(1_700_000_040).format("%Y%m%d_%H%M%S").to_string();
        assert_eq!(name, format!("frame_{}_0007.ppm", stamp));
        assert_eq!(path.parent().unwrap(), Path::new("plots"));
    }

    #[test]
    fn test_font_index_fallback() {
        assert_eq!(font_index('3'), 3);
        assert_eq!(font_index(':'), 11);
        assert_eq!(font_index('-'), 12);
        assert_eq!(font_index('Z'), 10);
    }
}
