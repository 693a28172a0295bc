// Color ramp lookup table: density bucket -> RGB.
// Built once from the gradient stops; the color mapper only indexes it.

use image::{Rgb, RgbImage};

use crate::error::{Error, Result};
use crate::types::{Color, GradientStop};

/// At least one stop, every offset finite and within [0, 1].
pub fn check_stops(stops: &[GradientStop]) -> Result<()> {
    if stops.is_empty() {
        return Err(Error::Configuration("gradient needs at least one stop".into()));
    }
    if let Some(bad) = stops.iter().find(|s| !(0.0..=1.0).contains(&s.offset)) {
        return Err(Error::Configuration(format!(
            "gradient stop offset {} is outside [0, 1]",
            bad.offset
        )));
    }
    Ok(())
}

/// `len()` RGB triples, each channel normalized to [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    colors: Vec<[f32; 3]>,
}

impl Palette {
    /// Sample `stops` at `size` evenly spaced pixel centers, `t = (i + 0.5) / size`.
    ///
    /// Between stops colors interpolate linearly; before the first and after
    /// the last stop they extend flat. Samples are quantized to 8 bits per
    /// channel before normalizing, so the table matches what a 2D canvas
    /// gradient strip reads back.
    pub fn build(stops: &[GradientStop], size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Configuration("palette size must be positive".into()));
        }
        check_stops(stops)?;

        // Stable sort keeps insertion order for stops sharing an offset.
        let mut sorted = stops.to_vec();
        sorted.sort_by(|a, b| a.offset.total_cmp(&b.offset));

        let colors = (0..size)
            .map(|i| {
                let t = (i as f32 + 0.5) / size as f32;
                let [r, g, b] = sample(&sorted, t);
                [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
            })
            .collect();

        Ok(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> [f32; 3] {
        self.colors[index]
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    /// Debug strip: one pixel per bucket.
    pub fn to_image(&self) -> RgbImage {
        RgbImage::from_fn(self.colors.len() as u32, 1, |x, _| {
            let [r, g, b] = self.colors[x as usize];
            Rgb([to_u8(r), to_u8(g), to_u8(b)])
        })
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Sample sorted, non-empty stops at `t`.
fn sample(stops: &[GradientStop], t: f32) -> [u8; 3] {
    let first = &stops[0];
    let last = &stops[stops.len() - 1];
    if t <= first.offset {
        return channels(first.color);
    }
    if t >= last.offset {
        return channels(last.color);
    }

    for pair in stops.windows(2) {
        let (s0, s1) = (&pair[0], &pair[1]);
        if t >= s0.offset && t <= s1.offset {
            let range = s1.offset - s0.offset;
            if range <= f32::EPSILON {
                return channels(s1.color);
            }
            let local = (t - s0.offset) / range;
            return lerp(s0.color, s1.color, local);
        }
    }

    channels(last.color)
}

fn channels(c: Color) -> [u8; 3] {
    [c.r, c.g, c.b]
}

fn lerp(a: Color, b: Color, t: f32) -> [u8; 3] {
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round().clamp(0.0, 255.0) as u8;
    [mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::default_gradient;

    #[test]
    fn build_produces_exactly_size_entries() {
        let palette = Palette::build(&default_gradient(), 64).unwrap();
        assert_eq!(palette.len(), 64);
        for c in palette.colors() {
            assert!(c.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn build_is_bit_identical_across_calls() {
        let a = Palette::build(&default_gradient(), 64).unwrap();
        let b = Palette::build(&default_gradient(), 64).unwrap();
        let bits = |p: &Palette| {
            p.colors().iter().flat_map(|c| c.map(f32::to_bits)).collect::<Vec<_>>()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn extends_flat_beyond_end_stops() {
        let palette = Palette::build(&default_gradient(), 64).unwrap();
        // The first stop sits at 0.25: everything before it is pure blue.
        assert_eq!(palette.get(0), [0.0, 0.0, 1.0]);
        assert_eq!(palette.get(10), [0.0, 0.0, 1.0]);
        // Only the very last sample (t ≈ 0.992) still mixes with yellow.
        assert_eq!(palette.get(63)[0], 1.0);
        assert!(palette.get(63)[1] < 0.1);
    }

    #[test]
    fn interpolates_between_stops() {
        let stops = [
            GradientStop::new(0.0, Color::rgb(0, 0, 0)),
            GradientStop::new(1.0, Color::rgb(200, 100, 0)),
        ];
        let palette = Palette::build(&stops, 2).unwrap();
        // t = 0.25 and t = 0.75
        assert_eq!(palette.get(0), [50.0 / 255.0, 25.0 / 255.0, 0.0]);
        assert_eq!(palette.get(1), [150.0 / 255.0, 75.0 / 255.0, 0.0]);
    }

    #[test]
    fn unsorted_stops_are_ordered_by_offset() {
        let stops = [
            GradientStop::new(1.0, Color::rgb(255, 255, 255)),
            GradientStop::new(0.0, Color::rgb(0, 0, 0)),
        ];
        let palette = Palette::build(&stops, 4).unwrap();
        assert!(palette.get(0)[0] < palette.get(3)[0]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Palette::build(&default_gradient(), 0).is_err());
        assert!(Palette::build(&[], 16).is_err());
        let stops = [GradientStop::new(1.5, Color::rgb(1, 2, 3))];
        assert!(Palette::build(&stops, 16).is_err());
    }

    #[test]
    fn debug_strip_has_one_pixel_per_bucket() {
        let palette = Palette::build(&default_gradient(), 8).unwrap();
        let strip = palette.to_image();
        assert_eq!(strip.dimensions(), (8, 1));
        assert_eq!(strip.get_pixel(0, 0), &Rgb([0, 0, 255]));
    }
}
