// Software blur for brush stamps.
// Canvas shadow/filter blurs are gaussian; we approximate each gaussian with
// three successive box blurs, which is visually equivalent at stamp sizes.
use crate::error::{Error, Result};
use crate::types::Mask;

/// Separable box blur over an alpha mask. Pixels outside the mask count as 0,
/// so a stamp's falloff fades into its transparent margin instead of smearing
/// edge values.
pub fn box_blur_alpha(src: &Mask, tmp: &mut Mask, dst: &mut Mask, radius: usize) -> Result<()> {
    if src.width != dst.width || src.height != dst.height {
        return Err(Error::Configuration("box_blur: size mismatch src↔dst".into()));
    }
    if tmp.width != src.width || tmp.height != src.height {
        return Err(Error::Configuration("box_blur: size mismatch tmp".into()));
    }
    let w = src.width as isize;
    let h = src.height as isize;
    let r = radius as isize;
    let win = (2 * r + 1) as f64; // window width for averaging (constant everywhere)

    /* ---- Pass 1: horizontal (rows into tmp) ---- */
    for y in 0..h {
        let row = (y * w) as usize;
        let at = |x: isize| if x < 0 || x >= w { 0.0 } else { src.alpha[row + x as usize] as f64 };

        // Prime the window [-r..r] around x = 0
        let mut sum: f64 = (-r..=r).map(&at).sum();
        for x in 0..w {
            tmp.alpha[row + x as usize] = (sum / win) as f32;
            sum += at(x + r + 1) - at(x - r);
        }
    }

    /* ---- Pass 2: vertical (columns of tmp into dst) ---- */
    for x in 0..w {
        let at = |y: isize| if y < 0 || y >= h { 0.0 } else { tmp.alpha[(y * w + x) as usize] as f64 };

        let mut sum: f64 = (-r..=r).map(&at).sum();
        for y in 0..h {
            dst.alpha[(y * w + x) as usize] = (sum / win) as f32;
            sum += at(y + r + 1) - at(y - r);
        }
    }

    Ok(())
}

/// Box radii whose three-pass composition approximates a gaussian of `sigma`.
pub fn boxes_for_gauss(sigma: f32, passes: usize) -> Vec<usize> {
    let n = passes as f64;
    let s2 = (sigma as f64) * (sigma as f64);
    let w_ideal = (12.0 * s2 / n + 1.0).sqrt();
    let mut wl = w_ideal.floor() as i64;
    if wl % 2 == 0 {
        wl -= 1;
    }
    let wu = wl + 2;
    let wlf = wl as f64;
    let m_ideal = (12.0 * s2 - n * wlf * wlf - 4.0 * n * wlf - 3.0 * n) / (-4.0 * wlf - 4.0);
    let m = m_ideal.round() as i64;

    (0..passes as i64)
        .map(|i| {
            let size = if i < m { wl } else { wu };
            ((size - 1) / 2).max(0) as usize
        })
        .collect()
}

/// In-place gaussian-style blur of `mask` with standard deviation `sigma`.
pub fn gaussian_blur(mask: &mut Mask, sigma: f32) -> Result<()> {
    if sigma <= 0.0 || mask.alpha.is_empty() {
        return Ok(());
    }
    let mut tmp = Mask::new(mask.width, mask.height);
    let mut out = Mask::new(mask.width, mask.height);
    for radius in boxes_for_gauss(sigma, 3) {
        box_blur_alpha(mask, &mut tmp, &mut out, radius)?;
        std::mem::swap(mask, &mut out);
    }
    Ok(())
}
