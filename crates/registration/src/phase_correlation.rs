//! Phase correlation for translation estimation.
//!
//! Both images are mean-subtracted, Hann-windowed and zero-padded so each
//! axis has a power-of-two length (the axes are padded independently). The
//! normalized cross-power spectrum `conj(R) * C / |conj(R) * C|` transforms
//! back into a surface whose peak sits at the displacement of the candidate
//! relative to the reference.
//!
//! Sub-pixel refinement runs on a second surface computed from the same
//! spectrum under a Gaussian low-pass. That surface has a near-Gaussian
//! peak, so a parabola through the logarithms of the peak and its two
//! neighbors lands on the true vertex. The raw surface's sinc-shaped peak
//! pulls a plain parabola toward the nearest integer.

use std::sync::Arc;

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::luminance::LumaImage;

/// Samples around the main peak excluded from the sidelobe search.
const PEAK_EXCLUSION_RADIUS: isize = 3;

/// Peak-to-sidelobe ratio that maps to full confidence.
const FULL_CONFIDENCE_RATIO: f64 = 10.0;

/// Spectra below this magnitude carry no phase information.
const MAGNITUDE_EPSILON: f32 = 1e-10;

/// Standard deviation of the refinement low-pass, in cycles per sample.
const REFINEMENT_SIGMA: f64 = 0.25;

/// Forward spectrum of one prepared image.
#[derive(Debug, Clone)]
pub struct Spectrum {
    width: usize,
    height: usize,
    data: Vec<Complex<f32>>,
}

/// Location and quality of the correlation peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    /// Displacement of the candidate relative to the reference, in analysis pixels.
    pub dx: f64,
    pub dy: f64,
    /// Height of the correlation peak, `1.0` for a perfect match.
    pub peak_value: f64,
    /// Peak-to-sidelobe ratio mapped into `[0, 1]`.
    pub confidence: f64,
}

/// Phase correlator for images of one fixed analysis size.
pub struct PhaseCorrelator {
    image_width: usize,
    image_height: usize,
    fft_width: usize,
    fft_height: usize,
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
    window_x: Vec<f32>,
    window_y: Vec<f32>,
    lowpass_x: Vec<f32>,
    lowpass_y: Vec<f32>,
}

impl PhaseCorrelator {
    /// Plan transforms for `width x height` analysis images.
    pub fn new(width: usize, height: usize) -> Self {
        let fft_width = width.max(2).next_power_of_two();
        let fft_height = height.max(2).next_power_of_two();

        let mut planner = FftPlanner::new();
        Self {
            image_width: width,
            image_height: height,
            fft_width,
            fft_height,
            row_forward: planner.plan_fft_forward(fft_width),
            row_inverse: planner.plan_fft_inverse(fft_width),
            col_forward: planner.plan_fft_forward(fft_height),
            col_inverse: planner.plan_fft_inverse(fft_height),
            window_x: hann_window(width),
            window_y: hann_window(height),
            lowpass_x: gaussian_lowpass(fft_width),
            lowpass_y: gaussian_lowpass(fft_height),
        }
    }

    /// Analysis image size this correlator accepts.
    pub fn image_size(&self) -> (usize, usize) {
        (self.image_width, self.image_height)
    }

    /// Window, pad and transform an image.
    ///
    /// Returns `None` if the image size differs from the planned size.
    pub fn spectrum(&self, image: &LumaImage) -> Option<Spectrum> {
        if image.width != self.image_width || image.height != self.image_height {
            return None;
        }

        let fw = self.fft_width;
        let mean = image.mean();
        let mut data = vec![Complex::new(0.0f32, 0.0); fw * self.fft_height];
        for y in 0..self.image_height {
            let wy = self.window_y[y];
            let dst = &mut data[y * fw..y * fw + self.image_width];
            for (x, out) in dst.iter_mut().enumerate() {
                out.re = (image.get(x, y) - mean) * self.window_x[x] * wy;
            }
        }

        self.transform(&mut data, &self.row_forward, &self.col_forward);
        Some(Spectrum {
            width: fw,
            height: self.fft_height,
            data,
        })
    }

    /// Correlate two spectra produced by this correlator.
    ///
    /// Returns `None` when the spectra have no usable phase information
    /// (for example both images are flat).
    pub fn correlate(
        &self,
        reference: &Spectrum,
        candidate: &Spectrum,
        subpixel: bool,
    ) -> Option<CorrelationPeak> {
        if reference.width != self.fft_width
            || reference.height != self.fft_height
            || candidate.width != self.fft_width
            || candidate.height != self.fft_height
        {
            return None;
        }

        let cross: Vec<Complex<f32>> = reference
            .data
            .par_iter()
            .zip(candidate.data.par_iter())
            .map(|(r, c)| {
                let product = r.conj() * c;
                let magnitude = product.norm();
                if magnitude > MAGNITUDE_EPSILON {
                    product / magnitude
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();

        let smoothed = subpixel.then(|| self.lowpass(&cross));
        let surface = self.inverse_surface(cross);

        let (peak_x, peak_y, peak_value) = find_peak(&surface, self.fft_width);
        if !(peak_value > 0.0) {
            return None;
        }

        let mut dx = wrap_signed(peak_x, self.fft_width) as f64;
        let mut dy = wrap_signed(peak_y, self.fft_height) as f64;
        if let Some(smoothed) = smoothed {
            let (sx, sy) = self.refine_peak(&smoothed, peak_x, peak_y);
            dx += sx;
            dy += sy;
        }

        let sidelobe = self.sidelobe_peak(&surface, peak_x, peak_y);
        let confidence = if sidelobe > 1e-10 {
            ((peak_value as f64 / sidelobe as f64) / FULL_CONFIDENCE_RATIO).min(1.0)
        } else {
            1.0
        };

        Some(CorrelationPeak {
            dx,
            dy,
            peak_value: peak_value as f64,
            confidence,
        })
    }

    /// Real part of the normalized inverse transform.
    fn inverse_surface(&self, mut spectrum: Vec<Complex<f32>>) -> Vec<f32> {
        self.transform(&mut spectrum, &self.row_inverse, &self.col_inverse);
        let norm = 1.0 / (self.fft_width * self.fft_height) as f32;
        spectrum.iter().map(|c| c.re * norm).collect()
    }

    /// Correlation surface of `cross` after the Gaussian low-pass.
    fn lowpass(&self, cross: &[Complex<f32>]) -> Vec<f32> {
        let fw = self.fft_width;
        let mut weighted = cross.to_vec();
        weighted
            .par_chunks_mut(fw)
            .zip(self.lowpass_y.par_iter())
            .for_each(|(row, &wy)| {
                for (value, &wx) in row.iter_mut().zip(&self.lowpass_x) {
                    *value *= wx * wy;
                }
            });
        self.inverse_surface(weighted)
    }

    /// 2D transform by rows then columns.
    fn transform(
        &self,
        data: &mut [Complex<f32>],
        row_fft: &Arc<dyn Fft<f32>>,
        col_fft: &Arc<dyn Fft<f32>>,
    ) {
        let (fw, fh) = (self.fft_width, self.fft_height);

        data.par_chunks_mut(fw).for_each(|row| row_fft.process(row));

        let mut columns = transpose(data, fw, fh);
        columns
            .par_chunks_mut(fh)
            .for_each(|col| col_fft.process(col));
        let restored = transpose(&columns, fh, fw);
        data.copy_from_slice(&restored);
    }

    /// Sub-pixel vertex around the integer peak, per axis.
    ///
    /// Fits a parabola to the logarithms of the peak and its neighbors,
    /// falling back to the values themselves when a neighbor is not
    /// positive. The result is clamped to half a sample.
    fn refine_peak(&self, surface: &[f32], peak_x: usize, peak_y: usize) -> (f64, f64) {
        let (fw, fh) = (self.fft_width, self.fft_height);
        let at = |x: isize, y: isize| -> f64 {
            let xx = x.rem_euclid(fw as isize) as usize;
            let yy = y.rem_euclid(fh as isize) as usize;
            surface[yy * fw + xx] as f64
        };

        let (px, py) = (peak_x as isize, peak_y as isize);
        let center = at(px, py);

        let vertex = |before: f64, after: f64| -> f64 {
            let (b, c, a) = if before > 0.0 && center > 0.0 && after > 0.0 {
                (before.ln(), center.ln(), after.ln())
            } else {
                (before, center, after)
            };
            let denom = 2.0 * (b + a - 2.0 * c);
            if denom.abs() > 1e-12 {
                ((b - a) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            }
        };

        (
            vertex(at(px - 1, py), at(px + 1, py)),
            vertex(at(px, py - 1), at(px, py + 1)),
        )
    }

    /// Highest value outside a small neighborhood of the main peak.
    fn sidelobe_peak(&self, surface: &[f32], peak_x: usize, peak_y: usize) -> f32 {
        let (fw, fh) = (self.fft_width, self.fft_height);
        let mut best = 0.0f32;
        for (y, row) in surface.chunks_exact(fw).enumerate() {
            let dy = circular_distance(y, peak_y, fh);
            for (x, &value) in row.iter().enumerate() {
                let dx = circular_distance(x, peak_x, fw);
                if (dx > PEAK_EXCLUSION_RADIUS || dy > PEAK_EXCLUSION_RADIUS) && value > best {
                    best = value;
                }
            }
        }
        best
    }
}

/// Hann window of length `n`; all ones for very short windows.
fn hann_window(n: usize) -> Vec<f32> {
    if n < 3 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}

/// Gaussian weights over the `n` bins of one FFT axis.
fn gaussian_lowpass(n: usize) -> Vec<f32> {
    let denom = 2.0 * REFINEMENT_SIGMA * REFINEMENT_SIGMA;
    (0..n)
        .map(|k| {
            let f = k.min(n - k) as f64 / n as f64;
            (-(f * f) / denom).exp() as f32
        })
        .collect()
}

fn transpose(data: &[Complex<f32>], width: usize, height: usize) -> Vec<Complex<f32>> {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = data[y * width + x];
        }
    }
    out
}

/// Index and value of the maximum; ties resolve to the first occurrence.
fn find_peak(surface: &[f32], width: usize) -> (usize, usize, f32) {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (i, &value) in surface.iter().enumerate() {
        if value > best.1 {
            best = (i, value);
        }
    }
    (best.0 % width, best.0 / width, best.1)
}

/// Map an FFT bin index to a signed shift in `(-n/2, n/2]`.
fn wrap_signed(index: usize, n: usize) -> isize {
    if index > n / 2 {
        index as isize - n as isize
    } else {
        index as isize
    }
}

fn circular_distance(a: usize, b: usize, n: usize) -> isize {
    let d = a.abs_diff(b);
    d.min(n - d) as isize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured(width: usize, height: usize, shift: (isize, isize)) -> LumaImage {
        // Deterministic hash texture, sampled at (x - dx, y - dy).
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                let sx = x as isize - shift.0;
                let sy = y as isize - shift.1;
                let h = (sx.wrapping_mul(73_856_093) ^ sy.wrapping_mul(19_349_663)) as u64;
                (h.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 56) as f32
            })
            .collect();
        LumaImage {
            width,
            height,
            data,
        }
    }

    #[test]
    fn test_hann_window_shape() {
        let w = hann_window(5);
        assert!(w[0].abs() < 1e-6);
        assert!((w[2] - 1.0).abs() < 1e-6);
        assert!(w[4].abs() < 1e-6);
        assert_eq!(hann_window(2), vec![1.0, 1.0]);
    }

    #[test]
    fn test_gaussian_lowpass_is_symmetric_and_peaks_at_dc() {
        let w = gaussian_lowpass(8);
        assert_eq!(w[0], 1.0);
        assert!((w[1] - w[7]).abs() < 1e-7);
        assert!((w[3] - w[5]).abs() < 1e-7);
        assert!(w[1] > w[2] && w[2] > w[3] && w[3] > w[4]);
    }

    #[test]
    fn test_wrap_signed() {
        assert_eq!(wrap_signed(0, 64), 0);
        assert_eq!(wrap_signed(32, 64), 32);
        assert_eq!(wrap_signed(33, 64), -31);
        assert_eq!(wrap_signed(63, 64), -1);
    }

    #[test]
    fn test_transpose_roundtrip() {
        let data: Vec<Complex<f32>> = (0..6).map(|i| Complex::new(i as f32, 0.0)).collect();
        let t = transpose(&data, 3, 2);
        assert_eq!(t[1].re, 3.0);
        assert_eq!(transpose(&t, 2, 3), data);
    }

    #[test]
    fn test_identical_images_peak_at_origin() {
        let image = textured(64, 48, (0, 0));
        let correlator = PhaseCorrelator::new(64, 48);
        let spectrum = correlator.spectrum(&image).unwrap();
        let peak = correlator.correlate(&spectrum, &spectrum, true).unwrap();
        assert!(peak.dx.abs() < 1e-3 && peak.dy.abs() < 1e-3);
        assert!(peak.peak_value > 0.9);
        assert!(peak.confidence > 0.9);
    }

    #[test]
    fn test_integer_shift_is_recovered_with_sign() {
        let reference = textured(96, 64, (0, 0));
        let candidate = textured(96, 64, (5, -3));
        let correlator = PhaseCorrelator::new(96, 64);
        let r = correlator.spectrum(&reference).unwrap();
        let c = correlator.spectrum(&candidate).unwrap();
        let peak = correlator.correlate(&r, &c, false).unwrap();
        assert_eq!((peak.dx, peak.dy), (5.0, -3.0));
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let correlator = PhaseCorrelator::new(32, 32);
        assert!(correlator.spectrum(&textured(16, 32, (0, 0))).is_none());
    }

    #[test]
    fn test_flat_images_have_no_peak() {
        let flat = LumaImage {
            width: 32,
            height: 32,
            data: vec![128.0; 32 * 32],
        };
        let correlator = PhaseCorrelator::new(32, 32);
        let s = correlator.spectrum(&flat).unwrap();
        assert!(correlator.correlate(&s, &s, true).is_none());
    }
}
