//! Complex discrete Fourier transforms of arbitrary length.
//!
//! Power-of-two lengths use an iterative radix-2 transform. Other lengths
//! (the polar-cap rings of a HEALPix grid hold `4 i` pixels) go through
//! Bluestein's chirp-z algorithm on top of a padded radix-2 transform.

#![allow(clippy::cast_precision_loss)]

use std::f64::consts::PI;

use num_complex::Complex64;

/// A precomputed transform of one length.
#[derive(Debug, Clone)]
pub struct FftPlan {
    len: usize,
    kind: PlanKind,
}

#[derive(Debug, Clone)]
enum PlanKind {
    Radix2(Radix2),
    Bluestein {
        inner: Radix2,
        /// `exp(-i pi k^2 / n)` for `k < n`.
        chirp: Vec<Complex64>,
        /// Transform of the conjugate chirp, wrapped to the padded length.
        kernel: Vec<Complex64>,
    },
}

impl FftPlan {
    /// Plans a transform of length `len`.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let kind = if len.is_power_of_two() || len <= 1 {
            PlanKind::Radix2(Radix2::new(len.max(1)))
        } else {
            let padded = (2 * len - 1).next_power_of_two();
            let inner = Radix2::new(padded);
            let period = 2 * len as u64;
            let chirp: Vec<Complex64> = (0..len as u64)
                .map(|k| {
                    // k^2 mod 2n keeps the angle small and exact.
                    let phase = (k * k % period) as f64;
                    Complex64::from_polar(1.0, -PI * phase / len as f64)
                })
                .collect();

            let mut kernel = vec![Complex64::new(0.0, 0.0); padded];
            kernel[0] = chirp[0].conj();
            for k in 1..len {
                kernel[k] = chirp[k].conj();
                kernel[padded - k] = chirp[k].conj();
            }
            inner.forward(&mut kernel);

            PlanKind::Bluestein {
                inner,
                chirp,
                kernel,
            }
        };
        Self { len, kind }
    }

    /// Transform length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// In-place forward transform, `X_k = sum_j x_j exp(-2 pi i jk / n)`.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` differs from the planned length.
    pub fn forward(&self, data: &mut [Complex64]) {
        assert_eq!(data.len(), self.len, "buffer length does not match plan");
        match &self.kind {
            PlanKind::Radix2(r) => {
                if self.len > 1 {
                    r.forward(data);
                }
            }
            PlanKind::Bluestein {
                inner,
                chirp,
                kernel,
            } => {
                let padded = kernel.len();
                let mut work = vec![Complex64::new(0.0, 0.0); padded];
                for ((w, &x), &c) in work.iter_mut().zip(data.iter()).zip(chirp) {
                    *w = x * c;
                }
                inner.forward(&mut work);
                for (w, &k) in work.iter_mut().zip(kernel) {
                    *w *= k;
                }
                inner.inverse(&mut work);
                let norm = 1.0 / padded as f64;
                for ((x, &w), &c) in data.iter_mut().zip(&work).zip(chirp) {
                    *x = w * c * norm;
                }
            }
        }
    }

    /// In-place unnormalized inverse transform, `x_j = sum_k X_k exp(2 pi i jk / n)`.
    pub fn inverse(&self, data: &mut [Complex64]) {
        for x in data.iter_mut() {
            *x = x.conj();
        }
        self.forward(data);
        for x in data.iter_mut() {
            *x = x.conj();
        }
    }
}

/// Iterative radix-2 transform for power-of-two lengths.
#[derive(Debug, Clone)]
struct Radix2 {
    /// `exp(-2 pi i k / n)` for `k < n / 2`.
    twiddles: Vec<Complex64>,
}

impl Radix2 {
    fn new(len: usize) -> Self {
        debug_assert!(len.is_power_of_two());
        let twiddles = (0..len / 2)
            .map(|k| Complex64::from_polar(1.0, -2.0 * PI * k as f64 / len as f64))
            .collect();
        Self { twiddles }
    }

    fn forward(&self, data: &mut [Complex64]) {
        let n = data.len();
        if n <= 1 {
            return;
        }

        let mut j = 0;
        for i in 1..n {
            let mut bit = n >> 1;
            while j & bit != 0 {
                j ^= bit;
                bit >>= 1;
            }
            j |= bit;
            if i < j {
                data.swap(i, j);
            }
        }

        let mut size = 2;
        while size <= n {
            let half = size / 2;
            let stride = n / size;
            for chunk in data.chunks_exact_mut(size) {
                let (lo, hi) = chunk.split_at_mut(half);
                for (k, (a, b)) in lo.iter_mut().zip(hi.iter_mut()).enumerate() {
                    let t = *b * self.twiddles[k * stride];
                    *b = *a - t;
                    *a += t;
                }
            }
            size *= 2;
        }
    }

    fn inverse(&self, data: &mut [Complex64]) {
        for x in data.iter_mut() {
            *x = x.conj();
        }
        self.forward(data);
        for x in data.iter_mut() {
            *x = x.conj();
        }
    }
}
