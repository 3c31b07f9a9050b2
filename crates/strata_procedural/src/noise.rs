//! # Simplex Noise
//!
//! Seeded 2D simplex noise plus a multi-octave generator built on it.
//!
//! ## Octaves
//!
//! Octave `i` gets its own seed drawn from a ChaCha8 stream seeded with the
//! world seed, frequency `base_frequency * 2^i` and amplitude
//! `persistence^i`. The generator output is the plain sum of the octaves,
//! so it lies within `±Σ persistence^i`.
//!
//! ## Determinism Guarantee
//!
//! Given the same parameters the generator produces exactly the same values
//! on any platform, any time. Changing a parameter rebuilds every octave
//! table before the setter returns.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use strata_core::config::{NoiseConfig, MAX_OCTAVES};
use strata_core::error::{TerrainError, TerrainResult};

/// 12 gradient directions for 2D simplex.
const GRADIENTS: [[i8; 2]; 12] = [
    [1, 0], [1, 1], [0, 1], [-1, 1],
    [-1, 0], [-1, -1], [0, -1], [1, -1],
    [1, 0], [0, 1], [-1, 0], [0, -1],
];

/// Seeded permutation table.
struct PermutationTable {
    /// 256 entries, doubled so `perm[i + perm[j]]` never wraps.
    perm: [u8; 512],
}

impl PermutationTable {
    fn new(seed: u64) -> Self {
        let mut base = [0u8; 256];
        for (i, slot) in base.iter_mut().enumerate() {
            *slot = i as u8;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for i in (1..256).rev() {
            let j = rng.gen_range(0..=i);
            base.swap(i, j);
        }

        let mut perm = [0u8; 512];
        perm[..256].copy_from_slice(&base);
        perm[256..].copy_from_slice(&base);
        Self { perm }
    }

    #[inline]
    fn get(&self, index: usize) -> u8 {
        self.perm[index & 511]
    }
}

/// 2D simplex noise with values in `[-1, 1]`.
pub struct SimplexNoise {
    perm_table: PermutationTable,
}

impl SimplexNoise {
    /// Skewing factor for 2D simplex grid.
    const F2: f64 = 0.366_025_403_784_439; // (sqrt(3) - 1) / 2
    /// Unskewing factor for 2D simplex grid.
    const G2: f64 = 0.211_324_865_405_187; // (3 - sqrt(3)) / 6

    /// Creates a noise source from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            perm_table: PermutationTable::new(seed),
        }
    }

    /// Samples 1D noise (a slice through the 2D field at `y = 0`).
    #[inline]
    #[must_use]
    pub fn sample_1d(&self, x: f64) -> f64 {
        self.sample(x, 0.0)
    }

    /// Samples 2D noise.
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let skew = (x + y) * Self::F2;
        let i = fast_floor(x + skew);
        let j = fast_floor(y + skew);

        let unskew = f64::from(i + j) * Self::G2;
        let x0 = x - (f64::from(i) - unskew);
        let y0 = y - (f64::from(j) - unskew);

        // Upper or lower triangle of the skewed cell
        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - i1 as f64 + Self::G2;
        let y1 = y0 - j1 as f64 + Self::G2;
        let x2 = x0 - 1.0 + 2.0 * Self::G2;
        let y2 = y0 - 1.0 + 2.0 * Self::G2;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let table = &self.perm_table;

        let gi0 = table.get(ii + table.get(jj) as usize);
        let gi1 = table.get(ii + i1 + table.get(jj + j1) as usize);
        let gi2 = table.get(ii + 1 + table.get(jj + 1) as usize);

        // 70 scales the corner sum to [-1, 1]
        70.0 * (corner(x0, y0, gi0) + corner(x1, y1, gi1) + corner(x2, y2, gi2))
    }
}

#[inline]
fn corner(x: f64, y: f64, hash: u8) -> f64 {
    let t = 0.5 - x * x - y * y;
    if t < 0.0 {
        return 0.0;
    }
    let grad = GRADIENTS[(hash % 12) as usize];
    let t2 = t * t;
    t2 * t2 * (x * f64::from(grad[0]) + y * f64::from(grad[1]))
}

#[inline]
fn fast_floor(x: f64) -> i32 {
    let xi = x as i32;
    if x < f64::from(xi) {
        xi - 1
    } else {
        xi
    }
}

/// Multi-octave noise parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseParams {
    /// World seed.
    pub seed: u64,
    /// Number of octaves (1..=16).
    pub octaves: u32,
    /// Frequency of octave 0.
    pub base_frequency: f64,
    /// Amplitude falloff per octave.
    pub persistence: f64,
}

impl NoiseParams {
    fn validate(&self) -> TerrainResult<()> {
        if !(1..=MAX_OCTAVES).contains(&self.octaves) {
            return Err(TerrainError::Configuration(format!(
                "octave count must be in 1..={MAX_OCTAVES}, got {}",
                self.octaves
            )));
        }
        if !(self.base_frequency.is_finite() && self.base_frequency > 0.0) {
            return Err(TerrainError::Configuration(format!(
                "base frequency must be positive, got {}",
                self.base_frequency
            )));
        }
        if !(self.persistence.is_finite() && self.persistence > 0.0) {
            return Err(TerrainError::Configuration(format!(
                "persistence must be positive, got {}",
                self.persistence
            )));
        }
        Ok(())
    }
}

impl From<&NoiseConfig> for NoiseParams {
    fn from(config: &NoiseConfig) -> Self {
        Self {
            seed: config.seed,
            octaves: config.octaves,
            base_frequency: config.base_frequency,
            persistence: config.persistence,
        }
    }
}

struct Octave {
    noise: SimplexNoise,
    seed: u64,
    frequency: f64,
    amplitude: f64,
}

/// Deterministic multi-octave noise.
///
/// # Example
///
/// ```rust,ignore
/// let params = NoiseParams { seed: 42, octaves: 3, base_frequency: 0.1, persistence: 0.5 };
/// let noise = NoiseGenerator::new(params)?;
/// let height = noise.generate_1d(10.0);
/// ```
pub struct NoiseGenerator {
    params: NoiseParams,
    octaves: Vec<Octave>,
}

impl NoiseGenerator {
    /// Builds every octave table.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an octave count outside `1..=16` or a
    /// non-positive frequency or persistence.
    pub fn new(params: NoiseParams) -> TerrainResult<Self> {
        params.validate()?;
        Ok(Self {
            octaves: build_octaves(&params),
            params,
        })
    }

    /// Current parameters.
    #[inline]
    #[must_use]
    pub const fn params(&self) -> NoiseParams {
        self.params
    }

    /// Seeds drawn for each octave, in octave order.
    #[must_use]
    pub fn octave_seeds(&self) -> Vec<u64> {
        self.octaves.iter().map(|octave| octave.seed).collect()
    }

    /// Upper bound of `|generate_*|`.
    #[must_use]
    pub fn max_amplitude(&self) -> f64 {
        self.octaves.iter().map(|octave| octave.amplitude).sum()
    }

    /// Samples the 1D field.
    #[must_use]
    pub fn generate_1d(&self, x: f64) -> f64 {
        self.octaves
            .iter()
            .map(|octave| octave.noise.sample_1d(x * octave.frequency) * octave.amplitude)
            .sum()
    }

    /// Samples the 2D field.
    #[must_use]
    pub fn generate_2d(&self, x: f64, y: f64) -> f64 {
        self.octaves
            .iter()
            .map(|octave| {
                octave.noise.sample(x * octave.frequency, y * octave.frequency) * octave.amplitude
            })
            .sum()
    }

    /// Replaces the world seed.
    pub fn set_seed(&mut self, seed: u64) {
        if seed != self.params.seed {
            self.params.seed = seed;
            self.octaves = build_octaves(&self.params);
        }
    }

    /// Replaces the octave count.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for a count outside `1..=16`.
    pub fn set_octaves(&mut self, octaves: u32) -> TerrainResult<()> {
        self.update(NoiseParams { octaves, ..self.params })
    }

    /// Replaces the base frequency.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for a non-positive frequency.
    pub fn set_base_frequency(&mut self, base_frequency: f64) -> TerrainResult<()> {
        self.update(NoiseParams {
            base_frequency,
            ..self.params
        })
    }

    /// Replaces the persistence.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for a non-positive persistence.
    pub fn set_persistence(&mut self, persistence: f64) -> TerrainResult<()> {
        self.update(NoiseParams {
            persistence,
            ..self.params
        })
    }

    fn update(&mut self, params: NoiseParams) -> TerrainResult<()> {
        params.validate()?;
        if params != self.params {
            self.octaves = build_octaves(&params);
            self.params = params;
        }
        Ok(())
    }
}

fn build_octaves(params: &NoiseParams) -> Vec<Octave> {
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut frequency = params.base_frequency;
    let mut amplitude = 1.0;
    (0..params.octaves)
        .map(|_| {
            let seed = rng.next_u64();
            let octave = Octave {
                noise: SimplexNoise::new(seed),
                seed,
                frequency,
                amplitude,
            };
            frequency *= 2.0;
            amplitude *= params.persistence;
            octave
        })
        .collect()
}
