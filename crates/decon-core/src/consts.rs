/// Minimum voxel count to use lane-level Rayon parallelism in the CPU backend.
pub const PARALLEL_VOXEL_THRESHOLD: usize = 262_144;

/// Reblurred values at or below this give a zero ratio instead of a division.
pub const EPSILON: f32 = 1e-10;

/// Normalization-factor voxels at or below this value are treated as lying
/// outside the valid region and zeroed by the solver.
pub const NORMALIZATION_THRESHOLD: f32 = 1e-4;

/// Lower bound on the total-variation denominator `1 - lambda * div`.
pub const TV_DENOMINATOR_FLOOR: f32 = 1e-4;

/// Gradient magnitude floor used when normalising gradients for the
/// total-variation term.
pub const TV_GRADIENT_FLOOR: f32 = 1e-6;

/// Prime factors an FFT size may contain to count as "smooth".
pub const SMOOTH_PRIMES: [usize; 4] = [2, 3, 5, 7];

/// Largest value held in the precomputed smooth-size table. Requests above
/// this are answered by direct search.
pub const SMOOTH_TABLE_LIMIT: usize = 1 << 16;

/// Default Richardson-Lucy iteration count.
pub const DEFAULT_ITERATIONS: usize = 100;

/// Default total-variation regularization weight (0 disables TV).
pub const DEFAULT_REGULARIZATION: f32 = 0.0;
