// FOVEA Gaze Source
// Copyright (c) 2026 The FOVEA Project
//
// Stand-in for a real eye tracker: a bounded random walk in the high layer's
// coordinate space. Each step is uniform in [-max_step, max_step] per axis
// and the result is clamped into the frame, so the trajectory moves like a
// (very jittery) gaze rather than teleporting.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One random-walk step. Stateless: the caller owns the previous point.
pub fn step(
    prev: (u32, u32),
    bounds: (u32, u32),
    max_step: i32,
    rng: &mut StdRng,
) -> (u32, u32) {
    let (width, height) = bounds;
    let dx = rng.gen_range(-max_step..=max_step);
    let dy = rng.gen_range(-max_step..=max_step);
    let x = (prev.0 as i64 + dx as i64).clamp(0, width as i64 - 1) as u32;
    let y = (prev.1 as i64 + dy as i64).clamp(0, height as i64 - 1) as u32;
    (x, y)
}

/// Owns the RNG and the last gaze point so concurrent pipelines never share
/// walk state.
pub struct GazeSource {
    rng: StdRng,
    bounds: (u32, u32),
    max_step: i32,
    position: (u32, u32),
}

impl GazeSource {
    /// Starts at the center of the bounds, like the reference experiment.
    pub fn new(bounds: (u32, u32), max_step: i32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            bounds,
            max_step,
            position: (bounds.0 / 2, bounds.1 / 2),
        }
    }

    pub fn next(&mut self) -> (u32, u32) {
        self.position = step(self.position, self.bounds, self.max_step, &mut self.rng);
        self.position
    }

    pub fn position(&self) -> (u32, u32) {
        self.position
    }
}
