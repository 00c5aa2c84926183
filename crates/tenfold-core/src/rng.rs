//! Random number generator abstraction for determinism.
//!
//! In production this wraps the thread RNG. In tests a scripted
//! implementation is injected so judgment outcomes are reproducible.

use rand::Rng;

/// Abstraction over random number generation.
pub trait RandomSource: Send {
    /// Draw a uniformly distributed value in `1..=sides`.
    fn draw(&mut self, sides: u32) -> u32;
}

/// Production source backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn draw(&mut self, sides: u32) -> u32 {
        rand::rng().random_range(1..=sides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_stays_in_bounds() {
        let mut rng = ThreadRandom;
        for _ in 0..1000 {
            let value = rng.draw(100);
            assert!((1..=100).contains(&value));
        }
    }
}
