//! Test RNG — deterministic `RandomSource` implementations for tests.

use tenfold_core::rng::RandomSource;

/// A source that always draws the same value. Suitable for tests that do
/// not depend on specific judgment outcomes.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u32);

impl RandomSource for FixedRandom {
    fn draw(&mut self, sides: u32) -> u32 {
        self.0.clamp(1, sides)
    }
}

/// A source that draws values from a predetermined sequence. Panics if the
/// sequence is exhausted. Used in tests that need specific, repeatable
/// judgment rolls.
#[derive(Debug)]
pub struct SequenceRandom {
    values: Vec<u32>,
    index: usize,
}

impl SequenceRandom {
    /// Create a new `SequenceRandom` with the given values.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self { values, index: 0 }
    }
}

impl RandomSource for SequenceRandom {
    fn draw(&mut self, _sides: u32) -> u32 {
        let value = self.values[self.index];
        self.index += 1;
        value
    }
}
