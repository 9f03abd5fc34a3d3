//! Fault model applied to every reply the emulator sends.
//!
//! The legacy estimator is deliberately unreliable.  Each reply is the decimal
//! text of π after two independent faults have been applied:
//!
//! | Fault        | Description                                              |
//! |--------------|----------------------------------------------------------|
//! | Perturbation | Add a uniform offset in `[-perturbation, +perturbation)`. |
//! | Corruption   | With probability `corruption_rate`, replace one randomly |
//! |              | chosen character of the text with a random ASCII letter. |
//!
//! The defaults reproduce the production estimator.  Tests turn individual
//! faults off to get predictable payloads.

use rand::Rng;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Configuration for the fault model.
///
/// `corruption_rate` is a probability in `[0.0, 1.0]`.  A perturbation that is
/// not a finite positive number disables that fault.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseModel {
    /// Half-width of the uniform offset added to π.
    pub perturbation: f64,
    /// Probability that one character of the reply is replaced by a letter.
    pub corruption_rate: f64,
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self {
            perturbation: 0.05,
            corruption_rate: 0.5,
        }
    }
}

impl NoiseModel {
    /// A model that always returns the exact decimal text of π.
    pub fn exact() -> Self {
        Self {
            perturbation: 0.0,
            corruption_rate: 0.0,
        }
    }

    /// Produce one reply payload.
    pub fn render<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let offset = if self.perturbation.is_finite() && self.perturbation > 0.0 {
            rng.random_range(-self.perturbation..self.perturbation)
        } else {
            0.0
        };
        let text = (std::f64::consts::PI + offset).to_string();

        if self.corruption_rate > 0.0 && rng.random_bool(self.corruption_rate.min(1.0)) {
            corrupt(&text, rng)
        } else {
            text
        }
    }
}

/// Replace one character of `text` with a random ASCII letter.
///
/// `text` is always ASCII here (the decimal form of an `f64`), so byte
/// positions and character positions coincide.
fn corrupt<R: Rng + ?Sized>(text: &str, rng: &mut R) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut bytes = text.as_bytes().to_vec();
    let pos = rng.random_range(0..bytes.len());
    bytes[pos] = LETTERS[rng.random_range(0..LETTERS.len())];
    String::from_utf8_lossy(&bytes).into_owned()
}
