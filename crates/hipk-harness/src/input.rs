//! Host input generation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// How the host input buffer is populated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum InputFill {
    /// Every element set to the same value.
    Constant {
        #[serde(serialize_with = "crate::config::short_f32")]
        value: f32,
    },
    /// Uniform in `[-1, 1)`, reproducible from `seed`.
    Random { seed: u64 },
}

impl Default for InputFill {
    fn default() -> Self {
        Self::Constant { value: 0.8 }
    }
}

impl InputFill {
    pub fn generate(&self, len: usize) -> Vec<f32> {
        match *self {
            Self::Constant { value } => vec![value; len],
            Self::Random { seed } => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                (0..len).map(|_| rng.random_range(-1.0f32..1.0)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_fill() {
        let v = InputFill::Constant { value: 0.8 }.generate(5);
        assert_eq!(v, vec![0.8; 5]);
    }

    #[test]
    fn random_fill_is_seeded_and_bounded() {
        let a = InputFill::Random { seed: 42 }.generate(1000);
        let b = InputFill::Random { seed: 42 }.generate(1000);
        assert_eq!(a, b);
        assert!(a.iter().all(|x| (-1.0..1.0).contains(x)));
        assert_ne!(a, InputFill::Random { seed: 43 }.generate(1000));
    }
}
