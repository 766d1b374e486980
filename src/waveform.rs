//! Fixed sample tables the virtual device plays back.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::str::FromStr;
use std::sync::LazyLock;

pub const TABLE_LEN: usize = 200;

/// DC component carried by every table.
pub const TABLE_DC_BIAS: i16 = 20;

const AMPLITUDE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    Sine,
    Square,
    Triangle,
    Sawtooth,
    Random,
}

impl Pattern {
    pub const ALL: [Pattern; 5] = [
        Pattern::Sine,
        Pattern::Square,
        Pattern::Triangle,
        Pattern::Sawtooth,
        Pattern::Random,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Sine => "Sine",
            Pattern::Square => "Square",
            Pattern::Triangle => "Triangle",
            Pattern::Sawtooth => "Sawtooth",
            Pattern::Random => "Random",
        }
    }

    fn slot(self) -> usize {
        match self {
            Pattern::Sine => 0,
            Pattern::Square => 1,
            Pattern::Triangle => 2,
            Pattern::Sawtooth => 3,
            Pattern::Random => 4,
        }
    }

    pub fn table(self) -> &'static [i16; TABLE_LEN] {
        &TABLES[self.slot()]
    }

    /// Table value at `index`, wrapped to the table length.
    pub fn sample_at(self, index: u64) -> i16 {
        self.table()[(index % TABLE_LEN as u64) as usize]
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown pattern '{0}'")]
pub struct UnknownPatternError(pub String);

impl FromStr for Pattern {
    type Err = UnknownPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPatternError(s.to_string()))
    }
}

static TABLES: LazyLock<[[i16; TABLE_LEN]; 5]> = LazyLock::new(|| Pattern::ALL.map(build_table));

fn build_table(pattern: Pattern) -> [i16; TABLE_LEN] {
    let mut table = [0i16; TABLE_LEN];
    let n = TABLE_LEN as f64;
    let mut rng = StdRng::seed_from_u64(0x0d5_1ab);
    for (k, slot) in table.iter_mut().enumerate() {
        let phase = k as f64 / n;
        let wave = match pattern {
            Pattern::Sine => AMPLITUDE * (TAU * phase).sin(),
            Pattern::Square => {
                if phase < 0.5 {
                    AMPLITUDE
                } else {
                    -AMPLITUDE
                }
            }
            Pattern::Triangle => {
                if phase < 0.5 {
                    AMPLITUDE * (4.0 * phase - 1.0)
                } else {
                    AMPLITUDE * (3.0 - 4.0 * phase)
                }
            }
            Pattern::Sawtooth => AMPLITUDE * (2.0 * phase - 1.0),
            Pattern::Random => rng.gen_range(-AMPLITUDE..=AMPLITUDE),
        };
        *slot = TABLE_DC_BIAS + wave.round() as i16;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_names_round_trip() {
        for pattern in Pattern::ALL {
            assert_eq!(pattern.as_str().parse::<Pattern>().unwrap(), pattern);
        }
        assert_eq!("sine".parse::<Pattern>().unwrap(), Pattern::Sine);
        assert!("ekg".parse::<Pattern>().is_err());
    }

    #[test]
    fn test_tables_are_bounded_and_biased() {
        for pattern in Pattern::ALL {
            let table = pattern.table();
            let min = *table.iter().min().unwrap();
            let max = *table.iter().max().unwrap();
            assert!(min >= TABLE_DC_BIAS - 100, "{pattern:?} min {min}");
            assert!(max <= TABLE_DC_BIAS + 100, "{pattern:?} max {max}");
            assert!(min < 0, "{pattern:?} never crosses zero");
        }
        assert_eq!(Pattern::Sine.sample_at(0), TABLE_DC_BIAS);
        assert_eq!(Pattern::Sine.sample_at(50), TABLE_DC_BIAS + 100);
    }

    #[test]
    fn test_sample_at_wraps() {
        assert_eq!(
            Pattern::Sawtooth.sample_at(3),
            Pattern::Sawtooth.sample_at(3 + TABLE_LEN as u64 * 7)
        );
    }

    #[test]
    fn test_tables_are_stable() {
        assert_eq!(Pattern::Random.table(), Pattern::Random.table());
        assert_eq!(build_table(Pattern::Random), *Pattern::Random.table());
    }
}
