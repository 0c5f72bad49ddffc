//! Array literals in a range of structural shapes.

use rand::Rng;

use super::numbers::{random_double, random_integer, random_number, random_special_value};
use super::strings::random_string;

/// An array expression and its length, when the length is known up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayValue {
    pub code: String,
    pub length: Option<usize>,
}

/// The number of shapes [`random_array`] draws from.
pub const ARRAY_VARIATIONS: usize = 21;

fn list<R: Rng + ?Sized>(rng: &mut R, count: usize, mut item: impl FnMut(&mut R) -> String) -> String {
    (0..count).map(|_| item(rng)).collect::<Vec<_>>().join(", ")
}

fn known(code: String, length: usize) -> ArrayValue {
    ArrayValue {
        code,
        length: Some(length),
    }
}

/// Builds array shape `variation` (taken modulo [`ARRAY_VARIATIONS`]).
pub fn array_variation<R: Rng + ?Sized>(rng: &mut R, variation: usize) -> ArrayValue {
    let count = rng.random_range(1..8);
    match variation % ARRAY_VARIATIONS {
        0 => known("[]".to_string(), 0),
        1 => known(format!("[{}]", list(rng, count, |r| r.random_range(0..100).to_string())), count),
        2 => known(format!("[{}]", list(rng, count, |r| random_integer(r))), count),
        3 => known(format!("[{}]", list(rng, count, |r| random_double(r))), count),
        4 => {
            let items = list(rng, count, |r| match r.random_range(0..5) {
                0 => random_number(r),
                1 => random_string(r, false),
                2 => "{}".to_string(),
                3 => "[]".to_string(),
                _ => random_special_value(r).to_string(),
            });
            known(format!("[{items}]"), count)
        }
        5 => {
            // Holes between elements.
            let items = list(rng, count, |r| {
                if r.random_bool(0.4) {
                    String::new()
                } else {
                    random_integer(r)
                }
            });
            known(format!("[{items}, 0]"), count + 1)
        }
        6 => known(format!("[{}]", ",".repeat(count)), count),
        7 => known(
            format!("[{}]", list(rng, count, |r| format!("[{}]", random_integer(r)))),
            count,
        ),
        8 => known("[[[[[[]]]]], [[[1]]], [[], [[]]]]".to_string(), 3),
        9 => {
            let inner = list(rng, count, |r| random_integer(r));
            known(format!("[...[{inner}], 1]"), count + 1)
        }
        10 => known(format!("[{}]", list(rng, count, |r| random_string(r, true))), count),
        11 => known(format!("[{}]", list(rng, count, |_| "{a: 1, b: 2}".to_string())), count),
        12 => {
            let length = rng.random_range(0..2000);
            known(format!("new Array({length})"), length)
        }
        13 => {
            let length = rng.random_range(0..100);
            known(format!("Array({length}).fill({})", random_number(rng)), length)
        }
        14 => {
            let length = rng.random_range(0..100);
            known(format!("Array.from({{length: {length}}}, (v, i) => i)"), length)
        }
        15 => known(format!("Array.of({})", list(rng, count, |r| random_number(r))), count),
        16 => known("[NaN, -0, 0, Infinity, -Infinity, undefined, null]".to_string(), 7),
        17 => known(
            format!("[{}]", list(rng, count, |r| r.random_bool(0.5).to_string())),
            count,
        ),
        18 => known(
            "[function() {}, () => 1, class {}, Symbol(), 1n, /a/g]".to_string(),
            6,
        ),
        19 => {
            let length = rng.random_range(0..64);
            known(format!("[...new Uint8Array({length})]"), length)
        }
        _ => ArrayValue {
            code: format!("new Array({}).concat([1.5, 'x'])", random_special_value(rng)),
            length: None,
        },
    }
}

pub fn random_array<R: Rng + ?Sized>(rng: &mut R) -> ArrayValue {
    let variation = rng.random_range(0..ARRAY_VARIATIONS);
    array_variation(rng, variation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::find_matching_bracket;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn every_variation_is_balanced_and_single_line() {
        for variation in 0..ARRAY_VARIATIONS {
            for seed in 0..20 {
                let mut rng = StdRng::seed_from_u64(seed);
                let value = array_variation(&mut rng, variation);
                assert!(!value.code.contains('\n'));
                if let Some(open) = value.code.find('[') {
                    assert!(find_matching_bracket(&value.code, open).is_some(), "{}", value.code);
                }
            }
        }
    }

    #[test]
    fn literal_lengths_match_the_scanner() {
        for variation in [1, 2, 3, 7, 10, 17] {
            let mut rng = StdRng::seed_from_u64(variation as u64);
            let value = array_variation(&mut rng, variation);
            assert_eq!(
                crate::state::infer::array_literal_length(&value.code),
                value.length,
                "{}",
                value.code
            );
        }
    }
}
