//! Number literals: boundary values, interesting constants, special values and
//! value-preserving rewrites of existing literals.

use rand::Rng;
use rand::seq::IndexedRandom;

/// Integers around the representation boundaries of the engine: small integer
/// tagging, int32/uint32, double mantissa and array index limits.
pub const INTERESTING_INTEGERS: &[&str] = &[
    "0", "1", "-1", "2", "3", "7", "8", "15", "16", "31", "32", "63", "64", "127", "128", "-128",
    "255", "256", "511", "512", "1000", "1023", "1024", "4095", "4096", "32767", "32768",
    "-32768", "-32769", "65535", "65536", "100000", "1073741823", "1073741824", "-1073741824",
    "-1073741825", "2147483647", "2147483648", "-2147483648", "-2147483649", "4294967295",
    "4294967296", "4294967294", "9007199254740991", "9007199254740992", "9007199254740993",
    "-9007199254740991", "-9007199254740992", "18446744073709551615", "18446744073709551616",
];

/// Doubles with interesting bit patterns: extremes, denormals, values whose
/// bit pattern looks like a pointer or a hole marker, and constants from
/// public engine bug reports.
pub const INTERESTING_DOUBLES: &[&str] = &[
    "0.1", "0.5", "-0.5", "1.5", "-1.5", "2.5", "1e21", "1e-7", "1e308", "-1e308",
    "1.7976931348623157e308", "-1.7976931348623157e308", "2.2250738585072014e-308",
    "2.225073858507201e-308", "5e-324", "-5e-324", "4.9406564584124654e-324",
    "1.1125369292536007e-308", "2.0000000000000004", "0.30000000000000004", "1.0000000000000002",
    "0.9999999999999999", "4294967295.5", "2147483647.5", "-2147483648.5", "9007199254740991.5",
    "1.9035985662552932e185", "-1.1885958788264e148", "3.4766779039175e-310",
    "6.953355807835e-310", "1.390671161567e-309", "-6.828527034422786e-229",
    "1.4854e-319", "3.1415926535897932", "2.718281828459045",
];

/// Spellings that evaluate to negative zero.
pub const NEGATIVE_ZERO_ENCODINGS: &[&str] = &[
    "-0",
    "-0.0",
    "(-0)",
    "-0e0",
    "-0x0",
    "-(0)",
    "0 * -1",
    "-1 * 0",
    "0 / -5",
    "1 / -Infinity",
    "-1 / Infinity",
    "-5e-325",
    "-1e-400",
    "Math.round(-0.4)",
    "Math.round(-0.5)",
    "Math.ceil(-0.5)",
    "Math.ceil(-0.9)",
    "Math.trunc(-0.9)",
    "Math.sign(-0)",
    "Math.floor(-0)",
    "Math.fround(-0)",
    "Math.atan2(-0, 1)",
    "Math.asin(-0)",
    "Math.atan(-0)",
    "Math.sin(-0)",
    "Math.tan(-0)",
    "Math.sqrt(-0)",
    "Math.cbrt(-0)",
    "Math.expm1(-0)",
    "Math.log1p(-0)",
    "Math.atanh(-0)",
    "Math.sinh(-0)",
    "Math.tanh(-0)",
    "Math.min(0, -0)",
    "Math.max(-0, -0)",
    "Math.abs(0) * -1",
    "-Number.MIN_VALUE * 0",
    "Number('-0')",
    "parseFloat('-0')",
    "+'-0'",
    "JSON.parse('-0')",
    "-0 % 5",
    "(-0) ** 1",
    "(-0) ** 3",
];

/// Values outside the plain literal space.
pub const SPECIAL_VALUES: &[&str] = &[
    "NaN",
    "-NaN",
    "Infinity",
    "-Infinity",
    "-0",
    "undefined",
    "null",
    "Number.MAX_SAFE_INTEGER",
    "Number.MIN_SAFE_INTEGER",
    "Number.MAX_VALUE",
    "Number.MIN_VALUE",
    "Number.EPSILON",
    "2**53",
    "-(2**53)",
    "2**31-1",
    "-(2**31)",
    "2**32-1",
    "2**30",
    "0x7fffffff",
    "0x80000000",
    "0xffffffff",
    "0x3fffffff",
];

pub const ARITHMETIC_OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "&", "|", "^", "<<", ">>", ">>>",
];

fn pick<R: Rng + ?Sized>(rng: &mut R, table: &[&'static str]) -> &'static str {
    table.choose(rng).copied().unwrap_or("0")
}

/// An integer literal biased towards boundary values.
pub fn random_integer<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.random_range(0..4) {
        0 | 1 => pick(rng, INTERESTING_INTEGERS).to_string(),
        2 => {
            // Powers of two plus or minus a small offset.
            let power = 2f64.powi(rng.random_range(0..=53));
            let value = power + f64::from(rng.random_range(-3i32..=3));
            let value = if rng.random_bool(0.25) { -value } else { value };
            format!("{value}")
        }
        _ => rng.random_range(-1000i32..=1000).to_string(),
    }
}

/// A double literal, sometimes an interesting constant.
pub fn random_double<R: Rng + ?Sized>(rng: &mut R) -> String {
    if rng.random_bool(0.5) {
        return pick(rng, INTERESTING_DOUBLES).to_string();
    }
    let value: f64 = rng.random_range(-1_000_000.0..1_000_000.0);
    let value = value / 10f64.powi(rng.random_range(0..8));
    let text = format!("{value}");
    if text.contains('.') || text.contains('e') {
        text
    } else {
        format!("{text}.5")
    }
}

pub fn random_negative_zero<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(rng, NEGATIVE_ZERO_ENCODINGS)
}

pub fn random_special_value<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(rng, SPECIAL_VALUES)
}

pub fn random_bigint<R: Rng + ?Sized>(rng: &mut R) -> String {
    let digits = random_integer(rng);
    // BigInt literals cannot carry a fraction or an exponent.
    match digits.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value.abs() < 1e20 => format!("{}n", value as i128),
        _ => format!("{}n", rng.random_range(-1000i64..=1000)),
    }
}

/// Any number: integer, double, negative zero or special value.
pub fn random_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.random_range(0..10) {
        0..=4 => random_integer(rng),
        5..=7 => random_double(rng),
        8 => random_negative_zero(rng).to_string(),
        _ => random_special_value(rng).to_string(),
    }
}

pub fn random_operator<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(rng, ARITHMETIC_OPERATORS)
}

/// A differently spelled but equivalent number expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposed {
    pub expression: String,
    /// A statement that has to run before `expression`, on its own line.
    pub prefix: Option<String>,
}

impl Decomposed {
    fn inline(expression: String) -> Self {
        Self {
            expression,
            prefix: None,
        }
    }
}

fn wrap_neutral<R: Rng + ?Sized>(rng: &mut R, literal: &str) -> String {
    if literal.ends_with('n') {
        let neutral = ["+ 0n", "* 1n", "- 0n"].choose(rng).copied().unwrap_or("+ 0n");
        format!("({literal} {neutral})")
    } else {
        let neutral = ["* 1", "- 0", "/ 1"].choose(rng).copied().unwrap_or("* 1");
        format!("({literal} {neutral})")
    }
}

fn decompose_integer<R: Rng + ?Sized>(rng: &mut R, value: u64) -> String {
    match rng.random_range(0..4) {
        0 => {
            let left = rng.random_range(0..=value);
            format!("{left}+{}", value - left)
        }
        1 => {
            let offset = rng.random_range(1..=1000u64);
            format!("({}-{offset})", value + offset)
        }
        2 => {
            let modulus = value + rng.random_range(1..=1000u64);
            format!("{value} % {modulus}")
        }
        _ => {
            let half = value as f64 / 2.0;
            format!("{half}+{half}")
        }
    }
}

fn decompose_float<R: Rng + ?Sized>(rng: &mut R, value: f64) -> String {
    match rng.random_range(0..3) {
        0 => {
            let half = value / 2.0;
            format!("{half}+{half}")
        }
        1 => format!("{}*2", value / 2.0),
        _ => format!("{}*4", value / 4.0),
    }
}

/// Rewrites `literal` into an expression with the same value.
///
/// Negative literals decompose their magnitude and negate the result. Integer
/// literals are split into a sum, offset, taken modulo a larger number or
/// halved; floats are halved or quartered, which is exact for normal doubles.
/// Literals in other notations (hex, binary, BigInt, exponents near the double
/// limits) are wrapped with a neutral operation instead. With a `helper` name
/// the value may also be hoisted into a helper variable declared by `prefix`.
pub fn decompose_number<R: Rng + ?Sized>(rng: &mut R, literal: &str, helper: Option<&str>) -> Decomposed {
    let literal = literal.trim();
    if let Some(helper) = helper {
        if rng.random_bool(0.1) {
            return Decomposed {
                expression: helper.to_string(),
                prefix: Some(format!("var {helper} = {literal};")),
            };
        }
    }
    if let Some(magnitude) = literal.strip_prefix('-') {
        let inner = decompose_number(rng, magnitude, None);
        return Decomposed::inline(format!("-({})", inner.expression));
    }

    let is_decimal = literal
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        && literal.bytes().next().is_some_and(|b| b.is_ascii_digit() || b == b'.');
    if !is_decimal {
        return Decomposed::inline(wrap_neutral(rng, literal));
    }
    let is_integer = literal.bytes().all(|b| b.is_ascii_digit());
    if is_integer {
        return match literal.parse::<u64>() {
            Ok(value) if value < (1 << 53) => Decomposed::inline(decompose_integer(rng, value)),
            _ => Decomposed::inline(wrap_neutral(rng, literal)),
        };
    }
    match literal.parse::<f64>() {
        Ok(value) if value.is_finite() && (value == 0.0 || (1e-300..1e300).contains(&value)) => {
            Decomposed::inline(decompose_float(rng, value))
        }
        _ => Decomposed::inline(wrap_neutral(rng, literal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_integers_parse() {
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let text = random_integer(&mut rng);
            assert!(text.parse::<f64>().is_ok(), "{text}");
        }
    }

    #[test]
    fn bigints_are_integral() {
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let text = random_bigint(&mut rng);
            let digits = text.strip_suffix('n').unwrap();
            assert!(digits.parse::<i128>().is_ok(), "{text}");
        }
    }

    #[test]
    fn non_decimal_literals_are_wrapped() {
        let mut rng = StdRng::seed_from_u64(1);
        for literal in ["0x10", "0b11", "10n", "1_000"] {
            let decomposed = decompose_number(&mut rng, literal, None);
            assert!(decomposed.expression.starts_with(&format!("({literal} ")));
            assert_eq!(decomposed.prefix, None);
        }
    }

    #[test]
    fn helper_strategy_declares_the_value() {
        let mut rng = StdRng::seed_from_u64(0);
        let helper = (0..200)
            .map(|_| decompose_number(&mut rng, "-0", Some("var_9_")))
            .find(|decomposed| decomposed.prefix.is_some())
            .unwrap();
        assert_eq!(helper.expression, "var_9_");
        assert_eq!(helper.prefix.as_deref(), Some("var var_9_ = -0;"));
    }
}
