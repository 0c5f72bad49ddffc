use rand::Rng;
use rand::seq::IndexedRandom;

use super::arrays::random_array;
use super::numbers::{random_bigint, random_double, random_integer, random_number};
use super::strings::{random_string, random_string_literal};
use crate::types::{ElementKind, JsType};

/// Bytes of the smallest valid WebAssembly module.
const EMPTY_WASM_MODULE: &str = "new Uint8Array([0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00])";

const LOCALES: &[&str] = &["'en'", "'en-US'", "'de-DE'", "'ja-JP'", "'ar-EG'", "'zh-Hant-TW'", "undefined", "[]"];

fn locale<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    LOCALES.choose(rng).copied().unwrap_or("'en'")
}

fn small_length<R: Rng + ?Sized>(rng: &mut R) -> usize {
    if rng.random_bool(0.9) {
        rng.random_range(0..64)
    } else {
        rng.random_range(64..0x10000)
    }
}

fn element_literal<R: Rng + ?Sized>(rng: &mut R, kind: ElementKind) -> String {
    match kind {
        ElementKind::Integer { .. } => random_integer(rng),
        ElementKind::Float => random_number(rng),
        ElementKind::BigInt => random_bigint(rng),
    }
}

fn typed_array<R: Rng + ?Sized>(rng: &mut R, ty: JsType, kind: ElementKind) -> String {
    let name = ty.real_name();
    match rng.random_range(0..4) {
        0 => format!("new {name}({})", small_length(rng)),
        1 => {
            let count = rng.random_range(0..8);
            let items: Vec<String> = (0..count).map(|_| element_literal(rng, kind)).collect();
            format!("new {name}([{}])", items.join(", "))
        }
        2 => {
            let bytes = 8 * rng.random_range(1..16);
            format!("new {name}(new ArrayBuffer({bytes}))")
        }
        _ => {
            let bytes = 8 * rng.random_range(2..16);
            format!("new {name}(new ArrayBuffer({bytes}), 8)")
        }
    }
}

/// Source text creating a fresh value of type `ty`.
///
/// Every builtin gets constructor arguments that are valid for it, so the
/// expression does not throw on its own.
pub fn code_to_create_random_variable_with_datatype<R: Rng + ?Sized>(rng: &mut R, ty: JsType) -> String {
    match ty {
        JsType::Undefined => "undefined".to_string(),
        JsType::Null => "null".to_string(),
        JsType::RealNumber => random_number(rng),
        JsType::Boolean => rng.random_bool(0.5).to_string(),
        JsType::String => random_string_literal(rng),
        JsType::BigInt => random_bigint(rng),
        JsType::Symbol => format!("Symbol({})", random_string(rng, false)),
        JsType::Function => match rng.random_range(0..4) {
            0 => "function() {}".to_string(),
            1 => format!("function(a, b) {{ return a + {}; }}", random_integer(rng)),
            2 => "(x) => x".to_string(),
            _ => "async function() { await 1; }".to_string(),
        },
        JsType::Class => "class { constructor() { this.a = 1; } m() { return this.a; } }".to_string(),
        JsType::Object => match rng.random_range(0..4) {
            0 => "{}".to_string(),
            1 => format!("{{a: {}, b: {}}}", random_number(rng), random_string(rng, false)),
            2 => "Object.create(null)".to_string(),
            _ => format!("{{get x() {{ return {}; }}}}", random_integer(rng)),
        },
        JsType::Array => random_array(rng).code,
        JsType::RegExp => {
            let pattern = ["a+", "(a|b)*c", "\\d{2,}", "[^x]", "(?<n>.)\\k<n>", "^$", "\\u{1F600}"]
                .choose(rng)
                .copied()
                .unwrap_or("a");
            let flags = ["", "g", "i", "m", "y", "u", "gimsuy"].choose(rng).copied().unwrap_or("");
            format!("/{pattern}/{flags}")
        }
        JsType::Date => match rng.random_range(0..3) {
            0 => "new Date()".to_string(),
            1 => format!("new Date({})", random_integer(rng)),
            _ => "new Date(2000, 1, 29)".to_string(),
        },
        JsType::Error | JsType::TypeError | JsType::RangeError => {
            format!("new {}({})", ty.real_name(), random_string(rng, false))
        }
        JsType::Map => format!("new Map([[1, {}], ['a', {{}}]])", random_number(rng)),
        JsType::Set => format!("new Set([{}, {}])", random_number(rng), random_number(rng)),
        JsType::WeakMap => "new WeakMap([[{}, 1]])".to_string(),
        JsType::WeakSet => "new WeakSet([{}, []])".to_string(),
        JsType::WeakRef => "new WeakRef({})".to_string(),
        JsType::FinalizationRegistry => "new FinalizationRegistry(() => {})".to_string(),
        JsType::Promise => match rng.random_range(0..3) {
            0 => format!("Promise.resolve({})", random_number(rng)),
            1 => "new Promise((resolve) => resolve(1))".to_string(),
            _ => "Promise.reject(new Error()).catch(() => {})".to_string(),
        },
        JsType::Proxy => "new Proxy({}, { get(target, key) { return 1; } })".to_string(),
        JsType::ArrayBuffer => format!("new ArrayBuffer({})", small_length(rng)),
        JsType::SharedArrayBuffer => format!("new SharedArrayBuffer({})", small_length(rng)),
        JsType::DataView => {
            let bytes = 8 * rng.random_range(1..16);
            format!("new DataView(new ArrayBuffer({bytes}))")
        }
        JsType::IntlCollator => format!("new Intl.Collator({})", locale(rng)),
        JsType::IntlDateTimeFormat => format!("new Intl.DateTimeFormat({})", locale(rng)),
        JsType::IntlDisplayNames => format!("new Intl.DisplayNames({}, {{type: 'region'}})", locale(rng)),
        JsType::IntlListFormat => format!("new Intl.ListFormat({})", locale(rng)),
        JsType::IntlLocale => "new Intl.Locale('en-Latn-US')".to_string(),
        JsType::IntlNumberFormat => format!("new Intl.NumberFormat({})", locale(rng)),
        JsType::IntlPluralRules => format!("new Intl.PluralRules({})", locale(rng)),
        JsType::IntlRelativeTimeFormat => format!("new Intl.RelativeTimeFormat({})", locale(rng)),
        JsType::IntlSegmenter => format!("new Intl.Segmenter({})", locale(rng)),
        JsType::WebAssemblyMemory => {
            format!("new WebAssembly.Memory({{initial: {}}})", rng.random_range(0..4))
        }
        JsType::WebAssemblyTable => format!(
            "new WebAssembly.Table({{initial: {}, element: 'anyfunc'}})",
            rng.random_range(0..16)
        ),
        JsType::WebAssemblyGlobal => format!(
            "new WebAssembly.Global({{value: 'i32', mutable: true}}, {})",
            rng.random_range(-1000..1000)
        ),
        JsType::WebAssemblyModule => format!("new WebAssembly.Module({EMPTY_WASM_MODULE})"),
        JsType::WebAssemblyInstance => {
            format!("new WebAssembly.Instance(new WebAssembly.Module({EMPTY_WASM_MODULE}))")
        }
        JsType::Generator => format!(
            "(function*() {{ yield {}; yield {}; }})()",
            random_number(rng),
            random_double(rng)
        ),
        JsType::Int8Array
        | JsType::Uint8Array
        | JsType::Uint8ClampedArray
        | JsType::Int16Array
        | JsType::Uint16Array
        | JsType::Int32Array
        | JsType::Uint32Array
        | JsType::Float32Array
        | JsType::Float64Array
        | JsType::BigInt64Array
        | JsType::BigUint64Array => {
            let kind = ty.typed_array_element().unwrap_or(ElementKind::Float);
            typed_array(rng, ty, kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn array_buffer_has_an_integer_length() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let code = code_to_create_random_variable_with_datatype(&mut rng, JsType::ArrayBuffer);
            let length = code
                .strip_prefix("new ArrayBuffer(")
                .and_then(|rest| rest.strip_suffix(')'))
                .unwrap();
            assert!(length.parse::<u64>().is_ok(), "{code}");
        }
    }

    #[test]
    fn every_instantiable_type_produces_one_line() {
        let mut rng = StdRng::seed_from_u64(7);
        for ty in JsType::instantiable() {
            for _ in 0..5 {
                let code = code_to_create_random_variable_with_datatype(&mut rng, ty);
                assert!(!code.is_empty());
                assert!(!code.contains('\n'), "{ty}: {code}");
            }
        }
    }

    #[test]
    fn inferred_type_matches_for_constructors() {
        let mut rng = StdRng::seed_from_u64(3);
        for ty in [JsType::Map, JsType::Int32Array, JsType::IntlCollator, JsType::DataView] {
            let code = code_to_create_random_variable_with_datatype(&mut rng, ty);
            assert_eq!(crate::state::infer::literal_type(&code), Some(ty), "{code}");
        }
    }
}
