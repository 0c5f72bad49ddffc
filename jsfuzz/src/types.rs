//! The closed set of dynamic JavaScript value categories the engine reasons about.
//!
//! Fact tables, the operation database and the value generators are all keyed by
//! [`JsType`]. A type serializes as its lower-case name (`"real_number"`,
//! `"int8array"`, `"intl.collator"`), which is also the key used by corpora and
//! operation databases produced by the preprocessing tooling.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

macro_rules! js_types {
    ($($variant:ident => $lower:literal, $real:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum JsType {
            $($variant,)*
        }

        impl JsType {
            /// Every known type, in declaration order.
            pub const ALL: &'static [JsType] = &[$(JsType::$variant,)*];

            /// The lower-case name used as database and fact-table key.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(JsType::$variant => $lower,)*
                }
            }

            /// The constructor (or keyword) spelling in JavaScript source.
            pub fn real_name(self) -> &'static str {
                match self {
                    $(JsType::$variant => $real,)*
                }
            }
        }
    };
}

js_types! {
    Undefined => "undefined", "undefined";
    Null => "null", "null";
    RealNumber => "real_number", "Number";
    Boolean => "boolean", "Boolean";
    String => "string", "String";
    BigInt => "bigint", "BigInt";
    Symbol => "symbol", "Symbol";
    Function => "function", "Function";
    Class => "class", "class";
    Object => "object", "Object";
    Array => "array", "Array";
    RegExp => "regexp", "RegExp";
    Date => "date", "Date";
    Error => "error", "Error";
    TypeError => "typeerror", "TypeError";
    RangeError => "rangeerror", "RangeError";
    Map => "map", "Map";
    Set => "set", "Set";
    WeakMap => "weakmap", "WeakMap";
    WeakSet => "weakset", "WeakSet";
    WeakRef => "weakref", "WeakRef";
    FinalizationRegistry => "finalizationregistry", "FinalizationRegistry";
    Promise => "promise", "Promise";
    Proxy => "proxy", "Proxy";
    ArrayBuffer => "arraybuffer", "ArrayBuffer";
    SharedArrayBuffer => "sharedarraybuffer", "SharedArrayBuffer";
    DataView => "dataview", "DataView";
    Int8Array => "int8array", "Int8Array";
    Uint8Array => "uint8array", "Uint8Array";
    Uint8ClampedArray => "uint8clampedarray", "Uint8ClampedArray";
    Int16Array => "int16array", "Int16Array";
    Uint16Array => "uint16array", "Uint16Array";
    Int32Array => "int32array", "Int32Array";
    Uint32Array => "uint32array", "Uint32Array";
    Float32Array => "float32array", "Float32Array";
    Float64Array => "float64array", "Float64Array";
    BigInt64Array => "bigint64array", "BigInt64Array";
    BigUint64Array => "biguint64array", "BigUint64Array";
    IntlCollator => "intl.collator", "Intl.Collator";
    IntlDateTimeFormat => "intl.datetimeformat", "Intl.DateTimeFormat";
    IntlDisplayNames => "intl.displaynames", "Intl.DisplayNames";
    IntlListFormat => "intl.listformat", "Intl.ListFormat";
    IntlLocale => "intl.locale", "Intl.Locale";
    IntlNumberFormat => "intl.numberformat", "Intl.NumberFormat";
    IntlPluralRules => "intl.pluralrules", "Intl.PluralRules";
    IntlRelativeTimeFormat => "intl.relativetimeformat", "Intl.RelativeTimeFormat";
    IntlSegmenter => "intl.segmenter", "Intl.Segmenter";
    WebAssemblyMemory => "webassembly.memory", "WebAssembly.Memory";
    WebAssemblyTable => "webassembly.table", "WebAssembly.Table";
    WebAssemblyGlobal => "webassembly.global", "WebAssembly.Global";
    WebAssemblyModule => "webassembly.module", "WebAssembly.Module";
    WebAssemblyInstance => "webassembly.instance", "WebAssembly.Instance";
    Generator => "generator", "Generator";
}

/// Element representation of a typed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Integer { bits: u8, signed: bool },
    Float,
    BigInt,
}

static BY_NAME: Lazy<BTreeMap<String, JsType>> = Lazy::new(|| {
    let mut names = BTreeMap::new();
    for &ty in JsType::ALL {
        names.insert(ty.as_str().to_string(), ty);
        names.insert(ty.real_name().to_ascii_lowercase(), ty);
    }
    // Corpora produced by older tooling spell numbers and errors differently.
    names.insert("number".to_string(), JsType::RealNumber);
    names.insert("int".to_string(), JsType::RealNumber);
    names
});

impl JsType {
    pub fn is_typed_array(self) -> bool {
        self.typed_array_element().is_some()
    }

    pub fn typed_array_element(self) -> Option<ElementKind> {
        use ElementKind::*;
        match self {
            JsType::Int8Array => Some(Integer { bits: 8, signed: true }),
            JsType::Uint8Array | JsType::Uint8ClampedArray => Some(Integer { bits: 8, signed: false }),
            JsType::Int16Array => Some(Integer { bits: 16, signed: true }),
            JsType::Uint16Array => Some(Integer { bits: 16, signed: false }),
            JsType::Int32Array => Some(Integer { bits: 32, signed: true }),
            JsType::Uint32Array => Some(Integer { bits: 32, signed: false }),
            JsType::Float32Array | JsType::Float64Array => Some(Float),
            JsType::BigInt64Array | JsType::BigUint64Array => Some(BigInt),
            _ => None,
        }
    }

    /// Arrays and typed arrays: indexable with a `length`.
    pub fn is_array_like(self) -> bool {
        self == JsType::Array || self.is_typed_array()
    }

    /// Values that cannot carry own properties or a prototype change.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            JsType::Undefined
                | JsType::Null
                | JsType::RealNumber
                | JsType::Boolean
                | JsType::String
                | JsType::BigInt
                | JsType::Symbol
        )
    }

    /// Types a mutator may create a fresh variable of. `undefined` and `null`
    /// variables are never interesting targets.
    pub fn is_instantiable(self) -> bool {
        !matches!(self, JsType::Undefined | JsType::Null)
    }

    /// Every type a fresh variable can be created for.
    pub fn instantiable() -> impl Iterator<Item = JsType> {
        JsType::ALL.iter().copied().filter(|ty| ty.is_instantiable())
    }
}

impl fmt::Display for JsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownType(pub String);

impl fmt::Display for UnknownType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown JavaScript type `{}`", self.0)
    }
}

impl std::error::Error for UnknownType {}

impl FromStr for JsType {
    type Err = UnknownType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BY_NAME
            .get(&s.trim().to_ascii_lowercase())
            .copied()
            .ok_or_else(|| UnknownType(s.to_string()))
    }
}

impl Serialize for JsType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JsType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for &ty in JsType::ALL {
            assert_eq!(ty.as_str().parse::<JsType>(), Ok(ty));
            assert_eq!(ty.real_name().parse::<JsType>(), Ok(ty), "{ty}");
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("ArrayBuffer".parse::<JsType>(), Ok(JsType::ArrayBuffer));
        assert_eq!("INT8ARRAY".parse::<JsType>(), Ok(JsType::Int8Array));
        assert_eq!("Intl.Collator".parse::<JsType>(), Ok(JsType::IntlCollator));
        assert!("no_such_type".parse::<JsType>().is_err());
    }

    #[test]
    fn typed_arrays_are_array_like() {
        assert!(JsType::Float64Array.is_array_like());
        assert!(JsType::Array.is_array_like());
        assert!(!JsType::ArrayBuffer.is_array_like());
        assert_eq!(JsType::BigInt64Array.typed_array_element(), Some(ElementKind::BigInt));
    }
}
