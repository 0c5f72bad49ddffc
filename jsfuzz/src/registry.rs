//! Property and method tables for the builtin types.
//!
//! A [`TypeRegistry`] is built once and handed by reference to every component
//! that needs to know what can be done with a value of a given [`JsType`]. Tests
//! can build a registry with only the entries they care about.

use std::collections::BTreeMap;

use crate::types::JsType;

/// A callable method of a builtin type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    pub name: &'static str,
    pub arity: usize,
}

const fn m(name: &'static str, arity: usize) -> Method {
    Method { name, arity }
}

#[derive(Debug, Clone)]
pub struct TypeRegistry {
    properties: BTreeMap<JsType, Vec<&'static str>>,
    methods: BTreeMap<JsType, Vec<Method>>,
}

const OBJECT_METHODS: &[Method] = &[
    m("hasOwnProperty", 1),
    m("isPrototypeOf", 1),
    m("propertyIsEnumerable", 1),
    m("toLocaleString", 0),
    m("toString", 0),
    m("valueOf", 0),
];

const ARRAY_METHODS: &[Method] = &[
    m("at", 1),
    m("concat", 1),
    m("copyWithin", 3),
    m("entries", 0),
    m("fill", 3),
    m("flat", 1),
    m("includes", 2),
    m("indexOf", 2),
    m("join", 1),
    m("keys", 0),
    m("lastIndexOf", 2),
    m("pop", 0),
    m("push", 1),
    m("reverse", 0),
    m("shift", 0),
    m("slice", 2),
    m("sort", 0),
    m("splice", 3),
    m("toReversed", 0),
    m("toSorted", 0),
    m("toSpliced", 3),
    m("unshift", 1),
    m("values", 0),
    m("with", 2),
];

const TYPED_ARRAY_METHODS: &[Method] = &[
    m("at", 1),
    m("copyWithin", 3),
    m("entries", 0),
    m("fill", 3),
    m("includes", 2),
    m("indexOf", 2),
    m("join", 1),
    m("lastIndexOf", 2),
    m("reverse", 0),
    m("set", 2),
    m("slice", 2),
    m("sort", 0),
    m("subarray", 2),
    m("toReversed", 0),
    m("toSorted", 0),
    m("with", 2),
];

const STRING_METHODS: &[Method] = &[
    m("at", 1),
    m("charAt", 1),
    m("charCodeAt", 1),
    m("codePointAt", 1),
    m("concat", 1),
    m("endsWith", 1),
    m("includes", 1),
    m("indexOf", 1),
    m("isWellFormed", 0),
    m("localeCompare", 1),
    m("normalize", 1),
    m("padEnd", 2),
    m("padStart", 2),
    m("repeat", 1),
    m("replace", 2),
    m("replaceAll", 2),
    m("slice", 2),
    m("split", 2),
    m("startsWith", 1),
    m("substring", 2),
    m("toLowerCase", 0),
    m("toUpperCase", 0),
    m("toWellFormed", 0),
    m("trim", 0),
];

const NUMBER_METHODS: &[Method] = &[
    m("toExponential", 1),
    m("toFixed", 1),
    m("toPrecision", 1),
    m("toString", 1),
    m("toLocaleString", 0),
];

const MAP_METHODS: &[Method] = &[
    m("clear", 0),
    m("delete", 1),
    m("entries", 0),
    m("forEach", 1),
    m("get", 1),
    m("has", 1),
    m("keys", 0),
    m("set", 2),
    m("values", 0),
];

const SET_METHODS: &[Method] = &[
    m("add", 1),
    m("clear", 0),
    m("delete", 1),
    m("entries", 0),
    m("has", 1),
    m("values", 0),
];

const ARRAY_BUFFER_METHODS: &[Method] = &[m("resize", 1), m("slice", 2), m("transfer", 1)];

const DATA_VIEW_METHODS: &[Method] = &[
    m("getInt8", 1),
    m("getUint16", 2),
    m("getInt32", 2),
    m("getFloat32", 2),
    m("getFloat64", 2),
    m("getBigInt64", 2),
    m("setInt8", 2),
    m("setUint16", 3),
    m("setInt32", 3),
    m("setFloat32", 3),
    m("setFloat64", 3),
    m("setBigInt64", 3),
];

const REGEXP_METHODS: &[Method] = &[m("exec", 1), m("test", 1), m("toString", 0)];

const DATE_METHODS: &[Method] = &[
    m("getDate", 0),
    m("getTime", 0),
    m("setFullYear", 1),
    m("setTime", 1),
    m("toISOString", 0),
    m("toJSON", 0),
];

const PROMISE_METHODS: &[Method] = &[m("then", 2), m("catch", 1), m("finally", 1)];

const FUNCTION_METHODS: &[Method] = &[m("apply", 2), m("bind", 1), m("call", 1), m("toString", 0)];

const BIGINT_METHODS: &[Method] = &[m("toString", 1), m("toLocaleString", 0), m("valueOf", 0)];

const GENERATOR_METHODS: &[Method] = &[m("next", 1), m("return", 1), m("throw", 1)];

const WEAK_REF_METHODS: &[Method] = &[m("deref", 0)];

const FINALIZATION_REGISTRY_METHODS: &[Method] = &[m("register", 2), m("unregister", 1)];

const INTL_METHODS: &[Method] = &[m("resolvedOptions", 0)];

const WASM_MEMORY_METHODS: &[Method] = &[m("grow", 1)];

const WASM_GLOBAL_METHODS: &[Method] = &[m("valueOf", 0)];

const WRAPPER_METHODS: &[Method] = &[m("toString", 0), m("valueOf", 0)];

const WASM_TABLE_METHODS: &[Method] = &[m("get", 1), m("grow", 1), m("set", 2)];

fn builtin_methods(ty: JsType) -> &'static [Method] {
    match ty {
        JsType::Undefined | JsType::Null => &[],
        JsType::RealNumber => NUMBER_METHODS,
        JsType::Boolean | JsType::Symbol => WRAPPER_METHODS,
        JsType::String => STRING_METHODS,
        JsType::BigInt => BIGINT_METHODS,
        JsType::Function | JsType::Class => FUNCTION_METHODS,
        JsType::Object
        | JsType::Proxy
        | JsType::Error
        | JsType::TypeError
        | JsType::RangeError
        | JsType::WebAssemblyModule
        | JsType::WebAssemblyInstance => OBJECT_METHODS,
        JsType::Array => ARRAY_METHODS,
        JsType::RegExp => REGEXP_METHODS,
        JsType::Date => DATE_METHODS,
        JsType::Map | JsType::WeakMap => MAP_METHODS,
        JsType::Set | JsType::WeakSet => SET_METHODS,
        JsType::WeakRef => WEAK_REF_METHODS,
        JsType::FinalizationRegistry => FINALIZATION_REGISTRY_METHODS,
        JsType::Promise => PROMISE_METHODS,
        JsType::ArrayBuffer | JsType::SharedArrayBuffer => ARRAY_BUFFER_METHODS,
        JsType::DataView => DATA_VIEW_METHODS,
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
        | JsType::BigUint64Array => TYPED_ARRAY_METHODS,
        JsType::IntlCollator
        | JsType::IntlDateTimeFormat
        | JsType::IntlDisplayNames
        | JsType::IntlListFormat
        | JsType::IntlLocale
        | JsType::IntlNumberFormat
        | JsType::IntlPluralRules
        | JsType::IntlRelativeTimeFormat
        | JsType::IntlSegmenter => INTL_METHODS,
        JsType::WebAssemblyMemory => WASM_MEMORY_METHODS,
        JsType::WebAssemblyTable => WASM_TABLE_METHODS,
        JsType::WebAssemblyGlobal => WASM_GLOBAL_METHODS,
        JsType::Generator => GENERATOR_METHODS,
    }
}

fn builtin_properties(ty: JsType) -> &'static [&'static str] {
    match ty {
        JsType::Undefined | JsType::Null | JsType::RealNumber | JsType::Boolean => &[],
        JsType::String => &["length"],
        JsType::Array => &["length", "constructor", "__proto__"],
        JsType::Function | JsType::Class => &["length", "name", "prototype"],
        JsType::RegExp => &["lastIndex", "source", "flags", "global", "sticky"],
        JsType::Map | JsType::Set => &["size"],
        JsType::ArrayBuffer | JsType::SharedArrayBuffer => &["byteLength", "maxByteLength", "resizable"],
        JsType::DataView => &["buffer", "byteLength", "byteOffset"],
        JsType::Error | JsType::TypeError | JsType::RangeError => &["message", "name", "stack"],
        JsType::WebAssemblyMemory => &["buffer"],
        JsType::WebAssemblyTable => &["length"],
        JsType::WebAssemblyGlobal => &["value"],
        ty if ty.is_typed_array() => &["length", "buffer", "byteLength", "byteOffset"],
        _ => &["constructor", "__proto__"],
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TypeRegistry {
    /// A registry with no entries.
    pub fn empty() -> Self {
        Self {
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    /// The registry describing the builtin JavaScript types.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for &ty in JsType::ALL {
            registry.properties.insert(ty, builtin_properties(ty).to_vec());
            registry.methods.insert(ty, builtin_methods(ty).to_vec());
        }
        registry
    }

    pub fn with_methods(mut self, ty: JsType, methods: &[Method]) -> Self {
        self.methods.insert(ty, methods.to_vec());
        self
    }

    pub fn with_properties(mut self, ty: JsType, properties: &[&'static str]) -> Self {
        self.properties.insert(ty, properties.to_vec());
        self
    }

    pub fn methods(&self, ty: JsType) -> &[Method] {
        self.methods.get(&ty).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn properties(&self, ty: JsType) -> &[&'static str] {
        self.properties.get(&ty).map(Vec::as_slice).unwrap_or_default()
    }

    /// The `<Constructor>.prototype` expression for a type, if it has one.
    pub fn prototype_expression(&self, ty: JsType) -> Option<String> {
        match ty {
            JsType::Undefined | JsType::Null | JsType::Class => None,
            JsType::Generator => Some("Object.getPrototypeOf(function*() {}).prototype".to_string()),
            _ => Some(format!("{}.prototype", ty.real_name())),
        }
    }
}

/// Engine debug-build intrinsics used by the optimization and garbage
/// collection mutators. The default is V8's `%`-natives surface
/// (requires `--allow-natives-syntax --expose-gc`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineIntrinsics {
    pub prepare_for_optimization: Option<String>,
    pub optimize_on_next_call: Option<String>,
    pub never_optimize: Option<String>,
    pub deoptimize: Option<String>,
    pub garbage_collect: Option<String>,
}

impl Default for EngineIntrinsics {
    fn default() -> Self {
        Self::v8()
    }
}

impl EngineIntrinsics {
    pub fn v8() -> Self {
        Self {
            prepare_for_optimization: Some("%PrepareFunctionForOptimization".to_string()),
            optimize_on_next_call: Some("%OptimizeFunctionOnNextCall".to_string()),
            never_optimize: Some("%NeverOptimizeFunction".to_string()),
            deoptimize: Some("%DeoptimizeFunction".to_string()),
            garbage_collect: Some("gc".to_string()),
        }
    }

    /// No intrinsics at all: the optimization mutators fall back to hot loops.
    pub fn none() -> Self {
        Self {
            prepare_for_optimization: None,
            optimize_on_next_call: None,
            never_optimize: None,
            deoptimize: None,
            garbage_collect: None,
        }
    }
}
