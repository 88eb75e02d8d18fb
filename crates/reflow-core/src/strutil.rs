#![forbid(unsafe_code)]

//! String utilities for option and asset names.
//!
//! `camelize` and `hyphenate` sit on hot lookup paths (asset resolution tries
//! multiple casings per miss), so both memoize results in a thread-local map.

use std::cell::RefCell;

use ahash::AHashMap;

thread_local! {
    static CAMELIZE_CACHE: RefCell<AHashMap<String, String>> = RefCell::new(AHashMap::new());
    static HYPHENATE_CACHE: RefCell<AHashMap<String, String>> = RefCell::new(AHashMap::new());
}

fn cached(cache: &'static std::thread::LocalKey<RefCell<AHashMap<String, String>>>, input: &str, f: impl FnOnce(&str) -> String) -> String {
    cache.with(|cache| {
        if let Some(hit) = cache.borrow().get(input) {
            return hit.clone();
        }
        let computed = f(input);
        cache.borrow_mut().insert(input.to_string(), computed.clone());
        computed
    })
}

/// Convert a hyphen-delimited name to camelCase: `my-prop` becomes `myProp`.
#[must_use]
pub fn camelize(name: &str) -> String {
    cached(&CAMELIZE_CACHE, name, |name| {
        let mut out = String::with_capacity(name.len());
        let mut upper_next = false;
        for ch in name.chars() {
            if ch == '-' {
                upper_next = true;
            } else if upper_next {
                out.extend(ch.to_uppercase());
                upper_next = false;
            } else {
                out.push(ch);
            }
        }
        out
    })
}

/// Uppercase the first character: `myProp` becomes `MyProp`.
#[must_use]
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Convert a camelCase name to hyphen-delimited: `myProp` becomes `my-prop`.
#[must_use]
pub fn hyphenate(name: &str) -> String {
    cached(&HYPHENATE_CACHE, name, |name| {
        let mut out = String::with_capacity(name.len() + 2);
        for (i, ch) in name.chars().enumerate() {
            if ch.is_ascii_uppercase() && i > 0 {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
        }
        out
    })
}

/// Whether `name` is one of the runtime's built-in component tags.
/// Matching is case-insensitive.
#[must_use]
pub fn is_builtin_tag(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "slot" || lower == "component"
}
