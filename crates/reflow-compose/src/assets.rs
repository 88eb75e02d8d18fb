#![forbid(unsafe_code)]

//! Asset registries: components, directives, filters.
//!
//! A merged registry is an explicit two-level structure — a local map layered
//! over an ancestor chain — instead of delegation through object prototypes.
//! Overriding one asset in a child therefore never hides the rest of the
//! inherited registry, and lookup falls through ancestors exactly once per
//! name variant.

use std::rc::Rc;

use ahash::AHashMap;

use reflow_core::{camelize, capitalize, is_builtin_tag, warn};

use crate::options::{DefRef, DirectiveDecl, FilterFn, Options};

/// A local asset map plus an optional ancestor chain.
#[derive(Clone)]
pub struct Registry<T> {
    local: AHashMap<String, T>,
    parent: Option<Rc<Registry<T>>>,
}

impl<T: Clone> Registry<T> {
    #[must_use]
    pub fn new() -> Self {
        Registry { local: AHashMap::new(), parent: None }
    }

    /// A flat registry from a prepared map.
    #[must_use]
    pub fn from_map(local: AHashMap<String, T>) -> Self {
        Registry { local, parent: None }
    }

    /// A registry layering `local` entries over an ancestor chain.
    #[must_use]
    pub fn layered(local: AHashMap<String, T>, parent: Option<Rc<Registry<T>>>) -> Self {
        Registry { local, parent }
    }

    /// Snapshot of the local (own) layer.
    #[must_use]
    pub fn local_clone(&self) -> AHashMap<String, T> {
        self.local.clone()
    }

    /// Names registered on the local layer.
    #[must_use]
    pub fn local_names(&self) -> Vec<String> {
        self.local.keys().cloned().collect()
    }

    #[must_use]
    pub fn get_local(&self, name: &str) -> Option<&T> {
        self.local.get(name)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<Registry<T>>> {
        self.parent.clone()
    }

    /// Look `id` up as written, then camelized, then PascalCase — each
    /// variant first on the local layer, then down the ancestor chain.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<T> {
        let camel = camelize(id);
        let pascal = capitalize(&camel);
        let variants = [id, camel.as_str(), pascal.as_str()];

        for key in variants {
            if let Some(found) = self.local.get(key) {
                return Some(found.clone());
            }
        }
        for key in variants {
            let mut ancestor = self.parent.clone();
            while let Some(registry) = ancestor {
                if let Some(found) = registry.local.get(key) {
                    return Some(found.clone());
                }
                ancestor = registry.parent.clone();
            }
        }
        None
    }
}

impl<T: Clone> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, T: Clone> FromIterator<(K, T)> for Registry<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Registry::from_map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ─── Asset resolution ────────────────────────────────────────────────────────

/// Which registry an asset lookup targets.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AssetKind {
    Component,
    Directive,
    Filter,
}

impl AssetKind {
    fn label(self) -> &'static str {
        match self {
            AssetKind::Component => "component",
            AssetKind::Directive => "directive",
            AssetKind::Filter => "filter",
        }
    }
}

/// A resolved asset.
#[derive(Clone)]
pub enum Asset {
    Component(DefRef),
    Directive(DirectiveDecl),
    Filter(FilterFn),
}

/// Look up an asset by name in the merged options, trying the exact id, its
/// camelized form, and its PascalCase form before falling through the
/// ancestor chain. A miss is reported (never fatal) when `warn_missing` is
/// set.
#[must_use]
pub fn resolve_asset(options: &Options, kind: AssetKind, id: &str, warn_missing: bool) -> Option<Asset> {
    let found = match kind {
        AssetKind::Component => options
            .components
            .as_ref()
            .and_then(|registry| registry.resolve(id))
            .map(Asset::Component),
        AssetKind::Directive => options
            .directives
            .as_ref()
            .and_then(|registry| registry.resolve(id))
            .map(Asset::Directive),
        AssetKind::Filter => options
            .filters
            .as_ref()
            .and_then(|registry| registry.resolve(id))
            .map(Asset::Filter),
    };
    if found.is_none() && warn_missing {
        warn(&format!("failed to resolve {}: {id}", kind.label()));
    }
    found
}

/// Report component names that collide with built-in or host-reserved tag
/// names. Registration proceeds regardless.
pub(crate) fn check_components(options: &Options) {
    if let Some(components) = &options.components {
        for name in components.local_names() {
            let lower = name.to_lowercase();
            if is_builtin_tag(&lower) || reflow_core::config::is_reserved_tag(&lower) {
                warn(&format!(
                    "do not use built-in or reserved tag names as component ids: {name}"
                ));
            }
        }
    }
}
