#![forbid(unsafe_code)]

//! Option-shape normalization, applied to a configuration before merging.
//!
//! Authors get three shorthands; everything downstream of the merge sees only
//! the canonical forms:
//!
//! - prop name lists become camelized descriptor maps,
//! - inject name lists become self-sourced descriptor maps,
//! - bare-function directives become `{ bind, update }` specs pointing at the
//!   same function.
//!
//! Normalization is idempotent: canonical input passes through unchanged
//! (modulo camelizing descriptor keys, which is itself idempotent).

use std::rc::Rc;

use ahash::AHashMap;

use reflow_core::camelize;

use crate::assets::Registry;
use crate::options::{
    DirectiveDecl, DirectiveSpec, InjectDecl, InjectSpec, Options, PropSpec, PropsDecl,
};

/// Normalize every shorthand on `options`.
pub fn normalize(options: &mut Options) {
    normalize_props(options);
    normalize_inject(options);
    normalize_directives(options);
}

/// Canonical descriptor map for a props declaration, normalizing on the fly
/// when handed a raw shape.
#[must_use]
pub(crate) fn props_specs(decl: &PropsDecl) -> Rc<AHashMap<String, PropSpec>> {
    match decl {
        PropsDecl::Specs(specs) => {
            if specs.keys().all(|key| !key.contains('-')) {
                return specs.clone();
            }
            Rc::new(specs.iter().map(|(k, v)| (camelize(k), v.clone())).collect())
        }
        PropsDecl::Names(names) => Rc::new(
            names
                .iter()
                .map(|name| (camelize(name), PropSpec::any()))
                .collect(),
        ),
    }
}

/// Canonical descriptor map for an inject declaration.
#[must_use]
pub(crate) fn inject_specs(decl: &InjectDecl) -> Rc<AHashMap<String, InjectSpec>> {
    match decl {
        InjectDecl::Specs(specs) => specs.clone(),
        InjectDecl::Names(names) => Rc::new(
            names
                .iter()
                .map(|name| {
                    (
                        name.clone(),
                        InjectSpec { from: name.clone(), default: None },
                    )
                })
                .collect(),
        ),
    }
}

fn normalize_props(options: &mut Options) {
    if let Some(decl) = &options.props {
        options.props = Some(PropsDecl::Specs(props_specs(decl)));
    }
}

fn normalize_inject(options: &mut Options) {
    if let Some(decl) = &options.inject {
        options.inject = Some(InjectDecl::Specs(inject_specs(decl)));
    }
}

fn normalize_directives(options: &mut Options) {
    let Some(registry) = &options.directives else {
        return;
    };
    let needs_rewrite = registry
        .local_clone()
        .values()
        .any(|decl| matches!(decl, DirectiveDecl::Func(_)));
    if !needs_rewrite {
        return;
    }
    let local = registry
        .local_clone()
        .into_iter()
        .map(|(name, decl)| {
            let normalized = match decl {
                DirectiveDecl::Func(f) => DirectiveDecl::Spec(Rc::new(DirectiveSpec {
                    bind: Some(f.clone()),
                    update: Some(f),
                })),
                spec @ DirectiveDecl::Spec(_) => spec,
            };
            (name, normalized)
        })
        .collect();
    options.directives = Some(Rc::new(Registry::layered(local, registry.parent())));
}
