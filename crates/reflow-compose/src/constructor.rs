#![forbid(unsafe_code)]

//! Component constructors: reusable definitions with cached option
//! resolution.
//!
//! A [`Constructor`] pairs authored options with an optional ancestor. Its
//! resolved options are cached; re-resolution happens only when the
//! ancestor's resolved options *identity* has changed (late-attached
//! options). On re-resolution, the keys that drifted from the sealed snapshot
//! are recovered into the extension options first — with hook lists deduped
//! by function identity against both the extension set and the sealed set —
//! so a hook function is never registered twice no matter how often the
//! chain re-resolves.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::merge::merge_options;
use crate::options::{HookFn, LifecycleHook, Options, hook_lists_identical};

/// A component definition object.
pub struct Constructor {
    weak_self: Weak<Constructor>,
    /// Resolved options (authored options for a base constructor, merged
    /// for a derived one).
    options: RefCell<Rc<Options>>,
    /// Ancestor constructor, if derived.
    sup: Option<Rc<Constructor>>,
    /// The ancestor's resolved options as of our last resolution.
    super_options: RefCell<Option<Rc<Options>>>,
    /// The authored extension options passed to `extend`.
    extend_options: RefCell<Rc<Options>>,
    /// Shallow snapshot of the merged options taken at `extend` time.
    sealed_options: RefCell<Option<Rc<Options>>>,
}

impl Constructor {
    /// A base (root) constructor wrapping authored options.
    #[must_use]
    pub fn base(options: Options) -> Rc<Constructor> {
        Rc::new_cyclic(|weak| Constructor {
            weak_self: weak.clone(),
            options: RefCell::new(Rc::new(options)),
            sup: None,
            super_options: RefCell::new(None),
            extend_options: RefCell::new(Rc::new(Options::default())),
            sealed_options: RefCell::new(None),
        })
    }

    /// Derive a constructor whose options extend this one's.
    #[must_use]
    pub fn extend(&self, extend_options: Options) -> Rc<Constructor> {
        let sup = self
            .weak_self
            .upgrade()
            .expect("constructors are always reference-counted");
        let super_options = self.resolve_options();
        let merged = Rc::new(merge_options(&super_options, &extend_options, None));
        tracing::debug!(
            target: "reflow",
            name = merged.name.as_deref().unwrap_or("<anonymous>"),
            "constructor derived"
        );
        Rc::new_cyclic(|weak| Constructor {
            weak_self: weak.clone(),
            options: RefCell::new(merged.clone()),
            sup: Some(sup),
            super_options: RefCell::new(Some(super_options)),
            extend_options: RefCell::new(Rc::new(extend_options)),
            sealed_options: RefCell::new(Some(Rc::new((*merged).clone()))),
        })
    }

    /// The ancestor this constructor derives from, if any.
    #[must_use]
    pub fn superclass(&self) -> Option<Rc<Constructor>> {
        self.sup.clone()
    }

    /// The currently cached options, without resolving.
    #[must_use]
    pub fn options(&self) -> Rc<Options> {
        self.options.borrow().clone()
    }

    /// Attach or change options after creation. The next [`resolve_options`]
    /// of any derived constructor picks the change up.
    ///
    /// [`resolve_options`]: Constructor::resolve_options
    pub fn mutate_options(&self, f: impl FnOnce(&mut Options)) {
        let mut options = (**self.options.borrow()).clone();
        f(&mut options);
        *self.options.borrow_mut() = Rc::new(options);
    }

    /// Resolved options, re-merging against the ancestor only when the
    /// ancestor's resolved options identity changed since last time.
    #[must_use]
    pub fn resolve_options(&self) -> Rc<Options> {
        let mut options = self.options.borrow().clone();
        let Some(sup) = &self.sup else {
            return options;
        };

        let super_options = sup.resolve_options();
        let cached = self.super_options.borrow().clone();
        let unchanged = cached.as_ref().is_some_and(|cached| Rc::ptr_eq(cached, &super_options));
        if !unchanged {
            tracing::debug!(target: "reflow", "ancestor options changed; re-resolving");
            *self.super_options.borrow_mut() = Some(super_options.clone());
            // Late-attached local changes survive the re-merge: fold the keys
            // that drifted from the sealed snapshot back into the extension
            // options.
            if let Some(modified) = self.resolve_modified_options() {
                let mut extended = (**self.extend_options.borrow()).clone();
                extended.overwrite_with(&modified);
                *self.extend_options.borrow_mut() = Rc::new(extended);
            }
            options = Rc::new(merge_options(
                &super_options,
                &self.extend_options.borrow(),
                None,
            ));
            *self.options.borrow_mut() = options.clone();
        }
        options
    }

    /// The keys of the cached options that differ, by identity, from the
    /// sealed snapshot. Hook lists are deduped so sealed (inherited) entries
    /// are not re-applied on top of the fresh ancestor merge.
    fn resolve_modified_options(&self) -> Option<Options> {
        let latest = self.options.borrow().clone();
        let sealed = self.sealed_options.borrow().clone()?;
        let extended = self.extend_options.borrow().clone();

        let mut modified = Options::default();
        let mut any = false;

        let no_hooks: Vec<HookFn> = Vec::new();
        for hook in LifecycleHook::ALL {
            let latest_hooks = latest.hooks.get(&hook);
            if !hook_lists_identical(latest_hooks, sealed.hooks.get(&hook)) {
                let deduped = dedupe_hooks(
                    latest_hooks.unwrap_or(&no_hooks),
                    extended.hooks.get(&hook),
                    sealed.hooks.get(&hook),
                );
                modified.hooks.insert(hook, deduped);
                any = true;
            }
        }

        macro_rules! diff_member {
            ($member:ident, $changed:expr) => {
                if $changed {
                    modified.$member = latest.$member.clone();
                    any = true;
                }
            };
        }

        diff_member!(name, latest.name != sealed.name);
        diff_member!(
            el,
            !option_eq(&latest.el, &sealed.el, |a, b| a.same(b))
        );
        diff_member!(
            props_data,
            !option_eq(&latest.props_data, &sealed.props_data, |a, b| a.same(b))
        );
        diff_member!(
            data,
            !option_eq(&latest.data, &sealed.data, |a, b| a.identity_eq(b))
        );
        diff_member!(
            provide,
            !option_eq(&latest.provide, &sealed.provide, |a, b| a.identity_eq(b))
        );
        diff_member!(
            props,
            !option_eq(&latest.props, &sealed.props, |a, b| a.identity_eq(b))
        );
        diff_member!(
            inject,
            !option_eq(&latest.inject, &sealed.inject, |a, b| a.identity_eq(b))
        );
        diff_member!(methods, !rc_option_eq(&latest.methods, &sealed.methods));
        diff_member!(computed, !rc_option_eq(&latest.computed, &sealed.computed));
        diff_member!(watch, !rc_option_eq(&latest.watch, &sealed.watch));
        diff_member!(components, !rc_option_eq(&latest.components, &sealed.components));
        diff_member!(directives, !rc_option_eq(&latest.directives, &sealed.directives));
        diff_member!(filters, !rc_option_eq(&latest.filters, &sealed.filters));

        for (key, value) in &latest.rest {
            let drifted = sealed.rest.get(key).is_none_or(|sealed_value| !sealed_value.same(value));
            if drifted {
                modified.rest.insert(key.clone(), value.clone());
                any = true;
            }
        }

        any.then_some(modified)
    }
}

fn option_eq<T>(a: &Option<T>, b: &Option<T>, eq: impl Fn(&T, &T) -> bool) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => eq(a, b),
        _ => false,
    }
}

fn rc_option_eq<T>(a: &Option<Rc<T>>, b: &Option<Rc<T>>) -> bool {
    option_eq(a, b, |a, b| Rc::ptr_eq(a, b))
}

/// Keep a hook from `latest` iff it came from the author's extension set or
/// is not already in the sealed snapshot — the sealed (inherited) entries
/// come back through the fresh ancestor merge, so re-applying them would
/// register them twice.
fn dedupe_hooks(
    latest: &[HookFn],
    extended: Option<&Vec<HookFn>>,
    sealed: Option<&Vec<HookFn>>,
) -> Vec<HookFn> {
    let in_list = |list: Option<&Vec<HookFn>>, hook: &HookFn| {
        list.is_some_and(|fns| fns.iter().any(|f| Rc::ptr_eq(f, hook)))
    };
    latest
        .iter()
        .filter(|hook| in_list(extended, hook) || !in_list(sealed, hook))
        .cloned()
        .collect()
}
