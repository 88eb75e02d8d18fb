#![forbid(unsafe_code)]

//! The options merge engine.
//!
//! [`merge_options`] folds a child configuration into a parent one: the
//! child's `extends` target first, then its mixins in array order, then the
//! child itself. For every option key a merge strategy keyed by the closed
//! [`OptionKey`] set decides the final value; the strategy table is an
//! exhaustive `match`, so no recognized key can lack a strategy.
//!
//! # Strategies
//!
//! - **data / provide** — normalized into one producer that deep-merges the
//!   instance-level result over the parent-level result; keys only on the
//!   parent side are copied in through the reactive [`reflow_reactive::set`],
//!   so a merge into an already-reactive target notifies.
//! - **lifecycle hooks** — concatenated, ancestor hooks before descendant
//!   hooks.
//! - **components / directives / filters** — the child's own entries layered
//!   over the parent registry chain.
//! - **watch** — per-key concatenation; ancestors watching the same key all
//!   keep their handlers.
//! - **props / methods / inject / computed** — shallow union, child entries
//!   win on conflict.
//! - **el / propsData** — legal only with a live instance; otherwise reported
//!   and handled by the default strategy.
//! - **everything else** — child value if present, else parent value.

use std::rc::Rc;

use ahash::AHashMap;

use reflow_core::warn;
use reflow_reactive::{MapRef, Value};

use crate::assets::{Registry, check_components};
use crate::instance::Instance;
use crate::normalize::{self, inject_specs, props_specs};
use crate::options::{
    DataSource, HookFn, InjectDecl, LifecycleHook, OptionKey, Options, PropsDecl, WatchMap,
};

/// How one option key combines a parent and a child value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MergeStrategy {
    /// Child value if present, else parent value.
    Default,
    /// Default, but reported when no instance is being created.
    InstanceOnly,
    /// Normalize both sides into one deep-merging producer function.
    DataOrFn,
    /// Concatenate, parent entries first.
    Hook,
    /// Layer the child registry over the parent chain.
    Assets,
    /// Union per key; both sides' handlers are kept.
    Watch,
    /// Shallow union; child entries override.
    MappingUnion,
}

/// The strategy for a given option key. Exhaustive over [`OptionKey`]:
/// adding a key without choosing a strategy does not compile.
#[must_use]
pub fn strategy(key: &OptionKey) -> MergeStrategy {
    match key {
        OptionKey::Data | OptionKey::Provide => MergeStrategy::DataOrFn,
        OptionKey::El | OptionKey::PropsData => MergeStrategy::InstanceOnly,
        OptionKey::Hook(_) => MergeStrategy::Hook,
        OptionKey::Components | OptionKey::Directives | OptionKey::Filters => MergeStrategy::Assets,
        OptionKey::Watch => MergeStrategy::Watch,
        OptionKey::Props | OptionKey::Methods | OptionKey::Inject | OptionKey::Computed => {
            MergeStrategy::MappingUnion
        }
        OptionKey::Name | OptionKey::Custom(_) => MergeStrategy::Default,
    }
}

/// Merge two configurations into a new one. The core utility behind both
/// definition composition (`extends`, mixins, constructor derivation — no
/// `instance`) and instantiation (with an `instance`).
#[must_use]
pub fn merge_options(parent: &Options, child: &Options, instance: Option<&Instance>) -> Options {
    check_components(child);

    let mut child = child.clone();
    normalize::normalize(&mut child);
    let mut parent = parent.clone();
    normalize::normalize(&mut parent);

    if let Some(extends) = child.extends.clone() {
        parent = merge_options(&parent, &extends.options(), instance);
    }
    for mixin in child.mixins.clone() {
        parent = merge_options(&parent, &mixin.options(), instance);
    }

    let mut merged = Options::default();

    // Default strategy.
    merged.name = default_strat(&parent.name, &child.name);
    for key in parent.rest.keys().chain(child.rest.keys()) {
        if merged.rest.contains_key(key) {
            continue;
        }
        let value = default_strat(&parent.rest.get(key).cloned(), &child.rest.get(key).cloned());
        if let Some(value) = value {
            merged.rest.insert(key.clone(), value);
        }
    }

    // Instance-only options.
    merged.el = instance_only_strat("el", &parent.el, &child.el, instance);
    merged.props_data = instance_only_strat("props_data", &parent.props_data, &child.props_data, instance);

    // Data and provide.
    let child_data = match (&child.data, instance) {
        (Some(DataSource::Value(_)), None) => {
            warn(
                "the data option must be a function returning a fresh state mapping per \
                 instance when declared on a component definition",
            );
            None
        }
        (data, _) => data.clone(),
    };
    merged.data = merge_data_or_fn(&parent.data, &child_data);
    merged.provide = merge_data_or_fn(&parent.provide, &child.provide);

    // Lifecycle hooks: ancestors first.
    for hook in LifecycleHook::ALL {
        if let Some(fns) = merge_hook(parent.hooks.get(&hook), child.hooks.get(&hook)) {
            merged.hooks.insert(hook, fns);
        }
    }

    // Asset registries.
    merged.components = merge_assets(&parent.components, &child.components);
    merged.directives = merge_assets(&parent.directives, &child.directives);
    merged.filters = merge_assets(&parent.filters, &child.filters);

    // Watch: union of keys, concatenated handlers.
    merged.watch = merge_watch(&parent.watch, &child.watch);

    // Shallow mapping unions.
    merged.props = merge_props(&parent.props, &child.props);
    merged.inject = merge_inject(&parent.inject, &child.inject);
    merged.methods = merge_mapping(&parent.methods, &child.methods);
    merged.computed = merge_mapping(&parent.computed, &child.computed);

    merged
}

fn default_strat<T: Clone>(parent: &Option<T>, child: &Option<T>) -> Option<T> {
    child.clone().or_else(|| parent.clone())
}

fn instance_only_strat<T: Clone>(
    key: &str,
    parent: &Option<T>,
    child: &Option<T>,
    instance: Option<&Instance>,
) -> Option<T> {
    if instance.is_none() && (parent.is_some() || child.is_some()) {
        warn(&format!("option \"{key}\" can only be used during instance creation"));
    }
    default_strat(parent, child)
}

fn merge_hook(parent: Option<&Vec<HookFn>>, child: Option<&Vec<HookFn>>) -> Option<Vec<HookFn>> {
    match (parent, child) {
        (None, None) => None,
        (Some(parent), None) => Some(parent.clone()),
        (None, Some(child)) => Some(child.clone()),
        (Some(parent), Some(child)) => Some(parent.iter().chain(child).cloned().collect()),
    }
}

fn merge_assets<T: Clone>(
    parent: &Option<Rc<Registry<T>>>,
    child: &Option<Rc<Registry<T>>>,
) -> Option<Rc<Registry<T>>> {
    match (parent, child) {
        (None, None) => None,
        (None, Some(child)) => Some(child.clone()),
        (Some(parent), None) => Some(Rc::new(Registry::layered(AHashMap::new(), Some(parent.clone())))),
        (Some(parent), Some(child)) => Some(Rc::new(Registry::layered(
            child.local_clone(),
            Some(parent.clone()),
        ))),
    }
}

fn merge_watch(parent: &Option<Rc<WatchMap>>, child: &Option<Rc<WatchMap>>) -> Option<Rc<WatchMap>> {
    match (parent, child) {
        (None, None) => None,
        (Some(parent), None) => Some(parent.clone()),
        (None, Some(child)) => Some(child.clone()),
        (Some(parent), Some(child)) => {
            let mut merged: WatchMap = (**parent).clone();
            for (key, specs) in child.iter() {
                merged.entry(key.clone()).or_default().extend(specs.iter().cloned());
            }
            Some(Rc::new(merged))
        }
    }
}

fn merge_mapping<V: Clone>(
    parent: &Option<Rc<AHashMap<String, V>>>,
    child: &Option<Rc<AHashMap<String, V>>>,
) -> Option<Rc<AHashMap<String, V>>> {
    match (parent, child) {
        (None, None) => None,
        (Some(parent), None) => Some(parent.clone()),
        (None, Some(child)) => Some(child.clone()),
        (Some(parent), Some(child)) => {
            let mut merged = (**parent).clone();
            for (key, value) in child.iter() {
                merged.insert(key.clone(), value.clone());
            }
            Some(Rc::new(merged))
        }
    }
}

fn merge_props(parent: &Option<PropsDecl>, child: &Option<PropsDecl>) -> Option<PropsDecl> {
    let parent = parent.as_ref().map(props_specs);
    let child = child.as_ref().map(props_specs);
    merge_mapping(&parent, &child).map(PropsDecl::Specs)
}

fn merge_inject(parent: &Option<InjectDecl>, child: &Option<InjectDecl>) -> Option<InjectDecl> {
    let parent = parent.as_ref().map(inject_specs);
    let child = child.as_ref().map(inject_specs);
    merge_mapping(&parent, &child).map(InjectDecl::Specs)
}

// ─── Data merging ────────────────────────────────────────────────────────────

/// Normalize a parent and child data source into one producer. With both
/// present, the producer evaluates the child (instance-level) result, the
/// parent (default-level) result, and deep-merges the former over the
/// latter.
#[must_use]
pub fn merge_data_or_fn(
    parent: &Option<DataSource>,
    child: &Option<DataSource>,
) -> Option<DataSource> {
    match (parent, child) {
        (None, None) => None,
        (parent, None) => parent.clone(),
        (None, child) => child.clone(),
        (Some(parent), Some(child)) => {
            let parent = parent.clone();
            let child = child.clone();
            Some(DataSource::func(move |instance: &Instance| {
                let instance_data = child.resolve(instance);
                let default_data = parent.resolve(instance);
                if instance_data.is_null() {
                    default_data
                } else {
                    merge_data(&instance_data, &default_data)
                }
            }))
        }
    }
}

/// Deep-merge `from` into `to` and return `to`.
///
/// For every key of `from`: absent on `to` → copied in through the reactive
/// [`reflow_reactive::set`] (an observed `to` notifies); present on both with
/// both sub-values plain mappings → recursive merge; present otherwise →
/// `to`'s value wins. Non-mapping inputs are returned unmerged.
#[must_use]
pub fn merge_data(to: &Value, from: &Value) -> Value {
    let (Some(to_map), Some(from_map)) = (to.as_map(), from.as_map()) else {
        return to.clone();
    };
    merge_data_maps(to_map, from_map);
    to.clone()
}

fn merge_data_maps(to: &MapRef, from: &MapRef) {
    for key in from.keys_raw() {
        let Some(from_value) = from.get_raw(&key) else {
            continue;
        };
        match to.get_raw(&key) {
            None => reflow_reactive::set(to, &key, from_value),
            Some(to_value) => {
                if let (Some(to_child), Some(from_child)) = (to_value.as_map(), from_value.as_map()) {
                    if !to_child.same_ref(from_child) {
                        merge_data_maps(to_child, from_child);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::constructor::Constructor;
    use crate::options::{DefRef, WatchSpec};
    use reflow_reactive::observe;

    fn capture_warnings() -> Rc<RefCell<Vec<String>>> {
        reflow_core::config::reset();
        let warnings: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&warnings);
        reflow_core::configure(|c| {
            c.warn_handler = Some(Rc::new(move |msg| sink.borrow_mut().push(msg.to_string())));
        });
        warnings
    }

    fn dummy_instance() -> Rc<Instance> {
        Instance::new(&Constructor::base(Options::new()), Options::new())
    }

    #[test]
    fn hooks_concatenate_parent_first() {
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let order_p = Rc::clone(&order);
        let order_c = Rc::clone(&order);

        let parent = Options::new().with_hook(LifecycleHook::Created, move |_| {
            order_p.borrow_mut().push("parent");
        });
        let child = Options::new().with_hook(LifecycleHook::Created, move |_| {
            order_c.borrow_mut().push("child");
        });

        let merged = merge_options(&parent, &child, None);
        let hooks = &merged.hooks[&LifecycleHook::Created];
        assert_eq!(hooks.len(), 2);

        let instance = dummy_instance();
        for hook in hooks {
            hook(&instance);
        }
        assert_eq!(order.borrow().as_slice(), ["parent", "child"]);
    }

    #[test]
    fn methods_union_child_overrides() {
        let parent = Options::new()
            .with_method("a", |_, _| Value::num(1.0))
            .with_method("shared", |_, _| Value::str("parent"));
        let child = Options::new()
            .with_method("b", |_, _| Value::num(3.0))
            .with_method("shared", |_, _| Value::str("child"));

        let merged = merge_options(&parent, &child, None);
        let methods = merged.methods.expect("methods present");
        assert_eq!(methods.len(), 3);

        let instance = dummy_instance();
        assert_eq!(methods["shared"](&instance, &[]).as_str(), Some("child"));
        assert_eq!(methods["a"](&instance, &[]).as_num(), Some(1.0));
        assert_eq!(methods["b"](&instance, &[]).as_num(), Some(3.0));
    }

    #[test]
    fn data_merges_instance_result_over_default() {
        let parent = Options::new().with_data(|_| {
            Value::Map(
                [
                    ("shared".to_string(), Value::str("default")),
                    ("only_parent".to_string(), Value::num(1.0)),
                ]
                .into_iter()
                .collect(),
            )
        });
        let child = Options::new().with_data(|_| {
            Value::Map([("shared".to_string(), Value::str("own"))].into_iter().collect())
        });

        let merged = merge_options(&parent, &child, None);
        let instance = dummy_instance();
        let data = merged.data.expect("data present").resolve(&instance);
        let map = data.as_map().expect("mapping");
        assert_eq!(map.get_raw("shared").unwrap().as_str(), Some("own"));
        assert_eq!(map.get_raw("only_parent").unwrap().as_num(), Some(1.0));
    }

    #[test]
    fn data_merge_recurses_into_plain_mappings() {
        let parent = Options::new().with_data(|_| {
            let nested: MapRef = [
                ("kept".to_string(), Value::num(1.0)),
                ("overridden".to_string(), Value::str("default")),
            ]
            .into_iter()
            .collect();
            Value::Map([("nested".to_string(), Value::Map(nested))].into_iter().collect())
        });
        let child = Options::new().with_data(|_| {
            let nested: MapRef =
                [("overridden".to_string(), Value::str("own"))].into_iter().collect();
            Value::Map([("nested".to_string(), Value::Map(nested))].into_iter().collect())
        });

        let merged = merge_options(&parent, &child, None);
        let instance = dummy_instance();
        let data = merged.data.unwrap().resolve(&instance);
        let nested = data.as_map().unwrap().get_raw("nested").unwrap();
        let nested = nested.as_map().unwrap();
        assert_eq!(nested.get_raw("kept").unwrap().as_num(), Some(1.0));
        assert_eq!(nested.get_raw("overridden").unwrap().as_str(), Some("own"));
    }

    #[test]
    fn data_merge_into_reactive_target_notifies() {
        use reflow_reactive::watcher::{Watcher, WatcherOptions};

        let to: MapRef = [("own".to_string(), Value::num(1.0))].into_iter().collect();
        observe(&Value::Map(to.clone()));

        let reader_map = to.clone();
        let reader = Watcher::new(
            Box::new(move || Value::num(reader_map.keys().len() as f64)),
            WatcherOptions { lazy: true, ..Default::default() },
        );
        reader.evaluate();

        let from: MapRef = [("copied".to_string(), Value::num(2.0))].into_iter().collect();
        let _ = merge_data(&Value::Map(to.clone()), &Value::Map(from));

        assert!(reader.is_dirty());
        let copied = to.get_raw("copied").unwrap();
        assert_eq!(copied.as_num(), Some(2.0));
    }

    #[test]
    fn extends_chain_supplies_data() {
        let mid = Options::new().with_data(|_| {
            Value::Map([("x".to_string(), Value::num(1.0))].into_iter().collect())
        });
        let child = Options::new().with_extends(DefRef::Options(Rc::new(mid)));
        let parent = Options::new();

        let merged = merge_options(&parent, &child, None);
        let instance = dummy_instance();
        let data = merged.data.expect("data flows from extends").resolve(&instance);
        assert_eq!(data.as_map().unwrap().get_raw("x").unwrap().as_num(), Some(1.0));
    }

    #[test]
    fn later_mixins_and_child_win_on_scalars() {
        let mixin_a = Options::new().with_rest("flavor", Value::str("a"));
        let mixin_b = Options::new().with_rest("flavor", Value::str("b"));

        let child = Options::new()
            .with_mixin(DefRef::Options(Rc::new(mixin_a.clone())))
            .with_mixin(DefRef::Options(Rc::new(mixin_b)));
        let merged = merge_options(&Options::new(), &child, None);
        assert_eq!(merged.rest["flavor"].as_str(), Some("b"));

        let child = Options::new()
            .with_mixin(DefRef::Options(Rc::new(mixin_a)))
            .with_rest("flavor", Value::str("own"));
        let merged = merge_options(&Options::new(), &child, None);
        assert_eq!(merged.rest["flavor"].as_str(), Some("own"));
    }

    #[test]
    fn mixin_hooks_run_before_child_hooks() {
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let order_m = Rc::clone(&order);
        let order_c = Rc::clone(&order);

        let mixin = Options::new().with_hook(LifecycleHook::Created, move |_| {
            order_m.borrow_mut().push("mixin");
        });
        let child = Options::new()
            .with_mixin(DefRef::Options(Rc::new(mixin)))
            .with_hook(LifecycleHook::Created, move |_| {
                order_c.borrow_mut().push("child");
            });

        let merged = merge_options(&Options::new(), &child, None);
        let instance = dummy_instance();
        for hook in &merged.hooks[&LifecycleHook::Created] {
            hook(&instance);
        }
        assert_eq!(order.borrow().as_slice(), ["mixin", "child"]);
    }

    #[test]
    fn watch_keeps_both_ancestors_handlers() {
        let parent = Options::new().with_watch("x", WatchSpec::new(|_, _, _| {}));
        let child = Options::new().with_watch("x", WatchSpec::new(|_, _, _| {}));
        let merged = merge_options(&parent, &child, None);
        assert_eq!(merged.watch.expect("watch present")["x"].len(), 2);
    }

    #[test]
    fn el_without_instance_warns_and_falls_back() {
        let warnings = capture_warnings();
        let child = Options::new().with_el(Value::str("#app"));
        let merged = merge_options(&Options::new(), &child, None);

        assert_eq!(merged.el.unwrap().as_str(), Some("#app"));
        assert!(
            warnings
                .borrow()
                .iter()
                .any(|w| w.contains("\"el\"") && w.contains("instance creation"))
        );
        reflow_core::config::reset();
    }

    #[test]
    fn raw_data_value_on_definition_warns_and_uses_parent() {
        let warnings = capture_warnings();
        let parent = Options::new().with_data(|_| {
            Value::Map([("p".to_string(), Value::num(1.0))].into_iter().collect())
        });
        let mut child = Options::new();
        child.data = Some(DataSource::Value(Value::map()));

        let merged = merge_options(&parent, &child, None);
        let instance = dummy_instance();
        let data = merged.data.unwrap().resolve(&instance);
        assert!(data.as_map().unwrap().has_raw("p"));
        assert!(warnings.borrow().iter().any(|w| w.contains("data option")));
        reflow_core::config::reset();
    }

    #[test]
    fn reserved_component_names_warn_at_merge_time() {
        let warnings = capture_warnings();
        let child = Options::new().with_component(
            "slot",
            DefRef::Options(Rc::new(Options::new())),
        );
        let _ = merge_options(&Options::new(), &child, None);
        assert!(warnings.borrow().iter().any(|w| w.contains("slot")));
        reflow_core::config::reset();
    }

    #[test]
    fn strategy_table_is_total_over_fixed_keys() {
        for key in OptionKey::all_fixed() {
            let _ = strategy(&key);
        }
        assert_eq!(strategy(&OptionKey::Custom("anything".into())), MergeStrategy::Default);
        assert_eq!(strategy(&OptionKey::Data), MergeStrategy::DataOrFn);
        assert_eq!(strategy(&OptionKey::El), MergeStrategy::InstanceOnly);
        assert_eq!(
            strategy(&OptionKey::Hook(LifecycleHook::Mounted)),
            MergeStrategy::Hook
        );
    }
}
