#![forbid(unsafe_code)]

//! Component instances: where composed options meet the reactive engine.
//!
//! An [`Instance`] resolves its constructor's options, merges in its own
//! overrides (the only context where `el` / `props_data` are legal), and
//! wires the declared state up: injections, validated props, data (observed),
//! computed values (lazy watchers — created before any render subscriber, so
//! notification priority recomputes them first), user watchers, and provided
//! values. Lifecycle hooks run with dependency tracking disabled.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use reflow_core::warn;
use reflow_reactive::dep::TargetStack;
use reflow_reactive::watcher::{Watcher, WatcherOptions, path_getter};
use reflow_reactive::{Computed, MapRef, Value, observe};

use crate::constructor::Constructor;
use crate::merge::merge_options;
use crate::normalize::{inject_specs, props_specs};
use crate::options::{LifecycleHook, Options, WatchSpec};
use crate::props::validate_prop;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// A live component instance.
pub struct Instance {
    uid: u64,
    weak_self: Weak<Instance>,
    options: RefCell<Rc<Options>>,
    parent: Option<Rc<Instance>>,
    data: RefCell<Value>,
    props: RefCell<Value>,
    provided: RefCell<Value>,
    injected: RefCell<Value>,
    computed: RefCell<AHashMap<String, Computed>>,
    watchers: RefCell<Vec<Watcher>>,
    render_watcher: RefCell<Option<Watcher>>,
    mounted: Cell<bool>,
    destroyed: Cell<bool>,
}

impl Instance {
    /// Instantiate a constructor with per-instance options.
    #[must_use]
    pub fn new(ctor: &Rc<Constructor>, options: Options) -> Rc<Instance> {
        Self::new_with_parent(ctor, options, None)
    }

    /// Instantiate with a parent (enables injection resolution through the
    /// provider chain).
    #[must_use]
    pub fn new_with_parent(
        ctor: &Rc<Constructor>,
        options: Options,
        parent: Option<Rc<Instance>>,
    ) -> Rc<Instance> {
        let instance = Rc::new_cyclic(|weak| Instance {
            uid: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            weak_self: weak.clone(),
            options: RefCell::new(Rc::new(Options::default())),
            parent,
            data: RefCell::new(Value::Null),
            props: RefCell::new(Value::Null),
            provided: RefCell::new(Value::Null),
            injected: RefCell::new(Value::Null),
            computed: RefCell::new(AHashMap::new()),
            watchers: RefCell::new(Vec::new()),
            render_watcher: RefCell::new(None),
            mounted: Cell::new(false),
            destroyed: Cell::new(false),
        });

        let merged = merge_options(&ctor.resolve_options(), &options, Some(&instance));
        *instance.options.borrow_mut() = Rc::new(merged);
        tracing::debug!(target: "reflow", uid = instance.uid, "instance created");

        instance.call_hook(LifecycleHook::BeforeCreate);
        instance.init_injections();
        instance.init_props();
        instance.check_method_names();
        instance.init_data();
        instance.init_computed();
        instance.init_watch();
        instance.init_provide();
        instance.call_hook(LifecycleHook::Created);
        instance
    }

    #[must_use]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// The fully merged options.
    #[must_use]
    pub fn options(&self) -> Rc<Options> {
        self.options.borrow().clone()
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<Instance>> {
        self.parent.clone()
    }

    /// The observed data root.
    #[must_use]
    pub fn data(&self) -> Value {
        self.data.borrow().clone()
    }

    /// The observed props mapping.
    #[must_use]
    pub fn props(&self) -> Value {
        self.props.borrow().clone()
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    // ─── State wiring ───────────────────────────────────────────────────────

    fn init_injections(&self) {
        let options = self.options();
        let Some(decl) = &options.inject else {
            return;
        };
        let resolved = MapRef::new();
        for (key, spec) in inject_specs(decl).iter() {
            let mut source = self.parent.clone();
            let mut found = None;
            while let Some(ancestor) = source {
                let provided = ancestor.provided.borrow().clone();
                if let Some(provided) = provided.as_map() {
                    if let Some(value) = provided.get_raw(&spec.from) {
                        found = Some(value);
                        break;
                    }
                }
                source = ancestor.parent.clone();
            }
            let value = match (found, &spec.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    warn(&format!("injection \"{key}\" not found"));
                    Value::Null
                }
            };
            resolved.insert_raw(key.clone(), value);
        }
        *self.injected.borrow_mut() = Value::Map(resolved);
    }

    fn init_props(&self) {
        let options = self.options();
        let Some(decl) = &options.props else {
            return;
        };
        let supplied = options.props_data.as_ref().and_then(Value::as_map).cloned();
        let props = MapRef::new();
        for (key, spec) in props_specs(decl).iter() {
            let value = validate_prop(key, spec, supplied.as_ref(), self);
            props.insert_raw(key.clone(), value);
        }
        let props = Value::Map(props);
        observe(&props);
        *self.props.borrow_mut() = props;
    }

    fn check_method_names(&self) {
        let options = self.options();
        let Some(methods) = &options.methods else {
            return;
        };
        let props = self.props.borrow().clone();
        if let Some(props) = props.as_map() {
            for name in methods.keys() {
                if props.has_raw(name) {
                    warn(&format!("method \"{name}\" is already declared as a prop"));
                }
            }
        }
    }

    fn init_data(&self) {
        let options = self.options();
        let produced = match &options.data {
            Some(source) => TargetStack::untracked(|| source.resolve(self)),
            None => Value::map(),
        };
        let data = if produced.as_map().is_some() {
            produced
        } else {
            warn("data functions must return a mapping");
            Value::map()
        };

        if let Some(map) = data.as_map() {
            let methods = options.methods.as_ref();
            let props = self.props.borrow().clone();
            for key in map.keys_raw() {
                if methods.is_some_and(|m| m.contains_key(&key)) {
                    warn(&format!("method \"{key}\" has already been defined as a data key"));
                }
                if props.as_map().is_some_and(|p| p.has_raw(&key)) {
                    warn(&format!("data key \"{key}\" is already declared as a prop"));
                }
            }
        }

        observe(&data);
        *self.data.borrow_mut() = data;
    }

    fn init_computed(&self) {
        let options = self.options();
        let Some(defs) = &options.computed else {
            return;
        };
        let mut computed = self.computed.borrow_mut();
        for (name, getter) in defs.iter() {
            let data = self.data.borrow().clone();
            let props = self.props.borrow().clone();
            if data.as_map().is_some_and(|m| m.has_raw(name))
                || props.as_map().is_some_and(|m| m.has_raw(name))
            {
                warn(&format!(
                    "computed key \"{name}\" is already defined as a data key or prop"
                ));
            }
            let weak = self.weak_self.clone();
            let getter = Rc::clone(getter);
            computed.insert(
                name.clone(),
                Computed::new(move || match weak.upgrade() {
                    Some(instance) => getter(&instance),
                    None => Value::Null,
                }),
            );
        }
    }

    fn init_watch(&self) {
        let options = self.options();
        let Some(watch) = &options.watch else {
            return;
        };
        for (key, specs) in watch.iter() {
            for spec in specs {
                self.watch(key, spec.clone());
            }
        }
    }

    fn init_provide(&self) {
        let options = self.options();
        if let Some(source) = &options.provide {
            let provided = TargetStack::untracked(|| source.resolve(self));
            *self.provided.borrow_mut() = provided;
        }
    }

    // ─── State access ───────────────────────────────────────────────────────

    /// Read one state key through the tracked accessors. Resolution order:
    /// computed values, data, props, injections. Unknown keys read `Null`.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        let computed = self.computed.borrow().get(key).cloned();
        if let Some(computed) = computed {
            return computed.get();
        }
        let data = self.data.borrow().clone();
        if let Some(map) = data.as_map() {
            if let Some(value) = map.get(key) {
                return value;
            }
        }
        let props = self.props.borrow().clone();
        if let Some(map) = props.as_map() {
            if let Some(value) = map.get(key) {
                return value;
            }
        }
        let injected = self.injected.borrow().clone();
        if let Some(map) = injected.as_map() {
            if let Some(value) = map.get_raw(key) {
                return value;
            }
        }
        Value::Null
    }

    /// Invoke a declared method. Unknown names warn and evaluate to `Null`.
    #[must_use]
    pub fn call_method(&self, name: &str, args: &[Value]) -> Value {
        let method = self
            .options()
            .methods
            .as_ref()
            .and_then(|methods| methods.get(name).cloned());
        match method {
            Some(method) => method(self, args),
            None => {
                warn(&format!("method \"{name}\" is not defined"));
                Value::Null
            }
        }
    }

    // ─── Watch / render / lifecycle ─────────────────────────────────────────

    /// Create a watcher on a dotted state path. Returns `None` (with a
    /// report) for malformed paths. Tear the returned watcher down to
    /// unwatch early; `destroy` tears it down otherwise.
    pub fn watch(&self, path: &str, spec: WatchSpec) -> Option<Watcher> {
        if path_getter(&Value::Null, path).is_none() {
            warn(&format!("invalid watch path: \"{path}\""));
            return None;
        }

        let weak = self.weak_self.clone();
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        let getter = Box::new(move || {
            let Some(instance) = weak.upgrade() else {
                return Value::Null;
            };
            let mut current = instance.get(&segments[0]);
            for segment in &segments[1..] {
                current = match &current {
                    Value::Map(map) => map.get(segment).unwrap_or(Value::Null),
                    _ => Value::Null,
                };
            }
            current
        });

        let weak = self.weak_self.clone();
        let handler = Rc::clone(&spec.handler);
        let callback = Box::new(move |new_value: &Value, old_value: &Value| {
            if let Some(instance) = weak.upgrade() {
                handler(&instance, new_value, old_value);
            }
        });

        let watcher = Watcher::with_callback(
            getter,
            callback,
            WatcherOptions {
                lazy: false,
                deep: spec.deep,
                skip_loose_equal: spec.skip_loose_equal,
            },
        );
        if spec.immediate {
            let current = watcher.value();
            TargetStack::untracked(|| (spec.handler)(self, &current, &Value::Null));
        }
        self.watchers.borrow_mut().push(watcher.clone());
        Some(watcher)
    }

    /// Install the render computation. It runs once now, re-runs on the flush
    /// after any dependency changes, fires `beforeUpdate` ahead of each
    /// re-run and `updated` after the flush.
    pub fn mount(&self, render: impl Fn(&Instance) -> Value + 'static) -> Watcher {
        self.call_hook(LifecycleHook::BeforeMount);

        let weak = self.weak_self.clone();
        let watcher = Watcher::new(
            Box::new(move || match weak.upgrade() {
                Some(instance) => render(&instance),
                None => Value::Null,
            }),
            WatcherOptions::default(),
        );

        let weak = self.weak_self.clone();
        watcher.set_before(Box::new(move || {
            if let Some(instance) = weak.upgrade() {
                if instance.mounted.get() && !instance.destroyed.get() {
                    instance.call_hook(LifecycleHook::BeforeUpdate);
                }
            }
        }));
        let weak = self.weak_self.clone();
        watcher.set_post_flush(Box::new(move || {
            if let Some(instance) = weak.upgrade() {
                if instance.mounted.get() && !instance.destroyed.get() {
                    instance.call_hook(LifecycleHook::Updated);
                }
            }
        }));

        *self.render_watcher.borrow_mut() = Some(watcher.clone());
        self.watchers.borrow_mut().push(watcher.clone());
        self.mounted.set(true);
        self.call_hook(LifecycleHook::Mounted);
        watcher
    }

    /// The latest render output, if mounted.
    #[must_use]
    pub fn rendered(&self) -> Option<Value> {
        self.render_watcher.borrow().as_ref().map(Watcher::value)
    }

    /// Tear every watcher down. Pending flush entries for them become
    /// no-ops; the instance stops reacting entirely.
    pub fn destroy(&self) {
        if self.destroyed.get() {
            return;
        }
        self.call_hook(LifecycleHook::BeforeDestroy);
        self.destroyed.set(true);
        for watcher in self.watchers.borrow().iter() {
            watcher.teardown();
        }
        for computed in self.computed.borrow().values() {
            computed.teardown();
        }
        *self.render_watcher.borrow_mut() = None;
        tracing::debug!(target: "reflow", uid = self.uid, "instance destroyed");
        self.call_hook(LifecycleHook::Destroyed);
    }

    /// Run every merged hook of one lifecycle point, ancestors first, with
    /// dependency tracking disabled.
    pub fn call_hook(&self, hook: LifecycleHook) {
        let hooks = self.options().hooks.get(&hook).cloned();
        if let Some(hooks) = hooks {
            TargetStack::untracked(|| {
                for hook_fn in &hooks {
                    hook_fn(self);
                }
            });
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("uid", &self.uid)
            .field("mounted", &self.mounted.get())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}
