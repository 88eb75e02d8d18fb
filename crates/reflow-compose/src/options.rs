#![forbid(unsafe_code)]

//! The component options model.
//!
//! One [`Options`] type serves both raw (author-written) and merged
//! configuration; normalization and merging produce new `Options` values
//! rather than mutating the author's. Shareable members are `Rc`-wrapped so
//! merged results can be compared by identity — the constructor cache relies
//! on that to detect late-attached options without deep comparisons.

use std::rc::Rc;

use ahash::AHashMap;

use reflow_reactive::Value;

use crate::assets::Registry;
use crate::constructor::Constructor;
use crate::instance::Instance;

// ─── Callback shapes ─────────────────────────────────────────────────────────

/// Lifecycle hook body.
pub type HookFn = Rc<dyn Fn(&Instance)>;
/// Producer of per-instance data (or provided values).
pub type DataFn = Rc<dyn Fn(&Instance) -> Value>;
/// Component method body.
pub type MethodFn = Rc<dyn Fn(&Instance, &[Value]) -> Value>;
/// Computed-value getter.
pub type ComputedFn = Rc<dyn Fn(&Instance) -> Value>;
/// Output filter.
pub type FilterFn = Rc<dyn Fn(&Value) -> Value>;
/// Directive hook body.
pub type DirectiveFn = Rc<dyn Fn(&Instance, &Value)>;
/// Watch callback: `(instance, new_value, old_value)`.
pub type WatchFn = Rc<dyn Fn(&Instance, &Value, &Value)>;

// ─── Lifecycle hooks ─────────────────────────────────────────────────────────

/// The fixed set of lifecycle hook points, in firing order over a component's
/// life.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LifecycleHook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeDestroy,
    Destroyed,
    Activated,
    Deactivated,
}

impl LifecycleHook {
    pub const ALL: [LifecycleHook; 10] = [
        LifecycleHook::BeforeCreate,
        LifecycleHook::Created,
        LifecycleHook::BeforeMount,
        LifecycleHook::Mounted,
        LifecycleHook::BeforeUpdate,
        LifecycleHook::Updated,
        LifecycleHook::BeforeDestroy,
        LifecycleHook::Destroyed,
        LifecycleHook::Activated,
        LifecycleHook::Deactivated,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LifecycleHook::BeforeCreate => "beforeCreate",
            LifecycleHook::Created => "created",
            LifecycleHook::BeforeMount => "beforeMount",
            LifecycleHook::Mounted => "mounted",
            LifecycleHook::BeforeUpdate => "beforeUpdate",
            LifecycleHook::Updated => "updated",
            LifecycleHook::BeforeDestroy => "beforeDestroy",
            LifecycleHook::Destroyed => "destroyed",
            LifecycleHook::Activated => "activated",
            LifecycleHook::Deactivated => "deactivated",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|hook| hook.name() == name)
    }
}

// ─── Option members ──────────────────────────────────────────────────────────

/// Source of per-instance data or provided values: a producer function or a
/// literal value.
#[derive(Clone)]
pub enum DataSource {
    Func(DataFn),
    Value(Value),
}

impl DataSource {
    pub fn func(f: impl Fn(&Instance) -> Value + 'static) -> Self {
        DataSource::Func(Rc::new(f))
    }

    /// Evaluate against a live instance.
    #[must_use]
    pub fn resolve(&self, instance: &Instance) -> Value {
        match self {
            DataSource::Func(f) => f(instance),
            DataSource::Value(v) => v.clone(),
        }
    }

    pub(crate) fn identity_eq(&self, other: &DataSource) -> bool {
        match (self, other) {
            (DataSource::Func(a), DataSource::Func(b)) => Rc::ptr_eq(a, b),
            (DataSource::Value(a), DataSource::Value(b)) => a.same(b),
            _ => false,
        }
    }
}

/// Declared value type of a prop.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PropType {
    Any,
    Bool,
    Num,
    Str,
    Map,
    List,
}

/// Normalized prop descriptor.
#[derive(Clone)]
pub struct PropSpec {
    pub ty: PropType,
    pub required: bool,
    pub default: Option<DataSource>,
}

impl PropSpec {
    #[must_use]
    pub fn any() -> Self {
        PropSpec { ty: PropType::Any, required: false, default: None }
    }

    #[must_use]
    pub fn typed(ty: PropType) -> Self {
        PropSpec { ty, required: false, default: None }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: DataSource) -> Self {
        self.default = Some(default);
        self
    }
}

/// Props as authored: a bare name list or a descriptor map. Normalization
/// rewrites everything into the descriptor form with camelized keys.
#[derive(Clone)]
pub enum PropsDecl {
    Names(Vec<String>),
    Specs(Rc<AHashMap<String, PropSpec>>),
}

impl PropsDecl {
    pub(crate) fn identity_eq(&self, other: &PropsDecl) -> bool {
        match (self, other) {
            (PropsDecl::Specs(a), PropsDecl::Specs(b)) => Rc::ptr_eq(a, b),
            (PropsDecl::Names(a), PropsDecl::Names(b)) => a == b,
            _ => false,
        }
    }
}

/// Injection descriptor: where the injected key comes from in the provider
/// chain, and an optional fallback.
#[derive(Clone)]
pub struct InjectSpec {
    pub from: String,
    pub default: Option<Value>,
}

/// Injections as authored: a bare name list (each key injects itself) or a
/// descriptor map.
#[derive(Clone)]
pub enum InjectDecl {
    Names(Vec<String>),
    Specs(Rc<AHashMap<String, InjectSpec>>),
}

impl InjectDecl {
    pub(crate) fn identity_eq(&self, other: &InjectDecl) -> bool {
        match (self, other) {
            (InjectDecl::Specs(a), InjectDecl::Specs(b)) => Rc::ptr_eq(a, b),
            (InjectDecl::Names(a), InjectDecl::Names(b)) => a == b,
            _ => false,
        }
    }
}

/// Directive hook pair.
#[derive(Clone)]
pub struct DirectiveSpec {
    pub bind: Option<DirectiveFn>,
    pub update: Option<DirectiveFn>,
}

/// Directive as authored: a bare function (normalized into a spec with both
/// hooks set to it) or an explicit spec.
#[derive(Clone)]
pub enum DirectiveDecl {
    Func(DirectiveFn),
    Spec(Rc<DirectiveSpec>),
}

/// One watcher declaration for a watched key.
#[derive(Clone)]
pub struct WatchSpec {
    pub handler: WatchFn,
    pub deep: bool,
    pub immediate: bool,
    pub skip_loose_equal: bool,
}

impl WatchSpec {
    pub fn new(handler: impl Fn(&Instance, &Value, &Value) + 'static) -> Self {
        WatchSpec {
            handler: Rc::new(handler),
            deep: false,
            immediate: false,
            skip_loose_equal: false,
        }
    }

    #[must_use]
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    #[must_use]
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Do not fire the handler when old and new values are deeply equal.
    #[must_use]
    pub fn skip_loose_equal(mut self) -> Self {
        self.skip_loose_equal = true;
        self
    }
}

/// Reference to a component definition: raw options or a constructor.
#[derive(Clone)]
pub enum DefRef {
    Options(Rc<Options>),
    Ctor(Rc<Constructor>),
}

impl DefRef {
    /// The definition's (resolved) options.
    #[must_use]
    pub fn options(&self) -> Rc<Options> {
        match self {
            DefRef::Options(options) => options.clone(),
            DefRef::Ctor(ctor) => ctor.resolve_options(),
        }
    }

    pub(crate) fn identity_eq(&self, other: &DefRef) -> bool {
        match (self, other) {
            (DefRef::Options(a), DefRef::Options(b)) => Rc::ptr_eq(a, b),
            (DefRef::Ctor(a), DefRef::Ctor(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ─── Options ─────────────────────────────────────────────────────────────────

pub type MethodMap = AHashMap<String, MethodFn>;
pub type ComputedMap = AHashMap<String, ComputedFn>;
pub type WatchMap = AHashMap<String, Vec<WatchSpec>>;
pub type HookTable = AHashMap<LifecycleHook, Vec<HookFn>>;

/// A component configuration, raw or merged.
#[derive(Clone, Default)]
pub struct Options {
    pub name: Option<String>,
    /// Mount target. Instance-only.
    pub el: Option<Value>,
    /// Prop values supplied at instantiation. Instance-only.
    pub props_data: Option<Value>,
    pub data: Option<DataSource>,
    pub provide: Option<DataSource>,
    pub props: Option<PropsDecl>,
    pub methods: Option<Rc<MethodMap>>,
    pub computed: Option<Rc<ComputedMap>>,
    pub watch: Option<Rc<WatchMap>>,
    pub inject: Option<InjectDecl>,
    pub components: Option<Rc<Registry<DefRef>>>,
    pub directives: Option<Rc<Registry<DirectiveDecl>>>,
    pub filters: Option<Rc<Registry<FilterFn>>>,
    pub hooks: HookTable,
    /// Single-parent extension, folded before `mixins` during merging.
    pub extends: Option<DefRef>,
    /// Mixins, folded in array order; later entries win over earlier ones.
    pub mixins: Vec<DefRef>,
    /// Unrecognized option keys; merged with the default strategy.
    pub rest: AHashMap<String, Value>,
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Options::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_el(mut self, el: Value) -> Self {
        self.el = Some(el);
        self
    }

    #[must_use]
    pub fn with_props_data(mut self, props_data: Value) -> Self {
        self.props_data = Some(props_data);
        self
    }

    #[must_use]
    pub fn with_data(mut self, f: impl Fn(&Instance) -> Value + 'static) -> Self {
        self.data = Some(DataSource::func(f));
        self
    }

    #[must_use]
    pub fn with_provide(mut self, f: impl Fn(&Instance) -> Value + 'static) -> Self {
        self.provide = Some(DataSource::func(f));
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: LifecycleHook, f: impl Fn(&Instance) + 'static) -> Self {
        self.hooks.entry(hook).or_default().push(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_method(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Instance, &[Value]) -> Value + 'static,
    ) -> Self {
        let mut methods = match self.methods.take() {
            Some(existing) => (*existing).clone(),
            None => MethodMap::new(),
        };
        methods.insert(name.into(), Rc::new(f));
        self.methods = Some(Rc::new(methods));
        self
    }

    #[must_use]
    pub fn with_computed(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Instance) -> Value + 'static,
    ) -> Self {
        let mut computed = match self.computed.take() {
            Some(existing) => (*existing).clone(),
            None => ComputedMap::new(),
        };
        computed.insert(name.into(), Rc::new(f));
        self.computed = Some(Rc::new(computed));
        self
    }

    #[must_use]
    pub fn with_watch(mut self, key: impl Into<String>, spec: WatchSpec) -> Self {
        let mut watch = match self.watch.take() {
            Some(existing) => (*existing).clone(),
            None => WatchMap::new(),
        };
        watch.entry(key.into()).or_default().push(spec);
        self.watch = Some(Rc::new(watch));
        self
    }

    #[must_use]
    pub fn with_prop_names(mut self, names: &[&str]) -> Self {
        self.props = Some(PropsDecl::Names(names.iter().map(|s| s.to_string()).collect()));
        self
    }

    #[must_use]
    pub fn with_prop(mut self, name: impl Into<String>, spec: PropSpec) -> Self {
        let mut specs = match self.props.take() {
            Some(PropsDecl::Specs(existing)) => (*existing).clone(),
            _ => AHashMap::new(),
        };
        specs.insert(name.into(), spec);
        self.props = Some(PropsDecl::Specs(Rc::new(specs)));
        self
    }

    #[must_use]
    pub fn with_inject_names(mut self, names: &[&str]) -> Self {
        self.inject = Some(InjectDecl::Names(names.iter().map(|s| s.to_string()).collect()));
        self
    }

    #[must_use]
    pub fn with_component(mut self, name: impl Into<String>, def: DefRef) -> Self {
        let mut local = match self.components.take() {
            Some(existing) => existing.local_clone(),
            None => AHashMap::new(),
        };
        local.insert(name.into(), def);
        self.components = Some(Rc::new(Registry::from_map(local)));
        self
    }

    #[must_use]
    pub fn with_directive(mut self, name: impl Into<String>, decl: DirectiveDecl) -> Self {
        let mut local = match self.directives.take() {
            Some(existing) => existing.local_clone(),
            None => AHashMap::new(),
        };
        local.insert(name.into(), decl);
        self.directives = Some(Rc::new(Registry::from_map(local)));
        self
    }

    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, f: impl Fn(&Value) -> Value + 'static) -> Self {
        let mut local = match self.filters.take() {
            Some(existing) => existing.local_clone(),
            None => AHashMap::new(),
        };
        local.insert(name.into(), Rc::new(f) as FilterFn);
        self.filters = Some(Rc::new(Registry::from_map(local)));
        self
    }

    #[must_use]
    pub fn with_extends(mut self, def: DefRef) -> Self {
        self.extends = Some(def);
        self
    }

    #[must_use]
    pub fn with_mixin(mut self, def: DefRef) -> Self {
        self.mixins.push(def);
        self
    }

    #[must_use]
    pub fn with_rest(mut self, key: impl Into<String>, value: Value) -> Self {
        self.rest.insert(key.into(), value);
        self
    }

    /// Copy every member present on `other` over this configuration.
    /// Members absent on `other` are left untouched.
    pub(crate) fn overwrite_with(&mut self, other: &Options) {
        if other.name.is_some() {
            self.name = other.name.clone();
        }
        if other.el.is_some() {
            self.el = other.el.clone();
        }
        if other.props_data.is_some() {
            self.props_data = other.props_data.clone();
        }
        if other.data.is_some() {
            self.data = other.data.clone();
        }
        if other.provide.is_some() {
            self.provide = other.provide.clone();
        }
        if other.props.is_some() {
            self.props = other.props.clone();
        }
        if other.methods.is_some() {
            self.methods = other.methods.clone();
        }
        if other.computed.is_some() {
            self.computed = other.computed.clone();
        }
        if other.watch.is_some() {
            self.watch = other.watch.clone();
        }
        if other.inject.is_some() {
            self.inject = other.inject.clone();
        }
        if other.components.is_some() {
            self.components = other.components.clone();
        }
        if other.directives.is_some() {
            self.directives = other.directives.clone();
        }
        if other.filters.is_some() {
            self.filters = other.filters.clone();
        }
        for (hook, fns) in &other.hooks {
            self.hooks.insert(*hook, fns.clone());
        }
        for (key, value) in &other.rest {
            self.rest.insert(key.clone(), value.clone());
        }
    }
}

/// Elementwise identity comparison of two hook lists.
pub(crate) fn hook_lists_identical(a: Option<&Vec<HookFn>>, b: Option<&Vec<HookFn>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Rc::ptr_eq(x, y))
        }
        _ => false,
    }
}

// ─── Option keys ─────────────────────────────────────────────────────────────

/// The closed set of recognized option keys, plus `Custom` for everything
/// else. The merge-strategy table matches over this exhaustively, so a new
/// key cannot be added without choosing its strategy.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum OptionKey {
    Name,
    El,
    PropsData,
    Data,
    Provide,
    Props,
    Methods,
    Computed,
    Watch,
    Inject,
    Components,
    Directives,
    Filters,
    Hook(LifecycleHook),
    Custom(String),
}

impl OptionKey {
    /// Every recognized (non-custom) key.
    #[must_use]
    pub fn all_fixed() -> Vec<OptionKey> {
        let mut keys = vec![
            OptionKey::Name,
            OptionKey::El,
            OptionKey::PropsData,
            OptionKey::Data,
            OptionKey::Provide,
            OptionKey::Props,
            OptionKey::Methods,
            OptionKey::Computed,
            OptionKey::Watch,
            OptionKey::Inject,
            OptionKey::Components,
            OptionKey::Directives,
            OptionKey::Filters,
        ];
        keys.extend(LifecycleHook::ALL.into_iter().map(OptionKey::Hook));
        keys
    }
}
