#![forbid(unsafe_code)]

//! Options composition for the reflow component runtime.
//!
//! Turns a raw component definition — possibly extending a parent, mixing in
//! others, and overridden per instance — into one canonical configuration:
//!
//! - [`options`]: the [`Options`] model, the closed [`OptionKey`] set, and
//!   the lifecycle hook table.
//! - [`normalize`]: canonicalization of authoring shorthands.
//! - [`merge`]: [`merge_options`] and the per-key strategy table.
//! - [`assets`]: layered component/directive/filter registries and
//!   [`resolve_asset`].
//! - [`props`]: prop validation and defaulting against normalized
//!   descriptors.
//! - [`constructor`]: [`Constructor`] — reusable definitions with cached,
//!   identity-invalidated option resolution.
//! - [`instance`]: [`Instance`] — where composed options are wired into the
//!   reactive engine.

pub mod assets;
pub mod constructor;
pub mod instance;
pub mod merge;
pub mod normalize;
pub mod options;
pub mod props;

pub use assets::{Asset, AssetKind, Registry, resolve_asset};
pub use constructor::Constructor;
pub use instance::Instance;
pub use merge::{MergeStrategy, merge_data, merge_options, strategy};
pub use normalize::normalize;
pub use options::{
    ComputedFn, DataFn, DataSource, DefRef, DirectiveDecl, DirectiveFn, DirectiveSpec, FilterFn,
    HookFn, InjectDecl, InjectSpec, LifecycleHook, MethodFn, OptionKey, Options, PropSpec,
    PropType, PropsDecl, WatchFn, WatchSpec,
};
pub use props::validate_prop;
