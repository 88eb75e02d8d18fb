#![forbid(unsafe_code)]

//! Reflow public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use reflow_compose as compose;
    pub use reflow_core as core;
    pub use reflow_reactive as reactive;

    pub use reflow_compose::{
        Constructor, DataSource, DefRef, Instance, LifecycleHook, Options, PropSpec, PropType,
        WatchSpec, merge_options, resolve_asset,
    };
    pub use reflow_reactive::{
        Computed, ListRef, MapRef, Value, Watcher, WatcherOptions, del, mark_raw, observe,
        scheduler, set, set_item,
    };
}
