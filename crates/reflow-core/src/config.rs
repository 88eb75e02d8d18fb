#![forbid(unsafe_code)]

//! Process-wide runtime configuration.
//!
//! Configuration is explicit, thread-affine state: one [`Config`] per thread,
//! initialized to defaults on first touch and mutated only through
//! [`configure`]. The reactive engine and the options composer consult it for
//! warning delivery and reserved-tag validation.

use std::cell::RefCell;
use std::rc::Rc;

/// Pluggable warning sink. Receives the fully formatted message.
pub type WarnHandler = Rc<dyn Fn(&str)>;

/// Predicate deciding whether a tag name is reserved by the host platform.
///
/// Component-name validation reports (never rejects) collisions with names
/// this predicate accepts. The default accepts nothing.
pub type ReservedTagPredicate = Rc<dyn Fn(&str) -> bool>;

/// Runtime configuration knobs.
#[derive(Default)]
pub struct Config {
    /// Suppress warnings that would otherwise reach the logging backend.
    /// A custom `warn_handler` still receives them.
    pub silent: bool,
    /// Custom sink for warnings. When set, it replaces the logging backend.
    pub warn_handler: Option<WarnHandler>,
    /// Host-supplied reserved-tag predicate for component-name validation.
    pub is_reserved_tag: Option<ReservedTagPredicate>,
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Mutate the current thread's configuration.
pub fn configure(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|config| f(&mut config.borrow_mut()));
}

/// Restore the default configuration. Intended for tests and host teardown.
pub fn reset() {
    CONFIG.with(|config| *config.borrow_mut() = Config::default());
}

/// Whether warning output to the logging backend is suppressed.
#[must_use]
pub fn is_silent() -> bool {
    CONFIG.with(|config| config.borrow().silent)
}

/// A clone of the installed warning sink, if any.
///
/// Cloned out so callers never invoke user code while the configuration
/// is borrowed.
#[must_use]
pub fn warn_handler() -> Option<WarnHandler> {
    CONFIG.with(|config| config.borrow().warn_handler.clone())
}

/// Whether `name` is reserved by the host platform. `false` when no
/// predicate is installed.
#[must_use]
pub fn is_reserved_tag(name: &str) -> bool {
    let predicate = CONFIG.with(|config| config.borrow().is_reserved_tag.clone());
    match predicate {
        Some(p) => p(name),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        reset();
        assert!(!is_silent());
        assert!(warn_handler().is_none());
        assert!(!is_reserved_tag("div"));
    }

    #[test]
    fn configure_installs_predicate() {
        reset();
        configure(|c| {
            c.is_reserved_tag = Some(Rc::new(|name| name == "div" || name == "span"));
        });
        assert!(is_reserved_tag("div"));
        assert!(!is_reserved_tag("widget"));
        reset();
    }

    #[test]
    fn handler_may_reconfigure_without_deadlock() {
        reset();
        // A handler that flips `silent` while being consulted must not
        // re-enter a held borrow.
        configure(|c| {
            c.warn_handler = Some(Rc::new(|_| configure(|inner| inner.silent = true)));
        });
        let handler = warn_handler().expect("handler installed");
        handler("boom");
        assert!(is_silent());
        reset();
    }
}
