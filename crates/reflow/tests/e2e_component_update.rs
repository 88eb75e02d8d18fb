//! End-to-end flows across the whole stack: a definition is composed from
//! ancestors and mixins, its state is observed, a render computation
//! subscribes, and mutations batch into single re-renders at the flush.

use std::cell::RefCell;
use std::rc::Rc;

use reflow::prelude::*;

fn counter_render(renders: &Rc<RefCell<u32>>) -> impl Fn(&Instance) -> Value + 'static {
    let renders = Rc::clone(renders);
    move |instance: &Instance| {
        *renders.borrow_mut() += 1;
        let count = instance.get("count").as_num().unwrap_or(0.0);
        let doubled = instance.get("doubled").as_num().unwrap_or(0.0);
        Value::str(format!("count={count} doubled={doubled}"))
    }
}

#[test]
fn full_component_flow() {
    scheduler::reset();
    let events: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let push = |log: &Rc<RefCell<Vec<String>>>, tag: &'static str| {
        let log = Rc::clone(log);
        move |_: &Instance| log.borrow_mut().push(tag.to_string())
    };

    // A mixin contributes a hook; the definition contributes data, a
    // computed value, a watcher, and its own hooks.
    let mixin = Options::new().with_hook(LifecycleHook::Created, push(&events, "mixin-created"));

    let watched: Rc<RefCell<Vec<(f64, f64)>>> = Rc::new(RefCell::new(Vec::new()));
    let watched_sink = Rc::clone(&watched);

    let base = Constructor::base(
        Options::new()
            .with_mixin(DefRef::Options(Rc::new(mixin)))
            .with_data(|_| {
                Value::Map(
                    [
                        ("count".to_string(), Value::num(1.0)),
                        (
                            "items".to_string(),
                            Value::List([Value::num(1.0)].into_iter().collect::<ListRef>()),
                        ),
                    ]
                    .into_iter()
                    .collect::<MapRef>(),
                )
            })
            .with_computed("doubled", |instance| {
                Value::num(instance.get("count").as_num().unwrap_or(0.0) * 2.0)
            })
            .with_watch(
                "count",
                WatchSpec::new(move |_, new_value, old_value| {
                    watched_sink.borrow_mut().push((
                        new_value.as_num().unwrap_or(f64::NAN),
                        old_value.as_num().unwrap_or(f64::NAN),
                    ));
                }),
            )
            .with_hook(LifecycleHook::Created, push(&events, "created"))
            .with_hook(LifecycleHook::BeforeMount, push(&events, "before-mount"))
            .with_hook(LifecycleHook::Mounted, push(&events, "mounted"))
            .with_hook(LifecycleHook::BeforeUpdate, push(&events, "before-update"))
            .with_hook(LifecycleHook::Updated, push(&events, "updated")),
    );

    let renders = Rc::new(RefCell::new(0u32));
    let instance = Instance::new(&base, Options::new());
    instance.mount(counter_render(&renders));

    // Mixin hook before own hook; mount hooks in lifecycle order.
    assert_eq!(
        events.borrow().as_slice(),
        ["mixin-created", "created", "before-mount", "mounted"]
    );
    assert_eq!(*renders.borrow(), 1);
    assert_eq!(
        instance.rendered().unwrap().as_str(),
        Some("count=1 doubled=2")
    );

    // Three synchronous writes: one re-render at the flush, computed fresh.
    let data = instance.data();
    let data = data.as_map().unwrap();
    data.set("count", Value::num(2.0));
    data.set("count", Value::num(3.0));
    data.set("count", Value::num(4.0));
    assert_eq!(*renders.borrow(), 1, "re-renders are deferred");

    scheduler::flush();
    assert_eq!(*renders.borrow(), 2);
    assert_eq!(
        instance.rendered().unwrap().as_str(),
        Some("count=4 doubled=8")
    );
    // beforeUpdate ran before the re-render, updated after the flush.
    assert_eq!(
        events.borrow().as_slice(),
        [
            "mixin-created",
            "created",
            "before-mount",
            "mounted",
            "before-update",
            "updated"
        ]
    );
    // The user watcher saw the collapsed transition.
    assert_eq!(watched.borrow().as_slice(), [(4.0, 1.0)]);
}

#[test]
fn list_mutation_rerenders_and_raw_write_does_not() {
    scheduler::reset();
    let renders = Rc::new(RefCell::new(0u32));
    let renders_inner = Rc::clone(&renders);

    let base = Constructor::base(Options::new().with_data(|_| {
        Value::Map(
            [(
                "items".to_string(),
                Value::List([Value::num(1.0)].into_iter().collect::<ListRef>()),
            )]
            .into_iter()
            .collect::<MapRef>(),
        )
    }));
    let instance = Instance::new(&base, Options::new());
    instance.mount(move |inst: &Instance| {
        *renders_inner.borrow_mut() += 1;
        let total: f64 = inst
            .get("items")
            .as_list()
            .map(|items| items.items_snapshot().iter().filter_map(Value::as_num).sum())
            .unwrap_or(0.0);
        Value::num(total)
    });
    assert_eq!(*renders.borrow(), 1);
    assert_eq!(instance.rendered().unwrap().as_num(), Some(1.0));

    let items = instance.get("items");
    let items = items.as_list().unwrap().clone();

    // Documented limitation: raw index writes do not re-render.
    items.set_raw(0, Value::num(100.0));
    scheduler::flush();
    assert_eq!(*renders.borrow(), 1, "raw index write must not notify");

    // The seven mutating operations do.
    items.push(Value::num(2.0));
    scheduler::flush();
    assert_eq!(*renders.borrow(), 2);
    assert_eq!(instance.rendered().unwrap().as_num(), Some(102.0));

    // Reactive replacement by index does too.
    set_item(&items, 0, Value::num(1.0));
    scheduler::flush();
    assert_eq!(*renders.borrow(), 3);
    assert_eq!(instance.rendered().unwrap().as_num(), Some(3.0));
}

#[test]
fn computed_recomputes_before_dependent_render_in_one_flush() {
    scheduler::reset();
    let seen: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_inner = Rc::clone(&seen);

    let base = Constructor::base(
        Options::new()
            .with_data(|_| {
                Value::Map(
                    [("n".to_string(), Value::num(1.0))]
                        .into_iter()
                        .collect::<MapRef>(),
                )
            })
            .with_computed("squared", |instance| {
                let n = instance.get("n").as_num().unwrap_or(0.0);
                Value::num(n * n)
            }),
    );
    let instance = Instance::new(&base, Options::new());
    instance.mount(move |inst: &Instance| {
        let squared = inst.get("squared");
        seen_inner.borrow_mut().push(squared.as_num().unwrap_or(f64::NAN));
        squared
    });

    instance.data().as_map().unwrap().set("n", Value::num(3.0));
    scheduler::flush();

    // The render never observes a stale computed value.
    assert_eq!(seen.borrow().as_slice(), [1.0, 9.0]);
}

#[test]
fn instance_data_merges_over_definition_data() {
    scheduler::reset();
    let base = Constructor::base(Options::new().with_data(|_| {
        Value::Map(
            [
                ("kept".to_string(), Value::str("default")),
                ("overridden".to_string(), Value::str("default")),
            ]
            .into_iter()
            .collect::<MapRef>(),
        )
    }));

    let instance = Instance::new(
        &base,
        Options::new().with_data(|_| {
            Value::Map(
                [("overridden".to_string(), Value::str("own"))]
                    .into_iter()
                    .collect::<MapRef>(),
            )
        }),
    );

    assert_eq!(instance.get("kept").as_str(), Some("default"));
    assert_eq!(instance.get("overridden").as_str(), Some("own"));
}

#[test]
fn derived_constructor_instances_compose_everything() {
    scheduler::reset();
    let base = Constructor::base(
        Options::new()
            .with_data(|_| {
                Value::Map(
                    [("greeting".to_string(), Value::str("hello"))]
                        .into_iter()
                        .collect::<MapRef>(),
                )
            })
            .with_method("shout", |instance, _| {
                Value::str(
                    instance
                        .get("greeting")
                        .as_str()
                        .unwrap_or_default()
                        .to_uppercase(),
                )
            }),
    );
    let derived = base.extend(Options::new().with_data(|_| {
        Value::Map(
            [("punctuation".to_string(), Value::str("!"))]
                .into_iter()
                .collect::<MapRef>(),
        )
    }));

    let instance = Instance::new(&derived, Options::new());
    assert_eq!(instance.get("greeting").as_str(), Some("hello"));
    assert_eq!(instance.get("punctuation").as_str(), Some("!"));
    assert_eq!(instance.call_method("shout", &[]).as_str(), Some("HELLO"));
}
