use std::sync::{Arc, Mutex};

use eventscope::{
    ChannelConfig, CollectingReporter, CompositeSubscription, Disposable, EmitOutcome,
    EventChannel, Scope, Subscription, Teardown,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CartEvent {
    Added(String),
    Removed(String),
}

type Seen = Arc<Mutex<Vec<(&'static str, CartEvent)>>>;

fn listener(tag: &'static str, seen: &Seen) -> impl Fn(&CartEvent) + Send + Sync + 'static {
    let seen = Arc::clone(seen);
    move |event: &CartEvent| seen.lock().unwrap().push((tag, event.clone()))
}

#[test]
fn self_disposing_listener_misses_later_events() {
    let channel = EventChannel::named("cart");
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let l1_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&l1_slot);
    let record = listener("L1", &seen);
    let l1 = channel.subscribe(move |event: &CartEvent| {
        record(event);
        if let Some(me) = slot.lock().unwrap().as_ref() {
            me.dispose();
        }
    });
    *l1_slot.lock().unwrap() = Some(l1);
    let _l2 = channel.subscribe(listener("L2", &seen));

    channel.emit(CartEvent::Added("pen".into()));
    channel.emit(CartEvent::Added("cup".into()));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("L1", CartEvent::Added("pen".into())),
            ("L2", CartEvent::Added("pen".into())),
            ("L2", CartEvent::Added("cup".into())),
        ]
    );
    assert_eq!(channel.listener_count(), 1);
}

#[test]
fn disposing_after_channel_destroyed_is_silent() {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let channel = EventChannel::named("cart");
    let l2 = channel.subscribe(listener("L2", &seen));
    assert!(l2.is_active());

    drop(channel);

    assert!(!l2.is_active());
    l2.dispose();
    assert!(Disposable::dispose(&l2).is_ok());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn composite_disposes_every_member_despite_failure() {
    let channel = EventChannel::named("cart");
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));

    let composite = CompositeSubscription::new();
    composite.add(channel.subscribe(listener("s1", &seen)));
    composite.add(Teardown::fallible("s2", || Err("socket already closed".into())));
    composite.add(channel.subscribe(listener("s3", &seen)));

    let err = composite.dispose_all().unwrap_err();
    assert_eq!(err.attempted, 3);
    assert_eq!(err.failures.len(), 1);
    assert!(err.to_string().contains("socket already closed"));
    assert_eq!(channel.listener_count(), 0);

    assert_eq!(composite.dispose_all().unwrap(), 0);

    let s4 = channel.subscribe(listener("s4", &seen));
    composite.add(s4);
    channel.emit(CartEvent::Removed("pen".into()));
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn subscriber_window_restarts_with_fresh_composite() {
    struct View {
        seen: Seen,
        tokens: CompositeSubscription,
    }

    impl View {
        fn start(&mut self, channel: &EventChannel<CartEvent>) {
            self.tokens.add(channel.subscribe(listener("view", &self.seen)));
        }

        fn stop(&mut self) {
            std::mem::take(&mut self.tokens).dispose_all().unwrap();
        }
    }

    let channel = EventChannel::named("cart");
    let mut view = View {
        seen: Arc::new(Mutex::new(Vec::new())),
        tokens: CompositeSubscription::new(),
    };

    view.start(&channel);
    channel.emit(CartEvent::Added("pen".into()));
    view.stop();
    channel.emit(CartEvent::Added("lost".into()));
    view.start(&channel);
    channel.emit(CartEvent::Added("cup".into()));
    view.stop();

    let words: Vec<CartEvent> = view.seen.lock().unwrap().iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(
        words,
        vec![CartEvent::Added("pen".into()), CartEvent::Added("cup".into())]
    );
}

#[test]
fn scope_exit_tears_down_owned_channel() {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let reporter = Arc::new(CollectingReporter::new());

    let mut scope = Scope::new("cart-screen");
    let channel = scope.provide(EventChannel::<CartEvent>::with_reporter(
        ChannelConfig::named("cart"),
        reporter.clone(),
    ));

    let sub = channel
        .with(|c| c.subscribe(listener("L", &seen)))
        .expect("scope alive");
    let tokens = CompositeSubscription::new();
    tokens.add(sub);
    scope.on_exit(tokens);

    let outcome = channel
        .with(|c| c.emit(CartEvent::Added("pen".into())))
        .expect("scope alive");
    assert_eq!(outcome.invocations(), 1);

    scope.exit().unwrap();

    assert!(!channel.is_alive());
    assert_eq!(channel.with(|c| c.emit(CartEvent::Added("cup".into()))), None::<EmitOutcome>);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(reporter.is_empty());
}

#[test]
fn failures_reach_reporter_not_owner() {
    let reporter = Arc::new(CollectingReporter::new());
    let channel = EventChannel::with_reporter(ChannelConfig::named("cart"), reporter.clone());
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));

    let _broken = channel.subscribe(|event: &CartEvent| {
        if let CartEvent::Removed(item) = event {
            panic!("cannot remove {item}");
        }
    });
    let _ok = channel.subscribe(listener("ok", &seen));

    let outcome = channel.emit(CartEvent::Removed("pen".into()));
    assert_eq!(outcome.failures(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);

    let failures = reporter.take();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("cannot remove pen"));
    assert!(failures[0].to_string().contains("cart"));
}
