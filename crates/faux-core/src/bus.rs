use std::any::{type_name, Any, TypeId};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, trace, warn};

/// Dispatch order of a subscription. Higher values fire first.
pub type Priority = i32;

/// Priority used by [`EventBus::subscribe`].
pub const DEFAULT_PRIORITY: Priority = 0;

/// A subscriber callback for events of kind `E`.
///
/// Handlers are compared by pointer identity when unsubscribing, so keep a
/// clone of the `Arc` you subscribed with.
pub type Handler<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<E, F>(f: F) -> Handler<E>
where
    E: ?Sized + 'static,
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Subscribers sharing one priority, in registration order.
struct Tier<E: ?Sized> {
    priority: Priority,
    handlers: Vec<Handler<E>>,
}

impl<E: ?Sized> Clone for Tier<E> {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            handlers: self.handlers.clone(),
        }
    }
}

/// Tiers for one event kind, sorted by descending priority.
type Tiers<E> = Vec<Tier<E>>;

type Registry = HashMap<TypeId, Box<dyn Any + Send>>;

/// A synchronous, priority-ordered publish/subscribe bus keyed by event type.
///
/// The event kind is the static type a handler is registered for. Concrete
/// payload types are their own kind; an event family can be modelled as a
/// trait object (`dyn MyEvents`) and published with [`EventBus::publish_as`].
///
/// Dispatch runs on the publisher's thread. The registry is snapshotted under
/// the lock and handlers run outside it, so a handler may subscribe,
/// unsubscribe or publish without deadlocking. Changes made during a publish
/// take effect from the next publish.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    /// Create an empty event bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events of kind `E` at [`DEFAULT_PRIORITY`].
    pub fn subscribe<E: ?Sized + 'static>(&self, handler: Handler<E>) {
        self.subscribe_with_priority(handler, DEFAULT_PRIORITY);
    }

    /// Subscribe `handler` to events of kind `E`.
    ///
    /// The same handler may be registered more than once; every registration
    /// fires independently.
    pub fn subscribe_with_priority<E: ?Sized + 'static>(
        &self,
        handler: Handler<E>,
        priority: Priority,
    ) {
        let mut registry = self.lock();
        let slot = registry
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Tiers::<E>::new()));
        let Some(tiers) = slot.downcast_mut::<Tiers<E>>() else {
            error!(kind = type_name::<E>(), "event registry slot holds another kind");
            return;
        };

        match tiers.binary_search_by_key(&Reverse(priority), |tier| Reverse(tier.priority)) {
            Ok(idx) => tiers[idx].handlers.push(handler),
            Err(idx) => tiers.insert(
                idx,
                Tier {
                    priority,
                    handlers: vec![handler],
                },
            ),
        }
        debug!(kind = type_name::<E>(), priority, "subscribed");
    }

    /// Remove the first registration of `handler` at [`DEFAULT_PRIORITY`].
    pub fn unsubscribe<E: ?Sized + 'static>(&self, handler: &Handler<E>) -> bool {
        self.unsubscribe_with_priority(handler, DEFAULT_PRIORITY)
    }

    /// Remove the first registration of `handler` at exactly `priority`.
    ///
    /// Returns `false` when no such registration exists. Registrations of the
    /// same handler at other priorities are left alone.
    pub fn unsubscribe_with_priority<E: ?Sized + 'static>(
        &self,
        handler: &Handler<E>,
        priority: Priority,
    ) -> bool {
        let kind = TypeId::of::<E>();
        let mut registry = self.lock();
        let Some(tiers) = registry
            .get_mut(&kind)
            .and_then(|slot| slot.downcast_mut::<Tiers<E>>())
        else {
            return false;
        };
        let Ok(idx) =
            tiers.binary_search_by_key(&Reverse(priority), |tier| Reverse(tier.priority))
        else {
            return false;
        };
        let tier = &mut tiers[idx];
        let Some(pos) = tier.handlers.iter().position(|h| Arc::ptr_eq(h, handler)) else {
            return false;
        };

        tier.handlers.remove(pos);
        if tier.handlers.is_empty() {
            tiers.remove(idx);
        }
        if tiers.is_empty() {
            registry.remove(&kind);
        }
        debug!(kind = type_name::<E>(), priority, "unsubscribed");
        true
    }

    /// Publish `event` to the subscribers of its concrete type.
    pub fn publish<E: 'static>(&self, event: &E) {
        self.publish_as::<E>(event);
    }

    /// Publish `event` to the subscribers of the declared kind `K`.
    ///
    /// With `K` a trait object, publishers can emit concrete variants while
    /// subscribers depend only on the family:
    /// `bus.publish_as::<dyn StorageEvent>(&ItemStored { .. })`.
    pub fn publish_as<K: ?Sized + 'static>(&self, event: &K) {
        let snapshot: Tiers<K> = {
            let registry = self.lock();
            match registry
                .get(&TypeId::of::<K>())
                .and_then(|slot| slot.downcast_ref::<Tiers<K>>())
            {
                Some(tiers) => tiers.clone(),
                None => {
                    trace!(kind = type_name::<K>(), "no subscribers");
                    return;
                }
            }
        };

        trace!(kind = type_name::<K>(), tiers = snapshot.len(), "publishing");
        for tier in &snapshot {
            for handler in &tier.handlers {
                dispatch(handler, event, tier.priority);
            }
        }
    }

    /// Number of live registrations for kind `E`.
    pub fn subscriber_count<E: ?Sized + 'static>(&self) -> usize {
        self.lock()
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_ref::<Tiers<E>>())
            .map_or(0, |tiers| tiers.iter().map(|tier| tier.handlers.len()).sum())
    }

    /// Number of event kinds with at least one subscriber.
    pub fn kind_count(&self) -> usize {
        self.lock().len()
    }

    // Handlers never run under the lock, so a poisoned guard still holds a
    // consistent registry.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn dispatch<K: ?Sized + 'static>(handler: &Handler<K>, event: &K, priority: Priority) {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(kind = type_name::<K>(), priority, "event handler failed: {err:#}");
        }
        Err(payload) => {
            error!(
                kind = type_name::<K>(),
                priority,
                "event handler panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{new_log_buffer, BufferLayer, LogLevel};
    use anyhow::bail;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    type CallLog = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &CallLog, tag: &'static str) -> Handler<Ping> {
        let log = Arc::clone(log);
        handler(move |ping: &Ping| {
            log.lock().unwrap().push(format!("{tag}:{}", ping.0));
            Ok(())
        })
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn higher_priority_fires_first_and_ties_keep_registration_order() {
        let bus = EventBus::new();
        let log = CallLog::default();
        bus.subscribe_with_priority(recorder(&log, "a"), 5);
        bus.subscribe_with_priority(recorder(&log, "b"), 0);
        bus.subscribe_with_priority(recorder(&log, "c"), 5);

        bus.publish(&Ping(1));
        assert_eq!(calls(&log), vec!["a:1", "c:1", "b:1"]);
    }

    #[test]
    fn negative_priorities_fire_after_default() {
        let bus = EventBus::new();
        let log = CallLog::default();
        bus.subscribe_with_priority(recorder(&log, "late"), -10);
        bus.subscribe(recorder(&log, "normal"));
        bus.subscribe_with_priority(recorder(&log, "early"), 10);

        bus.publish(&Ping(7));
        assert_eq!(calls(&log), vec!["early:7", "normal:7", "late:7"]);
    }

    #[test]
    fn failing_handler_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let log = CallLog::default();
        bus.subscribe_with_priority(handler(|_: &Ping| bail!("boom")), 10);
        bus.subscribe_with_priority(
            handler(|_: &Ping| -> anyhow::Result<()> { panic!("kaboom") }),
            5,
        );
        bus.subscribe(recorder(&log, "after"));

        bus.publish(&Ping(3));
        assert_eq!(calls(&log), vec!["after:3"]);
    }

    #[test]
    fn handler_faults_are_logged() {
        let bus = EventBus::new();
        bus.subscribe(handler(|_: &Ping| bail!("disk on fire")));
        bus.subscribe_with_priority(
            handler(|_: &Ping| -> anyhow::Result<()> { panic!("bad state") }),
            -1,
        );

        let buffer = new_log_buffer(16);
        let subscriber = tracing_subscriber::registry().with(BufferLayer::new(buffer.clone(), 16));
        tracing::subscriber::with_default(subscriber, || bus.publish(&Ping(0)));

        let entries = buffer.lock().unwrap();
        let warn = entries
            .iter()
            .find(|e| e.level == LogLevel::Warn)
            .expect("warn entry");
        assert!(warn.message.contains("disk on fire"));
        let err = entries
            .iter()
            .find(|e| e.level == LogLevel::Error)
            .expect("error entry");
        assert!(err.message.contains("bad state"));
    }

    #[test]
    fn unsubscribe_only_removes_matching_priority() {
        let bus = EventBus::new();
        let log = CallLog::default();
        let h = recorder(&log, "h");
        bus.subscribe_with_priority(h.clone(), 5);
        bus.subscribe(h.clone());

        assert!(bus.unsubscribe_with_priority(&h, 5));
        bus.publish(&Ping(2));
        assert_eq!(calls(&log), vec!["h:2"]);
        assert_eq!(bus.subscriber_count::<Ping>(), 1);
    }

    #[test]
    fn unsubscribe_removes_first_duplicate_only() {
        let bus = EventBus::new();
        let log = CallLog::default();
        let h = recorder(&log, "h");
        bus.subscribe(h.clone());
        bus.subscribe(h.clone());

        bus.publish(&Ping(1));
        assert!(bus.unsubscribe(&h));
        bus.publish(&Ping(2));
        assert_eq!(calls(&log), vec!["h:1", "h:1", "h:2"]);
    }

    #[test]
    fn unsubscribe_unknown_handler_is_noop() {
        let bus = EventBus::new();
        let log = CallLog::default();
        bus.subscribe(recorder(&log, "kept"));

        // Same behaviour, different allocation: not the registered handler.
        assert!(!bus.unsubscribe(&recorder(&log, "kept")));
        assert!(!bus.unsubscribe_with_priority(&recorder(&log, "kept"), 3));
        assert!(!bus.unsubscribe(&handler(|_: &Pong| Ok(()))));
        assert_eq!(bus.subscriber_count::<Ping>(), 1);
    }

    #[test]
    fn last_unsubscribe_drops_kind_entry() {
        let bus = EventBus::new();
        let log = CallLog::default();
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");
        bus.subscribe_with_priority(a.clone(), 1);
        bus.subscribe(b.clone());
        assert_eq!(bus.kind_count(), 1);

        bus.unsubscribe_with_priority(&a, 1);
        assert_eq!(bus.kind_count(), 1);
        bus.unsubscribe(&b);
        assert_eq!(bus.kind_count(), 0);
        assert_eq!(bus.subscriber_count::<Ping>(), 0);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(&Pong);
        assert_eq!(bus.kind_count(), 0);
    }

    #[test]
    fn kinds_are_separate_channels() {
        let bus = EventBus::new();
        let log = CallLog::default();
        bus.subscribe(recorder(&log, "ping"));

        bus.publish(&Pong);
        assert!(calls(&log).is_empty());
    }

    trait StorageEvent: Send + Sync {
        fn name(&self) -> String;
    }

    struct ItemStored(&'static str);
    struct ItemTaken(&'static str);

    impl StorageEvent for ItemStored {
        fn name(&self) -> String {
            format!("stored {}", self.0)
        }
    }

    impl StorageEvent for ItemTaken {
        fn name(&self) -> String {
            format!("taken {}", self.0)
        }
    }

    #[test]
    fn publish_as_reaches_family_subscribers() {
        let bus = EventBus::new();
        let log = CallLog::default();
        let sink = Arc::clone(&log);
        bus.subscribe(handler::<dyn StorageEvent, _>(move |ev| {
            sink.lock().unwrap().push(ev.name());
            Ok(())
        }));
        let concrete = Arc::clone(&log);
        bus.subscribe(handler(move |_: &ItemStored| {
            concrete.lock().unwrap().push("concrete".into());
            Ok(())
        }));

        bus.publish_as::<dyn StorageEvent>(&ItemStored("wood"));
        bus.publish_as::<dyn StorageEvent>(&ItemTaken("stone"));
        assert_eq!(calls(&log), vec!["stored wood", "taken stone"]);

        bus.publish(&ItemStored("clay"));
        assert_eq!(calls(&log).last().unwrap(), "concrete");
    }

    #[test]
    fn handler_may_subscribe_during_publish() {
        let bus = Arc::new(EventBus::new());
        let log = CallLog::default();
        let late = recorder(&log, "late");
        let inner = Arc::clone(&bus);
        bus.subscribe(handler(move |_: &Ping| {
            inner.subscribe(late.clone());
            Ok(())
        }));

        bus.publish(&Ping(1));
        assert!(calls(&log).is_empty());

        bus.publish(&Ping(2));
        assert_eq!(calls(&log), vec!["late:2"]);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_publish() {
        let bus = Arc::new(EventBus::new());
        let log = CallLog::default();
        let slot: Arc<Mutex<Option<Handler<Ping>>>> = Arc::default();

        let inner = Arc::clone(&bus);
        let me = Arc::clone(&slot);
        let sink = Arc::clone(&log);
        let once = handler(move |ping: &Ping| {
            sink.lock().unwrap().push(format!("once:{}", ping.0));
            if let Some(h) = me.lock().unwrap().take() {
                inner.unsubscribe(&h);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(once.clone());
        bus.subscribe(once);

        bus.publish(&Ping(1));
        bus.publish(&Ping(2));
        assert_eq!(calls(&log), vec!["once:1"]);
        assert_eq!(bus.kind_count(), 0);
    }

    #[test]
    fn handler_may_publish_during_publish() {
        let bus = Arc::new(EventBus::new());
        let log = CallLog::default();
        bus.subscribe(recorder(&log, "ping"));

        let inner = Arc::clone(&bus);
        let sink = Arc::clone(&log);
        bus.subscribe(handler(move |_: &Pong| {
            sink.lock().unwrap().push("pong".into());
            inner.publish(&Ping(4));
            Ok(())
        }));
        let again = Arc::clone(&bus);
        bus.subscribe_with_priority(
            handler(move |ping: &Ping| {
                if ping.0 == 4 {
                    again.publish(&Ping(5));
                }
                Ok(())
            }),
            10,
        );

        bus.publish(&Pong);
        assert_eq!(calls(&log), vec!["pong", "ping:5", "ping:4"]);
    }

    #[test]
    fn unsubscribe_during_publish_applies_next_time() {
        let bus = Arc::new(EventBus::new());
        let log = CallLog::default();
        let victim = recorder(&log, "victim");

        let inner = Arc::clone(&bus);
        let target = victim.clone();
        let sink = Arc::clone(&log);
        bus.subscribe(handler(move |ping: &Ping| {
            sink.lock().unwrap().push(format!("remover:{}", ping.0));
            inner.unsubscribe(&target);
            Ok(())
        }));
        bus.subscribe(victim);

        bus.publish(&Ping(1));
        assert_eq!(calls(&log), vec!["remover:1", "victim:1"]);

        bus.publish(&Ping(2));
        assert_eq!(calls(&log), vec!["remover:1", "victim:1", "remover:2"]);
        assert_eq!(bus.subscriber_count::<Ping>(), 1);
    }

    #[test]
    fn signals_are_keyed_by_their_value_type() {
        use crate::event::Signal;

        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Stage {
            IntegrationsReady,
        }

        let bus = EventBus::new();
        let log = CallLog::default();
        let sink = Arc::clone(&log);
        bus.subscribe(handler(move |signal: &Signal<Stage>| {
            sink.lock().unwrap().push(format!("{:?}", signal.value()));
            Ok(())
        }));

        bus.publish(&Signal(7u8));
        bus.publish(&Signal(Stage::IntegrationsReady));
        assert_eq!(calls(&log), vec!["IntegrationsReady"]);
    }

    #[test]
    fn concurrent_subscribers_are_all_registered() {
        let bus = Arc::new(EventBus::new());
        let log = CallLog::default();
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let bus = Arc::clone(&bus);
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    bus.subscribe_with_priority(recorder(&log, "t"), i);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(bus.subscriber_count::<Ping>(), 8);
        bus.publish(&Ping(9));
        assert_eq!(calls(&log).len(), 8);
    }

    #[test]
    fn config_changed_scenario() {
        use crate::event::ConfigChanged;

        let bus = EventBus::new();
        let log = CallLog::default();
        let a = Arc::clone(&log);
        bus.subscribe_with_priority(
            handler(move |ev: &ConfigChanged<u8>| {
                a.lock().unwrap().push(format!("handlerA({})", ev.config));
                Ok(())
            }),
            10,
        );
        let b = Arc::clone(&log);
        bus.subscribe(handler(move |ev: &ConfigChanged<u8>| {
            b.lock().unwrap().push(format!("handlerB({})", ev.config));
            Ok(())
        }));

        bus.publish(&ConfigChanged::new(4u8));
        assert_eq!(calls(&log), vec!["handlerA(4)", "handlerB(4)"]);
    }
}
