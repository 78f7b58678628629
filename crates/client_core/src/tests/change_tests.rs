use super::*;
use std::sync::atomic::AtomicUsize;

fn counter(count: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + 'static {
    let count = Arc::clone(count);
    move || {
        count.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn emit_notifies_every_listener_once() {
    let notifier = ChangeNotifier::new("test");
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));
    notifier.add_listener(counter(&a));
    notifier.add_listener(counter(&b));

    notifier.emit();

    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.revision(), 1);
}

#[test]
fn removed_listener_is_not_notified() {
    let notifier = ChangeNotifier::new("test");
    let count = Arc::new(AtomicUsize::new(0));
    let token = notifier.add_listener(counter(&count));

    assert!(notifier.remove_listener(token));
    assert!(!notifier.remove_listener(token));
    notifier.emit();

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(notifier.listener_count(), 0);
}

#[test]
fn listener_may_unsubscribe_itself_during_emit() {
    let notifier = Arc::new(ChangeNotifier::new("test"));
    let count = Arc::new(AtomicUsize::new(0));
    let token_slot: Arc<Mutex<Option<ListenerToken>>> = Arc::new(Mutex::new(None));

    let weak = Arc::downgrade(&notifier);
    let slot = Arc::clone(&token_slot);
    let seen = Arc::clone(&count);
    let token = notifier.add_listener(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        let token = *slot.lock().expect("slot lock");
        if let (Some(notifier), Some(token)) = (weak.upgrade(), token) {
            notifier.remove_listener(token);
        }
    });
    *token_slot.lock().expect("slot lock") = Some(token);

    notifier.emit();
    notifier.emit();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn broadcast_subscribers_receive_revisions() {
    let notifier = ChangeNotifier::new("users");
    let mut rx = notifier.subscribe();

    notifier.emit();
    notifier.emit();

    assert_eq!(
        rx.recv().await.expect("first change"),
        StoreChange {
            store: "users",
            revision: 1
        }
    );
    assert_eq!(rx.recv().await.expect("second change").revision, 2);
}
