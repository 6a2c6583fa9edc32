// tests/observer.rs

use std::sync::{Arc, Mutex};

use tandem::observer::Observers;

#[test]
fn handlers_run_in_subscription_order() {
    let observers: Observers<u32> = Observers::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&log);
    observers.subscribe(move |n| first.lock().unwrap().push(("first", *n)));
    let second = Arc::clone(&log);
    observers.subscribe(move |n| second.lock().unwrap().push(("second", *n)));

    observers.emit(&7);
    assert_eq!(*log.lock().unwrap(), vec![("first", 7), ("second", 7)]);
}

#[test]
fn detaching_one_subscription_keeps_the_others() {
    let observers: Observers<&'static str> = Observers::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let a = Arc::clone(&log);
    let id_a = observers.subscribe(move |e| a.lock().unwrap().push(format!("a:{e}")));
    let b = Arc::clone(&log);
    observers.subscribe(move |e| b.lock().unwrap().push(format!("b:{e}")));
    assert_eq!(observers.len(), 2);

    assert!(observers.unsubscribe(id_a));
    assert!(!observers.unsubscribe(id_a), "second detach is a no-op");
    observers.emit(&"x");

    assert_eq!(*log.lock().unwrap(), vec!["b:x".to_string()]);
    assert_eq!(observers.len(), 1);
}

#[test]
fn clones_share_the_list() {
    let observers: Observers<()> = Observers::new();
    let handle = observers.clone();
    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);
    handle.subscribe(move |_| *counter.lock().unwrap() += 1);

    observers.emit(&());
    assert_eq!(*hits.lock().unwrap(), 1);
    assert!(!observers.is_empty());
}
