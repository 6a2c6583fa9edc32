#![allow(dead_code)]

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use tandem_test_utils::{
    init_tracing, with_timeout, CommandSectionBuilder, ConfigFileBuilder, FakeConnector,
    FakeExecutor, FakeScript, Harness, HarnessBuilder, SharedSink, test_options,
};

pub type TestResult = Result<(), Box<dyn Error>>;

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Shared event log for observer-based assertions.
pub fn recorder<E: Clone + Send + 'static>() -> (Arc<Mutex<Vec<E>>>, impl FnMut(&E) + Send + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |event: &E| sink.lock().unwrap().push(event.clone()))
}
