//! Shared test support: logging setup and event recorders.

use std::cell::RefCell;
use std::env;
use std::rc::Rc;
use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::{ChangeEnvelope, NodeArena, NodeId, NodeResult, TreeEvent};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "modeldom=trace");
        }
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Shared, growable log filled by a listener.
pub type Recorded<T> = Rc<RefCell<Vec<T>>>;

/// Record every change envelope seen by `id`'s listeners.
pub fn record_changes(arena: &mut NodeArena, id: NodeId) -> NodeResult<Recorded<ChangeEnvelope>> {
    let log: Recorded<ChangeEnvelope> = Rc::default();
    let sink = Rc::clone(&log);
    arena.subscribe(id, move |envelope| sink.borrow_mut().push(envelope.clone()))?;
    Ok(log)
}

/// Record every tree event delivered while `id` is a root.
pub fn record_tree_events(arena: &mut NodeArena, id: NodeId) -> NodeResult<Recorded<TreeEvent>> {
    let log: Recorded<TreeEvent> = Rc::default();
    let sink = Rc::clone(&log);
    arena.subscribe_tree(id, move |event| sink.borrow_mut().push(event.clone()))?;
    Ok(log)
}

/// Operation names in arrival order.
pub fn operations(log: &Recorded<ChangeEnvelope>) -> Vec<&'static str> {
    log.borrow().iter().map(ChangeEnvelope::operation).collect()
}
