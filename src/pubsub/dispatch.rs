//! Handler dispatch.
//!
//! Every inbound event is fanned out as one independent unit of work per
//! handler, so handler code never runs on the connection's event loop and a
//! failing handler cannot stop delivery to the others.
//!
//! | Mode | Execution context |
//! |------|-------------------|
//! | [`DispatchMode::Serial`] | one dedicated `pubsub-dispatch` thread, FIFO |
//! | [`DispatchMode::Background`] | Tokio blocking pool, one task per unit |

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::config::DispatchMode;
use crate::error::{Error, Result};
use crate::protocol::InboundEvent;

// ============================================================================
// Constants
// ============================================================================

/// Name of the serial dispatch thread.
const DISPATCH_THREAD_NAME: &str = "pubsub-dispatch";

// ============================================================================
// MessageHandler
// ============================================================================

/// Receives events for the channels it is subscribed to.
///
/// Implemented for any `Fn(&InboundEvent) + Send + Sync + 'static`.
pub trait MessageHandler: Send + Sync + 'static {
    /// Called once per event, on the client's dispatch context.
    fn on_event(&self, event: &InboundEvent);
}

impl<F> MessageHandler for F
where
    F: Fn(&InboundEvent) + Send + Sync + 'static,
{
    #[inline]
    fn on_event(&self, event: &InboundEvent) {
        self(event);
    }
}

/// Shared handler reference. Identity is the `Arc` pointer.
pub type Handler = Arc<dyn MessageHandler>;

/// Unit of work submitted to the execution context.
type Job = Box<dyn FnOnce() + Send + 'static>;

// ============================================================================
// Dispatcher
// ============================================================================

enum Executor {
    Serial(mpsc::UnboundedSender<Job>),
    Background(Handle),
}

/// Runs handler invocations on the configured execution context.
pub(crate) struct Dispatcher {
    executor: Executor,
}

impl Dispatcher {
    /// Creates a dispatcher; serial mode starts its thread here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the dispatch thread cannot be spawned.
    pub(crate) fn new(mode: DispatchMode, runtime: Handle) -> Result<Self> {
        let executor = match mode {
            DispatchMode::Serial => {
                let (job_tx, job_rx) = mpsc::unbounded_channel();
                thread::Builder::new()
                    .name(DISPATCH_THREAD_NAME.to_owned())
                    .spawn(move || run_serial(job_rx))
                    .map_err(|e| Error::config(format!("failed to start dispatch thread: {e}")))?;
                Executor::Serial(job_tx)
            }
            DispatchMode::Background => Executor::Background(runtime),
        };

        Ok(Self { executor })
    }

    /// Returns the mode this dispatcher runs in.
    #[must_use]
    pub(crate) fn mode(&self) -> DispatchMode {
        match self.executor {
            Executor::Serial(_) => DispatchMode::Serial,
            Executor::Background(_) => DispatchMode::Background,
        }
    }

    /// Delivers `event` to every handler in the snapshot.
    pub(crate) fn dispatch(&self, event: InboundEvent, handlers: Vec<Handler>) {
        if handlers.is_empty() {
            debug!(channel = %event.channel, "No handlers for channel, event dropped");
            return;
        }

        trace!(channel = %event.channel, handlers = handlers.len(), "Dispatching event");

        let event = Arc::new(event);
        for handler in handlers {
            let event = Arc::clone(&event);
            self.submit(Box::new(move || handler.on_event(&event)));
        }
    }

    fn submit(&self, job: Job) {
        match &self.executor {
            Executor::Serial(job_tx) => {
                if job_tx.send(job).is_err() {
                    warn!("Dispatch thread stopped, event dropped");
                }
            }
            Executor::Background(runtime) => {
                runtime.spawn_blocking(move || run_isolated(job));
            }
        }
    }
}

/// Serial dispatch thread body. Ends when the dispatcher is dropped.
fn run_serial(mut job_rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = job_rx.blocking_recv() {
        run_isolated(job);
    }
    debug!("Dispatch thread terminated");
}

fn run_isolated(job: Job) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
        error!(panic = panic_message(panic.as_ref()), "Message handler panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// ============================================================================
// Tests
// ============================================================================
