// crates/tictactwo-client/src/router.rs

use std::collections::HashMap;

use tictactwo_core::{EventKind, InboundEvent};
use tictactwo_protocol::{decode_event, envelope_tag};
use tracing::{debug, warn};

type Handler<C> = Box<dyn FnMut(&mut C, &InboundEvent) + Send>;

/// What happened to one inbound body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Decoded and passed to this many handlers.
    Dispatched(usize),
    /// Unknown tag, or no handler registered for it.
    Ignored,
    /// Not valid JSON, no tag, or a known tag with a bad payload.
    Malformed,
}

/// Dispatches inbound bodies by `type` tag.
///
/// Handlers receive the consumer's context `C` mutably, so the router
/// itself holds nothing but the handler table.
pub struct MessageRouter<C> {
    handlers: HashMap<EventKind, Vec<Handler<C>>>,
}

impl<C> Default for MessageRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> MessageRouter<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `kind`. Handlers for the same kind run in
    /// registration order.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: FnMut(&mut C, &InboundEvent) + Send + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    /// Register `handler` for several kinds at once.
    pub fn on_each<F>(&mut self, kinds: &[EventKind], handler: F) -> &mut Self
    where
        F: FnMut(&mut C, &InboundEvent) + Clone + Send + 'static,
    {
        for &kind in kinds {
            self.on(kind, handler.clone());
        }
        self
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.get(&kind).is_some_and(|list| !list.is_empty())
    }

    /// Decode `body` and run every handler registered for its tag.
    pub fn route(&mut self, ctx: &mut C, body: &str) -> RouteOutcome {
        let event = match decode_event(body) {
            Ok(Some(event)) => event,
            Ok(None) => {
                let tag = envelope_tag(body).unwrap_or_default();
                debug!("Ignoring message with unknown type {:?}", tag);
                return RouteOutcome::Ignored;
            }
            Err(e) => {
                warn!("Malformed message: {}", e);
                return RouteOutcome::Malformed;
            }
        };
        self.dispatch(ctx, &event)
    }

    /// Run the handlers for an already-decoded event.
    pub fn dispatch(&mut self, ctx: &mut C, event: &InboundEvent) -> RouteOutcome {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get_mut(&kind) else {
            debug!("No handler for {}", kind.tag());
            return RouteOutcome::Ignored;
        };
        if handlers.is_empty() {
            return RouteOutcome::Ignored;
        }

        for handler in handlers.iter_mut() {
            handler(ctx, event);
        }
        RouteOutcome::Dispatched(handlers.len())
    }
}
