//! Kind-keyed publish/subscribe router for envelopes

use crate::codec::Envelope;
use crate::connection::Connection;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

type Handler = Box<dyn Fn(Envelope, Arc<Connection>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Routes decoded envelopes, including the synthesized `connect` /
/// `disconnect` / `error` ones, to the handlers subscribed to their kind.
#[derive(Default)]
pub struct DispatchBus {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl DispatchBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to a message kind. Handlers for a kind run in
    /// registration order.
    pub fn subscribe<F, Fut>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(Envelope, Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut handlers = self.handlers.write().unwrap();
        handlers
            .entry(kind.into())
            .or_default()
            .push(Box::new(move |envelope, conn| {
                handler(envelope, conn).boxed()
            }));
    }

    /// Deliver an envelope to every handler subscribed to its kind, along
    /// with the originating connection.
    ///
    /// A panicking handler is caught and logged so it cannot prevent
    /// delivery to the remaining handlers.
    pub async fn publish(&self, envelope: Envelope, conn: Arc<Connection>) {
        let futures: Vec<BoxFuture<'static, ()>> = {
            let handlers = self.handlers.read().unwrap();
            match handlers.get(&envelope.kind) {
                Some(list) => list
                    .iter()
                    .map(|handler| handler(envelope.clone(), Arc::clone(&conn)))
                    .collect(),
                None => {
                    debug!(kind = %envelope.kind, "no subscribers for envelope kind");
                    return;
                }
            }
        };

        for future in futures {
            if AssertUnwindSafe(future).catch_unwind().await.is_err() {
                error!(kind = %envelope.kind, connection = %conn.id, "message handler panicked");
            }
        }
    }
}
