//! Access-checked dispatch of product commands.
//!
//! ```text
//! ProductCommand
//!   ↓
//! 1. Validate input shape      → 400, no store call
//!   ↓
//! 2. Ask the access guard      → 403, no store call
//!   ↓
//! 3. Exactly one store call
//!   ↓
//! 4. respond() → publish the reply and return it
//! ```
//!
//! Request/response callers (HTTP) use [`ProductApi::handle_as`] with a guard
//! bound to their principal. Pure intercom callers publish command topics and
//! are served by [`ProductApi::listen`] with the API's own guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use facet_auth::AccessGuard;
use facet_events::{Envelope, EventBus, Message};
use facet_products::{ErrorReply, ProductCommand, ProductReply, Reply, topics};

use crate::respond::{publish_reply, respond};
use crate::store::{ProductStore, StoreError};

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("product listener requires a Tokio runtime")]
    NoRuntime,
}

pub struct ProductApi<S, B> {
    store: S,
    bus: B,
    guard: Arc<dyn AccessGuard>,
}

impl<S, B> ProductApi<S, B> {
    pub fn new(store: S, bus: B, guard: impl AccessGuard + 'static) -> Self {
        Self {
            store,
            bus,
            guard: Arc::new(guard),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> ProductApi<S, B>
where
    S: ProductStore,
    B: EventBus<Message>,
{
    /// Handle a command with the API's own guard.
    pub async fn handle(&self, command: ProductCommand) -> Reply {
        let guard = self.guard.clone();
        self.handle_as(guard.as_ref(), command).await
    }

    /// Handle a command on behalf of the caller behind `guard`.
    ///
    /// The reply is published on the intercom and returned.
    pub async fn handle_as(&self, guard: &dyn AccessGuard, command: ProductCommand) -> Reply {
        let reply = self.dispatch(guard, command).await;
        publish_reply(&self.bus, reply.clone());
        reply
    }

    async fn dispatch(&self, guard: &dyn AccessGuard, command: ProductCommand) -> Reply {
        debug!(topic = command.topic(), "product command received");

        command.validate()?;
        self.check_access(guard, &command)?;

        let outcome = self.execute(&command).await;
        respond(outcome, command.not_found_message(), command.error_prefix())
    }

    /// Ask `guard` and record the decision on `check:access`.
    fn check_access(&self, guard: &dyn AccessGuard, command: &ProductCommand) -> Result<(), ErrorReply> {
        let permission = command.permission();
        let decision = guard.check(&permission);

        let audit: Message = Envelope::new(
            topics::CHECK_ACCESS,
            json!({"capability": permission.as_str(), "granted": decision.is_ok()}),
        );
        if let Err(e) = self.bus.publish(audit) {
            warn!(error = %e, "failed to publish access decision");
        }

        decision.map_err(|e| {
            warn!(permission = %permission, error = %e, "product operation denied");
            ErrorReply::forbidden()
        })
    }

    async fn execute(&self, command: &ProductCommand) -> Result<ProductReply, StoreError> {
        match command {
            ProductCommand::Find(q) => {
                let query = q.to_query();
                let data = match &q.id {
                    Some(id) => self
                        .store
                        .find_by_id(id, &query)
                        .await?
                        .map(|doc| Value::Object(query.shape(doc)))
                        .unwrap_or(Value::Null),
                    None => Value::Array(
                        self.store
                            .find(&query)
                            .await?
                            .into_iter()
                            .map(|doc| Value::Object(query.shape(doc)))
                            .collect(),
                    ),
                };
                Ok(ProductReply::Data(data))
            }
            ProductCommand::FindOne(q) => {
                let query = q.to_query();
                let data = self
                    .store
                    .find_one(&query)
                    .await?
                    .map(|doc| Value::Object(query.shape(doc)))
                    .unwrap_or(Value::Null);
                Ok(ProductReply::Data(data))
            }
            ProductCommand::Create(payload) => {
                let Some(records) = payload.records() else {
                    return Ok(ProductReply::Created(Value::Null));
                };
                let stored = self.store.insert(records).await?;
                info!(count = stored.len(), "products created");

                let mut created: Vec<Value> = stored.into_iter().map(Value::Object).collect();
                let data = if payload.is_batch() {
                    Value::Array(created)
                } else {
                    created.pop().unwrap_or(Value::Null)
                };
                Ok(ProductReply::Created(data))
            }
            ProductCommand::Update(q) => {
                let (Some(conditions), Some(updates)) = (&q.conditions, &q.updates) else {
                    return Ok(ProductReply::Updated(Default::default()));
                };
                let result = self.store.update(conditions, updates, &q.options).await?;
                info!(matched = result.matched, modified = result.modified, "products updated");
                Ok(ProductReply::Updated(result))
            }
            ProductCommand::Remove(q) => {
                let Some(conditions) = &q.conditions else {
                    return Ok(ProductReply::Removed(Default::default()));
                };
                let result = self.store.soft_delete(conditions).await?;
                info!(removed = result.removed, "products removed");
                Ok(ProductReply::Removed(result))
            }
        }
    }
}

impl<S, B> ProductApi<S, B>
where
    S: ProductStore + 'static,
    B: EventBus<Message> + 'static,
{
    /// Serve the five product topics from the intercom.
    ///
    /// Runs on a blocking thread until the returned [`ProductListener`] is
    /// stopped or dropped. Other topics are ignored; undecodable payloads get
    /// a 400 on `response:error`.
    pub fn listen(self: Arc<Self>) -> Result<ProductListener, ListenError> {
        let runtime = Handle::try_current().map_err(|_| ListenError::NoRuntime)?;
        let subscription = self.bus.subscribe();
        let stop = Arc::new(AtomicBool::new(false));

        let task = runtime.spawn_blocking({
            let runtime = runtime.clone();
            let stop = stop.clone();
            move || {
                while !stop.load(Ordering::Relaxed) {
                    let message = match subscription.recv_timeout(LISTEN_POLL) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    if !topics::INBOUND.contains(&message.topic()) {
                        continue;
                    }
                    let topic = message.topic().to_string();
                    match ProductCommand::decode(&topic, message.into_payload()) {
                        Ok(Some(command)) => {
                            let reply = runtime.block_on(self.handle(command));
                            debug!(topic = %topic, ok = reply.is_ok(), "bus command served");
                        }
                        Ok(None) => {}
                        Err(reply) => {
                            warn!(topic = %topic, message = %reply.message, "malformed product command");
                            publish_reply(&self.bus, Err(reply));
                        }
                    }
                }
                debug!("product listener stopped");
            }
        });

        Ok(ProductListener { stop, task })
    }
}

/// How often a listener re-checks its stop flag while the bus is quiet.
const LISTEN_POLL: Duration = Duration::from_millis(100);

/// Handle to a running bus listener. Dropping it stops the listener.
#[derive(Debug)]
pub struct ProductListener {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ProductListener {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for the listener thread to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "product listener panicked");
        }
    }
}

impl Drop for ProductListener {
    fn drop(&mut self) {
        self.stop();
    }
}
