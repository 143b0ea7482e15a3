//! Per-update pipeline: validate, drop self-loops, route, contain failures.
//!
//! Every update handed to the [`Dispatcher`] reaches exactly one terminal
//! [`DispatchOutcome`]. Handler errors, timeouts and panics end up in the
//! diagnostic store instead of propagating to the caller. The dispatcher
//! never touches the update cursor.

use std::{any::Any, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use hlb_core::{
    config::Config,
    diagnostics::{DiagnosticKind, ErrorRecorder},
    domain::{Route, UserId},
    entitlement::EntitlementBroker,
    errors::Error,
    platform::{chat_params, PlatformApi},
    update::InboundEvent,
    Result,
};

use crate::handlers::{group::GroupChatHandler, private::PrivateChatHandler};

/// Reply for messages from chats of a kind no handler covers.
pub const UNKNOWN_UPDATE_REPLY: &str = "DEBUG: Unknown update type, sorry...";

/// Everything a handler may reach.
#[derive(Clone)]
pub struct HandlerContext {
    pub cfg: Arc<Config>,
    pub api: Arc<dyn PlatformApi>,
    pub broker: Arc<EntitlementBroker>,
}

#[async_trait]
pub trait ChatHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()>;
}

/// One handler per routed chat family.
#[derive(Clone)]
pub struct Handlers {
    pub private: Arc<dyn ChatHandler>,
    pub group: Arc<dyn ChatHandler>,
}

impl Handlers {
    pub fn builtin() -> Self {
        Self {
            private: Arc::new(PrivateChatHandler),
            group: Arc::new(GroupChatHandler),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The update could not be parsed; a `malformed` record was written.
    Malformed,
    /// Sent by the bot itself; dropped without side effects.
    SelfLoop,
    /// Handled. `None` when the update was not a message and no handler ran.
    Completed(Option<Route>),
    /// A handler failed; a `handler_error` record was written. `None` when
    /// the pipeline task itself died.
    Failed(Option<Route>),
}

pub struct Dispatcher {
    ctx: HandlerContext,
    handlers: Handlers,
    recorder: ErrorRecorder,
}

impl Dispatcher {
    pub fn new(ctx: HandlerContext, handlers: Handlers) -> Self {
        let recorder = ErrorRecorder::new(ctx.cfg.diagnostics_dir());
        Self {
            ctx,
            handlers,
            recorder,
        }
    }

    pub fn recorder(&self) -> &ErrorRecorder {
        &self.recorder
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Process one raw update in its own task, so that even a panicking
    /// handler leaves the caller running.
    pub async fn dispatch(self: &Arc<Self>, raw: Value) -> DispatchOutcome {
        let event_id = InboundEvent::raw_event_id(&raw);
        let this = Arc::clone(self);

        match tokio::spawn(async move { this.process_update(raw).await }).await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    format!("handler panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "update task was cancelled".to_string()
                };
                self.recorder
                    .record(event_id, DiagnosticKind::HandlerError, &message, "");
                DispatchOutcome::Failed(None)
            }
        }
    }

    /// Run the pipeline inline on the current task.
    pub async fn process_update(&self, raw: Value) -> DispatchOutcome {
        let event_id = InboundEvent::raw_event_id(&raw);
        let event = match InboundEvent::from_json(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                self.recorder
                    .record_error(event_id, DiagnosticKind::Malformed, &e, &raw.to_string());
                return DispatchOutcome::Malformed;
            }
        };

        if event.is_from(UserId(self.ctx.cfg.bot_user_id)) {
            tracing::trace!(event_id, "dropping update sent by the bot itself");
            return DispatchOutcome::SelfLoop;
        }

        if self.ctx.cfg.debug || event.message().is_none() {
            self.recorder.dump_update(event.event_id, &event.raw);
        }

        let Some(route) = event.route() else {
            tracing::debug!(
                event_id,
                field = event.payload.as_ref().map(|p| p.field.as_str()).unwrap_or("-"),
                "no handler for update"
            );
            return DispatchOutcome::Completed(None);
        };

        match self.run_handler(route, &event).await {
            Ok(()) => {
                tracing::debug!(event_id, ?route, "update handled");
                DispatchOutcome::Completed(Some(route))
            }
            Err(e) => {
                let context = format!(
                    "route={route:?} chat_id={}",
                    event.chat_id().map(|c| c.0).unwrap_or_default()
                );
                self.recorder
                    .record_error(event_id, DiagnosticKind::HandlerError, &e, &context);
                DispatchOutcome::Failed(Some(route))
            }
        }
    }

    async fn run_handler(&self, route: Route, event: &InboundEvent) -> Result<()> {
        let handler = async {
            match route {
                Route::Private => self.handlers.private.handle(&self.ctx, event).await,
                Route::Group => self.handlers.group.handle(&self.ctx, event).await,
                Route::Default => self.reply_unknown(event).await,
            }
        };

        let deadline = self.ctx.cfg.handler_timeout;
        tokio::time::timeout(deadline, handler)
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout(format!(
                    "handler for update {} exceeded {}s",
                    event.event_id,
                    deadline.as_secs_f32()
                )))
            })
    }

    async fn reply_unknown(&self, event: &InboundEvent) -> Result<()> {
        let Some(chat_id) = event.chat_id() else {
            return Ok(());
        };
        self.ctx
            .api
            .send_message(UNKNOWN_UPDATE_REPLY, chat_params(chat_id))
            .await?;
        Ok(())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}
