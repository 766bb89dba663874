//! Request pipeline: classify, authenticate, dispatch

use serde_json::Value;

use crate::intent::IntentEngine;
use crate::protocol::{DirectiveError, Inbound};
use crate::router::DirectiveRouter;
use crate::security::AuthGate;

/// One entry point for every inbound request
pub struct Bridge {
    gate: AuthGate,
    router: DirectiveRouter,
    engine: IntentEngine,
}

impl Bridge {
    #[must_use]
    pub const fn new(gate: AuthGate, router: DirectiveRouter, engine: IntentEngine) -> Self {
        Self {
            gate,
            router,
            engine,
        }
    }

    /// Answer one JSON request
    ///
    /// Never fails: rejected and unparseable requests are answered with
    /// their error envelope.
    pub async fn handle(&self, body: Value) -> Value {
        let inbound = match Inbound::parse(body) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "unsupported request");
                return DirectiveError::UnsupportedOperation.to_response();
            }
        };

        let principal = match self.gate.authenticate(&inbound).await {
            Ok(principal) => principal,
            Err(e) => return e.to_response(),
        };
        let room = principal.id().and_then(|id| self.gate.room_of(id));

        match &inbound {
            Inbound::Skill(envelope) => {
                let response = self.engine.handle(envelope).await;
                serde_json::to_value(response).unwrap_or_else(|e| {
                    tracing::error!(error = %e, "failed to serialize skill response");
                    Value::Null
                })
            }
            Inbound::SmartHomeV2(directive) => self.router.route_v2(directive, room).await,
            Inbound::SmartHomeV3(directive) => self.router.route_v3(directive, room).await,
        }
    }
}
