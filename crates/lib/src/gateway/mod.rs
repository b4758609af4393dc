//! Gateway: HTTP server for platform webhooks.
//!
//! Every POST to the webhook route is acknowledged with HTTP 200 and a fixed-shape JSON body,
//! whatever happens downstream, so the platform never retries a delivery.

mod protocol;
mod server;

pub use protocol::{WebhookAck, WebhookEnvelope};
pub use server::{accept_webhook, router, run_gateway, GatewayState};
