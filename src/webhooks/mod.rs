//! Signed webhook fan-out for job lifecycle events.

pub mod delivery;
pub mod events;
pub mod signing;

pub use delivery::WebhookDeliveryEngine;
pub use events::build_event_body;
pub use signing::{generate_webhook_secret, sign_payload, verify_signature};
