pub mod error;
pub mod poll;
pub mod snmp_ber;
pub mod trap;
pub mod webhook;

pub use error::IngestError;
pub use poll::{CredentialResolver, NoopCredentialResolver, PollIngestor};
pub use trap::TrapIngestor;
pub use webhook::{router as webhook_router, WebhookState};
