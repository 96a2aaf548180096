//! Domain types, fingerprinting, and shared errors for the netwatch alerting
//! platform core: the Addon Registry, Parse Engine, Alert Engine, Event Bus,
//! and ingestors defined across the `netwatch-*` workspace all build on the
//! types in this crate.

pub mod alert;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod manifest;
pub mod severity;
pub mod status;
pub mod target;

pub use alert::{Alert, AlertFilters, AlertStats, ParsedAlert};
pub use error::ManifestError;
pub use event::{AlertEvent, AlertEventType};
pub use fingerprint::compute_fingerprint;
pub use manifest::{
    AddonManifest, Addon, AlertCondition, AlertMappingEntry, AlertMappingGroup, AlertMappings,
    ApiEndpoint, ClearEvents, ConditionOperator, IngestMethod, ParserConfig, PollGroup,
    RawAlertMappings, SshCommand, Transformation, Transport, TrapDefinition,
};
pub use severity::Severity;
pub use status::AlertStatus;
pub use target::Target;
