use thiserror::Error;

/// Errors raised while validating an addon manifest's own invariants (§3.1).
///
/// Distinct from registry-level errors (duplicate ids, duplicate webhook
/// paths across *other* addons) which require the full registry snapshot
/// and therefore live in `netwatch-registry`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("addon manifest has unknown ingest method: {0}")]
    UnknownMethod(String),

    #[error("addon manifest declares method `snmp_trap` but no enterprise_oid is present")]
    MissingEnterpriseOid,

    #[error("addon manifest declares method `webhook` but no endpoint_path is present")]
    MissingEndpointPath,

    #[error("addon manifest alert_type `{0}` is referenced by a mapping but never produced by the parser")]
    UnmappedAlertType(String),

    #[error("addon manifest id must be non-empty")]
    EmptyId,

    #[error("addon manifest is malformed: {0}")]
    Malformed(String),
}
