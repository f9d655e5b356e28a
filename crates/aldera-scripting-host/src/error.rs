use aldera_events::{RegisterType, TemplateKind};
use thiserror::Error;

/// Why a registration request was rejected.
///
/// Rejection happens synchronously at registration time; the offered
/// callable is released and no binding is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("unknown event id {event} for registration type {regtype:?}")]
    UnknownEvent { regtype: RegisterType, event: u32 },

    #[error("no {kind} template exists with entry {entry}")]
    MissingTemplate { kind: TemplateKind, entry: u32 },

    #[error("guid was empty")]
    EmptyGuid,

    #[error("command registration requires a command name")]
    MissingQualifier,

    #[error("scripting internal error: {0}")]
    Internal(String),
}
