//! Unified error hierarchy for banchod.
//!
//! Wire errors live in `bancho_proto::ProtoError` and are folded in with
//! `#[from]`; everything else is a domain error raised by a component and
//! caught at the dispatcher boundary.

use bancho_proto::ProtoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BanchoError {
    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error("timed out acquiring lock {name}")]
    LockTimeout { name: String },

    #[error("kv store unavailable: {0}")]
    KvUnavailable(String),

    #[error("user {0} not found")]
    UserNotFound(i32),

    #[error("token {0} not found")]
    TokenNotFoundException(String),

    #[error("channel {0} unknown")]
    ChannelUnknownException(String),

    #[error("already in channel {0}")]
    UserAlreadyInChannel(String),

    #[error("no permission to join channel {0}")]
    ChannelNoPermissions(String),

    #[error("outbound queue overflow for token {0}")]
    QueueOverflow(String),
}

impl BanchoError {
    /// Static label for metrics, mirroring `record_packet_dropped`'s reason field.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Proto(ProtoError::MalformedPacket { .. }) => "malformed_packet",
            Self::Proto(ProtoError::ShortRead { .. }) => "short_read",
            Self::Proto(ProtoError::UnknownPacketId(_)) => "unknown_packet_id",
            Self::LockTimeout { .. } => "lock_timeout",
            Self::KvUnavailable(_) => "kv_unavailable",
            Self::UserNotFound(_) => "user_not_found",
            Self::TokenNotFoundException(_) => "token_not_found",
            Self::ChannelUnknownException(_) => "channel_unknown",
            Self::UserAlreadyInChannel(_) => "user_already_in_channel",
            Self::ChannelNoPermissions(_) => "channel_no_permissions",
            Self::QueueOverflow(_) => "queue_overflow",
        }
    }

    /// Whether the dispatcher should close the connection after logging this
    /// error, as opposed to keeping the session alive.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Proto(ProtoError::MalformedPacket { .. }))
    }
}

pub type BanchoResult<T> = Result<T, BanchoError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            BanchoError::LockTimeout { name: "match:3".into() }.error_code(),
            "lock_timeout"
        );
        assert_eq!(BanchoError::UserNotFound(7).error_code(), "user_not_found");
    }

    #[test]
    fn malformed_packet_is_fatal() {
        let err = BanchoError::Proto(ProtoError::MalformedPacket {
            packet_id: 1,
            reason: "bad".into(),
        });
        assert!(err.is_fatal());
        let err = BanchoError::LockTimeout { name: "x".into() };
        assert!(!err.is_fatal());
    }
}
