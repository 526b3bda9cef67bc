use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::responses::RemoteException;

/// Pipeline phase an infrastructure failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Encoding,
    Transport,
    Decoding,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discovery => "discovery",
            Phase::Encoding => "encoding",
            Phase::Transport => "transport",
            Phase::Decoding => "decoding",
        };
        f.write_str(name)
    }
}

/// Every failure an invocation can report.
///
/// Cloneable so the cause of a tolerated failure can be kept alongside the
/// substituted result.
#[derive(Error, Debug, Clone)]
pub enum TribleError {
    #[error("No {capability} strategy registered for key '{key}'")]
    Configuration { capability: String, key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No provider available for service '{0}'")]
    NoProvider(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[source] Arc<serde_json::Error>),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Remote business exception: {0}")]
    Business(RemoteException),

    #[error("Invocation failed during {phase}: {source}")]
    Terminal {
        phase: Phase,
        source: Box<TribleError>,
    },

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<serde_json::Error> for TribleError {
    fn from(err: serde_json::Error) -> Self {
        TribleError::Serialization(Arc::new(err))
    }
}

impl From<std::io::Error> for TribleError {
    fn from(err: std::io::Error) -> Self {
        TribleError::Io(Arc::new(err))
    }
}

impl TribleError {
    /// Whether a retry strategy may attempt the operation again.
    ///
    /// Only transport-level failures qualify. A malformed frame or a remote
    /// business exception will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TribleError::Transport(_) | TribleError::Timeout(_))
    }

    /// Phase this error belongs to when it ends an invocation.
    pub fn phase(&self) -> Phase {
        match self {
            TribleError::NoProvider(_) | TribleError::Registry(_) => Phase::Discovery,
            TribleError::ProtocolDecode(_) => Phase::Decoding,
            TribleError::Serialization(_) | TribleError::IllegalArgument(_) => Phase::Encoding,
            TribleError::Terminal { phase, .. } => *phase,
            _ => Phase::Transport,
        }
    }

    /// Wraps this error as a terminal invocation failure.
    pub fn into_terminal(self) -> TribleError {
        match self {
            terminal @ TribleError::Terminal { .. } => terminal,
            other => TribleError::Terminal {
                phase: other.phase(),
                source: Box::new(other),
            },
        }
    }

    pub fn is_business(&self) -> bool {
        matches!(self, TribleError::Business(_))
    }
}

pub type Result<T> = std::result::Result<T, TribleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(TribleError::Transport("reset".to_string()).is_retryable());
        assert!(TribleError::Timeout(500).is_retryable());

        assert!(!TribleError::ProtocolDecode("bad magic".to_string()).is_retryable());
        assert!(!TribleError::NoProvider("Calculator".to_string()).is_retryable());
        assert!(!TribleError::Registry("down".to_string()).is_retryable());
        assert!(!TribleError::Business(RemoteException::new("ArithmeticException", "/ by zero")).is_retryable());
    }

    #[test]
    fn test_phase_classification() {
        assert_eq!(TribleError::Registry("down".to_string()).phase(), Phase::Discovery);
        assert_eq!(TribleError::ProtocolDecode("x".to_string()).phase(), Phase::Decoding);
        assert_eq!(TribleError::Timeout(10).phase(), Phase::Transport);
        assert_eq!(TribleError::Transport("x".to_string()).phase(), Phase::Transport);
    }

    #[test]
    fn test_into_terminal_keeps_original_as_source() {
        let terminal = TribleError::Timeout(250).into_terminal();
        match &terminal {
            TribleError::Terminal { phase, source } => {
                assert_eq!(*phase, Phase::Transport);
                assert!(matches!(**source, TribleError::Timeout(250)));
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
        assert_eq!(
            terminal.to_string(),
            "Invocation failed during transport: Request timeout after 250ms"
        );
    }

    #[test]
    fn test_into_terminal_is_idempotent() {
        let terminal = TribleError::Transport("refused".to_string()).into_terminal();
        let again = terminal.into_terminal();
        match again {
            TribleError::Terminal { source, .. } => {
                assert!(matches!(*source, TribleError::Transport(_)));
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
    }

    #[test]
    fn test_clone_keeps_variant_and_message() {
        let err: TribleError = serde_json::from_str::<u8>("x").unwrap_err().into();
        let copy = err.clone();
        assert!(matches!(copy, TribleError::Serialization(_)));
        assert_eq!(copy.to_string(), err.to_string());

        let io: TribleError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(io.clone().to_string(), "IO error: disk");
    }

    #[test]
    fn test_configuration_error_names_capability_and_key() {
        let err = TribleError::Configuration {
            capability: "load balancer".to_string(),
            key: "WEIGHTED".to_string(),
        };
        assert_eq!(err.to_string(), "No load balancer strategy registered for key 'WEIGHTED'");
    }
}
