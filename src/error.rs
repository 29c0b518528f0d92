// Runtime error classification: operation/target context plus a recoverable flag.

use std::fmt;

use thiserror::Error;

/// What went wrong underneath a runtime call.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error(
        "invalid service name '{0}': must contain only alphanumeric characters, hyphens, and underscores"
    )]
    InvalidServiceName(String),

    #[error("service {0} not found")]
    ServiceNotFound(String),

    #[error("container {0} not found")]
    ContainerNotFound(String),

    #[error("operation timed out")]
    OperationTimeout,

    #[error("container runtime connection failed: {0}")]
    ConnectionFailed(String),

    #[error("stats unavailable for container {0}")]
    StatsUnavailable(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("docker api: {0}")]
    Api(#[source] bollard::errors::Error),

    #[error("decode runtime output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorKind {
    /// Timeouts and connection-level failures are worth retrying; missing
    /// targets and bad input are not. Anything else is assumed transient.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::InvalidServiceName(_)
                | ErrorKind::ServiceNotFound(_)
                | ErrorKind::ContainerNotFound(_)
        )
    }
}

impl From<bollard::errors::Error> for ErrorKind {
    fn from(e: bollard::errors::Error) -> Self {
        use bollard::errors::Error as Bollard;
        match e {
            Bollard::DockerResponseServerError {
                status_code: 404,
                message,
            } => ErrorKind::ContainerNotFound(message),
            Bollard::RequestTimeoutError => ErrorKind::OperationTimeout,
            Bollard::IOError { .. }
            | Bollard::HyperResponseError { .. }
            | Bollard::SocketNotFoundError(_) => ErrorKind::ConnectionFailed(e.to_string()),
            other => ErrorKind::Api(other),
        }
    }
}

/// The container or service an operation was aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Container(String),
    Service(String),
}

/// A failed runtime operation with its context and classification.
#[derive(Debug)]
pub struct RuntimeError {
    pub operation: &'static str,
    pub target: Option<Target>,
    pub kind: ErrorKind,
}

impl RuntimeError {
    pub fn new(operation: &'static str, kind: impl Into<ErrorKind>) -> Self {
        Self {
            operation,
            target: None,
            kind: kind.into(),
        }
    }

    pub fn container(
        operation: &'static str,
        container: impl Into<String>,
        kind: impl Into<ErrorKind>,
    ) -> Self {
        Self {
            operation,
            target: Some(Target::Container(container.into())),
            kind: kind.into(),
        }
    }

    pub fn service(
        operation: &'static str,
        service: impl Into<String>,
        kind: impl Into<ErrorKind>,
    ) -> Self {
        Self {
            operation,
            target: Some(Target::Service(service.into())),
            kind: kind.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ServiceNotFound(_) | ErrorKind::ContainerNotFound(_)
        )
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(Target::Container(c)) => write!(
                f,
                "docker operation '{}' failed for container '{}': {}",
                self.operation, c, self.kind
            ),
            Some(Target::Service(s)) => write!(
                f,
                "docker operation '{}' failed for service '{}': {}",
                self.operation, s, self.kind
            ),
            None => write!(
                f,
                "docker operation '{}' failed: {}",
                self.operation, self.kind
            ),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Failure of the host probe itself; unreadable metrics degrade to zero instead.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("host probe task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("host probe state lock poisoned")]
    Poisoned,
}

/// Lets the retry executor ask whether a failure may be retried.
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for RuntimeError {
    fn is_recoverable(&self) -> bool {
        RuntimeError::is_recoverable(self)
    }
}

impl Recoverable for ErrorKind {
    fn is_recoverable(&self) -> bool {
        ErrorKind::is_recoverable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_connection_failures_are_recoverable() {
        assert!(RuntimeError::new("list", ErrorKind::OperationTimeout).is_recoverable());
        assert!(
            RuntimeError::new("list", ErrorKind::ConnectionFailed("refused".into()))
                .is_recoverable()
        );
    }

    #[test]
    fn not_found_and_validation_are_not_recoverable() {
        let e = RuntimeError::service("start", "mc", ErrorKind::ServiceNotFound("mc".into()));
        assert!(!e.is_recoverable());
        assert!(e.is_not_found());
        let e = RuntimeError::container("stats", "x", ErrorKind::ContainerNotFound("x".into()));
        assert!(!e.is_recoverable());
        let e = RuntimeError::service(
            "start",
            "a;b",
            ErrorKind::InvalidServiceName("a;b".into()),
        );
        assert!(!e.is_recoverable());
        assert!(!e.is_not_found());
    }

    #[test]
    fn unknown_causes_default_to_recoverable() {
        let io = std::io::Error::other("boom");
        assert!(RuntimeError::new("logs", io).is_recoverable());
    }

    #[test]
    fn docker_404_maps_to_container_not_found() {
        let e = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".into(),
        };
        let kind = ErrorKind::from(e);
        assert!(matches!(kind, ErrorKind::ContainerNotFound(_)));
        assert!(!kind.is_recoverable());
    }

    #[test]
    fn docker_500_stays_recoverable() {
        let e = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "server error".into(),
        };
        assert!(ErrorKind::from(e).is_recoverable());
    }

    #[test]
    fn display_includes_operation_and_target() {
        let e = RuntimeError::service("stop", "valheim", ErrorKind::OperationTimeout);
        assert_eq!(
            e.to_string(),
            "docker operation 'stop' failed for service 'valheim': operation timed out"
        );
        let e = RuntimeError::container("start", "mc-1", ErrorKind::OperationTimeout);
        assert!(e.to_string().contains("for container 'mc-1'"));
        let e = RuntimeError::new("list", ErrorKind::OperationTimeout);
        assert_eq!(
            e.to_string(),
            "docker operation 'list' failed: operation timed out"
        );
    }
}
