//! Command dispatch.
//!
//! The dispatcher owns the global in-flight gate. A request is validated on
//! the caller's thread, then the transport call runs on a background task.
//! The caller awaits [`Dispatcher::completion`] from its event loop to get the
//! result back and release the gate.

use crate::transport::{SendResult, Transport};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Opaque identity of a send control in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub usize);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One operator send action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub host: String,
    pub port: u16,
    pub payload: String,
    pub control: ControlId,
    /// Append `\n` unless the payload already ends with one.
    pub auto_newline: bool,
}

/// Input errors. None of these reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Operation in progress!")]
    Busy,
    #[error("Please enter a command!")]
    EmptyCommand,
    #[error("Please enter IP address!")]
    EmptyHost,
    #[error("Port must be between 1 and 65535!")]
    InvalidPort,
}

/// Emitted as soon as a request is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub control: ControlId,
    /// Exact bytes handed to the transport.
    pub payload: String,
}

/// Emitted once per accepted request, on every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub control: ControlId,
    pub result: SendResult,
}

/// Descriptor of the one outstanding request.
struct InFlight {
    control: ControlId,
    target: String,
    started: Instant,
    handle: JoinHandle<SendResult>,
}

/// Serializes sends through a single background task at a time.
pub struct Dispatcher<T: Transport> {
    transport: Arc<T>,
    in_flight: Option<InFlight>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            in_flight: None,
        }
    }

    /// Whether a request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Control of the outstanding request, if any.
    pub fn active_control(&self) -> Option<ControlId> {
        self.in_flight.as_ref().map(|f| f.control)
    }

    /// `host:port` of the outstanding request, if any.
    pub fn active_target(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|f| f.target.as_str())
    }

    #[cfg(test)]
    pub(crate) fn transport_for_tests(&self) -> &T {
        &self.transport
    }

    /// Validate and start a send. Must be called inside a tokio runtime.
    pub fn dispatch(&mut self, request: SendRequest) -> Result<Sent, DispatchError> {
        if self.is_busy() {
            warn!("Rejected send from {}: operation in progress", request.control);
            return Err(DispatchError::Busy);
        }

        let command = request.payload.trim();
        if command.is_empty() {
            return Err(DispatchError::EmptyCommand);
        }

        let host = request.host.trim();
        if host.is_empty() {
            return Err(DispatchError::EmptyHost);
        }

        if request.port == 0 {
            return Err(DispatchError::InvalidPort);
        }

        let payload = apply_newline(command, request.auto_newline);
        let host = host.to_string();
        let port = request.port;
        let target = format!("{}:{}", host, port);

        info!("Sending {:?} to {}", payload, target);

        let transport = Arc::clone(&self.transport);
        let task_payload = payload.clone();
        let handle = tokio::spawn(async move { transport.send(&host, port, &task_payload).await });

        self.in_flight = Some(InFlight {
            control: request.control,
            target,
            started: Instant::now(),
            handle,
        });

        Ok(Sent {
            control: request.control,
            payload,
        })
    }

    /// Wait for the outstanding request and release the gate.
    ///
    /// Returns `None` immediately when idle. Cancel-safe: dropping the future
    /// before it resolves leaves the request in flight.
    pub async fn completion(&mut self) -> Option<Completion> {
        let in_flight = self.in_flight.as_mut()?;

        let result = match (&mut in_flight.handle).await {
            Ok(result) => result,
            Err(e) => SendResult::Failure(format!("send task failed: {}", e)),
        };

        let in_flight = self.in_flight.take()?;
        debug!(
            "Send to {} finished in {:?}",
            in_flight.target,
            in_flight.started.elapsed()
        );

        Some(Completion {
            control: in_flight.control,
            result,
        })
    }
}

/// Append a single `\n` when enabled and not already present.
pub fn apply_newline(payload: &str, auto_newline: bool) -> String {
    if auto_newline && !payload.ends_with('\n') {
        format!("{}\n", payload)
    } else {
        payload.to_string()
    }
}
