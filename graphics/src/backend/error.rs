//! Native backend error types.

use thiserror::Error;

use super::{NativeHandle, NativeKind};

/// Failure reported by a [`NativeBackend`](super::NativeBackend) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// The native call returned a failure status.
    #[error("native call `{call}` failed with status {status}")]
    CallFailed { call: &'static str, status: i32 },
    /// The handle is not a live object of the given kind.
    #[error("{kind} handle {handle} is not live")]
    UnknownHandle {
        kind: NativeKind,
        handle: NativeHandle,
    },
    /// Out of native memory.
    #[error("out of native memory")]
    OutOfMemory,
    /// The device was lost.
    #[error("native device lost")]
    DeviceLost,
    /// Invalid parameter.
    #[error("invalid native parameter: {0}")]
    InvalidParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NativeError::CallFailed {
            call: "allocate",
            status: -3,
        };
        assert_eq!(err.to_string(), "native call `allocate` failed with status -3");

        let handle = NativeHandle::new(0x2a).unwrap();
        let err = NativeError::UnknownHandle {
            kind: NativeKind::Texture,
            handle,
        };
        assert_eq!(err.to_string(), "Texture handle 0x2a is not live");
    }
}
