//! Error types for topology and thread affinity operations.

use {crate::affinity::Tid, std::io, thiserror::Error};

/// Errors that can occur while applying or reading thread affinity.
///
/// Missing or malformed procfs/sysfs data is never reported through this type;
/// those cases degrade to default values instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ThreadAffinityError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation not supported on this platform
    #[error("thread affinity operations are not supported on this platform")]
    NotSupported,

    /// Affinity mask has no bits set
    #[error("affinity mask cannot be empty")]
    EmptyMask,

    /// `sched_setaffinity` failed for the given thread
    #[error("failed to set affinity mask {mask:#x} for tid {tid}: {source}")]
    SetAffinity {
        tid: Tid,
        mask: u64,
        #[source]
        source: io::Error,
    },

    /// `sched_getaffinity` failed for the given thread
    #[error("failed to get affinity mask for tid {tid}: {source}")]
    GetAffinity {
        tid: Tid,
        #[source]
        source: io::Error,
    },

    /// Configuration could not be loaded
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ThreadAffinityError {
    /// Raw OS error code of a failed syscall, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(err)
            | Self::SetAffinity { source: err, .. }
            | Self::GetAffinity { source: err, .. } => err.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThreadAffinityError::EmptyMask;
        assert_eq!(err.to_string(), "affinity mask cannot be empty");

        let err = ThreadAffinityError::NotSupported;
        assert_eq!(
            err.to_string(),
            "thread affinity operations are not supported on this platform"
        );

        let err = ThreadAffinityError::Config("bad input".to_string());
        assert_eq!(err.to_string(), "invalid configuration: bad input");

        let err = ThreadAffinityError::SetAffinity {
            tid: 42,
            mask: 0xf0,
            source: io::Error::from_raw_os_error(libc::EPERM),
        };
        assert!(err
            .to_string()
            .starts_with("failed to set affinity mask 0xf0 for tid 42"));
    }

    #[test]
    fn test_raw_os_error() {
        let err = ThreadAffinityError::SetAffinity {
            tid: 7,
            mask: 1,
            source: io::Error::from_raw_os_error(libc::ESRCH),
        };
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));

        let err = ThreadAffinityError::GetAffinity {
            tid: 7,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));

        assert_eq!(ThreadAffinityError::EmptyMask.raw_os_error(), None);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
        let err: ThreadAffinityError = io_err.into();
        match err {
            ThreadAffinityError::Io(err) => {
                assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
                assert!(err.to_string().contains("Permission denied"));
            }
            _ => panic!("Expected Io error"),
        }
    }
}
