// ── Central error type ────────────────────────────────────────────────────────
//
// All fallible operations in winws return `error::Result<T>`.  Nothing in the
// core panics on a failed operation: resource exhaustion degrades to a missing
// resource, protocol violations come back as one of the status variants below,
// and tolerated native failures are logged by the caller and swallowed.

/// Every error that winws can produce.
#[derive(Debug)]
pub enum WsError {
    /// A Win32 API call returned a failure code.
    Win32 {
        /// The name of the failing function, for display purposes.
        function: &'static str,
        /// The raw Win32 error code (`GetLastError()` value) or HRESULT.
        code: u32,
    },

    /// A standard I/O error (font file open, config read, …).
    Io(std::io::Error),

    /// The display configuration file is not valid JSON for `DisplayConfig`.
    Config(serde_json::Error),

    /// The window is already registered in a grab group.
    Duplicated,

    /// Ungrab was requested for a window that holds no grab.
    NoGrab,

    /// The referenced task, font, window or screen does not exist.
    NotFound,

    /// A font with the same name is already registered.
    AlreadyExists,

    /// The arguments do not describe a valid request.
    BadArguments,

    /// The object is not in a state where the operation makes sense
    /// (no native handle, already destroyed, …).
    BadState,

    /// An allocation or identifier space was exhausted.
    NoMem,

    /// The backend does not provide this facility.
    NotImplemented,

    /// A scheduled task reported its own failure.
    Task(String),
}

impl std::fmt::Display for WsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Win32 { function, code } => {
                write!(f, "{function} failed (error {code:#010x})")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Config(e) => write!(f, "invalid display configuration: {e}"),
            Self::Duplicated => f.write_str("window is already grabbing events"),
            Self::NoGrab => f.write_str("window holds no event grab"),
            Self::NotFound => f.write_str("not found"),
            Self::AlreadyExists => f.write_str("already exists"),
            Self::BadArguments => f.write_str("bad arguments"),
            Self::BadState => f.write_str("bad state"),
            Self::NoMem => f.write_str("out of memory"),
            Self::NotImplemented => f.write_str("not implemented"),
            Self::Task(msg) => write!(f, "task failed: {msg}"),
        }
    }
}

impl std::error::Error for WsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for WsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e)
    }
}

// Convert a windows-crate error (HRESULT) directly into a WsError so that
// `?` can be used on `windows::core::Result<T>` throughout the platform module.
#[cfg(windows)]
impl From<windows::core::Error> for WsError {
    fn from(e: windows::core::Error) -> Self {
        // HRESULT.0 is i32; reinterpret bits as u32 for display purposes.
        // Win32 errors appear as 0x8007xxxx HRESULTs.
        Self::Win32 {
            function: "windows",
            code: e.code().0 as u32,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win32_error_display_is_hex() {
        let e = WsError::Win32 {
            function: "CreateWindowExW",
            code: 0x8007_0005,
        };
        assert_eq!(e.to_string(), "CreateWindowExW failed (error 0x80070005)");
    }

    #[test]
    fn io_error_has_source() {
        use std::error::Error;
        let e = WsError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(e.source().is_some());
        assert!(WsError::Duplicated.source().is_none());
    }
}
