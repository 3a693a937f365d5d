#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// The run completed. Individual operation failures do not change this.
    Success = 0,

    /// `probe` found the dependency unreachable.
    DependencyUnavailable = 20,

    /// Invalid CLI/config/options (bad flags, unreadable or invalid config, bad urls).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, monitor task failure, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
