//! Diagnostic verbosity flags for the parse and validate phases.

use bitflags::bitflags;

bitflags! {
    /// Per-phase diagnostic options.
    ///
    /// Parse flags apply to schema compilation and document parsing, validate
    /// flags apply to [`crate::Engine::validate`]. Flags of one phase are ignored
    /// by the other, so a single value can be passed to every call.
    ///
    /// Verbose modes collect the native engine's full diagnostic text, which is
    /// considerably slower than the default mode under load.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Options: u16 {
        /// Default parser error output.
        const PARSE_DEFAULT = 1 << 0;
        /// Verbose parser error output, considerably slower!
        const PARSE_VERBOSE = 1 << 1;
        /// Default validation error output.
        const VALIDATE_DEFAULT = 1 << 2;
        /// Also capture text the engine reports outside the per-violation
        /// callback, surfaced on internal validation failures.
        const VALIDATE_VERBOSE = 1 << 3;
    }
}

impl Options {
    pub fn parse_verbose(self) -> bool {
        self.contains(Options::PARSE_VERBOSE)
    }

    pub fn validate_verbose(self) -> bool {
        self.contains(Options::VALIDATE_VERBOSE)
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::PARSE_DEFAULT | Options::VALIDATE_DEFAULT
    }
}
