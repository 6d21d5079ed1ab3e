use bitflags::bitflags;

bitflags! {
    /// Single configuration bitmask shared by `read`, `scan` and `write`;
    /// most operations only look at the bits relevant to them and ignore
    /// the rest.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        const OVERWRITE_EXISTING   = 1 << 0;
        const APPEND_EXISTING      = 1 << 1;
        const ADD_WATCH            = 1 << 2;
        const CREATE_DIRECTORIES   = 1 << 3;
        const RECURSE_DIRECTORIES  = 1 << 4;
        const REPORT_MISSING       = 1 << 5;
    }
}
