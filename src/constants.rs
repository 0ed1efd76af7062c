// -
// Store namespace

/// Root node under which all entries live when none is configured
pub const DEFAULT_ROOT: &str = "/metadata";

// -
// Watch loop

/// Length of the generated per-instance id used in log correlation
pub(crate) const INSTANCE_ID_LEN: usize = 8;
