//! Logging macros for the node library.
//!
//! With the `defmt` feature the macros are the defmt ones and end up on RTT
//! in the firmware. Without it (host builds and tests) every call compiles
//! to nothing; the arguments are still borrowed so they count as used.

#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, error, info, trace, warn};

#[cfg(not(feature = "defmt"))]
macro_rules! trace_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        let _ = ($(&$arg),*);
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! debug_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        let _ = ($(&$arg),*);
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! info_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        let _ = ($(&$arg),*);
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        let _ = ($(&$arg),*);
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! error_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        let _ = ($(&$arg),*);
    }};
}

#[cfg(not(feature = "defmt"))]
pub(crate) use debug_noop as debug;
#[cfg(not(feature = "defmt"))]
pub(crate) use error_noop as error;
#[cfg(not(feature = "defmt"))]
pub(crate) use info_noop as info;
#[cfg(not(feature = "defmt"))]
pub(crate) use trace_noop as trace;
#[cfg(not(feature = "defmt"))]
pub(crate) use warn_noop as warn;
