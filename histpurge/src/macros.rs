//! Macros for purge error handling.

/// Creates a [`crate::error::PurgeError`] from error kind and description, with an optional
/// dynamic detail.
#[macro_export]
macro_rules! purge_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::PurgeError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::PurgeError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::PurgeError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::purge_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::purge_error!($kind, $desc, $detail))
    };
}
