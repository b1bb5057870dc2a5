/// Return early with a [`JsonInput`](crate::Error::is_json_input) error.
///
/// Used wherever an incoming document fails structural validation against
/// the object tree. The formatted message is the user-facing error text.
#[macro_export]
macro_rules! bail_input {
    ($($arg:tt)*) => {
        return Err($crate::Error::json_input(format!($($arg)*)))
    };
}

/// Return early with a [`DualityView`](crate::Error::is_duality_view) error.
///
/// Used wherever a document requests an operation the object tree's
/// capability flags forbid.
#[macro_export]
macro_rules! bail_duality {
    ($($arg:tt)*) => {
        return Err($crate::Error::duality_view(format!($($arg)*)))
    };
}

/// Return early with a configuration error.
///
/// Configuration errors report a malformed object tree (catalog or
/// programmer mistake), distinct from bad-request errors.
#[macro_export]
macro_rules! bail_config {
    ($($arg:tt)*) => {
        return Err($crate::Error::config(format!($($arg)*)))
    };
}
