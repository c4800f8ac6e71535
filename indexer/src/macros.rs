//! Shorthands for building [`crate::error::IndexerError`] values.

/// Builds an [`crate::error::IndexerError`].
///
/// `indexer_error!(kind, "description")`, optionally followed by a detail convertible into a
/// `Cow<'static, str>` and by `source: err`.
#[macro_export]
macro_rules! indexer_error {
    ($kind:expr, $desc:expr $(, source: $source:expr)? $(,)?) => {
        $crate::error::IndexerError::from(($kind, $desc))
            $(.with_source($source))?
    };
    ($kind:expr, $desc:expr, $detail:expr $(, source: $source:expr)? $(,)?) => {
        $crate::error::IndexerError::from(($kind, $desc, $detail))
            $(.with_source($source))?
    };
}

/// `return Err(indexer_error!(..))`.
#[macro_export]
macro_rules! bail {
    ($($args:tt)*) => {
        return ::core::result::Result::Err($crate::indexer_error!($($args)*))
    };
}
