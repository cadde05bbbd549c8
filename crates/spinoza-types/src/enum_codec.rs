//! Enum codec for enum-typed columns.
//!
//! Enum cells travel through the engine as `tag:constant` text. Instead of
//! resolving the enum type reflectively at decode time, callers implement
//! [`DbEnum`] for their own types and the cursor decodes with
//! `get_enum::<E>()`, checking the serialized tag against [`DbEnum::TAG`].

/// Encode/decode contract supplied by the caller for an enum-typed column.
///
/// ```
/// use spinoza_types::DbEnum;
///
/// #[derive(Debug, PartialEq)]
/// enum Mood {
///     Calm,
///     Stormy,
/// }
///
/// impl DbEnum for Mood {
///     const TAG: &'static str = "mood";
///
///     fn constant(&self) -> &'static str {
///         match self {
///             Mood::Calm => "CALM",
///             Mood::Stormy => "STORMY",
///         }
///     }
///
///     fn from_constant(constant: &str) -> Option<Self> {
///         match constant {
///             "CALM" => Some(Mood::Calm),
///             "STORMY" => Some(Mood::Stormy),
///             _ => None,
///         }
///     }
/// }
///
/// assert_eq!(Mood::from_constant(Mood::Calm.constant()), Some(Mood::Calm));
/// ```
pub trait DbEnum: Sized {
    /// Stable type tag stored alongside every constant. Two enum types with
    /// the same tag are indistinguishable in the database, so tags should be
    /// unique per application.
    const TAG: &'static str;

    /// The serialized name of this constant.
    fn constant(&self) -> &'static str;

    /// Resolve a serialized constant name, `None` if unknown.
    fn from_constant(constant: &str) -> Option<Self>;
}

/// Split a serialized `tag:constant` cell into its parts.
pub fn split_serialized(cell: &str) -> Option<(&str, &str)> {
    cell.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_takes_first_colon() {
        assert_eq!(split_serialized("mood:CALM"), Some(("mood", "CALM")));
        assert_eq!(split_serialized("a:b:c"), Some(("a", "b:c")));
        assert_eq!(split_serialized("no-colon"), None);
    }
}
