//! Response models, as the daemon emits them.

mod files;
mod repo;
mod unixfs;

pub use files::{FilesEntry, FilesEntryType, FilesLs, FilesStat};
pub use repo::RepoStat;
pub use unixfs::{LsLink, LsObject, LsResponse, UnixfsType};

use serde::de::{self, Deserializer, Visitor};

/// Deserializes a JSON number into a `u64`, clamping anything out of range.
///
/// Negative numbers become 0; numbers too large for `u64` (which arrive as floats) become
/// `u64::MAX`.
pub(crate) fn saturating_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    struct Saturating;

    impl Visitor<'_> for Saturating {
        type Value = u64;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a number")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            Ok(u64::try_from(v).unwrap_or(0))
        }

        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss,
            reason = "range is checked before the cast"
        )]
        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
            Ok(if v.is_nan() || v <= 0.0 {
                0
            } else if v >= u64::MAX as f64 {
                u64::MAX
            } else {
                v as u64
            })
        }
    }

    deserializer.deserialize_any(Saturating)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(deserialize_with = "super::saturating_u64")]
        n: u64,
    }

    fn parse(json: &str) -> u64 {
        serde_json::from_str::<Wrapper>(json).unwrap().n
    }

    #[test]
    fn clamps_out_of_range_numbers() {
        assert_eq!(parse(r#"{"n": 42}"#), 42);
        assert_eq!(parse(r#"{"n": -5}"#), 0);
        assert_eq!(parse(r#"{"n": 1e30}"#), u64::MAX);
        assert_eq!(parse(r#"{"n": 18446744073709551615}"#), u64::MAX);
    }
}
