//! Permission bitmasks.
//!
//! Every community defines its own catalog of capabilities, so the meaning of a
//! bit is only known at runtime. A mask is a plain 64-bit set:
//! - Positions are bounded to `0..=62`, so every valid mask is a non-negative `BIGINT`
//! - The decimal string form only exists at serialization boundaries

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Highest bit position a permission may occupy.
pub const MAX_BIT_POSITION: i16 = 62;

/// Number of distinct positions available in one community.
pub const POSITION_COUNT: usize = MAX_BIT_POSITION as usize + 1;

/// Set of capability bits.
///
/// Stored as BIGINT in `PostgreSQL`, serialized as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionMask(u64);

impl PermissionMask {
    /// Every position a permission can occupy.
    pub const ALL: Self = Self((1 << (MAX_BIT_POSITION as u64 + 1)) - 1);

    /// The empty mask, "no capabilities".
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build a mask from raw bits, dropping anything above position 62.
    #[must_use]
    pub const fn from_bits_truncate(bits: u64) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Flag for a single bit position, `None` outside `0..=62`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rolegate_server::permissions::PermissionMask;
    ///
    /// assert_eq!(PermissionMask::flag(1).unwrap().to_string(), "2");
    /// assert!(PermissionMask::flag(63).is_none());
    /// ```
    #[must_use]
    pub const fn flag(position: i16) -> Option<Self> {
        if position < 0 || position > MAX_BIT_POSITION {
            return None;
        }
        Some(Self(1 << position as u64))
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Bits of `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Check if every bit of `flag` is present in this mask.
    ///
    /// # Examples
    ///
    /// ```
    /// use rolegate_server::permissions::PermissionMask;
    ///
    /// let mask: PermissionMask = "3".parse().unwrap();
    /// assert!(mask.has("2".parse().unwrap()));
    /// assert!(!mask.has("4".parse().unwrap()));
    /// ```
    #[must_use]
    pub const fn has(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Apply one allow/deny pair: `(self AND NOT deny) OR allow`.
    ///
    /// Allow is applied after deny, so a bit present in both ends up set.
    #[must_use]
    pub const fn apply(self, allow: Self, deny: Self) -> Self {
        self.difference(deny).union(allow)
    }

    /// OR-reduce a sequence of masks, starting from the empty mask.
    #[must_use]
    pub fn combine<I>(masks: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        masks.into_iter().fold(Self::empty(), Self::union)
    }

    /// OR-reduce nullable masks; an absent mask contributes nothing.
    #[must_use]
    pub fn combine_optional<I>(masks: I) -> Self
    where
        I: IntoIterator<Item = Option<Self>>,
    {
        Self::combine(masks.into_iter().flatten())
    }

    // === Database Conversion ===

    /// Create a mask from a database BIGINT value.
    ///
    /// Bit 63 can never be a permission and is discarded.
    #[must_use]
    pub const fn from_db(value: i64) -> Self {
        Self::from_bits_truncate(value as u64)
    }

    /// Convert to a database BIGINT value. Always non-negative.
    #[must_use]
    pub const fn to_db(self) -> i64 {
        self.0 as i64
    }
}

/// Test a nullable mask against a nullable flag.
///
/// A missing flag never matches. A missing mask counts as empty, so it only
/// matches the empty flag.
#[must_use]
pub const fn is_set(mask: Option<PermissionMask>, flag: Option<PermissionMask>) -> bool {
    let Some(flag) = flag else {
        return false;
    };
    let mask = match mask {
        Some(mask) => mask,
        None => PermissionMask::empty(),
    };
    mask.has(flag)
}

impl BitOr for PermissionMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for PermissionMask {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl BitAnd for PermissionMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl BitAndAssign for PermissionMask {
    fn bitand_assign(&mut self, rhs: Self) {
        *self = self.intersection(rhs);
    }
}

impl Not for PermissionMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }
}

impl From<i64> for PermissionMask {
    fn from(value: i64) -> Self {
        Self::from_db(value)
    }
}

// ============================================================================
// String form
// ============================================================================

/// Failure to read a mask from its decimal form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseMaskError {
    #[error("permission mask is not a decimal integer: {0}")]
    NotDecimal(String),

    #[error("permission mask sets bit 63, which no permission can occupy")]
    OutOfRange,
}

impl FromStr for PermissionMask {
    type Err = ParseMaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::empty());
        }
        let bits: u64 = trimmed
            .parse()
            .map_err(|_| ParseMaskError::NotDecimal(trimmed.to_string()))?;
        if bits & !Self::ALL.0 != 0 {
            return Err(ParseMaskError::OutOfRange);
        }
        Ok(Self(bits))
    }
}

impl fmt::Display for PermissionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PermissionMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PermissionMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MaskVisitor;

        impl de::Visitor<'_> for MaskVisitor {
            type Value = PermissionMask;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a permission mask as a decimal string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                if v & !PermissionMask::ALL.0 != 0 {
                    return Err(E::custom(ParseMaskError::OutOfRange));
                }
                Ok(PermissionMask(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                let v = u64::try_from(v).map_err(|_| E::custom("negative permission mask"))?;
                self.visit_u64(v)
            }
        }

        deserializer.deserialize_any(MaskVisitor)
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

impl sqlx::Type<sqlx::Postgres> for PermissionMask {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for PermissionMask {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <i64 as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
        Ok(Self::from_db(raw))
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for PermissionMask {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<'_, sqlx::Postgres>>::encode_by_ref(&self.to_db(), buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(s: &str) -> PermissionMask {
        s.parse().unwrap()
    }

    #[test]
    fn test_combine_empty_is_zero() {
        assert_eq!(PermissionMask::combine([]).to_string(), "0");
    }

    #[test]
    fn test_combine_is_idempotent() {
        for m in ["0", "1", "5", "4611686018427387904"] {
            assert_eq!(PermissionMask::combine([mask(m), mask(m)]), mask(m));
        }
    }

    #[test]
    fn test_combine_commutes() {
        let a = mask("5");
        let b = mask("10");
        assert_eq!(
            PermissionMask::combine([a, b]),
            PermissionMask::combine([b, a])
        );
        assert_eq!(PermissionMask::combine([a, b]), mask("15"));
    }

    #[test]
    fn test_combine_optional_skips_missing() {
        let combined = PermissionMask::combine_optional([None, Some(mask("2")), None]);
        assert_eq!(combined, mask("2"));
    }

    #[test]
    fn test_is_set_requires_all_bits() {
        assert!(is_set(Some(mask("3")), Some(mask("1"))));
        assert!(is_set(Some(mask("3")), Some(mask("3"))));
        assert!(!is_set(Some(mask("1")), Some(mask("3"))));
    }

    #[test]
    fn test_is_set_missing_mask_or_flag() {
        assert!(!is_set(None, Some(mask("1"))));
        assert!(!is_set(Some(mask("7")), None));
        assert!(!is_set(None, None));
    }

    #[test]
    fn test_flag_positions() {
        assert_eq!(PermissionMask::flag(0), Some(mask("1")));
        assert_eq!(
            PermissionMask::flag(62).map(PermissionMask::bits),
            Some(1u64 << 62)
        );
        assert_eq!(PermissionMask::flag(63), None);
        assert_eq!(PermissionMask::flag(-1), None);
    }

    #[test]
    fn test_apply_deny_then_allow() {
        let base = mask("3");
        let after_role = base.apply(PermissionMask::empty(), mask("2"));
        assert_eq!(after_role, mask("1"));

        let after_user = after_role.apply(mask("2"), PermissionMask::empty());
        assert_eq!(after_user, mask("3"));
    }

    #[test]
    fn test_parse_rejects_garbage_and_bit_63() {
        assert!(matches!(
            "abc".parse::<PermissionMask>(),
            Err(ParseMaskError::NotDecimal(_))
        ));
        assert_eq!(
            (1u64 << 63).to_string().parse::<PermissionMask>(),
            Err(ParseMaskError::OutOfRange)
        );
        assert_eq!("".parse::<PermissionMask>(), Ok(PermissionMask::empty()));
    }

    #[test]
    fn test_db_roundtrip_is_non_negative() {
        let all = PermissionMask::ALL;
        assert!(all.to_db() > 0);
        assert_eq!(PermissionMask::from_db(all.to_db()), all);
        assert_eq!(PermissionMask::from_db(-1), all);
    }

    #[test]
    fn test_not_stays_within_positions() {
        assert_eq!(!PermissionMask::empty(), PermissionMask::ALL);
        assert!((!mask("1")).has(mask("2")));
        assert!(!(!mask("1")).has(mask("1")));
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let json = serde_json::to_string(&mask("6")).unwrap();
        assert_eq!(json, "\"6\"");

        let from_str: PermissionMask = serde_json::from_str("\"6\"").unwrap();
        let from_int: PermissionMask = serde_json::from_str("6").unwrap();
        assert_eq!(from_str, from_int);
        assert!(serde_json::from_str::<PermissionMask>("-1").is_err());
    }
}
