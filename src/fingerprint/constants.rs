//! Literal normalization tables used by [`super::normalize_text`] and
//! friends, centralized per the mixed-language-regex-literal redesign so
//! a test can exercise them independently of the normalization logic.

/// Paired punctuation stripped from titles and company names: ASCII and
/// full-width parentheses/brackets, guillemets, and fancy quotes.
pub const PUNCTUATION_TO_STRIP: &[char] = &[
    '(', ')', '（', '）', '[', ']', '【', '】', '《', '》', '<', '>', '“', '”', '‘', '’', '"', '\'',
];

/// Chinese administrative-division suffixes removed from locations.
/// Every occurrence is stripped, not only a trailing one.
pub const LOCATION_SUFFIXES: &[&str] = &["市", "区", "县", "省", "自治区", "特别行政区"];
