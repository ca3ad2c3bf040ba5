//! Canonical job identity (C1).
//!
//! Normalizes `(title, company, salary, location)` into a stable 12-hex
//! identity, and exposes a character-set-Jaccard similarity check used
//! for duplicate detection below the fingerprint-equality threshold.
//! Exact normalization semantics are taken from the reference
//! implementation's `utils/fingerprint.py`, not re-derived.

pub mod constants;

use regex::Regex;
use std::sync::OnceLock;

fn digit_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Lowercase, strip whitespace, collapse all internal whitespace to
/// nothing, and remove the configured punctuation set.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let collapsed = whitespace_re().replace_all(&lowered, "");
    collapsed
        .chars()
        .filter(|c| !constants::PUNCTUATION_TO_STRIP.contains(c))
        .collect()
}

/// Lowercase, normalize comma variants to `-`, then keep at most the
/// first two decimal runs as `"{a}-{b}k"` / `"{a}k"` / `""`.
pub fn normalize_salary(salary: &str) -> String {
    if salary.is_empty() {
        return String::new();
    }
    let cleaned = salary
        .to_lowercase()
        .replace(' ', "")
        .replace('，', "-")
        .replace(',', "-");
    let numbers: Vec<&str> = digit_run_re()
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .collect();
    match numbers.len() {
        0 => String::new(),
        1 => format!("{}k", numbers[0]),
        _ => format!("{}-{}k", numbers[0], numbers[1]),
    }
}

/// Lowercase, remove every occurrence of each configured administrative
/// suffix (not only a trailing one), and strip spaces.
pub fn normalize_location(location: &str) -> String {
    if location.is_empty() {
        return String::new();
    }
    let mut normalized = location.to_lowercase();
    for suffix in constants::LOCATION_SUFFIXES {
        normalized = normalized.replace(suffix, "");
    }
    normalized.replace(' ', "")
}

/// Canonicalize a job listing into a 12-hex-char identity.
pub fn fingerprint(title: &str, company: &str, salary: &str, location: &str) -> String {
    let title_clean = normalize_text(title);
    let company_clean = normalize_text(company);
    let salary_clean = normalize_salary(salary);
    let location_clean = normalize_location(location);

    let joined = format!(
        "{}|{}|{}|{}",
        title_clean, company_clean, salary_clean, location_clean
    );
    let digest = md5::compute(joined.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

/// Character-set Jaccard similarity between two already-normalized strings.
fn text_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let set_a: std::collections::HashSet<char> = a.chars().collect();
    let set_b: std::collections::HashSet<char> = b.chars().collect();
    let common = set_a.intersection(&set_b).count();
    let total = set_a.union(&set_b).count();
    if total == 0 {
        0.0
    } else {
        common as f64 / total as f64
    }
}

/// Weighted title/company similarity: `0.7*title + 0.3*company`.
pub fn compare_job_similarity(
    title_a: &str,
    company_a: &str,
    title_b: &str,
    company_b: &str,
) -> f64 {
    let title_sim = text_similarity(&normalize_text(title_a), &normalize_text(title_b));
    let company_sim = text_similarity(&normalize_text(company_a), &normalize_text(company_b));
    title_sim * 0.7 + company_sim * 0.3
}

/// True iff two listings share a fingerprint, or their weighted
/// similarity meets `threshold` (default 0.9 per the spec).
pub fn is_duplicate(
    title_a: &str,
    company_a: &str,
    salary_a: &str,
    location_a: &str,
    title_b: &str,
    company_b: &str,
    salary_b: &str,
    location_b: &str,
    threshold: f64,
) -> bool {
    let fp_a = fingerprint(title_a, company_a, salary_a, location_a);
    let fp_b = fingerprint(title_b, company_b, salary_b, location_b);
    if fp_a == fp_b {
        return true;
    }
    compare_job_similarity(title_a, company_a, title_b, company_b) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S1: fingerprint stability under whitespace/punctuation/format noise.
    #[test]
    fn s1_fingerprint_stability() {
        let a = fingerprint(
            " Senior Python 工程师 ",
            "ACME (Shanghai)",
            "20,000-40,000",
            "上海市",
        );
        let b = fingerprint("Senior Python 工程师", "ACME (Shanghai)", "20000-40000", "上海");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let first = fingerprint("Engineer", "ACME", "10k-20k", "Beijing");
        let second = fingerprint("Engineer", "ACME", "10k-20k", "Beijing");
        assert_eq!(first, second);
    }

    #[test]
    fn fingerprint_valid_with_empty_salary_and_location() {
        let fp = fingerprint("Engineer", "ACME", "", "");
        assert_eq!(fp.len(), 12);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn normalize_salary_cases() {
        assert_eq!(normalize_salary("20,000-40,000"), "20-40k");
        assert_eq!(normalize_salary("20k"), "20k");
        assert_eq!(normalize_salary(""), "");
        assert_eq!(normalize_salary("面议"), "");
    }

    #[test]
    fn normalize_location_strips_every_occurrence() {
        assert_eq!(normalize_location("上海市"), "上海");
        assert_eq!(normalize_location("广东省广州市"), "广东广州");
    }

    /// S2: identical listings deduplicate via fingerprint equality.
    #[test]
    fn s2_duplicate_detection_by_fingerprint() {
        assert!(is_duplicate(
            "Backend Engineer",
            "ACME",
            "20k-30k",
            "Beijing",
            "Backend Engineer",
            "ACME",
            "20k-30k",
            "Beijing",
            0.9,
        ));
    }

    #[test]
    fn similarity_matches_self() {
        assert_eq!(
            compare_job_similarity("Engineer", "ACME", "Engineer", "ACME"),
            1.0
        );
    }
}
