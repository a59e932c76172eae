//! Dot-segment numeric version comparison.
//!
//! Versions are compared segment by segment as unsigned integers of any
//! length, so `1.10.0 > 1.9.9`, and missing trailing segments count as zero
//! (`1.2 == 1.2.0`). A leading `v` is ignored. A segment that is not a plain
//! number contributes its leading digits (`3-beta` -> 3), or zero if it has
//! none.

use std::cmp::Ordering;

/// Digits of each segment with leading zeros removed; zero is empty.
fn segments(version: &str) -> Vec<&str> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    trimmed
        .split('.')
        .map(|segment| {
            let end = segment
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(segment.len());
            segment[..end].trim_start_matches('0')
        })
        .collect()
}

/// Numeric order of two normalized digit strings.
fn compare_digits(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare two version strings numerically, segment by segment.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let pa = segments(a);
    let pb = segments(b);
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let ai = pa.get(i).copied().unwrap_or("");
        let bi = pb.get(i).copied().unwrap_or("");
        match compare_digits(ai, bi) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// True iff `remote` is strictly newer than `local`.
pub fn is_newer(remote: &str, local: &str) -> bool {
    compare_versions(remote, local) == Ordering::Greater
}

/// Pick the numerically greatest version from an iterator.
pub fn latest_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .max_by(|a, b| compare_versions(a, b))
}
