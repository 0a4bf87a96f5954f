//! Total-ordering comparison between dotted version strings.
//!
//! Upstream tags are not strict semver (`v1.2` occurs alongside `v1.2.0`),
//! so segments are compared numerically with the shorter sequence padded
//! with zeros.

/// Returns true when `candidate` is strictly newer than `baseline`.
///
/// A single leading non-numeric marker (`v2.0.0`) is ignored; non-numeric
/// or missing segments count as 0, so `1.2` equals `1.2.0`.
pub fn is_newer(candidate: &str, baseline: &str) -> bool {
    let candidate = segments(candidate);
    let baseline = segments(baseline);

    let len = candidate.len().max(baseline.len());
    for i in 0..len {
        let a = candidate.get(i).copied().unwrap_or(0);
        let b = baseline.get(i).copied().unwrap_or(0);
        if a != b {
            return a > b;
        }
    }
    false
}

fn segments(version: &str) -> Vec<u64> {
    version
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .split('.')
        .map(|s| s.parse::<u64>().unwrap_or(0))
        .collect()
}
