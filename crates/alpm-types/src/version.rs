//! Version string comparison with epoch/release semantics (component C1).
//!
//! A version string is `[epoch:]upstream[-release]`. Comparison walks both
//! sides segment by segment, where a segment is a maximal run of ASCII
//! digits or ASCII letters; numeric segments compare numerically (leading
//! zeros stripped), alpha segments compare lexically, and a numeric segment
//! always outranks an alpha segment at the same position. This mirrors the
//! `strverscmp`/`_alpm_versioncmp` algorithm almost unchanged; see
//! `original_source/lib/libalpm/versioncmp.c`.

use std::cmp::Ordering;
use std::fmt;

/// A package version string, compared with epoch/release-aware semantics.
///
/// `Version` does not reject malformed input: any string is a valid
/// version, the way pacman treats `pkgver`/`pkgrel` as opaque upstream
/// text. Construct with [`Version::new`] or any of the `From` impls.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version(String);

impl Version {
    /// Wrap a raw version string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The raw, unparsed version string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare this version against another using epoch/release semantics.
    ///
    /// This is a free function equivalent (`compare(a, b)` in spec terms)
    /// exposed as a method for ergonomic use with `Ord`.
    pub fn compare(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::str::FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two raw version strings using epoch/release-aware semantics.
///
/// This is the free-standing `compare(a, b) -> Ordering` described by the
/// version algebra component; [`Version::compare`] forwards here.
pub fn compare(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (epoch_a, rest_a) = split_epoch(a);
    let (epoch_b, rest_b) = split_epoch(b);
    match epoch_a.cmp(&epoch_b) {
        Ordering::Equal => {}
        other => return other,
    }

    let (ver_a, release_a) = split_release(rest_a);
    let (ver_b, release_b) = split_release(rest_b);

    match segment_compare(ver_a, ver_b) {
        Ordering::Equal => {}
        other => return other,
    }

    // An absent release compares equal to any release on the other side
    // only when both are absent: if only one side carries an explicit
    // release, there is nothing to compare it against, so the comparison
    // resolves at the upstream-version segment above.
    match (release_a, release_b) {
        (Some(ra), Some(rb)) => segment_compare(ra, rb),
        _ => Ordering::Equal,
    }
}

/// Split off a leading `epoch:` prefix. Absent or unparsable epochs are 0.
fn split_epoch(s: &str) -> (u64, &str) {
    match s.find(':') {
        Some(idx) => {
            let epoch = s[..idx].parse::<u64>().unwrap_or(0);
            (epoch, &s[idx + 1..])
        }
        None => (0, s),
    }
}

/// Split off a trailing `-release` suffix at the *first* dash, matching
/// `_alpm_versioncmp`'s `for(one = str1; *one && *one != '-'; one++)` scan.
fn split_release(s: &str) -> (&str, Option<&str>) {
    match s.find('-') {
        Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
        None => (s, None),
    }
}

/// Walk two version strings segment by segment.
fn segment_compare(a: &str, b: &str) -> Ordering {
    let mut one = a;
    let mut two = b;

    loop {
        one = one.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
        two = two.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());

        if one.is_empty() && two.is_empty() {
            return Ordering::Equal;
        }

        let (seg1, rest1, is1_num) = take_segment(one);
        let (seg2, rest2, is2_num) = take_segment(two);

        if seg1.is_empty() && !seg2.is_empty() {
            // one ran out; an alpha segment ranks older than the empty
            // extension, a numeric segment ranks newer.
            return if is2_num {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        if !seg1.is_empty() && seg2.is_empty() {
            return if is1_num {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        if is1_num != is2_num {
            return if is1_num {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let cmp = if is1_num {
            compare_numeric(seg1, seg2)
        } else {
            seg1.cmp(seg2)
        };
        if cmp != Ordering::Equal {
            return cmp;
        }

        one = rest1;
        two = rest2;
    }
}

/// Take the next maximal run of digits or letters from the front of `s`.
/// Returns `(segment, rest, is_numeric)`.
fn take_segment(s: &str) -> (&str, &str, bool) {
    let Some(first) = s.chars().next() else {
        return ("", "", false);
    };
    if first.is_ascii_digit() {
        let end = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        (&s[..end], &s[end..], true)
    } else {
        let end = s
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(s.len());
        (&s[..end], &s[end..], false)
    }
}

/// Compare two all-digit strings numerically, leading zeros stripped.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    match a.len().cmp(&b.len()) {
        Ordering::Equal => a.cmp(b),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &str, b: &str) -> Ordering {
        compare(a, b)
    }

    #[test]
    fn s1_scenarios_from_spec() {
        assert_eq!(cmp("1.0.1", "1.0.2"), Ordering::Less);
        assert_eq!(cmp("1:1.0", "2.0"), Ordering::Greater);
        assert_eq!(cmp("1.0-1", "1.0-2"), Ordering::Less);
        assert_eq!(cmp("1.0a", "1.0"), Ordering::Less);
        assert_eq!(cmp("1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn equal_strings_short_circuit() {
        assert_eq!(cmp("1.2.3-4", "1.2.3-4"), Ordering::Equal);
    }

    #[test]
    fn epoch_dominates() {
        assert_eq!(cmp("0:5.0", "1:0.1"), Ordering::Less);
        assert_eq!(cmp("2:1.0", "1:99.0"), Ordering::Greater);
    }

    #[test]
    fn numeric_leading_zeros_stripped() {
        assert_eq!(cmp("1.002", "1.2"), Ordering::Equal);
        assert_eq!(cmp("1.0003", "1.002"), Ordering::Greater);
    }

    #[test]
    fn release_only_compared_when_both_present() {
        // one side has no release: falls back to equal once upstream matches
        assert_eq!(cmp("1.0", "1.0-1"), Ordering::Equal);
        assert_eq!(cmp("1.0-1", "1.0"), Ordering::Equal);
        assert_eq!(cmp("1.0-1", "1.0-2"), Ordering::Less);
    }

    #[test]
    fn alpha_older_than_numeric_same_position() {
        assert_eq!(cmp("1.5a", "1.5.1"), Ordering::Less);
    }

    #[test]
    fn separators_are_not_compared() {
        assert_eq!(cmp("1.0.0", "1..0..0"), Ordering::Equal);
        assert_eq!(cmp("1_0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn total_order_properties() {
        // reflexive
        assert_eq!(cmp("3.2.1", "3.2.1"), Ordering::Equal);
        // antisymmetric
        assert_eq!(cmp("3.2.1", "3.2.2"), Ordering::Less);
        assert_eq!(cmp("3.2.2", "3.2.1"), Ordering::Greater);
        // transitive
        assert_eq!(cmp("1.0", "2.0"), Ordering::Less);
        assert_eq!(cmp("2.0", "3.0"), Ordering::Less);
        assert_eq!(cmp("1.0", "3.0"), Ordering::Less);
    }

    #[test]
    fn version_ord_impl_matches_free_function() {
        let a = Version::new("1.0.1");
        let b = Version::new("1.0.2");
        assert!(a < b);
    }
}
