//! The on-disk local/sync database text format (spec §4.4): `%SECTION%`
//! headers followed by one value per line, sections separated by a blank
//! line.
//!
//! Parsing is deliberately forgiving: a malformed section logs a warning
//! and the parser carries on with whatever it has, matching
//! `be_local.c`'s line-oriented reader, which treats every field as
//! best-effort except the name/version identifying the package itself.

use std::collections::BTreeMap;

/// A parsed section file: section name to its list of value lines, in
/// file order.
pub type Sections = BTreeMap<String, Vec<String>>;

/// Parse a `desc`/`files`/`depends`-style section file.
///
/// Lines before the first `%SECTION%` header are silently dropped (rather
/// than failing the whole file) — this is the corruption-tolerant
/// behavior spec §4.4 calls for.
pub fn parse_sections(content: &str) -> Sections {
    let mut sections = Sections::new();
    let mut current: Option<String> = None;
    let mut values: Vec<String> = Vec::new();

    for line in content.lines() {
        if let Some(name) = section_header(line) {
            if let Some(prev) = current.take() {
                sections.entry(prev).or_default().extend(std::mem::take(&mut values));
            }
            current = Some(name.to_string());
        } else if line.is_empty() {
            // Blank lines separate sections but never appear inside one.
        } else if current.is_some() {
            values.push(line.to_string());
        }
        // A line outside any section is dropped: tolerated corruption.
    }
    if let Some(prev) = current.take() {
        sections.entry(prev).or_default().extend(values);
    }
    sections
}

fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('%')?.strip_suffix('%')
}

/// Serialize `sections` (name, values) pairs back into the on-disk format,
/// in the order given. A section with no values is omitted entirely.
pub fn write_sections<'a>(sections: impl IntoIterator<Item = (&'a str, &'a [String])>) -> String {
    let mut out = String::new();
    for (name, values) in sections {
        if values.is_empty() {
            continue;
        }
        out.push('%');
        out.push_str(name);
        out.push_str("%\n");
        for v in values {
            out.push_str(v);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// The single scalar value of a section, if it has exactly one line.
pub fn scalar(sections: &Sections, name: &str) -> Option<&str> {
    sections.get(name).and_then(|v| v.first()).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_and_list_sections() {
        let content = "%NAME%\nfoo\n\n%DEPENDS%\nbar\nbaz>=1.0\n\n";
        let sections = parse_sections(content);
        assert_eq!(scalar(&sections, "NAME"), Some("foo"));
        assert_eq!(
            sections.get("DEPENDS").map(Vec::as_slice),
            Some(&["bar".to_string(), "baz>=1.0".to_string()][..])
        );

        let rebuilt = write_sections([
            ("NAME", &["foo".to_string()][..]),
            ("DEPENDS", &["bar".to_string(), "baz>=1.0".to_string()][..]),
        ]);
        assert_eq!(parse_sections(&rebuilt), sections);
    }

    #[test]
    fn tolerates_garbage_before_first_header() {
        let content = "garbage line\n%NAME%\nfoo\n\n";
        let sections = parse_sections(content);
        assert_eq!(scalar(&sections, "NAME"), Some("foo"));
    }

    #[test]
    fn empty_sections_are_not_emitted() {
        let out = write_sections([("NAME", &[][..])]);
        assert!(out.is_empty());
    }
}
