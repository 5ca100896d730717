//! YOLO label-line parsing and per-line class-ID rewriting.
//!
//! A label line is `class_id x_center y_center width height`. Only the class
//! ID is interpreted; everything after it is opaque geometry and is carried
//! through untouched.

use std::collections::{BTreeMap, BTreeSet};

/// One parsed label line, borrowing from the source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelLine<'a> {
    pub class_id: usize,
    /// The line as read, without its terminator.
    pub raw: &'a str,
    /// Everything after the class ID token, leading whitespace trimmed.
    pub geometry: &'a str,
}

/// Maps a source class ID to its new ID, or `None` to drop the line.
pub trait ClassTransform {
    fn apply(&self, class_id: usize) -> Option<usize>;
}

impl<F> ClassTransform for F
where
    F: Fn(usize) -> Option<usize>,
{
    fn apply(&self, class_id: usize) -> Option<usize> {
        self(class_id)
    }
}

/// Keeps listed IDs as they are.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeepSet(pub BTreeSet<usize>);

impl ClassTransform for KeepSet {
    fn apply(&self, class_id: usize) -> Option<usize> {
        self.0.contains(&class_id).then_some(class_id)
    }
}

/// Substitutes IDs through an old -> new table; unmapped IDs are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Remap(pub BTreeMap<usize, usize>);

impl ClassTransform for Remap {
    fn apply(&self, class_id: usize) -> Option<usize> {
        self.0.get(&class_id).copied()
    }
}

/// Parse a label line. Empty lines and lines without a non-negative integer
/// class ID yield `None`.
pub fn parse_line(line: &str) -> Option<LabelLine<'_>> {
    let raw = line.trim_end_matches(['\n', '\r']);
    let trimmed = raw.trim_start();
    let token = trimmed.split_whitespace().next()?;
    let class_id = token.parse::<usize>().ok()?;
    let geometry = trimmed[token.len()..].trim();

    Some(LabelLine {
        class_id,
        raw,
        geometry,
    })
}

/// Rewrite one label line through `transform`.
///
/// A line whose ID is unchanged is returned exactly as read. A line whose ID
/// changes is rebuilt as the new ID followed by the original geometry tokens.
pub fn process_line<T>(line: &str, transform: &T) -> Option<String>
where
    T: ClassTransform + ?Sized,
{
    let parsed = parse_line(line)?;
    let new_id = transform.apply(parsed.class_id)?;

    if new_id == parsed.class_id {
        return Some(parsed.raw.to_string());
    }

    let mut out = new_id.to_string();
    for token in parsed.geometry.split_whitespace() {
        out.push(' ');
        out.push_str(token);
    }
    Some(out)
}

/// Rewrite a whole label file's contents, returning the surviving lines.
pub fn process_label_text<T>(text: &str, transform: &T) -> Vec<String>
where
    T: ClassTransform + ?Sized,
{
    text.lines()
        .filter_map(|line| process_line(line, transform))
        .collect()
}

/// Join surviving lines into newline-terminated label file contents.
pub fn render_label_lines(lines: &[String]) -> String {
    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Fuzz-only entrypoint for label-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_process_line(input: &str) {
    let _ = parse_line(input);
    let _ = process_line(input, &|id: usize| id.checked_add(1));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keep(ids: &[usize]) -> KeepSet {
        KeepSet(ids.iter().copied().collect())
    }

    fn remap(pairs: &[(usize, usize)]) -> Remap {
        Remap(pairs.iter().copied().collect())
    }

    #[test]
    fn parse_line_reads_class_and_geometry() {
        let parsed = parse_line("2 0.5 0.25 0.3 0.1\n").expect("line should parse");
        assert_eq!(parsed.class_id, 2);
        assert_eq!(parsed.raw, "2 0.5 0.25 0.3 0.1");
        assert_eq!(parsed.geometry, "0.5 0.25 0.3 0.1");
    }

    #[test]
    fn parse_line_skips_empty_and_malformed_rows() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   \r\n").is_none());
        assert!(parse_line("cat 0.1 0.1 0.1 0.1").is_none());
        assert!(parse_line("-1 0.1 0.1 0.1 0.1").is_none());
        assert!(parse_line("1.5 0.1 0.1 0.1 0.1").is_none());
    }

    #[test]
    fn keep_set_drops_other_classes() {
        let lines = process_label_text("0 0.5 0.5 0.1 0.1\n2 0.2 0.2 0.1 0.1\n", &keep(&[2]));
        assert_eq!(lines, vec!["2 0.2 0.2 0.1 0.1"]);
    }

    #[test]
    fn keep_set_preserves_line_bytes() {
        let line = "2   0.200000\t0.2 0.1 0.1  ";
        assert_eq!(process_line(line, &keep(&[2])).as_deref(), Some(line));
    }

    #[test]
    fn remap_substitutes_ids() {
        let table = remap(&[(0, 5), (1, 0)]);
        assert_eq!(
            process_line("1 0.3 0.4 0.05 0.06", &table).as_deref(),
            Some("0 0.3 0.4 0.05 0.06")
        );
        assert_eq!(
            process_line("0 0.3 0.4 0.05 0.06", &table).as_deref(),
            Some("5 0.3 0.4 0.05 0.06")
        );
    }

    #[test]
    fn remap_drops_unmapped_ids() {
        let table = remap(&[(0, 5), (1, 0)]);
        assert!(process_line("3 0.3 0.4 0.05 0.06", &table).is_none());
    }

    #[test]
    fn remap_keeps_geometry_tokens_verbatim() {
        let table = remap(&[(4, 1)]);
        assert_eq!(
            process_line("4 .123456789 1e-3 0.50 0.5000", &table).as_deref(),
            Some("1 .123456789 1e-3 0.50 0.5000")
        );
    }

    #[test]
    fn closures_work_as_transforms() {
        let shift = |id: usize| if id < 3 { Some(id + 10) } else { None };
        let lines = process_label_text("0 a b c d\n3 a b c d\n2 e f g h\n", &shift);
        assert_eq!(lines, vec!["10 a b c d", "12 e f g h"]);
    }

    #[test]
    fn render_label_lines_terminates_every_line() {
        let rendered = render_label_lines(&["0 1 2 3 4".to_string(), "1 1 2 3 4".to_string()]);
        assert_eq!(rendered, "0 1 2 3 4\n1 1 2 3 4\n");
        assert!(render_label_lines(&[]).is_empty());
    }
}
