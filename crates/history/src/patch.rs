//! Exact-match application of diff-match-patch patch text
//!
//! Patch text is a list of hunks:
//!
//! ```text
//! @@ -1,8 +1,8 @@
//!  var%20
//! -a
//! +b
//!  = 1;
//! ```
//!
//! Each body line is an operation (`' '` keep, `-` delete, `+` insert)
//! followed by URI-encoded text. Coordinates are counted in UTF-16 code units.
//!
//! Application never searches: a hunk's source text (kept plus deleted runs)
//! must sit exactly at its recorded offset, or the whole patch fails.

use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("invalid hunk header {0:?}")]
    InvalidHeader(String),

    #[error("invalid patch line {0:?}")]
    InvalidLine(String),

    #[error("patch text is not valid UTF-8 after decoding: {0:?}")]
    Encoding(String),

    #[error("hunk {hunk} does not match at offset {offset}")]
    HunkMismatch { hunk: usize, offset: usize },

    #[error("patched text is not valid UTF-16")]
    InvalidText,
}

/// One operation inside a hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Keep(String),
    Delete(String),
    Insert(String),
}

/// A parsed hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// Offset in the source text
    pub start1: usize,
    pub length1: usize,
    /// Offset in the text with all earlier hunks applied
    pub start2: usize,
    pub length2: usize,
    pub ops: Vec<Op>,
}

impl Hunk {
    /// Text the hunk expects to find (kept and deleted runs)
    pub fn source_text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Keep(s) | Op::Delete(s) => Some(s.as_str()),
                Op::Insert(_) => None,
            })
            .collect()
    }

    /// Text the hunk leaves behind (kept and inserted runs)
    pub fn target_text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Keep(s) | Op::Insert(s) => Some(s.as_str()),
                Op::Delete(_) => None,
            })
            .collect()
    }
}

/// Parse patch text into hunks
pub fn parse(text: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks = Vec::new();
    let mut lines = text.split('\n').peekable();

    while let Some(line) = lines.next() {
        if line.is_empty() {
            continue;
        }
        let mut hunk = parse_header(line)?;

        while let Some(&body) = lines.peek() {
            let mut chars = body.chars();
            let op = match chars.next() {
                None => {
                    lines.next();
                    continue;
                }
                Some('@') => break,
                Some(sign) => {
                    let decoded = decode(chars.as_str())?;
                    match sign {
                        ' ' => Op::Keep(decoded),
                        '-' => Op::Delete(decoded),
                        '+' => Op::Insert(decoded),
                        _ => return Err(PatchError::InvalidLine(body.to_string())),
                    }
                }
            };
            hunk.ops.push(op);
            lines.next();
        }

        hunks.push(hunk);
    }

    Ok(hunks)
}

/// Apply patch text to `text`, failing on any inexact hunk
pub fn apply(patch: &str, text: &str) -> Result<String, PatchError> {
    let hunks = parse(patch)?;
    apply_hunks(&hunks, text)
}

/// Apply parsed hunks to `text`, failing on any inexact hunk
pub fn apply_hunks(hunks: &[Hunk], text: &str) -> Result<String, PatchError> {
    let mut units: Vec<u16> = text.encode_utf16().collect();

    for (index, hunk) in hunks.iter().enumerate() {
        let source: Vec<u16> = hunk.source_text().encode_utf16().collect();
        let target: Vec<u16> = hunk.target_text().encode_utf16().collect();
        let offset = hunk.start2;
        let end = offset
            .checked_add(source.len())
            .filter(|&end| end <= units.len() && units[offset..end] == source[..])
            .ok_or(PatchError::HunkMismatch { hunk: index, offset })?;

        units.splice(offset..end, target);
    }

    String::from_utf16(&units).map_err(|_| PatchError::InvalidText)
}

fn parse_header(line: &str) -> Result<Hunk, PatchError> {
    let invalid = || PatchError::InvalidHeader(line.to_string());

    let coords = line
        .strip_prefix("@@ -")
        .and_then(|rest| rest.strip_suffix(" @@"))
        .ok_or_else(invalid)?;
    let (old, new) = coords.split_once(" +").ok_or_else(invalid)?;
    let (start1, length1) = parse_range(old).ok_or_else(invalid)?;
    let (start2, length2) = parse_range(new).ok_or_else(invalid)?;

    Ok(Hunk {
        start1,
        length1,
        start2,
        length2,
        ops: Vec::new(),
    })
}

/// `N` is a one-unit range at N-1; `N,0` is empty at N; `N,L` spans L from N-1
fn parse_range(range: &str) -> Option<(usize, usize)> {
    let (start, length) = match range.split_once(',') {
        Some((start, length)) => (start, Some(length)),
        None => (range, None),
    };
    let start: usize = start.parse().ok()?;

    match length {
        None => Some((start.checked_sub(1)?, 1)),
        Some("0") => Some((start, 0)),
        Some(length) => Some((start.checked_sub(1)?, length.parse().ok()?)),
    }
}

fn decode(encoded: &str) -> Result<String, PatchError> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| PatchError::Encoding(encoded.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_forms() -> Result<(), PatchError> {
        let hunks = parse("@@ -1,2 +1,3 @@\n a\n+b\n b\n@@ -5 +6,0 @@\n-x\n")?;
        assert_eq!(hunks.len(), 2);
        assert_eq!((hunks[0].start1, hunks[0].length1), (0, 2));
        assert_eq!((hunks[0].start2, hunks[0].length2), (0, 3));
        assert_eq!((hunks[1].start1, hunks[1].length1), (4, 1));
        assert_eq!((hunks[1].start2, hunks[1].length2), (6, 0));
        assert_eq!(hunks[1].ops, vec![Op::Delete("x".into())]);
        Ok(())
    }

    #[test]
    fn test_parse_decodes_uri_escapes() -> Result<(), PatchError> {
        let hunks = parse("@@ -1,3 +1,3 @@\n a%0A\n-b\n+c d%25\n")?;
        assert_eq!(
            hunks[0].ops,
            vec![
                Op::Keep("a\n".into()),
                Op::Delete("b".into()),
                Op::Insert("c d%".into())
            ]
        );
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse("not a patch"), Err(PatchError::InvalidHeader(_))));
        assert!(matches!(
            parse("@@ -1 +1 @@\n*oops\n"),
            Err(PatchError::InvalidLine(_))
        ));
    }

    #[test]
    fn test_apply_single_hunk() -> Result<(), PatchError> {
        assert_eq!(apply("@@ -1,2 +1,2 @@\n v\n-3\n+2\n", "v3")?, "v2");
        Ok(())
    }

    #[test]
    fn test_apply_multiple_hunks_track_offsets() -> Result<(), PatchError> {
        let text = "alpha beta gamma delta epsilon";
        // First hunk grows the text; the second's offset is post-first-hunk
        let patch = "@@ -1,5 +1,10 @@\n-alpha\n+ALPHA-BETA\n@@ -24,7 +29,7 @@\n-epsilon\n+EPSILON\n";
        assert_eq!(apply(patch, text)?, "ALPHA-BETA beta gamma delta EPSILON");
        Ok(())
    }

    #[test]
    fn test_apply_insert_into_empty() -> Result<(), PatchError> {
        assert_eq!(apply("@@ -0,0 +1,5 @@\n+hello\n", "")?, "hello");
        Ok(())
    }

    #[test]
    fn test_apply_fails_on_shifted_context() {
        // Same content one unit later: a fuzzy matcher would accept this
        let result = apply("@@ -1,2 +1,2 @@\n v\n-3\n+2\n", " v3");
        assert_eq!(
            result,
            Err(PatchError::HunkMismatch { hunk: 0, offset: 0 })
        );
    }

    #[test]
    fn test_apply_fails_on_changed_content() {
        assert!(matches!(
            apply("@@ -1,2 +1,2 @@\n v\n-3\n+2\n", "v4"),
            Err(PatchError::HunkMismatch { .. })
        ));
    }

    #[test]
    fn test_apply_rejects_offsets_past_the_end() {
        for patch in [
            "@@ -1 +18446744073709551615 @@\n-ab\n+c\n",
            "@@ -1,0 +18446744073709551615,0 @@\n+c\n",
            "@@ -1 +9 @@\n-a\n+c\n",
        ] {
            assert!(
                matches!(apply(patch, "ab"), Err(PatchError::HunkMismatch { hunk: 0, .. })),
                "{}",
                patch
            );
        }
    }

    #[test]
    fn test_apply_counts_utf16_units() -> Result<(), PatchError> {
        // U+1F600 is two UTF-16 units, so "x" sits at offset 2
        assert_eq!(apply("@@ -3 +3 @@\n-x\n+y\n", "\u{1F600}x")?, "\u{1F600}y");
        Ok(())
    }
}
