use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::SOURCE_EXTENSIONS;
use crate::error::Error;

const COLUMN_SEPARATOR: char = '|';
const COMMENT_MARKER: char = '#';
const ESCAPE: char = '\\';

/// One titlemap line: the source and output base names of a single video
/// title plus the HandBrake arguments used to produce it.
///
/// ```text
/// source_base_name | transcode_args_or_title_number | output_base_name | metadata # comment
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TitleRecord {
    /// Input media file name, without directory or extension.
    pub source_base_name: String,
    /// Either a bare title number or a shell-quoted argument string.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_transcode_args: String,
    /// Output media file name, without directory or extension.
    /// Falls back to `source_base_name`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output_base_name: String,
    /// Reserved column; carried through but not interpreted.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_metadata: String,
    /// Trailing comment, including the leading `#`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_comment: String,
}

/// Whether a parsed line names a title at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The source column is present and non-empty.
    Title,
    /// Blank line, comment-only line, or an empty source column.
    Blank,
}

/// Parses one titlemap line.
///
/// Never fails: a line without a usable source column yields
/// [`ParseOutcome::Blank`] alongside whatever else was on the line, so the
/// comment survives for callers that echo lines back out.
pub fn parse(line: &str) -> (TitleRecord, ParseOutcome) {
    let (working, comment) = split_comment(line);
    let fields = split_columns(working);

    let mut record = TitleRecord {
        raw_comment: comment.to_string(),
        ..TitleRecord::default()
    };

    if let Some(field) = fields.first() {
        let name = clean(field);
        record.output_base_name = name.clone();
        record.source_base_name = name;
    }
    if let Some(field) = fields.get(1) {
        record.raw_transcode_args = field.trim().to_string();
    }
    if let Some(field) = fields.get(2) {
        let name = clean(field);
        if !name.is_empty() {
            record.output_base_name = name;
        }
    }
    if let Some(field) = fields.get(3) {
        let trimmed = field.trim();
        record.raw_metadata = unquote(trimmed).unwrap_or_else(|| trimmed.to_string());
    }
    // columns past the fourth are reserved

    let outcome = if record.source_base_name.is_empty() {
        ParseOutcome::Blank
    } else {
        ParseOutcome::Title
    };
    (record, outcome)
}

impl FromStr for TitleRecord {
    type Err = Error;

    /// Like [`parse`], but a line without a title is `InvalidTitleColumn`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match parse(line) {
            (record, ParseOutcome::Title) => Ok(record),
            (_, ParseOutcome::Blank) => Err(Error::InvalidTitleColumn),
        }
    }
}

impl TitleRecord {
    /// Splits the transcode-argument column into HandBrakeCLI arguments.
    ///
    /// A bare run of ASCII digits is shorthand for `--title=<number>`. A sign
    /// does not count, so `+42` and `-1` are split like any other argument
    /// text. Anything else is split shell-style, honouring quotes and
    /// backslash escapes.
    pub fn transcode_arguments(&self) -> Result<Vec<String>, Error> {
        let value = self.raw_transcode_args.trim();
        if is_title_number(value) {
            return Ok(vec![format!("--title={value}")]);
        }
        shell_words::split(value).map_err(|e| Error::ArgumentSyntax {
            value: value.to_string(),
            reason: e.to_string(),
        })
    }

    /// Finds this title's source media in `dir`, trying each recognised
    /// source extension in turn.
    pub fn source_in(&self, dir: &Path) -> Option<PathBuf> {
        if self.source_base_name.is_empty() {
            return None;
        }
        SOURCE_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}{}", self.source_base_name, ext)))
            .find(|path| path.exists())
    }
}

impl fmt::Display for TitleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}{}",
            escape_name(&self.source_base_name),
            self.raw_transcode_args,
            escape_name(&self.output_base_name),
            quote_metadata(&self.raw_metadata),
            self.raw_comment
        )
    }
}

fn is_title_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Splits off the comment at the first unescaped `#`.
fn split_comment(line: &str) -> (&str, &str) {
    match find_unescaped(line, COMMENT_MARKER) {
        Some(pos) => (&line[..pos], &line[pos..]),
        None => (line, ""),
    }
}

/// Splits on unescaped `|`. An empty line has no columns.
fn split_columns(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    if line.is_empty() {
        return fields;
    }
    let mut rest = line;
    while let Some(pos) = find_unescaped(rest, COLUMN_SEPARATOR) {
        fields.push(&rest[..pos]);
        rest = &rest[pos + COLUMN_SEPARATOR.len_utf8()..];
    }
    fields.push(rest);
    fields
}

fn find_unescaped(s: &str, target: char) -> Option<usize> {
    let mut chars = s.char_indices();
    while let Some((pos, c)) = chars.next() {
        if c == ESCAPE {
            chars.next();
        } else if c == target {
            return Some(pos);
        }
    }
    None
}

/// Trims a name column, resolves backslash escapes, and normalises to NFD,
/// the form macOS stores filenames in.
fn clean(field: &str) -> String {
    let trimmed = field.trim();
    let resolved = if trimmed.contains(ESCAPE) {
        unescape(trimmed).unwrap_or_else(|| trimmed.to_string())
    } else {
        trimmed.to_string()
    };
    resolved.nfd().collect()
}

/// Resolves the escapes of a double-quoted string body. Returns `None` for
/// anything a double-quoted literal could not contain: unknown escapes, bare
/// quotes, newlines, or bytes that do not form UTF-8.
fn unescape(body: &str) -> Option<String> {
    let mut out: Vec<u8> = Vec::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        match c {
            '"' | '\n' => return None,
            ESCAPE => {
                let escaped = chars.next()?;
                match escaped {
                    'a' => out.push(0x07),
                    'b' => out.push(0x08),
                    'f' => out.push(0x0c),
                    'n' => out.push(b'\n'),
                    'r' => out.push(b'\r'),
                    't' => out.push(b'\t'),
                    'v' => out.push(0x0b),
                    '\\' | '"' | '|' | '#' => out.push(escaped as u8),
                    'x' => out.push(u8::try_from(take_digits(&mut chars, 2, 16)?).ok()?),
                    'u' | 'U' => {
                        let width = if escaped == 'u' { 4 } else { 8 };
                        let decoded = char::from_u32(take_digits(&mut chars, width, 16)?)?;
                        out.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
                    }
                    '0'..='7' => {
                        let rest = take_digits(&mut chars, 2, 8)?;
                        let value = (escaped as u32 - '0' as u32) * 64 + rest;
                        out.push(u8::try_from(value).ok()?);
                    }
                    _ => return None,
                }
            }
            _ => out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
        }
    }
    String::from_utf8(out).ok()
}

fn take_digits(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    count: usize,
    radix: u32,
) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        value = value * radix + chars.next()?.to_digit(radix)?;
    }
    Some(value)
}

/// Unquotes a double-quoted, back-quoted, or single-character quoted
/// literal. Returns `None` if `s` is not one.
fn unquote(s: &str) -> Option<String> {
    let mut chars = s.chars();
    let (first, last) = (chars.next()?, chars.next_back()?);
    let body = chars.as_str();
    match (first, last) {
        ('"', '"') => unescape(body),
        ('`', '`') if !body.contains('`') => Some(body.replace('\r', "")),
        ('\'', '\'') => {
            let decoded = match body {
                "\"" => "\"".to_string(),
                "\\'" => "'".to_string(),
                "'" => return None,
                _ => unescape(body)?,
            };
            (decoded.chars().count() == 1).then_some(decoded)
        }
        _ => None,
    }
}

fn needs_escape(c: char) -> bool {
    matches!(c, COLUMN_SEPARATOR | COMMENT_MARKER | ESCAPE | '"')
}

/// Writes `s` so that `unescape` reads it back unchanged. With `edges`,
/// leading and trailing whitespace is escaped too, so `clean` cannot trim it.
fn escape(s: &str, edges: bool) -> String {
    let first = s.find(|c: char| !c.is_whitespace()).unwrap_or(s.len());
    let last = s
        .rfind(|c: char| !c.is_whitespace())
        .map_or(0, |pos| pos + s[pos..].chars().next().map_or(1, char::len_utf8));

    let mut out = String::with_capacity(s.len());
    for (pos, c) in s.char_indices() {
        let at_edge = edges && (pos < first || pos >= last);
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if needs_escape(c) => {
                out.push(ESCAPE);
                out.push(c);
            }
            c if c.is_control() || (at_edge && c.is_whitespace()) => {
                let code = c as u32;
                if code < 0x80 {
                    out.push_str(&format!("\\x{code:02x}"));
                } else if code <= 0xffff {
                    out.push_str(&format!("\\u{code:04x}"));
                } else {
                    out.push_str(&format!("\\U{code:08x}"));
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_name(name: &str) -> String {
    escape(name, true)
}

/// Quotes metadata whenever the bare text would not parse back as itself.
fn quote_metadata(metadata: &str) -> String {
    let is_quote = |c: char| matches!(c, '"' | '\'' | '`');
    let bare = !metadata.contains(|c: char| needs_escape(c) || c.is_control())
        && !metadata.starts_with(|c: char| c.is_whitespace() || is_quote(c))
        && !metadata.ends_with(|c: char| c.is_whitespace() || is_quote(c));
    if bare {
        metadata.to_string()
    } else {
        format!("\"{}\"", escape(metadata, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_four_columns() {
        let (t, outcome) = parse("disc1 | 3 | Movie (1999) | extra");
        assert_eq!(outcome, ParseOutcome::Title);
        assert_eq!(t.source_base_name, "disc1");
        assert_eq!(t.raw_transcode_args, "3");
        assert_eq!(t.output_base_name, "Movie (1999)");
        assert_eq!(t.raw_metadata, "extra");
        assert_eq!(t.raw_comment, "");
    }

    #[test]
    fn test_parse_integer_only_line() {
        let (t, outcome) = parse("42");
        assert_eq!(outcome, ParseOutcome::Title);
        assert_eq!(t.source_base_name, "42");
        assert_eq!(t.output_base_name, "42");
        assert_eq!(t.raw_transcode_args, "");
    }

    #[test]
    fn test_parse_quoted_preset() {
        let (t, _) = parse("movie | --preset \"HQ 720p30 Surround\" | out");
        assert_eq!(t.source_base_name, "movie");
        assert_eq!(t.raw_transcode_args, "--preset \"HQ 720p30 Surround\"");
        assert_eq!(t.output_base_name, "out");
        assert_eq!(
            t.transcode_arguments().unwrap(),
            vec!["--preset", "HQ 720p30 Surround"]
        );
    }

    #[test]
    fn test_parse_comment() {
        let (t, outcome) = parse("name # a comment");
        assert_eq!(outcome, ParseOutcome::Title);
        assert_eq!(t.source_base_name, "name");
        assert_eq!(t.output_base_name, "name");
        assert_eq!(t.raw_comment, "# a comment");
        assert_eq!(t.raw_transcode_args, "");
        assert_eq!(t.raw_metadata, "");
    }

    #[test]
    fn test_parse_blank_and_comment_only() {
        for line in ["", "   ", "# just a note", " | 4 | out"] {
            let (t, outcome) = parse(line);
            assert_eq!(outcome, ParseOutcome::Blank, "line {line:?}");
            assert_eq!(t.source_base_name, "");
        }
        let (t, _) = parse("# just a note");
        assert_eq!(t.raw_comment, "# just a note");
    }

    #[test]
    fn test_from_str_rejects_blank() {
        assert!(matches!(
            "".parse::<TitleRecord>(),
            Err(Error::InvalidTitleColumn)
        ));
        assert_eq!("a|1".parse::<TitleRecord>().unwrap().source_base_name, "a");
    }

    #[test]
    fn test_blank_output_column_falls_back_to_source() {
        let (t, _) = parse("disc | 2 |   | meta");
        assert_eq!(t.output_base_name, "disc");
        assert_eq!(t.raw_metadata, "meta");
    }

    #[test]
    fn test_empty_columns_are_positional() {
        let (t, _) = parse("disc||out");
        assert_eq!(t.raw_transcode_args, "");
        assert_eq!(t.output_base_name, "out");
    }

    #[test]
    fn test_escaped_separator_and_comment_in_names() {
        let (t, _) = parse(r"AC\|DC \#1 | 1 | out\x7Cname # real");
        assert_eq!(t.source_base_name, "AC|DC #1");
        assert_eq!(t.output_base_name, "out|name");
        assert_eq!(t.raw_comment, "# real");
    }

    #[test]
    fn test_bad_escape_keeps_raw_name() {
        let (t, _) = parse(r"C:\path | 1");
        assert_eq!(t.source_base_name, r"C:\path");
    }

    #[test]
    fn test_names_are_nfd() {
        let (t, _) = parse("Am\u{e9}lie");
        assert_eq!(t.source_base_name, "Ame\u{301}lie");
    }

    #[test]
    fn test_quoted_metadata_is_unquoted() {
        let (t, _) = parse(r#"a|1|b| "x\ty" "#);
        assert_eq!(t.raw_metadata, "x\ty");
        let (t, _) = parse(r#"a|1|b| "unterminated "#);
        assert_eq!(t.raw_metadata, "\"unterminated");
    }

    #[test]
    fn test_transcode_arguments_title_shorthand() {
        let (t, _) = parse("disc | 42");
        assert_eq!(t.transcode_arguments().unwrap(), vec!["--title=42"]);
    }

    #[test]
    fn test_transcode_arguments_signed_number_is_not_shorthand() {
        let (t, _) = parse("disc | +42");
        assert_eq!(t.transcode_arguments().unwrap(), vec!["+42"]);
        let (t, _) = parse("disc | -1");
        assert_eq!(t.transcode_arguments().unwrap(), vec!["-1"]);
    }

    #[test]
    fn test_transcode_arguments_unbalanced_quote() {
        let (t, _) = parse("disc | --preset \"HQ");
        assert!(matches!(
            t.transcode_arguments(),
            Err(Error::ArgumentSyntax { .. })
        ));
    }

    #[test]
    fn test_transcode_arguments_empty() {
        let (t, _) = parse("disc");
        assert!(t.transcode_arguments().unwrap().is_empty());
    }

    #[test]
    fn test_display_round_trip() {
        for line in [
            "disc|3|Movie (1999)|extra",
            "disc|--preset \"HQ 720p30\" --title 2|out|",
            r"AC\|DC|1|AC\#DC|",
            r##"disc|1|out|"a\|b"# trailing"##,
        ] {
            let (t, _) = parse(line);
            let (again, _) = parse(&t.to_string());
            assert_eq!(again, t, "line {line:?}");
        }
    }

    #[test]
    fn test_display_round_trip_escaped_whitespace_and_controls() {
        for line in [
            r"a|1|\x20out",
            r"\tdisc\u00a0|1|out ",
            r"disc|1|two\nlines",
            r#"a|1|b|"'x'""#,
            r#"a|1|b|" padded ""#,
            r#"a|1|b|"`tick`""#,
            r#"a|1|b|"tab\there""#,
        ] {
            let (t, _) = parse(line);
            let printed = t.to_string();
            assert!(!printed.contains('\n'), "line {line:?} printed {printed:?}");
            let (again, _) = parse(&printed);
            assert_eq!(again, t, "line {line:?} printed {printed:?}");
        }
    }

    #[test]
    fn test_display_escapes_edge_whitespace() {
        let (t, _) = parse(r"a|1|\x20out");
        assert_eq!(t.output_base_name, " out");
        assert_eq!(t.to_string(), r"a|1|\x20out|");

        let (t, _) = parse(r#"a|1|b|"'x'""#);
        assert_eq!(t.raw_metadata, "'x'");
        assert_eq!(t.to_string(), r#"a|1|b|"'x'""#);
    }

    #[test]
    fn test_display_format() {
        let (t, _) = parse("name # note");
        assert_eq!(t.to_string(), "name||name|# note");
    }

    #[test]
    fn test_source_in() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("disc.dvdmedia")).unwrap();
        std::fs::write(dir.path().join("other.mkv"), b"").unwrap();

        let (t, _) = parse("disc | 1");
        assert_eq!(t.source_in(dir.path()), Some(dir.path().join("disc.dvdmedia")));
        let (t, _) = parse("other | 1");
        assert_eq!(t.source_in(dir.path()), Some(dir.path().join("other.mkv")));
        let (t, _) = parse("missing | 1");
        assert_eq!(t.source_in(dir.path()), None);
    }
}
