//! Composite key codec.
//!
//! A key is a path through the domain hierarchy rendered as
//! `Tag:Value:Tag:Value...`, e.g. `DT:42:G:line-1`. String values are
//! escaped so the delimiter never appears raw inside a segment:
//!
//! | raw | escaped |
//! |-----|---------|
//! | `%` | `%25`   |
//! | `:` | `%3A`   |
//!
//! Numbers and booleans are written as-is.

use std::fmt;

use super::{Result, StorageError};

/// Reserved segment delimiter.
pub const DELIMITER: char = ':';

/// Entity tags used as the leading segment of each key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Template,
    TemplateVersion,
    Group,
    GroupId,
    Device,
    DeploymentTask,
    /// Entity-type listing partitions on the secondary index.
    Type,
}

impl Tag {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Tag::Template => "T",
            Tag::TemplateVersion => "V",
            Tag::Group => "G",
            Tag::GroupId => "GI",
            Tag::Device => "D",
            Tag::DeploymentTask => "DT",
            Tag::Type => "type",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "T" => Some(Tag::Template),
            "V" => Some(Tag::TemplateVersion),
            "G" => Some(Tag::Group),
            "GI" => Some(Tag::GroupId),
            "D" => Some(Tag::Device),
            "DT" => Some(Tag::DeploymentTask),
            "type" => Some(Tag::Type),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value segment of a composite key.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    Str(&'a str),
    Int(i64),
    Bool(bool),
    Tag(Tag),
}

impl<'a> From<&'a str> for Segment<'a> {
    fn from(value: &'a str) -> Self {
        Segment::Str(value)
    }
}

impl<'a> From<&'a String> for Segment<'a> {
    fn from(value: &'a String) -> Self {
        Segment::Str(value.as_str())
    }
}

impl From<u32> for Segment<'_> {
    fn from(value: u32) -> Self {
        Segment::Int(i64::from(value))
    }
}

impl From<i64> for Segment<'_> {
    fn from(value: i64) -> Self {
        Segment::Int(value)
    }
}

impl From<bool> for Segment<'_> {
    fn from(value: bool) -> Self {
        Segment::Bool(value)
    }
}

impl From<Tag> for Segment<'_> {
    fn from(value: Tag) -> Self {
        Segment::Tag(value)
    }
}

/// Escape a string segment.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            DELIMITER => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Reverse [`escape`]. Any `%` not followed by a known escape is an error.
pub fn unescape(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3).ok_or_else(|| {
            StorageError::Encoding(format!("truncated escape in segment '{}'", value))
        })?;
        match code {
            "25" => out.push('%'),
            "3A" | "3a" => out.push(DELIMITER),
            _ => {
                return Err(StorageError::Encoding(format!(
                    "unknown escape '%{}' in segment '{}'",
                    code, value
                )))
            }
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Encode a composite key from a tag and its segments.
pub fn encode(tag: Tag, segments: &[Segment<'_>]) -> String {
    let mut key = String::from(tag.as_str());
    for segment in segments {
        key.push(DELIMITER);
        match segment {
            Segment::Str(s) => key.push_str(&escape(s)),
            Segment::Int(n) => key.push_str(&n.to_string()),
            Segment::Bool(b) => key.push_str(if *b { "true" } else { "false" }),
            Segment::Tag(t) => key.push_str(t.as_str()),
        }
    }
    key
}

/// Encode a key intended for a begins-with match.
///
/// Same rendering as [`encode`]. Note that `G:a` is also a prefix of `G:ab`;
/// callers narrow by the exact natural id after assembly.
pub fn encode_prefix(tag: Tag, segments: &[Segment<'_>]) -> String {
    encode(tag, segments)
}

/// Split a key into its unescaped segments.
///
/// Returns `Ok(None)` when no key is given.
pub fn decode(key: Option<&str>) -> Result<Option<Vec<String>>> {
    key.map(|k| k.split(DELIMITER).map(unescape).collect::<Result<Vec<_>>>())
        .transpose()
}

/// True if `value` begins with `tag` followed by the delimiter.
pub fn has_prefix(value: &str, tag: Tag) -> bool {
    value
        .strip_prefix(tag.as_str())
        .is_some_and(|rest| rest.starts_with(DELIMITER))
}

/// A decoded key as `(tag, value)` pairs.
///
/// Used by the row assemblers to match sort-key shapes with slice patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath(Vec<(Tag, String)>);

impl KeyPath {
    /// Parse a key into tag/value pairs.
    ///
    /// `Ok(None)` means the key decoded but is not a tag/value path
    /// (odd segment count or an unknown tag). Bad escapes are errors.
    pub fn parse(key: &str) -> Result<Option<Self>> {
        let segments = match decode(Some(key))? {
            Some(segments) => segments,
            None => return Ok(None),
        };
        if segments.len() % 2 != 0 {
            return Ok(None);
        }

        let mut pairs = Vec::with_capacity(segments.len() / 2);
        let mut iter = segments.into_iter();
        while let (Some(tag), Some(value)) = (iter.next(), iter.next()) {
            match Tag::parse(&tag) {
                Some(tag) => pairs.push((tag, value)),
                None => return Ok(None),
            }
        }
        Ok(Some(Self(pairs)))
    }

    pub fn pairs(&self) -> &[(Tag, String)] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_mixed_segments() {
        let key = encode(
            Tag::Template,
            &["edge".into(), Tag::TemplateVersion.into(), 3u32.into()],
        );
        assert_eq!(key, "T:edge:V:3");
    }

    #[test]
    fn test_encode_bool_segment() {
        assert_eq!(encode(Tag::Device, &["x".into(), true.into()]), "D:x:true");
    }

    #[test]
    fn test_roundtrip_with_raw_delimiter() {
        let name = "plant:floor-2";
        let key = encode(Tag::Group, &[name.into(), Tag::Device.into(), "a%b".into()]);
        assert_eq!(key, "G:plant%3Afloor-2:D:a%25b");

        let decoded = decode(Some(key.as_str())).unwrap().unwrap();
        assert_eq!(decoded, vec!["G", name, "D", "a%b"]);
    }

    #[test]
    fn test_values_differing_only_by_delimiter_stay_distinct() {
        let a = encode(Tag::Group, &["a:b".into()]);
        let b = encode(Tag::Group, &["a".into(), "b".into()]);
        assert_ne!(a, b);
        assert_eq!(decode(Some(a.as_str())).unwrap().unwrap(), vec!["G", "a:b"]);
        assert_eq!(decode(Some(b.as_str())).unwrap().unwrap(), vec!["G", "a", "b"]);
    }

    #[test]
    fn test_escape_sequence_text_roundtrips() {
        // A literal "%3A" in a value must not come back as ":".
        let key = encode(Tag::Device, &["%3A".into()]);
        assert_eq!(decode(Some(key.as_str())).unwrap().unwrap(), vec!["D", "%3A"]);
    }

    #[test]
    fn test_decode_none() {
        assert_eq!(decode(None).unwrap(), None);
    }

    #[test]
    fn test_decode_bad_escape_is_error() {
        assert!(matches!(decode(Some("G:%zz")), Err(StorageError::Encoding(_))));
        assert!(matches!(decode(Some("G:abc%2")), Err(StorageError::Encoding(_))));
    }

    #[test]
    fn test_has_prefix() {
        assert!(has_prefix("DT:123", Tag::DeploymentTask));
        assert!(!has_prefix("D:123", Tag::DeploymentTask));
        assert!(!has_prefix("DT", Tag::DeploymentTask));
        assert!(!has_prefix("GI:1", Tag::Group));
        assert!(has_prefix("GI:1", Tag::GroupId));
    }

    #[test]
    fn test_encode_prefix_matches_encode() {
        let segments: [Segment; 1] = ["line-1".into()];
        assert_eq!(
            encode_prefix(Tag::Group, &segments),
            encode(Tag::Group, &segments)
        );
    }

    #[test]
    fn test_key_path_pairs() {
        let path = KeyPath::parse("G:line%3A1:D:thing-9").unwrap().unwrap();
        assert_eq!(
            path.pairs(),
            &[
                (Tag::Group, "line:1".to_string()),
                (Tag::Device, "thing-9".to_string())
            ]
        );
    }

    #[test]
    fn test_key_path_rejects_unknown_tag_and_odd_length() {
        assert_eq!(KeyPath::parse("X:1").unwrap(), None);
        assert_eq!(KeyPath::parse("G:1:D").unwrap(), None);
    }
}
