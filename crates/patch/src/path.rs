//! Dotted document paths.
//!
//! A path is a sequence of object keys and array indices. Both
//! `contributor.0.name` and `contributor[0].name` parse to the same
//! [`Path`], and [`Path`] always displays in the dotted form.

use crate::error::PatchError;
use std::borrow::Cow;
use std::fmt;

/// A single step in a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// An object key.
    Key(String),
    /// A non-negative array index.
    Index(usize),
}

impl Segment {
    /// The segment as an object key. Indices are rendered as decimal strings
    /// so that `{"0": ...}` objects stay addressable.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            Segment::Key(k) => Cow::Borrowed(k),
            Segment::Index(i) => Cow::Owned(i.to_string()),
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Segment::Index(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A parsed, normalized document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path, addressing the document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted or bracketed path string.
    ///
    /// An empty (or all-whitespace) string yields the root path; callers that
    /// need a target inside the document check [`Path::is_empty`].
    pub fn parse(raw: &str) -> Result<Self, PatchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let invalid = |reason: &str| PatchError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }

            // Split "name[0][1]" into "name", "0", "1".
            let (head, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if head.contains(']') {
                return Err(invalid("unmatched ']'"));
            }
            if !head.is_empty() {
                segments.push(Self::classify(head));
            }
            while !rest.is_empty() {
                let Some(inner) = rest.strip_prefix('[') else {
                    return Err(invalid("unexpected characters after ']'"));
                };
                let Some(close) = inner.find(']') else {
                    return Err(invalid("unmatched '['"));
                };
                let index = &inner[..close];
                if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid("bracket notation requires a numeric index"));
                }
                let index = index
                    .parse::<usize>()
                    .map_err(|_| invalid("index is too large"))?;
                segments.push(Segment::Index(index));
                rest = &inner[close + 1..];
            }
        }

        Ok(Self { segments })
    }

    fn classify(token: &str) -> Segment {
        if token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse::<usize>() {
                return Segment::Index(index);
            }
        }
        Segment::Key(token.to_string())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Split into the parent path and the final segment.
    pub fn split_last(&self) -> Option<(&[Segment], &Segment)> {
        self.segments
            .split_last()
            .map(|(last, parent)| (parent, last))
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Render a segment slice in dotted form (used in error messages).
pub(crate) fn render(segments: &[Segment]) -> String {
    Path::from(segments.to_vec()).to_string()
}
