//! Path segments and the parsed `FieldPath`

use std::fmt;

use serde::{Serialize, Serializer};

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Literal or backtick-quoted field name
    Field(String),
    /// `*`: any direct child
    Wildcard,
    /// `**`: any descendant at any depth
    RecursiveWildcard,
    /// `[]`: the element of a list
    List,
    /// `[*]`: any value of a map
    MapAny,
    /// `['key']`: one map entry
    MapKey(String),
}

impl Segment {
    /// Specificity contribution of this segment
    pub fn score(&self) -> u32 {
        match self {
            Segment::Field(_) => 3,
            Segment::MapKey(_) => 2,
            Segment::List | Segment::MapAny | Segment::Wildcard => 1,
            Segment::RecursiveWildcard => 0,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(
            self,
            Segment::Wildcard | Segment::RecursiveWildcard | Segment::MapAny
        )
    }

    /// True for `[]`, `[*]` and `['key']`
    pub fn is_index(&self) -> bool {
        matches!(self, Segment::List | Segment::MapAny | Segment::MapKey(_))
    }
}

/// An immutable, parsed field path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// A path of plain field names
    pub fn from_fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(|n| Segment::Field(n.into())).collect())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// No wildcards: the path can name at most one field
    pub fn is_concrete(&self) -> bool {
        !self.segments.iter().any(Segment::is_wildcard)
    }

    pub fn recursive_wildcards(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::RecursiveWildcard))
            .count()
    }

    /// Sum of segment scores
    pub fn specificity(&self) -> u32 {
        self.segments.iter().map(Segment::score).sum()
    }

    /// First segment when it is a literal field name
    pub fn head_field(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Field(name)) => Some(name),
            _ => None,
        }
    }
}

fn needs_quoting(name: &str) -> bool {
    name.is_empty()
        || name == "*"
        || name == "**"
        || !name.chars().all(super::parser::is_ident_char)
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && !segment.is_index() {
                f.write_str(".")?;
            }
            match segment {
                Segment::Field(name) if needs_quoting(name) => write!(f, "`{}`", name)?,
                Segment::Field(name) => f.write_str(name)?,
                Segment::Wildcard => f.write_str("*")?,
                Segment::RecursiveWildcard => f.write_str("**")?,
                Segment::List => f.write_str("[]")?,
                Segment::MapAny => f.write_str("[*]")?,
                Segment::MapKey(key) => write!(f, "['{}']", key.replace('\'', "\\'"))?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
