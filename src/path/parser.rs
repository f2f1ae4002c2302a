//! Parser for the path grammar
//!
//! ```text
//! pattern   := component ("." component)*
//! component := segment ("[]" | "[" ("*" | "'" chars "'") "]")*
//! segment   := identifier | "*" | "**" | "`" chars "`"
//! ```

use std::fmt;

use super::segment::{FieldPath, Segment};

/// A malformed path. `position` is a character offset into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub message: String,
    pub position: usize,
    /// Index of the component being parsed
    pub segment: usize,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at position {} (segment {})",
            self.message, self.position, self.segment
        )
    }
}

impl std::error::Error for PathError {}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '$'
}

/// Parses a field path or PSL pattern
pub fn parse_path(text: &str) -> Result<FieldPath, PathError> {
    Parser {
        chars: text.chars().collect(),
        pos: 0,
        component: 0,
    }
    .parse()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    component: usize,
}

impl Parser {
    fn error(&self, message: impl Into<String>) -> PathError {
        PathError {
            message: message.into(),
            position: self.pos,
            segment: self.component,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn parse(mut self) -> Result<FieldPath, PathError> {
        if self.chars.is_empty() {
            return Err(self.error("empty path"));
        }

        let mut segments = Vec::new();
        loop {
            self.component(&mut segments)?;
            match self.peek() {
                None => break,
                Some('.') => {
                    self.pos += 1;
                    self.component += 1;
                }
                Some(c) => return Err(self.error(format!("unexpected character '{}'", c))),
            }
        }
        Ok(FieldPath::new(segments))
    }

    fn component(&mut self, segments: &mut Vec<Segment>) -> Result<(), PathError> {
        segments.push(self.segment()?);
        while self.peek() == Some('[') {
            segments.push(self.index()?);
        }
        Ok(())
    }

    fn segment(&mut self) -> Result<Segment, PathError> {
        match self.peek() {
            None | Some('.') => Err(self.error("empty segment")),
            Some('[') => Err(self.error("index without a field name")),
            Some('`') => {
                self.pos += 1;
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c == '`' {
                        let name: String = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        if name.is_empty() {
                            return Err(self.error("empty quoted segment"));
                        }
                        return Ok(Segment::Field(name));
                    }
                    self.pos += 1;
                }
                self.pos = start - 1;
                Err(self.error("unmatched backtick"))
            }
            Some('*') => {
                let start = self.pos;
                while self.peek() == Some('*') {
                    self.pos += 1;
                }
                let stars = self.pos - start;
                if matches!(self.peek(), Some(c) if is_ident_char(c)) || stars > 2 {
                    self.pos = start;
                    return Err(self.error("wildcard must be a whole segment"));
                }
                Ok(if stars == 1 {
                    Segment::Wildcard
                } else {
                    Segment::RecursiveWildcard
                })
            }
            Some(_) => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if is_ident_char(c)) {
                    self.pos += 1;
                }
                if self.pos == start {
                    let c = self.chars[self.pos];
                    return Err(self.error(format!("unexpected character '{}'", c)));
                }
                if self.peek() == Some('*') {
                    return Err(self.error("wildcard must be a whole segment"));
                }
                Ok(Segment::Field(self.chars[start..self.pos].iter().collect()))
            }
        }
    }

    /// Parses one `[...]` suffix; the cursor is on the `[`
    fn index(&mut self) -> Result<Segment, PathError> {
        let open = self.pos;
        self.pos += 1;
        let segment = match self.peek() {
            Some(']') => Segment::List,
            Some('*') => {
                self.pos += 1;
                Segment::MapAny
            }
            Some('\'') => {
                self.pos += 1;
                let mut key = String::new();
                loop {
                    match self.peek() {
                        None => {
                            self.pos = open;
                            return Err(self.error("unmatched quote in map key"));
                        }
                        Some('\\') if self.chars.get(self.pos + 1) == Some(&'\'') => {
                            key.push('\'');
                            self.pos += 2;
                        }
                        Some('\'') => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            key.push(c);
                            self.pos += 1;
                        }
                    }
                }
                if key.is_empty() {
                    return Err(self.error("empty map key"));
                }
                Segment::MapKey(key)
            }
            _ => return Err(self.error("expected [], [*] or ['key']")),
        };
        if self.peek() != Some(']') {
            return Err(self.error("unmatched '['"));
        }
        self.pos += 1;
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        let p = parse_path("user.address.city").unwrap();
        assert_eq!(p, FieldPath::from_fields(["user", "address", "city"]));
        assert!(p.is_concrete());
        assert_eq!(p.specificity(), 9);
    }

    #[test]
    fn test_parse_wildcards_and_indexes() {
        let p = parse_path("**.items[].tags['en'].*").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::RecursiveWildcard,
                Segment::Field("items".into()),
                Segment::List,
                Segment::Field("tags".into()),
                Segment::MapKey("en".into()),
                Segment::Wildcard,
            ]
        );
        assert_eq!(p.recursive_wildcards(), 1);
        assert!(!p.is_concrete());
        assert_eq!(p.specificity(), 10);
    }

    #[test]
    fn test_backticks_and_escapes() {
        let p = parse_path("`dotted.name`.meta['it\\'s']").unwrap();
        assert_eq!(p.segments()[0], Segment::Field("dotted.name".into()));
        assert_eq!(p.segments()[2], Segment::MapKey("it's".into()));
        let again = parse_path(&p.to_string()).unwrap();
        assert_eq!(again, p);
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse_path("a..b").unwrap_err();
        assert_eq!(err.message, "empty segment");
        assert_eq!(err.position, 2);
        assert_eq!(err.segment, 1);

        assert_eq!(parse_path("`open").unwrap_err().message, "unmatched backtick");
        assert_eq!(
            parse_path("m['k").unwrap_err().message,
            "unmatched quote in map key"
        );
        assert_eq!(
            parse_path("ab*").unwrap_err().message,
            "wildcard must be a whole segment"
        );
        assert!(parse_path("").is_err());
        assert!(parse_path("a.").is_err());
        assert!(parse_path("a[x]").is_err());
    }
}
