//! Pattern compilation and structural limits

use serde::{Deserialize, Serialize};

use crate::path::{parse_path, FieldPath, Segment};

use super::errors::{PslError, PslErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Include,
    Exclude,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Include => "include",
            PatternKind::Exclude => "exclude",
        }
    }
}

/// Structural limits applied before any schema work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PslLimits {
    /// Include and exclude patterns combined
    pub max_patterns: usize,
    pub max_segments: usize,
    pub max_recursive_wildcards: usize,
}

impl Default for PslLimits {
    fn default() -> Self {
        Self {
            max_patterns: 200,
            max_segments: 50,
            max_recursive_wildcards: 3,
        }
    }
}

/// A parsed pattern with its specificity score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    pub kind: PatternKind,
    pub index: usize,
    pub text: String,
    pub path: FieldPath,
    pub score: u32,
}

impl CompiledPattern {
    /// The implicit `**` used when no include pattern is given
    pub fn select_all() -> Self {
        let path = FieldPath::new(vec![Segment::RecursiveWildcard]);
        Self {
            kind: PatternKind::Include,
            index: 0,
            text: "**".to_string(),
            score: path.specificity(),
            path,
        }
    }
}

/// Parses and limit-checks one pattern
pub fn compile(kind: PatternKind, index: usize, text: &str, limits: &PslLimits) -> Result<CompiledPattern, PslError> {
    let path = parse_path(text).map_err(|e| {
        PslError::new(PslErrorCode::Syntax, kind, index, text, Some(e.position), e.message)
    })?;

    if path.len() > limits.max_segments {
        return Err(PslError::new(
            PslErrorCode::LimitExceeded,
            kind,
            index,
            text,
            None,
            format!("{} segments, maximum is {}", path.len(), limits.max_segments),
        ));
    }
    let recursive = path.recursive_wildcards();
    if recursive > limits.max_recursive_wildcards {
        return Err(PslError::new(
            PslErrorCode::LimitExceeded,
            kind,
            index,
            text,
            None,
            format!(
                "{} recursive wildcards, maximum is {}",
                recursive, limits.max_recursive_wildcards
            ),
        ));
    }

    Ok(CompiledPattern {
        kind,
        index,
        text: text.to_string(),
        score: path.specificity(),
        path,
    })
}

/// Compiles both lists, collecting every failure
pub fn compile_all(include: &[String], exclude: &[String], limits: &PslLimits) -> Result<(Vec<CompiledPattern>, Vec<CompiledPattern>), Vec<PslError>> {
    let mut errors = Vec::new();
    let total = include.len() + exclude.len();
    if total > limits.max_patterns {
        errors.push(PslError::too_many_patterns(total, limits.max_patterns));
    }

    let mut compile_list = |kind: PatternKind, texts: &[String]| -> Vec<CompiledPattern> {
        texts
            .iter()
            .enumerate()
            .filter_map(|(i, text)| match compile(kind, i, text, limits) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    errors.push(e);
                    None
                }
            })
            .collect()
    };
    let includes = compile_list(PatternKind::Include, include);
    let excludes = compile_list(PatternKind::Exclude, exclude);

    if errors.is_empty() {
        Ok((includes, excludes))
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores() {
        let limits = PslLimits::default();
        let score = |t: &str| compile(PatternKind::Include, 0, t, &limits).unwrap().score;
        assert_eq!(score("user.*"), 4);
        assert_eq!(score("user.password"), 6);
        assert_eq!(score("**.password"), 3);
        assert_eq!(score("attrs['color']"), 5);
        assert_eq!(score("items[].sku"), 7);
        assert_eq!(score("tags[*]"), 4);
    }

    #[test]
    fn test_limits() {
        let limits = PslLimits {
            max_patterns: 2,
            max_segments: 3,
            max_recursive_wildcards: 1,
        };
        let err = compile(PatternKind::Include, 0, "a.b.c.d", &limits).unwrap_err();
        assert_eq!(err.code, PslErrorCode::LimitExceeded);
        let err = compile(PatternKind::Exclude, 1, "**.a.**", &limits).unwrap_err();
        assert_eq!(err.code, PslErrorCode::LimitExceeded);
        assert_eq!(err.target(), "exclude[1]");

        let many: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let errors = compile_all(&many, &[], &limits).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].target(), "projection");
    }

    #[test]
    fn test_collects_every_syntax_error() {
        let errors = compile_all(
            &["a..b".to_string(), "ok".to_string()],
            &["`open".to_string()],
            &PslLimits::default(),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.code == PslErrorCode::Syntax));
        assert_eq!(errors[0].position, Some(2));
    }
}
