use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::store::{label_matcher, LabelMatcher};
use crate::utils::{tag_value_escape, tag_value_unescape};

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("Regex pattern error: {0}")]
    Regex(#[from] regex::Error),
    #[error("invalid matcher `{0}`, expected name=\"v\", name!=\"v\", name=~\"re\" or name!~\"re\"")]
    Syntax(String),
    #[error("unknown label matcher type {0}")]
    UnknownType(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MatchKind {
    Eq,
    Neq,
    Re,
    Nre,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Eq => "=",
            MatchKind::Neq => "!=",
            MatchKind::Re => "=~",
            MatchKind::Nre => "!~",
        }
    }
}

/// A label selector as given by the user, independent of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Matcher {
    pub kind: MatchKind,
    pub name: String,
    pub value: String,
}

impl Matcher {
    pub fn new(kind: MatchKind, name: impl Into<String>, value: impl Into<String>) -> Self {
        Matcher {
            kind,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Convert into the store API matcher. Regex values must compile.
    pub fn to_wire(&self) -> Result<LabelMatcher, MatcherError> {
        let r#type = match self.kind {
            MatchKind::Eq => label_matcher::Type::Eq,
            MatchKind::Neq => label_matcher::Type::Neq,
            MatchKind::Re | MatchKind::Nre => {
                // The store anchors patterns on both ends.
                Regex::new(&format!("^(?:{})$", self.value))?;
                if self.kind == MatchKind::Re {
                    label_matcher::Type::Re
                } else {
                    label_matcher::Type::Nre
                }
            }
        };
        Ok(LabelMatcher {
            r#type: r#type as i32,
            name: self.name.clone(),
            value: self.value.clone(),
        })
    }
}

impl TryFrom<&LabelMatcher> for Matcher {
    type Error = MatcherError;

    fn try_from(matcher: &LabelMatcher) -> Result<Self, Self::Error> {
        let kind = match label_matcher::Type::try_from(matcher.r#type) {
            Ok(label_matcher::Type::Eq) => MatchKind::Eq,
            Ok(label_matcher::Type::Neq) => MatchKind::Neq,
            Ok(label_matcher::Type::Re) => MatchKind::Re,
            Ok(label_matcher::Type::Nre) => MatchKind::Nre,
            Err(_) => return Err(MatcherError::UnknownType(matcher.r#type)),
        };
        Ok(Matcher::new(kind, &matcher.name, &matcher.value))
    }
}

pub fn convert_label_matchers(matchers: &[Matcher]) -> Result<Vec<LabelMatcher>, MatcherError> {
    matchers.iter().map(Matcher::to_wire).collect()
}

impl FromStr for Matcher {
    type Err = MatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref SELECTOR: Regex = Regex::new(
                r#"^\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*(=~|!~|!=|=)\s*"((?:[^"\\]|\\.)*)"\s*$"#
            )
            .unwrap();
        }
        let caps = SELECTOR
            .captures(s)
            .ok_or_else(|| MatcherError::Syntax(s.to_string()))?;
        let kind = match &caps[2] {
            "=" => MatchKind::Eq,
            "!=" => MatchKind::Neq,
            "=~" => MatchKind::Re,
            _ => MatchKind::Nre,
        };
        Ok(Matcher::new(kind, &caps[1], tag_value_unescape(&caps[3])))
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}\"{}\"",
            self.name,
            self.kind.as_str(),
            tag_value_escape(&self.value)
        )
    }
}

#[test]
fn test_parse_matchers() {
    let cases = [
        (r#"__name__!="""#, Matcher::new(MatchKind::Neq, "__name__", "")),
        (r#"cluster="eu-1""#, Matcher::new(MatchKind::Eq, "cluster", "eu-1")),
        (
            r#" __name__ =~ "continuous_app_metric9.{1}" "#,
            Matcher::new(MatchKind::Re, "__name__", "continuous_app_metric9.{1}"),
        ),
        (r#"replica!~"1|2""#, Matcher::new(MatchKind::Nre, "replica", "1|2")),
        (r#"path="a\"b\\c""#, Matcher::new(MatchKind::Eq, "path", r#"a"b\c"#)),
    ];
    for (input, expected) in cases {
        let parsed: Matcher = input.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string().parse::<Matcher>().unwrap(), expected);
    }

    for bad in ["cluster", "cluster=eu", "1abc=\"x\"", "a==\"b\""] {
        assert!(matches!(bad.parse::<Matcher>(), Err(MatcherError::Syntax(_))), "{}", bad);
    }
}

#[test]
fn test_convert_label_matchers() {
    let wire = convert_label_matchers(&[
        Matcher::new(MatchKind::Eq, "a", "1"),
        Matcher::new(MatchKind::Neq, "b", "2"),
        Matcher::new(MatchKind::Re, "c", "3.*"),
        Matcher::new(MatchKind::Nre, "d", "4+"),
    ])
    .unwrap();
    let types: Vec<_> = wire.iter().map(|m| m.r#type()).collect();
    assert_eq!(
        types,
        vec![
            label_matcher::Type::Eq,
            label_matcher::Type::Neq,
            label_matcher::Type::Re,
            label_matcher::Type::Nre
        ]
    );
    assert_eq!(wire[2].name, "c");
    assert_eq!(wire[2].value, "3.*");

    let back: Vec<Matcher> = wire.iter().map(|m| m.try_into().unwrap()).collect();
    assert_eq!(back[3], Matcher::new(MatchKind::Nre, "d", "4+"));
}

#[test]
fn test_invalid_matchers() {
    let err = Matcher::new(MatchKind::Re, "__name__", "(unclosed").to_wire();
    assert!(matches!(err, Err(MatcherError::Regex(_))));

    // Selector parsing does not compile the value; the regex is checked on conversion.
    let parsed: Matcher = r#"job=~"(""#.parse().unwrap();
    assert_eq!(parsed, Matcher::new(MatchKind::Re, "job", "("));
    assert!(matches!(parsed.to_wire(), Err(MatcherError::Regex(_))));

    let unknown = LabelMatcher {
        r#type: 7,
        name: "a".into(),
        value: "b".into(),
    };
    assert!(matches!(Matcher::try_from(&unknown), Err(MatcherError::UnknownType(7))));
}
