use itertools::Itertools;

use crate::store::Label;

pub fn tag_value_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn tag_value_unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Render labels as `{name="value", ...}` for logs and error context.
pub fn labels_to_string(labels: &[Label]) -> String {
    format!(
        "{{{}}}",
        labels
            .iter()
            .map(|label| format!("{}=\"{}\"", label.name, tag_value_escape(&label.value)))
            .join(", ")
    )
}

pub fn label_value<'a>(labels: &'a [Label], name: &str) -> Option<&'a str> {
    labels
        .iter()
        .find(|label| label.name == name)
        .map(|label| label.value.as_str())
}

/// Parse a millisecond timestamp given either as an integer or as RFC 3339.
pub fn parse_timestamp(s: &str) -> Result<i64, String> {
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.timestamp_millis())
        .map_err(|err| format!("`{}` is neither milliseconds nor RFC 3339: {}", s, err))
}

#[test]
fn test_labels_to_string() {
    let labels = vec![
        Label {
            name: "__name__".into(),
            value: "up".into(),
        },
        Label {
            name: "job".into(),
            value: "a\"b".into(),
        },
    ];
    assert_eq!(labels_to_string(&labels), r#"{__name__="up", job="a\"b"}"#);
    assert_eq!(label_value(&labels, "job"), Some("a\"b"));
    assert_eq!(label_value(&labels, "cluster"), None);
    assert_eq!(labels_to_string(&[]), "{}");
}

#[test]
fn test_parse_timestamp() {
    assert_eq!(parse_timestamp("1200000"), Ok(1_200_000));
    assert_eq!(parse_timestamp("-5"), Ok(-5));
    assert_eq!(parse_timestamp("2021-07-20T00:00:00Z"), Ok(1_626_739_200_000));
    assert!(parse_timestamp("yesterday").is_err());
}
