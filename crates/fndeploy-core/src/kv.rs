//! `KEY=VALUE` string and YAML file parsing for environment variables and labels.

use std::collections::BTreeMap;
use std::path::Path;

pub type KvPairs = BTreeMap<String, String>;

/// Parse `KEY1=VALUE1,KEY2=VALUE2`.
///
/// A backslash escapes the next character, so `\,` keeps a comma inside a
/// value. Whitespace around each pair is trimmed and empty entries are skipped.
///
/// ```
/// use fndeploy_core::kv::parse_kv_string;
///
/// let pairs = parse_kv_string(r"FRUIT=apple,LIST=a\,b").unwrap();
/// assert_eq!(pairs["FRUIT"], "apple");
/// assert_eq!(pairs["LIST"], "a,b");
/// ```
pub fn parse_kv_string(input: &str) -> crate::Result<KvPairs> {
    let mut pairs = KvPairs::new();

    for entry in split_unescaped(input) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| crate::Error::InvalidKvPair {
                pair: entry.to_owned(),
                input: input.to_owned(),
            })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(crate::Error::InvalidKvPair {
                pair: entry.to_owned(),
                input: input.to_owned(),
            });
        }

        pairs.insert(key.to_owned(), value.trim().to_owned());
    }

    Ok(pairs)
}

/// Read a YAML mapping of string keys to string values.
pub fn parse_kv_file(path: &Path) -> crate::Result<KvPairs> {
    let content = std::fs::read_to_string(path).map_err(|e| crate::Error::KvFileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| crate::Error::KvFileParse {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mapping = match value {
        serde_yaml::Value::Mapping(m) => m,
        serde_yaml::Value::Null => return Ok(KvPairs::new()),
        _ => {
            return Err(crate::Error::KvFileNonString {
                path: path.to_path_buf(),
                key: "<root>".to_owned(),
            });
        }
    };

    let mut pairs = KvPairs::new();
    for (key, val) in mapping {
        let key_str = match &key {
            serde_yaml::Value::String(s) => s.clone(),
            other => {
                return Err(crate::Error::KvFileNonString {
                    path: path.to_path_buf(),
                    key: format!("{other:?}"),
                });
            }
        };
        let serde_yaml::Value::String(val) = val else {
            return Err(crate::Error::KvFileNonString {
                path: path.to_path_buf(),
                key: key_str,
            });
        };
        pairs.insert(key_str, val);
    }

    tracing::debug!(path = %path.display(), entries = pairs.len(), "parsed key/value file");
    Ok(pairs)
}

/// Overlay `overrides` on `base`; keys in `overrides` win.
pub fn merge_kv(base: KvPairs, overrides: KvPairs) -> KvPairs {
    let mut merged = base;
    merged.extend(overrides);
    merged
}

/// Parse an optional string and an optional file, string entries winning.
///
/// Returns `None` when neither input is given, so absent inputs stay absent
/// in the outgoing request.
pub fn parse_kv_inputs(
    string_input: Option<&str>,
    file_input: Option<&Path>,
) -> crate::Result<Option<KvPairs>> {
    let string_input = string_input.filter(|s| !s.trim().is_empty());
    if string_input.is_none() && file_input.is_none() {
        return Ok(None);
    }

    let from_file = match file_input {
        Some(path) => parse_kv_file(path)?,
        None => KvPairs::new(),
    };
    let from_string = match string_input {
        Some(s) => parse_kv_string(s)?,
        None => KvPairs::new(),
    };

    Ok(Some(merge_kv(from_file, from_string)))
}

fn split_unescaped(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            ',' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pairs() {
        let pairs = parse_kv_string("A=1,B=2").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["A"], "1");
        assert_eq!(pairs["B"], "2");
    }

    #[test]
    fn escaped_comma_stays_in_value() {
        let pairs = parse_kv_string(r"A=x\,y,B=z").unwrap();
        assert_eq!(pairs["A"], "x,y");
        assert_eq!(pairs["B"], "z");
    }

    #[test]
    fn value_may_contain_equals() {
        let pairs = parse_kv_string("URL=https://x.test/?a=b").unwrap();
        assert_eq!(pairs["URL"], "https://x.test/?a=b");
    }

    #[test]
    fn whitespace_and_empty_entries_ignored() {
        let pairs = parse_kv_string(" A = 1 , ,B=2,").unwrap();
        assert_eq!(pairs["A"], "1");
        assert_eq!(pairs["B"], "2");
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn empty_input_is_empty_map() {
        assert!(parse_kv_string("").unwrap().is_empty());
    }

    #[test]
    fn missing_equals_errors() {
        let err = parse_kv_string("A=1,NOPE").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"NOPE\""), "got: {msg}");
        assert!(msg.contains("KEY1=VALUE1"), "got: {msg}");
    }

    #[test]
    fn empty_key_errors() {
        assert!(parse_kv_string("=value").is_err());
    }

    #[test]
    fn later_duplicate_wins() {
        let pairs = parse_kv_string("A=1,A=2").unwrap();
        assert_eq!(pairs["A"], "2");
    }

    #[test]
    fn merge_prefers_overrides() {
        let base = KvPairs::from([
            ("A".to_owned(), "file".to_owned()),
            ("B".to_owned(), "file".to_owned()),
        ]);
        let overrides = KvPairs::from([("A".to_owned(), "string".to_owned())]);
        let merged = merge_kv(base, overrides);
        assert_eq!(merged["A"], "string");
        assert_eq!(merged["B"], "file");
    }

    #[test]
    fn no_inputs_is_none() {
        assert!(parse_kv_inputs(None, None).unwrap().is_none());
        assert!(parse_kv_inputs(Some("  "), None).unwrap().is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn escaped_values_round_trip(
                entries in proptest::collection::btree_map(
                    "[A-Z][A-Z0-9_]{0,8}",
                    "[a-z0-9,=\\\\ ]{0,12}",
                    0..6,
                ),
            ) {
                let input = entries
                    .iter()
                    .map(|(k, v)| {
                        let escaped = v.replace('\\', "\\\\").replace(',', "\\,");
                        format!("{k}={escaped}")
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                let parsed = parse_kv_string(&input).unwrap();
                let expected: KvPairs = entries
                    .into_iter()
                    .map(|(k, v)| (k, v.trim().to_owned()))
                    .collect();
                prop_assert_eq!(parsed, expected);
            }
        }
    }
}
