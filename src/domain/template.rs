//! Path templating.
//!
//! Substitutes `{name}` placeholders with caller supplied values. Every value
//! goes through [`sanitize`] first: this is the single place where stream
//! keys, usernames and filenames coming from the outside world are turned
//! into path segments, so nothing may escape the storage tree from here.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid characters in value of {name:?}: only a-z, A-Z, 0-9, _, - and . are allowed")]
    InvalidCharacters { name: String },
    #[error("consecutive dots are not allowed in value of {name:?}")]
    ConsecutiveDots { name: String },
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder regex is valid"))
}

fn allowed_chars_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("allowed chars regex is valid"))
}

/// Replaces every known placeholder of `template` and cleans the result.
///
/// Unknown placeholders are left verbatim so that they can be resolved
/// later. A single invalid value fails the whole render.
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String, TemplateError> {
    let re = placeholder_regex();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in re.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = &caps[1];
        out.push_str(&template[last..whole.start()]);
        match vars.get(name) {
            Some(value) => out.push_str(sanitize(name, value)?),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(clean(&out.replace('\\', "/")))
}

/// Checks that `value` is a safe single path segment.
pub fn sanitize<'a>(name: &str, value: &'a str) -> Result<&'a str, TemplateError> {
    if !allowed_chars_regex().is_match(value) {
        return Err(TemplateError::InvalidCharacters {
            name: name.to_string(),
        });
    }
    if value.contains("..") {
        return Err(TemplateError::ConsecutiveDots {
            name: name.to_string(),
        });
    }
    Ok(value)
}

/// Lexical path cleaning: collapses duplicate separators, drops `.`
/// segments and resolves `..` against the preceding segment.
///
/// An empty result becomes `.`; a trailing separator is removed.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&prev) if prev != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_value() {
        assert_eq!(render("a/{x}/b", &vars(&[("x", "ok")])).unwrap(), "a/ok/b");
    }

    #[test]
    fn test_render_rejects_consecutive_dots() {
        assert_eq!(
            render("a/{x}/b", &vars(&[("x", "a..b")])).unwrap_err(),
            TemplateError::ConsecutiveDots {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn test_render_rejects_separators_in_values() {
        assert!(matches!(
            render("a/{x}/b", &vars(&[("x", "../etc")])),
            Err(TemplateError::InvalidCharacters { .. })
        ));
        assert!(render("a/{x}/b", &vars(&[("x", "c/d")])).is_err());
        assert!(render("a/{x}/b", &vars(&[("x", "")])).is_err());
    }

    #[test]
    fn test_render_keeps_unknown_placeholder() {
        assert_eq!(render("a/{x}/b", &HashMap::new()).unwrap(), "a/{x}/b");
    }

    #[test]
    fn test_render_without_placeholders_is_identity() {
        let any = vars(&[("x", "1"), ("y", "2")]);
        for s in ["a/b/c", "/data/videos/file.mp4", "master.m3u8"] {
            assert_eq!(render(s, &any).unwrap(), s);
        }
    }

    #[test]
    fn test_render_fails_whole_template_on_one_bad_value() {
        let result = render("{a}/{b}", &vars(&[("a", "good"), ("b", "b@d")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_render_cleans_result() {
        assert_eq!(
            render("data//./{x}/", &vars(&[("x", "v")])).unwrap(),
            "data/v"
        );
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean(""), ".");
        assert_eq!(clean("/"), "/");
        assert_eq!(clean("a/./b//c/"), "a/b/c");
        assert_eq!(clean("/a/b/../c"), "/a/c");
        assert_eq!(clean("/../a"), "/a");
        assert_eq!(clean("../a"), "../a");
        assert_eq!(clean("a/.."), ".");
    }
}
