//! # Templates
//!
//! Placeholder interpolation used to parameterize paths, URLs and expected
//! values with identifiers that are only known at runtime.
//!
//! ```text
//! "{{first}}/{{second}}"        + ("foo", "bar")  => "foo/bar"
//! "{{cid}}/x/{{cid}}"           + ("Qm")          => "Qm/x/Qm"
//! "{{}}/{{}}"                   + ("a", "b")      => "a/b"
//! "{{{name}}}"                  + ()              => "{{name}}"
//! "{{{{name}}"                  + ("foo")         => "{{foo"
//! ```
//!
//! A span is two or more opening braces, an optional word, and two or more
//! closing braces. When both sides carry at least three braces the span is an
//! escape: one brace is removed from each side and nothing is resolved. When
//! the smaller side has exactly two braces the span is a placeholder; any
//! extra braces on the other side are kept as literal text.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::TemplateError;

static SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{{2,}\w*\}{2,}").expect("span pattern is valid"));

/// Resolve every placeholder in `format` against `args`.
///
/// Named placeholders bind to the next unused argument the first time they
/// are seen and reuse that value afterwards. Anonymous placeholders (`{{}}`)
/// always take a fresh argument. Every argument must be consumed.
pub fn interpolate(format: &str, args: &[&dyn Display]) -> Result<String, TemplateError> {
    let mut remaining = args.iter();
    let mut bound: HashMap<&str, String> = HashMap::new();
    let mut out = String::with_capacity(format.len());
    let mut last = 0;

    for span in SPAN.find_iter(format) {
        out.push_str(&format[last..span.start()]);
        last = span.end();

        let text = span.as_str();
        let lead = text.bytes().take_while(|b| *b == b'{').count();
        let trail = text.bytes().rev().take_while(|b| *b == b'}').count();

        match lead.min(trail) {
            0 | 1 => {
                return Err(TemplateError::MalformedSpan {
                    format: format.to_string(),
                    span: text.to_string(),
                });
            }
            2 => {
                let name = text[lead..text.len() - trail].trim();
                let value = if name.is_empty() {
                    next_argument(&mut remaining, format)?
                } else if let Some(value) = bound.get(name) {
                    value.clone()
                } else {
                    let value = next_argument(&mut remaining, format)?;
                    bound.insert(name, value.clone());
                    value
                };

                out.push_str(&text[..lead - 2]);
                out.push_str(&value);
                out.push_str(&text[text.len() - (trail - 2)..]);
            }
            _ => out.push_str(&text[1..text.len() - 1]),
        }
    }
    out.push_str(&format[last..]);

    let left = remaining.len();
    if left > 0 {
        return Err(TemplateError::TooManyArguments {
            format: format.to_string(),
            left,
        });
    }

    Ok(out)
}

fn next_argument(
    remaining: &mut std::slice::Iter<'_, &dyn Display>,
    format: &str,
) -> Result<String, TemplateError> {
    remaining
        .next()
        .map(|arg| arg.to_string())
        .ok_or_else(|| TemplateError::NotEnoughArguments {
            format: format.to_string(),
        })
}

/// Like [`interpolate`], but a template that does not match its arguments is
/// treated as a bug in the test definition.
///
/// # Panics
///
/// Panics when interpolation fails.
pub fn templated(format: &str, args: &[&dyn Display]) -> String {
    match interpolate(format, args) {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

/// Fallible interpolation with variadic arguments.
///
/// ```
/// let path = conformance::interpolate!("/ipfs/{{cid}}/{{cid}}", "bafy").unwrap();
/// assert_eq!(path, "/ipfs/bafy/bafy");
/// ```
#[macro_export]
macro_rules! interpolate {
    ($format:expr $(, $arg:expr)* $(,)?) => {
        $crate::template::interpolate($format, &[$(&$arg as &dyn ::std::fmt::Display),*])
    };
}

/// Panicking interpolation with variadic arguments, for test definitions.
///
/// ```
/// let url = conformance::templated!("{{scheme}}://{{host}}/", "http", "example.com");
/// assert_eq!(url, "http://example.com/");
/// ```
#[macro_export]
macro_rules! templated {
    ($format:expr $(, $arg:expr)* $(,)?) => {
        $crate::template::templated($format, &[$(&$arg as &dyn ::std::fmt::Display),*])
    };
}
