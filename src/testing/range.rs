//! Byte-range variants of a case.
//!
//! A server may answer a range request with the full payload or with the
//! requested slice, so every generated expectation accepts both.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::check::{self, Check};
use crate::error::AuthoringError;
use crate::expect::{Expectation, ExpectationSpec, all_of, any_of, expect, header};
use crate::http::RequestSpec;
use crate::interpolate;

use super::TestCase;

/// Ranges used when the caller does not choose any.
pub const DEFAULT_RANGES: [&str; 2] = ["bytes=7-9", "bytes=1-3"];

/// Parse a single `bytes=<from>-<to>` range. `to` is inclusive.
pub fn parse_range(range: &str) -> Result<(u64, u64), AuthoringError> {
    let invalid = |reason: &str| AuthoringError::InvalidRange {
        range: range.to_string(),
        reason: reason.to_string(),
    };

    let spec = range
        .strip_prefix("bytes=")
        .ok_or_else(|| invalid("does not start with 'bytes='"))?;
    if spec.contains(',') {
        return Err(invalid("must have one range"));
    }
    let (from, to) = spec.split_once('-').ok_or_else(|| invalid("missing '-'"))?;
    let from: u64 = from.trim().parse().map_err(|_| invalid("start is not a number"))?;
    let to: u64 = to.trim().parse().map_err(|_| invalid("end is not a number"))?;
    if from > to {
        return Err(invalid("start is after end"));
    }
    Ok((from, to))
}

/// Combine several single ranges into one `Range` header value.
pub fn combine_ranges(ranges: &[&str]) -> Result<String, AuthoringError> {
    let parts = ranges
        .iter()
        .map(|range| parse_range(range).map(|(from, to)| format!("{from}-{to}")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("bytes={}", parts.join(",")))
}

fn slice<'a>(range: &str, data: &'a [u8]) -> Result<(u64, u64, &'a [u8]), AuthoringError> {
    let (from, to) = parse_range(range)?;
    if to >= data.len() as u64 {
        return Err(AuthoringError::InvalidRange {
            range: range.to_string(),
            reason: format!("past the end of {} bytes of data", data.len()),
        });
    }
    Ok((from, to, &data[from as usize..=to as usize]))
}

fn content_range(from: u64, to: u64, length: usize) -> Result<String, AuthoringError> {
    interpolate!("bytes {{start}}-{{end}}/{{length}}", from, to, length).map_err(AuthoringError::from)
}

fn single_base(base: &TestCase) -> Result<&RequestSpec, AuthoringError> {
    match base.requests.as_slice() {
        [single] => Ok(single),
        _ => Err(AuthoringError::InvalidRange {
            range: String::new(),
            reason: format!(
                "range variants need exactly one base request, `{}` has {}",
                base.name,
                base.requests.len()
            ),
        }),
    }
}

fn with_base(base: &TestCase, extra: Expectation) -> Expectation {
    match &base.response {
        Some(response) => all_of([response.clone(), extra]),
        None => extra,
    }
}

fn content_type_header(spec: ExpectationSpec, content_type: &str) -> ExpectationSpec {
    if content_type.is_empty() {
        spec
    } else {
        spec.header(header("Content-Type").equals(content_type))
    }
}

/// The first range requested alone.
pub fn single_range_case(
    base: &TestCase,
    range: &str,
    full_data: &[u8],
    content_type: &str,
) -> Result<TestCase, AuthoringError> {
    let mut request = single_base(base)?.clone();
    if !content_type.is_empty() {
        request = request.header("Content-Type", content_type);
    }
    let (from, to, part) = slice(range, full_data)?;

    let accepted = any_of([
        expect()
            .status(206)
            .body(part)
            .header(header("Content-Range").equals(content_range(from, to, full_data.len())?)),
        expect().status(200).body(full_data),
    ]);

    let mut case = base.clone();
    case.name = format!("{} - single range", base.name);
    case.requests = vec![request.header("Range", range)];
    case.response = Some(with_base(base, accepted));
    Ok(case)
}

/// Every range requested at once.
pub fn multi_range_case(
    base: &TestCase,
    ranges: &[&str],
    full_data: &[u8],
    content_type: &str,
) -> Result<TestCase, AuthoringError> {
    let request = single_base(base)?.clone();
    let first = ranges.first().ok_or_else(|| AuthoringError::InvalidRange {
        range: String::new(),
        reason: "no byte ranges given".to_string(),
    })?;
    let (first_from, first_to, first_part) = slice(first, full_data)?;

    let mut multipart = Vec::new();
    if !content_type.is_empty() {
        multipart.push(Check::<str>::contains(format!("Content-Type: {content_type}")));
    }
    for range in ranges {
        let (from, to, part) = slice(range, full_data)?;
        multipart.push(Check::<str>::contains(format!(
            "Content-Range: {}",
            content_range(from, to, full_data.len())?
        )));
        multipart.push(Check::<str>::contains(String::from_utf8_lossy(part)));
    }

    let accepted = any_of([
        content_type_header(expect().status(200).body(full_data), content_type),
        content_type_header(
            expect().status(206).body(first_part).header(
                header("Content-Range").equals(content_range(first_from, first_to, full_data.len())?),
            ),
            content_type,
        ),
        expect()
            .status(206)
            .header(header("Content-Type").contains("multipart/byteranges"))
            .body(check::and(multipart)),
    ]);

    let mut case = base.clone();
    case.name = format!("{} - multi range", base.name);
    case.requests = vec![request.header("Range", combine_ranges(ranges)?)];
    case.response = Some(with_base(base, accepted));
    Ok(case)
}

/// The full request, then single-range and multi-range variants.
pub fn include_range_tests(
    base: &TestCase,
    ranges: &[&str],
    full_data: &[u8],
    content_type: &str,
) -> Result<Vec<TestCase>, AuthoringError> {
    let mut request = single_base(base)?.clone();
    if !content_type.is_empty() {
        request = request.header("Content-Type", content_type);
    }

    let mut full = base.clone();
    full.name = format!("{} - full request", base.name);
    full.requests = vec![request];
    full.response = Some(with_base(base, expect().status(200).body(full_data).into()));

    let mut cases = vec![full];
    cases.extend(only_range_tests(base, ranges, full_data, content_type)?);
    Ok(cases)
}

/// Single-range and multi-range variants only.
pub fn only_range_tests(
    base: &TestCase,
    ranges: &[&str],
    full_data: &[u8],
    content_type: &str,
) -> Result<Vec<TestCase>, AuthoringError> {
    let first = ranges.first().ok_or_else(|| AuthoringError::InvalidRange {
        range: String::new(),
        reason: "no byte ranges given".to_string(),
    })?;
    Ok(vec![
        single_range_case(base, first, full_data, content_type)?,
        multi_range_case(base, ranges, full_data, content_type)?,
    ])
}

/// [`include_range_tests`] with [`DEFAULT_RANGES`]; `full_data` must be at
/// least 10 bytes.
pub fn include_default_range_tests(
    base: &TestCase,
    full_data: &[u8],
    content_type: &str,
) -> Result<Vec<TestCase>, AuthoringError> {
    if full_data.len() < 10 {
        return Err(AuthoringError::InvalidRange {
            range: DEFAULT_RANGES.join(","),
            reason: format!("default ranges need at least 10 bytes, got {}", full_data.len()),
        });
    }
    include_range_tests(base, &DEFAULT_RANGES, full_data, content_type)
}

/// Two ranges drawn from `seed`: the first in the upper half of the data,
/// the second in the lower half.
pub fn random_ranges(length: usize, seed: u64) -> Result<[String; 2], AuthoringError> {
    if length < 10 {
        return Err(AuthoringError::InvalidRange {
            range: String::new(),
            reason: format!("random ranges need at least 10 bytes, got {length}"),
        });
    }
    let mut rng = SmallRng::seed_from_u64(seed);
    let last = length as u64 - 1;
    let mid = length as u64 / 2;

    let upper_start = rng.gen_range(mid..=last);
    let upper_end = rng.gen_range(upper_start..=last);
    let lower_start = rng.gen_range(0..mid);
    let lower_end = rng.gen_range(lower_start..mid);
    Ok([
        format!("bytes={upper_start}-{upper_end}"),
        format!("bytes={lower_start}-{lower_end}"),
    ])
}

/// [`include_range_tests`] with [`random_ranges`]. The same seed yields the
/// same cases.
pub fn include_random_range_tests(
    base: &TestCase,
    full_data: &[u8],
    content_type: &str,
    seed: u64,
) -> Result<Vec<TestCase>, AuthoringError> {
    let ranges = random_ranges(full_data.len(), seed)?;
    let ranges: Vec<&str> = ranges.iter().map(String::as_str).collect();
    include_range_tests(base, &ranges, full_data, content_type)
}
