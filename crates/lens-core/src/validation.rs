use crate::types::{AnalyzeRequest, FieldError, RepoRef};
use serde_json::{Map, Value};
use std::num::IntErrorKind;

const MSG_MISSING: &str = "Field required";
const MSG_STRING: &str = "Input should be a valid string";
const MSG_INTEGER: &str = "Input should be a valid integer";
const MSG_INT_SIZE: &str = "Unable to parse input string as an integer, exceeded maximum size";

fn field_error(kind: &str, field: Option<&str>, msg: &str, input: Value) -> FieldError {
    let mut loc = vec!["body".to_string()];
    if let Some(field) = field {
        loc.push(field.to_string());
    }
    FieldError {
        kind: kind.to_string(),
        loc,
        msg: msg.to_string(),
        input,
    }
}

/// Decodes and checks an analyze request body, collecting one error per bad
/// field instead of stopping at the first.
pub fn parse_analyze_request(body: &[u8]) -> Result<AnalyzeRequest, Vec<FieldError>> {
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        vec![field_error(
            "json_invalid",
            None,
            "JSON decode error",
            Value::String(err.to_string()),
        )]
    })?;
    let Value::Object(fields) = value else {
        return Err(vec![field_error(
            "model_attributes_type",
            None,
            "Input should be a valid dictionary or object to extract fields from",
            value,
        )]);
    };

    let mut errors = Vec::new();
    let repo_url = required_string(&fields, "repo_url", &mut errors);
    let pr_number = required_pr_number(&fields, &mut errors);
    let github_token = optional_string(&fields, "github_token", &mut errors);

    match (repo_url, pr_number) {
        (Some(repo_url), Some(pr_number)) if errors.is_empty() => Ok(AnalyzeRequest {
            repo_url,
            pr_number,
            github_token,
        }),
        _ => Err(errors),
    }
}

fn required_string(
    fields: &Map<String, Value>,
    name: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match fields.get(name) {
        None => {
            errors.push(field_error("missing", Some(name), MSG_MISSING, Value::Null));
            None
        }
        Some(Value::String(value)) => Some(value.clone()),
        Some(other) => {
            errors.push(field_error("string_type", Some(name), MSG_STRING, other.clone()));
            None
        }
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    name: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match fields.get(name) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(other) => {
            errors.push(field_error("string_type", Some(name), MSG_STRING, other.clone()));
            None
        }
    }
}

fn required_pr_number(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<i64> {
    const NAME: &str = "pr_number";
    let Some(value) = fields.get(NAME) else {
        errors.push(field_error("missing", Some(NAME), MSG_MISSING, Value::Null));
        return None;
    };

    let result = match value {
        Value::Number(number) => match number.as_i64() {
            Some(n) => Ok(n),
            None => whole_float(number.as_f64()),
        },
        Value::String(text) => text.trim().parse::<i64>().map_err(|err| {
            if matches!(
                err.kind(),
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
            ) {
                ("int_parsing_size", MSG_INT_SIZE)
            } else {
                (
                    "int_parsing",
                    "Input should be a valid integer, unable to parse string as an integer",
                )
            }
        }),
        _ => Err(("int_type", MSG_INTEGER)),
    };

    match result {
        Ok(n) => Some(n),
        Err((kind, msg)) => {
            errors.push(field_error(kind, Some(NAME), msg, value.clone()));
            None
        }
    }
}

/// Numbers that are not `i64` are accepted only when they are whole and in
/// range; anything else would be silently rounded or saturated.
fn whole_float(value: Option<f64>) -> Result<i64, (&'static str, &'static str)> {
    // 2^63; every f64 below it converts without saturating.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    match value {
        Some(f) if f.is_finite() && f.fract() != 0.0 => Err((
            "int_from_float",
            "Input should be a valid integer, got a number with a fractional part",
        )),
        Some(f) if f.is_finite() && f >= -LIMIT && f < LIMIT => Ok(f as i64),
        _ => Err(("int_parsing_size", MSG_INT_SIZE)),
    }
}

/// Splits `https://<host>/<owner>/<repo>` into owner and repo. Each part is
/// a non-empty GitHub name: ASCII letters, digits, `-`, `_` and `.`, and not
/// `.` or `..`.
pub fn parse_repo_url(url: &str, host: &str) -> Option<RepoRef> {
    let rest = url.strip_prefix("https://")?.strip_prefix(host)?;
    let rest = rest.strip_prefix('/')?;
    let (owner, repo) = rest.split_once('/')?;
    if !is_repo_name(owner) || !is_repo_name(repo) {
        return None;
    }
    Some(RepoRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

fn is_repo_name(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}
