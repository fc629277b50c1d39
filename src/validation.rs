//! Request validation.
//!
//! Every validated route declares a [`Schema`] for its path parameters, query
//! string and JSON body. The [`validate`] middleware checks all three sections,
//! reports every violation at once, coerces accepted values (trimming,
//! lowercasing emails) and hands the typed result to the handler through the
//! [`Valid`] extractor.

use std::collections::HashMap;

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Path, Query, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ApiError, FieldViolation};

const BODY_LIMIT: usize = 64 * 1024;

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// Trimmed string whose length in characters lies in `min..=max`.
    Text { min: usize, max: usize },
    /// Untrimmed string of at least `min` characters.
    Password { min: usize },
    /// Trimmed, lowercased email address.
    Email,
    Uuid,
    OneOf(&'static [&'static str]),
}

impl Rule {
    fn apply(self, value: &Value) -> Result<Value, String> {
        let Value::String(raw) = value else {
            return Err(format!("Expected string, received {}", type_name(value)));
        };
        match self {
            Rule::Text { min, max } => {
                let trimmed = raw.trim();
                check_length(trimmed, min, max)?;
                Ok(Value::String(trimmed.to_string()))
            }
            Rule::Password { min } => {
                check_length(raw, min, usize::MAX)?;
                Ok(Value::String(raw.clone()))
            }
            Rule::Email => {
                let email = raw.trim().to_lowercase();
                if !is_valid_email(&email) {
                    return Err("Invalid email".into());
                }
                Ok(Value::String(email))
            }
            Rule::Uuid => Uuid::parse_str(raw.trim())
                .map(|id| Value::String(id.to_string()))
                .map_err(|_| "Invalid uuid".to_string()),
            Rule::OneOf(options) => {
                if options.contains(&raw.as_str()) {
                    Ok(Value::String(raw.clone()))
                } else {
                    let expected = options
                        .iter()
                        .map(|o| format!("'{o}'"))
                        .collect::<Vec<_>>()
                        .join(" | ");
                    Err(format!("Invalid enum value. Expected {expected}, received '{raw}'"))
                }
            }
        }
    }
}

fn check_length(s: &str, min: usize, max: usize) -> Result<(), String> {
    let len = s.chars().count();
    if len < min {
        return Err(format!("String must contain at least {min} character(s)"));
    }
    if len > max {
        return Err(format!("String must contain at most {max} character(s)"));
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub rule: Rule,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str, rule: Rule) -> Self {
        Self {
            name,
            rule,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, rule: Rule) -> Self {
        Self {
            name,
            rule,
            required: false,
        }
    }
}

/// Declared shape of one route's input.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub params: &'static [Field],
    pub query: &'static [Field],
    pub body: &'static [Field],
}

impl Schema {
    /// Checks the raw request sections and deserializes the coerced
    /// `{params, query, body}` document into `T`. Keys not declared in the
    /// schema are dropped.
    pub fn run<T: DeserializeOwned>(
        &self,
        params: &HashMap<String, String>,
        query: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<T, ApiError> {
        let mut violations = Vec::new();

        let params = check_section("params", self.params, &strings(params), &mut violations);
        let query = check_section("query", self.query, &strings(query), &mut violations);
        let body = match parse_body(body) {
            Ok(raw) => check_section("body", self.body, &raw, &mut violations),
            Err(violation) => {
                violations.push(violation);
                Map::new()
            }
        };

        if !violations.is_empty() {
            return Err(ApiError::Validation(violations));
        }

        let document = serde_json::json!({ "params": params, "query": query, "body": body });
        serde_json::from_value(document).map_err(|e| {
            ApiError::Internal(anyhow::Error::new(e).context("validated input does not fit its type"))
        })
    }
}

fn strings(section: &HashMap<String, String>) -> Map<String, Value> {
    section
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

fn parse_body(bytes: &[u8]) -> Result<Map<String, Value>, FieldViolation> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FieldViolation::new(
            "body",
            format!("Expected object, received {}", type_name(&other)),
        )),
        Err(e) => Err(FieldViolation::new("body", format!("Malformed JSON: {e}"))),
    }
}

fn check_section(
    section: &str,
    fields: &[Field],
    input: &Map<String, Value>,
    violations: &mut Vec<FieldViolation>,
) -> Map<String, Value> {
    let mut accepted = Map::new();
    for field in fields {
        let path = format!("{section}.{}", field.name);
        match input.get(field.name) {
            None if field.required => violations.push(FieldViolation::new(path, "Required")),
            None => {}
            Some(value) => match field.rule.apply(value) {
                Ok(coerced) => {
                    accepted.insert(field.name.to_string(), coerced);
                }
                Err(message) => violations.push(FieldViolation::new(path, message)),
            },
        }
    }
    accepted
}

/// Route input with a declared schema. `Self` deserializes from
/// `{"params": {..}, "query": {..}, "body": {..}}`.
pub trait Validate: DeserializeOwned + Clone + Send + Sync + 'static {
    const SCHEMA: Schema;
}

/// Input accepted by [`validate`].
#[derive(Debug, Clone)]
pub struct Valid<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Valid<T>
where
    T: Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .remove::<Valid<T>>()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("route has no validation layer")))
    }
}

/// Middleware: validates the request against `T::SCHEMA` before anything
/// else on the route runs.
pub async fn validate<T: Validate>(req: Request, next: Next) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();

    let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
        .await
        .map(|Path(params)| params)
        .unwrap_or_default();
    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();
    let bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|_| ApiError::BadRequest("Request body is too large or unreadable".into()))?;

    let input: T = T::SCHEMA.run(&params, &query, &bytes)?;
    parts.extensions.insert(Valid(input));

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
