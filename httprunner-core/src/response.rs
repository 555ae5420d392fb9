//! The response as seen by assertion scripts.
use httprunner_script::Value;
use std::rc::Rc;

use crate::{http, Error, Result};

/// Parsed `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub mime_type: String,
    /// Uppercased `charset` parameter, empty when absent.
    pub charset: String,
}

impl ContentType {
    pub fn parse(value: &str) -> ContentType {
        let mut params = value.split(';');
        let mime_type = params.next().unwrap_or_default().trim().to_string();
        let charset = params
            .find_map(|param| param.trim().strip_prefix("charset="))
            .and_then(|charset| charset.split_whitespace().next())
            .map(str::to_uppercase)
            .unwrap_or_default();
        ContentType { mime_type, charset }
    }

    pub fn is_json(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("application/json")
    }
}

/// Case-insensitive, multi-valued response headers in the order the server sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> ResponseHeaders {
        ResponseHeaders {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn from_header_map(headers: &reqwest::header::HeaderMap) -> ResponseHeaders {
        ResponseHeaders::new(headers.iter().map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        }))
    }

    /// First value of the header, if any.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.values_of(name).into_iter().next()
    }

    pub fn values_of(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a case's script receives as `response`. All fields are empty when the exchange was
/// short-circuited before a response arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseEnvelope {
    pub status: Option<u16>,
    pub content_type: Option<ContentType>,
    /// Parsed JSON for `application/json` responses, the raw text otherwise.
    pub body: serde_json::Value,
    pub headers: ResponseHeaders,
}

impl ResponseEnvelope {
    /// Envelope handed to scripts when no exchange took place.
    pub fn empty() -> ResponseEnvelope {
        ResponseEnvelope::default()
    }

    /// Classify a received response. A JSON content type whose body doesn't parse is an error.
    pub fn from_response(response: &http::Response) -> Result<ResponseEnvelope> {
        let content_type = response
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .map(|value| ContentType::parse(&String::from_utf8_lossy(value.as_bytes())));

        let body = match &content_type {
            Some(content_type) if content_type.is_json() => {
                serde_json::from_str(&response.text).map_err(Error::ResponseParse)?
            }
            _ => serde_json::Value::String(response.text.clone()),
        };

        Ok(ResponseEnvelope {
            status: Some(response.status.as_u16()),
            content_type,
            body,
            headers: ResponseHeaders::from_header_map(&response.headers),
        })
    }

    /// Script value bound to `response`.
    pub fn to_value(&self) -> Value {
        let headers = Rc::new(self.headers.clone());

        let value_of = {
            let headers = Rc::clone(&headers);
            Value::native("valueOf", move |_, _, args| {
                let name = header_name(&args);
                Ok(headers.value_of(&name).map_or(Value::Null, Value::string))
            })
        };
        let values_of = Value::native("valuesOf", move |_, _, args| {
            let name = header_name(&args);
            Ok(Value::array(
                headers.values_of(&name).into_iter().map(Value::string),
            ))
        });

        let content_type = match &self.content_type {
            Some(ct) => Value::object([
                ("mimeType", Value::string(ct.mime_type.as_str())),
                ("charset", Value::string(ct.charset.as_str())),
            ]),
            None => Value::Null,
        };

        Value::object([
            (
                "status",
                self.status
                    .map_or(Value::Null, |status| Value::Number(f64::from(status))),
            ),
            ("contentType", content_type),
            ("body", Value::from_json(&self.body)),
            (
                "headers",
                Value::object([("valueOf", value_of), ("valuesOf", values_of)]),
            ),
        ])
    }
}

fn header_name(args: &[Value]) -> String {
    args.first().map(Value::to_display).unwrap_or_default()
}
