//! Builds and drives one HTTP exchange per case, then runs the case's script against the
//! response.
//!
//! Every construction stage returns a [`Result`]. The first failure short-circuits the case: the
//! script is skipped, an error outcome is queued on the client and the case resolves with an
//! empty [`ResponseEnvelope`].
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::*;

use crate::{
    client::{Output, TestOutcome},
    context::VariableContext,
    http,
    parser::{BodyChunk, TestCase},
    response::ResponseEnvelope,
    Error, Result,
};

/// Everything one case produced.
#[derive(Debug)]
pub struct Execution {
    pub response: ResponseEnvelope,
    /// One entry per request actually sent, redirect hops included.
    pub logs: Vec<http::Log>,
    pub outputs: Vec<Output>,
}

pub struct Executor {
    transport: http::Transport,
    max_redirects: usize,
}

impl Executor {
    pub fn new(transport: http::Transport, max_redirects: usize) -> Executor {
        Executor {
            transport,
            max_redirects,
        }
    }

    pub async fn execute(&self, case: &TestCase, ctx: &VariableContext) -> Execution {
        let mut logs = Vec::new();
        let response = match self.exchange(case, ctx, &mut logs).await {
            Ok(response) => {
                if let Some(source) = &case.tests {
                    if let Err(e) = ctx.run_script(source, &response) {
                        debug!("script of \"{}\" failed: {e}", case.display_name());
                        queue_error(ctx, "uncaught error", &e);
                    }
                }
                response
            }
            Err(e) => {
                debug!("exchange of \"{}\" failed: {e}", case.display_name());
                queue_error(ctx, outcome_name(&e), &e);
                ResponseEnvelope::empty()
            }
        };

        Execution {
            response,
            logs,
            outputs: ctx.client().drain_output(),
        }
    }

    async fn exchange(
        &self,
        case: &TestCase,
        ctx: &VariableContext,
        logs: &mut Vec<http::Log>,
    ) -> Result<ResponseEnvelope> {
        let method = reqwest::Method::from_bytes(case.method.as_bytes())
            .map_err(|_| Error::InvalidMethod(case.method.clone()))?;

        let mut headers = build_headers(case, ctx)?;
        let mut url = build_url(case, ctx, &case.uri, None)?;

        for _ in 0..=self.max_redirects {
            let request = http::Request {
                method: method.clone(),
                url: url.clone(),
                headers,
                body: build_body(case, ctx)?,
            };
            let (response, log) = self.transport.send(request).await?;
            logs.push(log);

            let follow = !case.no_redirect && matches!(response.status.as_u16(), 301 | 302);
            let Some(location) = response.location().filter(|_| follow) else {
                return ResponseEnvelope::from_response(&response);
            };

            debug!("{} redirected to {location}", response.status);
            headers = build_headers(case, ctx)?;
            url = build_url(case, ctx, location, Some(&url))?;
        }

        Err(Error::TooManyRedirects(self.max_redirects))
    }
}

fn queue_error(ctx: &VariableContext, name: &str, error: &Error) {
    ctx.client()
        .push_output(Output::Test(TestOutcome::Error {
            name: name.to_string(),
            message: error.to_string(),
        }));
}

fn outcome_name(error: &Error) -> &'static str {
    match error {
        Error::MissingVariable(_)
        | Error::InvalidUri { .. }
        | Error::InvalidHeader(_)
        | Error::InvalidMethod(_) => "undefined variable",
        Error::Transport(_) | Error::TooManyRedirects(_) => "transport error",
        Error::ResponseParse(_) => "invalid response",
        Error::Script(_) | Error::Config(_) | Error::Io { .. } => "uncaught error",
    }
}

fn is_get(case: &TestCase) -> bool {
    case.method == "GET"
}

/// Substituted headers. `Content-Type` is dropped from GET requests since their body becomes the
/// query string.
fn build_headers(case: &TestCase, ctx: &VariableContext) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &case.headers {
        if is_get(case) && name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        let value = ctx.substitute(value)?;
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(&value)
            .map_err(|_| Error::InvalidHeader(format!("{name}: {value}")))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// Substitute `raw` and resolve it against `base` when following a redirect. A GET body is
/// appended as query string.
fn build_url(
    case: &TestCase,
    ctx: &VariableContext,
    raw: &str,
    base: Option<&reqwest::Url>,
) -> Result<reqwest::Url> {
    let mut uri = ctx.substitute(raw)?;

    if is_get(case) && !case.body.is_empty() {
        let compact: String = body_text(&case.body)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let query = query_string(&ctx.substitute(&compact)?);
        uri.push(if uri.contains('?') { '&' } else { '?' });
        uri.push_str(&query);
    }

    let parsed = match base {
        Some(base) => base.join(&uri),
        None => reqwest::Url::parse(&uri),
    };
    parsed.map_err(|source| Error::InvalidUri { uri, source })
}

fn body_text(body: &[BodyChunk]) -> String {
    body.iter()
        .map(|chunk| match chunk {
            BodyChunk::Text(text) => text.clone(),
            BodyChunk::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        })
        .collect()
}

/// Payload of a non-GET request. Trailing blank chunks are dropped, the rest is concatenated
/// as authored.
fn build_body(case: &TestCase, ctx: &VariableContext) -> Result<Option<Vec<u8>>> {
    if is_get(case) || case.body.is_empty() {
        return Ok(None);
    }

    let end = case
        .body
        .iter()
        .rposition(|chunk| !matches!(chunk, BodyChunk::Text(text) if text.trim().is_empty()))
        .map_or(0, |last| last + 1);

    let mut payload = Vec::new();
    for chunk in &case.body[..end] {
        match chunk {
            BodyChunk::Text(text) => payload.extend_from_slice(ctx.substitute(text)?.as_bytes()),
            BodyChunk::Binary(bytes) => payload.extend_from_slice(bytes),
        }
    }
    Ok(Some(payload))
}

/// JSON objects and arrays become nested `key[sub]=value` pairs, anything else is
/// percent-encoded as is.
fn query_string(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
            let mut pairs = Vec::new();
            encode_pairs("", &value, &mut pairs);
            pairs.join("&")
        }
        Ok(serde_json::Value::String(text)) => urlencoding::encode(&text).into_owned(),
        _ => urlencoding::encode(body).into_owned(),
    }
}

fn encode_pairs(prefix: &str, value: &serde_json::Value, pairs: &mut Vec<String>) {
    let nest = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}[{key}]")
        }
    };

    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                encode_pairs(&nest(key), value, pairs);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                encode_pairs(&nest(&index.to_string()), value, pairs);
            }
        }
        serde_json::Value::Null => pairs.push(format!("{}=", urlencoding::encode(prefix))),
        serde_json::Value::String(text) => pairs.push(format!(
            "{}={}",
            urlencoding::encode(prefix),
            urlencoding::encode(text)
        )),
        other => pairs.push(format!(
            "{}={}",
            urlencoding::encode(prefix),
            urlencoding::encode(&other.to_string())
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        client::{Client, LogEntry},
        config::Variables,
        parser::parse_str,
    };
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::{path::Path, sync::Arc};
    use test_case::test_case;

    fn context(host: &str) -> VariableContext {
        let mut variables = Variables::new();
        variables.insert("host".into(), json!(host));
        variables.insert("token".into(), json!("secret"));
        VariableContext::new(Client::new(), Arc::new(variables))
    }

    fn case(text: &str) -> TestCase {
        parse_str(text, Path::new(".")).unwrap().remove(0)
    }

    fn executor(max_redirects: usize) -> Executor {
        Executor::new(http::Transport::new().unwrap(), max_redirects)
    }

    fn errors(outputs: &[Output]) -> Vec<(String, String)> {
        outputs
            .iter()
            .filter_map(|output| match output {
                Output::Test(TestOutcome::Error { name, message }) => {
                    Some((name.clone(), message.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[test_case(r#"{"a":{"b":"c"}}"#, "a%5Bb%5D=c"; "nested object")]
    #[test_case(r#"{"ids":[1,2],"q":"x y"}"#, "ids%5B0%5D=1&ids%5B1%5D=2&q=x%20y"; "array and string")]
    #[test_case(r#"{"a":null,"b":true,"c":{},"d":[]}"#, "a=&b=true"; "null bool and empty")]
    #[test_case(r#"[1,"two"]"#, "0=1&1=two"; "top level array")]
    #[test_case("a=b&c", "a%3Db%26c"; "raw text")]
    #[test_case(r#""hello""#, "hello"; "json string")]
    fn query_strings(body: &str, expected: &str) {
        assert_eq!(query_string(body), expected);
    }

    #[tokio::test]
    async fn get_body_is_sent_as_query() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::UrlEncoded("filter[name]".into(), "secret".into()),
                Matcher::UrlEncoded("filter[tags][0]".into(), "a".into()),
            ]))
            .match_header("content-type", Matcher::Missing)
            .match_header("x-token", "secret")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let case = case(
            "GET {{host}}/search?page=1\nContent-Type: application/json\nX-Token: {{token}}\n\n{\n  \"filter\": { \"name\": \"{{token}}\", \"tags\": [\"a\"] }\n}\n",
        );
        let execution = executor(10).execute(&case, &context(&server.url())).await;
        mock.assert_async().await;

        assert_eq!(execution.response.status, Some(200));
        assert!(execution.outputs.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn post_body_is_substituted_and_trimmed() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/users")
            .match_header("content-type", "application/json")
            .match_body("{\n\"token\": \"secret\"\n}\n")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1}"#)
            .expect(1)
            .create_async()
            .await;

        let case = case(
            "POST {{host}}/users\nContent-Type: application/json\n\n{\n\"token\": \"{{token}}\"\n}\n\n\n> {%\nclient.test('created', () => client.assert(response.body.id === 1, 'id'))\n%}\n",
        );
        let execution = executor(10).execute(&case, &context(&server.url())).await;
        mock.assert_async().await;

        assert_eq!(execution.response.body, json!({"id": 1}));
        assert_eq!(execution.logs.len(), 1);
        assert!(matches!(&execution.outputs[..], [Output::Test(t)] if t.is_success()));
        Ok(())
    }

    #[tokio::test]
    async fn redirect_is_followed_with_same_request() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let old = server
            .mock("PUT", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .expect(1)
            .create_async()
            .await;
        let new = server
            .mock("PUT", "/new")
            .match_header("x-token", "secret")
            .match_body("payload\n")
            .with_status(200)
            .with_body("done")
            .expect(1)
            .create_async()
            .await;

        let case = case("PUT {{host}}/old\nX-Token: {{token}}\n\npayload\n");
        let execution = executor(10).execute(&case, &context(&server.url())).await;
        old.assert_async().await;
        new.assert_async().await;

        assert_eq!(execution.response.status, Some(200));
        assert_eq!(execution.response.body, json!("done"));
        assert_eq!(execution.logs.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn no_redirect_keeps_the_redirect_response() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _old = server
            .mock("GET", "/old")
            .with_status(302)
            .with_header("location", "/new")
            .create_async()
            .await;
        let new = server
            .mock("GET", "/new")
            .expect(0)
            .create_async()
            .await;

        let case = case("# @no-redirect\nGET {{host}}/old\n");
        let execution = executor(10).execute(&case, &context(&server.url())).await;
        new.assert_async().await;

        assert_eq!(execution.response.status, Some(302));
        assert_eq!(
            execution.response.headers.value_of("location"),
            Some("/new")
        );
        Ok(())
    }

    #[tokio::test]
    async fn redirect_loop_is_bounded() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let looping = server
            .mock("GET", "/loop")
            .with_status(302)
            .with_header("location", "/loop")
            .expect(3)
            .create_async()
            .await;

        let case = case("GET {{host}}/loop\n\n> {%\nclient.log('never')\n%}\n");
        let execution = executor(2).execute(&case, &context(&server.url())).await;
        looping.assert_async().await;

        assert_eq!(execution.response, ResponseEnvelope::empty());
        assert_eq!(
            errors(&execution.outputs),
            vec![(
                "transport error".to_string(),
                "exceeded the limit of 2 redirects".to_string()
            )]
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_variable_skips_request_and_script() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .expect(0)
            .create_async()
            .await;

        let case = case("GET {{host}}/\nAuthorization: {{missing}}\n\n> {%\nclient.log('never')\n%}\n");
        let execution = executor(10).execute(&case, &context(&server.url())).await;
        mock.assert_async().await;

        assert_eq!(execution.response, ResponseEnvelope::empty());
        assert!(execution.logs.is_empty());
        assert_eq!(
            errors(&execution.outputs),
            vec![(
                "undefined variable".to_string(),
                "missing variable missing".to_string()
            )]
        );
        Ok(())
    }

    #[tokio::test]
    async fn malformed_json_response_is_invalid_response() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/broken")
            .with_header("content-type", "application/json")
            .with_body("{oops")
            .create_async()
            .await;

        let case = case("GET {{host}}/broken\n\n> {%\nclient.log('never')\n%}\n");
        let execution = executor(10).execute(&case, &context(&server.url())).await;

        let errors = errors(&execution.outputs);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "invalid response");
        assert_eq!(execution.outputs.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let case = case("GET http://127.0.0.1:1/\n");
        let execution = executor(10).execute(&case, &context("unused")).await;
        let errors = errors(&execution.outputs);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "transport error");
    }

    #[tokio::test]
    async fn uncaught_script_error_is_recorded() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").create_async().await;

        let case = case(
            "GET {{host}}/\n\n> {%\nclient.log('before')\nclient.assert(true, 'outside')\n%}\n",
        );
        let execution = executor(10).execute(&case, &context(&server.url())).await;

        assert_eq!(
            execution.outputs[0],
            Output::Log(LogEntry {
                message: "before".into()
            })
        );
        let errors = errors(&execution.outputs);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "uncaught error");
        assert!(errors[0].1.contains("All assertions should be wrapped by test."));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_uri_is_undefined_variable() {
        let case = case("GET not-a-url\n");
        let execution = executor(10).execute(&case, &context("unused")).await;
        let errors = errors(&execution.outputs);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "undefined variable");
        assert!(errors[0].1.contains("not-a-url"));
    }
}
