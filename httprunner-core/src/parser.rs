//! Line-oriented parser for `.http` files.
//!
//! ```text
//! ### Create user                  <- case separator, also names the case
//! # @no-redirect                   <- tag
//! POST {{host}}/users HTTP/1.1     <- request line
//! Content-Type: application/json   <- headers
//!                                  <- blank line: headers -> body
//! { "name": "alice" }              <- body (blank lines are data here)
//! < ./avatar.png                   <- body file, relative to this file
//!
//! > {%                             <- inline script
//! client.test("created", () => client.assert(response.status === 201, "status"))
//! %}
//! > ./common-checks.js             <- script file, appended to the inline script
//! ```
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::*;

use crate::{Error, Result};

const METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

/// Extensions of body files that are read as text. Anything else is sent as raw bytes.
const TEXT_EXTENSIONS: &[&str] = &["txt", "xml", "json"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyChunk {
    Text(String),
    Binary(Vec<u8>),
}

/// One request plus its assertion script, as written in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: Option<String>,
    pub method: String,
    pub uri: String,
    pub headers: IndexMap<String, String>,
    pub body: Vec<BodyChunk>,
    pub tests: Option<String>,
    pub no_redirect: bool,
    pub no_log: bool,
}

impl TestCase {
    /// The case name, or `METHOD uri` for unnamed cases.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method, self.uri))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Url,
    Headers,
    Body,
    Tests,
}

impl Section {
    fn next(self) -> Option<Section> {
        match self {
            Section::Url => Some(Section::Headers),
            Section::Headers => Some(Section::Body),
            Section::Body | Section::Tests => None,
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Draft {
    name: Option<String>,
    method: Option<String>,
    uri: Option<String>,
    headers: IndexMap<String, String>,
    body: Vec<BodyChunk>,
    tests: Option<String>,
    no_redirect: bool,
    no_log: bool,
}

impl Draft {
    fn is_empty(&self) -> bool {
        *self == Draft::default()
    }

    fn into_case(self) -> Option<TestCase> {
        Some(TestCase {
            name: self.name,
            method: self.method?,
            uri: self.uri?,
            headers: self.headers,
            body: self.body,
            tests: self.tests,
            no_redirect: self.no_redirect,
            no_log: self.no_log,
        })
    }

    fn append_tests(&mut self, source: &str) {
        let tests = self.tests.get_or_insert_with(String::new);
        tests.push_str(source);
        tests.push('\n');
    }
}

/// Streaming parser. Feed it lines with [`Parser::process_line`] and collect the cases with
/// [`Parser::finish`].
pub struct Parser {
    base_dir: PathBuf,
    section: Option<Section>,
    current: Draft,
    cases: Vec<TestCase>,
}

impl Parser {
    /// `base_dir` is where `> file` and `< file` inclusions are resolved from.
    pub fn new(base_dir: impl Into<PathBuf>) -> Parser {
        Parser {
            base_dir: base_dir.into(),
            section: Some(Section::Url),
            current: Draft::default(),
            cases: Vec::new(),
        }
    }

    pub fn process_line(&mut self, line: &str) -> Result<()> {
        let trimmed = line.trim();

        if trimmed.is_empty() && !matches!(self.section, Some(Section::Body | Section::Tests)) {
            // Blank lines before the request line don't move past the url section.
            if self.section != Some(Section::Url) {
                self.section = self.section.and_then(Section::next);
            }
            return Ok(());
        }

        if trimmed.starts_with("###") {
            self.flush();
            self.section = Some(Section::Url);
        }

        let in_script = self.section == Some(Section::Tests);
        if !in_script {
            if let Some(name) = name_line(trimmed) {
                self.current.name = Some(name.to_string());
                return Ok(());
            }
            match tag_line(trimmed) {
                Some("no-log") => {
                    self.current.no_log = true;
                    return Ok(());
                }
                Some("no-redirect") => {
                    self.current.no_redirect = true;
                    return Ok(());
                }
                _ => {}
            }
        }

        if trimmed == "> {%" {
            self.section = Some(Section::Tests);
            return Ok(());
        }

        if in_script && trimmed == "%}" {
            self.section = None;
            return Ok(());
        }

        if let Some(path) = inclusion(trimmed, "> ") {
            let source = self.read_text(path)?;
            self.current.append_tests(&source);
            self.section = Some(Section::Tests);
            return Ok(());
        }

        if let Some(path) = inclusion(trimmed, "< ") {
            let chunk = self.read_body(path)?;
            self.current.body.push(chunk);
            self.section = Some(Section::Body);
            return Ok(());
        }

        let Some(section) = self.section else {
            return Ok(());
        };

        if !in_script {
            if let Some((method, uri)) = request_line(line) {
                self.current.method = Some(method.to_string());
                self.current.uri = Some(uri.to_string());
                self.section = Some(Section::Headers);
                return Ok(());
            }
        }

        match section {
            Section::Headers => match line.split_once(':') {
                Some((name, value)) => {
                    self.current
                        .headers
                        .insert(name.trim().to_string(), value.trim().to_string());
                }
                None => warn!("ignoring malformed header line: {line}"),
            },
            Section::Body => self.current.body.push(BodyChunk::Text(format!("{line}\n"))),
            Section::Tests => self.current.append_tests(line),
            Section::Url => debug!("ignoring line outside of a request: {line}"),
        }

        Ok(())
    }

    /// Flush the last case and return every case in file order.
    pub fn finish(mut self) -> Vec<TestCase> {
        self.flush();
        self.cases
    }

    fn flush(&mut self) {
        let draft = std::mem::take(&mut self.current);
        if draft.is_empty() {
            return;
        }
        match draft.into_case() {
            Some(case) => self.cases.push(case),
            None => warn!("skipping a case without a request line"),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    fn read_text(&self, path: &str) -> Result<String> {
        let path = self.resolve(path);
        std::fs::read_to_string(&path).map_err(|source| Error::Io { path, source })
    }

    fn read_body(&self, path: &str) -> Result<BodyChunk> {
        let path = self.resolve(path);
        let is_text = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                TEXT_EXTENSIONS
                    .iter()
                    .any(|text| text.eq_ignore_ascii_case(ext))
            });

        let mut bytes = std::fs::read(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        bytes.push(b'\n');

        if is_text {
            Ok(BodyChunk::Text(String::from_utf8_lossy(&bytes).into_owned()))
        } else {
            Ok(BodyChunk::Binary(bytes))
        }
    }
}

/// Parse `text`, resolving inclusions relative to `base_dir`.
pub fn parse_str(text: &str, base_dir: &Path) -> Result<Vec<TestCase>> {
    let mut parser = Parser::new(base_dir);
    for line in text.lines() {
        parser.process_line(line)?;
    }
    Ok(parser.finish())
}

pub fn parse_file(path: &Path) -> Result<Vec<TestCase>> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_str(&text, base_dir)
}

/// Text after a `#`, `##`, `###` or `//` comment marker.
fn comment(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("//") {
        return Some(rest.trim());
    }
    let hashes = line.len() - line.trim_start_matches('#').len();
    (1..=3)
        .contains(&hashes)
        .then(|| line[hashes..].trim())
}

fn name_line(line: &str) -> Option<&str> {
    comment(line).filter(|name| {
        name.chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

fn tag_line(line: &str) -> Option<&str> {
    comment(line)?.strip_prefix('@')
}

fn inclusion<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let path = line.strip_prefix(marker)?;
    let valid = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '-'));
    valid.then_some(path)
}

/// `METHOD uri [HTTP/x.y]`
fn request_line(line: &str) -> Option<(&str, &str)> {
    let (method, rest) = line.split_once(char::is_whitespace)?;
    if !METHODS.contains(&method) {
        return None;
    }
    let uri = rest.trim();
    let uri = match uri.rsplit_once(char::is_whitespace) {
        Some((uri, version)) if version.starts_with("HTTP/") => uri.trim_end(),
        _ => uri,
    };
    (!uri.is_empty()).then_some((method, uri))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn parse(text: &str) -> Vec<TestCase> {
        parse_str(text, Path::new(".")).unwrap()
    }

    fn body_text(case: &TestCase) -> String {
        case.body
            .iter()
            .map(|chunk| match chunk {
                BodyChunk::Text(text) => text.clone(),
                BodyChunk::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            })
            .collect()
    }

    #[test]
    fn single_get() {
        let cases = parse("GET http://x/status/200\n");
        assert_eq!(
            cases,
            vec![TestCase {
                name: None,
                method: "GET".into(),
                uri: "http://x/status/200".into(),
                headers: IndexMap::new(),
                body: Vec::new(),
                tests: None,
                no_redirect: false,
                no_log: false,
            }]
        );
    }

    #[test]
    fn two_cases_without_body_and_headers() {
        let cases = parse(
            "# Test\nGET http://httpbin.org/status/200\n\n### \n\nGET http://httpbin.org/status/400\n    ",
        );
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].name.as_deref(), Some("Test"));
        assert_eq!(cases[0].uri, "http://httpbin.org/status/200");
        assert_eq!(cases[1].name, None);
        assert_eq!(cases[1].uri, "http://httpbin.org/status/400");
        for case in &cases {
            assert_eq!(case.method, "GET");
            assert!(!case.no_log);
            assert!(!case.no_redirect);
            assert!(case.body.is_empty());
        }
    }

    #[test]
    fn header_json_body_and_script() -> eyre::Result<()> {
        let cases = parse(
            r#"### Example test
POST http://httpbin.org/status/200
Content-Type: application/json

{
    "exampleField": 10
}

> {%
    client.assert(response.body.exampleField === 10, 'exampleField')
%}
"#,
        );
        assert_eq!(cases.len(), 1);
        let case = &cases[0];
        assert_eq!(case.name.as_deref(), Some("Example test"));
        assert_eq!(case.headers.get("Content-Type").map(String::as_str), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(&body_text(case))?;
        assert_eq!(body, serde_json::json!({"exampleField": 10}));
        assert!(case
            .tests
            .as_deref()
            .unwrap_or_default()
            .contains("client.assert(response.body.exampleField === 10, 'exampleField')"));
        Ok(())
    }

    #[test_case("# @no-log", true, false; "no log")]
    #[test_case("# @no-redirect", false, true; "no redirect")]
    #[test_case("// @no-redirect", false, true; "slash comment")]
    #[test_case("# plain comment", false, false; "neither")]
    fn tags(tag: &str, no_log: bool, no_redirect: bool) {
        let cases = parse(&format!("### Example\n{tag}\nPOST http://x/\n"));
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].no_log, no_log);
        assert_eq!(cases[0].no_redirect, no_redirect);
    }

    #[test]
    fn slash_comment_names_case() -> eyre::Result<()> {
        let cases = parse("// testowy komentarz\nPOST http://x/\nContent-Type: application/json\n\n[]\n");
        assert_eq!(cases[0].name.as_deref(), Some("testowy komentarz"));
        let body: serde_json::Value = serde_json::from_str(&body_text(&cases[0]))?;
        assert_eq!(body, serde_json::json!([]));
        Ok(())
    }

    #[test]
    fn body_keeps_blank_lines_and_indentation() {
        let cases = parse("POST http://x/\n\nline one\n\n  line two\n");
        assert_eq!(
            cases[0].body,
            vec![
                BodyChunk::Text("line one\n".into()),
                BodyChunk::Text("\n".into()),
                BodyChunk::Text("  line two\n".into()),
            ]
        );
    }

    #[test_case("GET http://x/a HTTP/1.1", "http://x/a"; "version stripped")]
    #[test_case("GET   http://x/a  ", "http://x/a"; "extra spaces")]
    #[test_case("DELETE http://x/a?b=1 HTTP/2", "http://x/a?b=1"; "http2")]
    fn request_line_uri(line: &str, uri: &str) {
        let cases = parse(line);
        assert_eq!(cases[0].uri, uri);
    }

    #[test]
    fn header_value_may_contain_colons() {
        let cases = parse("GET http://x/\nAuthorization: Bearer a:b\nHost :  x.test \n");
        let headers = &cases[0].headers;
        assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer a:b"));
        assert_eq!(headers.get("Host").map(String::as_str), Some("x.test"));
    }

    #[test]
    fn script_block_keeps_comments_and_blank_lines() {
        let cases = parse(
            "GET http://x/\n\n> {%\n// status check\nclient.log(1)\n\n# not a name\n%}\nignored after block\n",
        );
        let case = &cases[0];
        assert_eq!(case.name, None);
        assert_eq!(
            case.tests.as_deref(),
            Some("// status check\nclient.log(1)\n\n# not a name\n")
        );
        assert!(case.body.is_empty());
    }

    #[test]
    fn lines_after_block_end_are_ignored_until_separator() {
        let cases = parse("GET http://x/a\n\n> {%\nclient.log(1)\n%}\nPOST http://x/b\n###\nGET http://x/c\n");
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].uri, "http://x/a");
        assert_eq!(cases[1].uri, "http://x/c");
    }

    #[test]
    fn separator_names_next_case() {
        let cases = parse("GET http://x/a\n\n### second\nGET http://x/b\n");
        assert_eq!(cases[0].name, None);
        assert_eq!(cases[1].name.as_deref(), Some("second"));
    }

    #[test]
    fn case_without_request_line_is_skipped() {
        let cases = parse("# only a name\n###\nGET http://x/\n");
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].uri, "http://x/");
    }

    #[test]
    fn empty_input() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n\n").is_empty());
    }

    #[test]
    fn display_name_defaults_to_request_line() {
        let cases = parse("GET http://x/a\n###\n# named\nGET http://x/b\n");
        assert_eq!(cases[0].display_name(), "GET http://x/a");
        assert_eq!(cases[1].display_name(), "named");
    }

    #[test]
    fn included_scripts_accumulate() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("first.js"), "client.log('first')")?;
        std::fs::create_dir(dir.path().join("checks"))?;
        std::fs::write(dir.path().join("checks/second.js"), "client.log('second')")?;

        let cases = parse_str(
            "GET http://x/\n\n> {%\nclient.log('inline')\n%}\n> first.js\n> checks/second.js\n",
            dir.path(),
        )?;
        assert_eq!(
            cases[0].tests.as_deref(),
            Some("client.log('inline')\nclient.log('first')\nclient.log('second')\n")
        );
        Ok(())
    }

    #[test]
    fn included_bodies() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("payload.json"), r#"{"a":1}"#)?;
        std::fs::write(dir.path().join("image.bin"), [0u8, 159, 146, 150])?;

        let cases = parse_str(
            "POST http://x/\n\n< payload.json\n< image.bin\n",
            dir.path(),
        )?;
        assert_eq!(
            cases[0].body,
            vec![
                BodyChunk::Text("{\"a\":1}\n".into()),
                BodyChunk::Binary(vec![0, 159, 146, 150, b'\n']),
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_inclusion_is_io_error() {
        let result = parse_str("GET http://x/\n\n> missing.js\n", Path::new("/nonexistent"));
        assert!(
            matches!(result, Err(Error::Io { path, .. }) if path == Path::new("/nonexistent/missing.js"))
        );
    }

    #[test]
    fn parse_file_resolves_relative_to_file() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("check.js"), "client.log('x')")?;
        let path = dir.path().join("api.http");
        std::fs::write(&path, "GET http://x/\n\n> check.js\n")?;

        let cases = parse_file(&path)?;
        assert_eq!(cases[0].tests.as_deref(), Some("client.log('x')\n"));
        Ok(())
    }
}
