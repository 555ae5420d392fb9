use console::{style, StyledObject, Term};
use eyre::WrapErr;
use std::path::PathBuf;

use crate::{
    http,
    runner::{CaseInfo, Message, Summary, Verdict},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ReporterType {
    #[default]
    Dot,
    List,
    Null,
}

impl ReporterType {
    pub fn create(self) -> Box<dyn Reporter + Send> {
        match self {
            ReporterType::Dot => Box::new(DotReporter::new()),
            ReporterType::List => Box::new(ListReporter::new()),
            ReporterType::Null => Box::new(NullReporter),
        }
    }
}

/// Reporter trait. The trait is based on the "template method" pattern.
/// You can implement on_xxx methods to hook into the runner. This way is enough for most usecases.
/// If you need more control, you can override the "handle" method.
#[async_trait::async_trait]
pub trait Reporter {
    async fn handle(&mut self, msg: Message) -> eyre::Result<()> {
        match msg {
            Message::FileStart(path) => self.on_file_start(path).await,
            Message::CaseStart(case) => self.on_case_start(case).await,
            Message::Exchange(case, log) => self.on_exchange(case, log).await,
            Message::Verdict(case, verdict) => self.on_verdict(case, verdict).await,
            Message::FileEnd(path, summary) => self.on_file_end(path, summary).await,
            Message::Summary(summaries) => self.on_summary(summaries).await,
        }
    }

    /// Called before the first case of a file runs.
    async fn on_file_start(&mut self, _path: PathBuf) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a case starts.
    async fn on_case_start(&mut self, _case: CaseInfo) -> eyre::Result<()> {
        Ok(())
    }

    /// Called for each HTTP request sent in verbose mode.
    async fn on_exchange(&mut self, _case: CaseInfo, _log: Box<http::Log>) -> eyre::Result<()> {
        Ok(())
    }

    /// Called for each test outcome and, in verbose mode, each script log entry.
    async fn on_verdict(&mut self, _case: CaseInfo, _verdict: Verdict) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when all cases of a file have run.
    async fn on_file_end(&mut self, _path: PathBuf, _summary: Summary) -> eyre::Result<()> {
        Ok(())
    }

    /// Called at the very end when more than one file ran.
    async fn on_summary(&mut self, _summaries: Vec<(PathBuf, Summary)>) -> eyre::Result<()> {
        Ok(())
    }
}

pub struct NullReporter;

#[async_trait::async_trait]
impl Reporter for NullReporter {}

/// Prints one character per test outcome and the buffered details at each file boundary.
pub struct DotReporter {
    terminal: Term,
    column: usize,
    buffer: String,
}

impl DotReporter {
    pub fn new() -> DotReporter {
        DotReporter {
            terminal: Term::stdout(),
            column: 0,
            buffer: String::new(),
        }
    }

    fn progress(&mut self, mark: StyledObject<char>) -> eyre::Result<()> {
        let (_rows, cols) = self.terminal.size();
        if self.column >= line_width(cols) {
            self.terminal.write_str("\n")?;
            self.column = 0;
        }
        self.terminal
            .write_str(&mark.to_string())
            .wrap_err("failed to write character on terminal")?;
        self.column += 1;
        Ok(())
    }
}

impl Default for DotReporter {
    fn default() -> DotReporter {
        DotReporter::new()
    }
}

#[async_trait::async_trait]
impl Reporter for DotReporter {
    async fn on_exchange(&mut self, _case: CaseInfo, log: Box<http::Log>) -> eyre::Result<()> {
        self.buffer.push_str(&render_exchange(&log));
        self.buffer.push('\n');
        Ok(())
    }

    async fn on_verdict(&mut self, case: CaseInfo, verdict: Verdict) -> eyre::Result<()> {
        match &verdict {
            Verdict::Passed { .. } => self.progress(style('.').green())?,
            Verdict::Failed { .. } => self.progress(style('F').red())?,
            Verdict::Errored { .. } => self.progress(style('E').red().bold())?,
            Verdict::Log(_) => {}
        }
        if let Some(text) = render_verdict(&case, &verdict) {
            self.buffer.push_str(&text);
        }
        Ok(())
    }

    async fn on_file_end(&mut self, _path: PathBuf, summary: Summary) -> eyre::Result<()> {
        self.terminal.write_str("\n\n")?;
        self.terminal.write_str(&std::mem::take(&mut self.buffer))?;
        self.terminal.write_line(&summary.to_string())?;
        self.terminal.write_line("")?;
        self.terminal.flush()?;
        self.column = 0;
        Ok(())
    }

    async fn on_summary(&mut self, summaries: Vec<(PathBuf, Summary)>) -> eyre::Result<()> {
        self.terminal.write_line("Summary:")?;
        self.terminal.write_str(&render_summaries(&summaries))?;
        self.terminal.flush()?;
        Ok(())
    }
}

/// One line per test outcome, with exchanges and logs shown dimmed.
pub struct ListReporter {
    terminal: Term,
}

impl ListReporter {
    pub fn new() -> ListReporter {
        ListReporter {
            terminal: Term::stdout(),
        }
    }
}

impl Default for ListReporter {
    fn default() -> ListReporter {
        ListReporter::new()
    }
}

#[async_trait::async_trait]
impl Reporter for ListReporter {
    async fn on_file_start(&mut self, path: PathBuf) -> eyre::Result<()> {
        self.terminal
            .write_line(&format!("{}", style(path.display()).bold()))?;
        Ok(())
    }

    async fn on_exchange(&mut self, _case: CaseInfo, log: Box<http::Log>) -> eyre::Result<()> {
        for line in render_exchange(&log).lines() {
            write(&self.terminal, format!("   {line}"))?;
        }
        Ok(())
    }

    async fn on_verdict(&mut self, case: CaseInfo, verdict: Verdict) -> eyre::Result<()> {
        match verdict {
            Verdict::Log(message) => write(&self.terminal, format!("   {message}"))?,
            Verdict::Passed { test, assertions } => {
                let status = style("✓").green();
                self.terminal.write_line(&format!(
                    "{status} {} - {test} ({assertions} assertions)",
                    case.name
                ))?;
            }
            Verdict::Failed { test, messages, .. } => {
                let status = style("✘").red();
                self.terminal
                    .write_line(&format!("{status} {} - {test}", case.name))?;
                for message in messages {
                    self.terminal.write_line(&format!("    {message}"))?;
                }
            }
            Verdict::Errored { test, message } => {
                let status = style("✘").red().bold();
                self.terminal
                    .write_line(&format!("{status} {} - {test}: {message}", case.name))?;
            }
        }
        Ok(())
    }

    async fn on_file_end(&mut self, _path: PathBuf, summary: Summary) -> eyre::Result<()> {
        self.terminal.write_line(&summary.to_string())?;
        self.terminal.write_line("")?;
        Ok(())
    }

    async fn on_summary(&mut self, summaries: Vec<(PathBuf, Summary)>) -> eyre::Result<()> {
        self.terminal.write_line("Summary:")?;
        self.terminal.write_str(&render_summaries(&summaries))?;
        Ok(())
    }
}

fn write(term: &Term, s: impl AsRef<str>) -> eyre::Result<()> {
    let colored = style(s.as_ref()).dim();
    term.write_line(&format!("{colored}"))
        .wrap_err("failed to write character on terminal")
}

/// Dots per line: 40% of the terminal width, at least one.
fn line_width(cols: u16) -> usize {
    (usize::from(cols) * 2 / 5).max(1)
}

fn render_verdict(case: &CaseInfo, verdict: &Verdict) -> Option<String> {
    match verdict {
        Verdict::Passed { .. } => None,
        Verdict::Log(message) => Some(format!("{message}\n\n")),
        Verdict::Failed { test, messages, .. } => {
            let mut text = format!("{} - {test}\n", case.name);
            for message in messages {
                text.push_str(message);
                text.push('\n');
            }
            text.push('\n');
            Some(text)
        }
        Verdict::Errored { test, message } => {
            Some(format!("{} - {test}\n{message}\n\n", case.name))
        }
    }
}

fn render_exchange(log: &http::Log) -> String {
    let mut text = format!("{} {}\n", log.request.method, log.request.url);
    for (name, value) in &log.request.headers {
        text.push_str(&format!("> {name}: {}\n", String::from_utf8_lossy(value.as_bytes())));
    }
    if !log.request.body.is_empty() {
        text.push_str(&format!("> {}\n", log.request.body.trim_end()));
    }
    text.push_str(&format!("< {}\n", log.response.status));
    for (name, value) in &log.response.headers {
        text.push_str(&format!("< {name}: {}\n", String::from_utf8_lossy(value.as_bytes())));
    }
    if !log.response.body.is_empty() {
        text.push_str(&format!("< {}\n", log.response.body.trim_end()));
    }
    text
}

fn render_summaries(summaries: &[(PathBuf, Summary)]) -> String {
    let names: Vec<_> = summaries
        .iter()
        .map(|(path, _)| path.display().to_string())
        .collect();
    let width = names.iter().map(|name| name.chars().count()).max().unwrap_or(0);
    names
        .iter()
        .zip(summaries)
        .map(|(name, (_, summary))| format!("{name:<width$}\t{summary}\n"))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::str::FromStr;
    use test_case::test_case;

    fn case() -> CaseInfo {
        CaseInfo {
            file: PathBuf::from("api.http"),
            name: "Create user".into(),
        }
    }

    #[test_case("dot", ReporterType::Dot; "dot")]
    #[test_case("list", ReporterType::List; "list")]
    #[test_case("null", ReporterType::Null; "null")]
    fn reporter_type_from_str(s: &str, expected: ReporterType) -> eyre::Result<()> {
        assert_eq!(ReporterType::from_str(s)?, expected);
        assert_eq!(expected.to_string(), s);
        Ok(())
    }

    #[test]
    fn unknown_reporter_type() {
        assert!(ReporterType::from_str("table").is_err());
    }

    #[test_case(0, 1; "no terminal")]
    #[test_case(1, 1; "tiny")]
    #[test_case(80, 32; "standard")]
    #[test_case(79, 31; "rounded down")]
    fn dots_per_line(cols: u16, expected: usize) {
        assert_eq!(line_width(cols), expected);
    }

    #[test]
    fn passed_verdict_is_not_buffered() {
        let verdict = Verdict::Passed {
            test: "status".into(),
            assertions: 2,
        };
        assert_eq!(render_verdict(&case(), &verdict), None);
    }

    #[test]
    fn failed_verdict_lists_messages() {
        let verdict = Verdict::Failed {
            test: "status".into(),
            messages: vec!["expected 201".into(), "missing id".into()],
            assertions: 3,
        };
        assert_eq!(
            render_verdict(&case(), &verdict).as_deref(),
            Some("Create user - status\nexpected 201\nmissing id\n\n")
        );
    }

    #[test]
    fn errored_and_log_verdicts() {
        let errored = Verdict::Errored {
            test: "undefined variable".into(),
            message: "missing variable host".into(),
        };
        assert_eq!(
            render_verdict(&case(), &errored).as_deref(),
            Some("Create user - undefined variable\nmissing variable host\n\n")
        );
        assert_eq!(
            render_verdict(&case(), &Verdict::Log("hello".into())).as_deref(),
            Some("hello\n\n")
        );
    }

    #[test]
    fn summaries_are_padded() {
        let summaries = vec![
            (
                PathBuf::from("a.http"),
                Summary {
                    assertions: 3,
                    failed_tests: 0,
                    errors: 0,
                },
            ),
            (
                PathBuf::from("users/b.http"),
                Summary {
                    assertions: 1,
                    failed_tests: 1,
                    errors: 2,
                },
            ),
        ];
        assert_eq!(
            render_summaries(&summaries),
            "a.http      \tAssertions: 3\nusers/b.http\tAssertions: 1 | Failed tests: 1 | Errors: 2\n"
        );
    }

    #[test]
    fn exchange_rendering() -> eyre::Result<()> {
        let mut request_headers = HeaderMap::new();
        request_headers.insert("x-token", HeaderValue::from_static("abc"));
        let mut response_headers = HeaderMap::new();
        response_headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let log = http::Log {
            request: http::LogRequest {
                url: "http://x/users".parse()?,
                method: reqwest::Method::POST,
                headers: request_headers,
                body: "name=alice\n".into(),
            },
            response: http::LogResponse {
                status: reqwest::StatusCode::CREATED,
                headers: response_headers,
                body: "ok".into(),
            },
        };
        assert_eq!(
            render_exchange(&log),
            "POST http://x/users\n> x-token: abc\n> name=alice\n< 201 Created\n< content-type: text/plain\n< ok\n"
        );
        Ok(())
    }
}
