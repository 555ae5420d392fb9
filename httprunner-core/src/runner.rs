/// httprunner's test runner
///
/// Files run in the order given and cases in file order, one exchange in flight at a time.
/// Events are handed to every reporter in order before the next case starts.
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::*;

use crate::{
    client::{Client, Output, TestOutcome},
    config::Variables,
    context::VariableContext,
    executor::Executor,
    http, parser,
    reporter::Reporter,
};

pub const DEFAULT_MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct Options {
    /// Report script logs and HTTP exchanges.
    pub verbose: bool,
    pub max_redirects: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            verbose: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInfo {
    pub file: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Log(String),
    Passed {
        test: String,
        assertions: usize,
    },
    Failed {
        test: String,
        /// Messages of the failed assertions.
        messages: Vec<String>,
        assertions: usize,
    },
    Errored {
        test: String,
        message: String,
    },
}

impl Verdict {
    fn from_output(output: Output, verbose: bool) -> Option<Verdict> {
        match output {
            Output::Log(entry) => verbose.then_some(Verdict::Log(entry.message)),
            Output::Test(TestOutcome::Error { name, message }) => Some(Verdict::Errored {
                test: name,
                message,
            }),
            Output::Test(TestOutcome::Assertions { name, assertions }) => {
                let messages: Vec<_> = assertions
                    .iter()
                    .filter(|assertion| !assertion.valid)
                    .map(|assertion| assertion.message.clone().unwrap_or_default())
                    .collect();
                Some(if messages.is_empty() {
                    Verdict::Passed {
                        test: name,
                        assertions: assertions.len(),
                    }
                } else {
                    Verdict::Failed {
                        test: name,
                        messages,
                        assertions: assertions.len(),
                    }
                })
            }
        }
    }
}

/// Counters of one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub assertions: usize,
    pub failed_tests: usize,
    pub errors: usize,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed_tests == 0 && self.errors == 0
    }

    fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Log(_) => {}
            Verdict::Passed { assertions, .. } => self.assertions += assertions,
            Verdict::Failed { assertions, .. } => {
                self.assertions += assertions;
                self.failed_tests += 1;
            }
            Verdict::Errored { .. } => self.errors += 1,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Assertions: {}", self.assertions)?;
        if self.failed_tests > 0 {
            write!(f, " | Failed tests: {}", self.failed_tests)?;
        }
        if self.errors > 0 {
            write!(f, " | Errors: {}", self.errors)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    FileStart(PathBuf),
    CaseStart(CaseInfo),
    Exchange(CaseInfo, Box<http::Log>),
    Verdict(CaseInfo, Verdict),
    FileEnd(PathBuf, Summary),
    Summary(Vec<(PathBuf, Summary)>),
}

/// Summaries of one run, keyed by file in run order.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub summaries: Vec<(PathBuf, Summary)>,
}

impl Report {
    /// `true` iff no file had a failed test or an error.
    pub fn is_success(&self) -> bool {
        self.summaries.iter().all(|(_, summary)| summary.is_success())
    }
}

pub struct Runner {
    variables: Arc<Variables>,
    options: Options,
    transport: http::Transport,
    reporters: Vec<Box<dyn Reporter + Send>>,
}

impl Runner {
    pub fn new(variables: Variables, options: Options) -> crate::Result<Runner> {
        Ok(Runner {
            variables: Arc::new(variables),
            options,
            transport: http::Transport::new()?,
            reporters: Vec::new(),
        })
    }

    pub fn add_reporter(&mut self, reporter: impl Reporter + 'static + Send) {
        self.reporters.push(Box::new(reporter));
    }

    pub fn add_boxed_reporter(&mut self, reporter: Box<dyn Reporter + 'static + Send>) {
        self.reporters.push(reporter);
    }

    /// Run every file. Each call starts from empty globals.
    pub async fn run(&mut self, files: &[PathBuf]) -> eyre::Result<Report> {
        let mut pipeline = Pipeline {
            options: self.options.clone(),
            ctx: VariableContext::new(Client::new(), Arc::clone(&self.variables)),
            executor: Executor::new(self.transport.clone(), self.options.max_redirects),
            reporters: std::mem::take(&mut self.reporters),
        };

        let result = pipeline.run(files).await;
        self.reporters = pipeline.reporters;

        debug!("runner stopped");
        result
    }
}

/// State of one run.
struct Pipeline {
    options: Options,
    ctx: VariableContext,
    executor: Executor,
    reporters: Vec<Box<dyn Reporter + Send>>,
}

impl Pipeline {
    async fn run(&mut self, files: &[PathBuf]) -> eyre::Result<Report> {
        let mut report = Report::default();
        for file in files {
            self.publish(Message::FileStart(file.clone())).await?;
            let summary = self.run_file(file).await?;
            self.publish(Message::FileEnd(file.clone(), summary)).await?;
            report.summaries.push((file.clone(), summary));
        }

        if report.summaries.len() > 1 {
            self.publish(Message::Summary(report.summaries.clone()))
                .await?;
        }
        Ok(report)
    }

    async fn run_file(&mut self, file: &Path) -> eyre::Result<Summary> {
        let mut summary = Summary::default();

        let cases = match parser::parse_file(file) {
            Ok(cases) => cases,
            Err(e) => {
                error!("failed to parse {}: {e}", file.display());
                let info = CaseInfo {
                    file: file.to_path_buf(),
                    name: file.display().to_string(),
                };
                let verdict = Verdict::Errored {
                    test: "parse error".into(),
                    message: e.to_string(),
                };
                summary.record(&verdict);
                self.publish(Message::Verdict(info, verdict)).await?;
                return Ok(summary);
            }
        };
        debug!("{} cases parsed from {}", cases.len(), file.display());

        for case in &cases {
            let info = CaseInfo {
                file: file.to_path_buf(),
                name: case.display_name(),
            };
            self.publish(Message::CaseStart(info.clone())).await?;

            let execution = self.executor.execute(case, &self.ctx).await;

            if self.options.verbose && !case.no_log {
                for log in execution.logs {
                    self.publish(Message::Exchange(info.clone(), Box::new(log)))
                        .await?;
                }
            }

            for output in execution.outputs {
                let Some(verdict) = Verdict::from_output(output, self.options.verbose) else {
                    continue;
                };
                summary.record(&verdict);
                self.publish(Message::Verdict(info.clone(), verdict))
                    .await?;
            }
        }

        Ok(summary)
    }

    async fn publish(&mut self, msg: Message) -> eyre::Result<()> {
        for reporter in &mut self.reporters {
            reporter.handle(msg.clone()).await?;
        }
        Ok(())
    }
}
