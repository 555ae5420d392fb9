use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as ClapCommand};
use std::{ffi::OsString, path::PathBuf, str::FromStr};
use tracing::*;
use tracing_subscriber::EnvFilter;

use httprunner_core::{
    config::DEFAULT_CLIENT_FILE, runner::DEFAULT_MAX_REDIRECTS, ClientConfig, Options,
    ReporterType, Runner,
};

const COLOR_ENV: &str = "HTTPRUNNER_COLOR";

/// Build the CLI with clap's builder pattern
fn build_cli() -> ClapCommand {
    ClapCommand::new("httprunner")
        .about("Run the requests of .http files and check the responses with their assertion scripts")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(Arg::new("files")
            .help(".http files to run, in the given order")
            .value_name("FILES")
            .required(true)
            .num_args(1..)
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("client-file")
            .long("client-file")
            .help(format!("JSON file mapping client names to variables. Default is \"{DEFAULT_CLIENT_FILE}\""))
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("selected-client")
            .long("selected-client")
            .help("Client of the client file whose variables are substituted"))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Report script logs and HTTP exchanges. Cases tagged @no-log never show their exchanges")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("reporter")
            .long("reporter")
            .help("Reporter to use. Default is \"dot\"")
            .value_parser(["dot", "list", "null"]))
        .arg(Arg::new("max-redirects")
            .long("max-redirects")
            .help(format!("Maximum number of redirects followed per case. Default is {DEFAULT_MAX_REDIRECTS}"))
            .value_parser(value_parser!(usize)))
        .arg(Arg::new("color")
            .long("color")
            .help(format!("Produce color output. Default is \"auto\" [env: {COLOR_ENV}]"))
            .value_parser(["auto", "always", "never"]))
}

/// httprunner CLI.
#[derive(Default)]
pub struct App;

impl App {
    pub fn new() -> App {
        App
    }

    /// Install error reporting and logging, then run with the process arguments.
    /// Returns the process exit code.
    pub async fn run(self) -> eyre::Result<i32> {
        color_eyre::install()?;
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .try_init();

        self.run_from(std::env::args_os()).await
    }

    /// Parse `args` and run every file. Returns 0 when no test failed and no error occurred,
    /// 1 otherwise.
    pub async fn run_from<I, T>(self, args: I) -> eyre::Result<i32>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = build_cli().get_matches_from(args);
        let settings = Settings::from_matches(&matches)?;

        let color = resolve_color(settings.color, std::env::var(COLOR_ENV).ok());
        match color {
            Some(Color::Always) => {
                console::set_colors_enabled(true);
                console::set_colors_enabled_stderr(true);
            }
            Some(Color::Never) => {
                console::set_colors_enabled(false);
                console::set_colors_enabled_stderr(false);
            }
            _ => {}
        }

        let config = ClientConfig::load(&settings.client_file, settings.client_file_required)?;
        let variables = config.variables(settings.selected_client.as_deref())?;

        let mut runner = Runner::new(
            variables,
            Options {
                verbose: settings.verbose,
                max_redirects: settings.max_redirects,
            },
        )?;
        runner.add_boxed_reporter(settings.reporter.create());

        debug!("running {} files", settings.files.len());
        let report = runner.run(&settings.files).await?;
        Ok(if report.is_success() { 0 } else { 1 })
    }
}

#[derive(Debug, PartialEq)]
struct Settings {
    files: Vec<PathBuf>,
    client_file: PathBuf,
    /// A missing client file is only an error when it was named explicitly.
    client_file_required: bool,
    selected_client: Option<String>,
    verbose: bool,
    reporter: ReporterType,
    max_redirects: usize,
    color: Option<Color>,
}

impl Settings {
    fn from_matches(matches: &ArgMatches) -> eyre::Result<Settings> {
        let client_file = matches.get_one::<PathBuf>("client-file");
        Ok(Settings {
            files: matches
                .get_many::<PathBuf>("files")
                .map(|vals| vals.cloned().collect())
                .unwrap_or_default(),
            client_file_required: client_file.is_some(),
            client_file: client_file
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_FILE)),
            selected_client: matches.get_one::<String>("selected-client").cloned(),
            verbose: matches.get_flag("verbose"),
            reporter: matches
                .get_one::<String>("reporter")
                .map(|s| ReporterType::from_str(s))
                .transpose()?
                .unwrap_or_default(),
            max_redirects: matches
                .get_one::<usize>("max-redirects")
                .copied()
                .unwrap_or(DEFAULT_MAX_REDIRECTS),
            color: matches
                .get_one::<String>("color")
                .and_then(|s| Color::from_str(s).ok()),
        })
    }
}

/// The `--color` flag wins when it forces a mode, otherwise the environment decides.
fn resolve_color(command: Option<Color>, env: Option<String>) -> Option<Color> {
    match (command, env) {
        (color @ Some(Color::Always), _) => color,
        (color @ Some(Color::Never), _) => color,
        (None, Some(color)) => Color::from_str(&color).ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn settings(args: &[&str]) -> eyre::Result<Settings> {
        let matches = build_cli().try_get_matches_from(args)?;
        Settings::from_matches(&matches)
    }

    #[test]
    fn defaults() -> eyre::Result<()> {
        assert_eq!(
            settings(&["httprunner", "a.http"])?,
            Settings {
                files: vec![PathBuf::from("a.http")],
                client_file: PathBuf::from("rest-client.env.json"),
                client_file_required: false,
                selected_client: None,
                verbose: false,
                reporter: ReporterType::Dot,
                max_redirects: 10,
                color: None,
            }
        );
        Ok(())
    }

    #[test]
    fn all_options() -> eyre::Result<()> {
        let parsed = settings(&[
            "httprunner",
            "--client-file=env.json",
            "--selected-client",
            "dev",
            "-v",
            "--reporter",
            "list",
            "--max-redirects",
            "3",
            "--color",
            "never",
            "a.http",
            "b.http",
        ])?;
        assert_eq!(
            parsed,
            Settings {
                files: vec![PathBuf::from("a.http"), PathBuf::from("b.http")],
                client_file: PathBuf::from("env.json"),
                client_file_required: true,
                selected_client: Some("dev".into()),
                verbose: true,
                reporter: ReporterType::List,
                max_redirects: 3,
                color: Some(Color::Never),
            }
        );
        Ok(())
    }

    #[test_case(&["httprunner"]; "no files")]
    #[test_case(&["httprunner", "--reporter", "table", "a.http"]; "unknown reporter")]
    #[test_case(&["httprunner", "--max-redirects", "many", "a.http"]; "non numeric redirects")]
    fn invalid_arguments(args: &[&str]) {
        assert!(build_cli().try_get_matches_from(args).is_err());
    }

    #[test_case(None, None, None; "nothing")]
    #[test_case(Some(Color::Always), Some("never"), Some(Color::Always); "flag wins")]
    #[test_case(Some(Color::Never), None, Some(Color::Never); "flag only")]
    #[test_case(None, Some("always"), Some(Color::Always); "env only")]
    #[test_case(Some(Color::Auto), Some("never"), None; "auto flag ignores env")]
    #[test_case(None, Some("bogus"), None; "invalid env")]
    fn color_resolution(command: Option<Color>, env: Option<&str>, expected: Option<Color>) {
        assert_eq!(resolve_color(command, env.map(String::from)), expected);
    }

    #[tokio::test]
    async fn exit_code_reflects_failures() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/ok")
            .with_status(200)
            .create_async()
            .await;
        let _teapot = server
            .mock("GET", "/teapot")
            .with_status(418)
            .create_async()
            .await;

        let dir = tempfile::tempdir()?;
        let client_file = dir.path().join("client.json");
        std::fs::write(
            &client_file,
            format!(r#"{{"dev": {{"host": "{}"}}}}"#, server.url()),
        )?;
        let passing = dir.path().join("passing.http");
        std::fs::write(
            &passing,
            "GET {{host}}/ok\n\n> {%\nclient.test('ok', () => client.assert(response.status === 200, 'status'))\n%}\n",
        )?;
        let failing = dir.path().join("failing.http");
        std::fs::write(
            &failing,
            "GET {{host}}/teapot\n\n> {%\nclient.test('ok', () => client.assert(response.status === 200, 'status'))\n%}\n",
        )?;

        let args = |file: &PathBuf| -> Vec<OsString> {
            vec![
                "httprunner".into(),
                "--reporter=null".into(),
                "--client-file".into(),
                client_file.clone().into(),
                "--selected-client=dev".into(),
                file.clone().into(),
            ]
        };

        assert_eq!(App::new().run_from(args(&passing)).await?, 0);
        assert_eq!(App::new().run_from(args(&failing)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_client_is_an_error() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let client_file = dir.path().join("client.json");
        std::fs::write(&client_file, r#"{"dev": {}}"#)?;
        let file = dir.path().join("a.http");
        std::fs::write(&file, "GET http://localhost/\n")?;

        let result = App::new()
            .run_from([
                OsString::from("httprunner"),
                OsString::from("--reporter=null"),
                OsString::from("--client-file"),
                client_file.into(),
                OsString::from("--selected-client=prod"),
                file.into(),
            ])
            .await;
        assert!(result.is_err());
        Ok(())
    }
}
