// Command line and environment configuration.

use clap::Parser;
use std::path::{Path, PathBuf};

const DEFAULT_CREDENTIALS: &str = "credentials.json";

/// Download every Drive file attached to a Google Classroom course.
#[derive(Debug, Parser)]
#[command(name = "classroom-dl", version)]
#[command(about = "Mirror the files of a Google Classroom course into local folders", long_about = None)]
pub struct Cli {
    /// Course link (https://classroom.google.com/c/...). Prompted for when omitted.
    #[arg(long, env = "CLASSROOM_LINK")]
    pub link: Option<String>,

    /// Directory the course folder is created in.
    #[arg(long, env = "CLASSROOM_DL_OUTPUT_DIR", default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// OAuth client secret downloaded from the Google Cloud Console.
    #[arg(long, env = "CLASSROOM_DL_CREDENTIALS", value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    /// Where the authorization token is cached between runs.
    #[arg(long, env = "CLASSROOM_DL_TOKEN", default_value = "token.json", value_name = "FILE")]
    pub token: PathBuf,

    /// Print the consent URL without opening a browser.
    #[arg(long, env = "CLASSROOM_DL_NO_BROWSER")]
    pub no_browser: bool,

    /// Log debug output to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub link: Option<String>,
    pub output_dir: PathBuf,
    pub credentials: PathBuf,
    pub token: PathBuf,
    pub open_browser: bool,
    pub verbose: bool,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        let credentials = match cli.credentials {
            Some(path) => path,
            None => default_credentials(dirs::config_dir().as_deref()),
        };
        Config {
            link: cli.link.filter(|l| !l.trim().is_empty()),
            output_dir: cli.output_dir,
            credentials,
            token: cli.token,
            open_browser: !cli.no_browser,
            verbose: cli.verbose,
        }
    }
}

/// `./credentials.json`, or the copy under the user config dir when only
/// that one exists.
fn default_credentials(config_dir: Option<&Path>) -> PathBuf {
    let local = PathBuf::from(DEFAULT_CREDENTIALS);
    if local.is_file() {
        return local;
    }
    match config_dir.map(|d| d.join("classroom-dl").join(DEFAULT_CREDENTIALS)) {
        Some(user) if user.is_file() => user,
        _ => local,
    }
}
