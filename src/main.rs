// Entrypoint for the CLI application.
// - Authenticates first; a missing client secret is the only fatal error.
// - Everything after that (link, course lookup, downloads) is reported and
//   ends the run normally.

use anyhow::Context;
use clap::Parser;
use classroom_dl::api::ApiClient;
use classroom_dl::auth::{self, OAuthClient, StoredToken, TokenSource};
use classroom_dl::config::{Cli, Config};
use classroom_dl::consent::LoopbackAuthorizer;
use classroom_dl::mirror::{Mirror, MirrorReport};
use classroom_dl::{logging, ui, Error};

fn main() -> anyhow::Result<()> {
    let cfg = Config::from_cli(Cli::parse());
    logging::init_logging(cfg.verbose);
    tracing::debug!("config: {:?}", cfg);

    let oauth = OAuthClient::new()?;
    let token = match authenticate(&cfg, &oauth) {
        Ok(token) => token,
        Err(Error::ConfigMissing(path)) => {
            eprintln!(
                "{} not found. Please download it from Google Cloud Console.",
                path.display()
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("authentication failed"),
    };

    // Refreshed tokens replace the cached one as the run goes on.
    let auth = TokenSource::new(token, Box::new(oauth)).persist_to(&cfg.token);
    match run(&cfg, auth) {
        Ok(report) => {
            if report.failed > 0 {
                eprintln!("{} file(s) could not be downloaded, see the log above.", report.failed);
            }
            ui::info(&format!("All files downloaded to: {}", report.root.display()));
        }
        Err(e) => match e.downcast_ref::<Error>() {
            Some(course @ Error::CourseFetch { .. }) => eprintln!("{}", course),
            _ => eprintln!("An error occurred: {:#}", e),
        },
    }
    Ok(())
}

fn authenticate(cfg: &Config, oauth: &OAuthClient) -> classroom_dl::Result<StoredToken> {
    let mut authorizer = LoopbackAuthorizer::new(oauth.clone());
    if !cfg.open_browser {
        authorizer = authorizer.without_browser();
    }
    auth::authenticate(&cfg.token, &cfg.credentials, &authorizer, oauth)
}

fn run(cfg: &Config, auth: TokenSource) -> anyhow::Result<MirrorReport> {
    let api = ApiClient::from_env(auth)?;
    let link = match &cfg.link {
        Some(link) => link.clone(),
        None => ui::prompt_link()?,
    };
    let mirror = Mirror::new(&api, &api, &cfg.output_dir);
    Ok(mirror.run(&link)?)
}
