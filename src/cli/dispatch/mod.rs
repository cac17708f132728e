use crate::cli::{
    actions::{Action, bookmarks, session},
    commands::{ARG_API_URL, ARG_BATCH, ARG_STATE_FILE},
    globals::GlobalArgs,
};
use crate::client::CheckMode;
use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;
use std::path::PathBuf;

fn globals(matches: &clap::ArgMatches) -> Result<GlobalArgs> {
    let api_url = matches
        .get_one::<String>(ARG_API_URL)
        .cloned()
        .context("missing required argument: --api-url")?;
    url::Url::parse(&api_url).with_context(|| format!("invalid --api-url: {api_url}"))?;

    let mut globals = GlobalArgs::new(api_url);
    if let Some(path) = matches.get_one::<String>(ARG_STATE_FILE) {
        globals.state_file = PathBuf::from(path);
    }
    if matches.get_flag(ARG_BATCH) {
        globals.check_mode = CheckMode::Batch;
    }
    Ok(globals)
}

fn required(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}

/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let globals = globals(matches)?;

    let action = match matches.subcommand() {
        Some(("login", sub)) => Action::Session(session::Args {
            globals,
            command: session::Command::Login {
                email: required(sub, "email")?,
                password: SecretString::from(required(sub, "password")?),
            },
        }),
        Some(("login-external", sub)) => Action::Session(session::Args {
            globals,
            command: session::Command::LoginExternal {
                token: SecretString::from(required(sub, "token")?),
            },
        }),
        Some(("logout", _)) => Action::Session(session::Args {
            globals,
            command: session::Command::Logout,
        }),
        Some(("session", _)) => Action::Session(session::Args {
            globals,
            command: session::Command::Show,
        }),
        Some(("bookmarks", sub)) => match sub.subcommand() {
            Some(("check", check)) => Action::Bookmarks(bookmarks::Args {
                globals,
                command: bookmarks::Command::Check(
                    check
                        .get_many::<i64>("ids")
                        .context("missing document ids")?
                        .copied()
                        .collect(),
                ),
            }),
            Some(("toggle", toggle)) => Action::Bookmarks(bookmarks::Args {
                globals,
                command: bookmarks::Command::Toggle(
                    toggle
                        .get_one::<i64>("id")
                        .copied()
                        .context("missing document id")?,
                ),
            }),
            _ => return Err(anyhow!("unknown bookmarks command")),
        },
        _ => return Err(anyhow!("unknown command")),
    };

    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use crate::client::config::{ENV_API_BASE_URL, ENV_STATUS_BATCH};

    fn handle(args: &[&str]) -> Result<Action> {
        temp_env::with_vars(
            [
                (ENV_API_BASE_URL, None::<&str>),
                (ENV_STATUS_BATCH, None),
                ("NORMSEARCH_STATE_FILE", None),
                ("NORMSEARCH_PASSWORD", None),
                ("NORMSEARCH_PROVIDER_TOKEN", None),
            ],
            || {
                let matches = commands::new().try_get_matches_from(args)?;
                handler(&matches)
            },
        )
    }

    #[test]
    fn test_login_action() {
        let action = handle(&[
            "normsearch",
            "--api-url",
            "https://api.normsearch.dev",
            "--state-file",
            "/tmp/state.json",
            "login",
            "--email",
            "a@b.com",
            "--password",
            "hunter2",
        ]);

        match action {
            Ok(Action::Session(args)) => {
                assert_eq!(args.globals.api_url, "https://api.normsearch.dev");
                assert_eq!(args.globals.state_file, PathBuf::from("/tmp/state.json"));
                assert!(
                    matches!(args.command, session::Command::Login { ref email, .. } if email == "a@b.com")
                );
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_bookmarks_batch_action() {
        let action = handle(&[
            "normsearch",
            "--api-url",
            "https://api.normsearch.dev",
            "--batch",
            "bookmarks",
            "check",
            "4",
            "5",
        ]);

        match action {
            Ok(Action::Bookmarks(args)) => {
                assert_eq!(args.globals.check_mode, CheckMode::Batch);
                assert!(matches!(args.command, bookmarks::Command::Check(ref ids) if ids == &[4, 5]));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_api_url() {
        let action = handle(&["normsearch", "--api-url", "not a url", "session"]);
        assert!(action.is_err());
    }
}
