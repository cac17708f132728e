pub mod logging;

use crate::client::config::{ENV_API_BASE_URL, ENV_STATUS_BATCH};
use crate::cli::globals::DEFAULT_STATE_FILE;
use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_STATE_FILE: &str = "state-file";
pub const ARG_BATCH: &str = "batch";

fn login() -> Command {
    Command::new("login")
        .about("Sign in with email and password")
        .arg(
            Arg::new("email")
                .long("email")
                .help("Account email")
                .env("NORMSEARCH_EMAIL")
                .required(true),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .help("Account password")
                .env("NORMSEARCH_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
}

fn login_external() -> Command {
    Command::new("login-external")
        .about("Sign in with a token from an external identity provider")
        .arg(
            Arg::new("token")
                .long("token")
                .help("Identity provider token")
                .env("NORMSEARCH_PROVIDER_TOKEN")
                .hide_env_values(true)
                .required(true),
        )
}

fn bookmarks() -> Command {
    Command::new("bookmarks")
        .about("Inspect and change bookmarked documents")
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Show whether each document is bookmarked")
                .arg(
                    Arg::new("ids")
                        .help("Document ids")
                        .required(true)
                        .num_args(1..)
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
        .subcommand(
            Command::new("toggle")
                .about("Flip the bookmark on one document")
                .arg(
                    Arg::new("id")
                        .help("Document id")
                        .required(true)
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("normsearch")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg(
            Arg::new(ARG_API_URL)
                .long("api-url")
                .help("Base URL of the normsearch API, example: https://api.normsearch.dev")
                .env(ENV_API_BASE_URL)
                .required(true),
        )
        .arg(
            Arg::new(ARG_STATE_FILE)
                .long("state-file")
                .help("File holding the persisted session record")
                .env("NORMSEARCH_STATE_FILE")
                .default_value(DEFAULT_STATE_FILE),
        )
        .arg(
            Arg::new(ARG_BATCH)
                .long("batch")
                .help("Check bookmark statuses with one batch request")
                .env(ENV_STATUS_BATCH)
                .action(ArgAction::SetTrue),
        )
        .subcommand(login())
        .subcommand(login_external())
        .subcommand(Command::new("logout").about("Sign out and forget the local session"))
        .subcommand(Command::new("session").about("Show the persisted session"))
        .subcommand(bookmarks());

    logging::with_args(command)
}
