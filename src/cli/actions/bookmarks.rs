use crate::{cli::globals::GlobalArgs, status::StatusCache};
use anyhow::{Result, bail};
use tracing::debug;

#[derive(Debug)]
pub enum Command {
    Check(Vec<i64>),
    Toggle(i64),
}

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub command: Command,
}

/// Execute a bookmarks command against the persisted session.
/// # Errors
/// Returns an error if the store cannot be opened or nobody is signed in.
pub async fn execute(args: Args) -> Result<()> {
    let cache = args.globals.open_cache()?;
    if !cache.session().is_authenticated() {
        bail!("not signed in; run `normsearch login` first");
    }

    match args.command {
        Command::Check(ids) => {
            debug!(count = ids.len(), "checking bookmarks");
            cache.check_many(&ids).await;
            for id in ids {
                println!("{}", line(&cache, id));
            }
        }
        Command::Toggle(id) => {
            cache.check_many(&[id]).await;
            cache.toggle(id).await;
            println!("{}", line(&cache, id));
        }
    }

    Ok(())
}

fn line(cache: &StatusCache, id: i64) -> String {
    let status = if !cache.is_checked(id) {
        "unknown"
    } else if cache.is_marked(id) {
        "bookmarked"
    } else {
        "not bookmarked"
    };
    format!("{id}\t{status}")
}
