pub mod bookmarks;
pub mod session;

// The match over every `Action` lives in `run` so this module stays small.
mod run;

#[derive(Debug)]
pub enum Action {
    Session(session::Args),
    Bookmarks(bookmarks::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
