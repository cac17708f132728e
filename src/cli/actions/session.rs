use crate::{
    cli::globals::GlobalArgs,
    session::SessionState,
};
use anyhow::{Result, anyhow};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug)]
pub enum Command {
    Login {
        email: String,
        password: SecretString,
    },
    LoginExternal {
        token: SecretString,
    },
    Logout,
    Show,
}

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub command: Command,
}

/// Execute a session command.
/// # Errors
/// Returns an error if the store cannot be opened or the server refuses the login.
pub async fn execute(args: Args) -> Result<()> {
    let store = args.globals.open_session()?;
    debug!(state_file = %args.globals.state_file.display(), "opened session store");

    match args.command {
        Command::Login { email, password } => {
            let user = store
                .login(&email, password.expose_secret())
                .await
                .map_err(|err| anyhow!("login failed: {err}"))?;
            info!(user_id = user.id, "signed in");
            println!("signed in as {}", user.email);
        }
        Command::LoginExternal { token } => {
            let user = store
                .login_with_external_token(token.expose_secret())
                .await
                .map_err(|err| anyhow!("login failed: {err}"))?;
            info!(user_id = user.id, "signed in");
            println!("signed in as {}", user.email);
        }
        Command::Logout => {
            store.logout().await;
            println!("signed out");
        }
        Command::Show => {
            println!("{}", describe(&store.state()));
        }
    }

    Ok(())
}

/// JSON summary of a session; never includes the credential.
fn describe(state: &SessionState) -> String {
    json!({
        "authenticated": state.is_authenticated(),
        "phase": format!("{:?}", state.phase),
        "user": state.user(),
    })
    .to_string()
}
