//! SSH credential acquisition: flag, environment, or interactive prompt.

use dialoguer::Password;
use gs_types::Credentials;

/// Source of a password when none was supplied up front.
pub trait PasswordPrompt {
    fn ask(&self, username: &str) -> anyhow::Result<String>;
}

/// Hidden-input prompt on the controlling terminal.
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn ask(&self, username: &str) -> anyhow::Result<String> {
        let password: String = Password::new()
            .with_prompt(format!("SSH password for {username}"))
            .interact()?;
        Ok(password)
    }
}

/// Resolve credentials. A supplied password is used as is; `key_auth` skips
/// the password entirely; otherwise `prompt` is asked once.
pub fn acquire(
    username: &str,
    supplied: Option<String>,
    key_auth: bool,
    prompt: &dyn PasswordPrompt,
) -> anyhow::Result<Credentials> {
    let password = match (supplied, key_auth) {
        (_, true) => None,
        (Some(password), false) => Some(password),
        (None, false) => Some(prompt.ask(username)?),
    };
    Ok(Credentials::new(username, password))
}
