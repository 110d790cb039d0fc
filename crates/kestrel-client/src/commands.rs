use kestrel_types::models::AccountId;

pub const HELP: &str = "\
commands:
  /login <account>     log in
  /list                list conversations
  /open <n>            open conversation n from /list
  /dm <account>        open or start a direct conversation
  /send <text>         send to the open conversation (plain text works too)
  /online on|off       toggle connectivity
  /reload              reload the conversation list
  /switch <account>    switch account
  /logout              log out
  /quit                exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(AccountId),
    List,
    Open(usize),
    Dm(AccountId),
    Send(String),
    Online(bool),
    Reload,
    Switch(AccountId),
    Logout,
    Help,
    Quit,
}

/// Parse one input line. Lines not starting with `/` are messages.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Err(HELP.to_string());
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match (name, arg) {
        ("login", a) if !a.is_empty() => Ok(Command::Login(AccountId::new(a))),
        ("list", _) => Ok(Command::List),
        ("open", n) => n
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Command::Open)
            .ok_or_else(|| "usage: /open <n>".to_string()),
        ("dm", a) if !a.is_empty() => Ok(Command::Dm(AccountId::new(a))),
        ("send", text) if !text.is_empty() => Ok(Command::Send(text.to_string())),
        ("online", "on") => Ok(Command::Online(true)),
        ("online", "off") => Ok(Command::Online(false)),
        ("reload", _) => Ok(Command::Reload),
        ("switch", a) if !a.is_empty() => Ok(Command::Switch(AccountId::new(a))),
        ("logout", _) => Ok(Command::Logout),
        ("help", _) => Ok(Command::Help),
        ("quit" | "exit", _) => Ok(Command::Quit),
        _ => Err(HELP.to_string()),
    }
}
