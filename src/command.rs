//! Line commands understood by the terminal front-end.

use crate::session::SessionHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `add <url> <title...>`
    Add { url: String, title: String },
    /// `rm <position|id>`
    Remove(Target),
    List,
    Sync,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// 1-based position in the list as last shown.
    Position(usize),
    Id(String),
}

pub const HELP: &str = "\
commands:
  add <url> <title>   save a bookmark
  rm <n|id>           delete the n-th bookmark, or the one with that id
  ls                  show the list
  sync                reload the list from the store
  help                show this message
  quit                leave";

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "add" | "a" => {
            let (url, title) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Ok(Command::Add {
                url: url.to_string(),
                title: title.trim().to_string(),
            })
        }
        "rm" | "del" | "delete" => {
            if rest.is_empty() {
                return Err("usage: rm <n|id>".to_string());
            }
            let target = match rest.parse::<usize>() {
                Ok(position) if position > 0 => Target::Position(position),
                _ => Target::Id(rest.to_string()),
            };
            Ok(Command::Remove(target))
        }
        "ls" | "list" | "" => Ok(Command::List),
        "sync" => Ok(Command::Sync),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}', try 'help'")),
    }
}

/// Runs a command against the session and returns the line to show the user,
/// if any. List changes reach the front-end through the session view, so a
/// successful delete or sync has nothing to say. `ls`, `help` and `quit` are
/// handled by the front-end and return `None` here.
pub async fn execute(session: &SessionHandle, command: Command) -> Option<String> {
    match command {
        Command::Add { url, title } => match session.submit(&title, &url).await {
            Ok(bookmark) => Some(format!("saved \"{}\"", bookmark.title)),
            Err(e) => Some(format!("could not save bookmark: {e}")),
        },
        Command::Remove(target) => {
            let id = match target {
                Target::Position(n) => match session.view().bookmarks.get(n - 1) {
                    Some(bookmark) => bookmark.id.clone(),
                    None => return Some(format!("no bookmark at position {n}")),
                },
                Target::Id(id) => id,
            };
            session
                .delete(&id)
                .await
                .err()
                .map(|e| format!("could not delete bookmark: {e}"))
        }
        Command::Sync => session
            .resync()
            .await
            .err()
            .map(|e| format!("could not reload bookmarks: {e}")),
        Command::List | Command::Help | Command::Quit => None,
    }
}
