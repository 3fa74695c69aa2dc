//! Line editor loop.

use std::thread;

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use super::command::Command;

const PROMPT: &str = "trackline> ";

/// Read commands on a dedicated thread and forward them to `commands`.
///
/// End of input and Ctrl-C at the prompt are sent as `Command::Quit`.
pub fn spawn_repl(commands: mpsc::UnboundedSender<Command>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(error) => {
                tracing::error!(%error, "Failed to start line editor");
                let _ = commands.send(Command::Quit);
                return;
            }
        };

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line);
                    match line.parse::<Command>() {
                        Ok(command) => {
                            let quit = command == Command::Quit;
                            if commands.send(command).is_err() || quit {
                                break;
                            }
                        }
                        Err(error) => eprintln!("{error}"),
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    let _ = commands.send(Command::Quit);
                    break;
                }
                Err(error) => {
                    tracing::error!(%error, "Line editor failed");
                    let _ = commands.send(Command::Quit);
                    break;
                }
            }
        }
    })
}
