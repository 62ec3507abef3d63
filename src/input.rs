//! Operator input from the terminal.
//!
//! Stdin is read on its own thread and forwarded line by line over a
//! channel, so the control loop can wait on operator input and Ctrl-C at
//! the same time. The filename prompt reads from the same channel.

use crate::control::NamePrompt;
use crossbeam_channel::{select, Receiver, Sender};
use std::io::{BufRead, ErrorKind, Write};
use std::thread;

/// What one line of operator input means outside of a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Toggle,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn from_line(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "r" | "space" | "s" => Command::Toggle,
            "q" | "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(line.trim().to_string()),
        }
    }
}

/// Forward every line of `reader` until EOF; the channel closes afterwards
///
/// Lines are decoded lossily so a stray non-UTF-8 byte never ends the input.
pub fn spawn_line_reader<R>(mut reader: R, lines: Sender<String>) -> std::io::Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new().name("stdin".into()).spawn(move || {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\r', '\n']).to_string();
                    if lines.send(line).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Failed to read operator input: {}", e);
                    break;
                }
            }
        }
        log::debug!("Operator input closed");
    })
}

/// Asks for a filename on stdout and takes the next input line as the answer
pub struct ChannelPrompt<'a> {
    lines: &'a Receiver<String>,
    interrupt: &'a Receiver<()>,
}

impl<'a> ChannelPrompt<'a> {
    pub fn new(lines: &'a Receiver<String>, interrupt: &'a Receiver<()>) -> Self {
        Self { lines, interrupt }
    }
}

impl NamePrompt for ChannelPrompt<'_> {
    fn ask_name(&mut self) -> Option<String> {
        print!("Enter a name for your file (without extension): ");
        let _ = std::io::stdout().flush();

        select! {
            recv(self.lines) -> line => line.ok(),
            recv(self.interrupt) -> _ => None,
        }
    }
}
