//! Interactive session and one-shot mode.
//!
//! Lines starting with `/` are session commands; everything else is sent to
//! the agent as a turn.

use std::io::{self, Write as _};

use anyhow::{Context, Result};
use tracing::info;

use codeloop_agent::{Agent, AppConfig, ChatMessage, Role, create_named_provider};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A parsed slash command.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Tools,
    Enable(Option<&'a str>),
    Disable(Option<&'a str>),
    Provider(Option<&'a str>),
    Model(Option<&'a str>),
    Clear,
    History,
    Quit,
    Unknown(&'a str),
}

/// Parse a slash command.  Returns `None` for ordinary input.
pub fn parse_command(line: &str) -> Option<Command<'_>> {
    let line = line.trim();
    if line == "quit" || line == "exit" {
        return Some(Command::Quit);
    }
    let rest = line.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or("");
    let arg = parts.next();

    Some(match name {
        "help" | "h" | "?" => Command::Help,
        "tools" => Command::Tools,
        "enable" => Command::Enable(arg),
        "disable" => Command::Disable(arg),
        "provider" => Command::Provider(arg),
        "model" => Command::Model(arg),
        "clear" => Command::Clear,
        "history" => Command::History,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(name),
    })
}

const HELP: &str = "\
  Commands:
    /help              Show this help
    /tools             List tools and whether they are enabled
    /enable NAME       Enable a tool
    /disable NAME      Disable a tool
    /provider [NAME]   Show or switch the provider (conversation is kept)
    /model [ID]        Show or switch the model
    /clear             Forget the conversation
    /history           Show the conversation so far
    /quit              Exit";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// What the REPL loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// An interactive session: the agent plus what is needed to switch
/// providers.
pub struct Session {
    agent: Agent,
    config: AppConfig,
    stream: bool,
}

impl Session {
    pub fn new(agent: Agent, config: AppConfig, stream: bool) -> Self {
        Self {
            agent,
            config,
            stream,
        }
    }

    /// Run one turn, printing the answer.
    pub async fn ask(&mut self, input: &str) -> Result<()> {
        if self.stream {
            self.agent
                .stream_turn(input, |token: &str| {
                    print!("{token}");
                    io::stdout().flush().ok();
                })
                .await?;
            println!();
        } else {
            let answer = self.agent.turn(input).await?;
            println!("{answer}");
        }
        Ok(())
    }

    fn handle(&mut self, command: Command<'_>) -> Flow {
        match command {
            Command::Help => println!("{HELP}"),
            Command::Tools => {
                for name in self.agent.tool_names() {
                    let mark = if self.agent.is_tool_enabled(name) { "x" } else { " " };
                    println!("  [{mark}] {name}");
                }
            }
            Command::Enable(Some(name)) => self.toggle(name, true),
            Command::Disable(Some(name)) => self.toggle(name, false),
            Command::Enable(None) => println!("  Usage: /enable NAME"),
            Command::Disable(None) => println!("  Usage: /disable NAME"),
            Command::Provider(None) => {
                println!(
                    "  Provider: {} (configured: {})",
                    self.agent.provider_name(),
                    self.config.provider_names().join(", ")
                );
            }
            Command::Provider(Some(name)) => match create_named_provider(&self.config, name) {
                Ok(provider) => {
                    self.agent.set_provider(provider);
                    println!(
                        "  Switched to {name} ({}, model {})",
                        self.agent.provider_name(),
                        self.agent.model()
                    );
                }
                Err(e) => println!("  Error: {e}"),
            },
            Command::Model(None) => println!("  Model: {}", self.agent.model()),
            Command::Model(Some(model)) => {
                self.agent.set_model(model);
                println!("  Model set to {model}");
            }
            Command::Clear => {
                self.agent.clear();
                println!("  Conversation cleared.");
            }
            Command::History => {
                let history = format_history(self.agent.transcript());
                if history.is_empty() {
                    println!("  (no messages yet)");
                } else {
                    println!("{history}");
                }
            }
            Command::Quit => return Flow::Quit,
            Command::Unknown(name) => println!("  Unknown command /{name}. Try /help."),
        }
        Flow::Continue
    }

    fn toggle(&mut self, name: &str, enable: bool) {
        if !self.agent.tool_names().contains(&name) {
            println!("  No tool named {name}. Try /tools.");
            return;
        }
        let changed = if enable {
            self.agent.enable_tool(name)
        } else {
            self.agent.disable_tool(name)
        };
        let state = if enable { "enabled" } else { "disabled" };
        if changed {
            println!("  {name} {state}.");
        } else {
            println!("  {name} was already {state}.");
        }
    }
}

/// One line per message, long content cut to its first line.
pub fn format_history(transcript: &[ChatMessage]) -> String {
    transcript
        .iter()
        .map(|msg| {
            let label = match msg.role {
                Role::System => "system",
                Role::User => "you",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let mut line = format!("  {label}: {}", preview(&msg.content));
            if !msg.tool_calls.is_empty() {
                let names: Vec<&str> = msg.tool_calls.iter().map(|c| c.name.as_str()).collect();
                line.push_str(&format!(" [calls: {}]", names.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview(content: &str) -> String {
    const MAX: usize = 80;
    let first = content.lines().next().unwrap_or("");
    let cut = match first.char_indices().nth(MAX) {
        Some((end, _)) => &first[..end],
        None => first,
    };
    if cut.len() < content.trim_end().len() {
        format!("{cut}...")
    } else {
        cut.to_owned()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run a single turn and exit.
pub async fn run_once(agent: Agent, config: AppConfig, prompt: &str, stream: bool) -> Result<()> {
    let mut session = Session::new(agent, config, stream);
    session.ask(prompt).await.context("turn failed")
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run(agent: Agent, config: AppConfig, stream: bool) -> Result<()> {
    let mut session = Session::new(agent, config, stream);

    println!();
    println!("  codeloop v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Provider: {} | Model: {}",
        session.agent.provider_name(),
        session.agent.model()
    );
    println!("  Type your request, /help for commands, or /quit to exit.");
    println!();

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Interrupted. Goodbye!");
            std::process::exit(0);
        }
    });

    let stdin = io::stdin();
    let mut line_buf = String::new();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(command) = parse_command(trimmed) {
            if session.handle(command) == Flow::Quit {
                info!("user requested exit");
                break;
            }
            continue;
        }

        if let Err(e) = session.ask(trimmed).await {
            eprintln!("\n  Error: {e:#}");
        }
        println!();
    }

    info!("shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_agent::{ChatToolCall, ToolArguments};

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("fix the bug in main.rs"), None);
        assert_eq!(parse_command("  what is /tmp for?"), None);
    }

    #[test]
    fn commands_parse_with_optional_argument() {
        assert_eq!(parse_command("/help"), Some(Command::Help));
        assert_eq!(parse_command("/tools"), Some(Command::Tools));
        assert_eq!(parse_command("/enable remove"), Some(Command::Enable(Some("remove"))));
        assert_eq!(parse_command("/disable"), Some(Command::Disable(None)));
        assert_eq!(parse_command("/provider cloud"), Some(Command::Provider(Some("cloud"))));
        assert_eq!(parse_command("/model"), Some(Command::Model(None)));
        assert_eq!(parse_command("/clear"), Some(Command::Clear));
        assert_eq!(parse_command("/history"), Some(Command::History));
        assert_eq!(parse_command("/frobnicate x"), Some(Command::Unknown("frobnicate")));
    }

    #[test]
    fn quit_spellings() {
        for line in ["/quit", "/exit", "/q", "quit", "exit"] {
            assert_eq!(parse_command(line), Some(Command::Quit), "{line}");
        }
    }

    #[test]
    fn history_shows_roles_previews_and_calls() {
        let call = ChatToolCall::new("c1", "read_file", ToolArguments::new());
        let transcript = vec![
            ChatMessage::user("summarize a.txt"),
            ChatMessage::assistant_with_tool_calls("", vec![call]),
            ChatMessage::tool_result("c1", "line one\nline two"),
            ChatMessage::assistant("It has two lines."),
        ];
        assert_eq!(
            format_history(&transcript),
            "  you: summarize a.txt\n  assistant:  [calls: read_file]\n  tool: line one...\n  assistant: It has two lines."
        );
    }
}
