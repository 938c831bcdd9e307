//! `dandiclaw chat`: Interactive or single-message metadata editing.

use super::review::read_proposal;
use super::{pricing_table, read_json, write_json};
use dandiclaw_agent::{AgentEvent, AgentLoop, TurnOutcome, close_dangling_tool_calls};
use dandiclaw_config::AppConfig;
use dandiclaw_core::conversation::{ConversationAction, ConversationState};
use dandiclaw_core::message::ChatMessage;
use dandiclaw_patch::changes;
use dandiclaw_proposal::{build_link, validate};
use dandiclaw_providers::GatewayProvider;
use dandiclaw_telemetry::format_cost;
use dandiclaw_tools::{HttpSchemaSource, MetadataDocument, RequiredFieldsValidator, SchemaCache, default_registry};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Message(String),
    Revert(usize),
    Clear,
    Model(String),
    Cost,
    Link,
    Review(String),
    Reset,
    Save,
    Changes,
    History,
    Help,
    Exit,
    Empty,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("revert", arg) => arg
            .parse()
            .map(Input::Revert)
            .unwrap_or_else(|_| Input::Invalid("usage: /revert N".into())),
        ("model", "") => Input::Invalid("usage: /model MODEL".into()),
        ("model", model) => Input::Model(model.to_string()),
        ("clear", _) => Input::Clear,
        ("cost", _) => Input::Cost,
        ("link", _) => Input::Link,
        ("review", "") => Input::Invalid("usage: /review LINK".into()),
        ("review", link) => Input::Review(link.to_string()),
        ("reset", _) => Input::Reset,
        ("save", _) => Input::Save,
        ("changes", _) => Input::Changes,
        ("history", _) => Input::History,
        ("help", _) => Input::Help,
        ("exit" | "quit", _) => Input::Exit,
        (other, _) => Input::Invalid(format!("unknown command /{other}, try /help")),
    }
}

const HELP: &str = "\
  /changes      list pending edits
  /history      list messages with their index
  /revert N     drop every message after index N
  /clear        start the conversation over (edits are kept)
  /model M      switch model
  /cost         tokens and cost so far
  /link         print a review link for the pending edits
  /review LINK  apply someone else's proposal to the document
  /reset        discard every pending edit
  /save         write the edited metadata back to the file
  /exit         quit
  Ctrl+C cancels a running turn, or quits at the prompt.";

struct Session {
    agent: AgentLoop,
    state: ConversationState,
    document: MetadataDocument,
    file: PathBuf,
    dandiset: Option<String>,
    web_url: String,
    /// Ctrl+C presses, from one listener that lives as long as the session
    interrupts: mpsc::UnboundedReceiver<()>,
}

impl Session {
    fn new(
        config: &AppConfig,
        file: PathBuf,
        dandiset: Option<String>,
        interrupts: mpsc::UnboundedReceiver<()>,
    ) -> CliResult<Self> {
        let archive = config
            .active_archive()
            .ok_or_else(|| format!("Unknown archive `{}`", config.archive))?;
        let timeout = Duration::from_secs(config.gateway.timeout_secs);

        let provider = Arc::new(GatewayProvider::from_config(config)?);
        let schema = Arc::new(SchemaCache::new(Box::new(HttpSchemaSource::new(
            archive.schema_url.clone(),
            timeout,
        )?)));
        let validator = Arc::new(RequiredFieldsValidator::new(config.validation.required_fields.clone()));
        let tools = Arc::new(default_registry(schema, validator));
        let agent = AgentLoop::new(provider, tools, Arc::new(pricing_table(config)))
            .with_settings(&config.agent)
            .with_app(config.gateway.app.clone());

        Ok(Self {
            agent,
            state: ConversationState::new(config.effective_model()),
            document: MetadataDocument::new(read_json(&file)?),
            file,
            dandiset,
            web_url: archive.web_url.clone(),
            interrupts,
        })
    }

    /// Run the agent on one user message. A Ctrl+C cancels the turn.
    ///
    /// Returns `None` when the turn failed; the failure is already logged
    /// and recorded in the conversation.
    async fn send(&mut self, text: String) -> Option<TurnOutcome> {
        close_dangling_tool_calls(&mut self.state);
        self.state.apply(ConversationAction::Append(ChatMessage::user(text)));

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(render_events(rx));

        let result = {
            let run = self.agent.run(&mut self.state, &mut self.document, &tx, &cancel);
            tokio::pin!(run);
            loop {
                tokio::select! {
                    result = &mut run => break result,
                    Some(()) = self.interrupts.recv() => {
                        debug!("Interrupt received, cancelling turn");
                        cancel.cancel();
                    }
                }
            }
        };
        drop(tx);
        let _ = printer.await;

        // A press that raced the end of the turn must not end the session
        while self.interrupts.try_recv().is_ok() {}

        match result {
            Ok(TurnOutcome::Completed) => Some(TurnOutcome::Completed),
            Ok(TurnOutcome::Aborted) => {
                eprintln!("  [cancelled]");
                Some(TurnOutcome::Aborted)
            }
            Err(e) => {
                warn!(error = %e, "Turn failed");
                None
            }
        }
    }

    /// Validate a proposal against the working copy and take it over.
    ///
    /// Returns the number of changes applied.
    fn apply_review(&mut self, link: &str) -> CliResult<usize> {
        let proposal = read_proposal(link).ok_or("No proposal found in the link")?;
        let updated =
            validate(&proposal, self.document.current()).map_err(|e| format!("Proposal rejected: {e}"))?;
        let applied = changes(&proposal.delta).len();
        self.document.replace(updated);
        Ok(applied)
    }

    fn print_changes(&self) {
        let changes = self.document.changes();
        if changes.is_empty() {
            println!("  No pending changes.");
        }
        for change in changes {
            println!("  {change}");
        }
    }

    fn print_history(&self) {
        for (i, message) in self.state.messages().iter().enumerate() {
            let first_line = message.content().lines().next().unwrap_or("");
            let calls = message.tool_calls().len();
            if calls > 0 {
                println!("  {i:>3} {:<9} {first_line} [{calls} tool call(s)]", message.role().as_str());
            } else {
                println!("  {i:>3} {:<9} {first_line}", message.role().as_str());
            }
        }
    }

    fn link(&self) -> CliResult<Option<String>> {
        let dandiset = self
            .dandiset
            .as_deref()
            .ok_or("Start the session with --dandiset to build review links")?;
        match self.document.proposal() {
            Some(proposal) => Ok(Some(build_link(&self.web_url, dandiset, &proposal)?.to_string())),
            None => Ok(None),
        }
    }

    /// Handle one input line. Returns `false` when the session should end.
    async fn handle(&mut self, input: Input) -> CliResult<bool> {
        match input {
            Input::Empty => {}
            Input::Exit => return Ok(false),
            Input::Help => println!("{HELP}"),
            Input::Invalid(message) => println!("  {message}"),
            Input::Message(text) => {
                self.send(text).await;
            }
            Input::Revert(index) => {
                if index >= self.state.len() {
                    println!("  No message {index}; the conversation has {}.", self.state.len());
                } else {
                    self.state.apply(ConversationAction::RevertToIndex(index));
                    println!("  Kept messages 0..={index}.");
                }
            }
            Input::Clear => {
                self.state.apply(ConversationAction::Clear);
                println!("  Conversation cleared.");
            }
            Input::Model(model) => {
                println!("  Model: {model}");
                self.state.apply(ConversationAction::SetModel(model));
            }
            Input::Cost => {
                let usage = self.state.usage();
                println!(
                    "  {} prompt + {} completion tokens, {}",
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    format_cost(usage.cost_usd)
                );
            }
            Input::Link => match self.link() {
                Ok(Some(link)) => println!("  {link}"),
                Ok(None) => println!("  No pending changes."),
                Err(e) => println!("  {e}"),
            },
            Input::Review(link) => match self.apply_review(&link) {
                Ok(applied) => println!("  Applied {applied} change(s) from the proposal."),
                Err(e) => println!("  {e}"),
            },
            Input::Reset => {
                self.document.reset();
                println!("  Pending edits discarded.");
            }
            Input::Save => {
                write_json(&self.file, self.document.current())?;
                println!("  Saved {}", self.file.display());
            }
            Input::Changes => self.print_changes(),
            Input::History => self.print_history(),
        }
        Ok(true)
    }
}

pub async fn run(
    config: AppConfig,
    file: PathBuf,
    dandiset: Option<String>,
    message: Option<String>,
) -> CliResult<()> {
    if !config.has_api_key() {
        warn!("No gateway API key configured; requests are sent without credentials");
    }
    let mut session = Session::new(&config, file, dandiset, listen_for_interrupts())?;

    if let Some(message) = message {
        // Single message mode
        session.send(message).await;
        println!();
        session.print_changes();
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  DandiClaw interactive metadata editing");
    println!();
    println!("  File:      {}", session.file.display());
    println!("  Model:     {}", session.state.model());
    println!("  Tools:     {}", session.agent.tools().names().join(", "));
    println!();
    println!("  Type a message, or /help for commands.");
    println!();

    let mut lines = read_stdin_lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;
        let Some(input) = next_input(&mut lines, &mut session.interrupts).await else {
            println!();
            break;
        };
        if !session.handle(input).await? {
            break;
        }
    }

    if session.document.is_modified() {
        println!("  Unsaved changes were left in memory; use /save next time to keep them.");
    }
    println!();
    Ok(())
}

/// Forward every Ctrl+C for the rest of the process.
///
/// Once tokio owns SIGINT the default handler never runs again, so a single
/// listener serves both turn cancellation and quitting at the prompt.
fn listen_for_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn read_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Wait for the next input line. `None` ends the session: end of input or
/// Ctrl+C at the prompt.
async fn next_input(
    lines: &mut mpsc::UnboundedReceiver<String>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Option<Input> {
    tokio::select! {
        line = lines.recv() => line.map(|line| parse_input(&line)),
        Some(()) = interrupts.recv() => None,
    }
}

/// Print agent events as they arrive.
async fn render_events(mut rx: mpsc::UnboundedReceiver<AgentEvent>) {
    let mut shown = String::new();
    let mut stdout = std::io::stdout();

    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::Partial { content } => {
                match content.strip_prefix(shown.as_str()) {
                    Some(rest) if !shown.is_empty() => print!("{rest}"),
                    _ => print!("\n  Assistant > {content}"),
                }
                let _ = stdout.flush();
                shown = content;
            }
            AgentEvent::Notice { message } => eprintln!("\n  [{message}]"),
            AgentEvent::ToolCall { name, .. } => {
                end_line(&mut shown);
                eprintln!("  [tool] {name}");
            }
            AgentEvent::ToolResult { name, success, .. } => {
                eprintln!("  [tool] {name}: {}", if success { "ok" } else { "failed" });
            }
            AgentEvent::Done {
                prompt_tokens,
                completion_tokens,
                cost_usd,
                ..
            } => {
                end_line(&mut shown);
                eprintln!("  [{prompt_tokens} in / {completion_tokens} out, {}]", format_cost(cost_usd));
            }
            AgentEvent::Error { message } => {
                end_line(&mut shown);
                eprintln!("  [error] {message}");
            }
        }
    }
}

fn end_line(shown: &mut String) {
    if !shown.is_empty() {
        println!();
        shown.clear();
    }
}
