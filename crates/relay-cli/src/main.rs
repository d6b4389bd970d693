use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use relay_contracts::chat::{parse_chat_input, ChatInput, CHAT_HELP_COMMANDS};
use relay_contracts::events::EventWriter;
use relay_contracts::rules::{RuleIndex, RuleTarget};
use relay_contracts::session::{Role, Turn};
use relay_engine::{
    AssistantApi, ConfigOverrides, OpenAiAssistantsClient, RelayConfig, Session, TurnOrchestrator,
};

#[derive(Debug, Parser)]
#[command(name = "relay", version, about = "Chat with a hosted assistant from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat session.
    Chat(ChatArgs),
    /// Send one prompt and print the reply.
    Ask(AskArgs),
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    /// TOML file holding OPENAI_API_KEY and ASSISTANT_ID.
    #[arg(long)]
    secrets: Option<PathBuf>,
    #[arg(long)]
    assistant_id: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    poll_interval: Option<f64>,
    #[arg(long)]
    poll_timeout: Option<f64>,
    /// Leave timed-out runs running on the service.
    #[arg(long)]
    no_cancel_on_timeout: bool,
    /// Replace citation spans with numbered footnotes.
    #[arg(long)]
    citations: bool,
}

impl ConnectionArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_key: None,
            api_base: self.api_base.clone(),
            assistant_id: self.assistant_id.clone(),
            poll_interval_s: self.poll_interval,
            poll_timeout_s: self.poll_timeout,
            cancel_on_timeout: self.no_cancel_on_timeout.then_some(false),
            citations: self.citations.then_some(true),
            secrets_path: self.secrets.clone(),
        }
    }
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Mapping document loaded before the first prompt.
    #[arg(long)]
    rules: Option<PathBuf>,
    /// File uploaded before the first prompt; repeatable.
    #[arg(long = "upload")]
    uploads: Vec<PathBuf>,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    rules: Option<PathBuf>,
    #[arg(long = "upload")]
    uploads: Vec<PathBuf>,
    #[command(flatten)]
    connection: ConnectionArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("relay error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(args),
    }
}

fn open_session(
    out: &Path,
    events: Option<PathBuf>,
    connection: &ConnectionArgs,
) -> Result<(TurnOrchestrator, Session)> {
    fs::create_dir_all(out)
        .with_context(|| format!("failed creating output directory {}", out.display()))?;
    let config = RelayConfig::resolve(&connection.overrides())?;
    let events_path = events.unwrap_or_else(|| out.join("events.jsonl"));
    let api: Arc<dyn AssistantApi> = Arc::new(OpenAiAssistantsClient::from_config(&config));
    let orchestrator =
        TurnOrchestrator::new(api, config, EventWriter::new(events_path, Session::new_id()));
    let session = orchestrator.start_session();
    Ok((orchestrator, session))
}

fn preload(
    orchestrator: &TurnOrchestrator,
    session: &mut Session,
    rules: Option<&Path>,
    uploads: &[PathBuf],
) -> Result<()> {
    for path in uploads {
        let (name, remote_id) = upload_path(orchestrator, session, path, None)?;
        println!("Uploaded {name} as {remote_id}");
    }
    if let Some(path) = rules {
        let count = load_rules_path(orchestrator, session, path)?;
        println!("Loaded {count} rules from {}", path.display());
    }
    Ok(())
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let (orchestrator, mut session) = open_session(&args.out, args.events, &args.connection)?;
    preload(
        &orchestrator,
        &mut session,
        args.rules.as_deref(),
        &args.uploads,
    )?;

    let stdin = io::stdin();
    let mut line = String::new();

    println!("Relay chat started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        match parse_chat_input(input) {
            ChatInput::Noop => continue,
            ChatInput::Help => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            }
            ChatInput::Quit => break,
            ChatInput::LoadRules { path } => {
                match load_rules_path(&orchestrator, &mut session, Path::new(&path)) {
                    Ok(count) => println!("Loaded {count} rules from {path}"),
                    Err(err) => println!("Rules not loaded: {err:#}"),
                }
            }
            ChatInput::ShowRules => {
                for row in describe_rules(session.rules()) {
                    println!("{row}");
                }
            }
            ChatInput::Upload { path, name } => {
                match upload_path(&orchestrator, &mut session, Path::new(&path), name) {
                    Ok((name, remote_id)) => println!("Uploaded {name} as {remote_id}"),
                    Err(err) => println!("Upload failed: {err:#}"),
                }
            }
            ChatInput::ListFiles => {
                for row in describe_uploads(session.rules()) {
                    println!("{row}");
                }
            }
            ChatInput::MissingArgument { command } => {
                println!("/{command} requires a path");
            }
            ChatInput::Unknown { command, .. } => {
                println!("Unknown command /{command}. Type /help for commands.");
            }
            ChatInput::Utterance(text) => {
                let turn = orchestrator.handle_turn(&mut session, &text);
                let index = session.transcript().count(Role::Assistant);
                print_turn(&args.out, index, &turn)?;
            }
        }
    }

    finish(&orchestrator, &session, &args.out)
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let (orchestrator, mut session) = open_session(&args.out, args.events, &args.connection)?;
    preload(
        &orchestrator,
        &mut session,
        args.rules.as_deref(),
        &args.uploads,
    )?;

    let prompt = args.prompt.trim();
    if prompt.is_empty() {
        return Err(anyhow!("--prompt must not be empty"));
    }
    let turn = orchestrator.handle_turn(&mut session, prompt);
    print_turn(&args.out, 1, &turn)?;
    finish(&orchestrator, &session, &args.out)?;
    Ok(0)
}

fn finish(orchestrator: &TurnOrchestrator, session: &Session, out: &Path) -> Result<()> {
    let summary_path = out.join("summary.json");
    orchestrator.finish(session, &summary_path)?;
    println!("Session summary written to {}", summary_path.display());
    Ok(())
}

fn upload_path(
    orchestrator: &TurnOrchestrator,
    session: &mut Session,
    path: &Path,
    name: Option<String>,
) -> Result<(String, String)> {
    let name = match name.filter(|value| !value.trim().is_empty()) {
        Some(name) => name,
        None => path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("cannot derive a file name from {}", path.display()))?,
    };
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let remote_id = orchestrator.upload(session, &name, bytes)?;
    Ok((name, remote_id))
}

fn load_rules_path(
    orchestrator: &TurnOrchestrator,
    session: &mut Session,
    path: &Path,
) -> Result<usize> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading mapping document {}", path.display()))?;
    Ok(orchestrator.load_rules(session, &raw)?)
}

fn describe_rules(rules: &RuleIndex) -> Vec<String> {
    if rules.rules().is_empty() {
        return vec!["No rules loaded.".to_string()];
    }
    rules
        .rules()
        .iter()
        .enumerate()
        .map(|(idx, rule)| match &rule.target {
            RuleTarget::FileId(remote_id) => {
                format!("{}. \"{}\" -> {remote_id}", idx + 1, rule.match_text)
            }
            RuleTarget::FileName(name) => match rules.upload_id(name) {
                Some(remote_id) => {
                    format!("{}. \"{}\" -> {name} ({remote_id})", idx + 1, rule.match_text)
                }
                None => format!(
                    "{}. \"{}\" -> {name} (not uploaded)",
                    idx + 1,
                    rule.match_text
                ),
            },
        })
        .collect()
}

fn describe_uploads(rules: &RuleIndex) -> Vec<String> {
    let uploads = rules.uploads();
    if uploads.is_empty() {
        return vec!["No files uploaded.".to_string()];
    }
    uploads
        .iter()
        .map(|upload| format!("{} -> {}", upload.name, upload.remote_id))
        .collect()
}

fn print_turn(out: &Path, index: usize, turn: &Turn) -> Result<()> {
    println!("{}", turn.text);
    if let Some(path) = save_turn_image(out, index, turn)? {
        println!("Image: {}", path.display());
    }
    Ok(())
}

/// Writes the turn's image to `<out>/turn-<index>.<ext>`.
fn save_turn_image(out: &Path, index: usize, turn: &Turn) -> Result<Option<PathBuf>> {
    let Some(image) = turn.image.as_ref() else {
        return Ok(None);
    };
    let path = out.join(format!("turn-{index}.{}", image_extension(&image.bytes)));
    fs::write(&path, &image.bytes)
        .with_context(|| format!("failed writing image {}", path.display()))?;
    Ok(Some(path))
}

fn image_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}
