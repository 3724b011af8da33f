use std::cell::RefCell;
use std::io::{Stderr, Stdout};

use anyhow::Result;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::{DefaultHistory, History};
use rustyline::validate::Validator;
use rustyline::{Cmd, Context, Editor, Helper, KeyCode, KeyEvent, Modifiers};

use crate::chat::{ChatSession, Log, Notification, Notifier, SubmitOutcome};
use crate::core::{AppConfig, CredentialStore};
use crate::input::{
    AutosizeConfig, AutosizeController, InputSurface, Key, KeyAction, KeyPress, STARTER_PROMPTS,
    Submittable, key_action, starter_prompt,
};
use crate::openai::{Client, Role};
use crate::ui::{TerminalNotifier, TerminalRenderer};

type TerminalSession = ChatSession<Client, TerminalRenderer<Stdout>, TerminalNotifier<Stderr>>;

/// Past this height the prompt shows how many lines are being composed.
const MAX_INPUT_HEIGHT: u32 = 212;

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Help,
    SetKey(&'a str),
    Prompt(&'a str),
}

impl<'a> ReplCommand<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed == "/help" {
            return ReplCommand::Help;
        }
        if trimmed == "/key" {
            return ReplCommand::SetKey("");
        }
        if let Some(key) = trimmed.strip_prefix("/key ") {
            return ReplCommand::SetKey(key.trim());
        }
        ReplCommand::Prompt(starter_prompt(line).unwrap_or(line))
    }
}

/// Mirrors the line being edited into an [`InputSurface`] so its
/// observers follow every keystroke.
struct InputHelper {
    surface: RefCell<InputSurface>,
    autosize: AutosizeController,
    submittable: Submittable,
    max_height: u32,
}

impl InputHelper {
    fn new(config: AutosizeConfig, max_height: u32) -> Self {
        let surface = InputSurface::new();
        let autosize = AutosizeController::attach(&surface, config);
        let submittable = Submittable::attach(&surface);

        Self {
            surface: RefCell::new(surface),
            autosize,
            submittable,
            max_height,
        }
    }

    /// Records an edit and returns the line count hint once the input
    /// is taller than the maximum.
    fn edit(&self, line: &str) -> Option<String> {
        self.surface.borrow_mut().set_content(line);
        if self.autosize.height() <= self.max_height {
            return None;
        }
        let lines = self.surface.borrow().content().lines().count();
        Some(format!("  [{} lines]", lines))
    }

    /// Records the accepted line and returns whether it can be sent.
    fn accept(&self, line: &str) -> bool {
        self.surface.borrow_mut().set_content(line);
        self.submittable.get()
    }

    fn reset(&self) {
        self.surface.borrow_mut().clear();
    }
}

impl Hinter for InputHelper {
    type Hint = String;

    // Called on every refresh of the line, i.e. after each edit
    fn hint(&self, line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        self.edit(line)
    }
}

impl Completer for InputHelper {
    type Candidate = String;
}

impl Highlighter for InputHelper {}

impl Validator for InputHelper {}

impl Helper for InputHelper {}

/// Starter prompts are offered until the first turn is sent.
fn shows_starter_prompts(log: &Log) -> bool {
    log.iter().all(|entry| entry.role == Role::System)
}

fn bind_keys<H: Helper, I: History>(rl: &mut Editor<H, I>) {
    let bindings = [
        (KeyEvent(KeyCode::Enter, Modifiers::NONE), KeyPress::new(Key::Enter, false)),
        (KeyEvent(KeyCode::Enter, Modifiers::SHIFT), KeyPress::new(Key::Enter, true)),
        // Most terminals can't report shift+enter so alt+enter does the same
        (KeyEvent(KeyCode::Enter, Modifiers::ALT), KeyPress::new(Key::Enter, true)),
    ];
    for (event, press) in bindings {
        let cmd = match key_action(press) {
            KeyAction::Submit => Cmd::AcceptLine,
            KeyAction::InsertNewline => Cmd::Newline,
            KeyAction::Passthrough => continue,
        };
        rl.bind_sequence(event, cmd);
    }
}

fn print_help() {
    println!("Enter sends the message, Alt+Enter (or Shift+Enter) starts a new line.");
    println!("  /key <value>  set the API key");
    println!("  /1 ... /4     send a starter prompt");
    println!("  /help         show this message");
    println!("Ctrl-C or Ctrl-D exits.");
}

fn print_starter_prompts() {
    println!("Try one of these:");
    for (i, prompt) in STARTER_PROMPTS.iter().enumerate() {
        println!("  /{}  {}", i + 1, prompt);
    }
}

/// Saves the key and rebuilds the client with it.
fn set_api_key(session: &mut TerminalSession, store: &CredentialStore, config: &AppConfig, key: &str) {
    if key.is_empty() {
        return;
    }
    match store.save(key) {
        Ok(()) => {
            session.replace_transport(Client::new(&config.api_base_url, key));
            session
                .notifier()
                .notify(Notification::success("API key saved"));
        }
        Err(err) => {
            tracing::error!("Saving API key failed: {:?}", err);
            session
                .notifier()
                .notify(Notification::error(&format!("Could not save API key: {}", err)));
        }
    }
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let store = CredentialStore::new(&config.credentials_path());
    let api_key = store
        .load()?
        .or_else(|| config.fallback_api_key.clone())
        .unwrap_or_default();

    let mut session = ChatSession::new(
        Client::new(&config.api_base_url, &api_key),
        TerminalRenderer::stdout(),
        TerminalNotifier::stderr(),
        &config.model,
    );
    if let Some(system_message) = &config.system_message {
        session = session.with_system_message(system_message);
    }

    let mut rl = Editor::<InputHelper, DefaultHistory>::new()?;
    rl.set_helper(Some(InputHelper::new(
        AutosizeConfig::prompt(),
        MAX_INPUT_HEIGHT,
    )));
    bind_keys(&mut rl);

    tracing::info!(
        "Chatting with {} at {}",
        session.model(),
        session.transport().api_base_url()
    );
    if !session.transport().has_api_key() {
        session.notifier().notify(Notification::error(
            "No API key configured. Use /key <value> to set one.",
        ));
    }
    if shows_starter_prompts(&session.log()) {
        print_starter_prompts();
    }

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => match ReplCommand::parse(&line) {
                ReplCommand::Help => print_help(),
                ReplCommand::SetKey(key) => set_api_key(&mut session, &store, config, key),
                ReplCommand::Prompt(prompt) => {
                    if !rl.helper().is_some_and(|helper| helper.accept(prompt)) {
                        continue;
                    }
                    let _ = rl.add_history_entry(prompt);
                    if let Some(helper) = rl.helper() {
                        helper.reset();
                    }

                    if session.submit(prompt).await == SubmitOutcome::Completed {
                        println!();
                    }
                }
            },
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
