mod app;
mod cli;
mod domain;
mod infra;
mod ui;

use crate::app::{AppCommand, AppError, AppEvent, AppModel};
use crate::cli::{CliInvocation, DEFAULT_SNAPSHOT_SIZE, TuiConfig};
use crate::domain::ExecMessage;
use crate::infra::{ExecutionEngine, ProcessExecutor, init_logging, resolve_catalog};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind,
};
use crossterm::terminal::size as terminal_size;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, IsTerminal, Stdout, Write};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

fn main() {
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), AppError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Run(config) => run_tui(config),
    }
}

fn print_help() {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{}", crate::cli::help_text());
}

fn run_tui(config: TuiConfig) -> Result<(), AppError> {
    init_logging(config.log_file.as_deref())?;

    let (catalog, source) = resolve_catalog(config.catalog.as_deref())?;
    tracing::info!(
        source = %source.describe(),
        commands = catalog.len(),
        program = %config.program.display(),
        "catalog loaded"
    );

    let (tx, rx) = channel::<ExecMessage>();
    let executor = Arc::new(ProcessExecutor::new(config.program.clone()));
    let engine = ExecutionEngine::new(executor.clone(), executor, tx);

    let mut model = AppModel::new(Arc::new(catalog));
    let mut pending = AppCommand::None;
    if let Some(initial) = config.initial {
        (model, pending) = app::start_with_command(model, &initial.name, initial.args);
    }

    let snapshot = config
        .snapshot
        .or_else(|| (!io::stdout().is_terminal()).then_some(DEFAULT_SNAPSHOT_SIZE));
    if let Some((width, height)) = snapshot {
        return run_snapshot(model, pending, &engine, &rx, width, height);
    }

    let mut terminal = setup_terminal()?;
    if let Ok((width, height)) = terminal_size() {
        model = model.with_terminal_size(width, height);
    }
    perform(&engine, pending);
    let result = run(&mut terminal, model, &engine, &rx);
    restore_terminal(&mut terminal)?;
    result
}

/// Renders a single frame to stdout. An initial command is run to completion
/// first so the frame shows its result.
fn run_snapshot(
    model: AppModel,
    pending: AppCommand,
    engine: &ExecutionEngine,
    rx: &Receiver<ExecMessage>,
    width: u16,
    height: u16,
) -> Result<(), AppError> {
    let mut model = model.with_terminal_size(width, height);
    perform(engine, pending);

    while model.is_executing() {
        let Ok(message) = rx.recv() else {
            break;
        };
        (model, _) = app::update(model, AppEvent::Exec(message));
    }

    let text = crate::ui::render_to_text(&model, width, height)?;
    let mut out = io::stdout().lock();
    write!(out, "{text}")?;
    Ok(())
}

fn perform(engine: &ExecutionEngine, command: AppCommand) -> bool {
    match command {
        AppCommand::None => false,
        AppCommand::Quit => true,
        AppCommand::Execute {
            invocation,
            request,
        } => {
            engine.dispatch(invocation, request);
            false
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let _ = stdout.execute(EnableBracketedPaste);
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), AppError> {
    disable_raw_mode()?;
    let _ = execute!(terminal.backend_mut(), DisableBracketedPaste);
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    model: AppModel,
    engine: &ExecutionEngine,
    rx: &Receiver<ExecMessage>,
) -> Result<(), AppError> {
    let mut model = model;

    loop {
        while let Ok(message) = rx.try_recv() {
            (model, _) = app::update(model, AppEvent::Exec(message));
        }

        terminal.draw(|frame| crate::ui::render(frame, &model))?;

        if !event::poll(TICK)? {
            continue;
        }

        let event = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Release => continue,
            Event::Key(key) => AppEvent::Key(key),
            Event::Paste(text) => AppEvent::Paste(text),
            Event::Resize(width, height) => AppEvent::Resize(width, height),
            _ => continue,
        };

        let (next, command) = app::update(model, event);
        model = next;
        if perform(engine, command) {
            tracing::info!("quit");
            return Ok(());
        }
    }
}
