mod line_buffer;

use crate::domain::{
    Catalog, Command, CommandOption, ExecMessage, ExecOutcome, ExecRequest, InvocationId,
    OptionValues, Subcommand, build_args, seed_option_values, toggled,
};
use crate::infra::{InitLoggingError, LoadCatalogError};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::mem;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub use line_buffer::LineBuffer;

pub const WELCOME_TEXT: &str =
    "Welcome to nixai TUI! Select a command from the left panel to get started.";
pub const SELECT_PROMPT: &str = "Select a command to execute";
pub const EMPTY_QUESTION: &str = "Please enter a question.";

// Title bar plus status bar.
const BAR_ROWS: u16 = 2;
// Borders plus horizontal padding of a panel.
const PANEL_CHROME_COLS: u16 = 4;

/// Width of the commands column next to the output panel.
pub const LIST_COLUMN_PERCENT: u16 = 40;
/// Width of each side column in the subcommand and options layouts.
pub const SIDE_COLUMN_PERCENT: u16 = 30;

pub fn percent_of(total: u16, percent: u16) -> u16 {
    u16::try_from(u32::from(total) * u32::from(percent) / 100).unwrap_or(total)
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    LoadCatalog(#[from] LoadCatalogError),

    #[error(transparent)]
    InitLogging(#[from] InitLoggingError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavigationState {
    CommandList,
    SubcommandSelection,
    CommandOptions,
    Executing,
    Results,
}

impl NavigationState {
    pub fn label(self) -> &'static str {
        match self {
            Self::CommandList => "command list",
            Self::SubcommandSelection => "subcommand selection",
            Self::CommandOptions => "command options",
            Self::Executing => "executing",
            Self::Results => "results",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Focus {
    Commands,
    Subcommands,
    Options,
    Output,
    Input,
}

impl Focus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Commands => "Commands",
            Self::Subcommands => "Subcommands",
            Self::Options => "Options",
            Self::Output => "Output",
            Self::Input => "Input",
        }
    }
}

/// Text-entry sub-mode. At most one buffer exists at a time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum InputMode {
    #[default]
    None,
    Searching(LineBuffer),
    EnteringParameter {
        option: usize,
        buffer: LineBuffer,
    },
    /// Free text appended as the last argument of a `needs_input` command.
    EnteringQuestion(LineBuffer),
}

impl InputMode {
    pub fn is_text_entry(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One selectable row of the options panel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OptionRow {
    Option(usize),
    Execute,
}

/// Catalog position of the command (and subcommand) being configured.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OptionsTarget {
    pub command: usize,
    pub subcommand: Option<usize>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutputScroll {
    pub offset: usize,
    pub follow: bool,
}

impl OutputScroll {
    pub fn top() -> Self {
        Self {
            offset: 0,
            follow: false,
        }
    }

    pub fn follow() -> Self {
        Self {
            offset: 0,
            follow: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppModel {
    pub catalog: Arc<Catalog>,
    pub navigation: NavigationState,
    pub focus: Focus,
    /// Index into the filtered command list, not the catalog.
    pub selected_command: usize,
    pub selected_subcommand: usize,
    /// Index into `option_rows()`.
    pub selected_option: usize,
    pub filter_query: String,
    pub input: InputMode,
    pub options_target: Option<OptionsTarget>,
    pub option_values: OptionValues,
    pub output_text: String,
    pub streaming_lines: Vec<String>,
    pub is_streaming: bool,
    pub active_invocation: Option<InvocationId>,
    pub last_invocation: InvocationId,
    pub running_command: Option<String>,
    pub dispatched_at: Option<Instant>,
    pub scroll: OutputScroll,
    pub notice: Option<String>,
    pub help_open: bool,
    pub terminal_size: (u16, u16),
}

impl AppModel {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            navigation: NavigationState::CommandList,
            focus: Focus::Commands,
            selected_command: 0,
            selected_subcommand: 0,
            selected_option: 0,
            filter_query: String::new(),
            input: InputMode::None,
            options_target: None,
            option_values: OptionValues::new(),
            output_text: WELCOME_TEXT.to_string(),
            streaming_lines: Vec::new(),
            is_streaming: false,
            active_invocation: None,
            last_invocation: InvocationId::default(),
            running_command: None,
            dispatched_at: None,
            scroll: OutputScroll::top(),
            notice: None,
            help_open: false,
            terminal_size: (0, 0),
        }
    }

    pub fn with_terminal_size(mut self, width: u16, height: u16) -> Self {
        self.terminal_size = (width, height);
        self
    }

    pub fn with_notice(mut self, notice: Option<String>) -> Self {
        self.notice = notice;
        self
    }

    pub fn is_executing(&self) -> bool {
        self.navigation == NavigationState::Executing
    }

    /// The query the command list is filtered by right now: the live search
    /// buffer while typing, otherwise the committed filter.
    pub fn active_query(&self) -> &str {
        match &self.input {
            InputMode::Searching(buffer) => buffer.as_str(),
            _ => &self.filter_query,
        }
    }

    pub fn filtered_indices(&self) -> Vec<usize> {
        self.catalog.filter_indices(self.active_query())
    }

    pub fn filtered_commands(&self) -> Vec<&Command> {
        self.catalog.filter(self.active_query())
    }

    pub fn selected_catalog_index(&self) -> Option<usize> {
        self.filtered_indices().get(self.selected_command).copied()
    }

    pub fn selected_command(&self) -> Option<&Command> {
        self.selected_catalog_index()
            .and_then(|index| self.catalog.get(index))
    }

    pub fn target_command(&self) -> Option<&Command> {
        self.options_target
            .and_then(|target| self.catalog.get(target.command))
    }

    pub fn target_subcommand(&self) -> Option<&Subcommand> {
        let target = self.options_target?;
        let command = self.catalog.get(target.command)?;
        target
            .subcommand
            .and_then(|index| command.subcommands.get(index))
    }

    pub fn target_options(&self) -> &[CommandOption] {
        if let Some(subcommand) = self.target_subcommand() {
            return &subcommand.options;
        }
        self.target_command()
            .map(|command| command.options.as_slice())
            .unwrap_or(&[])
    }

    pub fn target_label(&self) -> String {
        match (self.target_command(), self.target_subcommand()) {
            (Some(command), Some(subcommand)) => format!("{} {}", command.name, subcommand.name),
            (Some(command), None) => command.name.clone(),
            _ => String::new(),
        }
    }

    pub fn option_rows(&self) -> Vec<OptionRow> {
        let mut rows = (0..self.target_options().len())
            .map(OptionRow::Option)
            .collect::<Vec<_>>();
        rows.push(OptionRow::Execute);
        rows
    }

    pub fn selected_row(&self) -> Option<OptionRow> {
        self.option_rows().get(self.selected_option).copied()
    }

    /// Rows the output panel can show, derived from the terminal height.
    pub fn output_viewport_rows(&self) -> usize {
        let main = self.terminal_size.1.saturating_sub(BAR_ROWS);
        let panel = if self.navigation == NavigationState::CommandOptions {
            main - main / 2
        } else {
            main
        };
        usize::from(panel.saturating_sub(2)).max(1)
    }

    /// Columns the output panel wraps its text to.
    pub fn output_viewport_width(&self) -> u16 {
        let width = self.terminal_size.0;
        let panel = match self.navigation {
            NavigationState::SubcommandSelection => {
                width.saturating_sub(percent_of(width, SIDE_COLUMN_PERCENT) * 2)
            }
            NavigationState::CommandOptions => {
                width.saturating_sub(percent_of(width, SIDE_COLUMN_PERCENT))
            }
            NavigationState::CommandList | NavigationState::Executing | NavigationState::Results => {
                width.saturating_sub(percent_of(width, LIST_COLUMN_PERCENT))
            }
        };
        panel.saturating_sub(PANEL_CHROME_COLS)
    }

    fn output_max_offset(&self) -> usize {
        crate::ui::output_rows(&self.output_text, self.output_viewport_width())
            .saturating_sub(self.output_viewport_rows())
    }
}

#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    Resize(u16, u16),
    Exec(ExecMessage),
}

#[derive(Clone, Debug)]
pub enum AppCommand {
    None,
    Quit,
    Execute {
        invocation: InvocationId,
        request: ExecRequest,
    },
}

pub fn update(model: AppModel, event: AppEvent) -> (AppModel, AppCommand) {
    match event {
        AppEvent::Key(key) => update_on_key(model, key),
        AppEvent::Paste(text) => (update_on_paste(model, &text), AppCommand::None),
        AppEvent::Resize(width, height) => {
            (model.with_terminal_size(width, height), AppCommand::None)
        }
        AppEvent::Exec(message) => (apply_exec_message(model, message), AppCommand::None),
    }
}

/// Selects `name` and dispatches it with `args` exactly as given.
pub fn start_with_command(model: AppModel, name: &str, args: Vec<String>) -> (AppModel, AppCommand) {
    let Some(index) = model.catalog.position(name) else {
        return (
            model.with_notice(Some(format!("Unknown command: {name}"))),
            AppCommand::None,
        );
    };

    let mut model = model;
    model.filter_query.clear();
    model.selected_command = index;
    dispatch(model, ExecRequest::new(name, None, args))
}

fn is_ctrl(key: &KeyEvent, ch: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(ch)
}

fn is_text_input(key: &KeyEvent, ch: char) -> bool {
    !key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
        && !ch.is_control()
}

fn update_on_key(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    model.notice = None;

    if is_ctrl(&key, 'c') {
        return (model, AppCommand::Quit);
    }

    if model.help_open {
        if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1) | KeyCode::Esc) {
            model.help_open = false;
        }
        return (model, AppCommand::None);
    }

    if model.input.is_text_entry() {
        return update_text_entry(model, key);
    }

    update_navigation(model, key)
}

fn update_navigation(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('r') if ctrl => {
            if model.navigation == NavigationState::CommandOptions {
                return execute_target(model);
            }
            (model, AppCommand::None)
        }
        KeyCode::Char('k') if ctrl => (move_selection(model, -1), AppCommand::None),
        KeyCode::Char('j') if ctrl => (move_selection(model, 1), AppCommand::None),
        KeyCode::Char('h') if ctrl => (focus_left(model), AppCommand::None),
        KeyCode::Char('l') if ctrl => (focus_right(model), AppCommand::None),
        _ if ctrl => (model, AppCommand::None),
        KeyCode::Char('q') => (model, AppCommand::Quit),
        KeyCode::Char('?') | KeyCode::F(1) => {
            model.help_open = true;
            (model, AppCommand::None)
        }
        KeyCode::Char('/') => (start_search(model), AppCommand::None),
        KeyCode::Up => (move_selection(model, -1), AppCommand::None),
        KeyCode::Down => (move_selection(model, 1), AppCommand::None),
        KeyCode::Left => (focus_left(model), AppCommand::None),
        KeyCode::Right => (focus_right(model), AppCommand::None),
        KeyCode::PageUp => {
            let page = model.output_viewport_rows() as isize;
            (scroll_output_if_focused(model, -page), AppCommand::None)
        }
        KeyCode::PageDown => {
            let page = model.output_viewport_rows() as isize;
            (scroll_output_if_focused(model, page), AppCommand::None)
        }
        KeyCode::Home => {
            if model.focus == Focus::Output {
                model.scroll = OutputScroll::top();
            }
            (model, AppCommand::None)
        }
        KeyCode::End => {
            if model.focus == Focus::Output {
                model.scroll = OutputScroll::follow();
            }
            (model, AppCommand::None)
        }
        KeyCode::Tab => (cycle_focus(model), AppCommand::None),
        KeyCode::Enter => handle_enter(model),
        KeyCode::Esc => (handle_escape(model), AppCommand::None),
        _ => (model, AppCommand::None),
    }
}

fn step_index(index: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    if delta < 0 {
        index.saturating_sub(delta.unsigned_abs())
    } else {
        index.saturating_add(delta.unsigned_abs()).min(len - 1)
    }
}

fn move_selection(model: AppModel, delta: isize) -> AppModel {
    let mut model = model;
    match (model.navigation, model.focus) {
        (NavigationState::CommandList, Focus::Commands) => {
            let len = model.filtered_indices().len();
            model.selected_command = step_index(model.selected_command, delta, len);
        }
        (NavigationState::SubcommandSelection, Focus::Subcommands) => {
            let len = model
                .selected_command()
                .map(|command| command.subcommands.len())
                .unwrap_or(0);
            model.selected_subcommand = step_index(model.selected_subcommand, delta, len);
        }
        (NavigationState::CommandOptions, Focus::Options) => {
            let len = model.option_rows().len();
            model.selected_option = step_index(model.selected_option, delta, len);
        }
        (_, Focus::Output) => return scroll_output(model, delta),
        _ => {}
    }
    model
}

fn scroll_output_if_focused(model: AppModel, delta: isize) -> AppModel {
    if model.focus == Focus::Output {
        scroll_output(model, delta)
    } else {
        model
    }
}

fn scroll_output(model: AppModel, delta: isize) -> AppModel {
    let mut model = model;
    let max = model.output_max_offset();
    let current = if model.scroll.follow {
        max
    } else {
        model.scroll.offset.min(max)
    };
    let next = if delta < 0 {
        current.saturating_sub(delta.unsigned_abs())
    } else {
        current.saturating_add(delta.unsigned_abs()).min(max)
    };

    if next != current {
        model.scroll = OutputScroll {
            offset: next,
            follow: false,
        };
    }
    model
}

fn focus_left(model: AppModel) -> AppModel {
    let mut model = model;
    if matches!(
        model.navigation,
        NavigationState::CommandList
            | NavigationState::SubcommandSelection
            | NavigationState::CommandOptions
    ) {
        model.focus = Focus::Commands;
    }
    model
}

fn focus_right(model: AppModel) -> AppModel {
    let mut model = model;
    model.focus = match model.navigation {
        NavigationState::CommandList => Focus::Output,
        NavigationState::SubcommandSelection => Focus::Subcommands,
        NavigationState::CommandOptions => Focus::Options,
        NavigationState::Executing | NavigationState::Results => model.focus,
    };
    model
}

fn cycle_focus(model: AppModel) -> AppModel {
    let mut model = model;
    model.focus = match (model.navigation, model.focus) {
        (NavigationState::CommandList, Focus::Commands) => Focus::Output,
        (NavigationState::CommandList, _) => Focus::Commands,
        (NavigationState::SubcommandSelection, Focus::Commands) => Focus::Subcommands,
        (NavigationState::SubcommandSelection, Focus::Subcommands) => Focus::Output,
        (NavigationState::SubcommandSelection, _) => Focus::Commands,
        (NavigationState::CommandOptions, Focus::Commands) => Focus::Options,
        (NavigationState::CommandOptions, Focus::Options) => Focus::Output,
        (NavigationState::CommandOptions, _) => Focus::Commands,
        (NavigationState::Executing, focus) => focus,
        (NavigationState::Results, _) => return return_to_list(model),
    };
    model
}

fn start_search(model: AppModel) -> AppModel {
    let mut model = model;
    if model.navigation == NavigationState::CommandList && model.focus == Focus::Commands {
        model.input = InputMode::Searching(LineBuffer::from_text(&model.filter_query));
        model.selected_command = 0;
    }
    model
}

fn handle_enter(model: AppModel) -> (AppModel, AppCommand) {
    match (model.navigation, model.focus) {
        (NavigationState::CommandList, Focus::Commands) => enter_selected_command(model),
        (NavigationState::SubcommandSelection, Focus::Subcommands) => {
            enter_selected_subcommand(model)
        }
        (NavigationState::CommandOptions, Focus::Options) => activate_option_row(model),
        (NavigationState::CommandOptions, Focus::Commands) => execute_target(model),
        (NavigationState::Results, _) => (return_to_list(model), AppCommand::None),
        _ => (model, AppCommand::None),
    }
}

fn handle_escape(model: AppModel) -> AppModel {
    let mut model = model;
    match model.navigation {
        NavigationState::CommandList => {
            if !model.filter_query.is_empty() {
                model.filter_query.clear();
                model.selected_command = 0;
            }
            model
        }
        NavigationState::SubcommandSelection => {
            model.navigation = NavigationState::CommandList;
            model.focus = Focus::Commands;
            model.selected_subcommand = 0;
            set_output(&mut model, SELECT_PROMPT.to_string());
            model
        }
        NavigationState::CommandOptions => leave_options(model),
        NavigationState::Executing => model,
        NavigationState::Results => return_to_list(model),
    }
}

fn return_to_list(model: AppModel) -> AppModel {
    let mut model = model;
    model.navigation = NavigationState::CommandList;
    model.focus = Focus::Commands;
    model.running_command = None;
    set_output(&mut model, SELECT_PROMPT.to_string());
    model
}

fn set_output(model: &mut AppModel, text: String) {
    model.output_text = text;
    model.scroll = OutputScroll::top();
}

fn subcommand_instructions(command: &str) -> String {
    format!(
        "Select a subcommand for '{command}'\n\nInstructions:\n• Use ↑↓ to navigate subcommands\n• Press Enter to select a subcommand\n• Press Esc to go back"
    )
}

fn options_instructions(label: &str) -> String {
    format!(
        "Configure options for '{label}' command\n\nInstructions:\n• Use Tab to switch between panels\n• Use ↑↓ to navigate options\n• Press Enter on an option to configure it\n• Press Enter on command panel to execute with current options"
    )
}

fn enter_selected_command(model: AppModel) -> (AppModel, AppCommand) {
    let mut model = model;
    let catalog = Arc::clone(&model.catalog);
    let Some(index) = model.selected_catalog_index() else {
        return (model, AppCommand::None);
    };
    let Some(command) = catalog.get(index) else {
        return (model, AppCommand::None);
    };

    if !command.subcommands.is_empty() {
        model.navigation = NavigationState::SubcommandSelection;
        model.focus = Focus::Subcommands;
        model.selected_subcommand = 0;
        set_output(&mut model, subcommand_instructions(&command.name));
        return (model, AppCommand::None);
    }

    if !command.options.is_empty() {
        let target = OptionsTarget {
            command: index,
            subcommand: None,
        };
        return (open_options(model, target), AppCommand::None);
    }

    dispatch(model, ExecRequest::new(&command.name, None, Vec::new()))
}

fn enter_selected_subcommand(model: AppModel) -> (AppModel, AppCommand) {
    let catalog = Arc::clone(&model.catalog);
    let Some(index) = model.selected_catalog_index() else {
        return (model, AppCommand::None);
    };
    let Some(command) = catalog.get(index) else {
        return (model, AppCommand::None);
    };
    let Some(subcommand) = command.subcommands.get(model.selected_subcommand) else {
        return (model, AppCommand::None);
    };

    if !subcommand.options.is_empty() {
        let target = OptionsTarget {
            command: index,
            subcommand: Some(model.selected_subcommand),
        };
        return (open_options(model, target), AppCommand::None);
    }

    dispatch(
        model,
        ExecRequest::new(&command.name, Some(&subcommand.name), Vec::new()),
    )
}

/// Enters `CommandOptions`, writing every non-empty default before any key
/// is processed.
fn open_options(model: AppModel, target: OptionsTarget) -> AppModel {
    let mut model = model;
    model.options_target = Some(target);
    model.option_values = seed_option_values(model.target_options());
    model.navigation = NavigationState::CommandOptions;
    model.focus = Focus::Options;
    model.selected_option = 0;
    let instructions = options_instructions(&model.target_label());
    set_output(&mut model, instructions);
    model
}

fn leave_options(model: AppModel) -> AppModel {
    let mut model = model;
    let parent = model
        .target_command()
        .filter(|command| !command.subcommands.is_empty())
        .map(|command| command.name.clone());

    model.option_values.clear();
    model.selected_option = 0;
    model.options_target = None;

    match parent {
        Some(name) => {
            model.navigation = NavigationState::SubcommandSelection;
            model.focus = Focus::Subcommands;
            set_output(&mut model, subcommand_instructions(&name));
        }
        None => {
            model.navigation = NavigationState::CommandList;
            model.focus = Focus::Commands;
            set_output(&mut model, SELECT_PROMPT.to_string());
        }
    }
    model
}

fn activate_option_row(model: AppModel) -> (AppModel, AppCommand) {
    let mut model = model;
    let Some(row) = model.selected_row() else {
        return (model, AppCommand::None);
    };
    let index = match row {
        OptionRow::Execute => return execute_target(model),
        OptionRow::Option(index) => index,
    };
    let Some(option) = model.target_options().get(index).cloned() else {
        return (model, AppCommand::None);
    };

    if option.is_bool() {
        let value = toggled(model.option_values.get(&option.flag).map(String::as_str));
        model
            .option_values
            .insert(option.flag.clone(), value.to_string());
        set_output(&mut model, format!("Toggled '{}' to: {value}", option.name));
        return (model, AppCommand::None);
    }

    let current = model
        .option_values
        .get(&option.flag)
        .map(String::as_str)
        .unwrap_or("");
    model.input = InputMode::EnteringParameter {
        option: index,
        buffer: LineBuffer::from_text(current),
    };
    model.focus = Focus::Input;
    set_output(
        &mut model,
        format!(
            "Entering input mode for '{}'. Type your value and press Enter to confirm.",
            option.name
        ),
    );
    (model, AppCommand::None)
}

pub fn question_prompt(command: &str) -> String {
    format!("Enter your question for nixai {command}:")
}

/// Dispatches the configured target with the arguments built from the
/// current option values. Commands that need input ask for it first.
fn execute_target(model: AppModel) -> (AppModel, AppCommand) {
    let mut model = model;
    let Some(command) = model.target_command() else {
        return (model, AppCommand::None);
    };

    if command.needs_input {
        let prompt = question_prompt(&command.name);
        model.input = InputMode::EnteringQuestion(LineBuffer::new());
        model.focus = Focus::Input;
        set_output(&mut model, prompt);
        return (model, AppCommand::None);
    }

    dispatch_target(model, None)
}

fn dispatch_target(model: AppModel, question: Option<String>) -> (AppModel, AppCommand) {
    let Some(command) = model.target_command() else {
        return (model, AppCommand::None);
    };
    let subcommand = model.target_subcommand().map(|sub| sub.name.as_str());
    let mut args = build_args(model.target_options(), &model.option_values);
    args.extend(question);

    let request = ExecRequest::new(&command.name, subcommand, args);
    dispatch(model, request)
}

fn dispatch(model: AppModel, request: ExecRequest) -> (AppModel, AppCommand) {
    let mut model = model;
    if model.is_executing() {
        return (model, AppCommand::None);
    }

    let invocation = model.last_invocation.next();
    let command_line = request.command_line();

    model.last_invocation = invocation;
    model.active_invocation = Some(invocation);
    model.navigation = NavigationState::Executing;
    model.focus = Focus::Output;
    model.input = InputMode::None;
    model.options_target = None;
    model.option_values.clear();
    model.selected_option = 0;
    model.is_streaming = false;
    model.streaming_lines.clear();
    model.output_text = format!("$ {command_line}");
    model.running_command = Some(command_line);
    model.dispatched_at = Some(Instant::now());
    model.scroll = OutputScroll::follow();

    (model, AppCommand::Execute { invocation, request })
}

fn update_text_entry(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    match key.code {
        KeyCode::Esc => (cancel_text_entry(model), AppCommand::None),
        KeyCode::Enter => commit_text_entry(model),
        KeyCode::Backspace => {
            edit_text(&mut model, |buffer| {
                buffer.pop();
            });
            (model, AppCommand::None)
        }
        KeyCode::Char(ch) if is_text_input(&key, ch) => {
            edit_text(&mut model, |buffer| buffer.push(ch));
            (model, AppCommand::None)
        }
        _ => (model, AppCommand::None),
    }
}

fn update_on_paste(model: AppModel, text: &str) -> AppModel {
    let mut model = model;
    if !model.help_open {
        edit_text(&mut model, |buffer| buffer.push_str(text));
    }
    model
}

fn edit_text(model: &mut AppModel, edit: impl FnOnce(&mut LineBuffer)) {
    match &mut model.input {
        InputMode::None => {}
        InputMode::Searching(buffer) => {
            edit(buffer);
            model.selected_command = 0;
        }
        InputMode::EnteringParameter { buffer, .. } | InputMode::EnteringQuestion(buffer) => {
            edit(buffer)
        }
    }
}

fn cancel_text_entry(model: AppModel) -> AppModel {
    let mut model = model;
    match mem::take(&mut model.input) {
        InputMode::None => {}
        InputMode::Searching(_) => {
            model.filter_query.clear();
            model.selected_command = 0;
        }
        InputMode::EnteringParameter { .. } => {
            model.focus = Focus::Options;
        }
        InputMode::EnteringQuestion(_) => {
            model.focus = Focus::Options;
            let instructions = options_instructions(&model.target_label());
            set_output(&mut model, instructions);
        }
    }
    model
}

fn commit_text_entry(model: AppModel) -> (AppModel, AppCommand) {
    let mut model = model;
    match mem::take(&mut model.input) {
        InputMode::None => (model, AppCommand::None),
        InputMode::Searching(buffer) => {
            model.filter_query = buffer.into_text();
            model.selected_command = 0;
            (model, AppCommand::None)
        }
        InputMode::EnteringParameter { option, buffer } => {
            model.focus = Focus::Options;
            if let Some(option) = model.target_options().get(option).cloned() {
                let value = buffer.into_text();
                set_output(&mut model, format!("Set '{}' to: {value}", option.name));
                model.option_values.insert(option.flag, value);
            }
            (model, AppCommand::None)
        }
        InputMode::EnteringQuestion(buffer) => {
            let question = buffer.as_str().trim().to_string();
            if question.is_empty() {
                model.input = InputMode::EnteringQuestion(buffer);
                set_output(&mut model, EMPTY_QUESTION.to_string());
                return (model, AppCommand::None);
            }
            dispatch_target(model, Some(question))
        }
    }
}

fn apply_exec_message(model: AppModel, message: ExecMessage) -> AppModel {
    let mut model = model;
    let invocation = message.invocation();
    if model.active_invocation != Some(invocation) {
        tracing::debug!(%invocation, "discarding stale execution message");
        return model;
    }

    let command_line = model.running_command.clone().unwrap_or_default();
    match message {
        ExecMessage::Started { command_line, .. } => {
            let echo = format!("$ {command_line}");
            model.is_streaming = true;
            model.output_text = echo.clone();
            model.streaming_lines = vec![echo];
        }
        ExecMessage::Chunk { line, .. } => {
            if !model.is_streaming {
                tracing::debug!(%invocation, "discarding chunk outside a stream");
                return model;
            }
            model.output_text.push('\n');
            model.output_text.push_str(&line);
            model.streaming_lines.push(line);
        }
        ExecMessage::StreamEnd { error, .. } => {
            let (summary, outcome) = match error {
                None => (
                    format!("✅ Command '{command_line}' completed successfully"),
                    "success",
                ),
                Some(error) => (format!("❌ Command '{command_line}' failed: {error}"), "error"),
            };
            model.output_text.push('\n');
            model.output_text.push_str(&summary);
            model.streaming_lines.push(summary);
            model.is_streaming = false;
            finish_invocation(&mut model, invocation, outcome);
        }
        ExecMessage::Finished { result, .. } => {
            let (text, outcome) = format_outcome(&command_line, result);
            set_output(&mut model, text);
            finish_invocation(&mut model, invocation, outcome);
        }
    }
    model
}

fn format_outcome(command_line: &str, result: Result<ExecOutcome, String>) -> (String, &'static str) {
    match result {
        Ok(ExecOutcome::Output(text)) if text.trim().is_empty() => (
            format!("✅ Command '{command_line}' executed successfully (no output)"),
            "empty",
        ),
        Ok(ExecOutcome::Output(text)) => (text, "success"),
        Ok(ExecOutcome::NotHandled) => (
            format!(
                "Command '{command_line}' not yet implemented.\n\nUse 'help' to see available commands."
            ),
            "not handled",
        ),
        Err(error) => (
            format!("❌ Error executing command '{command_line}': {error}"),
            "error",
        ),
    }
}

fn finish_invocation(model: &mut AppModel, invocation: InvocationId, outcome: &str) {
    let elapsed_ms = model
        .dispatched_at
        .take()
        .map(|started| u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default();
    tracing::info!(%invocation, outcome, elapsed_ms, "execution finished");

    model.active_invocation = None;
    model.navigation = NavigationState::Results;
    model.focus = Focus::Output;
}




#[cfg(test)]
mod execution_tests {
    use super::test_support::*;
    use super::*;

    fn dispatched(name: &str) -> (AppModel, InvocationId) {
        let (model, cmd) = press(select(model(), name), KeyCode::Enter);
        let (invocation, _) = expect_execute(cmd);
        (model, invocation)
    }

    fn finished(model: AppModel, invocation: InvocationId, result: Result<ExecOutcome, String>) -> AppModel {
        exec(model, ExecMessage::Finished { invocation, result })
    }

    fn stream_validate() -> (AppModel, InvocationId) {
        let model = key(select(model(), "flake"), KeyCode::Enter);
        let (model, cmd) = press(model, KeyCode::Enter);
        let (invocation, request) = expect_execute(cmd);
        assert_eq!(request.mode(), crate::domain::ExecMode::Streaming);
        let model = exec(
            model,
            ExecMessage::Started {
                invocation,
                command_line: request.command_line(),
            },
        );
        (model, invocation)
    }

    #[test]
    fn empty_buffered_output_shows_success_text() {
        let (model, invocation) = dispatched("config");
        let next = finished(model, invocation, Ok(ExecOutcome::Output(String::new())));

        assert_eq!(next.navigation, NavigationState::Results);
        assert_eq!(next.focus, Focus::Output);
        assert!(!next.is_executing());
        assert_eq!(next.active_invocation, None);
        assert_eq!(
            next.output_text,
            "✅ Command 'config' executed successfully (no output)"
        );
    }

    #[test]
    fn buffered_output_replaces_the_panel_and_opens_at_top() {
        let (model, invocation) = dispatched("config");
        let next = finished(model, invocation, Ok(ExecOutcome::Output("a\nb".to_string())));
        assert_eq!(next.output_text, "a\nb");
        assert_eq!(next.scroll, OutputScroll::top());
    }

    #[test]
    fn wrapped_buffered_result_scrolls_through_every_row() {
        let (model, invocation) = dispatched("config");
        let model = model.with_terminal_size(100, 12);
        let text = (0..8)
            .map(|n| format!("line-{n} {}", "word ".repeat(30).trim_end()))
            .collect::<Vec<_>>()
            .join("\n");
        let model = finished(model, invocation, Ok(ExecOutcome::Output(text)));
        assert_eq!(model.focus, Focus::Output);
        assert_eq!(model.scroll, OutputScroll::top());

        let down = key(model, KeyCode::Down);
        assert_eq!(down.scroll.offset, 1);

        let bottom = (0..10).fold(down, |model, _| key(model, KeyCode::PageDown));
        let rows = crate::ui::output_rows(&bottom.output_text, bottom.output_viewport_width());
        assert!(rows > 8, "long lines should wrap, got {rows} rows");
        assert_eq!(bottom.scroll.offset, rows - bottom.output_viewport_rows());

        let screen = crate::ui::render_to_text(&bottom, 100, 12).expect("render");
        assert!(screen.contains("line-7"));
        assert!(!screen.contains("line-0"));

        let up = key(bottom.clone(), KeyCode::Up);
        assert_eq!(up.scroll.offset, bottom.scroll.offset - 1);
    }

    #[test]
    fn not_handled_and_errors_render_as_text() {
        let (model, invocation) = dispatched("config");
        let next = finished(model, invocation, Ok(ExecOutcome::NotHandled));
        assert_eq!(
            next.output_text,
            "Command 'config' not yet implemented.\n\nUse 'help' to see available commands."
        );

        let (model, invocation) = dispatched("config");
        let next = finished(model, invocation, Err("exit status 2".to_string()));
        assert_eq!(next.navigation, NavigationState::Results);
        assert_eq!(
            next.output_text,
            "❌ Error executing command 'config': exit status 2"
        );
    }

    #[test]
    fn streaming_appends_chunks_and_ends_in_results() {
        let (model, invocation) = stream_validate();
        assert!(model.is_streaming);
        assert_eq!(model.streaming_lines, vec!["$ flake validate"]);

        let model = exec(
            model,
            ExecMessage::Chunk {
                invocation,
                line: "checking outputs".to_string(),
            },
        );
        let model = exec(
            model,
            ExecMessage::Chunk {
                invocation,
                line: "all good".to_string(),
            },
        );
        assert_eq!(model.navigation, NavigationState::Executing);

        let model = exec(
            model,
            ExecMessage::StreamEnd {
                invocation,
                error: None,
            },
        );
        assert!(!model.is_streaming);
        assert!(!model.is_executing());
        assert_eq!(model.navigation, NavigationState::Results);
        assert_eq!(
            model.streaming_lines,
            vec![
                "$ flake validate",
                "checking outputs",
                "all good",
                "✅ Command 'flake validate' completed successfully",
            ]
        );
        assert_eq!(model.output_text, model.streaming_lines.join("\n"));

        let frozen = exec(
            model.clone(),
            ExecMessage::Chunk {
                invocation,
                line: "late".to_string(),
            },
        );
        assert_eq!(frozen.streaming_lines, model.streaming_lines);
    }

    #[test]
    fn timeout_end_renders_failure_line() {
        let (model, invocation) = stream_validate();
        let model = exec(
            model,
            ExecMessage::StreamEnd {
                invocation,
                error: Some("timed out after 120s".to_string()),
            },
        );
        assert_eq!(model.navigation, NavigationState::Results);
        assert_eq!(
            model.streaming_lines.last().map(String::as_str),
            Some("❌ Command 'flake validate' failed: timed out after 120s")
        );
    }

    #[test]
    fn chunk_from_superseded_invocation_is_discarded() {
        let (model, first) = stream_validate();
        let model = exec(
            model,
            ExecMessage::StreamEnd {
                invocation: first,
                error: None,
            },
        );
        let model = key(model, KeyCode::Tab);

        let (model, second) = stream_validate_from(model);
        assert!(second > first);
        let before = model.streaming_lines.clone();

        let after = exec(
            model,
            ExecMessage::Chunk {
                invocation: first,
                line: "stale".to_string(),
            },
        );
        assert_eq!(after.streaming_lines, before);
        assert!(!after.output_text.contains("stale"));
        assert_eq!(after.active_invocation, Some(second));
    }

    fn stream_validate_from(model: AppModel) -> (AppModel, InvocationId) {
        let model = key(select(model, "flake"), KeyCode::Enter);
        let (model, cmd) = press(model, KeyCode::Enter);
        let (invocation, request) = expect_execute(cmd);
        let model = exec(
            model,
            ExecMessage::Started {
                invocation,
                command_line: request.command_line(),
            },
        );
        (model, invocation)
    }

    #[test]
    fn stale_finished_message_does_not_touch_output() {
        let (model, invocation) = dispatched("config");
        let before = model.output_text.clone();
        let stale = InvocationId::new(invocation.get() + 7);
        let next = finished(model, stale, Ok(ExecOutcome::Output("nope".to_string())));
        assert_eq!(next.output_text, before);
        assert_eq!(next.navigation, NavigationState::Executing);
    }

    #[test]
    fn initial_command_dispatches_args_verbatim() {
        let (next, cmd) = start_with_command(
            model(),
            "flake",
            vec!["validate".to_string(), "--path".to_string(), "/etc/nixos".to_string()],
        );
        let (_, request) = expect_execute(cmd);
        assert_eq!(request.argv(), vec!["validate", "--path", "/etc/nixos"]);
        assert_eq!(request.mode(), crate::domain::ExecMode::Streaming);
        assert_eq!(
            next.selected_command().map(|command| command.name.as_str()),
            Some("flake")
        );
        assert_eq!(next.navigation, NavigationState::Executing);
    }

    #[test]
    fn unknown_initial_command_sets_a_notice() {
        let (next, cmd) = start_with_command(model(), "frobnicate", Vec::new());
        assert!(matches!(cmd, AppCommand::None));
        assert_eq!(next.navigation, NavigationState::CommandList);
        assert_eq!(next.notice.as_deref(), Some("Unknown command: frobnicate"));
    }

    #[test]
    fn invocation_ids_are_monotonic_across_dispatches() {
        let (model, first) = dispatched("config");
        let model = finished(model, first, Ok(ExecOutcome::NotHandled));
        let model = key(model, KeyCode::Enter);
        let (_, cmd) = press(select(model, "config"), KeyCode::Enter);
        let (second, _) = expect_execute(cmd);
        assert!(second > first);
    }
}
