use crate::api::StudentsApi;
use crate::cache::Tag;
use crate::commands::CommandAction;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult, Toast, ToastStack};
use crate::ui::renderfns::extract_domain;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::StudentListView;
use color_eyre::{eyre::eyre, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::{stdout, Stdout};
use std::time::Duration;
use tokio::time::Instant;

const TICK_RATE: Duration = Duration::from_millis(250);

/// How often unused cache entries are swept
const EVICTION_INTERVAL: Duration = Duration::from_secs(10);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` command palette
  command: CommandInput,

  toasts: ToastStack,

  api: StudentsApi,

  /// Header text
  title: String,

  /// Unwatched cache entries older than this get evicted
  keep_unused: Duration,
  last_eviction: Instant,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: &Config, api: StudentsApi, search: Option<String>) -> Self {
    let title = config
      .title
      .clone()
      .unwrap_or_else(|| extract_domain(&config.api.base_url).to_string());

    let root = StudentListView::new(api.clone(), search.unwrap_or_default());

    Self {
      view_stack: vec![Box::new(root)],
      command: CommandInput::new(),
      toasts: ToastStack::default(),
      api,
      title,
      keep_unused: config.cache.keep_unused(),
      last_eviction: Instant::now(),
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode().map_err(|e| eyre!("Failed to enable raw mode: {}", e))?;
    stdout()
      .execute(EnterAlternateScreen)
      .map_err(|e| eyre!("Failed to enter alternate screen: {}", e))?;

    let result = match Terminal::new(CrosstermBackend::new(stdout())) {
      Ok(mut terminal) => self.main_loop(&mut terminal).await,
      Err(e) => Err(eyre!("Failed to create terminal: {}", e)),
    };

    // Restore the terminal even when the loop failed
    disable_raw_mode().map_err(|e| eyre!("Failed to disable raw mode: {}", e))?;
    stdout()
      .execute(LeaveAlternateScreen)
      .map_err(|e| eyre!("Failed to leave alternate screen: {}", e))?;

    result
  }

  async fn main_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);

    while !self.should_quit {
      terminal
        .draw(|frame| ui::draw(frame, self))
        .map_err(|e| eyre!("Failed to draw frame: {}", e))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    tracing::info!("Exiting");
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => {
        self.handle_key(key);
        // Keys can arrive faster than ticks; keep subscriptions current
        self.tick();
      }
      Event::Tick => self.tick(),
      Event::Resize => {}
    }
  }

  fn tick(&mut self) {
    // Every view keeps its subscriptions current, not only the visible one
    let mut actions = Vec::new();
    for view in self.view_stack.iter_mut() {
      actions.push(view.tick());
    }
    for action in actions {
      self.apply(action);
    }

    self.toasts.expire();

    if self.last_eviction.elapsed() >= EVICTION_INTERVAL {
      self.api.cache().evict_unused(self.keep_unused);
      self.last_eviction = Instant::now();
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    // The palette is modal while open
    if self.command.is_active() {
      self.handle_command_key(key);
      return;
    }

    let captures = self
      .current_view()
      .map(|view| view.captures_input())
      .unwrap_or(false);
    if !captures && key.code == KeyCode::Char(':') {
      self.handle_command_key(key);
      return;
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn handle_command_key(&mut self, key: KeyEvent) {
    match self.command.handle_key(key) {
      KeyResult::Event(CommandEvent::Run(cmd)) => {
        tracing::debug!(command = cmd.name, "Running command");
        self.execute(cmd.action);
      }
      KeyResult::Event(CommandEvent::Unknown(text)) => {
        if !text.is_empty() {
          self.toasts.push(Toast::error(format!("Unknown command: {}", text)));
        }
      }
      KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled | KeyResult::NotHandled => {}
    }
  }

  fn execute(&mut self, action: CommandAction) {
    match action {
      CommandAction::Students => self.view_stack.truncate(1),
      CommandAction::NewStudent => {
        self.view_stack.truncate(1);
        if let Some(root) = self.view_stack.first_mut() {
          root.on_command(action);
        }
      }
      CommandAction::Refresh => {
        let started = self.api.cache().invalidate(&[Tag::STUDENTS]);
        self
          .toasts
          .push(Toast::info(format!("Refreshing {} queries", started)));
      }
      CommandAction::Quit => self.should_quit = true,
    }
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Notify(toast) => self.toasts.push(toast),
    }
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command
  }

  pub fn toasts(&self) -> &ToastStack {
    &self.toasts
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .current_view()
      .map(|view| view.shortcuts())
      .unwrap_or_default()
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }

  /// Right side of the footer
  pub fn status_line(&self) -> String {
    format!("{} cached", self.api.cache().entry_count())
  }
}
