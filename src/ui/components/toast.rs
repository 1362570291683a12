use std::collections::VecDeque;
use std::time::Duration;

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use tokio::time::Instant;

const DEFAULT_TTL: Duration = Duration::from_secs(3);
const MAX_VISIBLE: usize = 4;
const TOAST_WIDTH: u16 = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
  Info,
  Success,
  Error,
}

impl ToastLevel {
  fn color(self) -> Color {
    match self {
      ToastLevel::Info => Color::Cyan,
      ToastLevel::Success => Color::Green,
      ToastLevel::Error => Color::Red,
    }
  }

  fn title(self) -> &'static str {
    match self {
      ToastLevel::Info => " info ",
      ToastLevel::Success => " ok ",
      ToastLevel::Error => " error ",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
  pub level: ToastLevel,
  pub message: String,
}

impl Toast {
  pub fn info(message: impl Into<String>) -> Self {
    Self {
      level: ToastLevel::Info,
      message: message.into(),
    }
  }

  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: ToastLevel::Success,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: ToastLevel::Error,
      message: message.into(),
    }
  }
}

/// Notifications stacked in the bottom-right corner, oldest on top
#[derive(Debug)]
pub struct ToastStack {
  toasts: VecDeque<(Toast, Instant)>,
  ttl: Duration,
}

impl Default for ToastStack {
  fn default() -> Self {
    Self::new(DEFAULT_TTL)
  }
}

impl ToastStack {
  pub fn new(ttl: Duration) -> Self {
    Self {
      toasts: VecDeque::new(),
      ttl,
    }
  }

  pub fn push(&mut self, toast: Toast) {
    tracing::debug!(level = ?toast.level, message = %toast.message, "Toast");
    self.toasts.push_back((toast, Instant::now()));
    while self.toasts.len() > MAX_VISIBLE {
      self.toasts.pop_front();
    }
  }

  /// Drop expired toasts. Returns `true` if any were removed.
  pub fn expire(&mut self) -> bool {
    let before = self.toasts.len();
    let ttl = self.ttl;
    self.toasts.retain(|(_, shown_at)| shown_at.elapsed() < ttl);
    self.toasts.len() != before
  }

  pub fn iter(&self) -> impl Iterator<Item = &Toast> {
    self.toasts.iter().map(|(toast, _)| toast)
  }

  pub fn is_empty(&self) -> bool {
    self.toasts.is_empty()
  }

  pub fn render(&self, frame: &mut Frame, area: Rect) {
    let width = TOAST_WIDTH.min(area.width);
    let mut bottom = area.y + area.height;

    // Newest closest to the bottom edge
    for toast in self.iter().collect::<Vec<_>>().into_iter().rev() {
      let text_width = width.saturating_sub(2).max(1) as usize;
      let lines = toast.message.chars().count().div_ceil(text_width).max(1) as u16;
      let height = lines + 2;
      if bottom < area.y + height {
        break;
      }
      bottom -= height;

      let rect = Rect::new(area.x + area.width - width, bottom, width, height);
      let color = toast.level.color();
      let block = Block::default()
        .title(toast.level.title())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));

      frame.render_widget(Clear, rect);
      frame.render_widget(
        Paragraph::new(toast.message.as_str())
          .block(block)
          .style(Style::default().fg(color))
          .wrap(Wrap { trim: true }),
        rect,
      );
    }
  }
}
