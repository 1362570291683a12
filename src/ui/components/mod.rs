mod command_input;
mod confirm;
mod input;
mod search_input;
mod student_form;
mod toast;

pub use command_input::{CommandEvent, CommandInput};
pub use confirm::{ConfirmDialog, ConfirmEvent};
pub use search_input::{SearchEvent, SearchInput};
pub use student_form::{FormEvent, FormMode, StudentForm};
pub use toast::{Toast, ToastStack};

/// Generic result type for component key handling.
///
/// Components report back to their parent view through this instead of
/// component-specific result enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key was consumed, no event for parent to handle
  Handled,
  /// Key was consumed, here's an event for parent to process
  Event(T),
  /// Key was not consumed, parent should try next handler
  NotHandled,
}

/// Centered rect of at most `width` x `height` inside `area`
pub(crate) fn centered(area: ratatui::prelude::Rect, width: u16, height: u16) -> ratatui::prelude::Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  ratatui::prelude::Rect::new(
    area.x + (area.width - width) / 2,
    area.y + (area.height - height) / 2,
    width,
    height,
  )
}
