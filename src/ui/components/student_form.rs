use super::input::{InputResult, TextInput};
use super::{centered, KeyResult};
use crate::api::{Student, StudentDraft};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
  Name,
  Surname,
  Age,
  Phone,
}

impl Field {
  pub const ALL: [Field; 4] = [Field::Name, Field::Surname, Field::Age, Field::Phone];

  fn index(self) -> usize {
    match self {
      Field::Name => 0,
      Field::Surname => 1,
      Field::Age => 2,
      Field::Phone => 3,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Field::Name => "Name",
      Field::Surname => "Surname",
      Field::Age => "Age",
      Field::Phone => "Phone",
    }
  }

  fn next(self) -> Field {
    Field::ALL[(self.index() + 1) % Field::ALL.len()]
  }

  fn prev(self) -> Field {
    Field::ALL[(self.index() + Field::ALL.len() - 1) % Field::ALL.len()]
  }
}

/// Client-side form check. A form that fails it is never sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("Please input your name!")]
  MissingName,
  #[error("Please input your surname!")]
  MissingSurname,
  #[error("Please input your age!")]
  MissingAge,
  #[error("Age must be a whole number (got {0:?})")]
  InvalidAge(String),
  #[error("Please input your phone number!")]
  MissingPhone,
}

impl ValidationError {
  /// The field the message belongs to
  pub fn field(&self) -> Field {
    match self {
      ValidationError::MissingName => Field::Name,
      ValidationError::MissingSurname => Field::Surname,
      ValidationError::MissingAge | ValidationError::InvalidAge(_) => Field::Age,
      ValidationError::MissingPhone => Field::Phone,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
  Create,
  Edit { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  /// The form passed validation
  Submitted { mode: FormMode, draft: StudentDraft },
  Cancelled,
}

/// Modal create/edit form for one student
#[derive(Debug, Clone)]
pub struct StudentForm {
  mode: FormMode,
  inputs: [TextInput; 4],
  focus: Field,
  error: Option<ValidationError>,
  submitting: bool,
}

impl StudentForm {
  /// Empty form for a new student
  pub fn create() -> Self {
    Self {
      mode: FormMode::Create,
      inputs: Default::default(),
      focus: Field::Name,
      error: None,
      submitting: false,
    }
  }

  /// Form prefilled from an existing student
  pub fn edit(student: &Student) -> Self {
    let age = student.age.map(|age| age.to_string()).unwrap_or_default();
    Self {
      mode: FormMode::Edit {
        id: student.id.clone(),
      },
      inputs: [
        TextInput::with_value(&student.name),
        TextInput::with_value(&student.surname),
        TextInput::with_value(&age),
        TextInput::with_value(&student.phone),
      ],
      focus: Field::Name,
      error: None,
      submitting: false,
    }
  }

  pub fn focus(&self) -> Field {
    self.focus
  }

  pub fn error(&self) -> Option<&ValidationError> {
    self.error.as_ref()
  }

  pub fn is_submitting(&self) -> bool {
    self.submitting
  }

  /// Lock the form while the write is in flight
  pub fn set_submitting(&mut self, submitting: bool) {
    self.submitting = submitting;
  }

  fn value(&self, field: Field) -> &str {
    self.inputs[field.index()].value().trim()
  }

  /// Check required fields in display order and build the payload.
  pub fn validate(&self) -> Result<StudentDraft, ValidationError> {
    let name = self.value(Field::Name);
    if name.is_empty() {
      return Err(ValidationError::MissingName);
    }
    let surname = self.value(Field::Surname);
    if surname.is_empty() {
      return Err(ValidationError::MissingSurname);
    }
    let age_text = self.value(Field::Age);
    if age_text.is_empty() {
      return Err(ValidationError::MissingAge);
    }
    let age = age_text
      .parse::<u32>()
      .map_err(|_| ValidationError::InvalidAge(age_text.to_string()))?;
    let phone = self.value(Field::Phone);
    if phone.is_empty() {
      return Err(ValidationError::MissingPhone);
    }

    Ok(StudentDraft {
      name: name.to_string(),
      surname: surname.to_string(),
      age,
      phone: phone.to_string(),
    })
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    // Locked until the view hears back from the backend
    if self.submitting {
      return KeyResult::Handled;
    }

    match key.code {
      KeyCode::Esc => return KeyResult::Event(FormEvent::Cancelled),
      KeyCode::Tab | KeyCode::Down => {
        self.focus = self.focus.next();
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus = self.focus.prev();
        return KeyResult::Handled;
      }
      KeyCode::Enter => {
        return match self.validate() {
          Ok(draft) => {
            self.error = None;
            KeyResult::Event(FormEvent::Submitted {
              mode: self.mode.clone(),
              draft,
            })
          }
          Err(e) => {
            self.focus = e.field();
            self.error = Some(e);
            KeyResult::Handled
          }
        };
      }
      _ => {}
    }

    match self.inputs[self.focus.index()].handle_key(key) {
      InputResult::Consumed => {
        if self.error.as_ref().map(|e| e.field()) == Some(self.focus) {
          self.error = None;
        }
        KeyResult::Handled
      }
      // The form is modal: nothing leaks to the list behind it
      _ => KeyResult::Handled,
    }
  }

  pub fn render(&self, frame: &mut Frame, area: Rect) {
    let overlay = centered(area, 56, 12);
    frame.render_widget(Clear, overlay);

    let title = match &self.mode {
      FormMode::Create => " Create student ".to_string(),
      FormMode::Edit { id } => format!(" Update student #{} ", id),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow));

    let inner = block.inner(overlay);
    frame.render_widget(block, overlay);

    let mut lines = Vec::new();
    for field in Field::ALL {
      let focused = field == self.focus && !self.submitting;
      let label_style = if focused {
        Style::default().fg(Color::Yellow).bold()
      } else {
        Style::default().fg(Color::DarkGray)
      };

      let mut spans = vec![Span::styled(format!(" {:<9}", field.label()), label_style)];
      let input = &self.inputs[field.index()];
      if focused {
        let (before, after) = input.split_at_cursor();
        spans.push(Span::raw(before.to_string()));
        spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(after.to_string()));
      } else {
        spans.push(Span::raw(input.value().to_string()));
      }
      lines.push(Line::from(spans));
      lines.push(Line::raw(""));
    }

    match (&self.error, self.submitting) {
      (_, true) => lines.push(Line::styled(
        " Saving...",
        Style::default().fg(Color::Cyan),
      )),
      (Some(error), false) => lines.push(Line::styled(
        format!(" {}", error),
        Style::default().fg(Color::Red),
      )),
      (None, false) => lines.push(Line::styled(
        " <enter> save  <tab> next field  <esc> cancel",
        Style::default().fg(Color::DarkGray),
      )),
    }

    frame.render_widget(Paragraph::new(lines), inner);
  }
}
