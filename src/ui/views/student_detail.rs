use crate::api::{Student, StudentsApi};
use crate::query::{QueryState, Subscription};
use crate::ui::renderfns::{format_age, format_created_at, format_elapsed};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// One student, read through `GET /student/{id}`
pub struct StudentDetailView {
  id: String,
  label: String,
  student: Subscription<Student>,
}

impl StudentDetailView {
  pub fn new(api: StudentsApi, id: String, label: String) -> Self {
    let student = api.get(&id);
    Self { id, label, student }
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let title = match self.student.state() {
      QueryState::Loading => format!(
        " {} (loading {}) ",
        self.label,
        format_elapsed(self.student.loading_for().unwrap_or_default())
      ),
      QueryState::Error(e) => format!(" {} (error: {}) ", self.label, e),
      _ => format!(" {} ", self.label),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Keep showing the previous record while a refetch runs
    let Some(student) = self.student.data() else {
      let paragraph = match self.student.error() {
        Some(error) => Paragraph::new(format!("Error: {}\n\nPress 'r' to retry.", error))
          .style(Style::default().fg(Color::Red)),
        None => Paragraph::new("Loading student...").style(Style::default().fg(Color::DarkGray)),
      };
      frame.render_widget(paragraph, inner);
      return;
    };

    let label = |text: &'static str| Span::styled(format!("{:<10}", text), Style::default().fg(Color::DarkGray));
    let lines = vec![
      Line::from(vec![label("Id"), Span::raw(student.id.clone())]),
      Line::from(vec![
        label("Name"),
        Span::styled(student.name.clone(), Style::default().fg(Color::Cyan).bold()),
      ]),
      Line::from(vec![label("Surname"), Span::raw(student.surname.clone())]),
      Line::from(vec![label("Age"), Span::raw(format_age(student.age))]),
      Line::from(vec![label("Phone"), Span::raw(student.phone.clone())]),
      Line::from(vec![
        label("Avatar"),
        Span::raw(student.avatar.clone().unwrap_or_else(|| "-".to_string())),
      ]),
      Line::from(vec![label("Created"), Span::raw(format_created_at(student.created_at))]),
    ];

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
  }
}

impl View for StudentDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => {
        self.student.refetch();
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("{} #{}", self.label, self.id)
  }

  fn tick(&mut self) -> ViewAction {
    self.student.poll();
    ViewAction::None
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(60),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{student_json, FakeBackend};
  use crossterm::event::KeyModifiers;
  use reqwest::Method;

  #[tokio::test]
  async fn test_missing_student_shows_error_and_retries() {
    let backend = FakeBackend::new();
    let mut view = StudentDetailView::new(backend.api(), "9".to_string(), "Ghost".to_string());

    let state = view.student.settled().await;
    assert_eq!(state.error().and_then(|e| e.status()), Some(404));

    backend.seed(vec![student_json("9", "Ann", "Lee")]);
    view.handle_key(KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE));
    let state = view.student.settled().await;
    assert_eq!(state.data().map(|s| s.name.as_str()), Some("Ann"));
    assert_eq!(backend.count_calls(Method::GET, "/student/9"), 2);
  }

  #[tokio::test]
  async fn test_q_goes_back() {
    let backend = FakeBackend::new();
    let mut view = StudentDetailView::new(backend.api(), "1".to_string(), "Ann Lee".to_string());
    assert_eq!(view.breadcrumb_label(), "Ann Lee #1");
    assert!(matches!(
      view.handle_key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)),
      ViewAction::Pop
    ));
  }
}
