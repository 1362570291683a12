use crate::api::{search_params, Student, StudentDraft, StudentsApi};
use crate::commands::CommandAction;
use crate::query::{Mutation, QueryState, Subscription};
use crate::ui::components::{
  ConfirmDialog, ConfirmEvent, FormEvent, FormMode, KeyResult, SearchEvent, SearchInput,
  StudentForm, Toast,
};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{
  avatar_marker, error_message, format_age, format_created_at, format_elapsed, truncate,
};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::StudentDetailView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

/// Which write is in flight, for the toast that follows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
  Create,
  Update,
  Delete,
}

impl WriteKind {
  fn success_message(self) -> &'static str {
    match self {
      WriteKind::Create => "Student created successfully",
      WriteKind::Update => "Student updated successfully",
      WriteKind::Delete => "Student deleted successfully",
    }
  }

  fn failure_message(self) -> &'static str {
    match self {
      WriteKind::Create | WriteKind::Update => "Failed to save student. Please try again.",
      WriteKind::Delete => "Failed to delete student. Please try again.",
    }
  }
}

enum Modal {
  Form(StudentForm),
  ConfirmDelete {
    id: String,
    dialog: ConfirmDialog,
  },
}

/// Root view: the students table with create/edit/delete
pub struct StudentListView {
  api: StudentsApi,
  search_text: String,
  students: Subscription<Vec<Student>>,
  table_state: TableState,
  search: SearchInput,
  modal: Option<Modal>,
  pending: Option<(WriteKind, Mutation<()>)>,
}

impl StudentListView {
  pub fn new(api: StudentsApi, search_text: String) -> Self {
    let students = api.list(search_params(&search_text));
    Self {
      api,
      search_text,
      students,
      table_state: TableState::default(),
      search: SearchInput::new(),
      modal: None,
      pending: None,
    }
  }

  fn students(&self) -> &[Student] {
    self.students.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected_student(&self) -> Option<&Student> {
    self
      .table_state
      .selected()
      .and_then(|idx| self.students().get(idx))
  }

  fn apply_search(&mut self, text: String) {
    if text == self.search_text {
      return;
    }
    tracing::debug!(search = %text, "Applying search");
    self.students = self.api.list(search_params(&text));
    self.search_text = text;
    self.table_state.select(None);
  }

  fn open_create_form(&mut self) {
    self.modal = Some(Modal::Form(StudentForm::create()));
  }

  fn start_write(&mut self, mode: FormMode, draft: StudentDraft) {
    let api = self.api.clone();
    let (kind, mutation) = match mode {
      FormMode::Create => (
        WriteKind::Create,
        Mutation::spawn(async move { api.create(&draft).await.map(|_| ()) }),
      ),
      FormMode::Edit { id } => (
        WriteKind::Update,
        Mutation::spawn(async move { api.update(&id, &draft).await.map(|_| ()) }),
      ),
    };
    if let Some(Modal::Form(form)) = &mut self.modal {
      form.set_submitting(true);
    }
    self.pending = Some((kind, mutation));
  }

  fn start_delete(&mut self, id: String) {
    let api = self.api.clone();
    let mutation = Mutation::spawn(async move { api.delete(&id).await });
    self.pending = Some((WriteKind::Delete, mutation));
  }

  fn handle_modal_key(&mut self, key: KeyEvent) -> ViewAction {
    let Some(modal) = &mut self.modal else {
      return ViewAction::None;
    };

    match modal {
      Modal::Form(form) => match form.handle_key(key) {
        KeyResult::Event(FormEvent::Submitted { mode, draft }) => self.start_write(mode, draft),
        KeyResult::Event(FormEvent::Cancelled) => self.modal = None,
        KeyResult::Handled | KeyResult::NotHandled => {}
      },
      Modal::ConfirmDelete { id, dialog } => match dialog.handle_key(key) {
        KeyResult::Event(ConfirmEvent::Confirmed) => {
          let id = id.clone();
          self.modal = None;
          self.start_delete(id);
        }
        KeyResult::Event(ConfirmEvent::Cancelled) => self.modal = None,
        KeyResult::Handled | KeyResult::NotHandled => {}
      },
    }
    ViewAction::None
  }

  /// Resolve a finished write into a toast
  fn poll_pending(&mut self) -> ViewAction {
    let Some((kind, mutation)) = &mut self.pending else {
      return ViewAction::None;
    };
    if !mutation.poll() {
      return ViewAction::None;
    }
    let kind = *kind;

    let toast = match mutation.state() {
      QueryState::Success(()) => {
        tracing::info!(write = ?kind, "Write succeeded");
        if kind != WriteKind::Delete {
          self.modal = None;
        }
        Toast::success(kind.success_message())
      }
      QueryState::Error(e) => {
        tracing::warn!(write = ?kind, error = %e, "Write failed");
        // Keep the form open so the user can fix and resubmit
        if let Some(Modal::Form(form)) = &mut self.modal {
          form.set_submitting(false);
        }
        Toast::error(error_message(e, kind.failure_message()))
      }
      QueryState::Loading | QueryState::Uninitialized => return ViewAction::None,
    };
    self.pending = None;
    ViewAction::Notify(toast)
  }

  fn title(&self) -> String {
    let filter = if self.search_text.is_empty() {
      String::new()
    } else {
      format!(" [/{}]", self.search_text)
    };

    match self.students.state() {
      QueryState::Loading => {
        let elapsed = self.students.loading_for().unwrap_or_default();
        format!(" Students{} (loading {}) ", filter, format_elapsed(elapsed))
      }
      QueryState::Error(e) => format!(" Students{} (error: {}) ", filter, e),
      _ => format!(" Students{} ({}) ", filter, self.students().len()),
    }
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.students().len();
    ensure_valid_selection(&mut self.table_state, len);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = match self.students.state() {
        QueryState::Error(_) => "Failed to load students. Press 'r' to retry.",
        QueryState::Loading | QueryState::Uninitialized => "Loading students...",
        QueryState::Success(_) if !self.search_text.is_empty() => "No students match the search.",
        QueryState::Success(_) => "No students yet. Press 'n' to add one.",
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let header = Row::new(vec![
      "", "Name", "Surname", "Age", "Phone", "Created", "Actions",
    ])
    .style(Style::default().fg(Color::Yellow).bold());

    let rows: Vec<Row> = self
      .students()
      .iter()
      .map(|student| {
        Row::new(vec![
          Cell::from(avatar_marker(student.avatar.as_deref())),
          Cell::from(truncate(&student.name, 20)).style(Style::default().fg(Color::Cyan)),
          Cell::from(truncate(&student.surname, 20)),
          Cell::from(format_age(student.age)),
          Cell::from(truncate(&student.phone, 20)),
          Cell::from(format_created_at(student.created_at)),
          Cell::from("e edit  d delete").style(Style::default().fg(Color::DarkGray)),
        ])
      })
      .collect();

    let widths = [
      Constraint::Length(2),
      Constraint::Percentage(18),
      Constraint::Percentage(18),
      Constraint::Length(4),
      Constraint::Percentage(20),
      Constraint::Length(17),
      Constraint::Min(16),
    ];

    let table = Table::new(rows, widths)
      .header(header)
      .block(block)
      .row_highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.table_state);
  }
}

impl View for StudentListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.modal.is_some() {
      return self.handle_modal_key(key);
    }

    // Let search component try to handle first
    let current = self.search_text.clone();
    match self.search.handle_key(key, &current) {
      KeyResult::Event(SearchEvent::Submitted(text)) => {
        self.apply_search(text);
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Cleared) => {
        self.apply_search(String::new());
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.table_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.table_state.select_last(),
      KeyCode::Char('r') => {
        self.students.refetch();
      }
      // One write at a time
      KeyCode::Char('n') | KeyCode::Char('e') | KeyCode::Char('d') | KeyCode::Delete
        if self.pending.is_some() => {}
      KeyCode::Char('n') => self.open_create_form(),
      KeyCode::Char('e') => {
        if let Some(student) = self.selected_student() {
          self.modal = Some(Modal::Form(StudentForm::edit(student)));
        }
      }
      KeyCode::Char('d') | KeyCode::Delete => {
        if let Some(student) = self.selected_student() {
          let dialog = ConfirmDialog::new(
            "Delete student",
            format!("Delete {}? This cannot be undone.", student.full_name()),
          );
          self.modal = Some(Modal::ConfirmDelete {
            id: student.id.clone(),
            dialog,
          });
        }
      }
      KeyCode::Enter => {
        if let Some(student) = self.selected_student() {
          return ViewAction::Push(Box::new(StudentDetailView::new(
            self.api.clone(),
            student.id.clone(),
            student.full_name(),
          )));
        }
      }
      KeyCode::Esc if !self.search_text.is_empty() => self.apply_search(String::new()),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_table(frame, area);
    self.search.render_overlay(frame, area);

    match &self.modal {
      Some(Modal::Form(form)) => form.render(frame, area),
      Some(Modal::ConfirmDelete { dialog, .. }) => dialog.render(frame, area),
      None => {}
    }
  }

  fn breadcrumb_label(&self) -> String {
    if self.search_text.is_empty() {
      "Students".to_string()
    } else {
      format!("Students [/{}]", self.search_text)
    }
  }

  fn tick(&mut self) -> ViewAction {
    self.students.poll();
    self.poll_pending()
  }

  fn captures_input(&self) -> bool {
    self.modal.is_some() || self.search.is_active()
  }

  fn on_command(&mut self, action: CommandAction) -> bool {
    match action {
      CommandAction::NewStudent => {
        if self.modal.is_none() && self.pending.is_none() {
          self.open_create_form();
        }
        true
      }
      _ => false,
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("n", "new").with_priority(30),
      ShortcutInfo::new("e", "edit").with_priority(40),
      ShortcutInfo::new("d", "delete").with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(60),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Params;
  use crate::query::QueryStatus;
  use crate::testing::{student_json, FakeBackend};
  use crossterm::event::KeyModifiers;
  use reqwest::Method;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_str(view: &mut StudentListView, s: &str) {
    for c in s.chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
  }

  /// Tick until the in-flight write lands, returning its toast
  async fn finish_write(view: &mut StudentListView) -> Toast {
    for _ in 0..200 {
      if let ViewAction::Notify(toast) = view.tick() {
        return toast;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("write never finished");
  }

  async fn loaded_view(backend: &FakeBackend) -> StudentListView {
    let mut view = StudentListView::new(backend.api(), String::new());
    view.students.settled().await;
    view
  }

  #[tokio::test]
  async fn test_invalid_form_never_reaches_transport() {
    let backend = FakeBackend::new();
    let mut view = loaded_view(&backend).await;

    view.handle_key(key(KeyCode::Char('n')));
    assert!(view.captures_input());
    view.handle_key(key(KeyCode::Enter));

    assert!(view.pending.is_none());
    assert!(view.captures_input());
    assert_eq!(backend.count_calls(Method::POST, "/student"), 0);
  }

  #[tokio::test]
  async fn test_create_closes_form_and_refreshes_table() {
    let backend = FakeBackend::new();
    let mut view = loaded_view(&backend).await;

    view.handle_key(key(KeyCode::Char('n')));
    for value in ["Ann", "Lee", "20", "+998 90 000 00 00"] {
      type_str(&mut view, value);
      view.handle_key(key(KeyCode::Tab));
    }
    view.handle_key(key(KeyCode::Enter));

    let toast = finish_write(&mut view).await;
    assert_eq!(toast, Toast::success("Student created successfully"));
    assert!(!view.captures_input());
    assert_eq!(backend.count_calls(Method::POST, "/student"), 1);

    view.students.settled().await;
    assert_eq!(view.students().len(), 1);
    assert_eq!(view.students()[0].name, "Ann");
  }

  #[tokio::test]
  async fn test_failed_save_keeps_form_open_with_server_message() {
    let backend = FakeBackend::new();
    backend.seed(vec![student_json("1", "Ann", "Lee")]);
    let mut view = loaded_view(&backend).await;
    ensure_valid_selection(&mut view.table_state, 1);

    view.handle_key(key(KeyCode::Char('e')));
    backend.fail_next(500);
    view.handle_key(key(KeyCode::Enter));

    let toast = finish_write(&mut view).await;
    assert_eq!(toast, Toast::error("Something went wrong"));
    match &view.modal {
      Some(Modal::Form(form)) => assert!(!form.is_submitting()),
      _ => panic!("form should stay open"),
    }
  }

  #[tokio::test]
  async fn test_delete_requires_confirmation() {
    let backend = FakeBackend::new();
    backend.seed(vec![
      student_json("1", "Ann", "Lee"),
      student_json("2", "Bo", "Kim"),
    ]);
    let mut view = loaded_view(&backend).await;
    ensure_valid_selection(&mut view.table_state, 2);

    view.handle_key(key(KeyCode::Char('d')));
    view.handle_key(key(KeyCode::Char('n')));
    assert!(view.modal.is_none());
    assert_eq!(backend.count_calls(Method::DELETE, "/student/1"), 0);

    view.handle_key(key(KeyCode::Char('d')));
    view.handle_key(key(KeyCode::Char('y')));
    let toast = finish_write(&mut view).await;
    assert_eq!(toast, Toast::success("Student deleted successfully"));
    assert_eq!(backend.count_calls(Method::DELETE, "/student/1"), 1);

    view.students.settled().await;
    let ids: Vec<_> = view.students().iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec!["2".to_string()]);
  }

  #[tokio::test]
  async fn test_search_resubscribes_with_param() {
    let backend = FakeBackend::new();
    backend.seed(vec![
      student_json("1", "Ann", "Lee"),
      student_json("2", "Bo", "Kim"),
    ]);
    let mut view = loaded_view(&backend).await;

    view.handle_key(key(KeyCode::Char('/')));
    type_str(&mut view, "kim");
    view.handle_key(key(KeyCode::Enter));
    assert_eq!(view.breadcrumb_label(), "Students [/kim]");

    view.students.settled().await;
    assert_eq!(view.students().len(), 1);

    // Esc drops the filter; the unfiltered list is still cached
    view.handle_key(key(KeyCode::Esc));
    assert_eq!(view.breadcrumb_label(), "Students");
    assert_eq!(view.students().len(), 2);
    assert_eq!(backend.count_calls(Method::GET, "/student"), 2);
    assert_eq!(
      view.api.cache().status("/student", Params::new()),
      QueryStatus::Success
    );
  }

  #[tokio::test]
  async fn test_new_command_opens_form() {
    let backend = FakeBackend::new();
    let mut view = loaded_view(&backend).await;
    assert!(view.on_command(CommandAction::NewStudent));
    assert!(view.captures_input());
    assert!(!view.on_command(CommandAction::Quit));
  }
}
