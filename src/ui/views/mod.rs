mod student_detail;
mod student_list;

pub use student_detail::StudentDetailView;
pub use student_list::StudentListView;
