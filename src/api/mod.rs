//! REST API access: the HTTP transport and the students resource.

mod error;
mod students;
mod transport;
mod types;

pub use error::HttpError;
pub use students::{search_params, StudentsApi};
pub use transport::{HttpTransport, Params, Request, Transport};
pub use types::{Student, StudentDraft};
