mod record;
mod severity;
mod status;

pub use record::Record;
pub use severity::Severity;
pub use status::Status;
