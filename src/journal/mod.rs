//! Journal line format: parsing and the event type it produces.

mod event;
mod parser;

pub use event::{Event, KnownEventKind};
pub use parser::{is_journal_name, parse_file, parse_line, parse_name, sort_by_date, JournalName};
