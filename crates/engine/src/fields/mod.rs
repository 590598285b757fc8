mod standard;
mod text;
mod title;

pub use standard::StandardField;
pub use text::RevisionTextField;
pub use title::TitleField;
