pub mod document;
pub mod enums;
pub mod patch;
pub mod version;

pub use document::*;
pub use enums::*;
pub use patch::*;
pub use version::*;
