//! CLI commands implementation

pub mod documents;
pub mod init;
pub mod reindex;
pub mod search;
pub mod status;

pub use documents::*;
pub use init::*;
pub use reindex::*;
pub use search::*;
pub use status::*;
