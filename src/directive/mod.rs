pub mod keyword;
pub mod script;

pub use keyword::{DirectiveKind, KeywordParser};
pub use script::{TestScript, parse_script};
