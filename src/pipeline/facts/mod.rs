pub mod types;
pub mod prompt;
pub mod parser;
pub mod validation;
pub mod extractor;
pub mod batch;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use validation::*;
pub use extractor::*;
pub use batch::*;
