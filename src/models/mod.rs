pub mod enums;
pub mod evaluation;
pub mod monitor;

pub use enums::*;
pub use evaluation::*;
pub use monitor::*;
