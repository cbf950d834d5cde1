pub mod analysis;
pub mod interaction;

pub use analysis::*;
pub use interaction::*;
