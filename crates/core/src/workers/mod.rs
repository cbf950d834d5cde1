pub mod state;
pub mod worker;
pub mod worker_inputs;

pub use state::*;
pub use worker::*;
pub use worker_inputs::*;
