//! Runtime execution: the buffer model at the host/device boundary, the
//! host-driven loop protocol, and a reference interpreter supplying the
//! "run this module" capability.

mod buffer;
mod interpreter;
mod loop_driver;

pub use buffer::ArgBuf;
pub use interpreter::{run_module, run_program};
pub use loop_driver::{run_loop, RunFn};
