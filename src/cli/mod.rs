pub mod ascii_preview;
pub mod diagnostics;
pub mod flow;

pub use ascii_preview::{clear_screen, poll_key, AsciiRenderer, KeyInput};
pub use flow::{print_outcome, run_capture};
