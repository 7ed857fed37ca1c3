//! path-compiler: turtle-style route instructions to absolute waypoints
//!
//! A route is written as a short list of tokens: `"M <distance>"` moves along
//! the current heading, `"L"` and `"R"` turn by a quarter. Compiling the list
//! produces one [`Waypoint`] per move, expressed as an offset from the pose
//! the robot held when the route started.

mod types;
pub use types::{Direction, Instruction, Waypoint};

mod error;
pub use error::{CompileError, Result};

mod compiler;
pub use compiler::{compile, compile_tokens, parse_instructions};
