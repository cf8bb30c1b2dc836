pub mod assembler;
pub mod supervisor;

pub use assembler::{assemble_command, LaunchAccount, LaunchInputs};
pub use supervisor::{spawn_supervised, RunningInstance};
