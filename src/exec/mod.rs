pub mod command_executor;
pub mod shell;
#[cfg(test)]
pub mod testing;

pub use command_executor::{
    CapturedOutput, CommandError, CommandRunner, CommandSpec, GrepOutput, OutputSink, OutputStream,
    SystemRunner, match_line,
};
pub use shell::quote;
