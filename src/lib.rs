pub mod cli;
pub mod command;
pub mod output;
pub mod protocol;

pub use cli::{AuthAsker, CommandAsker, prompt};
pub use command::{Command, CommandError};
pub use output::{Console, Output};
