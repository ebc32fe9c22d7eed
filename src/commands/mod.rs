mod analyze;
mod init;

pub use analyze::{cmd_analyze, cmd_analyze_with_fs};
pub use init::{cmd_init, cmd_init_with_fs};
