pub mod shell;

pub use shell::{execute_shell, execute_shell_in, kill_process_group, ExecResult, ProcessGroup};
