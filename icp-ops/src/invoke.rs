use std::process::Command;

use crate::{
    command::RenderedCommand,
    errors::{Error, Result},
};

/// Runs a rendered command as an external process and returns its exit code
/// ("None" if the process was terminated by a signal).
pub trait Invoker {
    fn invoke(&mut self, cmd: &RenderedCommand) -> Result<Option<i32>>;
}

/// Invokes the argument vector directly, never through a shell,
/// blocking until the child process exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

impl Invoker for ProcessInvoker {
    fn invoke(&mut self, cmd: &RenderedCommand) -> Result<Option<i32>> {
        let program = cmd.program().ok_or_else(|| Error::MissingArgument {
            message: String::from("a non-empty command must be provided"),
        })?;

        let mut c = Command::new(program);
        c.args(cmd.arguments());
        if let Some(dir) = cmd.working_dir() {
            log::info!("running in working directory {}", dir.display());
            c.current_dir(dir);
        }

        let o = c.output().map_err(|e| {
            log::warn!("command failed to start: {}", e);
            Error::io(program, e)
        })?;

        let stdout = String::from_utf8_lossy(&o.stdout);
        let stderr = String::from_utf8_lossy(&o.stderr);
        if !stdout.trim().is_empty() {
            log::info!("{} output:\n{}", program, stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            log::warn!("{} stderr:\n{}", program, stderr.trim_end());
        }
        Ok(o.status.code())
    }
}

/// Invokes the command and fails on anything but a zero exit code.
pub fn run(invoker: &mut dyn Invoker, cmd: &RenderedCommand) -> Result<()> {
    log::info!("Invoking: {}", cmd);
    let code = invoker.invoke(cmd)?;
    if code == Some(0) {
        log::info!("command run success");
        return Ok(());
    }

    let e = Error::ExternalProcess {
        command: cmd.to_string(),
        code,
    };
    log::warn!("{}", e);
    Err(e)
}

/// Records the invoked commands instead of running them, answering with
/// scripted exit codes (zero once the script runs out).
#[cfg(test)]
pub(crate) struct Recorder {
    codes: std::collections::VecDeque<i32>,
    invoked: Vec<RenderedCommand>,
}

#[cfg(test)]
impl Recorder {
    pub(crate) fn with_codes(codes: Vec<i32>) -> Self {
        Self {
            codes: codes.into(),
            invoked: Vec::new(),
        }
    }

    pub(crate) fn invoked(&self) -> Vec<String> {
        self.invoked.iter().map(|c| c.to_string()).collect()
    }

    pub(crate) fn commands(&self) -> &[RenderedCommand] {
        &self.invoked
    }
}

#[cfg(test)]
impl Invoker for Recorder {
    fn invoke(&mut self, cmd: &RenderedCommand) -> Result<Option<i32>> {
        self.invoked.push(cmd.clone());
        Ok(Some(self.codes.pop_front().unwrap_or(0)))
    }
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- invoke::test_process_invoker --exact --show-output
#[test]
fn test_process_invoker() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut invoker = ProcessInvoker;

    let ret = run(&mut invoker, &RenderedCommand::new(vec!["true".to_string()]));
    assert!(ret.is_ok());

    let ret = run(&mut invoker, &RenderedCommand::new(vec!["false".to_string()]));
    match ret {
        Err(Error::ExternalProcess { command, code }) => {
            assert_eq!(command, "false");
            assert_eq!(code, Some(1));
        }
        other => panic!("unexpected {:?}", other),
    }

    // arguments are passed as-is, with no shell re-parsing
    let tmp_dir = tempfile::tempdir().unwrap();
    let cmd = RenderedCommand::new(vec![
        "sh".to_string(),
        "-c".to_string(),
        "test \"$0\" = 'a b;c' && touch marker".to_string(),
        "a b;c".to_string(),
    ])
    .with_working_dir(tmp_dir.path());
    let ret = run(&mut invoker, &cmd);
    assert!(ret.is_ok());
    assert!(tmp_dir.path().join("marker").exists());

    let ret = run(
        &mut invoker,
        &RenderedCommand::new(vec!["/nonexistent/icp-ops-binary".to_string()]),
    );
    assert!(matches!(ret, Err(Error::Io { .. })));

    let ret = run(&mut invoker, &RenderedCommand::new(vec![]));
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));
}
