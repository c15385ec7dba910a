use std::path::Path;

use serde_yaml::Value;

use crate::{
    command::{self, ArgBuilder, RenderedCommand},
    document::{self, CommandDocument},
    errors::{Error, Result},
    invoke::{self, Invoker},
};

pub const KIND: &str = "docker";

/// Nameless command arguments, by docker sub-command.
/// They are appended last, in the listed order, after all flags, options,
/// env vars, network options and volume bindings.
/// e.g., "docker run ... <image> <image-command>"
const POSITIONAL_ARGS: &[(&str, &[&str])] = &[("run", &["image", "image-command"]), ("load", &[])];

fn positional_args(command: &str) -> Option<&'static [&'static str]> {
    POSITIONAL_ARGS
        .iter()
        .find(|(c, _)| *c == command)
        .map(|(_, args)| *args)
}

/// Builds "docker run" and "docker load" commands.
/// Only the bare minimum needed for ICP installations is supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerHelper;

impl DockerHelper {
    pub fn load(&self, doc: &CommandDocument) -> Result<RenderedCommand> {
        let mut b = ArgBuilder::new("docker");
        b.arg("load");
        b.flags(&doc.flags)?;
        b.options(&doc.options)?;
        Ok(with_chdir(b.build(), doc))
    }

    pub fn run(&self, doc: &CommandDocument) -> Result<RenderedCommand> {
        let mut b = ArgBuilder::new("docker");
        b.arg("run");
        b.flags(&doc.flags)?;
        b.options(&doc.options)?;
        b.env(&doc.env);

        // only handles simple cases, e.g., "--net=host"
        b.network(&doc.network);
        b.volumes(&doc.volumes);

        if let Some(names) = positional_args("run") {
            b.positional(doc, names)?;
        }
        Ok(with_chdir(b.build(), doc))
    }

    /// Invokes the docker command documents in sequence, starting at "start",
    /// and stops at the first document whose kind is not "docker".
    /// Each invoked document is marked "status: PROCESSED".
    ///
    /// Returns the index of the first document that was not processed
    /// ("docs.len()" if all were), where another helper can resume.
    pub fn invoke_commands(
        &self,
        docs: &mut [Value],
        start: usize,
        invoker: &mut dyn Invoker,
    ) -> Result<usize> {
        if docs.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("a non-empty list of command documents must be provided"),
            });
        }

        for i in start..docs.len() {
            if document::kind_of(&docs[i]) != Some(KIND) {
                log::info!("stopping docker commands at document {} of {}", i, docs.len());
                return Ok(i);
            }

            let doc = CommandDocument::from_value(&docs[i])?;
            let cmd = self.create(&doc)?;
            invoke::run(invoker, &cmd)?;

            document::mark_processed(&mut docs[i]);
        }

        Ok(docs.len())
    }

    fn create(&self, doc: &CommandDocument) -> Result<RenderedCommand> {
        let command = doc.require_command()?;
        match command {
            "run" => self.run(doc),
            "load" => self.load(doc),
            _ => Err(Error::InvalidArgument {
                message: format!("unsupported docker command: {}", command),
            }),
        }
    }
}

impl command::Helper for DockerHelper {
    fn create_command(&self, docs: &[Value], _staging_dir: &Path) -> Result<RenderedCommand> {
        let doc = command::first_document(docs, KIND)?;
        self.create(&doc)
    }
}

fn with_chdir(cmd: RenderedCommand, doc: &CommandDocument) -> RenderedCommand {
    match doc.chdir.as_deref() {
        Some(dir) if !dir.is_empty() => cmd.with_working_dir(dir),
        _ => cmd,
    }
}

#[cfg(test)]
fn docs(contents: &str) -> Vec<Value> {
    document::parse_all("test", contents).unwrap()
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- command::docker::test_run --exact --show-output
#[test]
fn test_run() {
    let _ = env_logger::builder().is_test(true).try_init();

    let d = docs(
        "kind: docker
command: run
flags: [rm]
options:
  name: inception
env:
  LICENSE: accept
volumes:
  - /opt/ibm/cluster:/data
network:
  net: host
image: ibmcom/icp-inception:3.1.0-ee
image-command: install
",
    );
    let doc = CommandDocument::from_value(&d[0]).unwrap();
    let ret = DockerHelper.run(&doc);
    assert!(ret.is_ok());
    let c = ret.unwrap();
    assert_eq!(
        c.args(),
        &[
            "docker",
            "run",
            "--rm",
            "--name",
            "inception",
            "-e",
            "LICENSE=accept",
            "--net=host",
            "-v",
            "/opt/ibm/cluster:/data",
            "ibmcom/icp-inception:3.1.0-ee",
            "install",
        ]
    );
    assert_eq!(c.working_dir(), None);

    // sequence form of the image command expands to separate arguments
    let d = docs(
        "kind: docker
command: run
image: busybox
image-command: [cp, -r, cluster, /data]
chdir: /opt/ibm
",
    );
    let c = command::Helper::create_command(&DockerHelper, &d, Path::new("/tmp")).unwrap();
    assert_eq!(
        c.args(),
        &["docker", "run", "busybox", "cp", "-r", "cluster", "/data"]
    );
    assert_eq!(c.working_dir(), Some(Path::new("/opt/ibm")));
}

#[test]
fn test_run_missing_image() {
    let d = docs("kind: docker\ncommand: run\nimage-command: install\n");
    let ret = command::Helper::create_command(&DockerHelper, &d, Path::new("/tmp"));
    match ret {
        Err(Error::InvalidArgument { message }) => {
            assert!(message.contains("docker run"));
            assert!(message.contains("image"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let d = docs("kind: docker\ncommand: run\nimage: busybox\n");
    let ret = command::Helper::create_command(&DockerHelper, &d, Path::new("/tmp"));
    assert!(matches!(ret, Err(Error::InvalidArgument { .. })));
}

#[test]
fn test_load() {
    let d = docs("kind: docker\ncommand: load\noptions:\n  i: /tmp/icp-inception-fixpack.tar\n");
    let c = command::Helper::create_command(&DockerHelper, &d, Path::new("/tmp")).unwrap();
    assert_eq!(
        c.args(),
        &["docker", "load", "-i", "/tmp/icp-inception-fixpack.tar"]
    );
    assert_eq!(c.to_string(), "docker load -i /tmp/icp-inception-fixpack.tar");

    let d = docs("kind: docker\ncommand: push\n");
    let ret = command::Helper::create_command(&DockerHelper, &d, Path::new("/tmp"));
    assert!(matches!(ret, Err(Error::InvalidArgument { .. })));
}

#[test]
fn test_invoke_commands_stops_at_other_kind() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut d = docs(
        "kind: docker
command: load
options:
  i: /tmp/a.tar
---
kind: docker
command: load
options:
  i: /tmp/b.tar
---
kind: kubectl
command: get
---
kind: docker
command: load
options:
  i: /tmp/c.tar
",
    );

    let mut invoker = invoke::Recorder::with_codes(vec![]);
    let ret = DockerHelper.invoke_commands(&mut d, 0, &mut invoker);
    assert!(ret.is_ok());
    assert_eq!(ret.unwrap(), 2);
    assert_eq!(
        invoker.invoked(),
        vec![
            "docker load -i /tmp/a.tar".to_string(),
            "docker load -i /tmp/b.tar".to_string()
        ]
    );
    assert!(document::is_processed(&d[0]));
    assert!(document::is_processed(&d[1]));
    assert!(!document::is_processed(&d[2]));
    assert!(!document::is_processed(&d[3]));

    // resuming past the kubectl document processes the rest
    let ret = DockerHelper.invoke_commands(&mut d, 3, &mut invoker);
    assert_eq!(ret.unwrap(), 4);
    assert!(document::is_processed(&d[3]));
}

#[test]
fn test_invoke_commands_halts_on_failure() {
    let mut d = docs(
        "kind: docker
command: load
options:
  i: /tmp/a.tar
---
kind: docker
command: load
options:
  i: /tmp/b.tar
---
kind: docker
command: load
options:
  i: /tmp/c.tar
",
    );

    let mut invoker = invoke::Recorder::with_codes(vec![0, 1]);
    let ret = DockerHelper.invoke_commands(&mut d, 0, &mut invoker);
    match ret {
        Err(Error::ExternalProcess { command, code }) => {
            assert_eq!(command, "docker load -i /tmp/b.tar");
            assert_eq!(code, Some(1));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(invoker.invoked().len(), 2);
    assert!(document::is_processed(&d[0]));
    assert!(!document::is_processed(&d[1]));
    assert!(!document::is_processed(&d[2]));

    let ret = DockerHelper.invoke_commands(&mut [], 0, &mut invoker);
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));
}
