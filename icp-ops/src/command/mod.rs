pub mod docker;
pub mod helm;
pub mod kubectl;

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use serde_yaml::Value;

use crate::{
    document::{CommandDocument, Pairs},
    errors::{Error, Result},
};

/// The executable product of a command document.
///
/// The human-readable form (Display) is derived from the argument vector,
/// so the two can never describe different invocations. Only the vector is
/// ever executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl RenderedCommand {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Full argument vector, program first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Arguments after the program.
    pub fn arguments(&self) -> &[String] {
        if self.args.is_empty() {
            &self.args
        } else {
            &self.args[1..]
        }
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

impl fmt::Display for RenderedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// Returns the dashed form of a flag or option name:
/// "-n" for a single character name, "--name" otherwise.
pub fn dashed(name: &str) -> Result<String> {
    match name.chars().count() {
        0 => Err(Error::InvalidArgument {
            message: String::from("flag and option names cannot be empty"),
        }),
        1 => Ok(format!("-{}", name)),
        _ => Ok(format!("--{}", name)),
    }
}

/// Builds an argument vector from the declarative fields of a command
/// document. Callers append in the fixed order: flags, options, the
/// kind-specific blocks, then the positional arguments.
#[derive(Debug, Clone)]
pub struct ArgBuilder {
    args: Vec<String>,
}

impl ArgBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            args: vec![program.to_string()],
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn flags(&mut self, flags: &[String]) -> Result<&mut Self> {
        for flag in flags {
            let d = dashed(flag)?;
            self.args.push(d);
        }
        Ok(self)
    }

    /// Each option becomes its dashed name followed by the value as a
    /// separate argument.
    pub fn options(&mut self, options: &Pairs) -> Result<&mut Self> {
        for (name, value) in options.iter() {
            self.option(name, value)?;
        }
        Ok(self)
    }

    pub fn option(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let d = dashed(name)?;
        self.args.push(d);
        self.args.push(value.to_string());
        Ok(self)
    }

    /// "-e name=value" per entry.
    pub fn env(&mut self, env: &Pairs) -> &mut Self {
        for (name, value) in env.iter() {
            self.args.push(String::from("-e"));
            self.args.push(format!("{}={}", name, value));
        }
        self
    }

    /// "-v <volume>" per bind mount.
    pub fn volumes(&mut self, volumes: &[String]) -> &mut Self {
        for volume in volumes {
            self.args.push(String::from("-v"));
            self.args.push(volume.clone());
        }
        self
    }

    /// "--name=value" as one argument per entry (e.g., "--net=host").
    pub fn network(&mut self, network: &Pairs) -> &mut Self {
        for (name, value) in network.iter() {
            self.args.push(format!("--{}={}", name, value));
        }
        self
    }

    /// "--set name=value" per entry.
    pub fn set_values(&mut self, set_values: &Pairs) -> &mut Self {
        for (name, value) in set_values.iter() {
            self.args.push(String::from("--set"));
            self.args.push(format!("{}={}", name, value));
        }
        self
    }

    /// Appends the positional fields in the declared order.
    /// Every field is required.
    pub fn positional(&mut self, doc: &CommandDocument, names: &[&str]) -> Result<&mut Self> {
        let command = self.describe(doc);
        for name in names {
            match doc.positional(name)? {
                Some(values) => self.args.extend(values),
                None => {
                    return Err(Error::InvalidArgument {
                        message: format!("the {} command requires a {} argument", command, name),
                    })
                }
            }
        }
        Ok(self)
    }

    fn describe(&self, doc: &CommandDocument) -> String {
        match doc.command.as_deref() {
            Some(c) => format!("{} {}", self.args[0], c),
            None => self.args[0].clone(),
        }
    }

    pub fn build(self) -> RenderedCommand {
        RenderedCommand::new(self.args)
    }
}

/// Turns the documents of one rendered command file into an invocable
/// command. "docs[0]" is the command document; later documents are
/// auxiliary (e.g., the object for kubectl "-f").
pub trait Helper {
    fn create_command(&self, docs: &[Value], staging_dir: &Path) -> Result<RenderedCommand>;
}

/// Maps a document "kind" to its helper. Fixed once built.
pub struct Registry {
    helpers: BTreeMap<String, Box<dyn Helper>>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut r = Self::empty();
        r.register(docker::KIND, Box::new(docker::DockerHelper));
        r.register(helm::KIND, Box::new(helm::HelmHelper));
        r.register(kubectl::KIND, Box::new(kubectl::KubectlHelper));
        r
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            helpers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: &str, helper: Box<dyn Helper>) {
        self.helpers.insert(kind.to_string(), helper);
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.helpers.keys().map(String::as_str).collect()
    }

    pub fn get(&self, kind: &str) -> Result<&dyn Helper> {
        match self.helpers.get(kind) {
            Some(h) => Ok(h.as_ref()),
            None => Err(Error::CommandInterpreter {
                message: format!("no helper registered for command kind: {}", kind),
            }),
        }
    }

    /// Dispatches the documents to the helper selected by the first
    /// document's "kind".
    pub fn create_command(&self, docs: &[Value], staging_dir: &Path) -> Result<RenderedCommand> {
        let first = docs.first().ok_or_else(|| Error::MissingArgument {
            message: String::from("a non-empty list of command documents must be provided"),
        })?;
        let kind = crate::document::kind_of(first).ok_or_else(|| Error::CommandInterpreter {
            message: format!("command document has no kind: {:?}", first),
        })?;
        self.get(kind)?.create_command(docs, staging_dir)
    }
}

/// Shared by the helpers: checks for at least one document and parses the first.
pub(crate) fn first_document(docs: &[Value], kind: &str) -> Result<CommandDocument> {
    match docs.first() {
        Some(v) => CommandDocument::from_value(v),
        None => Err(Error::MissingArgument {
            message: format!(
                "a non-empty list of {} command documents must be provided",
                kind
            ),
        }),
    }
}

#[test]
fn test_dashed() {
    assert_eq!(dashed("f").unwrap(), "-f");
    assert_eq!(dashed("rm").unwrap(), "--rm");
    assert_eq!(dashed("namespace").unwrap(), "--namespace");
    assert!(dashed("").is_err());
}

#[test]
fn test_arg_builder() {
    let mut b = ArgBuilder::new("docker");
    b.arg("run");
    assert!(b
        .flags(&["d".to_string(), "privileged".to_string()])
        .is_ok());
    assert!(b
        .options(&Pairs(vec![
            ("name".to_string(), "web".to_string()),
            ("u".to_string(), "root".to_string()),
        ]))
        .is_ok());
    b.env(&Pairs(vec![("LICENSE".to_string(), "accept".to_string())]));
    b.volumes(&["/opt:/data".to_string()]);
    b.network(&Pairs(vec![("net".to_string(), "host".to_string())]));

    let c = b.build();
    assert_eq!(
        c.args(),
        &[
            "docker",
            "run",
            "-d",
            "--privileged",
            "--name",
            "web",
            "-u",
            "root",
            "-e",
            "LICENSE=accept",
            "-v",
            "/opt:/data",
            "--net=host",
        ]
    );
    assert_eq!(c.program(), Some("docker"));
    assert_eq!(c.arguments()[0], "run");
    assert_eq!(
        c.to_string(),
        "docker run -d --privileged --name web -u root -e LICENSE=accept -v /opt:/data --net=host"
    );
    assert_eq!(c.to_string(), c.args().join(" "));
}

#[test]
fn test_registry_unknown_kind() {
    let staging = tempfile::tempdir().unwrap();
    let docs = crate::document::parse_all("test", "kind: terraform\ncommand: apply\n").unwrap();

    let r = Registry::default();
    assert_eq!(r.kinds(), vec!["docker", "helm", "kubectl"]);
    let ret = r.create_command(&docs, staging.path());
    assert!(matches!(ret, Err(Error::CommandInterpreter { .. })));

    let docs = crate::document::parse_all("test", "command: apply\n").unwrap();
    let ret = r.create_command(&docs, staging.path());
    assert!(matches!(ret, Err(Error::CommandInterpreter { .. })));

    let ret = r.create_command(&[], staging.path());
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));
}
