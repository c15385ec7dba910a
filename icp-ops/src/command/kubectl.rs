use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use serde_yaml::Value;

use crate::{
    command::{self, ArgBuilder, RenderedCommand},
    errors::{Error, Result},
};

pub const KIND: &str = "kubectl";

/// The option whose value names a file to be materialized from an auxiliary
/// document of the command file: the n-th "-f" takes the (n+1)-th document.
const FILE_OPTION: &str = "f";

/// Builds kubectl commands targeted at the cluster, e.g.,
/// "kubectl apply -f <staging>/resource.yaml".
/// Assumes kubectl is installed and configured with a permanent token.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubectlHelper;

impl KubectlHelper {
    /// Processes the "-f" option: writes the object to "<staging>/<name>.yaml"
    /// and returns the path to use as the option value.
    pub fn process_file_option(&self, staging_dir: &Path, value: &str, obj: &Value) -> Result<PathBuf> {
        // a bare file name, always inside the staging directory
        if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
            return Err(Error::InvalidArgument {
                message: format!(
                    "the -f option value '{}' must be a file name without path separators",
                    value
                ),
            });
        }
        let file_name = if value.ends_with(".yaml") {
            value.to_string()
        } else {
            format!("{}.yaml", value)
        };
        let file_path = staging_dir.join(file_name);
        create_yaml_file(&file_path, obj)?;
        Ok(file_path)
    }
}

impl command::Helper for KubectlHelper {
    fn create_command(&self, docs: &[Value], staging_dir: &Path) -> Result<RenderedCommand> {
        let doc = command::first_document(docs, KIND)?;
        let sub_command = doc.require_command()?;

        let mut b = ArgBuilder::new("kubectl");
        b.arg(sub_command);
        b.flags(&doc.flags)?;

        let mut next_doc = 1;
        for (name, value) in doc.options.iter() {
            if name != FILE_OPTION {
                b.option(name, value)?;
                continue;
            }

            let obj = docs.get(next_doc).ok_or_else(|| Error::InvalidArgument {
                message: format!(
                    "expected document {} to be used with -f {} of 'kubectl {}'",
                    next_doc + 1,
                    value,
                    sub_command
                ),
            })?;
            let file_path = self.process_file_option(staging_dir, value, obj)?;
            b.option(name, &file_path.display().to_string())?;
            next_doc += 1;
        }

        if next_doc < docs.len() {
            log::warn!(
                "{} auxiliary document(s) of 'kubectl {}' not used by any -f option",
                docs.len() - next_doc,
                sub_command
            );
        }

        Ok(b.build())
    }
}

/// Dumps a YAML representation of the object to the file,
/// creating parent directories as needed.
pub fn create_yaml_file(file_path: &Path, obj: &Value) -> Result<()> {
    let label = file_path.display().to_string();
    if is_empty(obj) {
        return Err(Error::MissingArgument {
            message: format!("the object to be dumped to {} cannot be empty", label),
        });
    }

    if let Some(parent_dir) = file_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|e| Error::io(parent_dir.display().to_string(), e))?;
    }

    let d = serde_yaml::to_string(obj).map_err(|e| Error::yaml(&label, e))?;
    log::info!("writing object for -f option to '{}'", label);
    let mut f = File::create(file_path).map_err(|e| Error::io(&label, e))?;
    f.write_all(d.as_bytes()).map_err(|e| Error::io(&label, e))
}

fn is_empty(obj: &Value) -> bool {
    match obj {
        Value::Null => true,
        Value::Mapping(m) => m.is_empty(),
        Value::Sequence(s) => s.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- command::kubectl::test_file_option --exact --show-output
#[test]
fn test_file_option() {
    let _ = env_logger::builder().is_test(true).try_init();

    let staging = tempfile::tempdir().unwrap();
    let docs = crate::document::parse_all(
        "test",
        "kind: kubectl
command: create
options:
  f: myresource
  namespace: services
---
kind: Pod
apiVersion: v1
metadata:
  name: busybox
",
    )
    .unwrap();

    let ret = command::Helper::create_command(&KubectlHelper, &docs, staging.path());
    assert!(ret.is_ok());
    let c = ret.unwrap();

    let expected = staging.path().join("myresource.yaml");
    assert_eq!(
        c.args(),
        &[
            "kubectl".to_string(),
            "create".to_string(),
            "-f".to_string(),
            expected.display().to_string(),
            "--namespace".to_string(),
            "services".to_string(),
        ]
    );
    assert!(expected.exists());

    let dumped: Value = serde_yaml::from_str(&fs::read_to_string(&expected).unwrap()).unwrap();
    assert_eq!(dumped, docs[1]);
    assert_eq!(crate::document::kind_of(&dumped), Some("Pod"));
}

#[test]
fn test_file_option_keeps_extension() {
    let staging = tempfile::tempdir().unwrap();
    let nested = staging.path().join("nested");
    let docs = crate::document::parse_all(
        "test",
        "kind: kubectl\ncommand: apply\noptions:\n  f: deploy.yaml\n---\nkind: Deployment\n",
    )
    .unwrap();

    let c = command::Helper::create_command(&KubectlHelper, &docs, &nested).unwrap();
    assert_eq!(c.args()[3], nested.join("deploy.yaml").display().to_string());
    assert!(nested.join("deploy.yaml").exists());
}

#[test]
fn test_file_option_without_second_document() {
    let staging = tempfile::tempdir().unwrap();
    let docs = crate::document::parse_all("test", "kind: kubectl\ncommand: apply\noptions:\n  f: x\n").unwrap();
    let ret = command::Helper::create_command(&KubectlHelper, &docs, staging.path());
    assert!(matches!(ret, Err(Error::InvalidArgument { .. })));
    assert!(!staging.path().join("x.yaml").exists());

    let docs = crate::document::parse_all("test", "kind: kubectl\nflags: [all-namespaces]\n").unwrap();
    let ret = command::Helper::create_command(&KubectlHelper, &docs, staging.path());
    assert!(matches!(ret, Err(Error::InvalidArgument { .. })));
}

#[test]
fn test_repeated_file_option() {
    let staging = tempfile::tempdir().unwrap();
    let docs = crate::document::parse_all(
        "test",
        "kind: kubectl
command: apply
options:
  - f: first
  - f: second
---
kind: Pod
---
kind: Service
",
    )
    .unwrap();

    let c = command::Helper::create_command(&KubectlHelper, &docs, staging.path()).unwrap();
    let first = staging.path().join("first.yaml");
    let second = staging.path().join("second.yaml");
    assert_eq!(
        c.arguments(),
        &[
            "apply".to_string(),
            "-f".to_string(),
            first.display().to_string(),
            "-f".to_string(),
            second.display().to_string(),
        ]
    );
    let first = fs::read_to_string(&first).unwrap();
    let second = fs::read_to_string(&second).unwrap();
    assert!(first.contains("Pod"));
    assert!(second.contains("Service"));

    // one auxiliary document short
    let docs = crate::document::parse_all(
        "test",
        "kind: kubectl\ncommand: apply\noptions:\n  - f: a\n  - f: b\n---\nkind: Pod\n",
    )
    .unwrap();
    let ret = command::Helper::create_command(&KubectlHelper, &docs, staging.path());
    assert!(matches!(ret, Err(Error::InvalidArgument { .. })));
}

#[test]
fn test_file_option_stays_in_staging() {
    let staging = tempfile::tempdir().unwrap();
    let obj = crate::document::parse_all("test", "kind: Pod\n").unwrap().remove(0);
    for value in ["/etc/x", "../x", "nested/x", "..", ""] {
        let ret = KubectlHelper.process_file_option(staging.path(), value, &obj);
        assert!(matches!(ret, Err(Error::InvalidArgument { .. })), "{}", value);
    }
    assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
}
