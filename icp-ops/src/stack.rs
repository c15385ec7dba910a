use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Write,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    variables::Values,
};

/// Parameters of the CloudFormation stack that deployed the cluster,
/// as exported to the boot node.
///
/// ```yaml
/// stack_id: arn:aws:cloudformation:us-east-1:123:stack/icp/abc
/// stack_name: icp
/// parameters:
///   ClusterName: mycluster
///   ClusterDomain: example.com
/// ```
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct StackParameters {
    pub stack_id: String,
    #[serde(default)]
    pub stack_name: String,
    /// Parameter key to parameter value, as defined in the stack.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl StackParameters {
    pub fn new(stack_id: &str, stack_name: &str) -> Self {
        Self {
            stack_id: stack_id.to_string(),
            stack_name: stack_name.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    /// Converts to YAML.
    pub fn encode_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self).map_err(|e| Error::yaml(&self.stack_id, e))
    }

    /// Saves the current stack parameters to disk
    /// and overwrites the file.
    pub fn sync(&self, file_path: &str) -> Result<()> {
        log::info!("syncing StackParameters to '{}'", file_path);

        let path = Path::new(file_path);
        if let Some(parent_dir) = path.parent() {
            log::info!("creating parent dir '{}'", parent_dir.display());
            fs::create_dir_all(parent_dir)
                .map_err(|e| Error::io(parent_dir.display().to_string(), e))?;
        }

        let d = self.encode_yaml()?;
        let mut f = File::create(file_path).map_err(|e| Error::io(file_path, e))?;
        f.write_all(d.as_bytes()).map_err(|e| Error::io(file_path, e))
    }

    pub fn load(file_path: &str) -> Result<Self> {
        log::info!("loading StackParameters from {}", file_path);

        if !Path::new(file_path).exists() {
            return Err(Error::MissingArgument {
                message: format!("stack parameters file {} does not exist", file_path),
            });
        }

        let f = File::open(file_path).map_err(|e| Error::io(file_path, e))?;
        let loaded: StackParameters =
            serde_yaml::from_reader(f).map_err(|e| Error::yaml(file_path, e))?;
        loaded.validate().map_err(|e| Error::InvalidConfigurationFile {
            path: file_path.to_string(),
            message: e.message(),
        })?;
        Ok(loaded)
    }

    /// Validates the stack parameters.
    pub fn validate(&self) -> Result<()> {
        log::info!("validating StackParameters");

        if self.stack_id.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("'stack_id' cannot be empty"),
            });
        }
        if let Some(k) = self.parameters.keys().find(|k| k.is_empty()) {
            return Err(Error::InvalidArgument {
                message: format!("parameter name cannot be empty (value '{}')", self.parameters[k]),
            });
        }
        Ok(())
    }

    /// Returns the non-empty value of the parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.parameters.get(name) {
            Some(v) if !v.is_empty() => Some(v.as_str()),
            _ => None,
        }
    }

    /// Every parameter as a variable value, e.g., the intrinsic
    /// variables of a command directory.
    pub fn as_values(&self) -> Values {
        crate::variables::from_strings(self.parameters.iter())
    }
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- stack::test_stack_parameters --exact --show-output
#[test]
fn test_stack_parameters() {
    let _ = env_logger::builder().is_test(true).try_init();

    let contents = r#"
stack_id: arn:aws:cloudformation:us-east-1:123456789012:stack/icp/abc
stack_name: icp
parameters:
  ClusterName: mycluster
  ClusterDomain: example.com
  ClusterCADomain: ""
"#;
    let mut f = tempfile::NamedTempFile::new().unwrap();
    let ret = f.write_all(contents.as_bytes());
    assert!(ret.is_ok());
    let p = f.path().to_str().unwrap();

    let ret = StackParameters::load(p);
    assert!(ret.is_ok());
    let loaded = ret.unwrap();
    assert_eq!(loaded.stack_name, "icp");
    assert_eq!(loaded.get("ClusterName"), Some("mycluster"));
    assert_eq!(loaded.get("ClusterCADomain"), None);
    assert_eq!(loaded.get("Nope"), None);

    let values = loaded.as_values();
    assert_eq!(values.len(), 3);
    assert_eq!(
        values.get("ClusterDomain"),
        Some(&serde_yaml::Value::from("example.com"))
    );

    let tmp_dir = tempfile::tempdir().unwrap();
    let synced = tmp_dir.path().join("nested").join("stack.yaml");
    let synced = synced.to_str().unwrap();
    let ret = loaded.sync(synced);
    assert!(ret.is_ok());
    let reloaded = StackParameters::load(synced).unwrap();
    assert_eq!(loaded, reloaded);
}

#[test]
fn test_stack_parameters_invalid() {
    let s = StackParameters::new("", "icp");
    assert!(matches!(s.validate(), Err(Error::MissingArgument { .. })));

    let mut f = tempfile::NamedTempFile::new().unwrap();
    let ret = f.write_all(b"stack_id: \"\"\n");
    assert!(ret.is_ok());
    let ret = StackParameters::load(f.path().to_str().unwrap());
    assert!(matches!(ret, Err(Error::InvalidConfigurationFile { .. })));

    let ret = StackParameters::load("/nonexistent/stack.yaml");
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));
}
