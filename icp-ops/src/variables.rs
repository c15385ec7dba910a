use std::{collections::BTreeMap, fs::File, path::Path};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::errors::{Error, Result};

/// The "kind" of the document that holds the variables of a command directory.
pub const KIND: &str = "variables";

/// Maps a logical parameter name to the macro keyword used in templates.
/// e.g., "Image" to "IMAGE_NAME" for the "${IMAGE_NAME}" macro.
pub type KeywordMap = BTreeMap<String, String>;

/// Maps a logical parameter name to its value.
pub type Values = BTreeMap<String, Value>;

/// Maps a macro keyword to a format string applied only when that macro is
/// substituted. "{}" in the format string is replaced with the value.
pub type SpecialValues = BTreeMap<String, String>;

/// Represents the "variables" document of a command directory.
///
/// ```yaml
/// kind: variables
/// VariableKeywordMap:
///   Image: IMAGE_NAME
/// VariableValues:
///   Image: nginx:latest
/// IntrinsicVariables:
///   - ClusterName
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct VariablesFile {
    #[serde(default)]
    pub kind: String,

    #[serde(rename = "VariableKeywordMap", default)]
    pub keyword_map: KeywordMap,

    /// Custom defaults, the lowest precedence layer of the merge.
    #[serde(rename = "VariableValues", default)]
    pub values: Values,

    /// Names that must have a value once all layers are merged.
    #[serde(rename = "IntrinsicVariables", default)]
    pub intrinsic_variables: Vec<String>,
}

impl VariablesFile {
    pub fn load(file_path: &str) -> Result<Self> {
        log::info!("loading VariablesFile from {}", file_path);

        if !Path::new(file_path).exists() {
            return Err(Error::MissingArgument {
                message: format!("variables file {} does not exist", file_path),
            });
        }

        let f = File::open(file_path).map_err(|e| Error::io(file_path, e))?;
        let loaded: VariablesFile =
            serde_yaml::from_reader(f).map_err(|e| Error::yaml(file_path, e))?;
        loaded.validate(file_path)?;
        Ok(loaded)
    }

    /// Validates the variables file.
    pub fn validate(&self, file_path: &str) -> Result<()> {
        if self.kind != KIND {
            return Err(Error::InvalidConfigurationFile {
                path: file_path.to_string(),
                message: format!("expected kind '{}', found '{}'", KIND, self.kind),
            });
        }
        if self.keyword_map.is_empty() {
            return Err(Error::InvalidConfigurationFile {
                path: file_path.to_string(),
                message: String::from("expected a non-empty VariableKeywordMap attribute"),
            });
        }
        for name in self.intrinsic_variables.iter() {
            if !self.keyword_map.contains_key(name) {
                return Err(Error::InvalidConfigurationFile {
                    path: file_path.to_string(),
                    message: format!(
                        "intrinsic variable '{}' has no entry in VariableKeywordMap",
                        name
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Overwrites "base" with the non-null values in "overrides" for every name
/// in "names". Names not listed are ignored.
pub fn merge_values<'a>(names: impl IntoIterator<Item = &'a String>, base: &mut Values, overrides: &Values) {
    for name in names {
        let v = match overrides.get(name) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        match base.get(name) {
            Some(prev) if !prev.is_null() => {
                log::debug!("replacing value of {}: {:?} with {:?}", name, prev, v)
            }
            _ => log::debug!("adding variable value {}: {:?}", name, v),
        }
        base.insert(name.clone(), v.clone());
    }
}

/// Returns the names in "required" that have no usable value in "values".
pub fn unresolved<'a>(required: &'a [String], values: &Values) -> Vec<&'a str> {
    required
        .iter()
        .filter(|name| match values.get(*name) {
            Some(v) => v.is_null(),
            None => true,
        })
        .map(|name| name.as_str())
        .collect()
}

/// Renders a scalar YAML value as its plain text form.
/// Null becomes the empty string. Collections are rejected.
pub fn scalar_string(v: &Value) -> Result<String> {
    match v {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Tagged(t) => scalar_string(&t.value),
        Value::Sequence(_) | Value::Mapping(_) => Err(Error::InvalidArgument {
            message: format!("expected a scalar value, found {:?}", v),
        }),
    }
}

/// Converts plain strings into variable values.
pub fn from_strings<'a>(pairs: impl IntoIterator<Item = (&'a String, &'a String)>) -> Values {
    pairs
        .into_iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- variables::test_merge_precedence --exact --show-output
#[test]
fn test_merge_precedence() {
    let _ = env_logger::builder().is_test(true).try_init();

    let names: Vec<String> = vec!["A".to_string(), "B".to_string()];

    let mut values = Values::new();
    values.insert("A".to_string(), Value::from(1));
    values.insert("B".to_string(), Value::from(2));

    let mut intrinsic = Values::new();
    intrinsic.insert("B".to_string(), Value::from(3));

    let mut caller = Values::new();
    caller.insert("A".to_string(), Value::from(4));
    // not in the keyword map, so never merged
    caller.insert("C".to_string(), Value::from(5));

    merge_values(names.iter(), &mut values, &intrinsic);
    merge_values(names.iter(), &mut values, &caller);

    let mut expected = Values::new();
    expected.insert("A".to_string(), Value::from(4));
    expected.insert("B".to_string(), Value::from(3));
    assert_eq!(values, expected);
}

#[test]
fn test_merge_skips_null() {
    let names: Vec<String> = vec!["A".to_string()];
    let mut values = Values::new();
    values.insert("A".to_string(), Value::from("keep"));

    let mut overrides = Values::new();
    overrides.insert("A".to_string(), Value::Null);
    merge_values(names.iter(), &mut values, &overrides);
    assert_eq!(values.get("A"), Some(&Value::from("keep")));

    let required = vec!["A".to_string(), "B".to_string()];
    assert_eq!(unresolved(&required, &values), vec!["B"]);
}

#[test]
fn test_scalar_string() {
    assert_eq!(scalar_string(&Value::from(8981)).unwrap(), "8981");
    assert_eq!(scalar_string(&Value::from(true)).unwrap(), "true");
    assert_eq!(scalar_string(&Value::from("aws")).unwrap(), "aws");
    assert_eq!(scalar_string(&Value::Null).unwrap(), "");
    assert!(scalar_string(&Value::Sequence(vec![Value::from(1)])).is_err());
}

#[test]
fn test_variables_file_load() {
    use std::io::Write;

    let _ = env_logger::builder().is_test(true).try_init();

    let mut f = tempfile::NamedTempFile::new().unwrap();
    let ret = f.write_all(
        b"kind: variables
VariableKeywordMap:
  Image: IMAGE_NAME
  ClusterName: CLUSTER_NAME
VariableValues:
  Image: nginx:latest
IntrinsicVariables:
  - ClusterName
",
    );
    assert!(ret.is_ok());
    let p = f.path().to_str().unwrap();

    let ret = VariablesFile::load(p);
    assert!(ret.is_ok());
    let loaded = ret.unwrap();
    assert_eq!(loaded.keyword_map.get("Image").unwrap(), "IMAGE_NAME");
    assert_eq!(loaded.values.get("Image"), Some(&Value::from("nginx:latest")));
    assert_eq!(loaded.intrinsic_variables, vec!["ClusterName".to_string()]);

    let mut f = tempfile::NamedTempFile::new().unwrap();
    let ret = f.write_all(b"kind: variables\nVariableValues:\n  Image: nginx\n");
    assert!(ret.is_ok());
    let ret = VariablesFile::load(f.path().to_str().unwrap());
    assert!(matches!(ret, Err(Error::InvalidConfigurationFile { .. })));
}
