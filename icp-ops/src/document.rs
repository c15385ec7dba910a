use std::{collections::BTreeMap, fs, path::Path};

use serde::{de, Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};

use crate::{
    errors::{Error, Result},
    variables,
};

/// Status value set on a command document once its command has been invoked.
pub const STATUS_PROCESSED: &str = "PROCESSED";

/// Ordered name-value pairs for options, env vars, network options and helm
/// set-values. Unlike a mapping, the same name may appear more than once
/// (e.g., "-f" given twice).
///
/// Accepts either a YAML mapping, or a sequence of single-entry mappings:
///
/// ```yaml
/// options:
///   - f: first
///   - f: second
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pairs(pub Vec<(String, String)>);

impl Pairs {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn from_value(v: &Value) -> Result<Self> {
        let mut pairs = Vec::new();
        match v {
            Value::Null => {}
            Value::Mapping(m) => push_mapping(m, &mut pairs)?,
            Value::Sequence(seq) => {
                for entry in seq {
                    match entry {
                        Value::Mapping(m) => push_mapping(m, &mut pairs)?,
                        _ => {
                            return Err(Error::InvalidArgument {
                                message: format!(
                                    "expected a name-value mapping in sequence, found {:?}",
                                    entry
                                ),
                            })
                        }
                    }
                }
            }
            _ => {
                return Err(Error::InvalidArgument {
                    message: format!("expected a mapping or a sequence, found {:?}", v),
                })
            }
        }
        Ok(Self(pairs))
    }
}

fn push_mapping(m: &Mapping, pairs: &mut Vec<(String, String)>) -> Result<()> {
    for (k, v) in m.iter() {
        pairs.push((variables::scalar_string(k)?, variables::scalar_string(v)?));
    }
    Ok(())
}

impl<'de> Deserialize<'de> for Pairs {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        Pairs::from_value(&v).map_err(|e| de::Error::custom(e.message()))
    }
}

/// One declarative command invocation, the first YAML document in a
/// rendered command file.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CommandDocument {
    /// Selects the helper, e.g., "docker", "helm", "kubectl".
    #[serde(default)]
    pub kind: Option<String>,
    /// Sub-command, e.g., "run", "install", "apply".
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub options: Pairs,
    #[serde(default)]
    pub env: Pairs,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub network: Pairs,
    #[serde(rename = "set-values", default)]
    pub set_values: Pairs,

    /// Working directory for the invoked process.
    #[serde(default)]
    pub chdir: Option<String>,
    #[serde(default)]
    pub status: Option<String>,

    /// Remaining fields, including the command-specific positional
    /// arguments (e.g., "image", "image-command", "chart").
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl CommandDocument {
    pub fn from_value(v: &Value) -> Result<Self> {
        serde_yaml::from_value(v.clone()).map_err(|e| Error::InvalidArgument {
            message: format!("invalid command document {:?}: {}", v, e),
        })
    }

    /// Returns the sub-command or an InvalidArgument error naming the kind.
    pub fn require_command(&self) -> Result<&str> {
        match self.command.as_deref() {
            Some(c) if !c.is_empty() => Ok(c),
            _ => Err(Error::InvalidArgument {
                message: format!(
                    "a {} command document must have a command attribute",
                    self.kind.as_deref().unwrap_or("<no kind>")
                ),
            }),
        }
    }

    /// Returns the arguments for a positional field: one for a scalar,
    /// one per element for a sequence. None if the field is absent or empty.
    pub fn positional(&self, name: &str) -> Result<Option<Vec<String>>> {
        let args = match self.fields.get(name) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Sequence(seq)) => seq
                .iter()
                .map(variables::scalar_string)
                .collect::<Result<Vec<_>>>()?,
            Some(v) => vec![variables::scalar_string(v)?],
        };
        if args.is_empty() || args.iter().all(|a| a.is_empty()) {
            return Ok(None);
        }
        Ok(Some(args))
    }
}

/// Returns the "kind" of a raw YAML document, if any.
pub fn kind_of(doc: &Value) -> Option<&str> {
    doc.get("kind").and_then(Value::as_str)
}

/// Sets "status: PROCESSED" on a raw YAML mapping document.
pub fn mark_processed(doc: &mut Value) {
    if let Value::Mapping(m) = doc {
        m.insert(
            Value::String(String::from("status")),
            Value::String(String::from(STATUS_PROCESSED)),
        );
    }
}

pub fn is_processed(doc: &Value) -> bool {
    doc.get("status").and_then(Value::as_str) == Some(STATUS_PROCESSED)
}

/// Parses every YAML document in "contents". Empty documents are dropped.
/// "label" names the source in errors.
pub fn parse_all(label: &str, contents: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for d in serde_yaml::Deserializer::from_str(contents) {
        let v = Value::deserialize(d).map_err(|e| Error::yaml(label, e))?;
        if !v.is_null() {
            docs.push(v);
        }
    }
    Ok(docs)
}

/// Loads every YAML document in the file.
pub fn load_all(file_path: &Path) -> Result<Vec<Value>> {
    let label = file_path.display().to_string();
    let contents = fs::read_to_string(file_path).map_err(|e| Error::io(&label, e))?;
    parse_all(&label, &contents)
}

#[test]
fn test_command_document() {
    let docs = parse_all(
        "test",
        "kind: docker
command: run
flags: [d, rm]
options:
  name: inception
env:
  LICENSE: accept
volumes:
  - /opt/icp:/data
network:
  net: host
image: ibmcom/icp-inception:3.1.0
image-command: cp -r cluster /data
---
kind: Pod
",
    )
    .unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(kind_of(&docs[1]), Some("Pod"));

    let doc = CommandDocument::from_value(&docs[0]).unwrap();
    assert_eq!(doc.kind.as_deref(), Some("docker"));
    assert_eq!(doc.require_command().unwrap(), "run");
    assert_eq!(doc.flags, vec!["d".to_string(), "rm".to_string()]);
    assert_eq!(
        doc.options,
        Pairs(vec![("name".to_string(), "inception".to_string())])
    );
    assert_eq!(
        doc.env,
        Pairs(vec![("LICENSE".to_string(), "accept".to_string())])
    );
    assert_eq!(doc.volumes, vec!["/opt/icp:/data".to_string()]);
    assert_eq!(
        doc.positional("image").unwrap(),
        Some(vec!["ibmcom/icp-inception:3.1.0".to_string()])
    );
    assert_eq!(
        doc.positional("image-command").unwrap(),
        Some(vec!["cp -r cluster /data".to_string()])
    );
    assert_eq!(doc.positional("chart").unwrap(), None);
}

#[test]
fn test_pairs_repeated_names() {
    let docs = parse_all(
        "test",
        "kind: kubectl
command: apply
options:
  - f: first
  - f: second
  - namespace: kube-system
set-values:
  replicas: 3
  enabled: true
",
    )
    .unwrap();
    let doc = CommandDocument::from_value(&docs[0]).unwrap();
    assert_eq!(
        doc.options.iter().collect::<Vec<_>>(),
        vec![("f", "first"), ("f", "second"), ("namespace", "kube-system")]
    );
    assert_eq!(
        doc.set_values.iter().collect::<Vec<_>>(),
        vec![("replicas", "3"), ("enabled", "true")]
    );
}

#[test]
fn test_missing_command() {
    let docs = parse_all("test", "kind: docker\nimage: nginx\n").unwrap();
    let doc = CommandDocument::from_value(&docs[0]).unwrap();
    assert!(matches!(
        doc.require_command(),
        Err(Error::InvalidArgument { .. })
    ));

    let docs = parse_all("test", "kind: docker\noptions: just-a-string\n").unwrap();
    assert!(CommandDocument::from_value(&docs[0]).is_err());
}

#[test]
fn test_mark_processed() {
    let mut docs = parse_all("test", "kind: docker\ncommand: load\n").unwrap();
    assert!(!is_processed(&docs[0]));
    mark_processed(&mut docs[0]);
    assert!(is_processed(&docs[0]));
}
