use std::path::Path;

use serde_yaml::Value;

use crate::{
    command::{self, ArgBuilder, RenderedCommand},
    errors::Result,
};

pub const KIND: &str = "helm";

/// Used when a helm document has no "command".
pub const DEFAULT_COMMAND: &str = "install";

/// Nameless helm arguments, appended after flags, options and set-values.
/// The chart is optional (e.g., "helm repo update" has none).
const POSITIONAL_ARGS: &[&str] = &["chart"];

/// Builds helm commands, e.g., "helm install --name x --set a=b ibm-charts/foo".
/// Assumes helm is installed and configured on the node.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelmHelper;

impl command::Helper for HelmHelper {
    fn create_command(&self, docs: &[Value], _staging_dir: &Path) -> Result<RenderedCommand> {
        let doc = command::first_document(docs, KIND)?;

        let mut b = ArgBuilder::new("helm");
        b.arg(doc.command.as_deref().unwrap_or(DEFAULT_COMMAND));
        b.flags(&doc.flags)?;
        b.options(&doc.options)?;
        b.set_values(&doc.set_values);

        for name in POSITIONAL_ARGS {
            if let Some(values) = doc.positional(name)? {
                for v in values {
                    b.arg(v);
                }
            }
        }

        Ok(b.build())
    }
}

#[test]
fn test_install() {
    let docs = crate::document::parse_all(
        "test",
        "kind: helm
flags: [tls]
options:
  name: liberty
  namespace: default
set-values:
  image.tag: 19.0.0.1
  replicaCount: 2
chart: ibm-charts/ibm-websphere-liberty
",
    )
    .unwrap();

    let c = command::Helper::create_command(&HelmHelper, &docs, Path::new("/tmp")).unwrap();
    assert_eq!(
        c.args(),
        &[
            "helm",
            "install",
            "--tls",
            "--name",
            "liberty",
            "--namespace",
            "default",
            "--set",
            "image.tag=19.0.0.1",
            "--set",
            "replicaCount=2",
            "ibm-charts/ibm-websphere-liberty",
        ]
    );
}

#[test]
fn test_without_chart() {
    let docs = crate::document::parse_all("test", "kind: helm\ncommand: repo\nimage-command: ignored\n").unwrap();
    let c = command::Helper::create_command(&HelmHelper, &docs, Path::new("/tmp")).unwrap();
    assert_eq!(c.to_string(), "helm repo");
}
