use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Backing errors for all templating, dispatch and invocation operations.
/// Every variant is raised at the point of detection and propagated as-is;
/// nothing in this crate retries or recovers.
#[derive(Error, Debug)]
pub enum Error {
    /// A required input or configuration value is absent.
    #[error("missing argument: {message}")]
    MissingArgument { message: String },
    /// A provided value is malformed, or a required document field is absent.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    /// A parameter name has no entry in the keyword map.
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("invalid configuration file '{path}': {message}")]
    InvalidConfigurationFile { path: String, message: String },
    /// No helper is registered for a document kind.
    #[error("command interpreter: {message}")]
    CommandInterpreter { message: String },
    /// An invoked process exited non-zero ("code" is None if killed by a signal).
    #[error("invoking '{command}' failed: {}", exit_description(.code))]
    ExternalProcess { command: String, code: Option<i32> },
    #[error("failed io on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed yaml on '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("return code {}", c),
        None => String::from("terminated by signal with no status code"),
    }
}

impl Error {
    /// Returns the error message in "String".
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Error::MissingArgument { message }
            | Error::InvalidArgument { message }
            | Error::InvalidParameter { message }
            | Error::InvalidConfiguration { message }
            | Error::CommandInterpreter { message } => message.clone(),
            Error::InvalidConfigurationFile { path, message } => {
                format!("{} ({})", message, path)
            }
            Error::ExternalProcess { command, code } => {
                format!("invoking '{}' {}", command, exit_description(code))
            }
            Error::Io { path, source } => format!("{} ({})", source, path),
            Error::Yaml { path, source } => format!("{} ({})", source, path),
        }
    }

    /// Returns the exit code of the failed process, if this is a process failure.
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ExternalProcess { code, .. } => *code,
            _ => None,
        }
    }

    pub(crate) fn io(path: impl AsRef<str>, source: io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_string(),
            source,
        }
    }

    pub(crate) fn yaml(path: impl AsRef<str>, source: serde_yaml::Error) -> Self {
        Error::Yaml {
            path: path.as_ref().to_string(),
            source,
        }
    }
}

#[test]
fn test_error_message() {
    let e = Error::ExternalProcess {
        command: String::from("docker load -i /tmp/x.tar"),
        code: Some(2),
    };
    assert_eq!(e.exit_code(), Some(2));
    assert_eq!(e.message(), "invoking 'docker load -i /tmp/x.tar' return code 2");
    assert_eq!(
        e.to_string(),
        "invoking 'docker load -i /tmp/x.tar' failed: return code 2"
    );

    let e = Error::ExternalProcess {
        command: String::from("kubectl apply"),
        code: None,
    };
    assert!(e.message().contains("terminated by signal"));

    let e = Error::InvalidConfigurationFile {
        path: String::from("cmds/variables.yaml"),
        message: String::from("expected a VariableKeywordMap attribute"),
    };
    assert_eq!(
        e.message(),
        "expected a VariableKeywordMap attribute (cmds/variables.yaml)"
    );
    assert_eq!(e.exit_code(), None);
}
