//! Templating and invocation of the docker, helm, kubectl and
//! ansible-playbook commands that install ICP on AWS.
//!
//! A command directory holds one optional "variables" document and any number
//! of command templates. Templates are rendered with "${KEYWORD}" macros into
//! a staging directory, parsed as YAML command documents, turned into argument
//! vectors by the helper registered for their "kind", and invoked in file
//! name order.

pub mod command;
pub mod document;
pub mod errors;
pub mod icp;
pub mod invoke;
pub mod pipeline;
pub mod stack;
pub mod staging;
pub mod template;
pub mod variables;
