use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::Write,
};

use crate::{
    errors::{Error, Result},
    variables::{self, KeywordMap, SpecialValues, Values},
};

/// How many times a parameter may be substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every macro on every line is substituted.
    EveryLine,
    /// At most one macro per line, and each parameter at most once in the
    /// whole template: after its first substitution a parameter is dropped
    /// from the candidates (used for ICP "config.yaml" and EFS var files).
    OncePerParameter,
}

/// Returns the macro text for a keyword, e.g., "${CLUSTER_NAME}".
pub fn macro_for(keyword: &str) -> String {
    format!("${{{}}}", keyword)
}

/// Applies a special format string, replacing "{}" (or "{0}") with the value.
/// e.g., "{}:/" turns "fs-1234.efs.amazonaws.com" into "fs-1234.efs.amazonaws.com:/".
pub fn apply_format(format: &str, value: &str) -> String {
    format.replace("{0}", value).replace("{}", value)
}

/// Substitutes "${KEYWORD}" macros in template text.
/// Lines starting with "#" are copied verbatim. Every output line ends with
/// a newline. Nothing in "values" is modified.
///
/// Candidate parameters are the names in "values", or the names in
/// "keyword_map" when "values" is empty.
pub fn render_str(
    contents: &str,
    values: &Values,
    keyword_map: &KeywordMap,
    special_values: &SpecialValues,
    mode: Mode,
) -> Result<String> {
    if !values.is_empty() && keyword_map.is_empty() {
        return Err(Error::InvalidParameter {
            message: String::from("a keyword map must be provided if there are substitution parameters"),
        });
    }

    let names: Vec<&String> = if values.is_empty() {
        keyword_map.keys().collect()
    } else {
        values.keys().collect()
    };

    // check every candidate upfront, so no partial output is ever produced
    for name in names.iter() {
        if !keyword_map.contains_key(*name) {
            return Err(Error::InvalidParameter {
                message: format!(
                    "the parameter name: {} was not found in the keyword map: {:?}",
                    name, keyword_map
                ),
            });
        }
    }

    let mut active: BTreeSet<&String> = names.into_iter().collect();
    let mut rendered = String::with_capacity(contents.len());

    // "lines" strips both "\n" and "\r\n"
    for line in contents.lines() {
        if line.starts_with('#') || active.is_empty() {
            rendered.push_str(line);
            rendered.push('\n');
            continue;
        }

        let mut new_line = line.to_string();
        let mut substituted: Vec<&String> = Vec::new();
        for name in active.iter() {
            let keyword = &keyword_map[*name];
            let m = macro_for(keyword);
            if !new_line.contains(&m) {
                continue;
            }

            let value = match values.get(*name) {
                Some(v) => variables::scalar_string(v)?,
                None => {
                    return Err(Error::MissingArgument {
                        message: format!("no value for parameter {} (macro {})", name, m),
                    })
                }
            };
            let value = match special_values.get(keyword) {
                Some(format) => apply_format(format, &value),
                None => value,
            };

            log::debug!("LINE: {}\n\tReplacing: {} with: {}", new_line, m, value);
            new_line = new_line.replace(&m, &value);
            substituted.push(*name);

            if mode == Mode::OncePerParameter {
                break;
            }
        }

        if !substituted.is_empty() {
            log::debug!("NEW LINE: {}", new_line);
        }
        if mode == Mode::OncePerParameter {
            for name in substituted {
                active.remove(name);
            }
        }

        rendered.push_str(&new_line);
        rendered.push('\n');
    }

    Ok(rendered)
}

/// Renders the template file and returns the text.
pub fn render(
    template_path: &str,
    values: &Values,
    keyword_map: &KeywordMap,
    special_values: &SpecialValues,
    mode: Mode,
) -> Result<String> {
    let contents = fs::read_to_string(template_path).map_err(|e| {
        log::error!("failed to read template file {}: {}", template_path, e);
        Error::io(template_path, e)
    })?;
    render_str(&contents, values, keyword_map, special_values, mode).map_err(|e| {
        log::error!("failed to render template file {}: {}", template_path, e);
        e
    })
}

/// Renders the template file into "output_path".
/// The output file is only created once rendering has succeeded.
pub fn create_file(
    output_path: &str,
    template_path: &str,
    values: &Values,
    keyword_map: &KeywordMap,
    special_values: &SpecialValues,
    mode: Mode,
) -> Result<()> {
    log::info!("creating {} from template {}", output_path, template_path);
    let rendered = render(template_path, values, keyword_map, special_values, mode)?;

    let mut f = File::create(output_path).map_err(|e| {
        log::error!(
            "failed creating file: {} from template file: {} ({})",
            output_path,
            template_path,
            e
        );
        Error::io(output_path, e)
    })?;
    f.write_all(rendered.as_bytes())
        .map_err(|e| Error::io(output_path, e))
}

#[cfg(test)]
fn keyword_map(pairs: &[(&str, &str)]) -> KeywordMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
fn values(pairs: &[(&str, &str)]) -> Values {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_yaml::Value::from(*v)))
        .collect()
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- template::test_render_str --exact --show-output
#[test]
fn test_render_str() {
    let _ = env_logger::builder().is_test(true).try_init();

    let k = keyword_map(&[("Image", "IMAGE_NAME")]);
    let v = values(&[("Image", "nginx:latest")]);

    let ret = render_str("image: ${IMAGE_NAME}", &v, &k, &SpecialValues::new(), Mode::EveryLine);
    assert!(ret.is_ok());
    assert_eq!(ret.unwrap(), "image: nginx:latest\n");

    // deterministic
    let t = "kind: docker\r\nimage: ${IMAGE_NAME}\r\n\r\n";
    let a = render_str(t, &v, &k, &SpecialValues::new(), Mode::EveryLine).unwrap();
    let b = render_str(t, &v, &k, &SpecialValues::new(), Mode::EveryLine).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, "kind: docker\nimage: nginx:latest\n\n");
}

#[test]
fn test_render_comment_pass_through() {
    let k = keyword_map(&[("Image", "IMAGE_NAME")]);
    let v = values(&[("Image", "nginx")]);
    let t = "# image: ${IMAGE_NAME}\n  # indented ${IMAGE_NAME}\nimage: ${IMAGE_NAME}\n";
    let rendered = render_str(t, &v, &k, &SpecialValues::new(), Mode::EveryLine).unwrap();
    assert_eq!(
        rendered,
        "# image: ${IMAGE_NAME}\n  # indented nginx\nimage: nginx\n"
    );
}

#[test]
fn test_render_multiple_macros() {
    let k = keyword_map(&[("Name", "NAME"), ("Tag", "TAG")]);
    let v = values(&[("Name", "icp-inception"), ("Tag", "3.1.0")]);
    let t = "image: ${NAME}:${TAG}\nname: ${NAME}\n";

    let rendered = render_str(t, &v, &k, &SpecialValues::new(), Mode::EveryLine).unwrap();
    assert_eq!(rendered, "image: icp-inception:3.1.0\nname: icp-inception\n");

    // once per parameter: one macro per line, and each parameter replaced once
    let rendered = render_str(t, &v, &k, &SpecialValues::new(), Mode::OncePerParameter).unwrap();
    assert_eq!(rendered, "image: icp-inception:${TAG}\nname: ${NAME}\n");
}

#[test]
fn test_render_special_values() {
    let k = keyword_map(&[("MountSource", "MOUNT_SOURCE"), ("MountPoint", "MOUNT_POINT")]);
    let v = values(&[("MountSource", "fs-1.efs.amazonaws.com"), ("MountPoint", "/data")]);
    let mut special = SpecialValues::new();
    special.insert("MOUNT_SOURCE".to_string(), "{}:/".to_string());

    let t = "mount_source: ${MOUNT_SOURCE}\nmount_point: ${MOUNT_POINT}\n";
    let rendered = render_str(t, &v, &k, &special, Mode::OncePerParameter).unwrap();
    assert_eq!(
        rendered,
        "mount_source: fs-1.efs.amazonaws.com:/\nmount_point: /data\n"
    );
    // stored values are untouched
    assert_eq!(
        v.get("MountSource"),
        Some(&serde_yaml::Value::from("fs-1.efs.amazonaws.com"))
    );
}

#[test]
fn test_render_unknown_keyword() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let template_path = tmp_dir.path().join("cmd.yaml");
    fs::write(&template_path, "image: ${IMAGE_NAME}\n").unwrap();
    let output_path = tmp_dir.path().join("cmd-command.yaml");

    let k = keyword_map(&[("Image", "IMAGE_NAME")]);
    let v = values(&[("Image", "nginx"), ("Tag", "latest")]);

    let ret = create_file(
        output_path.to_str().unwrap(),
        template_path.to_str().unwrap(),
        &v,
        &k,
        &SpecialValues::new(),
        Mode::EveryLine,
    );
    assert!(matches!(ret, Err(Error::InvalidParameter { .. })));
    assert!(!output_path.exists());

    // values without a keyword map
    let ret = render_str("x", &v, &KeywordMap::new(), &SpecialValues::new(), Mode::EveryLine);
    assert!(matches!(ret, Err(Error::InvalidParameter { .. })));
}

#[test]
fn test_create_file() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let template_path = tmp_dir.path().join("cmd.yaml");
    fs::write(&template_path, "# comment\nkind: helm\nchart: ${CHART}").unwrap();
    let output_path = tmp_dir.path().join("cmd-command.yaml");

    let k = keyword_map(&[("Chart", "CHART")]);
    let v = values(&[("Chart", "ibm-charts/ibm-mq")]);
    let ret = create_file(
        output_path.to_str().unwrap(),
        template_path.to_str().unwrap(),
        &v,
        &k,
        &SpecialValues::new(),
        Mode::EveryLine,
    );
    assert!(ret.is_ok());
    assert_eq!(
        fs::read_to_string(&output_path).unwrap(),
        "# comment\nkind: helm\nchart: ibm-charts/ibm-mq\n"
    );

    // keyword-only mode with a macro present but no value
    let ret = render(
        template_path.to_str().unwrap(),
        &Values::new(),
        &k,
        &SpecialValues::new(),
        Mode::EveryLine,
    );
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));

    let ret = render(
        tmp_dir.path().join("missing.yaml").to_str().unwrap(),
        &v,
        &k,
        &SpecialValues::new(),
        Mode::EveryLine,
    );
    assert!(matches!(ret, Err(Error::Io { .. })));
}
