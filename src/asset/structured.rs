//! Parse → validate → line edit strategy
//!
//! The YAML parse only decides whether the asset is structured enough to
//! edit. Edits are applied as line rewrites inside the `MonoBehaviour`
//! block of the original text, so every other line keeps its bytes. The
//! edited body is parsed again and must equal the expected document.

use serde_yaml::{Mapping, Number, Value};
use thiserror::Error;

use super::patch::{PatchRequest, PatchedField};
use super::{
    APP_ID_KEY, HOST_TYPE_KEY, HOST_TYPE_SELF_HOSTED, SERVER_ADDRESS_KEY, SERVER_PORT_KEY,
    SETTINGS_GROUP,
};

/// Why the structured strategy cannot handle an asset
///
/// Never surfaced to callers; the patcher falls back to text substitution.
#[derive(Debug, Error)]
pub(super) enum StructuredPatchUnavailable {
    #[error("not parseable as YAML: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("cannot render value for {key}: {source}")]
    Render {
        key: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("value for {0} does not fit on one line")]
    MultiLineValue(&'static str),

    #[error("document root is not a mapping")]
    RootNotMapping,

    #[error("no MonoBehaviour group")]
    MissingGroup,

    #[error("MonoBehaviour is not a mapping")]
    GroupNotMapping,

    #[error("MonoBehaviour is not a block mapping")]
    GroupNotBlock,

    #[error("edited settings no longer parse: {0}")]
    Reparse(#[source] serde_yaml::Error),

    #[error("edited settings do not read back as requested")]
    Mismatch,
}

pub(super) struct StructuredEdit {
    pub content: String,
    pub fields: Vec<PatchedField>,
}

pub(super) fn apply(
    content: &str,
    request: &PatchRequest,
) -> Result<StructuredEdit, StructuredPatchUnavailable> {
    let (header, body) = split_header(content);

    let mut expected: Value =
        serde_yaml::from_str(body).map_err(StructuredPatchUnavailable::Parse)?;
    let group = settings_group(&mut expected)?;
    let mut block = GroupBlock::find(body)?;

    let mut edits = Vec::new();
    if let Some(app_id) = &request.app_id {
        edits.push((APP_ID_KEY, Value::String(app_id.clone()), PatchedField::AppId));
    }
    if let Some(server) = &request.server {
        edits.extend([
            (HOST_TYPE_KEY, Value::Number(Number::from(HOST_TYPE_SELF_HOSTED)), PatchedField::HostType),
            (SERVER_ADDRESS_KEY, Value::String(server.address.clone()), PatchedField::ServerAddress),
            (SERVER_PORT_KEY, Value::Number(Number::from(u64::from(server.port))), PatchedField::ServerPort),
        ]);
    }

    let mut fields = Vec::new();
    for (key, value, field) in edits {
        let rendered = render(key, &value)?;
        if set(group, key, value) {
            block.set(key, &rendered);
            fields.push(field);
        }
    }

    let patched_body = block.into_body();
    let reread: Value =
        serde_yaml::from_str(&patched_body).map_err(StructuredPatchUnavailable::Reparse)?;
    if reread != expected {
        return Err(StructuredPatchUnavailable::Mismatch);
    }

    let mut patched = String::with_capacity(header.len() + patched_body.len());
    patched.push_str(header);
    patched.push_str(&patched_body);

    Ok(StructuredEdit {
        content: patched,
        fields,
    })
}

fn settings_group(root: &mut Value) -> Result<&mut Mapping, StructuredPatchUnavailable> {
    root.as_mapping_mut()
        .ok_or(StructuredPatchUnavailable::RootNotMapping)?
        .get_mut(SETTINGS_GROUP)
        .ok_or(StructuredPatchUnavailable::MissingGroup)?
        .as_mapping_mut()
        .ok_or(StructuredPatchUnavailable::GroupNotMapping)
}

/// Set `key`, returning whether its value changed
fn set(group: &mut Mapping, key: &str, value: Value) -> bool {
    let previous = group.insert(Value::String(key.to_string()), value.clone());
    previous.as_ref() != Some(&value)
}

/// One-line YAML scalar for `value`, quoted when plain text would re-read
/// as another type
fn render(key: &'static str, value: &Value) -> Result<String, StructuredPatchUnavailable> {
    let text = serde_yaml::to_string(value)
        .map_err(|source| StructuredPatchUnavailable::Render { key, source })?;
    let text = text.trim_end_matches('\n');
    if text.contains('\n') {
        return Err(StructuredPatchUnavailable::MultiLineValue(key));
    }
    Ok(text.to_string())
}

/// Split Unity's `%YAML` / `%TAG` directives and `--- !u!` document marker
/// from the body. The header is re-emitted byte for byte.
fn split_header(content: &str) -> (&str, &str) {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.starts_with('%') || line.starts_with("---") {
            offset += line.len();
        } else {
            break;
        }
    }
    content.split_at(offset)
}

/// The `MonoBehaviour:` block of the body as editable lines
struct GroupBlock {
    lines: Vec<String>,
    /// First line after the last non-blank line of the block
    end: usize,
    start: usize,
    indent: usize,
    newline: &'static str,
}

impl GroupBlock {
    fn find(body: &str) -> Result<Self, StructuredPatchUnavailable> {
        let lines: Vec<String> = body.split_inclusive('\n').map(str::to_string).collect();
        let start = lines
            .iter()
            .position(|line| is_group_line(line))
            .ok_or(StructuredPatchUnavailable::GroupNotBlock)?;

        let mut end = start + 1;
        let mut indent = None;
        for (i, line) in lines.iter().enumerate().skip(start + 1) {
            if line.trim().is_empty() {
                continue;
            }
            let width = indent_of(line);
            if width == 0 {
                break;
            }
            indent.get_or_insert(width);
            end = i + 1;
        }
        let indent = indent.ok_or(StructuredPatchUnavailable::GroupNotBlock)?;
        let newline = if lines[start].ends_with("\r\n") { "\r\n" } else { "\n" };

        Ok(Self {
            lines,
            end,
            start,
            indent,
            newline,
        })
    }

    /// Rewrite the line holding `key`, or append it at the end of the block
    fn set(&mut self, key: &str, rendered: &str) {
        let prefix = format!("{}{}:", " ".repeat(self.indent), key);
        let found = (self.start + 1..self.end).find(|&i| {
            self.lines[i]
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t', '\r', '\n']))
        });

        match found {
            Some(i) => {
                let ending = line_ending(&self.lines[i]);
                self.lines[i] = format!("{prefix} {rendered}{ending}");

                // nested continuation lines of the old value
                let mut next = i + 1;
                while next < self.end
                    && !self.lines[next].trim().is_empty()
                    && indent_of(&self.lines[next]) > self.indent
                {
                    next += 1;
                }
                self.lines.drain(i + 1..next);
                self.end -= next - (i + 1);
            }
            None => {
                let last = self.end - 1;
                if !self.lines[last].ends_with('\n') {
                    self.lines[last].push_str(self.newline);
                }
                self.lines
                    .insert(self.end, format!("{prefix} {rendered}{}", self.newline));
                self.end += 1;
            }
        }
    }

    fn into_body(self) -> String {
        self.lines.concat()
    }
}

fn is_group_line(line: &str) -> bool {
    line.strip_prefix(SETTINGS_GROUP)
        .and_then(|rest| rest.strip_prefix(':'))
        .is_some_and(|rest| rest.trim().is_empty())
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}
