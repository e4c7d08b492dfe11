//! Literal substitution strategy
//!
//! Works on any text. Each field is only touched when its stock literal is
//! present; a missing literal leaves that field as it was. Assets that are
//! not valid UTF-8 are edited run by run, and the non-text bytes between
//! runs are copied through unchanged.

use regex_lite::{NoExpand, Regex};

use super::patch::{PatchError, PatchRequest, PatchedField};
use super::{DEFAULT_APP_ID, DEFAULT_SERVER_PORT, HOST_TYPE_CLOUD, HOST_TYPE_SELF_HOSTED};

pub(super) struct TextEdit {
    pub content: String,
    pub fields: Vec<PatchedField>,
}

pub(super) struct ByteEdit {
    pub content: Vec<u8>,
    pub fields: Vec<PatchedField>,
}

/// Substitute inside each UTF-8 run of a text/binary hybrid
pub(super) fn apply_bytes(content: &[u8], request: &PatchRequest) -> Result<ByteEdit, PatchError> {
    let mut patched = Vec::with_capacity(content.len());
    let mut matched = Vec::new();

    for chunk in content.utf8_chunks() {
        let run = chunk.valid();
        if !run.is_empty() {
            let edit = apply(run, request)?;
            patched.extend_from_slice(edit.content.as_bytes());
            matched.extend(edit.fields);
        }
        patched.extend_from_slice(chunk.invalid());
    }

    let fields = [
        PatchedField::AppId,
        PatchedField::HostType,
        PatchedField::ServerAddress,
        PatchedField::ServerPort,
    ]
    .into_iter()
    .filter(|field| matched.contains(field))
    .collect();

    Ok(ByteEdit {
        content: patched,
        fields,
    })
}

pub(super) fn apply(content: &str, request: &PatchRequest) -> Result<TextEdit, PatchError> {
    let mut text = content.to_string();
    let mut fields = Vec::new();

    if let Some(app_id) = &request.app_id {
        if text.contains(DEFAULT_APP_ID) {
            text = text.replace(DEFAULT_APP_ID, app_id);
            fields.push(PatchedField::AppId);
        }
    }

    if let Some(server) = &request.server {
        let host_type = Regex::new(&format!(r"\bHostType: {HOST_TYPE_CLOUD}\b"))?;
        if replace(&mut text, &host_type, &format!("HostType: {HOST_TYPE_SELF_HOSTED}")) {
            fields.push(PatchedField::HostType);
        }

        // the whole value up to end of line, so an existing address is replaced
        let address = Regex::new(r"\bServerAddress:[^\r\n]*")?;
        if replace(&mut text, &address, &format!("ServerAddress: {}", server.address)) {
            fields.push(PatchedField::ServerAddress);
        }

        let port = Regex::new(&format!(r"\bServerPort: {DEFAULT_SERVER_PORT}\b"))?;
        if replace(&mut text, &port, &format!("ServerPort: {}", server.port)) {
            fields.push(PatchedField::ServerPort);
        }
    }

    Ok(TextEdit {
        content: text,
        fields,
    })
}

/// Replace every match; true if anything matched
fn replace(text: &mut String, re: &Regex, with: &str) -> bool {
    if !re.is_match(text.as_str()) {
        return false;
    }
    *text = re.replace_all(text.as_str(), NoExpand(with)).into_owned();
    true
}
