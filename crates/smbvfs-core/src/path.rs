//! Path normalization for scheme-qualified SMB paths.
//!
//! Two forms of a path are in play:
//!
//! - the *qualified* form, `<scheme>://[<token>@]<host>/<share>/<path...>`, which
//!   is what callers and the protocol client see, and
//! - the *inner* form, `/<host>/<share>/<path...>`, which is what a resource
//!   stores. The inner form never holds a scheme or credentials.
//!
//! [`PathCodec`] converts between them for one provider's scheme. [`merge`] and
//! [`parent_of`] are scheme-agnostic helpers.

use percent_encoding::percent_decode_str;
use regex::Regex;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::credential::{Credential, decrypt_user_info};

/// Per-scheme path conversions.
#[derive(Debug, Clone)]
pub struct PathCodec {
    /// `<scheme>://`
    prefix: String,
    /// Matches `<scheme>://<user-info>@` at the start of a path.
    credential_pattern: Regex,
}

impl PathCodec {
    pub fn new(scheme: &str) -> Result<Self, regex::Error> {
        let prefix = format!("{scheme}://");
        let credential_pattern = Regex::new(&format!("^{}[^/]*@", regex::escape(&prefix)))?;
        Ok(Self {
            prefix,
            credential_pattern,
        })
    }

    /// The `<scheme>://` prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_qualified(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Replace a leading `<scheme>://` with `/`. Other paths pass through.
    pub fn strip_scheme(&self, path: &str) -> String {
        match path.strip_prefix(&self.prefix) {
            Some(rest) => format!("/{rest}"),
            None => path.to_string(),
        }
    }

    /// Build the qualified form of `path`.
    ///
    /// A path that already starts with the scheme prefix is returned unchanged.
    /// Otherwise one leading separator is dropped, the obfuscated credential
    /// (when non-empty) is prepended with `@`, and then the prefix.
    pub fn qualify(&self, path: &str, credential: Option<&Credential>) -> String {
        if self.is_qualified(path) {
            return path.to_string();
        }
        let rest = path
            .strip_prefix('/')
            .or_else(|| path.strip_prefix('\\'))
            .unwrap_or(path);

        let token = credential.map(Credential::to_token).unwrap_or_default();
        let mut out = String::with_capacity(self.prefix.len() + token.len() + 1 + rest.len());
        out.push_str(&self.prefix);
        if !token.is_empty() {
            out.push_str(&token);
            out.push('@');
        }
        out.push_str(rest);
        out
    }

    /// Pull the user-info segment out of `path` and decode it.
    ///
    /// Never fails: a path that can't be parsed, or a token that can't be
    /// decrypted, yields the anonymous credential.
    pub fn extract_credential(&self, path: &str) -> Credential {
        let schemeless = self.strip_scheme(path);
        let schemeless = schemeless.strip_prefix('/').unwrap_or(&schemeless);

        // A non-special scheme keeps the host opaque, so numeric labels parse
        let url = match Url::parse(&format!("{USER_INFO_SCHEME}://{schemeless}")) {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, "Path is not URL-shaped, using anonymous credential");
                return Credential::anonymous();
            }
        };

        let mut user_info = Zeroizing::new(decode_component(url.username()));
        if let Some(password) = url.password() {
            user_info.push(':');
            user_info.push_str(&decode_component(password));
        }
        if user_info.is_empty() {
            return Credential::anonymous();
        }

        match decrypt_user_info(&user_info) {
            Ok(plain) => Credential::parse(&Zeroizing::new(plain)),
            Err(e) => {
                debug!(error = %e, "Undecodable credential token, using anonymous credential");
                Credential::anonymous()
            }
        }
    }

    /// Qualify `path` and remove a `<user-info>@` segment right after the prefix.
    ///
    /// The result keeps the scheme prefix. Nothing after the host is altered.
    pub fn strip_credential(&self, path: &str) -> String {
        let qualified = self.qualify(path, None);
        self.credential_pattern
            .replace(&qualified, regex::NoExpand(&self.prefix))
            .into_owned()
    }
}

/// Placeholder scheme used only to split user-info off a schemeless path.
const USER_INFO_SCHEME: &str = "x-userinfo";

fn decode_component(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Parent of `path`.
///
/// Trailing separators are trimmed first. The parent is everything before the
/// last `/` or `\`. Returns `""` when there is no separator, or when the only
/// separator is the first character.
pub fn parent_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        None | Some(0) => "",
        Some(index) => &trimmed[..index],
    }
}

/// Merge a relative `child` onto `parent`.
///
/// `parent` is normalized to forward slashes with a leading `/` and no trailing
/// `/`. Each leading `../` of `child` drops one parent segment. A merge that
/// climbs past the root produces a path starting with `../`.
pub fn merge(parent: &str, child: &str) -> String {
    let child = match child {
        "" | "." => return parent.to_string(),
        ".." => "../".to_string(),
        other => prettify(other),
    };
    let mut parent = translate(parent);
    let mut child = child.strip_prefix("./").unwrap_or(&child);

    if child.starts_with('/') {
        return parent + child;
    }
    if !child.starts_with('.') {
        return format!("{parent}/{child}");
    }

    while let Some(rest) = child.strip_prefix("../") {
        parent = remove_last_segment(parent);
        child = rest;
    }
    if child.starts_with('/') {
        parent + child
    } else {
        format!("{parent}/{child}")
    }
}

/// Forward slashes, leading `/`, no trailing `/`.
fn translate(path: &str) -> String {
    let mut out = path.replace('\\', "/");
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Forward slashes with duplicate separators collapsed.
fn prettify(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars().map(|c| if c == '\\' { '/' } else { c }) {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

fn remove_last_segment(path: String) -> String {
    if path.is_empty() || path == "/" {
        return "..".to_string();
    }
    if path.ends_with("..") {
        return path + "/..";
    }
    match path.rfind('/') {
        Some(index) => path[..index].to_string(),
        None => "..".to_string(),
    }
}
