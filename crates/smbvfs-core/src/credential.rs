//! Credential codec for credential-bearing SMB paths.
//!
//! A path may carry a user-info segment (`domain;username:password`) between the
//! scheme and the host. Such segments are stored in an obfuscated form: a fixed
//! prefix followed by unpadded URL-safe base64 of the UTF-8 user-info. The
//! obfuscation keeps plaintext secrets out of path strings; it is reversible and
//! is not a security boundary.

use std::fmt;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use zeroize::Zeroizing;

/// Marker that starts every obfuscated user-info token.
pub const ENCRYPTED_PREFIX: &str = "$smb-enc$";

/// URL-safe base64, no padding on encode, padding tolerated on decode.
const USER_INFO_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors from decoding an obfuscated user-info token.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("invalid base64 in credential token: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("credential token is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Obfuscate a user-info string for inclusion in a path.
///
/// Empty input passes through unchanged.
pub fn encrypt_user_info(user_info: &str) -> String {
    if user_info.is_empty() {
        return String::new();
    }
    let mut token = String::with_capacity(ENCRYPTED_PREFIX.len() + user_info.len() * 4 / 3 + 4);
    token.push_str(ENCRYPTED_PREFIX);
    USER_INFO_ENGINE.encode_string(user_info.as_bytes(), &mut token);
    token
}

/// Reverse [`encrypt_user_info`].
///
/// A token without [`ENCRYPTED_PREFIX`] is treated as plain user-info and
/// returned unchanged.
pub fn decrypt_user_info(token: &str) -> Result<String, CredentialError> {
    let Some(encoded) = token.strip_prefix(ENCRYPTED_PREFIX) else {
        return Ok(token.to_string());
    };
    let bytes = USER_INFO_ENGINE.decode(encoded)?;
    Ok(String::from_utf8(bytes)?)
}

/// Whether `token` is in obfuscated form.
pub fn is_encrypted_user_info(token: &str) -> bool {
    token.starts_with(ENCRYPTED_PREFIX)
}

/// A (domain, username, password) triple. Any field may be absent.
///
/// Empty strings are normalized to absent, so a credential built from `""`
/// compares equal to [`Credential::anonymous`].
#[derive(Clone, Default)]
pub struct Credential {
    domain: Option<String>,
    username: Option<String>,
    password: Option<SecretString>,
}

impl Credential {
    pub fn new(domain: Option<&str>, username: Option<&str>, password: Option<&str>) -> Self {
        Self {
            domain: non_empty(domain).map(str::to_string),
            username: non_empty(username).map(str::to_string),
            password: non_empty(password).map(|p| SecretString::from(p.to_string())),
        }
    }

    /// The all-empty credential.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Parse the `domain;username:password` user-info syntax.
    ///
    /// Splits on the first `;` (domain) and then the first `:` of the remainder
    /// (password). Without `;` there is no domain; without `:` the remainder is
    /// the username and the password is empty.
    pub fn parse(user_info: &str) -> Self {
        if user_info.is_empty() {
            return Self::anonymous();
        }
        let (domain, rest) = match user_info.split_once(';') {
            Some((domain, rest)) => (Some(domain), rest),
            None => (None, user_info),
        };
        let (username, password) = match rest.split_once(':') {
            Some((user, pass)) => (user, Some(pass)),
            None => (rest, None),
        };
        Self::new(domain, Some(username), password)
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.domain.is_none() && self.username.is_none() && self.password.is_none()
    }

    /// Format as user-info, omitting empty fields.
    ///
    /// The result holds the plaintext password and is wiped on drop.
    pub fn to_user_info(&self) -> Zeroizing<String> {
        let mut out = Zeroizing::new(String::new());
        if let Some(domain) = &self.domain {
            out.push_str(domain);
            out.push(';');
        }
        if let Some(username) = &self.username {
            out.push_str(username);
        }
        if let Some(password) = &self.password {
            out.push(':');
            out.push_str(password.expose_secret());
        }
        out
    }

    /// Obfuscated user-info token, empty for the anonymous credential.
    pub fn to_token(&self) -> String {
        encrypt_user_info(&self.to_user_info())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain
            && self.username == other.username
            && self.password.as_ref().map(ExposeSecret::expose_secret)
                == other.password.as_ref().map(ExposeSecret::expose_secret)
    }
}

impl Eq for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn encrypt_decrypt_round_trip(s in "\\PC*") {
            let token = encrypt_user_info(&s);
            if !s.is_empty() {
                prop_assert!(token.starts_with(ENCRYPTED_PREFIX));
            }
            prop_assert_eq!(decrypt_user_info(&token).unwrap(), s);
        }

        #[test]
        fn decrypt_without_prefix_is_identity(s in "[a-zA-Z0-9;:@._-]*") {
            prop_assert_eq!(decrypt_user_info(&s).unwrap(), s);
        }

        #[test]
        fn parse_format_round_trip(
            domain in proptest::option::of("[^;]{1,12}"),
            username in "[^;:]{1,12}",
            password in proptest::option::of("[^;]{1,12}"),
        ) {
            let cred = Credential::new(domain.as_deref(), Some(&username), password.as_deref());
            let parsed = Credential::parse(&cred.to_user_info());
            prop_assert_eq!(parsed, cred);
        }
    }
}
