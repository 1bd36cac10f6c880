// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use openssl::hash::{Hasher, MessageDigest};
use rand::RngCore;

use crate::error::{Error, ErrorKind};

pub const SALT_LEN: usize = 12;
pub const HASH_LEN: usize = 64;

/// Identifies the hash scheme in a dumped password entry, mirroring the
/// `$<id>$<salt>$<hash>` shape of a crypt(3) entry.
const PW_SHA512: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Salt([u8; SALT_LEN]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hash([u8; HASH_LEN]);

/// A salted SHA-512 password hash (spec 6: "username → salted-hash entries").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passwd {
    salt: Salt,
    hash: Hash,
}

impl Passwd {
    /// Hash `password` with a freshly generated random salt.
    ///
    /// # Errors
    /// Returns an error if the underlying hasher fails.
    pub fn generate(password: &[u8]) -> Result<Self, Error> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = Salt(salt_bytes);
        let hash = Self::compute_hash(password, &salt)?;
        Ok(Self { salt, hash })
    }

    /// Check `password` against this entry's stored hash.
    ///
    /// # Errors
    /// Returns an error if the underlying hasher fails.
    pub fn matches(&self, password: &[u8]) -> Result<bool, Error> {
        let candidate = Self::compute_hash(password, &self.salt)?;
        Ok(candidate.0 == self.hash.0)
    }

    fn compute_hash(password: &[u8], salt: &Salt) -> Result<Hash, Error> {
        let mut hasher = Hasher::new(MessageDigest::sha512())
            .map_err(|err| Error::from_string(ErrorKind::AuthFailed, format!("{err}")))?;
        hasher
            .update(password)
            .and_then(|()| hasher.update(&salt.0))
            .map_err(|err| Error::from_string(ErrorKind::AuthFailed, format!("{err}")))?;
        let digest = hasher
            .finish()
            .map_err(|err| Error::from_string(ErrorKind::AuthFailed, format!("{err}")))?;
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(digest.as_ref());
        Ok(Hash(hash))
    }

    /// Serialize as a `username:$6$<salt>$<hash>` line, base64-encoding the
    /// binary fields the way a `/etc/shadow`-style crypt(3) entry would.
    #[must_use]
    pub fn dump(&self, username: &str) -> String {
        format!(
            "{username}:${PW_SHA512}${}${}",
            BASE64.encode(self.salt.0),
            BASE64.encode(self.hash.0)
        )
    }

    /// Parse one line of a password file: `username:$6$<salt>$<hash>`.
    /// Blank lines and lines starting with `#` are ignored.
    ///
    /// # Errors
    /// Returns an error if the line is non-empty, non-comment, and does not
    /// match the expected format.
    pub fn parse_line(line: &str) -> Result<Option<(String, Self)>, Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (username, rest) = line.split_once(':').ok_or_else(|| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("invalid password entry: {line:?}"),
            )
        })?;
        if username.is_empty() {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("empty username in password entry: {line:?}"),
            ));
        }

        let parts: Vec<&str> = rest.split('$').collect();
        if parts.len() != 4 {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("invalid password hash in entry: {line:?}"),
            ));
        }
        if parts[1].parse::<u32>() != Ok(PW_SHA512) {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("unsupported hash scheme in entry: {line:?}"),
            ));
        }

        let salt_bytes = BASE64.decode(parts[2]).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("invalid salt in entry: {line:?}: {err}"),
            )
        })?;
        let hash_bytes = BASE64.decode(parts[3]).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("invalid hash in entry: {line:?}: {err}"),
            )
        })?;
        if salt_bytes.len() != SALT_LEN || hash_bytes.len() != HASH_LEN {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("unexpected field length in entry: {line:?}"),
            ));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&salt_bytes);
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&hash_bytes);

        Ok(Some((
            username.to_string(),
            Self {
                salt: Salt(salt),
                hash: Hash(hash),
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_match_round_trip() {
        let passwd = Passwd::generate(b"hunter2").unwrap();
        assert!(passwd.matches(b"hunter2").unwrap());
        assert!(!passwd.matches(b"wrong").unwrap());
    }

    #[test]
    fn dump_and_parse_round_trip() {
        let passwd = Passwd::generate(b"hunter2").unwrap();
        let line = passwd.dump("alice");
        let (username, parsed) = Passwd::parse_line(&line).unwrap().unwrap();
        assert_eq!(username, "alice");
        assert!(parsed.matches(b"hunter2").unwrap());
    }

    #[test]
    fn parse_line_ignores_blank_and_comment_lines() {
        assert!(Passwd::parse_line("").unwrap().is_none());
        assert!(Passwd::parse_line("  ").unwrap().is_none());
        assert!(Passwd::parse_line("# comment").unwrap().is_none());
    }
}
