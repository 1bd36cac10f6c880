// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

mod passwd;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub use passwd::Passwd;

use crate::config::Security;
use crate::error::Error;

/// Authenticates CONNECT attempts against the configured password file
/// (spec 6, spec 4.D CONNECT handling).
#[derive(Debug, Clone)]
pub struct AuthManager {
    allow_anonymous: bool,
    users: HashMap<String, Passwd>,
}

impl AuthManager {
    /// Build an `AuthManager` from a security config section, loading the
    /// password file (if any) eagerly.
    ///
    /// # Errors
    /// Returns an error if the password file exists but cannot be read or
    /// contains a malformed entry.
    pub fn from_config(security: &Security) -> Result<Self, Error> {
        let users = match security.password_file() {
            Some(path) => load_password_file(path)?,
            None => HashMap::new(),
        };
        Ok(Self {
            allow_anonymous: security.allow_anonymous(),
            users,
        })
    }

    /// Decide whether a CONNECT attempt is authorized.
    ///
    /// `username` of `None` is only accepted when `allow_anonymous` is set.
    /// A `username` with no matching entry, or a `password` mismatch,
    /// always rejects regardless of `allow_anonymous`.
    #[must_use]
    pub fn authenticate(&self, username: Option<&str>, password: &[u8]) -> bool {
        match username {
            None => self.allow_anonymous,
            Some(username) => self
                .users
                .get(username)
                .is_some_and(|passwd| passwd.matches(password).unwrap_or(false)),
        }
    }
}

fn load_password_file(path: &Path) -> Result<HashMap<String, Passwd>, Error> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut users = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        if let Some((username, passwd)) = Passwd::parse_line(&line)? {
            users.insert(username, passwd);
        }
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_allowed_when_configured() {
        let manager = AuthManager {
            allow_anonymous: true,
            users: HashMap::new(),
        };
        assert!(manager.authenticate(None, b""));
    }

    #[test]
    fn anonymous_rejected_when_not_configured() {
        let manager = AuthManager {
            allow_anonymous: false,
            users: HashMap::new(),
        };
        assert!(!manager.authenticate(None, b""));
    }

    #[test]
    fn known_user_with_correct_password_is_authenticated() {
        let mut users = HashMap::new();
        users.insert("alice".to_string(), Passwd::generate(b"secret").unwrap());
        let manager = AuthManager {
            allow_anonymous: false,
            users,
        };
        assert!(manager.authenticate(Some("alice"), b"secret"));
        assert!(!manager.authenticate(Some("alice"), b"wrong"));
        assert!(!manager.authenticate(Some("bob"), b"secret"));
    }
}
