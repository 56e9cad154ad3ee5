//! Test users seeded in the SSO realm.

use common::secret::UserCredentials;

/// Holds the role the greeting endpoint requires.
pub fn alice() -> UserCredentials {
    UserCredentials::new("alice", "password")
}

/// Authenticates fine but lacks the greeting role.
pub fn admin() -> UserCredentials {
    UserCredentials::new("admin", "admin")
}

/// Alice with the wrong password.
pub fn alice_bad_password() -> UserCredentials {
    UserCredentials::new("alice", "bad")
}
