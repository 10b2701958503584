/*!
Authentication database interaction: credential checking and session key
issuance.

The Postgres database to which this connects holds two tables. One maps
`(uname, role)` pairs to Argon2 password hashes; scoping the lookup by
role means credentials valid for one role never authenticate the other.

```sql
CREATE TABLE credentials (
    uname TEXT,
    role  TEXT,     /* one of { 'admin', 'student' } */
    hash  TEXT NOT NULL,
    PRIMARY KEY (uname, role)
);
```

The other holds the live session keys. A key is an opaque random string
handed to the client at login; the row binds it to the identity it was
issued for. Logout deletes the row, and every key carries an expiry, so
this table doubles as the revocation set.

```sql
CREATE TABLE session_keys (
    key     TEXT PRIMARY KEY,
    uname   TEXT NOT NULL,
    role    TEXT NOT NULL,
    user_id BIGINT NOT NULL,
    name    TEXT NOT NULL,
    issued  TIMESTAMPTZ NOT NULL,
    expires TIMESTAMPTZ NOT NULL
);
```
*/
use std::fmt::Write;

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};
use rand::{Rng, distributions};
use time::{Duration, OffsetDateTime};
use tokio_postgres::{Client, NoTls};

use crate::user::{Identity, Role};

const DEFAULT_KEY_LENGTH: usize = 32;
const DEFAULT_KEY_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Verified against when a login names a nonexistent user, so the
/// response time doesn't reveal whether the uname exists.
static DUMMY_HASH: &str =
"$argon2id$v=19$m=19456,t=2,p=1$VE0e3g7DalWHgDwou3nuRA$uC6TER156UQpk0lNQ5+jHM0l5poVjPA1he8TZbuA2nc";

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'credentials'",
        "CREATE TABLE credentials (
            uname TEXT,
            role  TEXT,
            hash  TEXT NOT NULL,
            PRIMARY KEY (uname, role)
        )",
        "DROP TABLE credentials",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'session_keys'",
        "CREATE TABLE session_keys (
            key     TEXT PRIMARY KEY,
            uname   TEXT NOT NULL,
            role    TEXT NOT NULL,
            user_id BIGINT NOT NULL,
            name    TEXT NOT NULL,
            issued  TIMESTAMPTZ NOT NULL,
            expires TIMESTAMPTZ NOT NULL
        )",
        "DROP TABLE session_keys",
    ),
];

#[derive(Debug, PartialEq)]
pub struct AuthError(String);

impl AuthError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl From<tokio_postgres::error::Error> for AuthError {
    fn from(e: tokio_postgres::error::Error) -> AuthError {
        let mut s = format!("Auth DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        AuthError(s)
    }
}

impl From<String> for AuthError {
    fn from(s: String) -> AuthError { AuthError(s) }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

/// Outcome of the various credential and key checks.
#[derive(Debug, PartialEq)]
pub enum AuthResult {
    /// Credentials check out.
    Ok,
    /// Credentials check out; here is a freshly-issued session key.
    Key(String),
    /// Session key checks out; here is the identity it was issued for.
    Identity(Identity),
    BadPassword,
    NoSuchUser,
    InvalidKey,
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default().hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError(format!("Error hashing password: {}", &e)))
}

/// Constant-time check of `password` against a stored PHC-format hash.
fn verify_password(hash: &str, password: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError(format!("Error parsing stored hash: {}", &e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError(format!("Error verifying password: {}", &e))),
    }
}

pub struct Db {
    connection_string: String,
    key_chars: Vec<char>,
    key_length: usize,
    key_lifetime: Duration,
}

impl Db {
    pub fn new(connection_string: String, key_lifetime: Duration) -> Self {
        log::trace!("auth::Db::new( {:?}, {:?} ) called.", &connection_string, &key_lifetime);

        let key_chars: Vec<char> = DEFAULT_KEY_CHARS.chars().collect();
        let key_length = DEFAULT_KEY_LENGTH;

        Self { connection_string, key_chars, key_length, key_lifetime }
    }

    /// Set characters to use when generating session keys.
    ///
    /// Will quietly do nothing if `new_chars` has zero length.
    pub fn set_key_chars(&mut self, new_chars: &str) {
        if new_chars.len() > 0 {
            self.key_chars = new_chars.chars().collect();
        }
    }

    /// Set the length of session keys to generate.
    ///
    /// Will quietly do nothing if set to zero.
    pub fn set_key_length(&mut self, new_length: usize) {
        if new_length > 0 {
            self.key_length = new_length;
        }
    }

    pub fn set_key_lifetime(&mut self, new_lifetime: Duration) {
        self.key_lifetime = new_lifetime;
    }

    /// Generate a new session key based on the current values of
    /// self.key_chars and self.key_length.
    fn generate_key(&self) -> String {
        // self.key_chars should never have zero length.
        let dist = distributions::Slice::new(&self.key_chars).unwrap();
        let rng = rand::thread_rng();
        let new_key: String = rng.sample_iter(&dist)
            .take(self.key_length)
            .collect();
        new_key
    }

    async fn connect(&self) -> Result<Client, AuthError> {
        log::trace!(
            "auth::Db::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Auth DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let autherr = AuthError::from(e);
                log::trace!("    ...connection failed: {:?}", &autherr);
                Err(autherr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| AuthError::from(e)
                .annotate("Auth DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| AuthError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = AuthError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        Ok(())
    }

    /// Stores a credential for `(uname, role)`, replacing any previous one.
    ///
    /// Only the Argon2 hash of `password` touches the database.
    pub async fn add_user(
        &self,
        uname: &str,
        role: Role,
        password: &str,
    ) -> Result<(), AuthError> {
        log::trace!("auth::Db::add_user( {:?}, {} ) called.", uname, &role);

        let hash = hash_password(password)?;
        let client = self.connect().await?;

        client.execute(
            "INSERT INTO credentials (uname, role, hash)
                VALUES ($1, $2, $3)
                ON CONFLICT (uname, role) DO UPDATE SET hash = $3",
            &[&uname, &role.as_str(), &hash]
        ).await?;

        Ok(())
    }

    pub async fn delete_user(
        &self,
        uname: &str,
        role: Role,
    ) -> Result<(), AuthError> {
        log::trace!("auth::Db::delete_user( {:?}, {} ) called.", uname, &role);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM credentials WHERE uname = $1 AND role = $2",
            &[&uname, &role.as_str()]
        ).await?;

        if n == 0 {
            Err(AuthError(format!(
                "There is no {} with uname {:?}.", &role, uname
            )))
        } else {
            Ok(())
        }
    }

    /**
    Checks `password` against the credential stored for `(uname, role)`.

    When no such credential exists, a throwaway verification runs anyway
    so the two failure modes take comparable time; they are still
    distinguished in the return value so callers can log accurately, but
    both must surface to the client as the same generic failure.
    */
    pub async fn check_password(
        &self,
        uname: &str,
        role: Role,
        password: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_password( {:?}, {} ) called.", uname, &role);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT hash FROM credentials WHERE uname = $1 AND role = $2",
            &[&uname, &role.as_str()]
        ).await?;

        match row {
            None => {
                let _ = verify_password(DUMMY_HASH, password)?;
                Ok(AuthResult::NoSuchUser)
            },
            Some(row) => {
                let hash: &str = row.try_get("hash")?;
                if verify_password(hash, password)? {
                    Ok(AuthResult::Ok)
                } else {
                    Ok(AuthResult::BadPassword)
                }
            },
        }
    }

    /**
    Checks the password for `ident`'s `(uname, role)` and, on success,
    mints a session key bound to `ident`.

    Expired keys get swept here rather than on a timer; issuance is the
    only spot that grows the table, so it can't grow without bound.
    */
    pub async fn check_password_and_issue_key(
        &self,
        ident: &Identity,
        password: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!(
            "auth::Db::check_password_and_issue_key( {:?} [{}] ) called.",
            &ident.uname, &ident.role
        );

        match self.check_password(&ident.uname, ident.role, password).await? {
            AuthResult::Ok => { /* Proceed to issue a key. */ },
            x => { return Ok(x); },
        }

        let key = self.generate_key();
        let issued = OffsetDateTime::now_utc();
        let expires = issued + self.key_lifetime;

        let client = self.connect().await?;

        let n_swept = client.execute(
            "DELETE FROM session_keys WHERE expires < $1",
            &[&issued]
        ).await?;
        if n_swept > 0 {
            log::trace!("Swept {} expired session keys.", &n_swept);
        }

        client.execute(
            "INSERT INTO session_keys
                (key, uname, role, user_id, name, issued, expires)
                VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &key,
                &ident.uname,
                &ident.role.as_str(),
                &ident.id,
                &ident.name,
                &issued,
                &expires,
            ]
        ).await?;

        Ok(AuthResult::Key(key))
    }

    /**
    Resolves a presented session key to the `Identity` it was issued for.

    Unknown, malformed, and expired keys all come back `InvalidKey`;
    expired rows are deleted on sight.
    */
    pub async fn check_key(&self, key: &str) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_key( [ {} chars ] ) called.", key.len());

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT uname, role, user_id, name, expires
                FROM session_keys WHERE key = $1",
            &[&key]
        ).await?;

        let row = match row {
            None => { return Ok(AuthResult::InvalidKey); },
            Some(row) => row,
        };

        let expires: OffsetDateTime = row.try_get("expires")?;
        if expires <= OffsetDateTime::now_utc() {
            client.execute(
                "DELETE FROM session_keys WHERE key = $1",
                &[&key]
            ).await?;
            return Ok(AuthResult::InvalidKey);
        }

        let role_str: &str = row.try_get("role")?;
        let ident = Identity {
            id: row.try_get("user_id")?,
            uname: row.try_get("uname")?,
            name: row.try_get("name")?,
            role: role_str.parse()?,
        };

        Ok(AuthResult::Identity(ident))
    }

    /// Deletes a session key, ending that session. Deleting a key that
    /// doesn't exist is not an error; the session is just as dead.
    pub async fn delete_key(&self, key: &str) -> Result<(), AuthError> {
        log::trace!("auth::Db::delete_key( [ {} chars ] ) called.", key.len());

        let client = self.connect().await?;
        client.execute(
            "DELETE FROM session_keys WHERE key = $1",
            &[&key]
        ).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: gmps_test
    password: gmps_test

    with write access to:

    database: gmps_auth_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    static TEST_CONNECTION: &str =
        "host=localhost user=gmps_test password='gmps_test' dbname=gmps_auth_test";

    fn test_db() -> Db {
        Db::new(TEST_CONNECTION.to_owned(), Duration::minutes(30))
    }

    fn stu_identity() -> Identity {
        Identity {
            id: 42,
            uname: "stu1".to_owned(),
            name: "Stu One".to_owned(),
            role: Role::Student,
        }
    }

    /**
    This function is for getting the database back in a blank slate state
    if a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_auth -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_auth() {
        ensure_logging();
        let db = test_db();
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn password_checks() {
        ensure_logging();

        let db = test_db();
        db.ensure_db_schema().await.unwrap();

        db.add_user("stu1", Role::Student, "correct horse").await.unwrap();

        assert_eq!(
            db.check_password("stu1", Role::Student, "correct horse").await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            db.check_password("stu1", Role::Student, "wrong").await.unwrap(),
            AuthResult::BadPassword
        );
        assert_eq!(
            db.check_password("nobody", Role::Student, "correct horse").await.unwrap(),
            AuthResult::NoSuchUser
        );
        // Student credentials must not authenticate as admin.
        assert_eq!(
            db.check_password("stu1", Role::Admin, "correct horse").await.unwrap(),
            AuthResult::NoSuchUser
        );

        db.delete_user("stu1", Role::Student).await.unwrap();
        assert!(db.delete_user("stu1", Role::Student).await.is_err());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn key_round_trip() {
        ensure_logging();

        let db = test_db();
        db.ensure_db_schema().await.unwrap();

        let ident = stu_identity();
        db.add_user(&ident.uname, ident.role, "hunter2").await.unwrap();

        let key = match db.check_password_and_issue_key(&ident, "hunter2").await.unwrap() {
            AuthResult::Key(k) => k,
            x => panic!("Expected a key, got {:?}", &x),
        };

        match db.check_key(&key).await.unwrap() {
            AuthResult::Identity(i) => { assert_eq!(i, ident); },
            x => panic!("Expected an identity, got {:?}", &x),
        }

        assert_eq!(
            db.check_key("no-such-key").await.unwrap(),
            AuthResult::InvalidKey
        );

        // A bad password issues nothing.
        assert_eq!(
            db.check_password_and_issue_key(&ident, "wrong").await.unwrap(),
            AuthResult::BadPassword
        );

        // Logout revokes.
        db.delete_key(&key).await.unwrap();
        assert_eq!(
            db.check_key(&key).await.unwrap(),
            AuthResult::InvalidKey
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn key_expiry() {
        ensure_logging();

        let mut db = test_db();
        db.ensure_db_schema().await.unwrap();

        let ident = stu_identity();
        db.add_user(&ident.uname, ident.role, "hunter2").await.unwrap();

        db.set_key_lifetime(Duration::minutes(-5));
        let key = match db.check_password_and_issue_key(&ident, "hunter2").await.unwrap() {
            AuthResult::Key(k) => k,
            x => panic!("Expected a key, got {:?}", &x),
        };

        assert_eq!(
            db.check_key(&key).await.unwrap(),
            AuthResult::InvalidKey
        );

        db.nuke_database().await.unwrap();
    }
}
