/*!
Data database interaction module.

The Postgres database to which this connects holds the school records
proper: the people, the schools, and the per-student resources (academic
records, documents, transfer certificate applications, scheme
enrollments). Credentials and session keys live in a separate database;
see the `auth` module.

Each submodule covers one family of tables:

  * `students`: the `students` and `admins` tables
  * `schools`: the `schools` table
  * `records`: the `academic_records` table
  * `documents`: the `documents` table
  * `transfers`: the `transfer_certificates` table
  * `schemes`: the `schemes` and `scheme_history` tables
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls};

pub mod documents;
pub mod records;
pub mod schemes;
pub mod schools;
pub mod students;
pub mod transfers;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'schools'",
        "CREATE TABLE schools (
            school_id    BIGSERIAL PRIMARY KEY,
            name         TEXT NOT NULL,
            address      TEXT,
            contact_info TEXT
        )",
        "DROP TABLE schools",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            student_id   BIGSERIAL PRIMARY KEY,
            uname        TEXT UNIQUE NOT NULL,
            name         TEXT NOT NULL,
            email        TEXT NOT NULL,
            dob          DATE,
            gender       TEXT,
            contact_info TEXT,
            current_school_id BIGINT REFERENCES schools(school_id)
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'admins'",
        "CREATE TABLE admins (
            admin_id BIGSERIAL PRIMARY KEY,
            uname    TEXT UNIQUE NOT NULL,
            name     TEXT NOT NULL,
            email    TEXT NOT NULL
        )",
        "DROP TABLE admins",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'academic_records'",
        "CREATE TABLE academic_records (
            record_id       BIGSERIAL PRIMARY KEY,
            student_id      BIGINT REFERENCES students(student_id),
            school_standard TEXT NOT NULL,
            subject         TEXT NOT NULL,
            marks           REAL NOT NULL,
            percentage      REAL NOT NULL,
            grade           TEXT NOT NULL
        )",
        "DROP TABLE academic_records",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'documents'",
        "CREATE TABLE documents (
            document_id   BIGSERIAL PRIMARY KEY,
            student_id    BIGINT REFERENCES students(student_id),
            document_type TEXT NOT NULL,
            file_name     TEXT NOT NULL,
            file_path     TEXT NOT NULL,
            upload_date   DATE NOT NULL
        )",
        "DROP TABLE documents",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'transfer_certificates'",
        "CREATE TABLE transfer_certificates (
            tc_id              BIGSERIAL PRIMARY KEY,
            student_id         BIGINT REFERENCES students(student_id),
            application_date   DATE NOT NULL,
            destination_school TEXT NOT NULL,
            reason             TEXT NOT NULL,
            transfer_date      DATE NOT NULL,
            status             TEXT NOT NULL,  /* 'pending' | 'approved' | 'rejected' */
            comments           TEXT,
            processed_by       TEXT,
            processed_date     DATE
        )",
        "DROP TABLE transfer_certificates",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'schemes'",
        "CREATE TABLE schemes (
            scheme_id   BIGSERIAL PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT
        )",
        "DROP TABLE schemes",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'scheme_history'",
        "CREATE TABLE scheme_history (
            enrollment_id BIGSERIAL PRIMARY KEY,
            student_id    BIGINT REFERENCES students(student_id),
            scheme_id     BIGINT REFERENCES schemes(scheme_id),
            start_date    DATE NOT NULL,
            end_date      DATE,
            status        TEXT NOT NULL
        )",
        "DROP TABLE scheme_history",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

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
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look
    at the ERROR level log output when testing to ensure this method did
    its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ...nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: gmps_test
    password: gmps_test

    with write access to:

    database: gmps_store_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str =
        "host=localhost user=gmps_test password='gmps_test' dbname=gmps_store_test";

    /**
    This function is for getting the database back in a blank slate state
    if a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
