/*
`Store` methods for `transfer_certificates`: applications a student files
to move to another school, and the admin-side processing of them.

```sql
CREATE TABLE transfer_certificates (
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
);
```
*/
use time::Date;
use tokio_postgres::Row;

use super::{DbError, Store};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TcStatus {
    Pending,
    Approved,
    Rejected,
}

impl TcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TcStatus::Pending  => "pending",
            TcStatus::Approved => "approved",
            TcStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for TcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TcStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(TcStatus::Pending),
            "approved" => Ok(TcStatus::Approved),
            "rejected" => Ok(TcStatus::Rejected),
            _ => Err(format!("{:?} is not a valid transfer certificate status.", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransferCertificate {
    pub id: i64,
    pub student_id: i64,
    pub application_date: Date,
    pub destination_school: String,
    pub reason: String,
    pub transfer_date: Date,
    pub status: TcStatus,
    pub comments: Option<String>,
    /// uname of the admin who processed the application.
    pub processed_by: Option<String>,
    pub processed_date: Option<Date>,
}

fn tc_from_row(row: &Row) -> Result<TransferCertificate, DbError> {
    let status_str: &str = row.try_get("status")?;
    let tc = TransferCertificate {
        id: row.try_get("tc_id")?,
        student_id: row.try_get("student_id")?,
        application_date: row.try_get("application_date")?,
        destination_school: row.try_get("destination_school")?,
        reason: row.try_get("reason")?,
        transfer_date: row.try_get("transfer_date")?,
        status: status_str.parse()?,
        comments: row.try_get("comments")?,
        processed_by: row.try_get("processed_by")?,
        processed_date: row.try_get("processed_date")?,
    };

    Ok(tc)
}

impl Store {
    /// Files a new application; it starts out `pending` and unprocessed.
    pub async fn insert_transfer_application(
        &self,
        student_id: i64,
        application_date: Date,
        destination_school: &str,
        reason: &str,
        transfer_date: Date,
    ) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_transfer_application( {}, {:?} ) called.",
            &student_id, destination_school
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO transfer_certificates
                (student_id, application_date, destination_school,
                 reason, transfer_date, status)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING tc_id",
            &[
                &student_id,
                &application_date,
                &destination_school,
                &reason,
                &transfer_date,
                &TcStatus::Pending.as_str(),
            ]
        ).await?;

        let id: i64 = row.try_get("tc_id")?;
        Ok(id)
    }

    /// One student's applications, newest first.
    pub async fn get_transfer_certificates_for(
        &self,
        student_id: i64,
    ) -> Result<Vec<TransferCertificate>, DbError> {
        log::trace!(
            "Store::get_transfer_certificates_for( {} ) called.", &student_id
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM transfer_certificates
                WHERE student_id = $1
                ORDER BY application_date DESC",
            &[&student_id]
        ).await?;

        let mut tcs: Vec<TransferCertificate> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            tcs.push(tc_from_row(row)?);
        }

        Ok(tcs)
    }

    /// Every application in the system with the applicant's name, newest
    /// first. Admin-side view.
    pub async fn get_transfer_certificates(
        &self,
    ) -> Result<Vec<(TransferCertificate, String)>, DbError> {
        log::trace!("Store::get_transfer_certificates() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT tc.*, s.name AS student_name
                FROM transfer_certificates tc
                JOIN students s ON tc.student_id = s.student_id
                ORDER BY tc.application_date DESC",
            &[]
        ).await?;

        let mut tcs: Vec<(TransferCertificate, String)> =
            Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let tc = tc_from_row(row)?;
            let student_name: String = row.try_get("student_name")?;
            tcs.push((tc, student_name));
        }

        Ok(tcs)
    }

    pub async fn get_transfer_certificate(
        &self,
        tc_id: i64,
    ) -> Result<Option<(TransferCertificate, String)>, DbError> {
        log::trace!("Store::get_transfer_certificate( {} ) called.", &tc_id);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT tc.*, s.name AS student_name
                FROM transfer_certificates tc
                JOIN students s ON tc.student_id = s.student_id
                WHERE tc.tc_id = $1",
            &[&tc_id]
        ).await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let tc = tc_from_row(&row)?;
                let student_name: String = row.try_get("student_name")?;
                Ok(Some((tc, student_name)))
            },
        }
    }

    /// Records an admin's decision on an application.
    pub async fn process_transfer_certificate(
        &self,
        tc_id: i64,
        status: TcStatus,
        comments: Option<&str>,
        processed_by: &str,
        processed_date: Date,
    ) -> Result<bool, DbError> {
        log::trace!(
            "Store::process_transfer_certificate( {}, {} ) called.",
            &tc_id, &status
        );

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE transfer_certificates SET
                status = $1, comments = $2, processed_by = $3, processed_date = $4
                WHERE tc_id = $5",
            &[
                &status.as_str(),
                &comments,
                &processed_by,
                &processed_date,
                &tc_id,
            ]
        ).await?;

        Ok(n > 0)
    }

    pub async fn delete_transfer_certificate(
        &self,
        tc_id: i64,
    ) -> Result<bool, DbError> {
        log::trace!("Store::delete_transfer_certificate( {} ) called.", &tc_id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM transfer_certificates WHERE tc_id = $1",
            &[&tc_id]
        ).await?;

        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::macros::date;

    use crate::store::tests::TEST_CONNECTION;
    use crate::store::students::tests::test_student;
    use crate::tests::ensure_logging;

    #[test]
    fn status_round_trip() {
        for status in [TcStatus::Pending, TcStatus::Approved, TcStatus::Rejected] {
            let parsed: TcStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
        assert!("denied".parse::<TcStatus>().is_err());
    }

    #[tokio::test]
    #[serial]
    async fn application_lifecycle() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let sid = db.insert_student(&test_student("stu1", "Stu One")).await.unwrap();

        let tc_id = db.insert_transfer_application(
            sid,
            date!(2024 - 03 - 01),
            "Anand Vidyalaya",
            "Family relocation",
            date!(2024 - 04 - 01),
        ).await.unwrap();

        let tcs = db.get_transfer_certificates_for(sid).await.unwrap();
        assert_eq!(tcs.len(), 1);
        assert_eq!(tcs[0].status, TcStatus::Pending);
        assert!(tcs[0].processed_by.is_none());

        assert!(db.process_transfer_certificate(
            tc_id,
            TcStatus::Approved,
            Some("Records in order."),
            "root",
            date!(2024 - 03 - 05),
        ).await.unwrap());

        let (tc, student_name) =
            db.get_transfer_certificate(tc_id).await.unwrap().unwrap();
        assert_eq!(tc.status, TcStatus::Approved);
        assert_eq!(tc.processed_by.as_deref(), Some("root"));
        assert_eq!(&student_name, "Stu One");

        let all = db.get_transfer_certificates().await.unwrap();
        assert_eq!(all.len(), 1);

        assert!(db.delete_transfer_certificate(tc_id).await.unwrap());
        assert!(!db.delete_transfer_certificate(tc_id).await.unwrap());
        assert!(db.get_transfer_certificate(tc_id).await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }
}
