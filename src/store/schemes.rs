/*
`Store` methods for the `schemes` and `scheme_history` tables: government
schemes and students' enrollment in them over time.

```sql
CREATE TABLE schemes (
    scheme_id   BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT
);

CREATE TABLE scheme_history (
    enrollment_id BIGSERIAL PRIMARY KEY,
    student_id    BIGINT REFERENCES students(student_id),
    scheme_id     BIGINT REFERENCES schemes(scheme_id),
    start_date    DATE NOT NULL,
    end_date      DATE,
    status        TEXT NOT NULL
);
```
*/
use time::Date;
use tokio_postgres::Row;

use super::{DbError, Store};

/// A `scheme_history` row joined with the scheme's name.
#[derive(Clone, Debug)]
pub struct SchemeEnrollment {
    pub id: i64,
    pub student_id: i64,
    pub scheme_id: i64,
    pub scheme_name: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub status: String,
}

fn enrollment_from_row(row: &Row) -> Result<SchemeEnrollment, DbError> {
    let e = SchemeEnrollment {
        id: row.try_get("enrollment_id")?,
        student_id: row.try_get("student_id")?,
        scheme_id: row.try_get("scheme_id")?,
        scheme_name: row.try_get("scheme_name")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status: row.try_get("status")?,
    };

    Ok(e)
}

impl Store {
    pub async fn insert_scheme(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64, DbError> {
        log::trace!("Store::insert_scheme( {:?} ) called.", name);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO schemes (name, description)
                VALUES ($1, $2)
                RETURNING scheme_id",
            &[&name, &description]
        ).await?;

        let id: i64 = row.try_get("scheme_id")?;
        Ok(id)
    }

    pub async fn insert_scheme_enrollment(
        &self,
        student_id: i64,
        scheme_id: i64,
        start_date: Date,
        end_date: Option<Date>,
        status: &str,
    ) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_scheme_enrollment( {}, {} ) called.",
            &student_id, &scheme_id
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO scheme_history
                (student_id, scheme_id, start_date, end_date, status)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING enrollment_id",
            &[&student_id, &scheme_id, &start_date, &end_date, &status]
        ).await?;

        let id: i64 = row.try_get("enrollment_id")?;
        Ok(id)
    }

    /// One student's scheme history, most recent enrollment first.
    pub async fn get_scheme_history(
        &self,
        student_id: i64,
    ) -> Result<Vec<SchemeEnrollment>, DbError> {
        log::trace!("Store::get_scheme_history( {} ) called.", &student_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT sh.*, s.name AS scheme_name
                FROM scheme_history sh
                JOIN schemes s ON sh.scheme_id = s.scheme_id
                WHERE sh.student_id = $1
                ORDER BY sh.start_date DESC",
            &[&student_id]
        ).await?;

        let mut history: Vec<SchemeEnrollment> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            history.push(enrollment_from_row(row)?);
        }

        Ok(history)
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

    #[tokio::test]
    #[serial]
    async fn scheme_history() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let sid = db.insert_student(&test_student("stu1", "Stu One")).await.unwrap();
        let meals = db.insert_scheme(
            "Midday Meals", Some("Daily school lunch program")
        ).await.unwrap();
        let books = db.insert_scheme("Free Textbooks", None).await.unwrap();

        db.insert_scheme_enrollment(
            sid, meals, date!(2023 - 06 - 01), Some(date!(2024 - 03 - 31)), "completed"
        ).await.unwrap();
        db.insert_scheme_enrollment(
            sid, books, date!(2024 - 06 - 01), None, "active"
        ).await.unwrap();

        let history = db.get_scheme_history(sid).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(&history[0].scheme_name, "Free Textbooks");
        assert_eq!(&history[0].status, "active");
        assert!(history[0].end_date.is_none());
        assert_eq!(&history[1].scheme_name, "Midday Meals");

        assert!(db.get_scheme_history(sid + 1).await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }
}
