/*
`Store` methods for `academic_records` insertion, update, and retrieval.

```sql
CREATE TABLE academic_records (
    record_id       BIGSERIAL PRIMARY KEY,
    student_id      BIGINT REFERENCES students(student_id),
    school_standard TEXT NOT NULL,
    subject         TEXT NOT NULL,
    marks           REAL NOT NULL,
    percentage      REAL NOT NULL,
    grade           TEXT NOT NULL
);
```
*/
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, types::{ToSql, Type}};

use super::{DbError, Store};

#[derive(Clone, Debug)]
pub struct AcademicRecord {
    pub id: i64,
    pub student_id: i64,
    /// The standard (class/grade level) the record belongs to.
    pub school_standard: String,
    pub subject: String,
    pub marks: f32,
    pub percentage: f32,
    pub grade: String,
}

fn record_from_row(row: &Row) -> Result<AcademicRecord, DbError> {
    let r = AcademicRecord {
        id: row.try_get("record_id")?,
        student_id: row.try_get("student_id")?,
        school_standard: row.try_get("school_standard")?,
        subject: row.try_get("subject")?,
        marks: row.try_get("marks")?,
        percentage: row.try_get("percentage")?,
        grade: row.try_get("grade")?,
    };

    Ok(r)
}

impl Store {
    /// Records for one student, newest standard first, subjects
    /// alphabetical within a standard.
    pub async fn get_academic_records(
        &self,
        student_id: i64,
    ) -> Result<Vec<AcademicRecord>, DbError> {
        log::trace!("Store::get_academic_records( {} ) called.", &student_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM academic_records
                WHERE student_id = $1
                ORDER BY school_standard DESC, subject ASC",
            &[&student_id]
        ).await?;

        let mut records: Vec<AcademicRecord> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            records.push(record_from_row(row)?);
        }

        Ok(records)
    }

    /// Inserts a record; the `id` field of the argument is ignored, and
    /// the id the database assigned is returned.
    pub async fn insert_academic_record(
        &self,
        rec: &AcademicRecord,
    ) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_academic_record( [ student {} / {} ] ) called.",
            &rec.student_id, &rec.subject
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO academic_records
                (student_id, school_standard, subject, marks, percentage, grade)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING record_id",
            &[
                &rec.student_id,
                &rec.school_standard,
                &rec.subject,
                &rec.marks,
                &rec.percentage,
                &rec.grade,
            ]
        ).await?;

        let id: i64 = row.try_get("record_id")?;
        Ok(id)
    }

    /// Inserts a batch of records concurrently within one transaction.
    pub async fn insert_academic_records(
        &self,
        recs: &[AcademicRecord],
    ) -> Result<usize, DbError> {
        log::trace!(
            "Store::insert_academic_records( [ {} records ] ) called.",
            recs.len()
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let insert_stmt = t.prepare_typed(
            "INSERT INTO academic_records
                (student_id, school_standard, subject, marks, percentage, grade)
                VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                Type::INT8, Type::TEXT, Type::TEXT,
                Type::FLOAT4, Type::FLOAT4, Type::TEXT
            ]
        ).await?;

        /*
        The parameters referenced in the insert statements must be in a
        slice of references, and those slices need to be bound _outside_
        the async calls being pushed into `FuturesUnordered`; hence this
        intermediate vector of six-element arrays.
        */
        let pvec: Vec<[&(dyn ToSql + Sync); 6]> = recs.iter()
            .map(|r| {
                let p: [&(dyn ToSql + Sync); 6] = [
                    &r.student_id, &r.school_standard, &r.subject,
                    &r.marks, &r.percentage, &r.grade
                ];
                p
            }).collect();

        let mut n_inserted: u64 = 0;
        {
            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(
                    t.execute(&insert_stmt, params)
                );
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(_) => { n_inserted += 1; },
                    Err(e) => {
                        let estr = format!(
                            "Error inserting academic record into database: {}", &e
                        );
                        return Err(DbError(estr));
                    },
                }
            }
        }

        t.commit().await?;

        log::trace!("Inserted {} academic records.", &n_inserted);
        Ok(n_inserted as usize)
    }

    pub async fn update_academic_record(
        &self,
        rec: &AcademicRecord,
    ) -> Result<bool, DbError> {
        log::trace!(
            "Store::update_academic_record( [ id {} ] ) called.", &rec.id
        );

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE academic_records SET
                student_id = $1, school_standard = $2, subject = $3,
                marks = $4, percentage = $5, grade = $6
                WHERE record_id = $7",
            &[
                &rec.student_id,
                &rec.school_standard,
                &rec.subject,
                &rec.marks,
                &rec.percentage,
                &rec.grade,
                &rec.id,
            ]
        ).await?;

        Ok(n > 0)
    }

    pub async fn delete_academic_record(
        &self,
        record_id: i64,
    ) -> Result<bool, DbError> {
        log::trace!("Store::delete_academic_record( {} ) called.", &record_id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM academic_records WHERE record_id = $1",
            &[&record_id]
        ).await?;

        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::store::students::tests::test_student;
    use crate::tests::ensure_logging;

    fn test_record(student_id: i64, standard: &str, subject: &str, marks: f32) -> AcademicRecord {
        AcademicRecord {
            id: 0,
            student_id,
            school_standard: standard.to_owned(),
            subject: subject.to_owned(),
            marks,
            percentage: marks,
            grade: if marks >= 90.0 { "A".to_owned() } else { "B".to_owned() },
        }
    }

    #[tokio::test]
    #[serial]
    async fn record_crud() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let sid = db.insert_student(&test_student("stu1", "Stu One")).await.unwrap();

        let mut rec = test_record(sid, "5", "Mathematics", 91.0);
        rec.id = db.insert_academic_record(&rec).await.unwrap();

        rec.marks = 78.0;
        rec.grade = "B".to_owned();
        assert!(db.update_academic_record(&rec).await.unwrap());

        let recs = db.get_academic_records(sid).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].marks, 78.0);
        assert_eq!(&recs[0].grade, "B");

        assert!(db.delete_academic_record(rec.id).await.unwrap());
        assert!(!db.delete_academic_record(rec.id).await.unwrap());
        assert!(db.get_academic_records(sid).await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn bulk_insert_and_ordering() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let sid = db.insert_student(&test_student("stu1", "Stu One")).await.unwrap();
        let other = db.insert_student(&test_student("stu2", "Stu Two")).await.unwrap();

        let batch = vec![
            test_record(sid, "4", "Science", 88.0),
            test_record(sid, "5", "Science", 92.0),
            test_record(sid, "5", "English", 81.0),
            test_record(other, "5", "English", 70.0),
        ];
        assert_eq!(db.insert_academic_records(&batch).await.unwrap(), 4);

        let recs = db.get_academic_records(sid).await.unwrap();
        let keys: Vec<(&str, &str)> = recs.iter()
            .map(|r| (r.school_standard.as_str(), r.subject.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("5", "English"), ("5", "Science"), ("4", "Science")]
        );

        db.nuke_database().await.unwrap();
    }
}
