/*
`Store` methods for the `documents` table: metadata about files students
have uploaded. The file contents themselves live on disk under the
configured uploads directory; `file_path` points at them.

```sql
CREATE TABLE documents (
    document_id   BIGSERIAL PRIMARY KEY,
    student_id    BIGINT REFERENCES students(student_id),
    document_type TEXT NOT NULL,
    file_name     TEXT NOT NULL,
    file_path     TEXT NOT NULL,
    upload_date   DATE NOT NULL
);
```
*/
use time::Date;
use tokio_postgres::Row;

use super::{DbError, Store};

#[derive(Clone, Debug)]
pub struct Document {
    pub id: i64,
    pub student_id: i64,
    /// What the document purports to be ("birth certificate", etc.).
    pub document_type: String,
    /// The name the file was uploaded under.
    pub file_name: String,
    /// Where the contents actually live on disk.
    pub file_path: String,
    pub upload_date: Date,
}

fn document_from_row(row: &Row) -> Result<Document, DbError> {
    let d = Document {
        id: row.try_get("document_id")?,
        student_id: row.try_get("student_id")?,
        document_type: row.try_get("document_type")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        upload_date: row.try_get("upload_date")?,
    };

    Ok(d)
}

impl Store {
    pub async fn insert_document(&self, doc: &Document) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_document( [ student {} / {:?} ] ) called.",
            &doc.student_id, &doc.file_name
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO documents
                (student_id, document_type, file_name, file_path, upload_date)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING document_id",
            &[
                &doc.student_id,
                &doc.document_type,
                &doc.file_name,
                &doc.file_path,
                &doc.upload_date,
            ]
        ).await?;

        let id: i64 = row.try_get("document_id")?;
        Ok(id)
    }

    /// One student's documents, most recently uploaded first.
    pub async fn get_documents(
        &self,
        student_id: i64,
    ) -> Result<Vec<Document>, DbError> {
        log::trace!("Store::get_documents( {} ) called.", &student_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM documents
                WHERE student_id = $1
                ORDER BY upload_date DESC",
            &[&student_id]
        ).await?;

        let mut docs: Vec<Document> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            docs.push(document_from_row(row)?);
        }

        Ok(docs)
    }

    pub async fn get_document(
        &self,
        document_id: i64,
    ) -> Result<Option<Document>, DbError> {
        log::trace!("Store::get_document( {} ) called.", &document_id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM documents WHERE document_id = $1",
            &[&document_id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(document_from_row(&row)?)),
        }
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
    async fn document_metadata() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let sid = db.insert_student(&test_student("stu1", "Stu One")).await.unwrap();

        let older = Document {
            id: 0,
            student_id: sid,
            document_type: "birth certificate".to_owned(),
            file_name: "birth_cert.pdf".to_owned(),
            file_path: "uploads/1_birth_cert.pdf".to_owned(),
            upload_date: date!(2024 - 01 - 15),
        };
        let newer = Document {
            file_name: "report_card.pdf".to_owned(),
            file_path: "uploads/1_report_card.pdf".to_owned(),
            document_type: "report card".to_owned(),
            upload_date: date!(2024 - 06 - 01),
            ..older.clone()
        };

        let older_id = db.insert_document(&older).await.unwrap();
        db.insert_document(&newer).await.unwrap();

        let docs = db.get_documents(sid).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(&docs[0].file_name, "report_card.pdf");
        assert_eq!(&docs[1].file_name, "birth_cert.pdf");

        let one = db.get_document(older_id).await.unwrap().unwrap();
        assert_eq!(&one.document_type, "birth certificate");
        assert_eq!(one.student_id, sid);

        db.nuke_database().await.unwrap();
    }
}
