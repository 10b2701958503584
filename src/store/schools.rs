/*
`Store` methods for the `schools` table.

```sql
CREATE TABLE schools (
    school_id    BIGSERIAL PRIMARY KEY,
    name         TEXT NOT NULL,
    address      TEXT,
    contact_info TEXT
);
```
*/
use tokio_postgres::Row;

use super::{DbError, Store};

#[derive(Clone, Debug)]
pub struct School {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub contact_info: Option<String>,
}

fn school_from_row(row: &Row) -> Result<School, DbError> {
    let s = School {
        id: row.try_get("school_id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        contact_info: row.try_get("contact_info")?,
    };

    Ok(s)
}

impl Store {
    pub async fn insert_school(
        &self,
        name: &str,
        address: Option<&str>,
        contact_info: Option<&str>,
    ) -> Result<i64, DbError> {
        log::trace!("Store::insert_school( {:?} ) called.", name);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO schools (name, address, contact_info)
                VALUES ($1, $2, $3)
                RETURNING school_id",
            &[&name, &address, &contact_info]
        ).await?;

        let id: i64 = row.try_get("school_id")?;
        Ok(id)
    }

    /// All schools, ordered by name.
    pub async fn get_schools(&self) -> Result<Vec<School>, DbError> {
        log::trace!("Store::get_schools() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM schools ORDER BY name",
            &[]
        ).await?;

        let mut schools: Vec<School> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            schools.push(school_from_row(row)?);
        }

        Ok(schools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    #[tokio::test]
    #[serial]
    async fn schools_sorted_by_name() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.insert_school("Zenith High", None, None).await.unwrap();
        db.insert_school("Anand Vidyalaya", Some("4 Temple St"), None).await.unwrap();

        let schools = db.get_schools().await.unwrap();
        let names: Vec<&str> = schools.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Anand Vidyalaya", "Zenith High"]);
        assert_eq!(schools[0].address.as_deref(), Some("4 Temple St"));

        db.nuke_database().await.unwrap();
    }
}
