/*
`Store` methods et. al. for dealing with the two kinds of people: rows in
the `students` and `admins` tables.

```sql
CREATE TABLE students (
    student_id   BIGSERIAL PRIMARY KEY,
    uname        TEXT UNIQUE NOT NULL,
    name         TEXT NOT NULL,
    email        TEXT NOT NULL,
    dob          DATE,
    gender       TEXT,
    contact_info TEXT,
    current_school_id BIGINT REFERENCES schools(school_id)
);

CREATE TABLE admins (
    admin_id BIGSERIAL PRIMARY KEY,
    uname    TEXT UNIQUE NOT NULL,
    name     TEXT NOT NULL,
    email    TEXT NOT NULL
);
```

Neither table holds a password or a hash; credentials live in the auth
database, keyed by `(uname, role)`.
*/
use tokio_postgres::{Row, Transaction};

use super::{DbError, Store};
use crate::user::{Admin, Student};

pub(crate) fn student_from_row(row: &Row) -> Result<Student, DbError> {
    log::trace!("student_from_row( {:?} ) called.", row);

    let s = Student {
        id: row.try_get("student_id")?,
        uname: row.try_get("uname")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        dob: row.try_get("dob")?,
        gender: row.try_get("gender")?,
        contact_info: row.try_get("contact_info")?,
        school_id: row.try_get("current_school_id")?,
    };

    Ok(s)
}

fn admin_from_row(row: &Row) -> Result<Admin, DbError> {
    log::trace!("admin_from_row( {:?} ) called.", row);

    let a = Admin {
        id: row.try_get("admin_id")?,
        uname: row.try_get("uname")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
    };

    Ok(a)
}

/// Errors if `uname` is already taken in either people table.
///
/// unames are only unique per table, but handing two different people the
/// same uname is asking for grief, so inserts refuse it outright.
async fn check_existing_uname(
    t: &Transaction<'_>,
    uname: &str,
) -> Result<(), DbError> {
    log::trace!("check_existing_uname( T, {:?} ) called.", uname);

    let n_student = t.query_opt(
        "SELECT student_id FROM students WHERE uname = $1",
        &[&uname]
    ).await?;
    if n_student.is_some() {
        return Err(DbError(format!(
            "uname {:?} already belongs to a student.", uname
        )));
    }

    let n_admin = t.query_opt(
        "SELECT admin_id FROM admins WHERE uname = $1",
        &[&uname]
    ).await?;
    if n_admin.is_some() {
        return Err(DbError(format!(
            "uname {:?} already belongs to an admin.", uname
        )));
    }

    Ok(())
}

impl Store {
    /// Inserts a new student row; the `id` field of the argument is
    /// ignored, and the id the database assigned is returned.
    pub async fn insert_student(&self, stud: &Student) -> Result<i64, DbError> {
        log::trace!("Store::insert_student( {:?} ) called.", &stud.uname);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        check_existing_uname(&t, &stud.uname).await?;

        let row = t.query_one(
            "INSERT INTO students
                (uname, name, email, dob, gender, contact_info, current_school_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING student_id",
            &[
                &stud.uname,
                &stud.name,
                &stud.email,
                &stud.dob,
                &stud.gender,
                &stud.contact_info,
                &stud.school_id,
            ]
        ).await?;
        let id: i64 = row.try_get("student_id")?;

        t.commit().await?;
        log::trace!("Inserted student {:?} [ id {} ].", &stud.uname, &id);
        Ok(id)
    }

    pub async fn insert_admin(
        &self,
        uname: &str,
        name: &str,
        email: &str,
    ) -> Result<i64, DbError> {
        log::trace!("Store::insert_admin( {:?}, {:?}, {:?} ) called.", uname, name, email);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        check_existing_uname(&t, uname).await?;

        let row = t.query_one(
            "INSERT INTO admins (uname, name, email)
                VALUES ($1, $2, $3)
                RETURNING admin_id",
            &[&uname, &name, &email]
        ).await?;
        let id: i64 = row.try_get("admin_id")?;

        t.commit().await?;
        log::trace!("Inserted admin {:?} [ id {} ].", uname, &id);
        Ok(id)
    }

    pub async fn get_student_by_uname(
        &self,
        uname: &str,
    ) -> Result<Option<Student>, DbError> {
        log::trace!("Store::get_student_by_uname( {:?} ) called.", uname);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM students WHERE uname = $1",
            &[&uname]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(student_from_row(&row)?)),
        }
    }

    pub async fn get_admin_by_uname(
        &self,
        uname: &str,
    ) -> Result<Option<Admin>, DbError> {
        log::trace!("Store::get_admin_by_uname( {:?} ) called.", uname);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM admins WHERE uname = $1",
            &[&uname]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(admin_from_row(&row)?)),
        }
    }

    pub async fn get_student(
        &self,
        student_id: i64,
    ) -> Result<Option<Student>, DbError> {
        log::trace!("Store::get_student( {} ) called.", &student_id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM students WHERE student_id = $1",
            &[&student_id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(student_from_row(&row)?)),
        }
    }

    /// Retrieves a student along with the name of their current school,
    /// if any.
    pub async fn get_student_profile(
        &self,
        student_id: i64,
    ) -> Result<Option<(Student, Option<String>)>, DbError> {
        log::trace!("Store::get_student_profile( {} ) called.", &student_id);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT s.*, sch.name AS school_name
                FROM students s
                LEFT JOIN schools sch ON s.current_school_id = sch.school_id
                WHERE s.student_id = $1",
            &[&student_id]
        ).await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let stud = student_from_row(&row)?;
                let school_name: Option<String> = row.try_get("school_name")?;
                Ok(Some((stud, school_name)))
            },
        }
    }

    /// The whole roster, with school names, ordered by id.
    pub async fn get_students(
        &self,
    ) -> Result<Vec<(Student, Option<String>)>, DbError> {
        log::trace!("Store::get_students() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT s.*, sch.name AS school_name
                FROM students s
                LEFT JOIN schools sch ON s.current_school_id = sch.school_id
                ORDER BY s.student_id",
            &[]
        ).await?;

        let mut students: Vec<(Student, Option<String>)> =
            Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let stud = student_from_row(row)?;
            let school_name: Option<String> = row.try_get("school_name")?;
            students.push((stud, school_name));
        }

        Ok(students)
    }

    /// Updates the profile fields of the student with `stud.id`.
    ///
    /// The uname is deliberately not updatable; it's the login identity
    /// the auth database knows this student by.
    pub async fn update_student(&self, stud: &Student) -> Result<bool, DbError> {
        log::trace!("Store::update_student( [ id {} ] ) called.", &stud.id);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE students SET
                name = $1, email = $2, dob = $3, gender = $4,
                contact_info = $5, current_school_id = $6
                WHERE student_id = $7",
            &[
                &stud.name,
                &stud.email,
                &stud.dob,
                &stud.gender,
                &stud.contact_info,
                &stud.school_id,
                &stud.id,
            ]
        ).await?;

        Ok(n > 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    pub(crate) fn test_student(uname: &str, name: &str) -> Student {
        Student {
            id: 0,
            uname: uname.to_owned(),
            name: name.to_owned(),
            email: format!("{}@gmps.test", uname),
            dob: None,
            gender: None,
            contact_info: None,
            school_id: None,
        }
    }

    #[tokio::test]
    #[serial]
    async fn insert_and_fetch_people() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let school_id = db.insert_school(
            "Govt Model Primary School", Some("12 Main Rd"), None
        ).await.unwrap();

        let mut stud = test_student("stu1", "Stu One");
        stud.school_id = Some(school_id);
        let stu_id = db.insert_student(&stud).await.unwrap();

        let fetched = db.get_student_by_uname("stu1").await.unwrap().unwrap();
        assert_eq!(fetched.id, stu_id);
        assert_eq!(&fetched.name, "Stu One");

        let (_, school_name) =
            db.get_student_profile(stu_id).await.unwrap().unwrap();
        assert_eq!(school_name.as_deref(), Some("Govt Model Primary School"));

        assert!(db.get_student(stu_id + 1).await.unwrap().is_none());

        // Duplicate unames refused, even across tables.
        assert!(db.insert_student(&stud).await.is_err());
        assert!(db.insert_admin("stu1", "Impostor", "x@gmps.test").await.is_err());

        let admin_id = db.insert_admin(
            "root", "Thelma Root", "root@gmps.test"
        ).await.unwrap();
        let a = db.get_admin_by_uname("root").await.unwrap().unwrap();
        assert_eq!((a.id, a.name.as_str()), (admin_id, "Thelma Root"));

        let roster = db.get_students().await.unwrap();
        assert_eq!(roster.len(), 1);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn update_student_profile() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let mut stud = test_student("stu2", "Stu Two");
        stud.id = db.insert_student(&stud).await.unwrap();

        stud.name = "Stu Two Jr".to_owned();
        stud.contact_info = Some("555-0199".to_owned());
        assert!(db.update_student(&stud).await.unwrap());

        let fetched = db.get_student(stud.id).await.unwrap().unwrap();
        assert_eq!(&fetched.name, "Stu Two Jr");
        assert_eq!(fetched.contact_info.as_deref(), Some("555-0199"));

        let mut ghost = test_student("ghost", "Ghost");
        ghost.id = stud.id + 1;
        assert!(!db.update_student(&ghost).await.unwrap());

        db.nuke_database().await.unwrap();
    }
}
