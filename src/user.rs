/*!
Users of the system and the identities they authenticate into.
*/
use time::Date;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    /// Canonical wire/database form of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin   => "admin",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin"   => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

/// A row from the `students` table.
#[derive(Clone, Debug)]
pub struct Student {
    pub id: i64,
    pub uname: String,
    pub name: String,
    pub email: String,
    pub dob: Option<Date>,
    pub gender: Option<String>,
    pub contact_info: Option<String>,
    /// `school_id` of the school the student currently attends.
    pub school_id: Option<i64>,
}

/// A row from the `admins` table.
#[derive(Clone, Debug)]
pub struct Admin {
    pub id: i64,
    pub uname: String,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug)]
pub enum User {
    Admin(Admin),
    Student(Student),
}

impl User {
    pub fn id(&self) -> i64 {
        match self {
            User::Admin(a) => a.id,
            User::Student(s) => s.id,
        }
    }

    pub fn uname(&self) -> &str {
        match self {
            User::Admin(a) => &a.uname,
            User::Student(s) => &s.uname,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            User::Admin(a) => &a.name,
            User::Student(s) => &s.name,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            User::Admin(_) => Role::Admin,
            User::Student(_) => Role::Student,
        }
    }

    /// The `Identity` this user assumes upon successful login.
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id(),
            uname: self.uname().to_owned(),
            name: self.name().to_owned(),
            role: self.role(),
        }
    }
}

/**
The authenticated principal bound to a session key.

An `Identity` is assembled at login time and immutable for the life of the
session; the request guard attaches a copy to every request it admits.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub id: i64,
    pub uname: String,
    pub name: String,
    pub role: Role,
}

impl Identity {
    /**
    The self-service scoping rule.

    Given the student id a request asks for, yield the id the caller may
    actually operate on:

      * an admin operates on whatever id was requested;
      * a student operates only on their own id, and a request for any
        other id resolves to `None`.

    Callers must answer `None` with the same not-found response used for
    genuinely absent resources, so that probing for other students'
    records is indistinguishable from probing for records that do not
    exist.
    */
    pub fn scoped_student_id(&self, requested: i64) -> Option<i64> {
        match self.role {
            Role::Admin => Some(requested),
            Role::Student => {
                if self.id == requested {
                    Some(self.id)
                } else {
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::Admin, Role::Student] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(role, parsed);
        }
        assert!("Teacher".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn scoping() {
        let stud = Identity {
            id: 42,
            uname: "stu1".to_owned(),
            name: "Stu One".to_owned(),
            role: Role::Student,
        };
        let admin = Identity {
            id: 1,
            uname: "root".to_owned(),
            name: "Root".to_owned(),
            role: Role::Admin,
        };

        assert_eq!(stud.scoped_student_id(42), Some(42));
        assert_eq!(stud.scoped_student_id(43), None);
        assert_eq!(stud.scoped_student_id(1), None);
        assert_eq!(admin.scoped_student_id(42), Some(42));
        assert_eq!(admin.scoped_student_id(43), Some(43));
    }
}
