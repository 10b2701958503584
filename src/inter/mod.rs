/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `auth` and
`store`.)

The request guards live here: `authenticate` and `authenticate_admin`
resolve the bearer key on every request to a protected route and either
attach the resolved `Identity` or reject, before any handler body runs.
Authentication and authorization failures never reach the handlers;
handlers only ever deal in validation and not-found conditions.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, Request, StatusCode},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use time::Date;
use tokio::sync::RwLock;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::user::{Identity, Role};

pub mod admin;
pub mod student;

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/// Data type to read the body of a login request.
#[derive(serde::Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub username: String,
    pub password: String,
    pub user_type: String,
}

pub fn respond_json<S: Serialize>(code: StatusCode, data: &S) -> Response {
    match serde_json::to_value(data) {
        Ok(v) => (code, Json(v)).into_response(),
        Err(e) => {
            log::error!("Error serializing response data: {}", &e);
            json_500()
        },
    }
}

/// Return a JSON response in the case of an unrecoverable* error.
///
/// (*"Unrecoverable" from the perspective of fielding the current
/// request, not from the perspective of the program crashing.)
///
/// Detail goes to the log, never to the client.
pub fn json_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal server error." }))
    ).into_response()
}

/// The one generic response to every failed login, whatever actually
/// went wrong, so nothing can be learned by comparing them.
pub fn respond_bad_login() -> Response {
    log::trace!("respond_bad_login() called.");

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Invalid credentials." }))
    ).into_response()
}

pub fn respond_unauthenticated() -> Response {
    log::trace!("respond_unauthenticated() called.");

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Authentication required." }))
    ).into_response()
}

pub fn respond_unauthorized() -> Response {
    log::trace!("respond_unauthorized() called.");

    (
        StatusCode::FORBIDDEN,
        Json(json!({ "message": "Insufficient privileges." }))
    ).into_response()
}

/// The one not-found response. Ownership mismatches answer with this
/// exact response too, so they can't be told apart from absent rows.
pub fn respond_not_found() -> Response {
    log::trace!("respond_not_found() called.");

    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Resource not found." }))
    ).into_response()
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": msg }))
    ).into_response()
}

/// Formats an optional date for a JSON payload; `None` becomes `null`.
pub(crate) fn date_value(d: Option<Date>) -> Value {
    match d {
        Some(d) => match d.format(&crate::DATE_FMT) {
            Ok(s) => Value::String(s),
            Err(e) => {
                log::error!("Error formatting date {:?}: {}", &d, &e);
                Value::Null
            },
        },
        None => Value::Null,
    }
}

/*
One builder per resource, so every endpoint that serves a resource serves
the same shape. (The system this replaces had several divergent versions
of some of these, differing in field casing and structure.)
*/

pub(crate) fn student_value(
    s: &crate::user::Student,
    school_name: Option<&str>,
) -> Value {
    json!({
        "student_id": s.id,
        "username": &s.uname,
        "name": &s.name,
        "email": &s.email,
        "dob": date_value(s.dob),
        "gender": &s.gender,
        "contact_info": &s.contact_info,
        "current_school_id": &s.school_id,
        "school_name": school_name,
    })
}

pub(crate) fn record_value(r: &crate::store::records::AcademicRecord) -> Value {
    json!({
        "record_id": r.id,
        "student_id": r.student_id,
        "school_standard": &r.school_standard,
        "subject": &r.subject,
        "marks": r.marks,
        "percentage": r.percentage,
        "grade": &r.grade,
    })
}

pub(crate) fn document_value(d: &crate::store::documents::Document) -> Value {
    json!({
        "document_id": d.id,
        "student_id": d.student_id,
        "document_type": &d.document_type,
        "file_name": &d.file_name,
        "upload_date": date_value(Some(d.upload_date)),
    })
}

pub(crate) fn tc_value(
    tc: &crate::store::transfers::TransferCertificate,
    student_name: Option<&str>,
) -> Value {
    let mut v = json!({
        "tc_id": tc.id,
        "student_id": tc.student_id,
        "application_date": date_value(Some(tc.application_date)),
        "destination_school": &tc.destination_school,
        "reason": &tc.reason,
        "transfer_date": date_value(Some(tc.transfer_date)),
        "status": tc.status.as_str(),
        "comments": &tc.comments,
        "processed_by": &tc.processed_by,
        "processed_date": date_value(tc.processed_date),
    });
    if let Some(name) = student_name {
        v["student_name"] = Value::String(name.to_owned());
    }
    v
}

pub(crate) fn enrollment_value(
    e: &crate::store::schemes::SchemeEnrollment,
) -> Value {
    json!({
        "enrollment_id": e.id,
        "student_id": e.student_id,
        "scheme_id": e.scheme_id,
        "scheme_name": &e.scheme_name,
        "start_date": date_value(Some(e.start_date)),
        "end_date": date_value(e.end_date),
        "status": &e.status,
    })
}

pub(crate) fn school_value(s: &crate::store::schools::School) -> Value {
    json!({
        "school_id": s.id,
        "name": &s.name,
        "address": &s.address,
        "contact_info": &s.contact_info,
    })
}

/// Pulls the bearer key out of an `Authorization` header, if any.
fn parse_bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?
        .to_str().ok()?
        .strip_prefix("Bearer ")
}

/**
Resolves the request's bearer key to an `Identity`, or to the response
that should be returned instead.

This realizes the top rows of the access decision table: no key and
unknown/expired/mangled keys are all "unauthenticated"; role checking is
the caller's business.
*/
async fn resolve_identity(
    headers: &HeaderMap,
    glob: &Arc<RwLock<Glob>>,
) -> Result<Identity, Response> {
    let key = match parse_bearer(headers) {
        Some(k) => k,
        None => { return Err(respond_unauthenticated()); },
    };

    // We bind the result, then match on the bound value, instead of
    // matching on the whole chain expression, so that the locks release.
    let res = glob.read().await.auth().read().await.check_key(key).await;

    match res {
        Err(e) => {
            log::error!("auth::Db::check_key() returned error: {}", &e);
            Err(json_500())
        },
        Ok(AuthResult::InvalidKey) => Err(respond_unauthenticated()),
        Ok(AuthResult::Identity(ident)) => Ok(ident),
        Ok(x) => {
            log::warn!(
                "auth::Db::check_key() returned {:?}, which should never happen.",
                &x
            );
            Err(json_500())
        },
    }
}

/// Middleware guarding routes any authenticated user may reach. Attaches
/// the resolved `Identity` to the request.
pub async fn authenticate<B>(
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    let glob: Arc<RwLock<Glob>> = req.extensions()
        .get::<Arc<RwLock<Glob>>>()
        .cloned()
        .expect("Glob extension should be layered outside the guards");

    let ident = match resolve_identity(req.headers(), &glob).await {
        Ok(ident) => ident,
        Err(resp) => { return resp; },
    };

    req.extensions_mut().insert(ident);
    next.run(req).await
}

/// Middleware guarding admin-only routes. Distinct from the
/// unauthenticated rejection: the caller is somebody, just not an admin.
pub async fn authenticate_admin<B>(
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    let glob: Arc<RwLock<Glob>> = req.extensions()
        .get::<Arc<RwLock<Glob>>>()
        .cloned()
        .expect("Glob extension should be layered outside the guards");

    let ident = match resolve_identity(req.headers(), &glob).await {
        Ok(ident) => ident,
        Err(resp) => { return resp; },
    };

    if ident.role != Role::Admin {
        return respond_unauthorized();
    }

    req.extensions_mut().insert(ident);
    next.run(req).await
}

pub async fn login(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Json(form): Json<LoginData>,
) -> Response {
    log::trace!(
        "login( {:?} [{}] ) called.", &form.username, &form.user_type
    );

    let role: Role = match form.user_type.parse() {
        Ok(r) => r,
        Err(_) => {
            return respond_bad_request(format!(
                "{:?} is not a valid userType.", &form.user_type
            ));
        },
    };

    let glob = glob.read().await;

    let user = {
        let data = glob.data().read().await;
        let res = match role {
            Role::Student => data.get_student_by_uname(&form.username).await
                .map(|opt| opt.map(crate::user::User::Student)),
            Role::Admin => data.get_admin_by_uname(&form.username).await
                .map(|opt| opt.map(crate::user::User::Admin)),
        };
        match res {
            Ok(u) => u,
            Err(e) => {
                log::error!(
                    "Error looking up {} {:?}: {}",
                    &role, &form.username, &e
                );
                return json_500();
            },
        }
    };

    let user = match user {
        Some(u) => u,
        None => {
            // No such user in the data DB. Run the credential check
            // anyway so this path costs what the wrong-password path
            // costs, then fail generically.
            let res = glob.auth().read().await.check_password(
                &form.username, role, &form.password
            ).await;
            if let Err(e) = res {
                log::error!(
                    "auth::Db::check_password( {:?}, {} ) error: {}",
                    &form.username, &role, &e
                );
                return json_500();
            }
            return respond_bad_login();
        },
    };

    let ident = user.identity();
    let auth_response = glob.auth().read().await
        .check_password_and_issue_key(&ident, &form.password).await;

    let key = match auth_response {
        Err(e) => {
            log::error!(
                "auth::Db::check_password_and_issue_key( {:?} ) error: {}",
                &ident.uname, &e
            );
            return json_500();
        },
        Ok(AuthResult::Key(k)) => k,
        Ok(AuthResult::BadPassword) | Ok(AuthResult::NoSuchUser) => {
            return respond_bad_login();
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_password_and_issue_key( {:?} ) returned {:?}, which shouldn't happen.",
                &ident.uname, &x
            );
            return respond_bad_login();
        },
    };

    let data = json!({
        "message": "Login successful",
        "token": &key,
        "user": {
            "id": ident.id,
            "name": &ident.name,
            "userType": ident.role.as_str(),
        },
    });

    respond_json(StatusCode::OK, &data)
}

/// Ends the presented session by deleting its key; the guard has already
/// established the key is live.
pub async fn logout(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    headers: HeaderMap,
) -> Response {
    log::trace!("logout() called.");

    let key = match parse_bearer(&headers) {
        Some(k) => k,
        None => { return respond_unauthenticated(); },
    };

    let res = glob.read().await.auth().read().await.delete_key(key).await;
    if let Err(e) = res {
        log::error!("auth::Db::delete_key() error: {}", &e);
        return json_500();
    }

    respond_json(StatusCode::OK, &json!({ "message": "Logged out." }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::Duration;

    use crate::{auth, store::Store, store::tests::TEST_CONNECTION};
    use crate::tests::ensure_logging;

    static AUTH_TEST_CONNECTION: &str =
        "host=localhost user=gmps_test password='gmps_test' dbname=gmps_auth_test";

    #[test]
    fn bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_bearer(&headers), None);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer sOmEkEy123")
        );
        assert_eq!(parse_bearer(&headers), Some("sOmEkEy123"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz")
        );
        assert_eq!(parse_bearer(&headers), None);
    }

    pub(crate) async fn test_glob() -> Arc<RwLock<Glob>> {
        let auth_db = auth::Db::new(
            AUTH_TEST_CONNECTION.to_owned(),
            Duration::minutes(30),
        );
        auth_db.ensure_db_schema().await.unwrap();
        let data_db = Store::new(TEST_CONNECTION.to_owned());
        data_db.ensure_db_schema().await.unwrap();

        let glob = Glob {
            auth: RwLock::new(auth_db),
            data: RwLock::new(data_db),
            uploads_dir: std::env::temp_dir().join("gmps_test_uploads"),
            addr: std::net::SocketAddr::new("127.0.0.1".parse().unwrap(), 0),
        };
        std::fs::create_dir_all(&glob.uploads_dir).unwrap();

        Arc::new(RwLock::new(glob))
    }

    pub(crate) async fn nuke_glob(glob: &Arc<RwLock<Glob>>) {
        let glob = glob.read().await;
        glob.auth().read().await.nuke_database().await.unwrap();
        glob.data().read().await.nuke_database().await.unwrap();
    }

    /// The guard's decision table, bottom of the stack: no key and a
    /// bogus key both read as unauthenticated; a live key resolves to
    /// exactly the identity it was issued for.
    #[tokio::test]
    #[serial]
    async fn guard_resolution() {
        ensure_logging();

        let glob = test_glob().await;
        let ident = crate::user::Identity {
            id: 42,
            uname: "stu1".to_owned(),
            name: "Stu One".to_owned(),
            role: Role::Student,
        };
        let key = {
            let g = glob.read().await;
            let auth = g.auth().read().await;
            auth.add_user("stu1", Role::Student, "hunter2").await.unwrap();
            match auth.check_password_and_issue_key(&ident, "hunter2").await.unwrap() {
                AuthResult::Key(k) => k,
                x => panic!("Expected a key, got {:?}", &x),
            }
        };

        let headers = HeaderMap::new();
        let no_key = resolve_identity(&headers, &glob).await;
        assert_eq!(
            no_key.err().map(|r| r.status()),
            Some(StatusCode::UNAUTHORIZED)
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer absolutelybogus")
        );
        let bad_key = resolve_identity(&headers, &glob).await;
        assert_eq!(
            bad_key.err().map(|r| r.status()),
            Some(StatusCode::UNAUTHORIZED)
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", &key)).unwrap()
        );
        let resolved = resolve_identity(&headers, &glob).await.unwrap();
        assert_eq!(resolved, ident);

        nuke_glob(&glob).await;
    }

    /// A correct uname with a wrong password and a wholly nonexistent
    /// uname must be indistinguishable from outside.
    #[tokio::test]
    #[serial]
    async fn login_failures_indistinguishable() {
        ensure_logging();

        let glob = test_glob().await;
        {
            let g = glob.read().await;
            let stud = crate::store::students::tests::test_student("stu1", "Stu One");
            g.data().read().await.insert_student(&stud).await.unwrap();
            g.auth().read().await.add_user(
                "stu1", Role::Student, "right-password"
            ).await.unwrap();
        }

        let wrong_password = login(
            Extension(glob.clone()),
            Json(LoginData {
                username: "stu1".to_owned(),
                password: "wrong-password".to_owned(),
                user_type: "student".to_owned(),
            }),
        ).await;
        let no_such_user = login(
            Extension(glob.clone()),
            Json(LoginData {
                username: "nobody".to_owned(),
                password: "right-password".to_owned(),
                user_type: "student".to_owned(),
            }),
        ).await;
        // Valid student credentials, claimed as admin.
        let wrong_role = login(
            Extension(glob.clone()),
            Json(LoginData {
                username: "stu1".to_owned(),
                password: "right-password".to_owned(),
                user_type: "admin".to_owned(),
            }),
        ).await;

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(no_such_user.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_role.status(), StatusCode::UNAUTHORIZED);

        let ok = login(
            Extension(glob.clone()),
            Json(LoginData {
                username: "stu1".to_owned(),
                password: "right-password".to_owned(),
                user_type: "student".to_owned(),
            }),
        ).await;
        assert_eq!(ok.status(), StatusCode::OK);

        nuke_glob(&glob).await;
    }
}
