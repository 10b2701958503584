/*!
Handlers for the student-resource namespace (`/api/students/...`).

Every handler here runs behind the `authenticate` guard, so an `Identity`
is always attached; the first thing each one does is put the requested
student id through the scoping rule. Students resolve only their own id;
admins resolve whatever they asked for. A student asking after anyone
else gets the stock not-found response.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    http::header::{self, HeaderValue},
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use time::Date;
use tokio::sync::RwLock;

use crate::config::Glob;
use crate::store::documents::Document;
use crate::user::Identity;
use super::*;

/// File extensions a document upload may carry.
const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "doc", "docx"];

pub async fn profile(
    Path(student_id): Path<i64>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("student::profile( {} ) called.", &student_id);

    let sid = match ident.scoped_student_id(student_id) {
        Some(sid) => sid,
        None => { return respond_not_found(); },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await.get_student_profile(sid).await;

    match res {
        Err(e) => {
            log::error!("Store::get_student_profile( {} ) error: {}", &sid, &e);
            json_500()
        },
        Ok(None) => respond_not_found(),
        Ok(Some((stud, school_name))) => respond_json(
            StatusCode::OK,
            &json!({ "profile": student_value(&stud, school_name.as_deref()) })
        ),
    }
}

pub async fn academic_records(
    Path(student_id): Path<i64>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("student::academic_records( {} ) called.", &student_id);

    let sid = match ident.scoped_student_id(student_id) {
        Some(sid) => sid,
        None => { return respond_not_found(); },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await.get_academic_records(sid).await;

    match res {
        Err(e) => {
            log::error!("Store::get_academic_records( {} ) error: {}", &sid, &e);
            json_500()
        },
        Ok(recs) => {
            let recs: Vec<_> = recs.iter().map(record_value).collect();
            respond_json(StatusCode::OK, &json!({ "academicRecords": recs }))
        },
    }
}

pub async fn documents(
    Path(student_id): Path<i64>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("student::documents( {} ) called.", &student_id);

    let sid = match ident.scoped_student_id(student_id) {
        Some(sid) => sid,
        None => { return respond_not_found(); },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await.get_documents(sid).await;

    match res {
        Err(e) => {
            log::error!("Store::get_documents( {} ) error: {}", &sid, &e);
            json_500()
        },
        Ok(docs) => {
            let docs: Vec<_> = docs.iter().map(document_value).collect();
            respond_json(StatusCode::OK, &json!({ "documents": docs }))
        },
    }
}

/// Strips any path components from an uploaded filename and replaces
/// everything outside `[A-Za-z0-9._-]`, so the name is safe to join to
/// the uploads directory.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn allowed_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        None => false,
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        },
    }
}

pub async fn upload_document(
    Path(student_id): Path<i64>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    mut multipart: Multipart,
) -> Response {
    log::trace!("student::upload_document( {} ) called.", &student_id);

    let sid = match ident.scoped_student_id(student_id) {
        Some(sid) => sid,
        None => { return respond_not_found(); },
    };

    let mut file: Option<(String, axum::body::Bytes)> = None;
    let mut document_type: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => { break; },
            Err(e) => {
                return respond_bad_request(format!(
                    "Error reading multipart body: {}", &e
                ));
            },
        };

        let field_name = field.name().map(|n| n.to_owned());
        match field_name.as_deref() {
            Some("file") => {
                let file_name = match field.file_name() {
                    Some(n) if !n.is_empty() => n.to_owned(),
                    _ => { return respond_bad_request("No selected file.".to_owned()); },
                };
                let bytes = match field.bytes().await {
                    Ok(b) => b,
                    Err(e) => {
                        return respond_bad_request(format!(
                            "Error reading file field: {}", &e
                        ));
                    },
                };
                file = Some((file_name, bytes));
            },
            Some("documentType") => {
                match field.text().await {
                    Ok(t) => { document_type = Some(t); },
                    Err(e) => {
                        return respond_bad_request(format!(
                            "Error reading documentType field: {}", &e
                        ));
                    },
                }
            },
            _ => { /* Unrecognized fields are ignored. */ },
        }
    }

    let (file_name, bytes) = match file {
        Some(f) => f,
        None => { return respond_bad_request("No file part.".to_owned()); },
    };
    let document_type = match document_type {
        Some(t) if !t.is_empty() => t,
        _ => { return respond_bad_request("Missing required field: documentType.".to_owned()); },
    };

    let file_name = sanitize_filename(&file_name);
    if !allowed_extension(&file_name) {
        return respond_bad_request("File type not allowed.".to_owned());
    }

    let glob = glob.read().await;

    // Prefix with owner and timestamp so concurrent uploads of files
    // with the same name can't clobber each other.
    let stored_name = format!(
        "{}_{}_{}",
        &sid,
        time::OffsetDateTime::now_utc().unix_timestamp(),
        &file_name
    );
    let stored_path = glob.uploads_dir.join(&stored_name);

    if let Err(e) = tokio::fs::write(&stored_path, &bytes).await {
        log::error!(
            "Error writing uploaded file {}: {}", stored_path.display(), &e
        );
        return json_500();
    }

    let mut doc = Document {
        id: 0,
        student_id: sid,
        document_type,
        file_name,
        file_path: stored_path.display().to_string(),
        upload_date: crate::now(),
    };

    let res = glob.data().read().await.insert_document(&doc).await;
    match res {
        Err(e) => {
            log::error!("Store::insert_document() error: {}", &e);
            json_500()
        },
        Ok(id) => {
            doc.id = id;
            respond_json(
                StatusCode::OK,
                &json!({
                    "message": "Document uploaded successfully",
                    "document": document_value(&doc),
                })
            )
        },
    }
}

pub async fn download_document(
    Path((student_id, document_id)): Path<(i64, i64)>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!(
        "student::download_document( {}, {} ) called.",
        &student_id, &document_id
    );

    let sid = match ident.scoped_student_id(student_id) {
        Some(sid) => sid,
        None => { return respond_not_found(); },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await.get_document(document_id).await;

    let doc = match res {
        Err(e) => {
            log::error!("Store::get_document( {} ) error: {}", &document_id, &e);
            return json_500();
        },
        Ok(None) => { return respond_not_found(); },
        Ok(Some(doc)) => doc,
    };

    // A document belonging to some other student doesn't exist, as far
    // as this caller is concerned.
    if doc.student_id != sid {
        return respond_not_found();
    }

    let bytes = match tokio::fs::read(&doc.file_path).await {
        Ok(b) => b,
        Err(e) => {
            log::error!(
                "Error reading stored document {:?}: {}", &doc.file_path, &e
            );
            return json_500();
        },
    };

    let disposition = match HeaderValue::from_str(
        &format!("attachment; filename=\"{}\"", &doc.file_name)
    ) {
        Ok(v) => v,
        Err(e) => {
            log::error!(
                "Error building disposition header for {:?}: {}",
                &doc.file_name, &e
            );
            return json_500();
        },
    };

    (StatusCode::OK, bytes).add_headers(vec![
        (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
        (header::CONTENT_DISPOSITION, disposition),
    ])
}

pub async fn transfer_certificates(
    Path(student_id): Path<i64>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("student::transfer_certificates( {} ) called.", &student_id);

    let sid = match ident.scoped_student_id(student_id) {
        Some(sid) => sid,
        None => { return respond_not_found(); },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await.get_transfer_certificates_for(sid).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::get_transfer_certificates_for( {} ) error: {}", &sid, &e
            );
            json_500()
        },
        Ok(tcs) => {
            let tcs: Vec<_> = tcs.iter().map(|tc| tc_value(tc, None)).collect();
            respond_json(StatusCode::OK, &json!({ "transferCertificates": tcs }))
        },
    }
}

/// Data type to read the body of a transfer certificate application.
///
/// Everything is optional at the serde level so missing fields can be
/// reported individually instead of as an opaque deserialization error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcApplication {
    destination_school: Option<String>,
    reason: Option<String>,
    transfer_date: Option<String>,
}

pub async fn apply_transfer_certificate(
    Path(student_id): Path<i64>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Json(form): Json<TcApplication>,
) -> Response {
    log::trace!(
        "student::apply_transfer_certificate( {}, {:?} ) called.",
        &student_id, &form
    );

    let sid = match ident.scoped_student_id(student_id) {
        Some(sid) => sid,
        None => { return respond_not_found(); },
    };

    let destination_school = match form.destination_school {
        Some(s) if !s.is_empty() => s,
        _ => { return respond_bad_request("Missing required field: destinationSchool.".to_owned()); },
    };
    let reason = match form.reason {
        Some(s) if !s.is_empty() => s,
        _ => { return respond_bad_request("Missing required field: reason.".to_owned()); },
    };
    let transfer_date = match form.transfer_date {
        Some(s) => match Date::parse(&s, &crate::DATE_FMT) {
            Ok(d) => d,
            Err(e) => {
                return respond_bad_request(format!(
                    "Error parsing transferDate {:?}: {}", &s, &e
                ));
            },
        },
        None => { return respond_bad_request("Missing required field: transferDate.".to_owned()); },
    };

    let application_date = crate::now();

    let glob = glob.read().await;
    let res = glob.data().read().await.insert_transfer_application(
        sid,
        application_date,
        &destination_school,
        &reason,
        transfer_date,
    ).await;

    let tc_id = match res {
        Err(e) => {
            log::error!("Store::insert_transfer_application() error: {}", &e);
            return json_500();
        },
        Ok(id) => id,
    };

    let data = json!({
        "message": "Transfer certificate application submitted successfully",
        "transferCertificate": {
            "tc_id": tc_id,
            "student_id": sid,
            "application_date": date_value(Some(application_date)),
            "destination_school": &destination_school,
            "reason": &reason,
            "transfer_date": date_value(Some(transfer_date)),
            "status": "pending",
        },
    });

    respond_json(StatusCode::OK, &data)
}

pub async fn schemes(
    Path(student_id): Path<i64>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("student::schemes( {} ) called.", &student_id);

    let sid = match ident.scoped_student_id(student_id) {
        Some(sid) => sid,
        None => { return respond_not_found(); },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await.get_scheme_history(sid).await;

    match res {
        Err(e) => {
            log::error!("Store::get_scheme_history( {} ) error: {}", &sid, &e);
            json_500()
        },
        Ok(history) => {
            let history: Vec<_> = history.iter().map(enrollment_value).collect();
            respond_json(StatusCode::OK, &json!({ "schemes": history }))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::inter::tests::{nuke_glob, test_glob};
    use crate::store::records::AcademicRecord;
    use crate::store::students::tests::test_student;
    use crate::tests::ensure_logging;
    use crate::user::Role;

    #[test]
    fn filename_sanitizing() {
        assert_eq!(sanitize_filename("report card.pdf"), "report_card.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\stuff\\cert.PDF"), "cert.PDF");

        assert!(allowed_extension("cert.PDF"));
        assert!(allowed_extension("photo.jpeg"));
        assert!(!allowed_extension("script.sh"));
        assert!(!allowed_extension("no_extension"));
    }

    fn identity(id: i64, uname: &str, role: Role) -> Identity {
        Identity {
            id,
            uname: uname.to_owned(),
            name: uname.to_owned(),
            role,
        }
    }

    /// Students reach their own records, nobody else's; admins reach
    /// everybody's. The cross-student rejection must look exactly like
    /// asking for records that aren't there.
    #[tokio::test]
    #[serial]
    async fn records_scoped_to_caller() {
        ensure_logging();

        let glob = test_glob().await;
        let (s1, s2) = {
            let g = glob.read().await;
            let data = g.data().read().await;
            let s1 = data.insert_student(&test_student("stu1", "Stu One")).await.unwrap();
            let s2 = data.insert_student(&test_student("stu2", "Stu Two")).await.unwrap();
            let rec = AcademicRecord {
                id: 0,
                student_id: s1,
                school_standard: "5".to_owned(),
                subject: "Mathematics".to_owned(),
                marks: 91.0,
                percentage: 91.0,
                grade: "A".to_owned(),
            };
            data.insert_academic_record(&rec).await.unwrap();
            (s1, s2)
        };

        let stu1 = identity(s1, "stu1", Role::Student);
        let admin = identity(1, "root", Role::Admin);

        let own = academic_records(
            Path(s1), Extension(stu1.clone()), Extension(glob.clone())
        ).await;
        assert_eq!(own.status(), StatusCode::OK);

        let other = academic_records(
            Path(s2), Extension(stu1.clone()), Extension(glob.clone())
        ).await;
        assert_eq!(other.status(), StatusCode::NOT_FOUND);

        // The ownership mismatch and a genuinely-absent student look
        // identical.
        let absent_profile = profile(
            Path(s2 + 1000), Extension(admin.clone()), Extension(glob.clone())
        ).await;
        let mismatch_profile = profile(
            Path(s2), Extension(stu1.clone()), Extension(glob.clone())
        ).await;
        assert_eq!(absent_profile.status(), StatusCode::NOT_FOUND);
        assert_eq!(mismatch_profile.status(), StatusCode::NOT_FOUND);

        let admin_reach = academic_records(
            Path(s2), Extension(admin.clone()), Extension(glob.clone())
        ).await;
        assert_eq!(admin_reach.status(), StatusCode::OK);

        // Writes are scoped the same as reads.
        let application = apply_transfer_certificate(
            Path(s2),
            Extension(stu1.clone()),
            Extension(glob.clone()),
            Json(TcApplication {
                destination_school: Some("Anand Vidyalaya".to_owned()),
                reason: Some("Trying it on".to_owned()),
                transfer_date: Some("2024-04-01".to_owned()),
            }),
        ).await;
        assert_eq!(application.status(), StatusCode::NOT_FOUND);

        nuke_glob(&glob).await;
    }

    #[tokio::test]
    #[serial]
    async fn application_validation() {
        ensure_logging();

        let glob = test_glob().await;
        let sid = {
            let g = glob.read().await;
            let data = g.data().read().await;
            data.insert_student(&test_student("stu1", "Stu One")).await.unwrap()
        };
        let stu = identity(sid, "stu1", Role::Student);

        let missing_reason = apply_transfer_certificate(
            Path(sid),
            Extension(stu.clone()),
            Extension(glob.clone()),
            Json(TcApplication {
                destination_school: Some("Anand Vidyalaya".to_owned()),
                reason: None,
                transfer_date: Some("2024-04-01".to_owned()),
            }),
        ).await;
        assert_eq!(missing_reason.status(), StatusCode::BAD_REQUEST);

        let bad_date = apply_transfer_certificate(
            Path(sid),
            Extension(stu.clone()),
            Extension(glob.clone()),
            Json(TcApplication {
                destination_school: Some("Anand Vidyalaya".to_owned()),
                reason: Some("Family relocation".to_owned()),
                transfer_date: Some("April 1st".to_owned()),
            }),
        ).await;
        assert_eq!(bad_date.status(), StatusCode::BAD_REQUEST);

        let ok = apply_transfer_certificate(
            Path(sid),
            Extension(stu.clone()),
            Extension(glob.clone()),
            Json(TcApplication {
                destination_school: Some("Anand Vidyalaya".to_owned()),
                reason: Some("Family relocation".to_owned()),
                transfer_date: Some("2024-04-01".to_owned()),
            }),
        ).await;
        assert_eq!(ok.status(), StatusCode::OK);

        nuke_glob(&glob).await;
    }
}
