/*!
Handlers for the admin-resource namespace (`/api/admin/...`).

Everything here runs behind the `authenticate_admin` guard, so the
attached `Identity` is always an admin and handlers take client-supplied
student identifiers at face value. What they do NOT take from the client
is the processor stamp on a transfer certificate decision; that comes
from the caller's own identity.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use time::Date;
use tokio::sync::RwLock;

use crate::config::Glob;
use crate::store::records::AcademicRecord;
use crate::store::transfers::TcStatus;
use crate::user::{Identity, Student};
use super::*;

pub async fn students(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::students() called.");

    let glob = glob.read().await;
    let res = glob.data().read().await.get_students().await;

    match res {
        Err(e) => {
            log::error!("Store::get_students() error: {}", &e);
            json_500()
        },
        Ok(roster) => {
            let roster: Vec<_> = roster.iter()
                .map(|(stud, school_name)| {
                    student_value(stud, school_name.as_deref())
                }).collect();
            respond_json(StatusCode::OK, &json!({ "students": roster }))
        },
    }
}

pub async fn student_detail(
    Path(student_id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::student_detail( {} ) called.", &student_id);

    let glob = glob.read().await;
    let res = glob.data().read().await.get_student_profile(student_id).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::get_student_profile( {} ) error: {}", &student_id, &e
            );
            json_500()
        },
        Ok(None) => respond_not_found(),
        Ok(Some((stud, school_name))) => respond_json(
            StatusCode::OK,
            &json!({ "student": student_value(&stud, school_name.as_deref()) })
        ),
    }
}

/// Data type to read the body of a student-profile update.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdate {
    name: Option<String>,
    email: Option<String>,
    dob: Option<String>,
    gender: Option<String>,
    contact_info: Option<String>,
    current_school_id: Option<i64>,
}

pub async fn update_student(
    Path(student_id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Json(form): Json<StudentUpdate>,
) -> Response {
    log::trace!("admin::update_student( {} ) called.", &student_id);

    let glob = glob.read().await;
    let data = glob.data().read().await;

    let mut stud: Student = match data.get_student(student_id).await {
        Err(e) => {
            log::error!("Store::get_student( {} ) error: {}", &student_id, &e);
            return json_500();
        },
        Ok(None) => { return respond_not_found(); },
        Ok(Some(s)) => s,
    };

    if let Some(s) = form.name {
        if s.is_empty() {
            return respond_bad_request("name must not be empty.".to_owned());
        }
        stud.name = s;
    }
    if let Some(s) = form.email {
        stud.email = s;
    }
    if let Some(s) = form.dob {
        match Date::parse(&s, &crate::DATE_FMT) {
            Ok(d) => { stud.dob = Some(d); },
            Err(e) => {
                return respond_bad_request(format!(
                    "Error parsing dob {:?}: {}", &s, &e
                ));
            },
        }
    }
    if let Some(s) = form.gender {
        stud.gender = Some(s);
    }
    if let Some(s) = form.contact_info {
        stud.contact_info = Some(s);
    }
    if let Some(n) = form.current_school_id {
        stud.school_id = Some(n);
    }

    match data.update_student(&stud).await {
        Err(e) => {
            log::error!("Store::update_student( {} ) error: {}", &student_id, &e);
            json_500()
        },
        Ok(false) => respond_not_found(),
        Ok(true) => respond_json(
            StatusCode::OK,
            &json!({
                "message": "Student updated successfully",
                "student": student_value(&stud, None),
            })
        ),
    }
}

/// Profile, academic records, and scheme history in one response.
pub async fn comprehensive(
    Path(student_id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::comprehensive( {} ) called.", &student_id);

    let glob = glob.read().await;
    let data = glob.data().read().await;

    let (stud, school_name) = match data.get_student_profile(student_id).await {
        Err(e) => {
            log::error!(
                "Store::get_student_profile( {} ) error: {}", &student_id, &e
            );
            return json_500();
        },
        Ok(None) => { return respond_not_found(); },
        Ok(Some(pair)) => pair,
    };

    let records = match data.get_academic_records(student_id).await {
        Err(e) => {
            log::error!(
                "Store::get_academic_records( {} ) error: {}", &student_id, &e
            );
            return json_500();
        },
        Ok(recs) => recs,
    };

    let schemes = match data.get_scheme_history(student_id).await {
        Err(e) => {
            log::error!(
                "Store::get_scheme_history( {} ) error: {}", &student_id, &e
            );
            return json_500();
        },
        Ok(h) => h,
    };

    let records: Vec<_> = records.iter().map(record_value).collect();
    let schemes: Vec<_> = schemes.iter().map(enrollment_value).collect();

    respond_json(
        StatusCode::OK,
        &json!({
            "student": student_value(&stud, school_name.as_deref()),
            "academicRecords": records,
            "schemes": schemes,
        })
    )
}

/// Query string for the flat academic-records endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsQuery {
    student_id: Option<i64>,
}

pub async fn academic_records(
    Query(query): Query<RecordsQuery>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::academic_records( {:?} ) called.", &query);

    let student_id = match query.student_id {
        Some(n) => n,
        None => {
            return respond_bad_request(
                "Missing required query parameter: studentId.".to_owned()
            );
        },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await.get_academic_records(student_id).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::get_academic_records( {} ) error: {}", &student_id, &e
            );
            json_500()
        },
        Ok(recs) => {
            let recs: Vec<_> = recs.iter().map(record_value).collect();
            respond_json(StatusCode::OK, &json!({ "academicRecords": recs }))
        },
    }
}

/// Data type to read an academic record from a request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordData {
    student_id: Option<i64>,
    school_standard: Option<String>,
    subject: Option<String>,
    marks: Option<f32>,
    percentage: Option<f32>,
    grade: Option<String>,
}

impl RecordData {
    /// Checks all fields present and assembles a record with `id` 0.
    fn into_record(self) -> Result<AcademicRecord, String> {
        let student_id = self.student_id
            .ok_or_else(|| "Missing required field: studentId.".to_owned())?;
        let school_standard = match self.school_standard {
            Some(s) if !s.is_empty() => s,
            _ => { return Err("Missing required field: schoolStandard.".to_owned()); },
        };
        let subject = match self.subject {
            Some(s) if !s.is_empty() => s,
            _ => { return Err("Missing required field: subject.".to_owned()); },
        };
        let marks = self.marks
            .ok_or_else(|| "Missing required field: marks.".to_owned())?;
        let percentage = self.percentage
            .ok_or_else(|| "Missing required field: percentage.".to_owned())?;
        let grade = match self.grade {
            Some(s) if !s.is_empty() => s,
            _ => { return Err("Missing required field: grade.".to_owned()); },
        };

        Ok(AcademicRecord {
            id: 0,
            student_id,
            school_standard,
            subject,
            marks,
            percentage,
            grade,
        })
    }
}

pub async fn add_academic_record(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Json(form): Json<RecordData>,
) -> Response {
    log::trace!("admin::add_academic_record( {:?} ) called.", &form);

    let mut rec = match form.into_record() {
        Ok(r) => r,
        Err(e) => { return respond_bad_request(e); },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await.insert_academic_record(&rec).await;

    match res {
        Err(e) => {
            log::error!("Store::insert_academic_record() error: {}", &e);
            json_500()
        },
        Ok(id) => {
            rec.id = id;
            respond_json(
                StatusCode::OK,
                &json!({
                    "message": "Academic record added successfully",
                    "record": record_value(&rec),
                })
            )
        },
    }
}

pub async fn update_academic_record(
    Path(record_id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Json(form): Json<RecordData>,
) -> Response {
    log::trace!("admin::update_academic_record( {} ) called.", &record_id);

    let mut rec = match form.into_record() {
        Ok(r) => r,
        Err(e) => { return respond_bad_request(e); },
    };
    rec.id = record_id;

    let glob = glob.read().await;
    let res = glob.data().read().await.update_academic_record(&rec).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::update_academic_record( {} ) error: {}", &record_id, &e
            );
            json_500()
        },
        Ok(false) => respond_not_found(),
        Ok(true) => respond_json(
            StatusCode::OK,
            &json!({
                "message": "Academic record updated successfully",
                "record": record_value(&rec),
            })
        ),
    }
}

pub async fn delete_academic_record(
    Path(record_id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::delete_academic_record( {} ) called.", &record_id);

    let glob = glob.read().await;
    let res = glob.data().read().await.delete_academic_record(record_id).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::delete_academic_record( {} ) error: {}", &record_id, &e
            );
            json_500()
        },
        Ok(false) => respond_not_found(),
        Ok(true) => respond_json(
            StatusCode::OK,
            &json!({ "message": "Academic record deleted successfully" })
        ),
    }
}

/// Data type to read a bulk-import request body.
#[derive(Debug, Deserialize)]
pub struct BulkImport {
    records: Option<Vec<RecordData>>,
}

pub async fn bulk_import_academic_records(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Json(form): Json<BulkImport>,
) -> Response {
    log::trace!("admin::bulk_import_academic_records() called.");

    let records = match form.records {
        Some(r) if !r.is_empty() => r,
        _ => { return respond_bad_request("No records to import.".to_owned()); },
    };

    let mut recs: Vec<AcademicRecord> = Vec::with_capacity(records.len());
    for (n, data) in records.into_iter().enumerate() {
        match data.into_record() {
            Ok(r) => { recs.push(r); },
            Err(e) => {
                return respond_bad_request(format!("Record {}: {}", &n, &e));
            },
        }
    }

    let glob = glob.read().await;
    let res = glob.data().read().await.insert_academic_records(&recs).await;

    match res {
        Err(e) => {
            log::error!("Store::insert_academic_records() error: {}", &e);
            json_500()
        },
        Ok(n) => respond_json(
            StatusCode::OK,
            &json!({
                "message": "Academic records imported successfully",
                "imported": n,
            })
        ),
    }
}

pub async fn transfer_certificates(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::transfer_certificates() called.");

    let glob = glob.read().await;
    let res = glob.data().read().await.get_transfer_certificates().await;

    match res {
        Err(e) => {
            log::error!("Store::get_transfer_certificates() error: {}", &e);
            json_500()
        },
        Ok(tcs) => {
            let tcs: Vec<_> = tcs.iter()
                .map(|(tc, name)| tc_value(tc, Some(name.as_str())))
                .collect();
            respond_json(StatusCode::OK, &json!({ "transferCertificates": tcs }))
        },
    }
}

pub async fn transfer_certificate_detail(
    Path(tc_id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::transfer_certificate_detail( {} ) called.", &tc_id);

    let glob = glob.read().await;
    let res = glob.data().read().await.get_transfer_certificate(tc_id).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::get_transfer_certificate( {} ) error: {}", &tc_id, &e
            );
            json_500()
        },
        Ok(None) => respond_not_found(),
        Ok(Some((tc, name))) => respond_json(
            StatusCode::OK,
            &json!({ "transferCertificate": tc_value(&tc, Some(name.as_str())) })
        ),
    }
}

/// Data type to read a transfer certificate decision.
///
/// There is deliberately no processed-by field; the processor is
/// whoever's key this request arrived under.
#[derive(Debug, Deserialize)]
pub struct TcDecision {
    status: Option<String>,
    comments: Option<String>,
}

pub async fn process_transfer_certificate(
    Path(tc_id): Path<i64>,
    Extension(ident): Extension<Identity>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Json(form): Json<TcDecision>,
) -> Response {
    log::trace!(
        "admin::process_transfer_certificate( {}, {:?} ) called.",
        &tc_id, &form
    );

    let status: TcStatus = match form.status.as_deref() {
        None | Some("") => {
            return respond_bad_request("Missing required field: status.".to_owned());
        },
        Some(s) => match s.parse() {
            Ok(st) => st,
            Err(e) => { return respond_bad_request(e); },
        },
    };

    let processed_date = crate::now();

    let glob = glob.read().await;
    let res = glob.data().read().await.process_transfer_certificate(
        tc_id,
        status,
        form.comments.as_deref(),
        &ident.uname,
        processed_date,
    ).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::process_transfer_certificate( {} ) error: {}", &tc_id, &e
            );
            json_500()
        },
        Ok(false) => respond_not_found(),
        Ok(true) => respond_json(
            StatusCode::OK,
            &json!({
                "message": "Transfer certificate updated successfully",
                "transferCertificate": {
                    "tc_id": tc_id,
                    "status": status.as_str(),
                    "comments": &form.comments,
                    "processed_by": &ident.uname,
                    "processed_date": date_value(Some(processed_date)),
                },
            })
        ),
    }
}

pub async fn delete_transfer_certificate(
    Path(tc_id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::delete_transfer_certificate( {} ) called.", &tc_id);

    let glob = glob.read().await;
    let res = glob.data().read().await.delete_transfer_certificate(tc_id).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::delete_transfer_certificate( {} ) error: {}", &tc_id, &e
            );
            json_500()
        },
        Ok(false) => respond_not_found(),
        Ok(true) => respond_json(
            StatusCode::OK,
            &json!({ "message": "Transfer certificate deleted successfully" })
        ),
    }
}

pub async fn schools(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::schools() called.");

    let glob = glob.read().await;
    let res = glob.data().read().await.get_schools().await;

    match res {
        Err(e) => {
            log::error!("Store::get_schools() error: {}", &e);
            json_500()
        },
        Ok(schools) => {
            let schools: Vec<_> = schools.iter().map(school_value).collect();
            respond_json(StatusCode::OK, &json!({ "schools": schools }))
        },
    }
}
