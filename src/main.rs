/*!
Main entry point for the school records portal server.

Wires up logging, configuration, and the two route namespaces, each
behind its guard: any live identity for `/api/students`, admins only for
`/api/admin`. The `Glob` extension is layered outermost so the guards
can reach it.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    middleware,
    Router,
    routing::{get, post, put},
};
use tokio::sync::RwLock;

use gmps::config;
use gmps::inter;

const DEFAULT_CONFIG: &str = "gmps.toml";

#[tokio::main]
async fn main() {
    gmps::init_logging().unwrap();
    log::info!("Logging started.");

    let config_path = std::env::var("GMPS_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG.to_owned());
    let glob = match config::load_configuration(&config_path).await {
        Ok(glob) => glob,
        Err(e) => {
            log::error!("Error loading configuration: {}", &e);
            std::process::exit(1);
        },
    };
    let addr = glob.addr;
    let glob = Arc::new(RwLock::new(glob));

    let student_routes = Router::new()
        .route("/:id", get(inter::student::profile))
        .route("/:id/academic-records", get(inter::student::academic_records))
        .route("/:id/documents", get(inter::student::documents))
        .route("/:id/documents/upload", post(inter::student::upload_document))
        .route(
            "/:id/documents/:doc_id/download",
            get(inter::student::download_document)
        )
        .route(
            "/:id/transfer-certificate",
            get(inter::student::transfer_certificates)
                .post(inter::student::apply_transfer_certificate)
        )
        .route("/:id/schemes", get(inter::student::schemes))
        .route_layer(middleware::from_fn(inter::authenticate));

    let admin_routes = Router::new()
        .route("/students", get(inter::admin::students))
        .route(
            "/students/:id",
            get(inter::admin::student_detail).put(inter::admin::update_student)
        )
        .route("/students/:id/comprehensive", get(inter::admin::comprehensive))
        .route(
            "/academic-records",
            get(inter::admin::academic_records).post(inter::admin::add_academic_record)
        )
        .route(
            "/academic-records/bulk-import",
            post(inter::admin::bulk_import_academic_records)
        )
        .route(
            "/academic-records/:id",
            put(inter::admin::update_academic_record)
                .delete(inter::admin::delete_academic_record)
        )
        .route("/transfer-certificates", get(inter::admin::transfer_certificates))
        .route(
            "/transfer-certificates/:id",
            get(inter::admin::transfer_certificate_detail)
                .patch(inter::admin::process_transfer_certificate)
                .delete(inter::admin::delete_transfer_certificate)
        )
        .route("/schools", get(inter::admin::schools))
        .route_layer(middleware::from_fn(inter::authenticate_admin));

    let app = Router::new()
        .route("/api/auth/login", post(inter::login))
        .route(
            "/api/auth/logout",
            post(inter::logout)
                .route_layer(middleware::from_fn(inter::authenticate))
        )
        .nest("/api/students", student_routes)
        .nest("/api/admin", admin_routes)
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
