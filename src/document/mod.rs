pub mod handlers;
pub mod models;

use actix_web::web;

/// Generation, listing and retrieval routes.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/create/pdf/templates/{template_name}")
            .route(web::post().to(handlers::create_pdf)),
    )
    .service(web::resource("/api/files").route(web::get().to(handlers::list_files)))
    // Tail match so names with separators reach validation instead of 404.
    .service(web::resource("/data/{file_name:.*}").route(web::get().to(handlers::serve_file)))
    .service(web::resource("/health").route(web::get().to(handlers::health)))
    .service(web::resource("/").route(web::get().to(handlers::index)));
}
