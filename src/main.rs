#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pdf_template_server::run().await
}
