#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    office_forms_server::run().await?;
    Ok(())
}
