use clap::Parser;

use oci_model_tools::ResolveOpt;
// cargo run --bin resolve-app -- gemma3
// cargo run --bin resolve-app -- ghcr.io/org/model:v2 --output-path descriptor.json

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    oci_model_tools::init_tracing();
    let opt = ResolveOpt::parse();
    oci_model_tools::resolve_main(opt).await?;
    Ok(())
}
