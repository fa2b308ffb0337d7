use clap::Parser;
use console::style;

use oci_model_tools::download::size_to_string;
use oci_model_tools::PullOpt;
// cargo run --bin puller-app -- ai/smollm2:360M-Q4_K_M --models-dir /tmp/models

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    oci_model_tools::init_tracing();
    let opt = PullOpt::parse();
    let reference = opt.reference.clone();

    let outcome = oci_model_tools::pull_main(opt).await?;

    eprintln!(
        "{} {} -> {}",
        style("Pulled").green().bold(),
        style(&reference).cyan(),
        outcome.path.display()
    );
    eprintln!(
        "  digest: {}\n  size:   {} ({} bytes)",
        outcome.info.digest,
        size_to_string(outcome.bytes),
        outcome.bytes
    );
    Ok(())
}
