use anyhow::Context;
use tracing_subscriber::EnvFilter;

use mf_optimizer::CampaignConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("usage: mixfold-recommend <config.json> [batch_size]")?;
    let batch_size = match args.next() {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid batch size {raw:?}"))?,
        None => 1,
    };

    let config = CampaignConfig::from_path(&path)
        .with_context(|| format!("failed to load campaign config from {path}"))?;
    let mut campaign = config.build()?;
    let mut rng = config.rng();

    let batch = campaign.recommend(batch_size, &mut rng)?;
    println!("{}", serde_json::to_string_pretty(&batch.records())?);
    Ok(())
}
