//! End-to-end smoke run of the alignment pipeline on synthetic data.
//!
//! Generates paired anchor activations for two synthetic models related by
//! a hidden linear map, then drives one vector through `align` (computing
//! the matrix on demand), `validate`, and packet framing/verification.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p latent-align-pipeline --bin alignment-smoke -- --seed 7
//! cargo run -p latent-align-pipeline --bin alignment-smoke -- \
//!     --config latent-align.toml --epsilon 2.0 --output smoke.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use latent_align_core::codec::{parse_packet, PacketSigner};
use latent_align_core::{ActivationBatch, LatentVector, ModelId, ModelPair, PipelineConfig};
use latent_align_pipeline::stubs::{InMemoryAnchorSource, TailMassClassifier, VocabularyDecoder};
use latent_align_pipeline::{AlignOptions, AlignmentService, AnchorSet, PrivacyOptions};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, StandardNormal};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "alignment-smoke")]
#[command(about = "Run the latent alignment pipeline end to end on synthetic activations")]
struct Args {
    /// Optional TOML configuration; LATENT_ALIGN_* overrides apply on top.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 128)]
    source_dim: usize,

    #[arg(long, default_value_t = 96)]
    target_dim: usize,

    /// Number of paired anchor samples.
    #[arg(long, default_value_t = 1024)]
    anchors: usize,

    /// Apply differential privacy with this epsilon.
    #[arg(long)]
    epsilon: Option<f64>,

    #[arg(long, default_value_t = 1e-5)]
    delta: f64,

    /// Write a JSON summary here.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn gaussian(rng: &mut ChaCha8Rng, n: usize) -> Vec<f32> {
    (0..n)
        .map(|_| -> f32 { StandardNormal.sample(&mut *rng) })
        .collect()
}

/// Anchors where `target = source · M + noise` for a random `M`.
fn synthetic_anchors(rng: &mut ChaCha8Rng, rows: usize, d_a: usize, d_b: usize) -> Result<AnchorSet> {
    let scale = Normal::new(0.0f32, 1.0 / (d_a as f32).sqrt())?;
    let noise = Normal::new(0.0f32, 0.01)?;
    let hidden: Vec<f32> = (0..d_a * d_b).map(|_| scale.sample(&mut *rng)).collect();

    let source = gaussian(rng, rows * d_a);
    let mut target = Vec::with_capacity(rows * d_b);
    for row in source.chunks_exact(d_a) {
        for j in 0..d_b {
            let mut acc = noise.sample(&mut *rng);
            for (i, x) in row.iter().enumerate() {
                acc += x * hidden[i * d_b + j];
            }
            target.push(acc);
        }
    }
    Ok(AnchorSet::new(
        ActivationBatch::new(rows, d_a, source)?,
        ActivationBatch::new(rows, d_b, target)?,
    )?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;

    println!("=======================================================================");
    println!("  LATENT ALIGNMENT SMOKE RUN");
    println!(
        "  {} anchors, {}D -> {}D, seed {}",
        args.anchors, args.source_dim, args.target_dim, args.seed
    );
    println!("=======================================================================");

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let source_model = ModelId::new("synthetic-a")?;
    let target_model = ModelId::new("synthetic-b")?;
    let pair = ModelPair::new(source_model.clone(), target_model.clone());

    let anchor_source = Arc::new(InMemoryAnchorSource::new());
    anchor_source.insert(
        pair.clone(),
        synthetic_anchors(&mut rng, args.anchors, args.source_dim, args.target_dim)?,
    );

    let vocabulary = ["latent", "signal", "summary", "report", "vector", "context", "layer", "token"]
        .iter()
        .map(|w| w.to_string())
        .collect();
    let service = AlignmentService::new(
        config,
        Arc::new(TailMassClassifier::default()),
        Arc::new(VocabularyDecoder::new(vocabulary, 3)?),
    )?
    .with_anchor_source(anchor_source);

    let input = LatentVector::new(source_model.clone(), 12, gaussian(&mut rng, args.source_dim))?;

    let report = service.validate(&input, false).await;
    println!("\nvalidate: valid={} adversarial_score={:?}", report.is_valid, report.adversarial_score);

    let mut options = AlignOptions::default();
    if let Some(epsilon) = args.epsilon {
        options = options.with_privacy(PrivacyOptions::new("smoke-buyer", epsilon, args.delta));
    }
    let outcome = service
        .align(&input, &source_model, &target_model, options)
        .await?;
    println!(
        "align: tier={} version={} confidence={:.4} naive_agreement={:?} time={}ms",
        outcome.tier,
        outcome.matrix_version,
        outcome.confidence,
        outcome.naive_agreement,
        outcome.processing_time_ms
    );
    if let Some(receipt) = &outcome.privacy {
        println!(
            "privacy: sigma={:.4} epsilon_remaining={:.2}",
            receipt.sigma, receipt.epsilon_remaining
        );
    }

    let signer = PacketSigner::from_seed(&[0x5a; 32]);
    let packet = service.frame_outcome_default(&outcome, 1, &signer)?;
    let bytes = packet.to_bytes();
    let parsed = parse_packet(&bytes)?;
    parsed.verify_signature(&signer.verifying_key())?;
    let received = parsed.latent_vector()?;
    println!(
        "packet: {} bytes, {} components, signature verified",
        bytes.len(),
        received.dimension()
    );

    let stats = service.stats();
    println!("stats: {:?}", stats);

    if let Some(path) = &args.output {
        let summary = json!({
            "seed": args.seed,
            "tier": outcome.tier,
            "matrix_version": outcome.matrix_version,
            "confidence": outcome.confidence,
            "naive_agreement": outcome.naive_agreement,
            "processing_time_ms": outcome.processing_time_ms,
            "packet_bytes": bytes.len(),
            "validation": report,
            "stats": stats,
        });
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("summary written to {}", path.display());
    }
    Ok(())
}
