//! Simulated training job logging into a local tracking store.
//!
//! ```text
//! cargo run --example experiment_session -- [tracking_dir | config.json]
//! ```
//!
//! Browse the results with `mlflow ui --backend-store-uri <tracking_dir>` and
//! `tensorboard --logdir <tracking_dir>`.

use anyhow::Context;
use mlwrapper::{Params, RunSession, SessionConfig};
use ndarray::Array4;
use rand::Rng;
use tracing::level_filters::LevelFilter;
use tracing::Level;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let arg = std::env::args().nth(1).unwrap_or_else(|| "mlruns".to_string());
    let builder = if arg.ends_with(".json") {
        SessionConfig::from_json_file(&arg)
            .with_context(|| format!("reading {arg}"))?
            .into_builder()?
    } else {
        RunSession::builder(arg)
            .experiment_name(format!("demo-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S")))
            .log_level(LevelFilter::INFO)
    };
    let session = builder.build()?;

    let mut train = session.wrap(|epochs: i64, run: &mut RunSession| {
        let mut rng = rand::thread_rng();
        let mut loss = 2.5;
        for epoch in 0..epochs {
            loss *= rng.gen_range(0.85..0.98);
            run.log_scalar("train/loss", loss, epoch)?;
            run.log_scalar("train/accuracy", 1.0 - loss / 2.5, epoch)?;
        }
        run.log_text(Level::INFO, &format!("finished {epochs} epochs"))?;

        let samples = Array4::from_shape_fn((4, 3, 32, 32), |(_, c, h, w)| {
            ((c * 64 + h * 4 + w) % 256) as f32 / 255.0
        });
        run.log_images("samples", &samples, epochs, true)?;
        run.log_metric("final_loss", loss)?;
        Ok::<_, anyhow::Error>(loss)
    });

    for lr in [0.1, 0.01, 0.001] {
        let loss = train.call(Params::new().with("lr", lr).with("optimizer", "sgd"), 30)?;
        println!("lr={lr}: final loss {loss:.4}");
    }

    let session = train.session();
    println!(
        "experiment {} ({}) written to {}",
        session.experiment_name().unwrap_or("?"),
        session
            .experiment_id()
            .map_or_else(|| "?".to_string(), |id| id.to_string()),
        session.tracking_dir().display()
    );
    Ok(())
}
