use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use classifier_parity::compare::{self, DEFAULT_TOLERANCE};
use classifier_parity::harness::timed;
use classifier_parity::logging::init_tracing;
use classifier_parity::monitor::{self, MonitorOptions};
use classifier_parity::remote::DEFAULT_TIMEOUT;
use classifier_parity::report::duration_ms;
use classifier_parity::{
    ClassVocabulary, EngineOptions, FixtureSet, HarnessOptions, ImageInput, OnnxEngine,
    PayloadMode, PredictionService, Preprocessor, PreprocessorConfig, RemoteClient, RemoteOptions,
    ScoreKind, VerificationHarness,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "classifier-parity", version)]
#[command(about = "Verify an ONNX image classifier locally and against a remote deployment")]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a single image.
    Classify {
        image: PathBuf,
        /// Print the prediction as JSON.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Run the fixtures and exit nonzero on any failure.
    ///
    /// The reference photos are not bundled: place n01440764_tench.jpeg and
    /// n01667114_mud_turtle.JPEG in the fixtures directory, or pass --manifest.
    #[command(alias = "run-tests")]
    Verify {
        #[command(flatten)]
        fixtures: FixtureArgs,
        /// Write the JSON report to this path as well.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Print the JSON report on stdout instead of the summary.
        #[arg(long)]
        json: bool,
        /// Extra attempts for fixtures that time out or hit a network error.
        #[arg(long, default_value_t = 0)]
        retries: u32,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Run the fixtures through the local model and the remote deployment and compare.
    Compare {
        #[command(flatten)]
        fixtures: FixtureArgs,
        /// Maximum allowed confidence difference.
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f32,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Probe the backend periodically with one image.
    Monitor {
        /// Probe image (defaults to the first fixture).
        #[arg(long)]
        image: Option<PathBuf>,
        /// Expected class of the probe image.
        #[arg(long, default_value_t = 0)]
        expected_class: usize,
        #[arg(long, default_value_t = 60)]
        duration_secs: u64,
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
        #[arg(long, default_value = "fixtures")]
        fixtures_dir: PathBuf,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        backend: BackendArgs,
    },
}

#[derive(Args, Debug)]
struct FixtureArgs {
    /// Directory holding the fixture images, and optionally a manifest.json.
    #[arg(long, default_value = "fixtures")]
    fixtures_dir: PathBuf,
    /// JSON manifest of fixtures; replaces the fixtures directory.
    #[arg(long)]
    manifest: Option<PathBuf>,
}

impl FixtureArgs {
    fn load(&self) -> Result<FixtureSet> {
        match &self.manifest {
            Some(path) => FixtureSet::from_manifest(path)
                .with_context(|| format!("loading manifest {}", path.display())),
            None => FixtureSet::discover(&self.fixtures_dir)
                .with_context(|| format!("loading fixtures from {}", self.fixtures_dir.display())),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Local,
    Remote,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Payload {
    Multipart,
    Tensor,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Where inference runs.
    #[arg(long, value_enum, default_value_t = BackendKind::Local)]
    backend: BackendKind,

    /// ONNX model artifact.
    #[arg(long, env = "CLASSIFIER_MODEL_PATH", default_value = "model.onnx")]
    model: PathBuf,

    /// The artifact already ends in a softmax.
    #[arg(long)]
    emits_probabilities: bool,

    /// Intra-op threads for ONNX Runtime (defaults to the CPU count).
    #[arg(long)]
    threads: Option<usize>,

    /// Preprocessor config JSON; defaults to preprocessor_config.json beside the model.
    #[arg(long)]
    preprocessor_config: Option<PathBuf>,

    /// Class names, one per line (defaults to the bundled ImageNet list).
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Base URL of the remote deployment.
    #[arg(long, env = "CLASSIFIER_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the remote deployment.
    #[arg(long, env = "CLASSIFIER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Remote request timeout in seconds.
    #[arg(long, env = "CLASSIFIER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// How images are sent to the remote deployment.
    #[arg(long, value_enum, default_value_t = Payload::Multipart)]
    payload: Payload,
}

impl BackendArgs {
    fn vocabulary(&self) -> Result<Arc<ClassVocabulary>> {
        let vocabulary = match &self.labels {
            Some(path) => ClassVocabulary::from_file(path)
                .with_context(|| format!("loading labels {}", path.display()))?,
            None => ClassVocabulary::imagenet(),
        };
        Ok(Arc::new(vocabulary))
    }

    fn preprocessor(&self) -> Result<Preprocessor> {
        let config = match &self.preprocessor_config {
            Some(path) => PreprocessorConfig::from_file(path)
                .with_context(|| format!("loading preprocessor config {}", path.display()))?,
            None => PreprocessorConfig::beside_model(&self.model)?.unwrap_or_default(),
        };
        Ok(Preprocessor::new(config)?)
    }

    fn build(&self, kind: BackendKind) -> Result<PredictionService> {
        let vocabulary = self.vocabulary()?;
        let preprocessor = self.preprocessor()?;
        let backend: Box<dyn classifier_parity::InferenceBackend> = match kind {
            BackendKind::Local => Box::new(self.local_engine(vocabulary.len())?),
            BackendKind::Remote => Box::new(self.remote_client()?),
        };
        Ok(PredictionService::new(backend, preprocessor, vocabulary))
    }

    fn local_engine(&self, num_classes: usize) -> Result<OnnxEngine> {
        let mut options = EngineOptions {
            num_classes,
            ..Default::default()
        };
        if self.emits_probabilities {
            options.score_kind = ScoreKind::Probabilities;
        }
        if let Some(threads) = self.threads {
            options.intra_threads = threads;
        }
        Ok(OnnxEngine::load(&self.model, options)?)
    }

    fn remote_client(&self) -> Result<RemoteClient> {
        let url = self
            .api_url
            .clone()
            .context("remote backend needs --api-url or CLASSIFIER_API_URL")?;
        let options = RemoteOptions {
            base_url: url,
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            payload: match self.payload {
                Payload::Multipart => PayloadMode::Multipart,
                Payload::Tensor => PayloadMode::Tensor,
            },
        };
        let client = RemoteClient::new(options)?;
        match client.health() {
            Ok(health) if health.is_healthy() => info!(status = %health.status, "deployment healthy"),
            Ok(health) => warn!(status = %health.status, model_loaded = health.model_loaded, "deployment reports unhealthy"),
            Err(err) => warn!(error = %err, "health probe failed"),
        }
        Ok(client)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" });

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Ok(true) when everything checked out.
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Classify {
            image,
            json,
            backend,
        } => {
            let service = backend.build(backend.backend)?;
            let input = ImageInput::from_path(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let (result, elapsed) = timed(|| service.classify(&input));
            let prediction = result?;
            if json {
                print_json(&prediction)?;
            } else {
                println!(
                    "Prediction: Class {} ({}) with confidence {:.4}",
                    prediction.class_id, prediction.label, prediction.confidence
                );
                println!("Response time: {:.2} ms", duration_ms(elapsed));
            }
            Ok(true)
        }
        Command::Verify {
            fixtures,
            report,
            json,
            retries,
            backend,
        } => {
            let service = backend.build(backend.backend)?;
            let fixture_set = fixtures.load()?;
            let mut harness =
                VerificationHarness::new(&service, fixture_set, HarnessOptions { retries });
            let result = harness.run().context("verification setup failed")?;
            if let Some(path) = &report {
                result
                    .write_json(path)
                    .with_context(|| format!("writing report {}", path.display()))?;
            }
            if json {
                println!("{}", result.to_json()?);
            } else {
                print!("{}", result.render());
            }
            Ok(result.success)
        }
        Command::Compare {
            fixtures,
            tolerance,
            json,
            backend,
        } => {
            let local = backend.build(BackendKind::Local)?;
            let remote = backend.build(BackendKind::Remote)?;
            let report = compare::cross_check(&local, &remote, &fixtures.load()?, tolerance)?;
            if json {
                print_json(&report)?;
            } else {
                print!("{}", report.render());
            }
            Ok(report.success())
        }
        Command::Monitor {
            image,
            expected_class,
            duration_secs,
            interval_secs,
            fixtures_dir,
            json,
            backend,
        } => {
            let service = backend.build(backend.backend)?;
            let probe_path = match image {
                Some(path) => path,
                None => default_probe(&fixtures_dir)?,
            };
            let probe = ImageInput::from_path(&probe_path)
                .with_context(|| format!("reading {}", probe_path.display()))?;
            let options = MonitorOptions {
                duration: Duration::from_secs(duration_secs),
                interval: Duration::from_secs(interval_secs.max(1)),
            };
            let report = monitor::monitor(&service, &probe, options);
            if json {
                print_json(&report)?;
            } else {
                for s in &report.samples {
                    match (&s.class_id, &s.error) {
                        (Some(id), _) => println!(
                            "{} healthy class {} confidence {:.4} in {:.2} ms",
                            s.timestamp_unix_ms,
                            id,
                            s.confidence.unwrap_or_default(),
                            s.latency_ms
                        ),
                        (None, Some(err)) => {
                            println!("{} error {}: {}", s.timestamp_unix_ms, err.kind, err.message)
                        }
                        (None, None) => println!("{} no result", s.timestamp_unix_ms),
                    }
                }
                println!(
                    "Healthy: {}, errors: {}, mean latency {:.2} ms",
                    report.healthy, report.errors, report.latency.mean_ms
                );
            }
            Ok(report.success(Some(expected_class)))
        }
    }
}

fn default_probe(fixtures_dir: &Path) -> Result<PathBuf> {
    let fixtures = FixtureSet::discover(fixtures_dir)?;
    fixtures
        .fixtures()
        .first()
        .map(|f| f.image.clone())
        .context("no probe image in the fixture set")
}
