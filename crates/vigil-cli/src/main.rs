use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod setup;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Face liveness and identity verification")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus.
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install the landmark and embedding models and pin their checksums.
    Setup {
        /// URL or local path of the 468-point face-mesh model.
        #[arg(long)]
        landmark: String,
        /// URL or local path of the face embedding model.
        #[arg(long)]
        embedding: String,
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Check installed models against the checksum lockfile.
    VerifyModels {
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Show daemon status.
    Status,
    /// Check one image against a challenge such as TURN_LEFT+OPEN_MOUTH.
    Action {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        action: String,
    },
    /// Judge liveness over a burst and optionally match a reference embedding.
    Liveness {
        /// Burst frame, in capture order. Repeat for each frame.
        #[arg(long = "image", required = true)]
        images: Vec<PathBuf>,
        /// JSON file holding an embedding array or the output of `vigil embed`.
        #[arg(long)]
        reference: Option<PathBuf>,
    },
    /// Extract a reference embedding from one image.
    Embed {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[zbus::proxy(
    interface = "org.freedesktop.Vigil1",
    default_service = "org.freedesktop.Vigil1",
    default_path = "/org/freedesktop/Vigil1"
)]
trait Vigil {
    fn verify_action(&self, image: &[u8], action: &str) -> zbus::Result<String>;
    fn verify_liveness(&self, images: &[Vec<u8>], reference: &[f64]) -> zbus::Result<String>;
    fn generate_embedding(&self, image: &[u8]) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

async fn connect(session: bool) -> Result<VigilProxy<'static>> {
    let conn = if session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;
    VigilProxy::new(&conn)
        .await
        .context("failed to reach vigild (is the daemon running?)")
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read image {}", path.display()))
}

/// Accepts a bare JSON array or an object with an `embedding` array.
fn parse_reference(text: &str) -> Result<Vec<f64>> {
    let value: serde_json::Value = serde_json::from_str(text).context("reference is not valid JSON")?;
    let array = match &value {
        serde_json::Value::Array(_) => &value,
        serde_json::Value::Object(map) => map
            .get("embedding")
            .context("reference object has no \"embedding\" field")?,
        _ => bail!("reference must be a JSON array or an object with an \"embedding\" array"),
    };
    let values: Vec<f64> = serde_json::from_value(array.clone())
        .context("reference embedding must be an array of numbers")?;
    if values.is_empty() {
        bail!("reference embedding is empty");
    }
    Ok(values)
}

/// Pretty-print a daemon JSON reply.
fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let session = cli.session || std::env::var("VIGIL_SESSION_BUS").is_ok();

    match cli.command {
        Command::Setup {
            landmark,
            embedding,
            model_dir,
        } => setup::run(&landmark, &embedding, model_dir),
        Command::VerifyModels { model_dir } => setup::verify(model_dir),
        Command::Status => {
            let proxy = connect(session).await?;
            print_json(&proxy.status().await?)
        }
        Command::Action { image, action } => {
            let bytes = read_image(&image)?;
            let proxy = connect(session).await?;
            tracing::debug!(image = %image.display(), %action, "sending VerifyAction");
            print_json(&proxy.verify_action(&bytes, &action).await?)
        }
        Command::Liveness { images, reference } => {
            let frames = images
                .iter()
                .map(|p| read_image(p))
                .collect::<Result<Vec<_>>>()?;
            let reference = match reference {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    parse_reference(&text)?
                }
                None => Vec::new(),
            };
            let proxy = connect(session).await?;
            tracing::debug!(frames = frames.len(), "sending VerifyLiveness");
            print_json(&proxy.verify_liveness(&frames, &reference).await?)
        }
        Command::Embed { image, output } => {
            let bytes = read_image(&image)?;
            let proxy = connect(session).await?;
            let reply = proxy.generate_embedding(&bytes).await?;
            match output {
                Some(path) => {
                    fs::write(&path, &reply)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Embedding written to {}", path.display());
                    Ok(())
                }
                None => print_json(&reply),
            }
        }
    }
}
