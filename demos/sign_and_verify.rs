use std::{fs, path::PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use image_proof::{KeyConfig, ProducerIdentity, ProofService};

#[derive(Parser)]
#[command(name = "sign-and-verify")]
#[command(about = "Issue, embed and verify image authenticity proofs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key file
    Keygen {
        /// Directory to write the key file to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Key file name
        #[arg(long, default_value = "proof.key")]
        name: String,
    },

    /// Sign a captured image as a hardware device
    Capture {
        /// Image to sign
        image: PathBuf,

        /// Where to write the image carrying the proof
        #[arg(short, long)]
        out: PathBuf,

        /// Key file; falls back to PROOF_PRIVATE_KEY
        #[arg(long)]
        key: Option<PathBuf>,

        #[arg(long, default_value = "pi-serial-01")]
        device_id: String,

        #[arg(long, default_value = "cam-v1.0")]
        firmware: String,
    },

    /// Sign a generated image as an AI pipeline
    Generate {
        /// Image to sign
        image: PathBuf,

        /// Where to write the image carrying the proof
        #[arg(short, long)]
        out: PathBuf,

        /// Key file; falls back to PROOF_PRIVATE_KEY
        #[arg(long)]
        key: Option<PathBuf>,

        #[arg(long)]
        model: String,

        #[arg(long)]
        prompt: String,
    },

    /// Verify the proof embedded in an image
    Verify {
        image: PathBuf,
    },
}

fn service_for(key: Option<PathBuf>) -> Result<ProofService> {
    let config = match key {
        Some(path) => KeyConfig::load(path)?,
        None => KeyConfig::from_env()?,
    };
    Ok(ProofService::with_keys(&config)?)
}

async fn sign(
    service: ProofService,
    identity: ProducerIdentity,
    image: PathBuf,
    out: PathBuf,
) -> Result<()> {
    let bytes = fs::read(&image)?;

    let issued = service.create_and_embed_proof(identity, &bytes).await?;
    fs::write(&out, &issued.image)?;

    println!("{}", serde_json::to_string_pretty(&issued.proof)?);
    if !issued.embedded {
        eprintln!(
            "proof was NOT embedded ({}); {} holds the unmodified image",
            issued.embed_error.unwrap_or_default(),
            out.display()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { out_dir, name } => {
            fs::create_dir_all(&out_dir)?;
            let config = KeyConfig::generate();
            let path = config.save(&out_dir, &name)?;
            println!("wrote {}", path.display());
            if let Some(public_key) = config.public_key_b64 {
                println!("public key: {public_key}");
            }
        }
        Commands::Capture {
            image,
            out,
            key,
            device_id,
            firmware,
        } => {
            let identity = ProducerIdentity::hardware(device_id, firmware);
            sign(service_for(key)?, identity, image, out).await?;
        }
        Commands::Generate {
            image,
            out,
            key,
            model,
            prompt,
        } => {
            let identity = ProducerIdentity::ai(model, prompt);
            sign(service_for(key)?, identity, image, out).await?;
        }
        Commands::Verify { image } => {
            let result = ProofService::new().verify_proof(fs::read(&image)?).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                bail!("{}", result.message);
            }
        }
    }

    Ok(())
}
