use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rollcall_facedb::{FaceDbConfig, DEFAULT_SIMILARITY_THRESHOLD};
use std::path::PathBuf;

mod attendance;
mod faces;
mod watch;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance CLI")]
struct Cli {
    #[command(flatten)]
    facedb: FaceDbArgs,

    #[command(flatten)]
    chain: attendance::ChainArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FaceDbArgs {
    /// Directory holding det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "ROLLCALL_MODEL_DIR", global = true)]
    model_dir: Option<PathBuf>,

    /// SQLite face database
    #[arg(long, env = "ROLLCALL_DB_PATH", default_value = "facedata/faces.db", global = true)]
    db_path: PathBuf,

    /// Cosine similarity needed for a match
    #[arg(long, env = "ROLLCALL_SIMILARITY_THRESHOLD", default_value_t = DEFAULT_SIMILARITY_THRESHOLD, global = true)]
    threshold: f32,
}

impl FaceDbArgs {
    fn config(&self) -> FaceDbConfig {
        FaceDbConfig {
            model_dir: self
                .model_dir
                .clone()
                .unwrap_or_else(rollcall_facedb::default_model_dir),
            db_path: self.db_path.clone(),
            similarity_threshold: self.threshold,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize faces live from a webcam
    Watch {
        /// Camera device
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
    },
    /// Enroll the face in an image file
    Add {
        /// Image containing one face
        image: PathBuf,
        #[arg(short, long)]
        name: String,
        /// Registration number; must not contain '_'
        #[arg(short, long)]
        reg_no: String,
    },
    /// List enrolled faces
    List,
    /// Remove an enrolled face
    Remove {
        /// Face id, "<reg_no>_<name>"
        id: String,
    },
    /// List V4L2 capture devices
    Devices,
    /// Show a classroom and each of its students
    Roster {
        class_id: u64,
    },
    /// List every classroom on the contract
    Classrooms,
    /// Show students whose attendance has been marked in a classroom
    Attendance {
        class_id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { device } => {
            // The capture loop blocks; keep it off the async workers.
            let config = cli.facedb.config();
            tokio::task::spawn_blocking(move || watch::run(&config, &device)).await??;
        }
        Commands::Add {
            image,
            name,
            reg_no,
        } => faces::add(&cli.facedb.config(), &image, &name, &reg_no)?,
        Commands::List => faces::list(&cli.facedb.config())?,
        Commands::Remove { id } => faces::remove(&cli.facedb.config(), &id)?,
        Commands::Devices => watch::devices(),
        Commands::Roster { class_id } => attendance::roster(&cli.chain, class_id).await?,
        Commands::Classrooms => attendance::classrooms(&cli.chain).await?,
        Commands::Attendance { class_id } => attendance::marked(&cli.chain, class_id).await?,
    }

    Ok(())
}
