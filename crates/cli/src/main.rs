use clap::{Parser, Subcommand};
use fileshare_core::{CoreConfig, FileService, DEFAULT_INDEX_FILE, DEFAULT_UPLOAD_DIR};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fileshare")]
#[command(about = "Fileshare storage maintenance CLI")]
struct Cli {
    /// Directory holding uploaded files
    #[arg(long, env = "UPLOAD_DIR", default_value = DEFAULT_UPLOAD_DIR, global = true)]
    upload_dir: PathBuf,
    /// JSON metadata index
    #[arg(long, env = "METADATA_FILE", default_value = DEFAULT_INDEX_FILE, global = true)]
    index_file: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the files recorded in the index
    List,
    /// Compare the index against the upload directory
    Audit,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("No command given. Use --help for usage.");
        return Ok(());
    };

    let cfg = Arc::new(CoreConfig::new(cli.upload_dir, cli.index_file)?);
    let service = FileService::init(cfg).await?;

    match command {
        Commands::List => {
            let files = service.list().await;
            if files.is_empty() {
                println!("No files found.");
            } else {
                for file in files {
                    println!("{}\t{} bytes", file.filename, file.size);
                }
            }
        }
        Commands::Audit => {
            let report = service.audit().await?;
            if report.is_consistent() {
                println!("Index and upload directory agree.");
                return Ok(());
            }
            for name in &report.missing_on_disk {
                println!("missing on disk: {}", name);
            }
            for name in &report.untracked_on_disk {
                println!("not in index:    {}", name);
            }
            return Err(format!(
                "{} missing, {} untracked",
                report.missing_on_disk.len(),
                report.untracked_on_disk.len()
            )
            .into());
        }
    }

    Ok(())
}
