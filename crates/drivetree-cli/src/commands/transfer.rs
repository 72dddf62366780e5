//! Upload and download commands.

use std::path::PathBuf;

use clap::Args;
use tokio::io::AsyncWriteExt;

use crate::output::{self, OutputFormat};
use drivetree_core::error::{AppError, ErrorKind};
use drivetree_core::types::id::{NodeId, UserId};
use drivetree_service::{TreeService, UploadRequest};

/// Arguments for `upload`
#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Parent folder; omit for the root level
    #[arg(short, long)]
    pub parent: Option<NodeId>,

    /// Name in the tree (defaults to the local file name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// MIME type recorded with the file
    #[arg(long)]
    pub content_type: Option<String>,
}

/// Arguments for `download`
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// File node ID
    pub id: NodeId,

    /// Destination path (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Upload a local file into the tree
pub async fn upload(
    args: &UploadArgs,
    service: &TreeService,
    user: UserId,
    format: OutputFormat,
) -> Result<(), AppError> {
    let name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::validation("Cannot derive a name from the file path"))?,
    };

    let data = tokio::fs::read(&args.file).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Validation,
            format!("Cannot read {}", args.file.display()),
            e,
        )
    })?;

    let mut request = UploadRequest::new(args.parent, name, data);
    if let Some(ct) = &args.content_type {
        request = request.with_content_type(ct.clone());
    }

    let node = service.upload(request, user).await?;
    output::print_success(&format!("Uploaded '{}' ({} bytes).", node.name, node.size_bytes));
    output::print_node(&node, format);
    Ok(())
}

/// Download a file to a path or stdout
pub async fn download(args: &DownloadArgs, service: &TreeService) -> Result<(), AppError> {
    match &args.output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Cannot create {}", path.display()),
                    e,
                )
            })?;
            let written = service.download(args.id, &mut file).await?;
            output::print_success(&format!("Wrote {written} bytes to {}.", path.display()));
        }
        None => {
            let mut stdout = tokio::io::stdout();
            service.download(args.id, &mut stdout).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
