//! Tree browsing and mutation commands.

use clap::Args;

use crate::output::{self, NodeRow, OutputFormat};
use drivetree_core::error::AppError;
use drivetree_core::types::id::{NodeId, UserId};
use drivetree_service::TreeService;

/// Arguments for `ls`
#[derive(Debug, Args)]
pub struct LsArgs {
    /// Folder to list; omit for the root level
    pub parent: Option<NodeId>,
}

/// Arguments for commands that take a single node
#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Node ID
    pub id: NodeId,
}

/// Arguments for `mkdir`
#[derive(Debug, Args)]
pub struct MkdirArgs {
    /// Folder name
    pub name: String,

    /// Parent folder; omit for the root level
    #[arg(short, long)]
    pub parent: Option<NodeId>,
}

/// Arguments for `rename`
#[derive(Debug, Args)]
pub struct RenameArgs {
    /// Node ID
    pub id: NodeId,

    /// New name
    pub name: String,
}

/// Arguments for `mv`
#[derive(Debug, Args)]
pub struct MoveArgs {
    /// Node ID
    pub id: NodeId,

    /// Destination folder
    #[arg(long, conflicts_with = "root")]
    pub to: Option<NodeId>,

    /// Move to the root level
    #[arg(long)]
    pub root: bool,
}

/// Arguments for `rm`
#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Node ID
    pub id: NodeId,
}

/// List children of a folder
pub async fn list(args: &LsArgs, service: &TreeService, format: OutputFormat) -> Result<(), AppError> {
    let children = service.list_children(args.parent).await?;
    let rows: Vec<NodeRow> = children.iter().map(NodeRow::from).collect();
    output::print_list(&rows, format);
    Ok(())
}

/// Show one node
pub async fn info(args: &InfoArgs, service: &TreeService, format: OutputFormat) -> Result<(), AppError> {
    let node = service.get(args.id).await?;
    output::print_node(&node, format);
    Ok(())
}

/// Show the chain of nodes from the root level down to a node
pub async fn path(args: &InfoArgs, service: &TreeService, format: OutputFormat) -> Result<(), AppError> {
    let chain = service.path(args.id).await?;
    match format {
        OutputFormat::Table => {
            let joined: Vec<&str> = chain.iter().map(|n| n.name.as_str()).collect();
            println!("/{}", joined.join("/"));
        }
        OutputFormat::Json => {
            let rows: Vec<NodeRow> = chain.iter().map(NodeRow::from).collect();
            output::print_list(&rows, format);
        }
    }
    Ok(())
}

/// Create a folder
pub async fn mkdir(
    args: &MkdirArgs,
    service: &TreeService,
    user: UserId,
    format: OutputFormat,
) -> Result<(), AppError> {
    let node = service.create_folder(args.parent, &args.name, user).await?;
    output::print_success(&format!("Folder '{}' created.", node.name));
    output::print_node(&node, format);
    Ok(())
}

/// Rename a node
pub async fn rename(
    args: &RenameArgs,
    service: &TreeService,
    user: UserId,
    format: OutputFormat,
) -> Result<(), AppError> {
    let node = service.rename(args.id, &args.name, user).await?;
    output::print_success(&format!("Renamed to '{}'.", node.name));
    output::print_node(&node, format);
    Ok(())
}

/// Move a node
pub async fn move_node(
    args: &MoveArgs,
    service: &TreeService,
    user: UserId,
    format: OutputFormat,
) -> Result<(), AppError> {
    if args.to.is_none() && !args.root {
        return Err(AppError::validation("Pass --to <folder> or --root"));
    }

    let node = service.move_node(args.id, args.to, user).await?;
    output::print_success(&format!("Moved '{}'.", node.name));
    output::print_node(&node, format);
    Ok(())
}

/// Delete a node and its subtree
pub async fn remove(args: &RemoveArgs, service: &TreeService, user: UserId) -> Result<(), AppError> {
    let report = service.delete(args.id, user).await?;
    output::print_success(&format!(
        "Deleted {} node(s); {} blob deletion(s) attempted.",
        report.removed, report.blob_attempts
    ));
    Ok(())
}
