use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use tasktrack_core::project::templates::TEMPLATES;
use tasktrack_core::{Config, ExportFormat, NewProject, ProjectPatch, ProjectStatus, TaskManager};

use super::{parse_time, print_json, with_manager, CmdResult};

fn parse_status(s: &str) -> Result<ProjectStatus, String> {
    ProjectStatus::parse(s)
        .ok_or_else(|| format!("unknown status '{s}' (active, on_hold, completed, cancelled)"))
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    ExportFormat::parse(s).ok_or_else(|| format!("unknown format '{s}' (json, csv)"))
}

#[derive(Subcommand)]
pub enum ProjectAction {
    /// Create a new project
    Create {
        /// Project name
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Display color (e.g. "#34C759")
        #[arg(long)]
        color: Option<String>,
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,
        /// Deadline (RFC 3339)
        #[arg(long, value_parser = parse_time)]
        end: Option<DateTime<Utc>>,
    },
    /// List projects
    List,
    /// Show a project
    Get {
        /// Project ID
        id: String,
    },
    /// Update a project
    Update {
        /// Project ID
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<ProjectStatus>,
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_time, conflicts_with = "clear_end")]
        end: Option<DateTime<Utc>>,
        #[arg(long)]
        clear_end: bool,
    },
    /// Delete a project with all its tasks
    Delete {
        /// Project ID
        id: String,
    },
    /// Recompute progress and totals
    Refresh {
        /// Project ID
        id: String,
    },
    /// Progress, efficiency, timeline and health report
    Analytics {
        /// Project ID
        id: String,
    },
    /// Tracked time against estimates
    Stats {
        /// Project ID
        id: String,
    },
    /// List built-in templates
    Templates,
    /// Create a project from a template
    FromTemplate {
        /// Template key (e.g. "software_development")
        key: String,
        /// Project name (defaults to the template's)
        #[arg(long)]
        name: Option<String>,
    },
    /// Export a project as JSON or CSV
    Export {
        /// Project ID
        id: String,
        #[arg(long, default_value = "json", value_parser = parse_format)]
        format: ExportFormat,
    },
    /// Import a project from a JSON export
    Import {
        /// Path to the export file
        file: PathBuf,
    },
}

pub fn run(action: ProjectAction, config: Config) -> CmdResult {
    if let ProjectAction::Templates = action {
        return print_json(TEMPLATES);
    }
    with_manager(config, |manager| dispatch(action, manager))
}

async fn dispatch(action: ProjectAction, manager: Arc<TaskManager>) -> CmdResult {
    match action {
        ProjectAction::Create {
            name,
            description,
            color,
            start,
            end,
        } => {
            let project = manager
                .create_project(NewProject {
                    name,
                    description,
                    color,
                    start_date: start,
                    end_date: end,
                })
                .await?;
            print_json(&project)?;
        }
        ProjectAction::List => {
            print_json(&manager.list_projects().await?)?;
        }
        ProjectAction::Get { id } => {
            print_json(&manager.get_project(&id).await?)?;
        }
        ProjectAction::Update {
            id,
            name,
            description,
            color,
            status,
            start,
            end,
            clear_end,
        } => {
            let patch = ProjectPatch {
                name,
                description,
                color,
                status,
                start_date: start.map(Some),
                end_date: if clear_end { Some(None) } else { end.map(Some) },
                ..ProjectPatch::default()
            };
            if patch == ProjectPatch::default() {
                return Err("nothing to update".into());
            }
            print_json(&manager.update_project(&id, patch).await?)?;
        }
        ProjectAction::Delete { id } => {
            manager.delete_project(&id).await?;
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
        ProjectAction::Refresh { id } => {
            print_json(&manager.refresh_project(&id).await?)?;
        }
        ProjectAction::Analytics { id } => {
            print_json(&manager.project_analytics(&id).await?)?;
        }
        ProjectAction::Stats { id } => {
            print_json(&manager.project_time_statistics(&id).await?)?;
        }
        ProjectAction::Templates => {
            print_json(TEMPLATES)?;
        }
        ProjectAction::FromTemplate { key, name } => {
            print_json(&manager.create_project_from_template(&key, name).await?)?;
        }
        ProjectAction::Export { id, format } => {
            println!("{}", manager.export_project(&id, format).await?);
        }
        ProjectAction::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            print_json(&manager.import_project(&json).await?)?;
        }
    }
    Ok(())
}
