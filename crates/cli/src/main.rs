use clap::{Args, Parser, Subcommand};
use mixlab_core::{
    config::{
        data_dir_from_env_value, default_batch_volume_from_env_value,
        max_cover_bytes_from_env_value,
    },
    coerce, parse_tags, Actor, CoreConfig, CreateOptions, EditCommand,
    ExportFormat, Formulation, FormulationId, FormulationService, MetadataPatch, QuantityBasis,
    RowId,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mixlab")]
#[command(about = "Mixlab formulation workbench CLI")]
struct Cli {
    /// Data directory (defaults to MIXLAB_DATA_DIR, then ./mixlab_data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Who is running the command.
#[derive(Args)]
struct Caller {
    /// User id
    #[arg(long = "user")]
    user_id: String,
    /// Display name
    #[arg(long, default_value = "")]
    name: String,
    /// Email, printed in export footers
    #[arg(long)]
    email: Option<String>,
}

impl Caller {
    fn actor(&self) -> Result<Actor, Box<dyn std::error::Error>> {
        Ok(Actor::new(&self.user_id, &self.name, self.email.as_deref())?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new private draft
    Create {
        #[command(flatten)]
        caller: Caller,
        /// Title
        #[arg(long)]
        title: Option<String>,
        /// ratio or percentage
        #[arg(long, default_value = "ratio")]
        basis: String,
        /// Start with the starter rows
        #[arg(long)]
        seeded: bool,
    },
    /// List your formulations
    List {
        #[command(flatten)]
        caller: Caller,
    },
    /// Show a formulation with derived percentages and volumes
    Show {
        id: String,
        #[command(flatten)]
        caller: Caller,
        /// What-if batch volume in ml (malformed values count as 0)
        #[arg(long)]
        volume: Option<String>,
    },
    /// Append a row
    AddRow {
        id: String,
        #[command(flatten)]
        caller: Caller,
        /// Material name
        #[arg(long)]
        material: Option<String>,
        /// Parts or percentage, depending on the basis
        #[arg(long)]
        quantity: Option<String>,
    },
    /// Change a row's material or quantity
    SetRow {
        id: String,
        row_id: String,
        #[command(flatten)]
        caller: Caller,
        #[arg(long)]
        material: Option<String>,
        #[arg(long)]
        quantity: Option<String>,
    },
    /// Remove a row
    RemoveRow {
        id: String,
        row_id: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Set the batch volume in ml
    SetVolume {
        id: String,
        volume: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Convert between ratio and percentage
    ConvertBasis {
        id: String,
        basis: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Set the status (draft, final)
    SetStatus {
        id: String,
        status: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Make a formulation readable by anyone
    Publish {
        id: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Make a formulation private again
    Unpublish {
        id: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Replace the tags (comma-separated)
    Tag {
        id: String,
        tags: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Replace the notes
    Note {
        id: String,
        notes: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Copy a formulation into a new draft you own
    Duplicate {
        id: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Delete a formulation
    Delete {
        id: String,
        #[command(flatten)]
        caller: Caller,
    },
    /// Upload a cover image
    SetCover {
        id: String,
        file: PathBuf,
        #[command(flatten)]
        caller: Caller,
    },
    /// Export to json or markdown
    Export {
        id: String,
        #[command(flatten)]
        caller: Caller,
        #[arg(long, default_value = "markdown")]
        format: String,
        /// Batch volume in ml (malformed values count as 0)
        #[arg(long)]
        volume: Option<String>,
        /// Output file (defaults to the suggested file name)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn open_service(data_dir: Option<PathBuf>) -> Result<FormulationService, Box<dyn std::error::Error>> {
    let data_dir = data_dir
        .unwrap_or_else(|| data_dir_from_env_value(std::env::var("MIXLAB_DATA_DIR").ok()));
    let default_volume =
        default_batch_volume_from_env_value(std::env::var("MIXLAB_DEFAULT_BATCH_ML").ok())?;
    let max_cover_bytes =
        max_cover_bytes_from_env_value(std::env::var("MIXLAB_MAX_COVER_BYTES").ok())?;
    let cfg = CoreConfig::new(data_dir, default_volume, max_cover_bytes)?;
    Ok(FormulationService::open(Arc::new(cfg))?)
}

fn parse_id(raw: &str) -> Result<FormulationId, Box<dyn std::error::Error>> {
    Ok(FormulationId::parse(raw.trim())?)
}

fn parse_row_id(raw: &str) -> Result<RowId, Box<dyn std::error::Error>> {
    RowId::parse(raw).ok_or_else(|| "row id cannot be blank".into())
}

fn parse_basis(raw: &str) -> Result<QuantityBasis, Box<dyn std::error::Error>> {
    QuantityBasis::parse(raw).ok_or_else(|| format!("unknown basis: {raw}").into())
}

fn print_formulation(formulation: &Formulation, volume: Option<f64>) {
    let derivation = match volume {
        Some(v) => formulation.derive_at(v),
        None => formulation.derive(),
    };
    let visibility = if formulation.is_public() {
        "public"
    } else {
        "private"
    };
    println!("{} [{}]", formulation.display_title(), formulation.id());
    println!(
        "Status: {}, {}, basis: {}",
        formulation.status(),
        visibility,
        formulation.basis()
    );
    if !formulation.tags().is_empty() {
        println!("Tags: {}", formulation.tags().join(", "));
    }
    println!("Batch: {} ml", derivation.batch_volume_ml);
    for row in &derivation.rows {
        println!(
            "{:>3}. {:<30} {:>10.2} {:>8.2}% {:>10.2} ml  ({})",
            row.position,
            row.name,
            row.spec.amount(),
            row.derived_percentage,
            row.derived_volume_ml,
            row.id
        );
    }
    println!(
        "Total: {:.2} {:.2}% {:.2} ml",
        derivation.totals.quantity_total,
        derivation.totals.derived_percentage_total,
        derivation.totals.volume_total_ml
    );
    if let Some(gap) = derivation.totals.percentage_gap() {
        if gap.abs() > f64::EPSILON {
            println!("Percentages are {gap:.2} away from 100");
        }
    }
    if !formulation.notes().is_empty() {
        println!();
        println!("{}", formulation.notes());
    }
}

fn edit(
    service: &FormulationService,
    id: &str,
    caller: &Caller,
    commands: Vec<EditCommand>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (saved, outcomes) = service.edit(&parse_id(id)?, &caller.actor()?, commands)?;
    for outcome in outcomes {
        match outcome {
            mixlab_core::EditOutcome::RowAdded { id } => println!("Added row {id}"),
            mixlab_core::EditOutcome::Ignored => println!("Nothing to change"),
            mixlab_core::EditOutcome::Applied => {}
        }
    }
    print_formulation(&saved, None);
    Ok(())
}

fn metadata(patch: MetadataPatch) -> Vec<EditCommand> {
    vec![EditCommand::SetMetadata { patch }]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let service = open_service(cli.data_dir)?;

    match cli.command {
        Commands::Create {
            caller,
            title,
            basis,
            seeded,
        } => {
            let created = service.create(
                &caller.actor()?,
                CreateOptions {
                    title,
                    basis: parse_basis(&basis)?,
                    seeded,
                    batch_volume_ml: None,
                },
            )?;
            println!("Created formulation: {}", created.id());
        }
        Commands::List { caller } => {
            let formulations = service.list_mine(&caller.actor()?)?;
            if formulations.is_empty() {
                println!("No formulations found.");
            } else {
                for f in formulations {
                    println!(
                        "ID: {}, Title: {}, Status: {}, Rows: {}, Updated: {}",
                        f.id(),
                        f.display_title(),
                        f.status(),
                        f.rows().len(),
                        f.updated_at().format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        Commands::Show { id, caller, volume } => {
            let formulation = service.lookup_str(&id, Some(&caller.actor()?))?;
            print_formulation(&formulation, coerce::text_override(volume.as_deref()));
        }
        Commands::AddRow {
            id,
            caller,
            material,
            quantity,
        } => edit(
            &service,
            &id,
            &caller,
            vec![EditCommand::AddRow {
                name: material,
                quantity: quantity.map(Value::String),
            }],
        )?,
        Commands::SetRow {
            id,
            row_id,
            caller,
            material,
            quantity,
        } => edit(
            &service,
            &id,
            &caller,
            vec![EditCommand::UpdateRow {
                id: parse_row_id(&row_id)?,
                name: material,
                quantity: quantity.map(Value::String),
            }],
        )?,
        Commands::RemoveRow { id, row_id, caller } => edit(
            &service,
            &id,
            &caller,
            vec![EditCommand::RemoveRow {
                id: parse_row_id(&row_id)?,
            }],
        )?,
        Commands::SetVolume { id, volume, caller } => edit(
            &service,
            &id,
            &caller,
            vec![EditCommand::SetBatchVolume {
                value: Value::String(volume),
            }],
        )?,
        Commands::ConvertBasis { id, basis, caller } => edit(
            &service,
            &id,
            &caller,
            vec![EditCommand::ConvertBasis {
                basis: parse_basis(&basis)?,
            }],
        )?,
        Commands::SetStatus { id, status, caller } => edit(
            &service,
            &id,
            &caller,
            metadata(MetadataPatch {
                status: Some(status.as_str().into()),
                ..Default::default()
            }),
        )?,
        Commands::Publish { id, caller } => edit(
            &service,
            &id,
            &caller,
            metadata(MetadataPatch {
                is_public: Some(true),
                ..Default::default()
            }),
        )?,
        Commands::Unpublish { id, caller } => edit(
            &service,
            &id,
            &caller,
            metadata(MetadataPatch {
                is_public: Some(false),
                ..Default::default()
            }),
        )?,
        Commands::Tag { id, tags, caller } => edit(
            &service,
            &id,
            &caller,
            metadata(MetadataPatch {
                tags: Some(parse_tags(&tags)),
                ..Default::default()
            }),
        )?,
        Commands::Note { id, notes, caller } => edit(
            &service,
            &id,
            &caller,
            metadata(MetadataPatch {
                notes: Some(notes),
                ..Default::default()
            }),
        )?,
        Commands::Duplicate { id, caller } => {
            let copy = service.duplicate(&parse_id(&id)?, &caller.actor()?)?;
            println!("Created copy: {} ({})", copy.id(), copy.display_title());
        }
        Commands::Delete { id, caller } => {
            service.delete(&parse_id(&id)?, &caller.actor()?)?;
            println!("Deleted formulation: {}", id.trim());
        }
        Commands::SetCover { id, file, caller } => {
            let bytes = std::fs::read(&file)?;
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("cover")
                .to_string();
            let updated =
                service.upload_cover(&parse_id(&id)?, &caller.actor()?, &file_name, &bytes)?;
            match service.cover_url(&updated) {
                Some(url) => println!("Cover stored at {url}"),
                None => println!("Cover stored"),
            }
        }
        Commands::Export {
            id,
            caller,
            format,
            volume,
            out,
        } => {
            let format: ExportFormat = format.parse()?;
            let volume = coerce::text_override(volume.as_deref());
            let document =
                service.export(&parse_id(&id)?, Some(&caller.actor()?), volume, format)?;
            let path = out.unwrap_or_else(|| PathBuf::from(&document.file_name));
            std::fs::write(&path, &document.bytes)?;
            println!("Exported {} to {}", format, path.display());
        }
    }

    Ok(())
}
