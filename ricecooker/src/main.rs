use clap::{Parser, Subcommand};
use log::{error, info, warn};
use ricecooker_lib::agent::apply::apply_store;
use ricecooker_lib::agent::picking::describe;
use ricecooker_lib::config::Settings;
use ricecooker_lib::parser::html::{create_dom_tree, serialize_document};
use ricecooker_lib::store::{FileStorage, StyleStore};
use ricecooker_lib::style::selector::{derive_selector, query_selector_all};
use std::fs;
use std::path::{Path, PathBuf};

const RICECOOKER_INTRO: &str = r#"
        ____  _              ______            __
       / __ \(_)_______     / ____/___  ____  / /_____  _____
      / /_/ / / ___/ _ \   / /   / __ \/ __ \/ //_/ _ \/ ___/
     / _, _/ / /__/  __/  / /___/ /_/ / /_/ / ,< /  __/ /
    /_/ |_/_/\___/\___/   \____/\____/\____/_/|_|\___/_/

    Pick it, style it, keep it.
"#;

#[derive(Parser)]
#[command(name = "RiceCooker")]
#[command(about = "Apply and manage persistent per-element style overrides")]
struct Args {
    /// Settings file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply stored overrides to a page and write the styled HTML.
    Apply {
        #[arg(long)]
        page: PathBuf,
        #[arg(long)]
        store: PathBuf,
        /// Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the elements a selector matches and the selector each one derives.
    Inspect {
        #[arg(long)]
        page: PathBuf,
        #[arg(short, long)]
        query: String,
    },
    /// List stored overrides.
    List {
        #[arg(long)]
        store: PathBuf,
    },
    /// Delete the override stored for a selector.
    Forget {
        #[arg(long)]
        store: PathBuf,
        selector: String,
    },
}

fn main() {
    env_logger::init();
    eprintln!("{}", RICECOOKER_INTRO);

    // parse the args given in terminal
    let args: Args = Args::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> ricecooker_lib::Result<()> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match args.command {
        Command::Apply {
            page,
            store,
            output,
        } => {
            let document = create_dom_tree(&fs::read_to_string(&page)?);
            let overrides = load_store(&store, &settings)?;
            let report = apply_store(&document, &overrides);
            info!(
                "Styled {} element(s) from {} selector(s)",
                report.styled_elements, report.matched_selectors
            );
            for failure in &report.failures {
                warn!("Skipped: {}", failure);
            }

            let html = serialize_document(&document);
            match output {
                Some(path) => {
                    fs::write(&path, html)?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{}", html),
            }
        }
        Command::Inspect { page, query } => {
            let document = create_dom_tree(&fs::read_to_string(&page)?);
            let matches = query_selector_all(&document, &query)?;
            if matches.is_empty() {
                println!("No elements match {}", query);
            }
            for node in &matches {
                let label = describe(node).map(|d| d.label()).unwrap_or_default();
                let selector = derive_selector(node).unwrap_or_default();
                println!("{:<40} {}", label, selector);
            }
        }
        Command::List { store } => {
            let overrides = load_store(&store, &settings)?;
            if overrides.is_empty() {
                println!("No stored overrides.");
            }
            for (selector, style) in overrides.iter() {
                println!("{} {}", selector, serde_json::to_string(style)?);
            }
        }
        Command::Forget { store, selector } => {
            let storage = FileStorage::new(&store);
            let mut overrides = StyleStore::load(&storage, &settings.storage_key)?;
            if overrides.remove(&selector).is_some() {
                overrides.save(&storage, &settings.storage_key)?;
                println!("Forgot {}", selector);
            } else {
                println!("Nothing stored for {}", selector);
            }
        }
    }
    Ok(())
}

fn load_store(path: &Path, settings: &Settings) -> ricecooker_lib::Result<StyleStore> {
    StyleStore::load(&FileStorage::new(path), &settings.storage_key)
}
