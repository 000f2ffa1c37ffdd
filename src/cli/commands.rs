//! Command dispatch

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::{build_document, document_builder, load_outline, ApplicationError};
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, Settings};
use crate::domain::{TreeDisplay, TreeEvent};

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    debug!("settings: {:?}", settings);

    match &cli.command {
        Some(Commands::Tree { outline, freeze }) => cmd_tree(outline, *freeze, &settings),
        Some(Commands::Check { outline }) => cmd_check(outline, &settings),
        Some(Commands::Config { command }) => cmd_config(command, &settings),
        None => Err(CliError::Usage(
            "no command given, run with --help".to_string(),
        )),
    }
}

#[instrument(level = "debug", skip(settings))]
fn cmd_tree(path: &Path, freeze: bool, settings: &Settings) -> CliResult<()> {
    let mut doc = build_document(path, settings)?;
    if freeze {
        doc.arena.freeze(doc.root).map_err(ApplicationError::from)?;
    }
    output::info(&doc.arena.to_tree_string(doc.root));
    Ok(())
}

#[instrument(level = "debug", skip(settings))]
fn cmd_check(path: &Path, settings: &Settings) -> CliResult<()> {
    let outline = load_outline(path)?;
    let mut builder = document_builder(settings);
    let root = builder.create_root(&outline);

    // (tree events, changes carried)
    let seen = Rc::new(RefCell::new((0usize, 0usize)));
    let sink = Rc::clone(&seen);
    builder
        .arena_mut()
        .subscribe_tree(root, move |event| {
            if let TreeEvent::Changed(changed) = event {
                let mut seen = sink.borrow_mut();
                seen.0 += 1;
                seen.1 += changed.count;
            }
        })
        .map_err(ApplicationError::from)?;

    let doc = builder
        .build_into(root, &outline)
        .map_err(ApplicationError::from)?;

    let counts = doc
        .arena
        .descendants(doc.root)
        .filter_map(|id| doc.arena.kind(id).ok())
        .counts();

    output::header(&path.display());
    for (kind, count) in counts.into_iter().sorted() {
        output::count(&kind, count);
    }
    if doc.arena.is_frozen(doc.root).map_err(ApplicationError::from)? {
        output::detail("frozen");
    }
    let (events, changes) = *seen.borrow();
    output::success(&format!(
        "{} node(s), {} tree event(s) carrying {} change(s)",
        doc.arena.node_count(),
        events,
        changes
    ));
    Ok(())
}

fn cmd_config(command: &ConfigCommands, settings: &Settings) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => match global_config_path() {
            Some(path) => {
                let status = if path.exists() { "exists" } else { "not created" };
                output::action("global", &format!("{} ({})", path.display(), status));
            }
            None => output::warning("no config directory available on this platform"),
        },
    }
    Ok(())
}
