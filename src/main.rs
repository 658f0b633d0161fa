use anyhow::Result;
use flexi_logger::Logger;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use stacks_events_query::config::FieldConfig;
use stacks_events_query::{FieldTables, StacksAndEventsQueryMode, StacksAndEventsQueryVisitor};

const FIELD_CONFIG_FILE: &str = "field_config.json";

/// Loads field tables, preferring the JSON config and falling back to the built-in tables
fn load_field_tables() -> FieldTables {
    match FieldConfig::from_json_file(FIELD_CONFIG_FILE) {
        Ok(config) => {
            log::info!(
                "loaded {} extra field classifications from {}",
                config.field_count(),
                FIELD_CONFIG_FILE
            );
            FieldTables::with_config(&config)
        }
        Err(e) => {
            log::warn!("{}, using built-in field tables", e);
            FieldTables::default()
        }
    }
}

/// Rewrites `filter` under every mode and prints the results as JSON.
/// Failures are reported through the logger.
fn split_filter(filter: &str, tables: &FieldTables) {
    for mode in StacksAndEventsQueryMode::ALL {
        let result = match StacksAndEventsQueryVisitor::run_query_with_fields(filter, mode, tables) {
            Ok(result) => result,
            Err(e) => {
                match e.span {
                    Some(span) => log::error!("parse failed at {}-{}: {}", span.start, span.end, e),
                    None => log::error!("parse failed: {}", e),
                }
                return;
            }
        };

        if result.is_empty() {
            log::info!("{:?} filter is empty and matches every record", mode);
        }
        match serde_json::to_string(&result) {
            Ok(json) => println!("{:<15} {}", format!("{:?}", mode), json),
            Err(e) => log::error!("cannot render {:?} result: {}", mode, e),
        }
    }
}

fn main() -> Result<()> {
    let _logger = Logger::try_with_env_or_str("warn")?
        .log_to_stderr()
        .start()?;

    let tables = load_field_tables();

    let filters: Vec<String> = std::env::args().skip(1).collect();
    if !filters.is_empty() {
        for filter in &filters {
            println!("[filter]: {}", filter);
            split_filter(filter, &tables);
        }
        return Ok(());
    }

    println!("--- stacks/events filter splitter (Ctrl-D to exit) ---");
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("filter> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                split_filter(line, &tables);
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
