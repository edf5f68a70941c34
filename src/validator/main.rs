//! Standalone validator for violation knowledge bases.
//!
//! Checks that a Turtle or JSON knowledge base loads, covers every
//! detectable violation type and has well-formed entries.

use std::process::ExitCode;

use clap::Parser;

use violation_monitor::detection::ViolationType;
use violation_monitor::ontology::Ontology;

/// Violation knowledge base validator.
#[derive(Parser, Debug)]
#[command(name = "validate_ontology")]
#[command(about = "Validates the violation knowledge base used by the monitor")]
#[command(version)]
struct Args {
    /// Path to the knowledge base (`.ttl` or `.json`).
    #[arg(short, long, default_value = "violations_ontology.ttl")]
    file: String,

    /// Generate an example knowledge base at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Show every entry, not only failures.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    validate_file(&args.file, args.verbose)
}

fn generate_example(output_path: &str) -> ExitCode {
    let example = Ontology::example();

    match example.save(output_path) {
        Ok(()) => {
            println!("✓ Example knowledge base written to: {output_path}");
            println!("\nThe file describes {} violation types.", example.len());
            println!("Point ONTOLOGY_PATH in .env at it to use it.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate_file(path: &str, verbose: bool) -> ExitCode {
    println!("Validating: {path}\n");

    let ontology = match Ontology::load(path) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("✗ Failed to load knowledge base: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut errors = 0;

    for (key, result) in ontology.validate_all() {
        let known = ViolationType::from_name(&key).is_some();

        if verbose && let Some(record) = ontology.get(&key) {
            println!(
                "[{key}] {} | {} | {:.0} {} ({}, {})",
                record.description,
                record.article,
                record.fine_amount,
                record.fine_currency,
                if record.category.is_empty() { "-" } else { &record.category },
                record.severity
            );
        }

        match result {
            Ok(()) if !known => println!("  ⚠ Warning: '{key}' is never reported by the detector"),
            Ok(()) => {
                if verbose {
                    println!("  ✓ OK");
                }
            }
            Err(e) => {
                errors += 1;
                println!("  ✗ Error: {e}");
            }
        }
    }

    let missing = ontology.missing_types();
    for kind in &missing {
        println!("  ✗ Missing: {kind} ({})", kind.label());
    }

    println!();

    let total = ontology.len();
    if errors == 0 && missing.is_empty() {
        println!("✓ All {total} entries are valid!");
        ExitCode::SUCCESS
    } else {
        println!(
            "✗ Validation failed: {errors} invalid entr{} and {} missing type(s)",
            if errors == 1 { "y" } else { "ies" },
            missing.len()
        );
        println!("  Valid: {}/{total}", total - errors);
        ExitCode::FAILURE
    }
}
