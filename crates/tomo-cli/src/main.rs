//! Tomo: chapter-level analysis of long documents.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

mod commands;

const USAGE: &str = "Usage: tomo <file> | tomo <command> [args]";

fn print_help() {
    println!("Tomo: chapter detection and per-chapter analysis");
    println!();
    println!("{}", USAGE);
    println!();
    println!("Commands:");
    println!("  <file>                   Analyze a .txt, .pdf or .docx document");
    println!("  analyze <file>           Same as above");
    println!("  detect <file>            Print detected chapters and their pages");
    println!("  page <file> [n]          Print page n (default 1) of the document");
    println!("  report <document-name>   Print a stored run summary as JSON");
    println!("  help                     Show this help message");
    println!();
    println!("Configuration is read from TOMO_* environment variables.");
}

fn usage_error(message: &str) -> ! {
    eprintln!("{}", message);
    eprintln!("{}", USAGE);
    std::process::exit(1);
}

/// Exit with the code matching `err`: input errors map to their own codes.
fn exit_with(err: anyhow::Error) -> ! {
    eprintln!("Error: {:#}", err);
    let code = err
        .downcast_ref::<tomo_core::Error>()
        .map(|e| e.exit_code())
        .unwrap_or(3);
    std::process::exit(code);
}

/// Value following `flag` in `args`.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage_error("Missing input file.");
    }
    // Workers overlay the settings their parent passes as flags.
    let config = tomo_core::TomoConfig::from_env();

    let result = match args[1].as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            return Ok(());
        }
        "analyze" => match args.get(2) {
            Some(path) => commands::analyze(config, &PathBuf::from(path)).await,
            None => usage_error("Usage: tomo analyze <file>"),
        },
        "detect" => match args.get(2) {
            Some(path) => commands::detect(config, &PathBuf::from(path)),
            None => usage_error("Usage: tomo detect <file>"),
        },
        "page" => {
            let Some(path) = args.get(2) else {
                usage_error("Usage: tomo page <file> [n]");
            };
            let page = match args.get(3).map(|n| n.parse::<usize>()) {
                None => 1,
                Some(Ok(n)) if n > 0 => n,
                Some(_) => usage_error("Page number must be a positive integer."),
            };
            commands::page(config, &PathBuf::from(path), page)
        }
        "report" => match args.get(2) {
            Some(name) => commands::report(&config, name),
            None => usage_error("Usage: tomo report <document-name>"),
        },
        "worker" => {
            let (Some(document), Some(chapter), Some(output)) = (
                flag_value(&args, "--document"),
                flag_value(&args, "--chapter").and_then(|c| c.parse::<u32>().ok()),
                flag_value(&args, "--output"),
            ) else {
                usage_error("Usage: tomo worker --document <name> --chapter <n> --output <dir>");
            };
            let mut config = config;
            if let Err(e) = config.apply_worker_args(&args[2..]) {
                usage_error(&e.to_string());
            }
            commands::worker(config, document, chapter, &PathBuf::from(output))
        }
        other if other.starts_with('-') => {
            usage_error(&format!("Unknown command: {}. Use 'tomo help' for usage.", other))
        }
        path => commands::analyze(config, &PathBuf::from(path)).await,
    };

    if let Err(e) = result {
        exit_with(e);
    }
    Ok(())
}
