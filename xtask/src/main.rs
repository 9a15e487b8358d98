//! Build automation tasks for tweetload
//!
//! Currently generates the CLI reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for tweetload", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<tweetload_ingest::cli::Cli>();

    let content = format!(
        r#"# tweetload CLI Reference

Generated from the CLI source code on {}.

`tweetload` flattens newline-delimited tweet archives (`.jsonl`, `.jsonl.gz`,
`.json`) into per-table row files with a pool of extraction workers, then
merges them into PostgreSQL tier by tier.

## Quick Start

```bash
export DATABASE_URL=postgresql://localhost/twitter
export DATA_DIR=./data

# Everything in one go
tweetload run --workers 8

# Or stage by stage
tweetload extract --work-dir ./work
tweetload load --work-dir ./work
tweetload report --json
```

## Commands

{}

## Environment Variables

- `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`, `DATABASE_CONNECT_TIMEOUT`
- `DATA_DIR`, `TWEETLOAD_WORK_DIR`
- `TWEETLOAD_WORKERS`, `TWEETLOAD_LOAD_CONCURRENCY`, `TWEETLOAD_BATCH_SIZE`
- `TWEETLOAD_MAX_REFERENCE_DEPTH`, `TWEETLOAD_RELAXED_DURABILITY`, `TWEETLOAD_ROUND_SIZE`
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILE_PREFIX`, `LOG_FILTER`

---

*Run `cargo xtask generate-cli-docs` to regenerate this file.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
