use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use text_patcher::config::{
    load_from_path, run_patch_set, ApplicationError, PatchReport, RunOptions,
};
use text_patcher::{LineGuard, PatchResult, SourceDocument};
use toml_edit::{value, DocumentMut, Item, Table};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "text-patcher")]
#[command(about = "Apply ordered substring and line-range patches to a text file", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch sets to their target files
    Apply {
        /// Patch-set files (.toml or .json), or directories containing them
        #[arg(required = true)]
        patch_sets: Vec<PathBuf>,

        /// Target file to patch (overrides meta.target)
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Abort without writing if any patch does not apply
        #[arg(long)]
        strict: bool,
    },

    /// Report which patches would apply, without writing
    Check {
        /// Patch-set files (.toml or .json), or directories containing them
        #[arg(required = true)]
        patch_sets: Vec<PathBuf>,

        /// Target file to check (overrides meta.target)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },

    /// Print a guard table pinning a line range as it reads now
    Guard {
        /// File to read
        file: PathBuf,

        /// Zero-based first line of the range
        #[arg(short, long)]
        start: usize,

        /// Number of lines in the range
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Debug, Default)]
struct Totals {
    applied: usize,
    not_applied: usize,
    failed: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            patch_sets,
            target,
            dry_run,
            diff,
            strict,
        } => cmd_apply(&patch_sets, target.as_deref(), dry_run, diff, strict),

        Commands::Check { patch_sets, target } => cmd_check(&patch_sets, target.as_deref()),

        Commands::Guard { file, start, count } => cmd_guard(&file, start, count),
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "text_patcher=warn",
            1 => "text_patcher=info",
            _ => "text_patcher=debug",
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Expand directories into the `.toml` / `.json` patch sets directly inside
/// them, sorted by path. Files are kept in the order given.
fn collect_patch_sets(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(path).max_depth(1) {
            let entry = entry?;
            let is_patch_set = matches!(
                entry.path().extension().and_then(|s| s.to_str()),
                Some("toml") | Some("json")
            );
            if entry.file_type().is_file() && is_patch_set {
                found.push(entry.path().to_path_buf());
            }
        }

        if found.is_empty() {
            anyhow::bail!("No .toml or .json patch sets found in {}", path.display());
        }

        found.sort();
        files.extend(found);
    }

    Ok(files)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

fn print_results(results: &[(String, PatchResult)], dry_run: bool, totals: &mut Totals) {
    for (patch_id, result) in results {
        match result {
            PatchResult::Applied { .. } => {
                let verb = if dry_run { "Would apply" } else { "Applied" };
                let detail = result.to_string();
                let detail = detail.trim_start_matches("Applied ");
                println!("{} {}: {} {}", "✓".green(), patch_id, verb, detail);
                totals.applied += 1;
            }
            PatchResult::NotFound { hint } => {
                println!("{} {}: Search text not found", "⊙".yellow(), patch_id);
                if let Some(hint) = hint {
                    println!("  {} {}", "closest:".dimmed(), hint);
                }
                totals.not_applied += 1;
            }
            PatchResult::Ambiguous { .. } | PatchResult::GuardMismatch { .. } => {
                println!("{} {}: {}", "⊙".yellow(), patch_id, result);
                totals.not_applied += 1;
            }
        }
    }
}

fn print_report(report: &PatchReport, dry_run: bool, show_diff: bool, totals: &mut Totals) {
    println!("Target: {}", report.target.display());
    print_results(&report.results, dry_run, totals);

    if report.written {
        println!("{}", "  Wrote patched file".dimmed());
    } else if !report.changed() {
        println!("{}", "  No changes".dimmed());
    }

    if show_diff && report.changed() {
        display_diff(&report.target, &report.original, &report.patched);
    }
}

fn run_all(
    patch_sets: &[PathBuf],
    target: Option<&Path>,
    options: RunOptions,
    show_diff: bool,
) -> Result<Totals> {
    let files = collect_patch_sets(patch_sets)?;
    let mut totals = Totals::default();

    for patch_file in files {
        println!("Loading patches from {}...", patch_file.display());

        let set = match load_from_path(&patch_file) {
            Ok(set) => set,
            Err(e) => {
                eprintln!("{} Error - {}", "✗".red(), e);
                totals.failed += 1;
                println!();
                continue;
            }
        };
        let base_dir = patch_file.parent().unwrap_or_else(|| Path::new("."));

        if options.dry_run {
            println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
        }

        match run_patch_set(&set, base_dir, target, options) {
            Ok(report) => print_report(&report, options.dry_run, show_diff, &mut totals),
            Err(ApplicationError::Strict { results }) => {
                // Nothing was written, so hits are not counted as applied
                let mut discarded = Totals::default();
                print_results(&results, true, &mut discarded);
                totals.not_applied += discarded.not_applied;
                eprintln!(
                    "{} {}",
                    "✗".red(),
                    "Strict mode: not all patches applied, file left unchanged".red()
                );
                totals.failed += 1;
            }
            Err(e) => {
                eprintln!("{} Error - {}", "✗".red(), e);
                if let ApplicationError::Range { .. } = e {
                    eprintln!("  {}", "CONFLICT: line range is past the end of the file".red());
                    eprintln!("  Possible causes:");
                    eprintln!("    - An earlier patch changed the line count");
                    eprintln!("    - The target file was edited since the patch set was written");
                    eprintln!("  Action: Prefer a content-anchored replace patch");
                }
                totals.failed += 1;
            }
        }

        println!();
    }

    Ok(totals)
}

fn print_summary(totals: &Totals) {
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", totals.applied).green());
    println!("  {} not applied", format!("{}", totals.not_applied).yellow());
    println!("  {} failed", format!("{}", totals.failed).red());
}

fn cmd_apply(
    patch_sets: &[PathBuf],
    target: Option<&Path>,
    dry_run: bool,
    show_diff: bool,
    strict: bool,
) -> Result<()> {
    let options = RunOptions { dry_run, strict };
    let totals = run_all(patch_sets, target, options, show_diff)?;

    print_summary(&totals);

    if totals.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(patch_sets: &[PathBuf], target: Option<&Path>) -> Result<()> {
    let options = RunOptions {
        dry_run: true,
        strict: false,
    };
    let totals = run_all(patch_sets, target, options, false)?;

    print_summary(&totals);

    if totals.failed > 0 || totals.not_applied > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_guard(file: &Path, start: usize, count: usize) -> Result<()> {
    let doc = SourceDocument::load(file)?;
    let guard = LineGuard::for_lines(&doc, start, count)?;

    print!("{}", guard_table(&guard));

    Ok(())
}

/// Render `guard` as the `[patches.guard]` table of a patch-set file.
fn guard_table(guard: &LineGuard) -> DocumentMut {
    let mut table = Table::new();
    match guard {
        LineGuard::Contains(text) => {
            table.insert("method", value("contains"));
            table.insert("text", value(text.as_str()));
        }
        LineGuard::Exact(text) => {
            table.insert("method", value("exact_match"));
            table.insert("expected_text", value(text.as_str()));
        }
        LineGuard::Hash(hash) => {
            table.insert("method", value("hash"));
            table.insert("algorithm", value("xxh3"));
            table.insert("expected", value(format!("{hash:#018x}")));
        }
    }

    let mut patches = Table::new();
    patches.set_implicit(true);
    patches.insert("guard", Item::Table(table));

    let mut document = DocumentMut::new();
    document.insert("patches", Item::Table(patches));
    document
}
