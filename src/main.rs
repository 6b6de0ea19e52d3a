use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use medic::config::{DEFAULT_DATABASE_URL, PROGRESS_INTERVAL};
use medic::crud;
use medic::dump::dump_files;
use medic::fetch::EutilsClient;
use medic::filter::VersionPolicy;
use medic::models::{Pmid, Selection};
use medic::store::Store;
use medic::stream::{CitationStream, Source};
use medic::writers::{stream_writer, CitationWriter, Format, TiabWriter};
use medic::Error;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "medic")]
#[command(about = "Load MEDLINE/PubMed XML into a database and write citations back out")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Database URL
    #[arg(long, env = "MEDIC_DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store new citations from XML files or PMIDs fetched online
    Insert(LoadArgs),
    /// Store citations, replacing any stored under the same PMID
    Update(LoadArgs),
    /// Delete citations by PMID or PMID list files
    Delete(SelectArgs),
    /// Write stored citations in a flat-text format
    Write(WriteArgs),
    /// Convert XML files into tab-delimited per-table files for bulk loading
    Dump(DumpArgs),
}

#[derive(Args)]
struct LoadArgs {
    /// XML files (plain or .gz) and/or PMIDs to fetch
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Keep every version of a citation, not only the canonical one
    #[arg(long)]
    all_versions: bool,
}

#[derive(Args)]
struct SelectArgs {
    /// PMIDs and/or files with one PMID per line
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    inputs: Vec<String>,

    /// Select every stored citation
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct WriteArgs {
    #[command(flatten)]
    select: SelectArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Medline)]
    format: Format,

    /// Output file (a directory for tiab); stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct DumpArgs {
    /// XML files (plain or .gz)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the dump files
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Keep every version of a citation, not only the canonical one
    #[arg(long)]
    all_versions: bool,

    /// List every dumped PMID in the deletion file as well
    #[arg(long)]
    update_all: bool,
}

fn make_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

/// Splits command line tokens into PMIDs and file paths.
fn split_inputs(inputs: &[String]) -> (Vec<Pmid>, Vec<PathBuf>) {
    let mut pmids = Vec::new();
    let mut files = Vec::new();
    for token in inputs {
        match token.parse::<Pmid>() {
            Ok(pmid) if pmid > 0 => pmids.push(pmid),
            _ => files.push(PathBuf::from(token)),
        }
    }
    (pmids, files)
}

fn selection(args: &SelectArgs) -> Result<Selection> {
    if args.all {
        return Ok(Selection::AllRecords);
    }
    let (mut pmids, files) = split_inputs(&args.inputs);
    for path in files {
        pmids.extend(
            crud::read_pmid_list(&path)
                .with_context(|| format!("Failed to read PMID list: {}", path.display()))?,
        );
    }
    Ok(Selection::ByIdentifiers(pmids.into_iter().collect()))
}

async fn run_load(store: &Store, args: LoadArgs, replace: bool) -> Result<()> {
    let start = Instant::now();
    let (pmids, files) = split_inputs(&args.inputs);
    let mut sources: Vec<Source> = files.into_iter().map(Source::File).collect();
    if !pmids.is_empty() {
        let client = EutilsClient::new()?;
        sources.extend(
            client
                .fetch_sources(&pmids)
                .await
                .context("Failed to fetch citations")?,
        );
    }

    let policy = VersionPolicy::from_all_versions(args.all_versions);
    let mut stream = CitationStream::new(sources, policy);
    let pb = make_spinner("Loading citations");
    let mut stored: u64 = 0;
    let mut duplicates: u64 = 0;

    for citation in stream.by_ref() {
        let citation = citation?;
        let result = if replace {
            crud::upsert(store, &citation).await
        } else {
            crud::create(store, &citation).await
        };
        match result {
            Ok(()) => stored += 1,
            Err(Error::Duplicate(pmid)) => {
                warn!(pmid, "Citation already exists, skipping");
                duplicates += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to store citation {}", citation.pmid))
            }
        }
        if stored % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("{stored} citations"));
        }
    }
    pb.finish_and_clear();

    let deletions: Vec<Pmid> = stream.deletions().to_vec();
    let deleted = if deletions.is_empty() {
        0
    } else {
        crud::delete(store, Selection::ByIdentifiers(deletions.into_iter().collect()))
            .await
            .context("Failed to apply deletions")?
    };

    let stats = stream.stats();
    println!();
    println!("=== Summary ===");
    println!("Time:               {:.2}s", start.elapsed().as_secs_f64());
    println!("Sources read:       {}", stats.sources());
    println!("Citations stored:   {stored}");
    println!("Duplicates skipped: {duplicates}");
    println!("Versions skipped:   {}", stats.skipped());
    println!("Invalid citations:  {}", stats.invalid());
    println!("Deleted citations:  {deleted}");
    Ok(())
}

async fn run_delete(store: &Store, args: SelectArgs) -> Result<()> {
    let deleted = crud::delete(store, selection(&args)?)
        .await
        .context("Failed to delete citations")?;
    info!(deleted, "Delete complete");
    println!("Deleted citations: {deleted}");
    Ok(())
}

async fn run_write(store: &Store, args: WriteArgs) -> Result<()> {
    let selection = selection(&args.select)?;
    let mut writer: Box<dyn CitationWriter> = match (&args.output, args.format) {
        (Some(dir), Format::Tiab) => Box::new(
            TiabWriter::directory(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?,
        ),
        (Some(path), format) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            stream_writer(format, BufWriter::new(file))
        }
        (None, format) => stream_writer(format, BufWriter::new(io::stdout().lock())),
    };

    let mut citations = crud::select(store, selection);
    let mut written: u64 = 0;
    while let Some(citation) = citations.next().await {
        writer.write(&citation?)?;
        written += 1;
    }
    writer.finish().context("Failed to finish output")?;
    info!(written, format = ?args.format, "Write complete");
    Ok(())
}

fn run_dump(args: DumpArgs) -> Result<()> {
    let start = Instant::now();
    let sources = args.inputs.into_iter().map(Source::File).collect();
    let policy = VersionPolicy::from_all_versions(args.all_versions);
    let count = dump_files(sources, policy, &args.output_dir, args.update_all)
        .with_context(|| format!("Failed to dump into {}", args.output_dir.display()))?;

    println!();
    println!("=== Summary ===");
    println!("Time:               {:.2}s", start.elapsed().as_secs_f64());
    println!("Citations dumped:   {count}");
    Ok(())
}

fn run_with_store(db: &str, command: Commands) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("medic-worker")
        .enable_all()
        .build()?;
    rt.block_on(async {
        let store = Store::open(db)
            .await
            .with_context(|| format!("Failed to open database: {db}"))?;
        let result = match command {
            Commands::Insert(args) => run_load(&store, args, false).await,
            Commands::Update(args) => run_load(&store, args, true).await,
            Commands::Delete(args) => run_delete(&store, args).await,
            Commands::Write(args) => run_write(&store, args).await,
            Commands::Dump(args) => run_dump(args),
        };
        store.close().await;
        result
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Dump(args) => run_dump(args),
        command => run_with_store(&cli.db, command),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tokens_split_into_pmids_and_files() {
        let inputs = vec![
            "20029614".to_string(),
            "baseline.xml.gz".to_string(),
            "0".to_string(),
            "11748933".to_string(),
        ];
        let (pmids, files) = split_inputs(&inputs);
        assert_eq!(pmids, vec![20029614, 11748933]);
        assert_eq!(files, vec![PathBuf::from("baseline.xml.gz"), PathBuf::from("0")]);
    }

    #[test]
    fn write_defaults_to_medline() {
        let cli = Cli::try_parse_from(["medic", "write", "--all"]).unwrap();
        match cli.command {
            Commands::Write(args) => {
                assert!(args.select.all);
                assert_eq!(args.format, Format::Medline);
                assert!(args.output.is_none());
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn delete_requires_inputs_or_all() {
        assert!(Cli::try_parse_from(["medic", "delete"]).is_err());
        assert!(Cli::try_parse_from(["medic", "delete", "1", "--all"]).is_err());
        assert!(Cli::try_parse_from(["medic", "delete", "--all"]).is_ok());
    }
}
