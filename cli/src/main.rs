//! vcp - copy and move files through the vfscopy engine.

use clap::{Parser, ValueEnum};
use serde_json::{Value, json};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vfscopy::vfs::{Backend, NativeBackend, Stat, VfsError};
use vfscopy::{
    ChecksumVerification, ConflictResolver, Decision, Error as EngineError, ExistBehavior,
    ExistsAction, ExistsResolution, JobReport, JobStage, ProgressBarEvents, SourceItem,
    TransferBuilder, TransferMode, TransferOptions, create_progress_bar,
};

/// vcp - copy or move files and directories
///
/// Streams files with overlapped reads and writes, renames instead of
/// copying when a move stays on one volume, and can verify every copied
/// file by checksum.
///
/// Usage:
///   vcp SOURCE DEST
///   vcp SOURCE... DIRECTORY
///   vcp -t DIRECTORY SOURCE...
#[derive(Parser, Debug)]
#[command(name = "vcp", version, about, long_about = None)]
struct Args {
    /// Source file(s) or directory(ies), followed by the destination
    ///
    /// When multiple sources are given, the destination must be a directory.
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Target directory (transfer all sources into this directory)
    #[arg(short = 't', long = "target-directory", value_name = "DIRECTORY")]
    target_directory: Option<PathBuf>,

    /// Move instead of copy
    #[arg(short = 'm', long = "move")]
    move_items: bool,

    /// What to do with destinations that already exist
    #[arg(short = 'c', long, value_enum, default_value = "skip")]
    on_conflict: ConflictStrategy,

    /// What to do when an item fails
    #[arg(short = 'e', long, value_enum, default_value = "stop")]
    on_error: ErrorPolicy,

    /// Read copied files back and compare checksums
    #[arg(long, value_enum, default_value = "never")]
    verify: VerifyMode,

    /// Pipeline buffer size in KiB
    #[arg(long, value_name = "KIB")]
    buffer_size: Option<usize>,

    /// Do not preserve permissions
    #[arg(long)]
    no_perms: bool,

    /// Do not preserve timestamps
    #[arg(long)]
    no_times: bool,

    /// Do not preserve ownership
    #[arg(long)]
    no_owners: bool,

    /// Do not copy extended attributes
    #[arg(long)]
    no_xattrs: bool,

    /// Follow symlinks instead of preserving them
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    output: OutputMode,

    /// Disable progress bar
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConflictStrategy {
    /// Keep existing destinations (default)
    Skip,
    /// Replace existing destinations
    Overwrite,
    /// Replace only if the source is newer
    Update,
    /// Append source bytes to existing files
    Append,
    /// Stop at the first existing destination
    Error,
}

impl ConflictStrategy {
    fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Update => "update",
            Self::Append => "append",
            Self::Error => "error",
        }
    }

    fn exist_behavior(self) -> ExistBehavior {
        match self {
            Self::Skip => ExistBehavior::SkipAll,
            Self::Overwrite => ExistBehavior::OverwriteAll,
            Self::Update => ExistBehavior::OverwriteOlder,
            Self::Append => ExistBehavior::AppendAll,
            Self::Error => ExistBehavior::Ask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ErrorPolicy {
    /// Stop the whole run (default)
    Stop,
    /// Skip the failing item and continue
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VerifyMode {
    Never,
    OnMove,
    Always,
}

impl From<VerifyMode> for ChecksumVerification {
    fn from(mode: VerifyMode) -> Self {
        match mode {
            VerifyMode::Never => ChecksumVerification::Never,
            VerifyMode::OnMove => ChecksumVerification::OnMove,
            VerifyMode::Always => ChecksumVerification::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
enum CliError {
    #[error("Source does not exist: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Target is not a directory: {path}")]
    TargetNotDirectory { path: PathBuf },

    #[error("Missing destination operand after '{operand}'")]
    MissingDestinationOperand { operand: PathBuf },

    #[error("Target '{path}' is not a directory (when transferring multiple sources)")]
    MultiSourceTargetNotDirectory { path: PathBuf },

    #[error("Cannot determine current directory: {source}")]
    CurrentDirectory { source: io::Error },

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("Failed to serialize JSON output: {source}")]
    JsonSerialize { source: serde_json::Error },
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::SourceNotFound { .. }
            | Self::TargetNotDirectory { .. }
            | Self::MissingDestinationOperand { .. }
            | Self::MultiSourceTargetNotDirectory { .. }
            | Self::Engine(
                EngineError::EmptySourceList
                | EngineError::RelativeDestination(_)
                | EngineError::InvalidSourceItem(_),
            ) => 2,
            _ => 1,
        }
    }
}

/// One failure reported by the engine, as shown to the user.
#[derive(Debug, Clone)]
struct FailureRecord {
    path: PathBuf,
    reason: String,
}

type FailureLog = Arc<Mutex<Vec<FailureRecord>>>;

/// Answers the engine's questions from the command line policy and keeps
/// a record of every failure.
struct CliResolver {
    policy: ErrorPolicy,
    failures: FailureLog,
}

impl CliResolver {
    fn record(&self, path: &Path, reason: String) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FailureRecord {
                path: path.to_path_buf(),
                reason,
            });
    }

    fn fail(&mut self, what: &str, error: &VfsError, path: &Path) -> Decision {
        // Skipping cannot help once the destination is full.
        if error.is_no_space() {
            self.record(path, format!("{what}: destination is full: {error}"));
            return Decision::Stop;
        }
        self.record(path, format!("{what}: {error}"));
        match self.policy {
            ErrorPolicy::Stop => Decision::Stop,
            ErrorPolicy::Skip => Decision::Skip,
        }
    }
}

impl ConflictResolver for CliResolver {
    fn cant_access_source(&mut self, error: &VfsError, path: &Path) -> Decision {
        self.fail("cannot access source", error, path)
    }

    fn cant_create_destination_root_dir(&mut self, error: &VfsError, path: &Path) -> Decision {
        self.record(path, format!("cannot create destination: {error}"));
        Decision::Stop
    }

    fn cant_create_destination_dir(&mut self, error: &VfsError, path: &Path) -> Decision {
        self.fail("cannot create directory", error, path)
    }

    fn cant_open_destination_file(&mut self, error: &VfsError, path: &Path) -> Decision {
        self.fail("cannot open destination", error, path)
    }

    fn destination_write_error(&mut self, error: &VfsError, path: &Path) -> Decision {
        self.fail("write failed", error, path)
    }

    fn source_read_error(&mut self, error: &VfsError, path: &Path) -> Decision {
        self.fail("read failed", error, path)
    }

    fn destination_read_error(&mut self, error: &VfsError, path: &Path) -> Decision {
        self.fail("verification read failed", error, path)
    }

    fn destination_exists(&mut self, _source: &Stat, _dest: &Stat, path: &Path) -> ExistsResolution {
        self.record(path, "destination exists".to_owned());
        ExistsResolution::once(ExistsAction::Stop)
    }

    fn rename_destination_exists(
        &mut self,
        _source: &Stat,
        _dest: &Stat,
        path: &Path,
    ) -> ExistsResolution {
        self.record(path, "destination exists".to_owned());
        ExistsResolution::once(ExistsAction::Stop)
    }

    fn already_exists(&mut self, path: &Path, _existing: &Stat) -> Decision {
        self.fail(
            "cannot create directory",
            &VfsError::already_exists(path),
            path,
        )
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(error.exit_code());
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> CliResult<i32> {
    let (sources, dest) = resolve_sources_and_dest(args)?;
    let backend = NativeBackend::shared();

    let mut items = Vec::with_capacity(sources.len());
    for src in &sources {
        if !backend.exists(src) {
            return Err(CliError::SourceNotFound { path: src.clone() });
        }
        items.push(SourceItem::from_path(backend.clone(), src)?);
    }

    let options = build_options(args);
    let failures = FailureLog::default();
    let resolver = CliResolver {
        policy: args.on_error,
        failures: Arc::clone(&failures),
    };

    let mut builder = TransferBuilder::new(backend, &dest)
        .options(options.clone())
        .resolver(resolver);
    for item in items {
        builder = builder.item(item);
    }
    if args.output == OutputMode::Human && !args.quiet {
        builder = builder.events(ProgressBarEvents::new(create_progress_bar(0)));
    }

    let handle = builder.spawn()?;
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let control = handle.control();
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            if interrupted.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce quit.");
                std::process::exit(130);
            }
            control.stop();
            eprintln!("\nStopping... press Ctrl+C again to abort immediately.");
        })
        .ok();
    }

    let report = handle.join()?;
    let failures = failures
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    debug!(?report.stage, failures = failures.len(), "transfer ended");

    match args.output {
        OutputMode::Human => print_summary(&report, &failures, &options),
        OutputMode::Json => print_json_value(&summary_json(&report, &failures, &options, args))?,
    }

    let code = if interrupted.load(Ordering::SeqCst) {
        130
    } else if report.is_success() && failures.is_empty() {
        0
    } else {
        1
    };
    Ok(code)
}

fn absolute(path: &Path) -> CliResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| CliError::CurrentDirectory { source })?;
    Ok(cwd.join(path))
}

fn resolve_sources_and_dest(args: &Args) -> CliResult<(Vec<PathBuf>, PathBuf)> {
    let (sources, dest) = if let Some(ref target_dir) = args.target_directory {
        if !target_dir.is_dir() && target_dir.exists() {
            return Err(CliError::TargetNotDirectory {
                path: target_dir.clone(),
            });
        }
        // A trailing separator makes the engine treat it as a directory.
        let mut dir = target_dir.clone().into_os_string();
        dir.push("/");
        (args.sources.clone(), PathBuf::from(dir))
    } else if args.sources.len() == 1 {
        return Err(CliError::MissingDestinationOperand {
            operand: args.sources[0].clone(),
        });
    } else {
        let (sources_slice, dest_slice) = args.sources.split_at(args.sources.len() - 1);
        let dest = &dest_slice[0];
        if sources_slice.len() > 1 && !dest.is_dir() && dest.exists() {
            return Err(CliError::MultiSourceTargetNotDirectory { path: dest.clone() });
        }
        (sources_slice.to_vec(), dest.clone())
    };

    let sources = sources
        .iter()
        .map(|src| absolute(src))
        .collect::<CliResult<Vec<_>>>()?;
    Ok((sources, absolute(&dest)?))
}

fn build_options(args: &Args) -> TransferOptions {
    let mode = if args.move_items {
        TransferMode::Move
    } else {
        TransferMode::Copy
    };
    let mut options = TransferOptions::default()
        .with_mode(mode)
        .with_exist_behavior(args.on_conflict.exist_behavior())
        .with_verification(args.verify.into());

    if let Some(kib) = args.buffer_size {
        options = options.with_buffer_size(kib.saturating_mul(1024));
    }
    if args.no_perms {
        options = options.without_permissions();
    }
    if args.no_times {
        options = options.without_timestamps();
    }
    if args.no_owners {
        options = options.without_owners();
    }
    if args.no_xattrs {
        options = options.without_xattrs();
    }
    if args.follow_symlinks {
        options = options.with_follow_symlinks();
    }
    options
}

fn print_summary(report: &JobReport, failures: &[FailureRecord], options: &TransferOptions) {
    for failure in failures {
        eprintln!("error: {}: {}", failure.path.display(), failure.reason);
    }
    for mismatch in &report.failed_verifications {
        eprintln!(
            "error: {}: verification {:?}",
            mismatch.path.display(),
            mismatch.outcome
        );
    }

    let verb = match options.mode {
        TransferMode::Copy => "Copied",
        TransferMode::Move => "Moved",
    };
    if report.stage == JobStage::Stopped {
        eprintln!(
            "Stopped after {} items ({}).",
            report.items_copied,
            format_bytes(report.statistics.value)
        );
        return;
    }

    if report.items_copied == 0 {
        if report.items_skipped > 0 {
            println!("Nothing to transfer ({} items skipped)", report.items_skipped);
        } else {
            println!("Nothing to transfer");
        }
        return;
    }

    let mut line = format!(
        "{verb} {} items ({})",
        report.items_copied,
        format_bytes(report.statistics.value)
    );
    if report.items_skipped > 0 {
        line.push_str(&format!(", {} skipped", report.items_skipped));
    }
    if report.checksums_verified > 0 {
        line.push_str(&format!(", {} verified", report.checksums_verified));
    }
    println!("{line}");
}

fn summary_json(
    report: &JobReport,
    failures: &[FailureRecord],
    options: &TransferOptions,
    args: &Args,
) -> Value {
    json!({
        "schema_version": "1.0",
        "mode": match options.mode {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        },
        "stage": report.stage.to_string(),
        "success": report.is_success() && failures.is_empty(),
        "effective_config": {
            "conflict_policy": args.on_conflict.as_str(),
            "error_policy": match args.on_error {
                ErrorPolicy::Stop => "stop",
                ErrorPolicy::Skip => "skip",
            },
            "verification": format!("{:?}", options.verification).to_lowercase(),
            "preserve_permissions": options.copy_unix_permissions,
            "preserve_timestamps": options.copy_file_times,
            "preserve_owners": options.copy_unix_owners,
            "preserve_xattrs": options.copy_xattrs,
            "symlink_mode": if options.preserve_symlinks { "preserve" } else { "follow" },
            "buffer_size": options.buffer_size,
        },
        "items_copied": report.items_copied,
        "items_skipped": report.items_skipped,
        "items_failed": report.items_failed,
        "bytes": report.statistics.value,
        "checksums_verified": report.checksums_verified,
        "verification_failures": report
            .failed_verifications
            .iter()
            .map(|f| json!({
                "path": display_path(&f.path),
                "outcome": format!("{:?}", f.outcome).to_lowercase(),
            }))
            .collect::<Vec<Value>>(),
        "failures": failures
            .iter()
            .map(|f| json!({
                "path": display_path(&f.path),
                "reason": f.reason,
            }))
            .collect::<Vec<Value>>(),
    })
}

fn print_json_value(value: &Value) -> CliResult<()> {
    let serialized =
        serde_json::to_string(value).map_err(|source| CliError::JsonSerialize { source })?;
    println!("{serialized}");
    Ok(())
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
