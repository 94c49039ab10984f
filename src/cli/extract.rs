use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use crate::extract::{AskMode, ExtractCallback, OperationResult, Selection};
use crate::formats::ArchiveReader;
use crate::item::{self, Item};

/// Writes extracted items below `root`; with no root, only counts results.
struct FsCallback {
    root: Option<PathBuf>,
    overwrite: bool,
    /// Archive-relative path and directory flag per item.
    entries: Vec<(Vec<u8>, bool)>,
    current: Option<usize>,
    failed: Vec<usize>,
    done: usize,
    bar: ProgressBar,
}

impl FsCallback {
    fn new(items: &[Item], root: Option<PathBuf>, overwrite: bool, bar: ProgressBar) -> Self {
        let entries = (0..items.len())
            .map(|i| (item::path_bytes(items, i).unwrap_or_default(), items[i].is_dir))
            .collect();
        Self {
            root,
            overwrite,
            entries,
            current: None,
            failed: Vec::new(),
            done: 0,
            bar,
        }
    }

    fn display(&self, index: usize) -> String {
        String::from_utf8_lossy(&self.entries[index].0).into_owned()
    }
}

/// Join an archive path below `root`, keeping only plain name components.
///
/// Each `/`-separated piece is split again by the host's own path rules, so
/// backslashes, drive prefixes and `..` cannot climb out of `root`.
fn output_path(root: &Path, archive_path: &[u8]) -> PathBuf {
    let mut out = root.to_path_buf();
    for piece in archive_path.split(|&b| b == item::PATH_SEPARATOR) {
        let piece = String::from_utf8_lossy(piece);
        for component in Path::new(piece.as_ref()).components() {
            if let Component::Normal(name) = component {
                out.push(name);
            }
        }
    }
    out
}

impl ExtractCallback for FsCallback {
    type Sink = File;

    fn set_total(&mut self, total: u64) -> crate::Result<()> {
        self.bar.set_length(total);
        Ok(())
    }

    fn request_sink(&mut self, index: usize, mode: AskMode) -> crate::Result<Option<File>> {
        self.current = Some(index);
        let (Some(root), AskMode::Extract) = (&self.root, mode) else {
            return Ok(None);
        };
        let (rel, is_dir) = &self.entries[index];
        let path = output_path(root, rel);

        if *is_dir {
            fs::create_dir_all(&path)?;
            return Ok(None);
        }
        if path.exists() && !self.overwrite {
            warn!(path = %path.display(), "exists, skipping (use --overwrite)");
            return Ok(None);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "writing");
        Ok(Some(File::create(&path)?))
    }

    fn begin_operation(&mut self, _mode: AskMode) -> crate::Result<()> {
        if let Some(index) = self.current {
            self.bar.set_message(self.display(index));
        }
        Ok(())
    }

    fn end_operation(&mut self, result: OperationResult) -> crate::Result<()> {
        self.done += 1;
        if let (OperationResult::DataError, Some(index)) = (result, self.current) {
            self.bar
                .suspend(|| eprintln!("data error: {}", self.display(index)));
            self.failed.push(index);
        }
        self.current = None;
        Ok(())
    }

    fn report_progress(&mut self, _bytes_in: u64, bytes_out: u64) -> crate::Result<()> {
        self.bar.set_position(bytes_out);
        Ok(())
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{msg:30!} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("=> "));
    bar
}

pub fn execute(
    archive: &Path,
    output: Option<&Path>,
    overwrite: bool,
    indices: &[usize],
    quiet: bool,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let file = File::open(archive).with_context(|| format!("opening {}", archive.display()))?;
    let mut reader = ArchiveReader::open(BufReader::new(file))
        .with_context(|| format!("reading {}", archive.display()))?;

    let selection = if indices.is_empty() {
        Selection::All
    } else {
        Selection::Indices(indices)
    };
    let test = output.is_none();

    let mut callback = FsCallback::new(
        reader.items(),
        output.map(Path::to_path_buf),
        overwrite,
        progress_bar(quiet),
    );
    let outcome = reader.extract(selection, test, &mut callback);
    callback.bar.finish_and_clear();
    outcome.with_context(|| format!("extracting {}", archive.display()))?;

    if !callback.failed.is_empty() {
        anyhow::bail!("{} of {} items failed", callback.failed.len(), callback.done);
    }
    if !quiet {
        let verb = if test { "Tested" } else { "Extracted" };
        println!(
            "{verb} {} items in {}",
            callback.done,
            HumanDuration(started.elapsed())
        );
    }
    Ok(())
}
