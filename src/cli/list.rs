use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;

use crate::formats::ArchiveReader;

pub fn execute(archive: &Path) -> anyhow::Result<()> {
    let file = File::open(archive).with_context(|| format!("opening {}", archive.display()))?;
    let reader = ArchiveReader::open(BufReader::new(file))
        .with_context(|| format!("reading {}", archive.display()))?;

    println!(
        "{:?} archive, {} items, headers {} bytes",
        reader.format(),
        reader.items().len(),
        reader.headers_size()
    );
    for (index, item) in reader.items().iter().enumerate() {
        let kind = if item.is_dir { 'D' } else { 'F' };
        let path = reader.path(index).unwrap_or_default();
        println!("{index:>5}  {kind}  {:>10}  {path}", item.size);
    }
    Ok(())
}
