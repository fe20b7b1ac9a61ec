use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::Path,
};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Write `source` into a new zip at `target` as the single entry `entry_name`.
///
/// Blocking; run it on the blocking pool.
pub(crate) fn write_archive(
    source: &Path,
    target: &Path,
    entry_name: &str,
) -> zip::result::ZipResult<u64> {
    let input = File::open(source)?;
    let input_len = input.metadata()?.len();

    let mut writer = ZipWriter::new(BufWriter::new(File::create(target)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(input_len >= u64::from(u32::MAX));

    writer.start_file(entry_name, options)?;
    io::copy(&mut BufReader::new(input), &mut writer)?;

    let mut out = writer.finish()?;
    io::Write::flush(&mut out)?;

    Ok(std::fs::metadata(target)?.len())
}
