use clap::{Arg, ArgAction, Command};
use crc32fast::Hasher as Crc32;
use csv_async::{AsyncReaderBuilder, ByteRecord};
use csv_upload_ingest::{upload_from_path, Dialect, IngestConfig, IngestionPipeline, Row};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("bench")
        .arg(Arg::new("path").long("path").required(true).value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("chunk-kb").long("chunk-kb").help("Chunk size in KiB").env("STREAM_FILE_CHUNKS_SIZE_KB").value_parser(clap::value_parser!(usize)).default_value("64"))
        .arg(Arg::new("limit").long("limit").help("Row limit (default: unlimited)").env("ROWS_LIMIT").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("verify").long("verify").help("Re-parse the whole file with csv-async and compare row count and CRC32 over fields").action(ArgAction::SetTrue))
        .get_matches();

    let path = matches
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow::anyhow!("Provide --path <file>"))?;
    let chunk = matches
        .get_one::<usize>("chunk-kb")
        .copied()
        .unwrap_or(64)
        .saturating_mul(1024);
    let limit = matches.get_one::<usize>("limit").copied().unwrap_or(usize::MAX);

    let start = Instant::now();
    let (reader, meta) = upload_from_path(path).await?;
    let config = IngestConfig::new(limit, chunk).with_encoding(meta.charset);
    let mut pipeline = IngestionPipeline::new(reader, &config)?;
    let outcome = pipeline.run(None).await?;
    let elapsed = start.elapsed().as_secs_f64();
    let rows = outcome.rows();
    let rps = (rows.len() as f64) / elapsed;

    println!(
        "source={} rows={} complete={} chunk={}\nelapsed={:.1}s rows/sec={:.0}",
        path.display(),
        rows.len(),
        outcome.is_complete(),
        chunk,
        elapsed,
        rps
    );

    if matches.get_flag("verify") {
        let dialect = pipeline.dialect().unwrap_or_default();
        let (expected_rows, expected_crc) = reference_parse(path, dialect, rows.len()).await?;
        let actual_crc = rows_crc(rows);
        if expected_rows != rows.len() || expected_crc != actual_crc {
            anyhow::bail!(
                "verify failed: reference rows={} crc=0x{:08x}, pipeline rows={} crc=0x{:08x}",
                expected_rows,
                expected_crc,
                rows.len(),
                actual_crc
            );
        }
        println!("verify ok crc=0x{actual_crc:08x}");
    }
    Ok(())
}

/// Whole-stream parse with csv-async, stopping after `max` rows.
async fn reference_parse(
    path: &std::path::Path,
    dialect: Dialect,
    max: usize,
) -> anyhow::Result<(usize, u32)> {
    let (reader, _meta) = upload_from_path(path).await?;
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(dialect.delimiter)
        .quote(dialect.quote)
        .buffer_capacity(1 << 20)
        .create_reader(reader);

    let mut record = ByteRecord::new();
    let mut count = 0usize;
    let mut crc = Crc32::new();
    while count < max && rdr.read_byte_record(&mut record).await? {
        count += 1;
        update_crc(&mut crc, record.iter());
    }
    Ok((count, crc.finalize()))
}

fn rows_crc(rows: &[Row]) -> u32 {
    let mut crc = Crc32::new();
    for row in rows {
        update_crc(&mut crc, row.iter().map(String::as_bytes));
    }
    crc.finalize()
}

// fields separated by '\x1f' (unit separator), records by '\x1e'
fn update_crc<'a>(crc: &mut Crc32, fields: impl Iterator<Item = &'a [u8]>) {
    for (fi, field) in fields.enumerate() {
        if fi > 0 {
            crc.update(&[0x1f]);
        }
        crc.update(field);
    }
    crc.update(&[0x1e]);
}
