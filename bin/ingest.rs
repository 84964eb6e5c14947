use clap::{Arg, ArgAction, Command};
use csv_upload_ingest::{
    assign_column_names, drop_incomplete_rows, ingest_with, upload_from_path, CsvSink,
    IngestConfig, IngestionResult, LabeledBatch, DEFAULT_ROWS_LIMIT,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Exit code for an upload rejected by the row limit.
const EXIT_LIMIT_EXCEEDED: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("ingest")
        .about("Stream a CSV upload through the bounded ingestion pipeline")
        .arg(Arg::new("path").long("path").required(true).value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("rows-limit").long("rows-limit").env("ROWS_LIMIT").value_parser(clap::value_parser!(usize)).default_value("100"))
        .arg(Arg::new("chunk-kb").long("chunk-kb").env("STREAM_FILE_CHUNKS_SIZE_KB").help("Bytes pulled per read, in KiB").value_parser(clap::value_parser!(usize)).default_value("1"))
        .arg(Arg::new("row-cap").long("row-cap").env("ROW_CAP").help("Stop with success once this many rows are read").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("charset").long("charset").help("Upload charset label, e.g. latin1 (default: utf-8)"))
        .arg(Arg::new("header-row").long("header-row").help("Use the first row as column names").action(ArgAction::SetTrue))
        .arg(Arg::new("columns").long("columns").help("Comma separated column names").value_delimiter(','))
        .arg(Arg::new("drop-incomplete").long("drop-incomplete").help("Drop rows with empty or missing fields").action(ArgAction::SetTrue))
        .arg(Arg::new("out").long("out").help("Write accepted rows to this CSV file").value_parser(clap::value_parser!(PathBuf)))
        .get_matches();

    let path = matches
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow::anyhow!("--path is required"))?;
    let rows_limit = matches.get_one::<usize>("rows-limit").copied().unwrap_or(DEFAULT_ROWS_LIMIT);
    let chunk_kb = matches.get_one::<usize>("chunk-kb").copied().unwrap_or(1);

    let (reader, meta) = upload_from_path(path).await?;
    let encoding = match matches.get_one::<String>("charset") {
        Some(label) => encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| anyhow::anyhow!("unknown charset '{label}'"))?,
        None => meta.charset,
    };

    let mut config = IngestConfig::new(rows_limit, chunk_kb.saturating_mul(1024)).with_encoding(encoding);
    if let Some(cap) = matches.get_one::<usize>("row-cap") {
        config = config.with_row_cap(*cap);
    }

    let start = Instant::now();
    let mut rows = match ingest_with(reader, &config).await {
        Ok(IngestionResult::Complete(rows)) => rows,
        Ok(IngestionResult::LimitExceeded(partial)) => {
            eprintln!(
                "rejected source={} rows_limit={} rows_read={} last_row={:?}",
                path.display(),
                rows_limit,
                partial.len(),
                partial.last()
            );
            return Ok(ExitCode::from(EXIT_LIMIT_EXCEEDED));
        }
        Err(e) => {
            tracing::error!(error = %e, source = %path.display(), "ingestion failed");
            return Err(e.into());
        }
    };

    let mut columns: Vec<String> = matches
        .get_many::<String>("columns")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();
    if matches.get_flag("header-row") && !rows.is_empty() {
        let header = rows.remove(0);
        if columns.is_empty() {
            columns = header;
        }
    }
    if matches.get_flag("drop-incomplete") {
        rows = drop_incomplete_rows(rows);
    }
    let batch = if columns.is_empty() {
        LabeledBatch {
            columns: Vec::new(),
            rows,
        }
    } else {
        assign_column_names(&columns, rows)?
    };

    let written = match matches.get_one::<PathBuf>("out") {
        Some(out) => {
            let mut sink = CsvSink::create(out, b',').await?;
            if !batch.columns.is_empty() {
                sink.write_header(&batch.columns).await?;
            }
            sink.write_rows(&batch.rows).await?;
            Some(sink.finish().await?)
        }
        None => None,
    };

    println!(
        "source={} rows={} columns={:?} written={:?} elapsed={:.3}s",
        path.display(),
        batch.rows.len(),
        batch.columns,
        written,
        start.elapsed().as_secs_f64()
    );
    Ok(ExitCode::SUCCESS)
}
