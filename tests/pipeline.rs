use bytes::Bytes;
use csv_upload_ingest::{
    ingest, ingest_cancellable, ingest_with, CsvIngestError, Dialect, IngestConfig,
    IngestionPipeline, IngestionResult, PipelineState, RowBatch,
};
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

fn batch(rows: &[&[&str]]) -> RowBatch {
    rows.iter()
        .map(|r| r.iter().map(|f| f.to_string()).collect())
        .collect()
}

const SAMPLE: &str = "a,b\n1,2\n3,4\n";

/// Rows from reading `text` in one go with a plain CSV reader.
fn whole_text_rows(text: &str) -> RowBatch {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
        .records()
        .map(|r| r.map(|rec| rec.iter().map(str::to_owned).collect()))
        .collect::<Result<_, _>>()
        .unwrap()
}

#[tokio::test]
async fn complete_when_stream_ends_under_limit() -> anyhow::Result<()> {
    let outcome = ingest(SAMPLE.as_bytes(), 10, 5).await?;
    assert_eq!(
        outcome,
        IngestionResult::Complete(batch(&[&["a", "b"], &["1", "2"], &["3", "4"]]))
    );
    Ok(())
}

#[tokio::test]
async fn header_counts_toward_the_limit() -> anyhow::Result<()> {
    // First chunk "a,b\n1" yields only the header; the breach comes with "1,2".
    let outcome = ingest(SAMPLE.as_bytes(), 1, 5).await?;
    assert_eq!(
        outcome,
        IngestionResult::LimitExceeded(batch(&[&["a", "b"], &["1", "2"]]))
    );
    Ok(())
}

#[tokio::test]
async fn zero_limit_returns_exactly_the_first_row() -> anyhow::Result<()> {
    for chunk in [1, 5, 64] {
        let outcome = ingest(SAMPLE.as_bytes(), 0, chunk).await?;
        assert_eq!(outcome, IngestionResult::LimitExceeded(batch(&[&["a", "b"]])));
    }
    Ok(())
}

#[tokio::test]
async fn exactly_at_limit_is_complete() -> anyhow::Result<()> {
    let outcome = ingest(SAMPLE.as_bytes(), 3, 4).await?;
    assert!(outcome.is_complete());
    assert_eq!(outcome.rows().len(), 3);
    Ok(())
}

#[tokio::test]
async fn record_split_across_chunks_is_rebuilt() -> anyhow::Result<()> {
    let chunks: Vec<io::Result<Bytes>> =
        vec![Ok(Bytes::from_static(b"1,2\n3,")), Ok(Bytes::from_static(b"4\n"))];
    let reader = StreamReader::new(futures::stream::iter(chunks));
    let outcome = ingest(reader, 10, 64).await?;
    assert_eq!(
        outcome.into_rows(),
        batch(&[&["1", "2"], &["3", "4"]])
    );
    Ok(())
}

#[tokio::test]
async fn any_chunk_size_gives_the_same_rows() -> anyhow::Result<()> {
    let content = "id,name,note\r\n\
                   1,Zoë,\"hello, world\"\n\
                   2,Ñandú,\"multi\nline \"\"quoted\"\"\"\n\
                   \n\
                   3,日本,plain\n\
                   4,last,unterminated";
    let expected = batch(&[
        &["id", "name", "note"],
        &["1", "Zoë", "hello, world"],
        &["2", "Ñandú", "multi\nline \"quoted\""],
        &["3", "日本", "plain"],
        &["4", "last", "unterminated"],
    ]);

    let whole = ingest(content.as_bytes(), 100, content.len() + 1).await?;
    assert_eq!(whole, IngestionResult::Complete(expected.clone()));

    for chunk in 1..=content.len() {
        let outcome = ingest(content.as_bytes(), 100, chunk).await?;
        assert_eq!(
            outcome,
            IngestionResult::Complete(expected.clone()),
            "chunk size {chunk}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn stray_quotes_parse_like_a_whole_text_read() -> anyhow::Result<()> {
    let inputs = [
        "a\"b,1\n\"x\ny\",2\n3,4\n",
        "id,note\n1,5\" pipe\n2,\"ok, fine\"\n3,\"he said \"\"hi\"\"\"\n",
        "x,\"closed\"trailing,y\n1,2\n",
    ];
    for content in inputs {
        let expected = whole_text_rows(content);
        for chunk in 1..=content.len() + 1 {
            let outcome = ingest(content.as_bytes(), 100, chunk).await?;
            assert_eq!(
                outcome,
                IngestionResult::Complete(expected.clone()),
                "chunk size {chunk} for {content:?}"
            );
        }
    }
    assert_eq!(
        whole_text_rows(inputs[0]),
        batch(&[&["a\"b", "1"], &["x\ny", "2"], &["3", "4"]])
    );
    Ok(())
}

#[tokio::test]
async fn carriage_return_only_line_endings() -> anyhow::Result<()> {
    let content = "a,b\r1,\"x\ry\"\r3,4\r";
    let expected = batch(&[&["a", "b"], &["1", "x\ry"], &["3", "4"]]);
    assert_eq!(whole_text_rows(content), expected);
    for chunk in 1..=content.len() + 1 {
        let outcome = ingest(content.as_bytes(), 100, chunk).await?;
        assert_eq!(
            outcome,
            IngestionResult::Complete(expected.clone()),
            "chunk size {chunk}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn limit_breach_after_stray_quote_stops_early() -> anyhow::Result<()> {
    let (client, mut server) = tokio::io::duplex(8 * 1024);
    server.write_all(b"id,note\n1,5\" pipe\n").await?;
    for i in 2..200 {
        server.write_all(format!("{i},x\n").as_bytes()).await?;
    }
    // `server` stays open, so only an early stop can finish the call.
    let outcome = tokio::time::timeout(Duration::from_secs(5), ingest(client, 10, 64)).await??;
    let rows = match outcome {
        IngestionResult::LimitExceeded(rows) => rows,
        other => panic!("expected a limit breach, got {other:?}"),
    };
    assert_eq!(rows.len(), 11);
    assert_eq!(rows[1], vec!["1".to_string(), "5\" pipe".to_string()]);
    assert_eq!(rows[10], vec!["10".to_string(), "x".to_string()]);
    drop(server);
    Ok(())
}

#[tokio::test]
async fn limit_breach_with_carriage_return_endings_stops_early() -> anyhow::Result<()> {
    let (client, mut server) = tokio::io::duplex(8 * 1024);
    for i in 0..200 {
        server.write_all(format!("{i},x\r").as_bytes()).await?;
    }
    let outcome = tokio::time::timeout(Duration::from_secs(5), ingest(client, 3, 16)).await??;
    assert_eq!(
        outcome,
        IngestionResult::LimitExceeded(batch(&[&["0", "x"], &["1", "x"], &["2", "x"], &["3", "x"]]))
    );
    drop(server);
    Ok(())
}

#[tokio::test]
async fn complete_never_exceeds_the_limit() -> anyhow::Result<()> {
    let content: String = (0..50).map(|i| format!("{i},x\n")).collect();
    for limit in [0usize, 1, 7, 49, 50, 51] {
        for chunk in [3usize, 16, 1024] {
            match ingest(content.as_bytes(), limit, chunk).await? {
                IngestionResult::Complete(rows) => assert!(rows.len() <= limit),
                IngestionResult::LimitExceeded(rows) => {
                    assert_eq!(rows.len(), limit + 1);
                    assert_eq!(rows.last(), Some(&vec![limit.to_string(), "x".to_string()]));
                }
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn repeated_ingestion_is_deterministic() -> anyhow::Result<()> {
    let content = "x;y\n\"1;1\";2\n3;4\n";
    let first = ingest(content.as_bytes(), 10, 3).await?;
    let second = ingest(content.as_bytes(), 10, 3).await?;
    assert_eq!(first, second);
    assert_eq!(
        first.rows(),
        &batch(&[&["x", "y"], &["1;1", "2"], &["3", "4"]])
    );
    Ok(())
}

#[tokio::test]
async fn row_cap_completes_after_the_chunk_that_reaches_it() -> anyhow::Result<()> {
    let content: String = (0..10).map(|i| format!("{i}\n")).collect();
    let config = IngestConfig::new(100, 4).with_row_cap(3);
    let outcome = ingest_with(content.as_bytes(), &config).await?;
    assert_eq!(
        outcome,
        IngestionResult::Complete(batch(&[&["0"], &["1"], &["2"]]))
    );
    Ok(())
}

#[tokio::test]
async fn limit_breach_stops_without_draining_the_upload() -> anyhow::Result<()> {
    let (client, mut server) = tokio::io::duplex(256);
    server.write_all(SAMPLE.as_bytes()).await?;
    // `server` stays open: reading to end of stream would never finish.
    let outcome = ingest(client, 1, 64).await?;
    assert_eq!(
        outcome,
        IngestionResult::LimitExceeded(batch(&[&["a", "b"], &["1", "2"]]))
    );
    drop(server);
    Ok(())
}

#[tokio::test]
async fn invalid_utf8_is_an_encoding_error() {
    let err = ingest(&b"a,b\n\xff,1\n"[..], 10, 4).await.unwrap_err();
    assert!(matches!(err, CsvIngestError::Encoding { .. }), "{err}");
}

#[tokio::test]
async fn truncated_multibyte_at_end_is_an_encoding_error() {
    let err = ingest(&b"a,b\n1,\xc3"[..], 10, 64).await.unwrap_err();
    assert!(matches!(err, CsvIngestError::Encoding { .. }), "{err}");
}

#[tokio::test]
async fn read_failure_surfaces_as_io_error() {
    let chunks: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(b"a,b\n1,2\n")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "upload dropped")),
    ];
    let reader = StreamReader::new(futures::stream::iter(chunks));
    let err = ingest(reader, 10, 64).await.unwrap_err();
    match err {
        CsvIngestError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn zero_chunk_size_is_rejected() {
    let err = ingest(SAMPLE.as_bytes(), 10, 0).await.unwrap_err();
    assert!(matches!(err, CsvIngestError::InvalidConfig(_)));
}

#[tokio::test]
async fn cancellation_stops_a_stalled_upload() -> anyhow::Result<()> {
    let (client, mut server) = tokio::io::duplex(256);
    server.write_all(b"a,b\n1,").await?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        trigger.cancel();
    });

    let err = ingest_cancellable(client, &IngestConfig::new(10, 8), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CsvIngestError::Cancelled));
    drop(server);
    Ok(())
}

#[tokio::test]
async fn pipeline_reports_terminal_state_and_dialect() -> anyhow::Result<()> {
    let config = IngestConfig::new(10, 4);
    let mut pipeline = IngestionPipeline::new("a\tb\n1\t2\n".as_bytes(), &config)?;
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let outcome = pipeline.run(None).await?;
    assert_eq!(outcome.rows(), &batch(&[&["a", "b"], &["1", "2"]]));
    assert_eq!(pipeline.state(), PipelineState::Complete);
    assert_eq!(pipeline.dialect().map(|d| d.delimiter), Some(b'\t'));

    assert!(pipeline.run(None).await.is_err());
    Ok(())
}

#[tokio::test]
async fn failed_pipeline_ends_in_failed_state() -> anyhow::Result<()> {
    let config = IngestConfig::new(10, 4);
    let mut pipeline = IngestionPipeline::new(&b"ok\n\xfe\n"[..], &config)?;
    assert!(pipeline.run(None).await.is_err());
    assert_eq!(pipeline.state(), PipelineState::Failed);
    Ok(())
}

#[tokio::test]
async fn configured_dialect_and_encoding_are_used() -> anyhow::Result<()> {
    let config = IngestConfig::new(10, 3)
        .with_encoding(encoding_rs::WINDOWS_1252)
        .with_dialect(Dialect {
            delimiter: b'|',
            quote: b'\'',
        });
    let outcome = ingest_with(&b"caf\xe9|'a|b'\n"[..], &config).await?;
    assert_eq!(outcome.into_rows(), batch(&[&["café", "a|b"]]));
    Ok(())
}
