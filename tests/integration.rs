//! Library-level tests of the indexing pipeline, query engine, and
//! collection manager over real SQLite storage in a temp directory.
//!
//! Embeddings come from a deterministic letter-frequency model so ranking
//! is predictable without downloading anything.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use knowledge_base::app::KnowledgeBase;
use knowledge_base::config::Config;
use knowledge_base::db;
use knowledge_base_core::collection::CollectionName;
use knowledge_base_core::embedding::EmbeddingProvider;
use knowledge_base_core::KbError;

/// Unit-normalized a–z letter histogram.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| letter_histogram(t)).collect())
    }
}

fn letter_histogram(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

fn setup() -> (TempDir, KnowledgeBase) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.base_dir = tmp.path().join("kb_storage");
    let kb = KnowledgeBase::with_provider(&config, Arc::new(LetterEmbedder)).unwrap();
    (tmp, kb)
}

fn name(raw: &str) -> CollectionName {
    CollectionName::parse(raw).unwrap()
}

/// Minimal single-page PDF drawing `phrase` in Helvetica.
fn minimal_pdf_with_text(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn minimal_docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[tokio::test]
async fn test_2500_char_document_yields_three_chunks() {
    let (_tmp, kb) = setup();
    let text = "lorem ipsum dolor sit amet ".repeat(100);
    let text: String = text.chars().take(2500).collect();

    let outcome = kb
        .pipeline()
        .ingest(text.into_bytes(), "lorem.txt", "docs")
        .await
        .unwrap();
    assert_eq!(outcome.chunks_added, 3);
    assert_eq!(outcome.collection, "docs");

    let stats = kb.collections().stats(&name("docs")).await.unwrap();
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.file_count, 1);
    assert_eq!(stats.source_files["lorem.txt"], 3);
}

#[tokio::test]
async fn test_sequential_ingests_accumulate() {
    let (_tmp, kb) = setup();
    kb.pipeline()
        .ingest(b"first document body".to_vec(), "one.md", "docs")
        .await
        .unwrap();
    kb.pipeline()
        .ingest("x".repeat(1500).into_bytes(), "two.txt", "docs")
        .await
        .unwrap();

    let stats = kb.collections().stats(&name("docs")).await.unwrap();
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.source_files["one.md"], 1);
    assert_eq!(stats.source_files["two.txt"], 2);

    let listed = kb.collections().list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].document_count, 3);
}

#[tokio::test]
async fn test_empty_document_leaves_no_collection() {
    let (_tmp, kb) = setup();
    let err = kb
        .pipeline()
        .ingest(b" \n\n\t ".to_vec(), "blank.txt", "docs")
        .await
        .unwrap_err();
    assert!(matches!(err, KbError::NoContent { .. }));
    assert!(!kb.collections().exists(&name("docs")).await);
}

#[tokio::test]
async fn test_unsupported_extension_rejected_before_storage() {
    let (_tmp, kb) = setup();
    let err = kb
        .pipeline()
        .ingest(b"a,b,c".to_vec(), "table.csv", "docs")
        .await
        .unwrap_err();
    match err {
        KbError::UnsupportedFormat {
            extension,
            supported,
        } => {
            assert_eq!(extension, ".csv");
            assert_eq!(supported, vec![".pdf", ".txt", ".md", ".docx"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!kb.collections().base_dir().exists());
}

#[tokio::test]
async fn test_query_ranks_closest_document_first() {
    let (_tmp, kb) = setup();
    kb.pipeline()
        .ingest(b"aaaa aaaa aaaa".to_vec(), "a.txt", "docs")
        .await
        .unwrap();
    kb.pipeline()
        .ingest(b"zzzz zzzz zzzz".to_vec(), "z.txt", "docs")
        .await
        .unwrap();

    let response = kb.engine().query("aaa", "docs", Some(5)).await.unwrap();
    assert_eq!(response.count, 2);
    assert_eq!(response.documents[0].metadata.source_file, "a.txt");
    assert_eq!(response.documents[0].score, 1.0);
    assert!(response.documents[0].distance <= response.documents[1].distance);
    for doc in &response.documents {
        assert!((0.0..=1.0).contains(&doc.score));
        assert_eq!(doc.metadata.collection, "docs");
    }
}

#[tokio::test]
async fn test_query_missing_and_empty_collections() {
    let (_tmp, kb) = setup();
    let err = kb.engine().query("anything", "docs", None).await.unwrap_err();
    assert!(matches!(err, KbError::NotFound(_)));

    std::fs::create_dir_all(kb.collections().path_for(&name("empty"))).unwrap();
    let response = kb.engine().query("anything", "empty", None).await.unwrap();
    assert_eq!(response.count, 0);
    assert!(response.documents.is_empty());

    let err = kb.collections().stats(&name("empty")).await.unwrap_err();
    assert!(matches!(err, KbError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_then_query_not_found() {
    let (_tmp, kb) = setup();
    kb.pipeline()
        .ingest(b"short note".to_vec(), "note.md", "docs")
        .await
        .unwrap();
    assert!(kb.collections().exists(&name("docs")).await);

    kb.collections().delete(&name("docs")).await.unwrap();
    assert!(!kb.collections().exists(&name("docs")).await);
    assert!(matches!(
        kb.engine().query("short", "docs", None).await,
        Err(KbError::NotFound(_))
    ));
    assert!(kb.collections().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_listing_skips_corrupt_index() {
    let (_tmp, kb) = setup();
    kb.pipeline()
        .ingest(b"healthy collection".to_vec(), "ok.txt", "good")
        .await
        .unwrap();

    let broken = kb.collections().path_for(&name("broken"));
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(db::index_path(&broken), vec![0x5A_u8; 4096]).unwrap();

    let listed = kb.collections().list().await.unwrap();
    let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["good"]);
}

#[tokio::test]
async fn test_invalid_collection_names_rejected() {
    let (_tmp, kb) = setup();
    for bad in ["", "has space", "../escape", "dots.not.allowed"] {
        let err = kb
            .pipeline()
            .ingest(b"text".to_vec(), "a.txt", bad)
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::InvalidName(_)), "{bad}");
    }
    assert!(!kb.collections().base_dir().exists());
}

#[tokio::test]
async fn test_pdf_and_docx_ingest() {
    let (_tmp, kb) = setup();
    kb.pipeline()
        .ingest(minimal_pdf_with_text("quarterly revenue report"), "report.pdf", "office")
        .await
        .unwrap();
    kb.pipeline()
        .ingest(
            minimal_docx_with_paragraphs(&["Meeting notes", "Action items follow"]),
            "notes.docx",
            "office",
        )
        .await
        .unwrap();

    let stats = kb.collections().stats(&name("office")).await.unwrap();
    assert_eq!(stats.file_count, 2);

    let response = kb.engine().query("notes", "office", Some(10)).await.unwrap();
    let docx_hit = response
        .documents
        .iter()
        .find(|d| d.metadata.source_file == "notes.docx")
        .unwrap();
    assert_eq!(docx_hit.content, "Meeting notes\nAction items follow\n");
    let pdf_hit = response
        .documents
        .iter()
        .find(|d| d.metadata.source_file == "report.pdf")
        .unwrap();
    assert!(pdf_hit.content.contains("quarterly"));
}

/// Letter histograms, remembering how many texts each call carried.
#[derive(Default)]
struct CountingEmbedder {
    calls: std::sync::Mutex<Vec<usize>>,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.lock().unwrap().push(texts.len());
        Ok(texts.iter().map(|t| letter_histogram(t)).collect())
    }
}

#[tokio::test]
async fn test_large_upload_embeds_in_configured_batches() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.base_dir = tmp.path().join("kb_storage");
    config.embedding.batch_size = 64;
    let embedder = Arc::new(CountingEmbedder::default());
    let kb = KnowledgeBase::with_provider(&config, embedder.clone()).unwrap();

    let outcome = kb
        .pipeline()
        .ingest("word ".repeat(100_000).into_bytes(), "big.txt", "docs")
        .await
        .unwrap();

    let calls = embedder.calls.lock().unwrap().clone();
    assert!(calls.len() > 1, "expected several calls, got {:?}", calls);
    assert!(calls.iter().all(|&n| n <= 64), "{:?}", calls);
    assert!(calls[..calls.len() - 1].iter().all(|&n| n == 64), "{:?}", calls);
    assert_eq!(calls.iter().sum::<usize>(), outcome.chunks_added);

    let stats = kb.collections().stats(&name("docs")).await.unwrap();
    assert_eq!(stats.total_chunks, outcome.chunks_added);
}

/// Three-wide vectors, standing in for a different embedding model.
struct NarrowEmbedder;

#[async_trait]
impl EmbeddingProvider for NarrowEmbedder {
    fn model_name(&self) -> &str {
        "narrow"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

#[tokio::test]
async fn test_query_after_model_change_is_rejected() {
    let (tmp, kb) = setup();
    kb.pipeline()
        .ingest(b"hello there".to_vec(), "hello.txt", "docs")
        .await
        .unwrap();

    let mut config = Config::default();
    config.storage.base_dir = tmp.path().join("kb_storage");
    let switched = KnowledgeBase::with_provider(&config, Arc::new(NarrowEmbedder)).unwrap();

    let err = switched.engine().query("hello", "docs", None).await.unwrap_err();
    assert!(matches!(err, KbError::InvalidRequest(_)), "{err}");
    assert!(err.to_string().contains("holds 26"), "{err}");
}

#[tokio::test]
async fn test_reads_on_bare_collection_write_nothing() {
    let (_tmp, kb) = setup();
    let dir = kb.collections().path_for(&name("empty"));
    std::fs::create_dir_all(&dir).unwrap();

    let listed = kb.collections().list().await.unwrap();
    assert_eq!(listed[0].name, "empty");
    assert_eq!(listed[0].document_count, 0);
    assert!(kb.collections().stats(&name("empty")).await.is_err());
    assert_eq!(kb.engine().query("anything", "empty", None).await.unwrap().count, 0);

    assert!(!db::index_path(&dir).exists());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

    kb.pipeline()
        .ingest(b"first words".to_vec(), "first.txt", "empty")
        .await
        .unwrap();
    assert!(db::index_path(&dir).is_file());
    assert_eq!(kb.collections().stats(&name("empty")).await.unwrap().total_chunks, 1);
}
