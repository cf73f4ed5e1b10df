use crate::chunking::{chunk_words, ChunkingConfig};
use crate::extractor::{extract_text, DocumentFormat};
use crate::{DocumentFingerprint, IngestError, IngestionOptions};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extracted and chunked document, ready to hand to an index.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub fingerprint: DocumentFingerprint,
    pub text: String,
    pub chunks: Vec<String>,
}

/// Validates, extracts and chunks one upload. Touches no shared state.
pub fn prepare_document(
    bytes: &[u8],
    filename: &str,
    session_id: &str,
    options: &IngestionOptions,
) -> Result<PreparedDocument, IngestError> {
    let format = DocumentFormat::from_filename(filename)?;
    let config = ChunkingConfig::from(options);
    config.validate()?;

    if bytes.len() > options.max_document_bytes {
        return Err(IngestError::TooLarge {
            size: bytes.len(),
            limit: options.max_document_bytes,
        });
    }

    let text = extract_text(bytes, format)?;
    if text.is_empty() {
        return Err(IngestError::EmptyText(filename.to_string()));
    }

    let chunks = chunk_words(&text, config)?;
    let checksum = digest_bytes(bytes);

    Ok(PreparedDocument {
        fingerprint: DocumentFingerprint {
            document_id: generate_document_id(session_id, filename, &checksum),
            filename: filename.to_string(),
            format,
            checksum,
            byte_len: bytes.len(),
            ingested_at: Utc::now(),
        },
        text,
        chunks,
    })
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn generate_document_id(session_id: &str, filename: &str, checksum: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(checksum.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Files under `folder` (recursively) whose extension is in the allow-list.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| DocumentFormat::from_filename(name).is_ok());

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fixtures::{docx_with_body, pdf_with_pages};
    use std::fs;
    use tempfile::tempdir;

    fn words(count: usize) -> String {
        (0..count)
            .map(|index| format!("word{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn plain_text_upload_is_chunked_with_defaults() {
        let text = words(2_500);
        let prepared =
            prepare_document(text.as_bytes(), "notes.txt", "s1", &IngestionOptions::default())
                .unwrap();

        assert_eq!(prepared.chunks.len(), 3);
        assert_eq!(prepared.text, text);
        assert_eq!(prepared.fingerprint.format, DocumentFormat::Text);
        assert_eq!(prepared.fingerprint.byte_len, text.len());
    }

    #[test]
    fn reassembled_chunks_reproduce_extracted_tokens_for_every_format() {
        let options = IngestionOptions {
            window_words: 3,
            overlap_words: 1,
            ..IngestionOptions::default()
        };
        let sentence = "alpha beta gamma delta epsilon zeta eta theta";
        let cases = vec![
            ("plain.txt", sentence.as_bytes().to_vec()),
            (
                "word.docx",
                docx_with_body(&format!("<w:p><w:r><w:t>{sentence}</w:t></w:r></w:p>")),
            ),
            (
                "paged.pdf",
                pdf_with_pages(&["alpha beta gamma delta", "epsilon zeta eta theta"]),
            ),
        ];

        for (filename, bytes) in cases {
            let prepared = prepare_document(&bytes, filename, "s1", &options).unwrap();
            assert!(prepared.chunks.len() > 1, "{filename} should span several chunks");

            let mut tokens = Vec::new();
            for (index, chunk) in prepared.chunks.iter().enumerate() {
                let skip = if index == 0 { 0 } else { options.overlap_words };
                tokens.extend(chunk.split_whitespace().skip(skip));
            }
            assert_eq!(
                tokens,
                prepared.text.split_whitespace().collect::<Vec<_>>(),
                "{filename}"
            );
        }
    }

    #[test]
    fn docx_upload_is_prepared() {
        let bytes = docx_with_body(concat!(
            "<w:p><w:r><w:t>Maintenance schedule</w:t></w:r></w:p>",
            "<w:p><w:r><w:t>Check the pump weekly</w:t></w:r></w:p>",
        ));
        let prepared =
            prepare_document(&bytes, "manual.docx", "s1", &IngestionOptions::default()).unwrap();

        assert_eq!(prepared.text, "Maintenance schedule\nCheck the pump weekly");
        assert_eq!(
            prepared.chunks,
            vec!["Maintenance schedule Check the pump weekly".to_string()]
        );
    }

    #[test]
    fn unsupported_extension_is_rejected_first() {
        let error = prepare_document(b"", "sheet.xlsx", "s1", &IngestionOptions::default())
            .unwrap_err();
        assert!(matches!(error, IngestError::UnsupportedFormat(_)));
    }

    #[test]
    fn whitespace_only_text_is_an_empty_document() {
        let error = prepare_document(b"  \n\t ", "blank.txt", "s1", &IngestionOptions::default())
            .unwrap_err();
        assert!(matches!(error, IngestError::EmptyText(ref name) if name == "blank.txt"));
    }

    #[test]
    fn oversized_uploads_fail_without_extraction() {
        let options = IngestionOptions {
            max_document_bytes: 4,
            ..IngestionOptions::default()
        };
        let error = prepare_document(b"12345", "big.txt", "s1", &options).unwrap_err();
        assert!(matches!(error, IngestError::TooLarge { size: 5, limit: 4 }));
    }

    #[test]
    fn invalid_chunk_options_are_rejected() {
        let options = IngestionOptions {
            window_words: 10,
            overlap_words: 10,
            ..IngestionOptions::default()
        };
        let error = prepare_document(b"some text", "a.txt", "s1", &options).unwrap_err();
        assert!(matches!(error, IngestError::InvalidChunkConfig(_)));
    }

    #[test]
    fn document_id_is_scoped_to_session_and_content() {
        let options = IngestionOptions::default();
        let first = prepare_document(b"same words", "a.txt", "s1", &options).unwrap();
        let again = prepare_document(b"same words", "a.txt", "s1", &options).unwrap();
        let other_session = prepare_document(b"same words", "a.txt", "s2", &options).unwrap();

        assert_eq!(first.fingerprint.document_id, again.fingerprint.document_id);
        assert_ne!(first.fingerprint.document_id, other_session.fingerprint.document_id);
        assert_eq!(first.fingerprint.checksum, digest_bytes(b"same words"));
    }

    #[test]
    fn discover_documents_is_recursive_and_filters_extensions(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("a.pdf"), b"%PDF-1.4\n%fake")?;
        fs::write(base.join("notes.TXT"), b"text")?;
        fs::write(nested.join("b.docx"), b"PK")?;
        fs::write(nested.join("budget.xlsx"), b"PK")?;

        let files = discover_documents(base);
        let names = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect::<Vec<_>>();

        assert_eq!(files.len(), 3);
        assert!(!names.contains(&"budget.xlsx"));
        Ok(())
    }
}
