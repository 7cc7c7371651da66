use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use zip::ZipArchive;

use crate::core::errors::{ApiError, ExtractionError};
use crate::text::cached_regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Other(String),
}

impl FileType {
    /// Accepts short names (`pdf`, `docx`, `doc`, `txt`) and the matching
    /// MIME types.
    pub fn parse(declared: &str) -> Self {
        let normalized = declared.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" | "application/pdf" => FileType::Pdf,
            "docx"
            | "doc"
            | "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                FileType::Docx
            }
            "txt" | "text" | "text/plain" => FileType::Txt,
            _ => FileType::Other(normalized),
        }
    }

    /// From the file extension; a missing extension is treated as text.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => Self::parse(ext),
            None => FileType::Txt,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
            FileType::Other(name) => name,
        }
    }
}

/// Read access to uploaded files.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>, ApiError>;
}

/// Files under a local upload directory.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ApiError> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ApiError::BadRequest(format!("Unsafe upload path: {path}")));
        }
        // Absolute paths must already point inside the uploads root.
        if relative.is_absolute() {
            if relative.starts_with(&self.root) {
                return Ok(relative.to_path_buf());
            }
            return Err(ApiError::BadRequest(format!(
                "Upload path outside the uploads directory: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let resolved = self.resolve(path)?;
        tokio::fs::read(&resolved).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound(path.to_string()),
            _ => ApiError::internal(err),
        })
    }
}

/// Pulls plain text out of uploaded PDF, DOCX and TXT files.
#[derive(Debug, Clone, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Never fails: unsupported or corrupt input yields empty text.
    pub fn extract(&self, bytes: &[u8], file_type: &FileType) -> String {
        match self.try_extract(bytes, file_type) {
            Ok(text) => text,
            Err(ExtractionError::UnsupportedType(name)) => {
                tracing::warn!(file_type = %name, "Unsupported file type, nothing extracted");
                String::new()
            }
            Err(err) => {
                tracing::error!(file_type = file_type.as_str(), "Text extraction failed: {}", err);
                String::new()
            }
        }
    }

    pub fn try_extract(&self, bytes: &[u8], file_type: &FileType) -> Result<String, ExtractionError> {
        match file_type {
            FileType::Pdf => extract_pdf(bytes),
            FileType::Docx => extract_docx(bytes),
            FileType::Txt => Ok(decode_text(bytes)),
            FileType::Other(name) => Err(ExtractionError::UnsupportedType(name.clone())),
        }
    }

    /// Reads through the store and extracts off the async runtime.
    pub async fn extract_file(&self, store: &dyn FileStore, path: &str, file_type: FileType) -> String {
        let bytes = match store.read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(path, "Failed to read upload: {}", err);
                return String::new();
            }
        };

        let extractor = self.clone();
        match tokio::task::spawn_blocking(move || extractor.extract(&bytes, &file_type)).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(path, "Extraction task aborted: {}", err);
                String::new()
            }
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    // pdf-extract panics on some malformed files.
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(ExtractionError::Pdf(err.to_string())),
        Err(_) => Err(ExtractionError::Pdf("parser panicked".to_string())),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    static PARAGRAPH_END: OnceLock<Regex> = OnceLock::new();
    static BREAK: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();

    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractionError::Docx(e.to_string()))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractionError::Docx(e.to_string()))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;

    let xml = cached_regex(&PARAGRAPH_END, r"</w:p>").replace_all(&xml, "\n");
    let xml = cached_regex(&BREAK, r"<w:(?:br|cr)\s*/>").replace_all(&xml, "\n");
    let xml = xml.replace("<w:tab/>", "\t");
    let text = cached_regex(&TAG, r"<[^>]+>").replace_all(&xml, "");
    Ok(unescape_xml(&text))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn file_types_parse_names_and_extensions() {
        assert_eq!(FileType::parse("PDF"), FileType::Pdf);
        assert_eq!(FileType::parse("application/pdf"), FileType::Pdf);
        assert_eq!(FileType::parse("doc"), FileType::Docx);
        assert_eq!(FileType::parse("text/plain"), FileType::Txt);
        assert_eq!(FileType::parse("pptx"), FileType::Other("pptx".to_string()));
        assert_eq!(FileType::from_path(Path::new("notes/week1.docx")), FileType::Docx);
        assert_eq!(FileType::from_path(Path::new("README")), FileType::Txt);
    }

    #[test]
    fn txt_strips_bom_and_tolerates_bad_utf8() {
        let extractor = TextExtractor::new();
        let text = extractor.extract(b"\xEF\xBB\xBFWeek 1: Graphs", &FileType::Txt);
        assert_eq!(text, "Week 1: Graphs");

        let lossy = extractor.extract(b"heap \xFF sort", &FileType::Txt);
        assert!(lossy.starts_with("heap "));
        assert!(lossy.ends_with(" sort"));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Syllabus</w:t></w:r></w:p>
            <w:p><w:r><w:t>Trees &amp; Graphs</w:t><w:tab/><w:t>Week 2</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = TextExtractor::new()
            .try_extract(&docx_bytes(xml), &FileType::Docx)
            .unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Syllabus", "Trees & Graphs\tWeek 2"]);
    }

    #[test]
    fn corrupt_and_unsupported_input_yield_empty_text() {
        let extractor = TextExtractor::new();
        assert_eq!(extractor.extract(b"not a pdf", &FileType::Pdf), "");
        assert_eq!(extractor.extract(b"not a zip", &FileType::Docx), "");
        assert_eq!(
            extractor.extract(b"slides", &FileType::Other("pptx".to_string())),
            ""
        );
        assert!(matches!(
            extractor.try_extract(b"not a zip", &FileType::Docx),
            Err(ExtractionError::Docx(_))
        ));
    }

    #[tokio::test]
    async fn extract_file_reads_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("outline.txt"), "Dynamic programming").unwrap();
        let store = LocalFileStore::new(dir.path());
        let extractor = TextExtractor::new();

        let text = extractor
            .extract_file(&store, "outline.txt", FileType::Txt)
            .await;
        assert_eq!(text, "Dynamic programming");

        assert_eq!(
            extractor.extract_file(&store, "missing.txt", FileType::Txt).await,
            ""
        );
        assert!(matches!(
            store.read("../etc/passwd").await,
            Err(ApiError::BadRequest(_))
        ));
    }
    #[tokio::test]
    async fn absolute_paths_must_stay_under_the_uploads_root() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("syllabus.txt");
        std::fs::write(&inside, "Week 1: Recursion").unwrap();
        let store = LocalFileStore::new(dir.path());

        let outside = tempfile::tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, "not course material").unwrap();

        assert!(matches!(
            store.read(secret.to_str().unwrap()).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            store.read("/etc/passwd").await,
            Err(ApiError::BadRequest(_))
        ));
        assert_eq!(
            store.read(inside.to_str().unwrap()).await.unwrap(),
            b"Week 1: Recursion".to_vec()
        );
    }
}
