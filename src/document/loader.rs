use calamine::{open_workbook_auto, Reader};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};

use super::splitter::{Language, RecursiveCharacterTextSplitter};
use super::{docx, loader_for, Document, DocumentError, LoaderKind};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DocumentError + '_ {
    move |source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn extraction_error(path: &Path, reason: impl ToString) -> DocumentError {
    DocumentError::Extraction {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn load_pdf(path: &Path) -> Result<String, DocumentError> {
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| extraction_error(path, e))
}

/// Each row becomes `column: value` lines; rows are separated by a blank line.
fn load_csv(path: &Path) -> Result<String, DocumentError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| extraction_error(path, e))?;
    let headers = reader.headers().map_err(|e| extraction_error(path, e))?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| extraction_error(path, e))?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(column, value)| format!("{}: {}", column.trim(), value.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        rows.push(row);
    }
    Ok(rows.join("\n\n"))
}

fn load_excel(path: &Path) -> Result<String, DocumentError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| extraction_error(path, e))?;
    let mut sheets = Vec::new();

    for name in workbook.sheet_names().to_owned() {
        let range = match workbook.worksheet_range(&name) {
            Some(Ok(range)) => range,
            Some(Err(e)) => return Err(extraction_error(path, e)),
            None => continue,
        };

        let mut text = String::new();
        text.push_str(&name);
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| cell.to_string())
                .filter(|cell| !cell.trim().is_empty())
                .collect();
            if !cells.is_empty() {
                text.push('\n');
                text.push_str(&cells.join("\t"));
            }
        }
        sheets.push(text);
    }

    Ok(sheets.join("\n\n"))
}

/// Loads one file with the loader registered for its extension.
pub fn load_single_document(path: &Path) -> Result<Document, DocumentError> {
    let kind = loader_for(path).ok_or_else(|| DocumentError::UndefinedType(path.to_path_buf()))?;

    let content = match kind {
        LoaderKind::Text => std::fs::read(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(io_error(path))?,
        LoaderKind::Pdf => load_pdf(path)?,
        LoaderKind::Csv => load_csv(path)?,
        LoaderKind::Excel => load_excel(path)?,
        LoaderKind::Word => docx::extract_text(path)?,
    };

    Ok(Document::new(content, path.to_string_lossy()))
}

/// Loads a batch on the calling thread pool, one thread per file.
pub fn load_document_batch(paths: &[PathBuf]) -> Result<Vec<Document>, DocumentError> {
    log::info!("Loading document batch");
    std::thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| scope.spawn(move || load_single_document(path)))
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| DocumentError::Worker("loader thread panicked".to_string()))
                    .and_then(|loaded| loaded)
            })
            .collect()
    })
}

/// Files directly inside `source_dir` that have a registered loader, sorted by path.
pub fn collect_paths(source_dir: &Path) -> Result<Vec<PathBuf>, DocumentError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(source_dir).map_err(io_error(source_dir))? {
        let path = entry.map_err(io_error(source_dir))?.path();
        if path.is_file() && loader_for(&path).is_some() {
            paths.push(path);
        } else {
            log::debug!("Skipping {}", path.display());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Loads every supported document in `source_dir`, spreading batches over
/// at most `ingest_threads` blocking workers. Documents arrive in batch
/// completion order.
pub async fn load_documents(source_dir: &Path, ingest_threads: usize) -> Result<Vec<Document>, DocumentError> {
    let paths = collect_paths(source_dir)?;
    if paths.is_empty() {
        log::warn!("No supported documents found in {}", source_dir.display());
        return Ok(Vec::new());
    }

    let n_workers = ingest_threads.min(paths.len()).max(1);
    let chunksize = ((paths.len() as f64 / n_workers as f64).round_ties_even() as usize).max(1);

    let mut batches = FuturesUnordered::new();
    for batch in paths.chunks(chunksize) {
        let batch = batch.to_vec();
        batches.push(tokio::task::spawn_blocking(move || load_document_batch(&batch)));
    }

    let mut docs = Vec::with_capacity(paths.len());
    while let Some(joined) = batches.next().await {
        let contents = joined.map_err(|e| DocumentError::Worker(e.to_string()))??;
        docs.extend(contents);
    }

    Ok(docs)
}

/// Separates Python sources, which get a code-aware splitter, from everything else.
pub fn split_documents(documents: Vec<Document>) -> (Vec<Document>, Vec<Document>) {
    documents.into_iter().partition(|doc| {
        Path::new(doc.source())
            .extension()
            .map_or(true, |ext| ext != "py")
    })
}

/// Splits loaded documents into retrieval chunks.
pub fn chunk_documents(documents: Vec<Document>, chunk_size: usize, chunk_overlap: usize) -> Vec<Document> {
    let (text_documents, python_documents) = split_documents(documents);

    let text_splitter = RecursiveCharacterTextSplitter::new(chunk_size, chunk_overlap);
    let python_splitter = RecursiveCharacterTextSplitter::from_language(Language::Python, chunk_size, chunk_overlap);

    let mut texts = text_splitter.split_documents(&text_documents);
    texts.extend(python_splitter.split_documents(&python_documents));
    texts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_undefined_document_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "diagram.png", "not text");
        match load_single_document(&path) {
            Err(DocumentError::UndefinedType(p)) => assert_eq!(p, path),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "parts.csv", "part,mtbf\npump, 12000\nvalve,40000\n");
        let doc = load_single_document(&path).unwrap();
        assert_eq!(doc.page_content, "part: pump\nmtbf: 12000\n\npart: valve\nmtbf: 40000");
        assert_eq!(doc.source(), path.to_string_lossy());
    }

    #[tokio::test]
    async fn test_load_documents_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "alpha");
        write(dir.path(), "b.md", "# beta");
        write(dir.path(), "c.py", "def gamma():\n    pass\n");
        write(dir.path(), "d.csv", "k,v\nx,1\n");
        write(dir.path(), "e.png", "ignored");
        fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let mut docs = load_documents(dir.path(), 3).await.unwrap();
        docs.sort_by(|a, b| a.source().cmp(b.source()));

        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0].page_content, "alpha");
        assert!(docs[2].source().ends_with("c.py"));
    }

    #[tokio::test]
    async fn test_load_documents_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        let docs = load_documents(dir.path(), 8).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load_documents(&missing, 2).await,
            Err(DocumentError::Io { .. })
        ));
    }

    #[test]
    fn test_split_documents_by_extension() {
        let docs = vec![
            Document::new("print(1)", "/src/tool.py"),
            Document::new("notes", "/src/notes.md"),
            Document::new("no extension", "/src/README"),
        ];
        let (text, python) = split_documents(docs);
        assert_eq!(text.len(), 2);
        assert_eq!(python.len(), 1);
        assert_eq!(python[0].source(), "/src/tool.py");
    }
}
