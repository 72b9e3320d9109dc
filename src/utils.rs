//! Utility functions for file handling and common operations

use crate::{QcError, QcResult};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Check if a file is gzip compressed
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> QcResult<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0; 2];

    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1f, 0x8b]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(QcError::Io(e)),
    }
}

/// Open a plain or gzip compressed file for buffered reading
pub fn open_reader<P: AsRef<Path>>(path: P) -> QcResult<Box<dyn BufRead>> {
    let file = File::open(&path)
        .map_err(|_| QcError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    let reader: Box<dyn BufRead> = if is_gzipped(&path)? {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Output file, plain or gzip compressed.
///
/// Must be closed with [`OutputWriter::finish`]; dropping a gzip writer
/// loses any error raised while writing the gzip trailer.
pub enum OutputWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputWriter {
    /// Write any buffered data and the gzip trailer
    pub fn finish(self) -> QcResult<()> {
        match self {
            OutputWriter::Plain(mut writer) => writer.flush()?,
            OutputWriter::Gzip(encoder) => encoder.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutputWriter::Plain(writer) => writer.write(buf),
            OutputWriter::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputWriter::Plain(writer) => writer.flush(),
            OutputWriter::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Create an output file, gzip compressed when the path ends in `.gz`
pub fn create_writer<P: AsRef<Path>>(path: P) -> QcResult<OutputWriter> {
    let file = BufWriter::new(File::create(&path)?);
    let writer = if has_extension(&path, "gz") {
        OutputWriter::Gzip(GzEncoder::new(file, Compression::default()))
    } else {
        OutputWriter::Plain(file)
    };
    Ok(writer)
}

/// Get the number of CPU cores, with a fallback default
pub fn get_num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Validate file paths and check if they exist
pub fn validate_file_exists<P: AsRef<Path>>(path: P) -> QcResult<()> {
    if !path.as_ref().exists() {
        return Err(QcError::FileNotFound(
            path.as_ref().to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

/// Validate that a file is readable
pub fn validate_file_readable<P: AsRef<Path>>(path: P) -> QcResult<()> {
    validate_file_exists(&path)?;

    File::open(&path)
        .map_err(|_| QcError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    Ok(())
}

/// Check if a path has a specific extension
pub fn has_extension<P: AsRef<Path>>(path: P, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Create parent directories if they don't exist
pub fn ensure_parent_dirs<P: AsRef<Path>>(path: P) -> QcResult<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Timer utility for measuring execution time
pub struct Timer {
    start: std::time::Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::info!("Starting timer: {}", name);
        Timer {
            start: std::time::Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    pub fn log_elapsed(&self) {
        let duration = self.elapsed();
        log::info!("Timer '{}' elapsed: {:.2?}", self.name, duration);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.log_elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_is_gzipped() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "test content").unwrap();
        assert!(!is_gzipped(temp_file.path()).unwrap());

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&[0x1f, 0x8b]).unwrap();
        assert!(is_gzipped(temp_file.path()).unwrap());

        let temp_file = NamedTempFile::new().unwrap();
        assert!(!is_gzipped(temp_file.path()).unwrap());
    }

    #[test]
    fn test_gzip_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv.gz");

        let mut writer = create_writer(&path).unwrap();
        assert!(matches!(writer, OutputWriter::Gzip(_)));
        writeln!(writer, "sample\tqc_status").unwrap();
        writer.finish().unwrap();

        assert!(is_gzipped(&path).unwrap());
        let mut content = String::new();
        open_reader(&path).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "sample\tqc_status\n");
    }

    #[test]
    fn test_plain_writer_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");

        let mut writer = create_writer(&path).unwrap();
        assert!(matches!(writer, OutputWriter::Plain(_)));
        writeln!(writer, "sample").unwrap();
        writer.finish().unwrap();

        assert!(!is_gzipped(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "sample\n");
    }

    #[test]
    fn test_open_reader_missing_file() {
        assert!(matches!(
            open_reader("/nonexistent/file.tsv"),
            Err(QcError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_get_num_cpus() {
        assert!(get_num_cpus() >= 1);
    }

    #[test]
    fn test_validate_file_exists() {
        let temp_file = NamedTempFile::new().unwrap();
        assert!(validate_file_exists(temp_file.path()).is_ok());
        assert!(validate_file_readable(temp_file.path()).is_ok());

        assert!(validate_file_exists("/nonexistent/file").is_err());
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension("report.tsv.gz", "gz"));
        assert!(has_extension("report.TSV", "tsv"));
        assert!(!has_extension("report.tsv", "gz"));
        assert!(!has_extension("report", "gz"));
    }

    #[test]
    fn test_ensure_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("qc.tsv");
        ensure_parent_dirs(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new("test");
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(timer.elapsed().as_millis() >= 1);
    }
}
