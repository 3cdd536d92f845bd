// src/engine/archive.rs
//
// Multi-item delivery: packs encoded outputs into a single zip.

use crate::engine::encoder::EncodedOutput;
use crate::engine::loader::file_stem;
use crate::error::PixelShiftError;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

type ArchiveResult<T> = std::result::Result<T, PixelShiftError>;

/// Builds one archive from a batch's successful outputs.
pub trait ArchivePackager: Send + Sync {
    fn package(&self, entries: &[EncodedOutput]) -> ArchiveResult<Vec<u8>>;
}

/// Zip with every entry stored as-is; the payloads are already compressed images.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl ArchivePackager for ZipPackager {
    fn package(&self, entries: &[EncodedOutput]) -> ArchiveResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for entry in entries {
            zip.start_file(entry.filename.as_str(), options)
                .map_err(|e| PixelShiftError::archive_failed(format!("{}: {e}", entry.filename)))?;
            zip.write_all(&entry.bytes)
                .map_err(|e| PixelShiftError::archive_failed(format!("{}: {e}", entry.filename)))?;
        }

        let cursor = zip
            .finish()
            .map_err(|e| PixelShiftError::archive_failed(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Rename repeated filenames in place: `a-processed.png`, `a-processed-2.png`, ...
pub fn dedupe_filenames(outputs: &mut [EncodedOutput]) {
    let mut seen: HashSet<String> = HashSet::with_capacity(outputs.len());
    for output in outputs.iter_mut() {
        if seen.insert(output.filename.clone()) {
            continue;
        }
        let stem = file_stem(&output.filename).to_string();
        let ext = output.filename[stem.len()..].to_string();
        let mut n = 2usize;
        let unique = loop {
            let candidate = format!("{stem}-{n}{ext}");
            if !seen.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        seen.insert(unique.clone());
        output.filename = unique;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn output(name: &str, bytes: &[u8]) -> EncodedOutput {
        EncodedOutput {
            filename: name.to_string(),
            bytes: bytes.to_vec(),
            mime: "image/png",
        }
    }

    #[test]
    fn test_zip_holds_every_entry_stored() {
        let entries = vec![
            output("a-processed.png", b"first"),
            output("b-processed.png", b"second entry"),
        ];
        let bytes = ZipPackager.package(&entries).unwrap();
        assert_eq!(&bytes[0..2], b"PK");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        for expected in &entries {
            let mut file = archive.by_name(&expected.filename).unwrap();
            assert_eq!(file.compression(), CompressionMethod::Stored);
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            assert_eq!(content, expected.bytes);
        }
    }

    #[test]
    fn test_duplicate_names_fail_without_dedupe() {
        let entries = vec![output("x.png", b"1"), output("x.png", b"2")];
        let err = ZipPackager.package(&entries).unwrap_err();
        assert!(matches!(err, PixelShiftError::ArchiveFailed { .. }));
        assert!(err.aborts_batch());
    }

    #[test]
    fn test_dedupe_appends_counter_before_extension() {
        let mut outputs = vec![
            output("photo-processed.webp", b""),
            output("photo-processed.webp", b""),
            output("other-processed.webp", b""),
            output("photo-processed.webp", b""),
            output("photo-processed-2.webp", b""),
        ];
        dedupe_filenames(&mut outputs);
        let names: Vec<&str> = outputs.iter().map(|o| o.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "photo-processed.webp",
                "photo-processed-2.webp",
                "other-processed.webp",
                "photo-processed-3.webp",
                "photo-processed-2-2.webp",
            ]
        );
    }

    #[test]
    fn test_dedupe_without_extension() {
        let mut outputs = vec![output("README", b""), output("README", b"")];
        dedupe_filenames(&mut outputs);
        assert_eq!(outputs[1].filename, "README-2");
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let bytes = ZipPackager.package(&[]).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
