//! Extension triage
//!
//! Maps a lowercased extension to a verdict. Poor-yield extensions are formats
//! that are already compressed or encrypted internally, so NTFS compression
//! would burn CPU for nothing. Compressible extensions are text, code and
//! executable formats that reliably shrink. Everything else is inconclusive and
//! may be sampled.

use once_cell::sync::Lazy;
use std::collections::HashSet;

const ARCHIVES: &[&str] = &["zip", "rar", "7z", "gz", "xz", "bz2", "tar"];
const DISK_IMAGES: &[&str] = &[
    "iso", "img", "squashfs", "appimage", "vdi", "vmdk", "vhd", "vhdx", "qcow2", "qed", "vpc",
    "hdd", "raw",
];
const IMAGES: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "heic", "heif", "avif", "jxl", "tiff",
];
const VIDEO: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "m4v", "hevc", "h264", "h265", "vp8", "vp9", "av1", "wmv",
    "flv", "3gp",
];
const AUDIO: &[&str] = &[
    "mp3", "aac", "ogg", "m4a", "opus", "flac", "wav", "wma", "ac3", "dts", "alac", "ape", "aiff",
    "pcm", "vgz", "vgm",
];
const ML_WEIGHTS: &[&str] = &[
    "gguf", "h5", "onnx", "pb", "tflite", "safetensors", "torch", "pt",
];
const OFFICE: &[&str] = &["docx", "xlsx", "pptx", "odt", "ods", "pdf"];

/// Extensions that never yield enough to be worth compressing
pub static POOR_YIELD_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [ARCHIVES, DISK_IMAGES, IMAGES, VIDEO, AUDIO, ML_WEIGHTS, OFFICE]
        .into_iter()
        .flatten()
        .copied()
        .collect()
});

/// Extensions that compress well without sampling
pub static COMPRESSIBLE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Text and markup
        "txt", "log", "csv", "tsv", "json", "xml", "yaml", "yml", "toml", "ini", "cfg", "conf",
        "md", "rst", "html", "htm", "css", "svg",
        // Source code
        "c", "h", "cpp", "hpp", "cc", "cs", "java", "kt", "py", "rb", "go", "rs", "php", "pl",
        "js", "mjs", "ts", "tsx", "jsx", "lua", "swift", "scala", "sh", "ps1", "bat", "cmd", "sql",
        // Executables and libraries
        "exe", "dll", "sys", "ocx", "so", "lib", "a", "o", "obj", "pdb", "node", "class",
        // Databases and game data
        "db", "sqlite", "mdb", "pak", "bsa", "ba2", "assets",
    ]
    .into_iter()
    .collect()
});

/// Verdict for a file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionVerdict {
    /// Skip without looking at the file
    PoorYield,
    /// Compress without sampling
    Compressible,
    /// Content decides
    Inconclusive,
}

/// Extension lookup with configurable extra skips
#[derive(Debug, Clone, Default)]
pub struct ExtensionTable {
    extra_skips: HashSet<String>,
}

impl ExtensionTable {
    /// Table with only the built-in lists
    pub fn new() -> Self {
        Self::default()
    }

    /// Add extensions to skip, with or without a leading dot
    pub fn with_extra_skips<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extra_skips.extend(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty()),
        );
        self
    }

    /// Verdict for a lowercased extension without the dot
    pub fn verdict(&self, extension: &str) -> ExtensionVerdict {
        if POOR_YIELD_EXTENSIONS.contains(extension) || self.extra_skips.contains(extension) {
            ExtensionVerdict::PoorYield
        } else if COMPRESSIBLE_EXTENSIONS.contains(extension) {
            ExtensionVerdict::Compressible
        } else {
            ExtensionVerdict::Inconclusive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("zip", ExtensionVerdict::PoorYield)]
    #[case("vhdx", ExtensionVerdict::PoorYield)]
    #[case("safetensors", ExtensionVerdict::PoorYield)]
    #[case("pdf", ExtensionVerdict::PoorYield)]
    #[case("log", ExtensionVerdict::Compressible)]
    #[case("dll", ExtensionVerdict::Compressible)]
    #[case("dat", ExtensionVerdict::Inconclusive)]
    #[case("", ExtensionVerdict::Inconclusive)]
    fn test_builtin_verdicts(#[case] extension: &str, #[case] expected: ExtensionVerdict) {
        assert_eq!(ExtensionTable::new().verdict(extension), expected);
    }

    #[test]
    fn test_extra_skips_are_normalized() {
        let table = ExtensionTable::new().with_extra_skips([".DAT", " bin ", ""]);
        assert_eq!(table.verdict("dat"), ExtensionVerdict::PoorYield);
        assert_eq!(table.verdict("bin"), ExtensionVerdict::PoorYield);
        assert_eq!(table.verdict(""), ExtensionVerdict::Inconclusive);
    }

    #[test]
    fn test_lists_do_not_overlap() {
        assert!(POOR_YIELD_EXTENSIONS.is_disjoint(&COMPRESSIBLE_EXTENSIONS));
        assert_eq!(POOR_YIELD_EXTENSIONS.len(), 76);
    }
}
