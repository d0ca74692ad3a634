//! Static lookup tables: file formats and language code aliases.
//!
//! Both tables are built once and never mutated.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Category and openness of a declared resource format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Formats in the same category are assumed to carry the same content.
    pub category: &'static str,
    pub open: bool,
}

/// `(format, category, open)` rows. Formats are matched case-insensitively.
const FORMAT_ROWS: &[(&str, &str, bool)] = &[
    // tabular
    ("CSV", "tabular", true),
    ("TSV", "tabular", true),
    ("ODS", "tabular", true),
    ("XLS", "tabular", false),
    ("XLSX", "tabular", false),
    ("XLSM", "tabular", false),
    ("MDB", "tabular", false),
    ("ACCDB", "tabular", false),
    ("SAV", "tabular", false),
    ("SAS", "tabular", false),
    // structured
    ("JSON", "structured", true),
    ("JSONL", "structured", true),
    ("XML", "structured", true),
    ("RDF", "structured", true),
    ("SQL", "structured", true),
    // geospatial
    ("GEOJSON", "geospatial", true),
    ("GML", "geospatial", true),
    ("KML", "geospatial", true),
    ("KMZ", "geospatial", true),
    ("GPKG", "geospatial", true),
    ("SHP", "geospatial", true),
    ("WMS", "geospatial", true),
    ("WFS", "geospatial", true),
    ("WMTS", "geospatial", true),
    ("ESRI REST", "geospatial", false),
    ("FGDB/GDB", "geospatial", false),
    ("GDB", "geospatial", false),
    ("MXD", "geospatial", false),
    ("LYR", "geospatial", false),
    // raster
    ("GEOTIF", "raster", true),
    ("TIFF", "raster", true),
    ("NETCDF", "raster", true),
    ("HDF", "raster", true),
    ("ECW", "raster", false),
    ("IMG", "raster", false),
    // documents
    ("TXT", "document", true),
    ("HTML", "document", true),
    ("ODT", "document", true),
    ("EPUB", "document", true),
    ("PDF", "document", false),
    ("DOC", "document", false),
    ("DOCX", "document", false),
    ("PPT", "document", false),
    ("PPTX", "document", false),
    // images
    ("PNG", "image", true),
    ("JPG", "image", true),
    ("SVG", "image", true),
    ("GIF", "image", true),
    // archives
    ("ZIP", "archive", true),
    ("TAR", "archive", true),
    ("7Z", "archive", true),
    ("RAR", "archive", false),
];

static FORMATS: LazyLock<HashMap<&'static str, FormatInfo>> = LazyLock::new(|| {
    FORMAT_ROWS
        .iter()
        .map(|&(format, category, open)| (format, FormatInfo { category, open }))
        .collect()
});

/// Look up a declared format. Unknown formats return `None`.
pub fn format_info(format: &str) -> Option<FormatInfo> {
    FORMATS.get(format.trim().to_uppercase().as_str()).copied()
}

/// Two-letter (ISO 639-1) codes and portal variants mapped to ISO 639-2.
const LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("en", "eng"),
    ("fr", "fra"),
    ("fre", "fra"),
    ("iu", "iku"),
    ("de", "deu"),
    ("ger", "deu"),
    ("es", "spa"),
    ("it", "ita"),
    ("pt", "por"),
    ("zh", "zho"),
    ("chi", "zho"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("ar", "ara"),
    ("ru", "rus"),
    ("cr", "cre"),
    ("oj", "oji"),
    ("mic", "mic"),
    ("zxx", "zxx"),
];

static ISO639_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| LANGUAGE_ALIASES.iter().copied().collect());

/// Map a raw language code through the alias table; unknown codes pass through.
pub fn language_alias(code: &str) -> &str {
    ISO639_MAP.get(code).copied().unwrap_or(code)
}
