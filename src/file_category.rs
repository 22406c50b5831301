/// Broad file categories backing the `{Category}` template tag.
///
/// A category is derived from the sniffed MIME type when one is known and
/// falls back to the file extension otherwise.
///
/// # Examples
///
/// ```
/// use smartorg::file_category::{Category, FileMapper};
///
/// let mapper = FileMapper::default();
/// assert_eq!(mapper.mime_to_category("image/png"), Some(Category::Image));
/// assert_eq!(mapper.extension_to_category("FLAC"), Some(Category::Audio));
/// assert_eq!(mapper.categorize(None, Some("xyz")), Category::Other);
/// ```
use std::collections::HashMap;
use std::sync::OnceLock;

/// A broad file category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Image,
    Audio,
    Video,
    Document,
    Archive,
    Code,
    Spreadsheet,
    Presentation,
    Font,
    /// Nothing matched.
    Other,
}

impl Category {
    /// Returns the folder name this category renders to.
    ///
    /// ```
    /// use smartorg::file_category::Category;
    ///
    /// assert_eq!(Category::Image.dir_name(), "images");
    /// assert_eq!(Category::Other.dir_name(), "other");
    /// ```
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Image => "images",
            Category::Audio => "audio",
            Category::Video => "videos",
            Category::Document => "documents",
            Category::Archive => "archives",
            Category::Code => "code",
            Category::Spreadsheet => "spreadsheets",
            Category::Presentation => "presentations",
            Category::Font => "fonts",
            Category::Other => "other",
        }
    }
}

const MIME_TABLE: &[(Category, &[&str])] = &[
    (
        Category::Image,
        &[
            "image/png",
            "image/jpeg",
            "image/gif",
            "image/webp",
            "image/svg+xml",
            "image/bmp",
            "image/tiff",
            "image/heif",
            "image/avif",
            "image/vnd.adobe.photoshop",
        ],
    ),
    (
        Category::Audio,
        &[
            "audio/mpeg",
            "audio/x-wav",
            "audio/ogg",
            "audio/x-flac",
            "audio/aac",
            "audio/m4a",
            "audio/midi",
        ],
    ),
    (
        Category::Video,
        &[
            "video/mp4",
            "video/mpeg",
            "video/quicktime",
            "video/x-msvideo",
            "video/x-matroska",
            "video/webm",
            "video/x-flv",
            "video/x-m4v",
        ],
    ),
    (
        Category::Document,
        &["application/pdf", "application/rtf", "application/epub+zip"],
    ),
    (
        Category::Archive,
        &[
            "application/zip",
            "application/vnd.rar",
            "application/x-7z-compressed",
            "application/x-tar",
            "application/gzip",
            "application/x-bzip2",
            "application/x-xz",
        ],
    ),
    (
        Category::Code,
        &["application/wasm", "application/x-executable"],
    ),
    (
        Category::Font,
        &["font/ttf", "font/otf", "font/woff", "font/woff2"],
    ),
];

const EXTENSION_TABLE: &[(Category, &[&str])] = &[
    (
        Category::Image,
        &[
            "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tif", "tiff", "ico", "heic",
            "raw", "cr2", "nef", "psd",
        ],
    ),
    (
        Category::Audio,
        &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma", "opus"],
    ),
    (
        Category::Video,
        &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp", "m4v"],
    ),
    (
        Category::Document,
        &["pdf", "txt", "doc", "docx", "md", "rtf", "odt", "epub"],
    ),
    (
        Category::Archive,
        &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "iso"],
    ),
    (
        Category::Code,
        &[
            "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "html", "css",
            "json", "xml", "yaml", "yml", "toml",
        ],
    ),
    (Category::Spreadsheet, &["csv", "xls", "xlsx", "ods"]),
    (Category::Presentation, &["ppt", "pptx", "odp", "key"]),
    (Category::Font, &["ttf", "otf", "woff", "woff2"]),
];

/// Lookup tables from MIME type and extension to [`Category`].
#[derive(Debug, Clone)]
pub struct FileMapper {
    mime_map: HashMap<String, Category>,
    extension_map: HashMap<String, Category>,
}

impl FileMapper {
    /// Builds a mapper populated with the built-in tables.
    pub fn new() -> Self {
        let mut mapper = Self {
            mime_map: HashMap::new(),
            extension_map: HashMap::new(),
        };
        for (category, mimes) in MIME_TABLE {
            for mime in *mimes {
                mapper.add_mime_mapping(mime, *category);
            }
        }
        for (category, extensions) in EXTENSION_TABLE {
            for ext in *extensions {
                mapper.add_extension_mapping(ext, *category);
            }
        }
        mapper
    }

    /// Shared instance used by tag resolution.
    pub fn shared() -> &'static FileMapper {
        static MAPPER: OnceLock<FileMapper> = OnceLock::new();
        MAPPER.get_or_init(FileMapper::new)
    }

    pub fn add_mime_mapping(&mut self, mime: &str, category: Category) {
        self.mime_map.insert(mime.to_lowercase(), category);
    }

    pub fn add_extension_mapping(&mut self, ext: &str, category: Category) {
        self.extension_map
            .insert(ext.trim_start_matches('.').to_lowercase(), category);
    }

    pub fn mime_to_category(&self, mime_type: &str) -> Option<Category> {
        self.mime_map.get(&mime_type.to_lowercase()).copied()
    }

    pub fn extension_to_category(&self, ext: &str) -> Option<Category> {
        self.extension_map
            .get(&ext.trim_start_matches('.').to_lowercase())
            .copied()
    }

    /// MIME type wins over extension; `Other` when neither is known.
    pub fn categorize(&self, mime_type: Option<&str>, ext: Option<&str>) -> Category {
        if let Some(mime) = mime_type
            && let Some(category) = self.mime_to_category(mime)
        {
            return category;
        }

        if let Some(extension) = ext
            && let Some(category) = self.extension_to_category(extension)
        {
            return category;
        }

        Category::Other
    }
}

impl Default for FileMapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_lookup_is_case_insensitive() {
        let mapper = FileMapper::default();
        assert_eq!(mapper.mime_to_category("IMAGE/JPEG"), Some(Category::Image));
        assert_eq!(mapper.mime_to_category("unknown/type"), None);
    }

    #[test]
    fn test_extension_lookup_ignores_leading_dot() {
        let mapper = FileMapper::default();
        assert_eq!(mapper.extension_to_category(".PDF"), Some(Category::Document));
        assert_eq!(mapper.extension_to_category("xlsx"), Some(Category::Spreadsheet));
    }

    #[test]
    fn test_mime_takes_priority_over_extension() {
        let mapper = FileMapper::default();
        // A PNG saved with a .txt extension is still an image.
        assert_eq!(
            mapper.categorize(Some("image/png"), Some("txt")),
            Category::Image
        );
        assert_eq!(
            mapper.categorize(Some("application/x-unknown"), Some("mp3")),
            Category::Audio
        );
        assert_eq!(mapper.categorize(None, None), Category::Other);
    }

    #[test]
    fn test_custom_mapping() {
        let mut mapper = FileMapper::default();
        mapper.add_extension_mapping("blend", Category::Other);
        mapper.add_extension_mapping("kdbx", Category::Document);
        assert_eq!(mapper.extension_to_category("kdbx"), Some(Category::Document));
    }
}
