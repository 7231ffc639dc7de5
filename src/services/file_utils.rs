use crate::config::Settings;
use crate::workers::{Scope, ValidationError, WorkerResult};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

// extension -> key sub-folder
const FILE_TYPE_MAPPING: &[(&str, &str)] = &[
    (".pdf", "pdf"),
    (".png", "image"),
    (".jpg", "image"),
    (".jpeg", "image"),
    (".gif", "image"),
    (".bmp", "image"),
    (".tiff", "image"),
    (".csv", "csv"),
    (".json", "json"),
    (".txt", "text"),
    (".log", "text"),
    (".md", "text"),
    (".docx", "docx"),
    (".doc", "docx"),
    (".xlsx", "excel"),
    (".xls", "excel"),
    (".pptx", "powerpoint"),
    (".ppt", "powerpoint"),
    (".xml", "xml"),
    (".yaml", "yaml"),
    (".yml", "yaml"),
];

const HASH_CHUNK_SIZE: usize = 8192;

/// Include/exclude extension filters. An empty include set admits everything.
#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    include: HashSet<String>,
    exclude: HashSet<String>,
}

impl ExtensionFilter {
    pub fn new(include: HashSet<String>, exclude: HashSet<String>) -> Self {
        Self {
            include: include.iter().map(|e| normalize_extension(e)).collect(),
            exclude: exclude.iter().map(|e| normalize_extension(e)).collect(),
        }
    }

    pub fn from_lists(include: &str, exclude: &str) -> Self {
        Self::new(parse_extensions(include), parse_extensions(exclude))
    }

    pub fn admits(&self, extension: &str) -> bool {
        if !self.include.is_empty() && !self.include.contains(extension) {
            return false;
        }
        !self.exclude.contains(extension)
    }
}

/// Parse `"pdf, .PNG,jpg"` into `{".pdf", ".png", ".jpg"}`.
pub fn parse_extensions(extensions: &str) -> HashSet<String> {
    extensions
        .split(',')
        .map(|ext| ext.trim())
        .filter(|ext| !ext.is_empty())
        .map(normalize_extension)
        .collect()
}

fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_lowercase())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// Recursively list regular files under `input_dir` that pass `filter`.
///
/// With a scope, only `<input_dir>/<scope>` is scanned when that directory exists.
pub fn discover_files(
    input_dir: &Path,
    filter: &ExtensionFilter,
    scope: Option<Scope>,
) -> WorkerResult<Vec<PathBuf>> {
    validate_input_dir(input_dir)?;

    let scan_dir = match scope {
        Some(scope) => {
            let scope_dir = input_dir.join(scope.as_str());
            if scope_dir.is_dir() {
                info!("Scanning scope-specific directory: {}", scope_dir.display());
                scope_dir
            } else {
                warn!(
                    "Scope directory {} not found, scanning entire {}",
                    scope_dir.display(),
                    input_dir.display()
                );
                input_dir.to_path_buf()
            }
        }
        None => input_dir.to_path_buf(),
    };

    let mut discovered = Vec::new();
    for entry in WalkDir::new(&scan_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(extension) = extension_of(path) else {
            debug!("Skipping {} - no extension", path.display());
            continue;
        };

        if !filter.admits(&extension) {
            debug!("Skipping {} - filtered by extension", path.display());
            continue;
        }

        discovered.push(path.to_path_buf());
    }

    info!("Discovered {} files in {}", discovered.len(), scan_dir.display());
    Ok(discovered)
}

pub fn validate_input_dir(input_dir: &Path) -> Result<(), ValidationError> {
    if !input_dir.exists() {
        return Err(ValidationError::RootNotFound(input_dir.to_path_buf()));
    }
    if !input_dir.is_dir() {
        return Err(ValidationError::RootNotADirectory(input_dir.to_path_buf()));
    }
    Ok(())
}

pub fn validate_source_file(path: &Path) -> Result<(), ValidationError> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(ValidationError::SourceNotAFile(path.to_path_buf())),
        Err(_) => Err(ValidationError::SourceNotFound(path.to_path_buf())),
    }
}

pub fn detect_file_type(path: &Path) -> &'static str {
    let Some(extension) = extension_of(path) else {
        return "other";
    };

    FILE_TYPE_MAPPING
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, file_type)| *file_type)
        .unwrap_or("other")
}

/// Detect the scope from the first component below `input_dir`, or from any ancestor.
pub fn detect_scope_from_path(path: &Path, input_dir: &Path) -> Option<Scope> {
    if let Ok(relative) = path.strip_prefix(input_dir) {
        if let Some(first) = relative.components().next() {
            if let Ok(scope) = first.as_os_str().to_string_lossy().parse::<Scope>() {
                return Some(scope);
            }
        }
    }

    path.ancestors()
        .skip(1)
        .filter_map(|parent| parent.file_name())
        .find_map(|name| name.to_string_lossy().parse::<Scope>().ok())
}

/// Hex SHA-256 of a file, read in chunks.
pub fn calculate_file_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Maps a scope and a local file to its destination bucket and key.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    mba_bucket: String,
    policy_bucket: String,
    mba_prefix: String,
    policy_prefix: String,
    auto_detect_type: bool,
}

impl KeyBuilder {
    pub fn new(settings: &Settings) -> Self {
        Self {
            mba_bucket: settings.s3_bucket_mba.clone(),
            policy_bucket: settings.s3_bucket_policy.clone(),
            mba_prefix: settings.s3_prefix_mba.clone(),
            policy_prefix: settings.s3_prefix_policy.clone(),
            auto_detect_type: settings.s3_auto_detect_type,
        }
    }

    pub fn bucket(&self, scope: Scope) -> &str {
        match scope {
            Scope::Mba => &self.mba_bucket,
            Scope::Policy => &self.policy_bucket,
        }
    }

    /// Configured prefix for the scope, falling back to `<scope>/`; always ends with `/`.
    pub fn prefix(&self, scope: Scope) -> String {
        let configured = match scope {
            Scope::Mba => &self.mba_prefix,
            Scope::Policy => &self.policy_prefix,
        };

        let mut prefix = if configured.trim().is_empty() {
            scope.as_str().to_string()
        } else {
            configured.trim().to_string()
        };
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        prefix
    }

    pub fn build_key(&self, scope: Scope, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let key = if self.auto_detect_type {
            format!("{}{}/{}", self.prefix(scope), detect_file_type(path), file_name)
        } else {
            format!("{}{}", self.prefix(scope), file_name)
        };

        debug!("Built S3 key: {}", key);
        key
    }

    /// `(bucket, key)` for a local file.
    pub fn resolve(&self, scope: Scope, path: &Path) -> (String, String) {
        (self.bucket(scope).to_string(), self.build_key(scope, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_parse_extensions_normalizes() {
        let parsed = parse_extensions("pdf, .PNG,, jpg ");
        let expected: HashSet<String> =
            [".pdf", ".png", ".jpg"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parsed, expected);
        assert!(parse_extensions("").is_empty());
    }

    #[test]
    fn test_detect_file_type() {
        assert_eq!(detect_file_type(Path::new("a/report.PDF")), "pdf");
        assert_eq!(detect_file_type(Path::new("scan.jpeg")), "image");
        assert_eq!(detect_file_type(Path::new("claims.xlsx")), "excel");
        assert_eq!(detect_file_type(Path::new("archive.zip")), "other");
        assert_eq!(detect_file_type(Path::new("README")), "other");
    }

    #[test]
    fn test_build_key_with_type_folder() {
        let builder = KeyBuilder::new(&Settings::default());
        let (bucket, key) = builder.resolve(Scope::Mba, Path::new("/data/mba/claims.csv"));
        assert_eq!(bucket, "hma-mba-bucket");
        assert_eq!(key, "mba/csv/claims.csv");

        let (bucket, key) = builder.resolve(Scope::Policy, Path::new("terms.pdf"));
        assert_eq!(bucket, "hma-policy-bucket");
        assert_eq!(key, "policy/pdf/terms.pdf");
    }

    #[test]
    fn test_build_key_fixes_prefix_and_skips_type() {
        let settings = Settings {
            s3_prefix_mba: "raw/mba".to_string(),
            s3_prefix_policy: "".to_string(),
            s3_auto_detect_type: false,
            ..Settings::default()
        };
        let builder = KeyBuilder::new(&settings);

        assert_eq!(builder.build_key(Scope::Mba, Path::new("x.pdf")), "raw/mba/x.pdf");
        assert_eq!(builder.build_key(Scope::Policy, Path::new("y.pdf")), "policy/y.pdf");
    }

    #[test]
    fn test_discover_files_applies_filters() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.pdf"), "a");
        touch(&dir.path().join("nested/b.CSV"), "b");
        touch(&dir.path().join("nested/c.tmp"), "c");
        touch(&dir.path().join("no_extension"), "d");

        let all = discover_files(dir.path(), &ExtensionFilter::default(), None).unwrap();
        assert_eq!(all.len(), 3);

        let pdf_csv = discover_files(dir.path(), &ExtensionFilter::from_lists("pdf,csv", ""), None).unwrap();
        assert_eq!(pdf_csv.len(), 2);

        let no_tmp = discover_files(dir.path(), &ExtensionFilter::from_lists("", "tmp"), None).unwrap();
        assert!(no_tmp.iter().all(|p| !p.to_string_lossy().ends_with(".tmp")));
        assert_eq!(no_tmp.len(), 2);
    }

    #[test]
    fn test_discover_files_prefers_scope_directory() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("mba/a.pdf"), "a");
        touch(&dir.path().join("policy/b.pdf"), "b");

        let mba = discover_files(dir.path(), &ExtensionFilter::default(), Some(Scope::Mba)).unwrap();
        assert_eq!(mba, vec![dir.path().join("mba/a.pdf")]);
    }

    #[test]
    fn test_discover_files_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let err = discover_files(&missing, &ExtensionFilter::default(), None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_detect_scope_from_path() {
        let root = Path::new("/data/input");
        assert_eq!(detect_scope_from_path(Path::new("/data/input/MBA/x.pdf"), root), Some(Scope::Mba));
        assert_eq!(detect_scope_from_path(Path::new("/srv/policy/2024/x.pdf"), root), Some(Scope::Policy));
        assert_eq!(detect_scope_from_path(Path::new("/data/input/other/x.pdf"), root), None);
    }

    #[test]
    fn test_calculate_file_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        touch(&path, "");
        assert_eq!(
            calculate_file_hash(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_validate_source_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.pdf");
        touch(&path, "a");

        assert!(validate_source_file(&path).is_ok());
        assert_eq!(
            validate_source_file(dir.path()),
            Err(ValidationError::SourceNotAFile(dir.path().to_path_buf()))
        );
        assert!(matches!(
            validate_source_file(&dir.path().join("gone.pdf")),
            Err(ValidationError::SourceNotFound(_))
        ));
    }
}
