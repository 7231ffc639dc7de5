use crate::commons::{ObjectStore, ObjectSummary};
use crate::services::file_utils::calculate_file_hash;
use crate::workers::WorkerResult;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub const DEFAULT_CACHE_FILE: &str = "logs/file_cache.json";
pub const DEFAULT_MAX_LISTED_OBJECTS: usize = 10_000;

/// Hash groups keyed by hex SHA-256.
pub type HashGroups = BTreeMap<String, Vec<PathBuf>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CachedHash {
    hash: String,
    size: u64,
    mtime_ms: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HashCache {
    #[serde(default)]
    local: HashMap<String, CachedHash>,
    updated: Option<DateTime<Utc>>,
}

/// Content-addressed duplicate scan over local directories.
///
/// Hashes are cached on disk keyed by absolute path and reused while size
/// and modification time are unchanged. This is independent of the remote
/// identity check performed before an upload.
pub struct DuplicateDetector {
    cache_file: PathBuf,
    cache: HashCache,
}

impl DuplicateDetector {
    pub fn new(cache_file: impl Into<PathBuf>) -> Self {
        let cache_file = cache_file.into();
        let cache = Self::load_cache(&cache_file);
        Self { cache_file, cache }
    }

    fn load_cache(cache_file: &Path) -> HashCache {
        if !cache_file.exists() {
            return HashCache::default();
        }

        match fs::read_to_string(cache_file)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<HashCache>(&raw).map_err(anyhow::Error::from))
        {
            Ok(cache) => {
                debug!("Loaded hash cache with {} local entries", cache.local.len());
                cache
            }
            Err(e) => {
                warn!("Could not load cache file {}: {}", cache_file.display(), e);
                HashCache::default()
            }
        }
    }

    fn save_cache(&mut self) {
        self.cache.updated = Some(Utc::now());

        let result = self
            .cache_file
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(fs::create_dir_all)
            .transpose()
            .map_err(anyhow::Error::from)
            .and_then(|_| serde_json::to_string_pretty(&self.cache).map_err(anyhow::Error::from))
            .and_then(|json| fs::write(&self.cache_file, json).map_err(anyhow::Error::from));

        match result {
            Ok(()) => debug!("Hash cache saved to {}", self.cache_file.display()),
            Err(e) => warn!("Could not save cache file {}: {}", self.cache_file.display(), e),
        }
    }

    fn hash_with_cache(&mut self, path: &Path) -> WorkerResult<String> {
        let metadata = fs::metadata(path)?;
        let mtime_ms = metadata
            .modified()
            .map(|modified| DateTime::<Utc>::from(modified).timestamp_millis())
            .unwrap_or_default();
        let cache_key = path.to_string_lossy().into_owned();

        if let Some(cached) = self.cache.local.get(&cache_key) {
            if cached.size == metadata.len() && cached.mtime_ms == mtime_ms {
                debug!("Using cached hash for {}", path.display());
                return Ok(cached.hash.clone());
            }
        }

        let hash = calculate_file_hash(path)?;
        self.cache.local.insert(
            cache_key,
            CachedHash {
                hash: hash.clone(),
                size: metadata.len(),
                mtime_ms,
            },
        );
        Ok(hash)
    }

    /// Group every file under `directory` by content hash.
    pub fn scan_directory(&mut self, directory: &Path, recursive: bool) -> WorkerResult<HashGroups> {
        let directory = directory.canonicalize()?;
        let walker = if recursive {
            WalkDir::new(&directory)
        } else {
            WalkDir::new(&directory).max_depth(1)
        };

        let files: Vec<PathBuf> = walker
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        info!("Scanning {} files in {}", files.len(), directory.display());

        let mut groups = HashGroups::new();
        for path in files {
            match self.hash_with_cache(&path) {
                Ok(hash) => groups.entry(hash).or_default().push(path),
                Err(e) => error!("Error processing {}: {}", path.display(), e),
            }
        }

        self.save_cache();

        let duplicates = find_duplicates(&groups);
        if !duplicates.is_empty() {
            warn!("Found {} sets of duplicate files", duplicates.len());
        }

        Ok(groups)
    }

    /// Other files in `search_dirs` with the same content as `file`.
    pub fn check_local_duplicate(&mut self, file: &Path, search_dirs: &[PathBuf]) -> WorkerResult<Vec<PathBuf>> {
        let file = file.canonicalize()?;
        let target_hash = calculate_file_hash(&file)?;

        let mut duplicates = Vec::new();
        for search_dir in search_dirs {
            if !search_dir.exists() {
                continue;
            }

            let groups = self.scan_directory(search_dir, true)?;
            if let Some(paths) = groups.get(&target_hash) {
                duplicates.extend(paths.iter().filter(|path| **path != file).cloned());
            }
        }

        if !duplicates.is_empty() {
            warn!(
                "File {} has {} local duplicates",
                file.display(),
                duplicates.len()
            );
        }
        Ok(duplicates)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Similarity {
    SameName,
    SameSize,
}

impl Similarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Similarity::SameName => "same_name",
            Similarity::SameSize => "same_size",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarObject {
    pub object: ObjectSummary,
    pub similarity: Similarity,
}

/// Remote objects under `prefix` that look like `file`: same name ignoring case, or same size.
///
/// This is a listing heuristic only; content is never compared.
pub async fn find_similar_remote(
    store: &dyn ObjectStore,
    file: &Path,
    bucket: &str,
    prefix: &str,
    max_keys: usize,
) -> WorkerResult<Vec<SimilarObject>> {
    let size = fs::metadata(file)?.len();
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let objects = store.list(bucket, prefix, max_keys).await?;

    let similar: Vec<SimilarObject> = objects
        .into_iter()
        .filter_map(|object| {
            let remote_name = object.key.rsplit('/').next().unwrap_or_default().to_lowercase();
            let similarity = if !name.is_empty() && remote_name == name {
                Similarity::SameName
            } else if object.size == size {
                Similarity::SameSize
            } else {
                return None;
            };
            Some(SimilarObject { object, similarity })
        })
        .collect();

    if !similar.is_empty() {
        warn!(
            "File {} has {} similar objects in s3://{}/{}",
            file.display(),
            similar.len(),
            bucket,
            prefix
        );
    }
    Ok(similar)
}

/// Keep only groups with more than one file.
pub fn find_duplicates(groups: &HashGroups) -> HashGroups {
    groups
        .iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(hash, paths)| (hash.clone(), paths.clone()))
        .collect()
}

/// Human-readable report; within a group the oldest file is listed first.
pub fn generate_report(duplicates: &HashGroups, base_dir: Option<&Path>) -> String {
    let rule = "=".repeat(50);
    let mut lines = vec![rule.clone(), "Duplicate Detection Report".to_string(), rule.clone()];

    if duplicates.is_empty() {
        lines.push("No duplicates found".to_string());
    } else {
        let total: usize = duplicates.values().map(|paths| paths.len() - 1).sum();
        lines.push(format!(
            "Found {} duplicate files in {} groups",
            total,
            duplicates.len()
        ));
        lines.push(String::new());

        for (index, paths) in duplicates.values().enumerate() {
            lines.push(format!("Group {} ({} files):", index + 1, paths.len()));

            let mut entries: Vec<(PathBuf, fs::Metadata)> = paths
                .iter()
                .filter_map(|path| fs::metadata(path).ok().map(|m| (path.clone(), m)))
                .collect();
            entries.sort_by_key(|(_, metadata)| metadata.modified().ok());

            for (position, (path, metadata)) in entries.iter().enumerate() {
                let marker = if position == 0 { " (oldest)" } else { " (duplicate)" };
                lines.push(format!("  - {}{}", display_path(path, base_dir), marker));
                lines.push(format!("    Size: {} bytes", metadata.len()));
                if let Ok(modified) = metadata.modified() {
                    let modified: DateTime<Local> = modified.into();
                    lines.push(format!("    Modified: {}", modified.format("%Y-%m-%d %H:%M:%S")));
                }
            }
            lines.push(String::new());
        }
    }

    lines.push(rule);
    lines.join("\n")
}

fn display_path(path: &Path, base_dir: Option<&Path>) -> String {
    let base = base_dir
        .and_then(|base| base.canonicalize().ok())
        .or_else(|| std::env::current_dir().ok());

    match base.and_then(|base| path.strip_prefix(base).ok().map(Path::to_path_buf)) {
        Some(relative) => relative.display().to_string(),
        None => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
    }
}
