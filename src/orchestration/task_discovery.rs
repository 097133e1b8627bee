//! # Task Discovery
//!
//! Walks a task directory laid out as one subdirectory per object type
//! (`table/`, `view/`, `grants/`, ...) with files named
//! `SCHEMA.NAME[.QUALIFIER].sql`. Unknown subdirectories are not an error;
//! their files land in the final, unordered layer.

use crate::constants::task_dirs;
use crate::error::{FixupError, FixupResult};
use crate::models::{ObjectType, RemediationTask, TaskKind};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct DiscoveredTasks {
    /// Sorted by task id
    pub tasks: Vec<RemediationTask>,
    /// Files that could not be turned into tasks
    pub skipped_files: Vec<PathBuf>,
    pub unknown_dirs: Vec<String>,
}

impl DiscoveredTasks {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Map a subdirectory name onto a task kind
pub fn kind_for_dir(dir: &str) -> TaskKind {
    match dir {
        task_dirs::GRANTS => TaskKind::Grant,
        task_dirs::TABLE_ALTER => TaskKind::TableAlter,
        other => ObjectType::from_dir_name(other)
            .map(TaskKind::Object)
            .unwrap_or_else(|| TaskKind::Unrecognized(other.to_string())),
    }
}

/// Split a file stem into `(schema, name, qualifier)`. A bare stem has no
/// schema.
pub fn parse_task_stem(stem: &str) -> Option<(String, String, Option<String>)> {
    let parts: Vec<&str> = stem.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    match parts.as_slice() {
        [name] => Some((String::new(), (*name).to_string(), None)),
        [schema, name] => Some(((*schema).to_string(), (*name).to_string(), None)),
        [schema, name, qualifier] => Some((
            (*schema).to_string(),
            (*name).to_string(),
            Some((*qualifier).to_string()),
        )),
        _ => None,
    }
}

/// Discover every task under `root`, ignoring the archive directory
pub fn discover_tasks(root: &Path, done_dir: &str) -> FixupResult<DiscoveredTasks> {
    if !root.is_dir() {
        return Err(FixupError::TaskDiscovery(format!(
            "task directory {} does not exist",
            root.display()
        )));
    }

    let mut discovered = DiscoveredTasks::default();
    let mut dirs: Vec<(String, PathBuf)> = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name == done_dir {
            continue;
        }
        if path.is_dir() {
            dirs.push((name, path));
        } else {
            discovered.skipped_files.push(path);
        }
    }
    dirs.sort();

    for (dir_name, dir_path) in dirs {
        let kind = kind_for_dir(&dir_name);
        if let TaskKind::Unrecognized(_) = kind {
            warn!(directory = %dir_name, "Unrecognized task directory; running its tasks last");
            discovered.unknown_dirs.push(dir_name.clone());
        }

        for entry in fs::read_dir(&dir_path)? {
            let path = entry?.path();
            if !path.is_file() || !has_script_extension(&path) {
                if !path.is_dir() {
                    discovered.skipped_files.push(path);
                }
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            match parse_task_stem(&stem) {
                Some((schema, name, qualifier))
                    if !schema.is_empty() || !matches!(kind, TaskKind::Object(_) | TaskKind::TableAlter) =>
                {
                    discovered.tasks.push(RemediationTask::from_file(
                        kind.clone(),
                        schema,
                        name,
                        qualifier,
                        path,
                    ));
                }
                _ => {
                    warn!(file = %path.display(), "Task file name is not SCHEMA.NAME[.QUALIFIER]");
                    discovered.skipped_files.push(path);
                }
            }
        }
    }

    discovered.tasks.sort_by(|a, b| a.id.cmp(&b.id));
    discovered.skipped_files.sort();
    debug!(skipped = discovered.skipped_files.len(), "Skipped non-task files");
    info!(
        tasks = discovered.tasks.len(),
        unknown_dirs = discovered.unknown_dirs.len(),
        root = %root.display(),
        "Task discovery complete"
    );
    Ok(discovered)
}

fn has_script_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(task_dirs::SCRIPT_EXTENSION))
}

/// Move a finished task file to `<root>/<done_dir>/<type dir>/<file>`
pub fn archive_task_file(root: &Path, done_dir: &str, task: &RemediationTask, file: &Path) -> FixupResult<PathBuf> {
    let Some(file_name) = file.file_name() else {
        return Err(FixupError::InvalidInput(format!(
            "task {} has no file name to archive",
            task.id
        )));
    };
    let dest_dir = root.join(done_dir).join(task.kind.dir_name());
    fs::create_dir_all(&dest_dir)?;
    let dest = dest_dir.join(file_name);
    fs::rename(file, &dest)?;
    debug!(task_id = %task.id, dest = %dest.display(), "Archived task file");
    Ok(dest)
}
